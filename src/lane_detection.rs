use opencv::{
    core::{self, Mat, Point, Scalar, Size, Vec4i, Vector},
    highgui, imgcodecs, imgproc,
    prelude::*,
    videoio, Result,
};
use std::f64::consts::PI;
use std::time::Instant;

use log::{debug, error, info};

/// Shared `Result` alias for the pipeline functions. Every stage is a thin
/// wrapper over an OpenCV call, so `opencv::Error` is the only error type
/// that can surface here.
pub type LaneResult<T> = Result<T>;

/// Window title used for both single-image display and the live video loop.
const WINDOW_NAME: &str = "Lane Lines";

/// Classical lane-line detector: grayscale, Gaussian blur, Canny edges,
/// triangular region-of-interest mask, probabilistic Hough transform, and a
/// weighted overlay of the detected segments onto the original frame.
///
/// All stage parameters live here so a caller can tune them; `Default`
/// carries the stock values.
pub struct LaneDetector {
    /// Side of the square Gaussian kernel (must be odd).
    blur_kernel: i32,
    /// Canny hysteresis thresholds.
    canny_low: f64,
    canny_high: f64,
    /// Hough accumulator resolution: distance in pixels, angle in radians.
    hough_rho: f64,
    hough_theta: f64,
    /// Minimum accumulator votes for a segment.
    hough_threshold: i32,
    /// Segments shorter than this are discarded.
    min_line_length: f64,
    /// Maximum gap between collinear points merged into one segment.
    max_line_gap: f64,
    /// BGR color and thickness of the drawn segments.
    line_color: Scalar,
    line_thickness: i32,
    /// Blend weights for `frame * frame_weight + overlay * overlay_weight`.
    frame_weight: f64,
    overlay_weight: f64,
}

impl Default for LaneDetector {
    fn default() -> Self {
        Self {
            blur_kernel: 5,
            canny_low: 50.0,
            canny_high: 150.0,
            hough_rho: 1.0,
            hough_theta: PI / 180.0,
            hough_threshold: 40,
            min_line_length: 50.0,
            max_line_gap: 100.0,
            line_color: Scalar::new(255.0, 0.0, 0.0, 255.0),
            line_thickness: 5,
            frame_weight: 0.8,
            overlay_weight: 1.0,
        }
    }
}

impl LaneDetector {
    pub fn new() -> Self {
        Self::default()
    }

    fn gray_scale(&self, img: &Mat) -> LaneResult<Mat> {
        let mut gray = Mat::default();
        imgproc::cvt_color(img, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;
        Ok(gray)
    }

    /// Gaussian blur with sigma derived from the kernel size.
    fn noise_removal(&self, img: &Mat) -> LaneResult<Mat> {
        let mut dst = Mat::default();
        imgproc::gaussian_blur(
            img,
            &mut dst,
            Size::new(self.blur_kernel, self.blur_kernel),
            0.0,
            0.0,
            core::BORDER_DEFAULT,
        )?;
        Ok(dst)
    }

    fn edge_detection(&self, img: &Mat) -> LaneResult<Mat> {
        let mut edges = Mat::default();
        imgproc::canny(img, &mut edges, self.canny_low, self.canny_high, 3, false)?;
        Ok(edges)
    }

    /// Keeps only the triangular region where lane markings are expected and
    /// zeroes everything else. The triangle scales with the frame, so no
    /// fixed input resolution is assumed.
    fn region_of_interest(&self, img: &Mat) -> LaneResult<Mat> {
        let mut mask = Mat::zeros(img.rows(), img.cols(), img.typ())?.to_mat()?;

        let mut polygons: Vector<Vector<Point>> = Vector::new();
        polygons.push(Vector::from_iter(roi_vertices(img.cols(), img.rows())));

        imgproc::fill_poly(
            &mut mask,
            &polygons,
            Scalar::new(255.0, 255.0, 255.0, 255.0),
            imgproc::LINE_8,
            0,
            Point::new(0, 0),
        )?;

        let mut masked = Mat::default();
        core::bitwise_and(img, &mask, &mut masked, &Mat::default())?;
        Ok(masked)
    }

    /// Probabilistic Hough transform over a binary edge image. An empty
    /// result is a valid outcome, not an error.
    fn detect_segments(&self, edges: &Mat) -> LaneResult<Vector<Vec4i>> {
        let mut segments: Vector<Vec4i> = Vector::new();
        imgproc::hough_lines_p(
            edges,
            &mut segments,
            self.hough_rho,
            self.hough_theta,
            self.hough_threshold,
            self.min_line_length,
            self.max_line_gap,
        )?;
        Ok(segments)
    }

    fn draw_segments(&self, overlay: &mut Mat, segments: &Vector<Vec4i>) -> LaneResult<()> {
        for seg in segments.iter() {
            imgproc::line(
                overlay,
                Point::new(seg[0], seg[1]),
                Point::new(seg[2], seg[3]),
                self.line_color,
                self.line_thickness,
                imgproc::LINE_8,
                0,
            )?;
        }
        Ok(())
    }

    /// Full per-frame pipeline.
    ///
    /// 1) grayscale
    /// 2) Gaussian blur
    /// 3) Canny edges
    /// 4) triangular ROI mask
    /// 5) Hough segment detection
    /// 6) draw segments on a blank overlay
    /// 7) weighted blend of overlay onto the original frame
    pub fn detect_lane_lines(&self, frame: &Mat) -> LaneResult<Mat> {
        let start_time = Instant::now();

        let gray = self.gray_scale(frame)?;
        let blurred = self.noise_removal(&gray)?;
        let edges = self.edge_detection(&blurred)?;
        let masked_edges = self.region_of_interest(&edges)?;
        let segments = self.detect_segments(&masked_edges)?;

        let mut overlay = Mat::zeros(frame.rows(), frame.cols(), frame.typ())?.to_mat()?;
        self.draw_segments(&mut overlay, &segments)?;

        let mut result = Mat::default();
        core::add_weighted(
            frame,
            self.frame_weight,
            &overlay,
            self.overlay_weight,
            0.0,
            &mut result,
            -1,
        )?;

        debug!(
            "{} segments in {:.1} ms",
            segments.len(),
            start_time.elapsed().as_secs_f32() * 1000.0
        );
        Ok(result)
    }

    /// Runs the pipeline on a single image file and shows the result,
    /// blocking until any key is pressed.
    pub fn process_image(&self, path: &str) -> LaneResult<()> {
        let img = imgcodecs::imread(path, imgcodecs::IMREAD_COLOR)?;
        if img.empty() {
            error!("could not read image: {}", path);
            return Ok(());
        }

        let result = self.detect_lane_lines(&img)?;

        highgui::named_window(WINDOW_NAME, highgui::WINDOW_AUTOSIZE)?;
        highgui::imshow(WINDOW_NAME, &result)?;
        highgui::wait_key(0)?;
        highgui::destroy_all_windows()?;
        Ok(())
    }

    /// Runs the pipeline over every frame of a video file in a live window.
    /// Stops at end-of-stream or when 'q' is pressed.
    pub fn process_video(&self, path: &str) -> LaneResult<()> {
        let cap = videoio::VideoCapture::from_file(path, videoio::CAP_ANY)?;
        if !cap.is_opened()? {
            error!("error opening video file: {}", path);
            return Ok(());
        }
        self.run_capture(cap)
    }

    /// Same loop as `process_video`, sourced from the default camera.
    pub fn process_camera(&self) -> LaneResult<()> {
        let cap = videoio::VideoCapture::new(0, videoio::CAP_ANY)?;
        if !cap.is_opened()? {
            error!("error opening camera device 0");
            return Ok(());
        }
        self.run_capture(cap)
    }

    fn run_capture(&self, mut cap: videoio::VideoCapture) -> LaneResult<()> {
        highgui::named_window(WINDOW_NAME, highgui::WINDOW_AUTOSIZE)?;

        loop {
            let mut frame = Mat::default();
            match cap.read(&mut frame) {
                Ok(is_read) => {
                    if !is_read || frame.empty() {
                        info!("end of stream");
                        break;
                    }
                }
                Err(e) => {
                    error!("failed to read frame: {:?}", e);
                    break;
                }
            }

            let start_time = Instant::now();
            let result = self.detect_lane_lines(&frame)?;
            highgui::imshow(WINDOW_NAME, &result)?;

            // 'q' quits early.
            let key = highgui::wait_key(1)?;
            if key == 113 {
                info!("quit requested");
                break;
            }

            let elapsed = start_time.elapsed().as_secs_f32();
            debug!("fps: {:.2}", 1.0 / elapsed);
        }

        cap.release()?;
        highgui::destroy_all_windows()?;
        Ok(())
    }
}

/// Triangle covering the lower half of the frame: both bottom corners plus
/// the frame center. Integer division matches the mask rasterization.
fn roi_vertices(width: i32, height: i32) -> [Point; 3] {
    [
        Point::new(0, height),
        Point::new(width / 2, height / 2),
        Point::new(width, height),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Vec3b, CV_8UC1, CV_8UC3};

    fn blank(rows: i32, cols: i32, typ: i32) -> Mat {
        Mat::zeros(rows, cols, typ).unwrap().to_mat().unwrap()
    }

    #[test]
    fn roi_triangle_scales_with_frame() {
        let v = roi_vertices(640, 480);
        assert_eq!(v[0], Point::new(0, 480));
        assert_eq!(v[1], Point::new(320, 240));
        assert_eq!(v[2], Point::new(640, 480));

        // Odd dimensions truncate like the mask rasterizer expects.
        let v = roi_vertices(101, 51);
        assert_eq!(v[1], Point::new(50, 25));
    }

    #[test]
    fn roi_mask_keeps_inside_and_zeroes_outside() {
        let detector = LaneDetector::new();
        let all_white =
            Mat::new_rows_cols_with_default(200, 200, CV_8UC1, Scalar::all(255.0)).unwrap();

        let masked = detector.region_of_interest(&all_white).unwrap();

        // Bottom center is well inside the triangle, top corners are outside.
        assert_eq!(*masked.at_2d::<u8>(195, 100).unwrap(), 255);
        assert_eq!(*masked.at_2d::<u8>(5, 5).unwrap(), 0);
        assert_eq!(*masked.at_2d::<u8>(5, 195).unwrap(), 0);
    }

    #[test]
    fn hough_finds_a_strong_synthetic_line() {
        let detector = LaneDetector::new();
        let mut edges = blank(400, 400, CV_8UC1);
        imgproc::line(
            &mut edges,
            Point::new(50, 350),
            Point::new(350, 50),
            Scalar::all(255.0),
            3,
            imgproc::LINE_8,
            0,
        )
        .unwrap();

        let segments = detector.detect_segments(&edges).unwrap();
        assert!(!segments.is_empty());

        let seg = segments.get(0).unwrap();
        let len = (((seg[2] - seg[0]).pow(2) + (seg[3] - seg[1]).pow(2)) as f64).sqrt();
        assert!(len >= detector.min_line_length);
    }

    #[test]
    fn no_segments_draws_nothing() {
        let detector = LaneDetector::new();
        let mut overlay = blank(100, 100, CV_8UC3);
        detector
            .draw_segments(&mut overlay, &Vector::new())
            .unwrap();
        assert_eq!(core::sum_elems(&overlay).unwrap(), Scalar::all(0.0));
    }

    #[test]
    fn segments_are_drawn_with_configured_color() {
        let detector = LaneDetector::new();
        let mut overlay = blank(100, 100, CV_8UC3);

        let mut segments: Vector<Vec4i> = Vector::new();
        segments.push(Vec4i::from([10, 20, 60, 20]));
        detector.draw_segments(&mut overlay, &segments).unwrap();

        // Midpoint of the segment carries the BGR blue stroke.
        assert_eq!(
            *overlay.at_2d::<Vec3b>(20, 35).unwrap(),
            Vec3b::from([255, 0, 0])
        );
    }

    #[test]
    fn pipeline_preserves_frame_shape_on_blank_input() {
        let detector = LaneDetector::new();
        let frame = blank(240, 320, CV_8UC3);

        let result = detector.detect_lane_lines(&frame).unwrap();

        assert_eq!(result.rows(), 240);
        assert_eq!(result.cols(), 320);
        assert_eq!(result.typ(), CV_8UC3);
        // Nothing to detect, nothing to draw.
        assert_eq!(core::sum_elems(&result).unwrap(), Scalar::all(0.0));
    }

    #[test]
    fn pipeline_detects_line_inside_roi() {
        let detector = LaneDetector::new();
        let mut frame = blank(480, 640, CV_8UC3);

        // White stroke inside the ROI triangle of a 640x480 frame.
        imgproc::line(
            &mut frame,
            Point::new(200, 460),
            Point::new(320, 260),
            Scalar::all(255.0),
            5,
            imgproc::LINE_8,
            0,
        )
        .unwrap();

        let gray = detector.gray_scale(&frame).unwrap();
        let blurred = detector.noise_removal(&gray).unwrap();
        let edges = detector.edge_detection(&blurred).unwrap();
        let masked = detector.region_of_interest(&edges).unwrap();
        let segments = detector.detect_segments(&masked).unwrap();

        assert!(!segments.is_empty());
    }
}
