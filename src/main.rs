mod lane_detection;

use lane_detection::LaneDetector;
use log::error;
use std::io::{self, BufRead, Write};

/// Prints `msg` and reads one trimmed line from stdin. `None` means the
/// input stream is closed.
fn prompt(msg: &str) -> io::Result<Option<String>> {
    print!("{}", msg);
    io::stdout().flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn main() -> io::Result<()> {
    env_logger::init();

    let detector = LaneDetector::new();

    loop {
        let media_type =
            match prompt("Enter 'image', 'video' or 'camera' to process (or 'exit' to quit): ")? {
                Some(line) => line.to_lowercase(),
                None => break,
            };

        let outcome = match media_type.as_str() {
            "image" => match prompt("Enter the path of the image file: ")? {
                Some(path) => detector.process_image(&path),
                None => break,
            },
            "video" => match prompt("Enter the path of the video file: ")? {
                Some(path) => detector.process_video(&path),
                None => break,
            },
            "camera" => detector.process_camera(),
            "exit" => break,
            _ => {
                println!("Invalid media type.");
                continue;
            }
        };

        // A failed media item is reported and the prompt comes back.
        if let Err(e) = outcome {
            error!("processing failed: {}", e);
        }
    }

    Ok(())
}
