pub mod ffmpeg;

use image::RgbImage;
use std::path::Path;

pub use ffmpeg::FfmpegDecoder;

#[derive(Debug, thiserror::Error)]
pub enum VideoError {
    #[error("{0}")]
    Open(String),
    #[error("Failed to probe video stream: {0}")]
    Probe(String),
    #[error("Video decoding failed: {0}")]
    Decode(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A decoded video stream, read front to back. Dropping it releases whatever
/// OS resources the decoder holds.
pub trait VideoSource {
    /// Frames per second, when the container reports one.
    fn frame_rate(&self) -> Option<f64>;

    fn frame_count(&self) -> Option<u64>;

    /// Next frame as RGB, or `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<RgbImage>, VideoError>;
}

pub trait VideoDecoder: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn VideoSource>, VideoError>;
}
