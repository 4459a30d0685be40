// Detection core: label normalization, verdict aggregation, frame sampling,
// and the request handlers that compose them.

pub mod detector;
pub mod error;
pub mod heuristics;
pub mod labels;
pub mod sampler;
pub mod scorers;
pub mod verdict;

pub use detector::Detector;
