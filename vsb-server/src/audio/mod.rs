//! Audio subsystem: decoding, resampling and device output

pub mod backend;
pub mod decoder;
pub mod output;
pub mod resampler;
pub mod types;

pub use backend::{AudioBackend, NullBackend, OutputStream};
pub use output::CpalBackend;
pub use types::{AudioFrame, Clip};
