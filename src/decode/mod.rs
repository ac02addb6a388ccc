pub mod wave;

pub use wave::{DecodeError, SourceStream, WaveSource};
