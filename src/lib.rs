//! Software audio source: a WAVE stream pumped through a ring buffer, with a
//! sine tone filling in whenever no buffered audio is available.

pub mod audio;
pub mod config;
pub mod core;
pub mod decode;
pub mod playback;

pub use config::EngineConfig;
