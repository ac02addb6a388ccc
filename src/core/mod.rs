//! Core types shared by every subsystem.

pub mod format;

pub use format::{AudioFormat, FormatError, SampleKind, SourceStreamDescriptor};
