pub mod device;
pub mod ingestor;
pub mod session;

pub use device::{AudioDevice, DeviceError};
pub use ingestor::{IngestStats, IngestorHandle, Step, StreamIngestor};
pub use session::{SessionError, StreamSession};
