pub mod codec;
pub mod controls;
pub mod ring;
pub mod source;
pub mod tone;

pub use codec::{CodecError, Conversion, FrameCodec};
pub use controls::Controls;
pub use ring::CircularAudioBuffer;
pub use source::{PartialFrameCarry, SineSource};
pub use tone::{ToneError, ToneParams, ToneSynthesizer};
