//! PCM format descriptions shared by the producer and consumer sides.
//!
//! The target format is fixed for the lifetime of a stream session. Source
//! chunks carry their own descriptor and are compared against it on every
//! ingestion call.

use serde::Deserialize;

/// Bit depths a target or source stream may use
pub const SUPPORTED_BIT_DEPTHS: [u16; 4] = [8, 16, 24, 32];

/// Error type for format validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("Unsupported bit depth: {0} (expected 8, 16, 24 or 32)")]
    UnsupportedBitDepth(u16),
    #[error("Target format must be integer PCM")]
    NotPcm,
    #[error("Channel count must be at least 1")]
    ZeroChannels,
    #[error("Sample rate must be non-zero")]
    ZeroSampleRate,
}

/// Sample encoding of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleKind {
    #[default]
    #[serde(alias = "pcm")]
    Integer,
    Float, // 32-bit IEEE, nominal range [-1.0, 1.0]
}

/// Fixed target format of a stream session (always integer PCM)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    channels: u16,
    bits_per_sample: u16,
    sample_rate: u32,
}

impl AudioFormat {
    /// Create an integer PCM format, rejecting anything the engine cannot produce
    pub fn pcm(channels: u16, bits_per_sample: u16, sample_rate: u32) -> Result<Self, FormatError> {
        if channels == 0 {
            return Err(FormatError::ZeroChannels);
        }
        if !SUPPORTED_BIT_DEPTHS.contains(&bits_per_sample) {
            return Err(FormatError::UnsupportedBitDepth(bits_per_sample));
        }
        if sample_rate == 0 {
            return Err(FormatError::ZeroSampleRate);
        }
        Ok(Self {
            channels,
            bits_per_sample,
            sample_rate,
        })
    }

    /// Create a target format of the given kind. Only integer PCM is accepted.
    pub fn with_kind(
        kind: SampleKind,
        channels: u16,
        bits_per_sample: u16,
        sample_rate: u32,
    ) -> Result<Self, FormatError> {
        match kind {
            SampleKind::Integer => Self::pcm(channels, bits_per_sample, sample_rate),
            SampleKind::Float => Err(FormatError::NotPcm),
        }
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample as usize / 8
    }

    /// Size of one interleaved frame in bytes
    #[inline]
    pub fn frame_size(&self) -> usize {
        self.channels as usize * self.bits_per_sample as usize / 8
    }
}

/// Format of the chunk the producer is about to convert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceStreamDescriptor {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub kind: SampleKind,
}

impl SourceStreamDescriptor {
    /// Describe a source that already matches `format` exactly
    pub fn from_format(format: &AudioFormat) -> Self {
        Self {
            sample_rate: format.sample_rate(),
            channels: format.channels(),
            bits_per_sample: format.bits_per_sample(),
            kind: SampleKind::Integer,
        }
    }

    #[inline]
    pub fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample as usize / 8
    }

    /// Size of one source frame in bytes (zero for a degenerate descriptor)
    #[inline]
    pub fn frame_size(&self) -> usize {
        self.channels as usize * self.bits_per_sample as usize / 8
    }

    /// True when channel layout and bit depth equal the target's
    pub fn same_layout(&self, format: &AudioFormat) -> bool {
        self.channels == format.channels() && self.bits_per_sample == format.bits_per_sample()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_follows_inputs() {
        let format = AudioFormat::pcm(2, 16, 48_000).unwrap();
        assert_eq!(format.frame_size(), 4);

        let format = AudioFormat::pcm(6, 24, 44_100).unwrap();
        assert_eq!(format.frame_size(), 18);
        assert_eq!(format.bytes_per_sample(), 3);
    }

    #[test]
    fn test_rejects_unsupported_targets() {
        assert_eq!(
            AudioFormat::pcm(2, 12, 48_000),
            Err(FormatError::UnsupportedBitDepth(12))
        );
        assert_eq!(AudioFormat::pcm(0, 16, 48_000), Err(FormatError::ZeroChannels));
        assert_eq!(AudioFormat::pcm(2, 16, 0), Err(FormatError::ZeroSampleRate));
        assert_eq!(
            AudioFormat::with_kind(SampleKind::Float, 2, 32, 48_000),
            Err(FormatError::NotPcm)
        );
    }

    #[test]
    fn test_descriptor_layout_comparison() {
        let format = AudioFormat::pcm(2, 16, 48_000).unwrap();
        let mut desc = SourceStreamDescriptor::from_format(&format);
        assert!(desc.same_layout(&format));

        desc.channels = 1;
        assert!(!desc.same_layout(&format));
        assert_eq!(desc.frame_size(), 2);
    }
}
