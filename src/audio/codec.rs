//! Conversion of source PCM chunks into the fixed target format.
//!
//! Two paths exist. When channel layout and bit depth match, frames are
//! copied as-is (float sources are rescaled to 32-bit integers first). When
//! they differ, every source frame is averaged to one value and that value is
//! written to every destination channel. Sample rates must always match.

use crate::core::format::{AudioFormat, SampleKind, SourceStreamDescriptor};

/// Error type for chunk conversion. Every variant means the chunk is dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("Sample rate mismatch: source {source_rate} Hz, target {target_rate} Hz")]
    SampleRateMismatch { source_rate: u32, target_rate: u32 },
    #[error("No 24-bit conversion between differing layouts")]
    Unsupported24Bit,
    #[error("Unsupported source encoding: {kind:?} at {bits} bits")]
    UnsupportedSource { kind: SampleKind, bits: u16 },
}

/// Result of converting one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Conversion {
    /// Source bytes turned into output (whole source frames)
    pub consumed: usize,
    /// Bytes written to the destination (whole target frames)
    pub produced: usize,
}

/// Rescale a float sample in [-1.0, 1.0] to the full signed 32-bit range
#[inline]
pub fn float_to_i32(value: f32) -> i32 {
    (value * i32::MAX as f32) as i32
}

/// Float to 16-bit signed
#[inline]
pub fn float_to_i16(value: f64) -> i16 {
    (value * i16::MAX as f64) as i16
}

/// Float to 8-bit unsigned, centered at 127.5
#[inline]
pub fn float_to_u8(value: f64) -> u8 {
    (value * 127.5 + 127.5) as u8
}

/// Float to 32-bit signed
#[inline]
pub fn float_to_i32_wide(value: f64) -> i32 {
    (value * i32::MAX as f64) as i32
}

/// Float to 24-bit signed: the 32-bit encoding shifted down by one byte,
/// stored as three little-endian bytes
#[inline]
pub fn float_to_i24_bytes(value: f64) -> [u8; 3] {
    let wide = float_to_i32_wide(value) >> 8;
    let bytes = wide.to_le_bytes();
    [bytes[0], bytes[1], bytes[2]]
}

/// Converter bound to one target format
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    target: AudioFormat,
}

impl FrameCodec {
    pub fn new(target: AudioFormat) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &AudioFormat {
        &self.target
    }

    /// Convert as many whole frames of `src` as fit into `dst`.
    ///
    /// Stops at the first source frame whose output would not fit. Trailing
    /// bytes of `src` that do not form a whole frame are ignored.
    pub fn convert(
        &self,
        source: &SourceStreamDescriptor,
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<Conversion, CodecError> {
        if source.sample_rate != self.target.sample_rate() {
            return Err(CodecError::SampleRateMismatch {
                source_rate: source.sample_rate,
                target_rate: self.target.sample_rate(),
            });
        }
        if source.kind == SampleKind::Float && source.bits_per_sample != 32 {
            return Err(CodecError::UnsupportedSource {
                kind: source.kind,
                bits: source.bits_per_sample,
            });
        }

        if source.same_layout(&self.target) {
            Ok(self.copy_frames(source, src, dst))
        } else {
            self.downmix_frames(source, src, dst)
        }
    }

    /// Layouts match: copy whole frames, normalizing float samples on the way
    fn copy_frames(&self, source: &SourceStreamDescriptor, src: &[u8], dst: &mut [u8]) -> Conversion {
        let frame_size = self.target.frame_size();
        let frames = (src.len() / frame_size).min(dst.len() / frame_size);
        let bytes = frames * frame_size;

        match source.kind {
            SampleKind::Integer => dst[..bytes].copy_from_slice(&src[..bytes]),
            SampleKind::Float => {
                for (out, sample) in dst[..bytes].chunks_exact_mut(4).zip(src[..bytes].chunks_exact(4)) {
                    let value = f32::from_le_bytes([sample[0], sample[1], sample[2], sample[3]]);
                    out.copy_from_slice(&float_to_i32(value).to_le_bytes());
                }
            }
        }

        Conversion {
            consumed: bytes,
            produced: bytes,
        }
    }

    /// Layouts differ: average each source frame and fan it out to every target channel
    fn downmix_frames(
        &self,
        source: &SourceStreamDescriptor,
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<Conversion, CodecError> {
        if source.bits_per_sample == 24 || self.target.bits_per_sample() == 24 {
            return Err(CodecError::Unsupported24Bit);
        }
        if !matches!(source.bits_per_sample, 8 | 16 | 32) || source.channels == 0 {
            return Err(CodecError::UnsupportedSource {
                kind: source.kind,
                bits: source.bits_per_sample,
            });
        }

        let src_frame = source.frame_size();
        let src_sample = source.bytes_per_sample();
        let dst_frame = self.target.frame_size();
        let dst_sample = self.target.bytes_per_sample();
        let frames = (src.len() / src_frame).min(dst.len() / dst_frame);

        for (in_frame, out_frame) in src
            .chunks_exact(src_frame)
            .zip(dst.chunks_exact_mut(dst_frame))
            .take(frames)
        {
            let total: i64 = in_frame
                .chunks_exact(src_sample)
                .map(|sample| widen(source.kind, sample))
                .sum();
            let mixed = (total / source.channels as i64) as i32;

            for out in out_frame.chunks_exact_mut(dst_sample) {
                narrow(mixed, out);
            }
        }

        Ok(Conversion {
            consumed: frames * src_frame,
            produced: frames * dst_frame,
        })
    }
}

/// Read one sample into the common 32-bit scale, sign-extended to 64 bits
fn widen(kind: SampleKind, sample: &[u8]) -> i64 {
    match (kind, sample.len()) {
        (_, 1) => (sample[0] as i64 - 128) << 24,
        (_, 2) => (i16::from_le_bytes([sample[0], sample[1]]) as i64) << 16,
        (SampleKind::Float, 4) => {
            float_to_i32(f32::from_le_bytes([sample[0], sample[1], sample[2], sample[3]])) as i64
        }
        (SampleKind::Integer, 4) => i32::from_le_bytes([sample[0], sample[1], sample[2], sample[3]]) as i64,
        _ => 0,
    }
}

/// Write a 32-bit scaled value at the destination sample width
fn narrow(value: i32, out: &mut [u8]) {
    match out.len() {
        1 => out[0] = ((value >> 24) + 128) as u8,
        2 => out.copy_from_slice(&((value >> 16) as i16).to_le_bytes()),
        4 => out.copy_from_slice(&value.to_le_bytes()),
        _ => out.fill(0),
    }
}
