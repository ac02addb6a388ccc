//! cpal output adapter.
//!
//! The device period callback asks the [`SineSource`] for exactly the bytes
//! the period needs, then decodes them into the sample type cpal was opened
//! with. The byte scratch is allocated once when the stream is built; a
//! period larger than the scratch is rendered in scratch-sized pieces.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, SizedSample, Stream, StreamConfig};
use tracing::{error, info};

use crate::audio::source::SineSource;
use crate::core::format::AudioFormat;

/// Frames rendered per scratch fill
const SCRATCH_FRAMES: usize = 4096;

/// Error type for audio output
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("No audio output device available")]
    NoDevice,
    #[error("cpal build stream error: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error("cpal play stream error: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
    #[error("cpal pause stream error: {0}")]
    PauseStream(#[from] cpal::PauseStreamError),
}

/// Default output device playing a [`SineSource`]
pub struct AudioDevice {
    _host: Host,
    device: Device,
    stream_config: StreamConfig,
    format: AudioFormat,
    source: Arc<Mutex<SineSource>>,
    stream: Option<Stream>,
}

impl AudioDevice {
    /// Open the default output device in the source's format
    pub fn new(source: SineSource) -> Result<Self, DeviceError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(DeviceError::NoDevice)?;

        let format = *source.format();
        let stream_config = StreamConfig {
            channels: format.channels(),
            sample_rate: cpal::SampleRate(format.sample_rate()),
            buffer_size: cpal::BufferSize::Default,
        };
        info!(
            device = %device.name().unwrap_or_default(),
            channels = format.channels(),
            sample_rate = format.sample_rate(),
            bits = format.bits_per_sample(),
            "Opened audio output"
        );

        Ok(Self {
            _host: host,
            device,
            stream_config,
            format,
            source: Arc::new(Mutex::new(source)),
            stream: None,
        })
    }

    /// Start or resume playback
    pub fn play(&mut self) -> Result<(), DeviceError> {
        if let Some(stream) = &self.stream {
            stream.play()?;
            return Ok(());
        }

        let stream = match self.format.bits_per_sample() {
            8 => self.build_stream::<u8>(decode_u8)?,
            16 => self.build_stream::<i16>(decode_i16)?,
            24 => self.build_stream::<i32>(decode_i24)?,
            _ => self.build_stream::<i32>(decode_i32)?,
        };
        stream.play()?;
        self.stream = Some(stream);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), DeviceError> {
        if let Some(stream) = &self.stream {
            stream.pause()?;
        }
        Ok(())
    }

    /// Drop the device stream. A later `play` builds a new one.
    pub fn stop(&mut self) {
        self.stream.take();
    }

    pub fn is_playing(&self) -> bool {
        self.stream.is_some()
    }

    fn build_stream<T>(&self, decode: fn(&[u8]) -> T) -> Result<Stream, DeviceError>
    where
        T: SizedSample + Send + 'static,
    {
        let source = Arc::clone(&self.source);
        let width = self.format.bytes_per_sample();
        let mut scratch = vec![0u8; SCRATCH_FRAMES * self.format.frame_size()];

        let stream = self.device.build_output_stream(
            &self.stream_config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut source = match source.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                render_period(&mut source, &mut scratch, width, data, decode);
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )?;
        Ok(stream)
    }
}

/// Fill `data` from the source, at most one scratch buffer at a time.
///
/// `scratch` must hold at least one sample of `width` bytes.
fn render_period<T>(
    source: &mut SineSource,
    scratch: &mut [u8],
    width: usize,
    data: &mut [T],
    decode: fn(&[u8]) -> T,
) {
    let per_piece = (scratch.len() / width).max(1);
    for piece in data.chunks_mut(per_piece) {
        let bytes = &mut scratch[..piece.len() * width];
        source.fill(bytes);
        for (out, sample) in piece.iter_mut().zip(bytes.chunks_exact(width)) {
            *out = decode(sample);
        }
    }
}

fn decode_u8(bytes: &[u8]) -> u8 {
    bytes[0]
}

fn decode_i16(bytes: &[u8]) -> i16 {
    i16::from_le_bytes([bytes[0], bytes[1]])
}

/// Packed 24-bit sample placed in the high bits of an i32
fn decode_i24(bytes: &[u8]) -> i32 {
    i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]])
}

fn decode_i32(bytes: &[u8]) -> i32 {
    i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::tone::{ToneParams, ToneSynthesizer};

    #[test]
    fn test_decode_sample_widths() {
        assert_eq!(decode_u8(&[200]), 200);
        assert_eq!(decode_i16(&(-1234i16).to_le_bytes()), -1234);
        assert_eq!(decode_i32(&i32::MIN.to_le_bytes()), i32::MIN);
    }

    #[test]
    fn test_large_period_renders_in_pieces() {
        let tone = || {
            ToneSynthesizer::new(
                AudioFormat::pcm(2, 16, 48_000).unwrap(),
                ToneParams {
                    frequency_hz: 440,
                    amplitude: 0.5,
                    dc_offset: 0.0,
                    initial_phase: 0.0,
                },
            )
            .unwrap()
        };

        let mut reference = SineSource::tone_only(tone()).unwrap();
        let mut expected = vec![0u8; 22];
        reference.fill(&mut expected);
        let expected: Vec<i16> = expected.chunks_exact(2).map(decode_i16).collect();

        // Three samples of scratch against an eleven sample period
        let mut source = SineSource::tone_only(tone()).unwrap();
        let mut scratch = [0u8; 6];
        let mut data = [0i16; 11];
        render_period(&mut source, &mut scratch, 2, &mut data, decode_i16);
        assert_eq!(data.to_vec(), expected);
    }

    #[test]
    fn test_decode_24_bit_keeps_sign() {
        // -2 as packed 24-bit little endian
        assert_eq!(decode_i24(&[0xFE, 0xFF, 0xFF]), -2 << 8);
        assert_eq!(decode_i24(&[0xFF, 0xFF, 0x7F]), 0x7FFF_FF00);
    }
}
