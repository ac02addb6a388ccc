//! Sine tone generator producing frames of the target format.

use std::f64::consts::TAU;

use crate::audio::codec::{float_to_i16, float_to_i24_bytes, float_to_i32_wide, float_to_u8};
use crate::core::format::AudioFormat;

/// Oscillator settings supplied at initialization
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneParams {
    pub frequency_hz: u32,
    pub amplitude: f64,
    pub dc_offset: f64,
    pub initial_phase: f64, // radians
}

impl Default for ToneParams {
    fn default() -> Self {
        Self {
            frequency_hz: 1000,
            amplitude: 0.5,
            dc_offset: 0.0,
            initial_phase: 0.0,
        }
    }
}

/// Error type for oscillator setup
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToneError {
    #[error("Tone frequency {frequency} Hz must be below the sample rate {sample_rate} Hz")]
    FrequencyTooHigh { frequency: u32, sample_rate: u32 },
    #[error("Tone parameter {0} is not finite")]
    NotFinite(&'static str),
}

/// Mono sine oscillator written identically into every channel of a frame
#[derive(Debug, Clone)]
pub struct ToneSynthesizer {
    format: AudioFormat,
    theta: f64,
    sample_increment: f64,
    amplitude: f64,
    dc_offset: f64,
}

impl ToneSynthesizer {
    pub fn new(format: AudioFormat, params: ToneParams) -> Result<Self, ToneError> {
        for (name, value) in [
            ("amplitude", params.amplitude),
            ("dc_offset", params.dc_offset),
            ("initial_phase", params.initial_phase),
        ] {
            if !value.is_finite() {
                return Err(ToneError::NotFinite(name));
            }
        }
        // A single subtraction of 2*pi keeps theta in range only if the step is below 2*pi
        if params.frequency_hz >= format.sample_rate() {
            return Err(ToneError::FrequencyTooHigh {
                frequency: params.frequency_hz,
                sample_rate: format.sample_rate(),
            });
        }

        Ok(Self {
            format,
            theta: params.initial_phase.rem_euclid(TAU),
            sample_increment: params.frequency_hz as f64 * TAU / format.sample_rate() as f64,
            amplitude: params.amplitude,
            dc_offset: params.dc_offset,
        })
    }

    /// Current phase in radians, always in [0, 2*pi)
    pub fn theta(&self) -> f64 {
        self.theta
    }

    pub fn sample_increment(&self) -> f64 {
        self.sample_increment
    }

    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    /// Write the next frame into `frame` and advance the phase.
    ///
    /// A frame of the wrong size is zeroed and the phase is left untouched.
    pub fn produce_frame(&mut self, frame: &mut [u8]) {
        if frame.len() != self.format.frame_size() {
            frame.fill(0);
            return;
        }

        let value = self.amplitude * self.theta.sin() + self.dc_offset;
        let width = self.format.bytes_per_sample();
        for slot in frame.chunks_exact_mut(width) {
            match width {
                1 => slot[0] = float_to_u8(value),
                2 => slot.copy_from_slice(&float_to_i16(value).to_le_bytes()),
                3 => slot.copy_from_slice(&float_to_i24_bytes(value)),
                _ => slot.copy_from_slice(&float_to_i32_wide(value).to_le_bytes()),
            }
        }

        self.theta += self.sample_increment;
        if self.theta >= TAU {
            self.theta -= TAU;
        }
    }
}
