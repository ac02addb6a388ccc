//! Consumer-facing source called once per device period.
//!
//! `fill` always populates the whole output buffer. Buffered source audio is
//! preferred; with an empty ring the tone generator is used instead; mute or
//! a disabled synthesizer yields silence. Output lengths need not be frame
//! aligned: the unsent tail of a frame is parked in a [`PartialFrameCarry`]
//! and delivered first on the next call.

use std::collections::TryReserveError;
use std::sync::Arc;

use crate::audio::controls::Controls;
use crate::audio::ring::CircularAudioBuffer;
use crate::audio::tone::ToneSynthesizer;
use crate::core::format::AudioFormat;

/// Tail of a frame that did not fit into the previous output buffer
#[derive(Debug)]
pub struct PartialFrameCarry {
    frame: Box<[u8]>,
    pending: usize, // unsent bytes, always at the end of `frame`
}

impl PartialFrameCarry {
    fn new(frame_size: usize) -> Result<Self, TryReserveError> {
        let mut frame = Vec::new();
        frame.try_reserve_exact(frame_size)?;
        frame.resize(frame_size, 0u8);
        Ok(Self {
            frame: frame.into_boxed_slice(),
            pending: 0,
        })
    }

    /// Bytes still owed from the last frame
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Move as much of the pending tail as fits into the front of `out`
    fn drain_into(&mut self, out: &mut [u8]) -> usize {
        let count = self.pending.min(out.len());
        let start = self.frame.len() - self.pending;
        out[..count].copy_from_slice(&self.frame[start..start + count]);
        self.frame[start..start + count].fill(0);
        self.pending -= count;
        count
    }

    /// Hand out the head of the staged frame and keep the rest pending
    fn split_off_head(&mut self, out: &mut [u8]) {
        let count = out.len();
        out.copy_from_slice(&self.frame[..count]);
        self.frame[..count].fill(0);
        self.pending = self.frame.len() - count;
    }
}

/// Where the frames of one period come from
enum Feed<'a> {
    Ring(&'a CircularAudioBuffer),
    Tone,
}

/// Render whole frames into `buf` from `feed`; ring shortfall becomes silence
fn render(feed: &Feed<'_>, tone: &mut ToneSynthesizer, buf: &mut [u8], frame_size: usize) {
    match feed {
        Feed::Ring(ring) => {
            let produced = ring.read(buf);
            buf[produced..].fill(0);
        }
        Feed::Tone => {
            for frame in buf.chunks_exact_mut(frame_size) {
                tone.produce_frame(frame);
            }
        }
    }
}

/// Period-driven audio source: ring buffer first, sine tone as fallback
pub struct SineSource {
    format: AudioFormat,
    tone: ToneSynthesizer,
    ring: Option<Arc<CircularAudioBuffer>>,
    carry: PartialFrameCarry,
    controls: Arc<Controls>,
}

impl SineSource {
    pub fn new(
        tone: ToneSynthesizer,
        ring: Option<Arc<CircularAudioBuffer>>,
        controls: Arc<Controls>,
    ) -> Result<Self, TryReserveError> {
        let format = *tone.format();
        Ok(Self {
            format,
            carry: PartialFrameCarry::new(format.frame_size())?,
            tone,
            ring,
            controls,
        })
    }

    /// Tone-only source with its own controls
    pub fn tone_only(tone: ToneSynthesizer) -> Result<Self, TryReserveError> {
        Self::new(tone, None, Arc::new(Controls::default()))
    }

    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    pub fn controls(&self) -> &Arc<Controls> {
        &self.controls
    }

    pub fn carry(&self) -> &PartialFrameCarry {
        &self.carry
    }

    pub fn tone(&self) -> &ToneSynthesizer {
        &self.tone
    }

    /// Populate all of `out` for one device period. Never fails.
    pub fn fill(&mut self, out: &mut [u8]) {
        // Mute and disable win over buffered audio and leave all state untouched
        if self.controls.silenced() {
            out.fill(0);
            return;
        }

        let Self {
            format,
            tone,
            ring,
            carry,
            ..
        } = self;
        let frame_size = format.frame_size();

        let drained = carry.drain_into(out);
        let rest = &mut out[drained..];
        if rest.is_empty() {
            return;
        }

        let feed = match ring.as_deref() {
            Some(ring) if !ring.is_empty() => Feed::Ring(ring),
            _ => Feed::Tone,
        };

        let aligned = rest.len() / frame_size * frame_size;
        let (frames, tail) = rest.split_at_mut(aligned);
        render(&feed, tone, frames, frame_size);

        if !tail.is_empty() {
            render(&feed, tone, &mut carry.frame, frame_size);
            carry.split_off_head(tail);
        }
    }
}
