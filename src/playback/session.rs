//! Stream session: owns the shared ring and the ingestion thread.
//!
//! A session validates the target format and tone parameters, allocates the
//! ring buffer and frame carry up front, and starts the producer only when a
//! source stream is present. The consumer half is handed back as a
//! [`SineSource`] for whoever drives the device period.

use std::collections::TryReserveError;
use std::sync::Arc;

use tracing::{info, warn};

use crate::audio::controls::Controls;
use crate::audio::ring::CircularAudioBuffer;
use crate::audio::source::SineSource;
use crate::audio::tone::{ToneError, ToneSynthesizer};
use crate::config::EngineConfig;
use crate::core::format::{AudioFormat, FormatError};
use crate::decode::wave::{SourceStream, WaveSource};
use crate::playback::ingestor::{IngestStats, IngestorHandle, StreamIngestor};

/// Error type for session setup
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Format error: {0}")]
    Format(#[from] FormatError),
    #[error("Invalid tone parameters: {0}")]
    InvalidTone(#[from] ToneError),
    #[error("Buffer allocation failed: {0}")]
    Allocation(#[from] TryReserveError),
    #[error("Invalid stream settings: {0}")]
    InvalidStream(&'static str),
    #[error("Failed to spawn ingestion thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Running producer/consumer pair around one ring buffer
pub struct StreamSession {
    format: AudioFormat,
    ring: Arc<CircularAudioBuffer>,
    controls: Arc<Controls>,
    ingestor: Option<IngestorHandle>,
}

impl StreamSession {
    /// Initialize a session, optionally fed by `source`
    pub fn start(
        config: &EngineConfig,
        source: Option<Box<dyn SourceStream>>,
    ) -> Result<(Self, SineSource), SessionError> {
        let format = config.format.audio_format()?;
        let tone = ToneSynthesizer::new(format, config.tone.params())?;

        let stream = &config.stream;
        if stream.chunk_frames == 0 {
            return Err(SessionError::InvalidStream("chunk_frames must be at least 1"));
        }
        if stream.ring_frames < stream.chunk_frames {
            return Err(SessionError::InvalidStream("ring_frames must hold at least one chunk"));
        }

        let ring = Arc::new(CircularAudioBuffer::new(format, stream.ring_frames)?);
        let controls = Arc::new(Controls::new(stream.start_muted, stream.disable_synthesis));
        let sine = SineSource::new(tone, Some(ring.clone()), controls.clone())?;

        let ingestor = match source {
            Some(source) => {
                let descriptor = source.descriptor();
                info!(
                    source_rate = descriptor.sample_rate,
                    source_channels = descriptor.channels,
                    source_bits = descriptor.bits_per_sample,
                    "Starting source ingestion"
                );
                let handle = StreamIngestor::new(source, ring.clone(), stream.chunk_frames)
                    .spawn(stream.pace())
                    .map_err(SessionError::Spawn)?;
                Some(handle)
            }
            None => None,
        };

        info!(
            channels = format.channels(),
            bits = format.bits_per_sample(),
            sample_rate = format.sample_rate(),
            frequency_hz = config.tone.frequency_hz,
            ring_frames = stream.ring_frames,
            "Stream session started"
        );

        Ok((
            Self {
                format,
                ring,
                controls,
                ingestor,
            },
            sine,
        ))
    }

    /// Initialize a session from the configured WAVE path.
    ///
    /// A source that cannot be opened is logged and skipped; the session then
    /// produces the tone only.
    pub fn open(config: &EngineConfig) -> Result<(Self, SineSource), SessionError> {
        let source = config.stream.source.as_ref().and_then(|path| match WaveSource::open(path) {
            Ok(wave) => {
                info!(path = %path.display(), "Opened source stream");
                Some(Box::new(wave) as Box<dyn SourceStream>)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Source stream unavailable; using tone only");
                None
            }
        });
        Self::start(config, source)
    }

    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    pub fn ring(&self) -> &Arc<CircularAudioBuffer> {
        &self.ring
    }

    pub fn controls(&self) -> &Arc<Controls> {
        &self.controls
    }

    /// True while the ingestion thread is running
    pub fn is_ingesting(&self) -> bool {
        self.ingestor.as_ref().map(IngestorHandle::is_alive).unwrap_or(false)
    }

    /// Stop ingestion and return its counters (None for tone-only sessions)
    pub fn stop(mut self) -> Option<IngestStats> {
        let stats = self.ingestor.take()?.stop();
        if let Some(stats) = &stats {
            info!(?stats, "Stream session stopped");
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::{Duration, Instant};

    fn wave_bytes(channels: u16, sample_rate: u32, samples: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &sample in samples {
                writer.write_sample(sample).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn small_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.stream.ring_frames = 64;
        config.stream.chunk_frames = 16;
        config.stream.pace_ms = 1;
        config
    }

    fn wait_for(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
        let end = Instant::now() + deadline;
        while Instant::now() < end {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        done()
    }

    #[test]
    fn test_tone_only_session() {
        let (session, mut sine) = StreamSession::start(&EngineConfig::default(), None).unwrap();
        assert!(!session.is_ingesting());

        let mut out = vec![0u8; 8];
        sine.fill(&mut out);
        assert_eq!(&out[..4], &[0, 0, 0, 0]);
        assert_ne!(&out[4..], &[0, 0, 0, 0]);
        assert_eq!(session.stop(), None);
    }

    #[test]
    fn test_source_data_reaches_the_consumer() {
        let samples: Vec<i16> = (1..=32).map(|n| n * 100).collect();
        let wave = WaveSource::new(Cursor::new(wave_bytes(2, 48_000, &samples))).unwrap();
        let (session, mut sine) = StreamSession::start(&small_config(), Some(Box::new(wave))).unwrap();

        let ring = session.ring().clone();
        assert!(wait_for(Duration::from_secs(5), || ring.used_frame_count() >= 16));

        let mut out = vec![0u8; 64];
        sine.fill(&mut out);
        let expected: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        assert_eq!(out, expected);

        let stats = session.stop().unwrap();
        assert!(stats.chunks_read >= 1);
        assert_eq!(stats.chunks_dropped, 0);
    }

    #[test]
    fn test_rate_mismatch_falls_back_to_tone() {
        let wave = WaveSource::new(Cursor::new(wave_bytes(2, 44_100, &[500; 64]))).unwrap();
        let (session, mut sine) = StreamSession::start(&small_config(), Some(Box::new(wave))).unwrap();

        let ring = session.ring().clone();
        std::thread::sleep(Duration::from_millis(20));
        assert!(ring.is_empty());

        let (_, mut reference) = StreamSession::start(&small_config(), None).unwrap();
        let mut out = vec![0u8; 40];
        let mut expected = vec![0u8; 40];
        sine.fill(&mut out);
        reference.fill(&mut expected);
        assert_eq!(out, expected);

        assert!(session.stop().unwrap().chunks_dropped >= 1);
    }

    #[test]
    fn test_start_muted() {
        let mut config = EngineConfig::default();
        config.stream.start_muted = true;
        let (session, mut sine) = StreamSession::start(&config, None).unwrap();
        assert!(session.controls().is_muted());

        let mut out = vec![0xAAu8; 12];
        sine.fill(&mut out);
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_rejects_bad_settings() {
        let mut config = EngineConfig::default();
        config.format.bits_per_sample = 20;
        assert!(matches!(
            StreamSession::start(&config, None),
            Err(SessionError::Format(FormatError::UnsupportedBitDepth(20)))
        ));

        let mut config = EngineConfig::default();
        config.tone.frequency_hz = 48_000;
        assert!(matches!(
            StreamSession::start(&config, None),
            Err(SessionError::InvalidTone(_))
        ));

        let mut config = EngineConfig::default();
        config.stream.ring_frames = 100;
        assert!(matches!(
            StreamSession::start(&config, None),
            Err(SessionError::InvalidStream(_))
        ));
    }

    #[test]
    fn test_huge_ring_is_an_allocation_error() {
        let mut config = EngineConfig::default();
        config.stream.ring_frames = usize::MAX;
        assert!(matches!(
            StreamSession::start(&config, None),
            Err(SessionError::Allocation(_))
        ));
    }

    #[test]
    fn test_open_missing_source_runs_tone_only() {
        let mut config = EngineConfig::default();
        config.stream.source = Some("/nonexistent/loop.wav".into());
        let (session, _sine) = StreamSession::open(&config).unwrap();
        assert!(!session.is_ingesting());
    }
}
