//! Background producer: reads source chunks, converts them to the target
//! format and pushes them into the ring buffer.
//!
//! The loop never blocks inside the ring's lock. When the ring is too full
//! for another chunk it simply waits out one pacing interval and tries again.
//! Shutdown is cooperative: dropping the handle disconnects the stop channel,
//! which the loop observes between iterations.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{debug, error, info, trace, warn};

use crate::audio::codec::FrameCodec;
use crate::audio::ring::CircularAudioBuffer;
use crate::decode::wave::{DecodeError, SourceStream};

/// Source frames read per chunk
pub const DEFAULT_CHUNK_FRAMES: usize = 1024;

/// Wait between iterations
pub const DEFAULT_PACE: Duration = Duration::from_millis(10);

/// Counters reported when the ingestion thread exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub chunks_read: u64,
    pub chunks_dropped: u64,
    pub bytes_accepted: u64,
    pub loops: u64, // times the source was rewound at end of data
}

/// Outcome of one ingestion iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Not enough free space for a chunk, nothing done
    Idle,
    /// Bytes accepted by the ring
    Ingested(usize),
    /// Chunk rejected by the codec and discarded
    Dropped,
    /// End of data reached, source rewound
    Rewound,
    /// Source holds no sample data at all
    Finished,
}

/// Producer side of a stream session
pub struct StreamIngestor {
    source: Box<dyn SourceStream>,
    codec: FrameCodec,
    ring: Arc<CircularAudioBuffer>,
    chunk_frames: usize,
    read_buf: Vec<u8>,
    pending: Vec<u8>, // whole source frames not yet accepted by the ring
    scratch: Vec<u8>,
    stats: IngestStats,
    rewound_empty: bool,
    reported_mismatch: bool,
}

impl StreamIngestor {
    pub fn new(source: Box<dyn SourceStream>, ring: Arc<CircularAudioBuffer>, chunk_frames: usize) -> Self {
        Self {
            codec: FrameCodec::new(*ring.format()),
            read_buf: Vec::new(), // sized from the source descriptor on each read
            pending: Vec::new(),
            scratch: vec![0u8; ring.capacity_bytes()],
            source,
            ring,
            chunk_frames,
            stats: IngestStats::default(),
            rewound_empty: false,
            reported_mismatch: false,
        }
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// Run one iteration of the ingestion loop
    pub fn step(&mut self) -> Result<Step, DecodeError> {
        let descriptor = self.source.descriptor();
        let src_frame = descriptor.frame_size();
        if src_frame == 0 {
            return Err(DecodeError::UnsupportedFormat {
                kind: descriptor.kind,
                channels: descriptor.channels,
                bits: descriptor.bits_per_sample,
            });
        }

        if self.pending.is_empty() {
            if self.ring.free_frame_count() < self.chunk_frames {
                return Ok(Step::Idle);
            }

            self.read_buf.resize(self.chunk_frames * src_frame, 0);
            let read = self.source.read_chunk(&mut self.read_buf)?;
            let whole = read / src_frame * src_frame;
            if whole == 0 {
                if self.rewound_empty {
                    return Ok(Step::Finished);
                }
                self.source.rewind()?;
                self.rewound_empty = true;
                self.stats.loops += 1;
                trace!("Source stream looped");
                return Ok(Step::Rewound);
            }

            self.rewound_empty = false;
            self.stats.chunks_read += 1;
            self.pending.extend_from_slice(&self.read_buf[..whole]);
        }

        let dst_frame = self.ring.format().frame_size();
        let budget = (self.ring.free_bytes() / dst_frame * dst_frame).min(self.scratch.len());
        if budget == 0 {
            return Ok(Step::Idle);
        }

        let conversion = match self.codec.convert(&descriptor, &self.pending, &mut self.scratch[..budget]) {
            Ok(conversion) => conversion,
            Err(e) => {
                if !self.reported_mismatch {
                    warn!(error = %e, "Dropping source chunk");
                    self.reported_mismatch = true;
                } else {
                    trace!(error = %e, "Dropping source chunk");
                }
                self.stats.chunks_dropped += 1;
                self.pending.clear();
                return Ok(Step::Dropped);
            }
        };

        let accepted = self.ring.write(&self.scratch[..conversion.produced]);
        let frames = accepted / dst_frame;
        self.pending.drain(..frames * src_frame);
        self.stats.bytes_accepted += accepted as u64;
        Ok(Step::Ingested(accepted))
    }

    /// Move the loop onto its own thread
    pub fn spawn(self, pace: Duration) -> std::io::Result<IngestorHandle> {
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("wave-ingest".into())
            .spawn(move || self.run(&stop_rx, pace))?;

        Ok(IngestorHandle {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    fn run(mut self, stop_rx: &Receiver<()>, pace: Duration) -> IngestStats {
        debug!("Ingestion thread started");

        loop {
            match stop_rx.try_recv() {
                Err(TryRecvError::Empty) => {}
                _ => break,
            }

            match self.step() {
                Ok(Step::Rewound) => continue,
                Ok(Step::Finished) => {
                    info!("Source stream has no sample data; tone fallback only");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "Source stream unavailable; tone fallback only");
                    break;
                }
            }

            match stop_rx.recv_timeout(pace) {
                Err(RecvTimeoutError::Timeout) => {}
                _ => break,
            }
        }

        debug!(stats = ?self.stats, "Ingestion thread finished");
        self.stats
    }
}

/// Owner of the ingestion thread. Dropping it stops and joins the thread.
pub struct IngestorHandle {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<IngestStats>>,
}

impl IngestorHandle {
    pub fn is_alive(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Stop the thread and collect its counters
    pub fn stop(mut self) -> Option<IngestStats> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Option<IngestStats> {
        // Disconnect first so the loop's wait returns, then join
        drop(self.stop_tx.take());

        let handle = self.handle.take()?;
        match handle.join() {
            Ok(stats) => Some(stats),
            Err(_) => {
                warn!("Ingestion thread panicked");
                None
            }
        }
    }
}

impl Drop for IngestorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::format::{AudioFormat, SampleKind, SourceStreamDescriptor};
    use crate::decode::wave::WaveSource;

    /// In-memory source that loops over a fixed byte image
    struct MemorySource {
        descriptor: SourceStreamDescriptor,
        data: Vec<u8>,
        position: usize,
        fail: bool,
    }

    impl MemorySource {
        fn new(channels: u16, bits: u16, rate: u32, data: Vec<u8>) -> Box<Self> {
            Box::new(Self {
                descriptor: SourceStreamDescriptor {
                    sample_rate: rate,
                    channels,
                    bits_per_sample: bits,
                    kind: SampleKind::Integer,
                },
                data,
                position: 0,
                fail: false,
            })
        }
    }

    impl SourceStream for MemorySource {
        fn descriptor(&self) -> SourceStreamDescriptor {
            self.descriptor
        }

        fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, DecodeError> {
            if self.fail {
                return Err(DecodeError::Io(std::io::Error::other("device gone")));
            }
            let count = buf.len().min(self.data.len() - self.position);
            buf[..count].copy_from_slice(&self.data[self.position..self.position + count]);
            self.position += count;
            Ok(count)
        }

        fn rewind(&mut self) -> Result<(), DecodeError> {
            self.position = 0;
            Ok(())
        }
    }

    fn ring(channels: u16, bits: u16, frames: usize) -> Arc<CircularAudioBuffer> {
        let format = AudioFormat::pcm(channels, bits, 48_000).unwrap();
        Arc::new(CircularAudioBuffer::new(format, frames).unwrap())
    }

    #[test]
    fn test_step_moves_chunk_into_ring() {
        let data: Vec<u8> = (0..16).collect();
        let ring = ring(2, 16, 8);
        let mut ingestor = StreamIngestor::new(MemorySource::new(2, 16, 48_000, data.clone()), ring.clone(), 2);

        assert_eq!(ingestor.step().unwrap(), Step::Ingested(8));
        assert_eq!(ring.used_bytes(), 8);

        let mut out = [0u8; 8];
        ring.read(&mut out);
        assert_eq!(&out[..], &data[..8]);
        assert_eq!(ingestor.stats().chunks_read, 1);
    }

    #[test]
    fn test_idle_when_ring_lacks_room_for_a_chunk() {
        let ring = ring(1, 16, 4);
        let data = vec![1u8; 64];
        let mut ingestor = StreamIngestor::new(MemorySource::new(1, 16, 48_000, data), ring.clone(), 3);

        assert_eq!(ingestor.step().unwrap(), Step::Ingested(6));
        assert_eq!(ingestor.step().unwrap(), Step::Idle);
        assert_eq!(ring.used_frame_count(), 3);
    }

    #[test]
    fn test_rate_mismatch_drops_chunk() {
        let ring = ring(2, 16, 8);
        let mut ingestor = StreamIngestor::new(MemorySource::new(2, 16, 44_100, vec![5u8; 16]), ring.clone(), 2);

        assert_eq!(ingestor.step().unwrap(), Step::Dropped);
        assert_eq!(ingestor.step().unwrap(), Step::Dropped);
        assert_eq!(ring.used_bytes(), 0);
        assert_eq!(ingestor.stats().chunks_dropped, 2);
    }

    #[test]
    fn test_24_bit_layout_change_drops_chunk() {
        let ring = ring(2, 16, 8);
        let mut ingestor = StreamIngestor::new(MemorySource::new(1, 24, 48_000, vec![0u8; 12]), ring.clone(), 2);

        assert_eq!(ingestor.step().unwrap(), Step::Dropped);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_downmixes_into_ring() {
        let ring = ring(1, 16, 8);
        let data: Vec<u8> = [1000i16, 3000, -500, 500].iter().flat_map(|s| s.to_le_bytes()).collect();
        let mut ingestor = StreamIngestor::new(MemorySource::new(2, 16, 48_000, data), ring.clone(), 2);

        assert_eq!(ingestor.step().unwrap(), Step::Ingested(4));
        let mut out = [0u8; 4];
        ring.read(&mut out);
        assert_eq!(i16::from_le_bytes([out[0], out[1]]), 2000);
        assert_eq!(i16::from_le_bytes([out[2], out[3]]), 0);
    }

    #[test]
    fn test_end_of_data_loops_back() {
        let ring = ring(1, 8, 64);
        let mut ingestor = StreamIngestor::new(MemorySource::new(1, 8, 48_000, vec![1, 2, 3]), ring.clone(), 2);

        assert_eq!(ingestor.step().unwrap(), Step::Ingested(2));
        assert_eq!(ingestor.step().unwrap(), Step::Ingested(1));
        assert_eq!(ingestor.step().unwrap(), Step::Rewound);
        assert_eq!(ingestor.step().unwrap(), Step::Ingested(2));

        let mut out = [0u8; 5];
        assert_eq!(ring.read(&mut out), 5);
        assert_eq!(out, [1, 2, 3, 1, 2]);
        assert_eq!(ingestor.stats().loops, 1);
    }

    #[test]
    fn test_trailing_partial_frame_is_discarded() {
        let ring = ring(2, 16, 8);
        // One whole stereo frame plus three stray bytes
        let mut ingestor = StreamIngestor::new(MemorySource::new(2, 16, 48_000, vec![9u8; 7]), ring.clone(), 4);

        assert_eq!(ingestor.step().unwrap(), Step::Ingested(4));
        assert_eq!(ring.used_bytes(), 4);
    }

    #[test]
    fn test_empty_source_finishes() {
        let ring = ring(1, 8, 8);
        let mut ingestor = StreamIngestor::new(MemorySource::new(1, 8, 48_000, Vec::new()), ring, 2);

        assert_eq!(ingestor.step().unwrap(), Step::Rewound);
        assert_eq!(ingestor.step().unwrap(), Step::Finished);
    }

    #[test]
    fn test_empty_data_chunk_with_trailing_metadata_finishes() {
        // RIFF header, 16-bit mono fmt, zero-length data, then a LIST chunk
        let mut body = Vec::new();
        body.extend_from_slice(b"WAVEfmt ");
        body.extend_from_slice(&16u32.to_le_bytes());
        body.extend_from_slice(&1u16.to_le_bytes());
        body.extend_from_slice(&1u16.to_le_bytes());
        body.extend_from_slice(&48_000u32.to_le_bytes());
        body.extend_from_slice(&96_000u32.to_le_bytes());
        body.extend_from_slice(&2u16.to_le_bytes());
        body.extend_from_slice(&16u16.to_le_bytes());
        body.extend_from_slice(b"data");
        body.extend_from_slice(&0u32.to_le_bytes());
        body.extend_from_slice(b"LIST");
        body.extend_from_slice(&4u32.to_le_bytes());
        body.extend_from_slice(b"INFO");
        let mut image = b"RIFF".to_vec();
        image.extend_from_slice(&(body.len() as u32).to_le_bytes());
        image.extend_from_slice(&body);

        let wave = WaveSource::new(std::io::Cursor::new(image)).unwrap();
        let ring = ring(1, 16, 8);
        let mut ingestor = StreamIngestor::new(Box::new(wave), ring.clone(), 2);

        assert_eq!(ingestor.step().unwrap(), Step::Rewound);
        assert_eq!(ingestor.step().unwrap(), Step::Finished);
        assert!(ring.is_empty());
        assert_eq!(ingestor.stats().bytes_accepted, 0);
    }

    #[test]
    fn test_read_failure_is_reported() {
        let ring = ring(1, 8, 8);
        let mut source = MemorySource::new(1, 8, 48_000, vec![1; 8]);
        source.fail = true;
        let mut ingestor = StreamIngestor::new(source, ring, 2);
        assert!(matches!(ingestor.step(), Err(DecodeError::Io(_))));
    }

    #[test]
    fn test_thread_fills_ring_and_stops_on_drop() {
        let ring = ring(1, 8, 32);
        let data: Vec<u8> = (0..40).collect();
        let handle = StreamIngestor::new(MemorySource::new(1, 8, 48_000, data), ring.clone(), 8)
            .spawn(Duration::from_millis(1))
            .unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while ring.free_frame_count() >= 8 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(ring.free_frame_count() < 8);
        assert!(handle.is_alive());

        let stats = handle.stop().unwrap();
        assert!(stats.chunks_read >= 3);
        assert_eq!(stats.chunks_dropped, 0);
    }

    #[test]
    fn test_thread_exits_when_source_fails() {
        let ring = ring(1, 8, 32);
        let mut source = MemorySource::new(1, 8, 48_000, vec![1; 8]);
        source.fail = true;
        let handle = StreamIngestor::new(source, ring, 8).spawn(Duration::from_millis(1)).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while handle.is_alive() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!handle.is_alive());
        assert_eq!(handle.stop(), Some(IngestStats::default()));
    }
}
