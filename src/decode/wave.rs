//! WAVE reader feeding raw PCM chunks to the ingestion loop.
//!
//! Header parsing and data-chunk bounds come from `hound`. Samples are handed
//! out re-encoded as little-endian bytes in the file's own layout, so
//! conversion to the target format happens downstream.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader};

use crate::core::format::{SampleKind, SourceStreamDescriptor, SUPPORTED_BIT_DEPTHS};

/// Error type for opening and reading the source stream
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Unsupported sample layout: {kind:?}, {channels} channels, {bits} bits")]
    UnsupportedFormat {
        kind: SampleKind,
        channels: u16,
        bits: u16,
    },
}

/// Sequential, rewindable source of raw PCM chunks
pub trait SourceStream: Send {
    /// Format of every chunk this stream produces
    fn descriptor(&self) -> SourceStreamDescriptor;

    /// Read up to `buf.len()` bytes of sample data. Returns 0 at end of stream.
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, DecodeError>;

    /// Seek back to the first sample byte
    fn rewind(&mut self) -> Result<(), DecodeError>;
}

/// WAVE file positioned inside its `data` chunk
pub struct WaveSource<R> {
    reader: WavReader<R>,
    descriptor: SourceStreamDescriptor,
}

impl<R> fmt::Debug for WaveSource<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaveSource")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl WaveSource<BufReader<File>> {
    /// Open a WAVE file from disk
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DecodeError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DecodeError::FileNotFound(path.to_path_buf()));
        }
        Self::from_reader(WavReader::open(path)?)
    }
}

impl<R: Read + Seek> WaveSource<R> {
    /// Parse the header and stop at the first sample
    pub fn new(reader: R) -> Result<Self, DecodeError> {
        Self::from_reader(WavReader::new(reader)?)
    }

    fn from_reader(reader: WavReader<R>) -> Result<Self, DecodeError> {
        let spec = reader.spec();
        let kind = match spec.sample_format {
            SampleFormat::Int => SampleKind::Integer,
            SampleFormat::Float => SampleKind::Float,
        };
        let supported = match kind {
            SampleKind::Integer => SUPPORTED_BIT_DEPTHS.contains(&spec.bits_per_sample),
            SampleKind::Float => spec.bits_per_sample == 32,
        };
        if !supported || spec.channels == 0 || spec.sample_rate == 0 {
            return Err(DecodeError::UnsupportedFormat {
                kind,
                channels: spec.channels,
                bits: spec.bits_per_sample,
            });
        }

        let descriptor = SourceStreamDescriptor {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            bits_per_sample: spec.bits_per_sample,
            kind,
        };
        tracing::debug!(
            sample_rate = descriptor.sample_rate,
            channels = descriptor.channels,
            bits = descriptor.bits_per_sample,
            kind = ?descriptor.kind,
            frames = reader.duration(),
            "Parsed WAVE header"
        );

        Ok(Self { reader, descriptor })
    }

    /// Length of the sample data in frames
    pub fn frames(&self) -> u32 {
        self.reader.duration()
    }
}

impl<R: Read + Seek + Send> SourceStream for WaveSource<R> {
    fn descriptor(&self) -> SourceStreamDescriptor {
        self.descriptor
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, DecodeError> {
        let width = self.descriptor.bytes_per_sample();
        match (self.descriptor.kind, width) {
            (SampleKind::Float, _) => pump(self.reader.samples::<f32>(), buf, width, |s: f32, out| {
                out.copy_from_slice(&s.to_le_bytes())
            }),
            // WAVE stores 8-bit samples unsigned; hound hands them out re-centered
            (_, 1) => pump(self.reader.samples::<i8>(), buf, width, |s: i8, out| {
                out[0] = (s as u8) ^ 0x80
            }),
            (_, 2) => pump(self.reader.samples::<i16>(), buf, width, |s: i16, out| {
                out.copy_from_slice(&s.to_le_bytes())
            }),
            (_, 3) => pump(self.reader.samples::<i32>(), buf, width, |s: i32, out| {
                out.copy_from_slice(&s.to_le_bytes()[..3])
            }),
            _ => pump(self.reader.samples::<i32>(), buf, width, |s: i32, out| {
                out.copy_from_slice(&s.to_le_bytes())
            }),
        }
    }

    fn rewind(&mut self) -> Result<(), DecodeError> {
        self.reader.seek(0)?;
        Ok(())
    }
}

/// Encode samples into `buf` until either runs out, returning bytes written
fn pump<S, I>(
    samples: I,
    buf: &mut [u8],
    width: usize,
    encode: impl Fn(S, &mut [u8]),
) -> Result<usize, DecodeError>
where
    I: Iterator<Item = hound::Result<S>>,
{
    let mut filled = 0;
    for (slot, sample) in buf.chunks_exact_mut(width).zip(samples) {
        match sample {
            Ok(sample) => {
                encode(sample, slot);
                filled += width;
            }
            // A file cut short inside its data chunk ends like a complete one
            Err(hound::Error::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
