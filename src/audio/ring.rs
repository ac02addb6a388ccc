//! Fixed-capacity byte ring shared by the ingestion thread and the consumer.
//!
//! Both cursors and the occupied-byte count live behind one mutex. Every
//! operation takes the lock once, computes its copy plan, copies, updates the
//! cursors and releases it. Nothing here ever waits for data or for space.

use std::collections::TryReserveError;
use std::sync::{Mutex, MutexGuard};

use crate::core::format::AudioFormat;

/// Cursor state and arena, only ever touched with the lock held
#[derive(Debug)]
struct RingState {
    arena: Box<[u8]>,
    read_pos: usize,
    write_pos: usize,
    used: usize, // disambiguates full from empty when read_pos == write_pos
}

/// Circular byte buffer sized in whole frames of the target format
#[derive(Debug)]
pub struct CircularAudioBuffer {
    state: Mutex<RingState>,
    format: AudioFormat,
    capacity: usize,
}

impl CircularAudioBuffer {
    /// Allocate a ring holding `capacity_frames` frames of `format`.
    ///
    /// The arena is reserved fallibly so that an allocation failure surfaces
    /// as an initialization error instead of an abort.
    pub fn new(format: AudioFormat, capacity_frames: usize) -> Result<Self, TryReserveError> {
        // An overflowing size is reported by the reservation as a capacity overflow
        let capacity = capacity_frames
            .checked_mul(format.frame_size())
            .unwrap_or(usize::MAX);
        let mut arena = Vec::new();
        arena.try_reserve_exact(capacity)?;
        arena.resize(capacity, 0u8);

        Ok(Self {
            state: Mutex::new(RingState {
                arena: arena.into_boxed_slice(),
                read_pos: 0,
                write_pos: 0,
                used: 0,
            }),
            format,
            capacity,
        })
    }

    fn lock(&self) -> MutexGuard<'_, RingState> {
        self.state.lock().unwrap_or_else(|e| {
            tracing::warn!("Ring buffer mutex poisoned; continuing");
            e.into_inner()
        })
    }

    /// Copy as much of `data` as fits without overwriting unread bytes.
    ///
    /// Returns the number of bytes accepted. When the write cursor sits behind
    /// the read cursor only the contiguous span up to the read cursor is used,
    /// even if the request is larger.
    pub fn write(&self, data: &[u8]) -> usize {
        let mut guard = self.lock();
        let state = &mut *guard;
        let cap = state.arena.len();
        if cap == 0 || data.is_empty() || state.used == cap {
            return 0;
        }

        let (read, write) = (state.read_pos, state.write_pos);
        let accepted = if write > read || state.used == 0 {
            // Free space is [write, cap) followed by [0, read)
            let first = (cap - write).min(data.len());
            state.arena[write..write + first].copy_from_slice(&data[..first]);

            let second = (data.len() - first).min(read);
            state.arena[..second].copy_from_slice(&data[first..first + second]);

            state.write_pos = if second > 0 {
                second
            } else {
                (write + first) % cap
            };
            first + second
        } else {
            // Free space is the single span [write, read)
            let span = (read - write).min(data.len());
            state.arena[write..write + span].copy_from_slice(&data[..span]);
            state.write_pos = write + span;
            span
        };

        state.used += accepted;
        accepted
    }

    /// Copy up to `out.len()` unread bytes into `out`, returning how many were produced
    pub fn read(&self, out: &mut [u8]) -> usize {
        let mut guard = self.lock();
        let state = &mut *guard;
        let cap = state.arena.len();
        if cap == 0 || out.is_empty() || state.used == 0 {
            return 0;
        }

        let (read, write) = (state.read_pos, state.write_pos);
        let produced = if write > read {
            // Unread data is the single span [read, write)
            let span = (write - read).min(out.len());
            out[..span].copy_from_slice(&state.arena[read..read + span]);
            state.read_pos = read + span;
            span
        } else {
            // Unread data is [read, cap) followed by [0, write)
            let first = (cap - read).min(out.len());
            out[..first].copy_from_slice(&state.arena[read..read + first]);

            let second = (out.len() - first).min(write);
            out[first..first + second].copy_from_slice(&state.arena[..second]);

            state.read_pos = if second > 0 {
                second
            } else {
                (read + first) % cap
            };
            first + second
        };

        state.used -= produced;
        produced
    }

    /// Unread bytes
    pub fn used_bytes(&self) -> usize {
        self.lock().used
    }

    /// Bytes that can be written before the ring is full
    pub fn free_bytes(&self) -> usize {
        self.capacity - self.lock().used
    }

    /// Unread whole frames of the target format
    pub fn used_frame_count(&self) -> usize {
        let frame_size = self.format.frame_size();
        if frame_size == 0 {
            return 0;
        }
        self.lock().used / frame_size
    }

    /// Free whole frames of the target format
    pub fn free_frame_count(&self) -> usize {
        let frame_size = self.format.frame_size();
        if frame_size == 0 {
            return 0;
        }
        (self.capacity - self.lock().used) / frame_size
    }

    pub fn is_empty(&self) -> bool {
        self.lock().used == 0
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity
    }

    pub fn format(&self) -> &AudioFormat {
        &self.format
    }
}
