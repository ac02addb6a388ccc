//! Control surface shared between the device/control layer and the consumer.
//!
//! Both flags may be flipped from any thread at any time. The consumer reads
//! them once per period with relaxed ordering; a change becomes visible on
//! some later period, which is all audio mute needs.

use std::sync::atomic::{AtomicBool, Ordering};

/// Mute toggle and synthesis-disable flag
#[derive(Debug, Default)]
pub struct Controls {
    muted: AtomicBool,
    synthesis_disabled: AtomicBool,
}

impl Controls {
    pub fn new(muted: bool, synthesis_disabled: bool) -> Self {
        Self {
            muted: AtomicBool::new(muted),
            synthesis_disabled: AtomicBool::new(synthesis_disabled),
        }
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn set_synthesis_disabled(&self, disabled: bool) {
        self.synthesis_disabled.store(disabled, Ordering::Relaxed);
    }

    pub fn is_synthesis_disabled(&self) -> bool {
        self.synthesis_disabled.load(Ordering::Relaxed)
    }

    /// True when the consumer must deliver silence this period
    #[inline]
    pub fn silenced(&self) -> bool {
        self.is_muted() || self.is_synthesis_disabled()
    }
}
