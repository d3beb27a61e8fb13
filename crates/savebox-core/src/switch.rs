// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Enable/disable gate for serializer reads and writes.
//!
//! While disabled, `write` and `read` return `Ok(())` without touching the
//! archive or the caller's buffer. The gate is process-wide unless a
//! serializer is given its own [`SerializationSwitch::local`] flag.
//!
//! Flag reads and writes are relaxed atomics. Toggling the gate while a write
//! is in flight does not abort that write.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

static SERIALIZATION_ENABLED: AtomicBool = AtomicBool::new(true);

/// Enables serialization for every serializer using the global switch.
pub fn enable_serialization() {
    SERIALIZATION_ENABLED.store(true, Ordering::Relaxed);
}

/// Disables serialization for every serializer using the global switch.
pub fn disable_serialization() {
    SERIALIZATION_ENABLED.store(false, Ordering::Relaxed);
}

/// Current state of the global switch.
pub fn serialization_enabled() -> bool {
    SERIALIZATION_ENABLED.load(Ordering::Relaxed)
}

/// Which flag a serializer consults.
#[derive(Debug, Clone, Default)]
pub enum SerializationSwitch {
    /// The process-wide flag.
    #[default]
    Global,
    /// A flag shared only by the clones of this switch.
    Local(Arc<AtomicBool>),
}

impl SerializationSwitch {
    /// New local flag with the given initial state.
    pub fn local(enabled: bool) -> Self {
        Self::Local(Arc::new(AtomicBool::new(enabled)))
    }

    /// Whether reads and writes currently go through.
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Global => serialization_enabled(),
            Self::Local(flag) => flag.load(Ordering::Relaxed),
        }
    }

    /// Sets the flag this switch points at.
    pub fn set_enabled(&self, enabled: bool) {
        match self {
            Self::Global => SERIALIZATION_ENABLED.store(enabled, Ordering::Relaxed),
            Self::Local(flag) => flag.store(enabled, Ordering::Relaxed),
        }
    }
}
