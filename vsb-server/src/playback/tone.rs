//! Momentary tone toggle
//!
//! One process-wide cell holding the tone's on/off flag and the sequence
//! number of the request that set it. Press/release signals from a browser
//! travel over independent connections and can arrive out of order, so a
//! request is applied only when its sequence is newer than the last applied
//! one.
//!
//! Flag and sequence are packed into a single `AtomicU64`
//! (`sequence << 1 | active`) and updated with compare-and-swap: lock-free
//! last-writer-wins on the sequence number, not mutual exclusion.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Largest sequence number that fits next to the flag bit
pub const MAX_SEQUENCE: u64 = u64::MAX >> 1;

/// Snapshot of the toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToneState {
    pub active: bool,
    pub sequence: u64,
}

/// Outcome of a tone request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneUpdate {
    /// Request was newer than the current state and is now in effect
    Applied(ToneState),
    /// Request was older than (or equal to) the current state and was dropped
    Stale { current: ToneState },
}

/// Process-wide continuous tone state
#[derive(Debug, Default)]
pub struct ToneToggle {
    packed: AtomicU64,
}

fn pack(state: ToneState) -> u64 {
    (state.sequence << 1) | state.active as u64
}

fn unpack(bits: u64) -> ToneState {
    ToneState {
        active: bits & 1 == 1,
        sequence: bits >> 1,
    }
}

impl ToneToggle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the tone should currently be injected into the sink.
    ///
    /// Called from the audio callback; a single relaxed load.
    pub fn is_active(&self) -> bool {
        self.packed.load(Ordering::Relaxed) & 1 == 1
    }

    pub fn state(&self) -> ToneState {
        unpack(self.packed.load(Ordering::Acquire))
    }

    /// Apply `active` if `sequence` is newer than the last applied request.
    pub fn set_tone(&self, active: bool, sequence: u64) -> Result<ToneUpdate> {
        if sequence > MAX_SEQUENCE {
            return Err(Error::BadRequest(format!("Tone sequence {} out of range", sequence)));
        }

        let wanted = ToneState { active, sequence };
        let mut current_bits = self.packed.load(Ordering::Acquire);
        loop {
            let current = unpack(current_bits);
            if sequence <= current.sequence {
                debug!(sequence, current = current.sequence, "Discarding stale tone request");
                return Ok(ToneUpdate::Stale { current });
            }

            match self.packed.compare_exchange_weak(
                current_bits,
                pack(wanted),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    debug!(active, sequence, "Tone state applied");
                    return Ok(ToneUpdate::Applied(wanted));
                }
                Err(actual) => current_bits = actual,
            }
        }
    }

    /// Apply `active` with the next sequence number (arrival order).
    ///
    /// Used for clients that send no sequence of their own.
    pub fn set_tone_next(&self, active: bool) -> ToneUpdate {
        let mut current_bits = self.packed.load(Ordering::Acquire);
        loop {
            let current = unpack(current_bits);
            let wanted = ToneState {
                active,
                sequence: (current.sequence + 1).min(MAX_SEQUENCE),
            };

            match self.packed.compare_exchange_weak(
                current_bits,
                pack(wanted),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return ToneUpdate::Applied(wanted),
                Err(actual) => current_bits = actual,
            }
        }
    }
}
