//! Sequence Coordination
//!
//! A multi-line entry must play out without another speaker cutting in.
//! The coordinator is a single mutual-exclusion lock with an owner and a
//! monotonically increasing sequence id.
//!
//! While locked, ambient and interaction requests are simply denied. Mind
//! requests ("the narrator wants to say something about X") are worth
//! keeping, so one of them may be deferred and flushed shortly after the
//! lock is released, provided it is still fresh, the page is visible, and no
//! other sequence has started in the meantime.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Who holds the sequence lock
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceOwner {
    /// Idle chatter
    Ambient,
    /// A mind request
    Mind,
    /// An immediate response
    Interaction,
}

/// A request from the narrator's "mind" to talk about something
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MindRequest {
    /// Themes to talk about
    #[serde(default)]
    pub themes: Vec<String>,
    /// Free-form reason, for logs
    #[serde(default)]
    pub reason: Option<String>,
}

/// Invariant violations in the coordinator
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SequenceError {
    /// `lock_for_sequence` was called while a sequence was running
    #[error("sequence {held_id} already locked by {owner:?}")]
    AlreadyLocked {
        /// Id of the running sequence
        held_id: u64,
        /// Owner of the running sequence
        owner: SequenceOwner,
    },
}

/// Coordinator tuning
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceConfig {
    /// How long a deferred mind request stays valid (milliseconds)
    pub deferred_ttl_ms: u64,

    /// Delay between unlock and the deferred flush (milliseconds)
    pub flush_grace_ms: u64,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            deferred_ttl_ms: 5_000,
            flush_grace_ms: 200,
        }
    }
}

#[derive(Clone, Debug)]
struct Deferred {
    request: MindRequest,
    deferred_at: Instant,
    sequence_id: u64,
}

#[derive(Clone, Copy, Debug)]
struct Held {
    owner: SequenceOwner,
    length: usize,
}

/// The sequence lock
#[derive(Debug, Default)]
pub struct SequenceCoordinator {
    config: SequenceConfig,
    held: Option<Held>,
    sequence_id: u64,
    deferred: Option<Deferred>,
}

impl SequenceCoordinator {
    /// Create an unlocked coordinator
    #[must_use]
    pub fn new(config: SequenceConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Whether a sequence is running
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.held.is_some()
    }

    /// Current lock owner
    #[must_use]
    pub fn owner(&self) -> Option<SequenceOwner> {
        self.held.map(|h| h.owner)
    }

    /// Id of the latest sequence
    #[must_use]
    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    /// Whether a mind request is waiting
    #[must_use]
    pub fn has_deferred(&self) -> bool {
        self.deferred.is_some()
    }

    /// Take the lock for a sequence of `length` lines
    pub fn lock_for_sequence(
        &mut self,
        length: usize,
        owner: SequenceOwner,
    ) -> Result<u64, SequenceError> {
        if let Some(held) = self.held {
            return Err(SequenceError::AlreadyLocked {
                held_id: self.sequence_id,
                owner: held.owner,
            });
        }
        self.sequence_id += 1;
        self.held = Some(Held { owner, length });
        tracing::debug!(sequence_id = self.sequence_id, length, ?owner, "Sequence locked");
        Ok(self.sequence_id)
    }

    /// Release the lock
    ///
    /// Returns the deadline of the grace flush when a mind request is
    /// waiting. Unlocking an unlocked coordinator is a no-op.
    pub fn unlock_sequence(&mut self, now: Instant) -> Option<Instant> {
        let held = self.held.take()?;
        tracing::debug!(
            sequence_id = self.sequence_id,
            length = held.length,
            owner = ?held.owner,
            "Sequence unlocked"
        );
        self.deferred
            .as_ref()
            .map(|_| now + Duration::from_millis(self.config.flush_grace_ms))
    }

    /// Park a mind request until the lock is released; replaces any older one
    pub fn defer(&mut self, request: MindRequest, now: Instant) {
        if self.deferred.is_some() {
            tracing::debug!("Replacing deferred mind request");
        }
        self.deferred = Some(Deferred {
            request,
            deferred_at: now,
            sequence_id: self.sequence_id,
        });
    }

    /// Drop any waiting mind request
    pub fn discard_deferred(&mut self) {
        self.deferred = None;
    }

    /// Release the deferred request if it may still run
    ///
    /// The request is consumed either way; a stale or blocked request is
    /// dropped rather than retried.
    pub fn flush_deferred(&mut self, now: Instant, page_hidden: bool) -> Option<MindRequest> {
        if self.is_locked() {
            // Keep it for the next unlock
            return None;
        }
        let deferred = self.deferred.take()?;

        if deferred.sequence_id != self.sequence_id {
            tracing::debug!("Deferred mind request superseded by a newer sequence");
            return None;
        }
        if page_hidden {
            tracing::debug!("Deferred mind request dropped, page hidden");
            return None;
        }
        let age = now.saturating_duration_since(deferred.deferred_at);
        if age > Duration::from_millis(self.config.deferred_ttl_ms) {
            tracing::debug!(age_ms = age.as_millis() as u64, "Deferred mind request expired");
            return None;
        }
        Some(deferred.request)
    }
}
