//! Resume-or-discard prompt shown when a saved build is found on load.
//!
//! Single user-driven decision point: `NotChecked → Offering | Idle`,
//! `Offering → Resumed | Discarded`. No retries, no timeouts.

use rosterframe_core::BuildSession;
use rosterframe_core::clock::Clock;

use crate::{SessionStore, StorageBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    NotChecked,
    /// No resumable session was found.
    Idle,
    /// A session is on offer; the prompt is visible.
    Offering,
    Resumed,
    Discarded,
}

/// Drives the recovery prompt against a [`SessionStore`].
pub struct RecoveryPrompt {
    state: RecoveryState,
    offered: Option<BuildSession>,
}

impl RecoveryPrompt {
    pub fn new() -> Self {
        Self {
            state: RecoveryState::NotChecked,
            offered: None,
        }
    }

    pub fn state(&self) -> RecoveryState {
        self.state
    }

    /// Whether the prompt should be rendered.
    pub fn is_visible(&self) -> bool {
        self.state == RecoveryState::Offering
    }

    /// The session payload on offer while the prompt is visible.
    pub fn offered(&self) -> Option<&BuildSession> {
        self.offered.as_ref()
    }

    /// Consult the store once. Subsequent calls are no-ops.
    pub fn check<S: StorageBackend, C: Clock>(
        &mut self,
        store: &SessionStore<S, C>,
    ) -> RecoveryState {
        if self.state == RecoveryState::NotChecked {
            if store.has_session() {
                self.offered = store.get();
                self.state = RecoveryState::Offering;
            } else {
                self.state = RecoveryState::Idle;
            }
        }
        self.state
    }

    /// Hand the offered session to the caller's restore callback and hide
    /// the prompt. Returns false when nothing is on offer.
    pub fn resume(&mut self, restore: impl FnOnce(BuildSession)) -> bool {
        if self.state != RecoveryState::Offering {
            return false;
        }
        if let Some(session) = self.offered.take() {
            restore(session);
        }
        self.state = RecoveryState::Resumed;
        true
    }

    /// Clear the store and hide the prompt. Returns false when nothing is
    /// on offer.
    pub fn discard<S: StorageBackend, C: Clock>(&mut self, store: &SessionStore<S, C>) -> bool {
        if self.state != RecoveryState::Offering {
            return false;
        }
        store.clear();
        self.offered = None;
        self.state = RecoveryState::Discarded;
        true
    }
}

impl Default for RecoveryPrompt {
    fn default() -> Self {
        Self::new()
    }
}
