//! Session boundary detection
//!
//! A batch belongs to the current session unless its session key changed, or the venue restarted
//! the session under the same name. Restarts are only visible through the lap counter dropping
//! back to the start while karts already hold a history, which is a heuristic: an early long pit
//! stop can look the same. Resets triggered that way are reported as
//! [`ResetReason::LapCounterRestart`] so callers can flag them.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SessionResetPolicy;

/// Why the per-session state must be reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum ResetReason {
    /// The event/session name changed.
    KeyChanged { from: String, to: String },
    /// Same key, but the lap counter went back to the start.
    LapCounterRestart { current_lap: u32, longest_history: usize },
}

/// Outcome of checking one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionDecision {
    /// First batch ever seen; a session starts without anything to reset.
    Start,
    Continue,
    Reset(ResetReason),
}

impl SessionDecision {
    pub fn needs_reset(&self) -> bool {
        matches!(self, SessionDecision::Reset(_))
    }
}

/// Tracks the current session key across batches.
#[derive(Debug, Clone)]
pub struct SessionBoundaryDetector {
    policy: SessionResetPolicy,
    current_key: Option<String>,
}

impl SessionBoundaryDetector {
    pub fn new(policy: SessionResetPolicy) -> Self {
        Self { policy, current_key: None }
    }

    /// Evaluate a batch and adopt its key.
    ///
    /// `longest_history` is the longest per-kart lap history held for the current session.
    pub fn evaluate(
        &mut self,
        session_key: &str,
        current_lap: u32,
        longest_history: usize,
    ) -> SessionDecision {
        let decision = match self.current_key.as_deref() {
            None => SessionDecision::Start,
            Some(known) if known != session_key => SessionDecision::Reset(ResetReason::KeyChanged {
                from: known.to_string(),
                to: session_key.to_string(),
            }),
            Some(_)
                if current_lap <= self.policy.restart_lap_threshold
                    && longest_history > self.policy.min_history_for_restart =>
            {
                SessionDecision::Reset(ResetReason::LapCounterRestart {
                    current_lap,
                    longest_history,
                })
            }
            Some(_) => SessionDecision::Continue,
        };

        if decision != SessionDecision::Continue {
            debug!(session_key, current_lap, longest_history, ?decision, "Session boundary");
        }
        self.current_key = Some(session_key.to_string());
        decision
    }

    pub fn current_key(&self) -> Option<&str> {
        self.current_key.as_deref()
    }
}
