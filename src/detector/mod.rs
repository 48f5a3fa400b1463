//! Streaming change detection: lap completions and session boundaries

mod lap;
mod session;

pub use lap::{KartHistory, LapEventDetector};
pub use session::{ResetReason, SessionBoundaryDetector, SessionDecision};
