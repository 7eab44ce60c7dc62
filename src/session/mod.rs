//! Session lifecycle: state, primer, coordination and the HTTP surface

mod coordinator;
mod handler;
mod manager;
mod primer;

pub use coordinator::{
    record_from_candidate, CheckpointOutcome, ContextKind, ContextResult, CoordinatorStats,
    SessionCoordinator,
};
pub use handler::{memory_router, MemoryState};
pub use manager::{SessionInfo, SessionPhase, SessionState, SessionStore, SharedSession};
pub use primer::{build_primer, time_ago, Primer, PrimerInput};
