use thiserror::Error;

/// Failures of the event loop itself. Rejection reasons carried by a
/// [`Deferred`](crate::Deferred) are never wrapped in this type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The loop ran out of work while the awaited value was still pending.
    #[error("event loop went idle while the deferred value was still pending")]
    Stalled,
    /// The loop ran its configured number of turns with work still queued.
    #[error("event loop exceeded its turn limit of {0}")]
    TurnLimit(u64),
}
