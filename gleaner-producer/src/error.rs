//! Engine error types

use thiserror::Error;

/// Faults raised while ending a job
///
/// None of these escape the engine: the job is reset and a new admission
/// is attempted.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A delivery task panicked or was cancelled
    #[error("delivery task failed: {0}")]
    DeliveryTask(#[from] tokio::task::JoinError),
}
