use cos_core::ReferenceCode;
use thiserror::Error;

/// Errors surfaced by runtime operations: stores, the bus, and the
/// harness/runtime lifecycle calls. Per-message dispatch errors are caught
/// at the harness/bus seam and turned into dead-letter decisions — they
/// never reach this type. Only start/stop and store-level failures
/// propagate to a caller.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Core(#[from] cos_core::CoreError),

    #[error("sequence store unavailable: {0}")]
    SequenceStoreUnavailable(String),

    #[error("queue {0} not found")]
    UnknownQueue(String),

    #[error("queue {0} already has a consumer")]
    ConsumerAlreadyRegistered(String),

    #[error("agent {0} is already running")]
    AgentAlreadyRunning(String),

    #[error("agent {0} is not running")]
    AgentNotRunning(String),

    #[error("team {0} has no running agents")]
    UnknownTeam(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("reference code {0} is not a known sub-task")]
    UnknownSubtask(ReferenceCode),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
