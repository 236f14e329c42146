use thiserror::Error;

/// Errors surfaced by pure domain operations — parsing, sequence
/// exhaustion, and the handful of invariant violations that are cheap to
/// check without touching a store.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("reference code sequence exhausted for {0} (>9999)")]
    SequenceExhausted(chrono::NaiveDate),

    #[error("invalid reference code: {0}")]
    InvalidReferenceCode(String),

    #[error("invalid authority tier: {0}")]
    InvalidAuthorityTier(String),
}
