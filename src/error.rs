//! Engine error taxonomy

use uuid::Uuid;

/// Errors surfaced by the decision pipeline and its collaborators
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("market data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("insufficient data: need {required} points, got {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("validation failed for {symbol}: {reason} (measured {measured:.4}, threshold {threshold:.4})")]
    ValidationFailed {
        symbol: String,
        reason: String,
        measured: f64,
        threshold: f64,
    },

    #[error("direction conflict for {symbol}: sentiment {sentiment:.1} opposes technical majority")]
    DirectionConflict { symbol: String, sentiment: f64 },

    #[error("daily quota exhausted ({used}/{quota})")]
    QuotaExhausted { used: u32, quota: u32 },

    #[error("cooldown active for {scope}: {remaining_secs}s remaining")]
    CooldownActive { scope: String, remaining_secs: i64 },

    #[error("persistence failure during {operation}: {reason}")]
    PersistenceFailure { operation: String, reason: String },

    #[error("unknown signal: {0}")]
    UnknownSignal(Uuid),

    #[error("signal {0} already closed")]
    AlreadyClosed(Uuid),

    #[error("notification failed: {0}")]
    Notification(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    pub fn data_unavailable(symbol: &str, reason: impl std::fmt::Display) -> Self {
        EngineError::DataUnavailable {
            symbol: symbol.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn persistence(operation: &str, reason: impl std::fmt::Display) -> Self {
        EngineError::PersistenceFailure {
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Short machine-readable kind, used in cycle reports and logs
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::DataUnavailable { .. } => "DataUnavailable",
            EngineError::InsufficientData { .. } => "InsufficientData",
            EngineError::ValidationFailed { .. } => "ValidationFailed",
            EngineError::DirectionConflict { .. } => "DirectionConflict",
            EngineError::QuotaExhausted { .. } => "QuotaExhausted",
            EngineError::CooldownActive { .. } => "CooldownActive",
            EngineError::PersistenceFailure { .. } => "PersistenceFailure",
            EngineError::UnknownSignal(_) => "UnknownSignal",
            EngineError::AlreadyClosed(_) => "AlreadyClosed",
            EngineError::Notification(_) => "Notification",
            EngineError::Config(_) => "Config",
        }
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
