//! Error types for graph construction, refinement, evaluation and transfer.
//!
//! `PydronError` distinguishes the error kinds called out in the runtime's
//! failure model: a refinement or evaluation failure carries the offending
//! tick; a transport failure originates from a peer worker call; cancellation
//! and invariant violations are distinct from both.

use thiserror::Error;

use crate::tick::Tick;

/// Convenience alias for `Result<T, PydronError>`.
pub type Result<T> = std::result::Result<T, PydronError>;

/// All error kinds the core distinguishes (spec §7).
#[derive(Error, Debug)]
pub enum PydronError {
    /// A value could not be converted to bytes and the caller asked to be
    /// told synchronously (`fail_if_pickle_unsupported = true`).
    #[error("value {value_id} is not serializable: {reason}")]
    NotSerializable { value_id: String, reason: String },

    /// A refinement callback failed; carries the offending tick.
    #[error("refinement failed at tick {tick}: {cause}")]
    Refinement { tick: Tick, cause: String },

    /// A task's `evaluate` raised or returned a failure; carries the
    /// offending tick.
    #[error("evaluation failed at tick {tick}: {cause}")]
    Evaluation { tick: Tick, cause: String },

    /// A peer worker call failed. Manifests as a failure on the value
    /// holder waiting on the transfer.
    #[error("transport error talking to worker {worker}: {cause}")]
    Transport { worker: String, cause: String },

    /// The traversal's completion handle was cancelled.
    #[error("traversal cancelled")]
    Cancelled,

    /// An attempt to mutate a graph against its invariants, to set a value
    /// id twice, or to use a freed value holder.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Worker or pool configuration is invalid or missing.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// I/O failure while loading configuration or graph literals.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML configuration parse failure.
    #[error("configuration parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl PydronError {
    pub fn refinement(tick: Tick, cause: impl Into<String>) -> Self {
        Self::Refinement { tick, cause: cause.into() }
    }

    pub fn evaluation(tick: Tick, cause: impl Into<String>) -> Self {
        Self::Evaluation { tick, cause: cause.into() }
    }

    pub fn transport(worker: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::Transport { worker: worker.into(), cause: cause.into() }
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    /// True for the errors that represent a task-level `Failure` rather
    /// than an infrastructure problem — the distinction the worker's
    /// `evaluate` uses to decide whether to raise to the caller or return
    /// the failure inside the eval result (spec §7 propagation policy).
    pub fn is_task_failure(&self) -> bool {
        matches!(self, Self::Evaluation { .. } | Self::Refinement { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluation_error_carries_tick() {
        let t = Tick::start().incremented(1);
        let err = PydronError::evaluation(t.clone(), "boom");
        match err {
            PydronError::Evaluation { tick, cause } => {
                assert_eq!(tick, t);
                assert_eq!(cause, "boom");
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn is_task_failure_distinguishes_kinds() {
        assert!(PydronError::evaluation(Tick::start(), "x").is_task_failure());
        assert!(PydronError::refinement(Tick::start(), "x").is_task_failure());
        assert!(!PydronError::Cancelled.is_task_failure());
        assert!(!PydronError::invariant("bad").is_task_failure());
    }
}
