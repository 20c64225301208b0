// Error types for the sim.
//
// `IrError` covers record-container misuse. `MissingId` is routine under
// races (a unit dismissed while its timer is pending, a task claimed before
// its expiry fires) and the effect reducers swallow it. Everything else that
// reaches the engine's update channel halts the engine. Player commands that
// are merely not legal right now come back as `SimError::Rejected` and leave
// the engine running.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IrError {
    #[error("duplicate {kind} id {id}")]
    DuplicateId { kind: &'static str, id: String },
    #[error("missing {kind} id {id}")]
    MissingId { kind: &'static str, id: String },
    #[error("update of {kind} {id} changed its id to {new_id}")]
    KeyChanged {
        kind: &'static str,
        id: String,
        new_id: String,
    },
    #[error("patch of {kind} {id} produced an invalid record: {source}")]
    Patch {
        kind: &'static str,
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A save tree that cannot be decoded into a `GameState`.
#[derive(Debug, Error)]
pub enum DeserializationError {
    #[error("save data must be a JSON object")]
    NotAnObject,
    #[error("unrecognized tag {0:?} in save data")]
    UnknownTag(String),
    #[error("malformed save data: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Ir(#[from] IrError),
    #[error(transparent)]
    Deserialization(#[from] DeserializationError),
    #[error("invariant violated: {0}")]
    Assertion(String),
    #[error("command rejected: {0}")]
    Rejected(String),
}

impl SimError {
    pub fn is_missing_id(&self) -> bool {
        matches!(self, SimError::Ir(IrError::MissingId { .. }))
    }
}

pub type SimResult<T> = Result<T, SimError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine halted: {reason}")]
    Halted { reason: String },
}
