use thiserror::Error;

use super::stage::StageState;

/// Error taxonomy for graph construction and supervision.
///
/// Build errors (unknown kind, invalid config, unbound ports, type
/// mismatches) are detected before any data flows and fail the build
/// attempt. Runtime failures travel as `Error` events on the bus, not as
/// this type; teardown timeouts are reported as `Warning` events.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("unknown stage kind '{0}'")]
    UnknownKind(String),

    #[error("invalid configuration for stage '{stage}': {reason}")]
    InvalidConfig { stage: String, reason: String },

    #[error("stage '{0}' already exists in the graph")]
    DuplicateStage(String),

    #[error("no stage named '{0}' in the graph")]
    NoSuchStage(String),

    #[error("stage '{stage}' has no port named '{port}'")]
    NoSuchPort { stage: String, port: String },

    #[error("input port '{stage}.{port}' has no link")]
    UnboundRequiredPort { stage: String, port: String },

    #[error("required output port '{stage}.{port}' is not linked")]
    UnboundRequiredOutput { stage: String, port: String },

    #[error("media type mismatch: producer '{producer}' offers '{offered}', consumer '{consumer}' expects '{expected}'")]
    TypeMismatch {
        producer: String,
        offered: String,
        consumer: String,
        expected: String,
    },

    #[error("consumer port '{stage}.{port}' is already linked")]
    ConsumerAlreadyLinked { stage: String, port: String },

    #[error("topology contains a cycle through stage '{0}'")]
    CyclicTopology(String),

    #[error("graph has not been validated (call validate() before activate())")]
    NotValidated,

    #[error("stage '{stage}' rejected transition to {target}: {reason}")]
    StateTransitionRejected {
        stage: String,
        target: StageState,
        reason: String,
    },

    #[error("invalid lifecycle operation: {0}")]
    InvalidState(String),

    #[error("stage failure: {0}")]
    Stage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GraphError>;
