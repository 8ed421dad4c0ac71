use thiserror::Error;

/// Errors surfaced by layer construction, checkpoint parsing and scheduling.
///
/// None of these are retried. Shape mismatches inside forward/backward are
/// not represented here: they are precondition violations and panic.
#[derive(Error, Debug)]
pub enum StriateError {
    #[error("layer '{layer}' does not implement {operation}")]
    Unimplemented {
        layer: String,
        operation: &'static str,
    },

    #[error("unrecognized neuron type '{0}'")]
    UnknownNeuron(String),

    #[error("unrecognized scheduler '{0}'")]
    UnknownScheduler(String),

    #[error("scheduler precondition violated: {0}")]
    SchedulerPrecondition(String),

    #[error("malformed checkpoint record for layer '{layer}': {reason}")]
    MalformedRecord { layer: String, reason: String },

    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    #[error("network must end with a softmax layer")]
    MissingLossLayer,

    #[error("checkpoint encoding: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StriateError>;
