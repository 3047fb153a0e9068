use thiserror::Error;

/// Malformed input sets, rejected before the simulation loop starts.
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("missing profile")]
    MissingProfile,

    #[error("invalid profile: {0}")]
    InvalidProfile(String),

    #[error("invalid horizon: {0}")]
    InvalidHorizon(String),

    #[error("duplicate item id `{0}`")]
    DuplicateItem(String),

    #[error("invalid item `{id}`: {reason}")]
    InvalidItem { id: String, reason: String },

    #[error("priority target `{0}` is not a savings item")]
    UnknownPriorityTarget(String),
}
