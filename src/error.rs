//! Error types for top-pair reconstruction

use thiserror::Error;

/// Precondition violations detected while building a [`crate::KinematicInput`].
///
/// These are fatal to a single event and never affect other events.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MalformedInputError {
    #[error("no opposite-sign lepton pair: {negative} negative, {positive} positive")]
    MissingLeptonPair { negative: usize, positive: usize },

    #[error("at least two jets required, got {found}")]
    InsufficientJets { found: usize },

    #[error("non-finite value in field `{field}`")]
    NonFinite { field: String },

    #[error("particle ID {id} carries no charge sign")]
    ZeroParticleId { id: i32 },

    #[error("particle ID {id} does not match the {slot} slot")]
    RoleMismatch { slot: &'static str, id: i32 },

    #[error("array length mismatch for {object}: expected {expected}, got {got}")]
    LengthMismatch {
        object: &'static str,
        expected: usize,
        got: usize,
    },
}

#[derive(Error, Debug)]
pub enum RecoError {
    #[error("Malformed input: {0}")]
    MalformedInput(#[from] MalformedInputError),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Calibration error: {0}")]
    Calibration(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl RecoError {
    /// Whether this error is a per-event precondition violation
    pub fn is_malformed_input(&self) -> bool {
        matches!(self, RecoError::MalformedInput(_))
    }
}
