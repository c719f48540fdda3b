use common::domain::{FrameOutcome, ReadingField};
use thiserror::Error;

/// Payload does not match the wire grammar
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("malformed frame: {reason}")]
    Malformed { reason: String },
}

impl DecodeError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        DecodeError::Malformed {
            reason: reason.into(),
        }
    }
}

/// Decoded reading violates a physical or historical constraint
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} value {value} is out of range (bound {bound})")]
    OutOfRange {
        field: ReadingField,
        value: f64,
        bound: f64,
    },

    #[error("total amount {observed} is lower than the previous total {previous}")]
    NonMonotonicTotal { previous: f64, observed: f64 },
}

/// Why an admitted frame produced no parsed reading
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameRejection {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl FrameRejection {
    /// Audit tag stored on the raw frame
    pub fn outcome(&self) -> FrameOutcome {
        match self {
            FrameRejection::Decode(_) => FrameOutcome::Malformed,
            FrameRejection::Validation(_) => FrameOutcome::Rejected,
        }
    }
}
