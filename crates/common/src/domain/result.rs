use std::time::Duration;
use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid tank type: {0}")]
    InvalidTankType(String),

    #[error("Invalid site status: {0}")]
    InvalidSiteStatus(String),

    #[error("Invalid frame outcome: {0}")]
    InvalidFrameOutcome(String),

    #[error("Invalid motor status code: {0}")]
    InvalidMotorStatus(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Storage unavailable: {0:#}")]
    StorageUnavailable(anyhow::Error),

    #[error("Storage constraint violation: {0}")]
    StorageConstraintViolation(String),

    #[error("Storage still unavailable after {attempts} attempts: {last_error}")]
    StorageRetriesExhausted { attempts: u32, last_error: String },

    #[error("Lane task for site {0} aborted before completion")]
    LaneTaskAborted(String),

    #[error("Ingestion for site {site_management_code} timed out after {timeout:?}")]
    IngestTimedOut {
        site_management_code: String,
        timeout: Duration,
    },

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}

impl DomainError {
    /// Only storage unavailability is worth retrying; everything else fails
    /// identically on a second attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, DomainError::StorageUnavailable(_))
    }
}
