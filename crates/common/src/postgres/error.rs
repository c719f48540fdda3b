use crate::domain::DomainError;
use deadpool_postgres::PoolError;

/// How a storage failure should be treated by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorClass {
    /// Connection loss, contention or resource pressure; worth retrying
    Transient,
    /// Integrity constraint violation (SQLSTATE class 23); never retried
    ConstraintViolation,
    /// Anything else; surfaced as-is
    Other,
}

/// Classify a PostgreSQL SQLSTATE code
pub fn classify_sqlstate(code: &str) -> StorageErrorClass {
    match code {
        // serialization_failure, deadlock_detected
        "40001" | "40P01" => StorageErrorClass::Transient,
        // admin_shutdown, crash_shutdown, cannot_connect_now
        "57P01" | "57P02" | "57P03" => StorageErrorClass::Transient,
        // connection_exception, insufficient_resources
        c if c.starts_with("08") || c.starts_with("53") => StorageErrorClass::Transient,
        c if c.starts_with("23") => StorageErrorClass::ConstraintViolation,
        _ => StorageErrorClass::Other,
    }
}

/// Map a tokio-postgres error onto the domain storage taxonomy
pub fn classify_postgres_error(err: tokio_postgres::Error) -> DomainError {
    if let Some(db_err) = err.as_db_error() {
        let code = db_err.code().code();
        return match classify_sqlstate(code) {
            StorageErrorClass::Transient => DomainError::StorageUnavailable(err.into()),
            StorageErrorClass::ConstraintViolation => DomainError::StorageConstraintViolation(
                format!("{} ({})", db_err.message(), code),
            ),
            StorageErrorClass::Other => DomainError::RepositoryError(err.into()),
        };
    }

    // Without a server-side error the connection itself failed
    let io_failure = std::error::Error::source(&err)
        .map(|source| source.is::<std::io::Error>())
        .unwrap_or(false);
    if err.is_closed() || io_failure {
        return DomainError::StorageUnavailable(err.into());
    }

    DomainError::RepositoryError(err.into())
}

/// Map a pool checkout failure onto the domain storage taxonomy.
///
/// Waiting for a free connection or a closed pool is transient; a backend
/// error is classified like any query error, so bad credentials (SQLSTATE
/// class 28) are not retried.
pub fn classify_pool_error(err: PoolError) -> DomainError {
    match err {
        PoolError::Backend(backend) => classify_postgres_error(backend),
        PoolError::Timeout(_) | PoolError::Closed => DomainError::StorageUnavailable(err.into()),
        other => DomainError::RepositoryError(other.into()),
    }
}
