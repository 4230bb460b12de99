use thiserror::Error;

/// Unified error type for database operations that application code can handle
#[derive(Error, Debug)]
pub enum DbError {
    /// Entity not found by the given identifier
    #[error("Entity not found")]
    NotFound,

    /// The database could not be reached or did not hand out a connection in time.
    /// Worth retrying on the next cycle.
    #[error("Database unavailable: {message}")]
    Unavailable { message: String },

    /// The pool has been closed, nothing issued against it will succeed again
    #[error("Database pool is closed")]
    PoolClosed,

    /// Catch-all for non-recoverable errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DbError {
    /// Whether the process can no longer make progress with this pool
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, DbError::PoolClosed)
    }
}

/// Convert from sqlx::Error using sqlx error categorization
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => DbError::NotFound,
            sqlx::Error::PoolClosed => DbError::PoolClosed,
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => DbError::Unavailable { message: err.to_string() },
            // Everything else (syntax, type mismatches, constraint errors) is a bug or a schema drift
            _ => DbError::Other(anyhow::Error::from(err)),
        }
    }
}

/// Type alias for database operation results
pub type Result<T> = std::result::Result<T, DbError>;
