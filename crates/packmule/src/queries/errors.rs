use thiserror::Error;

/// Errors from typed store queries.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from sea-orm.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Invalid input provided to a query function.
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

impl StoreError {
    #[inline]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
