use thiserror::Error;

/// Errors that can occur when talking to the package registry.
#[derive(Debug, Error, Clone)]
pub enum RegistryError {
    /// Unexpected status code from the registry.
    #[error("registry API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Package (or requested document) does not exist upstream.
    #[error("package not found: {package}")]
    NotFound { package: String },

    /// Network or connection error.
    #[error("registry network error: {message}")]
    Network { message: String },

    /// Response body could not be decoded.
    #[error("registry response decode error: {message}")]
    Decode { message: String },

    /// Retry budget exhausted while an upstream failure persisted.
    #[error("registry retries exhausted after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    /// Unexpected/internal error.
    #[error("registry internal error: {message}")]
    Internal { message: String },
}

impl RegistryError {
    #[inline]
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    #[inline]
    pub fn not_found(package: impl Into<String>) -> Self {
        Self::NotFound {
            package: package.into(),
        }
    }

    #[inline]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    #[inline]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    #[inline]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether a retry has any chance of succeeding.
    ///
    /// Network failures and 429/5xx responses are transient; everything else
    /// is a permanent condition and retrying it is a bug.
    #[inline]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Outcome of a single registry fetch attempt.
///
/// Retry policy is a pure function of this value: `Transient` may be
/// retried, `Permanent` must not be, `Success` carries the data. Callers
/// never inspect error strings or status codes to decide.
#[derive(Debug, Clone)]
pub enum FetchOutcome<T> {
    /// The fetch succeeded.
    Success(T),
    /// A transient upstream failure; retrying may succeed.
    Transient(RegistryError),
    /// A permanent upstream condition (404, malformed body, client error).
    Permanent(RegistryError),
}

impl<T> FetchOutcome<T> {
    /// Classify an error into the matching outcome variant.
    pub fn from_error(err: RegistryError) -> Self {
        if err.is_transient() {
            Self::Transient(err)
        } else {
            Self::Permanent(err)
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    #[inline]
    pub fn should_retry(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Whether this is the "document does not exist" permanent condition,
    /// which callers treat as a normal outcome rather than an error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Permanent(RegistryError::NotFound { .. }))
    }

    /// Convert into a plain `Result`, erasing the transient/permanent split.
    pub fn into_result(self) -> Result<T> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Transient(err) | Self::Permanent(err) => Err(err),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FetchOutcome<U> {
        match self {
            Self::Success(value) => FetchOutcome::Success(f(value)),
            Self::Transient(err) => FetchOutcome::Transient(err),
            Self::Permanent(err) => FetchOutcome::Permanent(err),
        }
    }
}
