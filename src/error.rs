//! Error types for the strata cache

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error produced by a caller-supplied loader.
pub type LoaderError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in the strata cache
#[derive(Error, Debug)]
pub enum Error {
    /// Loader returned no payload and no usable cached fallback existed
    #[error("no data returned from loader for provider '{provider_key}'")]
    NoDataFromLoader {
        provider_key: String,
        cause: Option<String>,
    },

    /// Startup migration aborted
    #[error("migration to version {version} failed: {cause}")]
    MigrationFailed { version: u32, cause: String },

    /// Missing or invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// User-supplied key contained a reserved separator and escaping is disabled
    #[error("key segment '{0}' contains a reserved separator")]
    KeySeparatorCollision(String),

    /// Deep copy of a payload failed
    #[error("deep copy failed: {0}")]
    DeepCopy(String),

    /// Payload (de)serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The loader failure chained into a `NoDataFromLoader`, if any.
    pub fn loader_cause(&self) -> Option<&str> {
        match self {
            Error::NoDataFromLoader { cause, .. } => cause.as_deref(),
            _ => None,
        }
    }
}
