//! Error types for password reset operations.
//!
//! Directory-facing failures carry enough context (operation, target DN or filter, bind identity)
//! to be diagnosed from the server log alone. None of them ever carries a secret.

use thiserror::Error;

/// Main error type for password reset operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The directory server could not be reached or the connection broke
    #[error("Connection to {server} failed: {message}")]
    ConnectionError {
        /// Directory server address
        server: String,
        /// Underlying failure
        message: String,
    },

    /// The directory rejected the bind
    #[error("Bind as `{identity}` rejected: {message}")]
    AuthenticationError {
        /// Identity that attempted the bind
        identity: String,
        /// Directory diagnostic
        message: String,
    },

    /// A search failed, either when issued or mid-stream
    #[error("Search under `{base}` with filter `{filter}` failed: {message}")]
    SearchError {
        /// Search base
        base: String,
        /// Search filter
        filter: String,
        /// Directory diagnostic
        message: String,
    },

    /// The directory rejected a modification
    #[error("Modify of `{dn}` failed: {message}")]
    ModifyError {
        /// Target entry
        dn: String,
        /// Directory diagnostic
        message: String,
    },

    /// Not enough distinct characters to build a password without repeats
    #[error("Cannot generate {requested} unique characters from a pool of {available}")]
    GenerationExhausted {
        /// Requested password length
        requested: usize,
        /// Number of distinct characters available
        available: usize,
    },

    /// A modification request violated its structural invariants
    #[error("Invalid modification request: {0}")]
    InvalidModification(String),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Specialized result type for password reset operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::ConnectionError { .. } => "CONNECTION_ERROR",
            Self::AuthenticationError { .. } => "AUTHENTICATION_ERROR",
            Self::SearchError { .. } => "SEARCH_ERROR",
            Self::ModifyError { .. } => "MODIFY_ERROR",
            Self::GenerationExhausted { .. } => "GENERATION_EXHAUSTED",
            Self::InvalidModification(_) => "INVALID_MODIFICATION",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
        }
    }

    /// Message safe to hand to an untrusted caller.
    ///
    /// Only names the failing operation: no DN, filter, identity or directory diagnostic.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => "password reset service is misconfigured",
            Self::ConnectionError { .. } => "directory service is unavailable",
            Self::AuthenticationError { .. } => "directory service rejected the service account",
            Self::SearchError { .. } => "directory search failed",
            Self::ModifyError { .. } => "directory update failed",
            Self::GenerationExhausted { .. } => "password generation failed",
            Self::InvalidModification(_) | Self::InvalidRequest(_) => {
                "password reset request could not be processed"
            }
        }
    }

    /// Returns true for failures of the directory infrastructure itself.
    #[must_use]
    pub const fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::ConnectionError { .. }
                | Self::AuthenticationError { .. }
                | Self::SearchError { .. }
                | Self::ModifyError { .. }
        )
    }

    /// Returns true if this error should be logged as a serious error.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        !matches!(self, Self::InvalidRequest(_))
    }
}

// Conversions from external error types
impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::ConfigError(format!("invalid directory URL: {err}"))
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ConfigError(err.to_string())
    }
}
