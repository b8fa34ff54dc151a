//! Error types for source adapters

use thiserror::Error;

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, SourceError>;

/// Errors raised while talking to a source
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Not found: {url}")]
    NotFound { url: String },

    #[error("Unauthorized (401): {url}")]
    Unauthorized { url: String },

    #[error("Forbidden (403): {url}")]
    Forbidden { url: String },

    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    /// The server answered with an HTML page (typically a login or error page)
    #[error("Expected data from {url} but received an HTML page: {snippet}")]
    HtmlResponse { url: String, snippet: String },

    #[error("Invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    /// Every credential the chain could offer was rejected
    #[error("Authentication failed (HTTP {status}) after trying: {attempted}. {hint}")]
    AuthExhausted {
        status: u16,
        attempted: String,
        hint: String,
    },

    #[error("Invalid source: {message}")]
    InvalidSource { message: String },

    #[error("Bundle '{bundle_id}' is not available from this source")]
    BundleNotFound { bundle_id: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] cairn_core::Error),
}

impl SourceError {
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn invalid_response(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn invalid_source(message: impl Into<String>) -> Self {
        Self::InvalidSource {
            message: message.into(),
        }
    }

    /// Map a non-success status to the matching variant
    pub fn from_status(url: impl Into<String>, status: u16) -> Self {
        let url = url.into();
        match status {
            401 => Self::Unauthorized { url },
            403 => Self::Forbidden { url },
            404 => Self::NotFound { url },
            _ => Self::Http { url, status },
        }
    }

    /// Transient failures worth retrying later
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// 401/403 responses that the credential chain may be able to fix
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::Forbidden { .. })
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { .. } => Some(401),
            Self::Forbidden { .. } => Some(403),
            Self::NotFound { .. } => Some(404),
            Self::Http { status, .. } | Self::AuthExhausted { status, .. } => Some(*status),
            _ => None,
        }
    }
}
