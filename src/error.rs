use thiserror::Error;

/// Main error type for the stat feed core
#[derive(Error, Debug)]
pub enum CourtsideError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Delivery errors
    #[error("Push subscription failed: {0}")]
    Connectivity(String),

    #[error("Request failed{}: {message}", status_suffix(.status))]
    Request {
        status: Option<u16>,
        message: String,
    },

    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Resource not available: {0}")]
    ResourceAbsent(String),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Event log errors
    #[error("Inconsistent event data: {0}")]
    DataInconsistency(String),

    #[error("Event not found: {0}")]
    EventNotFound(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {code})"),
        None => String::new(),
    }
}

/// Result type alias for CourtsideError
pub type Result<T> = std::result::Result<T, CourtsideError>;

/// Coarse classification used at the feed/request boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Push channel failed or timed out; polling takes over
    Connectivity,
    /// Read/write against the store failed
    Request,
    /// Malformed or contradictory event data
    DataInconsistency,
    /// Optional data source does not exist in this deployment
    ResourceAbsent,
    /// Everything else (config, local bugs, cancellation)
    Internal,
}

impl CourtsideError {
    pub fn request(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Request {
            status,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connectivity(_) | Self::WebSocket(_) => ErrorKind::Connectivity,
            Self::Request { .. } | Self::RetriesExhausted { .. } | Self::Http(_) => {
                ErrorKind::Request
            }
            Self::DataInconsistency(_) | Self::EventNotFound(_) | Self::Json(_) => {
                ErrorKind::DataInconsistency
            }
            Self::ResourceAbsent(_) => ErrorKind::ResourceAbsent,
            _ => ErrorKind::Internal,
        }
    }

    /// Whether another attempt could plausibly succeed.
    ///
    /// Timeouts, connection resets, 429 and 5xx responses are transient; any
    /// other 4xx and every absent resource are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request { status: None, .. } => true,
            Self::Request {
                status: Some(code), ..
            } => *code == 429 || *code >= 500,
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status()
                        .map(|s| s.as_u16() == 429 || s.is_server_error())
                        .unwrap_or(false)
            }
            Self::Connectivity(_) | Self::WebSocket(_) => true,
            _ => false,
        }
    }

    pub fn is_resource_absent(&self) -> bool {
        matches!(self, Self::ResourceAbsent(_))
    }
}
