use crate::credentials::LoginFormErrors;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{operation} rejected with status {status}: {message}")]
    Rejected {
        operation: &'static str,
        status: u16,
        message: String,
    },
    #[error("Session expired, login required")]
    SessionExpired,
    #[error("Invalid login form: {0}")]
    InvalidForm(LoginFormErrors),
    #[error("Identity storage error: {0}")]
    Storage(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Refusing to send credentials to another origin: {0}")]
    CrossOrigin(String),
}

impl Error {
    /// Whether the error came from the network layer timing out.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Http(e) if e.is_timeout())
    }
}
