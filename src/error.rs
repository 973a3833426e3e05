use thiserror::Error;

/// Failure kinds surfaced by the fetch layer and the backend router.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("network failure: {0}")]
    Network(String),
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    #[error("invalid JSON body: {0}")]
    Parse(String),
    #[error("invalid payload: {0}")]
    Validation(String),
    #[error("all API backends failed for {operation}")]
    AllBackendsFailed {
        operation: String,
        /// Failure reported by the last host tried.
        last: Option<Box<FetchError>>,
    },
}

impl FetchError {
    pub fn validation(reason: impl Into<String>) -> Self {
        FetchError::Validation(reason.into())
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            FetchError::Timeout => true,
            FetchError::AllBackendsFailed { last: Some(last), .. } => last.is_timeout(),
            _ => false,
        }
    }

    /// Banner text shown next to fallback data.
    pub fn user_message(&self) -> String {
        if self.is_timeout() {
            "Timeout: API not responding".to_string()
        } else {
            format!("Loading error: {self}")
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored value is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("unsupported country code: {0}")]
    UnsupportedCountry(String),
}
