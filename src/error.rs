use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("backend is not configured")]
    NotConfigured,
    #[error("network error: {0}")]
    Network(String),
    #[error("backend returned {status}: {message}")]
    Api { status: u16, code: Option<String>, message: String },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("not signed in")]
    Unauthenticated,
}

impl BackendError {
    pub fn is_offline(&self) -> bool {
        matches!(self, BackendError::Network(_))
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else {
            BackendError::Network(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
    #[error("no usable data directory")]
    NoDataDir,
}
