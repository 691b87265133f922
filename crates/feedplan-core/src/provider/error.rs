//! Backend call failures.

/// Why backend output could not be turned into a payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadParseError {
    #[error("backend returned an empty response")]
    Empty,
    #[error("no JSON found in backend response")]
    NoJson,
    #[error("backend JSON has the wrong shape: {0}")]
    Invalid(String),
}

/// A failed backend call.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("rate limited by backend")]
    RateLimited,
    #[error("backend server error (HTTP {status})")]
    Server { status: u16 },
    #[error("backend rejected request (HTTP {status}): {body}")]
    Http { status: u16, body: String },
    #[error("backend not configured: {0}")]
    NotConfigured(String),
    #[error("malformed backend output: {0}")]
    MalformedOutput(#[from] PayloadParseError),
}

impl ProviderError {
    /// Transient failures and unparseable output are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout
            | Self::Connection(_)
            | Self::RateLimited
            | Self::Server { .. }
            | Self::MalformedOutput(_) => true,
            Self::Http { .. } | Self::NotConfigured(_) => false,
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        match status {
            429 => Self::RateLimited,
            500..=599 => Self::Server { status },
            _ => Self::Http {
                status,
                body: truncate(body.into(), 500),
            },
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if let Some(status) = err.status() {
            Self::from_status(status.as_u16(), err.to_string())
        } else if err.is_decode() {
            Self::MalformedOutput(PayloadParseError::Invalid(err.to_string()))
        } else {
            Self::Connection(err.to_string())
        }
    }
}

fn truncate(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
    s
}
