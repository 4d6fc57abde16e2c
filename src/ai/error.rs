use std::fmt;

/// Failure of a completion request to the model provider.
#[derive(Debug)]
pub enum AIError {
    NetworkError(String),
    TimeoutError(String),
    ParseError(String),
    ConfigError(String),
    AuthenticationError(String),
    RateLimitError(String),
    APIError(String),
}

impl fmt::Display for AIError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetworkError(msg) => write!(f, "Network error: {}", msg),
            Self::TimeoutError(msg) => write!(f, "Timeout: {}", msg),
            Self::ParseError(msg) => write!(f, "Unreadable API response: {}", msg),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Self::AuthenticationError(msg) => write!(f, "Authentication error: {}", msg),
            Self::RateLimitError(msg) => write!(f, "Rate limit error: {}", msg),
            Self::APIError(msg) => write!(f, "API error: {}", msg),
        }
    }
}

impl std::error::Error for AIError {}

impl From<reqwest::Error> for AIError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            AIError::TimeoutError(error.to_string())
        } else if error.is_decode() {
            AIError::ParseError(error.to_string())
        } else {
            AIError::NetworkError(error.to_string())
        }
    }
}
