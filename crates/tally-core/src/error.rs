//! Error types for Tally

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{provider} request failed{}: {message}", status_suffix(.status))]
    ProviderRequest {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Malformed AI response: {0}")]
    MalformedResponse(#[source] serde_json::Error),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status
        .map(|s| format!(" (status {})", s))
        .unwrap_or_default()
}

impl Error {
    /// Build a provider error from a transport-level reqwest failure
    pub(crate) fn provider(provider: &str, err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out: {}", err)
        } else {
            err.to_string()
        };
        Error::ProviderRequest {
            provider: provider.to_string(),
            status: err.status().map(|s| s.as_u16()),
            message,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_request_display_with_status() {
        let err = Error::ProviderRequest {
            provider: "groq".to_string(),
            status: Some(429),
            message: "rate limited".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "groq request failed (status 429): rate limited"
        );
    }

    #[test]
    fn test_provider_request_display_without_status() {
        let err = Error::ProviderRequest {
            provider: "gemini".to_string(),
            status: None,
            message: "connection refused".to_string(),
        };
        assert_eq!(err.to_string(), "gemini request failed: connection refused");
    }

    #[test]
    fn test_malformed_response_keeps_source() {
        let parse_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err = Error::MalformedResponse(parse_err);
        assert!(std::error::Error::source(&err).is_some());
    }
}
