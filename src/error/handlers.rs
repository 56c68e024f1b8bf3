//! Translation of unsuccessful daemon responses into [`DockerError`] values

use crate::error::DockerError;
use serde::Deserialize;

/// Error body returned by the engine, e.g. `{"message": "No such image: ubuntu"}`
#[derive(Debug, Deserialize)]
struct EngineMessage {
    message: Option<String>,
}

/// Standard error handler for engine HTTP responses
pub struct EngineErrorHandler;

impl EngineErrorHandler {
    /// Build an engine error for `uri` from the status code and raw response body
    pub fn handle_status(uri: &str, status: u16, reason: Option<&str>, body: &[u8]) -> DockerError {
        DockerError::Engine {
            uri: uri.to_string(),
            status,
            reason: reason
                .map(str::to_string)
                .unwrap_or_else(|| Self::default_reason(status).to_string()),
            message: Self::parse_message(body),
        }
    }

    fn parse_message(body: &[u8]) -> Option<String> {
        if body.is_empty() {
            return None;
        }
        match serde_json::from_slice::<EngineMessage>(body) {
            Ok(parsed) => parsed.message,
            Err(_) => {
                let text = String::from_utf8_lossy(body).trim().to_string();
                (!text.is_empty()).then_some(text)
            }
        }
    }

    fn default_reason(status: u16) -> &'static str {
        match status {
            304 => "Not Modified",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            409 => "Conflict",
            500 => "Internal Server Error",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            _ => "Unexpected Status",
        }
    }
}
