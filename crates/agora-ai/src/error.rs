use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("assistant API key not configured")]
    MissingApiKey,

    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("upstream returned no content")]
    EmptyResponse,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Best-effort extraction of `error.message` from a provider error body.
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")?
                .get("message")?
                .as_str()
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(300).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_structured_message() {
        let body = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(error_message(body), "API key not valid");
        assert_eq!(error_message("gateway timeout"), "gateway timeout");
    }
}
