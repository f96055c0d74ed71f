//! Live audio sessions: the provider's bidirectional streaming socket.
//! The relay itself lives in the gateway; this module only knows the
//! endpoint and the opening frame.

use serde_json::{Value, json};

use crate::GeminiClient;
use crate::error::AiError;

pub const DEFAULT_LIVE_MODEL: &str = "gemini-2.0-flash-exp";

const LIVE_PATH: &str =
    "/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

impl GeminiClient {
    /// WebSocket URL of the live endpoint, key included.
    pub fn live_url(&self) -> Result<String, AiError> {
        let key = self.api_key().ok_or(AiError::MissingApiKey)?;
        let base = self.base_url();
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        Ok(format!("{}{}?key={}", ws_base, LIVE_PATH, key))
    }
}

/// First frame of every live session: selects the model and asks for
/// spoken replies.
pub fn setup_message(model: &str, system: Option<&str>) -> Value {
    let mut setup = json!({
        "model": format!("models/{}", model),
        "generationConfig": { "responseModalities": ["AUDIO"] }
    });
    if let Some(system) = system {
        setup["systemInstruction"] = json!({ "parts": [{ "text": system }] });
    }
    json!({ "setup": setup })
}
