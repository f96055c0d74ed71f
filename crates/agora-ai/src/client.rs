// Generative-AI client for the assistant features.
//
// Both chat and vision go through the provider's `generateContent` endpoint;
// the app-facing shapes in `agora_types::ai` are translated here.

use tracing::{debug, warn};

use agora_types::ai::{
    ChatRequest, ChatRole, Content, GenerateContentRequest, GenerateContentResponse, InlineData,
    Part, VisionRequest,
};

use crate::error::{AiError, error_message};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Images above this size are refused before they are forwarded.
pub const MAX_IMAGE_BASE64_LEN: usize = 8 * 1024 * 1024;

#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>, model: String, base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.filter(|k| !k.is_empty()),
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Continue a conversation and return the assistant's reply.
    pub async fn chat(&self, req: &ChatRequest) -> Result<String, AiError> {
        let body = chat_body(req)?;
        self.generate(&body).await
    }

    /// Describe or answer a question about a single image.
    pub async fn vision(&self, req: &VisionRequest) -> Result<String, AiError> {
        let body = vision_body(req)?;
        self.generate(&body).await
    }

    async fn generate(&self, body: &GenerateContentRequest) -> Result<String, AiError> {
        let api_key = self.api_key.as_deref().ok_or(AiError::MissingApiKey)?;
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        debug!(model = %self.model, turns = body.contents.len(), "generateContent");

        let resp = self
            .http
            .post(&url)
            .query(&[("key", api_key)])
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = error_message(&text);
            warn!(status = status.as_u16(), %message, "assistant request failed");
            return Err(AiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateContentResponse = resp.json().await?;
        parsed.first_text().ok_or(AiError::EmptyResponse)
    }
}

fn chat_body(req: &ChatRequest) -> Result<GenerateContentRequest, AiError> {
    if req.messages.is_empty() {
        return Err(AiError::InvalidRequest("conversation is empty".into()));
    }

    let contents = req
        .messages
        .iter()
        .map(|turn| Content {
            role: Some(
                match turn.role {
                    ChatRole::User => "user",
                    ChatRole::Assistant => "model",
                }
                .to_string(),
            ),
            parts: vec![Part::Text {
                text: turn.content.clone(),
            }],
        })
        .collect();

    let system_instruction = req
        .system
        .as_ref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| Content {
            role: None,
            parts: vec![Part::Text { text: s.clone() }],
        });

    Ok(GenerateContentRequest {
        contents,
        system_instruction,
    })
}

fn vision_body(req: &VisionRequest) -> Result<GenerateContentRequest, AiError> {
    if !req.mime_type.starts_with("image/") {
        return Err(AiError::InvalidRequest(format!(
            "unsupported media type {}",
            req.mime_type
        )));
    }
    if req.image_base64.is_empty() || req.image_base64.len() > MAX_IMAGE_BASE64_LEN {
        return Err(AiError::InvalidRequest("image missing or too large".into()));
    }

    // Data URLs from the browser carry a `data:<mime>;base64,` prefix.
    let data = req
        .image_base64
        .split_once(";base64,")
        .map(|(_, d)| d)
        .unwrap_or(&req.image_base64);

    Ok(GenerateContentRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![
                Part::Text {
                    text: req.prompt.clone(),
                },
                Part::InlineData {
                    inline_data: InlineData {
                        mime_type: req.mime_type.clone(),
                        data: data.to_string(),
                    },
                },
            ],
        }],
        system_instruction: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_types::ai::ChatTurn;

    #[test]
    fn chat_roles_map_to_provider_roles() {
        let req = ChatRequest {
            messages: vec![
                ChatTurn { role: ChatRole::User, content: "hi".into() },
                ChatTurn { role: ChatRole::Assistant, content: "hello".into() },
            ],
            system: Some("Be brief.".into()),
        };
        let body = chat_body(&req).unwrap();
        let roles: Vec<_> = body.contents.iter().map(|c| c.role.clone().unwrap()).collect();
        assert_eq!(roles, vec!["user", "model"]);
        assert!(body.system_instruction.is_some());
    }

    #[test]
    fn empty_conversation_is_rejected() {
        let req = ChatRequest { messages: vec![], system: None };
        assert!(matches!(chat_body(&req), Err(AiError::InvalidRequest(_))));
    }

    #[test]
    fn vision_strips_data_url_prefix() {
        let req = VisionRequest {
            prompt: "What is this?".into(),
            image_base64: "data:image/png;base64,iVBORw0KGgo=".into(),
            mime_type: "image/png".into(),
        };
        let body = vision_body(&req).unwrap();
        match &body.contents[0].parts[1] {
            Part::InlineData { inline_data } => assert_eq!(inline_data.data, "iVBORw0KGgo="),
            other => panic!("unexpected part {:?}", other),
        }
    }

    #[test]
    fn vision_rejects_non_images() {
        let req = VisionRequest {
            prompt: "read".into(),
            image_base64: "AAAA".into(),
            mime_type: "application/pdf".into(),
        };
        assert!(vision_body(&req).is_err());
    }
}
