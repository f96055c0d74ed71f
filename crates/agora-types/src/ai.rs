//! Assistant request shapes: what the app sends us, and what we send to the
//! generative-AI provider (`generateContent`).

use serde::{Deserialize, Serialize};

// -- App-facing --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatRequest {
    pub messages: Vec<ChatTurn>,
    #[serde(default)]
    pub system: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VisionRequest {
    pub prompt: String,
    pub image_base64: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiReply {
    pub reply: String,
}

// -- Provider wire format --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineData {
    #[serde(alias = "mimeType")]
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text { text: String },
    InlineData {
        #[serde(alias = "inlineData")]
        inline_data: InlineData,
    },
    /// Function calls, executable code and whatever else the provider adds.
    Other(serde_json::Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Candidate {
    pub content: Option<Content>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate, if it produced any.
    pub fn first_text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                Part::InlineData { .. } | Part::Other(_) => None,
            })
            .collect();
        if text.is_empty() { None } else { Some(text) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parts_serialize_untagged() {
        let text = serde_json::to_value(Part::Text { text: "hi".into() }).unwrap();
        assert_eq!(text, json!({ "text": "hi" }));

        let image = serde_json::to_value(Part::InlineData {
            inline_data: InlineData {
                mime_type: "image/png".into(),
                data: "AAAA".into(),
            },
        })
        .unwrap();
        assert_eq!(image, json!({ "inline_data": { "mime_type": "image/png", "data": "AAAA" } }));
    }

    #[test]
    fn first_text_joins_parts() {
        let resp: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "role": "model", "parts": [{ "text": "Hello " }, { "text": "there" }] } }]
        }))
        .unwrap();
        assert_eq!(resp.first_text().as_deref(), Some("Hello there"));

        let empty: GenerateContentResponse = serde_json::from_value(json!({})).unwrap();
        assert!(empty.first_text().is_none());
    }

    #[test]
    fn non_text_parts_do_not_hide_the_text() {
        let resp: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "role": "model", "parts": [
                { "inlineData": { "mimeType": "image/png", "data": "AAAA" } },
                { "text": "Here is your map." },
                { "functionCall": { "name": "lookup", "args": {} } }
            ] } }]
        }))
        .unwrap();
        let parts = &resp.candidates[0].content.as_ref().unwrap().parts;
        assert!(matches!(&parts[0], Part::InlineData { inline_data } if inline_data.mime_type == "image/png"));
        assert!(matches!(&parts[2], Part::Other(_)));
        assert_eq!(resp.first_text().as_deref(), Some("Here is your map."));
    }
}
