use tracing::debug;

use agora_types::api::GeocodeResponse;

use crate::error::{AiError, error_message};

pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";

/// Pass-through to a Nominatim-compatible reverse geocoder.
#[derive(Clone)]
pub struct Geocoder {
    http: reqwest::Client,
    base_url: String,
    user_agent: String,
}

impl Geocoder {
    pub fn new(base_url: String, user_agent: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            user_agent,
        }
    }

    pub async fn reverse(&self, lat: f64, lon: f64) -> Result<GeocodeResponse, AiError> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(AiError::InvalidRequest("coordinates out of range".into()));
        }

        debug!(lat, lon, "reverse geocode");
        let resp = self
            .http
            .get(format!("{}/reverse", self.base_url))
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .query(&[
                ("format", "json".to_string()),
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AiError::Status {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        let value: serde_json::Value = resp.json().await?;
        // Nominatim answers 200 with {"error": "..."} for points in the sea.
        if let Some(err) = value.get("error").and_then(|e| e.as_str()) {
            return Err(AiError::Status {
                status: 404,
                message: err.to_string(),
            });
        }

        let display_name = value
            .get("display_name")
            .and_then(|v| v.as_str())
            .ok_or(AiError::EmptyResponse)?
            .to_string();

        Ok(GeocodeResponse {
            display_name,
            address: value.get("address").cloned().unwrap_or_default(),
        })
    }
}
