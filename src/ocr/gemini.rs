use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{header, Client};

use super::engine::{OcrEngine, RecognizedText};
use super::vision::{build_request, extract_text, GenerateContentResponse, GEMINI_API_BASE};

pub struct GeminiEngine {
    http: Client,
    api_key: String,
    model: String,
}

impl GeminiEngine {
    pub fn new(http: Client, api_key: String, model: String) -> Self {
        Self {
            http,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl OcrEngine for GeminiEngine {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn recognize(&self, image_url: &str) -> Result<RecognizedText> {
        let image = self
            .http
            .get(image_url)
            .send()
            .await
            .with_context(|| format!("failed to fetch image {image_url}"))?
            .error_for_status()?;
        let mime_type = image
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        let bytes = image.bytes().await?;

        let request = build_request(mime_type, STANDARD.encode(&bytes));
        let url = format!(
            "{GEMINI_API_BASE}/{}:generateContent?key={}",
            self.model, self.api_key
        );
        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        let body: GenerateContentResponse = response.json().await?;
        let text = extract_text(body)?;

        Ok(RecognizedText {
            text,
            confidence: None,
        })
    }
}
