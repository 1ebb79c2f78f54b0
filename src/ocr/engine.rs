use anyhow::Result;
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct RecognizedText {
    pub text: String,
    pub confidence: Option<f32>,
}

/// Text recognition over a single image reference. Exactly two variants
/// exist: the local tesseract pass and the remote Gemini fallback.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &'static str;

    async fn recognize(&self, image_url: &str) -> Result<RecognizedText>;

    /// Called once at process start.
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Called once at process stop.
    async fn destroy(&self) -> Result<()> {
        Ok(())
    }
}
