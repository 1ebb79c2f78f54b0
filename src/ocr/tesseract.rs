use std::io::Write;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tokio::process::Command;

use crate::config::TesseractConfig;

use super::engine::{OcrEngine, RecognizedText};

pub struct TesseractEngine {
    http: Client,
    config: TesseractConfig,
}

impl TesseractEngine {
    pub fn new(http: Client, config: TesseractConfig) -> Self {
        Self { http, config }
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    async fn initialize(&self) -> Result<()> {
        let output = Command::new(&self.config.binary)
            .arg("--version")
            .output()
            .await
            .with_context(|| format!("failed to launch {}", self.config.binary))?;
        if !output.status.success() {
            bail!(
                "{} --version exited with {}",
                self.config.binary,
                output.status
            );
        }
        // version banner lands on stdout or stderr depending on the build
        let banner = if output.stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr).into_owned()
        } else {
            String::from_utf8_lossy(&output.stdout).into_owned()
        };
        tracing::info!(
            target: "ocr",
            version = banner.lines().next().unwrap_or("unknown"),
            languages = %self.config.languages,
            "tesseract 엔진 준비 완료"
        );
        Ok(())
    }

    async fn recognize(&self, image_url: &str) -> Result<RecognizedText> {
        let response = self
            .http
            .get(image_url)
            .send()
            .await
            .with_context(|| format!("failed to fetch image {image_url}"))?
            .error_for_status()?;
        let bytes = response.bytes().await?;

        let mut image_file = tempfile::NamedTempFile::new()?;
        image_file.write_all(&bytes)?;

        let output = Command::new(&self.config.binary)
            .arg(image_file.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.config.languages)
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.config.binary))?;

        if !output.status.success() {
            bail!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(RecognizedText {
            text: String::from_utf8_lossy(&output.stdout).into_owned(),
            confidence: None,
        })
    }
}
