use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{header, Client};
use teloxide::prelude::*;
use url::Url;

use crate::{config::MediaConfig, domain::MessageJob};

static URL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://[^\s]+").expect("valid url regex"));

const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".webp", ".gif"];

pub struct MediaExtractor {
    bot: Bot,
    http: Client,
    config: MediaConfig,
}

impl MediaExtractor {
    pub fn new(bot: Bot, http: Client, config: MediaConfig) -> Self {
        Self { bot, http, config }
    }

    /// Cheap pre-check deciding whether a message is worth a pipeline pass.
    pub fn has_media_candidates(job: &MessageJob) -> bool {
        !job.attachments.is_empty() || URL_REGEX.is_match(&job.text)
    }

    /// Resolves attachments and text URLs into image references, in order:
    /// attachments first, then confirmed text URLs. Anything that cannot be
    /// resolved or confirmed is dropped, never an error.
    pub async fn extract_image_urls(&self, job: &MessageJob) -> Vec<String> {
        let mut image_urls = Vec::new();

        for file_id in &job.attachments {
            match self.bot.get_file(file_id.clone()).await {
                Ok(file) => image_urls.push(self.file_download_url(&file.path)),
                Err(err) => {
                    tracing::warn!(
                        target: "media",
                        chat_id = job.chat_id.0,
                        message_id = job.message_id.0,
                        error = %err,
                        "첨부 파일 경로 조회 실패, 해당 첨부는 건너뜀"
                    );
                }
            }
        }

        let mut probes = Vec::new();
        for candidate in extract_candidate_urls(&job.text, self.config.max_urls_per_message) {
            if has_image_extension(&candidate) {
                image_urls.push(candidate.into());
            } else {
                probes.push(self.probe_content_type(candidate));
            }
        }
        image_urls.extend(join_all(probes).await.into_iter().flatten());

        image_urls
    }

    fn file_download_url(&self, file_path: &str) -> String {
        format!(
            "{}file/bot{}/{}",
            self.bot.api_url(),
            self.bot.token(),
            file_path
        )
    }

    async fn probe_content_type(&self, url: Url) -> Option<String> {
        match self
            .http
            .head(url.clone())
            .timeout(self.config.probe_timeout)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .filter(|value| value.starts_with("image/"))
                .map(|_| url.to_string()),
            Ok(_) => None,
            Err(err) => {
                tracing::debug!(target: "media", url = %url, error = %err, "HEAD probe failed");
                None
            }
        }
    }
}

fn extract_candidate_urls(text: &str, limit: usize) -> Vec<Url> {
    URL_REGEX
        .find_iter(text)
        .map(|m| normalize_url(m.as_str()))
        .filter_map(|raw| Url::parse(&raw).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .take(limit)
        .collect()
}

fn has_image_extension(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

fn normalize_url(raw: &str) -> String {
    let mut cleaned = raw.trim_end_matches(char::is_whitespace).to_string();
    while let Some(last) = cleaned.chars().last() {
        let should_trim = match last {
            ')' => !cleaned.contains('('),
            ']' => !cleaned.contains('['),
            '}' => !cleaned.contains('{'),
            '>' => !cleaned.contains('<'),
            '"' => count_char(&cleaned, '"') % 2 == 1,
            '\'' => count_char(&cleaned, '\'') % 2 == 1,
            ',' | '.' | '!' | '?' | ';' => true,
            _ => false,
        };
        if should_trim {
            cleaned.pop();
        } else {
            break;
        }
    }
    cleaned
}

fn count_char(value: &str, needle: char) -> usize {
    value.chars().filter(|ch| *ch == needle).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_urls_strip_trailing_punctuation() {
        let text = "여기 봐 (https://cdn.example/shot.png) 대박!";
        let urls = extract_candidate_urls(text, 5);
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].as_str(), "https://cdn.example/shot.png");
    }

    #[test]
    fn candidate_urls_respect_limit() {
        let text = "https://a.example/1.png https://a.example/2.png https://a.example/3.png";
        assert_eq!(extract_candidate_urls(text, 2).len(), 2);
    }

    #[test]
    fn image_extension_ignores_case_and_query() {
        let url = Url::parse("https://cdn.example/path/SHOT.PNG?ex=1&sig=abc").unwrap();
        assert!(has_image_extension(&url));

        let url = Url::parse("https://cdn.example/page.html").unwrap();
        assert!(!has_image_extension(&url));
    }

    #[test]
    fn non_http_schemes_are_dropped() {
        assert!(extract_candidate_urls("ftp://cdn.example/shot.png", 5).is_empty());
    }
}
