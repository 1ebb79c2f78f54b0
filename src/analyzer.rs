use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use parking_lot::Mutex;

use crate::{
    domain::{ScanResult, WordMatch},
    ocr::OcrEngine,
};

/// Known scam pattern: a screenshot split across exactly this many images.
/// Keeps the paid remote engine off ordinary traffic.
const ESCALATION_IMAGE_COUNT: usize = 4;
const CACHE_MAX_ENTRIES: usize = 1000;

pub struct MessageAnalyzer {
    fast: Arc<dyn OcrEngine>,
    accurate: Option<Arc<dyn OcrEngine>>,
    banned_words: Vec<String>,
    cache: Mutex<HashMap<(String, String), ScanResult>>,
}

impl MessageAnalyzer {
    pub fn new(
        fast: Arc<dyn OcrEngine>,
        accurate: Option<Arc<dyn OcrEngine>>,
        banned_words: Vec<String>,
    ) -> Self {
        Self {
            fast,
            accurate,
            banned_words: banned_words
                .into_iter()
                .map(|word| word.to_lowercase())
                .collect(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn initialize(&self) -> Result<()> {
        self.fast.initialize().await?;
        if let Some(accurate) = &self.accurate {
            accurate.initialize().await?;
        }
        Ok(())
    }

    pub async fn shutdown(&self) {
        if let Err(err) = self.fast.destroy().await {
            tracing::warn!(target: "ocr", engine = self.fast.name(), error = %err, "engine teardown failed");
        }
        if let Some(accurate) = &self.accurate {
            if let Err(err) = accurate.destroy().await {
                tracing::warn!(target: "ocr", engine = accurate.name(), error = %err, "engine teardown failed");
            }
        }
        self.cache.lock().clear();
    }

    /// Scans image references in order. The first match wins and halts the
    /// pass; when every fast scan is clean and exactly four images are
    /// present, the first image is retried on the remote engine.
    pub async fn scan(&self, image_urls: &[String]) -> ScanResult {
        if image_urls.is_empty() {
            return ScanResult::clean();
        }

        for url in image_urls {
            let result = self.scan_with_engine(self.fast.as_ref(), url).await;
            if result.matched {
                return result;
            }
        }

        if image_urls.len() == ESCALATION_IMAGE_COUNT {
            if let Some(accurate) = &self.accurate {
                let first = &image_urls[0];
                tracing::debug!(
                    target: "scan",
                    engine = accurate.name(),
                    url = %first,
                    "fast 패스 전체 클린, 원격 엔진으로 에스컬레이션"
                );
                return self.scan_with_engine(accurate.as_ref(), first).await;
            }
        }

        ScanResult::clean()
    }

    async fn scan_with_engine(&self, engine: &dyn OcrEngine, image_url: &str) -> ScanResult {
        let key = (
            engine.name().to_string(),
            normalize_image_identity(image_url).to_string(),
        );

        if let Some(cached) = self.cache.lock().get(&key).cloned() {
            tracing::debug!(
                target: "scan",
                engine = engine.name(),
                url = %image_url,
                matched = cached.matched,
                "cache hit"
            );
            return cached;
        }

        let recognized = match engine.recognize(image_url).await {
            Ok(recognized) => recognized,
            Err(err) => {
                tracing::warn!(
                    target: "ocr",
                    engine = engine.name(),
                    url = %image_url,
                    error = %err,
                    "인식 실패, 해당 이미지는 클린 처리"
                );
                return ScanResult::clean();
            }
        };

        tracing::debug!(
            target: "ocr",
            engine = engine.name(),
            url = %image_url,
            chars = recognized.text.len(),
            confidence = recognized.confidence.map(f64::from),
            "recognition complete"
        );

        let text = recognized.text.to_lowercase();
        let matches: Vec<WordMatch> = self
            .banned_words
            .iter()
            .filter(|word| text.contains(word.as_str()))
            .map(|word| WordMatch {
                image_url: image_url.to_string(),
                word: word.clone(),
            })
            .collect();
        let result = ScanResult {
            matched: !matches.is_empty(),
            matches,
        };

        if result.matched {
            tracing::info!(
                target: "scan",
                engine = engine.name(),
                url = %image_url,
                words = result.matches.len(),
                "이미지에서 금지 단어 감지"
            );
        }

        let mut cache = self.cache.lock();
        if cache.len() >= CACHE_MAX_ENTRIES {
            cache.clear();
        }
        cache.insert(key, result.clone());
        result
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }
}

/// Re-signed platform URLs differ only in their query string; the image
/// behind them does not.
fn normalize_image_identity(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::anyhow;
    use async_trait::async_trait;

    use super::*;
    use crate::ocr::RecognizedText;

    struct ScriptedEngine {
        name: &'static str,
        texts: HashMap<String, String>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl ScriptedEngine {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                texts: HashMap::new(),
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(name: &'static str) -> Self {
            Self {
                fail: true,
                ..Self::new(name)
            }
        }

        fn with_text(mut self, url: &str, text: &str) -> Self {
            self.texts.insert(url.to_string(), text.to_string());
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OcrEngine for ScriptedEngine {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn recognize(&self, image_url: &str) -> Result<RecognizedText> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(anyhow!("engine offline"));
            }
            Ok(RecognizedText {
                text: self.texts.get(image_url).cloned().unwrap_or_default(),
                confidence: None,
            })
        }
    }

    fn urls(count: usize) -> Vec<String> {
        (0..count)
            .map(|i| format!("https://cdn.example/img{i}.png"))
            .collect()
    }

    fn banned() -> Vec<String> {
        vec!["free gift".to_string()]
    }

    #[tokio::test]
    async fn first_match_wins_and_later_images_are_never_scanned() {
        let fast = Arc::new(
            ScriptedEngine::new("tesseract")
                .with_text("https://cdn.example/img1.png", "claim your FREE GIFT today"),
        );
        let analyzer = MessageAnalyzer::new(fast.clone(), None, banned());

        let result = analyzer.scan(&urls(3)).await;

        assert!(result.matched);
        assert_eq!(
            result.matches,
            vec![WordMatch {
                image_url: "https://cdn.example/img1.png".to_string(),
                word: "free gift".to_string(),
            }]
        );
        // img0 and img1 scanned, img2 never reached
        assert_eq!(fast.calls(), 2);
    }

    #[tokio::test]
    async fn repeated_scan_hits_cache_and_calls_engine_once() {
        let fast = Arc::new(
            ScriptedEngine::new("tesseract")
                .with_text("https://cdn.example/img0.png", "free gift inside"),
        );
        let analyzer = MessageAnalyzer::new(fast.clone(), None, banned());

        let first = analyzer.scan(&urls(1)).await;
        let second = analyzer.scan(&urls(1)).await;

        assert_eq!(first, second);
        assert_eq!(fast.calls(), 1);
    }

    #[tokio::test]
    async fn query_string_variants_share_one_cache_entry() {
        let signed = "https://cdn.example/img.png?ex=123&sig=abc".to_string();
        let resigned = "https://cdn.example/img.png?ex=456&sig=def".to_string();
        let fast = Arc::new(ScriptedEngine::new("tesseract").with_text(&signed, "free gift"));
        let analyzer = MessageAnalyzer::new(fast.clone(), None, banned());

        let first = analyzer.scan(std::slice::from_ref(&signed)).await;
        let second = analyzer.scan(std::slice::from_ref(&resigned)).await;

        assert!(first.matched && second.matched);
        assert_eq!(fast.calls(), 1);
        assert_eq!(analyzer.cache_len(), 1);
    }

    #[tokio::test]
    async fn escalates_only_on_exactly_four_clean_images() {
        for (count, expect_escalation) in [(3usize, false), (4, true), (5, false)] {
            let fast = Arc::new(ScriptedEngine::new("tesseract"));
            let accurate = Arc::new(
                ScriptedEngine::new("gemini")
                    .with_text("https://cdn.example/img0.png", "Claim your FREE GIFT now"),
            );
            let analyzer =
                MessageAnalyzer::new(fast.clone(), Some(accurate.clone()), banned());

            let result = analyzer.scan(&urls(count)).await;

            assert_eq!(fast.calls(), count);
            assert_eq!(accurate.calls(), usize::from(expect_escalation));
            assert_eq!(result.matched, expect_escalation);
            if expect_escalation {
                assert_eq!(
                    result.matches,
                    vec![WordMatch {
                        image_url: "https://cdn.example/img0.png".to_string(),
                        word: "free gift".to_string(),
                    }]
                );
            }
        }
    }

    #[tokio::test]
    async fn four_images_without_remote_engine_stay_clean() {
        let fast = Arc::new(ScriptedEngine::new("tesseract"));
        let analyzer = MessageAnalyzer::new(fast.clone(), None, banned());

        let result = analyzer.scan(&urls(4)).await;

        assert!(!result.matched);
        assert_eq!(fast.calls(), 4);
    }

    #[tokio::test]
    async fn engine_failure_degrades_to_clean_and_is_not_cached() {
        let fast = Arc::new(ScriptedEngine::failing("tesseract"));
        let analyzer = MessageAnalyzer::new(fast.clone(), None, banned());

        assert!(!analyzer.scan(&urls(1)).await.matched);
        assert!(!analyzer.scan(&urls(1)).await.matched);

        assert_eq!(fast.calls(), 2);
        assert_eq!(analyzer.cache_len(), 0);
    }

    #[tokio::test]
    async fn cache_clears_entirely_past_the_bound() {
        let fast = Arc::new(ScriptedEngine::new("tesseract"));
        let analyzer = MessageAnalyzer::new(fast.clone(), None, banned());

        for i in 0..1001usize {
            let url = vec![format!("https://cdn.example/many{i}.png")];
            analyzer.scan(&url).await;
        }
        assert_eq!(analyzer.cache_len(), 1);

        // entry 0 was dropped by the clear, so the next lookup is a miss
        let calls_before = fast.calls();
        analyzer
            .scan(&vec!["https://cdn.example/many0.png".to_string()])
            .await;
        assert_eq!(fast.calls(), calls_before + 1);
    }

    #[tokio::test]
    async fn collects_every_matched_word_for_an_image() {
        let fast = Arc::new(ScriptedEngine::new("tesseract").with_text(
            "https://cdn.example/img0.png",
            "crypto casino with a free gift",
        ));
        let analyzer = MessageAnalyzer::new(
            fast,
            None,
            vec!["crypto casino".to_string(), "FREE GIFT".to_string()],
        );

        let result = analyzer.scan(&urls(1)).await;

        assert!(result.matched);
        let words: Vec<_> = result.matches.iter().map(|m| m.word.as_str()).collect();
        assert_eq!(words, vec!["crypto casino", "free gift"]);
    }

    #[tokio::test]
    async fn four_image_fallback_end_to_end() {
        let fast = Arc::new(ScriptedEngine::new("tesseract"));
        let accurate = Arc::new(
            ScriptedEngine::new("gemini")
                .with_text("https://cdn.example/img0.png", "Claim your FREE GIFT now"),
        );
        let analyzer = MessageAnalyzer::new(fast.clone(), Some(accurate.clone()), banned());

        let result = analyzer.scan(&urls(4)).await;

        assert!(result.matched);
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches[0].image_url, "https://cdn.example/img0.png");
        assert_eq!(result.matches[0].word, "free gift");
        assert_eq!(fast.calls(), 4);
        assert_eq!(accurate.calls(), 1);
    }
}
