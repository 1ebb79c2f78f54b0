use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    analyzer::MessageAnalyzer,
    domain::MessageJob,
    media::MediaExtractor,
    tasks::{actions::ActionExecutor, coalescer::BatchHandler},
};

/// Walks a detached batch in arrival order and hands the first scam hit to
/// the action executor. Everything recoverable degrades; nothing here ever
/// returns an error into the coalescer.
pub struct BatchProcessor {
    media: Arc<MediaExtractor>,
    analyzer: Arc<MessageAnalyzer>,
    executor: Arc<ActionExecutor>,
}

impl BatchProcessor {
    pub fn new(
        media: Arc<MediaExtractor>,
        analyzer: Arc<MessageAnalyzer>,
        executor: Arc<ActionExecutor>,
    ) -> Self {
        Self {
            media,
            analyzer,
            executor,
        }
    }
}

#[async_trait]
impl BatchHandler for BatchProcessor {
    async fn process(&self, author_id: i64, batch: Vec<MessageJob>) {
        tracing::info!(target: "processor", author_id, total = batch.len(), "processing batch");

        for job in &batch {
            if !MediaExtractor::has_media_candidates(job) {
                continue;
            }

            let image_urls = self.media.extract_image_urls(job).await;
            if image_urls.is_empty() {
                continue;
            }

            let result = self.analyzer.scan(&image_urls).await;
            if result.matched {
                tracing::info!(
                    target: "processor",
                    author_id,
                    chat_id = job.chat_id.0,
                    message_id = job.message_id.0,
                    "배치에서 스캠 이미지 감지, 이후 메시지 스캔 중단"
                );
                // first hit wins; the executor is handed the whole batch
                // exactly once
                self.executor.execute(author_id, job, &batch, result).await;
                return;
            }
        }

        tracing::debug!(target: "processor", author_id, "batch clean, discarded");
    }
}
