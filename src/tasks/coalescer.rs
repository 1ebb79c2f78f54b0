use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::{task::JoinHandle, time::sleep};

use crate::domain::{CoalescerSnapshot, MessageJob};

/// Receives one author's detached batch, in arrival order, exactly once per
/// debounce window.
#[async_trait]
pub trait BatchHandler: Send + Sync {
    async fn process(&self, author_id: i64, batch: Vec<MessageJob>);
}

struct PendingBatch {
    messages: Vec<MessageJob>,
    timer: JoinHandle<()>,
}

/// Groups an author's rapid-fire messages into one pipeline pass after a
/// quiet period. Owns the per-author pending table and timer lifecycles;
/// nothing outside sees them.
pub struct MessageCoalescer {
    inner: Arc<CoalescerInner>,
}

struct CoalescerInner {
    pending: Mutex<HashMap<i64, PendingBatch>>,
    delay: Duration,
    handler: Arc<dyn BatchHandler>,
}

impl MessageCoalescer {
    pub fn new(delay: Duration, handler: Arc<dyn BatchHandler>) -> Self {
        Self {
            inner: Arc::new(CoalescerInner {
                pending: Mutex::new(HashMap::new()),
                delay,
                handler,
            }),
        }
    }

    /// Appends to the author's pending batch, creating it if absent. Every
    /// message cancels and replaces the author's previous timer, so at most
    /// one timer is live per author at any instant.
    pub fn enqueue(&self, author_id: i64, job: MessageJob) {
        let mut pending = self.inner.pending.lock();
        let timer = CoalescerInner::start_timer(&self.inner, author_id);
        match pending.get_mut(&author_id) {
            Some(batch) => {
                batch.messages.push(job);
                let previous = std::mem::replace(&mut batch.timer, timer);
                previous.abort();
            }
            None => {
                pending.insert(
                    author_id,
                    PendingBatch {
                        messages: vec![job],
                        timer,
                    },
                );
            }
        }
    }

    pub fn snapshot(&self) -> CoalescerSnapshot {
        let pending = self.inner.pending.lock();
        CoalescerSnapshot {
            pending_authors: pending.len(),
            queued_messages: pending.values().map(|batch| batch.messages.len()).sum(),
        }
    }

    /// Cancels every pending timer and drops queued messages. Shutdown only;
    /// batches already detached run to completion.
    pub fn abort_pending(&self) {
        let mut pending = self.inner.pending.lock();
        for (_, batch) in pending.drain() {
            batch.timer.abort();
        }
    }
}

impl CoalescerInner {
    fn start_timer(this: &Arc<Self>, author_id: i64) -> JoinHandle<()> {
        let inner = Arc::clone(this);
        tokio::spawn(async move {
            sleep(inner.delay).await;
            inner.fire(author_id).await;
        })
    }

    async fn fire(&self, author_id: i64) {
        // Detach under the lock, before any await: a message arriving while
        // the batch is being processed starts a fresh, independent batch,
        // and nothing can cancel processing once it is detached. The slot
        // may already be empty when an aborted timer raced past its sleep;
        // that fire is a no-op. The replaced timer handle is dropped, not
        // aborted: it can be this very task.
        let batch = {
            let mut pending = self.pending.lock();
            match pending.remove(&author_id) {
                Some(batch) => batch.messages,
                None => return,
            }
        };
        if batch.is_empty() {
            return;
        }

        tracing::debug!(
            target: "coalescer",
            author_id,
            total = batch.len(),
            "디바운스 윈도우 종료, 배치 처리 시작"
        );
        self.handler.process(author_id, batch).await;
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use teloxide::{prelude::*, types::MessageId};

    use super::*;

    struct RecordingHandler {
        batches: Mutex<Vec<(i64, Vec<String>)>>,
    }

    impl RecordingHandler {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                batches: Mutex::new(Vec::new()),
            })
        }

        fn batches(&self) -> Vec<(i64, Vec<String>)> {
            self.batches.lock().clone()
        }
    }

    #[async_trait]
    impl BatchHandler for RecordingHandler {
        async fn process(&self, author_id: i64, batch: Vec<MessageJob>) {
            self.batches
                .lock()
                .push((author_id, batch.into_iter().map(|job| job.text).collect()));
        }
    }

    fn job(id: i32, text: &str) -> MessageJob {
        MessageJob {
            chat_id: ChatId(-1001),
            chat_title: Some("테스트 그룹".to_string()),
            message_id: MessageId(id),
            author_id: UserId(7),
            from_display: "tester".to_string(),
            username: None,
            text: text.to_string(),
            attachments: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    const DELAY: Duration = Duration::from_millis(2000);

    #[tokio::test(start_paused = true)]
    async fn burst_is_processed_once_in_arrival_order() {
        let handler = RecordingHandler::new();
        let coalescer = MessageCoalescer::new(DELAY, handler.clone());

        coalescer.enqueue(7, job(1, "one"));
        coalescer.enqueue(7, job(2, "two"));
        coalescer.enqueue(7, job(3, "three"));
        assert_eq!(coalescer.snapshot().queued_messages, 3);

        sleep(Duration::from_millis(2500)).await;

        let batches = handler.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].0, 7);
        assert_eq!(batches[0].1, vec!["one", "two", "three"]);
        assert_eq!(coalescer.snapshot().pending_authors, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn new_message_extends_the_window() {
        let handler = RecordingHandler::new();
        let coalescer = MessageCoalescer::new(DELAY, handler.clone());

        coalescer.enqueue(7, job(1, "one"));
        sleep(Duration::from_millis(1500)).await;
        coalescer.enqueue(7, job(2, "two"));

        // first timer would have fired at 2000ms but was replaced
        sleep(Duration::from_millis(1500)).await;
        assert!(handler.batches().is_empty());

        sleep(Duration::from_millis(1000)).await;
        assert_eq!(
            handler.batches(),
            vec![(7, vec!["one".to_string(), "two".to_string()])]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn authors_batch_independently() {
        let handler = RecordingHandler::new();
        let coalescer = MessageCoalescer::new(DELAY, handler.clone());

        let mut other = job(1, "from-nine");
        other.author_id = UserId(9);
        coalescer.enqueue(7, job(2, "from-seven"));
        coalescer.enqueue(9, other);
        assert_eq!(coalescer.snapshot().pending_authors, 2);

        sleep(Duration::from_millis(2500)).await;

        let mut batches = handler.batches();
        batches.sort();
        assert_eq!(
            batches,
            vec![
                (7, vec!["from-seven".to_string()]),
                (9, vec!["from-nine".to_string()]),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn message_after_fire_starts_a_fresh_batch() {
        let handler = RecordingHandler::new();
        let coalescer = MessageCoalescer::new(DELAY, handler.clone());

        coalescer.enqueue(7, job(1, "first"));
        sleep(Duration::from_millis(2500)).await;

        coalescer.enqueue(7, job(2, "second"));
        sleep(Duration::from_millis(2500)).await;

        assert_eq!(
            handler.batches(),
            vec![
                (7, vec!["first".to_string()]),
                (7, vec!["second".to_string()]),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn abort_pending_cancels_queued_batches() {
        let handler = RecordingHandler::new();
        let coalescer = MessageCoalescer::new(DELAY, handler.clone());

        coalescer.enqueue(7, job(1, "doomed"));
        coalescer.abort_pending();

        sleep(Duration::from_millis(2500)).await;
        assert!(handler.batches().is_empty());
        assert_eq!(coalescer.snapshot().pending_authors, 0);
    }
}
