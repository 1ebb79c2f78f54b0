use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use teloxide::{prelude::*, types::ChatPermissions};

use crate::{
    config::AppConfig,
    domain::{MessageJob, ScanResult},
    infrastructure::notifier::notify_admin_group,
};

const TRIGGER_TABLE_MAX: usize = 5000;
const TRIGGER_EVICT_COUNT: usize = 1000;

/// Per-author confirmed-violation counts with a soft memory bound: past
/// 5000 authors the oldest 1000 entries are dropped, history and all.
pub struct TriggerLedger {
    counts: Mutex<IndexMap<i64, u32>>,
}

impl TriggerLedger {
    pub fn new() -> Self {
        Self {
            counts: Mutex::new(IndexMap::new()),
        }
    }

    pub fn record(&self, author_id: i64) -> u32 {
        let mut counts = self.counts.lock();
        let entry = counts.entry(author_id).or_insert(0);
        *entry += 1;
        let count = *entry;
        if counts.len() > TRIGGER_TABLE_MAX {
            counts.drain(..TRIGGER_EVICT_COUNT);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.counts.lock().len()
    }
}

enum PunishOutcome {
    Restricted { until: DateTime<Utc> },
    BelowThreshold { count: u32, threshold: u32 },
    CannotModerate,
    DisabledByConfig,
    Failed(String),
}

impl PunishOutcome {
    fn describe(&self, tz: &Tz) -> String {
        match self {
            PunishOutcome::Restricted { until } => format!(
                "예 ({}까지)",
                until.with_timezone(tz).format("%Y-%m-%d %H:%M:%S")
            ),
            PunishOutcome::BelowThreshold { count, threshold } => {
                format!("아니오 (누적 {count}/{threshold})")
            }
            PunishOutcome::CannotModerate => "아니오 (제재 불가)".to_string(),
            PunishOutcome::DisabledByConfig => "아니오 (설정)".to_string(),
            PunishOutcome::Failed(reason) => format!("아니오 (오류: {reason})"),
        }
    }
}

/// Carries out the moderation side of a confirmed detection: bulk delete of
/// the batch, threshold-gated timed restriction, admin audit log.
pub struct ActionExecutor {
    bot: Bot,
    config: Arc<AppConfig>,
    ledger: TriggerLedger,
}

impl ActionExecutor {
    pub fn new(bot: Bot, config: Arc<AppConfig>) -> Self {
        Self {
            bot,
            config,
            ledger: TriggerLedger::new(),
        }
    }

    pub async fn execute(
        &self,
        author_id: i64,
        trigger: &MessageJob,
        batch: &[MessageJob],
        result: ScanResult,
    ) {
        let trigger_count = self.ledger.record(author_id);

        let mut deleted = 0usize;
        if self.config.moderation.should_delete {
            for job in batch {
                match self.bot.delete_message(job.chat_id, job.message_id).await {
                    Ok(_) => deleted += 1,
                    Err(err) => {
                        tracing::error!(
                            target: "moderation",
                            error = %err,
                            chat_id = job.chat_id.0,
                            message_id = job.message_id.0,
                            "메시지 삭제 실패"
                        );
                    }
                }
            }
        }

        let punish = if self.config.moderation.should_punish {
            self.restrict_author(trigger, trigger_count).await
        } else {
            PunishOutcome::DisabledByConfig
        };

        let tz = self.timezone();
        tracing::info!(
            target: "moderation",
            author_id,
            trigger_count,
            batch = batch.len(),
            deleted,
            punished = %punish.describe(&tz),
            "스캠 이미지 배치 조치 완료"
        );

        let log = self.format_audit_log(trigger, batch.len(), deleted, &punish, trigger_count, &result, &tz);
        notify_admin_group(&self.bot, self.config.as_ref(), &log).await;
    }

    async fn restrict_author(&self, trigger: &MessageJob, trigger_count: u32) -> PunishOutcome {
        let threshold = self.config.moderation.triggers_before_action;
        if trigger_count < threshold {
            return PunishOutcome::BelowThreshold {
                count: trigger_count,
                threshold,
            };
        }

        // A failed member lookup degrades to "cannot moderate"; the batch
        // has already been handled.
        match self
            .bot
            .get_chat_member(trigger.chat_id, trigger.author_id)
            .await
        {
            Ok(member) if member.is_privileged() => {
                tracing::warn!(
                    target: "moderation",
                    chat_id = trigger.chat_id.0,
                    user_id = trigger.author_id.0,
                    "관리자 권한 사용자는 제재하지 않습니다"
                );
                PunishOutcome::CannotModerate
            }
            Ok(_) => {
                let duration = chrono::Duration::from_std(self.config.moderation.restrict_duration)
                    .unwrap_or_else(|_| chrono::Duration::days(7));
                let until = Utc::now() + duration;
                match self
                    .bot
                    .restrict_chat_member(
                        trigger.chat_id,
                        trigger.author_id,
                        ChatPermissions::empty(),
                    )
                    .until_date(until)
                    .await
                {
                    Ok(_) => PunishOutcome::Restricted { until },
                    Err(err) => {
                        tracing::error!(
                            target: "moderation",
                            error = %err,
                            chat_id = trigger.chat_id.0,
                            user_id = trigger.author_id.0,
                            "사용자 제재 실패"
                        );
                        PunishOutcome::Failed(err.to_string())
                    }
                }
            }
            Err(err) => {
                tracing::warn!(
                    target: "moderation",
                    error = %err,
                    chat_id = trigger.chat_id.0,
                    user_id = trigger.author_id.0,
                    "멤버 정보 조회 실패, 제재 생략"
                );
                PunishOutcome::CannotModerate
            }
        }
    }

    fn timezone(&self) -> Tz {
        self.config
            .timezone
            .parse()
            .unwrap_or(chrono_tz::Asia::Seoul)
    }

    #[allow(clippy::too_many_arguments)]
    fn format_audit_log(
        &self,
        trigger: &MessageJob,
        batch_size: usize,
        deleted: usize,
        punish: &PunishOutcome,
        trigger_count: u32,
        result: &ScanResult,
        tz: &Tz,
    ) -> String {
        let words: IndexSet<&str> = result
            .matches
            .iter()
            .map(|m| m.word.as_str())
            .collect();
        let urls: IndexSet<&str> = result
            .matches
            .iter()
            .map(|m| m.image_url.as_str())
            .collect();
        let detected_at = Utc::now().with_timezone(tz);

        format!(
            "<b>OCR 스캠 감지 로그</b>\n\n\
             채팅방: {}\n\
             채팅방 ID: {}\n\
             사용자: {}\n\
             사용자 ID: {}\n\
             감지 단어: {}\n\
             이미지:\n{}\n\
             배치 메시지 수: {}\n\
             삭제된 메시지: {}\n\
             제재: {}\n\
             누적 감지 횟수: {}\n\
             감지 시각: {}",
            escape_html(trigger.chat_title.as_deref().unwrap_or("Unknown")),
            trigger.chat_id.0,
            escape_html(&trigger.from_display),
            trigger.author_id.0,
            escape_html(&words.iter().copied().collect::<Vec<_>>().join(", ")),
            escape_html(&urls.iter().copied().collect::<Vec<_>>().join("\n")),
            batch_size,
            deleted,
            punish.describe(tz),
            trigger_count,
            detected_at.format("%Y-%m-%d %H:%M:%S"),
        )
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_counts_per_author() {
        let ledger = TriggerLedger::new();
        assert_eq!(ledger.record(1), 1);
        assert_eq!(ledger.record(1), 2);
        assert_eq!(ledger.record(2), 1);
        assert_eq!(ledger.record(1), 3);
    }

    #[test]
    fn ledger_evicts_oldest_entries_past_the_bound() {
        let ledger = TriggerLedger::new();
        for author in 0..(TRIGGER_TABLE_MAX as i64 + 1) {
            ledger.record(author);
        }

        assert_eq!(ledger.len(), TRIGGER_TABLE_MAX + 1 - TRIGGER_EVICT_COUNT);
        // author 0 lost its history, newer authors kept theirs
        assert_eq!(ledger.record(0), 1);
        assert_eq!(ledger.record(TRIGGER_TABLE_MAX as i64), 2);
    }

    #[test]
    fn escape_html_covers_markup_characters() {
        assert_eq!(
            escape_html(r#"<b>"free" & 'gift'</b>"#),
            "&lt;b&gt;&quot;free&quot; &amp; &#39;gift&#39;&lt;/b&gt;"
        );
    }
}
