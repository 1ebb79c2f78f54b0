use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub telegram_bot_token: String,
    pub bot_username: Option<String>,
    pub admin_user_id: Option<i64>,
    pub admin_group_id: Option<i64>,
    pub allowed_chat_ids: Vec<i64>,
    pub banned_words: Vec<String>,
    pub scan_everything: bool,
    pub batch: BatchConfig,
    pub moderation: ModerationConfig,
    pub tesseract: TesseractConfig,
    pub gemini: GeminiConfig,
    pub media: MediaConfig,
    pub directories: DirectoryConfig,
    pub logging: LoggingConfig,
    pub timezone: String,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub delay: Duration,
}

#[derive(Debug, Clone)]
pub struct ModerationConfig {
    pub should_delete: bool,
    pub should_punish: bool,
    pub triggers_before_action: u32,
    pub restrict_duration: Duration,
}

#[derive(Debug, Clone)]
pub struct TesseractConfig {
    pub binary: String,
    pub languages: String,
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub max_urls_per_message: usize,
    pub probe_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub logs_dir: String,
    pub data_dir: String,
    pub db_filename: String,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub cron_specs: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
}
