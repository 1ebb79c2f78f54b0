use std::{env, time::Duration};

use super::env::{
    AppConfig, BatchConfig, ConfigError, DirectoryConfig, GeminiConfig, LoggingConfig, MediaConfig,
    ModerationConfig, SchedulerConfig, TesseractConfig,
};

const DEFAULT_BANNED_WORDS: &[&str] = &[
    "crypto casino",
    "special promo code",
    "withdrawl successful",
    "free gift",
];

pub fn load_config() -> Result<AppConfig, ConfigError> {
    AppConfig::from_env()
}

impl AppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let telegram_bot_token = env::var("TELEGRAM_BOT_TOKEN")
            .map_err(|_| ConfigError::Missing("TELEGRAM_BOT_TOKEN"))?;

        let bot_username = env::var("BOT_USERNAME").ok().filter(|v| !v.is_empty());
        let admin_user_id = parse_int("ADMIN_USER_ID");
        let admin_group_id = parse_int("ADMIN_GROUP_ID").map(|id| if id > 0 { -id } else { id });
        let allowed_chat_ids = env::var("ALLOWED_CHAT_IDS")
            .ok()
            .map(|value| {
                value
                    .split(',')
                    .filter_map(|part| part.trim().parse::<i64>().ok())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let banned_words = env::var("BANNED_WORDS")
            .ok()
            .map(|value| {
                value
                    .split(',')
                    .map(|part| part.trim().to_lowercase())
                    .filter(|part| !part.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|words: &Vec<String>| !words.is_empty())
            .unwrap_or_else(|| {
                DEFAULT_BANNED_WORDS
                    .iter()
                    .map(|word| word.to_string())
                    .collect()
            });

        let scan_everything = parse_bool("SCAN_EVERYTHING", true);

        let batch = BatchConfig {
            delay: Duration::from_millis(
                env::var("BATCH_DELAY_MS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(2_000),
            ),
        };

        let moderation = ModerationConfig {
            should_delete: parse_bool("SHOULD_DELETE", true),
            should_punish: parse_bool("SHOULD_PUNISH", true),
            triggers_before_action: env::var("TRIGGERS_BEFORE_ACTION")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(1),
            restrict_duration: Duration::from_secs(
                env::var("RESTRICT_DURATION_SECS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(7 * 24 * 60 * 60),
            ),
        };

        let tesseract = TesseractConfig {
            binary: env::var("TESSERACT_BINARY").unwrap_or_else(|_| "tesseract".to_string()),
            languages: env::var("TESSERACT_LANG").unwrap_or_else(|_| "eng".to_string()),
        };

        let gemini = GeminiConfig {
            api_key: env::var("GEMINI_API_KEY").ok().filter(|v| !v.is_empty()),
            model: env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-flash-lite".to_string()),
        };

        let media = MediaConfig {
            max_urls_per_message: env::var("MAX_URLS_PER_MESSAGE")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(8),
            probe_timeout: Duration::from_millis(
                env::var("MEDIA_PROBE_TIMEOUT")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(5_000),
            ),
        };

        let directories = DirectoryConfig {
            logs_dir: env::var("LOGS_DIR").unwrap_or_else(|_| "logs".to_string()),
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            db_filename: env::var("DB_FILENAME").unwrap_or_else(|_| "whitelist.db".to_string()),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        };

        let timezone = env::var("BOT_TIMEZONE").unwrap_or_else(|_| "Asia/Seoul".to_string());

        let scheduler = SchedulerConfig {
            cron_specs: env::var("RESTART_CRONS")
                .map(|value| {
                    value
                        .split(';')
                        .map(|part| part.trim().to_string())
                        .filter(|part| !part.is_empty())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default(),
        };

        Ok(Self {
            telegram_bot_token,
            bot_username,
            admin_user_id,
            admin_group_id,
            allowed_chat_ids,
            banned_words,
            scan_everything,
            batch,
            moderation,
            tesseract,
            gemini,
            media,
            directories,
            logging,
            timezone,
            scheduler,
        })
    }
}

fn parse_int(key: &str) -> Option<i64> {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|value| value.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}
