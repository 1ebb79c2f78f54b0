use std::{process, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::Utc;
use chrono_tz::Tz;
use reqwest::Client;
use teloxide::prelude::*;
use tokio::time::{sleep, timeout};
use tokio_cron_scheduler::JobScheduler;

use crate::{
    analyzer::MessageAnalyzer,
    config::AppConfig,
    db::{self, whitelist::ChatWhitelist},
    infrastructure::{
        directories::ResolvedPaths, notifier::notify_admin_group, shutdown::Shutdown,
    },
    media::MediaExtractor,
    ocr::{GeminiEngine, OcrEngine, TesseractEngine},
    tasks::{
        actions::ActionExecutor,
        coalescer::MessageCoalescer,
        processor::BatchProcessor,
        scheduler::{schedule_restarts, RestartCallback},
    },
    telegram::{types::AppState, TelegramService},
};

pub struct OcrGuardApp {
    _paths: ResolvedPaths,
    scheduler: JobScheduler,
    telegram: TelegramService,
    whitelist: Arc<ChatWhitelist>,
    coalescer: Arc<MessageCoalescer>,
    analyzer: Arc<MessageAnalyzer>,
    shutdown: Shutdown,
    config: Arc<AppConfig>,
    bot: Bot,
}

impl OcrGuardApp {
    pub async fn initialize(
        config: AppConfig,
        paths: ResolvedPaths,
        shutdown: Shutdown,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let pool = db::init_pool(&paths.db_path).await?;
        let whitelist = Arc::new(ChatWhitelist::new(pool));

        let http_client = Client::builder()
            .user_agent(format!("ocr-scam-guard/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        let bot = Bot::new(&config.telegram_bot_token);

        let fast: Arc<dyn OcrEngine> = Arc::new(TesseractEngine::new(
            http_client.clone(),
            config.tesseract.clone(),
        ));
        let accurate: Option<Arc<dyn OcrEngine>> = match &config.gemini.api_key {
            Some(api_key) => {
                tracing::info!(
                    target: "ocr",
                    model = %config.gemini.model,
                    "Gemini 원격 엔진 활성화"
                );
                Some(Arc::new(GeminiEngine::new(
                    http_client.clone(),
                    api_key.clone(),
                    config.gemini.model.clone(),
                )))
            }
            None => {
                tracing::info!(target: "ocr", "GEMINI_API_KEY 미설정, 원격 에스컬레이션 비활성화");
                None
            }
        };

        let analyzer = Arc::new(MessageAnalyzer::new(
            fast,
            accurate,
            config.banned_words.clone(),
        ));
        analyzer
            .initialize()
            .await
            .context("fast OCR engine initialization failed")?;

        let media = Arc::new(MediaExtractor::new(
            bot.clone(),
            http_client,
            config.media.clone(),
        ));
        let executor = Arc::new(ActionExecutor::new(bot.clone(), config.clone()));
        let processor = Arc::new(BatchProcessor::new(media, analyzer.clone(), executor));
        let coalescer = Arc::new(MessageCoalescer::new(config.batch.delay, processor));

        let state = Arc::new(AppState {
            config: config.clone(),
            whitelist: whitelist.clone(),
            coalescer: coalescer.clone(),
            analyzer: analyzer.clone(),
        });
        let telegram = TelegramService::new(bot.clone(), state);

        let restart_callback =
            build_restart_callback(bot.clone(), config.clone(), whitelist.clone());
        let scheduler = schedule_restarts(&config.scheduler.cron_specs, restart_callback).await?;

        Ok(Self {
            _paths: paths,
            scheduler,
            telegram,
            whitelist,
            coalescer,
            analyzer,
            shutdown,
            config,
            bot,
        })
    }

    pub async fn run(self) -> Result<()> {
        let OcrGuardApp {
            _paths: _,
            mut scheduler,
            telegram,
            whitelist,
            coalescer,
            analyzer,
            shutdown,
            config,
            bot,
        } = self;

        tracing::info!("텔레그램 이미지 스캠 감지 봇 시작");

        notify_admin_group(&bot, config.as_ref(), "이미지 스캠 감지 봇이 시작되었습니다.").await;

        let mut shutdown_listener = shutdown.subscribe();
        let shutdown_timeout = Duration::from_secs(5);
        let mut telegram_future = Box::pin(telegram.run(shutdown.subscribe()));
        let mut telegram_completed = false;

        tokio::select! {
            _ = shutdown_listener.notified() => {
                tracing::info!("종료 신호 감지 (CTRL+C / SIGTERM)");
            }
            res = &mut telegram_future => {
                telegram_completed = true;
                if let Err(err) = res {
                    tracing::error!(?err, "Telegram dispatcher 종료 중 오류");
                } else {
                    tracing::info!("Telegram dispatcher 정상 종료");
                }
            }
        }

        shutdown.trigger();

        if !telegram_completed {
            let wait = tokio::time::sleep(shutdown_timeout);
            tokio::pin!(wait);
            tokio::select! {
                res = &mut telegram_future => {
                    if let Err(err) = res {
                        tracing::error!(?err, "Telegram dispatcher 종료 중 오류");
                    }
                }
                _ = &mut wait => {
                    tracing::warn!(
                        target: "telegram",
                        "Telegram dispatcher did not stop within {:?}; forcing exit",
                        shutdown_timeout
                    );
                }
            }
        }

        match timeout(shutdown_timeout, scheduler.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::error!(?err, "스케줄러 종료 실패");
            }
            Err(_) => {
                tracing::warn!(
                    target: "scheduler",
                    "스케줄러 종료가 {:?} 내에 완료되지 않았습니다.",
                    shutdown_timeout
                );
            }
        }

        if timeout(shutdown_timeout, whitelist.close()).await.is_err() {
            tracing::warn!(
                target: "db",
                "화이트리스트 리소스 정리가 {:?} 내에 완료되지 않았습니다.",
                shutdown_timeout
            );
        }

        // pending batches are dropped; detached batches already in flight
        // die with the process
        coalescer.abort_pending();
        analyzer.shutdown().await;

        tracing::info!("봇 종료 완료");
        notify_admin_group(&bot, config.as_ref(), "이미지 스캠 감지 봇이 종료되었습니다.").await;
        Ok(())
    }
}

fn build_restart_callback(
    bot: Bot,
    config: Arc<AppConfig>,
    whitelist: Arc<ChatWhitelist>,
) -> RestartCallback {
    Arc::new(move || {
        let bot = bot.clone();
        let config = config.clone();
        let whitelist = whitelist.clone();
        tokio::spawn(async move {
            let tz: Tz = config.timezone.parse().unwrap_or(chrono_tz::Asia::Seoul);
            let ts = Utc::now().with_timezone(&tz).format("%Y-%m-%d %H:%M:%S");
            let message = format!("자동 재부팅을 시작합니다.\n현재 시각: {ts}");
            notify_admin_group(&bot, config.as_ref(), &message).await;
            whitelist.close().await;
            sleep(Duration::from_secs(5)).await;
            process::exit(0);
        });
    })
}
