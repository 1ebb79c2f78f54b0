use std::sync::Arc;

use anyhow::Result;
use teloxide::{
    dispatching::Dispatcher,
    error_handlers::LoggingErrorHandler,
    prelude::*,
    types::{BotCommandScope, ChatId, FileId, Message, Recipient},
    update_listeners,
    utils::command::BotCommands,
};
use tokio::time::Instant;

use crate::{
    config::AppConfig, db::whitelist::WhitelistEntry, domain::MessageJob,
    infrastructure::shutdown::ShutdownListener,
};

use super::{
    types::{AppState, BotResult, GeneralCommand},
    utils::{admin_command_list, format_user_display, user_to_i64},
};

pub struct TelegramService {
    bot: Bot,
    state: Arc<AppState>,
}

impl TelegramService {
    pub fn new(bot: Bot, state: Arc<AppState>) -> Self {
        Self { bot, state }
    }

    pub async fn run(&self, mut shutdown: ShutdownListener) -> Result<()> {
        self.sync_commands().await?;
        let me = self.bot.get_me().await?;
        if let Some(expected_username) = &self.state.config.bot_username {
            if me.username.as_deref() != Some(expected_username.as_str()) {
                tracing::warn!(
                    target: "telegram",
                    expected = expected_username.as_str(),
                    actual = ?me.username,
                    "환경변수 BOT_USERNAME과 실제 봇 계정이 일치하지 않습니다"
                );
            }
        }
        tracing::info!(
            target: "telegram",
            bot_id = me.id.0,
            username = ?me.username,
            "Telegram 봇 연결 완료"
        );

        let handler = Update::filter_message()
            .branch(
                dptree::entry()
                    .filter_command::<GeneralCommand>()
                    .endpoint(Self::on_command),
            )
            .branch(dptree::endpoint(Self::on_plain_message));

        let mut dispatcher = Dispatcher::builder(self.bot.clone(), handler)
            .dependencies(dptree::deps![self.state.clone()])
            .default_handler(|update| async move {
                tracing::debug!(target: "telegram", ?update, "unhandled update");
            })
            .build();

        let listener = update_listeners::polling_default(self.bot.clone()).await;
        let error_handler = LoggingErrorHandler::with_custom_text("update listener error");

        let shutdown_token = dispatcher.shutdown_token();
        let mut dispatcher_future = Box::pin(dispatcher.dispatch_with_listener(listener, error_handler));
        let mut dispatcher_finished = false;

        tokio::select! {
            _ = shutdown.notified() => {
                tracing::info!("텔레그램 디스패처 종료 요청 수신");
                if let Ok(wait) = shutdown_token.shutdown() {
                    wait.await;
                }
            }
            _ = &mut dispatcher_future => {
                dispatcher_finished = true;
                tracing::info!("텔레그램 디스패처 종료 완료");
            }
        }

        if !dispatcher_finished {
            dispatcher_future.await;
        }

        Ok(())
    }

    async fn on_plain_message(bot: Bot, msg: Message, state: Arc<AppState>) -> BotResult<()> {
        if let Some(text) = msg.text() {
            if Self::maybe_handle_admin_command(&bot, &msg, text, state.clone()).await? {
                return Ok(());
            }
        }

        if msg.chat.is_private() {
            return Ok(());
        }

        if !state.is_chat_allowed(msg.chat.id.0).await {
            return Ok(());
        }

        // anonymous admins and channel posts carry no author identity to
        // batch or restrict against
        let from = match msg.from.as_ref() {
            Some(user) => user,
            None => return Ok(()),
        };

        if !state.config.scan_everything && from.is_bot {
            tracing::debug!(
                target: "telegram",
                message_id = msg.id.0,
                "봇 계정 메시지는 스캔하지 않습니다"
            );
            return Ok(());
        }

        let text = msg
            .text()
            .or_else(|| msg.caption())
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        let mut attachments: Vec<FileId> = Vec::new();
        if let Some(sizes) = msg.photo() {
            // sizes are ordered small to large; OCR wants the largest
            if let Some(largest) = sizes.last() {
                attachments.push(largest.file.id.clone());
            }
        }
        if let Some(doc) = msg.document() {
            let is_image = doc
                .mime_type
                .as_ref()
                .map(|mime| mime.to_string().starts_with("image/"))
                .unwrap_or(false);
            if is_image {
                attachments.push(doc.file.id.clone());
            }
        }

        let job = MessageJob {
            chat_id: msg.chat.id,
            chat_title: msg.chat.title().map(|t| t.to_string()),
            message_id: msg.id,
            author_id: from.id,
            from_display: format_user_display(from),
            username: from.username.clone(),
            text,
            attachments,
            timestamp: msg.date,
        };

        state.coalescer.enqueue(user_to_i64(from), job);
        Ok(())
    }

    async fn on_command(
        bot: Bot,
        msg: Message,
        cmd: GeneralCommand,
        state: Arc<AppState>,
    ) -> BotResult<()> {
        match cmd {
            GeneralCommand::Start => {
                let allowed = state.is_chat_allowed(msg.chat.id.0).await;
                bot.send_message(
                    msg.chat.id,
                    format!(
                        "안녕하세요! 이미지 스캠 감지 봇입니다.\n현재 그룹 상태: {}",
                        if allowed {
                            "활성화됨"
                        } else {
                            "비활성화됨"
                        }
                    ),
                )
                .await?
            }
            GeneralCommand::Help => {
                bot.send_message(msg.chat.id, GeneralCommand::descriptions().to_string())
                    .await?
            }
            GeneralCommand::Status => {
                let snapshot = state.coalescer.snapshot();
                bot.send_message(
                    msg.chat.id,
                    format!(
                        "봇 상태\n- 대기 중인 사용자: {}\n- 대기 중인 메시지: {}\n- 스캔 캐시 항목: {}",
                        snapshot.pending_authors,
                        snapshot.queued_messages,
                        state.analyzer.cache_len()
                    ),
                )
                .await?
            }
            GeneralCommand::Chatid => {
                bot.send_message(msg.chat.id, format!("현재 채팅 ID: {}", msg.chat.id))
                    .await?
            }
            GeneralCommand::Ping => {
                let start = Instant::now();
                let sent = bot.send_message(msg.chat.id, "Pong 측정 중...").await?;
                let elapsed = start.elapsed();
                let latency_secs = elapsed.as_secs_f64();
                bot.edit_message_text(
                    msg.chat.id,
                    sent.id,
                    format!("Pong! 응답 속도: {:.3}초", latency_secs),
                )
                .await?
            }
        };
        Ok(())
    }

    async fn maybe_handle_admin_command(
        bot: &Bot,
        msg: &Message,
        text: &str,
        state: Arc<AppState>,
    ) -> BotResult<bool> {
        if !text.starts_with('/') {
            return Ok(false);
        }
        if !state.is_admin_group(msg.chat.id.0) {
            return Ok(false);
        }
        let from = match msg.from.as_ref() {
            Some(user) => user,
            None => return Ok(false),
        };
        if !state.is_admin_user(user_to_i64(from)) {
            bot.send_message(msg.chat.id, "이 명령어는 관리자만 사용할 수 있습니다.")
                .await?;
            return Ok(true);
        }

        let mut parts = text.split_whitespace();
        let command = parts.next().unwrap_or("");
        match command {
            "/whitelist_add" => {
                match parts.next().map(|target| target.parse::<i64>()) {
                    Some(Ok(chat_id)) => {
                        Self::whitelist_add(bot, msg, chat_id, state.clone()).await?;
                    }
                    Some(Err(_)) | None => {
                        bot.send_message(
                            msg.chat.id,
                            "올바른 그룹 ID를 입력하세요. 예: /whitelist_add -1001234567890",
                        )
                        .await?;
                    }
                }
                Ok(true)
            }
            "/whitelist_remove" => {
                match parts.next().map(|target| target.parse::<i64>()) {
                    Some(Ok(chat_id)) => {
                        Self::whitelist_remove(bot, msg, chat_id, state.clone()).await?;
                    }
                    Some(Err(_)) | None => {
                        bot.send_message(
                            msg.chat.id,
                            "올바른 그룹 ID를 입력하세요. 예: /whitelist_remove -1001234567890",
                        )
                        .await?;
                    }
                }
                Ok(true)
            }
            "/whitelist_list" => {
                Self::whitelist_list(bot, msg, state.clone()).await?;
                Ok(true)
            }
            "/sync_commands" => {
                Self::sync_commands_for(bot, &state.config).await?;
                bot.send_message(msg.chat.id, "봇 명령어 동기화를 완료했습니다.")
                    .await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn whitelist_add(
        bot: &Bot,
        msg: &Message,
        target_chat_id: i64,
        state: Arc<AppState>,
    ) -> BotResult<()> {
        match bot.get_chat(ChatId(target_chat_id)).await {
            Ok(chat_info) => {
                let entry = WhitelistEntry {
                    chat_id: target_chat_id,
                    chat_title: chat_info.title().map(|t| t.to_string()),
                    chat_type: Some(format!("{:?}", chat_info.kind)),
                    added_by: msg.from.as_ref().map(user_to_i64),
                };
                match state.whitelist.add_or_replace(entry).await {
                    Ok(true) => {
                        bot.send_message(
                            msg.chat.id,
                            format!("그룹 (ID: {target_chat_id})이 화이트리스트에 추가되었습니다."),
                        )
                        .await?;
                    }
                    Ok(false) => {
                        bot.send_message(msg.chat.id, "이미 등록된 그룹입니다.")
                            .await?;
                    }
                    Err(err) => {
                        tracing::error!(target: "admin", error = %err, "failed to add whitelist");
                        bot.send_message(msg.chat.id, "화이트리스트 추가 중 오류가 발생했습니다.")
                            .await?;
                    }
                }
            }
            Err(_) => {
                bot.send_message(
                    msg.chat.id,
                    "해당 그룹을 찾을 수 없습니다. 봇이 그룹에 추가되어 있는지 확인하세요.",
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn whitelist_remove(
        bot: &Bot,
        msg: &Message,
        target_chat_id: i64,
        state: Arc<AppState>,
    ) -> BotResult<()> {
        match state.whitelist.remove(target_chat_id).await {
            Ok(true) => {
                bot.send_message(
                    msg.chat.id,
                    format!("그룹 (ID: {target_chat_id})이 화이트리스트에서 제거되었습니다."),
                )
                .await?;
            }
            Ok(false) => {
                bot.send_message(msg.chat.id, "화이트리스트에 등록되지 않은 그룹입니다.")
                    .await?;
            }
            Err(err) => {
                tracing::error!(target: "admin", error = %err, "failed to remove whitelist");
                bot.send_message(msg.chat.id, "화이트리스트 제거 중 오류가 발생했습니다.")
                    .await?;
            }
        }
        Ok(())
    }

    async fn whitelist_list(bot: &Bot, msg: &Message, state: Arc<AppState>) -> BotResult<()> {
        match state.whitelist.list().await {
            Ok(rows) => {
                if rows.is_empty() {
                    bot.send_message(msg.chat.id, "화이트리스트가 비어있습니다.")
                        .await?;
                    return Ok(());
                }
                let mut message = String::from("화이트리스트 목록:\n\n");
                for (idx, row) in rows.iter().enumerate() {
                    message.push_str(&format!(
                        "{}. ID: {}\n   저장된 이름: {}\n   등록일: {}\n",
                        idx + 1,
                        row.chat_id,
                        row.chat_title.as_deref().unwrap_or("(제목 없음)"),
                        row.added_at.format("%Y-%m-%d"),
                    ));
                }
                bot.send_message(msg.chat.id, message).await?;
            }
            Err(err) => {
                tracing::error!(target: "admin", error = %err, "failed to list whitelist");
                bot.send_message(msg.chat.id, "화이트리스트 조회 중 오류가 발생했습니다.")
                    .await?;
            }
        }
        Ok(())
    }

    async fn sync_commands(&self) -> BotResult<()> {
        Self::sync_commands_for(&self.bot, &self.state.config).await
    }

    async fn sync_commands_for(bot: &Bot, config: &AppConfig) -> BotResult<()> {
        let general = GeneralCommand::bot_commands();
        bot.set_my_commands(general.clone()).await?;

        let admin_commands = admin_command_list();
        if let Some(admin_user_id) = config.admin_user_id {
            bot.set_my_commands(admin_commands.clone())
                .scope(BotCommandScope::Chat {
                    chat_id: Recipient::Id(ChatId(admin_user_id)),
                })
                .await?;
        }
        if let Some(admin_group_id) = config.admin_group_id {
            bot.set_my_commands(admin_commands)
                .scope(BotCommandScope::Chat {
                    chat_id: Recipient::Id(ChatId(admin_group_id)),
                })
                .await?;
        }
        tracing::info!(target: "telegram", "명령어 동기화 완료");
        Ok(())
    }
}
