use chrono::{DateTime, Utc};
use teloxide::{
    prelude::*,
    types::{FileId, MessageId},
};

#[derive(Debug, Clone)]
pub struct MessageJob {
    pub chat_id: ChatId,
    pub chat_title: Option<String>,
    pub message_id: MessageId,
    pub author_id: UserId,
    pub from_display: String,
    pub username: Option<String>,
    pub text: String,
    pub attachments: Vec<FileId>,
    pub timestamp: DateTime<Utc>,
}
