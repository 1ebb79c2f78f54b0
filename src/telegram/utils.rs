use std::convert::TryFrom;

use teloxide::{
    types::{BotCommand, User},
    utils::command::BotCommands,
};

use crate::telegram::types::GeneralCommand;

pub fn format_user_display(user: &User) -> String {
    if let Some(username) = &user.username {
        format!("@{}", username)
    } else {
        let mut parts = Vec::new();
        parts.push(user.first_name.as_str());
        if let Some(last) = &user.last_name {
            parts.push(last.as_str());
        }
        let name = parts.join(" ").trim().to_string();
        if name.is_empty() {
            "Unknown".to_string()
        } else {
            name
        }
    }
}

pub fn user_to_i64(user: &User) -> i64 {
    i64::try_from(user.id.0).unwrap_or(i64::MAX)
}

pub fn admin_command_list() -> Vec<BotCommand> {
    let mut commands = GeneralCommand::bot_commands();
    commands.extend(vec![
        BotCommand::new("whitelist_add", "그룹을 화이트리스트에 추가"),
        BotCommand::new("whitelist_remove", "화이트리스트에서 제거"),
        BotCommand::new("whitelist_list", "화이트리스트 목록"),
        BotCommand::new("sync_commands", "봇 명령어 동기화"),
    ]);
    commands
}
