use serde::Deserialize;

use crate::security::init_data::TelegramUser;

/// Incoming webhook update, reduced to the fields the bot reacts to.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<TelegramUser>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Reply text for a bot command, or None when the message is not a command
/// the bot answers.
pub fn command_reply(text: &str, webapp_url: Option<&str>) -> Option<String> {
    let command = text.trim().split_whitespace().next()?;
    match command {
        "/start" => {
            let mut reply = String::from(
                "Привет\\! Это Cats & Flats — обмен квартирами с котами\\.\n\
                 Заполни анкету и размести объявление\\.",
            );
            if let Some(url) = webapp_url {
                reply.push_str(&format!("\n\nМини\\-приложение: {url}"));
            }
            Some(reply)
        }
        "/help" => Some(
            "Команды:\n/start — начать\n/help — помощь\n\
             Анкета и объявления живут в мини\\-приложении\\."
                .to_string(),
        ),
        _ => None,
    }
}
