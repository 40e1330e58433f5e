//! Telegram client using teloxide.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    BusinessConnectionId, CallbackQuery, ChatAction, InlineKeyboardMarkup, MessageId, ParseMode, ReplyParameters,
};
use tracing::warn;

use crate::autoreply::sender::{Format, Messenger, OutgoingMessage};

/// Telegram API client.
#[derive(Clone)]
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub async fn send_html(&self, chat_id: i64, text: &str) -> Result<i64, String> {
        self.send_message(OutgoingMessage::new(chat_id, text, Format::Html)).await
    }

    /// Send an HTML message with an inline keyboard attached.
    pub async fn send_with_keyboard(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: InlineKeyboardMarkup,
    ) -> Result<i64, String> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard)
            .await
            .map(|msg| msg.id.0 as i64)
            .map_err(|e| {
                let msg = format!("Failed to send: {e}");
                warn!("{}", msg);
                msg
            })
    }

    /// Replace the text and keyboard of an existing message.
    pub async fn edit_with_keyboard(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: InlineKeyboardMarkup,
    ) -> Result<(), String> {
        self.bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id as i32), text)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard)
            .await
            .map(|_| ())
            .map_err(|e| {
                let msg = format!("Failed to edit message: {e}");
                warn!("{}", msg);
                msg
            })
    }

    /// Acknowledge a button press, optionally with a toast.
    pub async fn answer_callback(&self, query: &CallbackQuery, text: Option<&str>) -> Result<(), String> {
        let mut request = self.bot.answer_callback_query(query.id.clone());
        if let Some(text) = text {
            request = request.text(text);
        }
        request.await.map(|_| ()).map_err(|e| {
            let msg = format!("Failed to answer callback: {e}");
            warn!("{}", msg);
            msg
        })
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send_message(&self, msg: OutgoingMessage) -> Result<i64, String> {
        let mut request = self.bot.send_message(ChatId(msg.chat_id), msg.text);

        if msg.format == Format::Html {
            request = request.parse_mode(ParseMode::Html);
        }
        if let Some(connection_id) = msg.connection_id {
            request = request.business_connection_id(BusinessConnectionId(connection_id));
        }
        if let Some(msg_id) = msg.reply_to {
            let reply_params = ReplyParameters::new(MessageId(msg_id as i32));
            request = request.reply_parameters(reply_params);
        }

        request.await.map(|sent| sent.id.0 as i64).map_err(|e| {
            let msg = format!("Failed to send: {e}");
            warn!("{}", msg);
            msg
        })
    }

    async fn send_typing(&self, chat_id: i64, connection_id: Option<&str>) -> Result<(), String> {
        let mut request = self.bot.send_chat_action(ChatId(chat_id), ChatAction::Typing);
        if let Some(connection_id) = connection_id {
            request = request.business_connection_id(BusinessConnectionId(connection_id.to_string()));
        }
        request.await.map(|_| ()).map_err(|e| {
            let msg = format!("Failed to send typing: {e}");
            warn!("{}", msg);
            msg
        })
    }
}
