//! Delivers drafted replies and mirrors each exchange to the operator log chat.

use std::sync::Arc;

use async_trait::async_trait;
use teloxide::utils::html;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::autoreply::database::Database;
use crate::autoreply::message::{InboundMessage, Role};

/// How the platform should interpret the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Html,
    Plain,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub chat_id: i64,
    pub text: String,
    pub format: Format,
    /// Business connection to send through, if any.
    pub connection_id: Option<String>,
    pub reply_to: Option<i64>,
}

impl OutgoingMessage {
    pub fn new(chat_id: i64, text: impl Into<String>, format: Format) -> Self {
        Self { chat_id, text: text.into(), format, connection_id: None, reply_to: None }
    }

    pub fn via(mut self, connection_id: &str) -> Self {
        if !connection_id.is_empty() {
            self.connection_id = Some(connection_id.to_string());
        }
        self
    }

    pub fn replying_to(mut self, message_id: i64) -> Self {
        self.reply_to = Some(message_id);
        self
    }
}

/// The outbound side of the messaging platform.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Returns the sent message id.
    async fn send_message(&self, msg: OutgoingMessage) -> Result<i64, String>;

    async fn send_typing(&self, chat_id: i64, connection_id: Option<&str>) -> Result<(), String>;
}

/// Outcome of a delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Rich(i64),
    /// The rich attempt failed and the plain retry went through.
    Plain(i64),
    Failed,
}

impl Delivery {
    pub fn is_sent(&self) -> bool {
        !matches!(self, Delivery::Failed)
    }
}

/// Send `msg` as given, retrying exactly once as plain text on failure.
pub async fn deliver(messenger: &dyn Messenger, msg: OutgoingMessage) -> Delivery {
    if msg.format == Format::Plain {
        return match messenger.send_message(msg).await {
            Ok(id) => Delivery::Plain(id),
            Err(e) => {
                error!("Failed to send reply: {e}");
                Delivery::Failed
            }
        };
    }

    let retry = OutgoingMessage { format: Format::Plain, ..msg.clone() };
    match messenger.send_message(msg).await {
        Ok(id) => Delivery::Rich(id),
        Err(e) => {
            warn!("Rich send failed ({e}), retrying as plain text");
            match messenger.send_message(retry).await {
                Ok(id) => Delivery::Plain(id),
                Err(e) => {
                    error!("Plain retry failed too: {e}");
                    Delivery::Failed
                }
            }
        }
    }
}

/// HTML summary of one exchange for the operator log chat.
pub fn mirror_text(inbound: &InboundMessage, reply: &str) -> String {
    format!(
        "<b>📨 New conversation</b>\n\n\
         👤 <b>From:</b> <a href=\"tg://user?id={id}\">{name}</a> ({id})\n\
         📥 <b>Message:</b> {text}\n\
         🤖 <b>Reply:</b> {reply}",
        id = inbound.sender_id,
        name = html::escape(&inbound.sender_first_name),
        text = html::escape(&inbound.text),
        reply = html::escape(reply),
    )
}

/// Sends auto-replies, records them, and mirrors them.
pub struct ReplySender {
    messenger: Arc<dyn Messenger>,
    database: Arc<Database>,
    log_chat_id: i64,
    signature: Option<String>,
}

impl ReplySender {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        database: Arc<Database>,
        log_chat_id: i64,
        signature: Option<String>,
    ) -> Self {
        Self { messenger, database, log_chat_id, signature }
    }

    /// Text as it goes over the wire (reply plus signature).
    pub fn signed(&self, reply: &str) -> String {
        match &self.signature {
            Some(sig) => format!("{reply}\n\n{sig}"),
            None => reply.to_string(),
        }
    }

    /// Deliver `reply` to the chat `inbound` came from.
    ///
    /// On success the unsigned reply is stored as an assistant turn and the
    /// exchange is mirrored in the background. Nothing here returns an error.
    pub async fn send_reply(&self, inbound: &InboundMessage, reply: &str) -> (Delivery, Option<JoinHandle<()>>) {
        let msg = OutgoingMessage::new(inbound.chat_id, self.signed(reply), Format::Html)
            .via(&inbound.connection_id)
            .replying_to(inbound.message_id);

        let delivery = deliver(self.messenger.as_ref(), msg).await;
        if !delivery.is_sent() {
            return (delivery, None);
        }
        info!("🤖 Replied to {} ({:?})", inbound.sender_id, delivery);

        if let Err(e) = self.database.save_message(inbound.sender_id, Role::Assistant, reply) {
            warn!("Failed to store reply for {}: {e}", inbound.sender_id);
        }

        let mirror = self.spawn_mirror(mirror_text(inbound, reply));
        (delivery, Some(mirror))
    }

    fn spawn_mirror(&self, text: String) -> JoinHandle<()> {
        let messenger = self.messenger.clone();
        let log_chat_id = self.log_chat_id;
        tokio::spawn(async move {
            let msg = OutgoingMessage::new(log_chat_id, text, Format::Html);
            if let Err(e) = messenger.send_message(msg).await {
                error!("Failed to mirror conversation to log chat: {e}");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Fails the first `failures` sends.
    struct FlakyMessenger {
        failures: usize,
        attempts: Mutex<Vec<OutgoingMessage>>,
    }

    impl FlakyMessenger {
        fn new(failures: usize) -> Self {
            Self { failures, attempts: Mutex::new(Vec::new()) }
        }

        fn attempts(&self) -> Vec<OutgoingMessage> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Messenger for FlakyMessenger {
        async fn send_message(&self, msg: OutgoingMessage) -> Result<i64, String> {
            let mut attempts = self.attempts.lock().unwrap();
            attempts.push(msg);
            if attempts.len() <= self.failures {
                Err("Bad Request: can't parse entities".to_string())
            } else {
                Ok(attempts.len() as i64)
            }
        }

        async fn send_typing(&self, _chat_id: i64, _connection_id: Option<&str>) -> Result<(), String> {
            Ok(())
        }
    }

    fn html_msg() -> OutgoingMessage {
        OutgoingMessage::new(10, "<b>hi</b>", Format::Html).via("conn-1").replying_to(5)
    }

    #[tokio::test]
    async fn test_rich_success_single_attempt() {
        let m = FlakyMessenger::new(0);
        assert_eq!(deliver(&m, html_msg()).await, Delivery::Rich(1));
        assert_eq!(m.attempts().len(), 1);
    }

    #[tokio::test]
    async fn test_fallback_to_plain_once() {
        let m = FlakyMessenger::new(1);
        assert_eq!(deliver(&m, html_msg()).await, Delivery::Plain(2));

        let attempts = m.attempts();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].format, Format::Html);
        assert_eq!(attempts[1].format, Format::Plain);
        // Everything but the format is preserved on retry
        assert_eq!(attempts[1].connection_id.as_deref(), Some("conn-1"));
        assert_eq!(attempts[1].reply_to, Some(5));
        assert_eq!(attempts[1].text, attempts[0].text);
    }

    #[tokio::test]
    async fn test_both_fail_is_not_an_error() {
        let m = FlakyMessenger::new(usize::MAX);
        assert_eq!(deliver(&m, html_msg()).await, Delivery::Failed);
        assert_eq!(m.attempts().len(), 2);
    }

    #[tokio::test]
    async fn test_plain_is_not_retried() {
        let m = FlakyMessenger::new(usize::MAX);
        let msg = OutgoingMessage::new(10, "hi", Format::Plain);
        assert_eq!(deliver(&m, msg).await, Delivery::Failed);
        assert_eq!(m.attempts().len(), 1);
    }

    #[test]
    fn test_via_ignores_empty_connection() {
        let msg = OutgoingMessage::new(1, "x", Format::Plain).via("");
        assert!(msg.connection_id.is_none());
    }

    #[test]
    fn test_mirror_text_escapes() {
        let inbound = InboundMessage {
            sender_id: 77,
            sender_first_name: "<Ali>".to_string(),
            chat_id: 77,
            connection_id: "c".to_string(),
            text: "a & b".to_string(),
            message_id: 1,
            is_edited: false,
        };
        let text = mirror_text(&inbound, "<i>ok</i>");
        assert!(text.contains("tg://user?id=77"));
        assert!(text.contains("&lt;Ali&gt;"));
        assert!(text.contains("a &amp; b"));
        assert!(text.contains("&lt;i&gt;ok&lt;/i&gt;"));
    }

    #[test]
    fn test_signed() {
        let db = Arc::new(Database::in_memory().unwrap());
        let m: Arc<dyn Messenger> = Arc::new(FlakyMessenger::new(0));
        let sender = ReplySender::new(m.clone(), db.clone(), -100, Some("— bot".to_string()));
        assert_eq!(sender.signed("hello"), "hello\n\n— bot");
        let unsigned = ReplySender::new(m, db, -100, None);
        assert_eq!(unsigned.signed("hello"), "hello");
    }
}
