//! The business-message auto-reply pipeline.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, error, info, warn};

use crate::autoreply::connections::ConnectionRegistry;
use crate::autoreply::context::{gather, system_prompt};
use crate::autoreply::crm;
use crate::autoreply::database::Database;
use crate::autoreply::gate::{self, Decision, SuppressReason};
use crate::autoreply::message::{InboundMessage, Role};
use crate::autoreply::sender::{deliver, Delivery, Format, Messenger, OutgoingMessage, ReplySender};
use crate::autoreply::settings::minute_of_day;
use crate::filter::{ContentFilter, FilterResult, REFUSAL};
use crate::llm::LlmClient;
use crate::ratelimit::{RateLimiter, Verdict, WARNING};

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct SecretaryConfig {
    pub owner_id: i64,
    pub owner_name: String,
    pub log_chat_id: i64,
    pub timezone: Tz,
    pub history_limit: usize,
    pub reply_signature: Option<String>,
}

impl Default for SecretaryConfig {
    fn default() -> Self {
        Self {
            owner_id: 0,
            owner_name: "the owner".to_string(),
            log_chat_id: 0,
            timezone: chrono_tz::Asia::Tashkent,
            history_limit: 10,
            reply_signature: None,
        }
    }
}

/// What happened to one inbound business message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Edited,
    Empty,
    RateLimited,
    Blocked,
    Suppressed(SuppressReason),
    ConnectionDisabled,
    StorageFailed,
    /// The LLM produced nothing; the turn is recorded but unanswered.
    NoDraft,
    /// Both the rich and the plain attempt failed.
    DeliveryFailed,
    /// Always `Delivery::Rich` or `Delivery::Plain`.
    Replied(Delivery),
}

pub struct Secretary {
    config: SecretaryConfig,
    database: Arc<Database>,
    messenger: Arc<dyn Messenger>,
    llm: Arc<dyn LlmClient>,
    sender: ReplySender,
    limiter: RateLimiter,
    filter: ContentFilter,
    connections: Arc<ConnectionRegistry>,
}

impl Secretary {
    pub fn new(
        config: SecretaryConfig,
        database: Arc<Database>,
        messenger: Arc<dyn Messenger>,
        llm: Arc<dyn LlmClient>,
        filter: ContentFilter,
        connections: Arc<ConnectionRegistry>,
    ) -> Self {
        let sender = ReplySender::new(
            messenger.clone(),
            database.clone(),
            config.log_chat_id,
            config.reply_signature.clone(),
        );
        Self {
            config,
            database,
            messenger,
            llm,
            sender,
            limiter: RateLimiter::new(),
            filter,
            connections,
        }
    }

    pub async fn handle(&self, msg: InboundMessage) -> Outcome {
        self.handle_at(msg, Utc::now()).await
    }

    /// Run one inbound business message through the pipeline as of `now`.
    pub async fn handle_at(&self, msg: InboundMessage, now: DateTime<Utc>) -> Outcome {
        if msg.is_edited {
            debug!("Ignoring edited business message {} from {}", msg.message_id, msg.sender_id);
            return Outcome::Edited;
        }
        if msg.text.trim().is_empty() {
            debug!("Ignoring business message {} without text", msg.message_id);
            return Outcome::Empty;
        }

        info!("📨 Business message from {} ({}): {}", msg.sender_first_name, msg.sender_id, msg.preview());

        // Every non-owner message counts toward the window, replied to or not
        let verdict = if msg.sender_id == self.config.owner_id {
            Verdict::Allow
        } else {
            self.limiter.check(msg.sender_id)
        };

        let setting = match self.database.settings() {
            Ok(setting) => setting,
            Err(e) => {
                error!("Failed to load settings: {e}");
                return Outcome::StorageFailed;
            }
        };

        let local_minute = minute_of_day(&now.with_timezone(&self.config.timezone));
        if let Decision::Suppress(reason) = gate::decide(msg.sender_id, self.config.owner_id, &setting, local_minute) {
            debug!("Not replying to {}: {:?}", msg.sender_id, reason);
            return Outcome::Suppressed(reason);
        }

        if self.connections.is_disabled(&msg.connection_id) {
            warn!("Business connection {} is disabled, not replying to {}", msg.connection_id, msg.sender_id);
            return Outcome::ConnectionDisabled;
        }

        if let Some(outcome) = self.screen(&msg, verdict).await {
            return outcome;
        }

        let connection = (!msg.connection_id.is_empty()).then_some(msg.connection_id.as_str());
        if let Err(e) = self.messenger.send_typing(msg.chat_id, connection).await {
            debug!("Typing indicator failed: {e}");
        }

        // History is read before the in-flight message is stored
        let ctx = match gather(&self.database, msg.sender_id, &msg.sender_first_name, self.config.history_limit) {
            Ok(ctx) => ctx,
            Err(e) => {
                error!("Failed to assemble context for {}: {e}", msg.sender_id);
                return Outcome::StorageFailed;
            }
        };

        if let Err(e) = self.database.save_message(msg.sender_id, Role::User, &msg.text) {
            warn!("Failed to store message from {}: {e}", msg.sender_id);
        }
        self.maybe_analyze(&msg, ctx.profile_known);

        let prompt = system_prompt(&self.config.owner_name, &setting, &ctx);
        let Some(reply) = self.llm.chat(&[], &msg.text, Some(&prompt)).await else {
            warn!("No draft for {}, staying silent", msg.sender_id);
            return Outcome::NoDraft;
        };

        match self.sender.send_reply(&msg, &reply).await {
            (Delivery::Failed, _) => Outcome::DeliveryFailed,
            (delivery, _mirror) => Outcome::Replied(delivery),
        }
    }

    /// Rate limit and content filter, applied once the gate allows a reply.
    async fn screen(&self, msg: &InboundMessage, verdict: Verdict) -> Option<Outcome> {
        match verdict {
            Verdict::Allow => {}
            Verdict::Warn => {
                warn!("Rate limit hit by {}", msg.sender_id);
                self.notify_sender(msg, WARNING).await;
                return Some(Outcome::RateLimited);
            }
            Verdict::Drop => {
                warn!("Spam blocked from {}", msg.sender_id);
                return Some(Outcome::RateLimited);
            }
        }

        if let FilterResult::Blocked(matched) = self.filter.check(&msg.text) {
            error!(
                "🚨 Blocked message from {} (matched {:?}): {}",
                msg.sender_id,
                matched,
                msg.preview()
            );
            self.notify_sender(msg, REFUSAL).await;
            return Some(Outcome::Blocked);
        }

        None
    }

    async fn notify_sender(&self, msg: &InboundMessage, text: &str) {
        let out = OutgoingMessage::new(msg.chat_id, text, Format::Plain).via(&msg.connection_id);
        deliver(self.messenger.as_ref(), out).await;
    }

    fn maybe_analyze(&self, msg: &InboundMessage, profile_known: bool) {
        let count = match self.database.user_message_count(msg.sender_id) {
            Ok(count) => count,
            Err(e) => {
                warn!("Failed to count messages for {}: {e}", msg.sender_id);
                return;
            }
        };
        if crm::should_analyze(profile_known, count) {
            crm::spawn_analysis(
                self.database.clone(),
                self.llm.clone(),
                msg.sender_id,
                msg.sender_first_name.clone(),
            );
        }
    }
}
