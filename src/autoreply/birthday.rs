//! Daily birthday greetings for contacts with a known birthday.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use teloxide::utils::html;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::autoreply::database::Database;
use crate::autoreply::profile::Profile;
use crate::autoreply::sender::{Format, Messenger, OutgoingMessage};
use crate::llm::LlmClient;

/// Every day at 08:00 local time (sec min hour day month dow year).
pub const BIRTHDAY_CRON: &str = "0 0 8 * * * *";

const WISH_SYSTEM: &str = "You are a helpful assistant writing birthday wishes.";

/// Next firing of `expr` after `after`, evaluated in `tz`.
pub fn next_run(expr: &str, after: DateTime<Utc>, tz: Tz) -> Result<DateTime<Utc>, String> {
    let schedule = Schedule::from_str(expr).map_err(|e| format!("Invalid cron: {}", e))?;
    schedule
        .after(&after.with_timezone(&tz))
        .next()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| "No future occurrence for cron".to_string())
}

/// Birthday key for a date, "MM-DD".
pub fn month_day(date: NaiveDate) -> String {
    date.format("%m-%d").to_string()
}

pub fn wish_prompt(profile: &Profile) -> String {
    format!(
        "Write a birthday wish for {name}.\n\
         Relationship: {relationship}.\n\
         Context: {summary}.\n\n\
         Tone:\n\
         - Client: professional, polite, appreciative.\n\
         - Friend or Family: warm and casual, maybe funny.\n\n\
         Output ONLY the message text.",
        name = profile.first_name,
        relationship = profile.relationship_type.as_str(),
        summary = profile.summary,
    )
}

pub fn fallback_wish(first_name: &str) -> String {
    format!("Happy Birthday, {first_name}! 🎂")
}

pub fn owner_notice(profile: &Profile, wish: &str) -> String {
    format!(
        "ℹ️ <b>Birthday wishes</b>\nSent a wish to {} ({}):\n\"{}\"",
        html::escape(&profile.first_name),
        profile.relationship_type.as_str(),
        html::escape(wish)
    )
}

/// Greet everyone whose birthday is `today`. Returns how many were sent.
///
/// A failure for one contact is logged and does not stop the rest.
pub async fn send_birthday_wishes(
    db: &Database,
    messenger: &dyn Messenger,
    llm: &dyn LlmClient,
    owner_id: i64,
    today: NaiveDate,
) -> usize {
    let key = month_day(today);
    let profiles = match db.profiles_with_birthday(&key) {
        Ok(profiles) => profiles,
        Err(e) => {
            error!("Failed to load birthdays for {key}: {e}");
            return 0;
        }
    };
    info!("🎂 {} birthday(s) on {key}", profiles.len());

    let mut sent = 0;
    for profile in &profiles {
        let wish = llm
            .chat(&[], &wish_prompt(profile), Some(WISH_SYSTEM))
            .await
            .unwrap_or_else(|| fallback_wish(&profile.first_name));

        let msg = OutgoingMessage::new(profile.peer_id, wish.as_str(), Format::Plain);
        if let Err(e) = messenger.send_message(msg).await {
            warn!("Failed to send birthday wish to {}: {e}", profile.peer_id);
            continue;
        }
        sent += 1;
        info!("Sent birthday wish to {}", profile.peer_id);

        let notice = OutgoingMessage::new(owner_id, owner_notice(profile, &wish), Format::Html);
        if let Err(e) = messenger.send_message(notice).await {
            warn!("Failed to notify owner about birthday of {}: {e}", profile.peer_id);
        }
    }
    sent
}

/// Run [`send_birthday_wishes`] on [`BIRTHDAY_CRON`] forever.
pub fn spawn_scheduler(
    db: Arc<Database>,
    messenger: Arc<dyn Messenger>,
    llm: Arc<dyn LlmClient>,
    owner_id: i64,
    tz: Tz,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Birthday scheduler started ({BIRTHDAY_CRON} {tz})");
        loop {
            let now = Utc::now();
            let next = match next_run(BIRTHDAY_CRON, now, tz) {
                Ok(next) => next,
                Err(e) => {
                    error!("Birthday scheduler stopped: {e}");
                    return;
                }
            };
            let wait = (next - now).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            let today = next.with_timezone(&tz).date_naive();
            send_birthday_wishes(&db, messenger.as_ref(), llm.as_ref(), owner_id, today).await;
        }
    })
}
