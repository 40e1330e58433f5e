//! LLM API key age check, run once at startup.

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::autoreply::sender::{Format, Messenger, OutgoingMessage};

/// Days a key stays valid after issue.
pub const KEY_LIFETIME_DAYS: i64 = 90;
/// Warn the owner once this many days or fewer remain.
pub const WARN_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    Ok { days_left: i64 },
    ExpiringSoon { days_left: i64 },
    Expired { days_over: i64 },
}

pub fn key_status(start: NaiveDate, today: NaiveDate) -> KeyStatus {
    // A start date in the future counts as a fresh key.
    let days_used = (today - start).num_days().max(0);
    let days_left = KEY_LIFETIME_DAYS - days_used;
    if days_left <= 0 {
        KeyStatus::Expired { days_over: -days_left }
    } else if days_left <= WARN_DAYS {
        KeyStatus::ExpiringSoon { days_left }
    } else {
        KeyStatus::Ok { days_left }
    }
}

/// Owner-facing HTML notice, `None` when nothing needs saying.
pub fn status_notice(status: KeyStatus) -> Option<String> {
    match status {
        KeyStatus::Ok { .. } => None,
        KeyStatus::ExpiringSoon { days_left } => Some(format!(
            "⚠️ <b>Groq API key expiration warning</b>\n\n\
             Your API key expires in <b>{days_left} days</b>.\n\n\
             Generate a new key soon to avoid interruption."
        )),
        KeyStatus::Expired { .. } => Some(
            "🚨 <b>API key EXPIRED!</b>\n\n\
             Your Groq API key is older than 90 days. AI replies may have stopped working.\n\n\
             Generate a new key and update <code>GROQ_API_KEY</code> and <code>GROQ_KEY_START_DATE</code>."
                .to_string(),
        ),
    }
}

/// `GROQ_KEY_START_DATE` in `YYYY-MM-DD` form.
pub fn parse_start_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Log the key age and tell the owner when it is close to or past expiry.
pub async fn check_api_key(messenger: &dyn Messenger, owner_id: i64, start: Option<&str>, today: NaiveDate) -> Option<KeyStatus> {
    let Some(raw) = start else {
        warn!("API key status: GROQ_KEY_START_DATE is not set, skipping expiry check");
        return None;
    };
    let Some(start) = parse_start_date(raw) else {
        warn!("API key status: GROQ_KEY_START_DATE {raw:?} is not YYYY-MM-DD, skipping expiry check");
        return None;
    };

    let status = key_status(start, today);
    info!("API key status: {:?}", status);

    if let Some(notice) = status_notice(status) {
        match messenger.send_message(OutgoingMessage::new(owner_id, notice, Format::Html)).await {
            Ok(_) => warn!("API key expiry notice sent to owner"),
            Err(e) => warn!("Failed to send API key notice: {e}"),
        }
    }
    Some(status)
}
