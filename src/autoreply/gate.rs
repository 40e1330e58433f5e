//! Per-message decision of whether an auto-reply goes out.

use crate::autoreply::settings::{in_window, Setting};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Reply,
    Suppress(SuppressReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    FromOwner,
    NotAway,
    QuietHours,
}

/// Decide over a snapshot of the current state. Rules apply in order:
/// owner, away mode, quiet hours.
pub fn decide(sender_id: i64, owner_id: i64, setting: &Setting, local_minute: u32) -> Decision {
    if sender_id == owner_id {
        return Decision::Suppress(SuppressReason::FromOwner);
    }
    if !setting.is_away {
        return Decision::Suppress(SuppressReason::NotAway);
    }
    if setting.quiet_hours_enabled {
        match setting.quiet_window() {
            Some((start, end)) if in_window(start, end, local_minute) => {
                return Decision::Suppress(SuppressReason::QuietHours);
            }
            Some(_) => {}
            None => warn!(
                "Quiet hours enabled with unparseable window {:?}-{:?}, ignoring",
                setting.quiet_from, setting.quiet_to
            ),
        }
    }
    Decision::Reply
}
