//! Owner-facing control panel: status dashboard, toggles, and text input.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use chrono_tz::Tz;
use teloxide::types::{CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup};
use teloxide::utils::html;
use tracing::{info, warn};

use crate::autoreply::database::{DashboardLocation, Database};
use crate::autoreply::settings::{parse_window, Mood, Setting};
use crate::autoreply::telegram::TelegramClient;
use crate::ratelimit::DailyCounter;

/// Inline keyboard actions on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCallback {
    ToggleAway,
    ToggleQuiet,
    ToggleMood,
    EditText,
    Refresh,
}

impl AdminCallback {
    pub fn data(&self) -> &'static str {
        match self {
            AdminCallback::ToggleAway => "admin:toggle_away",
            AdminCallback::ToggleQuiet => "admin:toggle_quiet",
            AdminCallback::ToggleMood => "admin:toggle_mood",
            AdminCallback::EditText => "admin:edit_text",
            AdminCallback::Refresh => "admin:refresh",
        }
    }

    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "admin:toggle_away" => Some(AdminCallback::ToggleAway),
            "admin:toggle_quiet" => Some(AdminCallback::ToggleQuiet),
            "admin:toggle_mood" => Some(AdminCallback::ToggleMood),
            "admin:edit_text" => Some(AdminCallback::EditText),
            "admin:refresh" => Some(AdminCallback::Refresh),
            _ => None,
        }
    }
}

/// A direct message from the owner, classified.
///
/// Used for both the pending-input path and the command path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerInput {
    /// Replacement auto-reply text, while one is awaited.
    ReplyText(String),
    /// Argument of `/quiet`, unparsed.
    QuietWindow(String),
    Cancel,
    ShowDashboard,
}

impl OwnerInput {
    pub fn parse(text: &str, awaiting_reply_text: bool) -> Self {
        let text = text.trim();
        if let Some(rest) = command_arg(text, "/quiet") {
            return OwnerInput::QuietWindow(rest.to_string());
        }
        if command_arg(text, "/cancel").is_some() {
            return OwnerInput::Cancel;
        }
        if awaiting_reply_text && !text.is_empty() && !text.starts_with('/') {
            return OwnerInput::ReplyText(text.to_string());
        }
        OwnerInput::ShowDashboard
    }
}

/// Argument after `cmd`, accepting a `@botname` suffix.
fn command_arg<'a>(text: &'a str, cmd: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(cmd)?;
    let rest = match rest.strip_prefix('@') {
        Some(r) => r.split_once(char::is_whitespace).map_or("", |(_, a)| a),
        None if rest.is_empty() || rest.starts_with(char::is_whitespace) => rest,
        None => return None,
    };
    Some(rest.trim())
}

pub struct Dashboard {
    pub text: String,
    pub keyboard: InlineKeyboardMarkup,
}

fn mood_label(mood: Mood) -> &'static str {
    match mood {
        Mood::Serious => "Serious",
        Mood::Friendly => "Friendly",
    }
}

pub fn render_dashboard(setting: &Setting, today_count: u64) -> Dashboard {
    let status = if setting.is_away {
        "🟢 <b>Status: AWAY (auto-reply on)</b>"
    } else {
        "🔴 <b>Status: AVAILABLE (auto-reply off)</b>"
    };
    let quiet = if setting.quiet_hours_enabled {
        format!("🌙 ({}-{})", setting.quiet_from, setting.quiet_to)
    } else {
        "☀️ Off".to_string()
    };

    let text = format!(
        "🔐 <b>Control panel</b>\n\n\
         {status}\n\
         🎭 <b>Mood:</b> {mood}\n\
         🌙 <b>Quiet hours:</b> {quiet}\n\
         📊 <b>Messages today:</b> {today_count}\n\n\
         📝 <b>Auto-reply text:</b>\n<i>\"{reply}\"</i>",
        mood = mood_label(setting.mood),
        reply = html::escape(&setting.auto_reply_text),
    );

    let away_label = if setting.is_away { "🔴 Turn away off" } else { "🟢 Turn away on" };
    let mood_button = match setting.mood {
        Mood::Serious => "🎭 Friendly mode",
        Mood::Friendly => "👔 Serious mode",
    };
    let button = |label: &str, cb: AdminCallback| InlineKeyboardButton::callback(label.to_string(), cb.data());

    let keyboard = InlineKeyboardMarkup::new(vec![
        vec![button(away_label, AdminCallback::ToggleAway)],
        vec![
            button("🌙 Quiet hours", AdminCallback::ToggleQuiet),
            button(mood_button, AdminCallback::ToggleMood),
        ],
        vec![button("📝 Change text", AdminCallback::EditText)],
        vec![button("🔄 Refresh", AdminCallback::Refresh)],
    ]);

    Dashboard { text, keyboard }
}

/// State change produced by a dashboard button.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackEffect {
    Rerender(Setting),
    AwaitReplyText,
}

/// State change produced by an owner message.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEffect {
    ReplyTextSet(Setting),
    QuietWindowSet(Setting),
    InvalidQuietWindow,
    Cancelled,
    ShowDashboard(Setting),
}

pub const EDIT_TEXT_PROMPT: &str = "👇 <b>Send the new auto-reply text here:</b>\n\n\
    <i>For example: \"In a meeting, free after 18:00.\"</i>\n/cancel to keep the current one.";

pub const QUIET_USAGE: &str = "Usage: <code>/quiet HH:MM-HH:MM</code>, for example <code>/quiet 23:00-08:00</code>";

/// Owner control panel backed by the settings store.
pub struct Admin {
    database: Arc<Database>,
    counter: Arc<DailyCounter>,
    timezone: Tz,
    owner_id: i64,
    awaiting_reply_text: AtomicBool,
}

impl Admin {
    pub fn new(database: Arc<Database>, counter: Arc<DailyCounter>, timezone: Tz, owner_id: i64) -> Self {
        Self { database, counter, timezone, owner_id, awaiting_reply_text: AtomicBool::new(false) }
    }

    pub fn is_awaiting_reply_text(&self) -> bool {
        self.awaiting_reply_text.load(Ordering::SeqCst)
    }

    fn today_count(&self) -> u64 {
        self.counter.get(Utc::now().with_timezone(&self.timezone).date_naive())
    }

    pub fn dashboard(&self, setting: &Setting) -> Dashboard {
        render_dashboard(setting, self.today_count())
    }

    pub fn apply_callback(&self, cb: AdminCallback) -> rusqlite::Result<CallbackEffect> {
        let setting = match cb {
            AdminCallback::ToggleAway => self.database.toggle_away()?,
            AdminCallback::ToggleQuiet => self.database.toggle_quiet_hours()?,
            AdminCallback::ToggleMood => self.database.toggle_mood()?,
            AdminCallback::Refresh => self.database.settings()?,
            AdminCallback::EditText => {
                self.awaiting_reply_text.store(true, Ordering::SeqCst);
                return Ok(CallbackEffect::AwaitReplyText);
            }
        };
        info!("⚙️ Admin {:?}: away={} quiet={} mood={}", cb, setting.is_away, setting.quiet_hours_enabled, setting.mood.as_str());
        Ok(CallbackEffect::Rerender(setting))
    }

    pub fn apply_input(&self, input: OwnerInput) -> rusqlite::Result<InputEffect> {
        match input {
            OwnerInput::ReplyText(text) => {
                let setting = self.database.set_auto_reply_text(&text)?;
                self.awaiting_reply_text.store(false, Ordering::SeqCst);
                info!("⚙️ Auto-reply text updated");
                Ok(InputEffect::ReplyTextSet(setting))
            }
            OwnerInput::QuietWindow(arg) => match parse_window(&arg) {
                Some((from, to)) => {
                    let setting = self.database.set_quiet_window(&from, &to)?;
                    info!("⚙️ Quiet window set to {from}-{to}");
                    Ok(InputEffect::QuietWindowSet(setting))
                }
                None => Ok(InputEffect::InvalidQuietWindow),
            },
            OwnerInput::Cancel => {
                self.awaiting_reply_text.store(false, Ordering::SeqCst);
                Ok(InputEffect::Cancelled)
            }
            OwnerInput::ShowDashboard => Ok(InputEffect::ShowDashboard(self.database.settings()?)),
        }
    }

    /// Handle a dashboard button press. Presses from anyone but the owner
    /// are ignored.
    pub async fn on_callback(&self, telegram: &TelegramClient, query: &CallbackQuery) {
        let from_id = query.from.id.0 as i64;
        let data = query.data.as_deref().unwrap_or_default();
        if from_id != self.owner_id {
            warn!("Ignoring admin callback {data:?} from non-owner {from_id}");
            return;
        }
        let Some(cb) = AdminCallback::parse(data) else {
            let _ = telegram.answer_callback(query, None).await;
            return;
        };
        let panel = query
            .regular_message()
            .map(|m| DashboardLocation { chat_id: m.chat.id.0, message_id: m.id.0 as i64 });

        match self.apply_callback(cb) {
            Ok(CallbackEffect::Rerender(setting)) => {
                let toast = (cb == AdminCallback::Refresh).then_some("Refreshed");
                if let Some(location) = panel {
                    let dashboard = self.dashboard(&setting);
                    if telegram
                        .edit_with_keyboard(location.chat_id, location.message_id, &dashboard.text, dashboard.keyboard)
                        .await
                        .is_ok()
                    {
                        self.remember(location);
                    }
                }
                let _ = telegram.answer_callback(query, toast).await;
            }
            Ok(CallbackEffect::AwaitReplyText) => {
                let _ = telegram.answer_callback(query, None).await;
                let _ = telegram.send_html(self.owner_id, EDIT_TEXT_PROMPT).await;
            }
            Err(e) => {
                warn!("Admin callback {data:?} failed: {e}");
                let _ = telegram.answer_callback(query, Some("Storage error")).await;
            }
        }
    }

    /// Handle a direct message from the owner to the bot.
    pub async fn on_owner_message(&self, telegram: &TelegramClient, chat_id: i64, text: &str) {
        let input = OwnerInput::parse(text, self.is_awaiting_reply_text());
        let effect = match self.apply_input(input) {
            Ok(effect) => effect,
            Err(e) => {
                warn!("Admin input failed: {e}");
                return;
            }
        };

        match effect {
            InputEffect::ReplyTextSet(setting) | InputEffect::QuietWindowSet(setting) => {
                let _ = telegram.send_html(chat_id, "✅ Saved.").await;
                self.refresh_stored_dashboard(telegram, &setting).await;
            }
            InputEffect::InvalidQuietWindow => {
                let _ = telegram.send_html(chat_id, QUIET_USAGE).await;
            }
            InputEffect::Cancelled => {
                let _ = telegram.send_html(chat_id, "Cancelled.").await;
            }
            InputEffect::ShowDashboard(setting) => {
                let dashboard = self.dashboard(&setting);
                if let Ok(message_id) = telegram.send_with_keyboard(chat_id, &dashboard.text, dashboard.keyboard).await {
                    self.remember(DashboardLocation { chat_id, message_id });
                }
            }
        }
    }

    async fn refresh_stored_dashboard(&self, telegram: &TelegramClient, setting: &Setting) {
        match self.database.dashboard_location() {
            Ok(Some(location)) => {
                let dashboard = self.dashboard(setting);
                // Fails harmlessly when the panel was deleted or is unchanged
                let _ = telegram
                    .edit_with_keyboard(location.chat_id, location.message_id, &dashboard.text, dashboard.keyboard)
                    .await;
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to load dashboard location: {e}"),
        }
    }

    fn remember(&self, location: DashboardLocation) {
        if let Err(e) = self.database.set_dashboard_location(location) {
            warn!("Failed to store dashboard location: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::InlineKeyboardButtonKind;

    fn admin() -> Admin {
        let db = Arc::new(Database::in_memory().unwrap());
        let today = Utc::now().with_timezone(&chrono_tz::UTC).date_naive();
        Admin::new(db, Arc::new(DailyCounter::new(today)), chrono_tz::UTC, 1)
    }

    fn callback_data(kb: &InlineKeyboardMarkup) -> Vec<String> {
        kb.inline_keyboard
            .iter()
            .flatten()
            .filter_map(|b| match &b.kind {
                InlineKeyboardButtonKind::CallbackData(d) => Some(d.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_callback_data_roundtrip() {
        for cb in [
            AdminCallback::ToggleAway,
            AdminCallback::ToggleQuiet,
            AdminCallback::ToggleMood,
            AdminCallback::EditText,
            AdminCallback::Refresh,
        ] {
            assert_eq!(AdminCallback::parse(cb.data()), Some(cb));
        }
        assert_eq!(AdminCallback::parse("admin:unknown"), None);
    }

    #[test]
    fn test_owner_input_parse() {
        assert_eq!(OwnerInput::parse("/quiet 22:00-07:30", false), OwnerInput::QuietWindow("22:00-07:30".to_string()));
        assert_eq!(OwnerInput::parse("/quiet@my_bot 22:00-07:30", true), OwnerInput::QuietWindow("22:00-07:30".to_string()));
        assert_eq!(OwnerInput::parse("/quiet", false), OwnerInput::QuietWindow(String::new()));
        assert_eq!(OwnerInput::parse("/quietly", false), OwnerInput::ShowDashboard);
        assert_eq!(OwnerInput::parse("/cancel", true), OwnerInput::Cancel);
        assert_eq!(OwnerInput::parse("  Back at 6pm ", true), OwnerInput::ReplyText("Back at 6pm".to_string()));
        assert_eq!(OwnerInput::parse("Back at 6pm", false), OwnerInput::ShowDashboard);
        assert_eq!(OwnerInput::parse("/start", true), OwnerInput::ShowDashboard);
    }

    #[test]
    fn test_render_dashboard() {
        let setting = Setting {
            is_away: true,
            quiet_hours_enabled: true,
            auto_reply_text: "<busy>".to_string(),
            ..Setting::default()
        };
        let d = render_dashboard(&setting, 42);
        assert!(d.text.contains("AWAY"));
        assert!(d.text.contains("(23:00-08:00)"));
        assert!(d.text.contains("Serious"));
        assert!(d.text.contains("<b>Messages today:</b> 42"));
        assert!(d.text.contains("&lt;busy&gt;"));
        assert_eq!(
            callback_data(&d.keyboard),
            vec!["admin:toggle_away", "admin:toggle_quiet", "admin:toggle_mood", "admin:edit_text", "admin:refresh"]
        );

        let idle = render_dashboard(&Setting::default(), 0);
        assert!(idle.text.contains("AVAILABLE"));
        assert!(idle.text.contains("☀️ Off"));
        assert_eq!(idle.keyboard.inline_keyboard[0][0].text, "🟢 Turn away on");
    }

    #[test]
    fn test_toggle_callbacks() {
        let admin = admin();
        let CallbackEffect::Rerender(s) = admin.apply_callback(AdminCallback::ToggleAway).unwrap() else {
            panic!("expected rerender");
        };
        assert!(s.is_away);
        let CallbackEffect::Rerender(s) = admin.apply_callback(AdminCallback::ToggleAway).unwrap() else {
            panic!("expected rerender");
        };
        assert!(!s.is_away);

        let CallbackEffect::Rerender(s) = admin.apply_callback(AdminCallback::ToggleMood).unwrap() else {
            panic!("expected rerender");
        };
        assert_eq!(s.mood, Mood::Friendly);
        let CallbackEffect::Rerender(s) = admin.apply_callback(AdminCallback::ToggleQuiet).unwrap() else {
            panic!("expected rerender");
        };
        assert!(s.quiet_hours_enabled);
    }

    #[test]
    fn test_edit_text_flow() {
        let admin = admin();
        assert!(!admin.is_awaiting_reply_text());
        assert_eq!(admin.apply_callback(AdminCallback::EditText).unwrap(), CallbackEffect::AwaitReplyText);
        assert!(admin.is_awaiting_reply_text());

        let input = OwnerInput::parse("Out until Monday", admin.is_awaiting_reply_text());
        let InputEffect::ReplyTextSet(s) = admin.apply_input(input).unwrap() else {
            panic!("expected reply text");
        };
        assert_eq!(s.auto_reply_text, "Out until Monday");
        assert!(!admin.is_awaiting_reply_text());

        // The next message shows the dashboard instead
        assert!(matches!(
            admin.apply_input(OwnerInput::parse("hello", admin.is_awaiting_reply_text())).unwrap(),
            InputEffect::ShowDashboard(_)
        ));
    }

    #[test]
    fn test_cancel_disarms() {
        let admin = admin();
        admin.apply_callback(AdminCallback::EditText).unwrap();
        assert_eq!(admin.apply_input(OwnerInput::Cancel).unwrap(), InputEffect::Cancelled);
        assert!(!admin.is_awaiting_reply_text());
    }

    #[test]
    fn test_quiet_window_input() {
        let admin = admin();
        let InputEffect::QuietWindowSet(s) = admin.apply_input(OwnerInput::QuietWindow("1:30-7:00".to_string())).unwrap()
        else {
            panic!("expected window");
        };
        assert_eq!((s.quiet_from.as_str(), s.quiet_to.as_str()), ("01:30", "07:00"));

        assert_eq!(
            admin.apply_input(OwnerInput::QuietWindow("tonight".to_string())).unwrap(),
            InputEffect::InvalidQuietWindow
        );
    }
}
