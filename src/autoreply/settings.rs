//! The per-bot settings singleton and quiet-hours arithmetic.

use chrono::Timelike;

/// Tone the drafted replies should take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mood {
    Serious,
    Friendly,
}

impl Mood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Serious => "serious",
            Mood::Friendly => "friendly",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "friendly" => Mood::Friendly,
            _ => Mood::Serious,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Mood::Serious => Mood::Friendly,
            Mood::Friendly => Mood::Serious,
        }
    }

    /// Instruction fragment describing the tone.
    pub fn tone(&self) -> &'static str {
        match self {
            Mood::Serious => "polite, concise and professional",
            Mood::Friendly => "warm, casual and empathetic, with an occasional emoji",
        }
    }
}

/// Operator-controlled settings, one row per bot instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Setting {
    pub is_away: bool,
    pub quiet_hours_enabled: bool,
    /// "HH:MM"
    pub quiet_from: String,
    /// "HH:MM"
    pub quiet_to: String,
    pub mood: Mood,
    pub auto_reply_text: String,
}

pub const DEFAULT_AUTO_REPLY_TEXT: &str = "I'm busy right now, leave a message.";

impl Default for Setting {
    fn default() -> Self {
        Self {
            is_away: false,
            quiet_hours_enabled: false,
            quiet_from: "23:00".to_string(),
            quiet_to: "08:00".to_string(),
            mood: Mood::Serious,
            auto_reply_text: DEFAULT_AUTO_REPLY_TEXT.to_string(),
        }
    }
}

/// Parse "HH:MM" into minute-of-day.
pub fn parse_hhmm(s: &str) -> Option<u32> {
    let (h, m) = s.trim().split_once(':')?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return None;
    }
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

/// Parse "HH:MM-HH:MM" into a normalized `(from, to)` pair.
pub fn parse_window(s: &str) -> Option<(String, String)> {
    let (from, to) = s.trim().split_once('-')?;
    let from_min = parse_hhmm(from)?;
    let to_min = parse_hhmm(to)?;
    Some((format_hhmm(from_min), format_hhmm(to_min)))
}

pub fn format_hhmm(minute_of_day: u32) -> String {
    format!("{:02}:{:02}", minute_of_day / 60, minute_of_day % 60)
}

/// Minute-of-day of a local timestamp.
pub fn minute_of_day<T: Timelike>(t: &T) -> u32 {
    t.hour() * 60 + t.minute()
}

/// Whether `t` falls in the half-open window `[start, end)`.
///
/// A window with `start > end` wraps midnight. `start == end` is empty.
pub fn in_window(start: u32, end: u32, t: u32) -> bool {
    if start > end {
        t >= start || t < end
    } else {
        start <= t && t < end
    }
}

impl Setting {
    /// The quiet window as minute-of-day bounds, if both ends parse.
    pub fn quiet_window(&self) -> Option<(u32, u32)> {
        Some((parse_hhmm(&self.quiet_from)?, parse_hhmm(&self.quiet_to)?))
    }
}
