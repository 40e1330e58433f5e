//! Persistent SQLite database for settings, conversation history and profiles.

use crate::autoreply::message::{Role, StoredMessage};
use crate::autoreply::profile::{Profile, RelationshipType};
use crate::autoreply::settings::{Mood, Setting, DEFAULT_AUTO_REPLY_TEXT};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

/// Where the operator's status panel currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardLocation {
    pub chat_id: i64,
    pub message_id: i64,
}

/// Persistent SQLite database for one bot instance.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Create a new in-memory database.
    pub fn in_memory() -> rusqlite::Result<Self> {
        let db = Self { conn: Mutex::new(Connection::open_in_memory()?) };
        db.init_schema()?;
        Ok(db)
    }

    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        let db = Self { conn: Mutex::new(Connection::open(path)?) };
        db.init_schema()?;

        let (msg_count, profile_count) = db.counts()?;
        info!("Loaded database from {:?} ({} messages, {} profiles)", path, msg_count, profile_count);
        Ok(db)
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("database lock poisoned")
    }

    fn init_schema(&self) -> rusqlite::Result<()> {
        let conn = self.conn();
        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                is_away INTEGER NOT NULL DEFAULT 0,
                quiet_hours_enabled INTEGER NOT NULL DEFAULT 0,
                quiet_from TEXT NOT NULL DEFAULT '23:00',
                quiet_to TEXT NOT NULL DEFAULT '08:00',
                ai_mood TEXT NOT NULL DEFAULT 'serious',
                auto_reply_text TEXT NOT NULL DEFAULT '{}',
                dashboard_chat_id INTEGER,
                dashboard_message_id INTEGER
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                peer_id INTEGER NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS crm_profiles (
                peer_id INTEGER PRIMARY KEY,
                first_name TEXT NOT NULL,
                relationship_type TEXT NOT NULL DEFAULT 'Unknown',
                summary TEXT NOT NULL DEFAULT '',
                birthday TEXT,
                last_interaction TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_peer ON messages(peer_id, id);
            CREATE INDEX IF NOT EXISTS idx_profiles_birthday ON crm_profiles(birthday);
            "#,
            DEFAULT_AUTO_REPLY_TEXT.replace('\'', "''")
        ))
    }

    fn counts(&self) -> rusqlite::Result<(usize, usize)> {
        let conn = self.conn();
        let msg_count: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        let profile_count: i64 = conn.query_row("SELECT COUNT(*) FROM crm_profiles", [], |row| row.get(0))?;
        Ok((msg_count as usize, profile_count as usize))
    }

    // ==================== SETTINGS METHODS ====================

    /// Current settings, creating the default row on first use.
    pub fn settings(&self) -> rusqlite::Result<Setting> {
        let conn = self.conn();
        conn.execute("INSERT OR IGNORE INTO settings (id) VALUES (1)", [])?;
        conn.query_row(
            "SELECT is_away, quiet_hours_enabled, quiet_from, quiet_to, ai_mood, auto_reply_text
             FROM settings WHERE id = 1",
            [],
            |row| {
                Ok(Setting {
                    is_away: row.get(0)?,
                    quiet_hours_enabled: row.get(1)?,
                    quiet_from: row.get(2)?,
                    quiet_to: row.get(3)?,
                    mood: Mood::parse(&row.get::<_, String>(4)?),
                    auto_reply_text: row.get(5)?,
                })
            },
        )
    }

    fn update_settings(&self, sql: &str, values: impl rusqlite::Params) -> rusqlite::Result<Setting> {
        {
            let conn = self.conn();
            conn.execute("INSERT OR IGNORE INTO settings (id) VALUES (1)", [])?;
            conn.execute(sql, values)?;
        }
        self.settings()
    }

    pub fn toggle_away(&self) -> rusqlite::Result<Setting> {
        self.update_settings("UPDATE settings SET is_away = NOT is_away WHERE id = 1", [])
    }

    pub fn toggle_quiet_hours(&self) -> rusqlite::Result<Setting> {
        self.update_settings("UPDATE settings SET quiet_hours_enabled = NOT quiet_hours_enabled WHERE id = 1", [])
    }

    pub fn toggle_mood(&self) -> rusqlite::Result<Setting> {
        let next = self.settings()?.mood.toggled();
        self.update_settings("UPDATE settings SET ai_mood = ?1 WHERE id = 1", params![next.as_str()])
    }

    pub fn set_away(&self, is_away: bool) -> rusqlite::Result<Setting> {
        self.update_settings("UPDATE settings SET is_away = ?1 WHERE id = 1", params![is_away])
    }

    pub fn set_auto_reply_text(&self, text: &str) -> rusqlite::Result<Setting> {
        self.update_settings("UPDATE settings SET auto_reply_text = ?1 WHERE id = 1", params![text])
    }

    pub fn set_quiet_window(&self, from: &str, to: &str) -> rusqlite::Result<Setting> {
        self.update_settings(
            "UPDATE settings SET quiet_from = ?1, quiet_to = ?2 WHERE id = 1",
            params![from, to],
        )
    }

    pub fn set_dashboard_location(&self, location: DashboardLocation) -> rusqlite::Result<()> {
        self.update_settings(
            "UPDATE settings SET dashboard_chat_id = ?1, dashboard_message_id = ?2 WHERE id = 1",
            params![location.chat_id, location.message_id],
        )
        .map(|_| ())
    }

    pub fn dashboard_location(&self) -> rusqlite::Result<Option<DashboardLocation>> {
        let conn = self.conn();
        let row: Option<(Option<i64>, Option<i64>)> = conn
            .query_row(
                "SELECT dashboard_chat_id, dashboard_message_id FROM settings WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(match row {
            Some((Some(chat_id), Some(message_id))) => Some(DashboardLocation { chat_id, message_id }),
            _ => None,
        })
    }

    // ==================== MESSAGE METHODS ====================

    /// Append a conversation turn. Returns its row id.
    pub fn save_message(&self, peer_id: i64, role: Role, content: &str) -> rusqlite::Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO messages (peer_id, role, content) VALUES (?1, ?2, ?3)",
            params![peer_id, role.as_str(), content],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// The last `limit` turns for a peer, oldest first.
    ///
    /// Ordered by primary key, which matches insertion and chronological order.
    pub fn recent_messages(&self, peer_id: i64, limit: usize) -> rusqlite::Result<Vec<StoredMessage>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, peer_id, role, content, created_at FROM messages
             WHERE peer_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let mut result = stmt
            .query_map(params![peer_id, limit as i64], |row| {
                Ok(StoredMessage {
                    id: row.get(0)?,
                    peer_id: row.get(1)?,
                    role: Role::parse(&row.get::<_, String>(2)?),
                    content: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        result.reverse();
        Ok(result)
    }

    /// Number of stored turns authored by the peer.
    pub fn user_message_count(&self, peer_id: i64) -> rusqlite::Result<usize> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE peer_id = ?1 AND role = 'user'",
            params![peer_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Total message count.
    #[cfg(test)]
    pub fn message_count(&self) -> usize {
        self.counts().map(|(m, _)| m).unwrap_or(0)
    }

    // ==================== PROFILE METHODS ====================

    fn row_to_profile(row: &Row<'_>) -> rusqlite::Result<Profile> {
        Ok(Profile {
            peer_id: row.get(0)?,
            first_name: row.get(1)?,
            relationship_type: RelationshipType::parse(&row.get::<_, String>(2)?),
            summary: row.get(3)?,
            birthday: row.get(4)?,
            last_interaction: row.get(5)?,
        })
    }

    pub fn profile(&self, peer_id: i64) -> rusqlite::Result<Option<Profile>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT peer_id, first_name, relationship_type, summary, birthday, last_interaction
             FROM crm_profiles WHERE peer_id = ?1",
            params![peer_id],
            Self::row_to_profile,
        )
        .optional()
    }

    /// Insert or update a profile. A `None` birthday keeps the stored one.
    pub fn upsert_profile(&self, profile: &Profile) -> rusqlite::Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO crm_profiles (peer_id, first_name, relationship_type, summary, birthday, last_interaction)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(peer_id) DO UPDATE SET
                first_name = ?2,
                relationship_type = ?3,
                summary = ?4,
                birthday = COALESCE(?5, birthday),
                last_interaction = ?6",
            params![
                profile.peer_id,
                profile.first_name,
                profile.relationship_type.as_str(),
                profile.summary,
                profile.birthday,
                profile.last_interaction
            ],
        )?;
        Ok(())
    }

    /// Profiles whose birthday is the given "MM-DD".
    pub fn profiles_with_birthday(&self, month_day: &str) -> rusqlite::Result<Vec<Profile>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT peer_id, first_name, relationship_type, summary, birthday, last_interaction
             FROM crm_profiles WHERE birthday = ?1 ORDER BY peer_id",
        )?;
        let rows = stmt.query_map(params![month_day], Self::row_to_profile)?;
        rows.collect()
    }
}
