//! Builds the instruction block handed to the LLM for one auto-reply.
//!
//! History is always fetched before the in-flight message is stored, so the
//! block never contains the message being answered.

use crate::autoreply::database::Database;
use crate::autoreply::message::StoredMessage;
use crate::autoreply::profile::Profile;
use crate::autoreply::settings::Setting;

/// Everything the prompt is built from.
#[derive(Debug, Clone)]
pub struct ReplyContext {
    pub history: Vec<StoredMessage>,
    pub profile: Profile,
    /// False when `profile` is the placeholder for an unseen peer.
    pub profile_known: bool,
}

/// Gather history and profile for a peer.
///
/// Must run before the in-flight message is persisted.
pub fn gather(db: &Database, peer_id: i64, first_name: &str, limit: usize) -> rusqlite::Result<ReplyContext> {
    let history = db.recent_messages(peer_id, limit)?;
    let stored = db.profile(peer_id)?;
    let profile_known = stored.is_some();
    let profile = stored.unwrap_or_else(|| Profile::placeholder(peer_id, first_name));
    Ok(ReplyContext { history, profile, profile_known })
}

/// Oldest-first, one `"<RoleLabel>: <content>"` line per turn.
pub fn history_block(history: &[StoredMessage]) -> String {
    history.iter().map(|m| m.format()).collect::<Vec<_>>().join("\n")
}

pub fn system_prompt(owner_name: &str, setting: &Setting, ctx: &ReplyContext) -> String {
    let history = if ctx.history.is_empty() {
        "(no earlier messages)".to_string()
    } else {
        history_block(&ctx.history)
    };
    let summary = if ctx.profile.summary.trim().is_empty() {
        crate::autoreply::profile::DEFAULT_SUMMARY
    } else {
        ctx.profile.summary.as_str()
    };

    format!(
        r#"SYSTEM ROLE:
You are the digital assistant of {owner}. {owner} is away and you answer their private messages on their behalf.
Reply in the language the contact writes in.

CONTEXT:
- Owner status: "{status}"
- Contact: {name} (relationship: {relationship})
- About the contact: {summary}
- Tone: {tone}

RULES:
1. No slang. Keep the wording clean and natural.
2. If the contact sounds tired, upset or worried, be supportive.
3. You live in a digital space. If asked to meet in person, explain politely that you cannot.
4. Use emoji sparingly.
5. Do not repeat what was already said in the history.
6. Never promise anything on the owner's behalf; offer to pass the message on.

CONVERSATION HISTORY (read only):
--------------------------------------------
{history}
--------------------------------------------

Taking the history into account, write a reply to the contact's latest message."#,
        owner = owner_name,
        status = setting.auto_reply_text,
        name = ctx.profile.first_name,
        relationship = ctx.profile.relationship_type.as_str(),
        summary = summary,
        tone = setting.mood.tone(),
        history = history,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autoreply::message::Role;
    use crate::autoreply::profile::RelationshipType;
    use crate::autoreply::settings::Mood;

    #[test]
    fn test_history_block_oldest_first() {
        let db = Database::in_memory().unwrap();
        db.save_message(7, Role::User, "salom").unwrap();
        db.save_message(7, Role::Assistant, "hello!").unwrap();
        db.save_message(7, Role::User, "where are you?").unwrap();

        let ctx = gather(&db, 7, "Ali", 10).unwrap();
        assert_eq!(history_block(&ctx.history), "User: salom\nAssistant: hello!\nUser: where are you?");
    }

    #[test]
    fn test_gather_defaults_for_unknown_peer() {
        let db = Database::in_memory().unwrap();
        let ctx = gather(&db, 7, "Ali", 10).unwrap();
        assert!(!ctx.profile_known);
        assert_eq!(ctx.profile.relationship_type, RelationshipType::Unknown);
        assert_eq!(ctx.profile.summary, "new contact");
        assert!(ctx.history.is_empty());
    }

    #[test]
    fn test_gather_respects_limit() {
        let db = Database::in_memory().unwrap();
        for i in 0..20 {
            db.save_message(7, Role::User, &format!("m{i}")).unwrap();
        }
        let ctx = gather(&db, 7, "Ali", 6).unwrap();
        assert_eq!(ctx.history.len(), 6);
        assert_eq!(ctx.history[0].content, "m14");
        assert_eq!(ctx.history[5].content, "m19");
    }

    #[test]
    fn test_prompt_includes_settings_profile_and_history() {
        let db = Database::in_memory().unwrap();
        db.save_message(7, Role::User, "earlier question").unwrap();
        db.upsert_profile(&Profile {
            peer_id: 7,
            first_name: "Mohinur".to_string(),
            relationship_type: RelationshipType::Friend,
            summary: "Old university friend.".to_string(),
            birthday: None,
            last_interaction: String::new(),
        })
        .unwrap();

        let setting = Setting {
            auto_reply_text: "At the gym until 20:00".to_string(),
            mood: Mood::Friendly,
            ..Setting::default()
        };
        let ctx = gather(&db, 7, "Mohinur", 10).unwrap();
        let prompt = system_prompt("Muhammad", &setting, &ctx);

        assert!(prompt.contains("digital assistant of Muhammad"));
        assert!(prompt.contains("\"At the gym until 20:00\""));
        assert!(prompt.contains("Mohinur (relationship: Friend)"));
        assert!(prompt.contains("Old university friend."));
        assert!(prompt.contains(Mood::Friendly.tone()));
        assert!(prompt.contains("User: earlier question"));
    }

    #[test]
    fn test_prompt_without_history() {
        let db = Database::in_memory().unwrap();
        let ctx = gather(&db, 7, "Ali", 10).unwrap();
        let prompt = system_prompt("Muhammad", &Setting::default(), &ctx);
        assert!(prompt.contains("(no earlier messages)"));
        assert!(prompt.contains("About the contact: new contact"));
    }
}
