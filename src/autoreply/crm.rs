//! Background relationship classification for peers.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::autoreply::context::history_block;
use crate::autoreply::database::Database;
use crate::autoreply::profile::{normalize_birthday, Profile, RelationshipType, DEFAULT_SUMMARY};
use crate::llm::{Decision, LlmClient, Message};

/// Known profiles are re-analysed on every Nth stored message from the peer.
pub const REANALYZE_EVERY: usize = 20;

/// Turns of history the classifier sees.
const ANALYSIS_HISTORY: usize = 20;

const ANALYST_SYSTEM: &str = "You are a CRM analyst. Output strictly one JSON object. No markdown.";

const ANALYSIS_INSTRUCTIONS: &str = r#"Analyze this chat history between the bot owner's assistant and a contact.

GOAL: Deduce the contact's relationship to the owner, extract their birthday if mentioned, and summarize who they are.

OUTPUT JSON:
{
    "type": "profile",
    "relationship_type": "Client" | "Friend" | "Family" | "Spam" | "Unknown",
    "summary": "Short bio of the contact, at most 2 sentences.",
    "birthday": "MM-DD" or null
}"#;

pub fn should_analyze(profile_known: bool, user_message_count: usize) -> bool {
    !profile_known || (user_message_count > 0 && user_message_count % REANALYZE_EVERY == 0)
}

pub fn analysis_messages(peer_id: i64, first_name: &str, history: &str) -> Vec<Message> {
    vec![
        Message::system(ANALYST_SYSTEM),
        Message::user(format!(
            "{ANALYSIS_INSTRUCTIONS}\n\nHISTORY (contact: {first_name}, id: {peer_id}):\n{history}"
        )),
    ]
}

/// Build a profile from a structured response of kind `"profile"`.
pub fn profile_from_decision(peer_id: i64, first_name: &str, decision: &Decision) -> Option<Profile> {
    if decision.kind != "profile" {
        return None;
    }
    let payload = &decision.payload;

    let relationship_type = payload
        .get("relationship_type")
        .and_then(|v| v.as_str())
        .map(RelationshipType::parse)
        .unwrap_or(RelationshipType::Unknown);
    let summary = payload
        .get("summary")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SUMMARY)
        .to_string();
    let birthday = payload.get("birthday").and_then(|v| v.as_str()).and_then(normalize_birthday);

    Some(Profile {
        peer_id,
        first_name: first_name.to_string(),
        relationship_type,
        summary,
        birthday,
        last_interaction: chrono::Utc::now().to_rfc3339(),
    })
}

/// Classify a peer from their stored history and upsert the result.
///
/// Returns whether a profile was written.
pub async fn analyze_and_save(db: &Database, llm: &dyn LlmClient, peer_id: i64, first_name: &str) -> bool {
    info!("🔎 CRM analysis for {peer_id}");

    let history = match db.recent_messages(peer_id, ANALYSIS_HISTORY) {
        Ok(history) => history_block(&history),
        Err(e) => {
            warn!("CRM analysis for {peer_id}: failed to load history: {e}");
            return false;
        }
    };

    let Some(decision) = llm.decide(&analysis_messages(peer_id, first_name, &history)).await else {
        warn!("CRM analysis for {peer_id} got no usable response");
        return false;
    };
    let Some(profile) = profile_from_decision(peer_id, first_name, &decision) else {
        warn!("CRM analysis for {peer_id} returned unexpected kind {:?}", decision.kind);
        return false;
    };

    match db.upsert_profile(&profile) {
        Ok(()) => {
            info!(
                "CRM profile for {peer_id}: {} / {}",
                profile.relationship_type.as_str(),
                profile.summary
            );
            true
        }
        Err(e) => {
            warn!("Failed to save CRM profile for {peer_id}: {e}");
            false
        }
    }
}

pub fn spawn_analysis(
    db: Arc<Database>,
    llm: Arc<dyn LlmClient>,
    peer_id: i64,
    first_name: String,
) -> JoinHandle<bool> {
    tokio::spawn(async move { analyze_and_save(&db, llm.as_ref(), peer_id, &first_name).await })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autoreply::message::Role;
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedDecision(Option<Decision>);

    #[async_trait]
    impl LlmClient for FixedDecision {
        async fn chat(&self, _history: &[Message], _text: &str, _system: Option<&str>) -> Option<String> {
            None
        }

        async fn decide(&self, _messages: &[Message]) -> Option<Decision> {
            self.0.clone()
        }
    }

    fn decision(payload: serde_json::Value) -> Decision {
        Decision { kind: "profile".to_string(), payload }
    }

    #[test]
    fn test_should_analyze() {
        assert!(should_analyze(false, 1));
        assert!(should_analyze(false, 0));
        assert!(!should_analyze(true, 0));
        assert!(!should_analyze(true, 19));
        assert!(should_analyze(true, 20));
        assert!(should_analyze(true, 40));
    }

    #[test]
    fn test_profile_from_decision() {
        let d = decision(json!({
            "type": "profile",
            "relationship_type": "family",
            "summary": " Younger sister. ",
            "birthday": "3-7"
        }));
        let p = profile_from_decision(5, "Dilnoza", &d).unwrap();
        assert_eq!(p.relationship_type, RelationshipType::Family);
        assert_eq!(p.summary, "Younger sister.");
        assert_eq!(p.birthday.as_deref(), Some("03-07"));
        assert!(!p.last_interaction.is_empty());
    }

    #[test]
    fn test_profile_from_decision_defaults() {
        let d = decision(json!({"type": "profile", "relationship_type": "coworker", "birthday": "13-45"}));
        let p = profile_from_decision(5, "X", &d).unwrap();
        assert_eq!(p.relationship_type, RelationshipType::Unknown);
        assert_eq!(p.summary, DEFAULT_SUMMARY);
        assert_eq!(p.birthday, None);

        let other = Decision { kind: "general_chat".to_string(), payload: json!({}) };
        assert!(profile_from_decision(5, "X", &other).is_none());
    }

    #[test]
    fn test_analysis_messages_include_history() {
        let messages = analysis_messages(9, "Ali", "User: hi");
        assert_eq!(messages.len(), 2);
        assert!(messages[1].content.contains("contact: Ali, id: 9"));
        assert!(messages[1].content.ends_with("User: hi"));
    }

    #[tokio::test]
    async fn test_analyze_and_save_writes_profile() {
        let db = Database::in_memory().unwrap();
        db.save_message(9, Role::User, "My birthday is on 12 May").unwrap();
        let llm = FixedDecision(Some(decision(json!({
            "type": "profile",
            "relationship_type": "Client",
            "summary": "Asks about pricing.",
            "birthday": "05-12"
        }))));

        assert!(analyze_and_save(&db, &llm, 9, "Ali").await);
        let p = db.profile(9).unwrap().unwrap();
        assert_eq!(p.relationship_type, RelationshipType::Client);
        assert_eq!(db.profiles_with_birthday("05-12").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_analyze_and_save_failure_writes_nothing() {
        let db = Database::in_memory().unwrap();
        assert!(!analyze_and_save(&db, &FixedDecision(None), 9, "Ali").await);
        assert!(db.profile(9).unwrap().is_none());
    }
}
