//! Lightweight CRM profile kept per peer.

/// How a peer relates to the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipType {
    Client,
    Friend,
    Family,
    Spam,
    Unknown,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Client => "Client",
            RelationshipType::Friend => "Friend",
            RelationshipType::Family => "Family",
            RelationshipType::Spam => "Spam",
            RelationshipType::Unknown => "Unknown",
        }
    }

    /// Case-insensitive; anything unrecognised is `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "client" => RelationshipType::Client,
            "friend" | "close friend" => RelationshipType::Friend,
            "family" => RelationshipType::Family,
            "spam" => RelationshipType::Spam,
            _ => RelationshipType::Unknown,
        }
    }
}

pub const DEFAULT_SUMMARY: &str = "new contact";

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub peer_id: i64,
    pub first_name: String,
    pub relationship_type: RelationshipType,
    pub summary: String,
    /// "MM-DD"
    pub birthday: Option<String>,
    pub last_interaction: String,
}

impl Profile {
    /// Stand-in used when a peer has no stored profile yet.
    pub fn placeholder(peer_id: i64, first_name: &str) -> Self {
        Self {
            peer_id,
            first_name: first_name.to_string(),
            relationship_type: RelationshipType::Unknown,
            summary: DEFAULT_SUMMARY.to_string(),
            birthday: None,
            last_interaction: String::new(),
        }
    }
}

/// Validate a "MM-DD" birthday, returning it normalized.
pub fn normalize_birthday(s: &str) -> Option<String> {
    let (m, d) = s.trim().split_once('-')?;
    let m: u32 = m.parse().ok()?;
    let d: u32 = d.parse().ok()?;
    // Leap year so 02-29 is accepted
    chrono::NaiveDate::from_ymd_opt(2000, m, d)?;
    Some(format!("{:02}-{:02}", m, d))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_parse() {
        assert_eq!(RelationshipType::parse("Client"), RelationshipType::Client);
        assert_eq!(RelationshipType::parse(" friend "), RelationshipType::Friend);
        assert_eq!(RelationshipType::parse("Close Friend"), RelationshipType::Friend);
        assert_eq!(RelationshipType::parse("FAMILY"), RelationshipType::Family);
        assert_eq!(RelationshipType::parse("Spam"), RelationshipType::Spam);
        assert_eq!(RelationshipType::parse("colleague"), RelationshipType::Unknown);
        assert_eq!(RelationshipType::parse(""), RelationshipType::Unknown);
    }

    #[test]
    fn test_relationship_roundtrip() {
        for r in [
            RelationshipType::Client,
            RelationshipType::Friend,
            RelationshipType::Family,
            RelationshipType::Spam,
            RelationshipType::Unknown,
        ] {
            assert_eq!(RelationshipType::parse(r.as_str()), r);
        }
    }

    #[test]
    fn test_placeholder_defaults() {
        let p = Profile::placeholder(7, "Ali");
        assert_eq!(p.relationship_type, RelationshipType::Unknown);
        assert_eq!(p.summary, "new contact");
        assert!(p.birthday.is_none());
    }

    #[test]
    fn test_normalize_birthday() {
        assert_eq!(normalize_birthday("03-07"), Some("03-07".to_string()));
        assert_eq!(normalize_birthday("3-7"), Some("03-07".to_string()));
        assert_eq!(normalize_birthday("02-29"), Some("02-29".to_string()));
        assert_eq!(normalize_birthday("02-30"), None);
        assert_eq!(normalize_birthday("13-01"), None);
        assert_eq!(normalize_birthday("null"), None);
        assert_eq!(normalize_birthday("1990-03-07"), None);
    }
}
