//! Business connections seen since startup.

use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Private chat between the bot and the connected account.
    pub user_chat_id: i64,
    pub enabled: bool,
}

/// Process-scoped map of connection id to its last known state.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, ConnectionInfo>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, connection_id: &str, info: ConnectionInfo) {
        self.connections
            .write()
            .expect("connection registry lock poisoned")
            .insert(connection_id.to_string(), info);
    }

    pub fn get(&self, connection_id: &str) -> Option<ConnectionInfo> {
        self.connections
            .read()
            .expect("connection registry lock poisoned")
            .get(connection_id)
            .copied()
    }

    /// Unknown connections are assumed usable.
    pub fn is_disabled(&self, connection_id: &str) -> bool {
        self.get(connection_id).is_some_and(|c| !c.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_overwrites() {
        let registry = ConnectionRegistry::new();
        assert!(registry.get("c1").is_none());
        assert!(!registry.is_disabled("c1"));

        registry.update("c1", ConnectionInfo { user_chat_id: 10, enabled: true });
        assert!(!registry.is_disabled("c1"));

        registry.update("c1", ConnectionInfo { user_chat_id: 10, enabled: false });
        assert!(registry.is_disabled("c1"));
        assert_eq!(registry.get("c1").unwrap().user_chat_id, 10);
    }
}
