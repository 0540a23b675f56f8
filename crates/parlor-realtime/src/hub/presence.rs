//! Last-activity tracking backing the `last_seen` field of presence events
//! and online queries.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use parlor_core::types::id::UserId;

/// Lock-free registry of when each online user last produced traffic.
#[derive(Debug, Default)]
pub struct LastSeenRegistry {
    /// User ID → last activity time.
    last_active: DashMap<UserId, DateTime<Utc>>,
}

impl LastSeenRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            last_active: DashMap::new(),
        }
    }

    /// Record activity for a user.
    pub fn record(&self, user_id: UserId) {
        self.last_active.insert(user_id, Utc::now());
    }

    /// Last recorded activity for a user.
    pub fn get(&self, user_id: UserId) -> Option<DateTime<Utc>> {
        self.last_active.get(&user_id).map(|r| *r.value())
    }

    /// Drop a user's entry once they leave the identity index.
    pub fn forget(&self, user_id: UserId) {
        self.last_active.remove(&user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_forget() {
        let registry = LastSeenRegistry::new();
        let user = UserId::new();

        assert!(registry.get(user).is_none());
        registry.record(user);
        assert!(registry.get(user).is_some());
        registry.forget(user);
        assert!(registry.get(user).is_none());
    }
}
