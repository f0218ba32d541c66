//! In-memory token collection store.
//!
//! Process-scoped and user-keyed: created at session start, cleared at
//! logout, and injected into both the purchase flow (writer) and the
//! dashboard view (reader) rather than reached for as a global.
//!
//! The collection is append-only from the flow's point of view. Entries and
//! the points balance move together under one lock acquisition, so a reader
//! can never observe tokens without their points or vice versa. Access is
//! assumed single-writer-per-user; cross-tab coordination is out of scope.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Points credited per adopted token.
pub const POINTS_PER_TOKEN: u64 = 10;

/// One acquired token as shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEntry {
    /// Tree species label (e.g. "CAOBA").
    pub name: String,
    pub project_id: String,
    pub acquired_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct UserCollection {
    entries: Vec<TokenEntry>,
    points: u64,
}

/// Cheaply cloneable handle to the per-user collections.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    inner: Arc<Mutex<HashMap<String, UserCollection>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `entries` and credit `points_delta` for `user_id` in one
    /// logical operation.
    pub fn append(&self, user_id: &str, entries: Vec<TokenEntry>, points_delta: u64) {
        let mut map = self.inner.lock().expect("token store poisoned");
        let collection = map.entry(user_id.to_string()).or_default();
        debug!(
            "Appending {} token(s) (+{points_delta} pts) for {user_id}",
            entries.len()
        );
        collection.entries.extend(entries);
        collection.points += points_delta;
    }

    /// All tokens for `user_id` in acquisition order. Stable across reads.
    pub fn list(&self, user_id: &str) -> Vec<TokenEntry> {
        let map = self.inner.lock().expect("token store poisoned");
        map.get(user_id)
            .map(|c| c.entries.clone())
            .unwrap_or_default()
    }

    pub fn points_balance(&self, user_id: &str) -> u64 {
        let map = self.inner.lock().expect("token store poisoned");
        map.get(user_id).map(|c| c.points).unwrap_or(0)
    }

    /// Drop everything held for `user_id` (logout).
    pub fn clear(&self, user_id: &str) {
        let mut map = self.inner.lock().expect("token store poisoned");
        map.remove(user_id);
    }

    /// Seed the demo collection the dashboard ships with.
    pub fn seed_demo(&self, user_id: &str) {
        let species = ["CAOBA", "ALMENDRO", "SAUCE LLORÓN", "CENÍZARO", "ESPABEL"];
        let entries = species
            .iter()
            .map(|name| TokenEntry {
                name: name.to_string(),
                project_id: "0".to_string(),
                acquired_at: Utc::now(),
            })
            .collect();

        let mut map = self.inner.lock().expect("token store poisoned");
        let collection = map.entry(user_id.to_string()).or_default();
        collection.entries = entries;
        collection.points = 1569;
    }
}
