use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::config::Config;
use crate::models::ParsedResult;

/// Maximum concurrent upstream queries across all sessions.
const MAX_CONCURRENT_QUERIES: usize = 3;

/// Per-UI-session state: the last query, its normalized result, and the
/// data products the user already requested access to. Replaced on each
/// new query, discarded when the session is pruned.
#[derive(Debug, Clone)]
pub struct Session {
    pub query: String,
    pub result: ParsedResult,
    pub access_requested: HashSet<String>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    fn empty() -> Self {
        Self {
            query: String::new(),
            result: ParsedResult::placeholder(serde_json::Value::Null),
            access_requested: HashSet::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub http_client: reqwest::Client,
    pub sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
    pub query_semaphore: Arc<tokio::sync::Semaphore>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let query_timeout = config.query_timeout_secs;
        Ok(Self {
            config,
            http_client: reqwest::Client::builder()
                .connect_timeout(std::time::Duration::from_secs(10))
                .timeout(std::time::Duration::from_secs(query_timeout))
                .build()?,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            query_semaphore: Arc::new(tokio::sync::Semaphore::new(MAX_CONCURRENT_QUERIES)),
        })
    }

    /// Store a query's normalized result, replacing the session's previous
    /// one. Prunes the oldest sessions past the configured cap.
    pub fn store_result(&self, session_id: Uuid, query: &str, result: ParsedResult) {
        let mut sessions = self.sessions.write();

        let session = sessions.entry(session_id).or_insert_with(Session::empty);
        session.query = query.to_string();
        session.result = result;
        session.updated_at = Utc::now();

        while sessions.len() > self.config.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, s)| s.updated_at)
                .map(|(id, _)| *id);
            match oldest {
                Some(id) => {
                    sessions.remove(&id);
                }
                None => break,
            }
        }
    }

    /// Fetch a session's stored query and result.
    pub fn session_snapshot(&self, session_id: Uuid) -> Option<(String, ParsedResult)> {
        let sessions = self.sessions.read();
        sessions
            .get(&session_id)
            .map(|s| (s.query.clone(), s.result.clone()))
    }

    /// Record an access request for a data product within a session.
    /// Returns false when the product was already requested.
    pub fn mark_access_requested(&self, session_id: Uuid, product: &str) -> bool {
        let mut sessions = self.sessions.write();
        let session = sessions.entry(session_id).or_insert_with(Session::empty);
        session.access_requested.insert(product.to_string())
    }

    /// Undo a recorded access request so the user can retry after an
    /// upstream failure.
    pub fn unmark_access_requested(&self, session_id: Uuid, product: &str) {
        let mut sessions = self.sessions.write();
        if let Some(session) = sessions.get_mut(&session_id) {
            session.access_requested.remove(product);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_state(max_sessions: usize) -> AppState {
        AppState::new(Config {
            max_sessions,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_store_and_fetch_result() {
        let state = test_state(8);
        let id = Uuid::new_v4();
        let result = ParsedResult::placeholder(json!("raw"));

        state.store_result(id, "find loans", result.clone());
        let (query, stored) = state.session_snapshot(id).unwrap();
        assert_eq!(query, "find loans");
        assert_eq!(stored, result);
    }

    #[test]
    fn test_new_query_replaces_result() {
        let state = test_state(8);
        let id = Uuid::new_v4();

        state.store_result(id, "q1", ParsedResult::placeholder(json!(1)));
        state.store_result(id, "q2", ParsedResult::placeholder(json!(2)));

        let (query, stored) = state.session_snapshot(id).unwrap();
        assert_eq!(query, "q2");
        assert_eq!(stored.raw_response, json!(2));
    }

    #[test]
    fn test_unknown_session_returns_none() {
        let state = test_state(8);
        assert!(state.session_snapshot(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_oldest_session_pruned_past_cap() {
        let state = test_state(2);
        let first = Uuid::new_v4();
        state.store_result(first, "q", ParsedResult::placeholder(json!(null)));
        // Distinct timestamps so the ordering is deterministic
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = Uuid::new_v4();
        state.store_result(second, "q", ParsedResult::placeholder(json!(null)));
        std::thread::sleep(std::time::Duration::from_millis(5));
        let third = Uuid::new_v4();
        state.store_result(third, "q", ParsedResult::placeholder(json!(null)));

        assert!(state.session_snapshot(first).is_none());
        assert!(state.session_snapshot(second).is_some());
        assert!(state.session_snapshot(third).is_some());
    }

    #[test]
    fn test_access_request_dedup() {
        let state = test_state(8);
        let id = Uuid::new_v4();

        assert!(state.mark_access_requested(id, "Borrower Profile"));
        assert!(!state.mark_access_requested(id, "Borrower Profile"));
        assert!(state.mark_access_requested(id, "Loan Book"));
    }

    #[test]
    fn test_unmark_allows_retry() {
        let state = test_state(8);
        let id = Uuid::new_v4();

        assert!(state.mark_access_requested(id, "Borrower Profile"));
        state.unmark_access_requested(id, "Borrower Profile");
        assert!(state.mark_access_requested(id, "Borrower Profile"));
    }
}
