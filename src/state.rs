//! Session state shared by every tool call.

use crate::cache::SchemaCache;
use crate::config::DatabaseTarget;
use crate::constants::DEFAULT_HISTORY_SIZE;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared session type.
pub type SharedSession = Arc<SessionContext>;

/// One answered question and the SQL that was run for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// The natural-language question.
    pub question: String,

    /// The SQL that was executed.
    pub sql: String,

    /// When the entry was recorded.
    pub asked_at: DateTime<Utc>,
}

/// Bounded record of recent questions, oldest first.
#[derive(Debug, Clone)]
pub struct QueryHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl Default for QueryHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}

impl QueryHistory {
    /// Create an empty history holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a question. The oldest entry is dropped once full.
    pub fn record(&mut self, question: impl Into<String>, sql: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry {
            question: question.into(),
            sql: sql.into(),
            asked_at: Utc::now(),
        });
    }

    /// The last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<HistoryEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Session context: the schema cache and the question history.
///
/// Passed explicitly to the assistant instead of living in globals.
#[derive(Debug, Default)]
pub struct SessionContext {
    /// Schema cache and the configured identity.
    pub cache: SchemaCache,

    /// Recent questions.
    pub history: RwLock<QueryHistory>,
}

impl SessionContext {
    /// Create a session with an optional initial target.
    pub fn new(target: Option<DatabaseTarget>, history_size: usize) -> Self {
        Self {
            cache: SchemaCache::new(target),
            history: RwLock::new(QueryHistory::new(history_size)),
        }
    }

    /// Create a shared session.
    pub fn shared(target: Option<DatabaseTarget>, history_size: usize) -> SharedSession {
        Arc::new(Self::new(target, history_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_drops_oldest() {
        let mut history = QueryHistory::new(2);
        history.record("q1", "SELECT 1");
        history.record("q2", "SELECT 2");
        history.record("q3", "SELECT 3");

        assert_eq!(history.len(), 2);
        let questions: Vec<String> = history.recent(5).into_iter().map(|e| e.question).collect();
        assert_eq!(questions, vec!["q2", "q3"]);
    }

    #[test]
    fn test_recent_returns_tail_in_order() {
        let mut history = QueryHistory::new(10);
        for i in 1..=5 {
            history.record(format!("q{}", i), format!("SELECT {}", i));
        }

        let recent = history.recent(3);
        let sql: Vec<&str> = recent.iter().map(|e| e.sql.as_str()).collect();
        assert_eq!(sql, vec!["SELECT 3", "SELECT 4", "SELECT 5"]);
    }

    #[test]
    fn test_zero_capacity_records_nothing() {
        let mut history = QueryHistory::new(0);
        history.record("q", "SELECT 1");
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_session_starts_with_target() {
        let target = DatabaseTarget::new("srv", "Sales").unwrap();
        let session = SessionContext::new(Some(target.clone()), 4);
        assert_eq!(session.cache.target().await, Some(target));
        assert!(session.cache.peek().await.is_none());
        assert!(session.history.read().await.is_empty());
    }
}
