//! Operator alerts
//!
//! Integrity failures, accounting failures and peer outages are recorded
//! here for operators. Repeats of the same alert bump its counter instead of
//! creating a new entry.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Recorded alert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Alert id
    pub id: u64,
    /// Peer the alert concerns
    pub peer_id: String,
    /// Address that produced the failure, if known
    pub triggered_by: Option<String>,
    /// Description
    pub message: String,
    /// Occurrences
    pub count: u64,
    /// First occurrence
    pub created_at: DateTime<Utc>,
    /// Last occurrence
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    alerts: Vec<Alert>,
    next_id: u64,
}

/// Deduplicating alert log
#[derive(Debug, Default)]
pub struct AlertLog {
    inner: Mutex<Inner>,
}

impl AlertLog {
    /// Create new log
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an alert, returning its id
    pub fn record(&self, peer_id: &str, triggered_by: Option<&str>, message: &str) -> u64 {
        let now = Utc::now();
        let mut inner = self.inner.lock();

        if let Some(existing) = inner.alerts.iter_mut().find(|a| {
            a.peer_id == peer_id && a.triggered_by.as_deref() == triggered_by && a.message == message
        }) {
            existing.count += 1;
            existing.updated_at = now;
            return existing.id;
        }

        inner.next_id += 1;
        let id = inner.next_id;
        inner.alerts.push(Alert {
            id,
            peer_id: peer_id.to_string(),
            triggered_by: triggered_by.map(str::to_string),
            message: message.to_string(),
            count: 1,
            created_at: now,
            updated_at: now,
        });
        id
    }

    /// Every open alert, oldest first
    pub fn list(&self) -> Vec<Alert> {
        self.inner.lock().alerts.clone()
    }

    /// Remove an alert; false if unknown
    pub fn dismiss(&self, id: u64) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.alerts.len();
        inner.alerts.retain(|a| a.id != id);
        inner.alerts.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeats_are_deduplicated() {
        let log = AlertLog::new();
        let first = log.record("bob", Some("test.bob"), "Wrong condition");
        let second = log.record("bob", Some("test.bob"), "Wrong condition");
        assert_eq!(first, second);

        let alerts = log.list();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].count, 2);
        assert!(alerts[0].updated_at >= alerts[0].created_at);
    }

    #[test]
    fn test_distinct_alerts() {
        let log = AlertLog::new();
        log.record("bob", None, "Peer down");
        log.record("carl", None, "Peer down");
        assert_eq!(log.list().len(), 2);
    }

    #[test]
    fn test_dismiss() {
        let log = AlertLog::new();
        let id = log.record("bob", None, "Peer down");
        assert!(log.dismiss(id));
        assert!(!log.dismiss(id));
        assert!(log.list().is_empty());
    }
}
