//! In-memory log of accepted quiz runs, served by `GET /history`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

/// One accepted `POST /quiz`.
#[derive(Debug, Clone, Serialize)]
pub struct RunEntry {
    pub id: u64,
    pub url: String,
    pub email: String,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: EntryStatus,
    /// Run summary, or the error that prevented the run
    pub result: Option<serde_json::Value>,
}

/// Bounded history; the oldest entry is evicted once `limit` is reached.
pub struct RunHistory {
    entries: RwLock<VecDeque<RunEntry>>,
    next_id: AtomicU64,
    limit: usize,
}

impl RunHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
            limit: limit.max(1),
        }
    }

    /// Record a queued run and return its task id. Ids start at 1.
    pub async fn record(&self, url: &str, email: &str) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.write().await;
        if entries.len() >= self.limit {
            entries.pop_front();
        }
        entries.push_back(RunEntry {
            id,
            url: url.to_string(),
            email: email.to_string(),
            submitted_at: Utc::now(),
            completed_at: None,
            status: EntryStatus::Queued,
            result: None,
        });
        id
    }

    pub async fn mark_running(&self, id: u64) {
        self.update(id, |entry| entry.status = EntryStatus::Running).await;
    }

    pub async fn finish(&self, id: u64, status: EntryStatus, result: serde_json::Value) {
        self.update(id, |entry| {
            entry.status = status;
            entry.completed_at = Some(Utc::now());
            entry.result = Some(result);
        })
        .await;
    }

    /// Evicted ids are ignored.
    async fn update(&self, id: u64, apply: impl FnOnce(&mut RunEntry)) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
            apply(entry);
        }
    }

    pub async fn get(&self, id: u64) -> Option<RunEntry> {
        self.entries.read().await.iter().find(|e| e.id == id).cloned()
    }

    /// Entries in submission order.
    pub async fn snapshot(&self) -> Vec<RunEntry> {
        self.entries.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
