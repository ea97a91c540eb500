//! Per-browser-session run history, kept only in process memory.
//!
//! Sessions are keyed by the UUID stored in the `jobcrew_session` cookie. A
//! session's history is only ever appended to, read, or cleared as a whole.
//! Every request touches its session; a session left idle past the TTL is
//! evicted together with its history.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::pipeline::{PipelineResult, ProgressSink, SearchPreferences, Stage};

pub const SESSION_COOKIE: &str = "jobcrew_session";
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(4 * 60 * 60);

/// One completed run.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub preferences: SearchPreferences,
    pub result: PipelineResult,
}

/// What the history list shows for each entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistorySummary {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub topic: String,
    pub work_arrangement: String,
    pub deep_search: bool,
}

impl From<&HistoryEntry> for HistorySummary {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            id: entry.id,
            created_at: entry.created_at,
            topic: entry.preferences.topic.clone(),
            work_arrangement: entry.preferences.work_arrangement.label().to_string(),
            deep_search: entry.preferences.deep_search,
        }
    }
}

#[derive(Debug)]
struct SessionData {
    history: Vec<HistoryEntry>,
    progress: Option<String>,
    last_seen: Instant,
}

impl Default for SessionData {
    fn default() -> Self {
        Self {
            history: Vec::new(),
            progress: None,
            last_seen: Instant::now(),
        }
    }
}

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<Uuid, SessionData>>>,
    idle_ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_TTL)
    }
}

impl SessionStore {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            inner: Arc::default(),
            idle_ttl,
        }
    }

    // Every write is a single push/remove/assign, so a poisoned map is still consistent.
    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, SessionData>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` on an existing session and marks it as seen.
    fn with_session<T>(&self, session: Uuid, f: impl FnOnce(&SessionData) -> T) -> Option<T> {
        let mut sessions = self.write();
        let data = sessions.get_mut(&session)?;
        data.last_seen = Instant::now();
        Some(f(&*data))
    }

    /// Returns the session, creating it if needed, and marks it as seen.
    fn touch(sessions: &mut HashMap<Uuid, SessionData>, session: Uuid) -> &mut SessionData {
        let data = sessions.entry(session).or_default();
        data.last_seen = Instant::now();
        data
    }

    pub fn append(&self, session: Uuid, entry: HistoryEntry) {
        Self::touch(&mut self.write(), session).history.push(entry);
    }

    /// Summaries, oldest first.
    pub fn history(&self, session: Uuid) -> Vec<HistorySummary> {
        self.with_session(session, |data| {
            data.history.iter().map(HistorySummary::from).collect()
        })
        .unwrap_or_default()
    }

    pub fn entry(&self, session: Uuid, id: Uuid) -> Option<HistoryEntry> {
        self.with_session(session, |data| {
            data.history.iter().find(|e| e.id == id).cloned()
        })
        .flatten()
    }

    /// Ends the session; returns how many history entries went with it.
    pub fn clear(&self, session: Uuid) -> usize {
        self.write()
            .remove(&session)
            .map_or(0, |data| data.history.len())
    }

    pub fn set_progress(&self, session: Uuid, text: impl Into<String>) {
        Self::touch(&mut self.write(), session).progress = Some(text.into());
    }

    pub fn progress(&self, session: Uuid) -> Option<String> {
        self.with_session(session, |data| data.progress.clone())
            .flatten()
    }

    /// Removes every session idle for longer than the TTL; returns how many.
    pub fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.write();
        let before = sessions.len();
        sessions.retain(|_, data| now.duration_since(data.last_seen) <= self.idle_ttl);
        before - sessions.len()
    }
}

/// Evicts idle sessions on a fixed period for as long as the process runs.
pub fn spawn_idle_sweeper(store: SessionStore) -> JoinHandle<()> {
    let period = store
        .idle_ttl
        .clamp(Duration::from_secs(1), Duration::from_secs(60));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let evicted = store.evict_idle();
            if evicted > 0 {
                debug!("Evicted {evicted} idle session(s)");
            }
        }
    })
}

/// Coarse progress line for a stage that just started.
pub fn stage_progress_text(stage: Stage) -> String {
    let activity = match stage {
        Stage::Research => "searching for job postings",
        Stage::GapAnalysis => "comparing your résumé with the postings",
        Stage::Compose => "drafting application documents",
    };
    format!("Stage {}/{}: {activity}...", stage.number(), Stage::ALL.len())
}

/// Writes stage transitions into the session's progress slot.
pub struct SessionProgress {
    store: SessionStore,
    session: Uuid,
}

impl SessionProgress {
    pub fn new(store: SessionStore, session: Uuid) -> Self {
        Self { store, session }
    }
}

impl ProgressSink for SessionProgress {
    fn stage_started(&self, stage: Stage) {
        self.store.set_progress(self.session, stage_progress_text(stage));
    }
}
