// crates/core/src/registry.rs
//
// Durable table of jobs the user is waiting on. Loaded once at startup (with
// TTL pruning), then mutated in memory and written through to the store on
// every change.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::job::{JobRecord, NewJob, RawId};
use crate::storage::JobStore;

/// Records older than this are dropped when the registry is recovered.
pub const STALE_AFTER: Duration = Duration::from_secs(2 * 60 * 60);

/// Source of "now" in epoch millis.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Wall clock backed by `chrono::Utc::now()`.
pub fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp_millis())
}

/// Process-wide table of tracked jobs.
///
/// Insertion ordered, at most one record per id. Every mutation rewrites the
/// whole collection to the store before returning; there is no write-behind.
/// Storage write failures are logged and the in-memory state stays
/// authoritative, so no operation here can fail.
///
/// Dropping the registry flushes it once more.
pub struct JobRegistry<S: JobStore> {
    jobs: Mutex<Vec<JobRecord>>,
    store: S,
    clock: Clock,
}

impl<S: JobStore> std::fmt::Debug for JobRegistry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("job_count", &self.len())
            .finish()
    }
}

impl<S: JobStore> JobRegistry<S> {
    /// Load the persisted collection, discarding malformed and stale records.
    ///
    /// Never fails: an unreadable or corrupt payload is logged and treated as
    /// an empty collection.
    pub fn recover(store: S) -> Self {
        Self::recover_with_clock(store, system_clock())
    }

    /// Like [`recover`](Self::recover) with an explicit clock.
    pub fn recover_with_clock(store: S, clock: Clock) -> Self {
        let now = clock();
        let jobs = match store.load() {
            Ok(Some(payload)) => parse_persisted(&payload, now),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read tracked jobs, starting empty");
                Vec::new()
            }
        };
        info!(count = jobs.len(), "Recovered tracked jobs");

        Self {
            jobs: Mutex::new(jobs),
            store,
            clock,
        }
    }

    /// Start tracking a job.
    ///
    /// Returns `false` without touching storage when the id is missing or
    /// falsy, or when a record with the same id already exists.
    pub fn register(&self, job: NewJob) -> bool {
        let Some(id) = job.id.as_ref().and_then(RawId::normalize) else {
            debug!("Ignoring job registration without an id");
            return false;
        };

        let mut jobs = self.lock();
        if jobs.iter().any(|j| j.id == id) {
            debug!(job_id = %id, "Job already tracked");
            return false;
        }

        jobs.push(JobRecord {
            id: id.clone(),
            kind: job.kind,
            project_id: job.project_id.as_ref().and_then(RawId::normalize),
            doc_id: job.doc_id.as_ref().and_then(RawId::normalize),
            created_at: (self.clock)(),
        });
        self.persist(&jobs);
        info!(job_id = %id, "Tracking job");
        true
    }

    /// Stop tracking a job. Returns whether a record was removed.
    pub fn remove(&self, id: &str) -> bool {
        let mut jobs = self.lock();
        let before = jobs.len();
        jobs.retain(|j| j.id != id);
        let removed = jobs.len() != before;
        if removed {
            self.persist(&jobs);
            info!(job_id = %id, "Stopped tracking job");
        }
        removed
    }

    /// Drop every record.
    pub fn clear(&self) {
        let mut jobs = self.lock();
        jobs.clear();
        self.persist(&jobs);
    }

    /// Jobs belonging to `project_id`, in insertion order.
    pub fn list_by_project(&self, project_id: &str) -> Vec<JobRecord> {
        self.lock()
            .iter()
            .filter(|j| j.project_id.as_deref() == Some(project_id))
            .cloned()
            .collect()
    }

    /// All tracked jobs, in insertion order.
    pub fn list(&self) -> Vec<JobRecord> {
        self.lock().clone()
    }

    pub fn get(&self, id: &str) -> Option<JobRecord> {
        self.lock().iter().find(|j| j.id == id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().iter().any(|j| j.id == id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Teardown hook: write the current state unconditionally.
    pub fn flush(&self) {
        let jobs = self.lock();
        self.persist(&jobs);
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn lock(&self) -> MutexGuard<'_, Vec<JobRecord>> {
        self.jobs.lock().unwrap_or_else(|poisoned| {
            error!("Mutex poisoned on job registry, continuing with last state");
            poisoned.into_inner()
        })
    }

    fn persist(&self, jobs: &[JobRecord]) {
        let payload = match serde_json::to_string(jobs) {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "Failed to encode tracked jobs");
                return;
            }
        };
        if let Err(e) = self.store.save(&payload) {
            error!(error = %e, "Failed to persist tracked jobs");
        }
    }
}

impl<S: JobStore> Drop for JobRegistry<S> {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Decode a persisted payload, keeping only well-formed, fresh, first-seen
/// records.
fn parse_persisted(payload: &str, now: i64) -> Vec<JobRecord> {
    let value: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "Discarding corrupt tracked jobs payload");
            return Vec::new();
        }
    };
    let Value::Array(entries) = value else {
        warn!("Discarding tracked jobs payload that is not an array");
        return Vec::new();
    };

    let stale_after = STALE_AFTER.as_millis() as i64;
    let mut seen = HashSet::new();
    let mut jobs = Vec::with_capacity(entries.len());
    for entry in &entries {
        let Some(record) = JobRecord::from_persisted(entry) else {
            debug!("Dropping malformed tracked job entry");
            continue;
        };
        if now.saturating_sub(record.created_at) >= stale_after {
            debug!(job_id = %record.id, "Dropping stale tracked job");
            continue;
        }
        if seen.insert(record.id.clone()) {
            jobs.push(record);
        }
    }
    jobs
}
