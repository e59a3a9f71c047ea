//! In-memory job board: the authoritative view of all known jobs.
//!
//! Every change goes through a transition method that returns the patch the
//! caller must persist. After each change a fresh snapshot (newest first) is
//! published on a `watch` channel so front ends can subscribe instead of
//! polling.
//!
//! Each job carries an attempt counter bumped on every spawn. Output lines and
//! exit events are tagged with the attempt that produced them; anything from a
//! superseded attempt is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::job_db::{JobPatch, JobRecord, JobStatus};

/// Ordered (newest first) copy of every job on the board.
pub type Snapshot = Arc<Vec<JobRecord>>;

/// Per-job async lock serialising persisting transitions of one job.
pub type JobLock = Arc<tokio::sync::Mutex<()>>;

struct JobEntry {
    record: JobRecord,
    attempt: u64,
    lock: JobLock,
}

impl JobEntry {
    fn new(record: JobRecord) -> Self {
        Self {
            record,
            attempt: 0,
            lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Spawned at least once in this session and not yet finished or paused.
    fn in_flight(&self) -> bool {
        self.attempt > 0 && self.record.status() == JobStatus::Active
    }
}

#[derive(Default)]
struct BoardState {
    jobs: HashMap<String, JobEntry>,
    error: Option<String>,
}

impl BoardState {
    fn snapshot(&self) -> Vec<JobRecord> {
        let mut out: Vec<JobRecord> = self.jobs.values().map(|e| e.record.clone()).collect();
        out.sort_by(|a, b| b.id.cmp(&a.id).then_with(|| a.unique_id.cmp(&b.unique_id)));
        out
    }
}

pub struct JobBoard {
    state: Mutex<BoardState>,
    snapshot_tx: watch::Sender<Snapshot>,
}

impl Default for JobBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for JobBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobBoard")
            .field("jobs", &self.lock().jobs.len())
            .finish()
    }
}

impl JobBoard {
    pub fn new() -> Self {
        let (snapshot_tx, _) = watch::channel(Snapshot::default());
        Self {
            state: Mutex::new(BoardState::default()),
            snapshot_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish while still holding the state lock so subscribers see
    /// snapshots in mutation order.
    fn publish(&self, state: &BoardState) {
        self.snapshot_tx.send_replace(Arc::new(state.snapshot()));
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        Arc::new(self.lock().snapshot())
    }

    /// Newest-first listing capped at `limit`.
    pub fn list(&self, limit: usize) -> Vec<JobRecord> {
        let mut jobs = self.lock().snapshot();
        jobs.truncate(limit);
        jobs
    }

    pub fn get(&self, job_id: &str) -> Option<JobRecord> {
        self.lock().jobs.get(job_id).map(|e| e.record.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().jobs.is_empty()
    }

    /// Current attempt number of a job (0 before its first spawn).
    pub fn attempt(&self, job_id: &str) -> Option<u64> {
        self.lock().jobs.get(job_id).map(|e| e.attempt)
    }

    pub fn job_lock(&self, job_id: &str) -> Option<JobLock> {
        self.lock().jobs.get(job_id).map(|e| Arc::clone(&e.lock))
    }

    /// Add a newly created job. Returns false if the id is already on the board.
    pub fn insert(&self, record: JobRecord) -> bool {
        let mut state = self.lock();
        if state.jobs.contains_key(&record.unique_id) {
            return false;
        }
        state
            .jobs
            .insert(record.unique_id.clone(), JobEntry::new(record));
        self.publish(&state);
        true
    }

    /// Replace the board with rows loaded from the store.
    ///
    /// Jobs already on the board keep their attempt counter and lock. A job
    /// with a live process (per `is_live`) or an attempt still Active keeps
    /// its whole in-memory entry, loaded or not: memory is ahead of the store
    /// for those, and their exit still has to find them.
    pub fn replace_all(&self, records: Vec<JobRecord>, is_live: impl Fn(&str) -> bool) {
        let mut state = self.lock();
        let mut old = std::mem::take(&mut state.jobs);

        let running: Vec<String> = old
            .iter()
            .filter(|(id, e)| is_live(id.as_str()) || e.in_flight())
            .map(|(id, _)| id.clone())
            .collect();
        for id in running {
            if let Some(entry) = old.remove(&id) {
                state.jobs.insert(id, entry);
            }
        }

        for record in records {
            if state.jobs.contains_key(&record.unique_id) {
                continue;
            }
            let entry = match old.remove(&record.unique_id) {
                Some(mut e) => {
                    e.record = record;
                    e
                }
                None => JobEntry::new(record),
            };
            state.jobs.insert(entry.record.unique_id.clone(), entry);
        }
        state.error = None;
        self.publish(&state);
    }

    /// Drop every job and the error slot.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.jobs.clear();
        state.error = None;
        self.publish(&state);
    }

    pub fn set_error(&self, message: impl Into<String>) {
        self.lock().error = Some(message.into());
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    /// Apply an arbitrary patch. Returns false if the job is unknown.
    pub fn update(&self, job_id: &str, patch: &JobPatch) -> bool {
        let mut state = self.lock();
        let Some(entry) = state.jobs.get_mut(job_id) else {
            return false;
        };
        entry.record.apply(patch);
        self.publish(&state);
        true
    }

    /// Start a new attempt: the job becomes Active with a "Starting..." message.
    /// Returns the new attempt number and the patch to persist.
    pub fn begin_attempt(&self, job_id: &str) -> Option<(u64, JobPatch)> {
        let mut state = self.lock();
        let entry = state.jobs.get_mut(job_id)?;
        entry.attempt += 1;
        let patch = JobPatch::transition(JobStatus::Active, "Starting...");
        entry.record.apply(&patch);
        let attempt = entry.attempt;
        self.publish(&state);
        Some((attempt, patch))
    }

    /// Record a progress line from the process of `attempt`.
    ///
    /// Ignored unless the job is still Active on that attempt.
    pub fn record_progress(&self, job_id: &str, attempt: u64, line: &str) -> bool {
        let mut state = self.lock();
        let Some(entry) = state.jobs.get_mut(job_id) else {
            return false;
        };
        if entry.attempt != attempt || entry.record.status() != JobStatus::Active {
            return false;
        }
        if entry.record.tracking_message == line {
            return true;
        }
        entry.record.tracking_message = line.to_string();
        self.publish(&state);
        true
    }

    /// Pause transition. Returns the patch to persist, or None for an unknown job.
    pub fn mark_paused(&self, job_id: &str) -> Option<JobPatch> {
        let patch = JobPatch::transition(JobStatus::Paused, "Paused");
        self.update(job_id, &patch).then_some(patch)
    }

    /// Apply the end-of-process update for `attempt`, unless the job was
    /// paused meanwhile, moved on to a newer attempt, or no longer exists.
    /// Returns the patch to persist when it was applied.
    pub fn finish_attempt(&self, job_id: &str, attempt: u64, patch: JobPatch) -> Option<JobPatch> {
        let mut state = self.lock();
        let entry = state.jobs.get_mut(job_id)?;
        if entry.record.is_paused {
            tracing::debug!(job = %job_id, attempt, "exit after pause; keeping paused state");
            return None;
        }
        if entry.attempt != attempt {
            tracing::debug!(
                job = %job_id,
                attempt,
                current = entry.attempt,
                "exit of superseded attempt ignored"
            );
            return None;
        }
        entry.record.apply(&patch);
        self.publish(&state);
        Some(patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invariants(jobs: &[JobRecord]) {
        for j in jobs {
            let set = [j.active, j.completed, j.failed]
                .iter()
                .filter(|b| **b)
                .count();
            assert!(set <= 1, "conflicting flags on {}: {:?}", j.unique_id, j);
            assert!(!(j.is_paused && j.active), "paused job is active: {:?}", j);
        }
    }

    fn board_with_job() -> (JobBoard, String) {
        let board = JobBoard::new();
        let job = JobRecord::new("https://example.com/v");
        let id = job.unique_id.clone();
        assert!(board.insert(job));
        (board, id)
    }

    fn done() -> JobPatch {
        JobPatch::transition(JobStatus::Completed, "Done")
    }

    #[test]
    fn insert_rejects_known_id() {
        let (board, id) = board_with_job();
        let mut dup = JobRecord::new("https://example.com/other");
        dup.unique_id = id;
        assert!(!board.insert(dup));
        assert_eq!(board.len(), 1);
    }

    #[test]
    fn list_is_newest_first_and_capped() {
        let board = JobBoard::new();
        for id in [5, 9, 1] {
            let mut job = JobRecord::new("https://example.com/v");
            job.id = id;
            board.insert(job);
        }
        let ids: Vec<i64> = board.list(10).iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![9, 5, 1]);
        assert_eq!(board.list(2).len(), 2);
    }

    #[test]
    fn attempt_lifecycle_to_completed() {
        let (board, id) = board_with_job();
        let (attempt, patch) = board.begin_attempt(&id).unwrap();
        assert_eq!(attempt, 1);
        assert_eq!(patch.status, Some(JobStatus::Active));
        assert_eq!(board.get(&id).unwrap().tracking_message, "Starting...");

        assert!(board.record_progress(&id, attempt, "50% of 10MiB"));
        assert_eq!(board.get(&id).unwrap().tracking_message, "50% of 10MiB");

        assert!(board.finish_attempt(&id, attempt, done()).is_some());
        let job = board.get(&id).unwrap();
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.tracking_message, "Done");
        assert_invariants(&board.list(10));

        // No progress after the terminal update.
        assert!(!board.record_progress(&id, attempt, "late line"));
        assert_eq!(board.get(&id).unwrap().tracking_message, "Done");
    }

    #[test]
    fn exit_after_pause_is_discarded() {
        let (board, id) = board_with_job();
        let (attempt, _) = board.begin_attempt(&id).unwrap();
        board.mark_paused(&id).unwrap();

        let failed = JobPatch::transition(JobStatus::Failed, "Stopped/Failed");
        assert!(board.finish_attempt(&id, attempt, failed).is_none());
        let job = board.get(&id).unwrap();
        assert_eq!(job.status(), JobStatus::Paused);
        assert_eq!(job.tracking_message, "Paused");
        assert_invariants(&board.list(10));
    }

    #[test]
    fn exit_of_superseded_attempt_is_discarded() {
        let (board, id) = board_with_job();
        let (first, _) = board.begin_attempt(&id).unwrap();
        board.mark_paused(&id).unwrap();
        let (second, _) = board.begin_attempt(&id).unwrap();
        assert_eq!(second, first + 1);

        assert!(!board.record_progress(&id, first, "old output"));
        assert!(board.finish_attempt(&id, first, done()).is_none());
        assert_eq!(board.get(&id).unwrap().status(), JobStatus::Active);

        assert!(board.finish_attempt(&id, second, done()).is_some());
        assert_eq!(board.get(&id).unwrap().status(), JobStatus::Completed);
    }

    #[test]
    fn finish_for_unknown_job_is_none() {
        let board = JobBoard::new();
        assert!(board.finish_attempt("gone", 1, done()).is_none());
        assert!(board.mark_paused("gone").is_none());
        assert!(board.begin_attempt("gone").is_none());
    }

    #[test]
    fn replace_all_refreshes_idle_jobs() {
        let (board, id) = board_with_job();
        let (attempt, _) = board.begin_attempt(&id).unwrap();
        board.mark_paused(&id).unwrap();
        let mut stored = board.get(&id).unwrap();
        stored.tracking_message = "from store".to_string();
        let other = JobRecord::new("https://example.com/w");
        board.set_error("Failed to load download history");

        board.replace_all(vec![stored, other.clone()], |_| false);
        assert_eq!(board.len(), 2);
        assert_eq!(board.get(&id).unwrap().tracking_message, "from store");
        assert_eq!(board.attempt(&id), Some(attempt));
        assert_eq!(board.attempt(&other.unique_id), Some(0));
        assert!(board.last_error().is_none());
    }

    #[test]
    fn replace_all_keeps_running_jobs() {
        let board = JobBoard::new();
        let running = JobRecord::new("https://example.com/running");
        let unkillable = JobRecord::new("https://example.com/unkillable");
        let idle = JobRecord::new("https://example.com/idle");
        let (run_id, stuck_id, idle_id) = (
            running.unique_id.clone(),
            unkillable.unique_id.clone(),
            idle.unique_id.clone(),
        );
        for job in [running, unkillable, idle] {
            board.insert(job);
        }

        // In flight, ahead of the store.
        let (attempt, _) = board.begin_attempt(&run_id).unwrap();
        board.record_progress(&run_id, attempt, "50% of 10MiB");
        let mut stale = board.get(&run_id).unwrap();
        stale.tracking_message = "Starting...".to_string();
        // Paused, but its process is still registered.
        board.begin_attempt(&stuck_id).unwrap();
        board.mark_paused(&stuck_id).unwrap();

        let loaded = JobRecord::new("https://example.com/loaded");
        let stuck = stuck_id.clone();
        board.replace_all(vec![stale, loaded.clone()], move |id| id == stuck);

        assert_eq!(board.len(), 3);
        assert_eq!(board.get(&run_id).unwrap().tracking_message, "50% of 10MiB");
        assert_eq!(board.attempt(&run_id), Some(attempt));
        assert_eq!(board.get(&stuck_id).unwrap().status(), JobStatus::Paused);
        assert!(board.get(&idle_id).is_none());
        assert!(board.get(&loaded.unique_id).is_some());

        // The running job's exit still lands.
        assert!(board.finish_attempt(&run_id, attempt, done()).is_some());
        assert_eq!(board.get(&run_id).unwrap().status(), JobStatus::Completed);
    }

    #[test]
    fn clear_empties_board_and_error() {
        let (board, _) = board_with_job();
        board.set_error("Failed to start download");
        board.clear();
        assert!(board.is_empty());
        assert!(board.last_error().is_none());
    }

    #[tokio::test]
    async fn subscribers_see_each_change() {
        let (board, id) = board_with_job();
        let mut rx = board.subscribe();
        assert_eq!(rx.borrow_and_update().len(), 1);

        let (attempt, _) = board.begin_attempt(&id).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update()[0].tracking_message, "Starting...");

        board.record_progress(&id, attempt, "10%");
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update()[0].tracking_message, "10%");

        board.clear();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_empty());
    }
}
