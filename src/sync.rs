use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::auth::AuthUser;
use crate::backend::Backend;
use crate::db::Database;
use crate::error::BackendError;
use crate::models::Job;

const ACTIVITY_PULL_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
    pub is_syncing: bool,
    pub is_online: bool,
    pub user: Option<AuthUser>,
    pub last_synced_at: Option<DateTime<Utc>>,
    // already safe to show
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub deleted_jobs: usize,
    pub deleted_notes: usize,
    pub pushed_jobs: usize,
    pub pushed_notes: usize,
    pub pushed_activities: usize,
    pub profile_pushed: bool,
    pub pulled_jobs: usize,
    pub pulled_notes: usize,
    pub pulled_activities: usize,
    pub profile_pulled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    AlreadySyncing,
    Failed(String),
    Discarded,
}

pub trait SyncService {
    fn status(&self) -> SyncStatus;
    fn sync_now(&self) -> SyncOutcome;
}

#[derive(Debug, Error)]
enum SyncError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("local database: {0}")]
    Local(anyhow::Error),
}

impl From<anyhow::Error> for SyncError {
    fn from(err: anyhow::Error) -> Self {
        SyncError::Local(err)
    }
}

impl SyncError {
    fn user_message(&self) -> String {
        match self {
            SyncError::Backend(BackendError::NotConfigured) => {
                "Sync is not configured; changes are saved locally.".to_string()
            }
            SyncError::Backend(BackendError::Network(_)) => {
                "You're offline; changes will sync when you reconnect.".to_string()
            }
            SyncError::Backend(BackendError::Unauthenticated) => "Sign in to sync your jobs.".to_string(),
            SyncError::Backend(_) => "Sync failed. Your changes are kept locally.".to_string(),
            SyncError::Local(_) => "Couldn't read local data for sync.".to_string(),
        }
    }

    fn is_offline(&self) -> bool {
        matches!(self, SyncError::Backend(err) if err.is_offline())
    }
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SyncProvider<B: Backend> {
    backend: B,
    db: Mutex<Database>,
    state: Mutex<SyncStatus>,
    in_flight: AtomicBool,
    generation: AtomicU64,
}

impl<B: Backend> SyncProvider<B> {
    pub fn new(backend: B, db: Database, user: Option<AuthUser>) -> Self {
        let last_synced_at = db.last_synced_at().ok().flatten();
        Self {
            backend,
            db: Mutex::new(db),
            state: Mutex::new(SyncStatus {
                is_syncing: false,
                is_online: true,
                user,
                last_synced_at,
                last_error: None,
            }),
            in_flight: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    pub fn db(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn detach(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    fn state(&self) -> MutexGuard<'_, SyncStatus> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn run(&self, user: &AuthUser) -> Result<(SyncReport, DateTime<Utc>), SyncError> {
        let started_at = Utc::now();
        let db = self.db();
        let mut report = SyncReport::default();

        for id in db.pending_deletes()? {
            self.backend.delete_job(id).into_result()?;
            db.clear_pending_delete(id)?;
            report.deleted_jobs += 1;
        }

        for job in db.dirty_jobs()? {
            self.push_job(&db, job, user, &mut report)?;
        }

        if db.profile_dirty()? {
            if let Some(mut profile) = db.get_profile()? {
                profile.user_id = Some(user.id);
                self.backend.upsert_profile(&profile).into_result()?;
                report.profile_pushed = true;
            }
            db.mark_profile_clean()?;
        }

        for id in db.pending_note_deletes()? {
            self.backend.delete_note(id).into_result()?;
            db.clear_pending_note_delete(id)?;
            report.deleted_notes += 1;
        }

        for (note, remote) in db.dirty_notes()? {
            if remote {
                self.backend.update_note(&note).into_result()?;
            } else {
                self.backend.create_note(&note).into_result()?;
            }
            db.mark_note_synced(note.id)?;
            report.pushed_notes += 1;
        }

        for activity in db.unsynced_activities()? {
            self.backend.log_activity(&activity).into_result()?;
            db.mark_activity_synced(activity.id)?;
            report.pushed_activities += 1;
        }

        let remote = match db.last_synced_at()? {
            Some(since) => self.backend.fetch_jobs_since(since),
            None => self.backend.fetch_jobs(),
        }
        .into_result()?;
        for job in &remote {
            if db.merge_remote_job(job)? {
                report.pulled_jobs += 1;
            }
        }

        if let Some(profile) = self.backend.fetch_profile().into_result()? {
            report.profile_pulled = db.merge_remote_profile(&profile)?;
        }

        for note in self.backend.fetch_notes(None).into_result()? {
            if db.merge_remote_note(&note)? {
                report.pulled_notes += 1;
            }
        }

        for activity in self.backend.fetch_activities(ACTIVITY_PULL_LIMIT).into_result()? {
            if db.merge_remote_activity(&activity)? {
                report.pulled_activities += 1;
            }
        }

        db.set_last_synced_at(started_at)?;
        Ok((report, started_at))
    }

    // A row the backend has never seen is created. One it already holds is
    // updated unless the stored copy is newer, in which case that copy wins.
    fn push_job(
        &self,
        db: &Database,
        mut job: Job,
        user: &AuthUser,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let existing = match job.user_id {
            Some(_) => self.backend.fetch_job(job.id).into_result()?,
            None => None,
        };
        job.user_id = Some(user.id);
        match existing {
            Some(remote) if remote.updated_at > job.updated_at => {
                debug!(job = %job.id, "remote copy is newer, dropping local edit");
                db.accept_remote_job(&remote)?;
                report.pulled_jobs += 1;
                return Ok(());
            }
            Some(_) => {
                self.backend.update_job(&job).into_result()?;
            }
            None => {
                self.backend.create_job(&job).into_result()?;
            }
        }
        db.mark_job_synced(job.id, user.id)?;
        report.pushed_jobs += 1;
        Ok(())
    }
}

impl<B: Backend> SyncService for SyncProvider<B> {
    fn status(&self) -> SyncStatus {
        self.state().clone()
    }

    fn sync_now(&self) -> SyncOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("sync already in flight");
            return SyncOutcome::AlreadySyncing;
        }
        let _guard = InFlight(&self.in_flight);
        let generation = self.generation.load(Ordering::Acquire);

        let user = {
            let mut state = self.state();
            state.is_syncing = true;
            state.user.clone()
        };

        let result = match user {
            Some(user) => self.run(&user),
            None => Err(SyncError::Backend(BackendError::Unauthenticated)),
        };

        let mut state = self.state();
        state.is_syncing = false;
        if self.generation.load(Ordering::Acquire) != generation {
            debug!("dropping result of detached sync");
            return SyncOutcome::Discarded;
        }

        match result {
            Ok((report, synced_at)) => {
                info!(?report, "sync complete");
                state.is_online = true;
                state.last_synced_at = Some(synced_at);
                state.last_error = None;
                SyncOutcome::Completed(report)
            }
            Err(err) => {
                warn!(error = %err, "sync failed");
                let message = err.user_message();
                if err.is_offline() {
                    state.is_online = false;
                }
                state.last_error = Some(message.clone());
                SyncOutcome::Failed(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::QueryResult;
    use crate::models::{Activity, Job, JobStatus, Note, NoteKind, UserProfile};
    use chrono::NaiveDate;
    use std::sync::Arc;
    use std::sync::mpsc::{Receiver, Sender, channel};
    use std::thread;
    use uuid::Uuid;

    #[derive(Default)]
    struct FakeBackend {
        remote_jobs: Mutex<Vec<Job>>,
        remote_notes: Mutex<Vec<Note>>,
        calls: Mutex<Vec<String>>,
        fail_with: Option<BackendError>,
        // (entered, release) hooks to hold a sync open inside fetch
        gate: Option<(Mutex<Sender<()>>, Mutex<Receiver<()>>)>,
    }

    impl FakeBackend {
        fn record(&self, call: &str) -> Result<(), BackendError> {
            self.calls.lock().unwrap().push(call.to_string());
            match &self.fail_with {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn wait_at_gate(&self) {
            if let Some((entered, release)) = &self.gate {
                entered.lock().unwrap().send(()).unwrap();
                release.lock().unwrap().recv().unwrap();
            }
        }
    }

    impl Backend for FakeBackend {
        fn fetch_jobs(&self) -> QueryResult<Vec<Job>> {
            self.wait_at_gate();
            self.record("fetch_jobs")
                .map(|_| self.remote_jobs.lock().unwrap().clone())
                .into()
        }
        fn fetch_job(&self, id: Uuid) -> QueryResult<Option<Job>> {
            self.record("fetch_job")
                .map(|_| self.remote_jobs.lock().unwrap().iter().find(|j| j.id == id).cloned())
                .into()
        }
        fn create_job(&self, job: &Job) -> QueryResult<Job> {
            self.record("create_job").map(|_| job.clone()).into()
        }
        fn update_job(&self, job: &Job) -> QueryResult<Job> {
            self.record("update_job").map(|_| job.clone()).into()
        }
        fn delete_job(&self, _id: Uuid) -> QueryResult<()> {
            self.record("delete_job").into()
        }
        fn fetch_jobs_since(&self, since: DateTime<Utc>) -> QueryResult<Vec<Job>> {
            self.wait_at_gate();
            self.record("fetch_jobs_since")
                .map(|_| {
                    self.remote_jobs
                        .lock()
                        .unwrap()
                        .iter()
                        .filter(|j| j.updated_at > since)
                        .cloned()
                        .collect()
                })
                .into()
        }
        fn fetch_profile(&self) -> QueryResult<Option<UserProfile>> {
            self.record("fetch_profile").map(|_| None).into()
        }
        fn upsert_profile(&self, profile: &UserProfile) -> QueryResult<UserProfile> {
            self.record("upsert_profile").map(|_| profile.clone()).into()
        }
        fn fetch_notes(&self, _job_id: Option<Uuid>) -> QueryResult<Vec<Note>> {
            self.record("fetch_notes")
                .map(|_| self.remote_notes.lock().unwrap().clone())
                .into()
        }
        fn create_note(&self, note: &Note) -> QueryResult<Note> {
            self.record(&format!("create_note {}", note.id)).map(|_| note.clone()).into()
        }
        fn update_note(&self, note: &Note) -> QueryResult<Note> {
            self.record(&format!("update_note {}", note.id)).map(|_| note.clone()).into()
        }
        fn delete_note(&self, id: Uuid) -> QueryResult<()> {
            self.record(&format!("delete_note {}", id)).into()
        }
        fn log_activity(&self, _activity: &Activity) -> QueryResult<()> {
            self.record("log_activity").into()
        }
        fn fetch_activities(&self, _limit: usize) -> QueryResult<Vec<Activity>> {
            self.record("fetch_activities").map(|_| vec![]).into()
        }
    }

    fn user() -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            email: Some("sam@example.com".to_string()),
        }
    }

    #[test]
    fn test_sync_pushes_dirty_rows_then_pulls() {
        let db = Database::open_in_memory().unwrap();
        let job = Job::new("Acme", "Engineer");
        db.insert_job(&job).unwrap();
        db.add_note(&Note::new(Some(job.id), NoteKind::Research, "Series B")).unwrap();

        let remote = Job::new("Globex", "Platform Engineer");
        let backend = FakeBackend::default();
        backend.remote_jobs.lock().unwrap().push(remote.clone());

        let provider = SyncProvider::new(backend, db, Some(user()));
        let outcome = provider.sync_now();

        let SyncOutcome::Completed(report) = outcome else {
            panic!("unexpected outcome {:?}", outcome);
        };
        assert_eq!(report.pushed_jobs, 1);
        assert_eq!(report.pushed_notes, 1);
        assert_eq!(report.pushed_activities, 1);
        assert_eq!(report.pulled_jobs, 1);

        let status = provider.status();
        assert!(!status.is_syncing);
        assert!(status.is_online);
        assert!(status.last_synced_at.is_some());

        let db = provider.db();
        assert!(db.dirty_jobs().unwrap().is_empty());
        assert!(db.get_job(remote.id).unwrap().is_some());
    }

    #[test]
    fn test_second_sync_is_incremental() {
        let provider = SyncProvider::new(
            FakeBackend::default(),
            Database::open_in_memory().unwrap(),
            Some(user()),
        );
        provider.sync_now();
        provider.sync_now();
        let calls = provider.backend.calls();
        assert!(calls.contains(&"fetch_jobs".to_string()));
        assert!(calls.contains(&"fetch_jobs_since".to_string()));
    }

    #[test]
    fn test_pending_delete_pushed() {
        let db = Database::open_in_memory().unwrap();
        let job = Job::new("Acme", "Engineer");
        db.insert_job(&job).unwrap();
        db.set_job_status(job.id, JobStatus::Applied, NaiveDate::from_ymd_opt(2026, 10, 16).unwrap())
            .unwrap();
        db.delete_job(job.id).unwrap();

        let provider = SyncProvider::new(FakeBackend::default(), db, Some(user()));
        let SyncOutcome::Completed(report) = provider.sync_now() else {
            panic!("sync failed");
        };
        assert_eq!(report.deleted_jobs, 1);
        assert_eq!(report.pushed_jobs, 0);
        assert!(provider.db().pending_deletes().unwrap().is_empty());
    }

    #[test]
    fn test_pushed_job_is_updated_not_recreated() {
        let db = Database::open_in_memory().unwrap();
        let job = Job::new("Acme", "Engineer");
        db.insert_job(&job).unwrap();

        let backend = FakeBackend::default();
        let provider = SyncProvider::new(backend, db, Some(user()));
        provider.sync_now();
        let pushed = provider.db().get_job(job.id).unwrap().unwrap();
        assert!(pushed.user_id.is_some());
        provider.backend.remote_jobs.lock().unwrap().push(pushed);

        provider
            .db()
            .set_job_status(job.id, JobStatus::Applied, NaiveDate::from_ymd_opt(2026, 10, 16).unwrap())
            .unwrap();
        let SyncOutcome::Completed(report) = provider.sync_now() else {
            panic!("sync failed");
        };
        assert_eq!(report.pushed_jobs, 1);
        let calls = provider.backend.calls();
        assert_eq!(calls.iter().filter(|c| *c == "create_job").count(), 1);
        assert!(calls.contains(&"fetch_job".to_string()));
        assert!(calls.contains(&"update_job".to_string()));
    }

    #[test]
    fn test_newer_remote_job_wins_over_local_edit() {
        let db = Database::open_in_memory().unwrap();
        let owner = user();
        let mut job = Job::new("Acme", "Engineer");
        job.user_id = Some(owner.id);
        db.insert_job(&job).unwrap();

        let mut remote = job.clone();
        remote.title = "Staff Engineer".to_string();
        remote.updated_at = job.updated_at + chrono::Duration::hours(1);
        let backend = FakeBackend::default();
        backend.remote_jobs.lock().unwrap().push(remote);

        let provider = SyncProvider::new(backend, db, Some(owner));
        let SyncOutcome::Completed(report) = provider.sync_now() else {
            panic!("sync failed");
        };
        assert_eq!(report.pushed_jobs, 0);
        assert!(!provider.backend.calls().contains(&"update_job".to_string()));
        let db = provider.db();
        assert_eq!(db.get_job(job.id).unwrap().unwrap().title, "Staff Engineer");
        assert!(db.dirty_jobs().unwrap().is_empty());
    }

    #[test]
    fn test_notes_sync_in_both_directions() {
        let db = Database::open_in_memory().unwrap();
        let kept = Note::new(None, NoteKind::Research, "Series B");
        let removed = Note::new(None, NoteKind::General, "Old lead");
        db.add_note(&kept).unwrap();
        db.add_note(&removed).unwrap();

        let from_laptop = Note::new(None, NoteKind::Interview, "Panel went well");
        let backend = FakeBackend::default();
        backend.remote_notes.lock().unwrap().push(from_laptop.clone());
        let provider = SyncProvider::new(backend, db, Some(user()));

        let SyncOutcome::Completed(first) = provider.sync_now() else {
            panic!("sync failed");
        };
        assert_eq!(first.pushed_notes, 2);
        assert_eq!(first.pulled_notes, 1);
        assert!(provider.db().list_notes(None).unwrap().iter().any(|n| n.id == from_laptop.id));

        {
            let db = provider.db();
            assert!(db.update_note(kept.id, "Series C").unwrap());
            assert!(db.delete_note(removed.id).unwrap());
        }
        let SyncOutcome::Completed(second) = provider.sync_now() else {
            panic!("sync failed");
        };
        assert_eq!(second.deleted_notes, 1);
        assert_eq!(second.pushed_notes, 1);
        assert_eq!(second.pulled_notes, 0);

        let calls = provider.backend.calls();
        assert!(calls.contains(&format!("create_note {}", kept.id)));
        assert!(calls.contains(&format!("update_note {}", kept.id)));
        assert!(calls.contains(&format!("delete_note {}", removed.id)));
        assert!(provider.db().pending_note_deletes().unwrap().is_empty());
    }

    #[test]
    fn test_last_synced_at_matches_stored_watermark() {
        let provider = SyncProvider::new(
            FakeBackend::default(),
            Database::open_in_memory().unwrap(),
            Some(user()),
        );
        provider.sync_now();
        assert_eq!(
            provider.status().last_synced_at,
            provider.db().last_synced_at().unwrap()
        );
    }

    #[test]
    fn test_network_failure_flags_offline_and_hides_details() {
        let backend = FakeBackend {
            fail_with: Some(BackendError::Network("dns error: no such host db.internal".to_string())),
            ..Default::default()
        };
        let provider = SyncProvider::new(backend, Database::open_in_memory().unwrap(), Some(user()));

        let outcome = provider.sync_now();
        assert!(matches!(outcome, SyncOutcome::Failed(_)));
        let status = provider.status();
        assert!(!status.is_online);
        assert!(!status.is_syncing);
        let message = status.last_error.unwrap();
        assert!(!message.contains("db.internal"));
    }

    #[test]
    fn test_sync_without_user_asks_for_sign_in() {
        let provider = SyncProvider::new(FakeBackend::default(), Database::open_in_memory().unwrap(), None);
        assert_eq!(
            provider.sync_now(),
            SyncOutcome::Failed("Sign in to sync your jobs.".to_string())
        );
        assert!(provider.status().is_online);
        assert!(provider.backend.calls().is_empty());
    }

    #[test]
    fn test_concurrent_sync_is_a_no_op() {
        let (entered_tx, entered_rx) = channel();
        let (release_tx, release_rx) = channel();
        let backend = FakeBackend {
            gate: Some((Mutex::new(entered_tx), Mutex::new(release_rx))),
            ..Default::default()
        };
        let provider = Arc::new(SyncProvider::new(
            backend,
            Database::open_in_memory().unwrap(),
            Some(user()),
        ));

        let worker = {
            let provider = provider.clone();
            thread::spawn(move || provider.sync_now())
        };

        entered_rx.recv().unwrap();
        assert!(provider.status().is_syncing);
        assert_eq!(provider.sync_now(), SyncOutcome::AlreadySyncing);

        release_tx.send(()).unwrap();
        assert!(matches!(worker.join().unwrap(), SyncOutcome::Completed(_)));
        assert!(!provider.status().is_syncing);

        // the guard is released afterwards
        release_tx.send(()).unwrap();
        let again = {
            let provider = provider.clone();
            thread::spawn(move || provider.sync_now())
        };
        entered_rx.recv().unwrap();
        assert!(matches!(again.join().unwrap(), SyncOutcome::Completed(_)));
    }

    #[test]
    fn test_detached_sync_result_is_discarded() {
        let (entered_tx, entered_rx) = channel();
        let (release_tx, release_rx) = channel();
        let backend = FakeBackend {
            gate: Some((Mutex::new(entered_tx), Mutex::new(release_rx))),
            ..Default::default()
        };
        let provider = Arc::new(SyncProvider::new(
            backend,
            Database::open_in_memory().unwrap(),
            Some(user()),
        ));

        let worker = {
            let provider = provider.clone();
            thread::spawn(move || provider.sync_now())
        };
        entered_rx.recv().unwrap();
        provider.detach();
        release_tx.send(()).unwrap();

        assert_eq!(worker.join().unwrap(), SyncOutcome::Discarded);
        let status = provider.status();
        assert!(status.last_synced_at.is_none());
        assert!(!status.is_syncing);
    }
}
