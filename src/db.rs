use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::models::{Activity, Job, JobStatus, Note, NoteKind, Priority, UserProfile};

const JOB_COLUMNS: &str = "id, created_at, updated_at, user_id, company, title, location, url,
     salary_min, salary_max, salary_currency, status, priority, applied_date,
     contact_name, contact_email, notes, next_action, next_action_date, source, referral";

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
            path: PathBuf::from(":memory:"),
        };
        db.init()?;
        Ok(db)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id BLOB PRIMARY KEY,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                user_id BLOB,
                company TEXT NOT NULL,
                title TEXT NOT NULL,
                location TEXT,
                url TEXT,
                salary_min INTEGER,
                salary_max INTEGER,
                salary_currency TEXT,
                status TEXT NOT NULL DEFAULT 'saved',
                priority TEXT NOT NULL DEFAULT 'medium',
                applied_date TEXT,
                contact_name TEXT,
                contact_email TEXT,
                notes TEXT,
                next_action TEXT,
                next_action_date TEXT,
                source TEXT,
                referral TEXT,
                dirty INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS pending_deletes (
                job_id BLOB PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS profile (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                data TEXT NOT NULL,
                dirty INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS notes (
                id BLOB PRIMARY KEY,
                job_id BLOB REFERENCES jobs(id) ON DELETE SET NULL,
                kind TEXT NOT NULL DEFAULT 'general',
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                dirty INTEGER NOT NULL DEFAULT 1,
                remote INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS pending_note_deletes (
                note_id BLOB PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS activities (
                id BLOB PRIMARY KEY,
                job_id BLOB,
                action TEXT NOT NULL,
                detail TEXT,
                created_at TEXT NOT NULL,
                synced INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS sync_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
            CREATE INDEX IF NOT EXISTS idx_notes_job ON notes(job_id);
            CREATE INDEX IF NOT EXISTS idx_activities_job ON activities(job_id);
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='jobs'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(anyhow!("Database not initialized. Run 'applytrack init' first."));
        }
        Ok(())
    }

    // --- Job operations ---

    pub fn insert_job(&self, job: &Job) -> Result<()> {
        self.write_job(job, true)?;
        self.log_activity(&Activity::new(
            Some(job.id),
            "created",
            Some(format!("{} at {}", job.title, job.company)),
        ))?;
        Ok(())
    }

    pub fn update_job(&self, job: &Job) -> Result<()> {
        if self.get_job(job.id)?.is_none() {
            return Err(anyhow!("Job {} not found", job.id));
        }
        self.write_job(job, true)?;
        self.log_activity(&Activity::new(Some(job.id), "updated", None))?;
        Ok(())
    }

    pub fn set_job_status(&self, id: Uuid, status: JobStatus, today: NaiveDate) -> Result<Option<Job>> {
        let Some(mut job) = self.get_job(id)? else {
            return Ok(None);
        };
        let previous = job.status;
        job.transition(status, today);
        self.write_job(&job, true)?;
        self.log_activity(&Activity::new(
            Some(id),
            "status_changed",
            Some(format!("{} -> {}", previous, status)),
        ))?;
        Ok(Some(job))
    }

    pub fn delete_job(&self, id: Uuid) -> Result<bool> {
        let removed = self.conn.execute("DELETE FROM jobs WHERE id = ?1", [id])?;
        if removed == 0 {
            return Ok(false);
        }
        self.conn.execute(
            "INSERT OR IGNORE INTO pending_deletes (job_id) VALUES (?1)",
            [id],
        )?;
        self.log_activity(&Activity::new(Some(id), "deleted", None))?;
        Ok(true)
    }

    pub fn get_job(&self, id: Uuid) -> Result<Option<Job>> {
        let sql = format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS);
        self.conn
            .query_row(&sql, [id], Self::row_to_job)
            .optional()
            .context("Failed to load job")
    }

    pub fn resolve_job_id(&self, prefix: &str) -> Result<Uuid> {
        if let Ok(id) = Uuid::parse_str(prefix) {
            return Ok(id);
        }
        let prefix = prefix.trim().to_ascii_lowercase();
        if prefix.is_empty() {
            return Err(anyhow!("Job id must not be empty"));
        }
        let matches: Vec<Uuid> = self
            .list_jobs(None, None)?
            .into_iter()
            .map(|job| job.id)
            .filter(|id| id.to_string().starts_with(&prefix))
            .collect();
        match matches.as_slice() {
            [id] => Ok(*id),
            [] => Err(anyhow!("No job matches '{}'", prefix)),
            _ => Err(anyhow!("'{}' matches {} jobs, use more characters", prefix, matches.len())),
        }
    }

    pub fn list_jobs(&self, status: Option<JobStatus>, company: Option<&str>) -> Result<Vec<Job>> {
        let mut sql = format!("SELECT {} FROM jobs WHERE 1=1", JOB_COLUMNS);
        let mut args: Vec<String> = vec![];

        if let Some(s) = status {
            sql.push_str(&format!(" AND status = ?{}", args.len() + 1));
            args.push(s.as_str().to_string());
        }

        if let Some(c) = company {
            sql.push_str(&format!(" AND LOWER(company) = LOWER(?{})", args.len() + 1));
            args.push(c.to_string());
        }

        sql.push_str(" ORDER BY created_at DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), Self::row_to_job)?;

        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list jobs")
    }

    pub fn dirty_jobs(&self) -> Result<Vec<Job>> {
        let sql = format!("SELECT {} FROM jobs WHERE dirty = 1", JOB_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::row_to_job)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list dirty jobs")
    }

    pub fn mark_job_synced(&self, id: Uuid, user_id: Uuid) -> Result<()> {
        self.conn.execute(
            "UPDATE jobs SET dirty = 0, user_id = ?2 WHERE id = ?1",
            params![id, user_id],
        )?;
        Ok(())
    }

    pub fn accept_remote_job(&self, remote: &Job) -> Result<()> {
        self.write_job(remote, false)
    }

    pub fn pending_deletes(&self) -> Result<Vec<Uuid>> {
        let mut stmt = self.conn.prepare("SELECT job_id FROM pending_deletes")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list pending deletes")
    }

    pub fn clear_pending_delete(&self, id: Uuid) -> Result<()> {
        self.conn.execute("DELETE FROM pending_deletes WHERE job_id = ?1", [id])?;
        Ok(())
    }

    // unpushed local edits win, otherwise the newer updated_at
    pub fn merge_remote_job(&self, remote: &Job) -> Result<bool> {
        let local: Option<(DateTime<Utc>, bool)> = self
            .conn
            .query_row(
                "SELECT updated_at, dirty FROM jobs WHERE id = ?1",
                [remote.id],
                |row| Ok((row.get(0)?, row.get::<_, i64>(1)? != 0)),
            )
            .optional()?;

        let pending_delete: bool = self
            .conn
            .query_row(
                "SELECT 1 FROM pending_deletes WHERE job_id = ?1",
                [remote.id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if pending_delete {
            return Ok(false);
        }

        match local {
            Some((_, true)) => Ok(false),
            Some((updated_at, false)) if updated_at >= remote.updated_at => Ok(false),
            _ => {
                self.write_job(remote, false)?;
                debug!(job = %remote.id, "merged remote job");
                Ok(true)
            }
        }
    }

    fn write_job(&self, job: &Job, dirty: bool) -> Result<()> {
        self.conn.execute(
            "INSERT INTO jobs (id, created_at, updated_at, user_id, company, title, location, url,
                salary_min, salary_max, salary_currency, status, priority, applied_date,
                contact_name, contact_email, notes, next_action, next_action_date, source, referral, dirty)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)
             ON CONFLICT(id) DO UPDATE SET
                updated_at = excluded.updated_at, user_id = excluded.user_id,
                company = excluded.company, title = excluded.title, location = excluded.location,
                url = excluded.url, salary_min = excluded.salary_min, salary_max = excluded.salary_max,
                salary_currency = excluded.salary_currency, status = excluded.status,
                priority = excluded.priority, applied_date = excluded.applied_date,
                contact_name = excluded.contact_name, contact_email = excluded.contact_email,
                notes = excluded.notes, next_action = excluded.next_action,
                next_action_date = excluded.next_action_date, source = excluded.source,
                referral = excluded.referral, dirty = excluded.dirty",
            params![
                job.id,
                job.created_at,
                job.updated_at,
                job.user_id,
                job.company,
                job.title,
                job.location,
                job.url,
                job.salary_min,
                job.salary_max,
                job.salary_currency,
                job.status.as_str(),
                job.priority.as_str(),
                job.applied_date,
                job.contact_name,
                job.contact_email,
                job.notes,
                job.next_action,
                job.next_action_date,
                job.source,
                job.referral,
                dirty,
            ],
        )?;
        Ok(())
    }

    fn row_to_job(row: &Row) -> rusqlite::Result<Job> {
        let status: String = row.get(11)?;
        let priority: String = row.get(12)?;
        Ok(Job {
            id: row.get(0)?,
            created_at: row.get(1)?,
            updated_at: row.get(2)?,
            user_id: row.get(3)?,
            company: row.get(4)?,
            title: row.get(5)?,
            location: row.get(6)?,
            url: row.get(7)?,
            salary_min: row.get(8)?,
            salary_max: row.get(9)?,
            salary_currency: row.get(10)?,
            status: JobStatus::from(status),
            priority: Priority::from(priority),
            applied_date: row.get(13)?,
            contact_name: row.get(14)?,
            contact_email: row.get(15)?,
            notes: row.get(16)?,
            next_action: row.get(17)?,
            next_action_date: row.get(18)?,
            source: row.get(19)?,
            referral: row.get(20)?,
        })
    }

    // --- Profile ---

    pub fn get_profile(&self) -> Result<Option<UserProfile>> {
        let data: Option<String> = self
            .conn
            .query_row("SELECT data FROM profile WHERE id = 1", [], |row| row.get(0))
            .optional()?;
        data.map(|d| serde_json::from_str(&d).context("Corrupt stored profile"))
            .transpose()
    }

    pub fn save_profile(&self, profile: &UserProfile) -> Result<()> {
        self.write_profile(profile, true)
    }

    pub fn merge_remote_profile(&self, profile: &UserProfile) -> Result<bool> {
        if self.profile_dirty()? {
            return Ok(false);
        }
        self.write_profile(profile, false)?;
        Ok(true)
    }

    pub fn profile_dirty(&self) -> Result<bool> {
        let dirty: Option<i64> = self
            .conn
            .query_row("SELECT dirty FROM profile WHERE id = 1", [], |row| row.get(0))
            .optional()?;
        Ok(dirty.unwrap_or(0) != 0)
    }

    pub fn mark_profile_clean(&self) -> Result<()> {
        self.conn.execute("UPDATE profile SET dirty = 0 WHERE id = 1", [])?;
        Ok(())
    }

    fn write_profile(&self, profile: &UserProfile, dirty: bool) -> Result<()> {
        let data = serde_json::to_string(profile)?;
        self.conn.execute(
            "INSERT INTO profile (id, data, dirty) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data, dirty = excluded.dirty",
            params![data, dirty],
        )?;
        Ok(())
    }

    // --- Notes ---

    pub fn add_note(&self, note: &Note) -> Result<()> {
        self.conn.execute(
            "INSERT INTO notes (id, job_id, kind, content, created_at, dirty) VALUES (?1, ?2, ?3, ?4, ?5, 1)",
            params![note.id, note.job_id, note.kind.as_str(), note.content, note.created_at],
        )?;
        Ok(())
    }

    pub fn list_notes(&self, job_id: Option<Uuid>) -> Result<Vec<Note>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, job_id, kind, content, created_at FROM notes
             WHERE ?1 IS NULL OR job_id = ?1
             ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([job_id], Self::row_to_note)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list notes")
    }

    pub fn update_note(&self, id: Uuid, content: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE notes SET content = ?2, dirty = 1 WHERE id = ?1",
            params![id, content],
        )?;
        Ok(changed > 0)
    }

    // notes that already reached the backend are queued for a remote delete
    pub fn delete_note(&self, id: Uuid) -> Result<bool> {
        let remote: Option<bool> = self
            .conn
            .query_row("SELECT remote FROM notes WHERE id = ?1", [id], |row| {
                Ok(row.get::<_, i64>(0)? != 0)
            })
            .optional()?;
        let Some(remote) = remote else {
            return Ok(false);
        };
        self.conn.execute("DELETE FROM notes WHERE id = ?1", [id])?;
        if remote {
            self.conn.execute(
                "INSERT OR IGNORE INTO pending_note_deletes (note_id) VALUES (?1)",
                [id],
            )?;
        }
        Ok(true)
    }

    pub fn dirty_notes(&self) -> Result<Vec<(Note, bool)>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, job_id, kind, content, created_at, remote FROM notes WHERE dirty = 1",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((Self::row_to_note(row)?, row.get::<_, i64>(5)? != 0))
        })?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list dirty notes")
    }

    pub fn mark_note_synced(&self, id: Uuid) -> Result<()> {
        self.conn.execute("UPDATE notes SET dirty = 0, remote = 1 WHERE id = ?1", [id])?;
        Ok(())
    }

    pub fn pending_note_deletes(&self) -> Result<Vec<Uuid>> {
        let mut stmt = self.conn.prepare("SELECT note_id FROM pending_note_deletes")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list pending note deletes")
    }

    pub fn clear_pending_note_delete(&self, id: Uuid) -> Result<()> {
        self.conn.execute("DELETE FROM pending_note_deletes WHERE note_id = ?1", [id])?;
        Ok(())
    }

    pub fn merge_remote_note(&self, remote: &Note) -> Result<bool> {
        let pending_delete = self
            .conn
            .query_row(
                "SELECT 1 FROM pending_note_deletes WHERE note_id = ?1",
                [remote.id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if pending_delete {
            return Ok(false);
        }

        let local: Option<(Note, bool)> = self
            .conn
            .query_row(
                "SELECT id, job_id, kind, content, created_at, dirty FROM notes WHERE id = ?1",
                [remote.id],
                |row| Ok((Self::row_to_note(row)?, row.get::<_, i64>(5)? != 0)),
            )
            .optional()?;
        match local {
            Some((_, true)) => return Ok(false),
            Some((note, false))
                if note.content == remote.content
                    && note.kind == remote.kind
                    && note.job_id == remote.job_id =>
            {
                return Ok(false);
            }
            _ => {}
        }

        self.conn.execute(
            "INSERT INTO notes (id, job_id, kind, content, created_at, dirty, remote)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, 1)
             ON CONFLICT(id) DO UPDATE SET
                job_id = excluded.job_id, kind = excluded.kind, content = excluded.content,
                dirty = 0, remote = 1",
            params![remote.id, remote.job_id, remote.kind.as_str(), remote.content, remote.created_at],
        )?;
        debug!(note = %remote.id, "merged remote note");
        Ok(true)
    }

    fn row_to_note(row: &Row) -> rusqlite::Result<Note> {
        let kind: String = row.get(2)?;
        Ok(Note {
            id: row.get(0)?,
            job_id: row.get(1)?,
            kind: NoteKind::from(kind),
            content: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    // --- Activity log ---

    pub fn log_activity(&self, activity: &Activity) -> Result<()> {
        self.conn.execute(
            "INSERT INTO activities (id, job_id, action, detail, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                activity.id,
                activity.job_id,
                activity.action,
                activity.detail,
                activity.created_at
            ],
        )?;
        Ok(())
    }

    pub fn recent_activities(&self, limit: usize) -> Result<Vec<Activity>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, job_id, action, detail, created_at FROM activities
             ORDER BY created_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], Self::row_to_activity)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list activities")
    }

    pub fn unsynced_activities(&self) -> Result<Vec<Activity>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, job_id, action, detail, created_at FROM activities
             WHERE synced = 0 ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], Self::row_to_activity)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list unsynced activities")
    }

    pub fn mark_activity_synced(&self, id: Uuid) -> Result<()> {
        self.conn.execute("UPDATE activities SET synced = 1 WHERE id = ?1", [id])?;
        Ok(())
    }

    pub fn merge_remote_activity(&self, activity: &Activity) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO activities (id, job_id, action, detail, created_at, synced)
             VALUES (?1, ?2, ?3, ?4, ?5, 1)",
            params![
                activity.id,
                activity.job_id,
                activity.action,
                activity.detail,
                activity.created_at
            ],
        )?;
        Ok(inserted > 0)
    }

    fn row_to_activity(row: &Row) -> rusqlite::Result<Activity> {
        Ok(Activity {
            id: row.get(0)?,
            job_id: row.get(1)?,
            action: row.get(2)?,
            detail: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    // --- Sync bookkeeping ---

    pub fn last_synced_at(&self) -> Result<Option<DateTime<Utc>>> {
        self.conn
            .query_row(
                "SELECT value FROM sync_meta WHERE key = 'last_synced_at'",
                [],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to read sync state")
    }

    pub fn set_last_synced_at(&self, at: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sync_meta (key, value) VALUES ('last_synced_at', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [at],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    #[test]
    fn test_insert_and_list_jobs() {
        let db = Database::open_in_memory().unwrap();
        let mut job = Job::new("Acme", "Backend Engineer");
        job.salary_min = Some(150_000);
        job.applied_date = Some(today());
        db.insert_job(&job).unwrap();

        let jobs = db.list_jobs(None, None).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, job.id);
        assert_eq!(jobs[0].salary_min, Some(150_000));
        assert_eq!(jobs[0].applied_date, Some(today()));

        assert_eq!(db.list_jobs(Some(JobStatus::Offer), None).unwrap().len(), 0);
        assert_eq!(db.list_jobs(None, Some("acme")).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_stored_status_reads_as_saved() {
        let db = Database::open_in_memory().unwrap();
        let job = Job::new("Acme", "Engineer");
        db.insert_job(&job).unwrap();
        db.conn
            .execute("UPDATE jobs SET status = 'archived' WHERE id = ?1", [job.id])
            .unwrap();
        assert_eq!(db.get_job(job.id).unwrap().unwrap().status, JobStatus::Saved);
    }

    #[test]
    fn test_status_change_logs_activity() {
        let db = Database::open_in_memory().unwrap();
        let job = Job::new("Acme", "Engineer");
        db.insert_job(&job).unwrap();

        let updated = db.set_job_status(job.id, JobStatus::Applied, today()).unwrap().unwrap();
        assert_eq!(updated.applied_date, Some(today()));

        let activities = db.unsynced_activities().unwrap();
        assert_eq!(activities.len(), 2);
        assert_eq!(activities[1].action, "status_changed");
        assert_eq!(activities[1].detail.as_deref(), Some("saved -> applied"));

        assert!(db.set_job_status(Uuid::new_v4(), JobStatus::Offer, today()).unwrap().is_none());
    }

    #[test]
    fn test_delete_queues_remote_delete() {
        let db = Database::open_in_memory().unwrap();
        let job = Job::new("Acme", "Engineer");
        db.insert_job(&job).unwrap();

        assert!(db.delete_job(job.id).unwrap());
        assert!(!db.delete_job(job.id).unwrap());
        assert_eq!(db.pending_deletes().unwrap(), vec![job.id]);

        db.clear_pending_delete(job.id).unwrap();
        assert!(db.pending_deletes().unwrap().is_empty());
    }

    #[test]
    fn test_merge_remote_prefers_unpushed_local_edits() {
        let db = Database::open_in_memory().unwrap();
        let job = Job::new("Acme", "Engineer");
        db.insert_job(&job).unwrap();

        let mut remote = job.clone();
        remote.title = "Remote title".to_string();
        remote.updated_at = job.updated_at + Duration::minutes(5);
        assert!(!db.merge_remote_job(&remote).unwrap());

        let owner = Uuid::new_v4();
        db.mark_job_synced(job.id, owner).unwrap();
        assert_eq!(db.get_job(job.id).unwrap().unwrap().user_id, Some(owner));
        assert!(db.merge_remote_job(&remote).unwrap());
        assert_eq!(db.get_job(job.id).unwrap().unwrap().title, "Remote title");

        let mut stale = remote.clone();
        stale.title = "Stale".to_string();
        stale.updated_at = job.updated_at - Duration::minutes(5);
        assert!(!db.merge_remote_job(&stale).unwrap());
    }

    #[test]
    fn test_merge_skips_locally_deleted_jobs() {
        let db = Database::open_in_memory().unwrap();
        let job = Job::new("Acme", "Engineer");
        db.insert_job(&job).unwrap();
        db.delete_job(job.id).unwrap();
        assert!(!db.merge_remote_job(&job).unwrap());
        assert!(db.get_job(job.id).unwrap().is_none());
    }

    #[test]
    fn test_resolve_job_id_prefix() {
        let db = Database::open_in_memory().unwrap();
        let job = Job::new("Acme", "Engineer");
        db.insert_job(&job).unwrap();
        let prefix = &job.id.to_string()[..8];
        assert_eq!(db.resolve_job_id(prefix).unwrap(), job.id);
        assert!(db.resolve_job_id("zzzz").is_err());
    }

    #[test]
    fn test_profile_round_trip_and_dirty_flag() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_profile().unwrap().is_none());

        let profile = UserProfile {
            full_name: Some("Sam Doe".to_string()),
            skills: vec!["rust".to_string(), "sql".to_string()],
            ..Default::default()
        };
        db.save_profile(&profile).unwrap();
        assert!(db.profile_dirty().unwrap());
        assert_eq!(db.get_profile().unwrap().unwrap().skills.len(), 2);

        let remote = UserProfile {
            full_name: Some("From server".to_string()),
            ..Default::default()
        };
        assert!(!db.merge_remote_profile(&remote).unwrap());
        db.mark_profile_clean().unwrap();
        assert!(db.merge_remote_profile(&remote).unwrap());
        assert_eq!(
            db.get_profile().unwrap().unwrap().full_name.as_deref(),
            Some("From server")
        );
    }

    #[test]
    fn test_notes_filter_by_job() {
        let db = Database::open_in_memory().unwrap();
        let job = Job::new("Acme", "Engineer");
        db.insert_job(&job).unwrap();
        db.add_note(&Note::new(Some(job.id), NoteKind::Interview, "Ask about on-call"))
            .unwrap();
        db.add_note(&Note::new(None, NoteKind::General, "Update resume")).unwrap();

        assert_eq!(db.list_notes(None).unwrap().len(), 2);
        let for_job = db.list_notes(Some(job.id)).unwrap();
        assert_eq!(for_job.len(), 1);
        assert_eq!(for_job[0].kind, NoteKind::Interview);
    }

    #[test]
    fn test_delete_note_queues_remote_delete_only_once_pushed() {
        let db = Database::open_in_memory().unwrap();
        let local_only = Note::new(None, NoteKind::General, "draft");
        let pushed = Note::new(None, NoteKind::Research, "Series B");
        db.add_note(&local_only).unwrap();
        db.add_note(&pushed).unwrap();
        db.mark_note_synced(pushed.id).unwrap();

        assert!(db.delete_note(local_only.id).unwrap());
        assert!(db.delete_note(pushed.id).unwrap());
        assert!(!db.delete_note(pushed.id).unwrap());
        assert_eq!(db.pending_note_deletes().unwrap(), vec![pushed.id]);

        // a pull must not bring the deleted note back
        assert!(!db.merge_remote_note(&pushed).unwrap());
        assert!(db.list_notes(None).unwrap().is_empty());
    }

    #[test]
    fn test_edited_note_is_dirty_and_wins_over_remote() {
        let db = Database::open_in_memory().unwrap();
        let note = Note::new(None, NoteKind::Interview, "Round one");
        db.add_note(&note).unwrap();
        db.mark_note_synced(note.id).unwrap();
        assert!(db.dirty_notes().unwrap().is_empty());

        assert!(db.update_note(note.id, "Round two").unwrap());
        let dirty = db.dirty_notes().unwrap();
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].0.content, "Round two");
        assert!(dirty[0].1);

        let mut remote = note.clone();
        remote.content = "Server copy".to_string();
        assert!(!db.merge_remote_note(&remote).unwrap());
        db.mark_note_synced(note.id).unwrap();
        assert!(db.merge_remote_note(&remote).unwrap());
        assert!(!db.merge_remote_note(&remote).unwrap());
        assert_eq!(db.list_notes(None).unwrap()[0].content, "Server copy");
    }

    #[test]
    fn test_remote_activity_merged_once() {
        let db = Database::open_in_memory().unwrap();
        let activity = Activity::new(None, "created", Some("Engineer at Acme".to_string()));
        assert!(db.merge_remote_activity(&activity).unwrap());
        assert!(!db.merge_remote_activity(&activity).unwrap());
        assert!(db.unsynced_activities().unwrap().is_empty());
        assert_eq!(db.recent_activities(10).unwrap().len(), 1);
    }

    #[test]
    fn test_last_synced_at() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.last_synced_at().unwrap().is_none());
        let now = Utc::now();
        db.set_last_synced_at(now).unwrap();
        let stored = db.last_synced_at().unwrap().unwrap();
        assert!((stored - now).num_milliseconds().abs() < 1);
    }
}
