//! Durable job queue table.
//!
//! Single-table queue with unique-key de-duplication, atomic claim and
//! bounded retries. Claim order is `(created_at, id)`; atomicity comes from
//! an immediate transaction, so concurrent workers (and a second process on
//! the same file) never double-claim a row.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use tracing::{debug, info};

use podclip_models::{JobPayload, JobRecord, JobStatus, JobType, DEFAULT_MAX_ATTEMPTS};

use crate::database::{now_str, parse_opt_ts, parse_ts, ts_str, Database};
use crate::error::{DbError, DbResult};

const JOB_COLUMNS: &str = "id, job_type, status, progress, payload, unique_key, attempts, \
     max_attempts, error, run_after, claimed_by, created_at, updated_at, started_at, completed_at";

/// Job persistence operations.
#[derive(Debug, Clone)]
pub struct JobStore {
    db: Arc<Database>,
    default_max_attempts: u32,
}

/// Raw row image; converted to a `JobRecord` outside the rusqlite closure so
/// payload/timestamp parse failures surface as `DbError::Corrupt`.
struct RawJob {
    id: i64,
    job_type: String,
    status: String,
    progress: i64,
    payload: String,
    unique_key: Option<String>,
    attempts: i64,
    max_attempts: i64,
    error: Option<String>,
    run_after: Option<String>,
    created_at: String,
    updated_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
}

fn raw_from_row(row: &Row<'_>) -> rusqlite::Result<RawJob> {
    Ok(RawJob {
        id: row.get(0)?,
        job_type: row.get(1)?,
        status: row.get(2)?,
        progress: row.get(3)?,
        payload: row.get(4)?,
        unique_key: row.get(5)?,
        attempts: row.get(6)?,
        max_attempts: row.get(7)?,
        error: row.get(8)?,
        run_after: row.get(9)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
        started_at: row.get(13)?,
        completed_at: row.get(14)?,
    })
}

impl RawJob {
    fn into_record(self) -> DbResult<JobRecord> {
        let job_type = JobType::parse(&self.job_type)
            .ok_or_else(|| DbError::corrupt(format!("unknown job type {:?}", self.job_type)))?;
        let status = JobStatus::parse(&self.status)
            .ok_or_else(|| DbError::corrupt(format!("unknown job status {:?}", self.status)))?;
        let payload: JobPayload = serde_json::from_str(&self.payload)?;

        Ok(JobRecord {
            id: self.id,
            job_type,
            status,
            progress: self.progress.clamp(0, 100) as u8,
            payload,
            unique_key: self.unique_key,
            attempts: self.attempts as u32,
            max_attempts: self.max_attempts as u32,
            error: self.error,
            run_after: parse_opt_ts(self.run_after)?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            started_at: parse_opt_ts(self.started_at)?,
            completed_at: parse_opt_ts(self.completed_at)?,
        })
    }
}

impl JobStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            default_max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_default_max_attempts(mut self, max_attempts: u32) -> Self {
        self.default_max_attempts = max_attempts.max(1);
        self
    }

    /// Insert a new pending job.
    pub fn enqueue(&self, job_type: JobType, payload: &JobPayload) -> DbResult<JobRecord> {
        self.enqueue_inner(job_type, payload, None, self.default_max_attempts)
    }

    /// Insert a new pending job unless an active row already holds `unique_key`.
    ///
    /// Returns the existing row unchanged when a pending or processing job
    /// with the same key exists.
    pub fn enqueue_unique(
        &self,
        job_type: JobType,
        payload: &JobPayload,
        unique_key: &str,
    ) -> DbResult<JobRecord> {
        self.enqueue_inner(job_type, payload, Some(unique_key), self.default_max_attempts)
    }

    /// `enqueue_unique` with a per-type attempt budget.
    pub fn enqueue_unique_with_attempts(
        &self,
        job_type: JobType,
        payload: &JobPayload,
        unique_key: &str,
        max_attempts: u32,
    ) -> DbResult<JobRecord> {
        self.enqueue_inner(job_type, payload, Some(unique_key), max_attempts.max(1))
    }

    fn enqueue_inner(
        &self,
        job_type: JobType,
        payload: &JobPayload,
        unique_key: Option<&str>,
        max_attempts: u32,
    ) -> DbResult<JobRecord> {
        let payload_json = serde_json::to_string(payload)?;
        let now = now_str();

        let mut conn = self.db.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(key) = unique_key {
            let existing = tx
                .query_row(
                    &format!(
                        "SELECT {JOB_COLUMNS} FROM jobs
                         WHERE unique_key = ?1 AND status IN ('pending', 'processing')
                         LIMIT 1"
                    ),
                    params![key],
                    raw_from_row,
                )
                .optional()?;

            if let Some(raw) = existing {
                let job = raw.into_record()?;
                debug!(job_id = job.id, unique_key = key, "Duplicate enqueue collapsed");
                tx.commit()?;
                return Ok(job);
            }
        }

        tx.execute(
            "INSERT INTO jobs (job_type, status, progress, payload, unique_key,
                               attempts, max_attempts, created_at, updated_at)
             VALUES (?1, 'pending', 0, ?2, ?3, 0, ?4, ?5, ?5)",
            params![job_type.as_str(), payload_json, unique_key, max_attempts, now],
        )?;
        let id = tx.last_insert_rowid();
        let job = Self::get_tx(&tx, id)?
            .ok_or_else(|| DbError::not_found(format!("job {id} vanished after insert")))?;
        tx.commit()?;

        info!(job_id = id, job_type = %job_type, "Enqueued job");
        Ok(job)
    }

    /// Fetch a job by id.
    pub fn get(&self, id: i64) -> DbResult<Option<JobRecord>> {
        let conn = self.db.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
            params![id],
            raw_from_row,
        )
        .optional()?
        .map(RawJob::into_record)
        .transpose()
    }

    /// Claim the oldest eligible pending job for `worker_id`.
    ///
    /// Atomically flips the row to `processing`; `run_after` gates rows that
    /// are waiting out a retry backoff.
    pub fn claim_next(&self, worker_id: &str) -> DbResult<Option<JobRecord>> {
        let now = now_str();

        let mut conn = self.db.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let candidate: Option<i64> = tx
            .query_row(
                "SELECT id FROM jobs
                 WHERE status = 'pending'
                   AND (run_after IS NULL OR run_after <= ?1)
                 ORDER BY created_at, id
                 LIMIT 1",
                params![now],
                |row| row.get(0),
            )
            .optional()?;

        let Some(id) = candidate else {
            tx.commit()?;
            return Ok(None);
        };

        tx.execute(
            "UPDATE jobs
             SET status = 'processing', claimed_by = ?2, started_at = ?3, updated_at = ?3
             WHERE id = ?1",
            params![id, worker_id, now],
        )?;
        let job = Self::get_tx(&tx, id)?
            .ok_or_else(|| DbError::not_found(format!("job {id} vanished during claim")))?;
        tx.commit()?;

        debug!(job_id = id, worker = worker_id, "Claimed job");
        Ok(Some(job))
    }

    /// Update progress on a processing job.
    ///
    /// Clamped to [0, 100] and monotonic; writes to rows in any other
    /// status are ignored.
    pub fn update_progress(&self, id: i64, pct: u8) -> DbResult<()> {
        let pct = pct.min(100);
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "UPDATE jobs
             SET progress = MAX(progress, ?2), updated_at = ?3
             WHERE id = ?1 AND status = 'processing'",
            params![id, pct, now_str()],
        )?;
        Ok(())
    }

    /// Mark a processing job as completed.
    pub fn complete(&self, id: i64) -> DbResult<JobRecord> {
        let now = now_str();
        let conn = self.db.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE jobs
             SET status = 'completed', progress = 100, error = NULL,
                 attempts = attempts + 1, completed_at = ?2, updated_at = ?2
             WHERE id = ?1 AND status = 'processing'",
            params![id, now],
        )?;
        if changed == 0 {
            return Err(DbError::invalid_state(format!(
                "job {id} is not processing; cannot complete"
            )));
        }
        drop(conn);
        self.get(id)?
            .ok_or_else(|| DbError::not_found(format!("job {id}")))
    }

    /// Record a failed attempt.
    ///
    /// While attempts remain the row returns to `pending`, optionally gated
    /// by a retry backoff; an exhausted job becomes `permanently_failed`.
    pub fn fail(&self, id: i64, error: &str, retry_delay: Option<Duration>) -> DbResult<JobRecord> {
        let now = now_str();

        let mut conn = self.db.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (attempts, max_attempts): (i64, i64) = tx
            .query_row(
                "SELECT attempts, max_attempts FROM jobs WHERE id = ?1 AND status = 'processing'",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| {
                DbError::invalid_state(format!("job {id} is not processing; cannot fail"))
            })?;

        let attempts = attempts + 1;
        if attempts < max_attempts {
            let run_after = retry_delay.map(|d| ts_str(&(Utc::now() + d)));
            tx.execute(
                "UPDATE jobs
                 SET status = 'pending', attempts = ?2, error = ?3, run_after = ?4,
                     progress = 0, claimed_by = NULL, started_at = NULL, updated_at = ?5
                 WHERE id = ?1",
                params![id, attempts, error, run_after, now],
            )?;
            debug!(job_id = id, attempts, "Job failed, scheduled for retry");
        } else {
            tx.execute(
                "UPDATE jobs
                 SET status = 'permanently_failed', attempts = ?2, error = ?3,
                     completed_at = ?4, updated_at = ?4
                 WHERE id = ?1",
                params![id, attempts, error, now],
            )?;
            info!(job_id = id, attempts, "Job permanently failed");
        }

        let job = Self::get_tx(&tx, id)?
            .ok_or_else(|| DbError::not_found(format!("job {id}")))?;
        tx.commit()?;
        Ok(job)
    }

    /// Fail a job with no further retries, regardless of remaining attempts.
    pub fn fail_permanent(&self, id: i64, error: &str) -> DbResult<JobRecord> {
        let now = now_str();
        let conn = self.db.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE jobs
             SET status = 'permanently_failed', attempts = MIN(attempts + 1, max_attempts),
                 error = ?2, completed_at = ?3, updated_at = ?3
             WHERE id = ?1 AND status IN ('pending', 'processing')",
            params![id, error, now],
        )?;
        if changed == 0 {
            return Err(DbError::invalid_state(format!(
                "job {id} is not active; cannot park"
            )));
        }
        drop(conn);
        self.get(id)?
            .ok_or_else(|| DbError::not_found(format!("job {id}")))
    }

    /// Latest job of `job_type` whose payload field `key` equals `value`.
    ///
    /// Used by idempotency checks, e.g. "the analysis job for episode 77".
    pub fn get_for(
        &self,
        job_type: JobType,
        key: &str,
        value: &serde_json::Value,
    ) -> DbResult<Option<JobRecord>> {
        let path = format!("$.{key}");
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs
             WHERE job_type = ?1 AND json_extract(payload, ?2) = ?3
             ORDER BY id DESC
             LIMIT 1"
        );

        let conn = self.db.conn.lock().unwrap();
        let raw = if let Some(n) = value.as_i64() {
            conn.query_row(&sql, params![job_type.as_str(), path, n], raw_from_row)
                .optional()?
        } else if let Some(s) = value.as_str() {
            conn.query_row(&sql, params![job_type.as_str(), path, s], raw_from_row)
                .optional()?
        } else {
            return Ok(None);
        };
        raw.map(RawJob::into_record).transpose()
    }

    /// Reset `processing` rows whose worker disappeared.
    ///
    /// Rows started more than `older_than` ago go back to `pending` without
    /// consuming an attempt; the crashed attempt never reported a verdict.
    pub fn reclaim_stale(&self, older_than: Duration) -> DbResult<usize> {
        let cutoff = ts_str(&(Utc::now() - older_than));
        let now = now_str();
        let conn = self.db.conn.lock().unwrap();
        let reclaimed = conn.execute(
            "UPDATE jobs
             SET status = 'pending', progress = 0, claimed_by = NULL,
                 started_at = NULL, updated_at = ?2
             WHERE status = 'processing' AND started_at < ?1",
            params![cutoff, now],
        )?;
        if reclaimed > 0 {
            info!(count = reclaimed, "Reclaimed stale processing jobs");
        }
        Ok(reclaimed)
    }

    /// List recent jobs, optionally filtered, newest first.
    pub fn list(
        &self,
        job_type: Option<JobType>,
        status: Option<JobStatus>,
        limit: u32,
    ) -> DbResult<Vec<JobRecord>> {
        let limit = limit.clamp(1, 1000);
        let mut sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE 1=1");
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(ty) = job_type {
            args.push(Box::new(ty.as_str().to_string()));
            sql.push_str(&format!(" AND job_type = ?{}", args.len()));
        }
        if let Some(st) = status {
            args.push(Box::new(st.as_str().to_string()));
            sql.push_str(&format!(" AND status = ?{}", args.len()));
        }
        args.push(Box::new(limit));
        sql.push_str(&format!(" ORDER BY id DESC LIMIT ?{}", args.len()));

        let conn = self.db.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(args.iter().map(|arg| arg.as_ref())),
            raw_from_row,
        )?;

        let mut jobs = Vec::new();
        for raw in rows {
            jobs.push(raw?.into_record()?);
        }
        Ok(jobs)
    }

    fn get_tx(tx: &rusqlite::Transaction<'_>, id: i64) -> DbResult<Option<JobRecord>> {
        tx.query_row(
            &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
            params![id],
            raw_from_row,
        )
        .optional()?
        .map(RawJob::into_record)
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(db: &Arc<Database>) -> JobStore {
        JobStore::new(Arc::clone(db))
    }

    fn payload(pairs: &[(&str, serde_json::Value)]) -> JobPayload {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn analysis_payload(episode_id: i64) -> JobPayload {
        payload(&[
            ("episode_id", serde_json::json!(episode_id)),
            ("audio_url", serde_json::json!("https://cdn.example/ep.mp3")),
        ])
    }

    #[test]
    fn test_enqueue_and_claim_in_order() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = store(&db);

        let first = store
            .enqueue(JobType::EpisodeAnalysis, &analysis_payload(1))
            .unwrap();
        let second = store
            .enqueue(JobType::EpisodeAnalysis, &analysis_payload(2))
            .unwrap();

        let claimed = store.claim_next("w0").unwrap().unwrap();
        assert_eq!(claimed.id, first.id);
        assert_eq!(claimed.status, JobStatus::Processing);
        assert!(claimed.started_at.is_some());

        let claimed2 = store.claim_next("w1").unwrap().unwrap();
        assert_eq!(claimed2.id, second.id);

        assert!(store.claim_next("w0").unwrap().is_none());
    }

    #[test]
    fn test_enqueue_unique_collapses_active_duplicates() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = store(&db);

        let a = store
            .enqueue_unique(JobType::EpisodeAnalysis, &analysis_payload(77), "episode_analysis:77")
            .unwrap();
        let b = store
            .enqueue_unique(JobType::EpisodeAnalysis, &analysis_payload(77), "episode_analysis:77")
            .unwrap();
        assert_eq!(a.id, b.id);

        // Claiming keeps the key held.
        store.claim_next("w0").unwrap().unwrap();
        let c = store
            .enqueue_unique(JobType::EpisodeAnalysis, &analysis_payload(77), "episode_analysis:77")
            .unwrap();
        assert_eq!(a.id, c.id);

        // A terminal row releases the key.
        store.complete(a.id).unwrap();
        let d = store
            .enqueue_unique(JobType::EpisodeAnalysis, &analysis_payload(77), "episode_analysis:77")
            .unwrap();
        assert_ne!(a.id, d.id);
    }

    #[test]
    fn test_fail_retries_until_exhausted() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = store(&db);
        let job = store
            .enqueue(JobType::ClipExtraction, &payload(&[("clip_uuid", serde_json::json!("u"))]))
            .unwrap();

        // Attempt 1 and 2 re-pend.
        for expected_attempts in 1..3u32 {
            let claimed = store.claim_next("w0").unwrap().unwrap();
            assert_eq!(claimed.id, job.id);
            let failed = store.fail(job.id, "download:http_503: upstream busy", None).unwrap();
            assert_eq!(failed.attempts, expected_attempts);
            assert_eq!(failed.status, JobStatus::Pending);
        }

        // Attempt 3 exhausts the budget.
        store.claim_next("w0").unwrap().unwrap();
        let parked = store.fail(job.id, "download:http_503: upstream busy", None).unwrap();
        assert_eq!(parked.status, JobStatus::PermanentlyFailed);
        assert_eq!(parked.attempts, parked.max_attempts);
        assert!(store.claim_next("w0").unwrap().is_none());
    }

    #[test]
    fn test_retry_backoff_gates_claim() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = store(&db);
        let job = store
            .enqueue(JobType::ClipExtraction, &payload(&[("clip_uuid", serde_json::json!("u"))]))
            .unwrap();

        store.claim_next("w0").unwrap().unwrap();
        store
            .fail(job.id, "download:http_503: busy", Some(Duration::seconds(60)))
            .unwrap();

        // Still backing off.
        assert!(store.claim_next("w0").unwrap().is_none());
    }

    #[test]
    fn test_progress_is_clamped_and_monotonic() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = store(&db);
        let job = store
            .enqueue(JobType::EpisodeAnalysis, &analysis_payload(9))
            .unwrap();

        // Ignored while pending.
        store.update_progress(job.id, 50).unwrap();
        assert_eq!(store.get(job.id).unwrap().unwrap().progress, 0);

        store.claim_next("w0").unwrap();
        store.update_progress(job.id, 60).unwrap();
        store.update_progress(job.id, 40).unwrap();
        assert_eq!(store.get(job.id).unwrap().unwrap().progress, 60);

        store.update_progress(job.id, 200).unwrap();
        assert_eq!(store.get(job.id).unwrap().unwrap().progress, 100);
    }

    #[test]
    fn test_complete_requires_processing() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = store(&db);
        let job = store
            .enqueue(JobType::EpisodeAnalysis, &analysis_payload(3))
            .unwrap();

        assert!(matches!(
            store.complete(job.id),
            Err(DbError::InvalidState(_))
        ));

        store.claim_next("w0").unwrap();
        let done = store.complete(job.id).unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 100);
        assert!(done.completed_at.is_some());
    }

    #[test]
    fn test_get_for_finds_typed_payload_match() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = store(&db);
        store
            .enqueue(JobType::EpisodeAnalysis, &analysis_payload(5))
            .unwrap();
        let wanted = store
            .enqueue(JobType::EpisodeAnalysis, &analysis_payload(77))
            .unwrap();

        let found = store
            .get_for(JobType::EpisodeAnalysis, "episode_id", &serde_json::json!(77))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, wanted.id);

        assert!(store
            .get_for(JobType::EpisodeAnalysis, "episode_id", &serde_json::json!(123))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_reclaim_stale_repends_old_processing_rows() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = store(&db);
        let job = store
            .enqueue(JobType::EpisodeAnalysis, &analysis_payload(8))
            .unwrap();
        store.claim_next("w0").unwrap();

        // Fresh rows are left alone.
        assert_eq!(store.reclaim_stale(Duration::minutes(10)).unwrap(), 0);

        // Everything is stale with a zero threshold.
        assert_eq!(store.reclaim_stale(Duration::zero()).unwrap(), 1);
        let reclaimed = store.get(job.id).unwrap().unwrap();
        assert_eq!(reclaimed.status, JobStatus::Pending);
        assert!(reclaimed.started_at.is_none());
    }

    #[test]
    fn test_fail_permanent_skips_retry_budget() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = store(&db);
        let job = store
            .enqueue(JobType::TranscriptionGeneration, &JobPayload::new())
            .unwrap();
        store.claim_next("w0").unwrap();

        let parked = store
            .fail_permanent(job.id, "validation:no_handler: no handler registered")
            .unwrap();
        assert_eq!(parked.status, JobStatus::PermanentlyFailed);
        assert!(parked.attempts <= parked.max_attempts);
    }
}
