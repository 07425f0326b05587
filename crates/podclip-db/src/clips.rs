//! Clip rows and filtered listings.

use std::sync::Arc;

use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;
use uuid::Uuid;

use podclip_models::{ClipRecord, ClipStatus, LabelMethod, NewClip};

use crate::database::{now_str, parse_ts, Database};
use crate::error::{DbError, DbResult};

/// Hard cap on list page sizes.
pub const MAX_LIST_LIMIT: u32 = 1000;

const CLIP_COLUMNS: &str = "id, uuid, podcast_index_episode_id, source_episode_url, \
     original_start_time, original_end_time, label, status, approved, extracted, \
     clip_filename, clip_duration, clip_size_bytes, auto_labeled, label_confidence, \
     label_method, error_message, created_at, updated_at";

/// Filters for clip listings.
#[derive(Debug, Clone, Default)]
pub struct ClipFilter {
    pub episode_id: Option<i64>,
    pub label: Option<String>,
    pub status: Option<ClipStatus>,
    pub approved: Option<bool>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ClipFilter {
    pub fn for_episode(episode_id: i64) -> Self {
        Self {
            episode_id: Some(episode_id),
            ..Default::default()
        }
    }
}

/// Clip persistence operations.
#[derive(Debug, Clone)]
pub struct ClipRepository {
    db: Arc<Database>,
}

struct RawClip {
    id: i64,
    uuid: String,
    podcast_index_episode_id: i64,
    source_episode_url: String,
    original_start_time: f64,
    original_end_time: f64,
    label: String,
    status: String,
    approved: bool,
    extracted: bool,
    clip_filename: Option<String>,
    clip_duration: Option<f64>,
    clip_size_bytes: Option<i64>,
    auto_labeled: bool,
    label_confidence: Option<f64>,
    label_method: String,
    error_message: Option<String>,
    created_at: String,
    updated_at: String,
}

fn raw_from_row(row: &Row<'_>) -> rusqlite::Result<RawClip> {
    Ok(RawClip {
        id: row.get(0)?,
        uuid: row.get(1)?,
        podcast_index_episode_id: row.get(2)?,
        source_episode_url: row.get(3)?,
        original_start_time: row.get(4)?,
        original_end_time: row.get(5)?,
        label: row.get(6)?,
        status: row.get(7)?,
        approved: row.get(8)?,
        extracted: row.get(9)?,
        clip_filename: row.get(10)?,
        clip_duration: row.get(11)?,
        clip_size_bytes: row.get(12)?,
        auto_labeled: row.get(13)?,
        label_confidence: row.get(14)?,
        label_method: row.get(15)?,
        error_message: row.get(16)?,
        created_at: row.get(17)?,
        updated_at: row.get(18)?,
    })
}

impl RawClip {
    fn into_record(self) -> DbResult<ClipRecord> {
        let uuid = Uuid::parse_str(&self.uuid)
            .map_err(|e| DbError::corrupt(format!("bad clip uuid {:?}: {e}", self.uuid)))?;
        let status = ClipStatus::parse(&self.status)
            .ok_or_else(|| DbError::corrupt(format!("unknown clip status {:?}", self.status)))?;
        let label_method = LabelMethod::parse(&self.label_method)
            .ok_or_else(|| DbError::corrupt(format!("unknown label method {:?}", self.label_method)))?;

        Ok(ClipRecord {
            id: self.id,
            uuid,
            podcast_index_episode_id: self.podcast_index_episode_id,
            source_episode_url: self.source_episode_url,
            original_start_time: self.original_start_time,
            original_end_time: self.original_end_time,
            label: self.label,
            status,
            approved: self.approved,
            extracted: self.extracted,
            clip_filename: self.clip_filename,
            clip_duration: self.clip_duration,
            clip_size_bytes: self.clip_size_bytes,
            auto_labeled: self.auto_labeled,
            label_confidence: self.label_confidence,
            label_method,
            error_message: self.error_message,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

impl ClipRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a clip row with a fresh UUID.
    pub fn insert(&self, clip: &NewClip) -> DbResult<ClipRecord> {
        let conn = self.db.conn.lock().unwrap();
        let record = Self::insert_conn(&conn, clip)?;
        debug!(clip = %record.uuid, label = %record.label, "Inserted clip");
        Ok(record)
    }

    /// Insert a batch of detection candidates in one transaction.
    pub fn insert_batch(&self, clips: &[NewClip]) -> DbResult<Vec<ClipRecord>> {
        let mut conn = self.db.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut records = Vec::with_capacity(clips.len());
        for clip in clips {
            records.push(Self::insert_conn(&tx, clip)?);
        }
        tx.commit()?;
        Ok(records)
    }

    fn insert_conn(conn: &rusqlite::Connection, clip: &NewClip) -> DbResult<ClipRecord> {
        let uuid = Uuid::new_v4();
        let now = now_str();
        conn.execute(
            "INSERT INTO clips (uuid, podcast_index_episode_id, source_episode_url,
                                original_start_time, original_end_time, label, status,
                                approved, extracted, auto_labeled, label_confidence,
                                label_method, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?10, ?11, ?12, ?12)",
            params![
                uuid.to_string(),
                clip.podcast_index_episode_id,
                clip.source_episode_url,
                clip.original_start_time,
                clip.original_end_time,
                clip.label,
                clip.status.as_str(),
                clip.approved,
                clip.auto_labeled,
                clip.label_confidence,
                clip.label_method.as_str(),
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();
        conn.query_row(
            &format!("SELECT {CLIP_COLUMNS} FROM clips WHERE id = ?1"),
            params![id],
            raw_from_row,
        )?
        .into_record()
    }

    /// Fetch a clip by its external UUID.
    pub fn get_by_uuid(&self, uuid: &Uuid) -> DbResult<Option<ClipRecord>> {
        let conn = self.db.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {CLIP_COLUMNS} FROM clips WHERE uuid = ?1"),
            params![uuid.to_string()],
            raw_from_row,
        )
        .optional()?
        .map(RawClip::into_record)
        .transpose()
    }

    /// List clips newest first, with optional filters and paging.
    pub fn list(&self, filter: &ClipFilter) -> DbResult<Vec<ClipRecord>> {
        let limit = filter.limit.unwrap_or(100).clamp(1, MAX_LIST_LIMIT);
        let offset = filter.offset.unwrap_or(0);

        let mut sql = format!("SELECT {CLIP_COLUMNS} FROM clips WHERE 1=1");
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(episode_id) = filter.episode_id {
            args.push(Box::new(episode_id));
            sql.push_str(&format!(" AND podcast_index_episode_id = ?{}", args.len()));
        }
        if let Some(ref label) = filter.label {
            args.push(Box::new(label.clone()));
            sql.push_str(&format!(" AND label = ?{}", args.len()));
        }
        if let Some(status) = filter.status {
            args.push(Box::new(status.as_str().to_string()));
            sql.push_str(&format!(" AND status = ?{}", args.len()));
        }
        if let Some(approved) = filter.approved {
            args.push(Box::new(approved));
            sql.push_str(&format!(" AND approved = ?{}", args.len()));
        }

        args.push(Box::new(limit));
        sql.push_str(&format!(" ORDER BY created_at DESC, id DESC LIMIT ?{}", args.len()));
        args.push(Box::new(offset));
        sql.push_str(&format!(" OFFSET ?{}", args.len()));

        let conn = self.db.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(args.iter().map(|arg| arg.as_ref())),
            raw_from_row,
        )?;

        let mut clips = Vec::new();
        for raw in rows {
            clips.push(raw?.into_record()?);
        }
        Ok(clips)
    }

    /// All clips whose extracted audio is on disk.
    pub fn list_ready(&self) -> DbResult<Vec<ClipRecord>> {
        self.list(&ClipFilter {
            status: Some(ClipStatus::Ready),
            limit: Some(MAX_LIST_LIMIT),
            ..Default::default()
        })
    }

    /// Conditionally transition `uuid` from `from` to `to`.
    ///
    /// Returns false (without touching the row) when the clip is not in
    /// `from`; callers use that for idempotent handlers.
    pub fn transition(&self, uuid: &Uuid, from: ClipStatus, to: ClipStatus) -> DbResult<bool> {
        let conn = self.db.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE clips SET status = ?3, updated_at = ?4 WHERE uuid = ?1 AND status = ?2",
            params![uuid.to_string(), from.as_str(), to.as_str(), now_str()],
        )?;
        Ok(changed == 1)
    }

    /// Approve a detected clip, queueing it for extraction.
    pub fn approve(&self, uuid: &Uuid) -> DbResult<ClipRecord> {
        let conn = self.db.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE clips SET approved = 1, status = 'queued', updated_at = ?2
             WHERE uuid = ?1 AND status = 'detected'",
            params![uuid.to_string(), now_str()],
        )?;
        drop(conn);

        if changed == 0 {
            return match self.get_by_uuid(uuid)? {
                None => Err(DbError::not_found(format!("clip {uuid}"))),
                Some(clip) => Err(DbError::invalid_state(format!(
                    "clip {uuid} is {}; only detected clips can be approved",
                    clip.status
                ))),
            };
        }
        self.get_by_uuid(uuid)?
            .ok_or_else(|| DbError::not_found(format!("clip {uuid}")))
    }

    /// Record a successful extraction.
    pub fn mark_ready(
        &self,
        uuid: &Uuid,
        filename: &str,
        duration: f64,
        size_bytes: i64,
    ) -> DbResult<ClipRecord> {
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "UPDATE clips
             SET status = 'ready', extracted = 1, clip_filename = ?2, clip_duration = ?3,
                 clip_size_bytes = ?4, error_message = NULL, updated_at = ?5
             WHERE uuid = ?1",
            params![uuid.to_string(), filename, duration, size_bytes, now_str()],
        )?;
        drop(conn);
        self.get_by_uuid(uuid)?
            .ok_or_else(|| DbError::not_found(format!("clip {uuid}")))
    }

    /// Record a failed extraction.
    pub fn mark_failed(&self, uuid: &Uuid, error: &str) -> DbResult<()> {
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "UPDATE clips SET status = 'failed', error_message = ?2, updated_at = ?3
             WHERE uuid = ?1",
            params![uuid.to_string(), error, now_str()],
        )?;
        Ok(())
    }

    /// Update the label column.
    ///
    /// The caller owns moving any extracted file between label directories;
    /// see the clip service for the rename-then-update choreography.
    pub fn update_label(&self, uuid: &Uuid, label: &str) -> DbResult<ClipRecord> {
        let conn = self.db.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE clips SET label = ?2, updated_at = ?3 WHERE uuid = ?1",
            params![uuid.to_string(), label, now_str()],
        )?;
        drop(conn);
        if changed == 0 {
            return Err(DbError::not_found(format!("clip {uuid}")));
        }
        self.get_by_uuid(uuid)?
            .ok_or_else(|| DbError::not_found(format!("clip {uuid}")))
    }

    /// Delete the row. Returns whether a row existed.
    pub fn delete(&self, uuid: &Uuid) -> DbResult<bool> {
        let conn = self.db.conn.lock().unwrap();
        let changed = conn.execute(
            "DELETE FROM clips WHERE uuid = ?1",
            params![uuid.to_string()],
        )?;
        Ok(changed == 1)
    }
}
