//! SQLite-backed mood history.
//!
//! One row per processed recording. Rows are written once by the pipeline and
//! afterwards only touched by user feedback.

use crate::emotion::{EmotionCategory, EmotionScores};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};

const LOG_TARGET: &str = "history";

pub const RATING_RANGE: std::ops::RangeInclusive<u8> = 1..=5;

#[derive(thiserror::Error, Debug)]
pub enum HistoryError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("score encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("entry {0} not found")]
    NotFound(i64),

    #[error("rating must be between 1 and 5, got {0}")]
    InvalidRating(u8),

    #[error("history store lock poisoned")]
    Poisoned,

    #[error("history task failed: {0}")]
    Task(String),
}

/// Everything the pipeline knows when it persists an interaction.
#[derive(Clone, Debug, PartialEq)]
pub struct NewRecord {
    pub timestamp: DateTime<Utc>,
    pub primary_emotion: EmotionCategory,
    pub scores: EmotionScores,
    pub confidence: f64,
    pub transcription: Option<String>,
    pub audio_duration: f64,
    pub reply: String,
    pub reply_audio: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub primary_emotion: EmotionCategory,
    pub emotion_scores: EmotionScores,
    pub confidence: f64,
    pub transcription: Option<String>,
    pub audio_duration: f64,
    pub ai_response: String,
    pub response_audio_path: Option<String>,
    pub user_rating: Option<u8>,
    pub user_notes: Option<String>,
}

pub struct HistoryStore {
    conn: Connection,
}

impl HistoryStore {
    /// Open (or create) the store at `path` in WAL mode.
    pub fn open(path: &Path) -> Result<Self, HistoryError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let store = Self::init(conn)?;
        tracing::info!(target: LOG_TARGET, path = %path.display(), "history store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, HistoryError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, HistoryError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS mood_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                primary_emotion TEXT NOT NULL,
                emotion_scores TEXT NOT NULL,
                confidence REAL NOT NULL,
                transcription TEXT,
                audio_duration REAL NOT NULL DEFAULT 0,
                ai_response TEXT NOT NULL,
                response_audio_path TEXT,
                user_rating INTEGER,
                user_notes TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_mood_timestamp ON mood_entries(timestamp);
            CREATE INDEX IF NOT EXISTS idx_mood_emotion ON mood_entries(primary_emotion);",
        )?;
        Ok(Self { conn })
    }

    pub fn insert(&self, record: &NewRecord) -> Result<HistoryRecord, HistoryError> {
        // stored with microsecond precision; hand back exactly what a read returns
        let timestamp = record.timestamp.trunc_subsecs(6);
        let scores_json = serde_json::to_string(&record.scores)?;
        self.conn.execute(
            "INSERT INTO mood_entries (timestamp, primary_emotion, emotion_scores, confidence,
                transcription, audio_duration, ai_response, response_audio_path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
                record.primary_emotion.as_str(),
                scores_json,
                record.confidence,
                record.transcription,
                record.audio_duration,
                record.reply,
                record.reply_audio,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::debug!(target: LOG_TARGET, id, emotion = %record.primary_emotion, "mood entry stored");

        Ok(HistoryRecord {
            id,
            timestamp,
            primary_emotion: record.primary_emotion,
            emotion_scores: record.scores,
            confidence: record.confidence,
            transcription: record.transcription.clone(),
            audio_duration: record.audio_duration,
            ai_response: record.reply.clone(),
            response_audio_path: record.reply_audio.clone(),
            user_rating: None,
            user_notes: None,
        })
    }

    pub fn get(&self, id: i64) -> Result<Option<HistoryRecord>, HistoryError> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM mood_entries WHERE id = ?1"),
                params![id],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Most recent entries first; ties on timestamp fall back to insertion order.
    pub fn recent(&self, limit: usize) -> Result<Vec<HistoryRecord>, HistoryError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM mood_entries ORDER BY timestamp DESC, id DESC LIMIT ?1"
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], record_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn record_feedback(
        &self,
        id: i64,
        rating: u8,
        notes: Option<&str>,
    ) -> Result<HistoryRecord, HistoryError> {
        if !RATING_RANGE.contains(&rating) {
            return Err(HistoryError::InvalidRating(rating));
        }
        let changed = self.conn.execute(
            "UPDATE mood_entries SET user_rating = ?1, user_notes = ?2 WHERE id = ?3",
            params![rating, notes, id],
        )?;
        if changed == 0 {
            return Err(HistoryError::NotFound(id));
        }
        self.get(id)?.ok_or(HistoryError::NotFound(id))
    }

    pub fn count(&self) -> Result<u64, HistoryError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM mood_entries", [], |row| row.get(0))?;
        Ok(n.max(0) as u64)
    }
}

const COLUMNS: &str = "id, timestamp, primary_emotion, emotion_scores, confidence, transcription, \
                       audio_duration, ai_response, response_audio_path, user_rating, user_notes";

fn conversion_error(col: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<HistoryRecord> {
    let timestamp: String = row.get(1)?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(1, e))?;
    let emotion: String = row.get(2)?;
    let scores: String = row.get(3)?;
    let emotion_scores: EmotionScores =
        serde_json::from_str(&scores).map_err(|e| conversion_error(3, e))?;

    Ok(HistoryRecord {
        id: row.get(0)?,
        timestamp,
        primary_emotion: EmotionCategory::parse_or_neutral(&emotion),
        emotion_scores,
        confidence: row.get(4)?,
        transcription: row.get(5)?,
        audio_duration: row.get(6)?,
        ai_response: row.get(7)?,
        response_audio_path: row.get(8)?,
        user_rating: row.get(9)?,
        user_notes: row.get(10)?,
    })
}

/// Thread-safe handle used from async code; every call runs on the blocking pool.
#[derive(Clone)]
pub struct SharedHistory {
    inner: Arc<Mutex<HistoryStore>>,
}

impl SharedHistory {
    pub fn new(store: HistoryStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    async fn with_store<T, F>(&self, f: F) -> Result<T, HistoryError>
    where
        T: Send + 'static,
        F: FnOnce(&HistoryStore) -> Result<T, HistoryError> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let store = inner.lock().map_err(|_| HistoryError::Poisoned)?;
            f(&store)
        })
        .await
        .map_err(|e| HistoryError::Task(e.to_string()))?
    }

    pub async fn insert(&self, record: NewRecord) -> Result<HistoryRecord, HistoryError> {
        self.with_store(move |s| s.insert(&record)).await
    }

    pub async fn get(&self, id: i64) -> Result<Option<HistoryRecord>, HistoryError> {
        self.with_store(move |s| s.get(id)).await
    }

    pub async fn recent(&self, limit: usize) -> Result<Vec<HistoryRecord>, HistoryError> {
        self.with_store(move |s| s.recent(limit)).await
    }

    pub async fn record_feedback(
        &self,
        id: i64,
        rating: u8,
        notes: Option<String>,
    ) -> Result<HistoryRecord, HistoryError> {
        self.with_store(move |s| s.record_feedback(id, rating, notes.as_deref()))
            .await
    }
}
