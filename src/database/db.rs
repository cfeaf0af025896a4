//! Database operations for the note review application
//!
//! Handles SQLite database initialization, the minimal note operations review tracking
//! depends on, and persistence of SM-2 review state.

use super::{ContentStore, ReviewQuery, ReviewStore};
use crate::error::{Result, ReviewError};
use crate::models::{Note, NoteSummary, ReviewState};
use chrono::{DateTime, Local};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS notes (
        id TEXT PRIMARY KEY,
        owner_id TEXT NOT NULL,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        source TEXT,
        created_at INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_notes_owner ON notes(owner_id);

    CREATE TABLE IF NOT EXISTS reviews (
        id TEXT NOT NULL UNIQUE,
        note_id TEXT NOT NULL UNIQUE,
        owner_id TEXT NOT NULL,
        easiness_factor REAL NOT NULL DEFAULT 2.5,
        interval_days INTEGER NOT NULL DEFAULT 1,
        repetitions INTEGER NOT NULL DEFAULT 0,
        next_review_at INTEGER NOT NULL,
        last_quality INTEGER,
        last_reviewed_at INTEGER,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        version INTEGER NOT NULL DEFAULT 1,
        FOREIGN KEY (note_id) REFERENCES notes(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_reviews_owner_due ON reviews(owner_id, next_review_at);
";

const REVIEW_COLUMNS: &str = "id, note_id, owner_id, easiness_factor, interval_days, repetitions,
     next_review_at, last_quality, last_reviewed_at, created_at, updated_at, version";

const SAMPLE_NOTES: [(&str, &str, Option<&str>); 3] = [
    (
        "Ownership",
        "Each value has a single owner; the value is dropped when the owner goes out of scope.",
        Some("The Rust Programming Language, ch. 4"),
    ),
    (
        "SM-2 easiness factor",
        "EF' = EF + (0.1 - (5 - q) * (0.08 + (5 - q) * 0.02)), never below 1.3.",
        Some("SuperMemo"),
    ),
    (
        "Zettelkasten",
        "Atomic notes linked to each other instead of filed into folders.",
        None,
    ),
];

/// SQLite-backed note and review store.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Opens (or creates) the database file and ensures the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), "Opened review database");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        // Cascading delete of review rows depends on this
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Creates a note owned by `owner_id`.
    pub fn create_note(
        &self,
        owner_id: &str,
        title: &str,
        content: serde_json::Value,
        source: Option<&str>,
        now: DateTime<Local>,
    ) -> Result<Note> {
        let note = Note {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            title: title.to_string(),
            content,
            source: source.map(str::to_string),
            created_at: now,
        };

        self.conn().execute(
            "INSERT INTO notes (id, owner_id, title, content, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                note.id,
                note.owner_id,
                note.title,
                serde_json::to_string(&note.content)?,
                note.source,
                note.created_at.timestamp_millis()
            ],
        )?;

        tracing::info!(note_id = %note.id, owner_id, "Note created");
        Ok(note)
    }

    pub fn get_note(&self, note_id: &str, owner_id: &str) -> Result<Option<Note>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, owner_id, title, content, source, created_at
                 FROM notes WHERE id = ?1 AND owner_id = ?2",
                params![note_id, owner_id],
                note_columns,
            )
            .optional()?;
        row.map(NoteColumns::into_note).transpose()
    }

    /// All notes of an owner, oldest first.
    pub fn list_notes(&self, owner_id: &str) -> Result<Vec<Note>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, title, content, source, created_at
             FROM notes WHERE owner_id = ?1
             ORDER BY created_at ASC, rowid ASC",
        )?;

        let rows = stmt
            .query_map(params![owner_id], note_columns)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(NoteColumns::into_note).collect()
    }

    /// Deletes an owner's note and its review state. Returns false if the owner has no such note.
    pub fn delete_note(&self, note_id: &str, owner_id: &str) -> Result<bool> {
        if self.find_item(note_id, owner_id)?.is_none() {
            return Ok(false);
        }
        self.delete_cascade(note_id)
    }

    /// Inserts demonstration notes if the owner has none yet. Returns how many were created.
    pub fn seed_sample_notes(&self, owner_id: &str, now: DateTime<Local>) -> Result<usize> {
        if !self.list_notes(owner_id)?.is_empty() {
            return Ok(0);
        }

        for (title, text, source) in SAMPLE_NOTES {
            let content = serde_json::json!({
                "type": "doc",
                "content": [{"type": "paragraph", "content": [{"type": "text", "text": text}]}]
            });
            self.create_note(owner_id, title, content, source, now)?;
        }
        Ok(SAMPLE_NOTES.len())
    }
}

impl ReviewStore for Database {
    fn get(&self, item_id: &str) -> Result<Option<ReviewState>> {
        let conn = self.conn();
        let state = conn
            .query_row(
                &format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE note_id = ?1"),
                params![item_id],
                review_from_row,
            )
            .optional()?;
        Ok(state)
    }

    fn upsert(&self, state: &ReviewState) -> Result<ReviewState> {
        let conn = self.conn();
        let mut stored = state.clone();
        stored.version = state.version + 1;

        if state.version == 0 {
            let inserted = conn.execute(
                &format!(
                    "INSERT INTO reviews ({REVIEW_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                params![
                    stored.id,
                    stored.item_id,
                    stored.owner_id,
                    stored.easiness_factor,
                    stored.interval_days,
                    stored.repetition_count,
                    stored.next_review_at.timestamp_millis(),
                    stored.last_quality,
                    stored.last_reviewed_at.map(|t| t.timestamp_millis()),
                    stored.created_at.timestamp_millis(),
                    stored.updated_at.timestamp_millis(),
                    stored.version
                ],
            );
            return match inserted {
                Ok(_) => Ok(stored),
                Err(e) => Err(constraint_error(e, &state.item_id)),
            };
        }

        let updated = conn.execute(
            "UPDATE reviews
             SET easiness_factor = ?1, interval_days = ?2, repetitions = ?3, next_review_at = ?4,
                 last_quality = ?5, last_reviewed_at = ?6, updated_at = ?7, version = ?8
             WHERE note_id = ?9 AND version = ?10",
            params![
                stored.easiness_factor,
                stored.interval_days,
                stored.repetition_count,
                stored.next_review_at.timestamp_millis(),
                stored.last_quality,
                stored.last_reviewed_at.map(|t| t.timestamp_millis()),
                stored.updated_at.timestamp_millis(),
                stored.version,
                stored.item_id,
                state.version
            ],
        )?;

        if updated == 0 {
            return Err(ReviewError::Conflict(format!(
                "review for note {} changed since version {}",
                state.item_id, state.version
            )));
        }
        Ok(stored)
    }

    fn delete(&self, item_id: &str) -> Result<bool> {
        let deleted = self
            .conn()
            .execute("DELETE FROM reviews WHERE note_id = ?1", params![item_id])?;
        Ok(deleted > 0)
    }

    fn query_by_owner(&self, query: &ReviewQuery) -> Result<Vec<ReviewState>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews
             WHERE owner_id = ?1 AND (?2 IS NULL OR next_review_at <= ?2)
             ORDER BY next_review_at ASC, rowid ASC"
        ))?;

        let due_by = query.due_by.map(|t| t.timestamp_millis());
        let states = stmt
            .query_map(params![query.owner_id, due_by], review_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        tracing::debug!(
            owner_id = %query.owner_id,
            due_by = ?query.due_by,
            count = states.len(),
            "Queried review states"
        );
        Ok(states)
    }
}

impl ContentStore for Database {
    fn find_item(&self, item_id: &str, owner_id: &str) -> Result<Option<NoteSummary>> {
        Ok(self
            .get_note(item_id, owner_id)?
            .map(|note| NoteSummary::from(&note)))
    }

    fn delete_cascade(&self, item_id: &str) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        // Explicit so the contract holds even if foreign keys were switched off
        tx.execute("DELETE FROM reviews WHERE note_id = ?1", params![item_id])?;
        let deleted = tx.execute("DELETE FROM notes WHERE id = ?1", params![item_id])?;
        tx.commit()?;

        if deleted > 0 {
            tracing::info!(note_id = item_id, "Note deleted");
        }
        Ok(deleted > 0)
    }
}

/// Raw note row; content is parsed outside the rusqlite row closure.
struct NoteColumns {
    id: String,
    owner_id: String,
    title: String,
    content: String,
    source: Option<String>,
    created_at: i64,
}

impl NoteColumns {
    fn into_note(self) -> Result<Note> {
        Ok(Note {
            id: self.id,
            owner_id: self.owner_id,
            title: self.title,
            content: serde_json::from_str(&self.content)?,
            source: self.source,
            created_at: millis_to_local(5, self.created_at)?,
        })
    }
}

fn note_columns(row: &Row<'_>) -> rusqlite::Result<NoteColumns> {
    Ok(NoteColumns {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        source: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<ReviewState> {
    let last_reviewed_at: Option<i64> = row.get(8)?;
    Ok(ReviewState {
        id: row.get(0)?,
        item_id: row.get(1)?,
        owner_id: row.get(2)?,
        easiness_factor: row.get(3)?,
        interval_days: row.get(4)?,
        repetition_count: row.get(5)?,
        next_review_at: millis_to_local(6, row.get(6)?)?,
        last_quality: row.get(7)?,
        last_reviewed_at: last_reviewed_at
            .map(|ms| millis_to_local(8, ms))
            .transpose()?,
        created_at: millis_to_local(9, row.get(9)?)?,
        updated_at: millis_to_local(10, row.get(10)?)?,
        version: row.get(11)?,
    })
}

fn millis_to_local(column: usize, millis: i64) -> rusqlite::Result<DateTime<Local>> {
    DateTime::from_timestamp_millis(millis)
        .map(|utc| utc.with_timezone(&Local))
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(column, millis))
}

/// Maps constraint failures on insert onto the review error taxonomy.
fn constraint_error(e: rusqlite::Error, item_id: &str) -> ReviewError {
    match e.sqlite_error().map(|err| err.extended_code) {
        Some(rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => {
            ReviewError::NotFound(format!("note {item_id} not found"))
        }
        Some(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE)
        | Some(rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY) => {
            ReviewError::Conflict(format!("review for note {item_id} already exists"))
        }
        _ => ReviewError::Database(e),
    }
}
