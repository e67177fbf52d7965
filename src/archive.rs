/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`ArchiveStore`] - the durable email archive.
//!
//! Raw messages live as [`blobs`](`blob`) on disk; everything queryable
//! about them lives in a SQLite index with an FTS5 full-text table over
//! subject, body, and sender. The database runs in WAL mode: one writer,
//! many readers, and the store serializes its own writes internally.

pub mod blob;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use itertools::Itertools;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

/// An error from the email archive
#[derive(thiserror::Error, Debug)]
pub enum ArchiveError {
	#[error("archive database error")]
	Db(#[from] rusqlite::Error),

	#[error("can't write blob for {0}")]
	BlobWrite(String, #[source] std::io::Error),

	#[error("blob {0:?} vanished before it could be indexed")]
	MissingBlob(PathBuf),
}

/// Everything the index knows about one archived email.
/// The raw message itself lives at [`blob_path`](`ArchiveRecord::blob_path`).
#[derive(Clone, Debug)]
pub struct ArchiveRecord {
	/// The provider's stable id; the archive's primary key
	pub content_id: String,
	pub thread_id: Option<String>,
	pub rfc822_message_id: Option<String>,
	pub subject: String,
	pub from: String,
	pub to: Vec<String>,
	pub cc: Vec<String>,
	pub sent_at: Option<DateTime<Utc>>,
	pub archived_at: DateTime<Utc>,
	pub labels: Vec<String>,
	pub blob_path: PathBuf,
	pub size_bytes: u64,
	pub has_attachments: bool,
	pub source_name: String,
}

/// One full-text search hit, joined back to the index row for display
#[derive(Clone, Debug)]
pub struct SearchHit {
	pub content_id: String,
	pub subject: String,
	pub from: String,
	pub sent_at: Option<DateTime<Utc>>,
	pub source_name: String,
	pub blob_path: PathBuf,
}

/// Aggregate numbers over the archive
#[derive(Clone, Debug, Default)]
pub struct ArchiveStats {
	pub total: u64,
	pub by_source: Vec<(String, u64)>,
	pub oldest: Option<DateTime<Utc>>,
	pub newest: Option<DateTime<Utc>>,
}

/// The email archive: blob directory plus metadata/FTS index
pub struct ArchiveStore {
	conn: Mutex<Connection>,
	blob_root: PathBuf,
}

impl ArchiveStore {
	/// Opens (creating if needed) the archive index at `db_path` with blobs
	/// under `blob_root`
	///
	/// # Errors
	/// if the database can't be opened or migrated
	pub fn open(db_path: &Path, blob_root: PathBuf) -> Result<Self, ArchiveError> {
		let conn = Connection::open(db_path)?;
		init_schema(&conn)?;

		Ok(Self {
			conn: Mutex::new(conn),
			blob_root,
		})
	}

	/// An archive living entirely in memory, for tests
	///
	/// # Errors
	/// if the in-memory database can't be created
	pub fn open_in_memory(blob_root: PathBuf) -> Result<Self, ArchiveError> {
		let conn = Connection::open_in_memory()?;
		init_schema(&conn)?;

		Ok(Self {
			conn: Mutex::new(conn),
			blob_root,
		})
	}

	/// Atomically writes the raw message blob for `(source, id)` and returns
	/// its path and size
	///
	/// # Errors
	/// if the blob can't be written
	pub fn write_blob(
		&self,
		source: &str,
		id: &str,
		bytes: &[u8],
	) -> Result<(PathBuf, u64), ArchiveError> {
		blob::write(&self.blob_root, source, id, bytes)
			.map_err(|e| ArchiveError::BlobWrite(id.to_owned(), e))
	}

	/// Fast existence check by primary key
	///
	/// # Errors
	/// if the database can't be queried
	pub fn has(&self, content_id: &str) -> Result<bool, ArchiveError> {
		let conn = self.conn.lock();

		let found: Option<i64> = conn
			.query_row(
				"SELECT 1 FROM messages WHERE content_id = ?1",
				params![content_id],
				|row| row.get(0),
			)
			.optional()?;

		Ok(found.is_some())
	}

	/// Every content id already archived for `source_name`; the bulk dedup
	/// prefetch a sync run does before fetching bodies
	///
	/// # Errors
	/// if the database can't be queried
	pub fn archived_ids(&self, source_name: &str) -> Result<HashSet<String>, ArchiveError> {
		let conn = self.conn.lock();

		let mut stmt = conn.prepare("SELECT content_id FROM messages WHERE source_name = ?1")?;
		let ids = stmt
			.query_map(params![source_name], |row| row.get::<_, String>(0))?
			.collect::<Result<HashSet<_>, _>>()?;

		Ok(ids)
	}

	/// Upserts the index row for `record` and replaces its FTS row, in one
	/// transaction.
	///
	/// On conflict only `blob_path` and `archived_at` are refreshed; the
	/// immutable message fields stay as first written.
	///
	/// # Errors
	/// if `record.blob_path` doesn't point at an existing file, or the
	/// transaction fails
	pub fn index(&self, record: &ArchiveRecord, body_text: &str) -> Result<(), ArchiveError> {
		if !record.blob_path.is_file() {
			return Err(ArchiveError::MissingBlob(record.blob_path.clone()));
		}

		let mut conn = self.conn.lock();
		let tx = conn.transaction()?;

		tx.execute(
			"INSERT INTO messages (
				content_id, thread_id, rfc822_message_id, subject, from_addr,
				to_json, cc_json, sent_at, archived_at, labels_json,
				blob_path, size_bytes, has_attachments, source_name
			) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
			ON CONFLICT(content_id) DO UPDATE SET
				blob_path = excluded.blob_path,
				archived_at = excluded.archived_at",
			params![
				record.content_id,
				record.thread_id,
				record.rfc822_message_id,
				record.subject,
				record.from,
				serde_json::to_string(&record.to).unwrap_or_default(),
				serde_json::to_string(&record.cc).unwrap_or_default(),
				record.sent_at.map(|t| t.to_rfc3339()),
				record.archived_at.to_rfc3339(),
				serde_json::to_string(&record.labels).unwrap_or_default(),
				record.blob_path.to_string_lossy(),
				record.size_bytes as i64,
				record.has_attachments,
				record.source_name,
			],
		)?;

		let rowid: i64 = tx.query_row(
			"SELECT rowid FROM messages WHERE content_id = ?1",
			params![record.content_id],
			|row| row.get(0),
		)?;

		tx.execute("DELETE FROM messages_fts WHERE rowid = ?1", params![rowid])?;
		tx.execute(
			"INSERT INTO messages_fts (rowid, subject, body, sender) VALUES (?1, ?2, ?3, ?4)",
			params![rowid, record.subject, body_text, record.from],
		)?;

		tx.commit()?;
		Ok(())
	}

	/// Upserts the incremental-sync bookkeeping row for `source`,
	/// accumulating the message count
	///
	/// # Errors
	/// if the database can't be written
	pub fn update_sync_state(
		&self,
		source: &str,
		sync_time: DateTime<Utc>,
		delta_count: u64,
	) -> Result<(), ArchiveError> {
		let conn = self.conn.lock();

		conn.execute(
			"INSERT INTO sync_state (source_name, last_sync_at, message_count)
			VALUES (?1, ?2, ?3)
			ON CONFLICT(source_name) DO UPDATE SET
				last_sync_at = excluded.last_sync_at,
				message_count = sync_state.message_count + excluded.message_count",
			params![source, sync_time.to_rfc3339(), delta_count as i64],
		)?;

		Ok(())
	}

	/// The last recorded sync time for `source`, if any
	///
	/// # Errors
	/// if the database can't be queried
	pub fn last_sync(&self, source: &str) -> Result<Option<DateTime<Utc>>, ArchiveError> {
		let conn = self.conn.lock();

		let raw: Option<String> = conn
			.query_row(
				"SELECT last_sync_at FROM sync_state WHERE source_name = ?1",
				params![source],
				|row| row.get(0),
			)
			.optional()?;

		Ok(raw.as_deref().and_then(parse_ts))
	}

	/// Aggregate numbers over the whole archive
	///
	/// # Errors
	/// if the database can't be queried
	pub fn stats(&self) -> Result<ArchiveStats, ArchiveError> {
		let conn = self.conn.lock();

		let total: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;

		let mut stmt = conn.prepare(
			"SELECT source_name, COUNT(*) FROM messages GROUP BY source_name ORDER BY source_name",
		)?;
		let by_source = stmt
			.query_map([], |row| {
				Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
			})?
			.collect::<Result<Vec<_>, _>>()?;

		let (oldest, newest): (Option<String>, Option<String>) = conn.query_row(
			"SELECT MIN(sent_at), MAX(sent_at) FROM messages",
			[],
			|row| Ok((row.get(0)?, row.get(1)?)),
		)?;

		Ok(ArchiveStats {
			total: total as u64,
			by_source,
			oldest: oldest.as_deref().and_then(parse_ts),
			newest: newest.as_deref().and_then(parse_ts),
		})
	}

	/// Full-text search over subject, body, and sender, ranked by bm25
	///
	/// # Errors
	/// if the query can't be run
	pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ArchiveError> {
		let fts_query = phrase_quote(query);
		if fts_query.is_empty() {
			return Ok(Vec::new());
		}

		let conn = self.conn.lock();

		let mut stmt = conn.prepare(
			"SELECT m.content_id, m.subject, m.from_addr, m.sent_at, m.source_name, m.blob_path
			FROM messages_fts
			JOIN messages m ON m.rowid = messages_fts.rowid
			WHERE messages_fts MATCH ?1
			ORDER BY rank
			LIMIT ?2",
		)?;

		let hits = stmt
			.query_map(params![fts_query, limit as i64], |row| {
				Ok(SearchHit {
					content_id: row.get(0)?,
					subject: row.get(1)?,
					from: row.get(2)?,
					sent_at: row.get::<_, Option<String>>(3)?.as_deref().and_then(parse_ts),
					source_name: row.get(4)?,
					blob_path: PathBuf::from(row.get::<_, String>(5)?),
				})
			})?
			.collect::<Result<Vec<_>, _>>()?;

		Ok(hits)
	}

	/// Flushes and releases the database handle
	///
	/// # Errors
	/// if SQLite refuses to close cleanly
	pub fn close(self) -> Result<(), ArchiveError> {
		self.conn
			.into_inner()
			.close()
			.map_err(|(_conn, e)| ArchiveError::Db(e))
	}
}

impl std::fmt::Debug for ArchiveStore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ArchiveStore")
			.field("blob_root", &self.blob_root)
			.finish_non_exhaustive()
	}
}

fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
	conn.execute_batch(
		"PRAGMA journal_mode=WAL;
		PRAGMA synchronous=NORMAL;
		PRAGMA busy_timeout=5000;

		CREATE TABLE IF NOT EXISTS messages (
			content_id TEXT PRIMARY KEY,
			thread_id TEXT,
			rfc822_message_id TEXT,
			subject TEXT NOT NULL DEFAULT '',
			from_addr TEXT NOT NULL DEFAULT '',
			to_json TEXT NOT NULL DEFAULT '[]',
			cc_json TEXT NOT NULL DEFAULT '[]',
			sent_at TEXT,
			archived_at TEXT NOT NULL,
			labels_json TEXT NOT NULL DEFAULT '[]',
			blob_path TEXT NOT NULL,
			size_bytes INTEGER NOT NULL DEFAULT 0,
			has_attachments INTEGER NOT NULL DEFAULT 0,
			source_name TEXT NOT NULL DEFAULT ''
		);
		CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(thread_id);
		CREATE INDEX IF NOT EXISTS idx_messages_sent ON messages(sent_at);
		CREATE INDEX IF NOT EXISTS idx_messages_source ON messages(source_name);

		CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
			subject,
			body,
			sender,
			tokenize='porter unicode61'
		);

		CREATE TABLE IF NOT EXISTS sync_state (
			source_name TEXT PRIMARY KEY,
			last_sync_at TEXT NOT NULL,
			message_count INTEGER NOT NULL DEFAULT 0
		);",
	)
}

fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(raw)
		.ok()
		.map(|dt| dt.with_timezone(&Utc))
}

/// Quotes each whitespace-separated term so raw user input can't break FTS5
/// query syntax; terms are implicitly AND-ed
fn phrase_quote(query: &str) -> String {
	query
		.split_whitespace()
		.map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
		.join(" ")
}
