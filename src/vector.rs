/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`VectorStore`] - the semantic-search index.
//!
//! One dense vector per item (or per consolidated thread), persisted in
//! SQLite as little-endian f32 blobs. Dedup identity is the pair
//! `(source_name, thread_id)`: re-running indexing over the same inputs is a
//! no-op, and a thread's first-seen content wins until an explicit re-index.
//!
//! Search is a filtered scan with cosine scoring and a top-K min-heap; no
//! approximate index structure is worth the complexity at personal-corpus
//! sizes.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{
	embed::{EmbedError, Embedder},
	error::ErrorChainExt,
	item::Item,
	utils::truncate_utf8_safe,
};

const MAX_EMBED_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Characters of content embedded per document unless overridden; 0 disables
/// truncation
pub const DEFAULT_MAX_CONTENT_CHARS: usize = 30_000;

/// Partition for items that never got a `source:<name>` tag
const UNTAGGED_SOURCE: &str = "default";

/// An error from the vector store
#[derive(thiserror::Error, Debug)]
pub enum VectorError {
	#[error("vector database error")]
	Db(#[from] rusqlite::Error),

	#[error("embedding failed")]
	Embed(#[from] EmbedError),

	#[error("vector has {got} dimensions, store expects {expected}")]
	Dimensions { expected: usize, got: usize },

	#[error("indexing was cancelled")]
	Cancelled,
}

/// Indexing knobs; see [`VectorStore`]
#[derive(Clone, Debug)]
pub struct VectorConfig {
	/// Dimensionality of every stored vector
	pub dimensions: usize,

	/// Pause between embedding calls so local model runtimes aren't flooded
	pub embed_delay: Duration,

	/// Content is cut to this many bytes before embedding; 0 disables
	pub max_content_chars: usize,

	/// Replace already-indexed threads instead of skipping them
	pub reindex: bool,
}

impl VectorConfig {
	#[must_use]
	pub fn new(dimensions: usize) -> Self {
		Self {
			dimensions,
			embed_delay: Duration::ZERO,
			max_content_chars: DEFAULT_MAX_CONTENT_CHARS,
			reindex: false,
		}
	}
}

/// One persisted document row
#[derive(Clone, Debug)]
pub struct VectorRecord {
	pub id: String,
	pub thread_id: String,
	pub source_type: String,
	pub source_name: String,
	pub title: String,
	pub content: String,
	pub message_count: usize,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	pub metadata_json: String,
}

/// A search result with its cosine similarity
#[derive(Clone, Debug)]
pub struct ScoredDocument {
	pub record: VectorRecord,
	pub score: f32,
}

/// Optional narrowing of a search
#[derive(Clone, Debug, Default)]
pub struct SearchFilters {
	pub source_type: Option<String>,
	pub source_name: Option<String>,
	pub min_score: Option<f32>,
}

/// Aggregate numbers over the vector store
#[derive(Clone, Debug, Default)]
pub struct VectorStats {
	pub total_documents: u64,
	pub distinct_threads: u64,
	pub avg_messages_per_thread: f64,
	pub by_source: Vec<(String, u64)>,
	pub oldest: Option<DateTime<Utc>>,
	pub newest: Option<DateTime<Utc>>,
}

/// The dense-vector index with per-source dedup
pub struct VectorStore {
	conn: Mutex<Connection>,
	embedder: Arc<dyn Embedder>,
	cfg: VectorConfig,
}

impl VectorStore {
	/// Opens (creating if needed) the vector database at `db_path`
	///
	/// # Errors
	/// if the database can't be opened, or the embedder's dimensionality
	/// doesn't match the configured one
	pub fn open(
		db_path: &Path,
		embedder: Arc<dyn Embedder>,
		cfg: VectorConfig,
	) -> Result<Self, VectorError> {
		let conn = Connection::open(db_path)?;
		Self::with_connection(conn, embedder, cfg)
	}

	/// A store living entirely in memory, for tests
	///
	/// # Errors
	/// same as [`open`](`VectorStore::open`)
	pub fn open_in_memory(
		embedder: Arc<dyn Embedder>,
		cfg: VectorConfig,
	) -> Result<Self, VectorError> {
		let conn = Connection::open_in_memory()?;
		Self::with_connection(conn, embedder, cfg)
	}

	fn with_connection(
		conn: Connection,
		embedder: Arc<dyn Embedder>,
		cfg: VectorConfig,
	) -> Result<Self, VectorError> {
		if embedder.dimensions() != cfg.dimensions {
			return Err(VectorError::Dimensions {
				expected: cfg.dimensions,
				got: embedder.dimensions(),
			});
		}

		init_schema(&conn)?;

		Ok(Self {
			conn: Mutex::new(conn),
			embedder,
			cfg,
		})
	}

	/// The embedder this store indexes and queries with
	#[must_use]
	pub fn embedder(&self) -> &Arc<dyn Embedder> {
		&self.embedder
	}

	/// Thread ids already indexed for `source_name`
	///
	/// # Errors
	/// if the database can't be queried
	pub fn indexed_thread_ids(&self, source_name: &str) -> Result<HashSet<String>, VectorError> {
		let conn = self.conn.lock();

		let mut stmt = conn.prepare("SELECT thread_id FROM documents WHERE source_name = ?1")?;
		let ids = stmt
			.query_map(params![source_name], |row| row.get::<_, String>(0))?
			.collect::<Result<HashSet<_>, _>>()?;

		Ok(ids)
	}

	/// Embeds and persists every new item in `items`, returning how many
	/// documents were written.
	///
	/// Items are partitioned by their `source:<name>` tag; within a
	/// partition, an item whose thread id is already indexed is skipped
	/// unless re-indexing was requested. Cancellation stops the run after
	/// the current document; what was written stays written.
	///
	/// # Errors
	/// if embedding fails beyond the retry budget or the database rejects a
	/// write
	pub async fn write(
		&self,
		ctx: &CancellationToken,
		items: &[Item],
	) -> Result<usize, VectorError> {
		let mut written = 0;

		for (source_name, members) in partition_by_source(items) {
			let existing = if self.cfg.reindex {
				HashSet::new()
			} else {
				self.indexed_thread_ids(&source_name)?
			};

			let mut seen_in_batch: HashSet<String> = HashSet::new();

			for item in members {
				if ctx.is_cancelled() {
					tracing::debug!("Vector indexing cancelled, {written} documents written");
					return Ok(written);
				}

				let thread_id = item.thread_id().to_owned();

				if existing.contains(&thread_id) || !seen_in_batch.insert(thread_id.clone()) {
					tracing::trace!("Skipping already-indexed thread {thread_id}");
					continue;
				}

				let text = if item.content.is_empty() {
					&item.title
				} else {
					&item.content
				};
				let text = truncate_utf8_safe(text, self.cfg.max_content_chars);

				let vector = match self.embed_with_retry(ctx, text).await {
					Ok(vector) => vector,
					Err(VectorError::Cancelled) => return Ok(written),
					Err(e) => return Err(e),
				};

				written += self.persist(item, &thread_id, &source_name, text, &vector)?;

				if self.cfg.embed_delay > Duration::ZERO {
					sleep(self.cfg.embed_delay).await;
				}
			}
		}

		Ok(written)
	}

	/// Filtered top-K nearest-neighbor search by cosine similarity.
	///
	/// Results come back sorted by score descending; ties break by
	/// `updated_at` descending, then `id` ascending.
	///
	/// # Errors
	/// if the query vector has the wrong dimensionality or the scan fails
	pub fn search(
		&self,
		query: &[f32],
		k: usize,
		filters: &SearchFilters,
	) -> Result<Vec<ScoredDocument>, VectorError> {
		if query.len() != self.cfg.dimensions {
			return Err(VectorError::Dimensions {
				expected: self.cfg.dimensions,
				got: query.len(),
			});
		}

		if k == 0 {
			return Ok(Vec::new());
		}

		let conn = self.conn.lock();

		let mut stmt = conn.prepare(
			"SELECT id, thread_id, source_type, source_name, title, content,
				message_count, created_at, updated_at, metadata_json, vector
			FROM documents
			WHERE (?1 IS NULL OR source_type = ?1)
			  AND (?2 IS NULL OR source_name = ?2)",
		)?;

		let rows = stmt.query_map(
			params![filters.source_type, filters.source_name],
			|row| {
				Ok((
					VectorRecord {
						id: row.get(0)?,
						thread_id: row.get(1)?,
						source_type: row.get(2)?,
						source_name: row.get(3)?,
						title: row.get(4)?,
						content: row.get(5)?,
						message_count: row.get::<_, i64>(6)? as usize,
						created_at: parse_ts(&row.get::<_, String>(7)?),
						updated_at: parse_ts(&row.get::<_, String>(8)?),
						metadata_json: row.get(9)?,
					},
					row.get::<_, Vec<u8>>(10)?,
				))
			},
		)?;

		let min_score = filters.min_score.unwrap_or(f32::MIN);
		let mut heap: BinaryHeap<Reverse<Candidate>> = BinaryHeap::with_capacity(k + 1);

		for row in rows {
			let (record, blob) = row?;
			let vector = blob_to_vector(&blob);
			let score = cosine_similarity(query, &vector);

			if score < min_score {
				continue;
			}

			heap.push(Reverse(Candidate { score, record }));
			if heap.len() > k {
				heap.pop();
			}
		}

		Ok(heap
			.into_sorted_vec()
			.into_iter()
			.map(|Reverse(c)| ScoredDocument {
				score: c.score,
				record: c.record,
			})
			.collect())
	}

	/// Aggregate numbers over the whole store
	///
	/// # Errors
	/// if the database can't be queried
	pub fn stats(&self) -> Result<VectorStats, VectorError> {
		let conn = self.conn.lock();

		let (total, threads, avg, oldest, newest): (
			i64,
			i64,
			Option<f64>,
			Option<String>,
			Option<String>,
		) = conn.query_row(
			"SELECT COUNT(*), COUNT(DISTINCT thread_id), AVG(message_count),
				MIN(updated_at), MAX(updated_at)
			FROM documents",
			[],
			|row| {
				Ok((
					row.get(0)?,
					row.get(1)?,
					row.get(2)?,
					row.get(3)?,
					row.get(4)?,
				))
			},
		)?;

		let mut stmt = conn.prepare(
			"SELECT source_name, COUNT(*) FROM documents GROUP BY source_name ORDER BY source_name",
		)?;
		let by_source = stmt
			.query_map([], |row| {
				Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
			})?
			.collect::<Result<Vec<_>, _>>()?;

		Ok(VectorStats {
			total_documents: total as u64,
			distinct_threads: threads as u64,
			avg_messages_per_thread: avg.unwrap_or(0.0),
			by_source,
			oldest: oldest.as_deref().and_then(try_parse_ts),
			newest: newest.as_deref().and_then(try_parse_ts),
		})
	}

	/// Flushes and releases the database handle
	///
	/// # Errors
	/// if SQLite refuses to close cleanly
	pub fn close(self) -> Result<(), VectorError> {
		self.conn
			.into_inner()
			.close()
			.map_err(|(_conn, e)| VectorError::Db(e))
	}

	async fn embed_with_retry(
		&self,
		ctx: &CancellationToken,
		text: &str,
	) -> Result<Vec<f32>, VectorError> {
		let mut backoff = INITIAL_BACKOFF;
		let mut attempt = 1;

		loop {
			match self.embedder.embed(text).await {
				Ok(vector) => {
					if vector.len() != self.cfg.dimensions {
						return Err(VectorError::Dimensions {
							expected: self.cfg.dimensions,
							got: vector.len(),
						});
					}

					return Ok(vector);
				}
				Err(e) if e.is_retryable() && attempt < MAX_EMBED_ATTEMPTS => {
					tracing::warn!(
						"Embedding attempt {attempt}/{MAX_EMBED_ATTEMPTS} failed, retrying in {backoff:?}: {}",
						e.display_chain()
					);

					tokio::select! {
						() = ctx.cancelled() => return Err(VectorError::Cancelled),
						() = sleep(backoff) => {}
					}

					backoff *= 2;
					attempt += 1;
				}
				Err(e) => return Err(VectorError::Embed(e)),
			}
		}
	}

	fn persist(
		&self,
		item: &Item,
		thread_id: &str,
		source_name: &str,
		embedded_text: &str,
		vector: &[f32],
	) -> Result<usize, VectorError> {
		let conn = self.conn.lock();

		let sql = if self.cfg.reindex {
			"INSERT OR REPLACE INTO documents (
				id, thread_id, source_type, source_name, title, content,
				message_count, created_at, updated_at, metadata_json, vector
			) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
		} else {
			"INSERT INTO documents (
				id, thread_id, source_type, source_name, title, content,
				message_count, created_at, updated_at, metadata_json, vector
			) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
			ON CONFLICT DO NOTHING"
		};

		let changed = conn.execute(
			sql,
			params![
				item.id,
				thread_id,
				item.source_type,
				source_name,
				item.title,
				embedded_text,
				item.message_count() as i64,
				item.created_at.to_rfc3339(),
				item.updated_at.to_rfc3339(),
				serde_json::to_string(&item.metadata).unwrap_or_else(|_| "{}".to_owned()),
				vector_to_blob(vector),
			],
		)?;

		Ok(changed)
	}
}

impl std::fmt::Debug for VectorStore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("VectorStore")
			.field("cfg", &self.cfg)
			.field("embedder", &self.embedder)
			.finish_non_exhaustive()
	}
}

struct Candidate {
	score: f32,
	record: VectorRecord,
}

impl Candidate {
	/// Greater means "ranks higher in the results"
	fn ranking(&self, other: &Self) -> std::cmp::Ordering {
		self.score
			.total_cmp(&other.score)
			.then_with(|| self.record.updated_at.cmp(&other.record.updated_at))
			.then_with(|| other.record.id.cmp(&self.record.id))
	}
}

impl PartialEq for Candidate {
	fn eq(&self, other: &Self) -> bool {
		self.ranking(other) == std::cmp::Ordering::Equal
	}
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Candidate {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.ranking(other)
	}
}

fn partition_by_source(items: &[Item]) -> BTreeMap<String, Vec<&Item>> {
	let mut partitions: BTreeMap<String, Vec<&Item>> = BTreeMap::new();

	for item in items {
		let source = item
			.tags
			.iter()
			.find_map(|t| t.strip_prefix("source:"))
			.unwrap_or_else(|| {
				tracing::debug!("Item {} carries no source tag", item.id);
				UNTAGGED_SOURCE
			});

		partitions.entry(source.to_owned()).or_default().push(item);
	}

	partitions
}

fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
	conn.execute_batch(
		"PRAGMA journal_mode=WAL;
		PRAGMA synchronous=NORMAL;
		PRAGMA busy_timeout=5000;

		CREATE TABLE IF NOT EXISTS documents (
			id TEXT PRIMARY KEY,
			thread_id TEXT NOT NULL,
			source_type TEXT NOT NULL DEFAULT '',
			source_name TEXT NOT NULL,
			title TEXT NOT NULL DEFAULT '',
			content TEXT NOT NULL DEFAULT '',
			message_count INTEGER NOT NULL DEFAULT 1,
			created_at TEXT NOT NULL,
			updated_at TEXT NOT NULL,
			metadata_json TEXT NOT NULL DEFAULT '{}',
			vector BLOB NOT NULL,
			UNIQUE (source_name, thread_id)
		);
		CREATE INDEX IF NOT EXISTS idx_documents_source ON documents(source_name);
		CREATE INDEX IF NOT EXISTS idx_documents_type ON documents(source_type);",
	)
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
	try_parse_ts(raw).unwrap_or_default()
}

fn try_parse_ts(raw: &str) -> Option<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(raw)
		.ok()
		.map(|dt| dt.with_timezone(&Utc))
}

/// Encodes a vector as little-endian f32 bytes
#[must_use]
pub fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
	let mut bytes = Vec::with_capacity(vector.len() * 4);
	for value in vector {
		bytes.extend_from_slice(&value.to_le_bytes());
	}
	bytes
}

/// Decodes little-endian f32 bytes back into a vector
#[must_use]
pub fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
	blob.chunks_exact(4)
		.map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
		.collect()
}

/// Cosine similarity in [-1, 1]; 0 for mismatched or empty inputs
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
	if a.len() != b.len() || a.is_empty() {
		return 0.0;
	}

	let mut dot = 0.0f32;
	let mut norm_a = 0.0f32;
	let mut norm_b = 0.0f32;

	for (x, y) in a.iter().zip(b.iter()) {
		dot += x * y;
		norm_a += x * x;
		norm_b += y * y;
	}

	let norm = norm_a.sqrt() * norm_b.sqrt();
	if norm == 0.0 {
		0.0
	} else {
		dot / norm
	}
}
