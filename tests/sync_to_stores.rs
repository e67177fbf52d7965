//! End-to-end sync runs against real (in-memory) stores: source failure
//! isolation, archive indexing with full-text search, and vector dedup

use std::io::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use gather::{
	archive::ArchiveStore,
	embed::{Embedder as _, Hashed},
	item::{Item, METADATA_THREAD_ID},
	sink,
	source::{error::SourceError, File as FileSource, Source},
	target::Markdown,
	transform::Pipeline,
	vector::{SearchFilters, VectorConfig, VectorStore},
	SourceEntry, SyncEngine, SyncOptions,
};

#[derive(Debug)]
struct BrokenAuth;

#[async_trait]
impl Source for BrokenAuth {
	async fn fetch(
		&mut self,
		_since: Option<DateTime<Utc>>,
		_limit: Option<usize>,
	) -> Result<Vec<Item>, SourceError> {
		Err(SourceError::Auth("refresh token revoked".to_owned()))
	}
}

fn email(id: &str, subject: &str, body: &str, thread: Option<&str>, secs: i64) -> Item {
	let mut item = Item::new(id, subject);
	item.source_type = "email".to_owned();
	item.item_type = "message".to_owned();
	item.content = body.to_owned();
	item.created_at = Utc.timestamp_opt(secs, 0).single().expect("valid ts");
	item.updated_at = item.created_at;

	item.metadata.insert(
		"raw_message".to_owned(),
		serde_json::json!(format!("Subject: {subject}\n\n{body}")),
	);
	item.metadata
		.insert("from".to_owned(), serde_json::json!("alice@example.com"));

	if let Some(thread) = thread {
		item.metadata
			.insert(METADATA_THREAD_ID.to_owned(), serde_json::json!(thread));
	}

	item
}

fn fixture_file(items: &[Item]) -> tempfile::NamedTempFile {
	let mut file = tempfile::NamedTempFile::new().expect("temp file");
	file.write_all(&serde_json::to_vec(items).expect("items encode"))
		.expect("write fixture");
	file
}

#[tokio::test]
async fn two_sources_one_failure_all_stores() {
	let items = vec![
		email("m1", "Meeting notes for Q1 planning", "agenda and milestones", Some("T"), 100),
		email("m2", "Re: Meeting notes for Q1 planning", "sounds good to me", Some("T"), 200),
		email("m3", "Lunch order confirmation", "one caesar salad please", None, 300),
		email("m4", "Build broken on main", "the linker step fails", None, 400),
		email("m5", "Team offsite", "hotel is booked", None, 500),
	];
	let fixture = fixture_file(&items);

	let export_dir = tempfile::tempdir().expect("temp dir");
	let blob_dir = tempfile::tempdir().expect("temp dir");

	let archive = Arc::new(
		ArchiveStore::open_in_memory(blob_dir.path().to_path_buf()).expect("open archive"),
	);
	let vectors = Arc::new(
		VectorStore::open_in_memory(Arc::new(Hashed::new(16)), VectorConfig::new(16))
			.expect("open vectors"),
	);

	let mut engine = SyncEngine::new(Pipeline::disabled());
	engine.add_sink(Arc::new(sink::File::new(
		Arc::new(Markdown::default()),
		export_dir.path().to_path_buf(),
	)));
	engine.add_sink(Arc::new(sink::Archive::new(archive.clone())));
	engine.add_sink(Arc::new(sink::Vector::new(vectors.clone())));

	let entries = vec![
		SourceEntry::new(
			"A",
			Box::new(FileSource::new(fixture.path().to_path_buf())),
		),
		SourceEntry::new("B", Box::new(BrokenAuth)),
	];

	let report = engine
		.run(entries, &SyncOptions::default(), &CancellationToken::new())
		.await;

	// per-source isolation: A delivered, B failed, run succeeded overall
	assert_eq!(report.results.len(), 2);
	assert_eq!(report.results[0].name, "A");
	assert_eq!(report.results[0].item_count, 5);
	assert!(report.results[0].error.is_none());
	assert_eq!(report.results[1].name, "B");
	assert_eq!(report.results[1].item_count, 0);
	assert!(report.results[1].error.is_some());
	assert!(!report.all_failed());
	assert_eq!(report.items.len(), 5);

	// file sink: one file per item
	let exported = std::fs::read_dir(export_dir.path())
		.expect("read dir")
		.count();
	assert_eq!(exported, 5);

	// archive sink: everything indexed and searchable
	for id in ["m1", "m2", "m3", "m4", "m5"] {
		assert!(archive.has(id).expect("query"), "{id} should be archived");
	}

	let hits = archive.search("planning", 10).expect("search");
	assert!(hits.iter().any(|h| h.content_id == "m1"));

	let hits = archive.search("salad", 10).expect("search");
	assert_eq!(hits.len(), 1);
	assert_eq!(hits[0].content_id, "m3");

	// vector sink: m1 and m2 share thread T, so the store holds one document
	// for it (4 documents total, keyed by the forced source:A tag)
	let stats = vectors.stats().expect("stats");
	assert_eq!(stats.total_documents, 4);
	assert_eq!(stats.by_source, vec![("A".to_owned(), 4)]);

	let threads = vectors.indexed_thread_ids("A").expect("query");
	assert!(threads.contains("T"));
	assert!(threads.contains("m3"));
}

#[tokio::test]
async fn rerunning_a_sync_is_idempotent_per_store() {
	let items = vec![
		email("m1", "Subject one", "body one", Some("T"), 100),
		email("m2", "Subject two", "body two", None, 200),
	];
	let fixture = fixture_file(&items);

	let blob_dir = tempfile::tempdir().expect("temp dir");
	let archive = Arc::new(
		ArchiveStore::open_in_memory(blob_dir.path().to_path_buf()).expect("open archive"),
	);
	let vectors = Arc::new(
		VectorStore::open_in_memory(Arc::new(Hashed::new(16)), VectorConfig::new(16))
			.expect("open vectors"),
	);

	let mut engine = SyncEngine::new(Pipeline::disabled());
	engine.add_sink(Arc::new(sink::Archive::new(archive.clone())));
	engine.add_sink(Arc::new(sink::Vector::new(vectors.clone())));

	for _ in 0..2 {
		let entries = vec![SourceEntry::new(
			"A",
			Box::new(FileSource::new(fixture.path().to_path_buf())),
		)];

		let report = engine
			.run(entries, &SyncOptions::default(), &CancellationToken::new())
			.await;
		assert!(report.results[0].error.is_none());
	}

	assert_eq!(archive.stats().expect("stats").total, 2);
	assert_eq!(vectors.stats().expect("stats").total_documents, 2);
}

#[tokio::test]
async fn vector_search_finds_semantically_tagged_content() {
	let fixture = fixture_file(&[
		email("m1", "Kubernetes upgrade", "kubernetes cluster upgrade steps", None, 100),
		email("m2", "Cake", "birthday cake recipe", None, 200),
	]);

	let vectors = Arc::new(
		VectorStore::open_in_memory(Arc::new(Hashed::new(64)), VectorConfig::new(64))
			.expect("open vectors"),
	);

	let mut engine = SyncEngine::new(Pipeline::disabled());
	engine.add_sink(Arc::new(sink::Vector::new(vectors.clone())));

	let report = engine
		.run(
			vec![SourceEntry::new(
				"A",
				Box::new(FileSource::new(fixture.path().to_path_buf())),
			)],
			&SyncOptions::default(),
			&CancellationToken::new(),
		)
		.await;
	assert_eq!(report.items.len(), 2);

	let query = vectors
		.embedder()
		.embed("kubernetes cluster upgrade steps")
		.await
		.expect("embed");

	let hits = vectors
		.search(&query, 1, &SearchFilters::default())
		.expect("search");

	assert_eq!(hits.len(), 1);
	assert_eq!(hits[0].record.id, "m1");
	assert!(hits[0].score > 0.9);
}
