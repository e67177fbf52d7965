//! Thread consolidation through the pipeline and out to a file export

use std::collections::HashMap;

use chrono::{TimeZone, Utc};

use gather::{
	item::{Item, METADATA_THREAD_ID},
	target::{Markdown, PreviewAction, Target},
	transform::{ErrorStrategy, Pipeline, Registry},
};

fn message(id: &str, thread: Option<&str>, secs: i64, content: &str) -> Item {
	let mut item = Item::new(id, "Re: Quarterly planning");
	item.source_type = "email".to_owned();
	item.content = content.to_owned();
	item.created_at = Utc.timestamp_opt(secs, 0).single().expect("valid ts");
	item.updated_at = item.created_at;

	if let Some(thread) = thread {
		item.metadata
			.insert(METADATA_THREAD_ID.to_owned(), serde_json::json!(thread));
	}

	item
}

fn consolidating_pipeline() -> Pipeline {
	let mut options = HashMap::new();
	options.insert(
		"thread_grouping".to_owned(),
		serde_json::json!({ "mode": "consolidated" }),
	);

	Pipeline::from_registry(
		Registry::with_builtins(),
		&["thread_grouping".to_owned()],
		ErrorStrategy::FailFast,
		&options,
	)
	.expect("pipeline should assemble")
}

#[test]
fn consolidation_collapses_the_thread_and_keeps_the_stray() {
	let batch = vec![
		message("m2", Some("X"), 200, "second message"),
		message("m1", Some("X"), 100, "first message"),
		message("m3", Some("X"), 300, "third message"),
		message("solo", None, 400, "unrelated note"),
	];

	let out = consolidating_pipeline()
		.transform(batch)
		.expect("should transform");

	assert_eq!(out.len(), 2);

	let thread = out.iter().find(|i| i.is_thread()).expect("a container");
	assert_eq!(thread.id, "X");
	assert!(thread.title.contains("Quarterly planning"));
	assert!(thread.title.contains("3-items"));
	assert_eq!(thread.message_count(), 3);

	// content concatenated in chronological order
	let first = thread.content.find("first message").expect("first present");
	let second = thread.content.find("second message").expect("second present");
	let third = thread.content.find("third message").expect("third present");
	assert!(first < second && second < third);

	// container timestamps span the children
	assert_eq!(thread.created_at, Utc.timestamp_opt(100, 0).single().expect("ts"));
	assert_eq!(thread.updated_at, Utc.timestamp_opt(300, 0).single().expect("ts"));

	let solo = out.iter().find(|i| !i.is_thread()).expect("the stray");
	assert_eq!(solo.id, "solo");
	assert_eq!(solo.content, "unrelated note");
}

#[test]
fn consolidated_thread_exports_and_previews_cleanly() {
	let dir = tempfile::tempdir().expect("temp dir");
	let target = Markdown::default();

	let batch = vec![
		message("m1", Some("X"), 100, "first message"),
		message("m2", Some("X"), 200, "second message"),
		message("solo", None, 300, "unrelated note"),
	];

	let out = consolidating_pipeline()
		.transform(batch)
		.expect("should transform");

	// first contact: everything is a create
	let previews = target.preview(&out, dir.path());
	assert_eq!(previews.len(), 2);
	assert!(previews.iter().all(|p| p.action == PreviewAction::Create));
	assert!(previews.iter().all(|p| !p.conflict));

	target.export(&out, dir.path()).expect("export");

	// idempotent re-export: everything is a skip
	let previews = target.preview(&out, dir.path());
	assert!(previews.iter().all(|p| p.action == PreviewAction::Skip));

	// the thread file renders every message
	let thread_preview = previews
		.iter()
		.find(|p| p.proposed.contains("first message"))
		.expect("thread file");
	assert!(thread_preview.proposed.contains("second message"));

	// a drifted file on disk becomes an update with a conflict flag
	let drifted = &previews[0].path;
	std::fs::write(drifted, "hand-edited").expect("tamper");

	let previews = target.preview(&out, dir.path());
	let conflicted = previews
		.iter()
		.find(|p| p.path == *drifted)
		.expect("tampered file previewed");
	assert_eq!(conflicted.action, PreviewAction::Update);
	assert!(conflicted.conflict);
	assert_eq!(conflicted.existing.as_deref(), Some("hand-edited"));
}
