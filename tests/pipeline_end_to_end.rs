//! The whole built-in transform chain over one realistic email batch

use std::collections::HashMap;

use gather::{
	item::{Item, LinkKind},
	transform::{ErrorStrategy, Pipeline, Registry},
};

fn noisy_email() -> Item {
	let mut item = Item::new("m1", "Re: Fwd: RE: Quarterly roadmap");
	item.source_type = "email".to_owned();
	item.item_type = "message".to_owned();
	item.content = concat!(
		"<p>Hi all,</p>",
		"<p>the draft lives at <a href=\"https://docs.google.com/document/d/abc\">the doc</a>, ",
		"feedback by Friday please. Also see https://example.com/roadmap.</p>",
		"<p>Best regards,<br>Jane Doe</p>",
	)
	.to_owned();
	item
}

fn full_pipeline() -> Pipeline {
	let mut options = HashMap::new();
	options.insert(
		"content_cleanup".to_owned(),
		serde_json::json!({ "collapse_newlines": true }),
	);
	options.insert(
		"auto_tagging".to_owned(),
		serde_json::json!({ "rules": [{ "pattern": "roadmap", "tags": ["planning"] }] }),
	);
	options.insert(
		"filter".to_owned(),
		serde_json::json!({ "min_content_length": 10 }),
	);

	let order = [
		"content_cleanup",
		"signature_removal",
		"link_extraction",
		"auto_tagging",
		"filter",
	]
	.map(str::to_owned);

	Pipeline::from_registry(
		Registry::with_builtins(),
		&order,
		ErrorStrategy::FailFast,
		&options,
	)
	.expect("pipeline should assemble")
}

#[test]
fn noisy_email_comes_out_clean_tagged_and_linked() {
	let out = full_pipeline()
		.transform(vec![noisy_email()])
		.expect("should transform");

	assert_eq!(out.len(), 1);
	let item = &out[0];

	// title prefixes stripped all the way down
	assert_eq!(item.title, "Quarterly roadmap");

	// HTML became markdown and the signature is gone
	assert!(!item.content.contains('<'));
	assert!(item.content.contains("[the doc](https://docs.google.com/document/d/abc)"));
	assert!(!item.content.contains("Jane Doe"));
	assert!(!item.content.contains("Best regards"));

	// both links extracted, classified, deduplicated
	assert_eq!(item.links.len(), 2);
	let doc = item
		.links
		.iter()
		.find(|l| l.url.contains("docs.google.com"))
		.expect("doc link");
	assert_eq!(doc.kind, LinkKind::Document);
	assert_eq!(doc.title.as_deref(), Some("the doc"));

	let external = item
		.links
		.iter()
		.find(|l| l.url.contains("example.com"))
		.expect("external link");
	assert_eq!(external.kind, LinkKind::External);

	// rule tag plus the standard source/type tags
	assert!(item.tags.iter().any(|t| t == "planning"));
	assert!(item.tags.iter().any(|t| t == "source:email"));
	assert!(item.tags.iter().any(|t| t == "type:message"));
}

#[test]
fn filter_drops_what_cleanup_reduces_to_nothing() {
	let mut stub = Item::new("m2", "Re: ok");
	stub.source_type = "email".to_owned();
	stub.content = "<p>ok</p>".to_owned();

	let out = full_pipeline()
		.transform(vec![noisy_email(), stub])
		.expect("should transform");

	// the two-character reply is filtered out, the real mail survives
	assert_eq!(out.len(), 1);
	assert_eq!(out[0].id, "m1");
}
