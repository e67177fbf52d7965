/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`LinkExtraction`] transform that lifts markdown
//! and bare URLs out of item content into the item's [`links`](`Item::links`)
//! list, classified by what they point at

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use url::Url;

use super::{Transform, TransformError};
use crate::item::{Item, Link, LinkKind};

static MARKDOWN_LINK: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"\[([^\]]*)\]\(([^)\s]+)\)").expect("static regex"));

static BARE_URL: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"https?://[^\s<>()\[\]]+").expect("static regex"));

const DOCUMENT_HOSTS: &[&str] = &[
	"docs.google.com",
	"drive.google.com",
	"dropbox.com",
	"www.dropbox.com",
];

const DOCUMENT_EXTENSIONS: &[&str] = &[
	".pdf", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp",
];

const MEETING_HOSTS: &[&str] = &[
	"zoom.us",
	"meet.google.com",
	"teams.microsoft.com",
];

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Options {
	extract_markdown: bool,
	extract_bare: bool,
}

impl Default for Options {
	fn default() -> Self {
		Self {
			extract_markdown: true,
			extract_bare: true,
		}
	}
}

/// Appends links found in content to each item, deduplicated by URL with the
/// first-seen title preserved. Internal anchors and relative paths are ignored.
#[derive(Debug, Default)]
pub struct LinkExtraction {
	opts: Options,
}

impl Transform for LinkExtraction {
	fn name(&self) -> &'static str {
		"link_extraction"
	}

	fn configure(&mut self, opts: &serde_json::Value) -> Result<(), TransformError> {
		self.opts = crate::utils::opts_from_value(opts).map_err(|source| {
			TransformError::InvalidOptions {
				name: self.name(),
				source,
			}
		})?;

		Ok(())
	}

	fn transform(&self, mut items: Vec<Item>) -> Result<Vec<Item>, TransformError> {
		for item in &mut items {
			let mut seen: HashSet<String> =
				item.links.iter().map(|l| l.url.clone()).collect();
			let mut found = Vec::new();

			if self.opts.extract_markdown {
				for caps in MARKDOWN_LINK.captures_iter(&item.content) {
					let title = caps[1].trim();
					let url = caps[2].trim();

					push_link(
						&mut found,
						&mut seen,
						url,
						(!title.is_empty()).then(|| title.to_owned()),
					);
				}
			}

			if self.opts.extract_bare {
				for found_url in BARE_URL.find_iter(&item.content) {
					let url = found_url.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?']);
					push_link(&mut found, &mut seen, url, None);
				}
			}

			item.links.extend(found);
		}

		Ok(items)
	}
}

fn push_link(
	found: &mut Vec<Link>,
	seen: &mut HashSet<String>,
	url: &str,
	title: Option<String>,
) {
	let Some(kind) = classify(url) else {
		return;
	};

	if !seen.insert(url.to_owned()) {
		return;
	}

	found.push(Link {
		url: url.to_owned(),
		title,
		kind,
	});
}

/// Classifies an extracted URL; `None` means "not a link worth keeping",
/// i.e. internal anchors and relative paths
fn classify(raw: &str) -> Option<LinkKind> {
	if raw.starts_with('#')
		|| raw.starts_with('/')
		|| raw.starts_with("./")
		|| raw.starts_with("../")
	{
		return None;
	}

	let url = Url::parse(raw).ok()?;
	if !matches!(url.scheme(), "http" | "https") {
		return None;
	}

	let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
	let path = url.path().to_ascii_lowercase();

	if DOCUMENT_HOSTS.iter().any(|h| host == *h)
		|| DOCUMENT_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
	{
		return Some(LinkKind::Document);
	}

	if MEETING_HOSTS
		.iter()
		.any(|h| host == *h || host.ends_with(&format!(".{h}")))
	{
		return Some(LinkKind::MeetingUrl);
	}

	Some(LinkKind::External)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn extract(content: &str) -> Vec<Link> {
		let mut item = Item::new("id-1", "T");
		item.content = content.to_owned();

		let out = LinkExtraction::default()
			.transform(vec![item])
			.expect("should transform");

		out.into_iter().next().expect("one item").links
	}

	#[test]
	fn repeated_url_is_extracted_once() {
		let links = extract("See https://a.com, and https://a.com again");

		assert_eq!(links.len(), 1);
		assert_eq!(links[0].url, "https://a.com");
	}

	#[test]
	fn markdown_title_wins_over_bare_duplicate() {
		let links = extract("[The site](https://a.com) and later https://a.com");

		assert_eq!(links.len(), 1);
		assert_eq!(links[0].title.as_deref(), Some("The site"));
	}

	#[test]
	fn document_urls_are_classified() {
		let links = extract("https://docs.google.com/document/d/abc and https://x.com/file.pdf");

		assert_eq!(links.len(), 2);
		assert!(links.iter().all(|l| l.kind == LinkKind::Document));
	}

	#[test]
	fn meeting_urls_are_classified() {
		let links = extract("join at https://us02.zoom.us/j/123");

		assert_eq!(links.len(), 1);
		assert_eq!(links[0].kind, LinkKind::MeetingUrl);
	}

	#[test]
	fn internal_anchors_are_ignored() {
		let links = extract("[jump](#section) [rel](./foo.md) [root](/bar)");
		assert!(links.is_empty());
	}

	#[test]
	fn existing_links_are_not_duplicated() {
		let mut item = Item::new("id-1", "T");
		item.content = "https://a.com".to_owned();
		item.links.push(Link {
			url: "https://a.com".to_owned(),
			title: Some("already here".to_owned()),
			kind: LinkKind::External,
		});

		let out = LinkExtraction::default()
			.transform(vec![item])
			.expect("should transform");

		assert_eq!(out[0].links.len(), 1);
	}

	#[test]
	fn trailing_punctuation_is_trimmed() {
		let links = extract("go to https://a.com/page.");
		assert_eq!(links[0].url, "https://a.com/page");
	}
}
