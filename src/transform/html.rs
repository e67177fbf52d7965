/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Small tag-level HTML to markdown normalizer used by
//! [`ContentCleanup`](`super::ContentCleanup`).
//!
//! This intentionally handles only the handful of constructs that show up in
//! email bodies and chat exports: anchors, emphasis, headings, list items,
//! breaks, and entity references. Full-fidelity conversion is an external
//! concern; a source that needs one plugs it in before items reach the
//! pipeline.

use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;

static TAG_PROBE: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"(?i)<\s*(?:html|head|body|div|p|br|a|span|table|b|i|strong|em|ul|ol|li|h[1-6])\b").expect("static regex"));

static ANCHOR: Lazy<Regex> = Lazy::new(|| {
	Regex::new(r#"(?is)<a\s+[^>]*href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a>"#).expect("static regex")
});

static HEADING: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"(?is)<h([1-6])[^>]*>(.*?)</h[1-6]>").expect("static regex"));

static BOLD: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"(?is)<(?:b|strong)[^>]*>(.*?)</(?:b|strong)>").expect("static regex"));

static ITALIC: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"(?is)<(?:i|em)[^>]*>(.*?)</(?:i|em)>").expect("static regex"));

static LIST_ITEM: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"(?is)<li[^>]*>(.*?)</li>").expect("static regex"));

static LINE_BREAK: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("static regex"));

static PARAGRAPH_END: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"(?i)</(?:p|div|tr|table|ul|ol|blockquote)>").expect("static regex"));

static DROPPED_BLOCK: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"(?is)<(?:style|script|head)[^>]*>.*?</(?:style|script|head)>").expect("static regex"));

static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").expect("static regex"));

/// Whether `text` looks like HTML rather than plain text or markdown
#[must_use]
pub fn looks_like_html(text: &str) -> bool {
	TAG_PROBE.is_match(text)
}

/// Converts tag-level HTML into markdown-flavored plain text
#[must_use]
pub fn to_markdown(html: &str) -> String {
	let text = DROPPED_BLOCK.replace_all(html, "");
	let text = ANCHOR.replace_all(&text, |caps: &regex::Captures<'_>| {
		let href = caps[1].trim();
		let label = ANY_TAG.replace_all(&caps[2], "");
		let label = label.trim();

		if label.is_empty() || label == href {
			href.to_owned()
		} else {
			format!("[{label}]({href})")
		}
	});
	let text = HEADING.replace_all(&text, |caps: &regex::Captures<'_>| {
		let level: usize = caps[1].parse().unwrap_or(1);
		format!("\n{} {}\n", "#".repeat(level), caps[2].trim())
	});
	let text = BOLD.replace_all(&text, "**$1**");
	let text = ITALIC.replace_all(&text, "*$1*");
	let text = LIST_ITEM.replace_all(&text, "\n- $1");
	let text = LINE_BREAK.replace_all(&text, "\n");
	let text = PARAGRAPH_END.replace_all(&text, "\n\n");
	let text = ANY_TAG.replace_all(&text, "");

	let decoded = html_escape::decode_html_entities(text.as_ref());

	// per-line trim keeps indentation artifacts from the original markup out
	let out = decoded.lines().map(str::trim_end).join("\n");
	out.trim().to_owned()
}
