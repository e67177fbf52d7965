/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`ContentCleanup`] transform that normalizes raw
//! provider content: HTML bodies become markdown, reply prefixes are trimmed
//! off titles, and (optionally) quoted reply blocks and newline runs are
//! stripped

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::{html, Transform, TransformError};
use crate::item::Item;

/// Upper bound on title prefix stripping, guards against a pathological
/// `Re: Re: Re: ...` chain
const MAX_PREFIX_PASSES: usize = 10;

static REPLY_PREFIX: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^(?:Re|RE|Fwd|Fw):\s*").expect("static regex"));

static QUOTED_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*>").expect("static regex"));

static QUOTE_INTRO: Lazy<Regex> = Lazy::new(|| {
	Regex::new(r"^On .+ wrote:\s*$|^-----\s*Original Message\s*-----|^-+\s*Forwarded message\s*-+")
		.expect("static regex")
});

static NEWLINE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("static regex"));

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Options {
	strip_quoted_replies: bool,
	collapse_newlines: bool,
}

/// Normalizes titles and content of every item in the batch
#[derive(Debug, Default)]
pub struct ContentCleanup {
	opts: Options,
}

impl Transform for ContentCleanup {
	fn name(&self) -> &'static str {
		"content_cleanup"
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
			item.title = strip_reply_prefixes(&item.title);

			if html::looks_like_html(&item.content) {
				item.content = html::to_markdown(&item.content);
			}

			if self.opts.strip_quoted_replies {
				item.content = strip_quoted_replies(&item.content);
			}

			if self.opts.collapse_newlines {
				item.content = NEWLINE_RUN.replace_all(&item.content, "\n\n").into_owned();
			}
		}

		Ok(items)
	}
}

/// Iteratively trims `Re:`, `RE:`, `Fwd:` and `Fw:` prefixes off a title
#[must_use]
pub(crate) fn strip_reply_prefixes(title: &str) -> String {
	let mut current = title.trim();

	for _ in 0..MAX_PREFIX_PASSES {
		match REPLY_PREFIX.find(current) {
			Some(found) => current = current[found.end()..].trim_start(),
			None => break,
		}
	}

	current.to_owned()
}

fn strip_quoted_replies(content: &str) -> String {
	let mut kept = Vec::new();

	for line in content.lines() {
		// everything from a quote introduction onward is the quoted reply
		if QUOTE_INTRO.is_match(line) {
			break;
		}

		if QUOTED_LINE.is_match(line) {
			continue;
		}

		kept.push(line);
	}

	while kept.last().is_some_and(|l| l.trim().is_empty()) {
		kept.pop();
	}

	kept.join("\n")
}
