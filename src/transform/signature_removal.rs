/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`SignatureRemoval`] transform that drops email
//! signature blocks off the end of item content

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::{Transform, TransformError};
use crate::item::Item;

const DEFAULT_MAX_LINES: usize = 10;

/// The RFC 3676 signature delimiter: two dashes, optionally one trailing space
static DELIMITER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-- ?$").expect("static regex"));

static SIGN_OFF: Lazy<Regex> = Lazy::new(|| {
	Regex::new(r"(?i)^(?:best regards|kind regards|warm regards|regards|sincerely|thanks|thank you|many thanks|cheers|best|sent from my .+)[,.!]?\s*$")
		.expect("static regex")
});

static BARE_EMAIL: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^[\w.+-]+@[\w-]+(?:\.[\w-]+)+$").expect("static regex"));

static PHONE: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^\+?[\d][\d\s().-]{6,}$").expect("static regex"));

static TWO_WORD_NAME: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^[A-Z][a-z]+ [A-Z][a-z]+$").expect("static regex"));

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Options {
	max_lines: usize,
}

impl Default for Options {
	fn default() -> Self {
		Self {
			max_lines: DEFAULT_MAX_LINES,
		}
	}
}

/// Scans back at most `max_lines` lines from the end of each item's content
/// and drops everything from the first signature-looking line onward
#[derive(Debug, Default)]
pub struct SignatureRemoval {
	opts: Options,
}

impl Transform for SignatureRemoval {
	fn name(&self) -> &'static str {
		"signature_removal"
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
			item.content = remove_signature(&item.content, self.opts.max_lines);
		}

		Ok(items)
	}
}

fn is_signature_start(line: &str) -> bool {
	let line = line.trim_end();

	DELIMITER.is_match(line)
		|| SIGN_OFF.is_match(line)
		|| BARE_EMAIL.is_match(line.trim())
		|| PHONE.is_match(line.trim())
		|| TWO_WORD_NAME.is_match(line.trim())
}

fn remove_signature(content: &str, max_lines: usize) -> String {
	let lines = content.lines().collect::<Vec<_>>();
	let window_start = lines.len().saturating_sub(max_lines);

	let cut = lines
		.iter()
		.enumerate()
		.skip(window_start)
		.find(|(_, line)| is_signature_start(line))
		.map(|(i, _)| i);

	let Some(cut) = cut else {
		return content.to_owned();
	};

	let mut kept = lines[..cut].to_vec();
	while kept.last().is_some_and(|l| l.trim().is_empty()) {
		kept.pop();
	}

	kept.join("\n")
}
