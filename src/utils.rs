/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Small helpers shared between modules

/// Longest allowed file stem produced by [`sanitize_filename`]
const MAX_FILENAME_LEN: usize = 100;

/// Truncates `s` to at most `max` bytes without splitting a UTF-8 code point.
/// `max == 0` disables truncation.
#[must_use]
pub(crate) fn truncate_utf8_safe(s: &str, max: usize) -> &str {
	if max == 0 || s.len() <= max {
		return s;
	}

	let mut end = max;
	while end > 0 && !s.is_char_boundary(end) {
		end -= 1;
	}

	&s[..end]
}

/// Deserializes an options value, treating JSON/YAML `null` (an options key
/// present with no body) as "all defaults"
pub(crate) fn opts_from_value<T>(opts: &serde_json::Value) -> Result<T, serde_json::Error>
where
	T: Default + serde::de::DeserializeOwned,
{
	if opts.is_null() {
		return Ok(T::default());
	}

	serde_json::from_value(opts.clone())
}

/// Turns an arbitrary title into a safe file stem: path-hostile characters
/// and whitespace become `-`, runs collapse, ends are trimmed
#[must_use]
pub(crate) fn sanitize_filename(title: &str) -> String {
	let mut out = String::with_capacity(title.len());
	let mut last_was_dash = true;

	for c in title.chars() {
		let mapped = match c {
			'/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
			c if c.is_whitespace() => '-',
			c if c.is_control() => '-',
			c => c,
		};

		if mapped == '-' {
			if !last_was_dash {
				out.push('-');
				last_was_dash = true;
			}
		} else {
			out.push(mapped);
			last_was_dash = false;
		}
	}

	while out.ends_with('-') {
		out.pop();
	}

	truncate_utf8_safe(&out, MAX_FILENAME_LEN).to_owned()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn truncation_respects_char_boundaries() {
		let s = "aéﬀ";

		assert_eq!(truncate_utf8_safe(s, 2), "a");
		assert_eq!(truncate_utf8_safe(s, 3), "aé");
		assert_eq!(truncate_utf8_safe(s, 0), s);
		assert_eq!(truncate_utf8_safe(s, 100), s);
	}

	#[test]
	fn filenames_lose_hostile_characters() {
		assert_eq!(sanitize_filename("a/b: c?"), "a-b-c");
		assert_eq!(sanitize_filename("  spaced   out  "), "spaced-out");
		assert_eq!(sanitize_filename("clean-name"), "clean-name");
	}

	#[test]
	fn long_filenames_are_truncated() {
		let long = "x".repeat(500);
		assert_eq!(sanitize_filename(&long).len(), MAX_FILENAME_LEN);
	}
}
