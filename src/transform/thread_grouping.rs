/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`ThreadGrouping`] transform that gathers items
//! sharing a conversation id into thread containers (or a per-thread summary
//! selection), depending on the configured [`Mode`]

use std::collections::{BTreeMap, HashSet};

use serde::Deserialize;

use super::{content_cleanup::strip_reply_prefixes, Transform, TransformError};
use crate::item::Item;

const DEFAULT_SUMMARY_LIMIT: usize = 5;

/// Content longer than this counts as "long" when scoring summary candidates
const LONG_CONTENT_LEN: usize = 200;

/// How grouped items are emitted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
	/// Pass items through unchanged
	#[default]
	Individual,

	/// One container item per group with concatenated content
	Consolidated,

	/// At most N representative items per group
	Summary,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Options {
	mode: Mode,
	max_per_group: Option<usize>,
}

/// Groups items by `metadata.thread_id`; items without one are their own
/// group. Output ordering is deterministic by group key.
#[derive(Debug, Default)]
pub struct ThreadGrouping {
	opts: Options,
}

impl Transform for ThreadGrouping {
	fn name(&self) -> &'static str {
		"thread_grouping"
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

	fn transform(&self, items: Vec<Item>) -> Result<Vec<Item>, TransformError> {
		match self.opts.mode {
			Mode::Individual => Ok(items),
			Mode::Consolidated => Ok(consolidate(group_by_thread(items))),
			Mode::Summary => {
				let limit = self.opts.max_per_group.unwrap_or(DEFAULT_SUMMARY_LIMIT);
				Ok(summarize(group_by_thread(items), limit))
			}
		}
	}
}

/// Items keyed by thread id, in deterministic key order. Within a group the
/// source order is preserved.
fn group_by_thread(items: Vec<Item>) -> BTreeMap<String, Vec<Item>> {
	let mut groups: BTreeMap<String, Vec<Item>> = BTreeMap::new();

	for item in items {
		let key = item.thread_id().to_owned();
		groups.entry(key).or_default().push(item);
	}

	groups
}

fn consolidate(groups: BTreeMap<String, Vec<Item>>) -> Vec<Item> {
	let mut out = Vec::with_capacity(groups.len());

	for (key, mut members) in groups {
		if members.len() == 1 {
			out.extend(members);
			continue;
		}

		members.sort_by(|a, b| a.created_at.cmp(&b.created_at));

		let subject = strip_reply_prefixes(&members[0].title);
		let title = format!("{subject} ({}-items)", members.len());

		let mut thread = Item::new_thread(key, title);
		thread.source_type = members[0].source_type.clone();

		for member in members {
			thread.push_message(member);
		}

		thread.rebuild_content();
		out.push(thread);
	}

	out
}

fn summarize(groups: BTreeMap<String, Vec<Item>>, limit: usize) -> Vec<Item> {
	let mut out = Vec::new();

	for (_, mut members) in groups {
		members.sort_by(|a, b| a.created_at.cmp(&b.created_at));

		if members.len() <= limit || limit == 0 {
			out.extend(members);
			continue;
		}

		out.extend(select_representatives(members, limit));
	}

	out
}

/// Picks the first, the last, and the highest-scored middle items, keeping
/// chronological order
fn select_representatives(members: Vec<Item>, limit: usize) -> Vec<Item> {
	if limit == 1 {
		let mut members = members;
		members.truncate(1);
		return members;
	}

	let last_idx = members.len() - 1;
	let mut scored: Vec<(i64, usize)> = Vec::new();
	let mut seen_authors = HashSet::new();

	for (idx, member) in members.iter().enumerate() {
		let author = member
			.metadata
			.get("author")
			.or_else(|| member.metadata.get("from"))
			.and_then(serde_json::Value::as_str)
			.unwrap_or_default()
			.to_owned();

		let mut score = 0;
		if !author.is_empty() && seen_authors.insert(author) {
			score += 3;
		}
		if member.content.len() > LONG_CONTENT_LEN {
			score += 2;
		}
		if !member.attachments.is_empty() {
			score += 1;
		}

		if idx != 0 && idx != last_idx {
			scored.push((score, idx));
		}
	}

	// highest score first; earlier item wins a tie
	scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

	let mut chosen: Vec<usize> = vec![0, last_idx];
	chosen.extend(scored.iter().take(limit - 2).map(|(_, idx)| *idx));
	chosen.sort_unstable();

	let chosen: HashSet<usize> = chosen.into_iter().collect();

	members
		.into_iter()
		.enumerate()
		.filter(|(idx, _)| chosen.contains(idx))
		.map(|(_, item)| item)
		.collect()
}
