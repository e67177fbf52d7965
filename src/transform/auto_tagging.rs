/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`AutoTagging`] transform that applies
//! user-defined keyword rules plus the standard `source:`/`type:` tags

use serde::Deserialize;

use super::{Transform, TransformError};
use crate::item::Item;

/// A single tagging rule: a case-insensitive substring pattern and the tags
/// to append when it matches the item's title or content
#[derive(Clone, Debug, Deserialize)]
pub struct Rule {
	pub pattern: String,
	pub tags: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Options {
	rules: Vec<Rule>,
}

/// Tags items by keyword rules. `source:<source_type>` and `type:<item_type>`
/// are always appended when the respective field is non-empty.
#[derive(Debug, Default)]
pub struct AutoTagging {
	opts: Options,
}

impl Transform for AutoTagging {
	fn name(&self) -> &'static str {
		"auto_tagging"
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
			let haystack = format!("{} {}", item.title, item.content).to_lowercase();

			for rule in &self.opts.rules {
				if haystack.contains(&rule.pattern.to_lowercase()) {
					for tag in &rule.tags {
						item.add_tag(tag.clone());
					}
				}
			}

			if !item.source_type.is_empty() {
				item.add_tag(format!("source:{}", item.source_type));
			}

			if !item.item_type.is_empty() {
				item.add_tag(format!("type:{}", item.item_type));
			}
		}

		Ok(items)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn tagging(rules: serde_json::Value) -> AutoTagging {
		let mut tagging = AutoTagging::default();
		tagging
			.configure(&serde_json::json!({ "rules": rules }))
			.expect("valid options");
		tagging
	}

	#[test]
	fn matching_rule_appends_tags() {
		let tagging = tagging(serde_json::json!([
			{ "pattern": "standup", "tags": ["meeting", "recurring"] }
		]));

		let mut item = Item::new("id-1", "Weekly STANDUP notes");
		item.source_type = "calendar".to_owned();
		item.item_type = "event".to_owned();

		let out = tagging.transform(vec![item]).expect("should transform");

		assert_eq!(
			out[0].tags,
			["meeting", "recurring", "source:calendar", "type:event"]
		);
	}

	#[test]
	fn non_matching_rule_leaves_only_standard_tags() {
		let tagging = tagging(serde_json::json!([
			{ "pattern": "invoice", "tags": ["finance"] }
		]));

		let mut item = Item::new("id-1", "Lunch plans");
		item.source_type = "email".to_owned();

		let out = tagging.transform(vec![item]).expect("should transform");
		assert_eq!(out[0].tags, ["source:email"]);
	}

	#[test]
	fn tags_are_not_duplicated() {
		let tagging = tagging(serde_json::json!([
			{ "pattern": "a", "tags": ["dup"] },
			{ "pattern": "b", "tags": ["dup"] }
		]));

		let mut item = Item::new("id-1", "a b");
		item.add_tag("dup");

		let out = tagging.transform(vec![item]).expect("should transform");
		assert_eq!(out[0].tags, ["dup"]);
	}

	#[test]
	fn empty_type_fields_add_no_tags() {
		let tagging = tagging(serde_json::json!([]));

		let out = tagging
			.transform(vec![Item::new("id-1", "T")])
			.expect("should transform");

		assert!(out[0].tags.is_empty());
	}
}
