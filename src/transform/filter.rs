/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`Filter`] transform that drops items the user
//! doesn't want exported. All configured conditions must hold for an item
//! to survive.

use serde::Deserialize;

use super::{Transform, TransformError};
use crate::item::Item;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Options {
	min_content_length: Option<usize>,
	exclude_source_types: Vec<String>,
	required_tags: Vec<String>,
}

/// Drops items by content length, source type, and required tags
#[derive(Debug, Default)]
pub struct Filter {
	opts: Options,
}

impl Filter {
	fn keeps(&self, item: &Item) -> bool {
		if let Some(min) = self.opts.min_content_length {
			if item.content.chars().count() < min {
				return false;
			}
		}

		if self
			.opts
			.exclude_source_types
			.iter()
			.any(|t| *t == item.source_type)
		{
			return false;
		}

		self.opts
			.required_tags
			.iter()
			.all(|required| item.tags.iter().any(|t| t == required))
	}
}

impl Transform for Filter {
	fn name(&self) -> &'static str {
		"filter"
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
		let before = items.len();
		items.retain(|item| self.keeps(item));

		let dropped = before - items.len();
		if dropped > 0 {
			tracing::debug!("Filtered out {dropped} of {before} items");
		}

		Ok(items)
	}
}
