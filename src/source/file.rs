/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! A local-file source, mostly useful for re-importing previously exported
//! items and for wiring up test fixtures without a network provider

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{error::SourceError, Source};
use crate::{
	config::{ConfigError, SourceConfig},
	item::Item,
};

#[derive(Debug, Deserialize)]
struct Options {
	path: PathBuf,
}

/// Reads a JSON array of items from a file on disk
#[derive(Debug)]
pub struct File {
	path: PathBuf,
}

impl File {
	#[must_use]
	pub fn new(path: PathBuf) -> Self {
		Self { path }
	}

	/// Builds the source out of its config entry
	///
	/// # Errors
	/// if the options are missing the file path
	pub fn from_config(cfg: &SourceConfig) -> Result<Self, ConfigError> {
		let opts: Options = serde_json::from_value(cfg.options.clone())
			.map_err(|e| ConfigError::SourceOptions(cfg.name.clone(), e))?;

		Ok(Self::new(opts.path))
	}
}

#[async_trait]
impl Source for File {
	async fn fetch(
		&mut self,
		since: Option<DateTime<Utc>>,
		limit: Option<usize>,
	) -> Result<Vec<Item>, SourceError> {
		tracing::debug!("Reading items from {}", self.path.display());

		let raw = tokio::fs::read(&self.path)
			.await
			.map_err(|e| SourceError::FileRead(e, self.path.clone()))?;

		let mut items: Vec<Item> =
			serde_json::from_slice(&raw).map_err(|e| SourceError::Parse(Box::new(e)))?;

		if let Some(since) = since {
			items.retain(|item| item.updated_at > since);
		}

		if let Some(limit) = limit {
			items.truncate(limit);
		}

		Ok(items)
	}
}
