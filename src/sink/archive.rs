/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! The email-archive sink: writes raw message blobs and index rows into an
//! [`ArchiveStore`] for every email item that carries its raw message

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::{error::SinkError, Sink};
use crate::{
	archive::{ArchiveRecord, ArchiveStore},
	item::Item,
};

/// Metadata key under which email sources stash the raw RFC-822 message
pub const METADATA_RAW_MESSAGE: &str = "raw_message";

/// Archives email items into blob storage plus the searchable index.
///
/// Non-email items, and email items whose source didn't provide the raw
/// message, pass through untouched. Items already archived are skipped via a
/// per-batch id prefetch.
pub struct Archive {
	store: Arc<ArchiveStore>,
}

impl Archive {
	#[must_use]
	pub fn new(store: Arc<ArchiveStore>) -> Self {
		Self { store }
	}
}

#[async_trait]
impl Sink for Archive {
	fn name(&self) -> &'static str {
		"archive"
	}

	async fn write(&self, ctx: &CancellationToken, items: &[Item]) -> Result<(), SinkError> {
		let candidates = items
			.iter()
			.filter(|item| item.source_type == "email")
			.filter(|item| item.metadata.contains_key(METADATA_RAW_MESSAGE))
			.collect::<Vec<_>>();

		if candidates.is_empty() {
			return Ok(());
		}

		let source_name = source_name_of(candidates[0]);
		let archived = self.store.archived_ids(&source_name)?;

		let mut indexed = 0u64;
		for item in candidates {
			if ctx.is_cancelled() {
				tracing::debug!("Archive write cancelled after {indexed} messages");
				break;
			}

			if archived.contains(&item.id) {
				continue;
			}

			self.archive_one(item, &source_name)?;
			indexed += 1;
		}

		if indexed > 0 {
			self.store
				.update_sync_state(&source_name, Utc::now(), indexed)?;
			tracing::info!("Archived {indexed} messages from {source_name}");
		}

		Ok(())
	}
}

impl Archive {
	fn archive_one(&self, item: &Item, source_name: &str) -> Result<(), SinkError> {
		let raw = item
			.metadata
			.get(METADATA_RAW_MESSAGE)
			.and_then(serde_json::Value::as_str)
			.unwrap_or(&item.content);

		let (blob_path, size_bytes) =
			self.store.write_blob(source_name, &item.id, raw.as_bytes())?;

		let record = ArchiveRecord {
			content_id: item.id.clone(),
			thread_id: Some(item.thread_id().to_owned()),
			rfc822_message_id: metadata_str(item, "rfc822_message_id"),
			subject: item.title.clone(),
			from: metadata_str(item, "from").unwrap_or_default(),
			to: metadata_list(item, "to"),
			cc: metadata_list(item, "cc"),
			sent_at: Some(item.created_at),
			archived_at: Utc::now(),
			labels: metadata_list(item, "labels"),
			blob_path,
			size_bytes,
			has_attachments: !item.attachments.is_empty(),
			source_name: source_name.to_owned(),
		};

		self.store.index(&record, &item.content)?;
		Ok(())
	}
}

fn source_name_of(item: &Item) -> String {
	item.tags
		.iter()
		.find_map(|t| t.strip_prefix("source:"))
		.map(str::to_owned)
		.unwrap_or_else(|| {
			if item.source_type.is_empty() {
				"default".to_owned()
			} else {
				item.source_type.clone()
			}
		})
}

fn metadata_str(item: &Item, key: &str) -> Option<String> {
	item.metadata
		.get(key)
		.and_then(serde_json::Value::as_str)
		.map(str::to_owned)
}

fn metadata_list(item: &Item, key: &str) -> Vec<String> {
	item.metadata
		.get(key)
		.and_then(serde_json::Value::as_array)
		.map(|values| {
			values
				.iter()
				.filter_map(serde_json::Value::as_str)
				.map(str::to_owned)
				.collect()
		})
		.unwrap_or_default()
}

impl std::fmt::Debug for Archive {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Archive").finish_non_exhaustive()
	}
}
