/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! The file-tree export sink: hands each batch to a [`Target`] adapter that
//! owns the on-disk layout

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::{error::SinkError, Sink};
use crate::{item::Item, target::Target};

/// Writes one file per item through a [`Target`].
///
/// Writes are serialized behind a lock: concurrent source batches may export
/// into overlapping paths, and per-path exclusivity is easiest to guarantee
/// by letting one batch through at a time.
pub struct File {
	target: Arc<dyn Target>,
	output_dir: PathBuf,
	write_lock: Mutex<()>,
}

impl File {
	#[must_use]
	pub fn new(target: Arc<dyn Target>, output_dir: PathBuf) -> Self {
		Self {
			target,
			output_dir,
			write_lock: Mutex::new(()),
		}
	}

	#[must_use]
	pub fn output_dir(&self) -> &PathBuf {
		&self.output_dir
	}
}

#[async_trait]
impl Sink for File {
	fn name(&self) -> &'static str {
		"file"
	}

	async fn write(&self, ctx: &CancellationToken, items: &[Item]) -> Result<(), SinkError> {
		let _guard = self.write_lock.lock().await;

		if ctx.is_cancelled() {
			return Err(SinkError::Cancelled);
		}

		tracing::debug!(
			"Exporting {} items to {}",
			items.len(),
			self.output_dir.display()
		);

		self.target.export(items, &self.output_dir)
	}
}

impl std::fmt::Debug for File {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("File")
			.field("output_dir", &self.output_dir)
			.finish_non_exhaustive()
	}
}
