/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! The semantic-index sink: embeds each batch into the [`VectorStore`].
//!
//! This sink is why `source:<name>` tagging exists - the store partitions and
//! dedups by that tag - so it answers `wants_source_tags` with `true` and the
//! sync engine force-enables tagging whenever it is registered.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{error::SinkError, Sink};
use crate::{item::Item, vector::VectorStore};

/// Embeds and indexes every new item in the batch
pub struct Vector {
	store: Arc<VectorStore>,
}

impl Vector {
	#[must_use]
	pub fn new(store: Arc<VectorStore>) -> Self {
		Self { store }
	}
}

#[async_trait]
impl Sink for Vector {
	fn name(&self) -> &'static str {
		"vector"
	}

	async fn write(&self, ctx: &CancellationToken, items: &[Item]) -> Result<(), SinkError> {
		let written = self.store.write(ctx, items).await?;

		if written > 0 {
			tracing::info!("Indexed {written} documents into the vector store");
		}

		Ok(())
	}

	fn wants_source_tags(&self) -> bool {
		true
	}
}

impl std::fmt::Debug for Vector {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Vector").finish_non_exhaustive()
	}
}
