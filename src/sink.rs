/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`Sink`] trait - an output endpoint that accepts
//! a batch of items - and the built-in sinks: the [`file`](`file::File`)
//! export sink, the [`archive`](`archive::Archive`) sink, and the
//! [`vector`](`vector::Vector`) index sink

pub mod archive;
pub mod error;
pub mod file;
pub mod vector;

pub use self::{archive::Archive, file::File, vector::Vector};

use std::fmt::Debug;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use self::error::SinkError;
use crate::item::Item;

/// An async endpoint that a batch of items is written into.
///
/// Sinks receive batches by reference and must not mutate items. A sink must
/// be safe to call from several source tasks at once at the `write` entry
/// point; internal serialization (a single DB writer, per-path file locks) is
/// the sink's own business.
#[async_trait]
pub trait Sink: Debug + Send + Sync {
	/// A short stable name used in logs and reports
	fn name(&self) -> &'static str;

	/// Write the batch. Must abort promptly, releasing any open resources,
	/// when `ctx` is cancelled.
	///
	/// # Errors
	/// if the batch can't be persisted; the sync engine logs the error and
	/// carries on with the remaining sinks
	async fn write(&self, ctx: &CancellationToken, items: &[Item]) -> Result<(), SinkError>;

	/// Whether this sink needs `source:<name>` tags on incoming items.
	/// The sync engine force-enables tagging when any registered sink says so.
	fn wants_source_tags(&self) -> bool {
		false
	}
}
