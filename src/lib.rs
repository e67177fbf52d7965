/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! `gather` pulls items out of several remote knowledge sources (mail,
//! calendars, chats, cloud documents), normalizes them into a uniform
//! [`Item`](`item::Item`) model, runs them through a configurable
//! [`transform pipeline`](`transform::Pipeline`), and fans the result out to
//! durable sinks: file-tree exports, a full-text searchable
//! [`email archive`](`archive::ArchiveStore`), and a
//! [`vector index`](`vector::VectorStore`) for semantic search.

pub mod archive;
pub mod config;
pub mod datespec;
pub mod embed;
pub mod error;
pub mod identity;
pub mod item;
pub mod scaffold;
pub mod sink;
pub mod source;
pub mod sync;
pub mod target;
pub mod transform;
pub mod vector;

mod utils;

pub use crate::{
	error::Error,
	item::Item,
	sync::{SourceEntry, SourceResult, SyncEngine, SyncOptions, SyncReport},
};
