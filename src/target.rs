/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`Target`] trait - the adapter between items and
//! a note-taking tool's on-disk layout - plus the [`Preview`] values a
//! dry-run produces instead of writing anything
//!
//! Vendor-specific targets (vault layouts, journal trees, per-tool front
//! matter dialects) live out of tree; the built-in [`Markdown`] target writes
//! one plain markdown file per item and is what the tests and the dry-run
//! plumbing exercise.

pub mod markdown;

pub use self::markdown::Markdown;

use std::fmt::Debug;
use std::path::{Path, PathBuf};

use crate::{config::ConfigError, item::Item, sink::error::SinkError};

/// What would happen to one file if the export ran
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreviewAction {
	/// The file doesn't exist yet
	Create,
	/// The file exists with different content
	Update,
	/// The file exists and already matches
	Skip,
}

/// A planned file operation produced by a dry run
#[derive(Clone, Debug)]
pub struct Preview {
	pub path: PathBuf,
	pub action: PreviewAction,
	pub proposed: String,
	pub existing: Option<String>,
	/// Set when the file exists with content that differs from what the
	/// export would write. Reported, never fatal.
	pub conflict: bool,
}

/// A file-export adapter for one note-taking tool
pub trait Target: Debug + Send + Sync {
	/// Apply target-specific options from the config file
	///
	/// # Errors
	/// if the options don't fit this target
	fn configure(&mut self, opts: &serde_json::Value) -> Result<(), ConfigError>;

	/// Write one file per item under `output_dir`
	///
	/// # Errors
	/// if a file can't be written
	fn export(&self, items: &[Item], output_dir: &Path) -> Result<(), SinkError>;

	/// Compute the file operations `export` would perform, without writing
	fn preview(&self, items: &[Item], output_dir: &Path) -> Vec<Preview>;

	/// Turn an item title into a safe file stem
	fn format_filename(&self, title: &str) -> String;

	/// The file extension this target writes, without the dot
	fn file_extension(&self) -> &'static str;
}
