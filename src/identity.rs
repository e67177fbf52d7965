/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`IdentityCache`] - the user-id to display-name
//! map chat sources share.
//!
//! Chat providers hand out opaque user ids; resolving each one costs an API
//! round-trip, so resolved names are cached in memory and persisted as JSON
//! per source. The cache marks itself dirty on mutation and is flushed once
//! at source teardown, not on every insert.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A persistent user-id to display-name map for one source
#[derive(Debug)]
pub struct IdentityCache {
	path: PathBuf,
	names: HashMap<String, String>,
	dirty: bool,
}

impl IdentityCache {
	/// Loads the cache at `path`; a missing file is an empty cache
	///
	/// # Errors
	/// if the file exists but can't be read or parsed
	pub fn load(path: &Path) -> Result<Self, crate::Error> {
		let names = match std::fs::read(path) {
			Ok(raw) => serde_json::from_slice(&raw)
				.map_err(|e| crate::Error::Io(e.into(), path.to_path_buf()))?,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
			Err(e) => return Err(crate::Error::Io(e, path.to_path_buf())),
		};

		Ok(Self {
			path: path.to_path_buf(),
			names,
			dirty: false,
		})
	}

	/// The cached display name for `user_id`, if any
	#[must_use]
	pub fn get(&self, user_id: &str) -> Option<&str> {
		self.names.get(user_id).map(String::as_str)
	}

	/// Caches a resolved display name; a no-op (and not a dirtying one) if
	/// the same mapping is already present
	pub fn insert(&mut self, user_id: impl Into<String>, name: impl Into<String>) {
		let user_id = user_id.into();
		let name = name.into();

		if self.names.get(&user_id) == Some(&name) {
			return;
		}

		self.names.insert(user_id, name);
		self.dirty = true;
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.names.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.names.is_empty()
	}

	/// Writes the cache back to disk if anything changed since loading
	///
	/// # Errors
	/// if the file can't be written
	pub fn flush(&mut self) -> Result<(), crate::Error> {
		if !self.dirty {
			return Ok(());
		}

		if let Some(dir) = self.path.parent() {
			std::fs::create_dir_all(dir)
				.map_err(|e| crate::Error::Io(e, self.path.clone()))?;
		}

		let raw = serde_json::to_vec_pretty(&self.names)
			.map_err(|e| crate::Error::Io(e.into(), self.path.clone()))?;

		std::fs::write(&self.path, raw).map_err(|e| crate::Error::Io(e, self.path.clone()))?;

		self.dirty = false;
		tracing::debug!(
			"Flushed {} identities to {}",
			self.names.len(),
			self.path.display()
		);

		Ok(())
	}
}
