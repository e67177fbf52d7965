/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Content-addressed raw-message blob directory.
//!
//! One file per message under `<root>/<source>/<id>.eml`, addressed by the
//! provider's stable id rather than a content hash. Writes go through a
//! temporary sibling and a rename so a partially written blob never appears
//! under its final name.

use std::fs;
use std::path::{Path, PathBuf};

use crate::utils::sanitize_filename;

/// Where the blob for `(source, id)` lives under `root`
#[must_use]
pub fn path_for(root: &Path, source: &str, id: &str) -> PathBuf {
	root.join(sanitize_filename(source))
		.join(format!("{}.eml", sanitize_filename(id)))
}

/// Atomically writes a raw message blob, returning its final path and size
///
/// # Errors
/// if the directory can't be created or the file can't be written or renamed
pub fn write(root: &Path, source: &str, id: &str, bytes: &[u8]) -> std::io::Result<(PathBuf, u64)> {
	let path = path_for(root, source, id);

	let dir = path.parent().unwrap_or(root);
	fs::create_dir_all(dir)?;

	let tmp = path.with_extension("eml.tmp");
	fs::write(&tmp, bytes)?;
	fs::rename(&tmp, &path)?;

	Ok((path, bytes.len() as u64))
}
