/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::path::PathBuf;

/// An error while fetching items from a provider.
///
/// Auth errors abort only the affected source; the sync engine records the
/// error and keeps the other sources running.
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
	#[error("authentication failed: {0}")]
	Auth(String),

	#[error("network error")]
	Network(#[source] Box<dyn std::error::Error + Send + Sync>),

	#[error("can't read source file {1:?}")]
	FileRead(#[source] std::io::Error, PathBuf),

	#[error("can't parse provider data")]
	Parse(#[source] Box<dyn std::error::Error + Send + Sync>),

	#[error("{0}")]
	Other(String),
}

impl SourceError {
	/// Whether this error means the operator has to re-authenticate
	#[must_use]
	pub fn is_auth(&self) -> bool {
		matches!(self, SourceError::Auth(_))
	}
}
