/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! The top-level [`Error`] type that all fallible `gather` operations bubble
//! up into, plus [`ErrorChainExt`] for rendering a full cause chain

use std::error::Error as StdError;
use std::fmt::Write as _;

use crate::{
	archive::ArchiveError, config::ConfigError, datespec::DateSpecError, embed::EmbedError,
	sink::error::SinkError, source::error::SourceError, transform::TransformError,
	vector::VectorError,
};

/// Any error that can happen during a sync run or one of the store commands
#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("can't fetch items")]
	Source(#[from] SourceError),

	#[error("can't write items")]
	Sink(#[from] SinkError),

	#[error("transform pipeline failed")]
	Transform(#[from] TransformError),

	#[error("email archive error")]
	Archive(#[from] ArchiveError),

	#[error("vector store error")]
	Vector(#[from] VectorError),

	#[error("embedding error")]
	Embed(#[from] EmbedError),

	#[error("invalid configuration")]
	Config(#[from] ConfigError),

	#[error("invalid date spec")]
	DateSpec(#[from] DateSpecError),

	#[error("I/O error at {1:?}")]
	Io(#[source] std::io::Error, std::path::PathBuf),
}

/// Renders an error and all of its [`sources`](`StdError::source`) into a
/// single human-readable string
pub trait ErrorChainExt {
	/// Return a formatted string of the entire error chain, one cause per line
	fn display_chain(&self) -> String;
}

impl<T: StdError> ErrorChainExt for T {
	#[must_use]
	fn display_chain(&self) -> String {
		let mut current_err: &dyn StdError = self;
		let mut counter = 0;
		let mut output = format!("{current_err}");

		while let Some(source) = StdError::source(current_err) {
			current_err = source;
			counter += 1;
			if counter == 1 {
				let _ = write!(output, "\n\nCaused by:");
			}

			let _ = write!(output, "\n\t{counter}: {current_err}");
		}

		output
	}
}
