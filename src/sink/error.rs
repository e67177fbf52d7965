/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::path::PathBuf;

/// An error while writing a batch into a sink. Isolated per sink: one sink
/// failing never stops the others from seeing the batch.
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
	#[error("can't write file {1:?}")]
	FileWrite(#[source] std::io::Error, PathBuf),

	#[error("email archive rejected the batch")]
	Archive(#[from] crate::archive::ArchiveError),

	#[error("vector store rejected the batch")]
	Vector(#[from] crate::vector::VectorError),

	#[error("write was cancelled mid-batch")]
	Cancelled,
}
