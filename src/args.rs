/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use argh::FromArgs;

/// gather - multi-source personal knowledge sync
#[derive(FromArgs)]
pub struct Args {
	#[argh(subcommand)]
	pub inner: Subcommands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
pub enum Subcommands {
	Sync(Sync),
	Search(Search),
	VSearch(VSearch),
	Stats(Stats),
}

/// fetch from all configured sources and write to all configured sinks
#[derive(FromArgs)]
#[argh(subcommand, name = "sync")]
pub struct Sync {
	/// fetch items since this date spec (e.g. "7d", "yesterday"), overriding
	/// the config default
	#[argh(option)]
	pub since: Option<String>,

	/// cap on items per source, overriding the config default
	#[argh(option)]
	pub limit: Option<usize>,

	/// fetch and transform but only preview file operations
	#[argh(switch)]
	pub dry_run: bool,
}

/// full-text search over the email archive
#[derive(FromArgs)]
#[argh(subcommand, name = "search")]
pub struct Search {
	/// the query
	#[argh(positional)]
	pub query: String,

	/// maximum number of results
	#[argh(option, default = "10")]
	pub limit: usize,
}

/// semantic search over the vector store
#[derive(FromArgs)]
#[argh(subcommand, name = "vsearch")]
pub struct VSearch {
	/// the query
	#[argh(positional)]
	pub query: String,

	/// maximum number of results
	#[argh(option, default = "10")]
	pub limit: usize,

	/// only search documents from this source type
	#[argh(option)]
	pub source_type: Option<String>,

	/// drop results scoring below this cosine similarity
	#[argh(option)]
	pub min_score: Option<f32>,
}

/// print archive and vector store statistics
#[derive(FromArgs)]
#[argh(subcommand, name = "stats")]
pub struct Stats {}
