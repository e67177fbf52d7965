/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`SyncEngine`] - the orchestrator that fans
//! items out from N sources to M sinks.
//!
//! Sources fetch in parallel under a bounded concurrency cap; each source's
//! batch is tagged, run through the pipeline, and handed to every sink in
//! registration order. One source failing - or one sink failing - never
//! stops the rest of the run. Cancellation is cooperative and is reported as
//! partial success, not as an error.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::{
	error::{Error, ErrorChainExt},
	item::Item,
	sink::Sink,
	source::Source,
	target::{Preview, Target},
	transform::Pipeline,
};

/// Hard upper bound on any single source's row limit; out-of-range requests
/// are capped with a warning
pub const MAX_SOURCE_LIMIT: usize = 2500;

/// One source to sync: the provider plus its per-entry overrides.
/// Entry-level `since`/`limit` dominate the run-level defaults.
#[derive(Debug)]
pub struct SourceEntry {
	pub name: String,
	pub source: Box<dyn Source>,
	pub since: Option<DateTime<Utc>>,
	pub limit: Option<usize>,
}

impl SourceEntry {
	#[must_use]
	pub fn new(name: impl Into<String>, source: Box<dyn Source>) -> Self {
		Self {
			name: name.into(),
			source,
			since: None,
			limit: None,
		}
	}
}

/// Run-level options; see [`SyncEngine::run`]
#[derive(bon::Builder, Debug, Default)]
pub struct SyncOptions {
	/// Default cutoff for sources without their own
	pub since: Option<DateTime<Utc>>,

	/// Default row limit for sources without their own
	pub limit: Option<usize>,

	/// Cap on concurrently fetching sources; defaults to the source count
	pub concurrency: Option<usize>,

	/// Tag every item `source:<entry name>` before the pipeline. Forced on
	/// when any registered sink wants source tags.
	#[builder(default)]
	pub source_tags: bool,

	/// Fetch and transform, but preview instead of writing
	#[builder(default)]
	pub dry_run: bool,

	/// Where dry-run previews (and the file sink) point
	pub output_dir: Option<PathBuf>,
}

/// What happened to one source during a run
#[derive(Debug)]
pub struct SourceResult {
	pub name: String,
	pub item_count: usize,
	pub error: Option<Error>,
	/// The source was skipped or cut short by cancellation
	pub cancelled: bool,
}

impl SourceResult {
	fn skipped(name: String) -> Self {
		Self {
			name,
			item_count: 0,
			error: None,
			cancelled: true,
		}
	}

	fn failed(name: String, error: Error) -> Self {
		Self {
			name,
			item_count: 0,
			error: Some(error),
			cancelled: false,
		}
	}
}

/// The aggregate outcome of one sync run
#[derive(Debug, Default)]
pub struct SyncReport {
	/// Per-source results, in the order the entries were given
	pub results: Vec<SourceResult>,

	/// Every item that made it through the pipeline, all sources together
	pub items: Vec<Item>,

	/// Planned file operations; only populated on a dry run
	pub previews: Vec<Preview>,
}

impl SyncReport {
	/// The sources that failed outright
	pub fn failures(&self) -> impl Iterator<Item = &SourceResult> {
		self.results.iter().filter(|r| r.error.is_some())
	}

	/// Whether every source failed; an all-failure run is what turns into a
	/// non-zero exit
	#[must_use]
	pub fn all_failed(&self) -> bool {
		!self.results.is_empty() && self.results.iter().all(|r| r.error.is_some())
	}
}

/// The sync orchestrator. Owns the pipeline and the sink list; sources come
/// in per run.
pub struct SyncEngine {
	pipeline: Pipeline,
	sinks: Vec<Arc<dyn Sink>>,
	target: Option<Arc<dyn Target>>,
}

impl SyncEngine {
	#[must_use]
	pub fn new(pipeline: Pipeline) -> Self {
		Self {
			pipeline,
			sinks: Vec::new(),
			target: None,
		}
	}

	/// Registers a sink; dispatch order is registration order
	pub fn add_sink(&mut self, sink: Arc<dyn Sink>) {
		self.sinks.push(sink);
	}

	/// Sets the target used for dry-run previews
	pub fn set_target(&mut self, target: Arc<dyn Target>) {
		self.target = Some(target);
	}

	/// Runs one sync pass: fetch every entry (bounded-parallel), tag,
	/// transform, and dispatch to every sink. Returns after all sources
	/// complete.
	#[tracing::instrument(skip_all, fields(sources = entries.len()))]
	pub async fn run(
		&self,
		entries: Vec<SourceEntry>,
		opts: &SyncOptions,
		ctx: &CancellationToken,
	) -> SyncReport {
		let tag_sources =
			opts.source_tags || self.sinks.iter().any(|sink| sink.wants_source_tags());
		let cap = opts.concurrency.unwrap_or(entries.len()).max(1);

		tracing::debug!("Syncing {} sources, {cap} at a time", entries.len());

		let mut outcomes = stream::iter(entries.into_iter().enumerate().map(|(idx, entry)| {
			async move { (idx, self.run_source(entry, opts, ctx, tag_sources).await) }
		}))
		.buffer_unordered(cap)
		.collect::<Vec<_>>()
		.await;

		// fan-in: restore the caller's entry order for reporting
		outcomes.sort_by_key(|(idx, _)| *idx);

		let mut report = SyncReport::default();
		for (_, (result, items, previews)) in outcomes {
			report.results.push(result);
			report.items.extend(items);
			report.previews.extend(previews);
		}

		report
	}

	async fn run_source(
		&self,
		entry: SourceEntry,
		opts: &SyncOptions,
		ctx: &CancellationToken,
		tag_sources: bool,
	) -> (SourceResult, Vec<Item>, Vec<Preview>) {
		let SourceEntry {
			name,
			mut source,
			since,
			limit,
		} = entry;

		if ctx.is_cancelled() {
			tracing::debug!("Skipping source {name}: sync cancelled");
			return (SourceResult::skipped(name), Vec::new(), Vec::new());
		}

		let since = since.or(opts.since);
		let limit = match limit.or(opts.limit) {
			Some(limit) if limit > MAX_SOURCE_LIMIT => {
				tracing::warn!(
					"Limit {limit} for source {name} is out of range, capping at {MAX_SOURCE_LIMIT}"
				);
				Some(MAX_SOURCE_LIMIT)
			}
			other => other,
		};

		let fetched = tokio::select! {
			() = ctx.cancelled() => {
				tracing::debug!("Fetch of source {name} cancelled");
				return (SourceResult::skipped(name), Vec::new(), Vec::new());
			}
			fetched = source.fetch(since, limit) => fetched,
		};

		let mut items = match fetched {
			Ok(items) => items,
			Err(e) => {
				tracing::warn!("Source {name} failed: {}", e.display_chain());
				return (SourceResult::failed(name, e.into()), Vec::new(), Vec::new());
			}
		};

		tracing::debug!("Source {name} returned {} items", items.len());

		if tag_sources {
			for item in &mut items {
				item.add_tag(format!("source:{name}"));
			}
		}

		let items = match self.pipeline.transform(items) {
			Ok(items) => items,
			Err(e) => {
				tracing::warn!(
					"Pipeline failed for source {name}: {}",
					e.display_chain()
				);
				return (SourceResult::failed(name, e.into()), Vec::new(), Vec::new());
			}
		};

		let mut previews = Vec::new();

		if opts.dry_run {
			if let (Some(target), Some(output_dir)) = (&self.target, &opts.output_dir) {
				previews = target.preview(&items, output_dir);
			}
		} else {
			for sink in &self.sinks {
				if ctx.is_cancelled() {
					tracing::debug!("Sink dispatch for source {name} cancelled");
					break;
				}

				if let Err(e) = sink.write(ctx, &items).await {
					tracing::warn!(
						"Sink {} failed for source {name}, continuing: {}",
						sink.name(),
						e.display_chain()
					);
				}
			}
		}

		let result = SourceResult {
			name,
			item_count: items.len(),
			error: None,
			cancelled: ctx.is_cancelled(),
		};

		(result, items, previews)
	}
}

impl std::fmt::Debug for SyncEngine {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SyncEngine")
			.field("pipeline", &self.pipeline)
			.field("sinks", &self.sinks.iter().map(|s| s.name()).collect::<Vec<_>>())
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use async_trait::async_trait;
	use parking_lot::Mutex;

	use crate::{sink::error::SinkError, source::error::SourceError};

	#[derive(Debug)]
	struct Fixed {
		items: Vec<Item>,
	}

	impl Fixed {
		fn of(count: usize) -> Self {
			Self {
				items: (0..count).map(|i| Item::new(format!("i{i}"), "t")).collect(),
			}
		}
	}

	#[async_trait]
	impl Source for Fixed {
		async fn fetch(
			&mut self,
			_since: Option<DateTime<Utc>>,
			_limit: Option<usize>,
		) -> Result<Vec<Item>, SourceError> {
			Ok(self.items.clone())
		}
	}

	#[derive(Debug)]
	struct AlwaysAuthFails;

	#[async_trait]
	impl Source for AlwaysAuthFails {
		async fn fetch(
			&mut self,
			_since: Option<DateTime<Utc>>,
			_limit: Option<usize>,
		) -> Result<Vec<Item>, SourceError> {
			Err(SourceError::Auth("token expired".to_owned()))
		}
	}

	#[derive(Debug, Default)]
	struct Counting {
		batches: Mutex<Vec<usize>>,
	}

	#[async_trait]
	impl Sink for Counting {
		fn name(&self) -> &'static str {
			"counting"
		}

		async fn write(
			&self,
			_ctx: &CancellationToken,
			items: &[Item],
		) -> Result<(), SinkError> {
			self.batches.lock().push(items.len());
			Ok(())
		}
	}

	fn engine_with(sink: Arc<dyn Sink>) -> SyncEngine {
		let mut engine = SyncEngine::new(Pipeline::disabled());
		engine.add_sink(sink);
		engine
	}

	#[tokio::test]
	async fn one_failing_source_does_not_stop_the_other() {
		let sink = Arc::new(Counting::default());
		let engine = engine_with(sink.clone());

		let entries = vec![
			SourceEntry::new("A", Box::new(Fixed::of(5))),
			SourceEntry::new("B", Box::new(AlwaysAuthFails)),
		];

		let report = engine
			.run(entries, &SyncOptions::default(), &CancellationToken::new())
			.await;

		assert_eq!(report.results.len(), 2);
		assert_eq!(report.results[0].name, "A");
		assert_eq!(report.results[0].item_count, 5);
		assert!(report.results[0].error.is_none());

		assert_eq!(report.results[1].name, "B");
		assert_eq!(report.results[1].item_count, 0);
		assert!(report.results[1].error.is_some());

		assert!(!report.all_failed());
		assert_eq!(report.items.len(), 5);
		assert_eq!(*sink.batches.lock(), vec![5]);
	}

	#[tokio::test]
	async fn entry_overrides_beat_run_defaults() {
		#[derive(Debug)]
		struct AssertsOverride;

		#[async_trait]
		impl Source for AssertsOverride {
			async fn fetch(
				&mut self,
				since: Option<DateTime<Utc>>,
				limit: Option<usize>,
			) -> Result<Vec<Item>, SourceError> {
				assert!(since.is_some(), "run-level since applies when entry has none");
				assert_eq!(limit, Some(7), "entry-level limit dominates");
				Ok(Vec::new())
			}
		}

		let engine = SyncEngine::new(Pipeline::disabled());

		let mut entry = SourceEntry::new("A", Box::new(AssertsOverride));
		entry.limit = Some(7);

		let opts = SyncOptions::builder().limit(500).since(Utc::now()).build();
		let report = engine
			.run(vec![entry], &opts, &CancellationToken::new())
			.await;

		assert!(report.results[0].error.is_none());
	}

	#[tokio::test]
	async fn out_of_range_limit_is_capped() {
		let engine = SyncEngine::new(Pipeline::disabled());

		// the cap is observable through the source's own eyes
		#[derive(Debug)]
		struct AssertsCap;

		#[async_trait]
		impl Source for AssertsCap {
			async fn fetch(
				&mut self,
				_since: Option<DateTime<Utc>>,
				limit: Option<usize>,
			) -> Result<Vec<Item>, SourceError> {
				assert_eq!(limit, Some(MAX_SOURCE_LIMIT));
				Ok(Vec::new())
			}
		}

		let opts = SyncOptions::builder().limit(999_999).build();
		let report = engine
			.run(
				vec![SourceEntry::new("A", Box::new(AssertsCap))],
				&opts,
				&CancellationToken::new(),
			)
			.await;

		assert!(report.results[0].error.is_none());
	}

	#[tokio::test]
	async fn source_tags_are_applied_before_sinks() {
		#[derive(Debug, Default)]
		struct AssertsTag;

		#[async_trait]
		impl Sink for AssertsTag {
			fn name(&self) -> &'static str {
				"asserts_tag"
			}

			async fn write(
				&self,
				_ctx: &CancellationToken,
				items: &[Item],
			) -> Result<(), SinkError> {
				assert!(items.iter().all(|i| i.tags.iter().any(|t| t == "source:A")));
				Ok(())
			}

			fn wants_source_tags(&self) -> bool {
				true
			}
		}

		// tagging forced on by the sink even though the option is off
		let engine = engine_with(Arc::new(AssertsTag));
		let report = engine
			.run(
				vec![SourceEntry::new("A", Box::new(Fixed::of(2)))],
				&SyncOptions::default(),
				&CancellationToken::new(),
			)
			.await;

		assert_eq!(report.results[0].item_count, 2);
	}

	#[tokio::test]
	async fn failing_sink_does_not_hide_items_from_the_next() {
		#[derive(Debug)]
		struct Broken;

		#[async_trait]
		impl Sink for Broken {
			fn name(&self) -> &'static str {
				"broken"
			}

			async fn write(
				&self,
				_ctx: &CancellationToken,
				_items: &[Item],
			) -> Result<(), SinkError> {
				Err(SinkError::Cancelled)
			}
		}

		let counting = Arc::new(Counting::default());
		let mut engine = SyncEngine::new(Pipeline::disabled());
		engine.add_sink(Arc::new(Broken));
		engine.add_sink(counting.clone());

		let report = engine
			.run(
				vec![SourceEntry::new("A", Box::new(Fixed::of(3)))],
				&SyncOptions::default(),
				&CancellationToken::new(),
			)
			.await;

		assert!(report.results[0].error.is_none());
		assert_eq!(*counting.batches.lock(), vec![3]);
	}

	#[tokio::test]
	async fn cancelled_run_skips_sources_and_reports_partial() {
		let sink = Arc::new(Counting::default());
		let engine = engine_with(sink.clone());

		let ctx = CancellationToken::new();
		ctx.cancel();

		let report = engine
			.run(
				vec![SourceEntry::new("A", Box::new(Fixed::of(5)))],
				&SyncOptions::default(),
				&ctx,
			)
			.await;

		assert!(report.results[0].cancelled);
		assert!(report.results[0].error.is_none());
		assert_eq!(report.items.len(), 0);
		assert!(sink.batches.lock().is_empty());
	}

	#[tokio::test]
	async fn dry_run_previews_instead_of_writing() {
		let dir = tempfile::tempdir().expect("temp dir");

		let sink = Arc::new(Counting::default());
		let mut engine = engine_with(sink.clone());
		engine.set_target(Arc::new(crate::target::Markdown::default()));

		let opts = SyncOptions::builder()
			.dry_run(true)
			.output_dir(dir.path().to_path_buf())
			.build();

		let report = engine
			.run(
				vec![SourceEntry::new("A", Box::new(Fixed::of(2)))],
				&opts,
				&CancellationToken::new(),
			)
			.await;

		assert_eq!(report.previews.len(), 2);
		assert!(sink.batches.lock().is_empty(), "dry run must not write");
		assert!(
			std::fs::read_dir(dir.path()).expect("read dir").next().is_none(),
			"dry run must not create files"
		);
	}
}
