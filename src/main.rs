/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

mod args;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use gather::{
	archive::ArchiveStore,
	config::{self, Config, ConfigError},
	datespec,
	embed::{self, Embedder},
	error::ErrorChainExt,
	item::Item,
	scaffold,
	sink,
	source::SourceRegistry,
	target::{Markdown, Target},
	transform::{Pipeline, Registry},
	vector::{SearchFilters, VectorConfig, VectorStore},
	Error, SourceEntry, SyncEngine, SyncOptions,
};

use crate::args::{Args, Subcommands};

#[tokio::main]
async fn main() -> ExitCode {
	scaffold::init();

	let args: Args = argh::from_env();

	match run(args).await {
		Ok(code) => code,
		Err(e) => {
			eprintln!("Error: {}", e.display_chain());
			ExitCode::FAILURE
		}
	}
}

async fn run(args: Args) -> Result<ExitCode, Error> {
	let config_dir = config::config_dir()?;
	let config = Config::load(&config_dir.join("config.yaml"))?;

	match args.inner {
		Subcommands::Sync(cmd) => run_sync(config, &config_dir, cmd).await,
		Subcommands::Search(cmd) => run_search(&config_dir, &cmd),
		Subcommands::VSearch(cmd) => run_vsearch(&config, &config_dir, &cmd).await,
		Subcommands::Stats(_) => run_stats(&config, &config_dir),
	}
}

async fn run_sync(
	config: Config,
	config_dir: &Path,
	cmd: args::Sync,
) -> Result<ExitCode, Error> {
	let registry = SourceRegistry::with_builtins();

	let mut entries = Vec::with_capacity(config.sources.len());
	let mut kind_of = Vec::new();

	for source_cfg in &config.sources {
		let source = registry.create(source_cfg)?;

		let mut entry = SourceEntry::new(source_cfg.name.clone(), source);
		entry.since = source_cfg
			.since
			.as_deref()
			.map(datespec::parse)
			.transpose()?;
		entry.limit = source_cfg.limit;

		kind_of.push((source_cfg.name.clone(), source_cfg.kind.clone()));
		entries.push(entry);
	}

	let pipeline = if config.pipeline.enabled && !config.pipeline.order.is_empty() {
		Pipeline::from_registry(
			Registry::with_builtins(),
			&config.pipeline.order,
			config.pipeline.strategy,
			&config.pipeline.options,
		)?
	} else {
		Pipeline::disabled()
	};

	let mut engine = SyncEngine::new(pipeline);
	let mut output_dir = None;
	let mut archive_store = None;

	if let Some(file_cfg) = &config.sinks.file {
		let target = build_target(&file_cfg.target, &file_cfg.options)?;
		output_dir = Some(file_cfg.output_dir.clone());
		engine.set_target(target.clone());
		engine.add_sink(Arc::new(sink::File::new(target, file_cfg.output_dir.clone())));
	}

	if let Some(archive_cfg) = &config.sinks.archive {
		let db_path = archive_cfg
			.db_path
			.clone()
			.unwrap_or_else(|| config_dir.join("archive.db"));
		let blob_dir = archive_cfg
			.blob_dir
			.clone()
			.unwrap_or_else(|| config_dir.join("archive").join("eml"));

		let store = Arc::new(ArchiveStore::open(&db_path, blob_dir)?);
		archive_store = Some(store.clone());
		engine.add_sink(Arc::new(sink::Archive::new(store)));
	}

	if let Some(vector_cfg) = &config.sinks.vector {
		let store = open_vector_store(vector_cfg, config_dir, false)?;
		engine.add_sink(Arc::new(sink::Vector::new(Arc::new(store))));
	}

	let since = match &cmd.since {
		Some(spec) => Some(datespec::parse(spec)?),
		None => config.sync.since.as_deref().map(datespec::parse).transpose()?,
	};

	let opts = SyncOptions {
		since,
		limit: cmd.limit.or(config.sync.limit),
		concurrency: config.sync.concurrency,
		source_tags: config.sync.source_tags,
		dry_run: cmd.dry_run,
		output_dir,
	};

	let ctx = CancellationToken::new();
	{
		let ctx = ctx.clone();
		tokio::spawn(async move {
			if tokio::signal::ctrl_c().await.is_ok() {
				tracing::info!("Interrupted, finishing the current batch");
				ctx.cancel();
			}
		});
	}

	let report = engine.run(entries, &opts, &ctx).await;
	drop(engine);

	// surface a clean close error instead of relying on Drop
	if let Some(store) = archive_store {
		if let Ok(store) = Arc::try_unwrap(store) {
			store.close()?;
		}
	}

	for failed in report.failures() {
		let chain = failed
			.error
			.as_ref()
			.map(ErrorChainExt::display_chain)
			.unwrap_or_default();

		eprintln!("Warning: {} - {chain}", failed.name);
	}

	if cmd.dry_run {
		for preview in &report.previews {
			let conflict = if preview.conflict { " (conflict)" } else { "" };
			println!(
				"{:?} {}{conflict}",
				preview.action,
				preview.path.display()
			);
		}
	}

	if report.all_failed() {
		let mut kinds = Vec::new();
		for failed in report.failures() {
			if let Some((_, kind)) = kind_of.iter().find(|(name, _)| *name == failed.name) {
				if !kinds.iter().any(|k| k == kind) {
					kinds.push(kind.clone());
				}
			}
		}

		eprintln!("sync failed for: {}", kinds.join(", "));
		return Ok(ExitCode::FAILURE);
	}

	println!(
		"Successfully exported {} {}",
		report.items.len(),
		kind_label(&report.items)
	);

	Ok(ExitCode::SUCCESS)
}

fn run_search(config_dir: &Path, cmd: &args::Search) -> Result<ExitCode, Error> {
	let store = ArchiveStore::open(
		&config_dir.join("archive.db"),
		config_dir.join("archive").join("eml"),
	)?;

	let hits = store.search(&cmd.query, cmd.limit)?;

	for hit in &hits {
		let sent = hit
			.sent_at
			.map(|t| t.format("%Y-%m-%d").to_string())
			.unwrap_or_else(|| "????-??-??".to_owned());

		println!("{sent}  {:30}  {} ({})", hit.from, hit.subject, hit.source_name);
	}

	println!("{} results", hits.len());
	store.close()?;

	Ok(ExitCode::SUCCESS)
}

async fn run_vsearch(
	config: &Config,
	config_dir: &Path,
	cmd: &args::VSearch,
) -> Result<ExitCode, Error> {
	let vector_cfg = config
		.sinks
		.vector
		.as_ref()
		.ok_or(ConfigError::MissingSection("sinks.vector"))?;

	let store = open_vector_store(vector_cfg, config_dir, false)?;
	let query = store.embedder().embed(&cmd.query).await.map_err(Error::Embed)?;

	let filters = SearchFilters {
		source_type: cmd.source_type.clone(),
		source_name: None,
		min_score: cmd.min_score,
	};

	let hits = store.search(&query, cmd.limit, &filters)?;

	for hit in &hits {
		println!(
			"{:.3}  {}  {} ({})",
			hit.score, hit.record.title, hit.record.thread_id, hit.record.source_name
		);
	}

	println!("{} results", hits.len());
	store.close()?;

	Ok(ExitCode::SUCCESS)
}

fn run_stats(config: &Config, config_dir: &Path) -> Result<ExitCode, Error> {
	let archive_db = config_dir.join("archive.db");
	if archive_db.exists() {
		let store = ArchiveStore::open(&archive_db, config_dir.join("archive").join("eml"))?;
		let stats = store.stats()?;

		println!("archive: {} messages", stats.total);
		for (source, count) in &stats.by_source {
			println!("  {source}: {count}");
		}
		if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
			println!("  range: {} .. {}", oldest.format("%Y-%m-%d"), newest.format("%Y-%m-%d"));
		}

		store.close()?;
	} else {
		println!("archive: empty");
	}

	match &config.sinks.vector {
		Some(vector_cfg) => {
			let store = open_vector_store(vector_cfg, config_dir, false)?;
			let stats = store.stats()?;

			println!(
				"vectors: {} documents across {} threads ({:.1} messages/thread)",
				stats.total_documents, stats.distinct_threads, stats.avg_messages_per_thread
			);
			for (source, count) in &stats.by_source {
				println!("  {source}: {count}");
			}

			store.close()?;
		}
		None => println!("vectors: not configured"),
	}

	Ok(ExitCode::SUCCESS)
}

fn build_target(
	name: &str,
	options: &serde_json::Value,
) -> Result<Arc<dyn Target>, ConfigError> {
	match name {
		"markdown" => {
			let mut target = Markdown::default();
			target.configure(options)?;
			Ok(Arc::new(target))
		}
		other => Err(ConfigError::UnknownTarget(other.to_owned())),
	}
}

fn open_vector_store(
	cfg: &gather::config::VectorSinkConfig,
	config_dir: &Path,
	reindex: bool,
) -> Result<VectorStore, Error> {
	let db_path: PathBuf = cfg
		.db_path
		.clone()
		.unwrap_or_else(|| config_dir.join("vectors.db"));

	let embedder: Arc<dyn Embedder> = match &cfg.endpoint {
		Some(endpoint) => Arc::new(embed::Http::new(
			endpoint.clone(),
			cfg.model.clone(),
			cfg.api_key.clone(),
			cfg.dimensions,
		)?),
		None => Arc::new(embed::Hashed::new(cfg.dimensions)),
	};

	let vector_cfg = VectorConfig {
		dimensions: cfg.dimensions,
		embed_delay: std::time::Duration::from_millis(cfg.embed_delay_ms),
		max_content_chars: cfg.max_content_chars,
		reindex,
	};

	Ok(VectorStore::open(&db_path, embedder, vector_cfg)?)
}

/// A human label for what was exported: the batch's predominant source type,
/// pluralized the way the providers talk about their items
fn kind_label(items: &[Item]) -> &'static str {
	let mut counts: Vec<(&str, usize)> = Vec::new();

	for item in items {
		match counts.iter_mut().find(|(kind, _)| *kind == item.source_type) {
			Some((_, count)) => *count += 1,
			None => counts.push((&item.source_type, 1)),
		}
	}

	let majority = counts
		.iter()
		.max_by_key(|(_, count)| *count)
		.map(|(kind, _)| *kind);

	match majority {
		Some("email") => "emails",
		Some("calendar") => "events",
		Some("chat") => "messages",
		Some("doc") => "documents",
		_ => "items",
	}
}
