/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the on-disk configuration of a `gather` installation:
//! the `config.yaml` schema, the config-directory resolution, and the
//! [`ConfigError`] that every bad-config condition fails fast with
//!
//! The config directory also holds everything else `gather` persists:
//! `archive.db`, `vectors.db`, the blob tree, per-source token files, and the
//! user-identity caches. `GATHER_CONFIG_DIR` and `GATHER_CREDENTIALS` are the
//! only process-wide environment inputs besides the log filter.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::transform::{ErrorStrategy, PipelineError};

/// Environment variable overriding the config directory
pub const ENV_CONFIG_DIR: &str = "GATHER_CONFIG_DIR";

/// Environment variable overriding the credentials file path
pub const ENV_CREDENTIALS: &str = "GATHER_CREDENTIALS";

/// An error loading or interpreting configuration. These abort startup with
/// a precise message; nothing runs on a half-understood config.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
	#[error("can't read config {1:?}")]
	Read(#[source] std::io::Error, PathBuf),

	#[error("config {1:?} is corrupted")]
	Parse(#[source] serde_yaml::Error, PathBuf),

	#[error("no config directory available; set {ENV_CONFIG_DIR}")]
	NoConfigDir,

	#[error("source {0:?} has no registered provider for its type")]
	UnknownSourceKind(String),

	#[error("source type {0:?} is registered twice")]
	DuplicateSourceKind(String),

	#[error("invalid options for source {0}")]
	SourceOptions(String, #[source] serde_json::Error),

	#[error("invalid options for target {0}")]
	TargetOptions(&'static str, #[source] serde_json::Error),

	#[error("no target named {0:?}")]
	UnknownTarget(String),

	#[error("the {0} section is missing from the config")]
	MissingSection(&'static str),

	#[error("invalid pipeline configuration")]
	Pipeline(#[from] PipelineError),
}

/// The root of `config.yaml`
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
	pub sources: Vec<SourceConfig>,
	pub sinks: SinksConfig,
	pub pipeline: PipelineConfig,
	pub sync: SyncDefaults,
}

/// One `sources:` entry
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
	/// The entry's unique name, used for tagging and per-source state
	pub name: String,

	/// The provider type string dispatched through the source registry
	#[serde(rename = "type")]
	pub kind: String,

	/// Per-source `since` override, in any accepted
	/// [`date spec`](`crate::datespec`) form
	#[serde(default)]
	pub since: Option<String>,

	/// Per-source row-limit override
	#[serde(default)]
	pub limit: Option<usize>,

	/// Provider-specific options, passed to the source factory untouched
	#[serde(default)]
	pub options: serde_json::Value,
}

/// The `sinks:` section; each subsection enables one sink
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SinksConfig {
	pub file: Option<FileSinkConfig>,
	pub archive: Option<ArchiveSinkConfig>,
	pub vector: Option<VectorSinkConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSinkConfig {
	pub output_dir: PathBuf,

	/// Which target adapter renders the files
	#[serde(default = "default_target")]
	pub target: String,

	/// Target-specific options
	#[serde(default)]
	pub options: serde_json::Value,
}

fn default_target() -> String {
	"markdown".to_owned()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveSinkConfig {
	/// Overrides `<config_dir>/archive.db`
	pub db_path: Option<PathBuf>,

	/// Overrides `<config_dir>/archive/eml`
	pub blob_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VectorSinkConfig {
	/// Overrides `<config_dir>/vectors.db`
	#[serde(default)]
	pub db_path: Option<PathBuf>,

	/// Embedding endpoint, OpenAI-compatible; omit to use the built-in
	/// hash embedder
	#[serde(default)]
	pub endpoint: Option<String>,

	#[serde(default = "default_model")]
	pub model: String,

	#[serde(default)]
	pub api_key: Option<String>,

	pub dimensions: usize,

	/// Milliseconds to sleep between embedding calls
	#[serde(default)]
	pub embed_delay_ms: u64,

	/// Characters of content embedded per document; 0 disables truncation
	#[serde(default = "default_max_content_chars")]
	pub max_content_chars: usize,
}

fn default_model() -> String {
	"nomic-embed-text".to_owned()
}

fn default_max_content_chars() -> usize {
	crate::vector::DEFAULT_MAX_CONTENT_CHARS
}

/// The `pipeline:` section
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
	pub enabled: bool,

	/// Transform names, in execution order
	pub order: Vec<String>,

	pub strategy: ErrorStrategy,

	/// Per-transform options, keyed by transform name
	pub options: HashMap<String, serde_json::Value>,
}

impl Default for PipelineConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			order: Vec::new(),
			strategy: ErrorStrategy::default(),
			options: HashMap::new(),
		}
	}
}

/// The `sync:` section: run-level defaults that per-source entries override
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncDefaults {
	/// Default `since`, in any accepted date spec form
	pub since: Option<String>,

	pub limit: Option<usize>,

	/// Cap on concurrently fetching sources; defaults to the source count
	pub concurrency: Option<usize>,

	/// Tag every item `source:<entry name>` before the pipeline
	pub source_tags: bool,
}

impl Config {
	/// Loads and parses `config.yaml` at `path`
	///
	/// # Errors
	/// if the file can't be read or doesn't parse
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let raw = std::fs::read_to_string(path)
			.map_err(|e| ConfigError::Read(e, path.to_path_buf()))?;

		serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse(e, path.to_path_buf()))
	}
}

/// The directory all persisted state lives under: the `GATHER_CONFIG_DIR`
/// override, or the platform config dir plus `gather`
///
/// # Errors
/// if neither the override nor a platform config dir is available
pub fn config_dir() -> Result<PathBuf, ConfigError> {
	if let Some(dir) = std::env::var_os(ENV_CONFIG_DIR) {
		return Ok(PathBuf::from(dir));
	}

	dirs::config_dir()
		.map(|dir| dir.join("gather"))
		.ok_or(ConfigError::NoConfigDir)
}

/// Where provider credentials live: the `GATHER_CREDENTIALS` override, or
/// `credentials.json` in the config dir
///
/// # Errors
/// same as [`config_dir`]
pub fn credentials_path() -> Result<PathBuf, ConfigError> {
	if let Some(path) = std::env::var_os(ENV_CREDENTIALS) {
		return Ok(PathBuf::from(path));
	}

	Ok(config_dir()?.join("credentials.json"))
}

#[cfg(test)]
mod tests {
	use super::*;

	use std::io::Write as _;

	const FULL_CONFIG: &str = "\
sources:
  - name: work-mail
    type: email
    since: 7d
    options:
      label: INBOX
  - name: notes
    type: file
    limit: 100
    options:
      path: /tmp/notes.json

sinks:
  file:
    output_dir: /tmp/export
  vector:
    dimensions: 768
    endpoint: http://localhost:11434/v1
    embed_delay_ms: 50

pipeline:
  order: [content_cleanup, auto_tagging]
  strategy: log_and_continue
  options:
    content_cleanup:
      collapse_newlines: true

sync:
  since: yesterday
  concurrency: 2
  source_tags: true
";

	fn write_config(content: &str) -> tempfile::NamedTempFile {
		let mut file = tempfile::NamedTempFile::new().expect("temp file");
		file.write_all(content.as_bytes()).expect("write config");
		file
	}

	#[test]
	fn full_config_parses() {
		let file = write_config(FULL_CONFIG);
		let config = Config::load(file.path()).expect("should parse");

		assert_eq!(config.sources.len(), 2);
		assert_eq!(config.sources[0].kind, "email");
		assert_eq!(config.sources[0].since.as_deref(), Some("7d"));
		assert_eq!(config.sources[1].limit, Some(100));

		let vector = config.sinks.vector.expect("vector sink configured");
		assert_eq!(vector.dimensions, 768);
		assert_eq!(vector.embed_delay_ms, 50);
		assert_eq!(vector.max_content_chars, 30_000);

		assert_eq!(config.pipeline.order, ["content_cleanup", "auto_tagging"]);
		assert_eq!(config.pipeline.strategy, ErrorStrategy::LogAndContinue);
		assert!(config.sync.source_tags);
	}

	#[test]
	fn empty_config_gets_defaults() {
		let file = write_config("{}");
		let config = Config::load(file.path()).expect("should parse");

		assert!(config.sources.is_empty());
		assert!(config.pipeline.enabled);
		assert_eq!(config.pipeline.strategy, ErrorStrategy::FailFast);
	}

	#[test]
	fn unknown_keys_are_rejected() {
		let file = write_config("sinks:\n  telepathy: {}\n");
		let err = Config::load(file.path()).expect_err("should reject");

		assert!(matches!(err, ConfigError::Parse(..)));
	}

	#[test]
	fn missing_file_is_a_read_error() {
		let err =
			Config::load(Path::new("/definitely/not/here.yaml")).expect_err("should fail");
		assert!(matches!(err, ConfigError::Read(..)));
	}
}
