/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`Source`] trait that every provider implements,
//! along with the [`SourceRegistry`] that creates sources out of config
//! entries by their type string
//!
//! Provider implementations own their credentials, HTTP clients, and
//! pagination state; the [`sync engine`](`crate::sync::SyncEngine`) only ever
//! asks them for items since a cutoff.

pub mod error;
pub mod file;

pub use self::file::File;

use std::collections::HashMap;
use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use self::error::SourceError;
use crate::{config::ConfigError, config::SourceConfig, item::Item};

/// An input endpoint that produces a batch of items since a cutoff
#[async_trait]
pub trait Source: Debug + Send {
	/// Fetch up to `limit` items updated after `since`.
	///
	/// The returned batch is owned by the caller; sources keep no references
	/// into it. Pagination inside a fetch is the source's business and must
	/// stop promptly when the surrounding sync run is cancelled.
	///
	/// # Errors
	/// if the provider can't be reached, refuses the credentials, or returns
	/// data that can't be read
	async fn fetch(
		&mut self,
		since: Option<DateTime<Utc>>,
		limit: Option<usize>,
	) -> Result<Vec<Item>, SourceError>;

	/// Whether this source could push items in real time. Informational only;
	/// everything is polled.
	fn supports_realtime(&self) -> bool {
		false
	}
}

/// A factory that builds a [`Source`] out of its config entry
pub type SourceFactory =
	Box<dyn Fn(&SourceConfig) -> Result<Box<dyn Source>, ConfigError> + Send + Sync>;

/// Creates sources by their config `type` string.
///
/// Providers register at startup; config-driven dispatch happens here instead
/// of a hard-coded switch so out-of-tree providers can join in.
#[derive(Default)]
pub struct SourceRegistry {
	factories: HashMap<String, SourceFactory>,
}

impl SourceRegistry {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// A registry with the built-in source kinds registered
	#[must_use]
	pub fn with_builtins() -> Self {
		let mut registry = Self::new();

		registry
			.register("file", Box::new(|cfg| Ok(Box::new(File::from_config(cfg)?))))
			.expect("built-in source kinds are unique");

		registry
	}

	/// Adds a factory for the given type string
	///
	/// # Errors
	/// if the type string is already taken
	pub fn register(
		&mut self,
		kind: impl Into<String>,
		factory: SourceFactory,
	) -> Result<(), ConfigError> {
		let kind = kind.into();

		if self.factories.contains_key(&kind) {
			return Err(ConfigError::DuplicateSourceKind(kind));
		}

		self.factories.insert(kind, factory);
		Ok(())
	}

	/// Builds a source for `cfg`
	///
	/// # Errors
	/// if no factory is registered for `cfg.kind` or the factory rejects the
	/// config
	pub fn create(&self, cfg: &SourceConfig) -> Result<Box<dyn Source>, ConfigError> {
		let factory = self
			.factories
			.get(&cfg.kind)
			.ok_or_else(|| ConfigError::UnknownSourceKind(cfg.kind.clone()))?;

		factory(cfg)
	}
}

impl Debug for SourceRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SourceRegistry")
			.field("kinds", &self.factories.keys().collect::<Vec<_>>())
			.finish()
	}
}
