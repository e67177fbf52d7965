/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`Transform`] trait - a named, configurable,
//! batch-to-batch function with no I/O - along with the [`Registry`] of
//! available transforms and the [`Pipeline`] that runs them in a configured
//! order under a configured [`ErrorStrategy`]

pub mod auto_tagging;
pub mod content_cleanup;
pub mod filter;
pub mod html;
pub mod link_extraction;
pub mod signature_removal;
pub mod thread_grouping;

pub use self::{
	auto_tagging::AutoTagging, content_cleanup::ContentCleanup, filter::Filter,
	link_extraction::LinkExtraction, signature_removal::SignatureRemoval,
	thread_grouping::ThreadGrouping,
};

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use serde::Deserialize;

use crate::error::ErrorChainExt;
use crate::item::Item;

/// A batch transformation step.
///
/// Transforms are pure with respect to the batch, stateful across calls only
/// through [`configure`](`Transform::configure`), and deterministic for a
/// fixed configuration. They run in-memory and must not block on I/O.
pub trait Transform: Send + Sync {
	/// The unique registry name of this transform
	fn name(&self) -> &'static str;

	/// Apply per-transform options, usually deserialized straight out of the
	/// pipeline section of the config file
	///
	/// # Errors
	/// if the options don't fit this transform
	fn configure(&mut self, opts: &serde_json::Value) -> Result<(), TransformError> {
		let _ = opts;
		Ok(())
	}

	/// Transform a batch of items into a new batch
	///
	/// # Errors
	/// if the batch can't be transformed; the pipeline's [`ErrorStrategy`]
	/// decides what happens next
	fn transform(&self, items: Vec<Item>) -> Result<Vec<Item>, TransformError>;
}

/// An error produced by a single transform invocation
#[derive(thiserror::Error, Debug)]
pub enum TransformError {
	#[error("invalid options for transform {name}")]
	InvalidOptions {
		name: &'static str,
		#[source]
		source: serde_json::Error,
	},

	#[error("transform {name} failed")]
	Failed {
		name: &'static str,
		#[source]
		source: Box<dyn std::error::Error + Send + Sync>,
	},

	#[error("transform {name} panicked while transforming {batch_len} items: {message}")]
	Panic {
		name: &'static str,
		batch_len: usize,
		message: String,
	},
}

/// An error in the pipeline configuration itself, caught before any batch runs
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
	#[error("transform {0:?} is already registered")]
	AlreadyRegistered(String),

	#[error("transform {0:?} appears twice in the pipeline order")]
	DuplicateName(String),

	#[error("transform {0:?} isn't registered")]
	UnknownName(String),
}

/// What the [`Pipeline`] does when a step fails
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStrategy {
	/// The first error aborts the run and propagates
	#[default]
	FailFast,

	/// Log the error and feed the pre-transform batch to the next step
	LogAndContinue,

	/// Log the error and replace the batch with the empty batch; downstream
	/// steps still run, receiving no work
	SkipItem,
}

/// The set of transforms a pipeline may be assembled from. Names are unique.
#[derive(Default)]
pub struct Registry {
	transforms: HashMap<&'static str, Box<dyn Transform>>,
}

impl Registry {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// A registry with every built-in transform registered
	#[must_use]
	pub fn with_builtins() -> Self {
		let mut registry = Self::new();

		for transform in [
			Box::new(ContentCleanup::default()) as Box<dyn Transform>,
			Box::new(SignatureRemoval::default()),
			Box::new(LinkExtraction::default()),
			Box::new(ThreadGrouping::default()),
			Box::new(AutoTagging::default()),
			Box::new(Filter::default()),
		] {
			registry
				.register(transform)
				.expect("built-in transform names are unique");
		}

		registry
	}

	/// Adds a transform under its own name
	///
	/// # Errors
	/// if a transform with the same name is already registered
	pub fn register(&mut self, transform: Box<dyn Transform>) -> Result<(), PipelineError> {
		let name = transform.name();

		if self.transforms.contains_key(name) {
			return Err(PipelineError::AlreadyRegistered(name.to_owned()));
		}

		self.transforms.insert(name, transform);
		Ok(())
	}

	fn take(&mut self, name: &str) -> Option<Box<dyn Transform>> {
		self.transforms.remove(name)
	}
}

impl std::fmt::Debug for Registry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Registry")
			.field("transforms", &self.transforms.keys().collect::<Vec<_>>())
			.finish()
	}
}

/// An ordered sequence of configured transforms with an error strategy.
///
/// Each step's output is the next step's input. A disabled pipeline returns
/// every batch unchanged.
pub struct Pipeline {
	steps: Vec<Box<dyn Transform>>,
	strategy: ErrorStrategy,
	enabled: bool,
}

impl Pipeline {
	/// Assembles a pipeline by pulling `order` out of `registry`, configuring
	/// each step with its entry from `options` (keyed by transform name).
	///
	/// # Errors
	/// if `order` repeats or names an unregistered transform, or if a step
	/// rejects its options
	pub fn from_registry(
		mut registry: Registry,
		order: &[String],
		strategy: ErrorStrategy,
		options: &HashMap<String, serde_json::Value>,
	) -> Result<Self, crate::Error> {
		let mut steps = Vec::with_capacity(order.len());

		for name in order {
			let Some(mut transform) = registry.take(name) else {
				let err = if steps
					.iter()
					.any(|s: &Box<dyn Transform>| s.name() == name.as_str())
				{
					PipelineError::DuplicateName(name.clone())
				} else {
					PipelineError::UnknownName(name.clone())
				};

				return Err(crate::Error::Config(err.into()));
			};

			if let Some(opts) = options.get(name.as_str()) {
				transform.configure(opts)?;
			}

			steps.push(transform);
		}

		Ok(Self {
			steps,
			strategy,
			enabled: true,
		})
	}

	/// A pipeline that passes every batch through unchanged
	#[must_use]
	pub fn disabled() -> Self {
		Self {
			steps: Vec::new(),
			strategy: ErrorStrategy::FailFast,
			enabled: false,
		}
	}

	#[must_use]
	pub fn is_enabled(&self) -> bool {
		self.enabled
	}

	/// The configured step names, in execution order
	#[must_use]
	pub fn order(&self) -> Vec<&'static str> {
		self.steps.iter().map(|s| s.name()).collect()
	}

	/// Runs `batch` through every step in order.
	///
	/// Each step is invoked at most once per call. A step that panics is
	/// reported as a failing step with its name and the batch size; the
	/// [`ErrorStrategy`] then applies uniformly.
	///
	/// # Errors
	/// only under [`ErrorStrategy::FailFast`], with the first step error
	pub fn transform(&self, mut batch: Vec<Item>) -> Result<Vec<Item>, TransformError> {
		if !self.enabled {
			return Ok(batch);
		}

		for step in &self.steps {
			// only LogAndContinue ever needs the pre-transform batch back
			let before = matches!(self.strategy, ErrorStrategy::LogAndContinue)
				.then(|| batch.clone());

			match run_step(step.as_ref(), batch) {
				Ok(transformed) => batch = transformed,
				Err(err) => match self.strategy {
					ErrorStrategy::FailFast => return Err(err),
					ErrorStrategy::LogAndContinue => {
						tracing::warn!(
							"Transform {} failed, passing batch through unchanged: {}",
							step.name(),
							err.display_chain()
						);

						batch = before.unwrap_or_default();
					}
					ErrorStrategy::SkipItem => {
						tracing::warn!(
							"Transform {} failed, dropping batch: {}",
							step.name(),
							err.display_chain()
						);

						batch = Vec::new();
					}
				},
			}
		}

		Ok(batch)
	}
}

impl std::fmt::Debug for Pipeline {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Pipeline")
			.field("order", &self.order())
			.field("strategy", &self.strategy)
			.field("enabled", &self.enabled)
			.finish()
	}
}

fn run_step(step: &dyn Transform, batch: Vec<Item>) -> Result<Vec<Item>, TransformError> {
	let batch_len = batch.len();

	match panic::catch_unwind(AssertUnwindSafe(|| step.transform(batch))) {
		Ok(result) => result,
		Err(payload) => Err(TransformError::Panic {
			name: step.name(),
			batch_len,
			message: panic_message(payload.as_ref()),
		}),
	}
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
	if let Some(message) = payload.downcast_ref::<&str>() {
		(*message).to_owned()
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.clone()
	} else {
		"unknown panic payload".to_owned()
	}
}
