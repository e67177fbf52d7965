/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the [`Embedder`] trait and its built-in
//! implementations: [`Http`] speaks the OpenAI-compatible `/embeddings` wire
//! format (which local model runtimes also serve), and [`Hashed`] produces
//! cheap deterministic vectors for offline use and tests.
//!
//! The retry policy around embedding calls lives with the caller (the
//! [`vector store`](`crate::vector::VectorStore`)); [`EmbedError::is_retryable`]
//! is the predicate it uses. It is narrow on purpose: connection errors,
//! empty responses, and 5xx are worth retrying, a 4xx never is.

use std::fmt::Debug;

use async_trait::async_trait;
use serde::Deserialize;

/// An error from an embedding call
#[derive(thiserror::Error, Debug)]
pub enum EmbedError {
	#[error("embedding request failed")]
	Http(#[from] reqwest::Error),

	#[error("embedding endpoint returned HTTP {status}: {body}")]
	Status { status: u16, body: String },

	#[error("embedding endpoint returned no embedding")]
	Empty,

	#[error("can't decode embedding response")]
	Decode(#[source] reqwest::Error),

	#[error("embedding has {got} dimensions, expected {expected}")]
	Dimensions { expected: usize, got: usize },
}

impl EmbedError {
	/// Whether retrying the same call can plausibly succeed
	#[must_use]
	pub fn is_retryable(&self) -> bool {
		match self {
			EmbedError::Http(_) | EmbedError::Empty => true,
			EmbedError::Status { status, .. } => *status >= 500,
			EmbedError::Decode(_) | EmbedError::Dimensions { .. } => false,
		}
	}
}

/// Turns text into fixed-dimensionality dense vectors
#[async_trait]
pub trait Embedder: Debug + Send + Sync {
	/// Embed a single text
	///
	/// # Errors
	/// if the backing model can't be reached or returns garbage
	async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

	/// Embed several texts, preserving order.
	/// The default implementation loops over [`embed`](`Embedder::embed`).
	///
	/// # Errors
	/// if any single embedding fails
	async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
		let mut out = Vec::with_capacity(texts.len());

		for text in texts {
			out.push(self.embed(text).await?);
		}

		Ok(out)
	}

	/// The dimensionality of every vector this embedder produces
	fn dimensions(&self) -> usize;

	/// Release any held resources; called once at teardown
	///
	/// # Errors
	/// if shutdown fails
	async fn close(&self) -> Result<(), EmbedError> {
		Ok(())
	}
}

#[derive(Debug, Deserialize)]
struct WireResponse {
	data: Vec<WireEmbedding>,
}

#[derive(Debug, Deserialize)]
struct WireEmbedding {
	embedding: Vec<f32>,
	#[serde(default)]
	index: usize,
}

/// An [`Embedder`] speaking the OpenAI-compatible `POST /embeddings` format
pub struct Http {
	client: reqwest::Client,
	base_url: String,
	model: String,
	api_key: Option<String>,
	dimensions: usize,
}

impl Http {
	/// Creates an embedder against `base_url` (e.g. `http://localhost:11434/v1`)
	///
	/// # Errors
	/// if the HTTP client can't be built
	pub fn new(
		base_url: impl Into<String>,
		model: impl Into<String>,
		api_key: Option<String>,
		dimensions: usize,
	) -> Result<Self, EmbedError> {
		let client = reqwest::Client::builder()
			.timeout(std::time::Duration::from_secs(120))
			.build()?;

		Ok(Self {
			client,
			base_url: base_url.into(),
			model: model.into(),
			api_key,
			dimensions,
		})
	}

	async fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
		let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));

		let mut req = self.client.post(&url).json(&serde_json::json!({
			"model": self.model,
			"input": texts,
		}));

		if let Some(key) = &self.api_key {
			req = req.header("Authorization", format!("Bearer {key}"));
		}

		let response = req.send().await?;
		let status = response.status();

		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();

			return Err(EmbedError::Status {
				status: status.as_u16(),
				body,
			});
		}

		let wire: WireResponse = response.json().await.map_err(EmbedError::Decode)?;
		if wire.data.is_empty() {
			return Err(EmbedError::Empty);
		}

		let mut data = wire.data;
		data.sort_by_key(|d| d.index);

		let vectors = data.into_iter().map(|d| d.embedding).collect::<Vec<_>>();

		for vector in &vectors {
			if vector.is_empty() {
				return Err(EmbedError::Empty);
			}

			if vector.len() != self.dimensions {
				return Err(EmbedError::Dimensions {
					expected: self.dimensions,
					got: vector.len(),
				});
			}
		}

		Ok(vectors)
	}
}

#[async_trait]
impl Embedder for Http {
	async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
		let mut vectors = self.request(&[text]).await?;
		vectors.pop().ok_or(EmbedError::Empty)
	}

	async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
		let refs = texts.iter().map(String::as_str).collect::<Vec<_>>();
		self.request(&refs).await
	}

	fn dimensions(&self) -> usize {
		self.dimensions
	}
}

impl Debug for Http {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Http")
			.field("base_url", &self.base_url)
			.field("model", &self.model)
			.field("dimensions", &self.dimensions)
			.finish_non_exhaustive()
	}
}

/// A deterministic, model-free [`Embedder`]: token hashes bucketed into a
/// fixed-size normalized vector. No semantic quality to speak of, but stable
/// across runs, instant, and offline - good enough for smoke-testing a vector
/// pipeline and for unit tests.
#[derive(Debug, Clone)]
pub struct Hashed {
	dimensions: usize,
}

impl Hashed {
	#[must_use]
	pub fn new(dimensions: usize) -> Self {
		Self { dimensions }
	}
}

#[async_trait]
impl Embedder for Hashed {
	async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
		let mut vector = vec![0.0f32; self.dimensions];

		for token in text.split_whitespace() {
			let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
			for byte in token.to_lowercase().bytes() {
				hash ^= u64::from(byte);
				hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
			}

			let bucket = (hash % self.dimensions as u64) as usize;
			vector[bucket] += 1.0;
		}

		let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
		if norm > 0.0 {
			for v in &mut vector {
				*v /= norm;
			}
		}

		Ok(vector)
	}

	fn dimensions(&self) -> usize {
		self.dimensions
	}
}
