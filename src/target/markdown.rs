/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! The built-in plain-markdown target: one file per item, a small YAML front
//! matter block, message lists rendered for threads

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{Preview, PreviewAction, Target};
use crate::{config::ConfigError, item::Item, sink::error::SinkError, utils};

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Options {
	/// Write the YAML front matter block at the top of each file
	front_matter: bool,
}

impl Default for Options {
	fn default() -> Self {
		Self { front_matter: true }
	}
}

/// Writes one markdown file per item
#[derive(Debug, Default)]
pub struct Markdown {
	opts: Options,
}

impl Markdown {
	fn path_for(&self, item: &Item, output_dir: &Path) -> PathBuf {
		let stem = self.format_filename(&item.title);
		let stem = if stem.is_empty() {
			utils::sanitize_filename(&item.id)
		} else {
			stem
		};

		output_dir.join(format!("{stem}.{}", self.file_extension()))
	}

	fn render(&self, item: &Item) -> String {
		use std::fmt::Write as _;

		let mut out = String::new();

		if self.opts.front_matter {
			out.push_str("---\n");
			let _ = writeln!(out, "id: {}", item.id);
			let _ = writeln!(out, "source: {}", item.source_type);
			let _ = writeln!(out, "created: {}", item.created_at.to_rfc3339());
			let _ = writeln!(out, "updated: {}", item.updated_at.to_rfc3339());

			if !item.tags.is_empty() {
				let _ = writeln!(out, "tags: [{}]", item.tags.join(", "));
			}

			out.push_str("---\n\n");
		}

		let _ = write!(out, "# {}\n\n", item.title);

		match &item.messages {
			Some(messages) => {
				for message in messages {
					let _ = write!(out, "## {}\n\n", message.created_at.to_rfc3339());
					out.push_str(&message.content);
					out.push_str("\n\n");
				}
			}
			None => {
				out.push_str(&item.content);
				out.push('\n');
			}
		}

		if !item.links.is_empty() {
			out.push_str("\n## Links\n\n");

			for link in &item.links {
				let label = link.title.as_deref().unwrap_or(&link.url);
				let _ = writeln!(out, "- [{label}]({})", link.url);
			}
		}

		out
	}

	fn plan(&self, item: &Item, output_dir: &Path) -> Preview {
		let path = self.path_for(item, output_dir);
		let proposed = self.render(item);
		let existing = fs::read_to_string(&path).ok();

		let (action, conflict) = match &existing {
			None => (PreviewAction::Create, false),
			Some(existing) if *existing == proposed => (PreviewAction::Skip, false),
			Some(_) => (PreviewAction::Update, true),
		};

		Preview {
			path,
			action,
			proposed,
			existing,
			conflict,
		}
	}
}

impl Target for Markdown {
	fn configure(&mut self, opts: &serde_json::Value) -> Result<(), ConfigError> {
		self.opts = crate::utils::opts_from_value(opts)
			.map_err(|e| ConfigError::TargetOptions("markdown", e))?;

		Ok(())
	}

	fn export(&self, items: &[Item], output_dir: &Path) -> Result<(), SinkError> {
		fs::create_dir_all(output_dir)
			.map_err(|e| SinkError::FileWrite(e, output_dir.to_path_buf()))?;

		for item in items {
			let plan = self.plan(item, output_dir);

			if plan.action == PreviewAction::Skip {
				tracing::trace!("Skipping unchanged {}", plan.path.display());
				continue;
			}

			fs::write(&plan.path, plan.proposed.as_bytes())
				.map_err(|e| SinkError::FileWrite(e, plan.path.clone()))?;
		}

		Ok(())
	}

	fn preview(&self, items: &[Item], output_dir: &Path) -> Vec<Preview> {
		items.iter().map(|item| self.plan(item, output_dir)).collect()
	}

	fn format_filename(&self, title: &str) -> String {
		utils::sanitize_filename(title)
	}

	fn file_extension(&self) -> &'static str {
		"md"
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn renders_front_matter_and_body() {
		let mut item = Item::new("id-1", "Hello");
		item.source_type = "email".to_owned();
		item.content = "body".to_owned();
		item.add_tag("a");

		let rendered = Markdown::default().render(&item);

		assert!(rendered.starts_with("---\nid: id-1\n"));
		assert!(rendered.contains("tags: [a]"));
		assert!(rendered.contains("# Hello\n\nbody"));
	}

	#[test]
	fn renders_thread_messages() {
		let mut child = Item::new("m-1", "first");
		child.content = "first message".to_owned();

		let mut thread = Item::new_thread("t-1", "Subject");
		thread.push_message(child);

		let rendered = Markdown::default().render(&thread);
		assert!(rendered.contains("first message"));
		assert!(rendered.contains("## "));
	}

	#[test]
	fn preview_reports_create_update_skip() {
		let dir = tempfile::tempdir().expect("temp dir");
		let target = Markdown::default();

		let mut item = Item::new("id-1", "Hello");
		item.content = "body".to_owned();

		let previews = target.preview(&[item.clone()], dir.path());
		assert_eq!(previews[0].action, PreviewAction::Create);
		assert!(!previews[0].conflict);

		target.export(&[item.clone()], dir.path()).expect("export");

		let previews = target.preview(&[item.clone()], dir.path());
		assert_eq!(previews[0].action, PreviewAction::Skip);

		item.content = "changed body".to_owned();
		let previews = target.preview(&[item], dir.path());
		assert_eq!(previews[0].action, PreviewAction::Update);
		assert!(previews[0].conflict);
	}

	#[test]
	fn filename_is_sanitized() {
		let target = Markdown::default();
		assert_eq!(target.format_filename("a/b: c?"), "a-b-c");
	}
}
