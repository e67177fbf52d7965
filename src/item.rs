/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! This module contains the basic building block of [`gather`](`crate`) - [`Item`]
//! that every source creates, every transform reshapes, and every sink consumes.
//!
//! An item with [`messages`](`Item::messages`) set is a *thread*: a container
//! for an ordered conversation. Consumers that don't care about threads can
//! treat both shapes uniformly; the ones that must branch (e.g. a markdown
//! exporter rendering a message list) check [`Item::is_thread`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata key that ties a message to the conversation it belongs to
pub const METADATA_THREAD_ID: &str = "thread_id";

/// The universal unit of synced content
///
/// JSON round-trip is total: encoding an item and decoding it back yields a
/// structurally equal value. `messages` is omitted from the encoding when the
/// item is not a thread, so a decoded element without a `messages` key is a
/// plain item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
	/// Stable identifier, unique within the source that produced the item
	pub id: String,

	/// Display title, e.g. an email subject or an event summary
	#[serde(default)]
	pub title: String,

	/// Body text; markdown once the pipeline has run
	#[serde(default)]
	pub content: String,

	/// Provider class: `email`, `calendar`, `chat`, `doc`, ...
	#[serde(default)]
	pub source_type: String,

	/// Sub-classification: `message`, `thread_reply`, `event`, `document`, `thread`, ...
	#[serde(default)]
	pub item_type: String,

	/// Event/message time
	pub created_at: DateTime<Utc>,

	/// Last modification time
	pub updated_at: DateTime<Utc>,

	/// Ordered set of tags; insertion order preserved, duplicates forbidden
	#[serde(default)]
	pub tags: Vec<String>,

	/// Attachments owned by this item
	#[serde(default)]
	pub attachments: Vec<Attachment>,

	/// Outbound references found in or attached to the content
	#[serde(default)]
	pub links: Vec<Link>,

	/// Free-form per-source data
	#[serde(default)]
	pub metadata: BTreeMap<String, serde_json::Value>,

	/// Child items of a thread, sorted by `created_at` ascending.
	/// `None` for plain items.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub messages: Option<Vec<Item>>,
}

/// A file attached to an [`Item`]. Owned by its item; cloning is shallow
/// in the sense that no attachment is ever shared between two items.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
	pub name: String,

	#[serde(default)]
	pub mime_type: String,

	/// Remote location of the attachment, if it wasn't inlined
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,

	/// Inline bytes, if the source downloaded them
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<Vec<u8>>,
}

/// An outbound reference from an [`Item`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Link {
	pub url: String,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,

	pub kind: LinkKind,
}

/// What a [`Link`] points at
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
	/// A plain external web page
	External,
	/// A cloud document, or a file by extension (PDF, images)
	Document,
	/// A video-call link
	MeetingUrl,
	/// A link back to the item's origin
	Source,
}

impl Item {
	/// Creates an empty item with `created_at = now` and empty collections
	#[must_use]
	pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
		let now = Utc::now();

		Self {
			id: id.into(),
			title: title.into(),
			content: String::new(),
			source_type: String::new(),
			item_type: String::new(),
			created_at: now,
			updated_at: now,
			tags: Vec::new(),
			attachments: Vec::new(),
			links: Vec::new(),
			metadata: BTreeMap::new(),
			messages: None,
		}
	}

	/// Creates an empty thread container
	#[must_use]
	pub fn new_thread(id: impl Into<String>, subject: impl Into<String>) -> Self {
		let mut item = Self::new(id, subject);
		item.item_type = "thread".to_owned();
		item.messages = Some(Vec::new());
		item
	}

	/// Builds a thread out of a parent message and its replies.
	///
	/// Some providers include the parent message in its own reply list; a
	/// reply whose timestamp equals the parent's is skipped so it isn't
	/// appended twice.
	#[must_use]
	pub fn thread_of(id: impl Into<String>, subject: impl Into<String>, parent: Item, replies: Vec<Item>) -> Self {
		let parent_created_at = parent.created_at;

		let mut thread = Self::new_thread(id, subject);
		thread.source_type = parent.source_type.clone();
		thread.push_message(parent);

		for reply in replies {
			if reply.created_at == parent_created_at {
				tracing::trace!("Skipping reply {} that duplicates its thread parent", reply.id);
				continue;
			}

			thread.push_message(reply);
		}

		thread.rebuild_content();
		thread
	}

	/// Whether this item is a thread container. Constant-time.
	#[must_use]
	pub fn is_thread(&self) -> bool {
		self.messages.is_some()
	}

	/// The number of messages this item stands for, at least 1
	#[must_use]
	pub fn message_count(&self) -> usize {
		self.messages.as_ref().map_or(1, |m| m.len().max(1))
	}

	/// The conversation id: `metadata.thread_id` if the source set one,
	/// the item's own id otherwise
	#[must_use]
	pub fn thread_id(&self) -> &str {
		self.metadata
			.get(METADATA_THREAD_ID)
			.and_then(serde_json::Value::as_str)
			.unwrap_or(&self.id)
	}

	/// Appends `tag` unless the item already carries it.
	/// Insertion order is preserved.
	pub fn add_tag(&mut self, tag: impl Into<String>) {
		let tag = tag.into();

		if !self.tags.iter().any(|t| *t == tag) {
			self.tags.push(tag);
		}
	}

	/// Appends a message to a thread without re-sorting; callers feed
	/// messages in chronological order.
	///
	/// The thread's stable id is stamped into the message's metadata and the
	/// container timestamps widen to cover the child.
	///
	/// Turns a plain item into a thread if it wasn't one already.
	pub fn push_message(&mut self, mut message: Item) {
		message.metadata.insert(
			METADATA_THREAD_ID.to_owned(),
			serde_json::Value::String(self.id.clone()),
		);

		let first = match &self.messages {
			Some(messages) => messages.is_empty(),
			None => true,
		};

		if first {
			self.created_at = message.created_at;
			self.updated_at = message.updated_at;
		} else {
			self.created_at = self.created_at.min(message.created_at);
			self.updated_at = self.updated_at.max(message.updated_at);
		}

		self.messages.get_or_insert_with(Vec::new).push(message);
	}

	/// Rebuilds a thread's content as the concatenation of its messages'
	/// content, in stored order. A no-op for plain items.
	pub fn rebuild_content(&mut self) {
		let Some(messages) = &self.messages else {
			return;
		};

		self.content = messages
			.iter()
			.map(|m| m.content.as_str())
			.filter(|c| !c.is_empty())
			.collect::<Vec<_>>()
			.join("\n\n");
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use chrono::TimeZone;

	fn at(secs: i64) -> DateTime<Utc> {
		Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
	}

	fn message(id: &str, content: &str, secs: i64) -> Item {
		let mut item = Item::new(id, format!("msg {id}"));
		item.content = content.to_owned();
		item.created_at = at(secs);
		item.updated_at = at(secs);
		item
	}

	#[test]
	fn round_trip_plain_item() {
		let mut item = Item::new("id-1", "Hello");
		item.content = "body".to_owned();
		item.source_type = "email".to_owned();
		item.add_tag("a");
		item.add_tag("b");
		item.links.push(Link {
			url: "https://example.com".to_owned(),
			title: Some("example".to_owned()),
			kind: LinkKind::External,
		});
		item.attachments.push(Attachment {
			name: "report.pdf".to_owned(),
			mime_type: "application/pdf".to_owned(),
			url: None,
			data: Some(vec![1, 2, 3]),
		});
		item.metadata
			.insert("from".to_owned(), serde_json::json!("a@b.c"));

		let encoded = serde_json::to_string(&item).expect("item should encode");
		let decoded: Item = serde_json::from_str(&encoded).expect("item should decode");

		assert_eq!(item, decoded);
	}

	#[test]
	fn round_trip_thread() {
		let mut thread = Item::new_thread("t-1", "Subject");
		thread.push_message(message("m-1", "first", 100));
		thread.push_message(message("m-2", "second", 200));
		thread.rebuild_content();

		let encoded = serde_json::to_string(&thread).expect("thread should encode");
		let decoded: Item = serde_json::from_str(&encoded).expect("thread should decode");

		assert_eq!(thread, decoded);
		assert!(decoded.is_thread());
	}

	#[test]
	fn plain_item_encodes_without_messages_key() {
		let item = Item::new("id-1", "Hello");
		let encoded = serde_json::to_value(&item).expect("item should encode");

		assert!(encoded.get("messages").is_none());
	}

	#[test]
	fn tags_stay_unique_and_ordered() {
		let mut item = Item::new("id-1", "Hello");
		item.add_tag("b");
		item.add_tag("a");
		item.add_tag("b");

		assert_eq!(item.tags, ["b", "a"]);
	}

	#[test]
	fn thread_timestamps_cover_children() {
		let mut thread = Item::new_thread("t-1", "Subject");
		thread.push_message(message("m-1", "first", 200));
		thread.push_message(message("m-2", "second", 100));
		thread.push_message(message("m-3", "third", 300));

		assert_eq!(thread.created_at, at(100));
		assert_eq!(thread.updated_at, at(300));
	}

	#[test]
	fn messages_carry_thread_id() {
		let mut thread = Item::new_thread("t-1", "Subject");
		thread.push_message(message("m-1", "first", 100));

		let child = &thread.messages.as_ref().expect("should be a thread")[0];
		assert_eq!(child.thread_id(), "t-1");
	}

	#[test]
	fn thread_of_skips_duplicated_parent() {
		let parent = message("m-1", "parent", 100);
		let replies = vec![message("m-1-copy", "parent again", 100), message("m-2", "reply", 200)];

		let thread = Item::thread_of("t-1", "Subject", parent, replies);

		assert_eq!(thread.message_count(), 2);
		assert_eq!(thread.content, "parent\n\nreply");
	}

	#[test]
	fn thread_id_falls_back_to_own_id() {
		let mut item = Item::new("id-1", "Hello");
		assert_eq!(item.thread_id(), "id-1");

		item.metadata
			.insert(METADATA_THREAD_ID.to_owned(), serde_json::json!("t-9"));
		assert_eq!(item.thread_id(), "t-9");
	}
}
