/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

//! C10: Thread builder — groups a folder's messages by `In-Reply-To` /
//! `References` into a forest of conversations (spec.md §4.9), mirroring
//! JWZ's threading algorithm the way most MUAs implement it.

use std::collections::{HashMap, HashSet};

use crate::message::{labels, Message};

/// Total order of how a parent/child relation was established; a later
/// call to `follows` only overwrites a stored relation of lower or equal
/// quality (spec.md §4.9 "upgrades the parent only when ... ≥").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Quality {
    Guess,
    Reference,
    Reply,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub parent: Option<String>,
    pub quality: Quality,
    pub follow_ups: HashSet<String>,
    /// `None` for a dummy node: known only as someone else's parent.
    pub size: Option<u64>,
    pub deleted: bool,
}

impl Node {
    fn dummy(id: String) -> Self {
        Node {
            id,
            parent: None,
            quality: Quality::Guess,
            follow_ups: HashSet::new(),
            size: None,
            deleted: false,
        }
    }

    pub fn is_dummy(&self) -> bool {
        self.size.is_none()
    }
}

#[derive(Debug, Default)]
pub struct ThreadBuilder {
    by_id: HashMap<String, Node>,
    roots: HashSet<String>,
}

impl ThreadBuilder {
    pub fn new() -> Self {
        ThreadBuilder::default()
    }

    /// Builds a threader over every message in `messages` (spec.md §4.9).
    pub fn from_messages(messages: &[Message]) -> Self {
        let mut builder = ThreadBuilder::new();
        for message in messages {
            builder.add(message);
        }
        builder
    }

    fn node_mut(&mut self, id: &str) -> &mut Node {
        self.by_id.entry(id.to_string()).or_insert_with(|| Node::dummy(id.to_string()))
    }

    /// Records `child`'s parent as `parent` unless a relation of equal or
    /// higher quality is already stored.
    fn follows(&mut self, parent: &str, child: &str, quality: Quality) {
        if parent == child {
            return;
        }
        self.node_mut(parent).follow_ups.insert(child.to_string());

        let child_node = self.node_mut(child);
        let upgrade = match &child_node.parent {
            Some(_) => quality >= child_node.quality,
            None => true,
        };
        if upgrade {
            child_node.parent = Some(parent.to_string());
            child_node.quality = quality;
        }

        self.roots.remove(child);
        self.node_mut(parent);
        if self.by_id[parent].parent.is_none() {
            self.roots.insert(parent.to_string());
        }
    }

    /// Ingests one message's `In-Reply-To` / `References` (spec.md §4.9
    /// steps 1-3).
    pub fn add(&mut self, message: &Message) {
        let id = message.message_id().to_string();

        {
            let node = self.node_mut(&id);
            node.size = Some(message_size(message));
            node.deleted = message.is_labeled(labels::DELETED);
        }

        let in_reply_to = message.get_cached("in-reply-to").and_then(|f| first_message_id(f.body()));
        let references: Vec<String> = message
            .get_cached("references")
            .map(|f| extract_message_ids(f.body()))
            .unwrap_or_default();

        if let Some(parent) = in_reply_to {
            self.follows(&parent, &id, Quality::Reply);
        } else if references.len() >= 2 {
            for pair in references.windows(2) {
                self.follows(&pair[0], &pair[1], Quality::Reference);
            }
            self.follows(references.last().unwrap(), &id, Quality::Reference);
        } else if let Some(root) = references.first() {
            self.follows(root, &id, Quality::Reference);
        }

        if self.by_id[&id].parent.is_none() {
            self.roots.insert(id);
        }
    }

    /// Removes deleted messages from the graph (spec.md §4.9 "remain in
    /// the graph until `clean()` is called").
    pub fn clean(&mut self) {
        let deleted: Vec<String> = self.by_id.iter().filter(|(_, n)| n.deleted).map(|(id, _)| id.clone()).collect();
        for id in deleted {
            if let Some(node) = self.by_id.remove(&id) {
                self.roots.remove(&id);
                for other in self.by_id.values_mut() {
                    other.follow_ups.remove(&id);
                    if other.parent.as_deref() == Some(id.as_str()) {
                        other.parent = None;
                    }
                }
                for child in node.follow_ups {
                    self.roots.insert(child);
                }
            }
        }
    }

    /// Walks from `msg`'s node to the thread's root id, in O(depth).
    pub fn thread_start(&self, msg: &Message) -> Option<&str> {
        let mut current = self.by_id.get(msg.message_id())?;
        while let Some(parent_id) = &current.parent {
            match self.by_id.get(parent_id) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        Some(&current.id)
    }

    /// The root node of the thread containing `msg`.
    pub fn thread(&self, msg: &Message) -> Option<&Node> {
        self.thread_start(msg).and_then(|id| self.by_id.get(id))
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.by_id.get(id)
    }

    pub fn roots(&self) -> impl Iterator<Item = &Node> {
        self.roots.iter().filter_map(|id| self.by_id.get(id.as_str()))
    }
}

fn message_size(message: &Message) -> u64 {
    message.body().size()
}

/// Extracts `msgid` tokens (angle-bracket delimited, RFC 5322 `msg-id`)
/// from a raw `In-Reply-To`/`References` field body.
fn extract_message_ids(body: &str) -> Vec<String> {
    let mut ids = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find('<') {
        let Some(end) = rest[start..].find('>') else { break };
        ids.push(rest[start + 1..start + end].to_string());
        rest = &rest[start + end + 1..];
    }
    ids
}

fn first_message_id(body: &str) -> Option<String> {
    extract_message_ids(body).into_iter().next()
}

const KB: u64 = 1_000;
const MB: u64 = 1_000_000;

/// Formats a byte count as a fixed-width short size (spec.md §4.9
/// `shortSize` table).
pub fn short_size(size: u64) -> String {
    if size < KB {
        format!("{size:<3} ")
    } else if size < 10 * KB {
        format!("{:.1}K", size as f64 / KB as f64)
    } else if size < 100 * KB {
        format!("{}K", size / KB)
    } else if size < MB {
        format!("{:.1}M", size as f64 / MB as f64)
    } else {
        format!("{}M", size / MB)
    }
}

/// Renders `node` and its descendants as an ASCII tree, `|-`/`` `- ``
/// branch glyphs, `*-` marking dummy nodes without a realised message
/// (spec.md §4.9 "Rendering").
pub fn thread_to_string(builder: &ThreadBuilder, node: &Node) -> String {
    let mut out = String::new();
    render_node(builder, node, "", true, &mut out);
    out
}

fn render_node(builder: &ThreadBuilder, node: &Node, prefix: &str, is_last: bool, out: &mut String) {
    let branch = if prefix.is_empty() {
        ""
    } else if is_last {
        "`-"
    } else {
        "|-"
    };
    let glyph = if node.is_dummy() { "*-" } else { branch };
    let size = node.size.map(short_size).unwrap_or_else(|| "    ".to_string());
    out.push_str(prefix);
    out.push_str(glyph);
    out.push_str(&size);
    out.push_str(&node.id);
    out.push('\n');

    let mut children: Vec<&Node> = node.follow_ups.iter().filter_map(|id| builder.node(id)).collect();
    children.sort_by(|a, b| a.id.cmp(&b.id));

    let child_prefix = format!("{prefix}{} ", if prefix.is_empty() { "" } else { " " });
    for (i, child) in children.iter().enumerate() {
        render_node(builder, child, &child_prefix, i + 1 == children.len(), out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{Body, BodyMeta};
    use crate::field::Field;
    use crate::head::{FieldMap, Head};
    use crate::message::Message;

    fn msg(id: &str, in_reply_to: Option<&str>) -> Message {
        let mut fields = FieldMap::new();
        if let Some(parent) = in_reply_to {
            fields.add(Field::new("In-Reply-To", format!("<{parent}>")));
        }
        Message::new(id, Head::Complete(fields), Body::Str(BodyMeta::default(), String::new()))
    }

    #[test]
    fn reply_establishes_parent() {
        let root = msg("root@x", None);
        let child = msg("child@x", Some("root@x"));
        let mut builder = ThreadBuilder::new();
        builder.add(&root);
        builder.add(&child);

        assert_eq!(builder.thread_start(&child), Some("root@x"));
        assert_eq!(builder.roots().count(), 1);
    }

    #[test]
    fn reply_quality_beats_guess_root() {
        let mut builder = ThreadBuilder::new();
        let child = msg("child@x", Some("root@x"));
        builder.add(&child);
        assert!(builder.node("root@x").unwrap().is_dummy());
        assert_eq!(builder.node("child@x").unwrap().quality, Quality::Reply);
    }

    #[test]
    fn short_size_table() {
        assert_eq!(short_size(999), "999 ");
        assert_eq!(short_size(1500), "1.5K");
        assert_eq!(short_size(50_000), "50K");
        assert_eq!(short_size(250_000), "0.2M");
    }
}
