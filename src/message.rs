/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

//! C6: Message — a Head+Body pair plus labels, sequence number, and a weak
//! back-reference to the folder it came from (spec.md §3 "Message", §9
//! "Weak back-references from Message to Folder"). The back-reference is an
//! index (`folder id + sequence number`), never an owning pointer, so
//! dropping a Folder doesn't keep its Messages pinned in memory.

use std::collections::HashMap;

use crate::body::Body;
use crate::error::Result;
use crate::field::Field;
use crate::head::{FieldMap, Head};

pub type FolderId = u64;

/// Locates a Message inside a Folder without owning either. Also doubles
/// as the payload a `Head::Subset`/`Head::Delayed` or `Body::Delayed`
/// carries to know who to ask for realisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub folder_id: FolderId,
    pub seq: u64,
}

impl MessageRef {
    pub fn new(folder_id: FolderId, seq: u64) -> Self {
        MessageRef { folder_id, seq }
    }
}

/// A label's value: most are booleans (`seen`, `deleted`, `flagged`,
/// `replied`, `draft`, `old`, `current`), but the model allows free-form
/// string labels too (spec.md §3 "a label map (string → bool/string)").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelValue {
    Bool(bool),
    Text(String),
}

impl LabelValue {
    pub fn as_bool(&self) -> bool {
        match self {
            LabelValue::Bool(b) => *b,
            LabelValue::Text(s) => !s.is_empty(),
        }
    }
}

/// Canonical boolean labels every folder backend understands (spec.md §4.8,
/// §4.9 mappings to mbox `Status`/Maildir flag letters).
pub mod labels {
    pub const SEEN: &str = "seen";
    pub const DELETED: &str = "deleted";
    pub const FLAGGED: &str = "flagged";
    pub const REPLIED: &str = "replied";
    pub const DRAFT: &str = "draft";
    pub const OLD: &str = "old";
    pub const CURRENT: &str = "current";
}

/// Implemented by a Folder backend so a Message can realise a Delayed or
/// Subset head/body without holding an owning pointer back to it (spec.md
/// §4.3, §9 "Weak back-references").
pub trait MessageSource {
    fn load_head(&self, msg_ref: MessageRef) -> Result<Head>;
    fn load_body(&self, msg_ref: MessageRef) -> Result<Body>;
}

pub struct Message {
    head: Head,
    body: Body,
    message_id: String,
    labels: HashMap<String, LabelValue>,
    seq: u64,
    folder_ref: Option<MessageRef>,
    trusted: bool,
}

impl Message {
    pub fn new(message_id: impl Into<String>, head: Head, body: Body) -> Self {
        Message {
            head,
            body,
            message_id: message_id.into(),
            labels: HashMap::new(),
            seq: 0,
            folder_ref: None,
            trusted: false,
        }
    }

    /// Attaches (or reattaches, after e.g. a folder compaction renumbers
    /// messages) this Message to a folder slot.
    pub fn attach(&mut self, folder_ref: MessageRef) {
        self.seq = folder_ref.seq;
        self.folder_ref = Some(folder_ref);
    }

    pub fn detach(&mut self) {
        self.folder_ref = None;
    }

    pub fn message_ref(&self) -> Option<MessageRef> {
        self.folder_ref
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn set_message_id(&mut self, id: impl Into<String>) {
        self.message_id = id.into();
    }

    pub fn trusted(&self) -> bool {
        self.trusted
    }

    pub fn set_trusted(&mut self, trusted: bool) {
        self.trusted = trusted;
    }

    pub fn head(&self) -> &Head {
        &self.head
    }

    /// Overwrites the head realisation directly, bypassing `MessageSource`.
    /// Used by a folder backend's own write path, which already holds the
    /// raw bytes/file it would otherwise have to ask a `MessageSource` for.
    pub(crate) fn set_head(&mut self, head: Head) {
        self.head = head;
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    /// Renders the head as folded `Name: value\r\n` lines, realising it
    /// first if it is still Delayed (spec.md §4.3 "a miss triggers
    /// realisation").
    pub fn head_print(&self) -> String {
        match self.head.fields() {
            Some(fields) => fields.print(),
            None => panic!("accessed a Delayed head without realising it first"),
        }
    }

    pub fn label(&self, name: &str) -> Option<&LabelValue> {
        self.labels.get(name)
    }

    pub fn is_labeled(&self, name: &str) -> bool {
        self.labels.get(name).map(LabelValue::as_bool).unwrap_or(false)
    }

    pub fn set_label(&mut self, name: impl Into<String>, value: LabelValue) {
        self.labels.insert(name.into(), value);
    }

    pub fn set_flag(&mut self, name: impl Into<String>, value: bool) {
        self.labels.insert(name.into(), LabelValue::Bool(value));
    }

    pub fn clear_label(&mut self, name: &str) {
        self.labels.remove(name);
    }

    pub fn labels(&self) -> &HashMap<String, LabelValue> {
        &self.labels
    }

    /// True once either realisation has diverged from what's on disk
    /// (spec.md §4.3 "`modified=true` transitively up to the owning
    /// Message").
    pub fn is_modified(&self) -> bool {
        self.head.fields().map(FieldMap::is_modified).unwrap_or(false) || self.body.meta().modified
    }

    pub fn clear_modified(&mut self) {
        if let Some(fields) = self.head_mut_fields() {
            fields.clear_modified();
        }
        self.body.meta_mut().modified = false;
    }

    fn head_mut_fields(&mut self) -> Option<&mut FieldMap> {
        self.head.fields_mut()
    }

    /// Mutable access to the header fields for `add`/`set`/`reset`/`delete`
    /// (spec.md §4.3). Always realises to Complete first: mutating a Subset
    /// in place would silently drop every field the filter excluded once
    /// the message is written back out.
    pub fn head_mut(&mut self, source: &dyn MessageSource) -> Result<&mut FieldMap> {
        self.load_head(source)?;
        Ok(self.head.fields_mut().expect("load_head leaves a realised head"))
    }

    /// Realises a Delayed/Subset head into Complete via `source`, updating
    /// `self` in place (spec.md §4.6 step 3 "substitutes it in the
    /// Message").
    pub fn load_head(&mut self, source: &dyn MessageSource) -> Result<&FieldMap> {
        if matches!(self.head, Head::Complete(_)) {
            return Ok(self.head.fields().expect("Complete head always has fields"));
        }
        let msg_ref = self
            .folder_ref
            .expect("a Delayed/Subset head must carry an owning folder reference");
        self.head = source.load_head(msg_ref)?;
        Ok(self.head.fields().expect("load_head must return a realised head"))
    }

    /// Realises a Delayed body via `source` (spec.md §4.6).
    pub fn load_body(&mut self, source: &dyn MessageSource) -> Result<&Body> {
        if self.body.is_delayed() {
            let msg_ref = self
                .folder_ref
                .expect("a Delayed body must carry an owning folder reference");
            self.body = source.load_body(msg_ref)?;
        }
        Ok(&self.body)
    }

    /// Looks up `name` in whatever fields are already resident, without
    /// triggering realisation. Correct for Subset heads built from a field
    /// filter that is known to cover `name` (e.g. `ThreadBuilder` querying
    /// `in-reply-to`/`references`, both in `DEFAULT_FIELD_FILTER`); for a
    /// caller that can't make that assumption, use `get`.
    pub fn get_cached(&self, name: &str) -> Option<&Field> {
        self.head.fields().and_then(|f| f.get(name))
    }

    /// Looks up `name`, realising a Delayed/Subset head via `source` and
    /// retrying exactly once if the first lookup misses (spec.md §4.3 "any
    /// query whose result is absent triggers realisation ... after which
    /// the original query is retried exactly once").
    pub fn get(&mut self, name: &str, source: &dyn MessageSource) -> Result<Option<&Field>> {
        let hit = self.head.fields().map(|f| f.get(name).is_some()).unwrap_or(false);
        if !hit && !matches!(self.head, Head::Complete(_)) {
            self.load_head(source)?;
        }
        Ok(self.head.fields().and_then(|f| f.get(name)))
    }

    /// Deep-copies head, body and labels but not the folder attachment
    /// (used by `Manager::copy_message`/`move_message`, spec.md §4.10).
    pub fn duplicate(&self) -> std::io::Result<Message> {
        Ok(Message {
            head: self.head.clone(),
            body: self.body.duplicate()?,
            message_id: self.message_id.clone(),
            labels: self.labels.clone(),
            seq: 0,
            folder_ref: None,
            trusted: self.trusted,
        })
    }
}
