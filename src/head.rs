/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

//! C3: Head — an ordered multimap of Fields with three realisations
//! (spec.md §3, §4.3, §9 "Delayed realisation via implicit method
//! dispatch"). `Head` itself is the tagged variant the design note asks
//! for; realisation is driven by the owning `Message`, which the Head
//! reaches through a `MessageRef` (folder id + sequence number, never an
//! owning pointer — spec.md §9 "Weak back-references").

use crate::field::Field;
use crate::message::MessageRef;

/// Read-only+mutating capability set common to every Head realisation.
#[derive(Debug, Clone)]
pub enum Head {
    /// Every field from the source is present.
    Complete(FieldMap),
    /// A known subset is present; a miss triggers realisation.
    Subset {
        fields: FieldMap,
        owner: MessageRef,
        /// Byte range `[begin, end)` of the full header block in the
        /// source, so realisation can reparse it without rescanning the
        /// whole message (spec.md §4.3 "loaded from the owning Message's
        /// file location").
        range: (u64, u64),
    },
    /// No fields parsed yet; any access realises into Complete.
    Delayed { owner: MessageRef, range: (u64, u64) },
}

/// Preserves field insertion order while allowing O(1)-ish lookup by
/// lower-cased name. Small folders don't justify a hash index; linear scan
/// is what the teacher's own `Vec<Header>` + `GetHeader` does.
#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    fields: Vec<Field>,
    modified: bool,
}

impl FieldMap {
    pub fn new() -> Self {
        FieldMap::default()
    }

    pub fn from_fields(fields: Vec<Field>) -> Self {
        FieldMap {
            fields,
            modified: false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().rev().find(|f| f.name() == name.to_ascii_lowercase())
    }

    pub fn get_nth(&self, name: &str, idx: usize) -> Option<&Field> {
        let name = name.to_ascii_lowercase();
        self.fields.iter().filter(|f| f.name() == name).nth(idx)
    }

    pub fn get_all(&self, name: &str) -> Vec<&Field> {
        let name = name.to_ascii_lowercase();
        self.fields.iter().filter(|f| f.name() == name).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        let name = name.to_ascii_lowercase();
        self.fields.iter().filter(|f| f.name() == name).count()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for f in &self.fields {
            if !seen.contains(&f.name()) {
                seen.push(f.name());
            }
        }
        seen
    }

    /// Appends an additional occurrence of `name`.
    pub fn add(&mut self, field: Field) {
        self.fields.push(field);
        self.modified = true;
    }

    /// Replaces all existing occurrences of `field`'s name with `field`.
    pub fn set(&mut self, field: Field) {
        self.reset(field.name());
        self.fields.push(field);
        self.modified = true;
    }

    /// Removes all occurrences of `name`.
    pub fn reset(&mut self, name: &str) {
        let name = name.to_ascii_lowercase();
        let before = self.fields.len();
        self.fields.retain(|f| f.name() != name);
        if self.fields.len() != before {
            self.modified = true;
        }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn clear_modified(&mut self) {
        self.modified = false;
    }

    /// The unfolded byte size of all fields, used by the `Int` extract
    /// policy's `Content-Length`/`Lines` size guess (spec.md §4.6).
    pub fn size(&self) -> usize {
        self.fields.iter().map(|f| f.render().len()).sum()
    }

    pub fn n_lines(&self) -> usize {
        self.fields
            .iter()
            .map(|f| f.render().lines().count())
            .sum()
    }

    pub fn print(&self) -> String {
        let mut out = String::with_capacity(self.size() + 2);
        for field in &self.fields {
            out.push_str(&field.render());
        }
        out.push_str("\r\n");
        out
    }
}

impl Head {
    pub fn delayed(owner: MessageRef, range: (u64, u64)) -> Self {
        Head::Delayed { owner, range }
    }

    pub fn subset(fields: FieldMap, owner: MessageRef, range: (u64, u64)) -> Self {
        Head::Subset { fields, owner, range }
    }

    pub fn complete(fields: FieldMap) -> Self {
        Head::Complete(fields)
    }

    pub fn is_delayed(&self) -> bool {
        matches!(self, Head::Delayed { .. })
    }

    pub fn owner(&self) -> Option<MessageRef> {
        match self {
            Head::Complete(_) => None,
            Head::Subset { owner, .. } | Head::Delayed { owner, .. } => Some(*owner),
        }
    }

    /// Byte range of the header block in its source, for backends that
    /// need to reparse it on realisation.
    pub fn range(&self) -> Option<(u64, u64)> {
        match self {
            Head::Complete(_) => None,
            Head::Subset { range, .. } | Head::Delayed { range, .. } => Some(*range),
        }
    }

    /// Returns the backing `FieldMap` if this Head is already realised
    /// enough to answer without a reload (i.e. always for Complete; for
    /// Subset only the caller knows whether the field they want is
    /// guaranteed present — use `get`/`count` instead for those).
    pub fn fields(&self) -> Option<&FieldMap> {
        match self {
            Head::Complete(f) | Head::Subset { fields: f, .. } => Some(f),
            Head::Delayed { .. } => None,
        }
    }

    pub fn fields_mut(&mut self) -> Option<&mut FieldMap> {
        match self {
            Head::Complete(f) | Head::Subset { fields: f, .. } => Some(f),
            Head::Delayed { .. } => None,
        }
    }
}
