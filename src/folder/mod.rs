/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

//! C8/C9: Folder — the abstract backend contract (spec.md §4.8) and the
//! three concrete storage policies (mbox/MH/Maildir).

pub mod maildir;
pub mod mbox;
pub mod mh;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::body::{Body, ContentInfo};
use crate::config::FolderOptions;
use crate::error::Result;
use crate::head::Head;
use crate::message::{FolderId, Message};

static NEXT_FOLDER_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_folder_id() -> FolderId {
    NEXT_FOLDER_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Organization {
    File,
    Directory,
}

/// Default in-memory realisation a folder picks for a freshly parsed
/// message body, before any caller-specific predicate runs (spec.md §4.8
/// `determine_body_type`).
pub fn default_body_type(content: &ContentInfo) -> BodyClass {
    if content.mime_type.starts_with("multipart/") {
        BodyClass::Multipart
    } else if content.mime_type == "message/rfc822" {
        BodyClass::Nested
    } else {
        BodyClass::Str
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyClass {
    Str,
    Lines,
    File,
    Multipart,
    Nested,
}

/// Shared capability set every storage backend implements (spec.md §4.8).
pub trait Folder {
    fn folder_id(&self) -> FolderId;
    fn path(&self) -> &Path;
    fn organization(&self) -> Organization;

    fn messages(&self) -> &[Message];
    fn messages_mut(&mut self) -> &mut [Message];

    fn message(&self, idx: usize) -> Option<&Message> {
        self.messages().get(idx)
    }

    fn message_by_id(&self, id: &str) -> Option<&Message> {
        self.messages().iter().find(|m| m.message_id() == id)
    }

    /// Appends `message`, or returns the existing one if its Message-Id is
    /// already present (spec.md §4.8 "if already present by message-id,
    /// return existing").
    fn add_message(&mut self, message: Message) -> &Message;

    fn delete_message(&mut self, idx: usize) {
        if let Some(m) = self.messages_mut().get_mut(idx) {
            m.set_flag(crate::message::labels::DELETED, true);
        }
    }

    fn list_subfolders(&self) -> Vec<String> {
        Vec::new()
    }

    fn determine_body_type(&self, head: &Head) -> BodyClass {
        let content = head
            .fields()
            .and_then(|f| f.get("content-type"))
            .map(|_| crate::parse::content_info_from_fields(head.fields().unwrap()))
            .unwrap_or_default();
        default_body_type(&content)
    }

    fn write(&mut self, policy: crate::config::WritePolicy) -> Result<()>;

    fn close(&mut self, opts: &FolderOptions) -> Result<()> {
        if opts.save_on_exit {
            self.write(opts.write_policy)?;
        }
        Ok(())
    }
}

/// Coerces a realised head/body pair plus a synthesised/extracted
/// Message-Id into a `Message`, the shared last step of every backend's
/// open-time ingest loop.
pub fn build_message(message_id: String, head: Head, body: Body) -> Message {
    let mut message = Message::new(message_id, head, body);
    message.set_trusted(true);
    message
}
