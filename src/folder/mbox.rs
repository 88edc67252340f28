/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

//! Mbox backend (spec.md §4.8 "Mbox"): single file, messages separated by
//! `From ` lines. Grounded on the teacher's own (unwired) `mailbox/mbox.rs`
//! reader for the `From `/`>From` quoting convention.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::body::{Body, BodyMeta};
use crate::config::{FolderOptions, WritePolicy};
use crate::error::{MailFolderError, Result};
use crate::field::Field;
use crate::folder::{build_message, default_body_type, next_folder_id, BodyClass, Folder, Organization};
use crate::head::Head;
use crate::locker::Locker;
use crate::message::{labels, FolderId, Message, MessageRef, MessageSource};
use crate::parse::{content_info_from_fields, parse_structured_body, BodyHints, Parser, Separator};

pub struct MboxFolder {
    folder_id: FolderId,
    path: PathBuf,
    options: FolderOptions,
    locker: Locker,
    messages: Vec<Message>,
    from_lines: Vec<String>,
    raw: Vec<u8>,
}

impl MboxFolder {
    /// A plain file whose first line matches `/^From /` (spec.md §4.8
    /// "Autodetect").
    pub fn found_in(path: &Path) -> bool {
        fs::read(path)
            .map(|data| data.starts_with(b"From "))
            .unwrap_or(false)
    }

    pub fn open(options: FolderOptions) -> Result<Self> {
        let path = options.folder.clone();
        let mut locker = Locker::new(&path, options.lock_type, options.lock_timeout);
        if !locker.lock(options.lock_wait)? {
            return Err(MailFolderError::LockFailed(format!(
                "could not lock {}",
                path.display()
            )));
        }

        let raw = if path.exists() {
            fs::read(&path).map_err(|e| MailFolderError::io("read", &path, e))?
        } else if options.create {
            Vec::new()
        } else {
            return Err(MailFolderError::io(
                "open",
                &path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "folder does not exist"),
            ));
        };

        let folder_id = next_folder_id();
        let mut folder = MboxFolder {
            folder_id,
            path,
            options,
            locker,
            messages: Vec::new(),
            from_lines: Vec::new(),
            raw,
        };
        folder.ingest()?;
        Ok(folder)
    }

    fn ingest(&mut self) -> Result<()> {
        let data: &[u8] = &self.raw;
        let mut parser = Parser::new(data, Separator::MboxFrom);

        let mut seq = 0u64;
        while let Some((from_begin, from_end)) = parser.read_separator() {
            let from_line = String::from_utf8_lossy(&data[from_begin as usize..from_end as usize])
                .trim_end()
                .to_string();

            let (fields, hb, he) = parser.read_header(&self.options.parser)?;
            let content_info = content_info_from_fields(&fields);
            let hints = BodyHints::from_fields(&fields);

            let message_id = fields
                .get("message-id")
                .map(|f| f.body().to_string())
                .unwrap_or_else(|| synthesize_message_id(self.folder_id, seq));
            let (status_seen, status_old) = fields
                .get("status")
                .map(|f| (f.body().contains('R'), f.body().contains('O')))
                .unwrap_or((false, false));

            seq += 1;
            let msg_ref = MessageRef::new(self.folder_id, seq);
            let filtered = self.options.field_filter.apply(&fields);
            let head = Head::Subset { fields: filtered, owner: msg_ref, range: (hb, he) };
            let eager = self.options.extract.should_load_eagerly(hints.guessed_size(), &head);

            let body = if eager {
                let (begin, end, raw) = parser.extract_body_raw(hints)?;
                parse_structured_body(&fields, &raw, &self.options.parser).map(
                    |mut b| {
                        b.meta_mut().range = Some((begin, end));
                        b
                    },
                )?
            } else {
                let (begin, end, _raw) = parser.extract_body_raw(hints)?;
                Body::Delayed(
                    BodyMeta { content_info, range: Some((begin, end)), ..Default::default() },
                    msg_ref,
                )
            };

            let mut message = build_message(message_id, head, body);
            message.attach(msg_ref);
            message.set_flag(labels::SEEN, status_seen);
            message.set_flag(labels::OLD, status_old);
            message.clear_modified();

            self.from_lines.push(from_line);
            self.messages.push(message);
        }

        Ok(())
    }
}

fn synthesize_message_id(folder_id: FolderId, seq: u64) -> String {
    format!("synthetic-{folder_id}-{seq}@mailfolder.local")
}

/// Reparses the full header starting at `range.0` in `raw`, discarding
/// whatever was already cached, so a Subset/Delayed head actually gains the
/// fields its filter left out (spec.md §4.3).
fn reparse_head(raw: &[u8], range: (u64, u64), conf: &crate::config::MessageParser) -> Result<crate::head::FieldMap> {
    let mut parser = Parser::new(raw, Separator::WholeFile);
    parser.seek(range.0);
    let (fields, _hb, _he) = parser.read_header(conf)?;
    Ok(fields)
}

impl MessageSource for MboxFolder {
    /// Reparses the full header from the stored byte range rather than
    /// returning whatever the Message already has cached, so a Subset or
    /// Delayed head actually gains the fields its filter left out (spec.md
    /// §4.3 "loaded from the owning Message's file location").
    fn load_head(&self, msg_ref: MessageRef) -> Result<Head> {
        let message = self
            .messages
            .iter()
            .find(|m| m.message_ref() == Some(msg_ref))
            .ok_or(MailFolderError::AccessAfterDestruct)?;
        let range = message.head().range().ok_or(MailFolderError::AccessAfterDestruct)?;
        Ok(Head::Complete(reparse_head(&self.raw, range, &self.options.parser)?))
    }

    fn load_body(&self, msg_ref: MessageRef) -> Result<Body> {
        let idx = self
            .messages
            .iter()
            .position(|m| m.message_ref() == Some(msg_ref))
            .ok_or(MailFolderError::AccessAfterDestruct)?;
        let (begin, end) = self.messages[idx]
            .body()
            .meta()
            .range
            .ok_or(MailFolderError::AccessAfterDestruct)?;
        let fields = self.messages[idx].head().fields().ok_or(MailFolderError::AccessAfterDestruct)?;
        let raw = &self.raw[begin as usize..end as usize];
        let mut body = parse_structured_body(fields, raw, &self.options.parser)?;
        body.meta_mut().range = Some((begin, end));
        Ok(body)
    }
}

impl Folder for MboxFolder {
    fn folder_id(&self) -> FolderId {
        self.folder_id
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn organization(&self) -> Organization {
        Organization::File
    }

    fn messages(&self) -> &[Message] {
        &self.messages
    }

    fn messages_mut(&mut self) -> &mut [Message] {
        &mut self.messages
    }

    fn add_message(&mut self, message: Message) -> &Message {
        if let Some(idx) = self.messages.iter().position(|m| m.message_id() == message.message_id()) {
            return &self.messages[idx];
        }
        let seq = self.messages.len() as u64 + 1;
        let mut message = message;
        message.attach(MessageRef::new(self.folder_id, seq));
        self.from_lines.push(format!("From MAILER-DAEMON {}", "Thu Jan  1 00:00:00 1970"));
        self.messages.push(message);
        self.messages.last().unwrap()
    }

    /// `INPLACE` degrades to the same atomic-rename strategy as `REPLACE`
    /// here: without a live file descriptor held across the whole folder
    /// lifetime there is no in-place byte surgery to do safely, and a
    /// rewrite of a single-file mbox is already O(file size) either way.
    fn write(&mut self, policy: WritePolicy) -> Result<()> {
        if let WritePolicy::Never = policy {
            tracing::warn!(folder = %self.path.display(), "write skipped: policy is NEVER");
            return Ok(());
        }

        // Every surviving message's header is reprinted below regardless of
        // modification status, since the whole file is rewritten anyway; a
        // Subset head must become Complete first or the fields its filter
        // excluded are lost for good.
        for message in &mut self.messages {
            if let Some(range) = message.head().range() {
                let fields = reparse_head(&self.raw, range, &self.options.parser)?;
                message.set_head(Head::Complete(fields));
            }
        }

        let tmp_path = self.path.with_extension("new");
        let mut out = fs::File::create(&tmp_path).map_err(|e| MailFolderError::io("create", &tmp_path, e))?;

        for (idx, message) in self.messages.iter().enumerate() {
            if message.is_labeled(labels::DELETED) && !self.options.keep_deleted {
                continue;
            }

            let from_line = self
                .from_lines
                .get(idx)
                .cloned()
                .unwrap_or_else(|| "From MAILER-DAEMON Thu Jan  1 00:00:00 1970".to_string());
            writeln!(out, "{from_line}").map_err(|e| MailFolderError::io("write", &tmp_path, e))?;

            let mut fields = message
                .head()
                .fields()
                .cloned()
                .ok_or(MailFolderError::AccessAfterDestruct)?;
            fields.set(status_field(message));
            out.write_all(fields.print().as_bytes())
                .map_err(|e| MailFolderError::io("write", &tmp_path, e))?;

            let body_text = match message.body() {
                // An untouched Delayed body never got reparsed; copy its
                // original bytes straight from the source file rather than
                // realising it, matching spec.md §8-B (messages whose head
                // alone was modified stay `is_delayed=true`).
                Body::Delayed(meta, _) => {
                    let (begin, end) = meta.range.ok_or(MailFolderError::AccessAfterDestruct)?;
                    String::from_utf8_lossy(&self.raw[begin as usize..end as usize]).into_owned()
                }
                body => body.string(),
            };
            let body_text = if self.options.escape_from {
                escape_from_lines(&body_text)
            } else {
                body_text
            };
            out.write_all(body_text.as_bytes())
                .map_err(|e| MailFolderError::io("write", &tmp_path, e))?;
            writeln!(out).map_err(|e| MailFolderError::io("write", &tmp_path, e))?;
        }

        out.flush().map_err(|e| MailFolderError::io("flush", &tmp_path, e))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| MailFolderError::io("rename", &self.path, e))?;
        self.raw = fs::read(&self.path).map_err(|e| MailFolderError::io("read", &self.path, e))?;

        for message in &mut self.messages {
            message.clear_modified();
        }
        Ok(())
    }

    fn determine_body_type(&self, head: &Head) -> BodyClass {
        let content = head
            .fields()
            .map(content_info_from_fields)
            .unwrap_or_default();
        default_body_type(&content)
    }
}

fn status_field(message: &Message) -> Field {
    let mut status = String::new();
    if message.is_labeled(labels::SEEN) {
        status.push('R');
    }
    if message.is_labeled(labels::OLD) {
        status.push('O');
    }
    Field::new("Status", status)
}

/// Escapes a leading `From ` in a body line to `>From ` (spec.md §4.1
/// "only when strict mode is requested").
fn escape_from_lines(body: &str) -> String {
    body.lines()
        .map(|line| if line.starts_with("From ") { format!(">{line}") } else { line.to_string() })
        .collect::<Vec<_>>()
        .join("\n")
}
