/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

//! MH backend (spec.md §4.8 "MH"): one file per message named by decimal
//! sequence number, labels tracked in a `.mh_sequences` sidecar.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::body::{Body, BodyMeta};
use crate::config::{FolderOptions, MessageParser, WritePolicy};
use crate::error::{MailFolderError, Result};
use crate::folder::{build_message, default_body_type, next_folder_id, BodyClass, Folder, Organization};
use crate::head::{FieldMap, Head};
use crate::locker::Locker;
use crate::message::{labels, FolderId, Message, MessageRef, MessageSource};
use crate::parse::{content_info_from_fields, parse_structured_body, BodyHints, Parser, Separator};

pub struct MhFolder {
    folder_id: FolderId,
    path: PathBuf,
    options: FolderOptions,
    locker: Locker,
    messages: Vec<Message>,
    /// Parallel to `messages`: the on-disk filename (decimal number) each
    /// message was read from, or assigned on `add_message`.
    filenames: Vec<u64>,
}

impl MhFolder {
    /// A directory containing at least one file whose name is all digits.
    pub fn found_in(path: &Path) -> bool {
        path.is_dir()
            && fs::read_dir(path)
                .map(|entries| {
                    entries
                        .filter_map(|e| e.ok())
                        .any(|e| e.file_name().to_string_lossy().parse::<u64>().is_ok())
                })
                .unwrap_or(false)
    }

    pub fn open(options: FolderOptions) -> Result<Self> {
        let path = options.folder.clone();
        if !path.exists() && options.create {
            fs::create_dir_all(&path).map_err(|e| MailFolderError::io("create", &path, e))?;
        }

        let sidecar = path.join(".mh_sequences");
        let mut locker = Locker::new(&sidecar, options.lock_type, options.lock_timeout);
        if !locker.lock(options.lock_wait)? {
            return Err(MailFolderError::LockFailed(format!("could not lock {}", path.display())));
        }

        let sequences = read_mh_sequences(&sidecar);

        let folder_id = next_folder_id();
        let mut folder = MhFolder {
            folder_id,
            path,
            options,
            locker,
            messages: Vec::new(),
            filenames: Vec::new(),
        };
        folder.ingest(&sequences)?;
        Ok(folder)
    }

    fn ingest(&mut self, sequences: &BTreeMap<String, Vec<u64>>) -> Result<()> {
        let mut numbers: Vec<u64> = fs::read_dir(&self.path)
            .map_err(|e| MailFolderError::io("read_dir", &self.path, e))?
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_string_lossy().parse::<u64>().ok())
            .collect();
        numbers.sort_unstable();

        let unseen: std::collections::HashSet<u64> =
            sequences.get("unseen").cloned().unwrap_or_default().into_iter().collect();
        let current: std::collections::HashSet<u64> =
            sequences.get("cur").cloned().unwrap_or_default().into_iter().collect();

        for (seq, number) in numbers.into_iter().enumerate() {
            let file_path = self.path.join(number.to_string());
            let raw = fs::read(&file_path).map_err(|e| MailFolderError::io("read", &file_path, e))?;

            let mut parser = Parser::new(&raw, Separator::WholeFile);
            parser.read_separator();
            let (fields, hb, he) = parser.read_header(&self.options.parser)?;
            let content_info = content_info_from_fields(&fields);
            let hints = BodyHints::from_fields(&fields);

            let message_id = fields
                .get("message-id")
                .map(|f| f.body().to_string())
                .unwrap_or_else(|| format!("synthetic-{}-{number}@mailfolder.local", self.folder_id));

            let msg_ref = MessageRef::new(self.folder_id, seq as u64 + 1);
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
            message.set_flag(labels::SEEN, !unseen.contains(&number));
            message.set_flag(labels::CURRENT, current.contains(&number));
            for (label, members) in sequences {
                if label == "unseen" || label == "cur" {
                    continue;
                }
                message.set_flag(label.clone(), members.contains(&number));
            }
            message.clear_modified();

            self.filenames.push(number);
            self.messages.push(message);
        }

        Ok(())
    }
}

/// Parses `.mh_sequences` lines `label: 3 5-8 11`, expanding ranges.
fn read_mh_sequences(path: &Path) -> BTreeMap<String, Vec<u64>> {
    let mut out = BTreeMap::new();
    let Ok(contents) = fs::read_to_string(path) else {
        return out;
    };
    for line in contents.lines() {
        let Some((label, rest)) = line.split_once(':') else { continue };
        let mut members = Vec::new();
        for token in rest.split_whitespace() {
            if let Some((a, b)) = token.split_once('-') {
                if let (Ok(a), Ok(b)) = (a.parse::<u64>(), b.parse::<u64>()) {
                    members.extend(a..=b);
                }
            } else if let Ok(n) = token.parse::<u64>() {
                members.push(n);
            }
        }
        out.insert(label.trim().to_string(), members);
    }
    out
}

/// Rereads `path` and parses the full header starting at `range.0`,
/// discarding whatever was already cached, so a Subset/Delayed head
/// actually gains the fields its filter left out (spec.md §4.3).
fn reparse_head(path: &Path, range: (u64, u64), conf: &MessageParser) -> Result<FieldMap> {
    let raw = fs::read(path).map_err(|e| MailFolderError::io("read", path, e))?;
    let mut parser = Parser::new(&raw, Separator::WholeFile);
    parser.seek(range.0);
    let (fields, _hb, _he) = parser.read_header(conf)?;
    Ok(fields)
}

/// Renders `message`'s head plus its body for the write path. A Delayed
/// body was never reparsed, so its original bytes are copied straight out
/// of the still-untouched on-disk file at `source_path` instead of being
/// realised (spec.md §8-B "messages ... remain `is_delayed=true`").
fn rendered_message(message: &Message, source_path: &Path) -> Result<String> {
    let fields = message.head().fields().cloned().ok_or(MailFolderError::AccessAfterDestruct)?;
    let mut out = fields.print();
    let body_text = match message.body() {
        Body::Delayed(meta, _) => {
            let (begin, end) = meta.range.ok_or(MailFolderError::AccessAfterDestruct)?;
            let raw = fs::read(source_path).map_err(|e| MailFolderError::io("read", source_path, e))?;
            String::from_utf8_lossy(&raw[begin as usize..end as usize]).into_owned()
        }
        body => body.string(),
    };
    out.push_str(&body_text);
    Ok(out)
}

fn write_mh_sequences(path: &Path, messages: &[Message], filenames: &[u64]) -> Result<()> {
    let mut by_label: BTreeMap<String, Vec<u64>> = BTreeMap::new();

    for (message, &number) in messages.iter().zip(filenames) {
        if !message.is_labeled(labels::SEEN) {
            by_label.entry("unseen".to_string()).or_default().push(number);
        }
        if message.is_labeled(labels::CURRENT) {
            by_label.entry("cur".to_string()).or_default().push(number);
        }
        for (name, value) in message.labels() {
            if matches!(name.as_str(), labels::SEEN | labels::CURRENT) {
                continue;
            }
            if value.as_bool() {
                by_label.entry(name.clone()).or_default().push(number);
            }
        }
    }

    let mut out = String::new();
    for (label, mut members) in by_label {
        members.sort_unstable();
        out.push_str(&label);
        out.push_str(": ");
        out.push_str(&members.iter().map(u64::to_string).collect::<Vec<_>>().join(" "));
        out.push('\n');
    }
    fs::write(path, out).map_err(|e| MailFolderError::io("write", path, e))
}

impl MessageSource for MhFolder {
    fn load_head(&self, msg_ref: MessageRef) -> Result<Head> {
        let idx = self
            .messages
            .iter()
            .position(|m| m.message_ref() == Some(msg_ref))
            .ok_or(MailFolderError::AccessAfterDestruct)?;
        let range = self.messages[idx].head().range().ok_or(MailFolderError::AccessAfterDestruct)?;
        let path = self.path.join(self.filenames[idx].to_string());
        Ok(Head::Complete(reparse_head(&path, range, &self.options.parser)?))
    }

    fn load_body(&self, msg_ref: MessageRef) -> Result<Body> {
        let idx = self
            .messages
            .iter()
            .position(|m| m.message_ref() == Some(msg_ref))
            .ok_or(MailFolderError::AccessAfterDestruct)?;
        let number = self.filenames[idx];
        let raw = fs::read(self.path.join(number.to_string()))
            .map_err(|e| MailFolderError::io("read", &self.path, e))?;
        let mut parser = Parser::new(&raw, Separator::WholeFile);
        parser.read_separator();
        let (fields, _hb, _he) = parser.read_header(&self.options.parser)?;
        let (begin, end, body_raw) = parser.extract_body_raw(BodyHints::default())?;
        let mut body = parse_structured_body(&fields, &body_raw, &self.options.parser)?;
        body.meta_mut().range = Some((begin, end));
        Ok(body)
    }
}

impl Folder for MhFolder {
    fn folder_id(&self) -> FolderId {
        self.folder_id
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn organization(&self) -> Organization {
        Organization::Directory
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
        let next_number = self.filenames.iter().max().copied().unwrap_or(0) + 1;
        let seq = self.messages.len() as u64 + 1;
        let mut message = message;
        message.attach(MessageRef::new(self.folder_id, seq));
        self.filenames.push(next_number);
        self.messages.push(message);
        self.messages.last().unwrap()
    }

    /// Dispatches to the `renumber=true` (compact to `1..N`) or
    /// `renumber=false` (leave holes) write path per `self.options.renumber`
    /// (spec.md §4.8 "Write: `renumber=true` ... `renumber=false` ...",
    /// both concretely specified, not an open question).
    fn write(&mut self, _policy: WritePolicy) -> Result<()> {
        self.realize_modified_heads()?;
        if self.options.renumber {
            self.write_compacted()
        } else {
            self.write_with_holes()
        }
    }

    fn determine_body_type(&self, head: &Head) -> BodyClass {
        let content = head.fields().map(content_info_from_fields).unwrap_or_default();
        default_body_type(&content)
    }
}

impl MhFolder {
    /// A modified message's header is reprinted in full on write; a Subset
    /// head must become Complete first or the fields its filter excluded
    /// are lost for good.
    fn realize_modified_heads(&mut self) -> Result<()> {
        for (message, &number) in self.messages.iter_mut().zip(&self.filenames) {
            let range = if message.is_modified() { message.head().range() } else { None };
            if let Some(range) = range {
                let path = self.path.join(number.to_string());
                let fields = reparse_head(&path, range, &self.options.parser)?;
                message.set_head(Head::Complete(fields));
            }
        }
        Ok(())
    }

    fn write_compacted(&mut self) -> Result<()> {
        let mut kept_filenames = Vec::new();
        let mut next_number = 1u64;

        for (message, &old_number) in self.messages.iter().zip(&self.filenames) {
            if message.is_labeled(labels::DELETED) && !self.options.keep_deleted {
                let old_path = self.path.join(old_number.to_string());
                let _ = fs::remove_file(old_path);
                continue;
            }

            let new_path = self.path.join(next_number.to_string());
            if message.is_modified() {
                let old_path = self.path.join(old_number.to_string());
                let out = rendered_message(message, &old_path)?;
                fs::write(&new_path, out).map_err(|e| MailFolderError::io("write", &new_path, e))?;
            } else if old_number != next_number {
                let old_path = self.path.join(old_number.to_string());
                fs::rename(old_path, &new_path).map_err(|e| MailFolderError::io("rename", &new_path, e))?;
            }

            kept_filenames.push(next_number);
            next_number += 1;
        }

        self.messages.retain(|m| !m.is_labeled(labels::DELETED) || self.options.keep_deleted);
        self.filenames = kept_filenames;
        self.finish_write()
    }

    /// `renumber=false`: every surviving message keeps its original
    /// filename, so deletions leave holes in the numbering (spec.md §4.8
    /// "leaves holes"). Unmodified messages aren't touched at all.
    fn write_with_holes(&mut self) -> Result<()> {
        let mut kept_filenames = Vec::new();

        for (message, &number) in self.messages.iter().zip(&self.filenames) {
            let path = self.path.join(number.to_string());
            if message.is_labeled(labels::DELETED) && !self.options.keep_deleted {
                let _ = fs::remove_file(&path);
                continue;
            }

            if message.is_modified() {
                let out = rendered_message(message, &path)?;
                fs::write(&path, out).map_err(|e| MailFolderError::io("write", &path, e))?;
            }

            kept_filenames.push(number);
        }

        self.messages.retain(|m| !m.is_labeled(labels::DELETED) || self.options.keep_deleted);
        self.filenames = kept_filenames;
        self.finish_write()
    }

    fn finish_write(&mut self) -> Result<()> {
        write_mh_sequences(&self.path.join(".mh_sequences"), &self.messages, &self.filenames)?;
        for message in &mut self.messages {
            message.clear_modified();
        }
        Ok(())
    }
}
