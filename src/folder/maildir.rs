/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

//! Maildir backend (spec.md §4.8 "Maildir"): `new/`/`cur/`/`tmp/`
//! subdirectories, flags encoded in the filename itself so label changes
//! are a single atomic `rename(2)`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::body::{Body, BodyMeta};
use crate::config::{FolderOptions, WritePolicy};
use crate::error::{MailFolderError, Result};
use crate::folder::{build_message, default_body_type, next_folder_id, BodyClass, Folder, Organization};
use crate::head::Head;
use crate::locker::Locker;
use crate::message::{labels, FolderId, Message, MessageRef, MessageSource};
use crate::parse::{content_info_from_fields, parse_structured_body, BodyHints, Parser, Separator};

/// Flag letters in the canonical ASCII order required by the `:2,` info
/// suffix (spec.md §4.8 "FLAGS sorted").
const FLAG_LETTERS: [(char, &str); 5] = [
    ('D', labels::DRAFT),
    ('F', labels::FLAGGED),
    ('R', labels::REPLIED),
    ('S', labels::SEEN),
    ('T', labels::DELETED),
];

pub struct MaildirFolder {
    folder_id: FolderId,
    path: PathBuf,
    options: FolderOptions,
    locker: Locker,
    messages: Vec<Message>,
    /// Parallel to `messages`: (subdir, unique-key, flags-at-last-write).
    entries: Vec<MaildirEntry>,
}

struct MaildirEntry {
    subdir: &'static str,
    unique: String,
    /// The `:2,FLAGS` suffix as it actually is on disk right now. Kept
    /// separate from the message's own labels so a `set_flag` made between
    /// opening the folder and calling `write` doesn't change what `write`
    /// thinks the *old* filename was.
    flags: String,
}

impl MaildirFolder {
    /// A directory containing `new/`, `cur/` and `tmp/` (spec.md §4.8
    /// "Autodetect").
    pub fn found_in(path: &Path) -> bool {
        path.is_dir() && ["new", "cur", "tmp"].iter().all(|d| path.join(d).is_dir())
    }

    pub fn open(options: FolderOptions) -> Result<Self> {
        let path = options.folder.clone();
        if options.create {
            for sub in ["new", "cur", "tmp"] {
                fs::create_dir_all(path.join(sub)).map_err(|e| MailFolderError::io("create", &path, e))?;
            }
        }

        let mut locker = Locker::new(&path, options.lock_type, options.lock_timeout);
        if !locker.lock(options.lock_wait)? {
            return Err(MailFolderError::LockFailed(format!("could not lock {}", path.display())));
        }

        let folder_id = next_folder_id();
        let mut folder = MaildirFolder {
            folder_id,
            path,
            options,
            locker,
            messages: Vec::new(),
            entries: Vec::new(),
        };
        folder.ingest()?;
        Ok(folder)
    }

    fn ingest(&mut self) -> Result<()> {
        let mut seq = 0u64;
        for subdir in ["cur", "new"] {
            let dir = self.path.join(subdir);
            let mut names: Vec<String> = fs::read_dir(&dir)
                .map_err(|e| MailFolderError::io("read_dir", &dir, e))?
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();

            for name in names {
                let file_path = dir.join(&name);
                let raw = fs::read(&file_path).map_err(|e| MailFolderError::io("read", &file_path, e))?;

                let mut parser = Parser::new(&raw, Separator::WholeFile);
                parser.read_separator();
                let (fields, hb, he) = parser.read_header(&self.options.parser)?;
                let content_info = content_info_from_fields(&fields);
                let hints = BodyHints::from_fields(&fields);

                let (unique, flags) = split_maildir_name(&name);
                let message_id = fields
                    .get("message-id")
                    .map(|f| f.body().to_string())
                    .unwrap_or_else(|| format!("synthetic-{}-{unique}@mailfolder.local", self.folder_id));

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
                for (letter, label) in FLAG_LETTERS {
                    message.set_flag(label, flags.contains(letter));
                }
                message.set_flag(labels::SEEN, subdir == "cur" && flags.contains('S'));
                message.clear_modified();

                self.entries.push(MaildirEntry { subdir, unique, flags });
                self.messages.push(message);
            }
        }
        Ok(())
    }
}

/// Splits `uniq:2,FLAGS` (cur) or a bare `uniq` (new) into its parts.
fn split_maildir_name(name: &str) -> (String, String) {
    match name.split_once(":2,") {
        Some((unique, flags)) => (unique.to_string(), flags.to_string()),
        None => (name.to_string(), String::new()),
    }
}

fn flags_string(message: &Message) -> String {
    let mut flags = String::new();
    for (letter, label) in FLAG_LETTERS {
        if message.is_labeled(label) {
            flags.push(letter);
        }
    }
    flags
}

/// Extracts the leading run of decimal digits in a unique-name as a guessed
/// delivery timestamp (spec.md §4.8 "falls back to the leading integer in
/// the filename").
fn guess_timestamp(unique: &str) -> Option<u64> {
    let digits: String = unique.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn new_unique_name() -> String {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    format!("{}.M{}P{}.mailfolder", now.as_secs(), now.subsec_micros(), std::process::id())
}

/// Rereads `path` and parses the full header starting at `range.0`,
/// discarding whatever was already cached, so a Subset/Delayed head
/// actually gains the fields its filter left out (spec.md §4.3).
fn reparse_head(path: &Path, range: (u64, u64), conf: &crate::config::MessageParser) -> Result<crate::head::FieldMap> {
    let raw = fs::read(path).map_err(|e| MailFolderError::io("read", path, e))?;
    let mut parser = Parser::new(&raw, Separator::WholeFile);
    parser.seek(range.0);
    let (fields, _hb, _he) = parser.read_header(conf)?;
    Ok(fields)
}

impl MessageSource for MaildirFolder {
    /// Rereads the message's own file and reparses its header in full,
    /// rather than returning the already-cached (possibly filtered) head
    /// (spec.md §4.3).
    fn load_head(&self, msg_ref: MessageRef) -> Result<Head> {
        let idx = self
            .messages
            .iter()
            .position(|m| m.message_ref() == Some(msg_ref))
            .ok_or(MailFolderError::AccessAfterDestruct)?;
        let range = self.messages[idx].head().range().ok_or(MailFolderError::AccessAfterDestruct)?;
        let entry = &self.entries[idx];
        let file_path = self.path.join(entry.subdir).join(current_filename(entry));
        Ok(Head::Complete(reparse_head(&file_path, range, &self.options.parser)?))
    }

    fn load_body(&self, msg_ref: MessageRef) -> Result<Body> {
        let idx = self
            .messages
            .iter()
            .position(|m| m.message_ref() == Some(msg_ref))
            .ok_or(MailFolderError::AccessAfterDestruct)?;
        let entry = &self.entries[idx];
        let file_path = self.path.join(entry.subdir).join(current_filename(entry));
        let raw = fs::read(&file_path).map_err(|e| MailFolderError::io("read", &file_path, e))?;
        let mut parser = Parser::new(&raw, Separator::WholeFile);
        parser.read_separator();
        let (fields, _hb, _he) = parser.read_header(&self.options.parser)?;
        let (begin, end, body_raw) = parser.extract_body_raw(BodyHints::default())?;
        let mut body = parse_structured_body(&fields, &body_raw, &self.options.parser)?;
        body.meta_mut().range = Some((begin, end));
        Ok(body)
    }
}

fn current_filename(entry: &MaildirEntry) -> String {
    if entry.subdir == "new" {
        entry.unique.clone()
    } else {
        format!("{}:2,{}", entry.unique, entry.flags)
    }
}

impl Folder for MaildirFolder {
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
        let seq = self.messages.len() as u64 + 1;
        let mut message = message;
        message.attach(MessageRef::new(self.folder_id, seq));
        self.entries.push(MaildirEntry { subdir: "new", unique: new_unique_name(), flags: String::new() });
        self.messages.push(message);
        self.messages.last().unwrap()
    }

    /// Every modified message is rewritten in place; its flags (and
    /// therefore filename) are resynced by renaming to the name
    /// `flags_string` currently computes. Deliver-time `new/` -> `cur/`
    /// promotion happens as soon as a message is flagged `seen` (spec.md
    /// §4.8 "accept() moves new/ -> cur/").
    fn write(&mut self, _policy: WritePolicy) -> Result<()> {
        // A modified message's header is reprinted in full below; a Subset
        // head must become Complete first or the fields its filter excluded
        // are lost for good.
        for (message, entry) in self.messages.iter_mut().zip(&self.entries) {
            if message.is_modified() {
                if let Some(range) = message.head().range() {
                    let path = self.path.join(entry.subdir).join(current_filename(entry));
                    let fields = reparse_head(&path, range, &self.options.parser)?;
                    message.set_head(Head::Complete(fields));
                }
            }
        }

        let mut kept_messages = Vec::new();
        let mut kept_entries = Vec::new();

        for (message, entry) in self.messages.drain(..).zip(self.entries.drain(..)) {
            let old_path = self.path.join(entry.subdir).join(current_filename(&entry));

            if message.is_labeled(labels::DELETED) && !self.options.keep_deleted {
                let _ = fs::remove_file(&old_path);
                continue;
            }

            let new_subdir = if message.is_labeled(labels::SEEN) || entry.subdir == "cur" {
                "cur"
            } else {
                "new"
            };
            let new_name = if new_subdir == "new" {
                entry.unique.clone()
            } else {
                format!("{}:2,{}", entry.unique, flags_string(&message))
            };
            let new_path = self.path.join(new_subdir).join(&new_name);

            if message.is_modified() {
                let fields = message.head().fields().cloned().ok_or(MailFolderError::AccessAfterDestruct)?;
                let mut out = fields.print();
                // A head-only edit leaves the body Delayed; copy its
                // original bytes from the still-untouched on-disk file
                // instead of realising it (spec.md §8-B).
                let body_text = match message.body() {
                    Body::Delayed(meta, _) => {
                        let (begin, end) = meta.range.ok_or(MailFolderError::AccessAfterDestruct)?;
                        let raw = fs::read(&old_path).map_err(|e| MailFolderError::io("read", &old_path, e))?;
                        String::from_utf8_lossy(&raw[begin as usize..end as usize]).into_owned()
                    }
                    body => body.string(),
                };
                out.push_str(&body_text);
                fs::write(&new_path, out).map_err(|e| MailFolderError::io("write", &new_path, e))?;
                if old_path != new_path {
                    let _ = fs::remove_file(&old_path);
                }
            } else if old_path != new_path {
                fs::rename(&old_path, &new_path).map_err(|e| MailFolderError::io("rename", &new_path, e))?;
            }

            kept_entries.push(MaildirEntry { subdir: new_subdir, unique: entry.unique, flags: flags_string(&message) });
            kept_messages.push(message);
        }

        self.messages = kept_messages;
        self.entries = kept_entries;

        for message in &mut self.messages {
            message.clear_modified();
        }
        Ok(())
    }

    fn determine_body_type(&self, head: &Head) -> BodyClass {
        let content = head.fields().map(content_info_from_fields).unwrap_or_default();
        default_body_type(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_flags_from_cur_name() {
        let (unique, flags) = split_maildir_name("1626300000.M123P456.host:2,FS");
        assert_eq!(unique, "1626300000.M123P456.host");
        assert_eq!(flags, "FS");
    }

    #[test]
    fn bare_new_name_has_no_flags() {
        let (unique, flags) = split_maildir_name("1626300000.M123P456.host");
        assert_eq!(unique, "1626300000.M123P456.host");
        assert!(flags.is_empty());
    }

    #[test]
    fn timestamp_guessed_from_leading_digits() {
        assert_eq!(guess_timestamp("1626300000.M123P456.host"), Some(1626300000));
        assert_eq!(guess_timestamp("no-digits-here"), None);
    }
}
