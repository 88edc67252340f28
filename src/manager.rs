/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

//! C11: Manager — registry of open folders and the folder-type detection
//! table (spec.md §4.10), grounded on `dcarrero-mboxshell`'s
//! store-registry/threading pattern of keeping open handles in a map keyed
//! by a normalised name and building threads lazily over a folder's
//! messages.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::FolderOptions;
use crate::error::{MailFolderError, Result};
use crate::folder::maildir::MaildirFolder;
use crate::folder::mbox::MboxFolder;
use crate::folder::mh::MhFolder;
use crate::folder::Folder;
use crate::message::Message;
use crate::thread::ThreadBuilder;

/// One registered backend: a name, a `found_in` probe, and the constructor
/// that turns options into an open `Folder`.
struct FolderType {
    name: &'static str,
    found_in: fn(&Path) -> bool,
    open: fn(FolderOptions) -> Result<Box<dyn Folder>>,
}

/// Holds the set of currently open folders and the ordered backend list
/// used to autodetect a folder's type (spec.md §4.10).
pub struct Manager {
    folder_types: Vec<FolderType>,
    folderdirs: Vec<PathBuf>,
    default_folder_type: String,
    open_folders: HashMap<String, Box<dyn Folder>>,
}

impl Default for Manager {
    fn default() -> Self {
        Manager::new()
    }
}

impl Manager {
    pub fn new() -> Self {
        Manager {
            folder_types: vec![
                FolderType {
                    name: "maildir",
                    found_in: MaildirFolder::found_in,
                    open: |opts| Ok(Box::new(MaildirFolder::open(opts)?)),
                },
                FolderType {
                    name: "mh",
                    found_in: MhFolder::found_in,
                    open: |opts| Ok(Box::new(MhFolder::open(opts)?)),
                },
                FolderType {
                    name: "mbox",
                    found_in: MboxFolder::found_in,
                    open: |opts| Ok(Box::new(MboxFolder::open(opts)?)),
                },
            ],
            folderdirs: Vec::new(),
            default_folder_type: "mbox".to_string(),
            open_folders: HashMap::new(),
        }
    }

    pub fn from_config(config: &crate::config::Config) -> Self {
        let mut manager = Manager::new();
        manager.folderdirs = config.folderdirs.clone();
        manager.default_folder_type = config.default_folder_type.clone();
        manager
    }

    pub fn set_folderdirs(&mut self, dirs: Vec<PathBuf>) {
        self.folderdirs = dirs;
    }

    /// Registers a user-supplied backend ahead of the built-in ones so it
    /// is tried first during autodetection (spec.md §4.10 "User-registered
    /// types take precedence").
    pub fn register_backend(
        &mut self,
        name: &'static str,
        found_in: fn(&Path) -> bool,
        open: fn(FolderOptions) -> Result<Box<dyn Folder>>,
    ) {
        self.folder_types.insert(0, FolderType { name, found_in, open });
    }

    /// Resolves a leading `=name` against `folderdirs`, substituting the
    /// first directory that contains it (spec.md §4.10 "`=name`
    /// resolution").
    fn resolve_name(&self, name: &str) -> PathBuf {
        if let Some(stripped) = name.strip_prefix('=') {
            for dir in &self.folderdirs {
                let candidate = dir.join(stripped);
                if candidate.exists() {
                    return candidate;
                }
            }
            if let Some(dir) = self.folderdirs.first() {
                return dir.join(stripped);
            }
        }
        PathBuf::from(name)
    }

    fn normalised_key(path: &Path) -> String {
        path.canonicalize().unwrap_or_else(|_| path.to_path_buf()).to_string_lossy().into_owned()
    }

    fn detect_backend(&self, path: &Path) -> String {
        for ft in &self.folder_types {
            if (ft.found_in)(path) {
                return ft.name.to_string();
            }
        }
        self.default_folder_type.clone()
    }

    fn opener_for(&self, name: &str) -> Option<fn(FolderOptions) -> Result<Box<dyn Folder>>> {
        self.folder_types.iter().find(|ft| ft.name == name).map(|ft| ft.open)
    }

    /// Opens `opts.folder`, resolving `=name` and autodetecting the
    /// backend; re-opening an already-open folder returns the existing
    /// handle (spec.md §4.10 "de-duplicates").
    pub fn open(&mut self, mut opts: FolderOptions) -> Result<&mut dyn Folder> {
        let resolved = self.resolve_name(&opts.folder.to_string_lossy());
        opts.folder = resolved.clone();
        let key = Self::normalised_key(&resolved);

        if !self.open_folders.contains_key(&key) {
            let backend_name = self.detect_backend(&resolved);
            let opener = self
                .opener_for(&backend_name)
                .ok_or_else(|| MailFolderError::Parse(format!("unknown folder backend {backend_name}")))?;
            let folder = opener(opts)?;
            self.open_folders.insert(key.clone(), folder);
        }

        Ok(self.open_folders.get_mut(&key).unwrap().as_mut())
    }

    pub fn get(&self, path: &Path) -> Option<&dyn Folder> {
        let key = Self::normalised_key(path);
        self.open_folders.get(&key).map(|f| f.as_ref())
    }

    /// Writes (if requested) and removes `path` from the registry (spec.md
    /// §4.10 "removes from the registry, calls Folder.close").
    pub fn close(&mut self, path: &Path, opts: &FolderOptions) -> Result<()> {
        let key = Self::normalised_key(path);
        if let Some(mut folder) = self.open_folders.remove(&key) {
            folder.close(opts)?;
        }
        Ok(())
    }

    pub fn close_all(&mut self, opts: &FolderOptions) -> Result<()> {
        let keys: Vec<String> = self.open_folders.keys().cloned().collect();
        for key in keys {
            if let Some(mut folder) = self.open_folders.remove(&key) {
                folder.close(opts)?;
            }
        }
        Ok(())
    }

    /// Appends `message` to the folder at `path`. If it is already open,
    /// delegates to `add_message`; otherwise performs a direct
    /// open-append-close cycle without disturbing the rest of the folder
    /// (spec.md §4.10 "writes the message directly to disk").
    pub fn append_message(&mut self, path: &Path, message: Message, opts: FolderOptions) -> Result<()> {
        let key = Self::normalised_key(path);
        if let Some(folder) = self.open_folders.get_mut(&key) {
            folder.add_message(message);
            return Ok(());
        }

        let mut opts = opts;
        opts.folder = path.to_path_buf();
        let backend_name = self.detect_backend(path);
        let opener = self
            .opener_for(&backend_name)
            .ok_or_else(|| MailFolderError::Parse(format!("unknown folder backend {backend_name}")))?;
        let mut folder = opener(opts.clone())?;
        folder.add_message(message);
        folder.write(opts.write_policy)?;
        Ok(())
    }

    /// Clones `message` into `dst` (spec.md §4.10 "clones msg, adds it to
    /// dst").
    pub fn copy_message(&mut self, dst: &Path, message: &Message) -> Result<()> {
        let key = Self::normalised_key(dst);
        let folder = self
            .open_folders
            .get_mut(&key)
            .ok_or_else(|| MailFolderError::Parse(format!("folder not open: {}", dst.display())))?;
        let clone = message
            .duplicate()
            .map_err(|e| MailFolderError::io("duplicate message", dst, e))?;
        folder.add_message(clone);
        Ok(())
    }

    /// `copy_message(dst, msg)` then marks `msg` deleted in its own folder
    /// (spec.md §4.10 "copy_message(dst, msg) then msg.delete").
    pub fn move_message(&mut self, src: &Path, dst: &Path, message_id: &str) -> Result<()> {
        let src_key = Self::normalised_key(src);
        let message = self
            .open_folders
            .get(&src_key)
            .and_then(|f| f.message_by_id(message_id))
            .ok_or_else(|| MailFolderError::Parse(format!("message not found: {message_id}")))?
            .duplicate()
            .map_err(|e| MailFolderError::io("duplicate message", src, e))?;

        self.copy_message(dst, &message)?;

        if let Some(folder) = self.open_folders.get_mut(&src_key) {
            if let Some(idx) = folder.messages().iter().position(|m| m.message_id() == message_id) {
                folder.delete_message(idx);
            }
        }
        Ok(())
    }

    /// Builds a threader over the messages of one or more open folders
    /// (spec.md §4.10 "constructs and caches a Thread builder").
    pub fn threads(&self, paths: &[&Path]) -> ThreadBuilder {
        let mut builder = ThreadBuilder::new();
        for path in paths {
            let key = Self::normalised_key(path);
            if let Some(folder) = self.open_folders.get(&key) {
                for message in folder.messages() {
                    builder.add(message);
                }
            }
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_and_reopens_same_mbox() {
        let dir = tempfile::tempdir().unwrap();
        let mbox_path = dir.path().join("inbox.mbox");
        std::fs::write(&mbox_path, b"From a@b Mon Jan  1 00:00:00 2024\r\nSubject: hi\r\n\r\nbody\r\n").unwrap();

        let mut manager = Manager::new();
        let opts = FolderOptions::new(mbox_path.clone()).lock_type(crate::config::LockType::None);
        assert_eq!(manager.open(opts.clone()).unwrap().messages().len(), 1);
        assert_eq!(manager.open(opts).unwrap().messages().len(), 1);
        assert_eq!(manager.open_folders.len(), 1);
    }
}
