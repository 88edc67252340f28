/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

//! # mailfolder
//!
//! _mailfolder_ is a **local mail-folder engine** written in Rust: it opens
//! and maintains mbox, MH and Maildir folders, exposes their messages
//! through a single shared MIME model with delay-loaded heads/bodies, and
//! builds `In-Reply-To`/`References` conversation threads over them.
//!
//! It does not speak SMTP/IMAP/POP3 and does not send mail — it is the
//! on-disk storage layer an MUA or indexer sits on top of.
//!
//! ## Components
//!
//! - [`parse`] — a byte-range-aware scanner (`Parser`) that locates message
//!   boundaries in mbox/MH/Maildir sources and hands off header parsing to
//!   [`parsers::header`].
//! - [`field`] / [`head`] — a single parsed header field (`Field`) and the
//!   ordered field map a message's head realises into.
//! - [`body`] / [`codec`] — the four-realisation (`Lines`/`Str`/`File`/
//!   `Delayed`) plus two structured (`Multipart`/`Nested`) body model, and
//!   the transfer-encoding codec (7bit/8bit/binary/quoted-printable/base64)
//!   that moves between them.
//! - [`message`] — a head+body pair plus labels, sequence number and a weak
//!   back-reference to the folder it came from.
//! - [`locker`] — advisory file locking (dotlock and `flock`) shared by
//!   every folder backend.
//! - [`folder`] — the `Folder` trait and its three backends:
//!   [`folder::mbox`], [`folder::mh`] and [`folder::maildir`].
//! - [`thread`] — JWZ-style conversation threading over a folder's messages.
//! - [`manager`] — a registry of open folders, folder-type autodetection,
//!   and cross-folder copy/move/thread operations.
//! - [`config`] — parser tuning, per-open `FolderOptions`, and manager-wide
//!   defaults loadable from TOML.
//! - [`error`] / [`logging`] — the crate's error type and a bounded
//!   per-message/folder/manager event log.
//!
//! ## Usage example
//!
//! ```
//! use mailfolder::config::FolderOptions;
//! use mailfolder::folder::mbox::MboxFolder;
//! use mailfolder::folder::Folder;
//!
//! # fn main() -> mailfolder::error::Result<()> {
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("inbox.mbox");
//! std::fs::write(&path, b"From a@b Mon Jan  1 00:00:00 2024\r\nSubject: hi\r\n\r\nbody\r\n").unwrap();
//!
//! let mut folder = MboxFolder::open(FolderOptions::new(path))?;
//! assert_eq!(folder.messages().len(), 1);
//! # Ok(())
//! # }
//! ```

mod core;
pub use core::types::*;

pub mod decoders;
pub mod parsers;

pub mod error;
pub mod logging;
pub mod config;

pub mod field;
pub mod head;
pub mod body;
pub mod codec;
pub mod message;
pub mod locker;
pub mod parse;
pub mod folder;
pub mod thread;
pub mod manager;
