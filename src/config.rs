/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use std::collections::HashMap;
use std::path::PathBuf;

use crate::{Head, HeaderName, HeaderValue};

/// Per-header override table consulted by `MessageStream::parse_headers`
/// (spec.md §6, `head_type`/`body_type`/`message_type` "implementation-class
/// overrides"): an empty `header_map` keeps the default dispatch table in
/// `parsers/header.rs`, a populated one lets a caller substitute its own
/// parse function for one or more header names.
pub type HeaderParseFnc = for<'x> fn(&mut crate::parsers::MessageStream<'x>) -> HeaderValue<'x>;

#[derive(Clone)]
pub struct MessageParser {
    pub header_map: HashMap<HeaderName<'static>, HeaderParseFnc>,
    pub def_hdr_parse_fnc: HeaderParseFnc,
}

impl Default for MessageParser {
    fn default() -> Self {
        MessageParser {
            header_map: HashMap::new(),
            def_hdr_parse_fnc: |stream| stream.parse_raw(),
        }
    }
}

/// How eagerly a message body is realised on folder open (spec.md §4.6).
#[derive(Clone)]
pub enum ExtractPolicy {
    Always,
    Lazy,
    UpTo(u64),
    Predicate(std::sync::Arc<dyn Fn(&Head) -> bool + Send + Sync>),
}

impl Default for ExtractPolicy {
    fn default() -> Self {
        ExtractPolicy::Lazy
    }
}

impl ExtractPolicy {
    pub fn should_load_eagerly(&self, guessed_size: u64, head: &Head) -> bool {
        match self {
            ExtractPolicy::Always => true,
            ExtractPolicy::Lazy => false,
            ExtractPolicy::UpTo(limit) => guessed_size <= *limit,
            ExtractPolicy::Predicate(f) => f(head),
        }
    }
}

/// The default header subset loaded into a Subset head (spec.md §4.6).
pub const DEFAULT_FIELD_FILTER: &[&str] = &[
    "to",
    "from",
    "cc",
    "bcc",
    "date",
    "subject",
    "resent-to",
    "resent-from",
    "resent-cc",
    "resent-date",
    "resent-message-id",
    "message-id",
    "in-reply-to",
    "references",
    "content-type",
    "content-length",
    "lines",
    "status",
    "x-status",
];

#[derive(Clone)]
pub enum FieldFilter {
    List(Vec<String>),
    Predicate(std::sync::Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl Default for FieldFilter {
    fn default() -> Self {
        FieldFilter::List(DEFAULT_FIELD_FILTER.iter().map(|s| s.to_string()).collect())
    }
}

impl FieldFilter {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            FieldFilter::List(names) => names.iter().any(|n| n.eq_ignore_ascii_case(name)),
            FieldFilter::Predicate(f) => f(name),
        }
    }

    /// Builds the `Head::Subset` field map ingest constructs on open: only
    /// the fields this filter admits (spec.md §4.6 "Heads are always loaded
    /// into Subset with a caller-configurable field filter").
    pub fn apply(&self, fields: &crate::head::FieldMap) -> crate::head::FieldMap {
        crate::head::FieldMap::from_fields(
            fields.fields().iter().filter(|f| self.matches(f.name())).cloned().collect(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockType {
    #[default]
    Dotlock,
    Flock,
    Nfs,
    Multi,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockWait {
    Seconds(u64),
    NoTimeout,
}

impl Default for LockWait {
    fn default() -> Self {
        LockWait::Seconds(60)
    }
}

/// Mbox-only write strategy (spec.md §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WritePolicy {
    #[default]
    Replace,
    Inplace,
    Never,
}

/// Options passed to `Folder::open` (spec.md §6 "Configuration options").
#[derive(Clone)]
pub struct FolderOptions {
    pub folder: PathBuf,
    pub folderdir: Option<PathBuf>,
    pub access: AccessMode,
    pub create: bool,
    pub keep_index: bool,
    pub save_on_exit: bool,
    pub lock_type: LockType,
    pub lock_timeout: u64,
    pub lock_wait: LockWait,
    pub extract: ExtractPolicy,
    pub field_filter: FieldFilter,
    pub write_policy: WritePolicy,
    pub escape_from: bool,
    pub keep_deleted: bool,
    /// MH-only (spec.md §4.8 "Write"): `true` compacts the filename
    /// sequence to `1..N` on write; `false` leaves holes where deleted
    /// messages used to be.
    pub renumber: bool,
    pub parser: MessageParser,
}

impl Default for FolderOptions {
    fn default() -> Self {
        FolderOptions {
            folder: PathBuf::new(),
            folderdir: None,
            access: AccessMode::ReadOnly,
            create: false,
            keep_index: false,
            save_on_exit: false,
            lock_type: LockType::default(),
            lock_timeout: 3600,
            lock_wait: LockWait::default(),
            extract: ExtractPolicy::default(),
            field_filter: FieldFilter::default(),
            write_policy: WritePolicy::default(),
            // Open question (spec.md §9): the source is inconsistent on
            // whether `From `-prefixed body lines should be escaped by
            // default. Decided in DESIGN.md: no escaping by default.
            escape_from: false,
            keep_deleted: false,
            renumber: true,
            parser: MessageParser::default(),
        }
    }
}

impl FolderOptions {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        FolderOptions {
            folder: folder.into(),
            ..Default::default()
        }
    }

    pub fn access(mut self, access: AccessMode) -> Self {
        self.access = access;
        self
    }

    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    pub fn lock_type(mut self, lock_type: LockType) -> Self {
        self.lock_type = lock_type;
        self
    }

    pub fn extract(mut self, extract: ExtractPolicy) -> Self {
        self.extract = extract;
        self
    }

    pub fn renumber(mut self, renumber: bool) -> Self {
        self.renumber = renumber;
        self
    }
}

/// Manager-wide defaults (spec.md §4.10), optionally loaded from a TOML
/// file, the way `examples/dcarrero-mboxshell`'s `config.rs` loads its
/// shell configuration.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    pub folderdirs: Vec<PathBuf>,
    #[serde(default = "default_folder_type")]
    pub default_folder_type: String,
    #[serde(default)]
    pub lock_type: String,
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout: u64,
}

fn default_folder_type() -> String {
    "mbox".to_string()
}

fn default_lock_timeout() -> u64 {
    3600
}

impl Default for Config {
    fn default() -> Self {
        Config {
            folderdirs: Vec::new(),
            default_folder_type: default_folder_type(),
            lock_type: "dotlock".to_string(),
            lock_timeout: default_lock_timeout(),
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> crate::error::Result<Self> {
        toml::from_str(s).map_err(|e| crate::error::MailFolderError::Parse(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::error::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| crate::error::MailFolderError::io("read", path, e))?;
        Self::from_toml_str(&contents)
    }
}
