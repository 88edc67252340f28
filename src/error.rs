/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use std::path::PathBuf;

/// Errors surfaced by the public API. Recoverable parse/codec failures are
/// handled internally (logged + downgraded) and never constructed here; see
/// `MalformedHeader`/`MalformedBody` for the cases that are surfaced anyway
/// because the caller asked for strict parsing.
#[derive(Debug, thiserror::Error)]
pub enum MailFolderError {
    #[error("failed to acquire lock: {0}")]
    LockFailed(String),

    #[error("malformed header at offset {position}: {reason}")]
    MalformedHeader { position: usize, reason: String },

    #[error("malformed body ({encoding}): {reason}")]
    MalformedBody { encoding: String, reason: String },

    #[error("I/O error during {op} on {path}: {cause}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        cause: std::io::Error,
    },

    #[error("unknown folder type for {0}")]
    UnknownFolderType(PathBuf),

    #[error("accessed head/body of a destructed message")]
    AccessAfterDestruct,

    #[error("labels are read-only on this folder")]
    LabelsReadOnly,

    #[error("parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, MailFolderError>;

impl MailFolderError {
    pub fn io(op: &'static str, path: impl Into<PathBuf>, cause: std::io::Error) -> Self {
        MailFolderError::Io {
            op,
            path: path.into(),
            cause,
        }
    }
}
