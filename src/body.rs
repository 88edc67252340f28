/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

//! C4: Body — payload with four storage realisations plus two structured
//! ones (spec.md §3). Multipart/Nested hold child `Message`s by value, not
//! by owning pointer up the tree (spec.md §9 "Multipart and nested message
//! cycles are forbidden by construction").

use std::io::{Read, Seek, Write};

use tempfile::NamedTempFile;

use crate::codec::TransferEncoding;
use crate::message::{Message, MessageRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eol {
    Cr,
    Lf,
    CrLf,
    Native,
}

impl Eol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Eol::Cr => "\r",
            Eol::Lf => "\n",
            Eol::CrLf => "\r\n",
            Eol::Native => "\n",
        }
    }
}

/// MIME content-info triple every Body carries (spec.md §3).
#[derive(Debug, Clone)]
pub struct ContentInfo {
    pub mime_type: String,
    pub charset: Option<String>,
    pub transfer_encoding: TransferEncoding,
}

impl Default for ContentInfo {
    fn default() -> Self {
        ContentInfo {
            mime_type: "text/plain".to_string(),
            charset: None,
            transfer_encoding: TransferEncoding::SevenBit,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BodyMeta {
    pub content_info: ContentInfo,
    pub disposition: Option<String>,
    pub checked: bool,
    pub modified: bool,
    /// `(begin, end)` byte range in the source file, for bodies that
    /// originated from disk.
    pub range: Option<(u64, u64)>,
    pub eol: Option<Eol>,
}

impl BodyMeta {
    /// Clones the content-info triple except `transfer_encoding`, per
    /// spec.md §4.4 "encode/decode ... `based_on` preserves the content-info
    /// triple except for `transfer_encoding`".
    pub fn based_on(&self, new_encoding: TransferEncoding) -> BodyMeta {
        BodyMeta {
            content_info: ContentInfo {
                mime_type: self.content_info.mime_type.clone(),
                charset: self.content_info.charset.clone(),
                transfer_encoding: new_encoding,
            },
            disposition: self.disposition.clone(),
            checked: false,
            modified: true,
            range: None,
            eol: self.eol,
        }
    }
}

pub enum Body {
    /// Vector of lines, each ending with `\n`.
    Lines(BodyMeta, Vec<String>),
    /// A single buffer.
    Str(BodyMeta, String),
    /// Contents in an owned temporary file; cleanup on drop.
    File(BodyMeta, NamedTempFile),
    /// Unread; realises via the owning Message at first content access.
    Delayed(BodyMeta, MessageRef),
    /// Ordered sequence of child Messages, with optional preamble/epilogue.
    Multipart {
        meta: BodyMeta,
        boundary: String,
        preamble: Option<Box<Body>>,
        parts: Vec<Message>,
        epilogue: Option<Box<Body>>,
    },
    /// Exactly one child Message (MIME `message/rfc822`).
    Nested { meta: BodyMeta, message: Box<Message> },
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Body::Lines(m, lines) => f.debug_tuple("Lines").field(m).field(&lines.len()).finish(),
            Body::Str(m, s) => f.debug_tuple("Str").field(m).field(&s.len()).finish(),
            Body::File(m, _) => f.debug_tuple("File").field(m).finish(),
            Body::Delayed(m, owner) => f.debug_tuple("Delayed").field(m).field(owner).finish(),
            Body::Multipart { meta, boundary, parts, .. } => f
                .debug_struct("Multipart")
                .field("meta", meta)
                .field("boundary", boundary)
                .field("parts", &parts.len())
                .finish(),
            Body::Nested { meta, .. } => f.debug_tuple("Nested").field(meta).finish(),
        }
    }
}

impl Body {
    pub fn meta(&self) -> &BodyMeta {
        match self {
            Body::Lines(m, _)
            | Body::Str(m, _)
            | Body::File(m, _)
            | Body::Delayed(m, _)
            | Body::Multipart { meta: m, .. }
            | Body::Nested { meta: m, .. } => m,
        }
    }

    pub fn meta_mut(&mut self) -> &mut BodyMeta {
        match self {
            Body::Lines(m, _)
            | Body::Str(m, _)
            | Body::File(m, _)
            | Body::Delayed(m, _)
            | Body::Multipart { meta: m, .. }
            | Body::Nested { meta: m, .. } => m,
        }
    }

    pub fn is_delayed(&self) -> bool {
        matches!(self, Body::Delayed(..))
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self, Body::Multipart { .. })
    }

    pub fn is_nested(&self) -> bool {
        matches!(self, Body::Nested { .. })
    }

    pub fn is_binary(&self) -> bool {
        !self.meta().content_info.mime_type.starts_with("text/") && !self.is_multipart() && !self.is_nested()
    }

    /// Materialises the content as an owned string. Panics on a Delayed
    /// body: callers must realise through `Message::load_body` first.
    pub fn string(&self) -> String {
        match self {
            Body::Lines(_, lines) => lines.concat(),
            Body::Str(_, s) => s.clone(),
            Body::File(_, file) => {
                let mut contents = String::new();
                let mut handle = file.reopen().expect("reopen temp body file");
                handle.seek(std::io::SeekFrom::Start(0)).ok();
                handle.read_to_string(&mut contents).expect("read temp body file");
                contents
            }
            Body::Delayed(..) => panic!("accessed a Delayed body without realising it first"),
            Body::Multipart { .. } | Body::Nested { .. } => String::new(),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        match self {
            Body::Lines(_, lines) => lines.clone(),
            Body::Str(_, s) => s.split_inclusive('\n').map(|l| l.to_string()).collect(),
            Body::File(..) => self
                .string()
                .split_inclusive('\n')
                .map(|l| l.to_string())
                .collect(),
            Body::Delayed(..) => panic!("accessed a Delayed body without realising it first"),
            Body::Multipart { .. } | Body::Nested { .. } => Vec::new(),
        }
    }

    pub fn n_lines(&self) -> usize {
        match self {
            Body::Lines(_, lines) => lines.len(),
            _ if !self.is_delayed() => self.string().lines().count(),
            _ => 0,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            Body::Lines(_, lines) => lines.iter().map(|l| l.len() as u64).sum(),
            Body::Str(_, s) => s.len() as u64,
            Body::File(_, file) => file
                .as_file()
                .metadata()
                .map(|m| m.len())
                .unwrap_or_default(),
            Body::Delayed(meta, _) => meta.range.map(|(b, e)| e - b).unwrap_or(0),
            Body::Multipart { .. } | Body::Nested { .. } => 0,
        }
    }

    /// Writes the contents to `out`, spilling large non-file bodies through
    /// memory (bodies already realised as `File` stream directly).
    pub fn write_to(&self, out: &mut impl Write) -> std::io::Result<()> {
        match self {
            Body::File(_, file) => {
                let mut handle = file.reopen()?;
                handle.seek(std::io::SeekFrom::Start(0))?;
                std::io::copy(&mut handle, out)?;
                Ok(())
            }
            Body::Lines(..) | Body::Str(..) => out.write_all(self.string().as_bytes()),
            Body::Delayed(..) => panic!("accessed a Delayed body without realising it first"),
            Body::Multipart {
                boundary,
                preamble,
                parts,
                epilogue,
                ..
            } => {
                if let Some(preamble) = preamble {
                    preamble.write_to(out)?;
                }
                for part in parts {
                    writeln!(out, "--{boundary}")?;
                    out.write_all(part.head_print().as_bytes())?;
                    part.body().write_to(out)?;
                }
                writeln!(out, "--{boundary}--")?;
                if let Some(epilogue) = epilogue {
                    epilogue.write_to(out)?;
                }
                Ok(())
            }
            Body::Nested { message, .. } => {
                out.write_all(message.head_print().as_bytes())?;
                message.body().write_to(out)
            }
        }
    }

    pub fn print(&self) -> String {
        let mut buf = Vec::new();
        self.write_to(&mut buf).expect("write body to memory buffer");
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Deep-copies this body, duplicating a `File` realisation's contents
    /// into a fresh temp file rather than aliasing the original (used by
    /// `Manager::copy_message`, spec.md §4.10 "clones msg").
    pub fn duplicate(&self) -> std::io::Result<Body> {
        Ok(match self {
            Body::Lines(m, lines) => Body::Lines(m.clone(), lines.clone()),
            Body::Str(m, s) => Body::Str(m.clone(), s.clone()),
            Body::File(m, file) => {
                let mut handle = file.reopen()?;
                handle.seek(std::io::SeekFrom::Start(0))?;
                let mut new_file = NamedTempFile::new()?;
                std::io::copy(&mut handle, &mut new_file)?;
                new_file.flush()?;
                Body::File(m.clone(), new_file)
            }
            Body::Delayed(m, owner) => Body::Delayed(m.clone(), *owner),
            Body::Multipart { meta, boundary, preamble, parts, epilogue } => Body::Multipart {
                meta: meta.clone(),
                boundary: boundary.clone(),
                preamble: preamble.as_ref().map(|p| p.duplicate().map(Box::new)).transpose()?,
                parts: parts.iter().map(Message::duplicate).collect::<std::io::Result<_>>()?,
                epilogue: epilogue.as_ref().map(|p| p.duplicate().map(Box::new)).transpose()?,
            },
            Body::Nested { meta, message } => Body::Nested {
                meta: meta.clone(),
                message: Box::new(message.duplicate()?),
            },
        })
    }

    /// Moves a body already realised in memory to a temp file, used when a
    /// caller's extract policy prefers not to keep large bodies resident.
    pub fn spill_to_file(&mut self) -> std::io::Result<()> {
        if matches!(self, Body::File(..)) {
            return Ok(());
        }
        let contents = self.string();
        let mut file = NamedTempFile::new()?;
        file.write_all(contents.as_bytes())?;
        file.flush()?;
        let meta = self.meta().clone();
        *self = Body::File(meta, file);
        Ok(())
    }
}

/// Regenerates a boundary string until no part's rendered content contains
/// a line starting with it (spec.md §8 invariant 7 "Boundary escape").
pub fn unique_boundary(parts: &[Message], seed: &str) -> String {
    let mut boundary = seed.to_string();
    let mut counter = 0u32;
    loop {
        let collides = parts.iter().any(|p| {
            p.body()
                .print()
                .lines()
                .any(|l| l.starts_with(boundary.as_str()))
        });
        if !collides {
            return boundary;
        }
        counter += 1;
        boundary = format!("{seed}-{counter}");
    }
}
