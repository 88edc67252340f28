/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

//! C2: one header field (spec.md §3 "Field"). Built on top of the parsed
//! `HeaderName`/`HeaderValue` pair the way `core/header.rs` already models
//! a header, adding the render-side concerns (folding, comments, wrap
//! length) the parser itself doesn't need.

use std::fmt;

use crate::{Header, HeaderName, HeaderValue};

pub const DEFAULT_WRAP: usize = 78;

/// A single header field: name, unfolded body, optional parenthetical
/// comment, optional wrap length used on render.
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    body: String,
    comment: Option<String>,
    wrap: Option<usize>,
    value: FieldValue,
}

/// An owned, 'static copy of the parsed value, decoupled from the raw
/// message buffer a `Header<'x>` borrows from.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Text(String),
    TextList(Vec<String>),
    Address(crate::Address<'static>),
    DateTime(crate::DateTime),
    ContentType(crate::ContentType<'static>),
    Empty,
}

impl Field {
    /// Builds a Field from a parsed `Header`, extracting the outermost
    /// parenthetical comment from free-text values (spec.md §4.2).
    pub fn from_header(header: &Header) -> Field {
        let body = render_value_text(&header.value);
        let (body, comment) = split_comment(&body);

        Field {
            name: header.name.as_str().to_ascii_lowercase(),
            body,
            comment,
            wrap: Some(DEFAULT_WRAP),
            value: FieldValue::from(header.value.clone().into_owned()),
        }
    }

    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Field {
        let body = body.into();
        Field {
            name: name.into().to_ascii_lowercase(),
            body,
            comment: None,
            wrap: Some(DEFAULT_WRAP),
            value: FieldValue::Empty,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    pub fn wrap(&self) -> Option<usize> {
        self.wrap
    }

    pub fn set_wrap(&mut self, wrap: Option<usize>) {
        self.wrap = wrap;
    }

    /// Renders `Name: body (comment)` folded at whitespace/commas so no
    /// physical line exceeds the wrap length (spec.md §4.1 "Header
    /// folding"). A `ContentType` value's attributes are appended using the
    /// structured-field attribute grammar (spec.md §4.2): `; name=value`
    /// plain, or `; name*=charset'lang'value` / `; name*N*=...` RFC 2231
    /// continuations with percent-encoding when a value isn't plain ASCII
    /// or would overflow the wrap length on its own.
    pub fn render(&self) -> String {
        let mut unfolded = self.body.clone();
        if let Some(comment) = &self.comment {
            unfolded.push_str(" (");
            unfolded.push_str(comment);
            unfolded.push(')');
        }
        if let FieldValue::ContentType(ct) = &self.value {
            for (name, value) in ct.attributes.iter().flatten() {
                unfolded.push_str(&render_attribute(name, value, self.wrap.unwrap_or(DEFAULT_WRAP)));
            }
        }

        let header_name = capitalize_header(&self.name);
        let prefix = format!("{header_name}: ");

        match self.wrap {
            Some(wrap) if prefix.len() + unfolded.len() > wrap => {
                fold_line(&prefix, &unfolded, wrap)
            }
            _ => format!("{prefix}{unfolded}\r\n"),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<HeaderValue<'_>> for FieldValue {
    fn from(value: HeaderValue<'_>) -> Self {
        match value {
            HeaderValue::Text(t) => FieldValue::Text(t.into_owned()),
            HeaderValue::TextList(l) => {
                FieldValue::TextList(l.into_iter().map(|s| s.into_owned()).collect())
            }
            HeaderValue::Address(a) => FieldValue::Address(a.into_owned()),
            HeaderValue::DateTime(d) => FieldValue::DateTime(d),
            HeaderValue::ContentType(c) => FieldValue::ContentType(crate::ContentType {
                c_type: c.c_type.into_owned().into(),
                c_subtype: c.c_subtype.map(|s| s.into_owned().into()),
                attributes: c.attributes.map(|attrs| {
                    attrs
                        .into_iter()
                        .map(|(k, v)| (k.into_owned().into(), v.into_owned().into()))
                        .collect()
                }),
            }),
            HeaderValue::Received(_) => FieldValue::Empty,
            HeaderValue::Empty => FieldValue::Empty,
        }
    }
}

fn render_value_text(value: &HeaderValue) -> String {
    match value {
        HeaderValue::Text(t) => t.to_string(),
        HeaderValue::TextList(l) => l.join(", "),
        HeaderValue::Address(crate::Address::List(addrs)) => addrs
            .iter()
            .map(render_addr)
            .collect::<Vec<_>>()
            .join(", "),
        HeaderValue::Address(crate::Address::Group(groups)) => groups
            .iter()
            .map(|g| {
                format!(
                    "{}: {}",
                    g.name.as_deref().unwrap_or_default(),
                    g.addresses.iter().map(render_addr).collect::<Vec<_>>().join(", ")
                )
            })
            .collect::<Vec<_>>()
            .join("; "),
        HeaderValue::DateTime(dt) => dt.to_rfc822(),
        HeaderValue::ContentType(ct) => {
            // Attributes are rendered separately by `Field::render`, which
            // has to know the wrap length to decide plain vs. RFC 2231
            // continuation encoding.
            let mut out = ct.c_type.to_string();
            if let Some(subtype) = &ct.c_subtype {
                out.push('/');
                out.push_str(subtype);
            }
            out
        }
        HeaderValue::Received(_) | HeaderValue::Empty => String::new(),
    }
}

fn render_addr(addr: &crate::Addr) -> String {
    match (&addr.name, &addr.address) {
        (Some(name), Some(address)) => format!("{name} <{address}>"),
        (None, Some(address)) => address.to_string(),
        (Some(name), None) => name.to_string(),
        (None, None) => String::new(),
    }
}

/// Strips a single outermost `(...)` trailing comment, returning the
/// remaining body and the comment text with its parentheses removed.
fn split_comment(body: &str) -> (String, Option<String>) {
    let trimmed = body.trim_end();
    if trimmed.ends_with(')') {
        if let Some(open) = find_matching_open_paren(trimmed) {
            let comment = trimmed[open + 1..trimmed.len() - 1].to_string();
            let rest = trimmed[..open].trim_end().to_string();
            return (rest, Some(comment));
        }
    }
    (body.to_string(), None)
}

fn find_matching_open_paren(s: &str) -> Option<usize> {
    let mut depth = 0i32;
    for (i, ch) in s.char_indices().rev() {
        match ch {
            ')' => depth += 1,
            '(' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Renders one Content-Type attribute, choosing plain `; name="value"` when
/// it is ASCII and short enough, otherwise RFC 2231 percent-encoded
/// continuations (spec.md §4.2).
fn render_attribute(name: &str, value: &str, wrap: usize) -> String {
    let plain = format!("; {name}=\"{value}\"");
    if value.is_ascii() && plain.len() <= wrap {
        return plain;
    }

    let encoded = percent_encode_2231(value);
    let budget = wrap.saturating_sub(name.len() + "*N*=utf-8''".len()).max(16);
    let chunks = split_encoded(&encoded, budget);

    if chunks.len() == 1 {
        format!("; {name}*=utf-8''{}", chunks[0])
    } else {
        chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                if i == 0 {
                    format!("; {name}*{i}*=utf-8''{chunk}")
                } else {
                    format!("; {name}*{i}*={chunk}")
                }
            })
            .collect()
    }
}

/// Percent-encodes everything but RFC 2231 `attribute-char`s
/// (`token` minus `*'%`).
fn percent_encode_2231(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        let is_attr_char = byte.is_ascii_alphanumeric()
            || matches!(byte, b'!' | b'#' | b'$' | b'&' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~');
        if is_attr_char {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Splits a percent-encoded (pure ASCII) string into chunks of at most
/// `budget` bytes without cutting a `%XX` escape in half.
fn split_encoded(encoded: &str, budget: usize) -> Vec<&str> {
    let bytes = encoded.as_bytes();
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < bytes.len() {
        let mut end = (start + budget).min(bytes.len());
        if end < bytes.len() {
            if end > start && bytes[end - 1] == b'%' {
                end -= 1;
            } else if end > start + 1 && bytes[end - 2] == b'%' {
                end -= 1;
            }
            if end <= start {
                end = (start + budget).min(bytes.len()).max(start + 1);
            }
        }
        chunks.push(&encoded[start..end]);
        start = end;
    }
    if chunks.is_empty() {
        chunks.push("");
    }
    chunks
}

fn capitalize_header(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(c) => c.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Folds `prefix + text` at whitespace so no emitted line exceeds `wrap`
/// columns, CRLF-terminating every physical line and indenting
/// continuations with a single space (spec.md §4.1).
fn fold_line(prefix: &str, text: &str, wrap: usize) -> String {
    let mut out = String::new();
    let mut line_len = 0;
    let mut first = true;

    out.push_str(prefix);
    line_len += prefix.len();

    for word in text.split_inclusive([' ', ',']) {
        if !first && line_len + word.len() > wrap {
            out.push_str("\r\n ");
            line_len = 1;
        }
        out.push_str(word);
        line_len += word.len();
        first = false;
    }

    out.push_str("\r\n");
    out
}

const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

impl crate::DateTime {
    pub fn to_rfc822(&self) -> String {
        format!(
            "{:02} {} {:04} {:02}:{:02}:{:02} {}{:02}{:02}",
            self.day,
            MONTH_NAMES.get(self.month.saturating_sub(1) as usize).unwrap_or(&"???"),
            self.year,
            self.hour,
            self.minute,
            self.second,
            if self.tz_before_gmt { "-" } else { "+" },
            self.tz_hour,
            self.tz_minute
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_long_field() {
        let body = "a ".repeat(60);
        let rendered = fold_line("Subject: ", body.trim(), 40);
        assert!(rendered.lines().all(|l| l.len() <= 41));
    }

    #[test]
    fn comment_split() {
        let (body, comment) = split_comment("Art Vandelay (Vandelay Industries)");
        assert_eq!(body, "Art Vandelay");
        assert_eq!(comment.as_deref(), Some("Vandelay Industries"));
    }
}
