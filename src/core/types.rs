/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

//! Shared header-value types produced by the field parsers and consumed
//! by [`crate::field::Field`]. These are the same shapes the parser state
//! machines in `parsers/fields/` were written against: changing them
//! means touching every parser in that directory.

use std::borrow::Cow;
use std::net::IpAddr;

#[cfg_attr(feature = "message_serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Addr<'x> {
    #[cfg_attr(feature = "message_serde", serde(default))]
    pub name: Option<Cow<'x, str>>,
    #[cfg_attr(feature = "message_serde", serde(default))]
    pub address: Option<Cow<'x, str>>,
}

#[cfg_attr(feature = "message_serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group<'x> {
    #[cfg_attr(feature = "message_serde", serde(default))]
    pub name: Option<Cow<'x, str>>,
    #[cfg_attr(feature = "message_serde", serde(default))]
    pub addresses: Vec<Addr<'x>>,
}

#[cfg_attr(feature = "message_serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address<'x> {
    List(Vec<Addr<'x>>),
    Group(Vec<Group<'x>>),
}

#[derive(Debug, Clone)]
pub struct Header<'x> {
    pub name: HeaderName<'x>,
    pub value: HeaderValue<'x>,
    pub offset_field: usize,
    pub offset_start: usize,
    pub offset_end: usize,
}

#[derive(Debug, Clone)]
pub enum HeaderName<'x> {
    Subject,
    From,
    To,
    Cc,
    Date,
    Bcc,
    ReplyTo,
    Sender,
    Comments,
    InReplyTo,
    Keywords,
    Received,
    MessageId,
    References,
    ReturnPath,
    MimeVersion,
    ContentDescription,
    ContentId,
    ContentLanguage,
    ContentLocation,
    ContentTransferEncoding,
    ContentType,
    ContentDisposition,
    ResentTo,
    ResentFrom,
    ResentBcc,
    ResentCc,
    ResentSender,
    ResentDate,
    ResentMessageId,
    ListArchive,
    ListHelp,
    ListId,
    ListOwner,
    ListPost,
    ListSubscribe,
    ListUnsubscribe,
    Other(Cow<'x, str>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue<'x> {
    Address(Address<'x>),
    Text(Cow<'x, str>),
    TextList(Vec<Cow<'x, str>>),
    DateTime(DateTime),
    ContentType(ContentType<'x>),
    Received(Box<Received<'x>>),
    Empty,
}

#[cfg_attr(feature = "message_serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentType<'x> {
    pub c_type: Cow<'x, str>,
    #[cfg_attr(feature = "message_serde", serde(default))]
    pub c_subtype: Option<Cow<'x, str>>,
    #[cfg_attr(feature = "message_serde", serde(default))]
    pub attributes: Option<Vec<(Cow<'x, str>, Cow<'x, str>)>>,
}

/// An RFC5322 datetime.
#[cfg_attr(feature = "message_serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub tz_before_gmt: bool,
    pub tz_hour: u8,
    pub tz_minute: u8,
}

/// A `Received:` trace header, parsed on a best-effort basis.
#[derive(Debug, Clone, PartialEq)]
pub struct Received<'x> {
    pub from: Option<Host<'x>>,
    pub from_ip: Option<IpAddr>,
    pub from_iprev: Option<Cow<'x, str>>,
    pub by: Option<Host<'x>>,
    pub for_: Option<Cow<'x, str>>,
    pub with: Option<Protocol>,
    pub tls_version: Option<TlsVersion>,
    pub tls_cipher: Option<Cow<'x, str>>,
    pub id: Option<Cow<'x, str>>,
    pub ident: Option<Cow<'x, str>>,
    pub helo: Option<Host<'x>>,
    pub helo_cmd: Option<Greeting>,
    pub via: Option<Cow<'x, str>>,
    pub date: Option<DateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Host<'x> {
    Name(Cow<'x, str>),
    IpAddr(IpAddr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    SMTP,
    LMTP,
    ESMTP,
    ESMTPS,
    ESMTPA,
    ESMTPSA,
    LMTPA,
    LMTPS,
    LMTPSA,
    UTF8SMTP,
    UTF8SMTPA,
    UTF8SMTPS,
    UTF8SMTPSA,
    UTF8LMTP,
    UTF8LMTPA,
    UTF8LMTPS,
    UTF8LMTPSA,
    HTTP,
    HTTPS,
    IMAP,
    POP3,
    MMS,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Greeting {
    Helo,
    Ehlo,
    Lhlo,
}

#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsVersion {
    SSLv2,
    SSLv3,
    TLSv1_0,
    TLSv1_1,
    TLSv1_2,
    TLSv1_3,
    DTLSv1_0,
    DTLSv1_2,
    DTLSv1_3,
}

/// Last-wins lookup over a header list, mirroring RFC 5322's rule that
/// when a field is present more than once the last occurrence governs.
pub trait GetHeader<'x> {
    fn header_value(&self, name: &HeaderName) -> Option<&HeaderValue<'x>>;
    fn header(&self, name: impl Into<HeaderName<'x>>) -> Option<&Header>;
}
