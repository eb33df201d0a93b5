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
#![doc = include_str!("../README.md")]
#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod core;
pub mod decoders;
pub mod emitters;
pub mod parsers;

use std::collections::HashMap;
use std::fmt;

pub use crate::core::headers::MessageHeaders;
pub use crate::emitters::emitter::{EmitError, EmitterOptions, HeaderEmitter, HeaderSink};
pub use crate::parsers::message::{
    BodyFormat, HandlerError, MessageHandler, MimeParser, ParserOptions, PartData, StrFormat,
};

/// A mailbox: an optional display name plus an addr-spec.
///
/// Both fields may be empty; a display name with no address is how a
/// malformed entry with no `@` is reported.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Addr {
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub email: String,
}

/// An RFC5322 address group.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Group {
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub addresses: Vec<Addr>,
}

/// One entry of an address list: either a single mailbox or a group.
#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Address {
    Mailbox(Addr),
    Group(Group),
}

/// An RFC2045 Content-Type (or other parameterized) header value.
///
/// Type, subtype and attribute names are stored lower-cased. A malformed
/// value collapses to `text/plain` with no attributes.
#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ContentType {
    pub c_type: String,
    pub c_subtype: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub attributes: HashMap<String, String>,
}

/// An RFC5322 datetime, kept as the parsed wall-clock tuple plus the
/// timezone offset it was written in.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
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

/// A decoded structured header value.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HeaderValue {
    /// Ordered mailboxes and groups of an address header.
    AddressList(Vec<Address>),

    /// Unstructured text, RFC2047-decoded.
    Text(String),

    /// One string per header occurrence.
    TextList(Vec<String>),

    /// A date header.
    DateTime(DateTime),

    /// Content-Type or another parameterized header.
    ContentType(ContentType),

    #[default]
    Empty,
}

impl Addr {
    pub fn new(name: &str, email: &str) -> Self {
        Addr {
            name: name.into(),
            email: email.into(),
        }
    }
}

impl Address {
    /// Returns the mailbox, if this entry is not a group.
    pub fn as_mailbox(&self) -> Option<&Addr> {
        match self {
            Address::Mailbox(addr) => Some(addr),
            Address::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Address::Group(group) => Some(group),
            Address::Mailbox(_) => None,
        }
    }
}

impl ContentType {
    pub fn new(c_type: &str, c_subtype: &str) -> Self {
        ContentType {
            c_type: c_type.into(),
            c_subtype: c_subtype.into(),
            attributes: HashMap::new(),
        }
    }

    /// The combined `type/subtype` form, lower-cased.
    pub fn full_type(&self) -> String {
        format!("{}/{}", self.c_type, self.c_subtype)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|v| v.as_str())
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn is_type(&self, c_type: &str) -> bool {
        self.c_type == c_type
    }
}

impl Default for ContentType {
    fn default() -> Self {
        ContentType::new("text", "plain")
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.c_type, self.c_subtype)?;
        let mut names = self.attributes.keys().collect::<Vec<_>>();
        names.sort();
        for name in names {
            let value = &self.attributes[name];
            if !value.is_empty()
                && value
                    .bytes()
                    .all(|ch| ch.is_ascii_alphanumeric() || b"-_.+".contains(&ch))
            {
                write!(f, "; {}={}", name, value)?;
            } else {
                write!(
                    f,
                    "; {}=\"{}\"",
                    name,
                    value.replace('\\', "\\\\").replace('"', "\\\"")
                )?;
            }
        }
        Ok(())
    }
}

impl HeaderValue {
    pub fn is_empty(&self) -> bool {
        *self == HeaderValue::Empty
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            HeaderValue::Text(text) => Some(text),
            HeaderValue::TextList(list) => list.first().map(|text| text.as_str()),
            _ => None,
        }
    }

    pub fn as_address_list(&self) -> Option<&[Address]> {
        match self {
            HeaderValue::AddressList(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<&DateTime> {
        match self {
            HeaderValue::DateTime(datetime) => Some(datetime),
            _ => None,
        }
    }

    pub fn as_content_type(&self) -> Option<&ContentType> {
        match self {
            HeaderValue::ContentType(ct) => Some(ct),
            _ => None,
        }
    }
}
