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

use std::collections::HashMap;

use crate::core::registry;
use crate::parsers::encoded_word::decode_encoded_words;
use crate::parsers::header::{parse_header_block, strip_mbox_envelope};
use crate::{ContentType, DateTime, HeaderValue};

// Raw occurrences of one header name, in insertion order of the name's
// first appearance.
#[derive(Debug)]
struct RawEntry {
    name: String,
    values: Vec<Vec<u8>>,
}

/// The parsed header block of one body part: raw values by lower-cased
/// name plus a cache of lazily decoded structured values.
///
/// The raw data is immutable; the only mutable knob is the fallback
/// `charset`, and changing it empties the decode cache.
#[derive(Debug, Default)]
pub struct MessageHeaders {
    raw: Vec<u8>,
    entries: Vec<RawEntry>,
    cache: HashMap<String, HeaderValue>,
    charset: String,
    default_content_type: ContentType,
}

impl MessageHeaders {
    /// Parses a raw header block. An mbox `From ` envelope line is
    /// removed before anything else.
    pub fn parse(raw: &[u8], strip_continuations: bool, charset: &str) -> Self {
        let raw = strip_mbox_envelope(raw).to_vec();
        let mut entries: Vec<RawEntry> = Vec::new();

        for (name, value) in parse_header_block(&raw, strip_continuations) {
            match entries.iter_mut().find(|entry| entry.name == name) {
                Some(entry) => entry.values.push(value),
                None => entries.push(RawEntry {
                    name,
                    values: vec![value],
                }),
            }
        }

        MessageHeaders {
            raw,
            entries,
            cache: HashMap::new(),
            charset: charset.to_string(),
            default_content_type: ContentType::default(),
        }
    }

    /// The raw header block, envelope line removed.
    pub fn raw_header_text(&self) -> &[u8] {
        &self.raw
    }

    /// Number of distinct header names.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn has(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        self.entries.iter().any(|entry| entry.name == name)
    }

    /// The raw value list of a header, one entry per occurrence.
    pub fn raw(&self, name: &str) -> Option<&[Vec<u8>]> {
        let name = name.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.values.as_slice())
    }

    /// The decoded structured value of a header. Decoding happens on
    /// first access and is cached.
    pub fn get(&mut self, name: &str) -> Option<&HeaderValue> {
        let name = name.to_ascii_lowercase();
        if !self.has(&name) {
            return None;
        }
        if !self.cache.contains_key(&name) {
            let value = self.decode(&name);
            self.cache.insert(name.clone(), value);
        }
        self.cache.get(&name)
    }

    /// The fallback charset for raw eight-bit header text.
    pub fn charset(&self) -> &str {
        &self.charset
    }

    /// Changes the fallback charset; decoded values are dropped so the
    /// next access re-decodes under the new charset.
    pub fn set_charset(&mut self, charset: &str) {
        self.charset = charset.to_string();
        self.cache.clear();
    }

    /// The decoded Content-Type, or this part's default when the header
    /// is missing or unparseable.
    pub fn content_type(&mut self) -> ContentType {
        match self.get("content-type") {
            Some(HeaderValue::ContentType(ct)) => ct.clone(),
            _ => self.default_content_type.clone(),
        }
    }

    pub(crate) fn set_default_content_type(&mut self, content_type: ContentType) {
        self.default_content_type = content_type;
    }

    /// All headers as `(preferred spelling, decoded value)` pairs, in
    /// insertion order of the raw names.
    pub fn decoded_entries(&mut self) -> Vec<(String, HeaderValue)> {
        let names: Vec<String> = self.entries.iter().map(|entry| entry.name.clone()).collect();
        names
            .into_iter()
            .map(|name| {
                let value = self.get(&name).cloned().unwrap_or_default();
                let spelling = registry::preferred_spelling(&name)
                    .unwrap_or_else(|| capitalize(&name));
                (spelling, value)
            })
            .collect()
    }

    // Convenience accessors.

    pub fn subject(&mut self) -> Option<String> {
        self.get("subject")?.as_text().map(String::from)
    }

    pub fn from(&mut self) -> Option<Vec<crate::Address>> {
        self.get("from")?.as_address_list().map(<[_]>::to_vec)
    }

    pub fn to(&mut self) -> Option<Vec<crate::Address>> {
        self.get("to")?.as_address_list().map(<[_]>::to_vec)
    }

    pub fn date(&mut self) -> Option<DateTime> {
        self.get("date")?.as_datetime().copied()
    }

    pub fn message_id(&mut self) -> Option<String> {
        self.get("message-id")?.as_text().map(String::from)
    }

    pub fn content_transfer_encoding(&mut self) -> Option<String> {
        self.get("content-transfer-encoding")?
            .as_text()
            .map(String::from)
    }

    fn decode(&self, name: &str) -> HeaderValue {
        let Some(entry) = self.entries.iter().find(|entry| entry.name == name) else {
            return HeaderValue::Empty;
        };
        let values: Vec<&[u8]> = entry.values.iter().map(|value| value.as_slice()).collect();

        match registry::decoder_for(name) {
            Some(decoder) => decoder(&values, &self.charset),
            // unregistered headers decode as unstructured text, one
            // string per occurrence
            None => HeaderValue::TextList(
                values
                    .iter()
                    .map(|value| {
                        decode_encoded_words(&registry::raw_header_text(value, &self.charset))
                    })
                    .collect(),
            ),
        }
    }
}

fn capitalize(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut at_word_start = true;
    for ch in name.chars() {
        if at_word_start {
            result.extend(ch.to_uppercase());
        } else {
            result.push(ch);
        }
        at_word_start = !ch.is_ascii_alphanumeric();
    }
    result
}
