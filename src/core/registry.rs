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
use std::sync::{OnceLock, RwLock};

use thiserror::Error;

use crate::emitters::emitter::{EmitError, HeaderEmitter};
use crate::emitters::fields::{encode_address_list, encode_date};
use crate::parsers::encoded_word::decode_encoded_words;
use crate::parsers::fields::address::parse_address_list;
use crate::parsers::fields::content_type::parse_content_type;
use crate::parsers::fields::date::parse_date;
use crate::HeaderValue;

/// Decodes the raw occurrences of one header into a structured value.
/// `charset` is the fallback label for raw eight-bit text.
pub type HeaderDecoderFnc = fn(values: &[&[u8]], charset: &str) -> HeaderValue;

/// Serializes a structured value through the emitter.
pub type HeaderEncoderFnc = fn(&mut HeaderEmitter<'_>, &HeaderValue) -> Result<(), EmitError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("header {0} has a built-in definition that cannot be overridden")]
    BuiltIn(String),
}

struct RegistryEntry {
    preferred: String,
    decoder: Option<HeaderDecoderFnc>,
    encoder: Option<HeaderEncoderFnc>,
    builtin: bool,
}

struct Registry {
    entries: HashMap<String, RegistryEntry>,
}

static REGISTRY: OnceLock<RwLock<Registry>> = OnceLock::new();

fn registry() -> &'static RwLock<Registry> {
    REGISTRY.get_or_init(|| RwLock::new(Registry::with_builtins()))
}

fn read_registry() -> std::sync::RwLockReadGuard<'static, Registry> {
    registry().read().unwrap_or_else(|e| e.into_inner())
}

/// Registers a decoder for a non-built-in header. The given spelling
/// becomes the preferred spelling if none was recorded yet.
pub fn register_decoder(name: &str, decoder: HeaderDecoderFnc) -> Result<(), RegistryError> {
    let mut registry = registry().write().unwrap_or_else(|e| e.into_inner());
    let entry = registry.entry_mut(name)?;
    entry.decoder = Some(decoder);
    Ok(())
}

/// Registers an encoder for a non-built-in header; the given spelling
/// becomes the preferred spelling.
pub fn register_encoder(name: &str, encoder: HeaderEncoderFnc) -> Result<(), RegistryError> {
    let mut registry = registry().write().unwrap_or_else(|e| e.into_inner());
    let entry = registry.entry_mut(name)?;
    entry.preferred = name.to_string();
    entry.encoder = Some(encoder);
    Ok(())
}

pub fn decoder_for(name_lower: &str) -> Option<HeaderDecoderFnc> {
    read_registry()
        .entries
        .get(name_lower)
        .and_then(|entry| entry.decoder)
}

pub fn encoder_for(name_lower: &str) -> Option<(String, HeaderEncoderFnc)> {
    let registry = read_registry();
    let entry = registry.entries.get(name_lower)?;
    entry
        .encoder
        .map(|encoder| (entry.preferred.clone(), encoder))
}

pub fn preferred_spelling(name_lower: &str) -> Option<String> {
    read_registry()
        .entries
        .get(name_lower)
        .map(|entry| entry.preferred.clone())
}

impl Registry {
    fn entry_mut(&mut self, name: &str) -> Result<&mut RegistryEntry, RegistryError> {
        let lower = name.to_ascii_lowercase();
        let entry = self
            .entries
            .entry(lower)
            .or_insert_with(|| RegistryEntry {
                preferred: name.to_string(),
                decoder: None,
                encoder: None,
                builtin: false,
            });
        if entry.builtin {
            return Err(RegistryError::BuiltIn(name.to_string()));
        }
        Ok(entry)
    }

    fn with_builtins() -> Self {
        let mut entries = HashMap::new();
        for &(preferred, decoder, encoder) in BUILTINS {
            entries.insert(
                preferred.to_ascii_lowercase(),
                RegistryEntry {
                    preferred: preferred.to_string(),
                    decoder: Some(decoder),
                    encoder,
                    builtin: true,
                },
            );
        }
        Registry { entries }
    }
}

// Built-in decoder implementations.

fn decode_address(values: &[&[u8]], _charset: &str) -> HeaderValue {
    HeaderValue::AddressList(
        values
            .iter()
            .flat_map(|value| parse_address_list(value, true))
            .collect(),
    )
}

fn decode_content_type_value(values: &[&[u8]], _charset: &str) -> HeaderValue {
    match values.first() {
        Some(value) => HeaderValue::ContentType(parse_content_type(value)),
        None => HeaderValue::Empty,
    }
}

fn decode_unstructured(values: &[&[u8]], charset: &str) -> HeaderValue {
    match values.first() {
        Some(value) => {
            HeaderValue::Text(decode_encoded_words(&raw_header_text(value, charset)))
        }
        None => HeaderValue::Empty,
    }
}

fn decode_date_value(values: &[&[u8]], _charset: &str) -> HeaderValue {
    values
        .first()
        .and_then(|value| parse_date(value))
        .map_or(HeaderValue::Empty, HeaderValue::DateTime)
}

fn decode_transfer_encoding(values: &[&[u8]], _charset: &str) -> HeaderValue {
    match values.first() {
        Some(value) => HeaderValue::Text(
            String::from_utf8_lossy(value)
                .trim()
                .to_ascii_lowercase(),
        ),
        None => HeaderValue::Empty,
    }
}

// Converts raw header bytes to text: plain UTF-8 when it is valid,
// otherwise through the fallback charset.
pub(crate) fn raw_header_text(value: &[u8], charset: &str) -> String {
    match std::str::from_utf8(value) {
        Ok(text) => text.trim().to_string(),
        Err(_) => {
            match crate::decoders::charsets::TextDecoder::for_label(charset.as_bytes()) {
                Some(mut decoder) => decoder.decode(value, true).trim().to_string(),
                None => String::from_utf8_lossy(value).trim().to_string(),
            }
        }
    }
}

type BuiltinRow = (
    &'static str,
    HeaderDecoderFnc,
    Option<HeaderEncoderFnc>,
);

static BUILTINS: &[BuiltinRow] = &[
    // addressing
    ("Approved", decode_address, Some(encode_address_list)),
    ("Bcc", decode_address, Some(encode_address_list)),
    ("Cc", decode_address, Some(encode_address_list)),
    ("Delivered-To", decode_address, Some(encode_address_list)),
    (
        "Disposition-Notification-To",
        decode_address,
        Some(encode_address_list),
    ),
    ("From", decode_address, Some(encode_address_list)),
    ("Mail-Followup-To", decode_address, Some(encode_address_list)),
    ("Mail-Reply-To", decode_address, Some(encode_address_list)),
    ("Reply-To", decode_address, Some(encode_address_list)),
    ("Resent-Bcc", decode_address, Some(encode_address_list)),
    ("Resent-Cc", decode_address, Some(encode_address_list)),
    ("Resent-From", decode_address, Some(encode_address_list)),
    ("Resent-Reply-To", decode_address, Some(encode_address_list)),
    ("Resent-Sender", decode_address, Some(encode_address_list)),
    ("Resent-To", decode_address, Some(encode_address_list)),
    ("Return-Receipt-To", decode_address, Some(encode_address_list)),
    ("Sender", decode_address, Some(encode_address_list)),
    ("To", decode_address, Some(encode_address_list)),
    // parameterized
    ("Content-Type", decode_content_type_value, None),
    // unstructured
    ("Comments", decode_unstructured, None),
    ("Content-Description", decode_unstructured, None),
    ("Keywords", decode_unstructured, None),
    ("MIME-Version", decode_unstructured, None),
    ("Subject", decode_unstructured, None),
    ("User-Agent", decode_unstructured, None),
    // dates
    ("Date", decode_date_value, Some(encode_date)),
    ("Expires", decode_date_value, Some(encode_date)),
    ("Injection-Date", decode_date_value, Some(encode_date)),
    ("NNTP-Posting-Date", decode_date_value, Some(encode_date)),
    ("Resent-Date", decode_date_value, Some(encode_date)),
    // message identifiers, 2047 only
    ("Message-ID", decode_unstructured, None),
    ("Resent-Message-ID", decode_unstructured, None),
    // transfer encoding
    ("Content-Transfer-Encoding", decode_transfer_encoding, None),
];

#[cfg(test)]
mod tests {
    use super::{
        decoder_for, encoder_for, preferred_spelling, register_decoder, register_encoder,
        RegistryError,
    };
    use crate::HeaderValue;

    #[test]
    fn builtins_are_locked() {
        fn decoder(_: &[&[u8]], _: &str) -> HeaderValue {
            HeaderValue::Empty
        }

        assert_eq!(
            register_decoder("Subject", decoder),
            Err(RegistryError::BuiltIn("Subject".into()))
        );
        assert_eq!(
            register_decoder("content-type", decoder),
            Err(RegistryError::BuiltIn("content-type".into()))
        );
    }

    #[test]
    fn builtin_lookup() {
        assert!(decoder_for("subject").is_some());
        assert!(decoder_for("from").is_some());
        assert!(decoder_for("x-nonexistent-header").is_none());

        let (preferred, _) = encoder_for("from").unwrap();
        assert_eq!(preferred, "From");
        assert_eq!(preferred_spelling("mime-version").as_deref(), Some("MIME-Version"));
        // subject has no encoder, only a decoder
        assert!(encoder_for("subject").is_none());
    }

    #[test]
    fn custom_registration() {
        fn decoder(values: &[&[u8]], _: &str) -> HeaderValue {
            HeaderValue::Text(format!("custom:{}", values.len()))
        }

        register_decoder("X-Registry-Test", decoder).unwrap();
        let decode = decoder_for("x-registry-test").unwrap();
        assert_eq!(
            decode(&[b"a"], ""),
            HeaderValue::Text("custom:1".into())
        );

        // re-registration of a custom entry is allowed
        register_decoder("X-Registry-Test", decoder).unwrap();

        fn encoder(
            emitter: &mut crate::HeaderEmitter<'_>,
            _: &HeaderValue,
        ) -> Result<(), crate::EmitError> {
            emitter.add_text("x", false)
        }
        register_encoder("X-Registry-Test", encoder).unwrap();
        assert!(encoder_for("x-registry-test").is_some());
    }
}
