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

use crate::decoders::charsets::TextDecoder;
use crate::decoders::hex::decode_hex;
use crate::parsers::tokenizer::{tokenize, Token, TokenizerOpts};
use crate::ContentType;

/// A decoded parameterized header: the token before the first `;` plus
/// the parameter map with lower-cased names.
#[derive(Debug, Default, PartialEq)]
pub struct Parameters {
    pub pre_semi: String,
    pub attributes: HashMap<String, String>,
}

// How one accepted `name=value` pair is classified before assembly.
enum ParamKind {
    Plain,
    // `name*`: charset'language'percent-encoded
    Extended,
    // `name*N` / `name*N*`: one continuation segment
    Continuation { index: u32, encoded: bool },
}

#[derive(Default)]
struct ParamAssembler {
    plain: Vec<(String, String)>,
    extended: Vec<(String, Vec<u8>)>,
    continuations: HashMap<String, Vec<(u32, bool, Vec<u8>)>>,
}

impl ParamAssembler {
    fn accept(&mut self, name: &str, value: String, rfc2231: bool) {
        let name = name.to_ascii_lowercase();
        if !rfc2231 {
            self.plain.push((name, value));
            return;
        }

        match classify(&name) {
            ParamKind::Plain => self.plain.push((name, value)),
            ParamKind::Extended => {
                let name = name.strip_suffix('*').unwrap().to_string();
                self.extended.push((name, decode_hex(value.as_bytes())));
            }
            ParamKind::Continuation { index, encoded } => {
                let base = name[..name.find('*').unwrap()].to_string();
                let bytes = if encoded {
                    decode_hex(value.as_bytes())
                } else {
                    value.into_bytes()
                };
                self.continuations
                    .entry(base)
                    .or_default()
                    .push((index, encoded, bytes));
            }
        }
    }

    // Lowest priority first: plain values, then assembled continuations,
    // then charset-extended single values. Later writes win.
    fn into_attributes(self) -> HashMap<String, String> {
        let mut attributes = HashMap::new();

        for (name, value) in self.plain {
            attributes.insert(name, value);
        }

        for (name, mut segments) in self.continuations {
            segments.sort_by_key(|&(index, _, _)| index);
            // segment zero must exist and the numbering must be
            // contiguous with no repeats
            if segments.first().is_none_or(|&(index, _, _)| index != 0)
                || segments
                    .iter()
                    .enumerate()
                    .any(|(pos, &(index, _, _))| index != pos as u32)
            {
                continue;
            }

            let charset_encoded = segments[0].1;
            let mut assembled = Vec::new();
            for (_, _, bytes) in &segments {
                assembled.extend_from_slice(bytes);
            }

            if charset_encoded {
                if let Some(value) = decode_charset_triple(&assembled) {
                    attributes.insert(name, value);
                }
            } else {
                attributes.insert(name, String::from_utf8_lossy(&assembled).into_owned());
            }
        }

        for (name, bytes) in self.extended {
            if let Some(value) = decode_charset_triple(&bytes) {
                attributes.insert(name, value);
            }
        }

        attributes
    }
}

// `name` is already lower-cased and non-empty.
fn classify(name: &str) -> ParamKind {
    let Some(star) = name.find('*') else {
        return ParamKind::Plain;
    };
    if star == name.len() - 1 {
        return ParamKind::Extended;
    }

    let (digits, encoded) = match name[star + 1..].strip_suffix('*') {
        Some(digits) => (digits, true),
        None => (&name[star + 1..], false),
    };

    // a continuation index is decimal with no leading zeros
    let valid = !digits.is_empty()
        && digits.bytes().all(|ch| ch.is_ascii_digit())
        && (digits == "0" || !digits.starts_with('0'));

    match (valid, digits.parse::<u32>()) {
        (true, Ok(index)) => ParamKind::Continuation { index, encoded },
        _ => ParamKind::Plain,
    }
}

// Decodes a `charset'language'value` triple; the value bytes were
// percent-decoded already. An unknown charset drops the parameter.
fn decode_charset_triple(bytes: &[u8]) -> Option<String> {
    let first = bytes.iter().position(|&ch| ch == b'\'')?;
    let second = first + 1 + bytes[first + 1..].iter().position(|&ch| ch == b'\'')?;
    let mut decoder = TextDecoder::for_label(&bytes[..first])?;
    Some(decoder.decode(&bytes[second + 1..], true))
}

#[derive(PartialEq)]
enum ScanState {
    Name,
    AfterEq,
    Value,
    SkipToSemi,
}

/// Parses a parameterized header value: the token before the first `;`,
/// then `name=value` pairs. Malformed fragments are dropped and parsing
/// continues at the next `;`.
pub fn parse_parameter_header(value: &[u8], rfc2047: bool, rfc2231: bool) -> Parameters {
    let semi = value.iter().position(|&ch| ch == b';');
    let (pre, rest) = match semi {
        Some(pos) => (&value[..pos], &value[pos + 1..]),
        None => (value, &[][..]),
    };

    let pre_semi = String::from_utf8_lossy(pre)
        .split_ascii_whitespace()
        .next()
        .unwrap_or("")
        .to_string();

    let opts = TokenizerOpts {
        qstring: true,
        rfc2047,
        ..Default::default()
    };

    let mut assembler = ParamAssembler::default();
    let mut state = ScanState::Name;
    let mut name = String::new();
    let mut value_text = String::new();

    for token in tokenize(rest, b";=", opts) {
        match token {
            Token::Delimiter(b';') => {
                if state == ScanState::Value || state == ScanState::AfterEq {
                    assembler.accept(&name, std::mem::take(&mut value_text), rfc2231);
                }
                name.clear();
                state = ScanState::Name;
            }
            Token::Delimiter(b'=') => {
                state = if state == ScanState::Name && !name.is_empty() {
                    ScanState::AfterEq
                } else {
                    ScanState::SkipToSemi
                };
            }
            ref token => match state {
                ScanState::Name if name.is_empty() => {
                    name = token.text().into_owned();
                }
                ScanState::AfterEq => {
                    value_text = token.text().into_owned();
                    state = ScanState::Value;
                }
                // two successive tokens with no delimiter: drop the pair
                ScanState::Name | ScanState::Value => state = ScanState::SkipToSemi,
                ScanState::SkipToSemi => (),
            },
        }
    }

    if state == ScanState::Value || state == ScanState::AfterEq {
        assembler.accept(&name, value_text, rfc2231);
    }

    Parameters {
        pre_semi,
        attributes: assembler.into_attributes(),
    }
}

/// Parses a Content-Type value; anything but exactly `type/subtype`
/// before the parameters collapses the whole header to `text/plain`.
pub fn parse_content_type(value: &[u8]) -> ContentType {
    let params = parse_parameter_header(value, false, true);
    let mut parts = params.pre_semi.split('/');

    match (parts.next(), parts.next(), parts.next()) {
        (Some(c_type), Some(c_subtype), None) if !c_type.is_empty() && !c_subtype.is_empty() => {
            ContentType {
                c_type: c_type.to_ascii_lowercase(),
                c_subtype: c_subtype.to_ascii_lowercase(),
                attributes: params.attributes,
            }
        }
        _ => ContentType::default(),
    }
}
