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

use encoding_rs::Encoding;

/// Looks up a charset by its MIME label. Labels are matched through the
/// WHATWG alias table, which covers the charsets seen in mail headers.
pub fn charset_for_label(label: &[u8]) -> Option<&'static Encoding> {
    Encoding::for_label(trim_ascii(label))
}

fn trim_ascii(value: &[u8]) -> &[u8] {
    let start = value
        .iter()
        .position(|ch| !ch.is_ascii_whitespace())
        .unwrap_or(value.len());
    let end = value
        .iter()
        .rposition(|ch| !ch.is_ascii_whitespace())
        .map_or(start, |pos| pos + 1);
    &value[start..end]
}

/// An incremental text decoder over one charset. Bytes may be fed in any
/// chunking, including splits inside a multi-byte sequence; the final
/// call must pass `last` so buffered bytes are flushed as replacement
/// characters instead of being lost.
pub struct TextDecoder {
    encoding: &'static Encoding,
    decoder: encoding_rs::Decoder,
}

impl TextDecoder {
    pub fn for_label(label: &[u8]) -> Option<Self> {
        charset_for_label(label).map(TextDecoder::new)
    }

    pub fn new(encoding: &'static Encoding) -> Self {
        TextDecoder {
            encoding,
            decoder: encoding.new_decoder(),
        }
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// True when `label` names the same charset this decoder was built on.
    pub fn matches_label(&self, label: &[u8]) -> bool {
        charset_for_label(label).is_some_and(|encoding| encoding == self.encoding)
    }

    pub fn decode(&mut self, bytes: &[u8], last: bool) -> String {
        let mut out = String::with_capacity(
            self.decoder
                .max_utf8_buffer_length(bytes.len())
                .unwrap_or(bytes.len() * 3 + 16),
        );
        let mut pos = 0;
        loop {
            let (result, read, _) = self.decoder.decode_to_string(&bytes[pos..], &mut out, last);
            pos += read;
            match result {
                encoding_rs::CoderResult::InputEmpty => break,
                encoding_rs::CoderResult::OutputFull => {
                    out.reserve(self.decoder.max_utf8_buffer_length(bytes.len() - pos).unwrap_or(64))
                }
            }
        }
        out
    }
}

impl std::fmt::Debug for TextDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextDecoder")
            .field("encoding", &self.encoding.name())
            .finish()
    }
}
