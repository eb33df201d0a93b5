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

use crate::decoders::base64::decode_base64_word;
use crate::decoders::charsets::TextDecoder;
use crate::decoders::quoted_printable::decode_q_word;

// One syntactically valid `=?charset?enc?payload?=` word. The charset
// keeps its `*language` suffix; strip it before lookup.
struct RawWord<'x> {
    charset: &'x [u8],
    encoding: u8,
    payload: &'x [u8],
}

// Accumulates decoded words, carrying a streaming charset decoder across
// adjacent words with the same charset. Encoders are allowed to split a
// multi-byte sequence between two words, so flushing early would lose or
// mangle the split character.
#[derive(Default)]
struct WordDecoder {
    result: String,
    decoder: Option<TextDecoder>,
}

impl WordDecoder {
    // Flushes the streaming decoder; dangling partial sequences become
    // replacement characters.
    fn flush(&mut self) {
        if let Some(mut decoder) = self.decoder.take() {
            self.result.push_str(&decoder.decode(&[], true));
        }
    }

    fn push_raw(&mut self, raw: &[u8]) {
        self.flush();
        self.result.push_str(&String::from_utf8_lossy(raw));
    }

    fn push_word(&mut self, word: &RawWord<'_>, raw: &[u8]) {
        let charset = word
            .charset
            .split(|&ch| ch == b'*')
            .next()
            .unwrap_or(word.charset);

        let bytes = match word.encoding {
            b'B' | b'b' => decode_base64_word(word.payload),
            _ => decode_q_word(word.payload),
        };

        let Some(bytes) = bytes else {
            // undecodable payload: leave the word as it was written
            self.push_raw(raw);
            return;
        };

        match self.decoder.as_mut() {
            Some(decoder) if decoder.matches_label(charset) => {
                let text = decoder.decode(&bytes, false);
                self.result.push_str(&text);
            }
            _ => {
                self.flush();
                match TextDecoder::for_label(charset) {
                    Some(mut decoder) => {
                        self.result.push_str(&decoder.decode(&bytes, false));
                        self.decoder = Some(decoder);
                    }
                    None => {
                        // unknown charset: leave the word as it was written
                        self.result.push_str(&String::from_utf8_lossy(raw));
                    }
                }
            }
        }
    }

    fn finish(mut self) -> String {
        self.flush();
        self.result
    }
}

/// Matches a run of one or more encoded-words separated only by
/// whitespace, starting exactly at `pos`. Returns the decoded text and
/// the number of bytes consumed, or `None` when `pos` does not start a
/// well-formed word.
pub fn match_encoded_word_run(value: &[u8], pos: usize) -> Option<(String, usize)> {
    let mut decoder = WordDecoder::default();
    let mut cursor = pos;
    let mut matched_any = false;

    loop {
        let word_start = if matched_any {
            let mut skip = cursor;
            while value
                .get(skip)
                .is_some_and(|ch| matches!(ch, b' ' | b'\t' | b'\r' | b'\n'))
            {
                skip += 1;
            }
            skip
        } else {
            cursor
        };

        match parse_one_word(value, word_start) {
            Some((word, end)) => {
                decoder.push_word(&word, &value[word_start..end]);
                cursor = end;
                matched_any = true;
            }
            None => break,
        }
    }

    if matched_any {
        Some((decoder.finish(), cursor - pos))
    } else {
        None
    }
}

/// Decodes every encoded-word in `text`, RFC2047 style. Whitespace-only
/// runs between adjacent encoded-words are discarded; any other text is
/// kept verbatim and interrupts the streaming charset carry. Segments
/// with an unknown charset or a malformed payload stay unchanged.
pub fn decode_encoded_words(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut decoder = WordDecoder::default();
    let mut pos = 0;
    let mut segment_start = 0;

    while pos < bytes.len() {
        if bytes[pos] == b'=' && bytes.get(pos + 1) == Some(&b'?') {
            if let Some((word, end)) = parse_one_word(bytes, pos) {
                let between = &text[segment_start..pos];
                if !between.is_empty() && !between.bytes().all(|ch| ch.is_ascii_whitespace()) {
                    decoder.push_raw(between.as_bytes());
                }
                decoder.push_word(&word, &bytes[pos..end]);
                pos = end;
                segment_start = end;
                continue;
            }
        }
        pos += 1;
    }

    let trailing = &text[segment_start..];
    if !trailing.is_empty() && !trailing.bytes().all(|ch| ch.is_ascii_whitespace()) {
        decoder.push_raw(trailing.as_bytes());
    }

    decoder.finish()
}

// Parses `=?charset?[BbQq]?payload?=` at `pos`. Fields may not contain
// `?`; the charset may not contain whitespace.
fn parse_one_word(value: &[u8], pos: usize) -> Option<(RawWord<'_>, usize)> {
    let mut cursor = pos;
    if value.get(cursor) != Some(&b'=') || value.get(cursor + 1) != Some(&b'?') {
        return None;
    }
    cursor += 2;

    let charset_start = cursor;
    loop {
        match value.get(cursor)? {
            b'?' => break,
            ch if ch.is_ascii_whitespace() => return None,
            _ => cursor += 1,
        }
    }
    let charset = &value[charset_start..cursor];
    cursor += 1;

    let encoding = *value.get(cursor)?;
    if !matches!(encoding, b'B' | b'b' | b'Q' | b'q') {
        return None;
    }
    cursor += 1;
    if value.get(cursor) != Some(&b'?') {
        return None;
    }
    cursor += 1;

    let payload_start = cursor;
    loop {
        match value.get(cursor)? {
            b'?' => break,
            _ => cursor += 1,
        }
    }
    if value.get(cursor + 1) != Some(&b'=') {
        return None;
    }

    Some((
        RawWord {
            charset,
            encoding,
            payload: &value[payload_start..cursor],
        },
        cursor + 2,
    ))
}

#[cfg(test)]
mod tests {
    use super::{decode_encoded_words, match_encoded_word_run};

    #[test]
    fn decode_words() {
        let inputs = [
            ("=?UTF-8?B?w6k=?=", "é"),
            ("=?iso-8859-1?q?this=20is=20some=20text?=", "this is some text"),
            ("=?US-ASCII?Q?Keith_Moore?=", "Keith Moore"),
            ("=?ISO-8859-1?Q?Patrik_F=E4ltstr=F6m?=", "Patrik Fältström"),
            (
                "=?ISO-8859-1?B?SWYgeW91IGNhbiByZWFkIHRoaXMgeW8=?=",
                "If you can read this yo",
            ),
            ("=?ISO-8859-1*en?Q?a?=", "a"),
            (
                "=?utf-8*unknown?q?Th=C3=ADs_=C3=ADs_v=C3=A1l=C3=ADd_=C3=9ATF8?=",
                "Thís ís válíd ÚTF8",
            ),
            // adjacent words, whitespace between them dropped
            ("=?UTF-8?Q?a?= \t =?UTF-8?Q?b?=", "ab"),
            // multi-byte sequence split across two words of one charset
            ("=?UTF-8?B?ww==?= =?UTF-8?B?qQ==?=", "é"),
            // charset change flushes the carry
            ("=?UTF-8?Q?a?= =?ISO-8859-1?Q?=E4?=", "aä"),
            // unknown charset or bad payload stay unchanged
            ("=?x-unknown?Q?abc?=", "=?x-unknown?Q?abc?="),
            ("=?UTF-8?B?####?=", "=?UTF-8?B?####?="),
            // plain text around words is kept
            ("before =?UTF-8?Q?mid?= after", "before mid after"),
            ("no words at all", "no words at all"),
            ("=?UTF-8?X?abc?=", "=?UTF-8?X?abc?="),
        ];

        for (input, expected) in inputs {
            assert_eq!(decode_encoded_words(input), expected, "{}", input);
        }
    }

    #[test]
    fn match_runs() {
        // run consumes both words but not the trailing space
        let value = "=?UTF-8?Q?a?= =?UTF-8?Q?b?= rest".as_bytes();
        let (decoded, consumed) = match_encoded_word_run(value, 0).unwrap();
        assert_eq!(decoded, "ab");
        assert_eq!(&value[consumed..], b" rest");

        // a lone word
        let value = "=?UTF-8?B?w6k=?=,next".as_bytes();
        let (decoded, consumed) = match_encoded_word_run(value, 0).unwrap();
        assert_eq!(decoded, "é");
        assert_eq!(&value[consumed..], b",next");

        assert!(match_encoded_word_run(b"=?broken", 0).is_none());
        assert!(match_encoded_word_run(b"plain", 0).is_none());
    }

    #[test]
    fn unknown_charset_inside_run() {
        // the known word decodes, the unknown one stays verbatim
        let (decoded, _) =
            match_encoded_word_run("=?UTF-8?Q?ok?= =?enigma?Q?xx?=".as_bytes(), 0).unwrap();
        assert_eq!(decoded, "ok=?enigma?Q?xx?=");
    }
}
