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

use thiserror::Error;

use crate::emitters::encoded_word::{encoded_word_chunk, qp_cost, B64_PRELUDE, POSTLUDE};

/// Receives the emitted header lines.
pub trait HeaderSink {
    fn deliver_data(&mut self, data: &str);
    fn deliver_eof(&mut self) {}
}

impl HeaderSink for String {
    fn deliver_data(&mut self, data: &str) {
        self.push_str(data);
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EmitError {
    #[error("token of {0} characters does not fit within the hard margin")]
    TokenTooLong(usize),
    #[error("date is not representable in an RFC5322 header")]
    InvalidDate,
    #[error("no encoder registered for header {0} and the value is not a string")]
    UnencodableValue(String),
}

#[derive(Debug, Clone, Copy)]
pub struct EmitterOptions {
    pub soft_margin: usize,
    pub hard_margin: usize,
    pub use_ascii: bool,
}

impl Default for EmitterOptions {
    fn default() -> Self {
        EmitterOptions {
            soft_margin: 78,
            hard_margin: 332,
            use_ascii: true,
        }
    }
}

/// Builds folded header lines, one logical header at a time.
///
/// Two classes of break point exist: preferred breakpoints are chosen by
/// the writers through `may_break_after`, emergency breakpoints exist
/// between every committed token. The emitter folds at a preferred point
/// when the soft margin would be crossed, falls back to the emergency
/// point before crossing the hard margin, and fails only when a single
/// token cannot fit at all.
pub struct HeaderEmitter<'a> {
    sink: &'a mut dyn HeaderSink,
    pub(crate) use_ascii: bool,
    soft_margin: usize,
    hard_margin: usize,
    current_line: String,
    // byte index into current_line; zero means none
    preferred_breakpoint: usize,
}

impl<'a> HeaderEmitter<'a> {
    pub fn new(sink: &'a mut dyn HeaderSink, options: EmitterOptions) -> Self {
        let soft_margin = options.soft_margin.clamp(30, 900);
        let hard_margin = options.hard_margin.clamp(soft_margin, 998);
        HeaderEmitter {
            sink,
            use_ascii: options.use_ascii,
            soft_margin,
            hard_margin,
            current_line: String::new(),
            preferred_breakpoint: 0,
        }
    }

    fn line_len(&self) -> usize {
        self.current_line.chars().count()
    }

    // Makes room for `len` more characters, folding as needed. False
    // means not even a fresh continuation line can hold the token.
    pub(crate) fn reserve_space(&mut self, len: usize) -> bool {
        if self.line_len() + len <= self.soft_margin {
            return true;
        }
        if self.preferred_breakpoint > 0 {
            let breakpoint = self.preferred_breakpoint;
            self.commit_line(Some(breakpoint));
            if self.line_len() + len <= self.soft_margin {
                return true;
            }
        }
        if self.line_len() + len <= self.hard_margin {
            return true;
        }
        if !self.current_line.is_empty() {
            let end = self.current_line.len();
            self.commit_line(Some(end));
        }
        self.line_len() + len <= self.hard_margin
    }

    // Emits the line up to `count` bytes (the whole line when absent).
    // On continuation the remainder becomes the new line behind a
    // folding space.
    pub(crate) fn commit_line(&mut self, count: Option<usize>) {
        let (first, rest) = match count {
            Some(count) => self.current_line.split_at(count),
            None => (self.current_line.as_str(), ""),
        };
        let mut line = first.trim_end().to_string();
        line.push_str("\r\n");
        self.sink.deliver_data(&line);

        self.current_line = match count {
            Some(_) => {
                let mut next = String::with_capacity(rest.len() + 1);
                next.push(' ');
                next.push_str(rest.trim_start());
                next
            }
            None => String::new(),
        };
        self.preferred_breakpoint = 0;
    }

    /// Appends a token that must not be folded internally. With
    /// `may_break_after`, the end of the token becomes a preferred
    /// breakpoint and a space is ensured after it.
    pub fn add_text(&mut self, text: &str, may_break_after: bool) -> Result<(), EmitError> {
        let len = text.chars().count();
        if !self.reserve_space(len) {
            return Err(EmitError::TokenTooLong(len));
        }
        self.current_line.push_str(text);
        if may_break_after {
            self.preferred_breakpoint = self.current_line.len();
            if !text.ends_with(' ') {
                self.current_line.push(' ');
            }
        }
        Ok(())
    }

    /// Like `add_text`, wrapping the token in a quoted string when it
    /// contains any of `qchars` and is not already quoted.
    pub fn add_quotable(
        &mut self,
        text: &str,
        qchars: &str,
        may_break_after: bool,
    ) -> Result<(), EmitError> {
        if text.is_empty() {
            return Ok(());
        }
        if needs_quoting(text, qchars) {
            let mut quoted = String::with_capacity(text.len() + 2);
            quoted.push('"');
            for ch in text.chars() {
                if ch == '\\' || ch == '"' {
                    quoted.push('\\');
                }
                quoted.push(ch);
            }
            quoted.push('"');
            self.add_text(&quoted, may_break_after)
        } else {
            self.add_text(text, may_break_after)
        }
    }

    /// Adds a phrase: whitespace runs collapse to a single space,
    /// non-ASCII text is routed through the RFC2047 encoder, and a
    /// phrase too long for one line degrades to word-by-word output
    /// with breaks between the words.
    pub fn add_phrase(
        &mut self,
        text: &str,
        qchars: &str,
        may_break_after: bool,
    ) -> Result<(), EmitError> {
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if self.use_ascii && text.chars().any(|ch| (ch as u32) > 0x7e || (ch as u32) < 0x20) {
            return self.encode_rfc2047_phrase(&text, may_break_after);
        }

        match self.add_quotable(&text, qchars, may_break_after) {
            Ok(()) => {
                // The whole phrase fit. If nothing marked a breakpoint
                // and the phrase was not quoted, its last interior
                // space is a sensible place to fold later.
                if self.preferred_breakpoint == 0 && !needs_quoting(&text, qchars) {
                    if let Some(space) = text.rfind(' ') {
                        self.preferred_breakpoint =
                            self.current_line.len() - (text.len() - space);
                    }
                }
                Ok(())
            }
            Err(_) => {
                let words = text.split(' ').collect::<Vec<_>>();
                let last = words.len() - 1;
                for (pos, word) in words.iter().enumerate() {
                    self.add_quotable(word, qchars, if pos == last { may_break_after } else { true })?;
                }
                Ok(())
            }
        }
    }

    /// Unstructured text: never quoted, RFC2047-encoded when needed.
    pub fn add_unstructured(&mut self, text: &str) -> Result<(), EmitError> {
        self.add_phrase(text, "", false)
    }

    /// Encodes a phrase as RFC2047 encoded-words, splitting into
    /// continuation lines as the margin requires. Each chunk uses
    /// whichever of base64 and quoted-printable is shorter, and splits
    /// never land inside a multi-byte UTF-8 sequence.
    pub fn encode_rfc2047_phrase(
        &mut self,
        text: &str,
        may_break_after: bool,
    ) -> Result<(), EmitError> {
        if text.is_empty() {
            return Ok(());
        }
        let bytes = text.as_bytes();

        // start a fresh line unless a useful amount of room remains
        if !self.reserve_space(B64_PRELUDE.len() + 10) {
            let end = self.current_line.len();
            self.commit_line(Some(end));
        }

        let overhead = B64_PRELUDE.len() + POSTLUDE.len();
        let mut budget = self
            .soft_margin
            .saturating_sub(self.line_len() + overhead)
            .max(8);

        let mut start = 0;
        let mut b64_len = 0usize;
        let mut qp_len = 0usize;
        let mut pos = 0;

        while pos < bytes.len() {
            let b64_inc = if (pos - start) % 3 == 0 { 4 } else { 0 };
            let qp_inc = qp_cost(bytes[pos]);

            if b64_len + b64_inc > budget && qp_len + qp_inc > budget {
                // back up to the nearest UTF-8 start byte
                let mut split = pos;
                while split > start && (bytes[split] & 0xc0) == 0x80 {
                    split -= 1;
                }
                if split == start {
                    split = pos;
                }
                let chunk = encoded_word_chunk(&bytes[start..split]);
                self.current_line.push_str(&chunk);
                let end = self.current_line.len();
                self.commit_line(Some(end));

                start = split;
                pos = split;
                b64_len = 0;
                qp_len = 0;
                budget = self
                    .soft_margin
                    .saturating_sub(self.line_len() + overhead)
                    .max(8);
                continue;
            }

            b64_len += b64_inc;
            qp_len += qp_inc;
            pos += 1;
        }

        self.add_text(&encoded_word_chunk(&bytes[start..]), may_break_after)
    }

    /// Ends the current logical header, committing what is buffered.
    pub fn end_header(&mut self) {
        if self.current_line.trim().is_empty() {
            self.current_line.clear();
            self.preferred_breakpoint = 0;
        } else {
            self.commit_line(None);
        }
    }

    /// Ends emission; optionally signals EOF to the sink.
    pub fn finish(&mut self, deliver_eof: bool) {
        self.end_header();
        if deliver_eof {
            self.sink.deliver_eof();
        }
    }
}

fn needs_quoting(text: &str, qchars: &str) -> bool {
    !(text.len() >= 2 && text.starts_with('"') && text.ends_with('"'))
        && !qchars.is_empty()
        && text.chars().any(|ch| qchars.contains(ch))
}

#[cfg(test)]
mod tests {
    use super::{EmitterOptions, HeaderEmitter};

    fn emit<F>(soft: usize, write: F) -> String
    where
        F: FnOnce(&mut HeaderEmitter<'_>),
    {
        let mut out = String::new();
        let mut emitter = HeaderEmitter::new(
            &mut out,
            EmitterOptions {
                soft_margin: soft,
                ..Default::default()
            },
        );
        write(&mut emitter);
        emitter.finish(false);
        out
    }

    #[test]
    fn simple_header() {
        let out = emit(78, |e| {
            e.add_text("Subject:", true).unwrap();
            e.add_unstructured("hello world").unwrap();
        });
        assert_eq!(out, "Subject: hello world\r\n");
    }

    #[test]
    fn folds_at_preferred_breakpoint() {
        let out = emit(30, |e| {
            e.add_text("To:", true).unwrap();
            e.add_text("first@example.com,", true).unwrap();
            e.add_text("second@example.com", false).unwrap();
        });
        assert_eq!(out, "To: first@example.com,\r\n second@example.com\r\n");
        for line in out.lines() {
            assert!(line.chars().count() <= 30, "{:?}", line);
        }
    }

    #[test]
    fn quotable_wraps_only_when_needed() {
        let out = emit(78, |e| {
            e.add_quotable("plain", ",.", false).unwrap();
            e.add_text(" ", false).unwrap();
            e.add_quotable("has,comma", ",", false).unwrap();
            e.add_text(" ", false).unwrap();
            e.add_quotable("back\\slash", "\\", false).unwrap();
        });
        assert_eq!(out, "plain \"has,comma\" \"back\\\\slash\"\r\n");
    }

    #[test]
    fn phrase_marks_interior_space() {
        // the phrase fits, then overflow folds at its interior space
        let out = emit(30, |e| {
            e.add_phrase("one two three", "", false).unwrap();
            e.add_text("xxxxxxxxxxxxxxxxxxxxx", false).unwrap();
        });
        assert_eq!(out, "one two\r\n threexxxxxxxxxxxxxxxxxxxxx\r\n");
    }

    #[test]
    fn long_phrase_degrades_to_words() {
        let words = "aaaaaaaaaa bbbbbbbbbb cccccccccc dddddddddd eeeeeeeeee";
        let out = emit(30, |e| {
            e.add_phrase(words, "", false).unwrap();
        });
        // every word survives and every line fits the soft margin
        let rejoined = out.replace("\r\n ", " ").replace("\r\n", "");
        assert_eq!(rejoined, words);
        for line in out.lines() {
            assert!(line.chars().count() <= 30, "{:?}", line);
        }
    }

    #[test]
    fn token_too_long_fails() {
        let mut out = String::new();
        let mut emitter = HeaderEmitter::new(
            &mut out,
            EmitterOptions {
                soft_margin: 30,
                hard_margin: 40,
                ..Default::default()
            },
        );
        assert!(emitter.add_text(&"x".repeat(41), false).is_err());
    }

    #[test]
    fn rfc2047_round_trip() {
        use crate::parsers::encoded_word::decode_encoded_words;

        let inputs = [
            "é",
            "Patrik Fältström",
            "Привет, мир",
            "こんにちは世界、こんにちは世界、こんにちは世界",
            "mixed ascii and ünïcödé words",
        ];

        for input in inputs {
            for soft in [30, 42, 78] {
                let out = emit(soft, |e| {
                    e.add_unstructured(input).unwrap();
                });
                // unfold and decode
                let unfolded = out.replace("\r\n ", " ");
                let decoded = decode_encoded_words(unfolded.trim_end());
                assert_eq!(decoded, input, "soft={} out={:?}", soft, out);
                for line in out.lines() {
                    assert!(
                        line.chars().count() <= soft,
                        "soft={} line={:?}",
                        soft,
                        line
                    );
                }
            }
        }
    }

    #[test]
    fn margins_are_clamped() {
        let out = emit(10, |e| {
            // soft margin clamps up to 30
            e.add_text("0123456789012345678901234", false).unwrap();
        });
        assert_eq!(out, "0123456789012345678901234\r\n");
    }
}
