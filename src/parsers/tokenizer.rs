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

use std::borrow::Cow;

use crate::parsers::encoded_word::match_encoded_word_run;

/// One token of a structured header value.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Token<'x> {
    /// A single delimiter from the caller-supplied set.
    Delimiter(u8),

    /// The longest run that is not whitespace, a delimiter, a quote, a
    /// bracket or a comment.
    Atom(Cow<'x, str>),

    /// The contents of `"…"` with quoted-pairs unescaped.
    QuotedString(Cow<'x, str>),

    /// The full `[…]` including brackets, quoted-pairs retained.
    DomainLiteral(Cow<'x, str>),

    CommentStart,
    CommentEnd,

    /// The decoded Unicode text of one or more adjacent encoded-words.
    EncodedWord(String),
}

impl Token<'_> {
    /// The printable form of the token.
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            Token::Delimiter(ch) => char::from(*ch).to_string().into(),
            Token::Atom(text) | Token::QuotedString(text) | Token::DomainLiteral(text) => {
                text.as_ref().into()
            }
            Token::CommentStart => "(".into(),
            Token::CommentEnd => ")".into(),
            Token::EncodedWord(text) => text.as_str().into(),
        }
    }

    pub fn is_delimiter(&self, delimiter: u8) -> bool {
        matches!(self, Token::Delimiter(ch) if *ch == delimiter)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokenizerOpts {
    /// Recognize `"…"` quoted strings.
    pub qstring: bool,
    /// Recognize `[…]` domain literals.
    pub dliteral: bool,
    /// Recognize nested `(` `)` comments.
    pub comments: bool,
    /// Recognize and eagerly decode `=?…?=` encoded-word runs.
    pub rfc2047: bool,
}

// In-progress atom. Stays a borrowed span of the input until an escape
// forces an owned copy.
#[derive(Default)]
struct AtomBuilder {
    start: usize,
    end: usize,
    owned: Option<Vec<u8>>,
}

impl AtomBuilder {
    fn push(&mut self, value: &[u8], pos: usize) {
        if let Some(owned) = self.owned.as_mut() {
            owned.push(value[pos]);
        } else if self.start == self.end {
            self.start = pos;
            self.end = pos + 1;
        } else {
            self.end = pos + 1;
        }
    }

    fn push_escaped(&mut self, value: &[u8], ch: u8) {
        let owned = self
            .owned
            .get_or_insert_with(|| value[self.start..self.end].to_vec());
        owned.push(ch);
    }

    fn flush<'x>(&mut self, value: &'x [u8], tokens: &mut Vec<Token<'x>>) {
        if let Some(owned) = self.owned.take() {
            tokens.push(Token::Atom(
                String::from_utf8_lossy(&owned).into_owned().into(),
            ));
        } else if self.start != self.end {
            tokens.push(Token::Atom(String::from_utf8_lossy(
                &value[self.start..self.end],
            )));
        }
        self.start = 0;
        self.end = 0;
    }
}

/// Tokenizes one header value. Delimiters are recognized only outside
/// comments; inside a comment they fall back to atom text. Quoted
/// strings and domain literals are recognized even inside comments.
pub fn tokenize<'x>(value: &'x [u8], delimiters: &[u8], opts: TokenizerOpts) -> Vec<Token<'x>> {
    let mut tokens = Vec::new();
    let mut atom = AtomBuilder::default();
    let mut comment_depth = 0;
    let mut pos = 0;

    while let Some(&ch) = value.get(pos) {
        match ch {
            b'\\' => {
                if let Some(&next) = value.get(pos + 1) {
                    atom.push_escaped(value, next);
                    pos += 2;
                    continue;
                }
                // trailing backslash escapes nothing
            }
            b'"' if opts.qstring => {
                atom.flush(value, &mut tokens);
                let (text, consumed) = read_quoted_string(&value[pos..]);
                tokens.push(Token::QuotedString(text));
                pos += consumed;
                continue;
            }
            b'[' if opts.dliteral => {
                atom.flush(value, &mut tokens);
                let (text, consumed) = read_domain_literal(&value[pos..]);
                tokens.push(Token::DomainLiteral(text));
                pos += consumed;
                continue;
            }
            b'(' if opts.comments => {
                atom.flush(value, &mut tokens);
                comment_depth += 1;
                tokens.push(Token::CommentStart);
            }
            b')' if opts.comments && comment_depth > 0 => {
                atom.flush(value, &mut tokens);
                comment_depth -= 1;
                tokens.push(Token::CommentEnd);
            }
            b'=' if opts.rfc2047 && value.get(pos + 1) == Some(&b'?') => {
                if let Some((decoded, consumed)) = match_encoded_word_run(value, pos) {
                    atom.flush(value, &mut tokens);
                    tokens.push(Token::EncodedWord(decoded));
                    pos += consumed;
                    continue;
                }
                atom.push(value, pos);
            }
            _ if ch.is_ascii_whitespace() => {
                atom.flush(value, &mut tokens);
            }
            _ if comment_depth == 0 && delimiters.contains(&ch) => {
                atom.flush(value, &mut tokens);
                tokens.push(Token::Delimiter(ch));
            }
            _ => {
                atom.push(value, pos);
            }
        }
        pos += 1;
    }

    atom.flush(value, &mut tokens);
    tokens
}

// Reads a quoted string starting at the opening quote. Returns the
// unescaped contents and the bytes consumed including both quotes. A
// string left open at end of input is closed implicitly.
fn read_quoted_string(value: &[u8]) -> (Cow<'_, str>, usize) {
    let mut pos = 1;
    let mut owned: Option<Vec<u8>> = None;
    let start = pos;

    while let Some(&ch) = value.get(pos) {
        match ch {
            b'\\' => {
                if let Some(&next) = value.get(pos + 1) {
                    owned
                        .get_or_insert_with(|| value[start..pos].to_vec())
                        .push(next);
                    pos += 2;
                    continue;
                }
                pos += 1;
            }
            b'"' => {
                let text = match owned {
                    Some(owned) => String::from_utf8_lossy(&owned).into_owned().into(),
                    None => String::from_utf8_lossy(&value[start..pos]),
                };
                return (text, pos + 1);
            }
            _ => {
                if let Some(owned) = owned.as_mut() {
                    owned.push(ch);
                }
                pos += 1;
            }
        }
    }

    let text = match owned {
        Some(owned) => String::from_utf8_lossy(&owned).into_owned().into(),
        None => String::from_utf8_lossy(&value[start..]),
    };
    (text, value.len())
}

// Reads a domain literal starting at the opening bracket. Quoted pairs
// are retained verbatim and the brackets are part of the token text.
fn read_domain_literal(value: &[u8]) -> (Cow<'_, str>, usize) {
    let mut pos = 1;

    while let Some(&ch) = value.get(pos) {
        match ch {
            b'\\' => pos += if pos + 1 < value.len() { 2 } else { 1 },
            b']' => {
                return (String::from_utf8_lossy(&value[..pos + 1]), pos + 1);
            }
            _ => pos += 1,
        }
    }

    (String::from_utf8_lossy(value), value.len())
}
