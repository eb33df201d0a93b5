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

/// Removes the mbox `From ` envelope line, if present. Only the very
/// first line counts, and only with the trailing space.
pub fn strip_mbox_envelope(raw: &[u8]) -> &[u8] {
    if raw.starts_with(b"From ") {
        let mut pos = 0;
        while let Some(&ch) = raw.get(pos) {
            pos += 1;
            if ch == b'\n' {
                break;
            }
            if ch == b'\r' {
                if raw.get(pos) == Some(&b'\n') {
                    pos += 1;
                }
                break;
            }
        }
        &raw[pos..]
    } else {
        raw
    }
}

/// Splits a raw header block into `(lower-case name, value)` pairs in
/// source order, duplicates retained. Lines are separated at line
/// endings not followed by space or tab; lines without a colon are
/// dropped. With `strip_continuations`, embedded CR and LF are removed
/// from values.
pub fn parse_header_block(raw: &[u8], strip_continuations: bool) -> Vec<(String, Vec<u8>)> {
    let mut headers = Vec::new();

    for line in split_header_lines(raw) {
        let Some(colon) = line.iter().position(|&ch| ch == b':') else {
            continue;
        };
        let name = String::from_utf8_lossy(trim_bytes(&line[..colon]))
            .to_ascii_lowercase()
            .to_string();
        if name.is_empty() {
            continue;
        }
        let mut value = trim_bytes(&line[colon + 1..]).to_vec();
        if strip_continuations {
            value.retain(|&ch| ch != b'\r' && ch != b'\n');
        }
        headers.push((name, value));
    }

    headers
}

// Logical lines: a line ending followed by space or tab continues the
// current line (the ending stays embedded in the value).
fn split_header_lines(raw: &[u8]) -> Vec<&[u8]> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut pos = 0;

    while pos < raw.len() {
        let break_len = match raw[pos] {
            b'\r' if raw.get(pos + 1) == Some(&b'\n') => 2,
            b'\r' | b'\n' => 1,
            _ => {
                pos += 1;
                continue;
            }
        };
        match raw.get(pos + break_len) {
            Some(b' ' | b'\t') => {
                // continuation
                pos += break_len + 1;
            }
            _ => {
                if pos > start {
                    lines.push(&raw[start..pos]);
                }
                pos += break_len;
                start = pos;
            }
        }
    }
    if start < raw.len() {
        lines.push(&raw[start..]);
    }

    lines
}

fn trim_bytes(value: &[u8]) -> &[u8] {
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

/// Finds the end of the header block: either a line break at position
/// zero, or two consecutive identical line endings. Returns the length
/// of the header prefix (including the first line ending of the pair)
/// and the offset where the body begins.
pub fn find_end_of_headers(buf: &[u8]) -> Option<(usize, usize)> {
    if let Some(len) = line_ending_at(buf, 0) {
        return Some((0, len));
    }

    let mut pos = 0;
    while pos < buf.len() {
        if let Some(len) = line_ending_at(buf, pos) {
            let next = pos + len;
            if buf.get(next..next + len) == Some(&buf[pos..pos + len]) {
                return Some((next, next + len));
            }
        }
        pos += 1;
    }

    None
}

fn line_ending_at(buf: &[u8], pos: usize) -> Option<usize> {
    match buf.get(pos)? {
        b'\r' if buf.get(pos + 1) == Some(&b'\n') => Some(2),
        b'\r' | b'\n' => Some(1),
        _ => None,
    }
}
