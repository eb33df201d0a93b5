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

/// Streaming base64 decoder for content-transfer-encoded bodies.
///
/// Lenient: whitespace and stray bytes outside the alphabet are skipped,
/// `=` closes the current quantum. The partial quantum survives across
/// calls so packet boundaries may fall anywhere.
#[derive(Debug, Default)]
pub struct Base64Decoder {
    quantum: [u8; 4],
    quantum_len: usize,
}

impl Base64Decoder {
    pub fn new() -> Self {
        Base64Decoder::default()
    }

    pub fn decode(&mut self, data: &[u8], out: &mut Vec<u8>) {
        for &ch in data {
            let val = B64_MAP[ch as usize];
            if val >= 0 {
                self.quantum[self.quantum_len] = val as u8;
                self.quantum_len += 1;
                if self.quantum_len == 4 {
                    out.push((self.quantum[0] << 2) | (self.quantum[1] >> 4));
                    out.push((self.quantum[1] << 4) | (self.quantum[2] >> 2));
                    out.push((self.quantum[2] << 6) | self.quantum[3]);
                    self.quantum_len = 0;
                }
            } else if ch == b'=' {
                self.flush(out);
            }
        }
    }

    pub fn finalize(&mut self, out: &mut Vec<u8>) {
        self.flush(out);
    }

    fn flush(&mut self, out: &mut Vec<u8>) {
        match self.quantum_len {
            2 => out.push((self.quantum[0] << 2) | (self.quantum[1] >> 4)),
            3 => {
                out.push((self.quantum[0] << 2) | (self.quantum[1] >> 4));
                out.push((self.quantum[1] << 4) | (self.quantum[2] >> 2));
            }
            _ => (),
        }
        self.quantum_len = 0;
    }
}

/// Strict decode of one RFC2047 `B` encoded-word payload.
///
/// The whole payload must use the base64 alphabet; the one tolerated
/// irregularity is a stray trailing `=` that makes the length 1 mod 4,
/// which some encoders emit.
pub fn decode_base64_word(data: &[u8]) -> Option<Vec<u8>> {
    let data = if data.len() % 4 == 1 && data.last() == Some(&b'=') {
        &data[..data.len() - 1]
    } else {
        data
    };

    let mut out = Vec::with_capacity(data.len() / 4 * 3 + 3);
    let mut quantum = [0u8; 4];
    let mut quantum_len = 0;
    let mut seen_padding = false;

    for &ch in data {
        if ch == b'=' {
            seen_padding = true;
            continue;
        }
        if seen_padding {
            return None;
        }
        let val = B64_MAP[ch as usize];
        if val < 0 {
            return None;
        }
        quantum[quantum_len] = val as u8;
        quantum_len += 1;
        if quantum_len == 4 {
            out.push((quantum[0] << 2) | (quantum[1] >> 4));
            out.push((quantum[1] << 4) | (quantum[2] >> 2));
            out.push((quantum[2] << 6) | quantum[3]);
            quantum_len = 0;
        }
    }

    match quantum_len {
        0 => (),
        2 => out.push((quantum[0] << 2) | (quantum[1] >> 4)),
        3 => {
            out.push((quantum[0] << 2) | (quantum[1] >> 4));
            out.push((quantum[1] << 4) | (quantum[2] >> 2));
        }
        _ => return None,
    }

    Some(out)
}

pub static B64_MAP: &[i8] = &[
    -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
    -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, 62, -1, -1, -1, 63,
    52, 53, 54, 55, 56, 57, 58, 59, 60, 61, -1, -1, -1, -1, -1, -1, -1, 0, 1, 2, 3, 4, 5, 6, 7, 8,
    9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, -1, -1, -1, -1, -1, -1, 26,
    27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48, 49, 50,
    51, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
    -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
    -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
    -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
    -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
    -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
];

#[cfg(test)]
mod tests {
    use super::{decode_base64_word, Base64Decoder};

    #[test]
    fn base64_decode_words() {
        let inputs = [
            ("w6k=", Some("é")),
            ("SWYgeW91IGNhbiByZWFkIHRoaXMgeW8=", Some("If you can read this yo")),
            ("dSB1bmRlcnN0YW5kIHRoZSBleGFtcGxlLg==", Some("u understand the example.")),
            ("VGjDrXMgw61zIHbDoWzDrWQgw5pURjg=", Some("Thís ís válíd ÚTF8")),
            // stray '=' making the length 1 mod 4
            ("dGVzdA===", Some("test")),
            ("not base64!", None),
            ("QQ=B", None),
        ];

        for (input, expected) in inputs {
            assert_eq!(
                decode_base64_word(input.as_bytes()),
                expected.map(|e| e.as_bytes().to_vec()),
                "{}",
                input
            );
        }
    }

    #[test]
    fn base64_decode_streaming() {
        let input = "SWYgeW91IGNhbiByZWFkIHRo\r\naXMgeW91IHVuZGVyc3RhbmQg\r\ndGhlIGV4YW1wbGUu\r\n";
        let expected = "If you can read this you understand the example.";

        for split in 0..input.len() {
            let mut decoder = Base64Decoder::new();
            let mut out = Vec::new();
            decoder.decode(input[..split].as_bytes(), &mut out);
            decoder.decode(input[split..].as_bytes(), &mut out);
            decoder.finalize(&mut out);
            assert_eq!(out, expected.as_bytes(), "split at {}", split);
        }
    }
}
