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

use crate::parsers::encoded_word::decode_encoded_words;

/// Decodes an unstructured header value: RFC2047 words are decoded in
/// place, everything else passes through.
pub fn parse_unstructured(value: &[u8]) -> String {
    decode_encoded_words(String::from_utf8_lossy(value).trim())
}
