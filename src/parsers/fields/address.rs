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

use crate::parsers::tokenizer::{tokenize, Token, TokenizerOpts};
use crate::{Addr, Address, Group};

// Characters that force the local-part into a quoted string when a bare
// `name@domain` is rewritten into an addr-spec.
const LOCAL_PART_SPECIALS: &[u8] = b" !()<>[]:;@\\,\"";

struct AddressParser {
    name: String,
    group_name: Option<String>,
    address: String,
    in_angle: bool,
    needs_space: bool,

    addrlist: Vec<Addr>,
    result: Vec<Address>,
}

impl AddressParser {
    fn commit_address(&mut self) {
        let name = std::mem::take(&mut self.name);
        let email = std::mem::take(&mut self.address);
        if !name.trim().is_empty() || !email.trim().is_empty() {
            self.addrlist.push(Addr {
                name: name.trim().into(),
                email: email.trim().into(),
            });
        }
        self.in_angle = false;
    }

    // The display name seen so far becomes a group name; addresses
    // collected outside any group are flushed to the results first.
    fn open_group(&mut self) {
        self.flush_addrlist();
        self.group_name = Some(std::mem::take(&mut self.name).trim().to_string());
        self.address.clear();
    }

    fn close_group(&mut self) {
        self.commit_address();
        match self.group_name.take() {
            Some(name) => self.result.push(Address::Group(Group {
                name,
                addresses: std::mem::take(&mut self.addrlist),
            })),
            None => self.flush_addrlist(),
        }
    }

    fn flush_addrlist(&mut self) {
        self.result
            .extend(self.addrlist.drain(..).map(Address::Mailbox));
    }

    // `name@domain` with no angle brackets: the name was really the
    // local-part, so move it over, quoting it when it needs quoting.
    fn shift_name_to_address(&mut self) {
        let local = std::mem::take(&mut self.name);
        let local = local.trim();
        if local.bytes().any(|ch| LOCAL_PART_SPECIALS.contains(&ch)) {
            self.address.push('"');
            for ch in local.chars() {
                if ch == '\\' || ch == '"' {
                    self.address.push('\\');
                }
                self.address.push(ch);
            }
            self.address.push('"');
        } else {
            self.address.push_str(local);
        }
    }

    fn push_text(&mut self, token: &Token<'_>) {
        let text = token.text();
        if self.needs_space && !text.starts_with('.') && !matches!(token, Token::CommentEnd) {
            if self.in_angle || !self.address.is_empty() {
                self.address.push(' ');
            } else {
                self.name.push(' ');
            }
        }
        if self.in_angle || !self.address.is_empty() {
            self.address.push_str(&text);
        } else {
            self.name.push_str(&text);
        }
        self.needs_space = !matches!(token, Token::CommentStart);
    }
}

/// Parses an RFC5322 address list: mailboxes and groups in source order.
pub fn parse_address_list(value: &[u8], decode_2047: bool) -> Vec<Address> {
    let mut parser = AddressParser {
        name: String::new(),
        group_name: None,
        address: String::new(),
        in_angle: false,
        needs_space: false,

        addrlist: Vec::new(),
        result: Vec::new(),
    };

    let opts = TokenizerOpts {
        qstring: true,
        dliteral: true,
        comments: true,
        rfc2047: decode_2047,
    };

    for token in tokenize(value, b":,;<>@", opts) {
        match token {
            Token::Delimiter(b':') => {
                parser.open_group();
                parser.needs_space = false;
            }
            Token::Delimiter(b'<') => {
                parser.in_angle = true;
                parser.needs_space = false;
            }
            Token::Delimiter(b'>') => {
                parser.in_angle = false;
                parser.needs_space = false;
            }
            Token::Delimiter(b'@') => {
                if !parser.in_angle && parser.address.is_empty() {
                    parser.shift_name_to_address();
                }
                parser.address.push('@');
                parser.needs_space = false;
            }
            Token::Delimiter(b',') => {
                parser.commit_address();
                parser.needs_space = false;
            }
            Token::Delimiter(b';') => {
                parser.close_group();
                parser.needs_space = false;
            }
            ref token => parser.push_text(token),
        }
    }

    // a missing trailing `;` or `,` is tolerated
    parser.close_group();
    parser.result
}
