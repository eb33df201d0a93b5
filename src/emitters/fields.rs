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

use crate::core::registry;
use crate::emitters::emitter::{EmitError, HeaderEmitter};
use crate::{Addr, Address, DateTime, HeaderValue};

// Display-name characters that force a quoted string.
const NAME_QCHARS: &str = ",()<>:;.\"";
// Local-part characters that force a quoted string.
const LOCAL_QCHARS: &str = "()<>[]:;@\\,\" !";

impl HeaderEmitter<'_> {
    /// Writes one mailbox. Named addresses get angle brackets, bare
    /// addresses do not.
    pub fn add_address(&mut self, addr: &Addr) -> Result<(), EmitError> {
        if !addr.name.is_empty() {
            // best effort to keep the name and address on one line
            self.reserve_space(addr.name.chars().count() + addr.email.chars().count() + 3);
            self.add_phrase(&addr.name, NAME_QCHARS, true)?;
            self.add_text("<", false)?;
            self.add_email(&addr.email, ">", false)
        } else {
            self.add_email(&addr.email, "", false)
        }
    }

    // The local-part is quoted when it needs it; the domain and the
    // closing bracket go out as one token.
    fn add_email(&mut self, email: &str, close: &str, may_break_after: bool) -> Result<(), EmitError> {
        match email.rfind('@') {
            Some(at) => {
                self.add_quotable(&email[..at], LOCAL_QCHARS, false)?;
                let mut rest = String::with_capacity(email.len() - at + close.len());
                rest.push('@');
                rest.push_str(&email[at + 1..]);
                rest.push_str(close);
                self.add_text(&rest, may_break_after)
            }
            None => {
                self.add_quotable(email, LOCAL_QCHARS, false)?;
                if !close.is_empty() {
                    self.add_text(close, may_break_after)?;
                }
                Ok(())
            }
        }
    }

    /// Writes an address list, groups expanded as `name : members ;`,
    /// with preferred breaks after the separating commas.
    pub fn add_addresses(&mut self, addresses: &[Address]) -> Result<(), EmitError> {
        for (pos, address) in addresses.iter().enumerate() {
            if pos > 0 {
                self.add_text(",", true)?;
            }
            match address {
                Address::Mailbox(addr) => self.add_address(addr)?,
                Address::Group(group) => {
                    self.add_phrase(&group.name, NAME_QCHARS, false)?;
                    self.add_text(":", true)?;
                    self.add_mailboxes(&group.addresses)?;
                    self.add_text(";", false)?;
                }
            }
        }
        Ok(())
    }

    fn add_mailboxes(&mut self, addresses: &[Addr]) -> Result<(), EmitError> {
        for (pos, addr) in addresses.iter().enumerate() {
            if pos > 0 {
                self.add_text(",", true)?;
            }
            self.add_address(addr)?;
        }
        Ok(())
    }

    /// Writes a date as a single unbreakable token. Fails on dates the
    /// wire format cannot carry.
    pub fn add_date(&mut self, datetime: &DateTime) -> Result<(), EmitError> {
        if !datetime.is_valid() {
            return Err(EmitError::InvalidDate);
        }
        self.add_text(&datetime.to_rfc5322(), false)
    }

    /// Writes `Name:` with a preferred break after the colon.
    pub fn add_header_name(&mut self, name: &str) -> Result<(), EmitError> {
        let mut text = String::with_capacity(name.len() + 1);
        text.push_str(name);
        text.push(':');
        self.add_text(&text, true)
    }

    /// Writes one complete header by name. Registered headers use their
    /// encoder and preferred spelling; unknown headers with a string
    /// value are emitted unstructured under a capitalized name.
    pub fn add_structured_header(
        &mut self,
        name: &str,
        value: &HeaderValue,
    ) -> Result<(), EmitError> {
        let lower = name.to_ascii_lowercase();
        if let Some((preferred, encoder)) = registry::encoder_for(&lower) {
            self.add_header_name(&preferred)?;
            encoder(self, value)?;
        } else if let HeaderValue::Text(text) = value {
            self.add_header_name(&capitalize_header_name(&lower))?;
            self.add_unstructured(text)?;
        } else {
            return Err(EmitError::UnencodableValue(name.into()));
        }
        self.end_header();
        Ok(())
    }
}

// `x-my-header` becomes `X-My-Header`.
fn capitalize_header_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut at_word_start = true;
    for ch in name.chars() {
        if at_word_start {
            result.extend(ch.to_uppercase());
        } else {
            result.push(ch);
        }
        at_word_start = !ch.is_ascii_alphanumeric();
    }
    result
}

// Registry encoder entry points.

pub(crate) fn encode_address_list(
    emitter: &mut HeaderEmitter<'_>,
    value: &HeaderValue,
) -> Result<(), EmitError> {
    match value {
        HeaderValue::AddressList(list) => emitter.add_addresses(list),
        HeaderValue::Text(text) => emitter.add_unstructured(text),
        _ => Err(EmitError::UnencodableValue("address header".into())),
    }
}

pub(crate) fn encode_date(
    emitter: &mut HeaderEmitter<'_>,
    value: &HeaderValue,
) -> Result<(), EmitError> {
    match value {
        HeaderValue::DateTime(datetime) => emitter.add_date(datetime),
        _ => Err(EmitError::InvalidDate),
    }
}
