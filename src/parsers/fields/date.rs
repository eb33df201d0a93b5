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

use crate::core::datetime::MONTH_NAMES;
use crate::parsers::tokenizer::{tokenize, Token, TokenizerOpts};
use crate::DateTime;

// RFC5322 obsolete zone names plus a few extra names seen in the wild.
// Values are signed HHMM offsets (NST is -3:30).
static TZ_TABLE: &[(&str, i16)] = &[
    ("UT", 0),
    ("GMT", 0),
    ("EST", -500),
    ("EDT", -400),
    ("CST", -600),
    ("CDT", -500),
    ("MST", -700),
    ("MDT", -600),
    ("PST", -800),
    ("PDT", -700),
    ("AST", -400),
    ("NST", -330),
    ("BST", 100),
    ("MET", 100),
    ("EET", 200),
    ("JST", 900),
];

/// Parses an RFC5322 date, with or without the leading day-of-week.
/// Returns `None` when a required field cannot be recovered.
pub fn parse_date(value: &[u8]) -> Option<DateTime> {
    let tokens = tokenize(value, b",:", TokenizerOpts::default());

    // optional `Dow ,` prefix
    let skip = if tokens.get(1).is_some_and(|t| t.is_delimiter(b',')) {
        2
    } else {
        0
    };
    let rest = tokens.get(skip..)?;
    if rest.len() < 8 {
        return None;
    }

    let day = atom_text(&rest[0])?.parse::<u8>().ok()?;
    let month = parse_month(atom_text(&rest[1])?)?;
    let year = parse_year(atom_text(&rest[2])?)?;
    let hour = atom_text(&rest[3])?.parse::<u8>().ok()?;
    if !rest[4].is_delimiter(b':') {
        return None;
    }
    let minute = atom_text(&rest[5])?.parse::<u8>().ok()?;
    if !rest[6].is_delimiter(b':') {
        return None;
    }
    let second = atom_text(&rest[7])?.parse::<u8>().ok()?;

    let (tz_before_gmt, tz_hour, tz_minute) = rest
        .get(8)
        .and_then(|t| atom_text(t))
        .map_or((false, 0, 0), parse_timezone);

    Some(DateTime {
        year,
        month,
        day,
        hour,
        minute,
        second,
        tz_before_gmt,
        tz_hour,
        tz_minute,
    })
}

fn atom_text<'x>(token: &'x Token<'_>) -> Option<&'x str> {
    match token {
        Token::Atom(text) => Some(text.as_ref()),
        _ => None,
    }
}

// First three characters must match the English abbreviation exactly.
fn parse_month(text: &str) -> Option<u8> {
    let prefix = text.get(..3)?;
    MONTH_NAMES
        .iter()
        .position(|&name| name == prefix)
        .map(|pos| pos as u8 + 1)
}

fn parse_year(text: &str) -> Option<u16> {
    let year = text.parse::<u16>().ok()?;
    Some(if text.len() == 2 {
        if year < 50 {
            year + 2000
        } else {
            year + 1900
        }
    } else {
        year
    })
}

// `±HHMM`, a known zone name, or `+0000` for anything else.
fn parse_timezone(text: &str) -> (bool, u8, u8) {
    let bytes = text.as_bytes();
    if bytes.len() == 5
        && (bytes[0] == b'+' || bytes[0] == b'-')
        && bytes[1..].iter().all(|ch| ch.is_ascii_digit())
    {
        let hhmm = text[1..].parse::<u16>().unwrap_or(0);
        return (bytes[0] == b'-', (hhmm / 100) as u8, (hhmm % 100) as u8);
    }

    for (name, offset) in TZ_TABLE {
        if *name == text {
            let hhmm = offset.unsigned_abs();
            return (*offset < 0, (hhmm / 100) as u8, (hhmm % 100) as u8);
        }
    }

    (false, 0, 0)
}

#[cfg(test)]
mod tests {
    use super::parse_date;

    #[test]
    fn parse_dates() {
        let inputs = [
            (
                "Fri, 21 Nov 1997 09:55:06 -0600",
                Some("1997-11-21T09:55:06-06:00"),
            ),
            (
                "Tue, 1 Jul 2003 10:52:37 +0200",
                Some("2003-07-01T10:52:37+02:00"),
            ),
            (
                "Thu, 13 Feb 1969 23:32:54 -0330",
                Some("1969-02-13T23:32:54-03:30"),
            ),
            // no day-of-week
            ("21 Nov 97 09:55:06 GMT", Some("1997-11-21T09:55:06+00:00")),
            // two-digit year pivot
            ("1 Jan 49 00:00:00 +0000", Some("2049-01-01T00:00:00+00:00")),
            ("1 Jan 50 00:00:00 +0000", Some("1950-01-01T00:00:00+00:00")),
            // named zones
            ("21 Nov 1997 09:55:06 EST", Some("1997-11-21T09:55:06-05:00")),
            ("21 Nov 1997 09:55:06 NST", Some("1997-11-21T09:55:06-03:30")),
            ("21 Nov 1997 09:55:06 JST", Some("1997-11-21T09:55:06+09:00")),
            // unknown zone becomes +0000
            ("21 Nov 1997 09:55:06 XYZ", Some("1997-11-21T09:55:06+00:00")),
            // missing timezone tolerated
            ("21 Nov 1997 09:55:06", Some("1997-11-21T09:55:06+00:00")),
            // month is case sensitive on its first three characters
            ("21 NOV 1997 09:55:06 GMT", None),
            // missing seconds is missing a required field
            ("Wed, 27 Jun 1999 04:11 +0900", None),
            ("not a date", None),
            ("", None),
        ];

        for (input, expected) in inputs {
            assert_eq!(
                parse_date(input.as_bytes()).map(|d| d.to_rfc3339()),
                expected.map(|e| e.to_string()),
                "{}",
                input
            );
        }
    }

    #[test]
    fn timestamp_scenario() {
        // equals 1997-11-21T15:55:06Z
        let date = parse_date(b"Fri, 21 Nov 1997 09:55:06 -0600").unwrap();
        assert_eq!(date.to_timestamp(), 880127706);
    }
}
