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

use crate::core::headers::MessageHeaders;
use crate::decoders::base64::Base64Decoder;
use crate::decoders::charsets::TextDecoder;
use crate::decoders::quoted_printable::QuotedPrintableDecoder;
use crate::parsers::header::find_end_of_headers;
use crate::ContentType;

/// An error raised by a consumer callback. Routed through the
/// `on_error` option; the default is to discard it and keep parsing.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        HandlerError(message.into())
    }
}

/// One chunk of body data. Chunk boundaries carry no meaning;
/// consumers concatenate.
#[derive(Debug, PartialEq, Eq)]
pub enum PartData<'x> {
    Bytes(&'x [u8]),
    /// Charset-decoded text, only in `StrFormat::Unicode` mode for
    /// text parts with a known charset.
    Text(&'x str),
}

impl PartData<'_> {
    pub fn len(&self) -> usize {
        match self {
            PartData::Bytes(bytes) => bytes.len(),
            PartData::Text(text) => text.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            PartData::Bytes(bytes) => bytes,
            PartData::Text(text) => text.as_bytes(),
        }
    }
}

/// Receives parsing events, all optional. Ordering guarantees: one
/// `start_message` first and one `end_message` last; per part,
/// `start_part` before any data, descendants complete before the
/// parent's `end_part`, data chunks in source byte order.
pub trait MessageHandler {
    fn start_message(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }

    fn end_message(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }

    fn start_part(&mut self, _part: &str, _headers: MessageHeaders) -> Result<(), HandlerError> {
        Ok(())
    }

    fn end_part(&mut self, _part: &str) -> Result<(), HandlerError> {
        Ok(())
    }

    fn part_data(&mut self, _part: &str, _data: PartData<'_>) -> Result<(), HandlerError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyFormat {
    /// No body data callbacks at all.
    None,
    /// Raw bytes, no transfer decoding; at the prune target, inner
    /// boundaries are not split either.
    Raw,
    /// Raw bytes, but multipart structure is still walked.
    #[default]
    NoDecode,
    /// Quoted-printable and base64 are decoded.
    Decode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrFormat {
    /// Deliver body data as raw bytes.
    #[default]
    Bytes,
    /// Deliver text parts as Unicode when their charset is known.
    Unicode,
}

/// Error hook: return `Err` to abort the current push call.
pub type ErrorHook = fn(HandlerError) -> Result<(), HandlerError>;

#[derive(Debug, Clone)]
pub struct ParserOptions {
    /// Part-number prefix; parts outside it get no callbacks.
    pub prune_at: String,
    pub body_format: BodyFormat,
    pub str_format: StrFormat,
    /// Fallback charset label for headers and text bodies.
    pub charset: String,
    /// Ignore Content-Type charsets and always use `charset`.
    pub force_charset: bool,
    /// Remove embedded line breaks from folded header values.
    pub strip_continuations: bool,
    pub on_error: Option<ErrorHook>,
}

impl Default for ParserOptions {
    fn default() -> Self {
        ParserOptions {
            prune_at: String::new(),
            body_format: BodyFormat::default(),
            str_format: StrFormat::default(),
            charset: String::new(),
            force_charset: false,
            strip_continuations: true,
            on_error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ParsingHeaders,
    BlackHole,
    Emitter,
    Subparser,
}

// The stateful content rewriter between raw body octets and whatever
// consumes them. The cross-packet carry lives inside each variant.
enum ContentConverter {
    None,
    QuotedPrintable(QuotedPrintableDecoder),
    Base64(Base64Decoder),
    // Withholds a trailing line ending that may belong to the next
    // multipart boundary.
    WithholdCrlf(Vec<u8>),
}

impl ContentConverter {
    fn for_encoding(encoding: &str) -> ContentConverter {
        match encoding {
            "quoted-printable" => ContentConverter::QuotedPrintable(QuotedPrintableDecoder::new()),
            "base64" => ContentConverter::Base64(Base64Decoder::new()),
            _ => ContentConverter::None,
        }
    }

    fn convert(&mut self, data: &[u8], more: bool) -> Vec<u8> {
        match self {
            ContentConverter::None => data.to_vec(),
            ContentConverter::QuotedPrintable(decoder) => {
                let mut out = Vec::with_capacity(data.len());
                decoder.decode(data, &mut out);
                if !more {
                    decoder.finalize(&mut out);
                }
                out
            }
            ContentConverter::Base64(decoder) => {
                let mut out = Vec::with_capacity(data.len() / 4 * 3 + 3);
                decoder.decode(data, &mut out);
                if !more {
                    decoder.finalize(&mut out);
                }
                out
            }
            ContentConverter::WithholdCrlf(held) => {
                let mut out = std::mem::take(held);
                out.extend_from_slice(data);
                if more {
                    let keep = if out.ends_with(b"\r\n") {
                        out.len() - 2
                    } else if matches!(out.last(), Some(b'\r' | b'\n')) {
                        out.len() - 1
                    } else {
                        out.len()
                    };
                    *held = out.split_off(keep);
                }
                out
            }
        }
    }

    fn take_withheld(&mut self) -> Vec<u8> {
        match self {
            ContentConverter::WithholdCrlf(held) => std::mem::take(held),
            _ => Vec::new(),
        }
    }
}

struct PartState {
    state: State,
    part_num: String,
    header_text: Vec<u8>,
    // partial line carried across packets
    hold: Vec<u8>,
    boundary: Option<Vec<u8>>,
    split_count: u32,
    child: Option<Box<PartState>>,
    child_num: Option<String>,
    converter: ContentConverter,
    text_decoder: Option<TextDecoder>,
    default_content_type: ContentType,
    child_default_content_type: ContentType,
}

impl PartState {
    fn new(part_num: String, default_content_type: ContentType) -> Self {
        PartState {
            state: State::ParsingHeaders,
            part_num,
            header_text: Vec::new(),
            hold: Vec::new(),
            boundary: None,
            split_count: 0,
            child: None,
            child_num: None,
            converter: ContentConverter::None,
            text_decoder: None,
            default_content_type,
            child_default_content_type: ContentType::default(),
        }
    }
}

struct Ctx<'a, H> {
    handler: &'a mut H,
    options: &'a ParserOptions,
}

impl<H: MessageHandler> Ctx<'_, H> {
    // Callback errors go to the on_error hook; without one they are
    // swallowed. A hook returning Err aborts the push call.
    fn deliver<F>(&mut self, f: F) -> Result<(), HandlerError>
    where
        F: FnOnce(&mut H) -> Result<(), HandlerError>,
    {
        match f(self.handler) {
            Ok(()) => Ok(()),
            Err(err) => match self.options.on_error {
                Some(hook) => hook(err),
                None => Ok(()),
            },
        }
    }
}

/// Streaming push parser for MIME messages. Feed byte chunks with
/// [`MimeParser::write`], finish with [`MimeParser::eof`]; events
/// arrive on the handler. Malformed input never aborts parsing.
pub struct MimeParser<H: MessageHandler> {
    handler: H,
    options: ParserOptions,
    root: PartState,
    started: bool,
}

impl<H: MessageHandler> MimeParser<H> {
    pub fn new(handler: H, options: ParserOptions) -> Self {
        MimeParser {
            handler,
            options,
            root: PartState::new(String::new(), ContentType::default()),
            started: false,
        }
    }

    pub fn write(&mut self, data: &[u8]) -> Result<(), HandlerError> {
        let mut ctx = Ctx {
            handler: &mut self.handler,
            options: &self.options,
        };
        if !self.started {
            self.started = true;
            ctx.deliver(|h| h.start_message())?;
        }
        conditioned_write(&mut self.root, data, &mut ctx)
    }

    pub fn eof(&mut self) -> Result<(), HandlerError> {
        let mut ctx = Ctx {
            handler: &mut self.handler,
            options: &self.options,
        };
        if !self.started {
            self.started = true;
            ctx.deliver(|h| h.start_message())?;
        }
        dispatch_eof(&mut self.root, &mut ctx)?;
        ctx.deliver(|h| h.end_message())
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }
}

// Packet conditioning: prepend held bytes, cut at the last line ending
// (a trailing CR is withheld, it may be half of a CRLF), hold the rest.
fn conditioned_write<H: MessageHandler>(
    part: &mut PartState,
    data: &[u8],
    ctx: &mut Ctx<'_, H>,
) -> Result<(), HandlerError> {
    let mut buffer = std::mem::take(&mut part.hold);
    buffer.extend_from_slice(data);

    let mut search_end = buffer.len();
    if buffer.last() == Some(&b'\r') {
        search_end -= 1;
    }
    let cut = buffer[..search_end]
        .iter()
        .rposition(|&ch| ch == b'\n' || ch == b'\r')
        .map_or(0, |pos| pos + 1);

    part.hold = buffer.split_off(cut);
    if buffer.is_empty() {
        return Ok(());
    }
    dispatch_data(part, &buffer, true, ctx)
}

fn dispatch_data<H: MessageHandler>(
    part: &mut PartState,
    buffer: &[u8],
    check_split: bool,
    ctx: &mut Ctx<'_, H>,
) -> Result<(), HandlerError> {
    if part.state == State::ParsingHeaders {
        return accumulate_headers(part, buffer, ctx);
    }

    if check_split {
        let matched = part
            .boundary
            .as_deref()
            .and_then(|boundary| find_boundary(buffer, boundary));
        if let Some(m) = matched {
            if m.start > 0 {
                dispatch_data(part, &buffer[..m.start], false, ctx)?;
            }
            handle_split(part, &m, ctx)?;
            if m.end < buffer.len() {
                dispatch_data(part, &buffer[m.end..], true, ctx)?;
            }
            return Ok(());
        }
    }

    match part.state {
        State::BlackHole => Ok(()),
        State::Emitter => {
            let deliver = ctx.options.body_format != BodyFormat::None
                && !is_pruned(&part.part_num, &ctx.options.prune_at);
            let converted = part.converter.convert(buffer, true);
            if deliver {
                deliver_part_data(part, &converted, false, ctx)
            } else {
                Ok(())
            }
        }
        State::Subparser => {
            let converted = part.converter.convert(buffer, true);
            if let Some(child) = part.child.as_mut() {
                if !converted.is_empty() {
                    conditioned_write(child, &converted, ctx)?;
                }
            }
            Ok(())
        }
        State::ParsingHeaders => unreachable!(),
    }
}

fn accumulate_headers<H: MessageHandler>(
    part: &mut PartState,
    buffer: &[u8],
    ctx: &mut Ctx<'_, H>,
) -> Result<(), HandlerError> {
    part.header_text.extend_from_slice(buffer);

    if let Some((header_end, body_start)) = find_end_of_headers(&part.header_text) {
        let header_block = part.header_text[..header_end].to_vec();
        let rest = part.header_text[body_start..].to_vec();
        part.header_text = Vec::new();
        start_body(part, &header_block, ctx)?;
        if !rest.is_empty() {
            dispatch_data(part, &rest, true, ctx)?;
        }
    }
    Ok(())
}

// End of headers seen: parse them, pick the body state, announce the
// part.
fn start_body<H: MessageHandler>(
    part: &mut PartState,
    header_block: &[u8],
    ctx: &mut Ctx<'_, H>,
) -> Result<(), HandlerError> {
    let mut headers = MessageHeaders::parse(
        header_block,
        ctx.options.strip_continuations,
        &ctx.options.charset,
    );
    headers.set_default_content_type(part.default_content_type.clone());

    let content_type = headers.content_type();
    let encoding = headers.content_transfer_encoding().unwrap_or_default();

    let raw_target =
        ctx.options.body_format == BodyFormat::Raw && part.part_num == ctx.options.prune_at;

    if raw_target {
        // deliver this part's body byte for byte, boundaries included
        part.state = State::Emitter;
    } else if content_type.c_type == "multipart" {
        match content_type.attribute("boundary") {
            Some(boundary) if !boundary.is_empty() => {
                part.boundary = Some(boundary.as_bytes().to_vec());
                part.split_count = 1;
                part.child_num = None;
                part.converter = ContentConverter::WithholdCrlf(Vec::new());
                part.child_default_content_type = if content_type.c_subtype == "digest" {
                    ContentType::new("message", "rfc822")
                } else {
                    ContentType::default()
                };
                // everything before the first boundary is prologue
                part.state = State::BlackHole;
            }
            _ => part.state = State::BlackHole,
        }
    } else if content_type.c_type == "message"
        && matches!(content_type.c_subtype.as_str(), "rfc822" | "global" | "news")
    {
        let child_num = format!("{}$", part.part_num);
        part.child = Some(Box::new(PartState::new(
            child_num.clone(),
            ContentType::default(),
        )));
        part.child_num = Some(child_num);
        part.converter = ContentConverter::for_encoding(&encoding);
        part.state = State::Subparser;
    } else {
        if ctx.options.body_format == BodyFormat::Decode {
            part.converter = ContentConverter::for_encoding(&encoding);
        }
        part.state = State::Emitter;
    }

    // charset-decode text bodies in unicode mode
    if ctx.options.str_format == StrFormat::Unicode
        && ctx.options.body_format != BodyFormat::Raw
        && part.state == State::Emitter
        && content_type.c_type == "text"
    {
        let label = if ctx.options.force_charset {
            Some(ctx.options.charset.as_str())
        } else {
            content_type
                .attribute("charset")
                .or(if ctx.options.charset.is_empty() {
                    None
                } else {
                    Some(ctx.options.charset.as_str())
                })
        };
        part.text_decoder = label
            .filter(|label| !label.is_empty())
            .and_then(|label| TextDecoder::for_label(label.as_bytes()));
    }

    if !is_pruned(&part.part_num, &ctx.options.prune_at) {
        let part_num = part.part_num.clone();
        ctx.deliver(move |h| h.start_part(&part_num, headers))?;
    }
    Ok(())
}

struct BoundaryMatch {
    start: usize,
    end: usize,
    leading_len: usize,
    is_final: bool,
}

// Hand-rolled equivalent of `(^|\r\n|\r|\n)--B(--)?[ \t]*(\r\n|\r|\n|$)`.
fn find_boundary(buffer: &[u8], boundary: &[u8]) -> Option<BoundaryMatch> {
    let mut dash = 0;
    while dash + 2 + boundary.len() <= buffer.len() {
        if !buffer[dash..].starts_with(b"--") || !buffer[dash + 2..].starts_with(boundary) {
            dash += 1;
            continue;
        }

        // the boundary line must begin the buffer or follow a line
        // ending, which the match then owns
        let leading_len = if dash == 0 {
            0
        } else if dash >= 2 && buffer[dash - 2..].starts_with(b"\r\n") {
            2
        } else if matches!(buffer[dash - 1], b'\r' | b'\n') {
            1
        } else {
            dash += 1;
            continue;
        };

        let after = dash + 2 + boundary.len();
        // prefer the closing "--" form, fall back without it
        for &try_final in &[true, false] {
            let mut pos = after;
            if try_final {
                if !buffer[pos..].starts_with(b"--") {
                    continue;
                }
                pos += 2;
            }
            while matches!(buffer.get(pos), Some(b' ' | b'\t')) {
                pos += 1;
            }
            let end = match buffer.get(pos) {
                None => pos,
                Some(b'\r') if buffer.get(pos + 1) == Some(&b'\n') => pos + 2,
                Some(b'\r' | b'\n') => pos + 1,
                Some(_) => continue,
            };
            return Some(BoundaryMatch {
                start: dash - leading_len,
                end,
                leading_len,
                is_final: try_final,
            });
        }

        dash += 1;
    }
    None
}

// A boundary hit: close out the current child (stripping the withheld
// line ending when the boundary owned it), then either open the next
// part or, at the final boundary, ignore everything that follows.
fn handle_split<H: MessageHandler>(
    part: &mut PartState,
    m: &BoundaryMatch,
    ctx: &mut Ctx<'_, H>,
) -> Result<(), HandlerError> {
    if part.child_num.is_some() {
        let mut withheld = part.converter.take_withheld();
        if m.leading_len == 0 {
            strip_trailing_line_ending(&mut withheld);
        }
        if let Some(child) = part.child.as_mut() {
            if !withheld.is_empty() {
                conditioned_write(child, &withheld, ctx)?;
            }
            dispatch_eof(child, ctx)?;
        }
        part.child = None;
        part.child_num = None;
    }

    if m.is_final {
        // terminator: drop the split and ignore the epilogue
        part.boundary = None;
        part.state = State::BlackHole;
    } else {
        let child_num = if part.part_num.is_empty() {
            format!("{}", part.split_count)
        } else {
            format!("{}.{}", part.part_num, part.split_count)
        };
        part.split_count += 1;
        part.child = Some(Box::new(PartState::new(
            child_num.clone(),
            part.child_default_content_type.clone(),
        )));
        part.child_num = Some(child_num);
        part.state = State::Subparser;
    }
    Ok(())
}

fn strip_trailing_line_ending(data: &mut Vec<u8>) {
    if data.ends_with(b"\r\n") {
        data.truncate(data.len() - 2);
    } else if matches!(data.last(), Some(b'\r' | b'\n')) {
        data.truncate(data.len() - 1);
    }
}

fn deliver_part_data<H: MessageHandler>(
    part: &mut PartState,
    data: &[u8],
    last: bool,
    ctx: &mut Ctx<'_, H>,
) -> Result<(), HandlerError> {
    if data.is_empty() && !last {
        return Ok(());
    }
    let part_num = part.part_num.clone();
    match part.text_decoder.as_mut() {
        Some(decoder) => {
            let text = decoder.decode(data, last);
            if !text.is_empty() {
                ctx.deliver(|h| h.part_data(&part_num, PartData::Text(&text)))
            } else {
                Ok(())
            }
        }
        None => {
            if !data.is_empty() {
                ctx.deliver(|h| h.part_data(&part_num, PartData::Bytes(data)))
            } else {
                Ok(())
            }
        }
    }
}

fn dispatch_eof<H: MessageHandler>(
    part: &mut PartState,
    ctx: &mut Ctx<'_, H>,
) -> Result<(), HandlerError> {
    let hold = std::mem::take(&mut part.hold);
    if !hold.is_empty() {
        dispatch_data(part, &hold, true, ctx)?;
    }

    match part.state {
        State::ParsingHeaders => {
            // the message ended inside its headers
            let header_block = std::mem::take(&mut part.header_text);
            start_body(part, &header_block, ctx)?;
        }
        State::Emitter => {
            let deliver = ctx.options.body_format != BodyFormat::None
                && !is_pruned(&part.part_num, &ctx.options.prune_at);
            let converted = part.converter.convert(&[], false);
            if deliver {
                deliver_part_data(part, &converted, true, ctx)?;
            }
        }
        State::Subparser => {
            let converted = part.converter.convert(&[], false);
            if let Some(child) = part.child.as_mut() {
                if !converted.is_empty() {
                    conditioned_write(child, &converted, ctx)?;
                }
                dispatch_eof(child, ctx)?;
            }
            part.child = None;
            part.child_num = None;
        }
        State::BlackHole => (),
    }

    if !is_pruned(&part.part_num, &ctx.options.prune_at) {
        let part_num = part.part_num.clone();
        ctx.deliver(|h| h.end_part(&part_num))?;
    }
    Ok(())
}

// A part survives pruning when it equals the prefix or continues it
// with `.` or `$`.
fn is_pruned(part_num: &str, prune_at: &str) -> bool {
    if prune_at.is_empty() || part_num == prune_at {
        return false;
    }
    match part_num.strip_prefix(prune_at) {
        Some(rest) => !(rest.starts_with('.') || rest.starts_with('$')),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        BodyFormat, HandlerError, MessageHandler, MimeParser, ParserOptions, PartData, StrFormat,
    };
    use crate::core::headers::MessageHeaders;

    // Records every event as a line, data concatenated per part.
    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        data: Vec<(String, Vec<u8>)>,
    }

    impl Recorder {
        fn body(&self, part: &str) -> Vec<u8> {
            self.data
                .iter()
                .filter(|(num, _)| num == part)
                .flat_map(|(_, data)| data.iter().copied())
                .collect()
        }
    }

    impl MessageHandler for Recorder {
        fn start_message(&mut self) -> Result<(), HandlerError> {
            self.events.push("startMessage".into());
            Ok(())
        }

        fn end_message(&mut self) -> Result<(), HandlerError> {
            self.events.push("endMessage".into());
            Ok(())
        }

        fn start_part(&mut self, part: &str, _headers: MessageHeaders) -> Result<(), HandlerError> {
            self.events.push(format!("startPart {:?}", part));
            Ok(())
        }

        fn end_part(&mut self, part: &str) -> Result<(), HandlerError> {
            self.events.push(format!("endPart {:?}", part));
            Ok(())
        }

        fn part_data(&mut self, part: &str, data: PartData<'_>) -> Result<(), HandlerError> {
            self.data.push((part.into(), data.as_bytes().to_vec()));
            Ok(())
        }
    }

    fn parse_with(options: ParserOptions, chunks: &[&[u8]]) -> Recorder {
        let mut parser = MimeParser::new(Recorder::default(), options);
        for chunk in chunks {
            parser.write(chunk).unwrap();
        }
        parser.eof().unwrap();
        parser.into_handler()
    }

    fn parse(message: &[u8]) -> Recorder {
        parse_with(ParserOptions::default(), &[message])
    }

    #[test]
    fn simple_message() {
        let recorder = parse(b"Subject: test\r\n\r\nHello, world!\r\n");
        assert_eq!(
            recorder.events,
            [
                "startMessage",
                "startPart \"\"",
                "endPart \"\"",
                "endMessage"
            ]
        );
        assert_eq!(recorder.body(""), b"Hello, world!\r\n");
    }

    #[test]
    fn arbitrary_packet_boundaries() {
        let message = b"Subject: split\r\n\r\nline one\r\nline two\r\n";
        for split in 0..message.len() {
            let recorder = parse_with(
                ParserOptions::default(),
                &[&message[..split], &message[split..]],
            );
            assert_eq!(
                recorder.body(""),
                b"line one\r\nline two\r\n",
                "split at {}",
                split
            );
        }
    }

    #[test]
    fn multipart_with_two_parts() {
        let message = b"Content-Type: multipart/mixed; boundary=frontier\r\n\
            \r\n\
            preamble\r\n\
            --frontier\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            first body\r\n\
            --frontier\r\n\
            Content-Type: text/html\r\n\
            \r\n\
            <p>second</p>\r\n\
            --frontier--\r\n\
            epilogue\r\n";

        let recorder = parse(message);
        assert_eq!(
            recorder.events,
            [
                "startMessage",
                "startPart \"\"",
                "startPart \"1\"",
                "endPart \"1\"",
                "startPart \"2\"",
                "endPart \"2\"",
                "endPart \"\"",
                "endMessage"
            ]
        );
        assert_eq!(recorder.body("1"), b"first body");
        assert_eq!(recorder.body("2"), b"<p>second</p>");
        // prologue and epilogue go nowhere
        assert_eq!(recorder.body(""), b"");
    }

    #[test]
    fn multipart_across_every_packet_split() {
        let message = b"Content-Type: multipart/mixed; boundary=b\r\n\
            \r\n\
            --b\r\n\
            \r\n\
            first\r\n\
            \r\n\
            --b\r\n\
            \r\n\
            second\r\n\
            --b--\r\n";

        for split in 0..message.len() {
            let recorder = parse_with(
                ParserOptions::default(),
                &[&message[..split], &message[split..]],
            );
            // the blank line before the boundary belongs to part one
            assert_eq!(recorder.body("1"), b"first\r\n", "split at {}", split);
            assert_eq!(recorder.body("2"), b"second", "split at {}", split);
        }
    }

    #[test]
    fn nested_multipart_numbering() {
        let message = b"Content-Type: multipart/mixed; boundary=outer\r\n\
            \r\n\
            --outer\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            one\r\n\
            --outer\r\n\
            Content-Type: multipart/alternative; boundary=inner\r\n\
            \r\n\
            --inner\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            two-one\r\n\
            --inner\r\n\
            Content-Type: text/html\r\n\
            \r\n\
            two-two\r\n\
            --inner--\r\n\
            --outer--\r\n";

        let recorder = parse(message);
        let starts: Vec<&String> = recorder
            .events
            .iter()
            .filter(|e| e.starts_with("startPart"))
            .collect();
        assert_eq!(
            starts,
            [
                "startPart \"\"",
                "startPart \"1\"",
                "startPart \"2\"",
                "startPart \"2.1\"",
                "startPart \"2.2\""
            ]
        );
        assert_eq!(recorder.body("2.1"), b"two-one");
        assert_eq!(recorder.body("2.2"), b"two-two");
    }

    #[test]
    fn message_rfc822_subparsing() {
        let message = b"Content-Type: message/rfc822\r\n\
            \r\n\
            Subject: inner\r\n\
            \r\n\
            inner body\r\n";

        let recorder = parse(message);
        assert_eq!(
            recorder.events,
            [
                "startMessage",
                "startPart \"\"",
                "startPart \"$\"",
                "endPart \"$\"",
                "endPart \"\"",
                "endMessage"
            ]
        );
        assert_eq!(recorder.body("$"), b"inner body\r\n");
    }

    #[test]
    fn message_rfc822_with_base64_wrapper() {
        // base64 of "Subject: b64\r\n\r\nwrapped\r\n"
        let message = b"Content-Type: message/rfc822\r\n\
            Content-Transfer-Encoding: base64\r\n\
            \r\n\
            U3ViamVjdDogYjY0DQoNCndyYXBwZWQNCg==\r\n";

        let recorder = parse(message);
        assert!(recorder.events.contains(&"startPart \"$\"".to_string()));
        assert_eq!(recorder.body("$"), b"wrapped\r\n");
    }

    #[test]
    fn quoted_printable_decoding() {
        let message = b"Content-Type: text/plain\r\n\
            Content-Transfer-Encoding: quoted-printable\r\n\
            \r\n\
            caf=C3=A9 line=\r\ncontinued\r\n";

        // nodecode leaves the body alone
        let recorder = parse(message);
        assert_eq!(recorder.body(""), b"caf=C3=A9 line=\r\ncontinued\r\n");

        let recorder = parse_with(
            ParserOptions {
                body_format: BodyFormat::Decode,
                ..Default::default()
            },
            &[message],
        );
        assert_eq!(recorder.body(""), "café linecontinued\r\n".as_bytes());
    }

    #[test]
    fn unicode_text_delivery() {
        let message = b"Content-Type: text/plain; charset=iso-8859-1\r\n\
            Content-Transfer-Encoding: quoted-printable\r\n\
            \r\n\
            caf=E9\r\n";

        let recorder = parse_with(
            ParserOptions {
                body_format: BodyFormat::Decode,
                str_format: StrFormat::Unicode,
                ..Default::default()
            },
            &[message],
        );
        assert_eq!(recorder.body(""), "café\r\n".as_bytes());
    }

    #[test]
    fn pruning() {
        let message = b"Content-Type: multipart/mixed; boundary=b\r\n\
            \r\n\
            --b\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            one\r\n\
            --b\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            two\r\n\
            --b--\r\n";

        let recorder = parse_with(
            ParserOptions {
                prune_at: "2".into(),
                ..Default::default()
            },
            &[message],
        );
        assert_eq!(
            recorder.events,
            [
                "startMessage",
                "startPart \"2\"",
                "endPart \"2\"",
                "endMessage"
            ]
        );
        assert_eq!(recorder.body("1"), b"");
        assert_eq!(recorder.body("2"), b"two");
    }

    #[test]
    fn body_format_none() {
        let recorder = parse_with(
            ParserOptions {
                body_format: BodyFormat::None,
                ..Default::default()
            },
            &[b"Subject: x\r\n\r\nsome body\r\n"],
        );
        assert!(recorder.data.is_empty());
        assert_eq!(recorder.events.len(), 4);
    }

    #[test]
    fn raw_prune_target_keeps_boundaries() {
        let message = b"Content-Type: multipart/mixed; boundary=b\r\n\
            \r\n\
            --b\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            one\r\n\
            --b--\r\n";

        let recorder = parse_with(
            ParserOptions {
                body_format: BodyFormat::Raw,
                ..Default::default()
            },
            &[message],
        );
        // the whole multipart body arrives raw on the root part
        assert_eq!(
            recorder.body(""),
            b"--b\r\nContent-Type: text/plain\r\n\r\none\r\n--b--\r\n"
        );
    }

    #[test]
    fn missing_boundary_is_black_hole() {
        let recorder = parse(b"Content-Type: multipart/mixed\r\n\r\nlost body\r\n");
        assert_eq!(recorder.body(""), b"");
        assert_eq!(recorder.events.len(), 4);
    }

    #[test]
    fn headers_only_message() {
        let recorder = parse(b"Subject: no body");
        assert_eq!(
            recorder.events,
            [
                "startMessage",
                "startPart \"\"",
                "endPart \"\"",
                "endMessage"
            ]
        );
    }

    #[test]
    fn boundary_without_final_newline() {
        let message = b"Content-Type: multipart/mixed; boundary=b\r\n\
            \r\n\
            --b\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            one\r\n\
            --b--";

        let recorder = parse(message);
        assert_eq!(recorder.body("1"), b"one");
        assert!(recorder.events.contains(&"endPart \"1\"".to_string()));
    }

    #[test]
    fn error_hook_aborts() {
        struct Failing;
        impl MessageHandler for Failing {
            fn start_part(
                &mut self,
                _part: &str,
                _headers: MessageHeaders,
            ) -> Result<(), HandlerError> {
                Err(HandlerError::new("boom"))
            }
        }

        // default: swallowed
        let mut parser = MimeParser::new(Failing, ParserOptions::default());
        parser.write(b"Subject: x\r\n\r\nbody\r\n").unwrap();
        parser.eof().unwrap();

        // rethrowing hook: aborts
        let mut parser = MimeParser::new(
            Failing,
            ParserOptions {
                on_error: Some(|err| Err(err)),
                ..Default::default()
            },
        );
        assert!(parser.write(b"Subject: x\r\n\r\nbody\r\n").is_err());
    }
}
