//! Streaming inbound parser.
//!
//! A [`Disassembler`] owns a growing byte buffer. Raw socket chunks are
//! appended with [`Disassembler::push`]; every complete frame (bytes before
//! the terminator) is carved off the front and handed to a [`FrameParser`].
//!
//! | Variant | Terminator | Output |
//! |---------|------------|--------|
//! | [`GreetingDisassembler`] | `\r\n` | [`Greeting`] |
//! | [`PacketDisassembler`] | `\r\n\r\n` | [`PacketKind`] |
//!
//! Frames may span any number of pushes, and one push may complete any
//! number of frames.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::iter;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, trace, warn};

use super::packet::{Packet, PacketKind};

// ============================================================================
// Constants
// ============================================================================

/// Greeting line terminator.
pub const GREETING_TERMINATOR: &[u8] = b"\r\n";

/// Packet terminator (blank line).
pub const PACKET_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Banner sent by the server on connect, e.g. `Asterisk Call Manager/1.1`.
static GREETING_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<vendor>\S.*?)\s+Call Manager/(?P<version>\S+)$")
        .expect("greeting pattern is valid")
});

// ============================================================================
// Types
// ============================================================================

/// Called with each recognised greeting.
pub type GreetingCallback = Box<dyn FnMut(&Greeting) + Send>;

/// Called with each parsed packet.
pub type PacketCallback = Box<dyn FnMut(&Packet) + Send>;

// ============================================================================
// FrameParser
// ============================================================================

/// Turns one frame (terminator stripped) into an output value.
pub trait FrameParser {
    /// Parsed value type.
    type Output;

    /// Byte sequence ending a frame.
    const TERMINATOR: &'static [u8];

    /// Parses a non-empty frame. `None` drops it without error.
    fn parse(&mut self, frame: &[u8]) -> Option<Self::Output>;
}

// ============================================================================
// Disassembler
// ============================================================================

/// Buffering frame splitter over a [`FrameParser`].
pub struct Disassembler<P> {
    /// Bytes received but not yet part of a complete frame.
    buffer: Vec<u8>,
    /// Prefix of `buffer` already known not to contain the terminator.
    scanned: usize,
    parser: P,
}

impl<P: FrameParser> Disassembler<P> {
    /// Creates a disassembler around `parser` with an empty buffer.
    #[must_use]
    pub fn with_parser(parser: P) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            parser,
        }
    }

    /// Appends raw bytes, then returns every output they complete.
    pub fn feed(&mut self, data: &[u8]) -> Vec<P::Output> {
        self.push(data);
        iter::from_fn(|| self.next_frame()).collect()
    }

    /// Appends raw bytes without parsing.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Parses frames off the front of the buffer until one yields an output.
    ///
    /// Returns `None` once no complete frame remains.
    pub fn next_frame(&mut self) -> Option<P::Output> {
        loop {
            let frame = self.take_frame()?;
            if frame.is_empty() {
                continue;
            }
            if let Some(output) = self.parser.parse(&frame) {
                return Some(output);
            }
        }
    }

    /// Number of buffered bytes not yet consumed.
    #[inline]
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Borrows the parser.
    #[inline]
    #[must_use]
    pub fn parser(&self) -> &P {
        &self.parser
    }

    /// Mutably borrows the parser.
    #[inline]
    pub fn parser_mut(&mut self) -> &mut P {
        &mut self.parser
    }

    /// Consumes the disassembler, returning unconsumed bytes.
    #[must_use]
    pub fn into_remainder(self) -> Vec<u8> {
        self.buffer
    }

    /// Removes the next frame and its terminator from the buffer.
    fn take_frame(&mut self) -> Option<Vec<u8>> {
        let terminator = P::TERMINATOR;

        let Some(offset) = find(&self.buffer[self.scanned..], terminator) else {
            // A terminator may straddle the end; rescan its possible prefix next time.
            self.scanned = self
                .buffer
                .len()
                .saturating_sub(terminator.len().saturating_sub(1));
            return None;
        };

        let end = self.scanned + offset;
        let frame = self
            .buffer
            .drain(..end + terminator.len())
            .take(end)
            .collect();
        self.scanned = 0;
        Some(frame)
    }
}

impl<P> fmt::Debug for Disassembler<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disassembler")
            .field("buffered", &self.buffer.len())
            .field("scanned", &self.scanned)
            .finish_non_exhaustive()
    }
}

/// Position of the first occurrence of `needle` in `haystack`.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Decodes UTF-8, dropping invalid sequences instead of replacing them.
pub(crate) fn decode_ignoring_invalid(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
    }
    out
}

// ============================================================================
// Greeting
// ============================================================================

/// The banner line a server sends right after accepting a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    /// Full decoded line.
    pub text: String,
    /// Product name before `Call Manager`.
    pub vendor: String,
    /// Protocol version after the slash.
    pub version: String,
}

impl Greeting {
    /// Parses a decoded line; `None` if it is not a greeting.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let captures = GREETING_PATTERN.captures(text)?;
        Some(Self {
            text: text.to_string(),
            vendor: captures["vendor"].to_string(),
            version: captures["version"].to_string(),
        })
    }
}

// ============================================================================
// GreetingParser
// ============================================================================

/// Recognises the server banner.
#[derive(Default)]
pub struct GreetingParser {
    on_greeting: Option<GreetingCallback>,
}

impl GreetingParser {
    /// Creates a parser with no callback.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the callback fired for each recognised greeting.
    #[must_use]
    pub fn on_greeting(mut self, callback: impl FnMut(&Greeting) + Send + 'static) -> Self {
        self.on_greeting = Some(Box::new(callback));
        self
    }
}

impl FrameParser for GreetingParser {
    type Output = Greeting;
    const TERMINATOR: &'static [u8] = GREETING_TERMINATOR;

    fn parse(&mut self, frame: &[u8]) -> Option<Greeting> {
        let text = decode_ignoring_invalid(frame);

        let Some(greeting) = Greeting::parse(&text) else {
            debug!(line = %text, "Dropping non-greeting line");
            return None;
        };

        trace!(vendor = %greeting.vendor, version = %greeting.version, "Greeting parsed");

        if let Some(callback) = self.on_greeting.as_mut() {
            callback(&greeting);
        }

        Some(greeting)
    }
}

// ============================================================================
// PacketParser
// ============================================================================

/// Parses `Key: Value` blocks and routes them by kind.
///
/// `on_packet` fires for every packet, then exactly one of `on_response`,
/// `on_event` or `on_unknown`.
#[derive(Default)]
pub struct PacketParser {
    on_packet: Option<PacketCallback>,
    on_response: Option<PacketCallback>,
    on_event: Option<PacketCallback>,
    on_unknown: Option<PacketCallback>,
}

impl PacketParser {
    /// Creates a parser with no callbacks.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the callback fired for every packet.
    #[must_use]
    pub fn on_packet(mut self, callback: impl FnMut(&Packet) + Send + 'static) -> Self {
        self.on_packet = Some(Box::new(callback));
        self
    }

    /// Sets the callback fired for response packets.
    #[must_use]
    pub fn on_response(mut self, callback: impl FnMut(&Packet) + Send + 'static) -> Self {
        self.on_response = Some(Box::new(callback));
        self
    }

    /// Sets the callback fired for event packets.
    #[must_use]
    pub fn on_event(mut self, callback: impl FnMut(&Packet) + Send + 'static) -> Self {
        self.on_event = Some(Box::new(callback));
        self
    }

    /// Sets the callback fired for packets with neither `Response` nor `Event`.
    #[must_use]
    pub fn on_unknown(mut self, callback: impl FnMut(&Packet) + Send + 'static) -> Self {
        self.on_unknown = Some(Box::new(callback));
        self
    }

    /// Builds a packet from frame text, skipping malformed lines.
    fn build_packet(text: &str) -> Packet {
        let mut packet = Packet::new();

        for line in text.split("\r\n") {
            if line.trim().is_empty() {
                continue;
            }

            match line.split_once(':') {
                Some((key, value)) if !key.trim().is_empty() => {
                    packet.insert(key.trim(), value.trim());
                }
                _ => warn!(line = %line, "Skipping malformed packet line"),
            }
        }

        packet
    }

    fn dispatch(&mut self, kind: &PacketKind) {
        if let Some(callback) = self.on_packet.as_mut() {
            callback(kind.packet());
        }

        let routed = match kind {
            PacketKind::Response(_) => self.on_response.as_mut(),
            PacketKind::Event(_) => self.on_event.as_mut(),
            PacketKind::Unknown(_) => self.on_unknown.as_mut(),
        };

        if let Some(callback) = routed {
            callback(kind.packet());
        }
    }
}

impl FrameParser for PacketParser {
    type Output = PacketKind;
    const TERMINATOR: &'static [u8] = PACKET_TERMINATOR;

    fn parse(&mut self, frame: &[u8]) -> Option<PacketKind> {
        let text = decode_ignoring_invalid(frame);
        let packet = Self::build_packet(&text);

        if packet.is_empty() {
            debug!(frame = %text, "Dropping frame without fields");
            return None;
        }

        let kind = packet.classify();
        trace!(kind = kind.label(), fields = kind.packet().len(), "Packet parsed");

        self.dispatch(&kind);
        Some(kind)
    }
}

// ============================================================================
// Variants
// ============================================================================

/// Disassembler for the connect-time banner.
pub type GreetingDisassembler = Disassembler<GreetingParser>;

/// Disassembler for data packets.
pub type PacketDisassembler = Disassembler<PacketParser>;

impl Disassembler<GreetingParser> {
    /// Creates a greeting disassembler with no callback.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_parser(GreetingParser::new())
    }
}

impl Default for Disassembler<GreetingParser> {
    fn default() -> Self {
        Self::new()
    }
}

impl Disassembler<PacketParser> {
    /// Creates a packet disassembler with no callbacks.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_parser(PacketParser::new())
    }
}

impl Default for Disassembler<PacketParser> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
