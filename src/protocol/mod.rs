//! AMI wire protocol.
//!
//! AMI is a line-oriented text protocol over TCP:
//!
//! | Message | Direction | Framing |
//! |---------|-----------|---------|
//! | Greeting | Server → Client | one line, `\r\n` |
//! | Action | Client → Server | `Key: Value` lines, blank line |
//! | Response / Event | Server → Client | `Key: Value` lines, blank line |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `assembler` | Outbound [`Action`] serialization |
//! | `disassembler` | Streaming inbound frame parsing |
//! | `packet` | [`Packet`] and [`PacketKind`] |

// ============================================================================
// Submodules
// ============================================================================

/// Outbound action serialization.
pub mod assembler;

/// Streaming inbound parser.
pub mod disassembler;

/// Parsed inbound messages.
pub mod packet;

// ============================================================================
// Re-exports
// ============================================================================

pub use assembler::{Action, assemble};
pub use disassembler::{
    Disassembler, FrameParser, Greeting, GreetingDisassembler, GreetingParser,
    PacketDisassembler, PacketParser,
};
pub use packet::{Packet, PacketKind};
