//! # MPEG Transport Stream (TS) Packets
//!
//! This module reads, dissects and builds the fixed-size 188-byte packets of
//! an H.222.0 / ISO 13818-1 transport stream:
//!
//! - **Packet codec**: [`decode`] and [`encode`] convert between wire bytes and
//!   [`PacketFields`]; [`TSPacket`] wraps one packet and dissects it lazily
//! - **Validation**: every packet dissects either forgivingly (plain bit
//!   slicing) or validating (reserved and inconsistent values rejected at
//!   the first violation)
//! - **Builder**: [`build`] packs explicit field values into a packet,
//!   sizing the adaptation field so everything adds up to 188 bytes
//! - **Reading**: [`TSReader`] pulls packets out of any [`std::io::Read`],
//!   numbering them as it goes; [`TSFileReader`] does the same over a file
//! - **Filtering**: [`PidFilter`] keeps the packets of chosen PIDs
//!
//! ## Example Usage
//!
//! ### Dissecting a packet
//!
//! ```rust
//! use tsreader::format::ts::{decode, AdaptationFieldControl};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut data = vec![0x47, 0x1f, 0xff, 0x10];
//! data.extend_from_slice(&[0xff; 184]);
//!
//! let fields = decode(&data, true)?;
//! assert_eq!(fields.pid, 0x1fff);
//! assert_eq!(fields.adaptation_field_control, AdaptationFieldControl::PayloadOnly);
//! # Ok(())
//! # }
//! ```
//!
//! ### Filtering a stream
//!
//! ```rust
//! use std::io::Cursor;
//! use tsreader::format::ts::{PacketFields, TSPacket, TSReader};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut stream = Vec::new();
//! for pid in [0x100, 0x101, 0x100] {
//!     let packet = TSPacket::from_fields(&PacketFields::new(pid, vec![0u8; 184]))?;
//!     stream.extend_from_slice(packet.data());
//! }
//!
//! let mut reader = TSReader::new(Cursor::new(stream));
//! let indices = reader
//!     .pid_filter([0x100])
//!     .map(|packet| packet.map(|p| p.index()))
//!     .collect::<Result<Vec<_>, _>>()?;
//! assert_eq!(indices, vec![Some(0), Some(2)]);
//! # Ok(())
//! # }
//! ```

/// Packet builder, the inverse of dissection
pub mod builder;

/// File-backed reader and open modes
pub mod file;

/// Lazy packet iterators
pub mod filter;

/// Lazily dissected packet values
pub mod packet;

/// Header and adaptation field dissection
pub mod parser;

/// Stream reader
pub mod reader;

/// Core TS types and constants
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types and constants
pub use builder::build;
pub use file::{FileMode, TSFileReader};
pub use filter::{Packets, PidFilter};
pub use packet::TSPacket;
pub use parser::{decode, encode, TSPacketParser};
pub use reader::{PacketSource, TSReader};
pub use types::{
    AdaptationExtension,
    AdaptationField,
    AdaptationFieldControl,
    ClockReference,
    LegalTimeWindow,
    PacketFields,
    SeamlessSplice,
    PID_NULL,
    SYNC_BYTE,
    TS_PACKET_SIZE,
};
