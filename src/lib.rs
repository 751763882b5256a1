#![doc(html_root_url = "https://docs.rs/tsreader/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! # tsreader - MPEG Transport Stream packets
//!
//! `tsreader` reads, dissects and builds the 188-byte packets of an MPEG
//! Transport Stream (H.222.0 / ISO 13818-1). It stops at the packet: PES
//! reassembly, tables and codecs belong to the layers above.
//!
//! ## Features
//!
//! - Bit-exact decoding of the packet header and adaptation field,
//!   including PCR/OPCR and the adaptation field extension
//! - Forgiving or validating dissection, chosen per packet, computed lazily
//!   and cached until the mode changes
//! - A packet builder that is the exact inverse of validating decoding
//! - Streaming readers over any `std::io::Read` or over a file, with packet
//!   numbering and PID filtering
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tsreader::format::ts::TSFileReader;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut reader = TSFileReader::open("capture.ts", "r")?;
//!     reader.set_validating(true);
//!
//!     for packet in reader.packets() {
//!         let packet = packet?;
//!         println!("{} cc={}", packet, packet.continuity_counter()?);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - `format`: the transport stream packet codec and readers
//! - `error`: error types and the `Result` alias
//! - `config`: per-reader configuration
//! - `utils`: bit-level reading and writing

/// Error types and utilities
pub mod error;

/// Media format implementations
pub mod format;

/// Common utilities and helper functions
pub mod utils;

/// Configuration module
pub mod config;

pub use config::ReaderConfig;
pub use error::{FormatError, Result, TsError};
