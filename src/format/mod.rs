//! Container format implementations.

pub mod ts;

pub use self::ts::{TSFileReader, TSPacket, TSReader};
