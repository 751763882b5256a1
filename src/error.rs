use thiserror::Error;

/// Errors raised while recognising or dissecting a single TS packet.
///
/// Length and sync byte failures are raised in every mode. `InvalidField`
/// is only produced by validating dissection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The buffer is not exactly 188 bytes long.
    #[error("TS packet is {actual} bytes long, not 188")]
    WrongLength {
        /// Length of the rejected buffer
        actual: usize,
    },

    /// The first byte is not the 0x47 sync byte.
    #[error("first byte of TS packet is {actual:#04x}, not 0x47")]
    WrongSyncByte {
        /// The byte found instead
        actual: u8,
    },

    /// A field carries a reserved, forbidden or inconsistent value.
    #[error("{field} ({bits} bits) has value {value:#x}: {reason}")]
    InvalidField {
        /// Field name as written in H.222.0
        field: &'static str,
        /// Declared width of the field in bits
        bits: u8,
        /// The offending value
        value: u64,
        /// What is wrong with it
        reason: &'static str,
    },
}

impl FormatError {
    pub(crate) fn field(field: &'static str, bits: u8, value: u64, reason: &'static str) -> Self {
        FormatError::InvalidField {
            field,
            bits,
            value,
            reason,
        }
    }
}

/// Crate-level error type.
#[derive(Error, Debug)]
pub enum TsError {
    /// The bytes read are not an acceptable TS packet
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    /// The API was used in a way the reader cannot honour
    #[error("usage error: {0}")]
    Usage(String),

    /// The reader was closed before the operation
    #[error("{0} is closed")]
    Closed(String),

    /// The source ended part way through a packet
    #[error("error reading from {stream}: read {read} byte{} instead of 188", plural(.read))]
    ShortRead {
        /// Description of the reader
        stream: String,
        /// Number of bytes actually read
        read: usize,
    },

    /// Underlying I/O failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn plural(count: &usize) -> &'static str {
    if *count == 1 {
        ""
    } else {
        "s"
    }
}

/// Result type alias for reader operations
pub type Result<T> = std::result::Result<T, TsError>;
