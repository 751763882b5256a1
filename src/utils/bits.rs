use bytes::{BufMut, BytesMut};
use thiserror::Error;

/// Errors raised by [`BitReader`] and [`BitWriter`]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BitError {
    /// Attempted to read past the end of the data
    #[error("reached end of data")]
    EndOfData,

    /// More than 64 bits requested in a single read or write
    #[error("too many bits requested: {0}")]
    TooManyBits(u32),

    /// Value does not fit in the requested number of bits
    #[error("value {value:#x} does not fit in {bits} bits")]
    Overflow {
        /// Value that was to be written
        value: u64,
        /// Width it had to fit in
        bits: u32,
    },
}

/// Specialized Result type for bit operations
pub type Result<T> = std::result::Result<T, BitError>;

/// A bit-level reader over a byte slice.
///
/// Bits are consumed most significant first, which is the order every
/// H.222.0 field is laid out in.
///
/// Example:
/// ```
/// use tsreader::utils::BitReader;
///
/// let data = [0b10110011];
/// let mut reader = BitReader::new(&data);
///
/// assert_eq!(reader.read_bit().unwrap(), true);   // 1
/// assert_eq!(reader.read_bits(3).unwrap(), 0b011); // 011
/// ```
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_offset: usize,
    bit_offset: u8,
}

impl<'a> BitReader<'a> {
    /// Creates a new BitReader from a byte slice
    pub fn new(data: &'a [u8]) -> Self {
        BitReader {
            data,
            byte_offset: 0,
            bit_offset: 0,
        }
    }

    /// Reads a single bit from the stream.
    /// Returns true for 1, false for 0.
    pub fn read_bit(&mut self) -> Result<bool> {
        if self.byte_offset >= self.data.len() {
            return Err(BitError::EndOfData);
        }

        let bit = (self.data[self.byte_offset] >> (7 - self.bit_offset)) & 1;
        self.bit_offset += 1;

        if self.bit_offset == 8 {
            self.bit_offset = 0;
            self.byte_offset += 1;
        }

        Ok(bit == 1)
    }

    /// Reads n bits and returns them as a big-endian number.
    ///
    /// Fails without consuming anything if n > 64 or fewer than n bits remain.
    pub fn read_bits(&mut self, n: u32) -> Result<u64> {
        if n > 64 {
            return Err(BitError::TooManyBits(n));
        }
        if (n as usize) > self.available_bits() {
            return Err(BitError::EndOfData);
        }

        let mut value = 0u64;
        for _ in 0..n {
            value = (value << 1) | self.read_bit()? as u64;
        }

        Ok(value)
    }

    /// Reads one byte-aligned byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bits(8)? as u8)
    }

    /// Returns the next `n` whole bytes. The reader must be byte aligned.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        debug_assert_eq!(self.bit_offset, 0, "read_bytes on unaligned reader");
        if self.byte_offset + n > self.data.len() {
            return Err(BitError::EndOfData);
        }
        let bytes = &self.data[self.byte_offset..self.byte_offset + n];
        self.byte_offset += n;
        Ok(bytes)
    }

    /// Skips n bits in the stream.
    pub fn skip_bits(&mut self, n: u32) -> Result<()> {
        if (n as usize) > self.available_bits() {
            return Err(BitError::EndOfData);
        }
        let bits = self.bit_offset as usize + n as usize;
        self.byte_offset += bits / 8;
        self.bit_offset = (bits % 8) as u8;
        Ok(())
    }

    /// Number of whole bytes consumed so far.
    pub fn byte_position(&self) -> usize {
        self.byte_offset
    }

    /// Returns number of bits available to read.
    pub fn available_bits(&self) -> usize {
        (self.data.len() - self.byte_offset) * 8 - self.bit_offset as usize
    }

    /// Returns number of whole bytes available to read.
    pub fn available_bytes(&self) -> usize {
        self.available_bits() / 8
    }
}

/// Bit-level writer, the inverse of [`BitReader`].
///
/// ```
/// use tsreader::utils::BitWriter;
///
/// let mut writer = BitWriter::new();
/// writer.write_bits(0b101, 3).unwrap();
/// writer.write_bits(0b10011, 5).unwrap();
/// assert_eq!(&writer.into_bytes()[..], &[0b10110011]);
/// ```
#[derive(Debug, Default)]
pub struct BitWriter {
    buf: BytesMut,
    current: u8,
    bits_in_current: u8,
}

impl BitWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty writer with room for `bytes` bytes.
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(bytes),
            ..Self::default()
        }
    }

    /// Appends a single bit.
    pub fn write_bit(&mut self, bit: bool) {
        self.current = (self.current << 1) | bit as u8;
        self.bits_in_current += 1;
        if self.bits_in_current == 8 {
            self.buf.put_u8(self.current);
            self.current = 0;
            self.bits_in_current = 0;
        }
    }

    /// Writes the low `n` bits of `value`, most significant first.
    pub fn write_bits(&mut self, value: u64, n: u32) -> Result<()> {
        if n > 64 {
            return Err(BitError::TooManyBits(n));
        }
        if n < 64 && value >> n != 0 {
            return Err(BitError::Overflow { value, bits: n });
        }
        for i in (0..n).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
        Ok(())
    }

    /// Appends whole bytes. The writer must be byte aligned.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        debug_assert_eq!(self.bits_in_current, 0, "write_bytes on unaligned writer");
        self.buf.put_slice(bytes);
    }

    /// Number of complete bytes written.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty() && self.bits_in_current == 0
    }

    /// Finishes writing, zero-padding any partial final byte.
    pub fn into_bytes(mut self) -> BytesMut {
        if self.bits_in_current > 0 {
            let pad = 8 - self.bits_in_current;
            self.buf.put_u8(self.current << pad);
        }
        self.buf
    }
}
