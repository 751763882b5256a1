use super::parser::{self, TSPacketParser};
use super::types::*;
use crate::error::FormatError;
use bytes::Bytes;
use std::cell::OnceCell;
use std::fmt;

/// Result of dissecting a packet, tagged with the mode it was computed in.
#[derive(Debug, Clone)]
struct Dissection {
    validating: bool,
    fields: Result<PacketFields, FormatError>,
}

/// A single 188-byte Transport Stream packet.
///
/// Construction only checks the length and sync byte and extracts the PID.
/// Every other field is dissected on first access and cached. The cache is
/// tagged with the validating mode it was computed under, and changing the
/// mode throws it away, so the next access dissects again under the new
/// mode.
///
/// ```
/// use tsreader::format::ts::{AdaptationFieldControl, TSPacket};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut data = vec![0x47, 0x1f, 0xff, 0x10];
/// data.extend_from_slice(&[0xff; 184]);
///
/// let packet = TSPacket::new(data)?;
/// assert_eq!(packet.pid(), 0x1fff);
/// assert!(packet.is_padding());
/// assert_eq!(
///     packet.adaptation_field_control()?,
///     AdaptationFieldControl::PayloadOnly
/// );
/// assert_eq!(packet.continuity_counter()?, 0);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TSPacket {
    data: Bytes,
    pid: u16,
    index: Option<u64>,
    offset: Option<u64>,
    validating: bool,
    dissection: OnceCell<Dissection>,
}

impl TSPacket {
    /// Wraps `data` as a non-validating packet.
    pub fn new(data: impl Into<Bytes>) -> Result<Self, FormatError> {
        Self::with_mode(data, false)
    }

    /// Wraps `data`, dissecting in validating mode if `validating` is set.
    pub fn with_mode(data: impl Into<Bytes>, validating: bool) -> Result<Self, FormatError> {
        let data = data.into();
        parser::check_packet(&data)?;
        let pid = parser::parse_pid(&data);
        Ok(Self {
            data,
            pid,
            index: None,
            offset: None,
            validating,
            dissection: OnceCell::new(),
        })
    }

    /// Builds a packet from explicit field values.
    pub fn from_fields(fields: &PacketFields) -> Result<Self, FormatError> {
        Self::new(super::builder::build(fields)?)
    }

    pub(crate) fn with_position(mut self, index: u64, offset: u64) -> Self {
        self.index = Some(index);
        self.offset = Some(offset);
        self
    }

    /// The raw 188 bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Always 0x47 for a constructed packet.
    pub fn sync_byte(&self) -> u8 {
        self.data[0]
    }

    /// The 13-bit PID, available without dissecting the packet.
    pub fn pid(&self) -> u16 {
        self.pid
    }

    /// True for null packets (PID 0x1fff).
    pub fn is_padding(&self) -> bool {
        self.pid == PID_NULL
    }

    /// Sequence number assigned by the reader, starting at 0.
    pub fn index(&self) -> Option<u64> {
        self.index
    }

    /// Byte offset in the stream, assigned by the reader.
    ///
    /// Only meaningful if the source was positioned at a packet boundary
    /// matching the reader's initial offset.
    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    /// True if fields dissect in validating mode.
    pub fn is_validating(&self) -> bool {
        self.validating
    }

    /// Switches dissection mode. Any cached dissection from the other mode
    /// is discarded.
    pub fn set_validating(&mut self, validating: bool) {
        if self.validating != validating {
            self.validating = validating;
            self.dissection.take();
        }
    }

    /// All dissected fields under the current mode.
    pub fn fields(&self) -> Result<&PacketFields, FormatError> {
        let dissection = self.dissection.get_or_init(|| self.dissect());
        debug_assert_eq!(
            dissection.validating, self.validating,
            "dissection cached under the other mode"
        );
        dissection.fields.as_ref().map_err(Clone::clone)
    }

    fn dissect(&self) -> Dissection {
        let fields = TSPacketParser::new(self.validating).parse(&self.data);
        if let Err(ref err) = fields {
            log::debug!("TS packet PID {:#06x} failed validation: {}", self.pid, err);
        }
        Dissection {
            validating: self.validating,
            fields,
        }
    }

    /// Every validation violation in the packet, in wire order.
    ///
    /// Unlike validating dissection this does not stop at the first
    /// problem. It ignores the packet's mode and does not touch the cache.
    pub fn violations(&self) -> Vec<FormatError> {
        TSPacketParser::violations(&self.data)
    }

    /// `transport_error_indicator` bit.
    pub fn transport_error_indicator(&self) -> Result<bool, FormatError> {
        Ok(self.fields()?.transport_error)
    }

    /// `payload_unit_start_indicator` bit.
    pub fn payload_unit_start_indicator(&self) -> Result<bool, FormatError> {
        Ok(self.fields()?.payload_unit_start)
    }

    /// `transport_priority` bit.
    pub fn transport_priority(&self) -> Result<bool, FormatError> {
        Ok(self.fields()?.transport_priority)
    }

    /// The 2-bit `transport_scrambling_control`, uninterpreted.
    pub fn transport_scrambling_control(&self) -> Result<u8, FormatError> {
        Ok(self.fields()?.scrambling_control)
    }

    /// Whether an adaptation field, a payload or both follow the header.
    pub fn adaptation_field_control(&self) -> Result<AdaptationFieldControl, FormatError> {
        Ok(self.fields()?.adaptation_field_control)
    }

    /// The 4-bit `continuity_counter`.
    pub fn continuity_counter(&self) -> Result<u8, FormatError> {
        Ok(self.fields()?.continuity_counter)
    }

    /// The adaptation field, when the control bits announce one.
    pub fn adaptation_field(&self) -> Result<Option<&AdaptationField>, FormatError> {
        Ok(self.fields()?.adaptation_field.as_ref())
    }

    /// The payload bytes, empty when the packet carries none.
    pub fn payload(&self) -> Result<&Bytes, FormatError> {
        Ok(&self.fields()?.payload)
    }

    /// The PCR carried in the adaptation field, if any.
    pub fn pcr(&self) -> Result<Option<ClockReference>, FormatError> {
        Ok(self.adaptation_field()?.and_then(|af| af.pcr))
    }
}

impl PartialEq for TSPacket {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for TSPacket {}

impl fmt::Display for TSPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TS packet PID {:04x}", self.pid)?;
        let rest = &self.data[3..];
        for byte in rest.iter().take(11) {
            write!(f, " {:02x}", byte)?;
        }
        if rest.len() > 11 {
            write!(f, " ...")?;
        }
        Ok(())
    }
}

impl fmt::Debug for TSPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TSPacket(\"")?;
        for byte in self.data.iter() {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "\")")
    }
}
