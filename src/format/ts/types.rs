use bytes::Bytes;
use std::time::Duration;

/// Size of every TS packet
pub const TS_PACKET_SIZE: usize = 188;
/// Size of the fixed packet header
pub const TS_HEADER_SIZE: usize = 4;
/// Bytes left for adaptation field and payload after the fixed header
pub const TS_BODY_SIZE: usize = TS_PACKET_SIZE - TS_HEADER_SIZE;
/// First byte of every packet
pub const SYNC_BYTE: u8 = 0x47;
/// Filler byte for adaptation field stuffing and null payloads
pub const STUFFING_BYTE: u8 = 0xFF;

static STUFFED_BODY: [u8; TS_BODY_SIZE] = [STUFFING_BYTE; TS_BODY_SIZE];

/// PID of null (padding) packets
pub const PID_NULL: u16 = 0x1FFF;
/// Largest value a 13-bit PID can hold
pub const PID_MAX: u16 = 0x1FFF;

/// Program clock frequency in Hz
pub const PCR_HZ: u64 = 27_000_000;
/// Ticks of the 9-bit PCR extension per tick of the 90 kHz base
pub const PCR_EXTENSION_MODULUS: u16 = 300;

/// The two `adaptation_field_control` bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdaptationFieldControl {
    /// `00`: reserved for future use, forbidden in a conforming stream
    Reserved = 0b00,
    /// `01`: no adaptation field, payload only
    PayloadOnly = 0b01,
    /// `10`: adaptation field only, no payload
    AdaptationOnly = 0b10,
    /// `11`: adaptation field followed by payload
    AdaptationAndPayload = 0b11,
}

impl AdaptationFieldControl {
    /// Maps the low two bits of `bits` to a control value.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0b00 => AdaptationFieldControl::Reserved,
            0b01 => AdaptationFieldControl::PayloadOnly,
            0b10 => AdaptationFieldControl::AdaptationOnly,
            _ => AdaptationFieldControl::AdaptationAndPayload,
        }
    }

    /// The two bits as they appear on the wire.
    pub fn bits(self) -> u8 {
        self as u8
    }

    /// True for `10` and `11`.
    pub fn has_adaptation_field(self) -> bool {
        matches!(
            self,
            AdaptationFieldControl::AdaptationOnly | AdaptationFieldControl::AdaptationAndPayload
        )
    }

    /// True for `01` and `11`.
    pub fn has_payload(self) -> bool {
        matches!(
            self,
            AdaptationFieldControl::PayloadOnly | AdaptationFieldControl::AdaptationAndPayload
        )
    }
}

/// A program clock reference (PCR or OPCR): 33-bit 90 kHz base plus
/// 9-bit 27 MHz extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ClockReference {
    /// 33-bit base in 90 kHz units
    pub base: u64,
    /// 9-bit extension in 27 MHz units, below 300
    pub extension: u16,
}

impl ClockReference {
    /// A clock reference from its base and extension.
    pub fn new(base: u64, extension: u16) -> Self {
        Self { base, extension }
    }

    /// Splits a 27 MHz tick count into base and extension.
    pub fn from_ticks(ticks: u64) -> Self {
        Self {
            base: (ticks / PCR_EXTENSION_MODULUS as u64) & 0x1_FFFF_FFFF,
            extension: (ticks % PCR_EXTENSION_MODULUS as u64) as u16,
        }
    }

    /// The clock value in 27 MHz ticks.
    pub fn ticks(&self) -> u64 {
        self.base * PCR_EXTENSION_MODULUS as u64 + self.extension as u64
    }

    /// The clock value nearest below `time`, wrapping at 33 bits of base.
    pub fn from_duration(time: Duration) -> Self {
        let ticks = time.as_nanos() * PCR_HZ as u128 / 1_000_000_000;
        Self::from_ticks(ticks as u64)
    }

    /// The clock value as elapsed time.
    pub fn to_duration(&self) -> Duration {
        let ticks = self.ticks() as u128;
        Duration::from_nanos((ticks * 1_000_000_000 / PCR_HZ as u128) as u64)
    }
}

/// Legal time window of the adaptation field extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LegalTimeWindow {
    /// `ltw_valid_flag`
    pub valid: bool,
    /// 15-bit offset
    pub offset: u16,
}

/// Seamless splice parameters of the adaptation field extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeamlessSplice {
    /// 4-bit splice type
    pub splice_type: u8,
    /// 33-bit DTS of the next access unit
    pub dts_next_au: u64,
}

/// The adaptation field extension, present when the extension flag is set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdaptationExtension {
    /// `adaptation_field_extension_length`, the bytes following the length byte
    pub length: u8,
    /// Legal time window, when `ltw_flag` is set
    pub ltw: Option<LegalTimeWindow>,
    /// 22-bit piecewise rate
    pub piecewise_rate: Option<u32>,
    /// Splice parameters, when `seamless_splice_flag` is set
    pub seamless_splice: Option<SeamlessSplice>,
}

impl AdaptationExtension {
    /// Bytes needed after the length byte for the flag byte and the
    /// flag-gated sub-fields.
    pub fn content_len(&self) -> usize {
        1 + self.ltw.map_or(0, |_| 2)
            + self.piecewise_rate.map_or(0, |_| 3)
            + self.seamless_splice.map_or(0, |_| 5)
    }
}

/// The optional adaptation field following the 4-byte header.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdaptationField {
    /// `adaptation_field_length`: bytes following the length byte
    pub length: u8,
    /// `discontinuity_indicator`
    pub discontinuity: bool,
    /// `random_access_indicator`
    pub random_access: bool,
    /// `elementary_stream_priority_indicator`
    pub es_priority: bool,
    /// Program clock reference
    pub pcr: Option<ClockReference>,
    /// Original program clock reference
    pub opcr: Option<ClockReference>,
    /// Signed count of packets until a splicing point
    pub splice_countdown: Option<i8>,
    /// Transport private data, without its length byte
    pub private_data: Option<Bytes>,
    /// The adaptation field extension
    pub extension: Option<AdaptationExtension>,
    /// Number of stuffing bytes closing the field
    pub stuffing: usize,
}

impl AdaptationField {
    /// True when nothing but the length byte is needed to encode this field.
    pub fn is_empty(&self) -> bool {
        !self.discontinuity
            && !self.random_access
            && !self.es_priority
            && self.pcr.is_none()
            && self.opcr.is_none()
            && self.splice_countdown.is_none()
            && self.private_data.is_none()
            && self.extension.is_none()
    }

    /// Bytes needed after the length byte for the flag byte and the
    /// flag-gated sub-fields, excluding stuffing. Zero for an empty field.
    pub fn content_len(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        1 + self.pcr.map_or(0, |_| 6)
            + self.opcr.map_or(0, |_| 6)
            + self.splice_countdown.map_or(0, |_| 1)
            + self.private_data.as_ref().map_or(0, |d| 1 + d.len())
            + self
                .extension
                .as_ref()
                .map_or(0, |e| 1 + e.content_len())
    }

    /// Total bytes on the wire, length byte included.
    pub fn wire_len(&self) -> usize {
        1 + self.length as usize
    }
}

/// Every field of a TS packet, as produced by dissection and consumed by
/// the builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketFields {
    /// `transport_error_indicator`
    pub transport_error: bool,
    /// `payload_unit_start_indicator`
    pub payload_unit_start: bool,
    /// `transport_priority`
    pub transport_priority: bool,
    /// 13-bit packet identifier
    pub pid: u16,
    /// 2-bit transport_scrambling_control
    pub scrambling_control: u8,
    /// What follows the header
    pub adaptation_field_control: AdaptationFieldControl,
    /// 4-bit continuity_counter
    pub continuity_counter: u8,
    /// Present exactly when the control announces one
    pub adaptation_field: Option<AdaptationField>,
    /// Bytes after the header and adaptation field
    pub payload: Bytes,
}

impl Default for PacketFields {
    fn default() -> Self {
        Self {
            transport_error: false,
            payload_unit_start: false,
            transport_priority: false,
            pid: PID_NULL,
            scrambling_control: 0,
            adaptation_field_control: AdaptationFieldControl::PayloadOnly,
            continuity_counter: 0,
            adaptation_field: None,
            payload: Bytes::from_static(&STUFFED_BODY),
        }
    }
}

impl PacketFields {
    /// A payload-carrying packet on `pid`.
    ///
    /// Payloads shorter than 184 bytes get an adaptation field holding the
    /// stuffing, as a muxer would write them.
    pub fn new(pid: u16, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        let mut fields = Self {
            pid,
            payload,
            ..Self::default()
        };
        if fields.payload.len() < TS_BODY_SIZE {
            fields.adaptation_field_control = AdaptationFieldControl::AdaptationAndPayload;
            fields.adaptation_field = Some(AdaptationField::default());
        }
        fields
    }

    /// Sets `payload_unit_start_indicator`.
    pub fn with_payload_unit_start(mut self, start: bool) -> Self {
        self.payload_unit_start = start;
        self
    }

    /// Sets the 4-bit continuity counter.
    pub fn with_continuity_counter(mut self, counter: u8) -> Self {
        self.continuity_counter = counter;
        self
    }

    /// Space left for the adaptation field once the payload is placed.
    pub(crate) fn adaptation_space(&self) -> Option<usize> {
        TS_BODY_SIZE.checked_sub(self.payload.len())
    }
}
