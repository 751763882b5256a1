use super::types::*;
use crate::error::FormatError;
use crate::utils::bits::BitReader;
use bytes::Bytes;

/// Offset of the first adaptation field byte after its length byte.
const ADAPTATION_CONTENT_OFFSET: usize = TS_HEADER_SIZE + 1;

/// Rejects anything that is not recognisably a TS packet.
///
/// These two checks run in every mode.
pub fn check_packet(data: &[u8]) -> Result<(), FormatError> {
    if data.len() != TS_PACKET_SIZE {
        return Err(FormatError::WrongLength { actual: data.len() });
    }
    if data[0] != SYNC_BYTE {
        return Err(FormatError::WrongSyncByte { actual: data[0] });
    }
    Ok(())
}

/// Extracts the 13-bit PID. `data` must hold at least 3 bytes.
pub fn parse_pid(data: &[u8]) -> u16 {
    (((data[1] & 0x1F) as u16) << 8) | data[2] as u16
}

/// Decodes a 188-byte buffer into its fields.
pub fn decode(data: &[u8], validating: bool) -> Result<PacketFields, FormatError> {
    check_packet(data)?;
    TSPacketParser::new(validating).parse(&Bytes::copy_from_slice(data))
}

/// Encodes fields into a 188-byte buffer. The inverse of [`decode`].
pub fn encode(fields: &PacketFields) -> Result<Bytes, FormatError> {
    super::builder::build(fields)
}

/// How dissection treats reserved or inconsistent values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Policy {
    /// No checks at all
    Forgiving,
    /// Stop at the first violation
    FirstViolation,
    /// Record every violation and carry on
    Aggregate,
}

struct Checker {
    policy: Policy,
    violations: Vec<FormatError>,
}

impl Checker {
    fn new(policy: Policy) -> Self {
        Self {
            policy,
            violations: Vec::new(),
        }
    }

    fn enabled(&self) -> bool {
        self.policy != Policy::Forgiving
    }

    fn report(&mut self, err: FormatError) -> Result<(), FormatError> {
        match self.policy {
            Policy::Forgiving => Ok(()),
            Policy::FirstViolation => Err(err),
            Policy::Aggregate => {
                self.violations.push(err);
                Ok(())
            }
        }
    }

    fn check(
        &mut self,
        ok: bool,
        field: &'static str,
        bits: u8,
        value: u64,
        reason: &'static str,
    ) -> Result<(), FormatError> {
        if ok || !self.enabled() {
            return Ok(());
        }
        self.report(FormatError::field(field, bits, value, reason))
    }
}

/// Dissects TS packets whose length and sync byte are already known good.
///
/// The header is bit-sliced directly out of bytes 1 to 3. The adaptation
/// field sub-fields are read with a [`BitReader`] bounded by the declared
/// adaptation field length, so neither path can read past the packet
/// whatever the lengths claim.
#[derive(Debug, Clone, Copy)]
pub struct TSPacketParser {
    validating: bool,
}

impl TSPacketParser {
    /// A parser dissecting in validating mode if `validating` is set.
    pub fn new(validating: bool) -> Self {
        Self { validating }
    }

    /// True if the parser rejects reserved and inconsistent values.
    pub fn is_validating(&self) -> bool {
        self.validating
    }

    /// Dissects `data`. Under validation the first violation in wire order
    /// is returned and no fields are exposed.
    pub fn parse(&self, data: &Bytes) -> Result<PacketFields, FormatError> {
        let policy = if self.validating {
            Policy::FirstViolation
        } else {
            Policy::Forgiving
        };
        Dissector::new(data, policy).run()
    }

    /// Runs the validating dissection to completion and returns every
    /// violation found, in wire order.
    pub fn violations(data: &Bytes) -> Vec<FormatError> {
        let mut dissector = Dissector::new(data, Policy::Aggregate);
        // Aggregate reporting never returns early
        let _ = dissector.run();
        dissector.checker.violations
    }
}

struct Dissector<'a> {
    data: &'a Bytes,
    checker: Checker,
}

impl<'a> Dissector<'a> {
    fn new(data: &'a Bytes, policy: Policy) -> Self {
        debug_assert_eq!(data.len(), TS_PACKET_SIZE);
        Self {
            data,
            checker: Checker::new(policy),
        }
    }

    fn run(&mut self) -> Result<PacketFields, FormatError> {
        let data = self.data;
        let b1 = data[1];
        let b3 = data[3];

        let adaptation_field_control = AdaptationFieldControl::from_bits(b3 >> 4);
        self.checker.check(
            adaptation_field_control != AdaptationFieldControl::Reserved,
            "adaptation_field_control",
            2,
            adaptation_field_control.bits() as u64,
            "reserved value",
        )?;

        let mut payload_start = TS_HEADER_SIZE;
        let adaptation_field = if adaptation_field_control.has_adaptation_field() {
            let field = self.parse_adaptation_field(adaptation_field_control)?;
            payload_start += field.wire_len().min(TS_BODY_SIZE);
            Some(field)
        } else {
            None
        };

        let payload = if adaptation_field_control.has_payload() {
            data.slice(payload_start..)
        } else {
            Bytes::new()
        };

        Ok(PacketFields {
            transport_error: (b1 & 0x80) != 0,
            payload_unit_start: (b1 & 0x40) != 0,
            transport_priority: (b1 & 0x20) != 0,
            pid: parse_pid(data),
            scrambling_control: (b3 >> 6) & 0x03,
            adaptation_field_control,
            continuity_counter: b3 & 0x0F,
            adaptation_field,
            payload,
        })
    }

    fn parse_adaptation_field(
        &mut self,
        control: AdaptationFieldControl,
    ) -> Result<AdaptationField, FormatError> {
        let data = self.data;
        let length = data[TS_HEADER_SIZE];
        match control {
            AdaptationFieldControl::AdaptationOnly => self.checker.check(
                length as usize == TS_BODY_SIZE - 1,
                "adaptation_field_length",
                8,
                length as u64,
                "must be 183 when the packet carries no payload",
            )?,
            _ => self.checker.check(
                (length as usize) < TS_BODY_SIZE - 1,
                "adaptation_field_length",
                8,
                length as u64,
                "leaves no room for the payload",
            )?,
        }

        let mut field = AdaptationField {
            length,
            ..AdaptationField::default()
        };
        if length == 0 {
            return Ok(field);
        }

        let available = (length as usize).min(TS_BODY_SIZE - 1);
        let content = &data[ADAPTATION_CONTENT_OFFSET..ADAPTATION_CONTENT_OFFSET + available];
        let mut reader = BitReader::new(content);

        let flags = content[0];
        reader.skip_bits(8).ok();
        field.discontinuity = (flags & 0x80) != 0;
        field.random_access = (flags & 0x40) != 0;
        field.es_priority = (flags & 0x20) != 0;

        let complete = self.parse_optional_fields(&mut reader, flags, &mut field)?;

        field.stuffing = reader.available_bytes();
        if complete && self.checker.enabled() {
            let stuffing = &content[content.len() - field.stuffing..];
            if let Some(&byte) = stuffing.iter().find(|&&b| b != STUFFING_BYTE) {
                self.checker.report(FormatError::field(
                    "stuffing_byte",
                    8,
                    byte as u64,
                    "must be 0xff",
                ))?;
            }
        }

        Ok(field)
    }

    /// Parses the flag-gated sub-fields in wire order. Returns false when a
    /// sub-field did not fit, in which case it and everything after it is
    /// left absent.
    fn parse_optional_fields(
        &mut self,
        reader: &mut BitReader<'_>,
        flags: u8,
        field: &mut AdaptationField,
    ) -> Result<bool, FormatError> {
        if flags & 0x10 != 0 {
            if !self.fits(reader, 6, field.length, "too short for the PCR")? {
                return Ok(false);
            }
            field.pcr = Some(self.read_clock(reader, "program_clock_reference_extension")?);
        }

        if flags & 0x08 != 0 {
            if !self.fits(reader, 6, field.length, "too short for the OPCR")? {
                return Ok(false);
            }
            field.opcr =
                Some(self.read_clock(reader, "original_program_clock_reference_extension")?);
        }

        if flags & 0x04 != 0 {
            if !self.fits(reader, 1, field.length, "too short for the splice countdown")? {
                return Ok(false);
            }
            field.splice_countdown = reader.read_u8().ok().map(|b| b as i8);
        }

        if flags & 0x02 != 0 {
            if !self.fits(reader, 1, field.length, "too short for transport private data")? {
                return Ok(false);
            }
            let private_length = reader.read_u8().unwrap_or(0) as usize;
            let reason = "too short for transport private data";
            if !self.fits(reader, private_length, field.length, reason)? {
                return Ok(false);
            }
            field.private_data = reader
                .read_bytes(private_length)
                .ok()
                .map(|bytes| self.data.slice_ref(bytes));
        }

        if flags & 0x01 != 0 {
            if !self.fits(reader, 1, field.length, "too short for the extension")? {
                return Ok(false);
            }
            let extension_length = reader.read_u8().unwrap_or(0);
            let available = reader.available_bytes();
            self.checker.check(
                extension_length as usize <= available,
                "adaptation_field_extension_length",
                8,
                extension_length as u64,
                "overruns the adaptation field",
            )?;
            let body = reader
                .read_bytes((extension_length as usize).min(available))
                .unwrap_or(&[]);
            let extension = self.parse_extension(extension_length, body)?;
            field.extension = Some(extension);
            if (extension_length as usize) > available {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn parse_extension(
        &mut self,
        length: u8,
        body: &[u8],
    ) -> Result<AdaptationExtension, FormatError> {
        let mut extension = AdaptationExtension {
            length,
            ..AdaptationExtension::default()
        };
        let mut reader = BitReader::new(body);

        let flags = match reader.read_u8() {
            Ok(flags) => flags,
            Err(_) => {
                self.checker.check(
                    false,
                    "adaptation_field_extension_length",
                    8,
                    length as u64,
                    "too short for the extension flags",
                )?;
                return Ok(extension);
            }
        };

        if flags & 0x80 != 0 {
            if !self.extension_fits(&reader, 2, length, "too short for the legal time window")? {
                return Ok(extension);
            }
            let valid = reader.read_bit().unwrap_or(false);
            let offset = reader.read_bits(15).unwrap_or(0) as u16;
            extension.ltw = Some(LegalTimeWindow { valid, offset });
        }

        if flags & 0x40 != 0 {
            if !self.extension_fits(&reader, 3, length, "too short for the piecewise rate")? {
                return Ok(extension);
            }
            reader.skip_bits(2).ok();
            extension.piecewise_rate = reader.read_bits(22).ok().map(|rate| rate as u32);
        }

        if flags & 0x20 != 0 {
            if !self.extension_fits(&reader, 5, length, "too short for the seamless splice")? {
                return Ok(extension);
            }
            let splice_type = reader.read_bits(4).unwrap_or(0) as u8;
            let dts_next_au = self.read_timestamp(&mut reader)?;
            extension.seamless_splice = Some(SeamlessSplice {
                splice_type,
                dts_next_au,
            });
        }

        Ok(extension)
    }

    fn fits(
        &mut self,
        reader: &BitReader<'_>,
        bytes: usize,
        length: u8,
        reason: &'static str,
    ) -> Result<bool, FormatError> {
        if reader.available_bytes() >= bytes {
            return Ok(true);
        }
        self.checker
            .report(FormatError::field("adaptation_field_length", 8, length as u64, reason))?;
        Ok(false)
    }

    fn extension_fits(
        &mut self,
        reader: &BitReader<'_>,
        bytes: usize,
        length: u8,
        reason: &'static str,
    ) -> Result<bool, FormatError> {
        if reader.available_bytes() >= bytes {
            return Ok(true);
        }
        self.checker.report(FormatError::field(
            "adaptation_field_extension_length",
            8,
            length as u64,
            reason,
        ))?;
        Ok(false)
    }

    /// 33-bit base, 6 reserved bits, 9-bit extension. Caller checks that
    /// 6 bytes remain.
    fn read_clock(
        &mut self,
        reader: &mut BitReader<'_>,
        extension_name: &'static str,
    ) -> Result<ClockReference, FormatError> {
        let base = reader.read_bits(33).unwrap_or(0);
        reader.skip_bits(6).ok();
        let extension = reader.read_bits(9).unwrap_or(0) as u16;
        self.checker.check(
            extension < PCR_EXTENSION_MODULUS,
            extension_name,
            9,
            extension as u64,
            "must be less than 300",
        )?;
        Ok(ClockReference { base, extension })
    }

    /// A 33-bit timestamp split 3/15/15 with a marker bit after each part,
    /// preceded by the 4 bits the caller has already read.
    fn read_timestamp(&mut self, reader: &mut BitReader<'_>) -> Result<u64, FormatError> {
        let mut value = 0u64;
        for width in [3, 15, 15] {
            value = (value << width) | reader.read_bits(width).unwrap_or(0);
            let marker = reader.read_bit().unwrap_or(true);
            self.checker
                .check(marker, "marker_bit", 1, marker as u64, "must be 1")?;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn packet(header: [u8; 4], body: &[u8]) -> Bytes {
        let mut data = vec![STUFFING_BYTE; TS_PACKET_SIZE];
        data[..4].copy_from_slice(&header);
        data[4..4 + body.len()].copy_from_slice(body);
        Bytes::from(data)
    }

    #[test]
    fn test_parse_ts_header() {
        let data = packet([0x47, 0x5f, 0xff, 0x1a], &[]);
        let fields = TSPacketParser::new(true).parse(&data).unwrap();

        assert!(!fields.transport_error);
        assert!(fields.payload_unit_start);
        assert!(!fields.transport_priority);
        assert_eq!(fields.pid, 0x1fff);
        assert_eq!(fields.scrambling_control, 0);
        assert_eq!(fields.adaptation_field_control, AdaptationFieldControl::PayloadOnly);
        assert_eq!(fields.continuity_counter, 0x0a);
        assert_eq!(fields.adaptation_field, None);
        assert_eq!(fields.payload.len(), TS_BODY_SIZE);
    }

    #[test]
    fn test_null_packet_scenario() {
        let mut data = vec![0x47, 0x1f, 0xff, 0x10];
        data.extend_from_slice(&[0xff; 184]);
        for validating in [false, true] {
            let fields = decode(&data, validating).unwrap();
            assert_eq!(fields.pid, 0x1fff);
            assert_eq!(fields.adaptation_field_control, AdaptationFieldControl::PayloadOnly);
            assert_eq!(fields.continuity_counter, 0);
        }
    }

    #[test]
    fn test_length_and_sync_checked_in_both_modes() {
        for validating in [false, true] {
            assert_eq!(
                decode(&[0x47; 187], validating),
                Err(FormatError::WrongLength { actual: 187 })
            );
            let mut data = vec![0u8; TS_PACKET_SIZE];
            data[0] = 0x48;
            assert_eq!(
                decode(&data, validating),
                Err(FormatError::WrongSyncByte { actual: 0x48 })
            );
        }
    }

    #[test]
    fn test_reserved_adaptation_field_control() {
        let data = packet([0x47, 0x01, 0x00, 0x05], &[]);

        let fields = TSPacketParser::new(false).parse(&data).unwrap();
        assert_eq!(fields.adaptation_field_control, AdaptationFieldControl::Reserved);
        assert!(fields.payload.is_empty());
        assert_eq!(fields.continuity_counter, 5);

        match TSPacketParser::new(true).parse(&data) {
            Err(FormatError::InvalidField { field, bits, value, .. }) => {
                assert_eq!(field, "adaptation_field_control");
                assert_eq!(bits, 2);
                assert_eq!(value, 0);
            }
            other => panic!("expected invalid field, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_adaptation_field_with_pcr() {
        // length 7, PCR flag, base 0x1_0000_0001, ext 0x123
        let body = [
            0x07, 0x50, // length, random access + PCR
            0x80, 0x00, 0x00, 0x00, 0xFF, 0x23, // base top bit, base low bit, reserved, ext
        ];
        let data = packet([0x47, 0x01, 0x00, 0x30], &body);
        let fields = TSPacketParser::new(false).parse(&data).unwrap();
        let af = fields.adaptation_field.unwrap();

        assert_eq!(af.length, 7);
        assert!(af.random_access);
        assert!(!af.discontinuity);
        assert_eq!(af.pcr, Some(ClockReference::new(0x1_0000_0001, 0x123)));
        assert_eq!(af.stuffing, 0);
        assert_eq!(fields.payload.len(), TS_BODY_SIZE - 8);
    }

    #[test]
    fn test_pcr_extension_out_of_range() {
        // extension 0x1ff = 511
        let body = [0x07, 0x10, 0x00, 0x00, 0x00, 0x00, 0x7F, 0xFF];
        let data = packet([0x47, 0x01, 0x00, 0x30], &body);

        let af = TSPacketParser::new(false)
            .parse(&data)
            .unwrap()
            .adaptation_field
            .unwrap();
        assert_eq!(af.pcr.unwrap().extension, 511);

        let err = TSPacketParser::new(true).parse(&data).unwrap_err();
        assert_eq!(
            err,
            FormatError::field(
                "program_clock_reference_extension",
                9,
                511,
                "must be less than 300"
            )
        );
    }

    #[test]
    fn test_adaptation_only_length() {
        let data = packet([0x47, 0x01, 0x00, 0x20], &[0x00]);
        let fields = TSPacketParser::new(false).parse(&data).unwrap();
        assert_eq!(fields.adaptation_field.unwrap().length, 0);
        assert!(fields.payload.is_empty());

        match TSPacketParser::new(true).parse(&data) {
            Err(FormatError::InvalidField { field, value, .. }) => {
                assert_eq!(field, "adaptation_field_length");
                assert_eq!(value, 0);
            }
            other => panic!("expected invalid field, got {:?}", other),
        }
    }

    #[test]
    fn test_adaptation_overrun_is_clamped() {
        // length 200 with adaptation and payload
        let data = packet([0x47, 0x01, 0x00, 0x30], &[200, 0x00]);
        let fields = TSPacketParser::new(false).parse(&data).unwrap();
        let af = fields.adaptation_field.unwrap();
        assert_eq!(af.length, 200);
        assert_eq!(af.stuffing, 182);
        assert!(fields.payload.is_empty());

        assert!(TSPacketParser::new(true).parse(&data).is_err());
    }

    #[test]
    fn test_truncated_sub_field() {
        // length 3 but PCR flag set
        let body = [0x03, 0x10, 0xFF, 0xFF];
        let data = packet([0x47, 0x01, 0x00, 0x30], &body);

        let af = TSPacketParser::new(false)
            .parse(&data)
            .unwrap()
            .adaptation_field
            .unwrap();
        assert_eq!(af.pcr, None);
        assert_eq!(af.stuffing, 2);

        let err = TSPacketParser::new(true).parse(&data).unwrap_err();
        assert_eq!(
            err,
            FormatError::field("adaptation_field_length", 8, 3, "too short for the PCR")
        );
    }

    #[test]
    fn test_bad_stuffing_byte() {
        let body = [0x03, 0x00, 0xFF, 0x00];
        let data = packet([0x47, 0x01, 0x00, 0x30], &body);
        assert!(TSPacketParser::new(false).parse(&data).is_ok());
        assert_eq!(
            TSPacketParser::new(true).parse(&data).unwrap_err(),
            FormatError::field("stuffing_byte", 8, 0, "must be 0xff")
        );
    }

    #[test]
    fn test_private_data_and_extension() {
        // the seamless splice flag is set but the extension ends before it
        let body = [
            0x0B, 0x03, // length 11, private data + extension
            0x02, 0xAA, 0xBB, // private data
            0x06, 0xE0, // extension length 6, ltw + piecewise + seamless
            0x80, 0x10, // ltw valid, offset 0x10
            0xC0, 0x00, 0x2A, // reserved, rate 42
        ];
        let data = packet([0x47, 0x01, 0x00, 0x30], &body);

        let af = TSPacketParser::new(false)
            .parse(&data)
            .unwrap()
            .adaptation_field
            .unwrap();
        assert_eq!(af.private_data.as_deref(), Some(&[0xAA, 0xBB][..]));
        let extension = af.extension.unwrap();
        assert_eq!(extension.length, 6);
        assert_eq!(extension.ltw, Some(LegalTimeWindow { valid: true, offset: 0x10 }));
        assert_eq!(extension.piecewise_rate, Some(42));
        assert_eq!(extension.seamless_splice, None);

        assert_eq!(
            TSPacketParser::new(true).parse(&data).unwrap_err(),
            FormatError::field(
                "adaptation_field_extension_length",
                8,
                6,
                "too short for the seamless splice"
            )
        );
    }

    #[test]
    fn test_violations_are_aggregated_in_order() {
        // reserved control, PCR extension 511, bad stuffing
        let body = [0x09, 0x10, 0x00, 0x00, 0x00, 0x00, 0x7F, 0xFF, 0xFF, 0x00];
        let mut data = packet([0x47, 0x01, 0x00, 0x00], &[]).to_vec();
        data[4..4 + body.len()].copy_from_slice(&body);
        let data = Bytes::from(data);

        // no adaptation field is parsed for a reserved control
        let violations = TSPacketParser::violations(&data);
        assert_eq!(violations.len(), 1);

        let data = data_with_control(&data, 0x30);
        let violations = TSPacketParser::violations(&data);
        let fields: Vec<&str> = violations
            .iter()
            .map(|v| match v {
                FormatError::InvalidField { field, .. } => *field,
                _ => "",
            })
            .collect();
        assert_eq!(
            fields,
            vec!["program_clock_reference_extension", "stuffing_byte"]
        );
    }

    fn data_with_control(data: &Bytes, b3: u8) -> Bytes {
        let mut data = data.to_vec();
        data[3] = b3;
        Bytes::from(data)
    }
}
