use super::types::*;
use crate::error::FormatError;
use crate::utils::bits::{BitError, BitWriter};
use bytes::Bytes;

/// Assembles a 188-byte TS packet from explicit field values.
///
/// Derived values (`adaptation_field_length`, the extension length and the
/// stuffing count) are recomputed with [`PacketFields::fit`] before writing,
/// so the values carried by `fields` for those are ignored.
///
/// ```
/// use tsreader::format::ts::{build, decode, PacketFields};
///
/// let mut fields = PacketFields::new(0x100, vec![0xAB; 100]).with_continuity_counter(3);
/// fields.fit().unwrap();
/// let data = build(&fields).unwrap();
/// assert_eq!(data.len(), 188);
/// assert_eq!(decode(&data, true).unwrap(), fields);
/// ```
pub fn build(fields: &PacketFields) -> Result<Bytes, FormatError> {
    let mut fields = fields.clone();
    fields.fit()?;

    let mut writer = BitWriter::with_capacity(TS_PACKET_SIZE);
    write_header(&mut writer, &fields)?;

    if let Some(ref af) = fields.adaptation_field {
        write_adaptation_field(&mut writer, af)?;
    }

    writer.write_bytes(&fields.payload);
    while writer.len() < TS_PACKET_SIZE {
        writer.write_bytes(&[STUFFING_BYTE]);
    }

    let data = writer.into_bytes();
    debug_assert_eq!(data.len(), TS_PACKET_SIZE);
    log::trace!(
        "built TS packet PID {:#06x} cc {} ({:?})",
        fields.pid,
        fields.continuity_counter,
        fields.adaptation_field_control
    );
    Ok(data.freeze())
}

impl PacketFields {
    /// Recomputes every derived length so that header, adaptation field
    /// and payload add up to exactly 188 bytes.
    ///
    /// Fails when the combination cannot be encoded as a well-formed packet:
    /// an adaptation field missing or present against the control bits, a
    /// payload that does not fit, or a clock extension of 300 or more.
    /// A `Reserved` control is accepted only with no adaptation field and an
    /// empty payload.
    pub fn fit(&mut self) -> Result<(), FormatError> {
        let control = self.adaptation_field_control;
        let control_error = |reason| {
            FormatError::field("adaptation_field_control", 2, control.bits() as u64, reason)
        };

        match control {
            AdaptationFieldControl::Reserved => {
                if self.adaptation_field.is_some() || !self.payload.is_empty() {
                    return Err(control_error("reserved value carries nothing"));
                }
                return Ok(());
            }
            AdaptationFieldControl::PayloadOnly => {
                if self.adaptation_field.is_some() {
                    return Err(control_error("payload only packets carry no adaptation field"));
                }
                if self.payload.len() != TS_BODY_SIZE {
                    return Err(FormatError::WrongLength {
                        actual: TS_HEADER_SIZE + self.payload.len(),
                    });
                }
                return Ok(());
            }
            AdaptationFieldControl::AdaptationOnly => {
                if !self.payload.is_empty() {
                    return Err(control_error("adaptation only packets carry no payload"));
                }
            }
            AdaptationFieldControl::AdaptationAndPayload => {
                if self.payload.is_empty() {
                    return Err(control_error("payload is missing"));
                }
            }
        }

        let space = self.adaptation_space();
        let af = self
            .adaptation_field
            .as_mut()
            .ok_or_else(|| control_error("adaptation field is missing"))?;
        let space = match space {
            Some(space) if space > 0 => space,
            _ => {
                return Err(FormatError::WrongLength {
                    actual: TS_HEADER_SIZE + 1 + af.content_len() + self.payload.len(),
                })
            }
        };

        fit_adaptation_field(af, space).map_err(|needed| FormatError::WrongLength {
            actual: TS_HEADER_SIZE + needed + self.payload.len(),
        })
    }
}

/// Sizes `af` to occupy exactly `space` bytes, length byte included.
/// On failure returns the number of bytes the field needs.
fn fit_adaptation_field(af: &mut AdaptationField, space: usize) -> Result<(), usize> {
    if let Some(ref mut extension) = af.extension {
        extension.length = extension.content_len() as u8;
    }
    let content = af.content_len();

    if space == 1 {
        if content > 0 {
            return Err(1 + content);
        }
        af.length = 0;
        af.stuffing = 0;
        return Ok(());
    }

    // A non-zero length always carries the flag byte
    let needed = content.max(1);
    let length = space - 1;
    if needed > length {
        return Err(1 + needed);
    }
    af.length = length as u8;
    af.stuffing = length - needed;
    Ok(())
}

fn put(
    writer: &mut BitWriter,
    value: u64,
    bits: u32,
    field: &'static str,
) -> Result<(), FormatError> {
    writer.write_bits(value, bits).map_err(|err| match err {
        BitError::Overflow { value, bits } => {
            FormatError::field(field, bits as u8, value, "does not fit in its bit width")
        }
        _ => FormatError::field(field, bits as u8, value, "cannot be written"),
    })
}

fn put_flag(writer: &mut BitWriter, flag: bool) {
    writer.write_bit(flag);
}

fn write_header(writer: &mut BitWriter, fields: &PacketFields) -> Result<(), FormatError> {
    put(writer, SYNC_BYTE as u64, 8, "sync_byte")?;
    put_flag(writer, fields.transport_error);
    put_flag(writer, fields.payload_unit_start);
    put_flag(writer, fields.transport_priority);
    put(writer, fields.pid as u64, 13, "PID")?;
    put(
        writer,
        fields.scrambling_control as u64,
        2,
        "transport_scrambling_control",
    )?;
    put(
        writer,
        fields.adaptation_field_control.bits() as u64,
        2,
        "adaptation_field_control",
    )?;
    put(
        writer,
        fields.continuity_counter as u64,
        4,
        "continuity_counter",
    )
}

fn write_adaptation_field(writer: &mut BitWriter, af: &AdaptationField) -> Result<(), FormatError> {
    put(writer, af.length as u64, 8, "adaptation_field_length")?;
    if af.length == 0 {
        return Ok(());
    }

    put_flag(writer, af.discontinuity);
    put_flag(writer, af.random_access);
    put_flag(writer, af.es_priority);
    put_flag(writer, af.pcr.is_some());
    put_flag(writer, af.opcr.is_some());
    put_flag(writer, af.splice_countdown.is_some());
    put_flag(writer, af.private_data.is_some());
    put_flag(writer, af.extension.is_some());

    if let Some(ref pcr) = af.pcr {
        write_clock(
            writer,
            pcr,
            "program_clock_reference_base",
            "program_clock_reference_extension",
        )?;
    }
    if let Some(ref opcr) = af.opcr {
        write_clock(
            writer,
            opcr,
            "original_program_clock_reference_base",
            "original_program_clock_reference_extension",
        )?;
    }
    if let Some(countdown) = af.splice_countdown {
        writer.write_bytes(&[countdown as u8]);
    }
    if let Some(ref data) = af.private_data {
        put(writer, data.len() as u64, 8, "transport_private_data_length")?;
        writer.write_bytes(data);
    }
    if let Some(ref extension) = af.extension {
        write_extension(writer, extension)?;
    }

    for _ in 0..af.stuffing {
        writer.write_bytes(&[STUFFING_BYTE]);
    }
    Ok(())
}

fn write_clock(
    writer: &mut BitWriter,
    clock: &ClockReference,
    base_name: &'static str,
    extension_name: &'static str,
) -> Result<(), FormatError> {
    if clock.extension >= PCR_EXTENSION_MODULUS {
        return Err(FormatError::field(
            extension_name,
            9,
            clock.extension as u64,
            "must be less than 300",
        ));
    }
    put(writer, clock.base, 33, base_name)?;
    put(writer, 0x3F, 6, "reserved")?;
    put(writer, clock.extension as u64, 9, extension_name)
}

fn write_extension(
    writer: &mut BitWriter,
    extension: &AdaptationExtension,
) -> Result<(), FormatError> {
    put(
        writer,
        extension.length as u64,
        8,
        "adaptation_field_extension_length",
    )?;
    put_flag(writer, extension.ltw.is_some());
    put_flag(writer, extension.piecewise_rate.is_some());
    put_flag(writer, extension.seamless_splice.is_some());
    put(writer, 0x1F, 5, "reserved")?;

    if let Some(ltw) = extension.ltw {
        put_flag(writer, ltw.valid);
        put(writer, ltw.offset as u64, 15, "ltw_offset")?;
    }
    if let Some(rate) = extension.piecewise_rate {
        put(writer, 0x3, 2, "reserved")?;
        put(writer, rate as u64, 22, "piecewise_rate")?;
    }
    if let Some(splice) = extension.seamless_splice {
        put(writer, splice.splice_type as u64, 4, "splice_type")?;
        if splice.dts_next_au >> 33 != 0 {
            return Err(FormatError::field(
                "DTS_next_AU",
                33,
                splice.dts_next_au,
                "does not fit in its bit width",
            ));
        }
        put(writer, splice.dts_next_au >> 30, 3, "DTS_next_AU")?;
        put_flag(writer, true);
        put(writer, (splice.dts_next_au >> 15) & 0x7FFF, 15, "DTS_next_AU")?;
        put_flag(writer, true);
        put(writer, splice.dts_next_au & 0x7FFF, 15, "DTS_next_AU")?;
        put_flag(writer, true);
    }
    Ok(())
}
