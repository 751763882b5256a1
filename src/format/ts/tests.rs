use super::*;
use crate::config::ReaderConfig;
use crate::error::{FormatError, TsError};
use bytes::Bytes;
use pretty_assertions::assert_eq;
use std::io::Cursor;

fn null_packet() -> Vec<u8> {
    let mut data = vec![0x47, 0x1f, 0xff, 0x10];
    data.extend_from_slice(&[0xff; 184]);
    data
}

fn with_control(mut data: Vec<u8>, control: u8) -> Vec<u8> {
    data[3] = (data[3] & 0xCF) | (control << 4);
    data
}

#[test]
fn test_null_packet_fields() {
    let packet = TSPacket::new(null_packet()).unwrap();
    assert_eq!(packet.pid(), 0x1fff);
    assert_eq!(
        packet.adaptation_field_control().unwrap(),
        AdaptationFieldControl::PayloadOnly
    );
    assert_eq!(packet.continuity_counter().unwrap(), 0);
    assert_eq!(packet.adaptation_field().unwrap(), None);
    assert_eq!(packet.payload().unwrap().len(), 184);
}

#[test]
fn test_forbidden_control_through_reader() {
    let mut stream = null_packet();
    stream.extend(with_control(null_packet(), 0b00));

    let mut reader = TSReader::new(Cursor::new(stream.clone()));
    for packet in reader.packets() {
        assert!(packet.unwrap().continuity_counter().is_ok());
    }

    let config = ReaderConfig::new().with_validating(true);
    let mut reader = TSReader::with_config(Cursor::new(stream), config);
    let first = reader.read().unwrap().unwrap();
    let second = reader.read().unwrap().unwrap();
    assert!(first.fields().is_ok());
    assert_eq!(
        second.fields().unwrap_err(),
        FormatError::field("adaptation_field_control", 2, 0, "reserved value")
    );
}

#[test]
fn test_late_switch_to_validating() {
    let mut reader = TSReader::new(Cursor::new(with_control(null_packet(), 0b00)));
    let mut packet = reader.read().unwrap().unwrap();

    assert!(!packet.transport_error_indicator().unwrap());
    packet.set_validating(true);
    assert!(packet.transport_error_indicator().is_err());
    assert_eq!(packet.index(), Some(0));
}

#[test]
fn test_codec_and_packet_agree() {
    let mut fields = PacketFields::new(0x0042, Bytes::from_static(b"payload bytes"))
        .with_payload_unit_start(true)
        .with_continuity_counter(9);
    if let Some(ref mut af) = fields.adaptation_field {
        af.discontinuity = true;
        af.pcr = Some(ClockReference::new(1_234_567, 89));
        af.splice_countdown = Some(-3);
        af.extension = Some(AdaptationExtension {
            seamless_splice: Some(SeamlessSplice {
                splice_type: 0x0A,
                dts_next_au: 0x1_2345_6789,
            }),
            ..AdaptationExtension::default()
        });
    }
    fields.fit().unwrap();

    let data = encode(&fields).unwrap();
    let packet = TSPacket::with_mode(data.clone(), true).unwrap();

    assert_eq!(packet.fields().unwrap(), &fields);
    assert_eq!(decode(&data, false).unwrap(), fields);
    assert!(packet.violations().is_empty());
}

#[test]
fn test_seamless_splice_marker_bits() {
    let mut fields = PacketFields::new(0x0042, vec![0u8; 100]);
    if let Some(ref mut af) = fields.adaptation_field {
        af.extension = Some(AdaptationExtension {
            seamless_splice: Some(SeamlessSplice {
                splice_type: 1,
                dts_next_au: 0,
            }),
            ..AdaptationExtension::default()
        });
    }
    let mut data = encode(&fields).unwrap().to_vec();
    // length, flags, extension length, extension flags, then splice_type + DTS[32..30] + marker
    assert_eq!(data[8] & 0x01, 0x01);
    data[8] &= 0xFE;

    assert!(decode(&data, false).is_ok());
    assert_eq!(
        decode(&data, true).unwrap_err(),
        FormatError::field("marker_bit", 1, 0, "must be 1")
    );
}

#[test]
fn test_format_errors_in_reader_and_packet_modes() {
    for validating in [false, true] {
        assert!(matches!(
            TSPacket::with_mode(vec![0x47; 189], validating),
            Err(FormatError::WrongLength { actual: 189 })
        ));
        assert!(matches!(
            TSPacket::with_mode(vec![0x46; 188], validating),
            Err(FormatError::WrongSyncByte { actual: 0x46 })
        ));
    }
}

#[test]
fn test_error_messages() {
    assert_eq!(
        FormatError::WrongSyncByte { actual: 0x46 }.to_string(),
        "first byte of TS packet is 0x46, not 0x47"
    );
    assert_eq!(
        FormatError::WrongLength { actual: 12 }.to_string(),
        "TS packet is 12 bytes long, not 188"
    );
    assert_eq!(
        FormatError::field("adaptation_field_control", 2, 0, "reserved value").to_string(),
        "adaptation_field_control (2 bits) has value 0x0: reserved value"
    );
    let short = TsError::ShortRead {
        stream: "TS reader for \"x.ts\"".to_string(),
        read: 1,
    };
    assert_eq!(
        short.to_string(),
        "error reading from TS reader for \"x.ts\": read 1 byte instead of 188"
    );
}
