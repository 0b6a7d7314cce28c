use ipfix_codec::infomodel::{spec_list, use_iana_default};
use ipfix_codec::{FieldValue, IpfixError, MessageBuffer, Template};

fn header(length: u16) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&10u16.to_be_bytes());
    bytes.extend_from_slice(&length.to_be_bytes());
    bytes.extend_from_slice(&1_700_000_000u32.to_be_bytes());
    bytes.extend_from_slice(&0u32.to_be_bytes());
    bytes.extend_from_slice(&1u32.to_be_bytes());
    bytes
}

#[test]
fn test_wrong_version_is_malformed() {
    let mut bytes = header(16);
    bytes[0..2].copy_from_slice(&9u16.to_be_bytes());
    let err = MessageBuffer::new().from_bytes(&bytes).unwrap_err();
    assert!(matches!(err, IpfixError::Malformed { .. }));
}

#[test]
fn test_truncated_buffers_are_malformed() {
    let err = MessageBuffer::new().from_bytes(&[0, 10, 0, 16]).unwrap_err();
    assert!(matches!(err, IpfixError::Malformed { .. }));

    // header claims more octets than supplied
    let bytes = header(64);
    let err = MessageBuffer::new().from_bytes(&bytes).unwrap_err();
    assert!(matches!(err, IpfixError::Malformed { offset: 2, .. }));
}

#[test]
fn test_set_lengths_are_bounds_checked() {
    // set length below the set header size
    let mut bytes = header(20);
    bytes.extend_from_slice(&[1, 0, 0, 2]);
    let err = MessageBuffer::new().from_bytes(&bytes).unwrap_err();
    assert!(matches!(err, IpfixError::Malformed { offset: 16, .. }));

    // set length running past the message
    let mut bytes = header(24);
    bytes.extend_from_slice(&[1, 0, 0, 32]);
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    let err = MessageBuffer::new().from_bytes(&bytes).unwrap_err();
    assert!(matches!(err, IpfixError::Malformed { offset: 16, .. }));

    // a trailing partial set header
    let mut bytes = header(18);
    bytes.extend_from_slice(&[1, 0]);
    let err = MessageBuffer::new().from_bytes(&bytes).unwrap_err();
    assert!(matches!(err, IpfixError::Malformed { offset: 16, .. }));
}

#[test]
fn test_extra_trailing_bytes_are_ignored() {
    // stream adapters may hand over more than one message's worth
    let mut bytes = header(16);
    bytes.extend_from_slice(&[0, 10, 0, 16]);
    let mut collector = MessageBuffer::new();
    collector.from_bytes(&bytes).unwrap();
    assert_eq!(collector.namedict_iterator().count(), 0);
}

#[test]
fn test_tail_padding_shorter_than_a_record_is_tolerated() {
    use_iana_default();
    let ies = spec_list(["sourceIPv4Address", "destinationIPv4Address"]).unwrap();
    let template = Template::from_ielist(270, ies).unwrap();

    let mut exporter = MessageBuffer::new();
    exporter.set_export_time(1_700_000_000);
    exporter.begin_export(Some(1)).unwrap();
    exporter.add_template(template, true).unwrap();
    exporter.export_ensure_set(270).unwrap();
    exporter
        .export_tuple(
            &[
                FieldValue::Ip4Addr("10.0.0.1".parse().unwrap()),
                FieldValue::Ip4Addr("10.0.0.2".parse().unwrap()),
            ],
            None,
        )
        .unwrap();
    let mut bytes = exporter.to_bytes().unwrap();

    // widen the data set by three octets of padding and repatch the lengths
    let data_set_off = bytes.len() - 12;
    bytes.extend_from_slice(&[0, 0, 0]);
    let message_len = bytes.len() as u16;
    bytes[2..4].copy_from_slice(&message_len.to_be_bytes());
    let set_len = 12u16 + 3;
    bytes[data_set_off + 2..data_set_off + 4].copy_from_slice(&set_len.to_be_bytes());

    let mut collector = MessageBuffer::new();
    collector.from_bytes(&bytes).unwrap();
    let records: Vec<_> = collector
        .namedict_iterator()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(records.len(), 1);
}

#[test]
fn test_truncated_template_records_error_the_iteration() {
    // a template set whose record promises more field specifiers than exist
    let mut bytes = header(16 + 4 + 8);
    bytes.extend_from_slice(&[0, 2, 0, 12]);
    bytes.extend_from_slice(&[1, 0, 0, 3]); // tid 256, three fields
    bytes.extend_from_slice(&[0, 8, 0, 4]); // only one present
    let mut collector = MessageBuffer::new();
    collector.from_bytes(&bytes).unwrap();
    let results: Vec<_> = collector.namedict_iterator().collect();
    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(IpfixError::Malformed { .. })));
}

#[test]
fn test_errors_end_the_iteration() {
    let mut bytes = header(16 + 12 + 8);
    bytes.extend_from_slice(&[0, 2, 0, 12]);
    bytes.extend_from_slice(&[1, 0, 0, 3]);
    bytes.extend_from_slice(&[0, 8, 0, 4]);
    // a healthy-looking set after the broken one
    bytes.extend_from_slice(&[3, 232, 0, 8]);
    bytes.extend_from_slice(&[1, 2, 3, 4]);
    let mut collector = MessageBuffer::new();
    collector.from_bytes(&bytes).unwrap();
    let mut iter = collector.namedict_iterator();
    assert!(matches!(iter.next(), Some(Err(_))));
    assert!(iter.next().is_none());
}
