#[cfg(test)]
mod base_tests {
    use crate::infomodel::{self, spec_list, use_iana_default};
    use crate::types::FieldValue;
    use crate::{IpfixError, MessageBuffer, Template};

    use std::collections::BTreeMap;
    use std::time::{Duration, SystemTime};

    const EXPORT_TIME: u32 = 1_371_823_260;

    fn flow_start() -> SystemTime {
        // 2013-06-21 14:00:00 UTC
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_371_823_200)
    }

    fn flow_ies() -> crate::IeList {
        use_iana_default();
        spec_list([
            "flowStartMilliseconds",
            "sourceIPv4Address",
            "destinationIPv4Address",
            "packetDeltaCount",
        ])
        .unwrap()
    }

    fn flow_record() -> Vec<FieldValue> {
        vec![
            FieldValue::DateTime(flow_start()),
            FieldValue::Ip4Addr("10.1.2.3".parse().unwrap()),
            FieldValue::Ip4Addr("10.5.6.7".parse().unwrap()),
            FieldValue::Unsigned(27),
        ]
    }

    #[test]
    fn it_exports_and_decodes_a_flow_data_set() {
        let mut exporter = MessageBuffer::new();
        exporter.set_export_time(EXPORT_TIME);
        exporter.begin_export(Some(8304)).unwrap();
        exporter
            .add_template(Template::from_ielist(256, flow_ies()).unwrap(), true)
            .unwrap();
        exporter.export_ensure_set(256).unwrap();
        exporter.export_tuple(&flow_record(), None).unwrap();
        let bytes = exporter.to_bytes().unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(&10u16.to_be_bytes());
        expected.extend_from_slice(&68u16.to_be_bytes());
        expected.extend_from_slice(&EXPORT_TIME.to_be_bytes());
        expected.extend_from_slice(&0u32.to_be_bytes());
        expected.extend_from_slice(&8304u32.to_be_bytes());
        // template set: four fixed-length field specifiers
        expected.extend_from_slice(&[0, 2, 0, 24]);
        expected.extend_from_slice(&[1, 0, 0, 4]);
        expected.extend_from_slice(&[0, 152, 0, 8]);
        expected.extend_from_slice(&[0, 8, 0, 4]);
        expected.extend_from_slice(&[0, 12, 0, 4]);
        expected.extend_from_slice(&[0, 2, 0, 8]);
        // data set: one 24-octet record
        expected.extend_from_slice(&[1, 0, 0, 28]);
        expected.extend_from_slice(&1_371_823_200_000u64.to_be_bytes());
        expected.extend_from_slice(&[10, 1, 2, 3]);
        expected.extend_from_slice(&[10, 5, 6, 7]);
        expected.extend_from_slice(&27u64.to_be_bytes());
        assert_eq!(bytes, expected);

        let mut collector = MessageBuffer::new();
        collector.from_bytes(&bytes).unwrap();
        assert_eq!(collector.odid(), 8304);
        assert_eq!(collector.export_time(), Some(EXPORT_TIME));
        assert_eq!(collector.sequence(), 0);
        let records: Vec<_> = collector
            .namedict_iterator()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0]["flowStartMilliseconds"],
            FieldValue::DateTime(flow_start())
        );
        assert_eq!(
            records[0]["sourceIPv4Address"],
            FieldValue::Ip4Addr("10.1.2.3".parse().unwrap())
        );
        assert_eq!(
            records[0]["destinationIPv4Address"],
            FieldValue::Ip4Addr("10.5.6.7".parse().unwrap())
        );
        assert_eq!(records[0]["packetDeltaCount"], FieldValue::Unsigned(27));
    }

    #[test]
    fn it_encodes_variable_length_fields() {
        use_iana_default();
        let greeting = infomodel::for_spec("myNewInformationElement(35566/1)<string>").unwrap();
        let mut ies = spec_list(["flowStartMilliseconds"]).unwrap();
        ies.push(greeting);
        let template = Template::from_ielist(257, ies).unwrap();
        assert_eq!(template.fixlen_count(), 1);
        assert_eq!(template.min_record_len(), 9);

        let mut exporter = MessageBuffer::new();
        exporter.set_export_time(EXPORT_TIME);
        exporter.begin_export(Some(8304)).unwrap();
        exporter.add_template(template, true).unwrap();
        exporter.export_ensure_set(257).unwrap();
        exporter
            .export_tuple(
                &[
                    FieldValue::DateTime(flow_start()),
                    FieldValue::String("Grüezi, Y'all".to_string()),
                ],
                None,
            )
            .unwrap();
        let bytes = exporter.to_bytes().unwrap();

        // record is 8 + 1 (short varlen prefix) + 14 octets of UTF-8
        let data_set = &bytes[bytes.len() - (4 + 23)..];
        assert_eq!(&data_set[..4], &[1, 1, 0, 27]);
        assert_eq!(data_set[12], 14);
        assert_eq!(&data_set[13..], "Grüezi, Y'all".as_bytes());

        let mut collector = MessageBuffer::new();
        collector.from_bytes(&bytes).unwrap();
        let records: Vec<_> = collector
            .namedict_iterator()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0]["myNewInformationElement"],
            FieldValue::String("Grüezi, Y'all".to_string())
        );
    }

    #[test]
    fn it_applies_reduced_length_encoding() {
        use_iana_default();
        let ies = spec_list(["sourceIPv4Address", "packetDeltaCount[4]"]).unwrap();
        assert_eq!(ies[1].length, 4);
        let template = Template::from_ielist(258, ies).unwrap();

        let mut exporter = MessageBuffer::new();
        exporter.set_export_time(EXPORT_TIME);
        exporter.begin_export(Some(8304)).unwrap();
        exporter.add_template(template, true).unwrap();
        exporter.export_ensure_set(258).unwrap();
        exporter
            .export_tuple(
                &[
                    FieldValue::Ip4Addr("10.1.2.3".parse().unwrap()),
                    FieldValue::Unsigned(27),
                ],
                None,
            )
            .unwrap();
        let bytes = exporter.to_bytes().unwrap();
        assert_eq!(&bytes[bytes.len() - 4..], &[0, 0, 0, 27]);

        let mut collector = MessageBuffer::new();
        collector.from_bytes(&bytes).unwrap();
        let records: Vec<_> = collector
            .namedict_iterator()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(records[0]["packetDeltaCount"], FieldValue::Unsigned(27));
    }

    #[test]
    fn it_recovers_from_mtu_exhaustion() {
        let mut exporter = MessageBuffer::with_mtu(48);
        exporter.set_export_time(EXPORT_TIME);
        exporter.begin_export(Some(8304)).unwrap();
        exporter
            .add_template(Template::from_ielist(256, flow_ies()).unwrap(), true)
            .unwrap();
        exporter.export_ensure_set(256).unwrap();

        let err = exporter.export_tuple(&flow_record(), None).unwrap_err();
        assert!(matches!(err, IpfixError::EndOfMessage { .. }));

        let first = exporter.to_bytes().unwrap();
        assert_eq!(first.len(), 44);

        // the template survives finalization, so the record fits next message
        exporter.begin_export(None).unwrap();
        exporter.export_ensure_set(256).unwrap();
        exporter.export_tuple(&flow_record(), None).unwrap();
        let second = exporter.to_bytes().unwrap();
        assert_eq!(second.len(), 44);

        let mut collector = MessageBuffer::new();
        collector.from_bytes(&first).unwrap();
        assert_eq!(collector.namedict_iterator().count(), 0);
        collector.from_bytes(&second).unwrap();
        let records: Vec<_> = collector
            .namedict_iterator()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn it_withdraws_templates() {
        let mut exporter = MessageBuffer::new();
        exporter.set_export_time(EXPORT_TIME);
        exporter.begin_export(Some(8304)).unwrap();
        exporter
            .add_template(Template::from_ielist(256, flow_ies()).unwrap(), true)
            .unwrap();
        exporter.delete_template(256, true).unwrap();
        let bytes = exporter.to_bytes().unwrap();

        // one set 2 holding the template record and then the withdrawal
        assert_eq!(&bytes[16..20], &[0, 2, 0, 28]);
        assert_eq!(&bytes[bytes.len() - 4..], &[1, 0, 0, 0]);
        assert!(exporter.get_template(256).is_none());

        let mut collector = MessageBuffer::new();
        collector.from_bytes(&bytes).unwrap();
        assert_eq!(collector.namedict_iterator().count(), 0);
        assert!(collector.get_template(256).is_none());
    }

    #[test]
    fn it_skips_data_after_a_withdrawal() {
        let mut exporter = MessageBuffer::new();
        exporter.set_export_time(EXPORT_TIME);
        exporter.begin_export(Some(8304)).unwrap();
        exporter
            .add_template(Template::from_ielist(256, flow_ies()).unwrap(), true)
            .unwrap();
        exporter.export_ensure_set(256).unwrap();
        exporter.export_tuple(&flow_record(), None).unwrap();
        let first = exporter.to_bytes().unwrap();

        let mut collector = MessageBuffer::new();
        collector.from_bytes(&first).unwrap();
        assert_eq!(collector.namedict_iterator().count(), 1);

        exporter.begin_export(None).unwrap();
        exporter.delete_template(256, true).unwrap();
        let withdrawal = exporter.to_bytes().unwrap();
        collector.from_bytes(&withdrawal).unwrap();
        assert_eq!(collector.namedict_iterator().count(), 0);

        // data sets for the withdrawn template are now skipped
        collector.from_bytes(&first).unwrap();
        let mut iter = collector.namedict_iterator();
        // the template set inside `first` re-registers 256, so drain and
        // check only that no record errored
        assert!(iter.all(|r| r.is_ok()));
    }

    #[test]
    fn it_projects_tuples_across_templates() {
        use_iana_default();
        let other_ies = spec_list(["flowStartMilliseconds", "octetDeltaCount"]).unwrap();

        let mut exporter = MessageBuffer::new();
        exporter.set_export_time(EXPORT_TIME);
        exporter.begin_export(Some(8304)).unwrap();
        exporter
            .add_template(Template::from_ielist(256, flow_ies()).unwrap(), true)
            .unwrap();
        exporter
            .add_template(Template::from_ielist(257, other_ies).unwrap(), true)
            .unwrap();
        exporter.export_ensure_set(256).unwrap();
        exporter.export_tuple(&flow_record(), None).unwrap();
        exporter.export_ensure_set(257).unwrap();
        exporter
            .export_tuple(
                &[
                    FieldValue::DateTime(flow_start()),
                    FieldValue::Unsigned(4242),
                ],
                None,
            )
            .unwrap();
        let bytes = exporter.to_bytes().unwrap();

        let mut collector = MessageBuffer::new();
        collector.from_bytes(&bytes).unwrap();
        let projection = spec_list(["flowStartMilliseconds", "packetDeltaCount"]).unwrap();
        let records: Vec<_> = collector
            .tuple_iterator(projection)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        // template 257 has no packetDeltaCount, so only set 256 matches
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0],
            vec![FieldValue::DateTime(flow_start()), FieldValue::Unsigned(27)]
        );
    }

    #[test]
    fn it_scopes_templates_to_observation_domains() {
        let mut exporter = MessageBuffer::new();
        exporter.begin_export(Some(1)).unwrap();
        exporter
            .add_template(Template::from_ielist(256, flow_ies()).unwrap(), false)
            .unwrap();
        assert!(exporter.get_template(256).is_some());

        exporter.begin_export(Some(2)).unwrap();
        assert!(exporter.get_template(256).is_none());
        let err = exporter.export_ensure_set(256).unwrap_err();
        assert!(matches!(err, IpfixError::TemplateNotFound { .. }));
    }

    #[test]
    fn it_advances_sequence_numbers_per_domain() {
        let mut exporter = MessageBuffer::new();
        exporter.set_export_time(EXPORT_TIME);
        exporter.begin_export(Some(1)).unwrap();
        exporter
            .add_template(Template::from_ielist(256, flow_ies()).unwrap(), true)
            .unwrap();
        exporter.export_ensure_set(256).unwrap();
        exporter.export_tuple(&flow_record(), None).unwrap();
        exporter.export_tuple(&flow_record(), None).unwrap();
        let first = exporter.to_bytes().unwrap();

        exporter.begin_export(None).unwrap();
        exporter.export_ensure_set(256).unwrap();
        exporter.export_tuple(&flow_record(), None).unwrap();
        let second = exporter.to_bytes().unwrap();

        // a fresh domain keeps its own counter
        exporter.begin_export(Some(2)).unwrap();
        exporter
            .add_template(Template::from_ielist(256, flow_ies()).unwrap(), true)
            .unwrap();
        let other_domain = exporter.to_bytes().unwrap();

        let sequence_of = |bytes: &[u8]| u32::from_be_bytes(bytes[8..12].try_into().unwrap());
        assert_eq!(sequence_of(&first), 0);
        assert_eq!(sequence_of(&second), 2);
        assert_eq!(sequence_of(&other_domain), 0);
    }

    #[test]
    fn it_rejects_exports_before_begin_export() {
        let mut buffer = MessageBuffer::new();
        let err = buffer.export_ensure_set(256).unwrap_err();
        assert!(matches!(err, IpfixError::WrongState { .. }));
        let err = buffer.export_tuple(&[], None).unwrap_err();
        assert!(matches!(err, IpfixError::WrongState { .. }));
        let err = buffer.to_bytes().unwrap_err();
        assert!(matches!(err, IpfixError::WrongState { .. }));
    }

    #[test]
    fn it_reports_missing_fields_by_name() {
        use_iana_default();
        let template = Template::from_ielist(256, flow_ies()).unwrap();
        let mut rec: BTreeMap<String, FieldValue> = BTreeMap::new();
        rec.insert(
            "flowStartMilliseconds".to_string(),
            FieldValue::DateTime(flow_start()),
        );
        let mut out = Vec::new();
        let err = template.encode_namedict_to(&mut out, &rec).unwrap_err();
        assert_eq!(
            err,
            IpfixError::MissingField {
                name: "sourceIPv4Address".to_string()
            }
        );
    }

    #[test]
    fn it_reads_a_captured_template_message() {
        use_iana_default();
        // template 260: sourceIPv4Address, destinationIPv4Address
        let capture =
            "000a00205f5e10000000000000000001000200100104000200080004000c0004";
        let bytes = hex::decode(capture).unwrap();

        let mut collector = MessageBuffer::new();
        collector.from_bytes(&bytes).unwrap();
        assert_eq!(collector.export_time(), Some(1_600_000_000));
        assert_eq!(collector.namedict_iterator().count(), 0);

        let template = collector.get_template(260).unwrap();
        assert_eq!(template.ies().len(), 2);
        assert_eq!(template.ies()[0].name, "sourceIPv4Address");
        assert_eq!(template.ies()[1].name, "destinationIPv4Address");
    }

    #[test]
    fn it_serializes_decoded_records_to_json() {
        let mut exporter = MessageBuffer::new();
        exporter.set_export_time(EXPORT_TIME);
        exporter.begin_export(Some(8304)).unwrap();
        exporter
            .add_template(Template::from_ielist(256, flow_ies()).unwrap(), true)
            .unwrap();
        exporter.export_ensure_set(256).unwrap();
        exporter.export_tuple(&flow_record(), None).unwrap();
        let bytes = exporter.to_bytes().unwrap();

        let mut collector = MessageBuffer::new();
        collector.from_bytes(&bytes).unwrap();
        let records: Vec<_> = collector
            .namedict_iterator()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        let json = serde_json::to_value(&records[0]).unwrap();
        assert_eq!(json["packetDeltaCount"]["Unsigned"], 27);
        assert_eq!(json["sourceIPv4Address"]["Ip4Addr"], "10.1.2.3");
    }
}
