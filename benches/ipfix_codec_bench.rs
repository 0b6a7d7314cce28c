use criterion::{Criterion, criterion_group, criterion_main};
use ipfix_codec::infomodel::{spec_list, use_iana_default};
use ipfix_codec::{FieldValue, MessageBuffer, Template};
use std::hint::black_box;
use std::time::{Duration, SystemTime};

fn build_message() -> Vec<u8> {
    use_iana_default();
    let ies = spec_list([
        "flowStartMilliseconds",
        "sourceIPv4Address",
        "destinationIPv4Address",
        "packetDeltaCount",
    ])
    .unwrap();
    let mut exporter = MessageBuffer::new();
    exporter.set_export_time(1_700_000_000);
    exporter.begin_export(Some(1)).unwrap();
    exporter
        .add_template(Template::from_ielist(256, ies).unwrap(), true)
        .unwrap();
    exporter.export_ensure_set(256).unwrap();
    for n in 0..100u64 {
        exporter
            .export_tuple(
                &[
                    FieldValue::DateTime(
                        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
                    ),
                    FieldValue::Ip4Addr("10.1.2.3".parse().unwrap()),
                    FieldValue::Ip4Addr("10.5.6.7".parse().unwrap()),
                    FieldValue::Unsigned(n),
                ],
                None,
            )
            .unwrap();
    }
    exporter.to_bytes().unwrap()
}

fn criterion_benchmark(c: &mut Criterion) {
    let message = build_message();

    c.bench_function("encode 100 records", |b| {
        b.iter(|| black_box(build_message()))
    });

    c.bench_function("decode 100 records", |b| {
        b.iter(|| {
            let mut collector = MessageBuffer::new();
            collector.from_bytes(black_box(&message)).unwrap();
            collector.namedict_iterator().count()
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
