//! Benchmarks for the tag extractor and record parsers.

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use qso_relay::parser::{parse_adif, parse_wsjtx};
use qso_relay::profile::WsjtxDefaults;
use qso_relay::tag::{TagMap, extract};

/// Log4OM / N1MM+ style ADIF records.
const SAMPLE_ADIF: &[&str] = &[
    "<CALL:5>LU1AA<BAND:3>20m<MODE:3>SSB<QSO_DATE:8>20240115<TIME_ON:6>143000<RST_SENT:2>59<COMMENT:4>test<EOR>",
    "<call:6>EA5WU <band:3>40m<mode:2>CW<qso_date:8>20240115<time_on:4>2259<rst_sent:3>599<station_callsign:5>LU9WT<eor>",
    "<CALL:4>PT7K<BAND:3>15m<MODE:3>FT8<QSO_DATE_OFF:8>20240116<TIME_OFF:6>000112<RST_RCVD:3>-12<EOR>",
    "<CALL:5>K9LC <BAND:3>10m<MODE:4>RTTY<QSO_DATE:8>20240116<TIME_ON:6>010203<EOR>",
];

/// WSJT-X / JTDX logged-ADIF broadcasts.
const SAMPLE_WSJTX: &[&str] = &[
    "<call:4>W1AW<gridsquare:4>FN31<mode:3>FT8<rst_sent:3>-10<rst_rcvd:3>-08<qso_date:8>20240115<time_on:6>120000<band:3>20m<eor>",
    "<call:5>JA1XX<mode:3>ft4<band:3>17m<eor>",
    "<call:4>VK2A<eor>",
];

fn bench_parse_adif(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_adif");

    group.throughput(Throughput::Elements(1));
    group.bench_function("single", |b| {
        b.iter(|| parse_adif(black_box(SAMPLE_ADIF[0])))
    });

    group.throughput(Throughput::Elements(SAMPLE_ADIF.len() as u64));
    group.bench_function("batch", |b| {
        b.iter(|| {
            for record in SAMPLE_ADIF {
                let _ = parse_adif(black_box(record));
            }
        })
    });

    group.finish();
}

fn bench_parse_wsjtx(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_wsjtx");
    let defaults = WsjtxDefaults::default();

    group.throughput(Throughput::Elements(SAMPLE_WSJTX.len() as u64));
    group.bench_function("batch", |b| {
        b.iter(|| {
            for record in SAMPLE_WSJTX {
                let _ = parse_wsjtx(black_box(record), &defaults);
            }
        })
    });

    group.finish();
}

fn bench_tag_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("tag_lookup");
    let record = SAMPLE_WSJTX[0];

    group.bench_function("extract_last_field", |b| {
        b.iter(|| extract(black_box(record), "band"))
    });

    group.bench_function("build_tag_map", |b| {
        b.iter(|| TagMap::new(black_box(record)).len())
    });

    group.bench_function("not_adif", |b| {
        b.iter(|| extract(black_box("Welcome to the relay, no tags here"), "call"))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_parse_adif,
    bench_parse_wsjtx,
    bench_tag_lookup
);
criterion_main!(benches);
