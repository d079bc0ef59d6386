// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for codeline field extraction, settings blob decoding
// and payload decoding in the docreader-core crate.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use docreader_core::{Codeline, DataType, DataValue, ReaderSettings, Tag};

const TD3: &str = "P<UTOERIKSSON<<ANNA<MARIA<<<<<<<<<<<<<<<<<<<\rL898902C36UTO7408122F1204159ZE184226B<<<<<10";

/// Parse and extract fields from a passport codeline (the per-read hot path).
fn bench_codeline_fields(c: &mut Criterion) {
    c.bench_function("codeline parse + fields (TD3)", |b| {
        b.iter(|| {
            let codeline = Codeline::parse(black_box(TD3)).unwrap();
            let data = codeline.fields().unwrap();
            assert!(data.checks.all_valid());
        });
    });
}

/// Decode a settings blob with every data item enabled.
fn bench_settings_decode(c: &mut Criterion) {
    let mut settings = ReaderSettings::default();
    for tag in DataType::ALL {
        settings.enable(*tag);
    }
    let blob = settings.encode();

    c.bench_function("settings decode (all items)", |b| {
        b.iter(|| {
            let decoded = ReaderSettings::decode(black_box(&blob)).unwrap();
            black_box(decoded);
        });
    });
}

/// Decode a 256 KiB image payload, including format sniffing and the copy.
fn bench_image_decode(c: &mut Criterion) {
    let mut jpeg = vec![0u8; 256 * 1024];
    jpeg[..4].copy_from_slice(&[0xff, 0xd8, 0xff, 0xe0]);

    c.bench_function("DataValue::decode image (256 KiB)", |b| {
        b.iter(|| {
            let value = DataValue::decode(DataType::ImageVis, black_box(&jpeg)).unwrap();
            black_box(value);
        });
    });
}

/// Resolve tags from vendor names, as the CLI does for `--tags`.
fn bench_tag_lookup(c: &mut Criterion) {
    let names = ["CD_CODELINE", "CD_SCDG2_PHOTO", "CD_BARCODE_QRCODE", "CD_PLUGIN+31"];

    c.bench_function("Tag::from_str (mixed)", |b| {
        b.iter(|| {
            for name in names {
                let tag: Tag = black_box(name).parse().unwrap();
                black_box(tag);
            }
        });
    });
}

criterion_group!(
    benches,
    bench_codeline_fields,
    bench_settings_decode,
    bench_image_decode,
    bench_tag_lookup,
);
criterion_main!(benches);
