// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the typed accessor and plugin enumeration in the
// docreader-client crate, run against the simulated engine.

use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use docreader_client::{Accessor, PluginRegistry};
use docreader_core::DataType;
use docreader_engine::{ReaderEngine, SimulatedEngine};

fn read_sample() -> Arc<dyn ReaderEngine> {
    let engine = SimulatedEngine::sample();
    engine.initialise(None, false).unwrap();
    engine.read_document().unwrap();
    Arc::new(engine)
}

/// Probe, fetch and decode the codeline (the per-document hot path).
fn bench_codeline_get(c: &mut Criterion) {
    let accessor = Accessor::new(read_sample());
    c.bench_function("accessor get codeline", |b| {
        b.iter(|| {
            let codeline = accessor.codeline().unwrap();
            black_box(codeline);
        });
    });
}

/// Pull every instance of a list-valued item.
fn bench_get_all(c: &mut Criterion) {
    let accessor = Accessor::new(read_sample());
    c.bench_function("accessor get_all read progress", |b| {
        b.iter(|| {
            let values = accessor.get_all(black_box(DataType::ReadProgress)).unwrap();
            assert_eq!(values.len(), 2);
        });
    });
}

/// Walk every enabled plugin's records.
fn bench_plugin_records(c: &mut Criterion) {
    let plugins = PluginRegistry::new(read_sample());
    c.bench_function("plugin registry all records", |b| {
        b.iter(|| {
            let records = plugins.all_records().unwrap();
            black_box(records);
        });
    });
}

criterion_group!(benches, bench_codeline_get, bench_get_all, bench_plugin_records);
criterion_main!(benches);
