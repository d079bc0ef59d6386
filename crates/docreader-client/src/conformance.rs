// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Conformance checks for a reader engine.
//
// Runs the call-contract checks every backend must pass: two-phase buffers,
// counts, the plugin tag range, settings idempotence and redetection. Used by
// `docreader conformance` against real hardware and by the tests against the
// simulated engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use docreader_core::data_type::MAX_CODELINE_LEN;
use docreader_core::{
    CD_PLUGIN, DataType, ErrorCode, EventCode, PluginFeature, ReaderError, ReaderState, Tag,
};
use docreader_engine::{EngineCallbacks, ReaderEngine};

use crate::accessor::Accessor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Pass,
    Fail,
    /// The precondition (usually a document on the window) was not met.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub name: &'static str,
    pub verdict: Verdict,
    pub detail: String,
}

impl CheckOutcome {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            verdict: Verdict::Pass,
            detail: detail.into(),
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            verdict: Verdict::Fail,
            detail: detail.into(),
        }
    }

    fn skipped(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            verdict: Verdict::Skipped,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConformanceReport {
    pub backend: String,
    pub checks: Vec<CheckOutcome>,
}

impl ConformanceReport {
    /// No check failed. Skipped checks do not count against the engine.
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.verdict != Verdict::Fail)
    }

    pub fn get(&self, name: &str) -> Option<&CheckOutcome> {
        self.checks.iter().find(|c| c.name == name)
    }
}

/// Counts completed reads pushed by the engine.
#[derive(Default)]
struct ReadCounter {
    ends: Mutex<usize>,
    changed: Condvar,
    data: AtomicUsize,
}

impl ReadCounter {
    fn ends(&self) -> usize {
        *self.ends.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until at least `target` reads have ended.
    fn wait_for(&self, target: usize, timeout: Duration) -> bool {
        let guard = self.ends.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |ends| *ends < target)
            .unwrap_or_else(PoisonError::into_inner);
        *guard >= target
    }
}

impl EngineCallbacks for ReadCounter {
    fn on_data(&self, _tag: Tag, _data: &[u8]) {
        self.data.fetch_add(1, Ordering::Relaxed);
    }

    fn on_event(&self, event: EventCode) {
        if event == EventCode::EndOfDocumentData {
            *self.ends.lock().unwrap_or_else(PoisonError::into_inner) += 1;
            self.changed.notify_all();
        }
    }

    fn on_error(&self, code: ErrorCode, message: &str) {
        warn!(code = %code, message, "engine error during conformance run");
    }

    fn on_warning(&self, _code: ErrorCode, _message: &str) {}

    fn on_bac_key_correction(&self, _mrz: &mut [u8]) {}
}

pub struct Conformance {
    engine: Arc<dyn ReaderEngine>,
    /// How long to watch for a read that must not happen.
    settle: Duration,
    /// How long to wait for a read that must happen.
    read_timeout: Duration,
}

impl Conformance {
    pub fn new(engine: Arc<dyn ReaderEngine>) -> Self {
        Self {
            engine,
            settle: Duration::from_millis(300),
            read_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timing(mut self, settle: Duration, read_timeout: Duration) -> Self {
        self.settle = settle;
        self.read_timeout = read_timeout;
        self
    }

    fn accessor(&self) -> Accessor {
        Accessor::new(Arc::clone(&self.engine))
    }

    /// Run every check. The engine is (re)initialised as each check needs
    /// and left shut down.
    pub fn run_all(&self, tags: &[DataType]) -> ConformanceReport {
        let mut checks = Vec::new();
        info!(backend = self.engine.backend_name(), tags = tags.len(), "conformance run");

        if self.engine.is_initialised() {
            if let Err(code) = self.engine.shutdown() {
                checks.push(CheckOutcome::fail("initialise", format!("shutdown: {code}")));
            }
        }
        if let Err(code) = self.engine.initialise(None, false) {
            checks.push(CheckOutcome::fail("initialise", code.to_string()));
            return self.report(checks);
        }

        checks.push(self.codeline_absent_before_read());

        let document = self.engine.is_document_on_window().unwrap_or(false);
        let read = if document {
            match self.engine.read_document() {
                Ok(()) => true,
                Err(code) => {
                    checks.push(CheckOutcome::fail("read_document", code.to_string()));
                    false
                }
            }
        } else {
            false
        };

        checks.push(self.probe_never_writes(tags));
        checks.push(self.undersized_fetch_reports(tags));
        checks.push(self.count_matches_indices(tags));
        checks.push(self.plugin_range());
        checks.push(self.settings_round_trip());
        checks.push(if read {
            self.codeline_after_read()
        } else {
            CheckOutcome::skipped("codeline_after_read", "no document on the window")
        });

        if let Err(code) = self.engine.shutdown() {
            checks.push(CheckOutcome::fail("shutdown", code.to_string()));
            return self.report(checks);
        }
        checks.push(self.redetect_semantics());
        if let Err(code) = self.engine.shutdown() {
            checks.push(CheckOutcome::fail("shutdown", code.to_string()));
        }

        self.report(checks)
    }

    fn report(&self, checks: Vec<CheckOutcome>) -> ConformanceReport {
        let report = ConformanceReport {
            backend: self.engine.backend_name().to_string(),
            checks,
        };
        info!(passed = report.passed(), "conformance run finished");
        report
    }

    pub fn codeline_absent_before_read(&self) -> CheckOutcome {
        const NAME: &str = "codeline_absent_before_read";
        match self.accessor().probe(DataType::Codeline) {
            Ok(0) => CheckOutcome::pass(NAME, "probe returned 0"),
            Ok(len) => CheckOutcome::fail(NAME, format!("probe returned {len} before any read")),
            Err(e) => CheckOutcome::fail(NAME, e.to_string()),
        }
    }

    /// A sizing call with a one-byte buffer must report the full size and
    /// leave both the buffer and the memory after it alone.
    pub fn probe_never_writes(&self, tags: &[DataType]) -> CheckOutcome {
        const NAME: &str = "probe_never_writes";
        const SENTINEL: u8 = 0xA5;
        const GUARD: usize = 16;
        let mut checked = 0;
        for &tag in tags {
            let mut needed = 0;
            if let Err(code) = self.engine.get_data(Tag::Data(tag), &mut [], &mut needed, 0) {
                return CheckOutcome::fail(NAME, format!("{tag}: probe failed with {code}"));
            }
            if needed < 2 {
                continue;
            }
            let mut region = [SENTINEL; 1 + GUARD];
            let mut len = 1;
            match self.engine.get_data(Tag::Data(tag), &mut region[..1], &mut len, 0) {
                Err(ErrorCode::DataBufferTooSmall) => {}
                Err(code) => {
                    return CheckOutcome::fail(NAME, format!("{tag}: expected DataBufferTooSmall, got {code}"));
                }
                Ok(()) => {
                    return CheckOutcome::fail(NAME, format!("{tag}: one byte accepted for {needed}"));
                }
            }
            if region.iter().any(|b| *b != SENTINEL) {
                return CheckOutcome::fail(NAME, format!("{tag}: probe wrote into the buffer"));
            }
            if len != needed {
                return CheckOutcome::fail(NAME, format!("{tag}: reported {len}, probe said {needed}"));
            }
            checked += 1;
        }
        if checked == 0 {
            CheckOutcome::skipped(NAME, "no tag had data")
        } else {
            CheckOutcome::pass(NAME, format!("{checked} tags probed"))
        }
    }

    pub fn undersized_fetch_reports(&self, tags: &[DataType]) -> CheckOutcome {
        const NAME: &str = "undersized_fetch_reports";
        let mut checked = 0;
        for &tag in tags {
            let needed = match self.accessor().probe(tag) {
                Ok(n) if n > 1 => n,
                Ok(_) => continue,
                Err(e) => return CheckOutcome::fail(NAME, format!("{tag}: {e}")),
            };
            let mut buf = vec![0x5Au8; needed - 1];
            let mut len = buf.len();
            match self.engine.get_data(Tag::Data(tag), &mut buf, &mut len, 0) {
                Err(ErrorCode::DataBufferTooSmall) => {}
                Err(code) => {
                    return CheckOutcome::fail(NAME, format!("{tag}: expected DataBufferTooSmall, got {code}"));
                }
                Ok(()) => {
                    return CheckOutcome::fail(NAME, format!("{tag}: short buffer accepted"));
                }
            }
            if buf.iter().any(|b| *b != 0x5A) {
                return CheckOutcome::fail(NAME, format!("{tag}: short buffer was written"));
            }
            if len != needed {
                return CheckOutcome::fail(NAME, format!("{tag}: reported {len}, probe said {needed}"));
            }
            checked += 1;
        }
        if checked == 0 {
            CheckOutcome::skipped(NAME, "no tag had data")
        } else {
            CheckOutcome::pass(NAME, format!("{checked} tags checked"))
        }
    }

    pub fn count_matches_indices(&self, tags: &[DataType]) -> CheckOutcome {
        const NAME: &str = "count_matches_indices";
        let accessor = self.accessor();
        for &tag in tags {
            let count = match accessor.count(tag) {
                Ok(count) => count,
                Err(e) => return CheckOutcome::fail(NAME, format!("{tag}: {e}")),
            };
            let mut present = 0;
            loop {
                match accessor.probe_at(tag, present) {
                    Ok(0) => break,
                    Ok(_) => present += 1,
                    Err(e) => return CheckOutcome::fail(NAME, format!("{tag}[{present}]: {e}")),
                }
            }
            if present != count {
                return CheckOutcome::fail(NAME, format!("{tag}: count {count}, {present} indices present"));
            }
        }
        CheckOutcome::pass(NAME, format!("{} tags counted", tags.len()))
    }

    pub fn plugin_range(&self) -> CheckOutcome {
        const NAME: &str = "plugin_range";
        for id in (0..=64).chain([1000, 0x0FFF_FFFF]) {
            match Tag::from_raw(CD_PLUGIN + id) {
                Some(Tag::Plugin(feature)) if feature.feature_id() == id => {}
                other => {
                    return CheckOutcome::fail(NAME, format!("CD_PLUGIN+{id} resolved to {other:?}"));
                }
            }
        }
        for &data_type in DataType::ALL {
            if data_type.raw() >= CD_PLUGIN || Tag::from_raw(data_type.raw()) != Some(Tag::Data(data_type)) {
                return CheckOutcome::fail(NAME, format!("{data_type} collides with the plugin range"));
            }
        }
        match self.accessor().probe(PluginFeature::Pdf417) {
            Err(ReaderError::PluginTagOnScalarAccessor(_)) => {
                CheckOutcome::pass(NAME, "plugin tags resolve and stay off the scalar accessor")
            }
            other => CheckOutcome::fail(NAME, format!("scalar probe of a plugin tag gave {other:?}")),
        }
    }

    pub fn settings_round_trip(&self) -> CheckOutcome {
        const NAME: &str = "settings_round_trip";
        let fetch = || -> Result<Vec<u8>, ErrorCode> {
            let mut size = 0;
            self.engine.get_settings(&mut [], &mut size)?;
            let mut blob = vec![0u8; size];
            self.engine.get_settings(&mut blob, &mut size)?;
            Ok(blob)
        };

        let state = self.engine.state();
        let before = match fetch() {
            Ok(blob) => blob,
            Err(code) => return CheckOutcome::fail(NAME, format!("get: {code}")),
        };
        if let Err(code) = self.engine.update_settings(&before) {
            return CheckOutcome::fail(NAME, format!("update: {code}"));
        }
        let after = match fetch() {
            Ok(blob) => blob,
            Err(code) => return CheckOutcome::fail(NAME, format!("get after update: {code}")),
        };
        if after != before {
            return CheckOutcome::fail(NAME, "settings changed after an unmodified update");
        }
        let now = self.engine.state();
        if now != state {
            return CheckOutcome::fail(NAME, format!("state moved from {state} to {now}"));
        }
        CheckOutcome::pass(NAME, format!("{} byte blob unchanged", before.len()))
    }

    pub fn codeline_after_read(&self) -> CheckOutcome {
        const NAME: &str = "codeline_after_read";
        let raw = match self.accessor().get_raw(DataType::Codeline, 0) {
            Ok(Some(raw)) => raw,
            Ok(None) => return CheckOutcome::skipped(NAME, "codeline not produced"),
            Err(e) => return CheckOutcome::fail(NAME, e.to_string()),
        };
        let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
        let text = &raw[..end];
        if text.is_empty() || text.len() > MAX_CODELINE_LEN {
            return CheckOutcome::fail(NAME, format!("length {} outside 1..={MAX_CODELINE_LEN}", text.len()));
        }
        if !text.is_ascii() {
            return CheckOutcome::fail(NAME, "non-ASCII codeline");
        }
        if text.contains(&b'\n') {
            return CheckOutcome::fail(NAME, "line feed inside codeline");
        }
        let body = text.strip_suffix(b"\r").unwrap_or(text);
        let segments = body.split(|b| *b == b'\r').count();
        if segments > 3 {
            return CheckOutcome::fail(NAME, format!("{segments} segments"));
        }
        CheckOutcome::pass(NAME, format!("{} characters, {segments} lines", text.len()))
    }

    /// Needs an uninitialised engine; initialises it Non-Blocking.
    pub fn redetect_semantics(&self) -> CheckOutcome {
        const NAME: &str = "redetect_semantics";
        let counter = Arc::new(ReadCounter::default());
        let callbacks: Arc<dyn EngineCallbacks> = counter.clone();
        if let Err(code) = self.engine.initialise(Some(callbacks), false) {
            return CheckOutcome::fail(NAME, format!("initialise: {code}"));
        }
        if !self.engine.is_document_on_window().unwrap_or(false) {
            return CheckOutcome::skipped(NAME, "no document on the window");
        }

        // Make sure the document counts as read before the real check.
        if !counter.wait_for(1, self.settle) {
            if let Err(code) = self.engine.set_state(ReaderState::Enabled, true) {
                return CheckOutcome::fail(NAME, format!("enable: {code}"));
            }
            if !counter.wait_for(1, self.read_timeout) {
                return CheckOutcome::fail(NAME, "document on the window was never read");
            }
        }

        if let Err(code) = self.engine.set_state(ReaderState::Disabled, false) {
            return CheckOutcome::fail(NAME, format!("disable: {code}"));
        }
        let reads = counter.ends();
        if let Err(code) = self.engine.set_state(ReaderState::Enabled, false) {
            return CheckOutcome::fail(NAME, format!("enable: {code}"));
        }
        if counter.wait_for(reads + 1, self.settle) {
            return CheckOutcome::fail(NAME, "re-enabling without redetect read the document again");
        }

        if let Err(code) = self.engine.set_state(ReaderState::Enabled, true) {
            return CheckOutcome::fail(NAME, format!("redetect: {code}"));
        }
        if !counter.wait_for(reads + 1, self.read_timeout) {
            return CheckOutcome::fail(NAME, "forced redetect did not read the document");
        }
        CheckOutcome::pass(
            NAME,
            format!(
                "{} reads, {} items pushed",
                counter.ends(),
                counter.data.load(Ordering::Relaxed)
            ),
        )
    }
}
