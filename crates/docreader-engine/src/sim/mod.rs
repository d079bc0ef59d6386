// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-process engine that replays fixtures under the full call contract.
//
// Everything a client can observe through `ReaderEngine` behaves as the vendor
// engine documents it: two-phase buffers, state transitions, redetection,
// plugin load failures, subsystem restarts on settings commits, and the BAC
// key correction callback on its own thread. Test hooks (`place_document`,
// `inject_fault`, ...) stand in for the hardware.

mod fixture;

pub use fixture::*;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use docreader_core::data_type::MAX_CODELINE_LEN;
use docreader_core::{
    DataType, EngineResult, ErrorCode, EventCode, PluginData, PluginFeature, ReaderError,
    ReaderSettings, ReaderState, Result, Subsystem, Tag, TriState,
};

use crate::traits::{EngineCallbacks, ReaderEngine, c_string_bytes, fill_buffer};

struct SimPlugin {
    name: String,
    loaded: bool,
    enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct VendorLogging {
    enabled: bool,
    level: i32,
    mask: i32,
    file: Option<PathBuf>,
}

struct SimState {
    initialised: bool,
    reader_state: ReaderState,
    callbacks: Option<Arc<dyn EngineCallbacks>>,
    /// Working copy; discarded at shutdown unless saved.
    settings: ReaderSettings,
    /// The engine's appconfig.
    saved_settings: ReaderSettings,
    plugins: Vec<SimPlugin>,
    scanners: Vec<String>,
    selected: Option<String>,
    document: Option<DocumentFixture>,
    /// The document on the window has been read since it was placed.
    document_read: bool,
    data: HashMap<DataType, Vec<Vec<u8>>>,
    plugin_data: HashMap<String, Vec<Vec<PluginData>>>,
    read_count: usize,
    restarts: HashMap<Subsystem, usize>,
    last_error: ErrorCode,
    logging: Option<VendorLogging>,
    fail_initialise: Option<ErrorCode>,
    /// Misbehave like a truncating engine: copy into short buffers.
    truncate_short_buffers: bool,
    /// Identifiers of certificates the host supplied during the last read.
    certificates_supplied: Vec<String>,
}

impl SimState {
    /// A document the engine has not read since it was placed.
    fn has_unread_document(&self) -> bool {
        self.document.is_some() && !self.document_read
    }
}

struct Shared {
    state: Mutex<SimState>,
    /// Signalled whenever a document is placed.
    placed: Condvar,
    /// Serialises reads; a redetect while a read is running queues behind it.
    reading: Mutex<()>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    abort: AtomicBool,
}

fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        relock(&self.state)
    }

    fn callbacks(&self) -> Option<Arc<dyn EngineCallbacks>> {
        self.lock().callbacks.clone()
    }

    fn emit(&self, event: EventCode) {
        if let Some(cb) = self.callbacks() {
            cb.on_event(event);
        }
    }

    fn set_reader_state(&self, state: ReaderState) {
        let changed = {
            let mut st = self.lock();
            let changed = st.reader_state != state;
            st.reader_state = state;
            changed
        };
        if changed {
            debug!(backend = "simulated", state = %state, "reader state changed");
            self.emit(EventCode::ReaderStateChanged);
        }
    }

    /// Store one item instance, then push it.
    fn produce(&self, callbacks: &Option<Arc<dyn EngineCallbacks>>, tag: DataType, bytes: Vec<u8>) {
        self.lock().data.entry(tag).or_default().push(bytes.clone());
        if let Some(cb) = callbacks {
            cb.on_data(Tag::Data(tag), &bytes);
        }
    }

    fn spawn_read(self: &Arc<Self>) {
        let shared = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("sim-reader".into())
            .spawn(move || {
                if let Err(code) = shared.perform_read() {
                    if let Some(cb) = shared.callbacks() {
                        cb.on_error(code, "document read failed");
                    }
                }
            });
        match spawned {
            Ok(handle) => self.track(handle),
            Err(e) => warn!(error = %e, "failed to spawn simulated reader thread"),
        }
    }

    /// Keep `handle` for shutdown, dropping handles of threads already done.
    fn track(&self, handle: JoinHandle<()>) {
        let mut workers = relock(&self.workers);
        workers.retain(|h| !h.is_finished());
        workers.push(handle);
    }

    fn join_workers(&self) {
        let handles: Vec<_> = relock(&self.workers).drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                warn!("simulated engine worker panicked");
            }
        }
    }

    /// Produce every configured item for the document on the window.
    fn perform_read(&self) -> EngineResult<()> {
        let _reading = relock(&self.reading);

        let (document, settings, plugins, callbacks) = {
            let mut st = self.lock();
            if !st.initialised {
                return Err(ErrorCode::NotInitialised);
            }
            let document = st.document.clone().ok_or(ErrorCode::NoDocumentOnWindow)?;
            let plugins: Vec<String> = st
                .plugins
                .iter()
                .filter(|p| p.loaded && p.enabled)
                .map(|p| p.name.clone())
                .collect();
            st.data.clear();
            st.plugin_data.clear();
            st.certificates_supplied.clear();
            (document, st.settings.clone(), plugins, st.callbacks.clone())
        };
        self.abort.store(false, Ordering::SeqCst);

        info!(backend = "simulated", document = %document.name, "reading document");
        if let Some(cb) = &callbacks {
            cb.on_event(EventCode::StartOfDocumentData);
        }

        // -- Page items --
        if let Some(codeline) = &document.codeline {
            if settings.is_enabled(DataType::Codeline) {
                self.produce(&callbacks, DataType::Codeline, c_string_bytes(codeline));
            }
        }
        for item in &document.items {
            let tag = match item.data_type() {
                Ok(tag) => tag,
                Err(e) => {
                    warn!(error = %e, "skipping fixture item");
                    continue;
                }
            };
            if tag.is_rfid() || !settings.is_enabled(tag) {
                continue;
            }
            for value in &item.values {
                match value.to_bytes() {
                    Ok(bytes) => self.produce(&callbacks, tag, bytes),
                    Err(e) => warn!(tag = %tag, error = %e, "skipping fixture value"),
                }
            }
        }

        // -- Decoder plugins, in plugin order --
        for plugin in &plugins {
            let Some(result) = document.plugin_records(plugin) else {
                continue;
            };
            let mut features = Vec::with_capacity(result.features.len());
            for parts in &result.features {
                let parts: Vec<PluginData> = parts
                    .iter()
                    .filter_map(|part| part.to_plugin_data().ok())
                    .collect();
                if let Some(cb) = &callbacks {
                    for part in &parts {
                        cb.on_plugin_data(PluginFeature::from_feature_id(part.feature_type_id), part.clone());
                    }
                }
                features.push(parts);
            }
            debug!(plugin = %plugin, features = features.len(), "plugin results");
            self.lock().plugin_data.insert(plugin.clone(), features);
        }

        // -- Chip --
        if settings.rf.enabled && document.has_chip() {
            self.read_chip(&document, &settings, &callbacks)?;
        }

        {
            let mut st = self.lock();
            st.document_read = true;
            st.read_count += 1;
        }
        if let Some(cb) = &callbacks {
            cb.on_event(EventCode::EndOfDocumentData);
        }
        Ok(())
    }

    fn read_chip(
        &self,
        document: &DocumentFixture,
        settings: &ReaderSettings,
        callbacks: &Option<Arc<dyn EngineCallbacks>>,
    ) -> EngineResult<()> {
        let mut mrz = document.codeline.clone().unwrap_or_default();

        if settings.rf.bac_key_correction {
            if let Some(cb) = callbacks {
                mrz = correct_bac_key(Arc::clone(cb), &mrz)?;
            }
        }

        let unlocked = document.chip_key() == Some(mrz.as_str());
        if settings.is_enabled(DataType::ScBacStatus) {
            let status = if unlocked { TriState::True } else { TriState::False };
            self.produce(callbacks, DataType::ScBacStatus, status.raw().to_le_bytes().to_vec());
        }
        if !unlocked {
            warn!(backend = "simulated", "BAC failed, chip items skipped");
            if let Some(cb) = callbacks {
                cb.on_warning(ErrorCode::ReadFailed, "basic access control failed");
            }
            return Ok(());
        }

        if let Some(cb) = callbacks {
            for request in &document.certificates {
                match cb.on_certificate(&request.identifier, request.kind) {
                    Some(cert) if !cert.is_empty() => {
                        debug!(identifier = %request.identifier, len = cert.len(), "certificate supplied");
                        self.lock().certificates_supplied.push(request.identifier.clone());
                    }
                    _ => debug!(
                        identifier = %request.identifier,
                        kind = request.kind.vendor_name(),
                        "no certificate, validating without it"
                    ),
                }
            }
        }

        for item in &document.items {
            let Ok(tag) = item.data_type() else { continue };
            if !tag.is_rfid() || !settings.is_enabled(tag) {
                continue;
            }
            if self.abort.swap(false, Ordering::SeqCst) {
                info!(backend = "simulated", "chip read aborted");
                if let Some(cb) = callbacks {
                    cb.on_error(ErrorCode::RfAborted, "chip read aborted");
                }
                return Ok(());
            }
            for value in &item.values {
                if let Ok(bytes) = value.to_bytes() {
                    self.produce(callbacks, tag, bytes);
                }
            }
        }
        Ok(())
    }
}

/// Offer `mrz` to the host on a dedicated thread and wait for the answer.
fn correct_bac_key(callbacks: Arc<dyn EngineCallbacks>, mrz: &str) -> EngineResult<String> {
    let mut buf = vec![0u8; MAX_CODELINE_LEN + 1];
    let len = mrz.len().min(MAX_CODELINE_LEN);
    buf[..len].copy_from_slice(&mrz.as_bytes()[..len]);

    let handle = thread::Builder::new()
        .name("sim-bac".into())
        .spawn(move || {
            callbacks.on_bac_key_correction(&mut buf);
            buf
        })
        .map_err(|_| ErrorCode::ReadFailed)?;
    let buf = handle.join().map_err(|_| ErrorCode::ReadFailed)?;

    let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}

/// A `ReaderEngine` backed by a fixture instead of hardware.
#[derive(Clone)]
pub struct SimulatedEngine {
    inner: Arc<Shared>,
}

impl SimulatedEngine {
    pub fn new(fixture: EngineFixture) -> Self {
        let saved = fixture.settings.unwrap_or_default();
        let state = SimState {
            initialised: false,
            reader_state: ReaderState::Uninitialised,
            callbacks: None,
            settings: saved.clone(),
            saved_settings: saved,
            plugins: fixture
                .plugins
                .into_iter()
                .map(|p| SimPlugin {
                    name: p.name,
                    loaded: p.loaded,
                    enabled: p.loaded && p.enabled,
                })
                .collect(),
            scanners: fixture.scanners,
            selected: None,
            document: fixture.document,
            document_read: false,
            data: HashMap::new(),
            plugin_data: HashMap::new(),
            read_count: 0,
            restarts: HashMap::new(),
            last_error: ErrorCode::NoErrorOccurred,
            logging: None,
            fail_initialise: None,
            truncate_short_buffers: false,
            certificates_supplied: Vec::new(),
        };
        Self {
            inner: Arc::new(Shared {
                state: Mutex::new(state),
                placed: Condvar::new(),
                reading: Mutex::new(()),
                workers: Mutex::new(Vec::new()),
                abort: AtomicBool::new(false),
            }),
        }
    }

    pub fn sample() -> Self {
        Self::new(EngineFixture::sample())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::new(EngineFixture::load(path)?))
    }

    // -- Hardware stand-ins --

    /// Lay a document on the window. In Non-Blocking mode an enabled reader
    /// starts reading it straight away.
    pub fn place_document(&self, document: DocumentFixture) {
        let auto_read = {
            let mut st = self.inner.lock();
            st.document = Some(document);
            st.document_read = false;
            st.initialised && st.reader_state == ReaderState::Enabled && st.callbacks.is_some()
        };
        self.inner.placed.notify_all();
        if auto_read {
            self.inner.spawn_read();
        }
    }

    pub fn remove_document(&self) {
        let removed = {
            let mut st = self.inner.lock();
            st.document_read = false;
            st.document.take().is_some() && st.initialised
        };
        if removed {
            self.inner.emit(EventCode::DocumentRemoved);
        }
    }

    /// Drop the reader into `Errored`. With `recover_after`, it resets itself
    /// back to `Enabled` once the delay has passed.
    pub fn inject_fault(&self, recover_after: Option<Duration>) {
        if !self.inner.lock().initialised {
            return;
        }
        warn!(backend = "simulated", "injected engine fault");
        self.inner.set_reader_state(ReaderState::Errored);
        if let Some(cb) = self.inner.callbacks() {
            cb.on_error(ErrorCode::Unknown, "engine fault");
        }

        if let Some(delay) = recover_after {
            let shared = Arc::clone(&self.inner);
            let spawned = thread::Builder::new().name("sim-reset".into()).spawn(move || {
                thread::sleep(delay);
                let errored = shared.lock().reader_state == ReaderState::Errored;
                if errored {
                    shared.set_reader_state(ReaderState::Enabled);
                }
            });
            match spawned {
                Ok(handle) => self.inner.track(handle),
                Err(e) => warn!(error = %e, "failed to spawn simulated reset thread"),
            }
        }
    }

    /// The next `initialise` fails with `code`.
    pub fn fail_initialise_with(&self, code: ErrorCode) {
        self.inner.lock().fail_initialise = Some(code);
    }

    /// Copy as much as fits into a short data buffer before reporting
    /// `DataBufferTooSmall`, as a non-conforming engine would.
    pub fn truncate_short_buffers(&self, truncate: bool) {
        self.inner.lock().truncate_short_buffers = truncate;
    }

    // -- Observation --

    pub fn read_count(&self) -> usize {
        self.inner.lock().read_count
    }

    /// Certificates the host handed over during the last read, in request order.
    pub fn certificates_supplied(&self) -> Vec<String> {
        self.inner.lock().certificates_supplied.clone()
    }

    pub fn restart_count(&self, subsystem: Subsystem) -> usize {
        self.inner.lock().restarts.get(&subsystem).copied().unwrap_or(0)
    }

    pub fn saved_settings(&self) -> ReaderSettings {
        self.inner.lock().saved_settings.clone()
    }

    pub fn selected_scanner(&self) -> Option<String> {
        self.inner.lock().selected.clone()
    }

    pub fn vendor_logging_enabled(&self) -> bool {
        self.inner.lock().logging.as_ref().is_some_and(|l| l.enabled)
    }

    fn record<T>(&self, result: EngineResult<T>) -> EngineResult<T> {
        if let Err(code) = &result {
            self.inner.lock().last_error = *code;
        }
        result
    }

    fn require_initialised(&self) -> EngineResult<MutexGuard<'_, SimState>> {
        let st = self.inner.lock();
        if st.initialised {
            Ok(st)
        } else {
            Err(ErrorCode::NotInitialised)
        }
    }

    fn start_read(&self, require_enabled: bool) -> EngineResult<()> {
        let non_blocking = {
            let st = self.require_initialised()?;
            match st.reader_state {
                ReaderState::Enabled => {}
                ReaderState::Disabled | ReaderState::Asleep | ReaderState::Suspended
                    if !require_enabled => {}
                _ => return Err(ErrorCode::InvalidState),
            }
            if st.document.is_none() {
                return Err(ErrorCode::NoDocumentOnWindow);
            }
            st.callbacks.is_some()
        };
        if non_blocking {
            self.inner.spawn_read();
            Ok(())
        } else {
            self.inner.perform_read()
        }
    }
}

impl ReaderEngine for SimulatedEngine {
    fn backend_name(&self) -> &str {
        "simulated"
    }

    fn initialise(
        &self,
        callbacks: Option<Arc<dyn EngineCallbacks>>,
        process_messages: bool,
    ) -> EngineResult<()> {
        let (non_blocking, auto_read) = {
            let mut st = self.inner.lock();
            let refused = if st.initialised {
                Some(ErrorCode::AlreadyInitialised)
            } else if let Some(code) = st.fail_initialise.take() {
                Some(code)
            } else if st.scanners.is_empty() {
                Some(ErrorCode::NoScannerConnected)
            } else {
                None
            };
            if let Some(code) = refused {
                st.last_error = code;
                return Err(code);
            }
            if st.selected.is_none() {
                st.selected = st.scanners.first().cloned();
            }
            st.initialised = true;
            st.reader_state = ReaderState::Initialising;
            st.settings = st.saved_settings.clone();
            st.callbacks = callbacks;
            st.document_read = false;
            (st.callbacks.is_some(), st.callbacks.is_some() && st.document.is_some())
        };
        info!(
            backend = "simulated",
            non_blocking,
            process_messages,
            "engine initialised"
        );

        self.inner.emit(EventCode::SettingsInitialised);
        self.inner.emit(EventCode::PluginsInitialised);
        self.inner.set_reader_state(ReaderState::Enabled);

        if auto_read {
            self.inner.spawn_read();
        }
        Ok(())
    }

    fn shutdown(&self) -> EngineResult<()> {
        {
            let mut st = self.inner.lock();
            if !st.initialised {
                return Ok(());
            }
            st.reader_state = ReaderState::ShuttingDown;
        }
        self.inner.abort.store(true, Ordering::SeqCst);
        self.inner.join_workers();

        let mut st = self.inner.lock();
        st.initialised = false;
        st.reader_state = ReaderState::Uninitialised;
        st.callbacks = None;
        st.data.clear();
        st.plugin_data.clear();
        st.settings = st.saved_settings.clone();
        self.inner.abort.store(false, Ordering::SeqCst);
        info!(backend = "simulated", "engine shut down");
        Ok(())
    }

    fn is_initialised(&self) -> bool {
        self.inner.lock().initialised
    }

    fn state(&self) -> ReaderState {
        self.inner.lock().reader_state
    }

    fn set_state(&self, state: ReaderState, force_redetect: bool) -> EngineResult<()> {
        let result = (|| {
            let current = self.require_initialised()?.reader_state;
            if !state.is_settable() {
                return Err(ErrorCode::InvalidParameter);
            }
            if current == ReaderState::Errored {
                return Err(ErrorCode::InvalidState);
            }
            self.inner.set_reader_state(state);

            if state == ReaderState::Enabled {
                let redetect = {
                    let mut st = self.inner.lock();
                    let present = st.document.is_some() && st.callbacks.is_some();
                    let due = !st.document_read || force_redetect;
                    if force_redetect {
                        st.document_read = false;
                    }
                    present && due
                };
                if force_redetect {
                    self.inner.placed.notify_all();
                }
                if redetect {
                    debug!(backend = "simulated", force_redetect, "redetecting document");
                    self.inner.spawn_read();
                }
            }
            Ok(())
        })();
        self.record(result)
    }

    fn is_document_on_window(&self) -> EngineResult<bool> {
        let result = self.require_initialised().map(|st| st.document.is_some());
        self.record(result)
    }

    fn wait_for_document_on_window(&self, timeout_ms: u32) -> EngineResult<()> {
        let result = (|| {
            let st = self.require_initialised()?;
            let (st, _) = self
                .inner
                .placed
                .wait_timeout_while(st, Duration::from_millis(u64::from(timeout_ms)), |st| {
                    st.initialised && !st.has_unread_document()
                })
                .unwrap_or_else(PoisonError::into_inner);
            if st.has_unread_document() {
                Ok(())
            } else {
                Err(ErrorCode::TimedOut)
            }
        })();
        self.record(result)
    }

    fn read_document(&self) -> EngineResult<()> {
        let result = self.start_read(true);
        self.record(result)
    }

    fn force_read(&self) -> EngineResult<()> {
        let result = self.start_read(false);
        self.record(result)
    }

    fn clear_data(&self) -> EngineResult<()> {
        let result = self.require_initialised().map(|mut st| {
            st.data.clear();
            st.plugin_data.clear();
        });
        self.record(result)
    }

    fn rf_abort(&self) -> EngineResult<()> {
        self.inner.abort.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn get_data(&self, tag: Tag, buf: &mut [u8], len: &mut usize, index: usize) -> EngineResult<()> {
        let result = (|| {
            let st = self.require_initialised()?;
            let Tag::Data(data_type) = tag else {
                return Err(ErrorCode::InvalidParameter);
            };
            match st.data.get(&data_type).and_then(|values| values.get(index)) {
                Some(bytes) if st.truncate_short_buffers && !buf.is_empty() && buf.len() < bytes.len() => {
                    let fits = buf.len();
                    buf.copy_from_slice(&bytes[..fits]);
                    *len = bytes.len();
                    Err(ErrorCode::DataBufferTooSmall)
                }
                Some(bytes) => fill_buffer(bytes, buf, len, ErrorCode::DataBufferTooSmall),
                None => {
                    *len = 0;
                    Ok(())
                }
            }
        })();
        self.record(result)
    }

    fn get_data_count(&self, tag: Tag) -> EngineResult<usize> {
        let result = (|| {
            let st = self.require_initialised()?;
            let Tag::Data(data_type) = tag else {
                return Err(ErrorCode::InvalidParameter);
            };
            Ok(st.data.get(&data_type).map_or(0, Vec::len))
        })();
        self.record(result)
    }

    fn get_plugin_data(
        &self,
        plugin: &str,
        feature: usize,
        part: usize,
    ) -> EngineResult<Option<PluginData>> {
        let result = (|| {
            let st = self.require_initialised()?;
            if !st.plugins.iter().any(|p| p.name == plugin && p.loaded) {
                return Err(ErrorCode::PluginNotLoaded);
            }
            Ok(st
                .plugin_data
                .get(plugin)
                .and_then(|features| features.get(feature))
                .and_then(|parts| parts.get(part))
                .cloned())
        })();
        self.record(result)
    }

    fn plugin_name(&self, buf: &mut [u8], len: &mut usize, index: usize) -> EngineResult<()> {
        let result = (|| {
            let st = self.require_initialised()?;
            match st.plugins.get(index) {
                Some(plugin) => fill_buffer(
                    &c_string_bytes(&plugin.name),
                    buf,
                    len,
                    ErrorCode::StringBufferTooSmall,
                ),
                None => {
                    *len = 0;
                    Ok(())
                }
            }
        })();
        self.record(result)
    }

    fn enable_plugin(&self, plugin: &str, enabled: bool) -> EngineResult<()> {
        let result = (|| {
            let mut st = self.require_initialised()?;
            match st.plugins.iter_mut().find(|p| p.name == plugin) {
                Some(p) if p.loaded => {
                    p.enabled = enabled;
                    Ok(())
                }
                _ if !enabled => Ok(()),
                _ => Err(ErrorCode::PluginNotLoaded),
            }
        })();
        self.record(result)
    }

    fn is_plugin_enabled(&self, plugin: &str) -> EngineResult<bool> {
        let result = (|| {
            let st = self.require_initialised()?;
            st.plugins
                .iter()
                .find(|p| p.name == plugin)
                .map(|p| p.enabled)
                .ok_or(ErrorCode::PluginNotLoaded)
        })();
        self.record(result)
    }

    fn set_plugin_order(&self, plugin: &str, order: usize) -> EngineResult<()> {
        let result = (|| {
            let mut st = self.require_initialised()?;
            let from = st
                .plugins
                .iter()
                .position(|p| p.name == plugin)
                .ok_or(ErrorCode::PluginNotLoaded)?;
            let moved = st.plugins.remove(from);
            let to = order.min(st.plugins.len());
            st.plugins.insert(to, moved);
            Ok(())
        })();
        self.record(result)
    }

    fn get_settings(&self, buf: &mut [u8], size: &mut usize) -> EngineResult<()> {
        let result = (|| {
            let st = self.require_initialised()?;
            let blob = st.settings.encode();
            *size = blob.len();
            if buf.is_empty() {
                return Ok(());
            }
            if buf.len() != blob.len() {
                return Err(ErrorCode::StringBufferTooSmall);
            }
            buf.copy_from_slice(&blob);
            Ok(())
        })();
        self.record(result)
    }

    fn update_settings(&self, blob: &[u8]) -> EngineResult<()> {
        let result = (|| {
            let incoming = ReaderSettings::decode(blob).map_err(|e| match e {
                ReaderError::SettingsVersion { .. } => ErrorCode::MismatchInAnEnum,
                _ => ErrorCode::MismatchSettingSize,
            })?;

            let (previous, changed) = {
                let mut st = self.require_initialised()?;
                if st.settings == incoming {
                    return Ok(());
                }
                let changed = st.settings.changed_subsystems(&incoming);
                for subsystem in &changed {
                    *st.restarts.entry(*subsystem).or_default() += 1;
                }
                st.settings = incoming;
                (st.reader_state, changed)
            };

            // The engine sleeps while it applies settings, then restores the
            // state the reader was in.
            self.inner.set_reader_state(ReaderState::Asleep);
            for subsystem in &changed {
                info!(backend = "simulated", subsystem = %subsystem, "restarting subsystem");
            }
            self.inner.set_reader_state(previous);
            Ok(())
        })();
        self.record(result)
    }

    fn save_settings(&self) -> EngineResult<()> {
        let result = self.require_initialised().map(|mut st| {
            st.saved_settings = st.settings.clone();
        });
        self.record(result)
    }

    fn write_text_settings(&self, blob: &[u8], path: &Path) -> EngineResult<()> {
        let result = ReaderSettings::decode(blob)
            .map_err(|_| ErrorCode::MismatchSettingSize)
            .and_then(|settings| {
                std::fs::write(path, settings.to_ini()).map_err(|e| {
                    warn!(path = %path.display(), error = %e, "writing settings text failed");
                    ErrorCode::SettingsFile
                })
            });
        self.record(result)
    }

    fn connected_scanners(&self, buf: &mut [u8], len: &mut usize) -> EngineResult<()> {
        let joined = self.inner.lock().scanners.join(";");
        let result = fill_buffer(&c_string_bytes(&joined), buf, len, ErrorCode::StringBufferTooSmall);
        self.record(result)
    }

    fn select_scanner(&self, serial: &str) -> EngineResult<()> {
        let result = {
            let mut st = self.inner.lock();
            if st.scanners.iter().any(|s| s == serial) {
                st.selected = Some(serial.to_string());
                Ok(())
            } else {
                Err(ErrorCode::ScannerNotFound)
            }
        };
        self.record(result)
    }

    fn enable_logging(
        &self,
        enabled: bool,
        level: i32,
        mask: i32,
        file: Option<&Path>,
    ) -> EngineResult<()> {
        self.inner.lock().logging = Some(VendorLogging {
            enabled,
            level,
            mask,
            file: file.map(Path::to_path_buf),
        });
        Ok(())
    }

    fn last_error(&self) -> ErrorCode {
        self.inner.lock().last_error
    }

    fn error_message(&self, code: ErrorCode, buf: &mut [u8], len: &mut usize) -> EngineResult<()> {
        fill_buffer(&c_string_bytes(&code.to_string()), buf, len, ErrorCode::StringBufferTooSmall)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docreader_core::CertificateType;
    use std::time::Instant;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<EventCode>>,
        data: Mutex<Vec<(Tag, Vec<u8>)>>,
        plugin_parts: Mutex<Vec<PluginData>>,
        warnings: Mutex<Vec<ErrorCode>>,
        bac_threads: Mutex<Vec<Option<String>>>,
        bac_fix: Option<String>,
        certificate_requests: Mutex<Vec<(String, CertificateType)>>,
        /// Handed back for every certificate request.
        certificate: Option<Vec<u8>>,
    }

    impl Recorder {
        fn count(&self, event: EventCode) -> usize {
            self.events.lock().unwrap().iter().filter(|e| **e == event).count()
        }

        fn tags(&self) -> Vec<Tag> {
            self.data.lock().unwrap().iter().map(|(t, _)| *t).collect()
        }
    }

    impl EngineCallbacks for Recorder {
        fn on_data(&self, tag: Tag, data: &[u8]) {
            self.data.lock().unwrap().push((tag, data.to_vec()));
        }

        fn on_plugin_data(&self, _feature: PluginFeature, data: PluginData) {
            self.plugin_parts.lock().unwrap().push(data);
        }

        fn on_event(&self, event: EventCode) {
            self.events.lock().unwrap().push(event);
        }

        fn on_error(&self, _code: ErrorCode, _message: &str) {}

        fn on_warning(&self, code: ErrorCode, _message: &str) {
            self.warnings.lock().unwrap().push(code);
        }

        fn on_bac_key_correction(&self, mrz: &mut [u8]) {
            self.bac_threads
                .lock()
                .unwrap()
                .push(thread::current().name().map(str::to_string));
            if let Some(fix) = &self.bac_fix {
                mrz.fill(0);
                mrz[..fix.len()].copy_from_slice(fix.as_bytes());
            }
        }

        fn on_certificate(&self, identifier: &str, kind: CertificateType) -> Option<Vec<u8>> {
            self.certificate_requests
                .lock()
                .unwrap()
                .push((identifier.to_string(), kind));
            self.certificate.clone()
        }
    }

    fn wait_until(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "condition not reached");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn fetch(engine: &SimulatedEngine, tag: DataType, index: usize) -> Vec<u8> {
        let mut len = 0;
        engine.get_data(Tag::Data(tag), &mut [], &mut len, index).unwrap();
        let mut buf = vec![0u8; len];
        engine.get_data(Tag::Data(tag), &mut buf, &mut len, index).unwrap();
        buf
    }

    /// The sample passport with an OCR slip in the document number.
    fn misread_passport() -> DocumentFixture {
        let mut doc = DocumentFixture::sample_passport();
        doc.chip_mrz = Some(SAMPLE_TD3.into());
        doc.codeline = Some(SAMPLE_TD3.replacen("L898902C3", "L8989O2C3", 1));
        doc
    }

    fn with_bac_correction(engine: &SimulatedEngine) {
        let mut settings = engine.saved_settings();
        settings.rf.bac_key_correction = true;
        engine.inner.lock().saved_settings = settings;
    }

    #[test]
    fn blocking_read_then_two_phase_fetch() {
        let engine = SimulatedEngine::sample();
        engine.initialise(None, false).unwrap();

        let mut len = 99;
        engine.get_data(Tag::Data(DataType::Codeline), &mut [], &mut len, 0).unwrap();
        assert_eq!(len, 0, "nothing before a read");

        engine.read_document().unwrap();
        let codeline = fetch(&engine, DataType::Codeline, 0);
        assert_eq!(codeline, c_string_bytes(SAMPLE_TD3));
        assert_eq!(engine.get_data_count(Tag::Data(DataType::ReadProgress)).unwrap(), 2);
        assert_eq!(engine.read_count(), 1);
    }

    #[test]
    fn disabled_items_are_absent() {
        let engine = SimulatedEngine::new(EngineFixture {
            document: Some(DocumentFixture::sample_passport()),
            ..EngineFixture::default()
        });
        engine.initialise(None, false).unwrap();
        engine.read_document().unwrap();

        // Default settings do not send chip items.
        assert_eq!(engine.get_data_count(Tag::Data(DataType::ScDg1Codeline)).unwrap(), 0);
        assert_eq!(engine.get_data_count(Tag::Data(DataType::ImageVis)).unwrap(), 1);
    }

    #[test]
    fn plugin_tags_are_rejected() {
        let engine = SimulatedEngine::sample();
        engine.initialise(None, false).unwrap();
        let mut len = 0;
        let tag = Tag::Plugin(PluginFeature::from_feature_id(6));
        assert_eq!(engine.get_data(tag, &mut [], &mut len, 0), Err(ErrorCode::InvalidParameter));
        assert_eq!(engine.last_error(), ErrorCode::InvalidParameter);
    }

    #[test]
    fn calls_before_initialise_fail() {
        let engine = SimulatedEngine::sample();
        assert_eq!(engine.read_document(), Err(ErrorCode::NotInitialised));
        engine.initialise(None, false).unwrap();
        assert_eq!(engine.initialise(None, false), Err(ErrorCode::AlreadyInitialised));
    }

    #[test]
    fn read_without_document_fails() {
        let engine = SimulatedEngine::new(EngineFixture::default());
        engine.initialise(None, false).unwrap();
        assert_eq!(engine.read_document(), Err(ErrorCode::NoDocumentOnWindow));
        assert_eq!(engine.wait_for_document_on_window(20), Err(ErrorCode::TimedOut));
    }

    #[test]
    fn wait_ignores_a_document_already_read() {
        let engine = SimulatedEngine::sample();
        engine.initialise(None, false).unwrap();
        engine.wait_for_document_on_window(20).unwrap();
        engine.read_document().unwrap();

        assert!(engine.is_document_on_window().unwrap());
        assert_eq!(engine.wait_for_document_on_window(20), Err(ErrorCode::TimedOut));

        engine.remove_document();
        engine.place_document(DocumentFixture::sample_passport());
        engine.wait_for_document_on_window(20).unwrap();
    }

    #[test]
    fn wait_wakes_when_document_placed() {
        let engine = SimulatedEngine::new(EngineFixture::default());
        engine.initialise(None, false).unwrap();
        let placer = engine.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            placer.place_document(DocumentFixture::sample_passport());
        });
        engine.wait_for_document_on_window(5_000).unwrap();
        handle.join().unwrap();
        assert!(engine.is_document_on_window().unwrap());
    }

    #[test]
    fn non_blocking_pushes_items_and_plugin_records() {
        let engine = SimulatedEngine::sample();
        let recorder = Arc::new(Recorder::default());
        engine.initialise(Some(recorder.clone()), false).unwrap();

        wait_until(|| recorder.count(EventCode::EndOfDocumentData) == 1);
        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(events[0], EventCode::SettingsInitialised);
        assert_eq!(events[1], EventCode::PluginsInitialised);
        assert!(recorder.tags().contains(&Tag::Data(DataType::Codeline)));
        assert!(recorder.tags().contains(&Tag::Data(DataType::ScDg2Photo)));
        assert_eq!(recorder.plugin_parts.lock().unwrap().len(), 2);
    }

    #[test]
    fn redetect_only_when_forced() {
        let engine = SimulatedEngine::sample();
        let recorder = Arc::new(Recorder::default());
        engine.initialise(Some(recorder.clone()), false).unwrap();
        wait_until(|| engine.read_count() == 1);

        engine.set_state(ReaderState::Disabled, false).unwrap();
        engine.set_state(ReaderState::Enabled, false).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(engine.read_count(), 1);

        engine.set_state(ReaderState::Enabled, true).unwrap();
        wait_until(|| engine.read_count() == 2);
    }

    #[test]
    fn finished_readers_are_not_kept() {
        let engine = SimulatedEngine::sample();
        let recorder = Arc::new(Recorder::default());
        engine.initialise(Some(recorder.clone()), false).unwrap();
        wait_until(|| engine.read_count() == 1);

        for n in 2..=20 {
            engine.set_state(ReaderState::Enabled, true).unwrap();
            wait_until(|| engine.read_count() == n);
        }
        // Only readers still unwinding after their final event remain.
        assert!(relock(&engine.inner.workers).len() <= 3);
        engine.shutdown().unwrap();
        assert!(relock(&engine.inner.workers).is_empty());
    }

    #[test]
    fn only_settable_states_accepted() {
        let engine = SimulatedEngine::sample();
        engine.initialise(None, false).unwrap();
        assert_eq!(
            engine.set_state(ReaderState::ShuttingDown, false),
            Err(ErrorCode::InvalidParameter)
        );
        engine.set_state(ReaderState::Suspended, false).unwrap();
        assert_eq!(engine.state(), ReaderState::Suspended);
        assert_eq!(engine.read_document(), Err(ErrorCode::InvalidState));
        engine.force_read().unwrap();
    }

    #[test]
    fn bac_correction_runs_on_its_own_thread() {
        let engine = SimulatedEngine::new(EngineFixture {
            document: Some(misread_passport()),
            settings: EngineFixture::sample().settings,
            ..EngineFixture::default()
        });
        with_bac_correction(&engine);
        let recorder = Arc::new(Recorder {
            bac_fix: Some(SAMPLE_TD3.into()),
            ..Recorder::default()
        });
        engine.initialise(Some(recorder.clone()), false).unwrap();
        wait_until(|| recorder.count(EventCode::EndOfDocumentData) == 1);

        assert_eq!(
            recorder.bac_threads.lock().unwrap().as_slice(),
            &[Some("sim-bac".to_string())]
        );
        let status = fetch(&engine, DataType::ScBacStatus, 0);
        assert_eq!(status, TriState::True.raw().to_le_bytes());
        assert!(recorder.tags().contains(&Tag::Data(DataType::ScDg1Codeline)));
    }

    fn passport_needing_certificates() -> DocumentFixture {
        let mut doc = DocumentFixture::sample_passport();
        doc.certificates = vec![
            CertificateRequest {
                identifier: "UTO-DS-0042".into(),
                kind: CertificateType::DocSigner,
            },
            CertificateRequest {
                identifier: "UTO-CSCA-01".into(),
                kind: CertificateType::CountrySigner,
            },
        ];
        doc
    }

    #[test]
    fn certificates_requested_after_bac() {
        let engine = SimulatedEngine::new(EngineFixture {
            document: Some(passport_needing_certificates()),
            settings: EngineFixture::sample().settings,
            ..EngineFixture::default()
        });
        let recorder = Arc::new(Recorder {
            certificate: Some(vec![0x30, 0x82, 0x01, 0x0a]),
            ..Recorder::default()
        });
        engine.initialise(Some(recorder.clone()), false).unwrap();
        wait_until(|| recorder.count(EventCode::EndOfDocumentData) == 1);

        assert_eq!(
            recorder.certificate_requests.lock().unwrap().as_slice(),
            &[
                ("UTO-DS-0042".to_string(), CertificateType::DocSigner),
                ("UTO-CSCA-01".to_string(), CertificateType::CountrySigner),
            ]
        );
        assert_eq!(engine.certificates_supplied(), vec!["UTO-DS-0042", "UTO-CSCA-01"]);
        assert!(recorder.tags().contains(&Tag::Data(DataType::ScDg1Codeline)));
    }

    #[test]
    fn declined_certificates_do_not_stop_the_chip_read() {
        let engine = SimulatedEngine::new(EngineFixture {
            document: Some(passport_needing_certificates()),
            settings: EngineFixture::sample().settings,
            ..EngineFixture::default()
        });
        let recorder = Arc::new(Recorder::default());
        engine.initialise(Some(recorder.clone()), false).unwrap();
        wait_until(|| recorder.count(EventCode::EndOfDocumentData) == 1);

        assert_eq!(recorder.certificate_requests.lock().unwrap().len(), 2);
        assert!(engine.certificates_supplied().is_empty());
        assert!(recorder.tags().contains(&Tag::Data(DataType::ScDg1Codeline)));
    }

    #[test]
    fn uncorrected_misread_locks_the_chip() {
        let engine = SimulatedEngine::new(EngineFixture {
            document: Some(misread_passport()),
            settings: EngineFixture::sample().settings,
            ..EngineFixture::default()
        });
        let recorder = Arc::new(Recorder::default());
        engine.initialise(Some(recorder.clone()), false).unwrap();
        wait_until(|| recorder.count(EventCode::EndOfDocumentData) == 1);

        assert!(recorder.bac_threads.lock().unwrap().is_empty());
        assert_eq!(recorder.warnings.lock().unwrap().as_slice(), &[ErrorCode::ReadFailed]);
        assert_eq!(engine.get_data_count(Tag::Data(DataType::ScDg1Codeline)).unwrap(), 0);
        let status = fetch(&engine, DataType::ScBacStatus, 0);
        assert_eq!(status, TriState::False.raw().to_le_bytes());
    }

    #[test]
    fn settings_blob_size_guard() {
        let engine = SimulatedEngine::sample();
        engine.initialise(None, false).unwrap();

        let mut size = 0;
        engine.get_settings(&mut [], &mut size).unwrap();
        assert_eq!(size, ReaderSettings::BLOB_LEN);

        let mut short = vec![0u8; size - 1];
        assert_eq!(
            engine.get_settings(&mut short, &mut size),
            Err(ErrorCode::StringBufferTooSmall)
        );
        assert_eq!(size, ReaderSettings::BLOB_LEN);

        assert_eq!(engine.update_settings(&short), Err(ErrorCode::MismatchSettingSize));
    }

    #[test]
    fn unchanged_commit_restarts_nothing() {
        let engine = SimulatedEngine::sample();
        let recorder = Arc::new(Recorder::default());
        engine.initialise(Some(recorder.clone()), false).unwrap();
        wait_until(|| engine.read_count() == 1);
        let changes = recorder.count(EventCode::ReaderStateChanged);

        let mut size = ReaderSettings::BLOB_LEN;
        let mut blob = vec![0u8; size];
        engine.get_settings(&mut blob, &mut size).unwrap();
        engine.update_settings(&blob).unwrap();

        assert_eq!(recorder.count(EventCode::ReaderStateChanged), changes);
        assert_eq!(engine.restart_count(Subsystem::Rf), 0);
        assert_eq!(engine.state(), ReaderState::Enabled);
    }

    #[test]
    fn rf_change_restarts_rf_and_restores_state() {
        let engine = SimulatedEngine::sample();
        engine.initialise(None, false).unwrap();
        engine.set_state(ReaderState::Disabled, false).unwrap();

        let mut settings = engine.saved_settings();
        settings.rf.chip_read_timeout_ms = 9_000;
        engine.update_settings(&settings.encode()).unwrap();

        assert_eq!(engine.restart_count(Subsystem::Rf), 1);
        assert_eq!(engine.restart_count(Subsystem::Swipe), 0);
        assert_eq!(engine.state(), ReaderState::Disabled);
    }

    #[test]
    fn unsaved_settings_are_discarded_at_shutdown() {
        let engine = SimulatedEngine::sample();
        engine.initialise(None, false).unwrap();
        let mut settings = engine.saved_settings();
        settings.uhf.enabled = true;
        engine.update_settings(&settings.encode()).unwrap();
        engine.shutdown().unwrap();
        engine.initialise(None, false).unwrap();
        assert!(!engine.saved_settings().uhf.enabled);

        engine.update_settings(&settings.encode()).unwrap();
        engine.save_settings().unwrap();
        assert!(engine.saved_settings().uhf.enabled);
    }

    #[test]
    fn plugin_enable_rules() {
        let engine = SimulatedEngine::sample();
        engine.initialise(None, false).unwrap();

        assert_eq!(engine.enable_plugin("CHNVisas", true), Err(ErrorCode::PluginNotLoaded));
        engine.enable_plugin("CHNVisas", false).unwrap();
        engine.enable_plugin("NoSuchPlugin", false).unwrap();

        engine.enable_plugin("QRCode", false).unwrap();
        assert!(!engine.is_plugin_enabled("QRCode").unwrap());

        engine.set_plugin_order("QRCode", 0).unwrap();
        let mut len = 0;
        engine.plugin_name(&mut [], &mut len, 0).unwrap();
        let mut name = vec![0u8; len];
        engine.plugin_name(&mut name, &mut len, 0).unwrap();
        assert_eq!(name, b"QRCode\0");

        let mut short = [0u8; 2];
        assert_eq!(
            engine.plugin_name(&mut short, &mut len, 1),
            Err(ErrorCode::StringBufferTooSmall)
        );
        assert_eq!(len, b"PDF417\0".len());

        engine.plugin_name(&mut [], &mut len, 3).unwrap();
        assert_eq!(len, 0);
    }

    #[test]
    fn plugin_records_by_feature_and_part() {
        let engine = SimulatedEngine::sample();
        engine.initialise(None, false).unwrap();
        engine.read_document().unwrap();

        let first = engine.get_plugin_data("PDF417", 0, 0).unwrap().unwrap();
        assert_eq!(first.field_name, "Data");
        assert!(engine.get_plugin_data("PDF417", 0, 2).unwrap().is_none());
        assert!(engine.get_plugin_data("PDF417", 1, 0).unwrap().is_none());
        assert_eq!(
            engine.get_plugin_data("CHNVisas", 0, 0),
            Err(ErrorCode::PluginNotLoaded)
        );
    }

    #[test]
    fn fault_recovers_after_delay() {
        let engine = SimulatedEngine::sample();
        engine.initialise(None, false).unwrap();
        engine.inject_fault(Some(Duration::from_millis(20)));
        assert_eq!(engine.state(), ReaderState::Errored);
        assert_eq!(
            engine.set_state(ReaderState::Enabled, false),
            Err(ErrorCode::InvalidState)
        );
        wait_until(|| engine.state() == ReaderState::Enabled);
    }

    #[test]
    fn scanners_and_selection() {
        let engine = SimulatedEngine::sample();
        let mut len = 0;
        engine.connected_scanners(&mut [], &mut len).unwrap();
        let mut buf = vec![0u8; len];
        engine.connected_scanners(&mut buf, &mut len).unwrap();
        assert_eq!(buf, b"SIM-4711;SIM-4712\0");

        assert_eq!(engine.select_scanner("SIM-9999"), Err(ErrorCode::ScannerNotFound));
        engine.select_scanner("SIM-4712").unwrap();
        engine.initialise(None, false).unwrap();
        assert_eq!(engine.selected_scanner().as_deref(), Some("SIM-4712"));
    }

    #[test]
    fn injected_initialise_failure_is_one_shot() {
        let engine = SimulatedEngine::sample();
        engine.fail_initialise_with(ErrorCode::MismatchInAnEnum);
        assert_eq!(engine.initialise(None, false), Err(ErrorCode::MismatchInAnEnum));
        engine.initialise(None, false).unwrap();
    }

    #[test]
    fn text_settings_written_to_disk() {
        let engine = SimulatedEngine::sample();
        engine.initialise(None, false).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.ini");
        engine
            .write_text_settings(&engine.saved_settings().encode(), &path)
            .unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("CD_CODELINE"));
    }
}
