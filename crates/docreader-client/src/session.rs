// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Reader session: one initialised engine and everything hanging off it.
//
// Engine calls block, so the async surface runs them on tokio's blocking
// pool. Lifecycle changes (shutdown, reset) and reads are serialised behind
// one async mutex; `rf_abort` deliberately skips it so it can interrupt.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use docreader_core::config::{LoggingConfig, ReaderConfig};
use docreader_core::{
    DataValue, DeliveryMode, EngineResult, ErrorCode, EventCode, PluginFeature, ReaderError,
    ReaderState, Result, Tag,
};
use docreader_engine::{EngineCallbacks, ReaderEngine, engine_from_config};

use crate::accessor::Accessor;
use crate::bac::BacCorrector;
use crate::certificates::{CertificateDir, CertificateProvider};
use crate::delivery::{ChannelSink, DocumentRead, EventStream, ReaderEvent};
use crate::plugins::PluginRegistry;
use crate::retry::{RetryConfig, RetryDecision, should_retry};
use crate::settings::{SettingsTransaction, fetch_settings};

/// Longest single engine wait; longer waits are issued in slices so a
/// shutdown never queues behind one.
const WAIT_SLICE: Duration = Duration::from_secs(1);

const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Session {
    engine: Arc<dyn ReaderEngine>,
    mode: DeliveryMode,
    process_messages: bool,
    sink: Option<Arc<ChannelSink>>,
    events: Mutex<Option<EventStream>>,
    lifecycle: Arc<tokio::sync::Mutex<()>>,
    retry: RetryConfig,
    wait_timeout: Duration,
}

fn initialise_error(code: ErrorCode) -> ReaderError {
    match code {
        ErrorCode::MismatchInAnEnum | ErrorCode::MismatchSettingSize => {
            ReaderError::VersionSkew(code)
        }
        code => ReaderError::engine(code, "Initialise"),
    }
}

fn join_error(e: tokio::task::JoinError) -> ReaderError {
    ReaderError::Io(std::io::Error::other(e))
}

/// Probe, allocate and fetch a NUL-terminated string, regrowing once.
fn fetch_string<F>(mut call: F, context: &str) -> Result<String>
where
    F: FnMut(&mut [u8], &mut usize) -> EngineResult<()>,
{
    let mut len = 0;
    call(&mut [], &mut len).map_err(|code| ReaderError::engine(code, context))?;
    let mut regrown = false;
    loop {
        if len == 0 {
            return Ok(String::new());
        }
        let mut buf = vec![0u8; len];
        match call(&mut buf, &mut len) {
            Ok(()) => {
                let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
                return Ok(String::from_utf8_lossy(&buf[..end]).into_owned());
            }
            Err(ErrorCode::StringBufferTooSmall) if !regrown => regrown = true,
            Err(code) => return Err(ReaderError::engine(code, context)),
        }
    }
}

/// Pull every enabled item and plugin record after a Blocking read.
fn pull_document(engine: Arc<dyn ReaderEngine>, mut read: DocumentRead) -> Result<DocumentRead> {
    let settings = fetch_settings(engine.as_ref())?;
    let accessor = Accessor::new(Arc::clone(&engine));
    for &data_type in &settings.data_to_send {
        match accessor.get_all(data_type) {
            Ok(values) => {
                for value in values {
                    read.push(Tag::Data(data_type), value);
                }
            }
            Err(e @ (ReaderError::Decode { .. } | ReaderError::InvalidCodeline(_))) => {
                warn!(tag = %data_type, error = %e, "undecodable data item");
                read.warnings.push(e.to_string());
            }
            Err(e) => return Err(e),
        }
    }

    for record in PluginRegistry::new(engine).all_records()? {
        let feature = PluginFeature::from_feature_id(record.data.feature_type_id);
        read.push(Tag::Plugin(feature), DataValue::Plugin(record.data));
    }
    Ok(read.finish())
}

/// Hands the event stream back to the session when a collection ends.
struct BorrowedStream<'a> {
    slot: &'a Mutex<Option<EventStream>>,
    stream: Option<EventStream>,
}

impl<'a> BorrowedStream<'a> {
    fn take(slot: &'a Mutex<Option<EventStream>>) -> Result<Self> {
        let stream = slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(ReaderError::EventStreamTaken)?;
        Ok(Self {
            slot,
            stream: Some(stream),
        })
    }

    async fn recv(&mut self) -> Option<ReaderEvent> {
        match self.stream.as_mut() {
            Some(stream) => stream.recv().await,
            None => None,
        }
    }
}

impl Drop for BorrowedStream<'_> {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(stream);
        }
    }
}

impl Session {
    /// Initialise `engine` in `mode`. A corrector only takes effect in
    /// Non-Blocking mode, where the engine can call back.
    pub fn initialise(
        engine: Arc<dyn ReaderEngine>,
        mode: DeliveryMode,
        corrector: Option<Arc<dyn BacCorrector>>,
    ) -> Result<Self> {
        Self::start(engine, mode, corrector, None, false)
    }

    fn start(
        engine: Arc<dyn ReaderEngine>,
        mode: DeliveryMode,
        corrector: Option<Arc<dyn BacCorrector>>,
        certificates: Option<Arc<dyn CertificateProvider>>,
        process_messages: bool,
    ) -> Result<Self> {
        let (sink, events) = match mode {
            DeliveryMode::Blocking => {
                if corrector.is_some() {
                    warn!("BAC key correction needs Non-Blocking delivery; corrector ignored");
                }
                if certificates.is_some() {
                    warn!("certificate requests need Non-Blocking delivery; certificate store ignored");
                }
                (None, None)
            }
            DeliveryMode::NonBlocking => {
                let (sink, events) = ChannelSink::channel_with_certificates(corrector, certificates);
                (Some(sink), Some(events))
            }
        };

        let callbacks = sink.clone().map(|s| s as Arc<dyn EngineCallbacks>);
        engine
            .initialise(callbacks, process_messages)
            .map_err(initialise_error)?;
        info!(
            backend = engine.backend_name(),
            mode = ?mode,
            state = %engine.state(),
            "session initialised"
        );

        Ok(Self {
            engine,
            mode,
            process_messages,
            sink,
            events: Mutex::new(events),
            lifecycle: Arc::new(tokio::sync::Mutex::new(())),
            retry: RetryConfig::default(),
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        })
    }

    /// Build the configured backend and initialise it.
    pub fn from_config(
        config: &ReaderConfig,
        corrector: Option<Arc<dyn BacCorrector>>,
    ) -> Result<Self> {
        let engine = engine_from_config(&config.backend)?;
        Self::with_engine(engine, config, corrector)
    }

    /// Initialise an already built engine with the rest of `config`.
    pub fn with_engine(
        engine: Arc<dyn ReaderEngine>,
        config: &ReaderConfig,
        corrector: Option<Arc<dyn BacCorrector>>,
    ) -> Result<Self> {
        if config.vendor_logging.enabled {
            apply_logging(engine.as_ref(), &config.vendor_logging)?;
        }
        let certificates = config
            .certificate_dir
            .as_ref()
            .map(|dir| Arc::new(CertificateDir::new(dir)) as Arc<dyn CertificateProvider>);
        let mut session = Self::start(
            engine,
            config.delivery,
            corrector,
            certificates,
            config.process_messages,
        )?;
        session.retry = RetryConfig::from(&config.retry);
        session.wait_timeout = Duration::from_millis(config.wait_timeout_ms);
        if !config.plugins.is_empty() {
            session.plugins().apply_order(&config.plugins)?;
        }
        Ok(session)
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    pub fn backend_name(&self) -> &str {
        self.engine.backend_name()
    }

    pub fn engine(&self) -> &Arc<dyn ReaderEngine> {
        &self.engine
    }

    /// Take the event stream. Only Non-Blocking sessions have one, and only
    /// one taker gets it.
    pub fn events(&self) -> Option<EventStream> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn accessor(&self) -> Accessor {
        Accessor::new(Arc::clone(&self.engine))
    }

    pub fn plugins(&self) -> PluginRegistry {
        PluginRegistry::new(Arc::clone(&self.engine))
    }

    pub fn settings(&self) -> Result<SettingsTransaction> {
        SettingsTransaction::begin(Arc::clone(&self.engine))
    }

    // -- State ---------------------------------------------------------------

    pub fn state(&self) -> ReaderState {
        self.engine.state()
    }

    /// Request a settable state. With `force_redetect`, entering Enabled reads
    /// the document on the window again even if it was already read.
    #[instrument(skip(self), fields(backend = self.engine.backend_name()))]
    pub fn set_state(&self, state: ReaderState, force_redetect: bool) -> Result<()> {
        self.engine
            .set_state(state, force_redetect)
            .map_err(|code| match code {
                ErrorCode::InvalidState => ReaderError::InvalidState(self.engine.state()),
                code => ReaderError::engine(code, "SetState"),
            })?;
        info!(state = %state, "reader state set");
        Ok(())
    }

    /// Tear the engine down. Safe to call more than once.
    pub async fn shutdown(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.call("Shutdown", |engine| engine.shutdown()).await?;
        info!(backend = self.engine.backend_name(), "session shut down");
        Ok(())
    }

    /// Shutdown followed by Initialise, with nothing else in between.
    pub async fn reset(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        let engine = Arc::clone(&self.engine);
        let callbacks = self.sink.clone().map(|s| s as Arc<dyn EngineCallbacks>);
        let process_messages = self.process_messages;
        tokio::task::spawn_blocking(move || {
            engine
                .shutdown()
                .map_err(|code| ReaderError::engine(code, "Shutdown"))?;
            engine
                .initialise(callbacks, process_messages)
                .map_err(initialise_error)
        })
        .await
        .map_err(join_error)??;
        info!(backend = self.engine.backend_name(), "session reset");
        Ok(())
    }

    /// Reset an errored reader, retrying transient failures. Returns whether
    /// a reset was needed.
    pub async fn recover_if_errored(&self) -> Result<bool> {
        if self.state() != ReaderState::Errored {
            return Ok(false);
        }
        warn!(backend = self.engine.backend_name(), "reader errored, resetting");
        let mut attempt = 0;
        loop {
            let err = match self.reset().await {
                Ok(()) if self.state() != ReaderState::Errored => {
                    info!(attempt, "reader recovered");
                    return Ok(true);
                }
                Ok(()) => ReaderError::InvalidState(ReaderState::Errored),
                Err(e) => e,
            };
            match should_retry(&err, attempt, &self.retry) {
                RetryDecision::RetryAfter(delay) => {
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp(_) | RetryDecision::Exhausted => return Err(err),
            }
        }
    }

    // -- Document flow -------------------------------------------------------

    async fn call<T, F>(&self, context: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&dyn ReaderEngine) -> EngineResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || f(engine.as_ref()))
            .await
            .map_err(join_error)?
            .map_err(|code| ReaderError::engine(code, context))
    }

    pub fn is_document_on_window(&self) -> Result<bool> {
        self.engine
            .is_document_on_window()
            .map_err(|code| ReaderError::engine(code, "IsDocumentOnWindow"))
    }

    /// Wait until a document is on the window or `timeout` passes. Engine
    /// timeouts inside the window are expected; other transient errors are
    /// retried with backoff.
    #[instrument(skip(self), fields(backend = self.engine.backend_name()))]
    pub async fn wait_for_document(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut attempt = 0;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ReaderError::Timeout("document on window".into()));
            }
            let slice_ms = remaining.min(WAIT_SLICE).as_millis() as u32;
            let result = {
                let _lifecycle = self.lifecycle.lock().await;
                self.call("WaitForDocumentOnWindow", move |engine| {
                    engine.wait_for_document_on_window(slice_ms)
                })
                .await
            };
            let err = match result {
                Ok(()) => {
                    debug!("document on window");
                    return Ok(());
                }
                Err(e) if e.code() == Some(ErrorCode::TimedOut) => continue,
                Err(e) => e,
            };
            match should_retry(&err, attempt, &self.retry) {
                RetryDecision::RetryAfter(delay) => {
                    attempt += 1;
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    tokio::time::sleep(delay.min(remaining)).await;
                }
                RetryDecision::GiveUp(_) | RetryDecision::Exhausted => return Err(err),
            }
        }
    }

    /// Blocking mode: returns once all data is ready to pull. Non-Blocking
    /// mode: returns at once and the data arrives as events.
    pub async fn read_document(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.call("ReadDocument", |engine| engine.read_document()).await
    }

    /// Read even when the reader is not Enabled.
    pub async fn force_read(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.call("ForceRead", |engine| engine.force_read()).await
    }

    pub fn clear_data(&self) -> Result<()> {
        self.engine
            .clear_data()
            .map_err(|code| ReaderError::engine(code, "ClearData"))
    }

    /// Best-effort cancel of a chip read in progress.
    pub fn rf_abort(&self) -> Result<()> {
        info!(backend = self.engine.backend_name(), "aborting chip read");
        self.engine
            .rf_abort()
            .map_err(|code| ReaderError::engine(code, "RFAbort"))
    }

    /// Wait for the next document and return everything read from it.
    #[instrument(skip(self), fields(backend = self.engine.backend_name(), mode = ?self.mode))]
    pub async fn next_document(&self) -> Result<DocumentRead> {
        let read = match self.mode {
            DeliveryMode::Blocking => self.next_pulled().await?,
            DeliveryMode::NonBlocking => self.next_pushed().await?,
        };
        info!(
            read_id = %read.id,
            items = read.items.len(),
            warnings = read.warnings.len(),
            "document read"
        );
        Ok(read)
    }

    async fn next_pulled(&self) -> Result<DocumentRead> {
        self.wait_for_document(self.wait_timeout).await?;
        let _lifecycle = self.lifecycle.lock().await;
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || {
            let read = DocumentRead::begin();
            engine
                .read_document()
                .map_err(|code| ReaderError::engine(code, "ReadDocument"))?;
            pull_document(engine, read)
        })
        .await
        .map_err(join_error)?
    }

    async fn next_pushed(&self) -> Result<DocumentRead> {
        let mut stream = BorrowedStream::take(&self.events)?;
        let collect = async {
            let mut read: Option<DocumentRead> = None;
            while let Some(event) = stream.recv().await {
                if let ReaderEvent::Event {
                    event: EventCode::StartOfDocumentData,
                } = event
                {
                    read = Some(DocumentRead::begin());
                    continue;
                }
                match read.as_mut() {
                    Some(current) => {
                        if current.absorb(event) {
                            return read
                                .take()
                                .map(DocumentRead::finish)
                                .ok_or(ReaderError::NotInitialised);
                        }
                    }
                    None => match event {
                        ReaderEvent::Error { code, message } => {
                            warn!(code = %code, message = %message, "engine error outside a read");
                        }
                        event => debug!(event = ?event, "event outside a read"),
                    },
                }
            }
            Err(ReaderError::NotInitialised)
        };
        tokio::time::timeout(self.wait_timeout, collect)
            .await
            .map_err(|_| ReaderError::Timeout("end of document data".into()))?
    }

    // -- Scanners and diagnostics -------------------------------------------

    /// Serial numbers of the connected readers.
    pub fn scanners(&self) -> Result<Vec<String>> {
        let joined = fetch_string(
            |buf, len| self.engine.connected_scanners(buf, len),
            "GetConnectedScanners",
        )?;
        Ok(joined
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Choose the reader this process drives. Only one is selected at a time.
    pub fn select_scanner(&self, serial: &str) -> Result<()> {
        self.engine
            .select_scanner(serial)
            .map_err(|code| ReaderError::engine(code, format!("SelectScanner({serial})")))?;
        info!(serial, "scanner selected");
        Ok(())
    }

    pub fn error_message(&self, code: ErrorCode) -> Result<String> {
        fetch_string(
            |buf, len| self.engine.error_message(code, buf, len),
            "GetErrorMessage",
        )
    }

    pub fn last_error(&self) -> ErrorCode {
        self.engine.last_error()
    }

    pub fn enable_logging(&self, logging: &LoggingConfig) -> Result<()> {
        apply_logging(self.engine.as_ref(), logging)
    }
}

fn apply_logging(engine: &dyn ReaderEngine, logging: &LoggingConfig) -> Result<()> {
    engine
        .enable_logging(
            logging.enabled,
            logging.level,
            logging.mask,
            logging.file.as_deref(),
        )
        .map_err(|code| ReaderError::engine(code, "EnableLogging"))?;
    debug!(enabled = logging.enabled, level = logging.level, "vendor logging configured");
    Ok(())
}

/// Synchronous front for callers without a runtime of their own.
pub struct BlockingSession {
    session: Session,
    runtime: tokio::runtime::Runtime,
}

impl BlockingSession {
    pub fn new(session: Session) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self { session, runtime })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn next_document(&self) -> Result<DocumentRead> {
        self.runtime.block_on(self.session.next_document())
    }

    pub fn wait_for_document(&self, timeout: Duration) -> Result<()> {
        self.runtime.block_on(self.session.wait_for_document(timeout))
    }

    pub fn read_document(&self) -> Result<()> {
        self.runtime.block_on(self.session.read_document())
    }

    pub fn force_read(&self) -> Result<()> {
        self.runtime.block_on(self.session.force_read())
    }

    pub fn reset(&self) -> Result<()> {
        self.runtime.block_on(self.session.reset())
    }

    pub fn recover_if_errored(&self) -> Result<bool> {
        self.runtime.block_on(self.session.recover_if_errored())
    }

    pub fn shutdown(&self) -> Result<()> {
        self.runtime.block_on(self.session.shutdown())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bac::{MrzLines, MrzParts};
    use docreader_core::{CertificateType, DataType};
    use docreader_engine::SimulatedEngine;
    use docreader_engine::sim::{CertificateRequest, DocumentFixture, EngineFixture, SAMPLE_TD3};

    fn quick_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 5,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        }
    }

    fn blocking(engine: &SimulatedEngine) -> Session {
        Session::initialise(Arc::new(engine.clone()), DeliveryMode::Blocking, None)
            .unwrap()
            .with_retry(quick_retry())
            .with_wait_timeout(Duration::from_secs(2))
    }

    fn non_blocking(engine: &SimulatedEngine, corrector: Option<Arc<dyn BacCorrector>>) -> Session {
        Session::initialise(Arc::new(engine.clone()), DeliveryMode::NonBlocking, corrector)
            .unwrap()
            .with_retry(quick_retry())
            .with_wait_timeout(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn blocking_read_pulls_every_enabled_item() {
        let engine = SimulatedEngine::sample();
        let session = blocking(&engine);
        assert!(session.events().is_none());

        let read = session.next_document().await.unwrap();
        assert_eq!(read.codeline().unwrap().as_str(), SAMPLE_TD3);
        assert_eq!(read.values(DataType::ReadProgress).count(), 2);
        assert!(read.first(DataType::ScChipId).is_some());
        assert!(read.first(PluginFeature::Pdf417).is_some());
        assert_eq!(read.codeline_data().unwrap().unwrap().surname, "ERIKSSON");
        assert_eq!(engine.read_count(), 1);
    }

    #[tokio::test]
    async fn blocking_does_not_reread_a_document_left_on_the_window() {
        let engine = SimulatedEngine::sample();
        let session = blocking(&engine).with_wait_timeout(Duration::from_millis(300));

        session.next_document().await.unwrap();
        let second = session.next_document().await;
        assert!(matches!(second, Err(ReaderError::Timeout(_))));
        assert_eq!(engine.read_count(), 1);

        engine.remove_document();
        engine.place_document(DocumentFixture::sample_passport());
        session.next_document().await.unwrap();
        assert_eq!(engine.read_count(), 2);
    }

    #[tokio::test]
    async fn non_blocking_collects_until_end_of_data() {
        let engine = SimulatedEngine::sample();
        let session = non_blocking(&engine, None);

        let read = session.next_document().await.unwrap();
        assert_eq!(read.codeline().unwrap().as_str(), SAMPLE_TD3);
        assert!(read.first(PluginFeature::Pdf417).is_some());
        assert!(read.first(DataType::ScDg2Photo).is_some());

        // The stream is handed back for the next document.
        assert!(session.events().is_some());
        assert!(matches!(
            session.next_document().await,
            Err(ReaderError::EventStreamTaken)
        ));
    }

    fn fix_document_number(mrz: MrzParts<'_>) -> Option<MrzLines> {
        let mut lines = mrz.to_lines();
        lines.remainder = lines.remainder.replacen("L8989O2C3", "L898902C3", 1);
        Some(lines)
    }

    #[tokio::test]
    async fn corrector_repairs_bac_key() {
        let mut fixture = EngineFixture::sample();
        let mut document = DocumentFixture::sample_passport();
        document.chip_mrz = Some(SAMPLE_TD3.into());
        document.codeline = Some(SAMPLE_TD3.replacen("L898902C3", "L8989O2C3", 1));
        fixture.document = Some(document);
        if let Some(settings) = fixture.settings.as_mut() {
            settings.rf.bac_key_correction = true;
        }
        let engine = SimulatedEngine::new(fixture);

        let corrector: Arc<dyn BacCorrector> = Arc::new(fix_document_number);
        let session = non_blocking(&engine, Some(corrector));

        let read = session.next_document().await.unwrap();
        let (original, corrected) = read.bac_correction.clone().unwrap();
        assert_ne!(original, corrected);
        assert_eq!(corrected, SAMPLE_TD3);
        assert!(read.first(DataType::ScDg1Codeline).is_some());
        assert!(read.warnings.is_empty());
    }

    #[tokio::test]
    async fn wait_times_out_without_document() {
        let engine = SimulatedEngine::new(EngineFixture::default());
        let session = blocking(&engine);
        let err = session
            .wait_for_document(Duration::from_millis(150))
            .await
            .unwrap_err();
        assert!(matches!(err, ReaderError::Timeout(_)));
    }

    #[tokio::test]
    async fn wait_sees_a_late_document() {
        let engine = SimulatedEngine::new(EngineFixture::default());
        let session = blocking(&engine);
        let placer = engine.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            placer.place_document(DocumentFixture::sample_passport());
        });
        session.wait_for_document(Duration::from_secs(2)).await.unwrap();
        assert!(session.is_document_on_window().unwrap());
    }

    #[tokio::test]
    async fn errored_reader_is_reset() {
        let engine = SimulatedEngine::sample();
        let session = blocking(&engine);
        assert!(!session.recover_if_errored().await.unwrap());

        engine.inject_fault(None);
        assert_eq!(session.state(), ReaderState::Errored);
        let err = session.set_state(ReaderState::Disabled, false).unwrap_err();
        assert!(matches!(err, ReaderError::InvalidState(ReaderState::Errored)));

        assert!(session.recover_if_errored().await.unwrap());
        assert_eq!(session.state(), ReaderState::Enabled);
    }

    #[tokio::test]
    async fn reset_keeps_the_event_stream() {
        let engine = SimulatedEngine::sample();
        let session = non_blocking(&engine, None);
        session.next_document().await.unwrap();
        session.reset().await.unwrap();
        // Initialise reads the document on the window again.
        let read = session.next_document().await.unwrap();
        assert!(read.codeline().is_some());
        assert_eq!(engine.read_count(), 2);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let engine = SimulatedEngine::sample();
        let session = blocking(&engine);
        session.shutdown().await.unwrap();
        session.shutdown().await.unwrap();
        assert_eq!(session.state(), ReaderState::Uninitialised);
        let err = session.read_document().await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::NotInitialised));
    }

    #[test]
    fn version_skew_on_initialise() {
        let engine = SimulatedEngine::sample();
        engine.fail_initialise_with(ErrorCode::MismatchSettingSize);
        let err = Session::initialise(Arc::new(engine), DeliveryMode::Blocking, None)
            .err()
            .unwrap();
        assert!(matches!(err, ReaderError::VersionSkew(ErrorCode::MismatchSettingSize)));
    }

    #[test]
    fn scanners_and_messages() {
        let engine = SimulatedEngine::sample();
        let session = blocking(&engine);
        assert_eq!(session.scanners().unwrap(), vec!["SIM-4711", "SIM-4712"]);
        session.select_scanner("SIM-4712").unwrap();
        assert_eq!(engine.selected_scanner().as_deref(), Some("SIM-4712"));

        let err = session.select_scanner("NOPE").unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ScannerNotFound));
        assert_eq!(session.last_error(), ErrorCode::ScannerNotFound);
        assert!(session
            .error_message(ErrorCode::ScannerNotFound)
            .unwrap()
            .contains("SCANNER_NOT_FOUND"));
    }

    #[test]
    fn config_applies_logging_and_plugins() {
        let engine = SimulatedEngine::sample();
        let mut config = ReaderConfig::default();
        config.vendor_logging.enabled = true;
        config.plugins = vec!["QRCode".into()];
        let session = Session::with_engine(Arc::new(engine.clone()), &config, None).unwrap();

        assert!(engine.vendor_logging_enabled());
        let plugins = session.plugins();
        assert!(plugins.is_enabled("QRCode").unwrap());
        assert!(!plugins.is_enabled("PDF417").unwrap());
    }

    #[tokio::test]
    async fn configured_certificate_dir_answers_the_engine() {
        let certs = tempfile::tempdir().unwrap();
        std::fs::write(certs.path().join("UTO-DS-0042.der"), [0x30, 0x82, 0x01, 0x0a]).unwrap();

        let mut fixture = EngineFixture::sample();
        let mut document = DocumentFixture::sample_passport();
        document.certificates = vec![
            CertificateRequest {
                identifier: "UTO-DS-0042".into(),
                kind: CertificateType::DocSigner,
            },
            CertificateRequest {
                identifier: "UTO-CSCA-01".into(),
                kind: CertificateType::CountrySigner,
            },
        ];
        fixture.document = Some(document);
        let engine = SimulatedEngine::new(fixture);

        let mut config = ReaderConfig::default();
        config.delivery = DeliveryMode::NonBlocking;
        config.certificate_dir = Some(certs.path().to_path_buf());
        let session = Session::with_engine(Arc::new(engine.clone()), &config, None).unwrap();

        let read = session.next_document().await.unwrap();
        assert_eq!(
            read.certificates,
            vec![("UTO-DS-0042".to_string(), true), ("UTO-CSCA-01".to_string(), false)]
        );
        assert_eq!(engine.certificates_supplied(), vec!["UTO-DS-0042"]);
    }

    #[test]
    fn blocking_adapter_reads() {
        let engine = SimulatedEngine::sample();
        let session = BlockingSession::new(blocking(&engine)).unwrap();
        let read = session.next_document().unwrap();
        assert!(read.codeline().is_some());
        session.shutdown().unwrap();
        assert!(!session.session().engine().is_initialised());
    }
}
