// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Push delivery: engine callbacks turned into a stream of owned events.
//
// Callbacks fire on engine threads. `ChannelSink` decodes each payload and
// sends it on an unbounded channel, so the engine never waits on the client.
// The exceptions are BAC key correction and certificate requests, which the
// engine waits on.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use docreader_core::{
    CertificateType, Codeline, CodelineData, DataType, DataValue, ErrorCode, EventCode, PluginData, PluginFeature,
    ReadId, Result, Tag,
};
use docreader_engine::EngineCallbacks;

use crate::bac::{BacCorrector, apply_correction};
use crate::certificates::CertificateProvider;

/// Everything a Non-Blocking session can observe.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReaderEvent {
    Data { tag: Tag, value: DataValue },
    Event { event: EventCode },
    Error { code: ErrorCode, message: String },
    Warning { code: ErrorCode, message: String },
    BacKeyCorrected { original: String, corrected: String },
    CertificateRequested {
        identifier: String,
        certificate: CertificateType,
        supplied: bool,
    },
}

impl ReaderEvent {
    fn event(event: EventCode) -> Self {
        ReaderEvent::Event { event }
    }
}

/// Receiving half of a session's event channel.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<ReaderEvent>,
}

impl EventStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<ReaderEvent>) -> Self {
        Self { rx }
    }

    /// Next event; `None` once the session is gone.
    pub async fn recv(&mut self) -> Option<ReaderEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ReaderEvent> {
        self.rx.try_recv().ok()
    }

    /// Drop anything already queued.
    pub fn drain(&mut self) -> usize {
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }
}

/// Engine callbacks that forward into an `EventStream`.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ReaderEvent>,
    corrector: Option<Arc<dyn BacCorrector>>,
    certificates: Option<Arc<dyn CertificateProvider>>,
}

impl ChannelSink {
    pub fn channel(corrector: Option<Arc<dyn BacCorrector>>) -> (Arc<Self>, EventStream) {
        Self::channel_with_certificates(corrector, None)
    }

    /// As [`ChannelSink::channel`], answering certificate requests from `certificates`.
    pub fn channel_with_certificates(
        corrector: Option<Arc<dyn BacCorrector>>,
        certificates: Option<Arc<dyn CertificateProvider>>,
    ) -> (Arc<Self>, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self {
            tx,
            corrector,
            certificates,
        };
        (Arc::new(sink), EventStream::new(rx))
    }

    fn send(&self, event: ReaderEvent) {
        // A closed receiver just means nobody is listening any more.
        if self.tx.send(event).is_err() {
            debug!("event dropped, stream closed");
        }
    }
}

impl EngineCallbacks for ChannelSink {
    fn on_data(&self, tag: Tag, data: &[u8]) {
        let Tag::Data(data_type) = tag else {
            warn!(tag = %tag, "plugin tag delivered as scalar data");
            return;
        };
        match DataValue::decode(data_type, data) {
            Ok(value) => self.send(ReaderEvent::Data { tag, value }),
            Err(e) => {
                warn!(tag = %tag, error = %e, "undecodable data item");
                self.send(ReaderEvent::Warning {
                    code: ErrorCode::InvalidParameter,
                    message: e.to_string(),
                });
            }
        }
    }

    fn on_plugin_data(&self, feature: PluginFeature, data: PluginData) {
        self.send(ReaderEvent::Data {
            tag: Tag::Plugin(feature),
            value: DataValue::Plugin(data),
        });
    }

    fn on_event(&self, event: EventCode) {
        self.send(ReaderEvent::event(event));
    }

    fn on_error(&self, code: ErrorCode, message: &str) {
        self.send(ReaderEvent::Error {
            code,
            message: message.to_string(),
        });
    }

    fn on_warning(&self, code: ErrorCode, message: &str) {
        self.send(ReaderEvent::Warning {
            code,
            message: message.to_string(),
        });
    }

    fn on_bac_key_correction(&self, mrz: &mut [u8]) {
        let Some(corrector) = &self.corrector else {
            return;
        };
        if let Some((original, corrected)) = apply_correction(mrz, corrector.as_ref()) {
            self.send(ReaderEvent::BacKeyCorrected {
                original,
                corrected,
            });
        }
    }

    fn on_certificate(&self, identifier: &str, kind: CertificateType) -> Option<Vec<u8>> {
        let cert = self
            .certificates
            .as_ref()
            .and_then(|provider| provider.certificate(identifier, kind));
        if cert.is_none() {
            debug!(identifier, kind = kind.vendor_name(), "certificate request declined");
        }
        self.send(ReaderEvent::CertificateRequested {
            identifier: identifier.to_string(),
            certificate: kind,
            supplied: cert.is_some(),
        });
        cert
    }
}

/// One item instance of a completed read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentItem {
    pub tag: Tag,
    pub index: usize,
    pub value: DataValue,
}

/// Everything one read produced, in arrival order.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRead {
    pub id: ReadId,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub items: Vec<DocumentItem>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bac_correction: Option<(String, String)>,
    /// Certificates the engine asked for, and whether each was supplied.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub certificates: Vec<(String, bool)>,
}

impl DocumentRead {
    pub(crate) fn begin() -> Self {
        let now = Utc::now();
        Self {
            id: ReadId::new(),
            started: now,
            finished: now,
            items: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
            bac_correction: None,
            certificates: Vec::new(),
        }
    }

    /// Append an instance, numbering it after earlier ones of the same tag.
    pub(crate) fn push(&mut self, tag: Tag, value: DataValue) {
        let index = self.items.iter().filter(|item| item.tag == tag).count();
        self.items.push(DocumentItem { tag, index, value });
    }

    /// Fold one pushed event into the read. Returns true at end of document.
    pub(crate) fn absorb(&mut self, event: ReaderEvent) -> bool {
        match event {
            ReaderEvent::Data { tag, value } => self.push(tag, value),
            ReaderEvent::Event { event } => return event == EventCode::EndOfDocumentData,
            ReaderEvent::Error { code, message } => self.errors.push(format!("{code}: {message}")),
            ReaderEvent::Warning { code, message } => {
                self.warnings.push(format!("{code}: {message}"))
            }
            ReaderEvent::BacKeyCorrected {
                original,
                corrected,
            } => self.bac_correction = Some((original, corrected)),
            ReaderEvent::CertificateRequested {
                identifier,
                supplied,
                ..
            } => self.certificates.push((identifier, supplied)),
        }
        false
    }

    pub(crate) fn finish(mut self) -> Self {
        self.finished = Utc::now();
        self
    }

    pub fn values(&self, tag: impl Into<Tag>) -> impl Iterator<Item = &DataValue> {
        let tag = tag.into();
        self.items
            .iter()
            .filter(move |item| item.tag == tag)
            .map(|item| &item.value)
    }

    pub fn first(&self, tag: impl Into<Tag>) -> Option<&DataValue> {
        self.values(tag).next()
    }

    pub fn codeline(&self) -> Option<&Codeline> {
        self.first(DataType::Codeline).and_then(DataValue::as_codeline)
    }

    /// ICAO fields of the page codeline.
    pub fn codeline_data(&self) -> Option<Result<CodelineData>> {
        self.codeline().map(Codeline::fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bac::{MrzLines, MrzParts};
    use docreader_core::PluginDataFormat;

    fn zero_for_o(mrz: MrzParts<'_>) -> Option<MrzLines> {
        let mut lines = mrz.to_lines();
        lines.line1 = lines.line1.replace('O', "0");
        lines.remainder = lines.remainder.replace('O', "0");
        Some(lines)
    }

    #[test]
    fn data_is_decoded_before_sending() {
        let (sink, mut stream) = ChannelSink::channel(None);
        sink.on_data(Tag::Data(DataType::Checksum), &3i32.to_le_bytes());
        sink.on_event(EventCode::EndOfDocumentData);

        let Some(ReaderEvent::Data { value, .. }) = stream.try_recv() else {
            panic!("expected a data event");
        };
        assert_eq!(value.summary(), "Ok(3)");
        assert_eq!(
            stream.try_recv(),
            Some(ReaderEvent::Event {
                event: EventCode::EndOfDocumentData
            })
        );
    }

    #[test]
    fn bad_payload_becomes_a_warning() {
        let (sink, mut stream) = ChannelSink::channel(None);
        sink.on_data(Tag::Data(DataType::Checksum), &[1]);
        assert!(matches!(stream.try_recv(), Some(ReaderEvent::Warning { .. })));
    }

    #[test]
    fn closed_stream_does_not_panic() {
        let (sink, stream) = ChannelSink::channel(None);
        drop(stream);
        sink.on_event(EventCode::DocumentRemoved);
    }

    #[test]
    fn bac_without_corrector_leaves_buffer() {
        let (sink, mut stream) = ChannelSink::channel(None);
        let mut buf = *b"P<UTO\0\0\0";
        sink.on_bac_key_correction(&mut buf);
        assert_eq!(&buf, b"P<UTO\0\0\0");
        assert!(stream.try_recv().is_none());
    }

    #[test]
    fn bac_correction_is_reported() {
        let corrector: Arc<dyn BacCorrector> = Arc::new(zero_for_o);
        let (sink, mut stream) = ChannelSink::channel(Some(corrector));
        let mut buf = [0u8; 16];
        buf[..4].copy_from_slice(b"AO12");
        sink.on_bac_key_correction(&mut buf);
        assert_eq!(&buf[..5], b"A012\0");
        assert_eq!(
            stream.try_recv(),
            Some(ReaderEvent::BacKeyCorrected {
                original: "AO12".into(),
                corrected: "A012".into()
            })
        );
    }

    #[test]
    fn certificate_requests_are_declined_by_default() {
        let (sink, mut stream) = ChannelSink::channel(None);
        assert_eq!(sink.on_certificate("UTO-DS-0042", CertificateType::DocSigner), None);
        assert_eq!(
            stream.try_recv(),
            Some(ReaderEvent::CertificateRequested {
                identifier: "UTO-DS-0042".into(),
                certificate: CertificateType::DocSigner,
                supplied: false,
            })
        );
    }

    struct OneCertificate;

    impl CertificateProvider for OneCertificate {
        fn certificate(&self, identifier: &str, _kind: CertificateType) -> Option<Vec<u8>> {
            (identifier == "UTO-CSCA-01").then(|| vec![0x30, 0x82, 0x01, 0x0a])
        }
    }

    #[test]
    fn provider_answers_certificate_requests() {
        let (sink, mut stream) = ChannelSink::channel_with_certificates(None, Some(Arc::new(OneCertificate)));
        assert_eq!(
            sink.on_certificate("UTO-CSCA-01", CertificateType::CountrySigner),
            Some(vec![0x30, 0x82, 0x01, 0x0a])
        );
        assert_eq!(sink.on_certificate("UTO-DS-0042", CertificateType::DocSigner), None);

        let mut read = DocumentRead::begin();
        while let Some(event) = stream.try_recv() {
            read.absorb(event);
        }
        assert_eq!(
            read.certificates,
            vec![("UTO-CSCA-01".to_string(), true), ("UTO-DS-0042".to_string(), false)]
        );
    }

    #[test]
    fn absorb_numbers_instances_and_stops_at_end() {
        let mut read = DocumentRead::begin();
        let progress = |f: f32| ReaderEvent::Data {
            tag: Tag::Data(DataType::ReadProgress),
            value: DataValue::Float(f),
        };
        assert!(!read.absorb(progress(0.5)));
        assert!(!read.absorb(progress(1.0)));
        assert!(!read.absorb(ReaderEvent::Warning {
            code: ErrorCode::ReadFailed,
            message: "basic access control failed".into()
        }));
        assert!(!read.absorb(ReaderEvent::Data {
            tag: Tag::Plugin(PluginFeature::Pdf417),
            value: DataValue::Plugin(PluginData {
                feature_name: "PDF417".into(),
                field_name: "Data".into(),
                feature_type_id: 6,
                format: PluginDataFormat::String,
                data: b"x\0".to_vec(),
            }),
        }));
        assert!(read.absorb(ReaderEvent::Event {
            event: EventCode::EndOfDocumentData
        }));

        let read = read.finish();
        assert_eq!(read.items[1].index, 1);
        assert_eq!(read.values(DataType::ReadProgress).count(), 2);
        assert_eq!(read.warnings.len(), 1);
        assert!(read.codeline().is_none());
        assert!(read.finished >= read.started);
    }

    #[test]
    fn read_serialises_with_codeline() {
        let mut read = DocumentRead::begin();
        read.push(
            Tag::Data(DataType::Codeline),
            DataValue::Codeline(Codeline::parse("I<UTO").unwrap()),
        );
        let json = serde_json::to_value(&read).unwrap();
        assert_eq!(json["items"][0]["tag"]["Data"], "Codeline");
        assert!(json.get("bac_correction").is_none());
    }
}
