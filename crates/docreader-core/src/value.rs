// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Owned, decoded data item values.

use serde::{Serialize, Serializer};

use crate::codeline::Codeline;
use crate::data_type::{DataType, PayloadShape};
use crate::dgc::{GreenCertificate, nul_terminated};
use crate::error::{ReaderError, Result};
use crate::types::{ChecksumOutcome, DetectionState, PluginData, TriState, ValidationCode};

/// One data item instance, copied out of the engine and decoded by shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DataValue {
    Text(String),
    Json(serde_json::Value),
    Codeline(Codeline),
    Int(i32),
    Checksum(ChecksumOutcome),
    Float(f32),
    TriState(TriState),
    Validation(ValidationCode),
    Detection(DetectionState),
    Bytes(#[serde(serialize_with = "as_hex")] Vec<u8>),
    Image {
        #[serde(serialize_with = "as_hex")]
        data: Vec<u8>,
        /// Sniffed container format (`png`, `jpg`, `bmp`, `jp2` ...), if recognised.
        format: Option<String>,
    },
    /// A vendor struct passed through undecoded.
    Struct {
        name: &'static str,
        #[serde(serialize_with = "as_hex")]
        data: Vec<u8>,
    },
    GreenCertificate(Box<GreenCertificate>),
    Plugin(PluginData),
}

impl DataValue {
    /// Decode the bytes the engine produced for `tag`.
    pub fn decode(tag: DataType, bytes: &[u8]) -> Result<Self> {
        let shape = tag.shape();
        if let Some(expected) = shape.fixed_len() {
            if bytes.len() < expected {
                return Err(ReaderError::Decode {
                    tag: tag.vendor_name().into(),
                    detail: format!("expected {expected} bytes, got {}", bytes.len()),
                });
            }
        }

        Ok(match shape {
            PayloadShape::Text | PayloadShape::WritableText => {
                DataValue::Text(nul_terminated(bytes))
            }
            PayloadShape::Codeline => DataValue::Codeline(Codeline::parse(&nul_terminated(bytes))?),
            PayloadShape::Json => {
                let text = nul_terminated(bytes);
                let value = serde_json::from_str(&text).map_err(|e| ReaderError::Decode {
                    tag: tag.vendor_name().into(),
                    detail: e.to_string(),
                })?;
                DataValue::Json(value)
            }
            PayloadShape::Int32 => DataValue::Int(le_i32(bytes)),
            PayloadShape::Checksum => DataValue::Checksum(ChecksumOutcome::from_raw(le_i32(bytes))),
            PayloadShape::Float32 => DataValue::Float(f32::from_le_bytes(word(bytes))),
            PayloadShape::TriState => DataValue::TriState(TriState::from_raw(le_i32(bytes))),
            PayloadShape::Validation => {
                DataValue::Validation(ValidationCode::from_raw(le_i32(bytes)))
            }
            PayloadShape::Detection => {
                let raw = le_i32(bytes);
                let state = DetectionState::from_raw(raw).ok_or_else(|| ReaderError::Decode {
                    tag: tag.vendor_name().into(),
                    detail: format!("unknown detection state {raw}"),
                })?;
                DataValue::Detection(state)
            }
            PayloadShape::Bytes => DataValue::Bytes(bytes.to_vec()),
            PayloadShape::Image => DataValue::Image {
                format: sniff_image_format(bytes),
                data: bytes.to_vec(),
            },
            PayloadShape::Struct(name) => DataValue::Struct {
                name,
                data: bytes.to_vec(),
            },
            PayloadShape::GreenCertificate => {
                DataValue::GreenCertificate(Box::new(GreenCertificate::decode(bytes)?))
            }
            PayloadShape::Plugin => {
                return Err(ReaderError::PluginTagOnScalarAccessor(
                    tag.vendor_name().into(),
                ));
            }
        })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            DataValue::Text(s) => Some(s),
            DataValue::Codeline(c) => Some(c.as_str()),
            _ => None,
        }
    }

    pub fn as_codeline(&self) -> Option<&Codeline> {
        match self {
            DataValue::Codeline(c) => Some(c),
            _ => None,
        }
    }

    /// Short human label used by the CLI when printing events.
    pub fn summary(&self) -> String {
        match self {
            DataValue::Text(s) => s.clone(),
            DataValue::Json(v) => v.to_string(),
            DataValue::Codeline(c) => c.as_str().replace('\r', " / "),
            DataValue::Int(i) => i.to_string(),
            DataValue::Checksum(c) => format!("{c:?}"),
            DataValue::Float(f) => format!("{f:.2}"),
            DataValue::TriState(t) => format!("{t:?}"),
            DataValue::Validation(v) => format!("{v:?}"),
            DataValue::Detection(d) => d.to_string(),
            DataValue::Bytes(b) => format!("{} bytes", b.len()),
            DataValue::Image { data, format } => format!(
                "{} image, {} bytes",
                format.as_deref().unwrap_or("unknown"),
                data.len()
            ),
            DataValue::Struct { name, data } => format!("{name} ({} bytes)", data.len()),
            DataValue::GreenCertificate(cert) => {
                format!("DGC {} {}", cert.forenames, cert.surnames)
            }
            DataValue::Plugin(p) => p.display_line(),
        }
    }
}

fn word(bytes: &[u8]) -> [u8; 4] {
    let mut w = [0u8; 4];
    w.copy_from_slice(&bytes[..4]);
    w
}

fn le_i32(bytes: &[u8]) -> i32 {
    i32::from_le_bytes(word(bytes))
}

/// Identify the container of an image payload. JPEG 2000 is not handled by the
/// `image` crate, so its signatures are matched directly.
pub fn sniff_image_format(bytes: &[u8]) -> Option<String> {
    const JP2_BOX: &[u8] = &[0x00, 0x00, 0x00, 0x0c, 0x6a, 0x50, 0x20, 0x20];
    const J2K_CODESTREAM: &[u8] = &[0xff, 0x4f, 0xff, 0x51];

    if bytes.starts_with(JP2_BOX) || bytes.starts_with(J2K_CODESTREAM) {
        return Some("jp2".into());
    }
    image::guess_format(bytes)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .map(str::to_string)
}

fn as_hex<S: Serializer>(bytes: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_are_little_endian() {
        assert_eq!(
            DataValue::decode(DataType::SecurityCheck, &258i32.to_le_bytes()).unwrap(),
            DataValue::Int(258)
        );
        assert_eq!(
            DataValue::decode(DataType::ReadProgress, &0.5f32.to_le_bytes()).unwrap(),
            DataValue::Float(0.5)
        );
        assert_eq!(
            DataValue::decode(DataType::Checksum, &(-3i32).to_le_bytes()).unwrap(),
            DataValue::Checksum(ChecksumOutcome::Warning(-3))
        );
        assert_eq!(
            DataValue::decode(DataType::ScBacStatus, &1i32.to_le_bytes()).unwrap(),
            DataValue::TriState(TriState::True)
        );
    }

    #[test]
    fn short_scalar_is_rejected() {
        let err = DataValue::decode(DataType::SecurityCheck, &[1, 2]).unwrap_err();
        assert!(matches!(err, ReaderError::Decode { .. }));
    }

    #[test]
    fn detection_progress() {
        assert_eq!(
            DataValue::decode(DataType::DetectProgress, &2i32.to_le_bytes()).unwrap(),
            DataValue::Detection(DetectionState::FoundDocument)
        );
        assert!(DataValue::decode(DataType::DetectProgress, &9i32.to_le_bytes()).is_err());
    }

    #[test]
    fn codeline_strips_terminator() {
        let value = DataValue::decode(DataType::Codeline, b"P<UTO\rL898\0\0").unwrap();
        let codeline = value.as_codeline().unwrap();
        assert_eq!(codeline.as_str(), "P<UTO\rL898");
    }

    #[test]
    fn json_payloads_parse() {
        let value = DataValue::decode(
            DataType::IdvRemoteFaceMatch,
            b"{\"score\":0.93,\"match\":true}\0",
        )
        .unwrap();
        let DataValue::Json(json) = value else {
            panic!("expected json");
        };
        assert_eq!(json["match"], serde_json::Value::Bool(true));
    }

    #[test]
    fn image_format_is_sniffed() {
        let png = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0];
        let value = DataValue::decode(DataType::ImageVis, &png).unwrap();
        assert_eq!(
            value,
            DataValue::Image {
                data: png.to_vec(),
                format: Some("png".into())
            }
        );
        assert_eq!(
            sniff_image_format(&[0x00, 0x00, 0x00, 0x0c, 0x6a, 0x50, 0x20, 0x20, 0x0d]),
            Some("jp2".into())
        );
        assert_eq!(sniff_image_format(b"not an image"), None);
    }

    #[test]
    fn bytes_serialize_as_hex() {
        let json = serde_json::to_value(DataValue::Bytes(vec![0xca, 0xfe])).unwrap();
        assert_eq!(json["kind"], "bytes");
        assert_eq!(json["value"], "cafe");
    }
}
