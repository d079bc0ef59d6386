// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the document reader client.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one document read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReadId(pub Uuid);

impl ReadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ReadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ReadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

vendor_enum! {
    /// Lifecycle state of the engine and its reader hardware.
    pub enum ReaderState {
        Uninitialised = 0 => "READER_NOT_INITIALISED",
        Initialising = 1 => "READER_INITIALISING",
        Enabled = 2 => "READER_ENABLED",
        Disabled = 3 => "READER_DISABLED",
        Asleep = 4 => "READER_ASLEEP",
        Suspended = 5 => "READER_SUSPENDED",
        /// Fatal engine fault. The engine resets itself; callers retry afterwards.
        Errored = 6 => "READER_ERRORED",
        ShuttingDown = 7 => "READER_SHUTTING_DOWN",
    }
}

impl ReaderState {
    /// Only these states may be requested through `set_state`.
    pub fn is_settable(self) -> bool {
        matches!(
            self,
            ReaderState::Enabled
                | ReaderState::Disabled
                | ReaderState::Asleep
                | ReaderState::Suspended
        )
    }

    /// The engine has been initialised and not yet torn down.
    pub fn is_running(self) -> bool {
        !matches!(
            self,
            ReaderState::Uninitialised | ReaderState::Initialising | ReaderState::ShuttingDown
        )
    }
}

vendor_enum! {
    /// Notifications delivered through the event callback.
    pub enum EventCode {
        /// Settings are loaded but not yet committed; they may still be edited.
        SettingsInitialised = 0 => "SETTINGS_INITIALISED",
        PluginsInitialised = 1 => "PLUGINS_INITIALISED",
        ReaderStateChanged = 2 => "READER_STATE_CHANGED",
        DocumentOnWindow = 3 => "DOC_ON_WINDOW",
        StartOfDocumentData = 4 => "START_OF_DOCUMENT_DATA",
        /// Every configured item for the current document has been delivered.
        EndOfDocumentData = 5 => "END_OF_DOCUMENT_DATA",
        DocumentRemoved = 6 => "DOC_REMOVED",
    }
}

vendor_enum! {
    /// Progress of document detection on the reader window.
    pub enum DetectionState {
        NoDocument = 0 => "NoDocument",
        MovingDocument = 1 => "MovingDocument",
        FoundDocument = 2 => "FoundDocument",
    }
}

vendor_enum! {
    /// What the engine is asking for when it needs an external certificate
    /// during RFID processing.
    pub enum CertificateType {
        DocSigner = 0 => "CT_DOC_SIGNER_CERT",
        CountrySigner = 1 => "CT_COUNTRY_SIGNER_CERT",
        /// Country Verifying CA link certificate (EAC).
        Cvca = 2 => "CT_CVCA_CERT",
        DocumentVerifier = 3 => "CT_DV_CERT",
        InspectionSystem = 4 => "CT_IS_CERT",
        InspectionSystemKey = 5 => "CT_IS_PRIVATE_KEY",
    }
}

impl CertificateType {
    /// File extensions a certificate or key may be stored under.
    pub const FILE_EXTENSIONS: &'static [&'static str] =
        &["cer", "crl", "crt", "der", "pem", "cvcert", "pkcs8"];
}

/// A three-valued check result where the check may not have been applicable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriState {
    False,
    True,
    NotPerformed,
    Other(i32),
}

impl TriState {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => TriState::False,
            1 => TriState::True,
            2 => TriState::NotPerformed,
            other => TriState::Other(other),
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            TriState::False => 0,
            TriState::True => 1,
            TriState::NotPerformed => 2,
            TriState::Other(raw) => raw,
        }
    }
}

/// Result of a cryptographic validation step (data group hash, signature, DSC).
///
/// A failed validation is an expected outcome for a forged or damaged document,
/// so it is reported here rather than as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationCode {
    Invalid,
    Valid,
    /// Did not pass strict rules, but the document may legitimately differ.
    Warning,
    NotValidated,
    Other(i32),
}

impl ValidationCode {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => ValidationCode::Invalid,
            1 => ValidationCode::Valid,
            2 => ValidationCode::Warning,
            3 => ValidationCode::NotValidated,
            other => ValidationCode::Other(other),
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            ValidationCode::Invalid => 0,
            ValidationCode::Valid => 1,
            ValidationCode::Warning => 2,
            ValidationCode::NotValidated => 3,
            ValidationCode::Other(raw) => raw,
        }
    }
}

/// Interpretation of the signed codeline checksum value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChecksumOutcome {
    NotChecked,
    Ok(i32),
    Error,
    /// Did not compute, but the document is not ICAO and may use other rules.
    Warning(i32),
}

impl ChecksumOutcome {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => ChecksumOutcome::NotChecked,
            -1 => ChecksumOutcome::Error,
            r if r > 0 => ChecksumOutcome::Ok(r),
            r => ChecksumOutcome::Warning(r),
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            ChecksumOutcome::NotChecked => 0,
            ChecksumOutcome::Error => -1,
            ChecksumOutcome::Ok(r) | ChecksumOutcome::Warning(r) => r,
        }
    }
}

/// How the engine hands data to the client, fixed at initialisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeliveryMode {
    /// No callbacks: `read_document` blocks, data is pulled afterwards.
    #[default]
    Blocking,
    /// Callbacks registered: data is pushed as it becomes available.
    NonBlocking,
}

/// Classification of an error for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Retry automatically (timeout, engine restarting).
    Transient,
    /// An operator must do something (place a document, connect the reader).
    UserAction,
    /// Will never succeed in this session (feature not licensed, version skew).
    Permanent,
}

/// Encoding of a plugin payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PluginDataFormat {
    /// Narrow string, NUL-terminated.
    String,
    /// ISO-8859-1 string.
    StringAscii,
    /// UTF-16LE string.
    StringUnicode,
    Binary,
    Other(i32),
}

impl PluginDataFormat {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => PluginDataFormat::String,
            1 => PluginDataFormat::StringAscii,
            2 => PluginDataFormat::StringUnicode,
            3 => PluginDataFormat::Binary,
            other => PluginDataFormat::Other(other),
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            PluginDataFormat::String => 0,
            PluginDataFormat::StringAscii => 1,
            PluginDataFormat::StringUnicode => 2,
            PluginDataFormat::Binary => 3,
            PluginDataFormat::Other(raw) => raw,
        }
    }
}

/// One part of one feature found by a decoder plugin, copied out of the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginData {
    pub feature_name: String,
    pub field_name: String,
    /// Offset from `CD_PLUGIN` identifying the feature kind.
    pub feature_type_id: i32,
    pub format: PluginDataFormat,
    pub data: Vec<u8>,
}

impl PluginData {
    /// Decode the payload as text, if its format is textual.
    pub fn text(&self) -> Option<String> {
        match self.format {
            PluginDataFormat::String => {
                let end = self
                    .data
                    .iter()
                    .position(|b| *b == 0)
                    .unwrap_or(self.data.len());
                Some(String::from_utf8_lossy(&self.data[..end]).into_owned())
            }
            // ISO-8859-1 maps each byte to the code point of the same value.
            PluginDataFormat::StringAscii => Some(
                self.data
                    .iter()
                    .take_while(|b| **b != 0)
                    .map(|b| char::from(*b))
                    .collect(),
            ),
            PluginDataFormat::StringUnicode => {
                let units: Vec<u16> = self
                    .data
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .take_while(|unit| *unit != 0)
                    .collect();
                Some(String::from_utf16_lossy(&units))
            }
            PluginDataFormat::Binary | PluginDataFormat::Other(_) => None,
        }
    }

    /// `feature: field: text` label in the style operators see on kiosk screens.
    pub fn display_line(&self) -> String {
        let body = self
            .text()
            .unwrap_or_else(|| format!("{:?} - ({} bytes)", self.format, self.data.len()));
        let mut line = body;
        if !self.field_name.is_empty() {
            line = format!("{}: {line}", self.field_name);
        }
        if !self.feature_name.is_empty() {
            line = format!("{}: {line}", self.feature_name);
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_four_states_are_settable() {
        let settable: Vec<_> = ReaderState::ALL
            .iter()
            .filter(|s| s.is_settable())
            .collect();
        assert_eq!(settable.len(), 4);
        assert!(!ReaderState::Errored.is_settable());
    }

    #[test]
    fn checksum_sign_convention() {
        assert_eq!(ChecksumOutcome::from_raw(0), ChecksumOutcome::NotChecked);
        assert_eq!(ChecksumOutcome::from_raw(3), ChecksumOutcome::Ok(3));
        assert_eq!(ChecksumOutcome::from_raw(-1), ChecksumOutcome::Error);
        assert_eq!(ChecksumOutcome::from_raw(-4), ChecksumOutcome::Warning(-4));
    }

    #[test]
    fn plugin_text_decodings() {
        let ascii = PluginData {
            feature_name: String::new(),
            field_name: String::new(),
            feature_type_id: 6,
            format: PluginDataFormat::String,
            data: b"PDF417 DATA\0".to_vec(),
        };
        assert_eq!(ascii.text().as_deref(), Some("PDF417 DATA"));

        let latin1 = PluginData {
            format: PluginDataFormat::StringAscii,
            data: vec![0x4d, 0xfc, 0x6c, 0x6c, 0x65, 0x72],
            ..ascii.clone()
        };
        assert_eq!(latin1.text().as_deref(), Some("Müller"));

        let utf16: Vec<u8> = "Ωmega"
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes())
            .collect();
        let unicode = PluginData {
            format: PluginDataFormat::StringUnicode,
            data: utf16,
            ..ascii.clone()
        };
        assert_eq!(unicode.text().as_deref(), Some("Ωmega"));

        let binary = PluginData {
            format: PluginDataFormat::Binary,
            ..ascii
        };
        assert!(binary.text().is_none());
    }

    #[test]
    fn display_line_prefixes_feature_and_field() {
        let data = PluginData {
            feature_name: "Licence".into(),
            field_name: "Number".into(),
            feature_type_id: 15,
            format: PluginDataFormat::String,
            data: b"ABC123\0".to_vec(),
        };
        assert_eq!(data.display_line(), "Licence: Number: ABC123");
    }
}
