// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Fixtures replayed by the simulated engine.
//
// A fixture is a pre-decoded document: the bytes each data item would carry
// and the records each decoder plugin would find. Nothing is recognised from
// pixels; the simulated engine only honours the call contract around them.

use std::path::Path;

use serde::{Deserialize, Serialize};

use docreader_core::{CertificateType, DataType, PluginData, PluginDataFormat, ReaderError, ReaderSettings, Result};

/// A single item value, written the way it is easiest to type into JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureValue {
    /// Stored NUL-terminated.
    Text(String),
    /// Stored as a little-endian i32.
    Int(i32),
    /// Stored as a little-endian f32.
    Float(f32),
    /// Raw bytes.
    Hex(String),
}

impl FixtureValue {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(match self {
            FixtureValue::Text(s) => {
                let mut bytes = s.as_bytes().to_vec();
                bytes.push(0);
                bytes
            }
            FixtureValue::Int(i) => i.to_le_bytes().to_vec(),
            FixtureValue::Float(f) => f.to_le_bytes().to_vec(),
            FixtureValue::Hex(h) => hex::decode(h).map_err(|e| ReaderError::Decode {
                tag: "fixture".into(),
                detail: format!("bad hex value: {e}"),
            })?,
        })
    }
}

/// Every instance of one item, in index order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureItem {
    /// Vendor name, e.g. `CD_IMAGEVIS`.
    pub tag: String,
    pub values: Vec<FixtureValue>,
}

impl FixtureItem {
    pub fn new(tag: DataType, values: Vec<FixtureValue>) -> Self {
        Self {
            tag: tag.vendor_name().to_string(),
            values,
        }
    }

    pub fn data_type(&self) -> Result<DataType> {
        DataType::from_vendor_name(&self.tag).ok_or_else(|| ReaderError::UnknownTag(self.tag.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginPartFixture {
    #[serde(default)]
    pub feature_name: String,
    #[serde(default)]
    pub field_name: String,
    pub feature_type_id: i32,
    /// Text parts become `String` records, hex parts `Binary`.
    pub value: FixtureValue,
}

impl PluginPartFixture {
    pub fn to_plugin_data(&self) -> Result<PluginData> {
        let format = match self.value {
            FixtureValue::Hex(_) => PluginDataFormat::Binary,
            _ => PluginDataFormat::String,
        };
        Ok(PluginData {
            feature_name: self.feature_name.clone(),
            field_name: self.field_name.clone(),
            feature_type_id: self.feature_type_id,
            format,
            data: self.value.to_bytes()?,
        })
    }
}

/// What one plugin finds on the document: features, each with its parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginResultFixture {
    pub plugin: String,
    pub features: Vec<Vec<PluginPartFixture>>,
}

/// A certificate the chip's security objects point at but the engine does
/// not hold, so it asks the host during the chip read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateRequest {
    pub identifier: String,
    pub kind: CertificateType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentFixture {
    pub name: String,
    /// As the OCR would read it, lines joined by 0x0D.
    #[serde(default)]
    pub codeline: Option<String>,
    /// The MRZ that actually unlocks the chip. Defaults to `codeline`; set it
    /// to model an OCR mistake that BAC key correction has to repair.
    #[serde(default)]
    pub chip_mrz: Option<String>,
    #[serde(default)]
    pub items: Vec<FixtureItem>,
    #[serde(default)]
    pub plugin_results: Vec<PluginResultFixture>,
    /// Asked for after BAC succeeds, in order.
    #[serde(default)]
    pub certificates: Vec<CertificateRequest>,
}

impl DocumentFixture {
    pub fn chip_key(&self) -> Option<&str> {
        self.chip_mrz.as_deref().or(self.codeline.as_deref())
    }

    pub fn has_chip(&self) -> bool {
        self.items
            .iter()
            .filter_map(|item| item.data_type().ok())
            .any(DataType::is_rfid)
    }

    pub fn plugin_records(&self, plugin: &str) -> Option<&PluginResultFixture> {
        self.plugin_results.iter().find(|r| r.plugin == plugin)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginFixture {
    pub name: String,
    /// A plugin that failed to load is listed but can never be enabled.
    #[serde(default = "yes")]
    pub loaded: bool,
    #[serde(default = "yes")]
    pub enabled: bool,
}

fn yes() -> bool {
    true
}

/// Everything the simulated engine starts from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineFixture {
    #[serde(default = "default_scanners")]
    pub scanners: Vec<String>,
    #[serde(default)]
    pub plugins: Vec<PluginFixture>,
    /// Persisted settings ("appconfig"); the defaults when absent.
    #[serde(default)]
    pub settings: Option<ReaderSettings>,
    /// Document lying on the window when the engine starts.
    #[serde(default)]
    pub document: Option<DocumentFixture>,
}

fn default_scanners() -> Vec<String> {
    vec!["SIM-0001".into()]
}

impl Default for EngineFixture {
    fn default() -> Self {
        Self {
            scanners: default_scanners(),
            plugins: Vec::new(),
            settings: None,
            document: None,
        }
    }
}

impl EngineFixture {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// A TD3 specimen passport with a chip, two barcode plugins and one
    /// plugin that failed to load.
    pub fn sample() -> Self {
        Self {
            scanners: vec!["SIM-4711".into(), "SIM-4712".into()],
            plugins: vec![
                PluginFixture {
                    name: "PDF417".into(),
                    loaded: true,
                    enabled: true,
                },
                PluginFixture {
                    name: "QRCode".into(),
                    loaded: true,
                    enabled: true,
                },
                PluginFixture {
                    name: "CHNVisas".into(),
                    loaded: false,
                    enabled: false,
                },
            ],
            settings: Some(sample_settings()),
            document: Some(DocumentFixture::sample_passport()),
        }
    }
}

/// Defaults plus the chip items the sample passport carries.
fn sample_settings() -> ReaderSettings {
    let mut settings = ReaderSettings::default();
    for tag in [
        DataType::ReadProgress,
        DataType::ScDg1Codeline,
        DataType::ScDg2Photo,
        DataType::ScChipId,
        DataType::ScBacStatus,
        DataType::ScDg1Validate,
        DataType::ScDg2Validate,
        DataType::ScSignatureValidate,
        DataType::PassiveAuthentication,
        DataType::ActiveAuthentication,
    ] {
        settings.enable(tag);
    }
    settings
}

/// The ICAO 9303 specimen (Utopia, Anna Maria Eriksson).
pub const SAMPLE_TD3: &str =
    "P<UTOERIKSSON<<ANNA<MARIA<<<<<<<<<<<<<<<<<<<\rL898902C36UTO7408122F1204159ZE184226B<<<<<10";

impl DocumentFixture {
    pub fn sample_passport() -> Self {
        use FixtureValue::{Float, Hex, Int, Text};

        // Minimal JPEG and JPEG 2000 headers; enough for format sniffing.
        let jpeg = "ffd8ffe000104a46494600010100000100010000ffd9".to_string();
        let jp2 = "0000000c6a5020200d0a870a".to_string();

        Self {
            name: "UTO specimen passport".into(),
            codeline: Some(SAMPLE_TD3.into()),
            chip_mrz: None,
            items: vec![
                FixtureItem::new(DataType::Checksum, vec![Int(3)]),
                FixtureItem::new(DataType::SecurityCheck, vec![Int(1)]),
                FixtureItem::new(DataType::ImageVis, vec![Hex(jpeg.clone())]),
                FixtureItem::new(DataType::ImageIr, vec![Hex(jpeg.clone())]),
                FixtureItem::new(DataType::ImageUv, vec![Hex(jpeg.clone())]),
                FixtureItem::new(DataType::ImagePhoto, vec![Hex(jpeg)]),
                FixtureItem::new(DataType::ReadProgress, vec![Float(0.5), Float(1.0)]),
                FixtureItem::new(DataType::ScDg1Codeline, vec![Text(SAMPLE_TD3.into())]),
                FixtureItem::new(DataType::ScDg2Photo, vec![Hex(jp2)]),
                FixtureItem::new(DataType::ScChipId, vec![Text("04A1B2C3D4E5F6".into())]),
                FixtureItem::new(DataType::ScDg1Validate, vec![Int(1)]),
                FixtureItem::new(DataType::ScDg2Validate, vec![Int(1)]),
                FixtureItem::new(DataType::ScSignatureValidate, vec![Int(1)]),
                FixtureItem::new(DataType::PassiveAuthentication, vec![Int(1)]),
                FixtureItem::new(DataType::ActiveAuthentication, vec![Int(2)]),
            ],
            plugin_results: vec![PluginResultFixture {
                plugin: "PDF417".into(),
                features: vec![vec![
                    PluginPartFixture {
                        feature_name: "PDF417".into(),
                        field_name: "Data".into(),
                        feature_type_id: 6,
                        value: Text("@\n\x1e\rANSI 636000090002DL00410278".into()),
                    },
                    PluginPartFixture {
                        feature_name: "PDF417".into(),
                        field_name: "Raw".into(),
                        feature_type_id: 6,
                        value: Hex("400a".into()),
                    },
                ]],
            }],
            certificates: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_items_use_known_tags() {
        let doc = DocumentFixture::sample_passport();
        for item in &doc.items {
            assert!(item.data_type().is_ok(), "{}", item.tag);
        }
        assert!(doc.has_chip());
        assert_eq!(doc.chip_key(), Some(SAMPLE_TD3));
    }

    #[test]
    fn values_encode_like_the_engine() {
        assert_eq!(FixtureValue::Text("AB".into()).to_bytes().unwrap(), b"AB\0");
        assert_eq!(FixtureValue::Int(-1).to_bytes().unwrap(), vec![0xff; 4]);
        assert_eq!(FixtureValue::Hex("cafe".into()).to_bytes().unwrap(), vec![0xca, 0xfe]);
        assert!(FixtureValue::Hex("xyz".into()).to_bytes().is_err());
    }

    #[test]
    fn fixture_json_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(
            &path,
            r#"{
                "plugins": [ { "name": "QRCode" } ],
                "document": {
                    "name": "id card",
                    "items": [ { "tag": "CD_SECURITYCHECK", "values": [ { "int": 1 } ] } ]
                }
            }"#,
        )
        .unwrap();
        let fixture = EngineFixture::load(&path).unwrap();
        assert_eq!(fixture.scanners, vec!["SIM-0001".to_string()]);
        assert!(fixture.plugins[0].loaded && fixture.plugins[0].enabled);
        let doc = fixture.document.unwrap();
        assert!(!doc.has_chip());
        assert_eq!(doc.items[0].values[0], FixtureValue::Int(1));
    }
}
