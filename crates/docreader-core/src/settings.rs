// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine settings: typed model and its fixed binary layout.
//
// Layout (little-endian, no padding beyond what is listed):
//
//   0   u32  layout version
//   4   u32  total size in bytes
//   8   [u8; 32]  data-to-send bitmap, bit n = DataType with raw value n
//   40  u8   rf enabled
//   41  u8   rf BAC key correction
//   42  u16  reserved
//   44  u32  rf chip read timeout (ms)
//   48  u32  rf max air baud (kbit/s)
//   52  u8   swipe enabled
//   53  u8   uhf enabled
//   54  u8   aamva enabled
//   55  u8   reserved
//   56  u32  detect timeout (ms)

use std::collections::BTreeSet;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::data_type::{DataType, NUM_MMMR_DATATYPES};
use crate::error::{ReaderError, Result};

const BITMAP_LEN: usize = 32;
const _: () = assert!(NUM_MMMR_DATATYPES as usize <= BITMAP_LEN * 8);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfSettings {
    pub enabled: bool,
    /// Hand the MRZ to the host before BAC so it can fix OCR mistakes.
    pub bac_key_correction: bool,
    pub chip_read_timeout_ms: u32,
    pub max_air_baud: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleSettings {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionSettings {
    /// Zero waits forever.
    pub detect_timeout_ms: u32,
}

/// The subsystems the engine may restart while committing settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subsystem {
    Rf,
    Swipe,
    Uhf,
    Aamva,
}

impl std::fmt::Display for Subsystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Subsystem::Rf => "RF",
            Subsystem::Swipe => "Swipe",
            Subsystem::Uhf => "UHF",
            Subsystem::Aamva => "AAMVA",
        };
        f.write_str(name)
    }
}

/// Typed mirror of the engine's settings struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderSettings {
    pub data_to_send: BTreeSet<DataType>,
    pub rf: RfSettings,
    pub swipe: ToggleSettings,
    pub uhf: ToggleSettings,
    pub aamva: ToggleSettings,
    pub detection: DetectionSettings,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            data_to_send: [
                DataType::Codeline,
                DataType::Checksum,
                DataType::ImageVis,
                DataType::ImageIr,
                DataType::ImageUv,
                DataType::ImagePhoto,
                DataType::SecurityCheck,
            ]
            .into_iter()
            .collect(),
            rf: RfSettings {
                enabled: true,
                bac_key_correction: false,
                chip_read_timeout_ms: 5000,
                max_air_baud: 848,
            },
            swipe: ToggleSettings { enabled: false },
            uhf: ToggleSettings { enabled: false },
            aamva: ToggleSettings { enabled: false },
            detection: DetectionSettings {
                detect_timeout_ms: 0,
            },
        }
    }
}

impl ReaderSettings {
    /// Layout version written into every blob.
    pub const VERSION: u32 = 1;
    /// Exact size of an encoded settings blob.
    pub const BLOB_LEN: usize = 60;

    pub fn is_enabled(&self, tag: DataType) -> bool {
        self.data_to_send.contains(&tag)
    }

    pub fn enable(&mut self, tag: DataType) -> &mut Self {
        self.data_to_send.insert(tag);
        self
    }

    pub fn disable(&mut self, tag: DataType) -> &mut Self {
        self.data_to_send.remove(&tag);
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::BLOB_LEN);
        out.extend_from_slice(&Self::VERSION.to_le_bytes());
        out.extend_from_slice(&(Self::BLOB_LEN as u32).to_le_bytes());

        let mut bitmap = [0u8; BITMAP_LEN];
        for tag in &self.data_to_send {
            let bit = tag.raw() as usize;
            bitmap[bit / 8] |= 1 << (bit % 8);
        }
        out.extend_from_slice(&bitmap);

        out.push(u8::from(self.rf.enabled));
        out.push(u8::from(self.rf.bac_key_correction));
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&self.rf.chip_read_timeout_ms.to_le_bytes());
        out.extend_from_slice(&self.rf.max_air_baud.to_le_bytes());

        out.push(u8::from(self.swipe.enabled));
        out.push(u8::from(self.uhf.enabled));
        out.push(u8::from(self.aamva.enabled));
        out.push(0);
        out.extend_from_slice(&self.detection.detect_timeout_ms.to_le_bytes());

        debug_assert_eq!(out.len(), Self::BLOB_LEN);
        out
    }

    /// Decode a blob, rejecting any size or version the client was not built for.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::BLOB_LEN {
            return Err(ReaderError::SettingsSizeMismatch {
                expected: Self::BLOB_LEN,
                actual: bytes.len(),
            });
        }
        let version = u32_at(bytes, 0);
        if version != Self::VERSION {
            return Err(ReaderError::SettingsVersion {
                expected: Self::VERSION,
                found: version,
            });
        }
        let declared = u32_at(bytes, 4) as usize;
        if declared != Self::BLOB_LEN {
            return Err(ReaderError::SettingsSizeMismatch {
                expected: Self::BLOB_LEN,
                actual: declared,
            });
        }

        let bitmap = &bytes[8..8 + BITMAP_LEN];
        let data_to_send = DataType::ALL
            .iter()
            .copied()
            .filter(|tag| {
                let bit = tag.raw() as usize;
                bitmap[bit / 8] & (1 << (bit % 8)) != 0
            })
            .collect();

        Ok(Self {
            data_to_send,
            rf: RfSettings {
                enabled: bytes[40] != 0,
                bac_key_correction: bytes[41] != 0,
                chip_read_timeout_ms: u32_at(bytes, 44),
                max_air_baud: u32_at(bytes, 48),
            },
            swipe: ToggleSettings {
                enabled: bytes[52] != 0,
            },
            uhf: ToggleSettings {
                enabled: bytes[53] != 0,
            },
            aamva: ToggleSettings {
                enabled: bytes[54] != 0,
            },
            detection: DetectionSettings {
                detect_timeout_ms: u32_at(bytes, 56),
            },
        })
    }

    /// Subsystems whose settings differ between `self` and `other`. The engine
    /// restarts exactly these when `other` is committed over `self`.
    pub fn changed_subsystems(&self, other: &ReaderSettings) -> Vec<Subsystem> {
        let mut changed = Vec::new();
        if self.rf != other.rf {
            changed.push(Subsystem::Rf);
        }
        if self.swipe != other.swipe {
            changed.push(Subsystem::Swipe);
        }
        if self.uhf != other.uhf {
            changed.push(Subsystem::Uhf);
        }
        if self.aamva != other.aamva {
            changed.push(Subsystem::Aamva);
        }
        changed
    }

    /// Render the text form written by `WriteTextfileSettings`.
    pub fn to_ini(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "[Settings]");
        let _ = writeln!(out, "Version={}", Self::VERSION);
        let _ = writeln!(out);
        let _ = writeln!(out, "[DataToSend]");
        for tag in &self.data_to_send {
            let _ = writeln!(out, "{}=1", tag.vendor_name());
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "[RFIDSettings]");
        let _ = writeln!(out, "Enabled={}", u8::from(self.rf.enabled));
        let _ = writeln!(out, "BACKeyCorrection={}", u8::from(self.rf.bac_key_correction));
        let _ = writeln!(out, "ChipReadTimeout={}", self.rf.chip_read_timeout_ms);
        let _ = writeln!(out, "MaxAirBaud={}", self.rf.max_air_baud);
        let _ = writeln!(out);
        let _ = writeln!(out, "[SwipeSettings]");
        let _ = writeln!(out, "Enabled={}", u8::from(self.swipe.enabled));
        let _ = writeln!(out);
        let _ = writeln!(out, "[UHFSettings]");
        let _ = writeln!(out, "Enabled={}", u8::from(self.uhf.enabled));
        let _ = writeln!(out);
        let _ = writeln!(out, "[AAMVASettings]");
        let _ = writeln!(out, "Enabled={}", u8::from(self.aamva.enabled));
        let _ = writeln!(out);
        let _ = writeln!(out, "[DocDetectSettings]");
        let _ = writeln!(out, "DetectTimeout={}", self.detection.detect_timeout_ms);
        out
    }
}

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    let mut w = [0u8; 4];
    w.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(w)
}
