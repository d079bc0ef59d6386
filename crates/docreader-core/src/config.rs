// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Client configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::DeliveryMode;

/// Which engine implementation to drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// In-process engine replaying a document fixture.
    Simulated {
        /// Fixture JSON; the built-in sample passport when absent.
        fixture: Option<PathBuf>,
    },
    /// The vendor shared library, loaded at runtime.
    Native { library: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

/// Engine-side (vendor) logging, separate from this crate's tracing output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub enabled: bool,
    /// Vendor log level, 0 (errors only) upwards.
    pub level: i32,
    /// Vendor log category mask.
    pub mask: i32,
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KioskConfig {
    /// Listener that receives one line per document.
    pub addr: String,
    pub timeout_ms: u64,
    /// Repeats of the same codeline inside this window are not forwarded.
    pub dedupe_window_ms: u64,
}

/// Persistent client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub backend: BackendConfig,
    pub delivery: DeliveryMode,
    /// Let the engine pump the host message loop on platforms that have one.
    pub process_messages: bool,
    /// Overall deadline for waiting on a document.
    pub wait_timeout_ms: u64,
    pub retry: RetrySettings,
    pub vendor_logging: LoggingConfig,
    pub kiosk: KioskConfig,
    /// Plugins to enable after initialisation, in order. Empty keeps the engine's choice.
    pub plugins: Vec<String>,
    /// Where to look when the engine asks for a certificate during a chip
    /// read. Unset declines every request.
    pub certificate_dir: Option<PathBuf>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::Simulated { fixture: None },
            delivery: DeliveryMode::Blocking,
            process_messages: false,
            wait_timeout_ms: 30_000,
            retry: RetrySettings {
                max_retries: 3,
                base_delay_ms: 500,
                max_delay_ms: 10_000,
            },
            vendor_logging: LoggingConfig {
                enabled: false,
                level: 0,
                mask: 0,
                file: None,
            },
            kiosk: KioskConfig {
                addr: "127.0.0.1:1010".into(),
                timeout_ms: 5_000,
                dedupe_window_ms: 3_000,
            },
            plugins: Vec::new(),
            certificate_dir: None,
        }
    }
}

impl ReaderConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "delivery": "NonBlocking", "backend": { "kind": "native", "library": "/opt/mmm/libMMMReaderHighLevelAPI.so" } }"#,
        )
        .unwrap();

        let config = ReaderConfig::load(&path).unwrap();
        assert_eq!(config.delivery, DeliveryMode::NonBlocking);
        assert_eq!(
            config.backend,
            BackendConfig::Native {
                library: "/opt/mmm/libMMMReaderHighLevelAPI.so".into()
            }
        );
        assert_eq!(config.kiosk.addr, "127.0.0.1:1010");
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn save_then_load_preserves_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = ReaderConfig::default();
        config.plugins = vec!["PDF417".into(), "QRCode".into()];
        config.save(&path).unwrap();
        assert_eq!(ReaderConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn malformed_file_is_a_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            ReaderConfig::load(&path),
            Err(crate::ReaderError::Serialization(_))
        ));
    }
}
