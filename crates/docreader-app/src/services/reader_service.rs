// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Resolves the effective configuration and opens reader sessions for the
// command handlers.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use docreader_client::Session;
use docreader_client::bac::{BacCorrector, MrzLines, MrzParts};
use docreader_core::config::BackendConfig;
use docreader_core::{DeliveryMode, ReaderConfig, Result};
use docreader_engine::{ReaderEngine, engine_from_config};
use tracing::{info, warn};

use super::data_dir;

/// Command-line overrides for the backend section of the config.
#[derive(Debug, Clone, Default)]
pub struct BackendOverride {
    pub native: Option<bool>,
    pub library: Option<PathBuf>,
    pub fixture: Option<PathBuf>,
}

pub struct ReaderService {
    config: ReaderConfig,
}

impl ReaderService {
    /// Load `path`, or the default config file when it exists, or defaults.
    pub fn load(path: Option<&Path>, backend: &BackendOverride) -> Result<Self> {
        let mut config = match path {
            Some(path) => ReaderConfig::load(path)?,
            None => {
                let default_path = data_dir::config_path();
                if default_path.exists() {
                    ReaderConfig::load(&default_path)?
                } else {
                    ReaderConfig::default()
                }
            }
        };
        apply_backend_override(&mut config, backend);

        if config.vendor_logging.enabled && config.vendor_logging.file.is_none() {
            config.vendor_logging.file = Some(data_dir::data_subdir("logs").join("mmmreader.log"));
        }
        info!(backend = ?config.backend, "configuration resolved");
        Ok(Self { config })
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// A fresh, uninitialised engine.
    pub fn engine(&self) -> Result<Arc<dyn ReaderEngine>> {
        engine_from_config(&self.config.backend)
    }

    pub fn open(
        &self,
        mode: DeliveryMode,
        corrector: Option<Arc<dyn BacCorrector>>,
    ) -> Result<Session> {
        let mut config = self.config.clone();
        config.delivery = mode;
        Session::from_config(&config, corrector)
    }
}

fn apply_backend_override(config: &mut ReaderConfig, backend: &BackendOverride) {
    let native = match backend.native {
        Some(native) => native,
        None => matches!(config.backend, BackendConfig::Native { .. }) || backend.library.is_some(),
    };
    if native {
        let library = match (&backend.library, &config.backend) {
            (Some(library), _) => library.clone(),
            (None, BackendConfig::Native { library }) => library.clone(),
            (None, BackendConfig::Simulated { .. }) => PathBuf::from(default_library()),
        };
        if backend.fixture.is_some() {
            warn!("--fixture has no effect with the native backend");
        }
        config.backend = BackendConfig::Native { library };
    } else {
        let fixture = match (&backend.fixture, &config.backend) {
            (Some(fixture), _) => Some(fixture.clone()),
            (None, BackendConfig::Simulated { fixture }) => fixture.clone(),
            (None, BackendConfig::Native { .. }) => None,
        };
        config.backend = BackendConfig::Simulated { fixture };
    }
}

fn default_library() -> &'static str {
    if cfg!(windows) {
        "MMMReaderHighLevelAPI.dll"
    } else {
        "libMMMReaderHighLevelAPI.so"
    }
}

/// Asks on the terminal for a corrected MRZ, one line at a time. An empty
/// answer keeps that line as the engine read it.
pub struct PromptCorrector;

impl BacCorrector for PromptCorrector {
    fn correct(&self, mrz: MrzParts<'_>) -> Option<MrzLines> {
        let shown = mrz.remainder.trim_start_matches('\r');
        let mut out = std::io::stderr().lock();
        // Terminal output failures only lose the prompt.
        let _ = writeln!(out, "BAC key from OCR:");
        let _ = writeln!(out, "  {}", mrz.line1);
        let _ = writeln!(out, "  {shown}");
        drop(out);

        let line1 = ask("Line 1 (empty keeps it): ")?;
        let remainder = ask("Line 2 (empty keeps it): ")?;
        merge_answers(mrz, &line1, &remainder)
    }
}

fn ask(prompt: &str) -> Option<String> {
    let mut out = std::io::stderr().lock();
    let _ = write!(out, "{prompt}");
    let _ = out.flush();
    let mut line = String::new();
    if let Err(e) = std::io::stdin().lock().read_line(&mut line) {
        warn!(error = %e, "could not read BAC correction");
        return None;
    }
    Some(line.trim().to_string())
}

/// Combines typed answers with the engine's lines. `None` when nothing changed.
fn merge_answers(mrz: MrzParts<'_>, line1: &str, remainder: &str) -> Option<MrzLines> {
    if line1.is_empty() && remainder.is_empty() {
        return None;
    }
    let mut lines = mrz.to_lines();
    if !line1.is_empty() {
        lines.line1 = line1.to_string();
    }
    if !remainder.is_empty() {
        let separator = if mrz.remainder.starts_with('\r') { "\r" } else { "" };
        lines.remainder = format!("{separator}{remainder}");
    }
    Some(lines)
}
