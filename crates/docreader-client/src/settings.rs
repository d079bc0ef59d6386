// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Settings transactions: fetch, edit, commit, persist.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, instrument};

use docreader_core::{ErrorCode, ReaderError, ReaderSettings, Result, Subsystem};
use docreader_engine::ReaderEngine;

/// What a commit did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub changed: bool,
    /// Subsystems the engine restarts for this commit; briefly unavailable.
    pub restarted: Vec<Subsystem>,
}

/// Settings fetched from the engine plus a working copy.
///
/// `commit` applies the working copy for the life of the process; `save`
/// makes the engine's current settings survive a restart.
pub struct SettingsTransaction {
    engine: Arc<dyn ReaderEngine>,
    original: ReaderSettings,
    working: ReaderSettings,
}

/// Fetch and decode the engine's settings blob.
pub fn fetch_settings(engine: &dyn ReaderEngine) -> Result<ReaderSettings> {
    let mut size = 0;
    engine
        .get_settings(&mut [], &mut size)
        .map_err(|code| ReaderError::engine(code, "GetSettings"))?;
    if size != ReaderSettings::BLOB_LEN {
        return Err(ReaderError::SettingsSizeMismatch {
            expected: ReaderSettings::BLOB_LEN,
            actual: size,
        });
    }

    let mut blob = vec![0u8; ReaderSettings::BLOB_LEN];
    match engine.get_settings(&mut blob, &mut size) {
        Ok(()) => ReaderSettings::decode(&blob),
        Err(ErrorCode::StringBufferTooSmall) => Err(ReaderError::SettingsSizeMismatch {
            expected: ReaderSettings::BLOB_LEN,
            actual: size,
        }),
        Err(code) => Err(ReaderError::engine(code, "GetSettings")),
    }
}

impl SettingsTransaction {
    pub fn begin(engine: Arc<dyn ReaderEngine>) -> Result<Self> {
        let original = fetch_settings(engine.as_ref())?;
        Ok(Self {
            engine,
            working: original.clone(),
            original,
        })
    }

    pub fn settings(&self) -> &ReaderSettings {
        &self.working
    }

    pub fn settings_mut(&mut self) -> &mut ReaderSettings {
        &mut self.working
    }

    pub fn is_dirty(&self) -> bool {
        self.working != self.original
    }

    /// Apply the working copy. Unchanged settings are not sent at all.
    #[instrument(skip(self))]
    pub fn commit(&mut self) -> Result<CommitOutcome> {
        if !self.is_dirty() {
            info!("settings unchanged, nothing to commit");
            return Ok(CommitOutcome {
                changed: false,
                restarted: Vec::new(),
            });
        }

        let restarted = self.original.changed_subsystems(&self.working);
        self.engine
            .update_settings(&self.working.encode())
            .map_err(|code| match code {
                ErrorCode::MismatchInAnEnum | ErrorCode::MismatchSettingSize => {
                    ReaderError::VersionSkew(code)
                }
                code => ReaderError::engine(code, "UpdateSettings"),
            })?;
        info!(restarted = ?restarted, "settings committed");
        self.original = self.working.clone();
        Ok(CommitOutcome {
            changed: true,
            restarted,
        })
    }

    /// Persist the engine's current settings. Uncommitted edits are not included.
    pub fn save(&self) -> Result<()> {
        self.engine
            .save_settings()
            .map_err(|code| ReaderError::engine(code, "SaveSettings"))?;
        info!("settings saved");
        Ok(())
    }

    /// Write the working copy in the engine's text format.
    pub fn export_text(&self, path: &Path) -> Result<()> {
        self.engine
            .write_text_settings(&self.working.encode(), path)
            .map_err(|code| ReaderError::engine(code, "WriteTextSettings"))?;
        info!(path = %path.display(), "settings exported");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docreader_core::{DataType, ReaderState};
    use docreader_engine::SimulatedEngine;

    fn started() -> SimulatedEngine {
        let engine = SimulatedEngine::sample();
        engine.initialise(None, false).unwrap();
        engine
    }

    #[test]
    fn unchanged_commit_sends_nothing() {
        let engine = started();
        let mut tx = SettingsTransaction::begin(Arc::new(engine.clone())).unwrap();
        let outcome = tx.commit().unwrap();
        assert!(!outcome.changed);
        assert_eq!(engine.restart_count(Subsystem::Rf), 0);
        assert_eq!(engine.state(), ReaderState::Enabled);
    }

    #[test]
    fn rf_change_reports_restart() {
        let engine = started();
        let mut tx = SettingsTransaction::begin(Arc::new(engine.clone())).unwrap();
        tx.settings_mut().rf.bac_key_correction = true;
        assert!(tx.is_dirty());

        let outcome = tx.commit().unwrap();
        assert_eq!(outcome.restarted, vec![Subsystem::Rf]);
        assert_eq!(engine.restart_count(Subsystem::Rf), 1);
        assert!(!tx.is_dirty());
        assert!(fetch_settings(&engine).unwrap().rf.bac_key_correction);
    }

    #[test]
    fn data_items_change_without_restart() {
        let engine = started();
        let mut tx = SettingsTransaction::begin(Arc::new(engine.clone())).unwrap();
        tx.settings_mut().enable(DataType::ImageBarcode);
        let outcome = tx.commit().unwrap();
        assert!(outcome.changed);
        assert!(outcome.restarted.is_empty());
    }

    #[test]
    fn save_survives_restart() {
        let engine = started();
        let mut tx = SettingsTransaction::begin(Arc::new(engine.clone())).unwrap();
        tx.settings_mut().disable(DataType::ImageUv);
        tx.commit().unwrap();
        tx.save().unwrap();

        engine.shutdown().unwrap();
        engine.initialise(None, false).unwrap();
        assert!(!fetch_settings(&engine).unwrap().is_enabled(DataType::ImageUv));
    }

    #[test]
    fn export_writes_ini() {
        let engine = started();
        let tx = SettingsTransaction::begin(Arc::new(engine)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.ini");
        tx.export_text(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("CD_CODELINE=1"));
    }

    #[test]
    fn needs_initialised_engine() {
        let engine = SimulatedEngine::sample();
        let err = fetch_settings(&engine).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::NotInitialised));
    }
}
