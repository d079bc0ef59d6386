// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Decoder plugin registry.
//
// Plugins are addressed by name. Their results come back as
// (feature, part) records, each with its own format.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use docreader_core::{ErrorCode, PluginData, ReaderError, Result};
use docreader_engine::ReaderEngine;

/// Initial name buffer; long names grow it.
const NAME_BUF_LEN: usize = 32;

/// One record found by a plugin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginRecord {
    pub plugin: String,
    pub feature: usize,
    pub part: usize,
    pub data: PluginData,
}

#[derive(Clone)]
pub struct PluginRegistry {
    engine: Arc<dyn ReaderEngine>,
}

impl PluginRegistry {
    pub fn new(engine: Arc<dyn ReaderEngine>) -> Self {
        Self { engine }
    }

    /// Every plugin the engine knows about, loaded or not, in processing order.
    pub fn names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut buf = vec![0u8; NAME_BUF_LEN];
        let mut index = 0;
        loop {
            let mut len = buf.len();
            match self.engine.plugin_name(&mut buf, &mut len, index) {
                Ok(()) => {}
                Err(ErrorCode::StringBufferTooSmall) if len > buf.len() => {
                    debug!(index, needed = len, "growing plugin name buffer");
                    buf.resize(len, 0);
                    continue;
                }
                Err(code) => return Err(ReaderError::engine(code, "GetPluginName")),
            }
            let end = buf[..len.min(buf.len())]
                .iter()
                .position(|b| *b == 0)
                .unwrap_or(len.min(buf.len()));
            if end == 0 {
                break;
            }
            names.push(String::from_utf8_lossy(&buf[..end]).into_owned());
            index += 1;
        }
        Ok(names)
    }

    /// One record, or `None` once `feature` or `part` runs past the results.
    pub fn get(&self, plugin: &str, feature: usize, part: usize) -> Result<Option<PluginData>> {
        self.engine
            .get_plugin_data(plugin, feature, part)
            .map_err(|code| ReaderError::engine(code, "GetPluginData"))
    }

    /// Every record of `plugin`, feature by feature, part by part.
    pub fn features(&self, plugin: &str) -> Result<Vec<PluginRecord>> {
        let mut records = Vec::new();
        for feature in 0.. {
            let mut part = 0;
            while let Some(data) = self.get(plugin, feature, part)? {
                records.push(PluginRecord {
                    plugin: plugin.to_string(),
                    feature,
                    part,
                    data,
                });
                part += 1;
            }
            if part == 0 {
                break;
            }
        }
        Ok(records)
    }

    /// Records from every enabled plugin.
    pub fn all_records(&self) -> Result<Vec<PluginRecord>> {
        let mut records = Vec::new();
        for name in self.names()? {
            if self.is_enabled(&name)? {
                records.extend(self.features(&name)?);
            }
        }
        Ok(records)
    }

    pub fn enable(&self, plugin: &str) -> Result<()> {
        self.engine
            .enable_plugin(plugin, true)
            .map_err(|code| ReaderError::engine(code, format!("EnablePlugin({plugin})")))?;
        info!(plugin, "plugin enabled");
        Ok(())
    }

    /// Succeeds for a plugin that never loaded.
    pub fn disable(&self, plugin: &str) -> Result<()> {
        self.engine
            .enable_plugin(plugin, false)
            .map_err(|code| ReaderError::engine(code, format!("EnablePlugin({plugin})")))?;
        info!(plugin, "plugin disabled");
        Ok(())
    }

    pub fn is_enabled(&self, plugin: &str) -> Result<bool> {
        self.engine
            .is_plugin_enabled(plugin)
            .map_err(|code| ReaderError::engine(code, format!("IsPluginEnabled({plugin})")))
    }

    pub fn set_order(&self, plugin: &str, order: usize) -> Result<()> {
        self.engine
            .set_plugin_order(plugin, order)
            .map_err(|code| ReaderError::engine(code, format!("SetPluginOrder({plugin})")))
    }

    /// Disable every enabled plugin. Returns how many were switched off.
    pub fn disable_all(&self) -> Result<usize> {
        let mut disabled = 0;
        for name in self.names()? {
            if self.is_enabled(&name)? {
                self.disable(&name)?;
                disabled += 1;
            }
        }
        Ok(disabled)
    }

    /// Enable exactly `wanted`, in that order; everything else is disabled.
    /// Names that are not loaded are skipped with a warning.
    pub fn apply_order(&self, wanted: &[String]) -> Result<()> {
        let known = self.names()?;
        for name in &known {
            if !wanted.contains(name) && self.is_enabled(name)? {
                self.disable(name)?;
            }
        }
        for (order, name) in wanted.iter().enumerate() {
            if !known.contains(name) {
                warn!(plugin = %name, "configured plugin is not installed");
                continue;
            }
            match self.enable(name) {
                Ok(()) => self.set_order(name, order)?,
                Err(ReaderError::Engine {
                    code: ErrorCode::PluginNotLoaded,
                    ..
                }) => warn!(plugin = %name, "configured plugin failed to load"),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
