// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Config and data directory resolution.

use std::path::{Path, PathBuf};

const APP_DIR: &str = "docreader";

/// Directory holding `config.json`. Not created here; saving the config does that.
pub fn config_dir() -> PathBuf {
    resolve(
        std::env::var("XDG_CONFIG_HOME").ok(),
        std::env::var("HOME").ok(),
        Path::new(".config"),
    )
    .join(APP_DIR)
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Application data directory (vendor engine logs), created if needed.
pub fn data_dir() -> PathBuf {
    let dir = resolve(
        std::env::var("XDG_DATA_HOME").ok(),
        std::env::var("HOME").ok(),
        &Path::new(".local").join("share"),
    )
    .join(APP_DIR);
    std::fs::create_dir_all(&dir).ok();
    dir
}

/// Return a subdirectory inside the data dir (e.g. "logs").
pub fn data_subdir(name: &str) -> PathBuf {
    let dir = data_dir().join(name);
    std::fs::create_dir_all(&dir).ok();
    dir
}

fn resolve(xdg: Option<String>, home: Option<String>, under_home: &Path) -> PathBuf {
    // Try the XDG variable, then fall back to home
    if let Some(xdg) = xdg.filter(|x| !x.is_empty()) {
        return PathBuf::from(xdg);
    }
    if let Some(home) = home {
        return PathBuf::from(home).join(under_home);
    }
    // Last resort
    std::env::temp_dir()
}
