// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for docreader.

use thiserror::Error;

use crate::codes::ErrorCode;
use crate::types::ReaderState;

/// Top-level error type for all client operations.
#[derive(Debug, Error)]
pub enum ReaderError {
    // -- Engine errors --
    #[error("engine call {context} failed: {code}")]
    Engine { code: ErrorCode, context: String },

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("reader is not initialised")]
    NotInitialised,

    #[error("operation not allowed in reader state {0}")]
    InvalidState(ReaderState),

    #[error("engine and client disagree on a shared definition: {0}")]
    VersionSkew(ErrorCode),

    #[error("engine library could not be loaded: {0}")]
    LibraryLoad(String),

    #[error("the event stream has already been taken")]
    EventStreamTaken,

    // -- Data access errors --
    #[error("{0} is a plugin tag; use the plugin accessor")]
    PluginTagOnScalarAccessor(String),

    #[error("unknown data item tag: {0}")]
    UnknownTag(String),

    #[error("failed to decode {tag}: {detail}")]
    Decode { tag: String, detail: String },

    #[error("invalid codeline: {0}")]
    InvalidCodeline(String),

    // -- Settings errors --
    #[error("settings size mismatch: client expects {expected} bytes, engine has {actual}")]
    SettingsSizeMismatch { expected: usize, actual: usize },

    #[error("settings layout version {found} is not supported (expected {expected})")]
    SettingsVersion { expected: u32, found: u32 },

    // -- Kiosk forwarding --
    #[error("kiosk forward failed: {0}")]
    Kiosk(String),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReaderError {
    /// Wrap a raw engine code with the name of the call that produced it.
    pub fn engine(code: ErrorCode, context: impl Into<String>) -> Self {
        ReaderError::Engine {
            code,
            context: context.into(),
        }
    }

    /// The engine code behind this error, if there is one.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ReaderError::Engine { code, .. } | ReaderError::VersionSkew(code) => Some(*code),
            _ => None,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ReaderError>;
