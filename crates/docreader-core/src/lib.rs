// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// docreader: core types, data item registry and error definitions shared across all crates.

#[macro_use]
mod macros;

pub mod codeline;
pub mod codes;
pub mod config;
pub mod data_type;
pub mod dgc;
pub mod error;
pub mod human_errors;
pub mod settings;
pub mod types;
pub mod value;

pub use codeline::{Codeline, CodelineData, MrzFormat};
pub use codes::{EdvResultCode, EngineResult, ErrorCode};
pub use config::ReaderConfig;
pub use data_type::{CD_PLUGIN, DataType, NUM_MMMR_DATATYPES, PayloadShape, PluginFeature, Tag};
pub use dgc::GreenCertificate;
pub use error::{ReaderError, Result};
pub use settings::{ReaderSettings, Subsystem};
pub use types::*;
pub use value::DataValue;
