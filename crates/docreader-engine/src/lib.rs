// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// docreader-engine: the raw engine contract and the backends that implement it.
//
// `SimulatedEngine` replays fixtures in-process and is always available. The
// `native` feature adds the loader for the vendor shared library.

pub mod sim;
pub mod traits;

#[cfg(feature = "native")]
pub mod native;

use std::sync::Arc;

use docreader_core::config::BackendConfig;
use docreader_core::Result;

pub use sim::SimulatedEngine;
pub use traits::{EngineCallbacks, ReaderEngine};

/// Build the engine a configuration asks for.
pub fn engine_from_config(backend: &BackendConfig) -> Result<Arc<dyn ReaderEngine>> {
    match backend {
        BackendConfig::Simulated { fixture: None } => Ok(Arc::new(SimulatedEngine::sample())),
        BackendConfig::Simulated {
            fixture: Some(path),
        } => Ok(Arc::new(SimulatedEngine::from_file(path)?)),
        #[cfg(feature = "native")]
        BackendConfig::Native { library } => Ok(Arc::new(native::NativeEngine::load(library)?)),
        #[cfg(not(feature = "native"))]
        BackendConfig::Native { library } => Err(docreader_core::ReaderError::LibraryLoad(format!(
            "{}: built without the `native` feature",
            library.display()
        ))),
    }
}
