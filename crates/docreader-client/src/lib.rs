// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// docreader-client: the host side of a document reader engine. Typed data
// access, decoder plugins, push and pull delivery, settings transactions,
// conformance checks and kiosk forwarding, all over `docreader-engine`.

pub mod accessor;
pub mod bac;
pub mod certificates;
pub mod conformance;
pub mod delivery;
pub mod kiosk;
pub mod plugins;
pub mod retry;
pub mod session;
pub mod settings;

pub use accessor::Accessor;
pub use bac::BacCorrector;
pub use certificates::{CertificateDir, CertificateProvider};
pub use conformance::{Conformance, ConformanceReport};
pub use delivery::{DocumentRead, EventStream, ReaderEvent};
pub use kiosk::{KioskDeduper, KioskForwarder};
pub use plugins::PluginRegistry;
pub use session::{BlockingSession, Session};
pub use settings::SettingsTransaction;
