// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The raw engine contract.
//
// `ReaderEngine` mirrors the vendor C entry points one to one, with slices in
// place of pointer/length pairs. Buffer-returning calls keep the two-phase
// convention: call with an empty buffer to learn the length, then fetch.

use std::path::Path;
use std::sync::Arc;

use docreader_core::{
    CertificateType, EngineResult, ErrorCode, EventCode, PluginData, PluginFeature, ReaderState, Tag,
};

/// Receiver for everything the engine pushes in Non-Blocking mode.
///
/// Callbacks run on engine threads. Implementations must return quickly and
/// must not call back into the engine's lifecycle operations.
pub trait EngineCallbacks: Send + Sync {
    /// One data item instance. The slice is only valid for the duration of the call.
    fn on_data(&self, tag: Tag, data: &[u8]);

    /// A plugin-decoded record, already copied out of engine memory.
    fn on_plugin_data(&self, feature: PluginFeature, data: PluginData) {
        let _ = (feature, data);
    }

    fn on_event(&self, event: EventCode);

    fn on_error(&self, code: ErrorCode, message: &str);

    fn on_warning(&self, code: ErrorCode, message: &str);

    /// The MRZ about to be used as the BAC key, NUL-terminated, in a buffer the
    /// callee may rewrite. Called on its own thread; RFID processing waits for it.
    fn on_bac_key_correction(&self, mrz: &mut [u8]);

    /// The engine needs a certificate or private key it does not hold, named
    /// by `identifier`. Return its encoded bytes, or `None` to let RFID
    /// processing continue without it. Called on an engine thread that waits
    /// for the answer.
    fn on_certificate(&self, identifier: &str, kind: CertificateType) -> Option<Vec<u8>> {
        let _ = (identifier, kind);
        None
    }
}

/// One-to-one view of the engine's C ABI.
///
/// `get_data`, `plugin_name`, `get_settings`, `connected_scanners` and
/// `error_message` take `len` as the caller's buffer capacity and set it to the
/// length the engine needs. A buffer that is too small is an error, never a
/// truncation, and leaves the buffer untouched.
pub trait ReaderEngine: Send + Sync {
    /// Short backend label for logs ("simulated", "native").
    fn backend_name(&self) -> &str;

    // -- Lifecycle --

    /// `None` selects Blocking mode; callbacks select Non-Blocking mode.
    fn initialise(
        &self,
        callbacks: Option<Arc<dyn EngineCallbacks>>,
        process_messages: bool,
    ) -> EngineResult<()>;

    fn shutdown(&self) -> EngineResult<()>;

    fn is_initialised(&self) -> bool;

    fn state(&self) -> ReaderState;

    fn set_state(&self, state: ReaderState, force_redetect: bool) -> EngineResult<()>;

    // -- Document flow --

    fn is_document_on_window(&self) -> EngineResult<bool>;

    /// Succeeds only for a newly detected document. A document that is still
    /// on the window after being read does not count; that is `TimedOut`.
    fn wait_for_document_on_window(&self, timeout_ms: u32) -> EngineResult<()>;

    /// In Blocking mode, returns once every configured item has been produced.
    fn read_document(&self) -> EngineResult<()>;

    fn force_read(&self) -> EngineResult<()>;

    fn clear_data(&self) -> EngineResult<()>;

    /// Best-effort cancel of an in-flight chip read.
    fn rf_abort(&self) -> EngineResult<()>;

    // -- Data --

    /// Absent items (not configured, not yet produced, index out of range)
    /// succeed with `*len == 0`.
    fn get_data(&self, tag: Tag, buf: &mut [u8], len: &mut usize, index: usize) -> EngineResult<()>;

    fn get_data_count(&self, tag: Tag) -> EngineResult<usize>;

    /// `None` once `feature` or `part` runs past the plugin's results.
    fn get_plugin_data(
        &self,
        plugin: &str,
        feature: usize,
        part: usize,
    ) -> EngineResult<Option<PluginData>>;

    // -- Plugins --

    /// Name of the plugin at `index`; an empty name ends the enumeration.
    fn plugin_name(&self, buf: &mut [u8], len: &mut usize, index: usize) -> EngineResult<()>;

    fn enable_plugin(&self, plugin: &str, enabled: bool) -> EngineResult<()>;

    fn is_plugin_enabled(&self, plugin: &str) -> EngineResult<bool>;

    fn set_plugin_order(&self, plugin: &str, order: usize) -> EngineResult<()>;

    // -- Settings --

    /// The buffer length must equal the engine's settings size, otherwise
    /// `StringBufferTooSmall` with `*size` set to the engine's size.
    fn get_settings(&self, buf: &mut [u8], size: &mut usize) -> EngineResult<()>;

    fn update_settings(&self, blob: &[u8]) -> EngineResult<()>;

    fn save_settings(&self) -> EngineResult<()>;

    fn write_text_settings(&self, blob: &[u8], path: &Path) -> EngineResult<()>;

    // -- Scanners --

    /// Semicolon-separated serial numbers.
    fn connected_scanners(&self, buf: &mut [u8], len: &mut usize) -> EngineResult<()>;

    fn select_scanner(&self, serial: &str) -> EngineResult<()>;

    // -- Diagnostics --

    fn enable_logging(
        &self,
        enabled: bool,
        level: i32,
        mask: i32,
        file: Option<&Path>,
    ) -> EngineResult<()>;

    fn last_error(&self) -> ErrorCode;

    fn error_message(&self, code: ErrorCode, buf: &mut [u8], len: &mut usize) -> EngineResult<()>;
}

/// Copy `src` into `buf` under the two-phase rules shared by every backend.
pub fn fill_buffer(src: &[u8], buf: &mut [u8], len: &mut usize, too_small: ErrorCode) -> EngineResult<()> {
    *len = src.len();
    if buf.is_empty() {
        return Ok(());
    }
    if buf.len() < src.len() {
        return Err(too_small);
    }
    buf[..src.len()].copy_from_slice(src);
    Ok(())
}

/// `text` plus its terminating NUL, as the engine hands out strings.
pub fn c_string_bytes(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len() + 1);
    bytes.extend_from_slice(text.as_bytes());
    bytes.push(0);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_reports_length_without_writing() {
        let mut len = 0;
        fill_buffer(b"abc\0", &mut [], &mut len, ErrorCode::DataBufferTooSmall).unwrap();
        assert_eq!(len, 4);
    }

    #[test]
    fn short_buffer_is_untouched() {
        let mut buf = [0xaa; 3];
        let mut len = buf.len();
        let err = fill_buffer(b"abc\0", &mut buf, &mut len, ErrorCode::DataBufferTooSmall).unwrap_err();
        assert_eq!(err, ErrorCode::DataBufferTooSmall);
        assert_eq!(len, 4);
        assert_eq!(buf, [0xaa; 3]);
    }

    #[test]
    fn c_strings_are_terminated() {
        assert_eq!(c_string_bytes("PDF417"), b"PDF417\0".to_vec());
    }
}
