// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ReaderEngine over the vendor shared library.
//
// The library is loaded at runtime so the client builds and runs without the
// vendor SDK installed. Callbacks reach Rust through `extern "C"` trampolines;
// the `aParam` context pointer is a leaked `Box<Arc<dyn EngineCallbacks>>`
// that lives from `initialise` until `shutdown`.

pub mod ffi;

use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::ptr;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use docreader_core::{
    CD_PLUGIN, CertificateType, DataType, EngineResult, ErrorCode, EventCode, PluginData, PluginDataFormat,
    PluginFeature, ReaderError, ReaderState, Result, Tag,
};

use crate::traits::{EngineCallbacks, ReaderEngine, fill_buffer};
use ffi::{MmmReaderLibrary, RawPluginData};

/// Scratch size for scanner lists; the vendor call has no probe phase.
const SCANNER_LIST_LEN: usize = 4096;

type Context = *mut Arc<dyn EngineCallbacks>;

struct CallbackContext(Context);

// SAFETY: the pointer is only dereferenced by the engine's callback threads,
// and the pointee is `Send + Sync`.
unsafe impl Send for CallbackContext {}

pub struct NativeEngine {
    lib: MmmReaderLibrary,
    context: Mutex<Option<CallbackContext>>,
}

impl NativeEngine {
    pub fn load(path: &Path) -> Result<Self> {
        // SAFETY: the library at `path` is the MMMReader high-level API, whose
        // exported signatures are mirrored in `ffi`.
        let lib = unsafe { MmmReaderLibrary::load(path) }
            .map_err(|e| ReaderError::LibraryLoad(format!("{}: {e}", path.display())))?;
        info!(library = %path.display(), "loaded vendor engine");
        Ok(Self {
            lib,
            context: Mutex::new(None),
        })
    }

    fn release_context(&self) {
        let taken = self
            .context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(CallbackContext(ptr)) = taken {
            // SAFETY: `ptr` came from `Box::into_raw` in `initialise` and the
            // engine no longer calls back once shut down.
            drop(unsafe { Box::from_raw(ptr) });
        }
    }
}

fn c_string(text: &str) -> EngineResult<CString> {
    CString::new(text).map_err(|_| ErrorCode::InvalidParameter)
}

fn c_len(len: usize) -> c_int {
    c_int::try_from(len).unwrap_or(c_int::MAX)
}

fn buf_ptr(buf: &mut [u8]) -> *mut c_void {
    if buf.is_empty() {
        ptr::null_mut()
    } else {
        buf.as_mut_ptr().cast()
    }
}

/// Copy a NUL-terminated engine string.
///
/// # Safety
///
/// `ptr` must be null or point at a NUL-terminated string.
unsafe fn owned_str(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // SAFETY: upheld by the caller.
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// # Safety
///
/// `raw` must point at a live `MMMReaderPluginData`.
unsafe fn copy_plugin_data(raw: &RawPluginData) -> PluginData {
    let data = if raw.data.is_null() || raw.data_len <= 0 {
        Vec::new()
    } else {
        // SAFETY: the engine guarantees `data_len` readable bytes at `data`.
        unsafe { std::slice::from_raw_parts(raw.data.cast::<u8>(), raw.data_len as usize) }.to_vec()
    };
    PluginData {
        // SAFETY: both names are engine-owned C strings or null.
        feature_name: unsafe { owned_str(raw.feature_name) },
        field_name: unsafe { owned_str(raw.field_name) },
        feature_type_id: raw.feature_type_id,
        format: PluginDataFormat::from_raw(raw.data_format),
        data,
    }
}

/// # Safety
///
/// `param` must be null or the context pointer handed to `MMMReader_Initialise`.
unsafe fn callbacks<'a>(param: *mut c_void) -> Option<&'a Arc<dyn EngineCallbacks>> {
    // SAFETY: upheld by the caller.
    unsafe { param.cast::<Arc<dyn EngineCallbacks>>().as_ref() }
}

unsafe extern "C" fn data_trampoline(
    param: *mut c_void,
    data_type: c_int,
    data_len: c_int,
    data: *mut c_void,
) {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: `param` is the context registered at initialisation.
        let Some(cb) = (unsafe { callbacks(param) }) else {
            return;
        };
        if data.is_null() {
            return;
        }
        let len = usize::try_from(data_len).unwrap_or(0);

        if data_type == DataType::BacKeyCorrection.raw() {
            // SAFETY: for this item the engine passes a writable buffer of
            // `data_len` bytes and waits for us to return.
            let mrz = unsafe { std::slice::from_raw_parts_mut(data.cast::<u8>(), len) };
            cb.on_bac_key_correction(mrz);
        } else if data_type >= CD_PLUGIN {
            // SAFETY: plugin-range items carry one `MMMReaderPluginData`.
            let plugin = unsafe { copy_plugin_data(&*data.cast::<RawPluginData>()) };
            cb.on_plugin_data(PluginFeature::from_feature_id(data_type - CD_PLUGIN), plugin);
        } else if let Some(tag) = Tag::from_raw(data_type) {
            // SAFETY: `data_len` bytes are readable for the duration of the call.
            let bytes = unsafe { std::slice::from_raw_parts(data.cast::<u8>(), len) };
            cb.on_data(tag, bytes);
        } else {
            debug!(data_type, "ignoring unknown data item");
        }
    }));
    if outcome.is_err() {
        warn!(data_type, "data callback panicked");
    }
}

unsafe extern "C" fn event_trampoline(param: *mut c_void, event: c_int) {
    let _ = catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: `param` is the context registered at initialisation.
        let Some(cb) = (unsafe { callbacks(param) }) else {
            return;
        };
        match EventCode::from_raw(event) {
            Some(event) => cb.on_event(event),
            None => debug!(event, "ignoring unknown event"),
        }
    }));
}

unsafe extern "C" fn error_trampoline(param: *mut c_void, code: c_int, message: *const c_char) {
    let _ = catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: `param` is the context; `message` is an engine C string.
        if let Some(cb) = unsafe { callbacks(param) } {
            cb.on_error(ErrorCode::from_raw(code), &unsafe { owned_str(message) });
        }
    }));
}

unsafe extern "C" fn warning_trampoline(param: *mut c_void, code: c_int, message: *const c_char) {
    let _ = catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: `param` is the context; `message` is an engine C string.
        if let Some(cb) = unsafe { callbacks(param) } {
            cb.on_warning(ErrorCode::from_raw(code), &unsafe { owned_str(message) });
        }
    }));
}

unsafe extern "C" fn certificate_trampoline(
    param: *mut c_void,
    identifier: *const c_char,
    identifier_len: c_int,
    cert_type: c_int,
    buffer: *mut u8,
    buffer_len: *mut c_int,
) -> bool {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: `param` is the context registered at initialisation.
        let Some(cb) = (unsafe { callbacks(param) }) else {
            return false;
        };
        if buffer_len.is_null() {
            return false;
        }
        let Some(kind) = CertificateType::from_raw(cert_type) else {
            debug!(cert_type, "ignoring unknown certificate type");
            return false;
        };
        // SAFETY: `identifier` is an engine string of `identifier_len` chars.
        let identifier = unsafe { sized_str(identifier, identifier_len) };
        let Some(cert) = cb.on_certificate(&identifier, kind) else {
            return false;
        };

        // SAFETY: `buffer_len` is the engine's in/out length for this call and
        // `buffer` holds that many writable bytes.
        let capacity = usize::try_from(unsafe { *buffer_len }).unwrap_or(0);
        let dest: &mut [u8] = if buffer.is_null() || capacity == 0 {
            &mut []
        } else {
            unsafe { std::slice::from_raw_parts_mut(buffer, capacity) }
        };
        let fitted = place_certificate(&cert, dest);
        // SAFETY: as above.
        unsafe { *buffer_len = c_int::try_from(cert.len()).unwrap_or(c_int::MAX) };
        if !fitted {
            warn!(identifier = %identifier, needed = cert.len(), capacity, "certificate larger than engine buffer");
        }
        fitted
    }));
    outcome.unwrap_or(false)
}

/// Copy `cert` to the front of `buffer` if it fits.
fn place_certificate(cert: &[u8], buffer: &mut [u8]) -> bool {
    match buffer.get_mut(..cert.len()) {
        Some(dest) => {
            dest.copy_from_slice(cert);
            true
        }
        None => false,
    }
}

/// # Safety
///
/// `ptr` must be null, or point at `len` readable chars, or at a
/// NUL-terminated string when `len` is not positive.
unsafe fn sized_str(ptr: *const c_char, len: c_int) -> String {
    match usize::try_from(len) {
        Ok(len) if len > 0 && !ptr.is_null() => {
            // SAFETY: upheld by the caller.
            let bytes = unsafe { std::slice::from_raw_parts(ptr.cast::<u8>(), len) };
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            String::from_utf8_lossy(&bytes[..end]).into_owned()
        }
        // SAFETY: upheld by the caller.
        _ => unsafe { owned_str(ptr) },
    }
}

impl Drop for NativeEngine {
    fn drop(&mut self) {
        if self.is_initialised() {
            let _ = self.shutdown();
        }
        self.release_context();
    }
}

// Every `unsafe` block below calls a resolved entry point with pointers into
// buffers that outlive the call; the engine does not retain them.
impl ReaderEngine for NativeEngine {
    fn backend_name(&self) -> &str {
        "native"
    }

    fn initialise(
        &self,
        callbacks: Option<Arc<dyn EngineCallbacks>>,
        process_messages: bool,
    ) -> EngineResult<()> {
        let Some(callbacks) = callbacks else {
            // SAFETY: no callbacks, no context.
            let code = unsafe {
                (self.lib.initialise)(None, None, None, None, process_messages, false, ptr::null_mut())
            };
            return ErrorCode::check(code);
        };

        let context: Context = Box::into_raw(Box::new(callbacks));
        // SAFETY: `context` stays alive until `release_context`.
        let code = unsafe {
            (self.lib.initialise)(
                Some(data_trampoline),
                Some(event_trampoline),
                Some(error_trampoline),
                Some(certificate_trampoline),
                process_messages,
                false,
                context.cast(),
            )
        };
        if let Err(code) = ErrorCode::check(code) {
            // SAFETY: the engine refused the context, so nothing else holds it.
            drop(unsafe { Box::from_raw(context) });
            return Err(code);
        }
        *self.context.lock().unwrap_or_else(PoisonError::into_inner) = Some(CallbackContext(context));

        // SAFETY: plain registration of a function pointer.
        let warnings = unsafe { (self.lib.set_warning_callback)(Some(warning_trampoline)) };
        if let Err(code) = ErrorCode::check(warnings) {
            warn!(code = %code, "warning callback not registered");
        }
        Ok(())
    }

    fn shutdown(&self) -> EngineResult<()> {
        // SAFETY: no arguments.
        let result = ErrorCode::check(unsafe { (self.lib.shutdown)() });
        self.release_context();
        result
    }

    fn is_initialised(&self) -> bool {
        // SAFETY: no arguments.
        unsafe { (self.lib.is_initialised)() }
    }

    fn state(&self) -> ReaderState {
        // SAFETY: no arguments.
        let raw = unsafe { (self.lib.get_state)() };
        ReaderState::from_raw(raw).unwrap_or(ReaderState::Errored)
    }

    fn set_state(&self, state: ReaderState, force_redetect: bool) -> EngineResult<()> {
        // SAFETY: value arguments only.
        ErrorCode::check(unsafe { (self.lib.set_state)(state.raw(), force_redetect) })
    }

    fn is_document_on_window(&self) -> EngineResult<bool> {
        // SAFETY: no arguments.
        Ok(unsafe { (self.lib.is_document_on_window)() })
    }

    fn wait_for_document_on_window(&self, timeout_ms: u32) -> EngineResult<()> {
        let timeout = c_int::try_from(timeout_ms).unwrap_or(c_int::MAX);
        // SAFETY: value argument only.
        ErrorCode::check(unsafe { (self.lib.wait_for_document_on_window)(timeout) })
    }

    fn read_document(&self) -> EngineResult<()> {
        // SAFETY: no arguments.
        ErrorCode::check(unsafe { (self.lib.read_document)() })
    }

    fn force_read(&self) -> EngineResult<()> {
        // SAFETY: no arguments.
        ErrorCode::check(unsafe { (self.lib.force_read)() })
    }

    fn clear_data(&self) -> EngineResult<()> {
        // SAFETY: no arguments.
        ErrorCode::check(unsafe { (self.lib.clear_data)() })
    }

    fn rf_abort(&self) -> EngineResult<()> {
        // SAFETY: no arguments.
        ErrorCode::check(unsafe { (self.lib.rf_abort)() })
    }

    fn get_data(&self, tag: Tag, buf: &mut [u8], len: &mut usize, index: usize) -> EngineResult<()> {
        let mut raw_len = c_len(buf.len());
        let index = c_int::try_from(index).map_err(|_| ErrorCode::InvalidParameter)?;
        // SAFETY: `buf` holds `raw_len` writable bytes, or is null with length 0.
        let code = unsafe { (self.lib.get_data)(tag.raw(), buf_ptr(buf), &mut raw_len, index) };
        *len = usize::try_from(raw_len).unwrap_or(0);
        ErrorCode::check(code)
    }

    fn get_data_count(&self, tag: Tag) -> EngineResult<usize> {
        let mut count: c_int = 0;
        // SAFETY: `count` is a valid out-pointer.
        ErrorCode::check(unsafe { (self.lib.get_data_count)(tag.raw(), &mut count) })?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn get_plugin_data(
        &self,
        plugin: &str,
        feature: usize,
        part: usize,
    ) -> EngineResult<Option<PluginData>> {
        let name = c_string(plugin)?;
        let feature = c_int::try_from(feature).map_err(|_| ErrorCode::InvalidParameter)?;
        let part = c_int::try_from(part).map_err(|_| ErrorCode::InvalidParameter)?;
        let mut out: *mut RawPluginData = ptr::null_mut();
        // SAFETY: the engine only reads the name; `out` is a valid out-pointer.
        let code = unsafe {
            (self.lib.get_plugin_data)(name.as_ptr().cast_mut(), feature, part, &mut out)
        };
        match ErrorCode::check(code) {
            Ok(()) if out.is_null() => Ok(None),
            // SAFETY: on success `out` points at engine-owned plugin data.
            Ok(()) => Ok(Some(unsafe { copy_plugin_data(&*out) })),
            Err(ErrorCode::InvalidParameter) if out.is_null() => Ok(None),
            Err(code) => Err(code),
        }
    }

    fn plugin_name(&self, buf: &mut [u8], len: &mut usize, index: usize) -> EngineResult<()> {
        let mut raw_len = c_len(buf.len());
        let index = c_int::try_from(index).map_err(|_| ErrorCode::InvalidParameter)?;
        // SAFETY: `buf` holds `raw_len` writable bytes, or is null with length 0.
        let code = unsafe { (self.lib.get_plugin_name)(buf_ptr(buf).cast(), &mut raw_len, index) };
        *len = usize::try_from(raw_len).unwrap_or(0);
        ErrorCode::check(code)
    }

    fn enable_plugin(&self, plugin: &str, enabled: bool) -> EngineResult<()> {
        let name = c_string(plugin)?;
        // SAFETY: the engine only reads the name.
        ErrorCode::check(unsafe { (self.lib.enable_plugin)(name.as_ptr().cast_mut(), enabled) })
    }

    fn is_plugin_enabled(&self, plugin: &str) -> EngineResult<bool> {
        let name = c_string(plugin)?;
        let mut enabled = false;
        // SAFETY: the engine only reads the name; `enabled` is a valid out-pointer.
        ErrorCode::check(unsafe {
            (self.lib.is_plugin_enabled)(name.as_ptr().cast_mut(), &mut enabled)
        })?;
        Ok(enabled)
    }

    fn set_plugin_order(&self, plugin: &str, order: usize) -> EngineResult<()> {
        let name = c_string(plugin)?;
        let order = c_int::try_from(order).map_err(|_| ErrorCode::InvalidParameter)?;
        // SAFETY: the engine only reads the name.
        ErrorCode::check(unsafe { (self.lib.set_plugin_order)(name.as_ptr().cast_mut(), order) })
    }

    fn get_settings(&self, buf: &mut [u8], size: &mut usize) -> EngineResult<()> {
        let mut raw_size = c_len(buf.len());
        // SAFETY: `buf` holds `raw_size` writable bytes, or is null with size 0.
        let code = unsafe { (self.lib.get_settings)(buf_ptr(buf), &mut raw_size) };
        *size = usize::try_from(raw_size).unwrap_or(0);
        ErrorCode::check(code)
    }

    fn update_settings(&self, blob: &[u8]) -> EngineResult<()> {
        let mut owned = blob.to_vec();
        // SAFETY: the engine reads a settings struct from the copy.
        ErrorCode::check(unsafe { (self.lib.update_settings)(owned.as_mut_ptr().cast()) })
    }

    fn save_settings(&self) -> EngineResult<()> {
        // SAFETY: no arguments.
        ErrorCode::check(unsafe { (self.lib.save_settings)() })
    }

    fn write_text_settings(&self, blob: &[u8], path: &Path) -> EngineResult<()> {
        let path = c_string(&path.to_string_lossy())?;
        let mut owned = blob.to_vec();
        // SAFETY: both pointers are valid for the duration of the call.
        ErrorCode::check(unsafe {
            (self.lib.write_textfile_settings)(owned.as_mut_ptr().cast(), path.as_ptr().cast_mut())
        })
    }

    fn connected_scanners(&self, buf: &mut [u8], len: &mut usize) -> EngineResult<()> {
        let mut scratch = vec![0u8; SCANNER_LIST_LEN];
        let mut count: c_int = 0;
        // SAFETY: `scratch` holds `SCANNER_LIST_LEN` writable bytes.
        let code = unsafe {
            (self.lib.get_connected_scanners)(scratch.as_mut_ptr().cast(), c_len(scratch.len()), &mut count)
        };
        ErrorCode::check(code)?;
        let end = scratch.iter().position(|b| *b == 0).unwrap_or(scratch.len() - 1);
        debug!(count, "connected scanners");
        fill_buffer(&scratch[..=end], buf, len, ErrorCode::StringBufferTooSmall)
    }

    fn select_scanner(&self, serial: &str) -> EngineResult<()> {
        let serial = c_string(serial)?;
        // SAFETY: the engine only reads the serial.
        ErrorCode::check(unsafe { (self.lib.select_scanner)(serial.as_ptr()) })
    }

    fn enable_logging(
        &self,
        enabled: bool,
        level: i32,
        mask: i32,
        file: Option<&Path>,
    ) -> EngineResult<()> {
        let file = file.map(|p| c_string(&p.to_string_lossy())).transpose()?;
        let file_ptr = file.as_ref().map_or(ptr::null_mut(), |f| f.as_ptr().cast_mut());
        // SAFETY: `file_ptr` is null or a C string that outlives the call.
        ErrorCode::check(unsafe { (self.lib.enable_logging)(enabled, level, mask, file_ptr) })
    }

    fn last_error(&self) -> ErrorCode {
        let mut code: c_int = 0;
        let mut len: c_int = 0;
        // SAFETY: a null string buffer with length 0 only reports the code.
        let _ = unsafe { (self.lib.get_last_error)(&mut code, ptr::null_mut(), &mut len) };
        ErrorCode::from_raw(code)
    }

    fn error_message(&self, code: ErrorCode, buf: &mut [u8], len: &mut usize) -> EngineResult<()> {
        let mut raw_len = c_len(buf.len());
        // SAFETY: `buf` holds `raw_len` writable bytes, or is null with length 0.
        let result = unsafe { (self.lib.get_error_message)(code.raw(), buf_ptr(buf).cast(), &mut raw_len) };
        *len = usize::try_from(raw_len).unwrap_or(0);
        ErrorCode::check(result)
    }
}
