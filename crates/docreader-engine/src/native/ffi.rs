// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raw bindings for the MMMReader high-level API, resolved at runtime.
//
// Strings (`RTCHAR`) are narrow `char` on the platforms this loader targets.

use std::ffi::{c_char, c_int, c_void};
use std::path::Path;

use libloading::Library;

pub type DataCallback =
    unsafe extern "C" fn(param: *mut c_void, data_type: c_int, data_len: c_int, data: *mut c_void);

pub type EventCallback = unsafe extern "C" fn(param: *mut c_void, event: c_int);

pub type ErrorCallback =
    unsafe extern "C" fn(param: *mut c_void, code: c_int, message: *const c_char);

pub type WarningCallback =
    unsafe extern "C" fn(param: *mut c_void, code: c_int, message: *const c_char);

/// `MMMReaderCertificateCallback`. The engine offers a buffer of
/// `*buffer_len` bytes; on return `*buffer_len` holds the certificate length.
/// Returning `false` with a larger `*buffer_len` asks for a bigger buffer.
pub type CertificateCallback = unsafe extern "C" fn(
    param: *mut c_void,
    identifier: *const c_char,
    identifier_len: c_int,
    cert_type: c_int,
    buffer: *mut u8,
    buffer_len: *mut c_int,
) -> bool;

/// Mirror of `MMMReaderPluginData`. The engine owns the memory; copy out
/// before the next engine call.
#[repr(C)]
pub struct RawPluginData {
    pub feature_name: *const c_char,
    pub field_name: *const c_char,
    pub feature_type_id: c_int,
    pub data_format: c_int,
    pub data: *const c_void,
    pub data_len: c_int,
}

/// The loaded library and every entry point the client uses.
///
/// Function pointers stay valid as long as `_lib` is alive, which is the
/// lifetime of this struct.
pub struct MmmReaderLibrary {
    _lib: Library,
    pub initialise: unsafe extern "C" fn(
        Option<DataCallback>,
        Option<EventCallback>,
        Option<ErrorCallback>,
        Option<CertificateCallback>,
        bool,
        bool,
        *mut c_void,
    ) -> c_int,
    pub shutdown: unsafe extern "C" fn() -> c_int,
    pub is_initialised: unsafe extern "C" fn() -> bool,
    pub get_state: unsafe extern "C" fn() -> c_int,
    pub set_state: unsafe extern "C" fn(c_int, bool) -> c_int,
    pub set_warning_callback: unsafe extern "C" fn(Option<WarningCallback>) -> c_int,
    pub is_document_on_window: unsafe extern "C" fn() -> bool,
    pub wait_for_document_on_window: unsafe extern "C" fn(c_int) -> c_int,
    pub read_document: unsafe extern "C" fn() -> c_int,
    pub force_read: unsafe extern "C" fn() -> c_int,
    pub clear_data: unsafe extern "C" fn() -> c_int,
    pub rf_abort: unsafe extern "C" fn() -> c_int,
    pub get_data: unsafe extern "C" fn(c_int, *mut c_void, *mut c_int, c_int) -> c_int,
    pub get_data_count: unsafe extern "C" fn(c_int, *mut c_int) -> c_int,
    pub get_plugin_data:
        unsafe extern "C" fn(*mut c_char, c_int, c_int, *mut *mut RawPluginData) -> c_int,
    pub get_plugin_name: unsafe extern "C" fn(*mut c_char, *mut c_int, c_int) -> c_int,
    pub enable_plugin: unsafe extern "C" fn(*mut c_char, bool) -> c_int,
    pub is_plugin_enabled: unsafe extern "C" fn(*mut c_char, *mut bool) -> c_int,
    pub set_plugin_order: unsafe extern "C" fn(*mut c_char, c_int) -> c_int,
    pub get_settings: unsafe extern "C" fn(*mut c_void, *mut c_int) -> c_int,
    pub update_settings: unsafe extern "C" fn(*mut c_void) -> c_int,
    pub save_settings: unsafe extern "C" fn() -> c_int,
    pub write_textfile_settings: unsafe extern "C" fn(*mut c_void, *mut c_char) -> c_int,
    pub get_connected_scanners: unsafe extern "C" fn(*mut c_char, c_int, *mut c_int) -> c_int,
    pub select_scanner: unsafe extern "C" fn(*const c_char) -> c_int,
    pub enable_logging: unsafe extern "C" fn(bool, c_int, c_int, *mut c_char) -> c_int,
    pub get_last_error: unsafe extern "C" fn(*mut c_int, *mut c_char, *mut c_int) -> c_int,
    pub get_error_message: unsafe extern "C" fn(c_int, *mut c_char, *mut c_int) -> c_int,
}

macro_rules! resolve {
    ($lib:expr, $name:literal) => {
        *$lib.get(concat!($name, "\0").as_bytes())?
    };
}

impl MmmReaderLibrary {
    /// Load the shared library at `path` and resolve every entry point.
    ///
    /// # Safety
    ///
    /// Loading runs the library's initialisers, and the resolved symbols are
    /// trusted to have the signatures declared above.
    pub unsafe fn load(path: &Path) -> Result<Self, libloading::Error> {
        // SAFETY: upheld by the caller, see above.
        unsafe {
            let lib = Library::new(path)?;
            Ok(Self {
                initialise: resolve!(lib, "MMMReader_Initialise"),
                shutdown: resolve!(lib, "MMMReader_Shutdown"),
                is_initialised: resolve!(lib, "MMMReader_IsInitialised"),
                get_state: resolve!(lib, "MMMReader_GetState"),
                set_state: resolve!(lib, "MMMReader_SetState"),
                set_warning_callback: resolve!(lib, "MMMReader_SetWarningCallback"),
                is_document_on_window: resolve!(lib, "MMMReader_IsDocumentOnWindow"),
                wait_for_document_on_window: resolve!(lib, "MMMReader_WaitForDocumentOnWindow"),
                read_document: resolve!(lib, "MMMReader_ReadDocument"),
                force_read: resolve!(lib, "MMMReader_ForceRead"),
                clear_data: resolve!(lib, "MMMReader_ClearData"),
                rf_abort: resolve!(lib, "MMMReader_RFAbort"),
                get_data: resolve!(lib, "MMMReader_GetData"),
                get_data_count: resolve!(lib, "MMMReader_GetDataCount"),
                get_plugin_data: resolve!(lib, "MMMReader_GetPluginData"),
                get_plugin_name: resolve!(lib, "MMMReader_GetPluginName"),
                enable_plugin: resolve!(lib, "MMMReader_EnablePlugin"),
                is_plugin_enabled: resolve!(lib, "MMMReader_IsPluginEnabled"),
                set_plugin_order: resolve!(lib, "MMMReader_SetPluginOrder"),
                get_settings: resolve!(lib, "MMMReader_GetSettings"),
                update_settings: resolve!(lib, "MMMReader_UpdateSettings"),
                save_settings: resolve!(lib, "MMMReader_SaveSettings"),
                write_textfile_settings: resolve!(lib, "MMMReader_WriteTextfileSettings"),
                get_connected_scanners: resolve!(lib, "MMMReader_GetConnectedScanners"),
                select_scanner: resolve!(lib, "MMMReader_SelectScanner"),
                enable_logging: resolve!(lib, "MMMReader_EnableLogging"),
                get_last_error: resolve!(lib, "MMMReader_GetLastError"),
                get_error_message: resolve!(lib, "MMMReader_GetErrorMessage"),
                _lib: lib,
            })
        }
    }
}
