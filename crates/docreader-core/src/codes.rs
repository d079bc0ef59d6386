// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Integer return-code taxonomy shared by every engine entry point.
//
// The base range is the reader's own error codes. RTQA (quality assurance)
// codes live in the custom block 0x10000..=0x1ffff. Data-validation results for
// e-passport trust checks form a separate family and are never returned as
// call failures.

use serde::{Deserialize, Serialize};

/// Result of a raw engine call: the value, or the non-success code it returned.
pub type EngineResult<T> = std::result::Result<T, ErrorCode>;

/// First code of the block reserved for extension libraries.
pub const CUSTOM_ERROR_CODE_MIN: i32 = 0x10000;
/// Last code of the block reserved for extension libraries.
pub const CUSTOM_ERROR_CODE_MAX: i32 = 0x1ffff;

macro_rules! error_codes {
    ($($(#[$vmeta:meta])* $variant:ident = $raw:expr => $vendor:literal,)+) => {
        /// Every code an engine call can return.
        ///
        /// Codes the client does not know are preserved in `Other` so they can
        /// still be passed to `error_message` lookups.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum ErrorCode {
            $($(#[$vmeta])* $variant,)+
            Other(i32),
        }

        impl ErrorCode {
            /// All codes with a known meaning.
            pub const KNOWN: &'static [ErrorCode] = &[$(ErrorCode::$variant,)+];

            pub const fn raw(self) -> i32 {
                match self {
                    $(ErrorCode::$variant => $raw,)+
                    ErrorCode::Other(raw) => raw,
                }
            }

            pub fn from_raw(raw: i32) -> Self {
                match raw {
                    $(r if r == $raw => ErrorCode::$variant,)+
                    other => ErrorCode::Other(other),
                }
            }

            /// Vendor constant name, if the code is known.
            pub const fn vendor_name(self) -> Option<&'static str> {
                match self {
                    $(ErrorCode::$variant => Some($vendor),)+
                    ErrorCode::Other(_) => None,
                }
            }
        }
    };
}

error_codes! {
    // -- Reader codes --
    NoErrorOccurred = 0 => "NO_ERROR_OCCURRED",
    Unknown = 1 => "ERROR_UNKNOWN",
    NotInitialised = 2 => "ERROR_NOT_INITIALISED",
    AlreadyInitialised = 3 => "ERROR_ALREADY_INITIALISED",
    InvalidParameter = 4 => "ERROR_INVALID_PARAMETER",
    InvalidState = 5 => "ERROR_INVALID_STATE",
    TimedOut = 6 => "ERROR_TIMED_OUT",
    StringBufferTooSmall = 7 => "ERROR_STRING_BUFFER_TOO_SMALL",
    DataBufferTooSmall = 8 => "ERROR_DATA_BUFFER_TOO_SMALL",
    FeatureNotEnabled = 9 => "ERROR_FEATURE_NOT_ENABLED",
    MismatchInAnEnum = 10 => "ERROR_MISMATCH_IN_AN_ENUM",
    MismatchSettingSize = 11 => "ERROR_MISMATCH_SETTING_SIZE",
    PluginNotLoaded = 12 => "ERROR_PLUGIN_NOT_LOADED",
    NoScannerConnected = 13 => "ERROR_NO_SCANNER_CONNECTED",
    ScannerNotFound = 14 => "ERROR_SCANNER_NOT_FOUND",
    NoDocumentOnWindow = 15 => "ERROR_NO_DOCUMENT_ON_WINDOW",
    ReadFailed = 16 => "ERROR_READ_FAILED",
    RfAborted = 17 => "ERROR_RF_ABORTED",
    SettingsFile = 18 => "ERROR_SETTINGS_FILE",
    License = 19 => "ERROR_LICENSE",
    /// The loaded engine library does not export the requested entry point.
    FunctionNotAvailable = 20 => "ERROR_FUNCTION_NOT_AVAILABLE",

    // -- RTQA codes --
    RtqaUnknownErrorCode = 0x10001 => "RTQAEC_ERROR_UNKNOWN_ERROR_CODE",
    RtqaCallingFunctionInBlockingMode = 0x10002 => "RTQAEC_ERROR_CALLING_FUNCTION_IN_BLOCKING_MODE",
    RtqaCallingFunctionInNonBlockingMode = 0x10003 => "RTQAEC_ERROR_CALLING_FUNCTION_IN_NONBLOCKING_MODE",
    RtqaInitialisingMsxml = 0x10004 => "RTQAEC_ERROR_INITIALISING_MSXML",
    RtqaDocTypeNotFound = 0x10005 => "RTQAEC_ERROR_DOC_TYPE_NOT_FOUND",
    RtqaLoadingDocTypeTooManyCodelines = 0x10006 => "RTQAEC_ERROR_LOADING_DOC_TYPE_TOO_MANY_CODELINES",
    RtqaLoadingDocType = 0x10007 => "RTQAEC_ERROR_LOADING_DOC_TYPE",
    RtqaLoadingDocTypeUnknownElement = 0x10008 => "RTQAEC_ERROR_LOADING_DOC_TYPE_UNKNOWN_ELEMENT",
    RtqaLoadingDocTypeUnknownFileFormat = 0x10009 => "RTQAEC_ERROR_LOADING_DOC_TYPE_UNKNOWN_FILE_FORMAT",
    RtqaInvalidValidationParams = 0x1000a => "RTQAEC_INVALID_VALIDATION_PARAMS",
    RtqaGettingRfidData = 0x1000b => "RTQAEC_ERROR_GETTING_RFID_DATA",
    RtqaUnableToQaRfidDataType = 0x1000c => "RTQAEC_ERROR_UNABLE_TO_QA_RFID_DATA_TYPE",
    RtqaDocTypeValidationRoutine = 0x1000d => "RTQAEC_ERROR_DOC_TYPE_VALIDATION_ROUTINE_ERROR",
    RtqaResultSetAtIncorrectTime = 0x1000e => "RTQAEC_ERROR_QA_RESULT_SET_AT_INCORRECT_TIME",
    RtqaDocCalledBeforeDocPlaced = 0x1000f => "RTQAEC_ERROR_QA_DOC_CALLED_BEFORE_DOC_PLACED_ON_WINDOW",
    RtqaListDataRequestedWithoutIndex = 0x10010 => "RTQAEC_ERROR_LIST_DATA_REQUESTED_WITHOUT_INDEX",
    RtqaNonListDataRequestedWithIndex = 0x10011 => "RTQAEC_ERROR_NON_LIST_DATA_REQUESTED_WITH_INDEX",
    RtqaUnknownDataTypeRequested = 0x10012 => "RTQAEC_ERROR_UNKNOWN_DATA_TYPE_REQUESTED",
}

impl ErrorCode {
    pub fn is_success(self) -> bool {
        self == ErrorCode::NoErrorOccurred
    }

    /// Whether the code belongs to the RTQA extension block.
    pub fn is_rtqa(self) -> bool {
        (CUSTOM_ERROR_CODE_MIN..=CUSTOM_ERROR_CODE_MAX).contains(&self.raw())
    }

    /// Buffer-sizing codes are part of the two-phase call convention, not faults.
    pub fn is_buffer_sizing(self) -> bool {
        matches!(
            self,
            ErrorCode::StringBufferTooSmall | ErrorCode::DataBufferTooSmall
        )
    }

    /// Turn a raw return code into a `Result`.
    pub fn check(raw: i32) -> EngineResult<()> {
        match ErrorCode::from_raw(raw) {
            ErrorCode::NoErrorOccurred => Ok(()),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.vendor_name() {
            Some(name) => write!(f, "{name} ({})", self.raw()),
            None => write!(f, "error code {:#x}", self.raw()),
        }
    }
}

impl std::error::Error for ErrorCode {}

vendor_enum! {
    /// Outcome of an e-passport or health-certificate trust check.
    ///
    /// These are results, not call failures: a document that fails validation is
    /// an expected outcome.
    pub enum EdvResultCode {
        Success = 0 => "EDV_SUCCESS",
        Valid = 1 => "EDV_VALID",
        ValidWithRevokedCert = 2 => "EDV_VALID_WITH_REVOKED_CERT",
        Invalid = 3 => "EDV_INVALID",
        DscNotFound = 4 => "EDV_DSC_NOT_FOUND",
        CscNotFound = 5 => "EDV_CSC_NOT_FOUND",
        ValidationError = 6 => "EDV_VALIDATION_ERROR",
        InvalidParams = 7 => "EDV_INVALID_PARAMS",
        ErrorDecodingSod = 8 => "EDV_ERROR_DECODING_SOD",
        ErrorDecodingCom = 9 => "EDV_ERROR_DECODING_COM",
        NotInitialised = 10 => "EDV_NOT_INITIALISED",
        SodNotSet = 11 => "EDV_SOD_NOT_SET",
        SodHashNotPresent = 12 => "EDV_SOD_HASH_NOT_PRESENT",
        ComNotSet = 13 => "EDV_COM_NOT_SET",
        ValidationException = 14 => "EDV_VALIDATION_EXCEPTION",
        DgcInvalidCwtVersion = 15 => "EDV_DGC_INVALID_CWT_VERSION",
        DgcErrorLoadingDgc = 16 => "EDV_DGC_ERROR_LOADING_DGC",
        DgcNotLoaded = 17 => "EDV_DGC_NOT_LOADED",
        DgcParseError = 18 => "EDV_DGC_PARSE_ERROR",
        DgcWarningMultipleVaccinationEntries = 19 => "EDV_DGC_WARNING_MULTIPLE_VACCINATION_ENTRIES",
        DgcWarningMultipleTestEntries = 20 => "EDV_DGC_WARNING_MULTIPLE_TEST_ENTRIES",
        DgcWarningMultipleRecoveryEntries = 21 => "EDV_DGC_WARNING_MULTIPLE_RECOVERY_ENTRIES",
        DgcWarningMultipleVtrEntries = 22 => "EDV_DGC_WARNING_MULTIPLE_VTR_ENTRIES",
        DgcRuntimeException = 23 => "EDV_DGC_RUNTIME_EXCEPTION",
        DgcNotInitialised = 24 => "EDV_DGC_NOT_INITIALISED",
    }
}

impl EdvResultCode {
    /// The check passed (possibly with a revoked certificate in the chain).
    pub fn is_valid(self) -> bool {
        matches!(
            self,
            EdvResultCode::Success | EdvResultCode::Valid | EdvResultCode::ValidWithRevokedCert
        )
    }

    pub fn is_warning(self) -> bool {
        matches!(
            self,
            EdvResultCode::DgcWarningMultipleVaccinationEntries
                | EdvResultCode::DgcWarningMultipleTestEntries
                | EdvResultCode::DgcWarningMultipleRecoveryEntries
                | EdvResultCode::DgcWarningMultipleVtrEntries
        )
    }
}

vendor_enum! {
    /// How external certificates for trust checks are sourced.
    pub enum ExternalCertMode {
        FileStore = 1 => "ECM_CERT_FILE_STORE",
        Callback = 2 => "ECM_CERT_CALLBACK",
        SignRequest = 3 => "ECM_SIGN_REQUEST",
        UseIssuerStore = 4 => "ECM_USE_3M_ISS",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_round_trips_for_every_known_code() {
        for code in ErrorCode::KNOWN {
            assert_eq!(ErrorCode::from_raw(code.raw()), *code);
        }
    }

    #[test]
    fn unknown_code_is_preserved() {
        let code = ErrorCode::from_raw(4242);
        assert_eq!(code, ErrorCode::Other(4242));
        assert_eq!(code.raw(), 4242);
        assert!(code.vendor_name().is_none());
    }

    #[test]
    fn rtqa_block_is_detected() {
        assert!(ErrorCode::RtqaUnknownErrorCode.is_rtqa());
        assert!(ErrorCode::RtqaUnknownDataTypeRequested.is_rtqa());
        assert!(ErrorCode::Other(0x1ffff).is_rtqa());
        assert!(!ErrorCode::TimedOut.is_rtqa());
    }

    #[test]
    fn rtqa_codes_are_contiguous_from_base() {
        let rtqa: Vec<i32> = ErrorCode::KNOWN
            .iter()
            .filter(|c| c.is_rtqa())
            .map(|c| c.raw())
            .collect();
        assert_eq!(rtqa.len(), 18);
        for (offset, raw) in rtqa.iter().enumerate() {
            assert_eq!(*raw, 0x10001 + offset as i32);
        }
    }

    #[test]
    fn check_maps_success_to_ok() {
        assert!(ErrorCode::check(0).is_ok());
        assert_eq!(ErrorCode::check(6), Err(ErrorCode::TimedOut));
    }

    #[test]
    fn edv_validity() {
        assert!(EdvResultCode::ValidWithRevokedCert.is_valid());
        assert!(!EdvResultCode::DscNotFound.is_valid());
        assert!(EdvResultCode::DgcWarningMultipleTestEntries.is_warning());
        assert_eq!(EdvResultCode::from_raw(24), Some(EdvResultCode::DgcNotInitialised));
    }
}
