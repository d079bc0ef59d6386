// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for kiosk operators and travellers.
//
// Every technical error is mapped to plain English with a clear suggestion.
// The taxonomy uses four severity levels that drive the kiosk screen.

use crate::codes::ErrorCode;
use crate::error::ReaderError;

/// Severity of an error from the operator's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Timeout, engine restarting. We retry automatically.
    Transient,
    /// Someone at the desk must do something (place the document, plug the reader in).
    ActionRequired,
    /// Retrying won't help in this session.
    Permanent,
    /// Needs the supplier: licence, missing hardware module, engine upgrade.
    ServiceRequired,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary (shown as a heading).
    pub message: String,
    /// What the operator should try (shown as body text).
    pub suggestion: String,
    /// Whether the system should auto-retry.
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert a `ReaderError` into something the person at the desk can act on.
pub fn humanize_error(err: &ReaderError) -> HumanError {
    match err {
        // -- Engine errors --
        ReaderError::Engine { code, .. } => humanize_code(*code),

        ReaderError::Timeout(_) => HumanError {
            message: "No document was found on the reader.".into(),
            suggestion: "Place the document face down on the glass, photo page first, and hold it flat.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ReaderError::NotInitialised => HumanError {
            message: "The reader isn't ready yet.".into(),
            suggestion: "Wait a few seconds for the reader to start, then try again.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ReaderError::InvalidState(state) => HumanError {
            message: "The reader is busy or paused.".into(),
            suggestion: format!("Wait for the reader to become ready and try again. (State: {state})"),
            retriable: true,
            severity: Severity::Transient,
        },

        ReaderError::VersionSkew(_) | ReaderError::SettingsVersion { .. } => HumanError {
            message: "This app and the reader software are different versions.".into(),
            suggestion: "Ask your supplier for a matching version of the reader software.".into(),
            retriable: false,
            severity: Severity::ServiceRequired,
        },

        ReaderError::SettingsSizeMismatch { .. } => HumanError {
            message: "The reader settings couldn't be read.".into(),
            suggestion: "The reader software may have been updated. Restart the kiosk; if this keeps happening, contact your supplier.".into(),
            retriable: false,
            severity: Severity::ServiceRequired,
        },

        ReaderError::LibraryLoad(_) => HumanError {
            message: "The reader software isn't installed.".into(),
            suggestion: "Check the reader software is installed and the library path in the settings is right.".into(),
            retriable: false,
            severity: Severity::ServiceRequired,
        },

        // -- Data access errors --
        ReaderError::PluginTagOnScalarAccessor(_)
        | ReaderError::UnknownTag(_)
        | ReaderError::EventStreamTaken => HumanError {
            message: "The app asked the reader for something it doesn't provide.".into(),
            suggestion: "Please report this. Other reads are not affected.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        ReaderError::Decode { .. } => HumanError {
            message: "Some of the document data couldn't be understood.".into(),
            suggestion: "Lift the document and place it on the glass again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        ReaderError::InvalidCodeline(_) => HumanError {
            message: "The code at the bottom of the document couldn't be read.".into(),
            suggestion: "Make sure the two lines of letters and <<< symbols are on the glass and not covered by a thumb or sleeve.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        // -- Kiosk forwarding --
        ReaderError::Kiosk(detail) => humanize_kiosk_error(detail),

        // -- Storage / persistence --
        ReaderError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::NotFound {
                HumanError {
                    message: "A settings file couldn't be found.".into(),
                    suggestion: "Check the file path, or run without it to use the defaults.".into(),
                    retriable: false,
                    severity: Severity::ActionRequired,
                }
            } else if io_err.kind() == std::io::ErrorKind::PermissionDenied {
                HumanError {
                    message: "The app doesn't have permission to use that file.".into(),
                    suggestion: "Check the file permissions, or choose a different location.".into(),
                    retriable: false,
                    severity: Severity::ActionRequired,
                }
            } else {
                HumanError {
                    message: "There was a problem reading or writing a file.".into(),
                    suggestion: "Try again. If this keeps happening, the disk may be full.".into(),
                    retriable: true,
                    severity: Severity::Transient,
                }
            }
        }

        ReaderError::Serialization(_) => HumanError {
            message: "A settings file is damaged.".into(),
            suggestion: "Fix or delete the configuration file; the defaults will be used.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },
    }
}

fn humanize_code(code: ErrorCode) -> HumanError {
    match code {
        ErrorCode::TimedOut => HumanError {
            message: "The reader didn't respond in time.".into(),
            suggestion: "We'll try again automatically.".into(),
            retriable: true,
            severity: Severity::Transient,
        },
        ErrorCode::StringBufferTooSmall | ErrorCode::DataBufferTooSmall => HumanError {
            message: "The document data changed while it was being read.".into(),
            suggestion: "We'll try again automatically.".into(),
            retriable: true,
            severity: Severity::Transient,
        },
        ErrorCode::NoScannerConnected | ErrorCode::ScannerNotFound => HumanError {
            message: "No document reader is connected.".into(),
            suggestion: "Check the reader's USB cable and power light, then try again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },
        ErrorCode::NoDocumentOnWindow => HumanError {
            message: "There's no document on the reader.".into(),
            suggestion: "Place the document face down on the glass.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },
        ErrorCode::ReadFailed | ErrorCode::RfAborted => HumanError {
            message: "The document couldn't be read.".into(),
            suggestion: "Leave the document still on the glass until the reader finishes, then try again.".into(),
            retriable: true,
            severity: Severity::Transient,
        },
        ErrorCode::PluginNotLoaded => HumanError {
            message: "A barcode or document decoder isn't available.".into(),
            suggestion: "Check the decoder plugin is installed alongside the reader software.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },
        ErrorCode::FeatureNotEnabled | ErrorCode::License => HumanError {
            message: "This reader isn't licensed for that feature.".into(),
            suggestion: "Contact your supplier to enable it.".into(),
            retriable: false,
            severity: Severity::ServiceRequired,
        },
        ErrorCode::SettingsFile => HumanError {
            message: "The reader's settings file has a problem.".into(),
            suggestion: "Restore the reader's configuration file or reinstall the reader software.".into(),
            retriable: false,
            severity: Severity::ServiceRequired,
        },
        ErrorCode::MismatchInAnEnum | ErrorCode::MismatchSettingSize => HumanError {
            message: "This app and the reader software are different versions.".into(),
            suggestion: "Ask your supplier for a matching version of the reader software.".into(),
            retriable: false,
            severity: Severity::ServiceRequired,
        },
        other => HumanError {
            message: "The reader had a problem.".into(),
            suggestion: format!("Try again. If this keeps happening, restart the reader. (Detail: {other})"),
            retriable: true,
            severity: Severity::Transient,
        },
    }
}

fn humanize_kiosk_error(detail: &str) -> HumanError {
    let lower = detail.to_ascii_lowercase();

    if lower.contains("timed out") {
        HumanError {
            message: "The desk system didn't answer in time.".into(),
            suggestion: "The read was kept. We'll send it again automatically.".into(),
            retriable: true,
            severity: Severity::Transient,
        }
    } else if lower.contains("connection refused") {
        HumanError {
            message: "The desk system isn't accepting documents.".into(),
            suggestion: "Make sure the desk application is running, then try again.".into(),
            retriable: true,
            severity: Severity::Transient,
        }
    } else {
        HumanError {
            message: "The document couldn't be sent to the desk system.".into(),
            suggestion: format!("Try again. (Detail: {detail})"),
            retriable: true,
            severity: Severity::Transient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_transient() {
        let human = humanize_error(&ReaderError::Timeout("document on window".into()));
        assert_eq!(human.severity, Severity::Transient);
        assert!(human.retriable);
    }

    #[test]
    fn missing_reader_is_action_required() {
        let err = ReaderError::engine(ErrorCode::NoScannerConnected, "Initialise");
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::ActionRequired);
        assert!(!human.retriable);
    }

    #[test]
    fn unlicensed_feature_needs_service() {
        let err = ReaderError::engine(ErrorCode::FeatureNotEnabled, "GetData");
        assert_eq!(humanize_error(&err).severity, Severity::ServiceRequired);
    }

    #[test]
    fn refused_forward_is_retriable() {
        let err = ReaderError::Kiosk("connect to 10.0.0.5:1010: Connection refused".into());
        let human = humanize_error(&err);
        assert!(human.retriable);
        assert!(human.message.contains("desk system"));
    }

    #[test]
    fn unknown_rtqa_code_falls_back_to_generic() {
        let err = ReaderError::engine(ErrorCode::from_raw(0x1_0005), "RTQA");
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::Transient);
        assert!(human.suggestion.contains("Detail"));
    }
}
