// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// When to call the reader engine again, and how long to wait first.
//
// A timed-out wait or a reader still coming out of reset is worth another
// call. A missing scanner needs the desk clerk, and a bad settings blob or
// undecodable item fails the same way every time. Kiosk forwards share the
// same policy.

use std::time::Duration;

use docreader_core::config::RetrySettings;
use docreader_core::{ErrorClass, ErrorCode, ReaderError};
use tracing::{debug, info, warn};

/// Backoff for repeated engine calls, loaded from the `retry` config section.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Calls made after the first one fails.
    pub max_retries: u32,
    /// Pause before the first repeat; doubles with each one after.
    pub base_delay: Duration,
    /// Upper bound on any single pause, so a recovering reader is not left idle.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
        }
    }
}

/// What the session does after a failed engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after this delay.
    RetryAfter(Duration),
    /// Do not retry: the error is permanent or needs someone at the desk.
    GiveUp(ErrorClass),
    /// Maximum retries exhausted.
    Exhausted,
}

/// Whether calling again could succeed without anyone touching the reader.
pub fn classify_error(err: &ReaderError) -> ErrorClass {
    match err {
        ReaderError::Engine { code, .. } => classify_code(*code),

        // Transient: the engine is starting, restarting or slow
        ReaderError::Timeout(_) => ErrorClass::Transient,
        ReaderError::NotInitialised => ErrorClass::Transient,
        ReaderError::InvalidState(_) => ErrorClass::Transient,
        ReaderError::Kiosk(detail) => classify_kiosk_detail(detail),

        // Permanent: the same bytes decode the same way on every attempt
        ReaderError::Decode { .. } => ErrorClass::Permanent,
        ReaderError::InvalidCodeline(_) => ErrorClass::Permanent,

        // Permanent: mismatched builds, programming errors, bad files
        ReaderError::VersionSkew(_) => ErrorClass::Permanent,
        ReaderError::LibraryLoad(_) => ErrorClass::Permanent,
        ReaderError::EventStreamTaken => ErrorClass::Permanent,
        ReaderError::PluginTagOnScalarAccessor(_) => ErrorClass::Permanent,
        ReaderError::UnknownTag(_) => ErrorClass::Permanent,
        ReaderError::SettingsSizeMismatch { .. } => ErrorClass::Permanent,
        ReaderError::SettingsVersion { .. } => ErrorClass::Permanent,
        ReaderError::Serialization(_) => ErrorClass::Permanent,

        // IO errors depend on the kind
        ReaderError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::Interrupted => ErrorClass::Transient,
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                ErrorClass::UserAction
            }
            _ => ErrorClass::Transient,
        },
    }
}

/// `ErrorCode` view of [`classify_error`].
pub fn classify_code(code: ErrorCode) -> ErrorClass {
    match code {
        ErrorCode::TimedOut
        | ErrorCode::StringBufferTooSmall
        | ErrorCode::DataBufferTooSmall
        | ErrorCode::InvalidState
        | ErrorCode::NotInitialised
        | ErrorCode::ReadFailed
        | ErrorCode::RfAborted => ErrorClass::Transient,

        ErrorCode::NoScannerConnected
        | ErrorCode::ScannerNotFound
        | ErrorCode::NoDocumentOnWindow
        | ErrorCode::PluginNotLoaded => ErrorClass::UserAction,

        ErrorCode::InvalidParameter
        | ErrorCode::AlreadyInitialised
        | ErrorCode::FeatureNotEnabled
        | ErrorCode::MismatchInAnEnum
        | ErrorCode::MismatchSettingSize
        | ErrorCode::SettingsFile
        | ErrorCode::License
        | ErrorCode::FunctionNotAvailable => ErrorClass::Permanent,

        // Default to transient (optimistic: retry first, give up later)
        _ => ErrorClass::Transient,
    }
}

/// Classify a kiosk forward failure detail string.
fn classify_kiosk_detail(detail: &str) -> ErrorClass {
    let lower = detail.to_ascii_lowercase();

    if lower.contains("invalid address") || lower.contains("invalid socket address") {
        return ErrorClass::Permanent;
    }
    if lower.contains("rejected") {
        return ErrorClass::UserAction;
    }
    ErrorClass::Transient
}

/// Retry decision for the `attempt`-th failure (zero-based) of one engine call.
pub fn should_retry(err: &ReaderError, attempt: u32, config: &RetryConfig) -> RetryDecision {
    match classify_error(err) {
        ErrorClass::Transient if attempt < config.max_retries => {
            let delay = compute_delay(attempt, config);
            debug!(attempt, delay_ms = delay.as_millis(), error = %err, "calling the engine again");
            RetryDecision::RetryAfter(delay)
        }
        ErrorClass::Transient => {
            warn!(attempt, max = config.max_retries, error = %err, "engine call still failing, giving up");
            RetryDecision::Exhausted
        }
        ErrorClass::UserAction => {
            info!(error = %err, "waiting on the desk, not repeating the call");
            RetryDecision::GiveUp(ErrorClass::UserAction)
        }
        ErrorClass::Permanent => {
            info!(error = %err, "a repeat would fail the same way");
            RetryDecision::GiveUp(ErrorClass::Permanent)
        }
    }
}

/// Pause before repeat `attempt`: `base_delay` doubled per earlier repeat, plus
/// up to one `base_delay` of jitter, never more than `max_delay`.
fn compute_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let base_ms = config.base_delay.as_millis() as u64;
    let exp_ms = base_ms.saturating_mul(1u64 << attempt.min(10));
    let total_ms = exp_ms.saturating_add(jitter(base_ms, attempt));
    Duration::from_millis(total_ms.min(config.max_delay.as_millis() as u64))
}

/// Offset in `[0, base_ms)` derived from the attempt number, so consecutive
/// repeats do not land on exact powers of two. The same attempt always gets
/// the same offset, which keeps test timings reproducible.
fn jitter(base_ms: u64, attempt: u32) -> u64 {
    let hash = (attempt as u64).wrapping_mul(6364136223846793005);
    hash % base_ms.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docreader_core::ReaderState;

    #[test]
    fn engine_timeout_is_transient() {
        let err = ReaderError::engine(ErrorCode::TimedOut, "WaitForDocumentOnWindow");
        assert_eq!(classify_error(&err), ErrorClass::Transient);
    }

    #[test]
    fn errored_state_is_transient() {
        let err = ReaderError::InvalidState(ReaderState::Errored);
        assert_eq!(classify_error(&err), ErrorClass::Transient);
    }

    #[test]
    fn missing_scanner_needs_the_operator() {
        let err = ReaderError::engine(ErrorCode::NoScannerConnected, "Initialise");
        assert_eq!(classify_error(&err), ErrorClass::UserAction);
    }

    #[test]
    fn version_skew_is_permanent() {
        let err = ReaderError::VersionSkew(ErrorCode::MismatchSettingSize);
        assert_eq!(classify_error(&err), ErrorClass::Permanent);
        assert_eq!(
            should_retry(&err, 0, &RetryConfig::default()),
            RetryDecision::GiveUp(ErrorClass::Permanent)
        );
    }

    #[test]
    fn undecodable_payloads_are_permanent() {
        let codeline = ReaderError::InvalidCodeline("P<UTO".into());
        assert_eq!(classify_error(&codeline), ErrorClass::Permanent);

        let decode = ReaderError::Decode {
            tag: "CD_CODELINE".into(),
            detail: "not ASCII".into(),
        };
        assert_eq!(classify_error(&decode), ErrorClass::Permanent);
        assert_eq!(
            should_retry(&decode, 0, &RetryConfig::default()),
            RetryDecision::GiveUp(ErrorClass::Permanent)
        );
    }

    #[test]
    fn refused_forward_is_transient() {
        let err = ReaderError::Kiosk("connect to 127.0.0.1:1010: Connection refused".into());
        assert_eq!(classify_error(&err), ErrorClass::Transient);
    }

    #[test]
    fn rtqa_codes_default_to_transient() {
        assert_eq!(classify_code(ErrorCode::from_raw(0x1_0003)), ErrorClass::Transient);
    }

    #[test]
    fn retry_respects_max() {
        let config = RetryConfig {
            max_retries: 3,
            ..Default::default()
        };
        let err = ReaderError::Timeout("document on window".into());
        assert!(matches!(should_retry(&err, 0, &config), RetryDecision::RetryAfter(_)));
        assert_eq!(should_retry(&err, 3, &config), RetryDecision::Exhausted);
    }

    #[test]
    fn delay_increases_with_attempts() {
        let config = RetryConfig::default();
        let d0 = compute_delay(0, &config);
        let d1 = compute_delay(1, &config);
        let d2 = compute_delay(2, &config);
        assert!(d1 > d0);
        assert!(d2 > d1);
    }

    #[test]
    fn jitter_stays_below_one_base_delay() {
        let config = RetryConfig {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
            ..Default::default()
        };
        for attempt in 0..6 {
            let floor = Duration::from_millis(100 << attempt);
            let delay = compute_delay(attempt, &config);
            assert!(delay >= floor, "attempt {attempt}: {delay:?}");
            assert!(delay < floor + config.base_delay, "attempt {attempt}: {delay:?}");
        }
        assert_eq!(compute_delay(3, &config), compute_delay(3, &config));
    }

    #[test]
    fn delay_capped_at_max() {
        let config = RetryConfig {
            max_delay: Duration::from_secs(2),
            ..Default::default()
        };
        assert!(compute_delay(20, &config) <= Duration::from_secs(2));
    }

    #[test]
    fn config_from_settings() {
        let settings = RetrySettings {
            max_retries: 7,
            base_delay_ms: 100,
            max_delay_ms: 900,
        };
        let config = RetryConfig::from(&settings);
        assert_eq!(config.max_retries, 7);
        assert_eq!(config.base_delay, Duration::from_millis(100));
        assert_eq!(config.max_delay, Duration::from_millis(900));
    }
}
