// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// BAC key correction.
//
// Before opening the chip the engine offers the host the MRZ it is about to
// derive the BAC key from, in a writable buffer. An OCR slip in the document
// number or dates means BAC fails; a corrector gets the chance to fix it.

use tracing::{debug, info};

/// Length of a TD3 (passport) MRZ line.
pub const TD3_LINE_LEN: usize = 44;

/// Rewrites the MRZ used for BAC. `None` keeps the engine's reading.
pub trait BacCorrector: Send + Sync {
    fn correct(&self, mrz: MrzParts<'_>) -> Option<MrzLines>;
}

impl<F> BacCorrector for F
where
    F: Fn(MrzParts<'_>) -> Option<MrzLines> + Send + Sync,
{
    fn correct(&self, mrz: MrzParts<'_>) -> Option<MrzLines> {
        self(mrz)
    }
}

/// The MRZ split the way a correction dialog shows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MrzParts<'a> {
    pub line1: &'a str,
    pub remainder: &'a str,
}

impl MrzParts<'_> {
    pub fn to_lines(&self) -> MrzLines {
        MrzLines {
            line1: self.line1.to_string(),
            remainder: self.remainder.to_string(),
        }
    }
}

/// Corrected MRZ, written back as line 1 followed by the remainder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MrzLines {
    pub line1: String,
    pub remainder: String,
}

impl MrzLines {
    pub fn joined(&self) -> String {
        format!("{}{}", self.line1, self.remainder)
    }
}

/// First 44 characters, then the rest.
pub fn split_mrz(mrz: &str) -> MrzParts<'_> {
    let cut = mrz
        .char_indices()
        .nth(TD3_LINE_LEN)
        .map_or(mrz.len(), |(i, _)| i);
    MrzParts {
        line1: &mrz[..cut],
        remainder: &mrz[cut..],
    }
}

/// Offer the NUL-terminated MRZ in `buf` to `corrector`, split into line 1
/// and the remainder.
///
/// On a correction the buffer is rewritten in place with the joined lines,
/// NUL-terminated and truncated to fit, and `(original, corrected)` is
/// returned. Declining leaves the buffer as it was.
pub fn apply_correction(buf: &mut [u8], corrector: &dyn BacCorrector) -> Option<(String, String)> {
    let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    let original = String::from_utf8_lossy(&buf[..end]).trim().to_string();

    let parts = split_mrz(&original);
    debug!(line1 = parts.line1, remainder = parts.remainder, "BAC key offered for correction");

    let corrected = corrector.correct(parts)?.joined();
    if buf.is_empty() {
        return None;
    }

    let len = corrected.len().min(buf.len() - 1);
    buf.fill(0);
    buf[..len].copy_from_slice(&corrected.as_bytes()[..len]);

    let written = String::from_utf8_lossy(&buf[..len]).into_owned();
    info!(changed = written != original, "BAC key corrected");
    Some((original, written))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE1: &str = "P<UTOERIKSSON<<ANNA<MARIA<<<<<<<<<<<<<<<<<<<";
    const LINE2: &str = "L898902C36UTO7408122F1204159ZE184226B<<<<<10";

    fn buffer_with(text: &str, capacity: usize) -> Vec<u8> {
        let mut buf = vec![0u8; capacity];
        buf[..text.len()].copy_from_slice(text.as_bytes());
        buf
    }

    #[test]
    fn split_at_line_one() {
        let mrz = format!("{LINE1}{LINE2}");
        let parts = split_mrz(&mrz);
        assert_eq!(parts.line1, LINE1);
        assert_eq!(parts.remainder, LINE2);

        let short = split_mrz("I<UTO");
        assert_eq!(short.line1, "I<UTO");
        assert_eq!(short.remainder, "");
    }

    fn fix_document_number(mrz: MrzParts<'_>) -> Option<MrzLines> {
        let mut lines = mrz.to_lines();
        lines.remainder = lines.remainder.replacen("89O2", "8902", 1);
        Some(lines)
    }

    fn decline(_: MrzParts<'_>) -> Option<MrzLines> {
        None
    }

    fn grow(_: MrzParts<'_>) -> Option<MrzLines> {
        Some(MrzLines {
            line1: "01234".into(),
            remainder: "56789".into(),
        })
    }

    #[derive(Default)]
    struct Recording(std::sync::Mutex<Option<MrzLines>>);

    impl BacCorrector for Recording {
        fn correct(&self, mrz: MrzParts<'_>) -> Option<MrzLines> {
            *self.0.lock().unwrap() = Some(mrz.to_lines());
            None
        }
    }

    #[test]
    fn corrector_sees_both_lines() {
        let record = Recording::default();
        let mut buf = buffer_with(&format!("{LINE1}{LINE2}"), 201);
        assert!(apply_correction(&mut buf, &record).is_none());
        let lines = record.0.lock().unwrap().clone().unwrap();
        assert_eq!(lines.line1, LINE1);
        assert_eq!(lines.remainder, LINE2);
    }

    #[test]
    fn correction_rewrites_in_place() {
        let misread = format!("{LINE1}{}", LINE2.replacen("8902", "89O2", 1));
        let mut buf = buffer_with(&format!("  {misread}  "), 201);

        let (original, corrected) = apply_correction(&mut buf, &fix_document_number).unwrap();
        assert_eq!(original, misread);
        assert_eq!(corrected, format!("{LINE1}{LINE2}"));
        assert_eq!(&buf[..88], corrected.as_bytes());
        assert!(buf[88..].iter().all(|b| *b == 0));
    }

    #[test]
    fn declining_leaves_buffer_untouched() {
        let mut buf = buffer_with(LINE1, 64);
        let before = buf.clone();
        assert!(apply_correction(&mut buf, &decline).is_none());
        assert_eq!(buf, before);
    }

    #[test]
    fn long_correction_is_truncated() {
        let mut buf = buffer_with("ABC", 8);
        let (_, corrected) = apply_correction(&mut buf, &grow).unwrap();
        assert_eq!(corrected, "0123456");
        assert_eq!(buf[7], 0);
    }
}
