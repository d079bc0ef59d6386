// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Codeline (MRZ) text and ICAO 9303 field extraction.
//
// The engine delivers the codeline as ASCII text, at most three lines joined
// by carriage returns. Field extraction covers the three machine readable
// travel document sizes: TD1 (3x30), TD2 (2x36) and TD3 (2x44).

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::data_type::MAX_CODELINE_LEN;
use crate::error::{ReaderError, Result};

const LINE_SEPARATOR: char = '\r';
const MAX_LINES: usize = 3;

/// A validated codeline as delivered by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Codeline {
    text: String,
}

impl Codeline {
    /// Validate raw codeline text. A trailing separator is tolerated.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim_end_matches(['\0', LINE_SEPARATOR]);
        if !text.is_ascii() {
            return Err(ReaderError::InvalidCodeline(
                "codeline contains non-ASCII characters".into(),
            ));
        }
        if text.len() > MAX_CODELINE_LEN {
            return Err(ReaderError::InvalidCodeline(format!(
                "codeline is {} characters, limit is {MAX_CODELINE_LEN}",
                text.len()
            )));
        }
        if text.contains('\n') {
            return Err(ReaderError::InvalidCodeline(
                "lines must be separated by 0x0D only".into(),
            ));
        }
        let lines = text.split(LINE_SEPARATOR).count();
        if lines > MAX_LINES {
            return Err(ReaderError::InvalidCodeline(format!(
                "codeline has {lines} lines, limit is {MAX_LINES}"
            )));
        }
        Ok(Self {
            text: text.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.split(LINE_SEPARATOR)
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Recognise the document size from the line layout.
    pub fn format(&self) -> Option<MrzFormat> {
        let lens: Vec<usize> = self.lines().map(str::len).collect();
        match lens.as_slice() {
            [30, 30, 30] => Some(MrzFormat::Td1),
            [36, 36] => Some(MrzFormat::Td2),
            [44, 44] => Some(MrzFormat::Td3),
            _ => None,
        }
    }

    /// Extract the ICAO fields and verify every check digit.
    pub fn fields(&self) -> Result<CodelineData> {
        let lines: Vec<&[u8]> = self.lines().map(str::as_bytes).collect();
        match self.format() {
            Some(MrzFormat::Td1) => Ok(self.td1(&lines)),
            Some(MrzFormat::Td2) => Ok(self.two_line(MrzFormat::Td2, &lines)),
            Some(MrzFormat::Td3) => Ok(self.two_line(MrzFormat::Td3, &lines)),
            None => Err(ReaderError::InvalidCodeline(format!(
                "line lengths {:?} match no ICAO document size",
                self.lines().map(str::len).collect::<Vec<_>>()
            ))),
        }
    }

    fn td1(&self, lines: &[&[u8]]) -> CodelineData {
        let (l1, l2, l3) = (lines[0], lines[1], lines[2]);
        let (surname, forenames) = split_names(field(l3, 0, 30));

        let mut composite = Vec::with_capacity(60);
        composite.extend_from_slice(&l1[5..30]);
        composite.extend_from_slice(&l2[0..7]);
        composite.extend_from_slice(&l2[8..15]);
        composite.extend_from_slice(&l2[18..29]);

        let optional = [field(l1, 15, 30), field(l2, 18, 29)]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        CodelineData {
            format: MrzFormat::Td1,
            codeline: self.text.clone(),
            document_type: field(l1, 0, 2),
            issuing_state: field(l1, 2, 5),
            surname,
            forenames,
            document_number: field(l1, 5, 14),
            nationality: field(l2, 15, 18),
            date_of_birth: field(l2, 0, 6),
            sex: field(l2, 7, 8),
            date_of_expiry: field(l2, 8, 14),
            optional_data: optional,
            checks: CheckDigits {
                document_number: verify(&l1[5..14], l1[14]),
                date_of_birth: verify(&l2[0..6], l2[6]),
                date_of_expiry: verify(&l2[8..14], l2[14]),
                optional_data: None,
                composite: verify(&composite, l2[29]),
            },
        }
    }

    /// TD2 and TD3 share a layout apart from the width of the optional field.
    fn two_line(&self, format: MrzFormat, lines: &[&[u8]]) -> CodelineData {
        let (l1, l2) = (lines[0], lines[1]);
        let width = l2.len();
        let (surname, forenames) = split_names(field(l1, 5, width));

        let (optional_end, optional_check) = match format {
            MrzFormat::Td3 => (42, Some(verify_optional(&l2[28..42], l2[42]))),
            _ => (width - 1, None),
        };

        let mut composite = Vec::with_capacity(width);
        composite.extend_from_slice(&l2[0..10]);
        composite.extend_from_slice(&l2[13..20]);
        composite.extend_from_slice(&l2[21..width - 1]);

        CodelineData {
            format,
            codeline: self.text.clone(),
            document_type: field(l1, 0, 2),
            issuing_state: field(l1, 2, 5),
            surname,
            forenames,
            document_number: field(l2, 0, 9),
            nationality: field(l2, 10, 13),
            date_of_birth: field(l2, 13, 19),
            sex: field(l2, 20, 21),
            date_of_expiry: field(l2, 21, 27),
            optional_data: field(l2, 28, optional_end),
            checks: CheckDigits {
                document_number: verify(&l2[0..9], l2[9]),
                date_of_birth: verify(&l2[13..19], l2[19]),
                date_of_expiry: verify(&l2[21..27], l2[27]),
                optional_data: optional_check,
                composite: verify(&composite, l2[width - 1]),
            },
        }
    }
}

impl std::fmt::Display for Codeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// ICAO 9303 machine readable zone sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MrzFormat {
    /// ID card, three lines of 30.
    Td1,
    /// Two lines of 36.
    Td2,
    /// Passport booklet, two lines of 44.
    Td3,
}

/// Check digit verdicts for one codeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckDigits {
    pub document_number: bool,
    pub date_of_birth: bool,
    pub date_of_expiry: bool,
    /// Only TD3 protects the optional field with its own digit.
    pub optional_data: Option<bool>,
    pub composite: bool,
}

impl CheckDigits {
    pub fn all_valid(&self) -> bool {
        self.document_number
            && self.date_of_birth
            && self.date_of_expiry
            && self.optional_data.unwrap_or(true)
            && self.composite
    }
}

/// Fields decoded from a codeline. Filler characters are removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodelineData {
    pub format: MrzFormat,
    /// The codeline the fields came from, lines joined by 0x0D.
    pub codeline: String,
    pub document_type: String,
    pub issuing_state: String,
    pub surname: String,
    pub forenames: String,
    pub document_number: String,
    pub nationality: String,
    /// YYMMDD as printed.
    pub date_of_birth: String,
    pub sex: String,
    /// YYMMDD as printed.
    pub date_of_expiry: String,
    pub optional_data: String,
    pub checks: CheckDigits,
}

impl CodelineData {
    /// Expiry as a calendar date. Expiry years are always in this century.
    pub fn expiry_date(&self) -> Option<NaiveDate> {
        parse_yymmdd(&self.date_of_expiry, 2000)
    }

    /// Birth date, placing the year in the most recent century not after `today`.
    pub fn birth_date(&self, today: NaiveDate) -> Option<NaiveDate> {
        let this_century = today.year() - today.year() % 100;
        parse_yymmdd(&self.date_of_birth, this_century)
            .filter(|date| *date <= today)
            .or_else(|| parse_yymmdd(&self.date_of_birth, this_century - 100))
    }

    pub fn is_expired(&self, today: NaiveDate) -> Option<bool> {
        self.expiry_date().map(|expiry| expiry < today)
    }
}

/// ICAO 7-3-1 weighted check digit.
pub fn check_digit(data: &[u8]) -> u8 {
    const WEIGHTS: [u32; 3] = [7, 3, 1];
    let sum: u32 = data
        .iter()
        .enumerate()
        .map(|(i, c)| char_value(*c) * WEIGHTS[i % 3])
        .sum();
    (sum % 10) as u8
}

fn char_value(c: u8) -> u32 {
    match c {
        b'0'..=b'9' => u32::from(c - b'0'),
        b'A'..=b'Z' => u32::from(c - b'A') + 10,
        _ => 0,
    }
}

fn verify(data: &[u8], digit: u8) -> bool {
    digit.is_ascii_digit() && check_digit(data) == digit - b'0'
}

/// An empty optional field may carry a filler in place of its digit.
fn verify_optional(data: &[u8], digit: u8) -> bool {
    if digit == b'<' {
        return data.iter().all(|c| *c == b'<');
    }
    verify(data, digit)
}

fn field(line: &[u8], start: usize, end: usize) -> String {
    String::from_utf8_lossy(&line[start..end])
        .trim_end_matches('<')
        .replace('<', " ")
}

/// Primary and secondary identifiers are separated by a double filler.
fn split_names(raw: String) -> (String, String) {
    // `field` already turned fillers into spaces, so the separator is two spaces.
    match raw.split_once("  ") {
        Some((surname, forenames)) => (surname.trim().to_string(), forenames.trim().to_string()),
        None => (raw.trim().to_string(), String::new()),
    }
}

fn parse_yymmdd(s: &str, century: i32) -> Option<NaiveDate> {
    if s.len() != 6 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let yy: i32 = s[0..2].parse().ok()?;
    let mm: u32 = s[2..4].parse().ok()?;
    let dd: u32 = s[4..6].parse().ok()?;
    NaiveDate::from_ymd_opt(century + yy, mm, dd)
}
