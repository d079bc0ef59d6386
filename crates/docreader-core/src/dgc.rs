// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Digital Green Certificate payload (CD_DIGITAL_GREEN_CERTIFICATE).
//
// The engine hands over a byte-packed struct of fixed-width, NUL-padded
// character arrays. Field widths below are the vendor's.

use serde::{Deserialize, Serialize};

use crate::error::{ReaderError, Result};

const VERSION_LEN: usize = 10;
const KID_LEN: usize = 8;
const ISSUER_LEN: usize = 5;
const TIMESTAMP_LEN: usize = 30;
const HCERT_LEN: usize = 2000;
const NAME_LEN: usize = 400;
const DATE_LEN: usize = 15;
const IDENTIFIER_LEN: usize = 100;
const CODE_LEN: usize = 50;

const CLAIM_LEN: usize =
    4 + 4 + VERSION_LEN + KID_LEN + ISSUER_LEN + 2 * TIMESTAMP_LEN + HCERT_LEN + 1;
const VACCINATION_LEN: usize =
    4 + 4 + 4 * CODE_LEN + DATE_LEN + CODE_LEN + NAME_LEN + IDENTIFIER_LEN;
const TEST_LEN: usize = 2 * CODE_LEN
    + NAME_LEN
    + CODE_LEN
    + TIMESTAMP_LEN
    + CODE_LEN
    + NAME_LEN
    + CODE_LEN
    + NAME_LEN
    + IDENTIFIER_LEN;
const RECOVERY_LEN: usize =
    CODE_LEN + DATE_LEN + CODE_LEN + NAME_LEN + 2 * DATE_LEN + IDENTIFIER_LEN;
const PERSON_LEN: usize = VERSION_LEN + 4 * NAME_LEN + DATE_LEN;

/// Size of the packed certificate struct.
pub const GREEN_CERTIFICATE_LEN: usize =
    CLAIM_LEN + VACCINATION_LEN + TEST_LEN + RECOVERY_LEN + PERSON_LEN;

/// The CWT claim wrapping the health certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateClaim {
    pub algorithm: i32,
    /// First bytes of the SHA-256 of the document signer certificate.
    pub key_identifier: Vec<u8>,
    pub version: String,
    pub issuer: String,
    pub issue_time: String,
    pub expiry_time: String,
    /// The undecoded certificate JSON.
    pub health_certificate: String,
    pub date_range_valid: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VaccinationGroup {
    pub dose_number: i32,
    pub total_doses: i32,
    pub targeted_disease: String,
    pub vaccine_or_prophylaxis: String,
    pub vaccine_product: String,
    pub manufacturer: String,
    pub date_of_vaccination: String,
    pub country: String,
    pub issuer: String,
    pub identifier: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TestGroup {
    pub targeted_disease: String,
    pub test_type: String,
    pub test_name: String,
    pub device_identifier: String,
    pub sample_collection_time: String,
    pub result: String,
    pub facility: String,
    pub country: String,
    pub issuer: String,
    pub identifier: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecoveryGroup {
    pub recovered_from: String,
    pub first_positive_test: String,
    pub country: String,
    pub issuer: String,
    pub valid_from: String,
    pub valid_until: String,
    pub identifier: String,
}

/// A decoded EU Digital Green Certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreenCertificate {
    pub claim: CertificateClaim,
    pub vaccination: VaccinationGroup,
    pub test: TestGroup,
    pub recovery: RecoveryGroup,
    pub schema_version: String,
    pub surnames: String,
    pub standardized_surnames: String,
    pub forenames: String,
    pub standardized_forenames: String,
    /// YYYY-MM-DD, YYYY-MM or YYYY.
    pub date_of_birth: String,
}

impl GreenCertificate {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != GREEN_CERTIFICATE_LEN {
            return Err(ReaderError::Decode {
                tag: "CD_DIGITAL_GREEN_CERTIFICATE".into(),
                detail: format!(
                    "expected {GREEN_CERTIFICATE_LEN} bytes, got {}",
                    bytes.len()
                ),
            });
        }
        let mut r = Packed::new(bytes);

        let algorithm = r.i32();
        let kid_len = r.i32().clamp(0, KID_LEN as i32) as usize;
        let version = r.text(VERSION_LEN);
        let kid = r.bytes(KID_LEN);
        let claim = CertificateClaim {
            algorithm,
            key_identifier: kid[..kid_len].to_vec(),
            version,
            issuer: r.text(ISSUER_LEN),
            issue_time: r.text(TIMESTAMP_LEN),
            expiry_time: r.text(TIMESTAMP_LEN),
            health_certificate: r.text(HCERT_LEN),
            date_range_valid: r.flag(),
        };

        let vaccination = VaccinationGroup {
            dose_number: r.i32(),
            total_doses: r.i32(),
            targeted_disease: r.text(CODE_LEN),
            vaccine_or_prophylaxis: r.text(CODE_LEN),
            vaccine_product: r.text(CODE_LEN),
            manufacturer: r.text(CODE_LEN),
            date_of_vaccination: r.text(DATE_LEN),
            country: r.text(CODE_LEN),
            issuer: r.text(NAME_LEN),
            identifier: r.text(IDENTIFIER_LEN),
        };
        let test = TestGroup {
            targeted_disease: r.text(CODE_LEN),
            test_type: r.text(CODE_LEN),
            test_name: r.text(NAME_LEN),
            device_identifier: r.text(CODE_LEN),
            sample_collection_time: r.text(TIMESTAMP_LEN),
            result: r.text(CODE_LEN),
            facility: r.text(NAME_LEN),
            country: r.text(CODE_LEN),
            issuer: r.text(NAME_LEN),
            identifier: r.text(IDENTIFIER_LEN),
        };
        let recovery = RecoveryGroup {
            recovered_from: r.text(CODE_LEN),
            first_positive_test: r.text(DATE_LEN),
            country: r.text(CODE_LEN),
            issuer: r.text(NAME_LEN),
            valid_from: r.text(DATE_LEN),
            valid_until: r.text(DATE_LEN),
            identifier: r.text(IDENTIFIER_LEN),
        };

        Ok(Self {
            claim,
            vaccination,
            test,
            recovery,
            schema_version: r.text(VERSION_LEN),
            surnames: r.text(NAME_LEN),
            standardized_surnames: r.text(NAME_LEN),
            forenames: r.text(NAME_LEN),
            standardized_forenames: r.text(NAME_LEN),
            date_of_birth: r.text(DATE_LEN),
        })
    }

    /// Which of the three certificate kinds this one carries.
    pub fn kind(&self) -> Option<CertificateKind> {
        if !self.vaccination.identifier.is_empty() {
            Some(CertificateKind::Vaccination)
        } else if !self.test.identifier.is_empty() {
            Some(CertificateKind::Test)
        } else if !self.recovery.identifier.is_empty() {
            Some(CertificateKind::Recovery)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertificateKind {
    Vaccination,
    Test,
    Recovery,
}

/// Sequential reader over a packed struct. Callers check the total length
/// up front, so reads never run past the end.
struct Packed<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Packed<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> &'a [u8] {
        let start = self.pos.min(self.bytes.len());
        let end = (self.pos + len).min(self.bytes.len());
        self.pos += len;
        &self.bytes[start..end]
    }

    fn i32(&mut self) -> i32 {
        let raw = self.take(4);
        let mut word = [0u8; 4];
        word[..raw.len()].copy_from_slice(raw);
        i32::from_le_bytes(word)
    }

    fn flag(&mut self) -> bool {
        self.take(1).first().is_some_and(|b| *b != 0)
    }

    fn bytes(&mut self, len: usize) -> Vec<u8> {
        self.take(len).to_vec()
    }

    fn text(&mut self, len: usize) -> String {
        nul_terminated(self.take(len))
    }
}

/// Text up to the first NUL, lossily decoded.
pub(crate) fn nul_terminated(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(buf: &mut [u8], offset: usize, text: &str) {
        buf[offset..offset + text.len()].copy_from_slice(text.as_bytes());
    }

    #[test]
    fn packed_size_matches_vendor_struct() {
        assert_eq!(CLAIM_LEN, 2092);
        assert_eq!(VACCINATION_LEN, 773);
        assert_eq!(TEST_LEN, 1580);
        assert_eq!(RECOVERY_LEN, 645);
        assert_eq!(GREEN_CERTIFICATE_LEN, 6715);
    }

    #[test]
    fn decodes_vaccination_certificate() {
        let mut buf = vec![0u8; GREEN_CERTIFICATE_LEN];
        buf[0..4].copy_from_slice(&(-7i32).to_le_bytes());
        buf[4..8].copy_from_slice(&8i32.to_le_bytes());
        put(&mut buf, 8, "HC1");
        buf[18..26].copy_from_slice(&[0xde, 0xad, 0xbe, 0xef, 1, 2, 3, 4]);
        put(&mut buf, 26, "AT");
        buf[CLAIM_LEN - 1] = 1;

        let v = CLAIM_LEN;
        buf[v..v + 4].copy_from_slice(&1i32.to_le_bytes());
        buf[v + 4..v + 8].copy_from_slice(&2i32.to_le_bytes());
        put(&mut buf, v + 8, "840539006");
        put(&mut buf, v + 8 + 4 * CODE_LEN, "2021-02-18");
        let id_at = v + VACCINATION_LEN - IDENTIFIER_LEN;
        put(&mut buf, id_at, "URN:UVCI:01:AT:10807843F94AEE0EE5093FBC254BD813#B");

        let person = GREEN_CERTIFICATE_LEN - PERSON_LEN;
        put(&mut buf, person, "1.3.0");
        put(&mut buf, person + VERSION_LEN, "Musterfrau-Gößinger");
        put(&mut buf, person + VERSION_LEN + NAME_LEN, "MUSTERFRAU<GOESSINGER");
        put(&mut buf, GREEN_CERTIFICATE_LEN - DATE_LEN, "1998-02-26");

        let cert = GreenCertificate::decode(&buf).unwrap();
        assert_eq!(cert.claim.algorithm, -7);
        assert_eq!(cert.claim.version, "HC1");
        assert_eq!(cert.claim.key_identifier, vec![0xde, 0xad, 0xbe, 0xef, 1, 2, 3, 4]);
        assert_eq!(cert.claim.issuer, "AT");
        assert!(cert.claim.date_range_valid);
        assert_eq!(cert.vaccination.dose_number, 1);
        assert_eq!(cert.vaccination.total_doses, 2);
        assert_eq!(cert.vaccination.targeted_disease, "840539006");
        assert_eq!(cert.vaccination.date_of_vaccination, "2021-02-18");
        assert_eq!(cert.kind(), Some(CertificateKind::Vaccination));
        assert_eq!(cert.schema_version, "1.3.0");
        assert_eq!(cert.surnames, "Musterfrau-Gößinger");
        assert_eq!(cert.standardized_surnames, "MUSTERFRAU<GOESSINGER");
        assert_eq!(cert.date_of_birth, "1998-02-26");
    }

    #[test]
    fn wrong_size_is_a_decode_error() {
        let err = GreenCertificate::decode(&[0u8; 100]).unwrap_err();
        assert!(matches!(err, ReaderError::Decode { .. }));
    }
}
