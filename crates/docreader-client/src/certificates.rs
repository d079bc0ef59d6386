// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// External certificates for chip validation.
//
// When the engine is configured to ask the host for certificates, it names the
// one it needs during the chip read and waits. A provider answers with the
// encoded bytes or declines, in which case validation goes on without it.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use docreader_core::CertificateType;

/// Supplies certificates and keys the engine does not hold itself.
pub trait CertificateProvider: Send + Sync {
    fn certificate(&self, identifier: &str, kind: CertificateType) -> Option<Vec<u8>>;
}

/// Looks up `<dir>/<identifier>.<ext>` for each known certificate extension.
#[derive(Debug, Clone)]
pub struct CertificateDir {
    dir: PathBuf,
}

impl CertificateDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn candidates<'a>(&'a self, identifier: &'a str) -> impl Iterator<Item = PathBuf> + 'a {
        CertificateType::FILE_EXTENSIONS
            .iter()
            .map(move |ext| self.dir.join(format!("{identifier}.{ext}")))
    }
}

/// Identifiers come from the chip, so they must not steer the lookup
/// outside the directory.
fn is_plain_name(identifier: &str) -> bool {
    !identifier.is_empty()
        && identifier != "."
        && identifier != ".."
        && !identifier.contains(['/', '\\', '\0'])
}

impl CertificateProvider for CertificateDir {
    fn certificate(&self, identifier: &str, kind: CertificateType) -> Option<Vec<u8>> {
        if !is_plain_name(identifier) {
            warn!(identifier, "refusing certificate identifier with a path in it");
            return None;
        }
        for path in self.candidates(identifier) {
            match std::fs::read(&path) {
                Ok(bytes) => {
                    debug!(path = %path.display(), kind = kind.vendor_name(), "certificate found");
                    return Some(bytes);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "certificate unreadable");
                    return None;
                }
            }
        }
        debug!(identifier, dir = %self.dir.display(), "no certificate on file");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_any_known_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("UTO-CSCA-01.cvcert"), b"\x7f\x21").unwrap();
        std::fs::write(dir.path().join("UTO-DS-0042.der"), b"\x30\x82").unwrap();

        let store = CertificateDir::new(dir.path());
        assert_eq!(
            store.certificate("UTO-DS-0042", CertificateType::DocSigner),
            Some(b"\x30\x82".to_vec())
        );
        assert_eq!(
            store.certificate("UTO-CSCA-01", CertificateType::Cvca),
            Some(b"\x7f\x21".to_vec())
        );
        assert_eq!(store.certificate("UTO-DS-9999", CertificateType::DocSigner), None);
    }

    #[test]
    fn identifiers_cannot_leave_the_directory() {
        let parent = tempfile::tempdir().unwrap();
        let certs = parent.path().join("certs");
        std::fs::create_dir(&certs).unwrap();
        std::fs::write(parent.path().join("secret.pem"), b"key").unwrap();

        let store = CertificateDir::new(&certs);
        assert_eq!(store.certificate("../secret", CertificateType::InspectionSystemKey), None);
        assert_eq!(store.certificate("..", CertificateType::DocSigner), None);
        assert_eq!(store.certificate("", CertificateType::DocSigner), None);
    }
}
