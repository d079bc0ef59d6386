// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Kiosk forwarding over plain TCP (port 1010).
//
// Each read codeline goes to a listener as one JSON line; the listener
// answers with one line. A fresh connection is used per document. Repeats of
// the same codeline (a passport left on the window) are dropped inside a
// window.

use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info};

use docreader_core::config::KioskConfig;
use docreader_core::{CodelineData, ReaderError, Result};

/// Default kiosk listener port.
pub const KIOSK_PORT: u16 = 1010;

/// Sends codelines to the kiosk listener.
#[derive(Debug, Clone)]
pub struct KioskForwarder {
    addr: String,
    timeout: Duration,
}

impl KioskForwarder {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    pub fn from_config(config: &KioskConfig) -> Self {
        Self::new(config.addr.clone(), Duration::from_millis(config.timeout_ms))
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send one codeline and return the listener's reply line, without its
    /// line ending. A listener that closes without answering yields "".
    pub async fn forward(&self, data: &CodelineData) -> Result<String> {
        let mut line = serde_json::to_string(data)?;
        line.push('\n');

        info!(addr = %self.addr, bytes = line.len(), "forwarding codeline to kiosk");

        let mut stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| {
                ReaderError::Kiosk(format!(
                    "connection to {} timed out after {}ms",
                    self.addr,
                    self.timeout.as_millis()
                ))
            })?
            .map_err(|e| ReaderError::Kiosk(format!("connect to {}: {e}", self.addr)))?;

        stream
            .write_all(line.as_bytes())
            .await
            .map_err(|e| ReaderError::Kiosk(format!("send to {}: {e}", self.addr)))?;
        stream
            .flush()
            .await
            .map_err(|e| ReaderError::Kiosk(format!("flush: {e}")))?;

        let mut reply = String::new();
        let mut reader = BufReader::new(&mut stream);
        tokio::time::timeout(self.timeout, reader.read_line(&mut reply))
            .await
            .map_err(|_| ReaderError::Kiosk(format!("no reply from {}", self.addr)))?
            .map_err(|e| ReaderError::Kiosk(format!("read reply: {e}")))?;

        // The listener may already have closed its side.
        if let Err(e) = stream.shutdown().await {
            debug!(error = %e, "kiosk socket shutdown");
        }

        let reply = reply.trim_end_matches(['\r', '\n']).to_string();
        info!(reply = %reply, "kiosk acknowledged");
        Ok(reply)
    }
}

/// SHA-256 hex digest of a codeline.
pub fn digest(codeline: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(codeline.as_bytes());
    hex::encode(hasher.finalize())
}

/// Drops repeats of the last codeline seen within `window`.
#[derive(Debug)]
pub struct KioskDeduper {
    window: Duration,
    last: Option<(String, Instant)>,
}

impl KioskDeduper {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn should_forward(&mut self, codeline: &str) -> bool {
        self.should_forward_at(codeline, Instant::now())
    }

    pub fn should_forward_at(&mut self, codeline: &str, now: Instant) -> bool {
        let key = digest(codeline);
        if let Some((last, seen)) = &self.last {
            if *last == key && now.saturating_duration_since(*seen) < self.window {
                debug!(digest = %key, "duplicate codeline dropped");
                return false;
            }
        }
        self.last = Some((key, now));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docreader_core::Codeline;
    use tokio::net::TcpListener;

    const TD3: &str =
        "P<UTOERIKSSON<<ANNA<MARIA<<<<<<<<<<<<<<<<<<<\rL898902C36UTO7408122F1204159ZE184226B<<<<<10";

    fn sample_data() -> CodelineData {
        Codeline::parse(TD3).unwrap().fields().unwrap()
    }

    #[tokio::test]
    async fn forward_sends_one_json_line() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            let mut line = String::new();
            BufReader::new(read).read_line(&mut line).await.unwrap();
            write.write_all(b"OK 1\r\n").await.unwrap();
            line
        });

        let forwarder = KioskForwarder::new(addr.to_string(), Duration::from_secs(2));
        let reply = forwarder.forward(&sample_data()).await.unwrap();
        assert_eq!(reply, "OK 1");

        let sent = server.await.unwrap();
        assert!(sent.ends_with('\n'));
        let json: serde_json::Value = serde_json::from_str(sent.trim_end()).unwrap();
        assert_eq!(json["surname"], "ERIKSSON");
        assert_eq!(json["document_number"], "L898902C3");
    }

    #[tokio::test]
    async fn refused_connection_is_a_kiosk_error() {
        // Bind then drop to get a port nobody listens on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let forwarder = KioskForwarder::new(addr.to_string(), Duration::from_secs(2));
        let err = forwarder.forward(&sample_data()).await.unwrap_err();
        assert!(matches!(err, ReaderError::Kiosk(_)));
    }

    #[test]
    fn config_defaults_to_kiosk_port() {
        let forwarder = KioskForwarder::from_config(&docreader_core::ReaderConfig::default().kiosk);
        assert!(forwarder.addr().ends_with(&format!(":{KIOSK_PORT}")));
    }

    #[test]
    fn repeats_inside_window_are_dropped() {
        let mut deduper = KioskDeduper::new(Duration::from_secs(3));
        let t0 = Instant::now();
        assert!(deduper.should_forward_at(TD3, t0));
        assert!(!deduper.should_forward_at(TD3, t0 + Duration::from_secs(1)));
        assert!(deduper.should_forward_at("I<UTO", t0 + Duration::from_secs(2)));
        assert!(deduper.should_forward_at(TD3, t0 + Duration::from_secs(2)));
        assert!(deduper.should_forward_at(TD3, t0 + Duration::from_secs(6)));
    }

    #[test]
    fn digest_is_sha256_hex() {
        assert_eq!(
            digest(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
