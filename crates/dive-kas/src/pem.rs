//! PEM parsing for mTLS client material (RFC 7468).
//!
//! Used to check certificate and key files before handing them to the HTTP
//! client, so a misconfigured KAS fails with a message naming the file.

use base64::prelude::*;

#[derive(Debug, thiserror::Error)]
pub enum PemError {
    #[error("invalid PEM format: {0}")]
    InvalidFormat(String),
    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
    #[error("no PEM blocks found")]
    NoPemBlocks,
}

/// Labels accepted as private keys (PKCS#8, PKCS#1, SEC1).
pub const PRIVATE_KEY_LABELS: &[&str] = &["PRIVATE KEY", "RSA PRIVATE KEY", "EC PRIVATE KEY"];

#[derive(Debug)]
pub struct PemBlock {
    /// Label from the BEGIN line, e.g. "CERTIFICATE".
    pub label: String,
    /// Decoded DER bytes.
    pub contents: Vec<u8>,
}

impl PemBlock {
    pub fn is_certificate(&self) -> bool {
        self.label == "CERTIFICATE"
    }

    pub fn is_private_key(&self) -> bool {
        PRIVATE_KEY_LABELS.contains(&self.label.as_str())
    }
}

/// Parses every PEM block in `input`.
pub fn parse_pem(input: &[u8]) -> Result<Vec<PemBlock>, PemError> {
    let text = std::str::from_utf8(input)
        .map_err(|_| PemError::InvalidFormat("not valid UTF-8".to_string()))?;

    let mut blocks = Vec::new();
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        let Some(label) = line
            .trim()
            .strip_prefix("-----BEGIN ")
            .and_then(|s| s.strip_suffix("-----"))
        else {
            continue;
        };

        let label = label.to_string();
        let mut body = String::new();
        let mut closed = false;

        for line in lines.by_ref() {
            let line = line.trim();
            if let Some(end) = line
                .strip_prefix("-----END ")
                .and_then(|s| s.strip_suffix("-----"))
            {
                if end != label {
                    return Err(PemError::InvalidFormat(format!(
                        "mismatched PEM markers: BEGIN {label} but END {end}"
                    )));
                }
                closed = true;
                break;
            }
            if !line.is_empty() {
                body.push_str(line);
            }
        }

        if !closed {
            return Err(PemError::InvalidFormat(format!("unterminated {label} block")));
        }

        let contents = BASE64_STANDARD.decode(body.as_bytes())?;
        blocks.push(PemBlock { label, contents });
    }

    if blocks.is_empty() {
        return Err(PemError::NoPemBlocks);
    }

    Ok(blocks)
}
