//! GitHub `X-Hub-Signature` verification (HMAC-SHA1 over the raw body)

use hex::decode as hex_decode;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use tracing::debug;

use crate::error::{DeployError, Result};

type HmacSha1 = Hmac<Sha1>;

/// Expected header format: "sha1=<hex digest>"
pub const SIGNATURE_PREFIX: &str = "sha1=";

/// Holds the shared webhook secret for the lifetime of the process.
#[derive(Clone)]
pub struct SignatureVerifier {
    mac: HmacSha1,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl SignatureVerifier {
    /// Refuses an empty secret so a misconfigured process never starts.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(DeployError::ConfigError(
                "webhook secret must not be empty".to_string(),
            ));
        }
        let mac = HmacSha1::new_from_slice(secret)
            .map_err(|e| DeployError::ConfigError(format!("invalid webhook secret: {}", e)))?;
        Ok(Self { mac })
    }

    /// Computes the header value GitHub would send for `payload`.
    pub fn sign(&self, payload: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(payload);
        format!(
            "{}{}",
            SIGNATURE_PREFIX,
            hex::encode(mac.finalize().into_bytes())
        )
    }

    /// Checks `signature_header` against the HMAC of the exact raw `payload`.
    ///
    /// The digest comparison is constant time. Malformed headers (wrong
    /// prefix, wrong length, anything but lowercase hex digits) are treated
    /// as a mismatch, so only the exact header GitHub sends is accepted.
    pub fn verify(&self, payload: &[u8], signature_header: &str) -> bool {
        let Some(hex_sig) = signature_header.strip_prefix(SIGNATURE_PREFIX) else {
            debug!("Signature header is missing the '{}' prefix", SIGNATURE_PREFIX);
            return false;
        };

        if !is_lowercase_hex(hex_sig) {
            debug!("Signature header is not lowercase hex");
            return false;
        }

        let Ok(their_sig) = hex_decode(hex_sig) else {
            debug!("Signature header is not valid hex");
            return false;
        };

        let mut mac = self.mac.clone();
        mac.update(payload);
        mac.verify_slice(&their_sig).is_ok()
    }
}

fn is_lowercase_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
