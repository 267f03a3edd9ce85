//! Request signing.
//!
//! A [`Signer`] turns a canonical command string into a signature. The server
//! recomputes it for every inbound command; clients use the same signer to
//! produce well-formed requests.

use sha2::{Digest, Sha256};

/// Shared secret used when no other secret is configured.
pub const DEFAULT_SECRET: &str = "NadoUnit";

/// Deterministic signing primitive.
pub trait Signer: Send + Sync {
    /// Returns the signature of `payload`.
    fn sign(&self, payload: &str) -> String;
}

/// SHA-256 over `payload` followed by a shared secret, hex encoded.
///
/// ```
/// use nado_core::signing::{Sha256Signer, Signer};
///
/// let signer = Sha256Signer::new("secret");
/// assert_eq!(signer.sign("abc"), signer.sign("abc"));
/// assert_eq!(signer.sign("abc").len(), 64);
/// ```
#[derive(Debug, Clone)]
pub struct Sha256Signer {
    secret: String,
}

impl Sha256Signer {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl Default for Sha256Signer {
    fn default() -> Self {
        Self::new(DEFAULT_SECRET)
    }
}

impl Signer for Sha256Signer {
    fn sign(&self, payload: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(payload.as_bytes());
        hasher.update(self.secret.as_bytes());
        hex::encode(hasher.finalize())
    }
}
