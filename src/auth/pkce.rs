use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

/// Verifier/challenge pair for a single authorization attempt.
///
/// The verifier must never leave the process except inside the token
/// exchange request; the challenge is what goes into the authorization URL.
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    /// 32 bytes from the OS CSPRNG, base64url-encoded without padding
    /// (43 characters). The challenge is the SHA-256 digest of the
    /// verifier's ASCII bytes, encoded the same way.
    pub fn generate() -> Self {
        let mut raw = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::rng(), &mut raw);
        let verifier = URL_SAFE_NO_PAD.encode(raw);

        let digest = Sha256::digest(verifier.as_bytes());
        let challenge = URL_SAFE_NO_PAD.encode(digest);

        Self {
            verifier,
            challenge,
        }
    }
}
