use base64::Engine;

use crate::error::{PersistError, Result};

/// Seam for the encryption-at-rest service that protects model API keys.
/// Production deployments plug in a real KMS-backed implementation.
pub trait SecretCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String>;
    fn decrypt(&self, ciphertext: &str) -> Result<String>;
}

const INSECURE_PREFIX: &str = "insecure.b64.";

/// Development fallback that only obfuscates. Every value it produces is
/// tagged so it can never be mistaken for real ciphertext.
#[derive(Debug, Default)]
pub struct InsecureBase64Cipher;

impl SecretCipher for InsecureBase64Cipher {
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        tracing::warn!("encrypting with the insecure dev cipher; configure a real cipher for production");
        let encoded = base64::engine::general_purpose::STANDARD.encode(plaintext.as_bytes());
        Ok(format!("{INSECURE_PREFIX}{encoded}"))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String> {
        let encoded = ciphertext
            .strip_prefix(INSECURE_PREFIX)
            .ok_or_else(|| PersistError::Secret("unrecognized ciphertext format".to_string()))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| PersistError::Secret(format!("invalid base64: {e}")))?;
        String::from_utf8(bytes).map_err(|e| PersistError::Secret(format!("invalid utf8: {e}")))
    }
}
