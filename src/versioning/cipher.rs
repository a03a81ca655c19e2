use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// Missing or unusable secret; fatal when a service is constructed
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Malformed encrypted payload: {0}")]
    Malformed(String),

    #[error("Decryption failed: {0}")]
    Decrypt(String),
}

/// AES-256-CBC codec for handler source text at rest.
///
/// Wire format is `<iv as 32 hex chars>:<base64 ciphertext>`; text without a
/// `:` is legacy plaintext and passes through `decrypt` untouched.
#[derive(Clone)]
pub struct CodeCipher {
    key: [u8; KEY_LEN],
}

impl std::fmt::Debug for CodeCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeCipher").finish_non_exhaustive()
    }
}

impl CodeCipher {
    /// Secrets shorter than 32 bytes are space-padded, longer ones truncated
    pub fn new(secret: &str) -> Result<Self, CryptoError> {
        if secret.trim().is_empty() {
            return Err(CryptoError::Configuration(
                "handler encryption key is empty".to_string(),
            ));
        }

        let mut key = [b' '; KEY_LEN];
        let bytes = secret.as_bytes();
        let n = bytes.len().min(KEY_LEN);
        key[..n].copy_from_slice(&bytes[..n]);
        Ok(Self { key })
    }

    /// Encrypt with a fresh random IV. Empty input yields empty output.
    pub fn encrypt(&self, code: &str) -> String {
        if code.is_empty() {
            return String::new();
        }

        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        match Aes256CbcEnc::new_from_slices(&self.key, &iv) {
            Ok(cipher) => {
                let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(code.as_bytes());
                format!("{}:{}", hex::encode(iv), BASE64.encode(ciphertext))
            }
            Err(e) => {
                tracing::error!("Handler code encryption failed: {}", e);
                String::new()
            }
        }
    }

    /// Lenient decrypt: text without `:` passes through; anything else is
    /// treated as ciphertext, and failures log and yield `""`
    pub fn decrypt(&self, payload: &str) -> String {
        if !payload.contains(':') {
            return payload.to_string();
        }
        match self.try_decrypt(payload) {
            Ok(plain) => plain,
            Err(e) => {
                tracing::error!("Handler code decryption failed: {}", e);
                String::new()
            }
        }
    }

    /// Strict decrypt used by the loader, where a failure must be reported
    pub fn try_decrypt(&self, payload: &str) -> Result<String, CryptoError> {
        let (iv_hex, data) = payload
            .split_once(':')
            .ok_or_else(|| CryptoError::Malformed("missing ':' separator".to_string()))?;

        let iv = hex::decode(iv_hex).map_err(|e| CryptoError::Malformed(format!("iv: {}", e)))?;
        if iv.len() != IV_LEN {
            return Err(CryptoError::Malformed(format!(
                "iv must be {} bytes, got {}",
                IV_LEN,
                iv.len()
            )));
        }
        let ciphertext = BASE64
            .decode(data.trim())
            .map_err(|e| CryptoError::Malformed(format!("ciphertext: {}", e)))?;

        let plain = Aes256CbcDec::new_from_slices(&self.key, &iv)
            .map_err(|e| CryptoError::Decrypt(e.to_string()))?
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|e| CryptoError::Decrypt(e.to_string()))?;

        String::from_utf8(plain).map_err(|e| CryptoError::Decrypt(e.to_string()))
    }
}
