use thiserror::Error;

use crate::storage::StorageError;
use crate::versioning::CryptoError;

/// Failures raised out of a handler's `execute`; the registry turns them into
/// `success: false` results
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Missing context: {0}")]
    MissingContext(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Handler error: {0}")]
    Handler(String),
}

/// Reasons the dynamic loader refuses a handler payload
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Invalid code provided for dynamic handler")]
    EmptyCode,

    #[error("Encrypted handler code could not be decrypted: {0}")]
    Decryption(String),

    #[error("Encrypted handler code rejected: no decryption key configured")]
    NoDecryptionKey,

    #[error("Code contains potentially harmful patterns: {0}")]
    HarmfulPattern(String),

    #[error("Dynamic code did not produce a valid handler definition: {0}")]
    NotConstructible(String),

    #[error("Dynamic handler does not implement the handler contract: missing '{0}'")]
    MissingMember(&'static str),

    #[error("Unknown built-in handler '{0}'")]
    UnknownBuiltin(String),
}

impl From<CryptoError> for LoaderError {
    fn from(err: CryptoError) -> Self {
        LoaderError::Decryption(err.to_string())
    }
}
