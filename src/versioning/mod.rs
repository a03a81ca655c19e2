// Semantic-version rules and at-rest encryption shared by the store and the runtime

pub mod cipher;
pub mod version;

pub use cipher::{CodeCipher, CryptoError};
pub use version::{
    compare_versions, increment_version, is_update_needed, version_key, ChangeKind,
    INITIAL_VERSION,
};
