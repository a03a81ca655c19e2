use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::actions::error::LoaderError;
use crate::actions::handlers::{builtin, BuiltinEnv, BuiltinKind};
use crate::actions::manifest::{Behaviour, HandlerManifest, ManifestHandler};
use crate::actions::traits::ActionHandler;
use crate::actions::types::{HandlerConfig, HandlerConfigPatch};
use crate::versioning::CodeCipher;

/// Marks a payload encrypted with the shared client key
pub const ENCRYPTED_PREFIX: &str = "ENCRYPTED:";

/// Tokens a handler definition may not contain. Pattern matching against a
/// trusted distributor's mistakes, not isolation.
static DENYLIST: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("eval", r"eval\s*\("),
        ("Function", r"Function\s*\("),
        ("setTimeout", r"setTimeout\s*\("),
        ("setInterval", r"setInterval\s*\("),
        ("new Worker", r"new\s+Worker\s*\("),
        ("document.write", r"document\.write"),
        ("localStorage", r"localStorage\."),
        ("sessionStorage", r"sessionStorage\."),
        ("indexedDB", r"indexedDB\."),
        ("fetch", r"fetch\s*\("),
        ("XMLHttpRequest", r"XMLHttpRequest"),
        ("WebSocket", r"WebSocket"),
        ("navigator", r"navigator\."),
        ("window", r"window\."),
        ("document", r"document\."),
        ("location", r"location\."),
    ]
    .into_iter()
    .filter_map(|(name, pattern)| Regex::new(pattern).ok().map(|re| (name, re)))
    .collect()
});

/// First denylisted construct found in `code`, if any
pub fn harmful_pattern(code: &str) -> Option<&'static str> {
    DENYLIST
        .iter()
        .find(|(_, re)| re.is_match(code))
        .map(|(name, _)| *name)
}

/// Turns handler definition text into a live handler.
///
/// Pipeline: reject empty text, decrypt `ENCRYPTED:` payloads with the shared
/// key, scan for denylisted constructs, parse the manifest, then force the
/// requested type onto the result. Loading has no side effects beyond the
/// returned handler.
pub struct DynamicHandlerLoader {
    env: BuiltinEnv,
    decryption: Option<CodeCipher>,
}

impl DynamicHandlerLoader {
    pub fn new(env: BuiltinEnv, decryption: Option<CodeCipher>) -> Self {
        Self { env, decryption }
    }

    pub fn load(
        &self,
        requested_type: &str,
        code: &str,
        config: HandlerConfig,
    ) -> Result<Arc<dyn ActionHandler>, LoaderError> {
        match self.build(requested_type, code, config) {
            Ok(handler) => Ok(handler),
            Err(e) => {
                tracing::error!("Failed to create dynamic handler for {}: {}", requested_type, e);
                Err(e)
            }
        }
    }

    fn build(
        &self,
        requested_type: &str,
        code: &str,
        config: HandlerConfig,
    ) -> Result<Arc<dyn ActionHandler>, LoaderError> {
        if code.trim().is_empty() {
            return Err(LoaderError::EmptyCode);
        }

        let text = self.plaintext(code)?;
        if let Some(pattern) = harmful_pattern(&text) {
            return Err(LoaderError::HarmfulPattern(pattern.to_string()));
        }

        let manifest = HandlerManifest::parse(&text)?;

        // Manifest config is the baseline; the distributed config wins
        let mut effective = HandlerConfig::default();
        if let Some(own) = manifest.config.clone() {
            effective.merge(own);
        }
        effective.merge(HandlerConfigPatch::from(config));

        let delegate = match &manifest.execute.behaviour {
            Behaviour::Builtin { handler } => {
                let kind: BuiltinKind = handler.parse()?;
                Some(builtin(kind, &self.env, Some(effective.clone())))
            }
            _ => None,
        };

        let handler: Arc<dyn ActionHandler> = Arc::new(ManifestHandler::new(
            requested_type,
            &manifest,
            effective,
            delegate,
        ));

        let declared = handler.metadata();
        if declared.handler_type != requested_type {
            tracing::debug!(
                "Dynamic handler declared type '{}', stamping requested type '{}'",
                declared.handler_type,
                requested_type
            );
            let mut stamped = declared;
            stamped.handler_type = requested_type.to_string();
            handler.update_config(HandlerConfigPatch::metadata(stamped));
        }

        Ok(handler)
    }

    fn plaintext(&self, code: &str) -> Result<String, LoaderError> {
        let Some(payload) = code.strip_prefix(ENCRYPTED_PREFIX) else {
            return Ok(code.to_string());
        };
        let cipher = self.decryption.as_ref().ok_or(LoaderError::NoDecryptionKey)?;
        let plain = cipher.try_decrypt(payload.trim())?;
        if plain.trim().is_empty() {
            return Err(LoaderError::Decryption("payload decrypted to empty text".to_string()));
        }
        Ok(plain)
    }
}
