use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use crate::actions::loader::ENCRYPTED_PREFIX;
use crate::actions::sync::HandlerDefinition;
use crate::actions::types::{capitalize, HandlerConfig};
use crate::config::AppConfig;
use crate::database::models::{ActionHandlerPatch, ActionHandlerRecord, NewActionHandler};
use crate::database::{DatabaseError, HandlerRepository};
use crate::versioning::{
    increment_version, is_update_needed, version_key, ChangeKind, CodeCipher, CryptoError,
};

/// Types installed on first boot
pub const DEFAULT_HANDLER_TYPES: [&str; 4] = ["view", "edit", "delete", "save"];
const DEFAULT_VERSION: &str = "1.0.0";
const DEFAULT_FRONTEND_VERSION: &str = "1.0.0";

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Invalid handler: {0}")]
    Invalid(String),
}

/// Versioned handler store: one immutable row per (type, version), code
/// encrypted at rest, "latest" chosen by semantic version
pub struct ActionHandlerService {
    repo: Arc<dyn HandlerRepository>,
    cipher: CodeCipher,
}

impl ActionHandlerService {
    pub fn new(repo: Arc<dyn HandlerRepository>, cipher: CodeCipher) -> Self {
        Self { repo, cipher }
    }

    /// Fails when no usable encryption key is configured
    pub fn from_config(config: &AppConfig, repo: Arc<dyn HandlerRepository>) -> Result<Self, CryptoError> {
        let cipher = CodeCipher::new(config.encryption_key()?)?;
        Ok(Self::new(repo, cipher))
    }

    pub async fn find_all(&self, handler_type: Option<&str>) -> Result<Vec<ActionHandlerRecord>, ServiceError> {
        Ok(self.repo.find_all(handler_type).await?)
    }

    /// Highest semantic version among the type's records, regardless of
    /// creation order
    pub async fn find_latest_by_type(&self, handler_type: &str) -> Result<Option<ActionHandlerRecord>, ServiceError> {
        let records = self.repo.find_all(Some(handler_type)).await?;
        Ok(latest(records))
    }

    pub async fn create(&self, new: NewActionHandler) -> Result<ActionHandlerRecord, ServiceError> {
        validate_key(&new.handler_type, &new.version)?;
        info!("Creating new handler of type: {} v{}", new.handler_type, new.version);

        let mut record = ActionHandlerRecord::from_new(new);
        record.code = self.encrypt_code(record.code.take());
        Ok(self.repo.insert(record).await?)
    }

    /// Merge `patch` into the exact (type, version) row; `None` when absent
    pub async fn update(
        &self,
        handler_type: &str,
        version: &str,
        mut patch: ActionHandlerPatch,
    ) -> Result<Option<ActionHandlerRecord>, ServiceError> {
        let Some(mut record) = self.repo.find_one(handler_type, version).await? else {
            return Ok(None);
        };

        info!("Updating handler {} v{}", handler_type, version);
        patch.code = self.encrypt_code(patch.code.take());
        record.apply(patch);

        match self.repo.save(record).await {
            Ok(saved) => Ok(Some(saved)),
            Err(DatabaseError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist a new row at the next version after the current latest
    /// (`0.0.0` when none exists). Earlier versions are left untouched.
    pub async fn create_new_version(
        &self,
        handler_type: &str,
        mut patch: ActionHandlerPatch,
        change: ChangeKind,
    ) -> Result<ActionHandlerRecord, ServiceError> {
        let current = self.find_latest_by_type(handler_type).await?;
        let base_version = current
            .as_ref()
            .map(|r| r.version.clone())
            .unwrap_or_else(|| "0.0.0".to_string());
        let next = increment_version(Some(&base_version), change);

        info!(
            "Creating new version of handler {} ({} -> {}, change type: {})",
            handler_type, base_version, next, change
        );

        let mut record = match current {
            Some(previous) => ActionHandlerRecord {
                id: uuid::Uuid::new_v4(),
                version: next,
                created_at: chrono::Utc::now(),
                ..previous
            },
            None => ActionHandlerRecord::from_new(NewActionHandler {
                handler_type: handler_type.to_string(),
                version: next,
                ..Default::default()
            }),
        };

        patch.code = self.encrypt_code(patch.code.take());
        record.apply(patch);
        Ok(self.repo.insert(record).await?)
    }

    /// Delete exactly one (type, version) row
    pub async fn remove(&self, handler_type: &str, version: &str) -> Result<bool, ServiceError> {
        info!("Removing handler {} v{}", handler_type, version);
        Ok(self.repo.delete(handler_type, version).await?)
    }

    /// The exact version, or the latest when `version` is `None`, with its
    /// code decrypted for execution
    pub async fn get_with_decrypted_code(
        &self,
        handler_type: &str,
        version: Option<&str>,
    ) -> Result<Option<ActionHandlerRecord>, ServiceError> {
        let record = match version {
            Some(v) => self.repo.find_one(handler_type, v).await?,
            None => self.find_latest_by_type(handler_type).await?,
        };
        Ok(record.map(|mut r| {
            r.code = r.code.map(|c| self.cipher.decrypt(&c));
            r
        }))
    }

    /// True when there is no handler, it declares no frontend version, or the
    /// caller's version is behind the declared one
    pub async fn check_for_updates(&self, handler_type: &str, frontend_version: &str) -> Result<bool, ServiceError> {
        let Some(latest) = self.find_latest_by_type(handler_type).await? else {
            return Ok(true);
        };
        Ok(match latest.frontend_version.as_deref() {
            None => true,
            Some(stored) => is_update_needed(Some(frontend_version), Some(stored)),
        })
    }

    /// Install view/edit/delete/save at 1.0.0 when the store is empty.
    /// Returns how many records were created.
    pub async fn seed_defaults(&self) -> Result<usize, ServiceError> {
        if self.repo.count().await? > 0 {
            return Ok(0);
        }

        for handler_type in DEFAULT_HANDLER_TYPES {
            info!("Creating default handler for type: {}", handler_type);
            self.create(NewActionHandler {
                handler_type: handler_type.to_string(),
                name: Some(format!("{} Handler", capitalize(handler_type))),
                description: Some(format!("Default {} handler for table actions", handler_type)),
                version: DEFAULT_VERSION.to_string(),
                enabled: Some(true),
                settings: Some(Default::default()),
                icon: Some(handler_type.to_string()),
                code: Some(default_manifest(handler_type)),
                frontend_version: Some(DEFAULT_FRONTEND_VERSION.to_string()),
            })
            .await?;
        }
        Ok(DEFAULT_HANDLER_TYPES.len())
    }

    /// Client sync payload for every stored record. Code is decrypted, or
    /// passed on as `ENCRYPTED:<at-rest>` for clients holding the shared key.
    pub async fn definitions(&self, encrypted: bool) -> Result<Vec<HandlerDefinition>, ServiceError> {
        let records = self.repo.find_all(None).await?;
        Ok(records
            .into_iter()
            .map(|record| {
                let code = record.code.as_ref().filter(|c| !c.is_empty()).map(|c| {
                    if encrypted {
                        format!("{}{}", ENCRYPTED_PREFIX, c)
                    } else {
                        self.cipher.decrypt(c)
                    }
                });
                HandlerDefinition {
                    config: HandlerConfig {
                        enabled: record.enabled,
                        settings: record.settings.as_object().cloned(),
                        ..Default::default()
                    },
                    handler_type: record.handler_type,
                    version: record.version,
                    code,
                }
            })
            .collect())
    }

    fn encrypt_code(&self, code: Option<String>) -> Option<String> {
        code.map(|c| self.cipher.encrypt(&c))
    }
}

fn validate_key(handler_type: &str, version: &str) -> Result<(), ServiceError> {
    if handler_type.trim().is_empty() {
        return Err(ServiceError::Invalid("type is required".to_string()));
    }
    if version_key(version).is_none() {
        return Err(ServiceError::Invalid(format!(
            "version '{}' is not a semantic version",
            version
        )));
    }
    Ok(())
}

/// Highest version wins; among equals the first seen is kept
fn latest(records: Vec<ActionHandlerRecord>) -> Option<ActionHandlerRecord> {
    records.into_iter().fold(None, |best, record| match best {
        Some(b) if version_key(&record.version) <= version_key(&b.version) => Some(b),
        _ => Some(record),
    })
}

/// Manifest that binds a seeded type to its built-in behaviour
pub fn default_manifest(handler_type: &str) -> String {
    let manifest: Value = json!({
        "metadata": {
            "type": handler_type,
            "name": format!("{} Handler", capitalize(handler_type)),
            "description": format!("Default {} handler for table actions", handler_type),
            "version": DEFAULT_VERSION,
            "icon": handler_type,
        },
        "execute": { "action": "builtin", "handler": handler_type },
    });
    manifest.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::manifest::HandlerManifest;
    use crate::database::MemoryHandlerRepository;

    fn service() -> ActionHandlerService {
        ActionHandlerService::new(
            Arc::new(MemoryHandlerRepository::new()),
            CodeCipher::new("service-test-key").unwrap(),
        )
    }

    fn new(handler_type: &str, version: &str, code: Option<&str>) -> NewActionHandler {
        NewActionHandler {
            handler_type: handler_type.into(),
            version: version.into(),
            code: code.map(String::from),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn seeds_four_defaults_once() {
        let svc = service();
        assert_eq!(svc.seed_defaults().await.unwrap(), 4);
        assert_eq!(svc.seed_defaults().await.unwrap(), 0);

        let all = svc.find_all(None).await.unwrap();
        assert_eq!(all.len(), 4);
        let mut types: Vec<&str> = all.iter().map(|r| r.handler_type.as_str()).collect();
        types.sort();
        assert_eq!(types, vec!["delete", "edit", "save", "view"]);
        assert!(all.iter().all(|r| r.version == "1.0.0"));
    }

    #[tokio::test]
    async fn latest_is_by_semver_not_insertion() {
        let svc = service();
        for v in ["1.10.0", "1.2.0", "1.9.3"] {
            svc.create(new("view", v, None)).await.unwrap();
        }
        let latest = svc.find_latest_by_type("view").await.unwrap().unwrap();
        assert_eq!(latest.version, "1.10.0");
        assert!(svc.find_latest_by_type("edit").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn code_is_encrypted_at_rest_and_decrypted_for_clients() {
        let svc = service();
        let created = svc.create(new("view", "1.0.0", Some("plain manifest"))).await.unwrap();
        assert_ne!(created.code.as_deref(), Some("plain manifest"));

        let served = svc.get_with_decrypted_code("view", None).await.unwrap().unwrap();
        assert_eq!(served.code.as_deref(), Some("plain manifest"));
    }

    #[tokio::test]
    async fn new_version_keeps_history() {
        let svc = service();
        svc.seed_defaults().await.unwrap();
        let original = svc.find_latest_by_type("view").await.unwrap().unwrap();

        let bumped = svc
            .create_new_version(
                "view",
                ActionHandlerPatch {
                    description: Some("newer".into()),
                    ..Default::default()
                },
                ChangeKind::Minor,
            )
            .await
            .unwrap();

        assert_eq!(bumped.version, "1.1.0");
        assert_eq!(bumped.description.as_deref(), Some("newer"));
        assert_ne!(bumped.id, original.id);
        let old = svc.get_with_decrypted_code("view", Some("1.0.0")).await.unwrap().unwrap();
        assert_eq!(old.description, original.description);
        assert_eq!(svc.find_all(Some("view")).await.unwrap().len(), 2);

        let first = svc
            .create_new_version("archive", ActionHandlerPatch::default(), ChangeKind::Patch)
            .await
            .unwrap();
        assert_eq!(first.version, "0.0.1");
    }

    #[tokio::test]
    async fn update_and_remove_report_missing_rows() {
        let svc = service();
        assert!(svc
            .update("view", "1.0.0", ActionHandlerPatch::default())
            .await
            .unwrap()
            .is_none());
        assert!(!svc.remove("view", "1.0.0").await.unwrap());

        svc.create(new("view", "1.0.0", None)).await.unwrap();
        let updated = svc
            .update(
                "view",
                "1.0.0",
                ActionHandlerPatch {
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert!(!updated.enabled);
        assert!(svc.remove("view", "1.0.0").await.unwrap());
    }

    #[tokio::test]
    async fn check_for_updates_compares_frontend_versions() {
        let svc = service();
        assert!(svc.check_for_updates("edit", "1.0.0").await.unwrap());

        svc.seed_defaults().await.unwrap();
        assert!(svc.check_for_updates("edit", "0.9.0").await.unwrap());
        assert!(!svc.check_for_updates("edit", "1.0.0").await.unwrap());
        assert!(!svc.check_for_updates("edit", "1.1.0").await.unwrap());
    }

    #[tokio::test]
    async fn rejects_bad_keys_and_duplicates() {
        let svc = service();
        assert!(matches!(
            svc.create(new("view", "one", None)).await,
            Err(ServiceError::Invalid(_))
        ));
        svc.create(new("view", "1.0.0", None)).await.unwrap();
        assert!(matches!(
            svc.create(new("view", "1.0.0", None)).await,
            Err(ServiceError::Database(DatabaseError::Conflict(_)))
        ));
    }

    #[tokio::test]
    async fn definitions_carry_loadable_code() {
        let svc = service();
        svc.seed_defaults().await.unwrap();

        let plain = svc.definitions(false).await.unwrap();
        assert_eq!(plain.len(), 4);
        for def in &plain {
            let manifest = HandlerManifest::parse(def.code.as_deref().unwrap()).unwrap();
            assert_eq!(manifest.metadata.handler_type.as_deref(), Some(def.handler_type.as_str()));
        }

        let wrapped = svc.definitions(true).await.unwrap();
        assert!(wrapped
            .iter()
            .all(|d| d.code.as_deref().unwrap().starts_with(ENCRYPTED_PREFIX)));
    }
}
