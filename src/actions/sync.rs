use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::actions::handlers::SafeHandler;
use crate::actions::loader::DynamicHandlerLoader;
use crate::actions::registry::ActionRegistry;
use crate::actions::traits::ActionHandler;
use crate::actions::types::{HandlerConfig, HandlerConfigPatch};
use crate::versioning::{is_update_needed, version_key};

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_FRONTEND_VERSION: &str = "1.0.0";

/// One handler definition as served to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerDefinition {
    #[serde(rename = "type")]
    pub handler_type: String,
    pub version: String,
    #[serde(default)]
    pub config: HandlerConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("API responded with status {0}")]
    Status(u16),

    #[error("Unexpected response body: {0}")]
    Body(String),

    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),
}

/// What one `sync` pass did, per type
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub fetched: usize,
    pub loaded: Vec<String>,
    pub fallbacks: Vec<String>,
    pub skipped: Vec<String>,
}

/// Partial settings for `configure`
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub api_url: Option<String>,
    pub sync_interval: Option<Duration>,
    pub frontend_version: Option<String>,
}

#[derive(Debug, Clone)]
struct SyncSettings {
    api_url: String,
    interval: Duration,
    frontend_version: String,
}

struct PollLoop {
    stop: watch::Sender<bool>,
    // Dropped rather than aborted so an in-flight sync runs to completion
    _task: JoinHandle<()>,
}

/// Pulls handler definitions from the backend and reconciles the registry
/// with them, once on demand or on a recurring timer.
pub struct ActionSyncService {
    registry: Arc<ActionRegistry>,
    loader: Arc<DynamicHandlerLoader>,
    client: reqwest::Client,
    settings: RwLock<SyncSettings>,
    poll: Mutex<Option<PollLoop>>,
}

impl ActionSyncService {
    pub fn new(
        registry: Arc<ActionRegistry>,
        loader: Arc<DynamicHandlerLoader>,
        api_url: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            loader,
            client: reqwest::Client::new(),
            settings: RwLock::new(SyncSettings {
                api_url: api_url.into(),
                interval: DEFAULT_SYNC_INTERVAL,
                frontend_version: DEFAULT_FRONTEND_VERSION.to_string(),
            }),
            poll: Mutex::new(None),
        }
    }

    /// Update settings. A running loop keeps its interval until restarted.
    pub fn configure(&self, options: SyncOptions) {
        let mut settings = self.settings.write();
        if let Some(url) = options.api_url {
            settings.api_url = url;
        }
        if let Some(interval) = options.sync_interval.filter(|d| !d.is_zero()) {
            settings.interval = interval;
        }
        if let Some(version) = options.frontend_version {
            settings.frontend_version = version;
        }
    }

    pub fn api_url(&self) -> String {
        self.settings.read().api_url.clone()
    }

    pub fn interval(&self) -> Duration {
        self.settings.read().interval
    }

    pub fn is_running(&self) -> bool {
        self.poll.lock().is_some()
    }

    /// Sync now, then every interval. Replaces any loop already running.
    pub fn start_sync(self: &Arc<Self>) {
        if self.is_running() {
            tracing::warn!("Sync already running. Stopping existing sync first.");
            self.stop_sync();
        }

        let interval = self.interval();
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let service = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = service.sync().await {
                            tracing::error!("Periodic sync failed: {}", e);
                        }
                    }
                    _ = stop_rx.changed() => break,
                }
            }
        });

        *self.poll.lock() = Some(PollLoop {
            stop: stop_tx,
            _task: task,
        });
        tracing::info!("Started action handler sync with interval of {}ms", interval.as_millis());
    }

    /// Cancel the recurring timer; safe to call when not running
    pub fn stop_sync(&self) {
        if let Some(poll) = self.poll.lock().take() {
            let _ = poll.stop.send(true);
            tracing::info!("Stopped action handler sync");
        }
    }

    /// One reconciliation pass. Only a failed fetch is an error; a bad
    /// definition for one type is replaced by a safe fallback.
    pub async fn sync(&self) -> Result<SyncReport, SyncError> {
        tracing::info!("Syncing action handlers from backend...");
        let definitions = match self.fetch_definitions().await {
            Ok(defs) => defs,
            Err(e) => {
                tracing::error!("Action handler sync failed: {}", e);
                return Err(e);
            }
        };

        let mut report = SyncReport {
            fetched: definitions.len(),
            ..Default::default()
        };

        for definition in newest_per_type(definitions) {
            self.apply(definition, &mut report);
        }

        tracing::info!(
            "Synced action handlers: {} loaded, {} fallbacks, {} up to date",
            report.loaded.len(),
            report.fallbacks.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    fn apply(&self, definition: HandlerDefinition, report: &mut SyncReport) {
        let HandlerDefinition {
            handler_type,
            version,
            config,
            code,
        } = definition;

        if let Some(current) = self.registry.get(&handler_type) {
            let current_version = current.metadata().version;
            let skip = if version_key(&version).is_none() {
                tracing::warn!(
                    "Ignoring {} definition with unparsable version '{}'",
                    handler_type,
                    version
                );
                true
            } else {
                !is_update_needed(Some(&current_version), Some(&version))
            };
            if skip {
                tracing::debug!(
                    "Handler {} v{} is up-to-date (backend: {})",
                    handler_type,
                    current_version,
                    version
                );
                report.skipped.push(handler_type);
                return;
            }
        }

        tracing::info!("Updating handler {} to version {}", handler_type, version);

        let loaded = match code.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(code) => self.loader.load(&handler_type, code, config.clone()).ok(),
            None => None,
        };

        let handler: Arc<dyn ActionHandler> = match loaded {
            Some(handler) => {
                let mut metadata = handler.metadata();
                metadata.version = version.clone();
                handler.update_config(HandlerConfigPatch::metadata(metadata));
                report.loaded.push(handler_type.clone());
                handler
            }
            None => {
                tracing::debug!("Registering safe fallback handler for {}", handler_type);
                report.fallbacks.push(handler_type.clone());
                Arc::new(SafeHandler::with_version(&handler_type, &version, config))
            }
        };

        self.registry.register(&handler_type, handler);
    }

    /// Ask the backend whether this client is behind for `handler_type`.
    /// Any failure reads as "up to date".
    pub async fn check_for_updates(&self, handler_type: &str) -> bool {
        match self.request_update_check(handler_type).await {
            Ok(needs_update) => needs_update,
            Err(e) => {
                tracing::error!("Failed to check for updates for handler {}: {}", handler_type, e);
                false
            }
        }
    }

    async fn request_update_check(&self, handler_type: &str) -> Result<bool, SyncError> {
        let (base, frontend_version) = {
            let s = self.settings.read();
            (s.api_url.clone(), s.frontend_version.clone())
        };
        let url = check_updates_url(&base)?;

        let response = self
            .client
            .get(url.clone())
            .query(&[("type", handler_type), ("frontendVersion", frontend_version.as_str())])
            .send()
            .await
            .map_err(|source| SyncError::Transport {
                url: url.to_string(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(SyncError::Status(response.status().as_u16()));
        }

        let body: Value = response.json().await.map_err(|source| SyncError::Transport {
            url: url.to_string(),
            source,
        })?;
        unwrap_envelope(body)
            .get("needsUpdate")
            .and_then(Value::as_bool)
            .ok_or_else(|| SyncError::Body("missing needsUpdate".to_string()))
    }

    async fn fetch_definitions(&self) -> Result<Vec<HandlerDefinition>, SyncError> {
        let url = self.api_url();
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| SyncError::Transport {
                url: url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(SyncError::Status(response.status().as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|source| SyncError::Transport { url, source })?;
        tracing::debug!("Received handler configurations: {}", body);

        serde_json::from_value(unwrap_envelope(body)).map_err(|e| SyncError::Body(e.to_string()))
    }
}

/// Accept both a bare payload and a `{success, data}` envelope
fn unwrap_envelope(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key("success") && map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Newest definition per type in first-seen order. Ties keep the first seen;
/// an unparsable version loses to any parsable one.
pub fn newest_per_type(definitions: Vec<HandlerDefinition>) -> Vec<HandlerDefinition> {
    let mut order: Vec<HandlerDefinition> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for definition in definitions {
        match index.get(&definition.handler_type) {
            Some(&i) => {
                if version_key(&definition.version) > version_key(&order[i].version) {
                    order[i] = definition;
                }
            }
            None => {
                index.insert(definition.handler_type.clone(), order.len());
                order.push(definition);
            }
        }
    }
    order
}

/// `<api_url>/check-updates`, dropping any query or fragment on the definitions URL
fn check_updates_url(api_url: &str) -> Result<url::Url, SyncError> {
    let mut url = url::Url::parse(api_url).map_err(|e| SyncError::InvalidUrl(format!("{}: {}", api_url, e)))?;
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|_| SyncError::InvalidUrl(api_url.to_string()))?
        .pop_if_empty()
        .push("check-updates");
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::handlers::BuiltinEnv;
    use axum::{http::StatusCode, routing::get, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn def(handler_type: &str, version: &str, code: Option<&str>) -> HandlerDefinition {
        HandlerDefinition {
            handler_type: handler_type.into(),
            version: version.into(),
            config: HandlerConfig::default(),
            code: code.map(String::from),
        }
    }

    fn service() -> ActionSyncService {
        ActionSyncService::new(
            Arc::new(ActionRegistry::new()),
            Arc::new(DynamicHandlerLoader::new(BuiltinEnv::in_memory(), None)),
            "http://127.0.0.1:9/definitions",
        )
    }

    #[test]
    fn keeps_newest_version_per_type() {
        let picked = newest_per_type(vec![
            def("save", "1.0.0", Some("a")),
            def("view", "1.0.0", None),
            def("save", "1.2.0", Some("b")),
            def("save", "1.2.0", Some("c")),
            def("save", "garbage", Some("d")),
        ]);

        assert_eq!(picked.len(), 2);
        assert_eq!(picked[0].version, "1.2.0");
        assert_eq!(picked[0].code.as_deref(), Some("b"));
        assert_eq!(picked[1].handler_type, "view");
    }

    #[test]
    fn never_downgrades_and_skips_equal_versions() {
        let svc = service();
        let mut report = SyncReport::default();
        svc.apply(def("save", "1.2.0", None), &mut report);
        svc.apply(def("save", "1.1.0", None), &mut report);
        svc.apply(def("save", "1.2.0", None), &mut report);

        assert_eq!(svc.registry.get("save").unwrap().metadata().version, "1.2.0");
        assert_eq!(report.fallbacks, vec!["save".to_string()]);
        assert_eq!(report.skipped.len(), 2);
    }

    #[test]
    fn bad_code_falls_back_with_remote_version() {
        let svc = service();
        let mut report = SyncReport::default();
        let code = r#"{"metadata": {}, "execute": {"action": "respond", "message": "eval(1)"}}"#;
        svc.apply(def("export", "2.0.0", Some(code)), &mut report);

        let meta = svc.registry.get("export").unwrap().metadata();
        assert_eq!(meta.version, "2.0.0");
        assert_eq!(meta.name, "Export Handler");
        assert_eq!(report.fallbacks, vec!["export".to_string()]);
    }

    #[test]
    fn loaded_handlers_carry_the_remote_version() {
        let svc = service();
        let mut report = SyncReport::default();
        let code = r#"{"metadata": {"version": "9.9.9"}, "execute": {"action": "log"}}"#;
        svc.apply(def("archive", "1.3.0", Some(code)), &mut report);

        assert_eq!(svc.registry.get("archive").unwrap().metadata().version, "1.3.0");
        assert_eq!(report.loaded, vec!["archive".to_string()]);
    }

    #[test]
    fn envelope_is_optional() {
        let bare = serde_json::json!([1]);
        assert_eq!(unwrap_envelope(bare.clone()), bare);
        assert_eq!(
            unwrap_envelope(serde_json::json!({"success": true, "data": [1]})),
            bare
        );
    }

    #[test]
    fn update_check_url_drops_the_query() {
        let url = check_updates_url("http://h/action-handlers/definitions?encrypted=true#top").unwrap();
        assert_eq!(url.as_str(), "http://h/action-handlers/definitions/check-updates");

        let url = check_updates_url("http://h/definitions/").unwrap();
        assert_eq!(url.as_str(), "http://h/definitions/check-updates");

        assert!(matches!(check_updates_url("not a url"), Err(SyncError::InvalidUrl(_))));
    }

    /// Backend whose definitions endpoint always answers 500 and counts requests
    async fn failing_backend() -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/definitions",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/definitions", addr), hits)
    }

    fn polling_service(api_url: &str, interval: Duration) -> Arc<ActionSyncService> {
        let svc = Arc::new(service());
        svc.configure(SyncOptions {
            api_url: Some(api_url.to_string()),
            sync_interval: Some(interval),
            ..Default::default()
        });
        svc
    }

    async fn wait_for_hits(hits: &AtomicUsize, at_least: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while hits.load(Ordering::SeqCst) < at_least {
            assert!(tokio::time::Instant::now() < deadline, "backend saw {} requests", hits.load(Ordering::SeqCst));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn start_syncs_immediately() {
        let (url, hits) = failing_backend().await;
        let svc = polling_service(&url, Duration::from_secs(3600));
        svc.start_sync();
        wait_for_hits(&hits, 1).await;
        svc.stop_sync();
    }

    #[tokio::test]
    async fn failed_syncs_keep_the_loop_ticking() {
        let (url, hits) = failing_backend().await;
        let svc = polling_service(&url, Duration::from_millis(40));
        svc.start_sync();
        wait_for_hits(&hits, 3).await;
        assert!(svc.is_running());
        svc.stop_sync();
    }

    #[tokio::test]
    async fn restart_leaves_a_single_loop() {
        let (url, hits) = failing_backend().await;
        let svc = polling_service(&url, Duration::from_millis(30));
        svc.start_sync();
        svc.start_sync();
        wait_for_hits(&hits, 2).await;
        svc.stop_sync();

        // Let any in-flight request land, then nothing else may arrive
        tokio::time::sleep(Duration::from_millis(60)).await;
        let settled = hits.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(hits.load(Ordering::SeqCst), settled);
    }

    #[tokio::test]
    async fn fetch_failure_propagates_and_update_check_fails_closed() {
        let svc = service();
        assert!(matches!(svc.sync().await, Err(SyncError::Transport { .. })));
        assert!(!svc.check_for_updates("save").await);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let svc = Arc::new(service());
        svc.stop_sync();
        svc.configure(SyncOptions {
            sync_interval: Some(Duration::from_secs(3600)),
            ..Default::default()
        });
        svc.start_sync();
        assert!(svc.is_running());
        svc.start_sync();
        assert!(svc.is_running());
        svc.stop_sync();
        svc.stop_sync();
        assert!(!svc.is_running());
    }
}
