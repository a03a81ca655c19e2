mod common;

use anyhow::Result;
use serde_json::{json, Map, Value};

use common::{TestServer, TEST_KEY};
use table_actions::actions::handlers::BuiltinEnv;
use table_actions::actions::{ActionContext, ActionRuntime, SyncError};
use table_actions::versioning::CodeCipher;

fn runtime_for(server: &TestServer, decryption: Option<CodeCipher>) -> ActionRuntime {
    ActionRuntime::new(BuiltinEnv::in_memory(), decryption, server.definitions_url())
}

fn row(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

async fn create(server: &TestServer, body: Value) -> Result<()> {
    let res = reqwest::Client::new()
        .post(server.url("/action-handlers"))
        .json(&body)
        .send()
        .await?;
    anyhow::ensure!(res.status().is_success(), "create failed: {}", res.status());
    Ok(())
}

#[tokio::test]
async fn current_builtins_are_not_reloaded_until_a_newer_version_appears() -> Result<()> {
    let server = TestServer::seeded().await?;
    let runtime = runtime_for(&server, None);

    let report = runtime.sync().sync().await?;
    assert_eq!(report.fetched, 4);
    assert!(report.loaded.is_empty(), "nothing newer than the built-ins: {:?}", report);
    assert_eq!(report.skipped.len(), 4);

    let res = reqwest::Client::new()
        .post(server.url("/action-handlers/view/versions?changeType=minor"))
        .json(&json!({}))
        .send()
        .await?;
    assert!(res.status().is_success());

    let report = runtime.sync().sync().await?;
    assert_eq!(report.fetched, 5);
    assert_eq!(report.loaded, vec!["view".to_string()]);
    let view = runtime.registry().get("view").map(|h| h.metadata());
    assert_eq!(view.map(|m| m.version), Some("1.1.0".to_string()));

    // the served manifest still delegates to the built-in view
    let result = runtime
        .execute("view", &row(json!({ "id": "r1", "name": "Widget" })), &ActionContext::new())
        .await;
    assert!(result.success);
    assert_eq!(result.message.as_deref(), Some("Item details loaded"));
    Ok(())
}

#[tokio::test]
async fn registered_versions_never_go_backwards() -> Result<()> {
    let server = TestServer::seeded().await?;
    let client = reqwest::Client::new();
    let runtime = runtime_for(&server, None);

    client
        .post(server.url("/action-handlers/save/versions?changeType=major"))
        .json(&json!({}))
        .send()
        .await?;
    runtime.sync().sync().await?;
    let version = |rt: &ActionRuntime| rt.registry().get("save").map(|h| h.metadata().version);
    assert_eq!(version(&runtime).as_deref(), Some("2.0.0"));

    let res = client.delete(server.url("/action-handlers/save/2.0.0")).send().await?;
    assert!(res.status().is_success());

    let report = runtime.sync().sync().await?;
    assert!(report.skipped.contains(&"save".to_string()));
    assert_eq!(version(&runtime).as_deref(), Some("2.0.0"));
    Ok(())
}

#[tokio::test]
async fn custom_manifest_is_loaded_and_executes() -> Result<()> {
    let server = TestServer::start().await?;
    let manifest = json!({
        "metadata": { "type": "archive", "name": "Archive Handler", "version": "1.0.0" },
        "execute": { "action": "respond", "message": "Row archived", "includeRow": true }
    });
    create(
        &server,
        json!({ "type": "archive", "version": "1.2.0", "code": manifest.to_string() }),
    )
    .await?;

    let runtime = runtime_for(&server, None);
    let report = runtime.sync().sync().await?;
    assert_eq!(report.loaded, vec!["archive".to_string()]);

    let meta = runtime.registry().get("archive").map(|h| h.metadata());
    assert_eq!(meta.as_ref().map(|m| m.version.as_str()), Some("1.2.0"));
    assert_eq!(meta.as_ref().map(|m| m.name.as_str()), Some("Archive Handler"));

    let result = runtime
        .execute("archive", &row(json!({ "id": 7 })), &ActionContext::new())
        .await;
    assert!(result.success);
    assert_eq!(result.message.as_deref(), Some("Row archived"));
    assert_eq!(result.data.and_then(|d| d.get("row").cloned()), Some(json!({ "id": 7 })));
    Ok(())
}

#[tokio::test]
async fn denylisted_code_falls_back_to_a_safe_handler() -> Result<()> {
    let server = TestServer::start().await?;
    let code = r#"{"metadata":{"type":"archive"},"execute":{"action":"log"},"hook":"fetch('https://x')"}"#;
    create(&server, json!({ "type": "archive", "version": "1.0.0", "code": code })).await?;
    create(&server, json!({ "type": "notify", "version": "0.3.0" })).await?;

    let runtime = runtime_for(&server, None);
    let report = runtime.sync().sync().await?;
    let mut fallbacks = report.fallbacks.clone();
    fallbacks.sort();
    assert_eq!(fallbacks, vec!["archive".to_string(), "notify".to_string()]);

    let result = runtime
        .execute("archive", &row(json!({ "id": "a1" })), &ActionContext::new())
        .await;
    assert!(result.success);
    assert_eq!(result.message.as_deref(), Some("archive action executed successfully"));

    let notify = runtime.registry().get("notify").map(|h| h.metadata());
    assert_eq!(notify.map(|m| m.version), Some("0.3.0".to_string()));
    Ok(())
}

#[tokio::test]
async fn encrypted_definitions_need_the_shared_key() -> Result<()> {
    let server = TestServer::start().await?;
    let manifest = json!({
        "metadata": { "type": "archive" },
        "execute": { "action": "respond", "message": "Secret archive" }
    });
    create(
        &server,
        json!({ "type": "archive", "version": "1.0.0", "code": manifest.to_string() }),
    )
    .await?;
    let url = format!("{}?encrypted=true", server.definitions_url());

    let keyed = ActionRuntime::new(BuiltinEnv::in_memory(), Some(CodeCipher::new(TEST_KEY)?), url.clone());
    let report = keyed.sync().sync().await?;
    assert_eq!(report.loaded, vec!["archive".to_string()]);
    let result = keyed.execute("archive", &Map::new(), &ActionContext::new()).await;
    assert_eq!(result.message.as_deref(), Some("Secret archive"));

    let keyless = ActionRuntime::new(BuiltinEnv::in_memory(), None, url);
    let report = keyless.sync().sync().await?;
    assert_eq!(report.fallbacks, vec!["archive".to_string()]);
    Ok(())
}

#[tokio::test]
async fn failed_fetch_is_an_error_and_leaves_the_registry_alone() -> Result<()> {
    let server = TestServer::start().await?;
    let runtime = ActionRuntime::new(BuiltinEnv::in_memory(), None, server.url("/nowhere"));

    match runtime.sync().sync().await {
        Err(SyncError::Status(404)) => {}
        other => panic!("expected a 404 status error, got {:?}", other),
    }
    assert_eq!(runtime.registry().len(), 5);
    Ok(())
}

#[tokio::test]
async fn check_for_updates_goes_through_the_definitions_url() -> Result<()> {
    let server = TestServer::seeded().await?;
    let runtime = runtime_for(&server, None);

    // the runtime reports frontend 1.0.0 and the seeds declare 1.0.0
    assert!(!runtime.sync().check_for_updates("view").await);
    assert!(runtime.sync().check_for_updates("archive").await);
    Ok(())
}

#[tokio::test]
async fn check_for_updates_ignores_the_encrypted_query() -> Result<()> {
    let server = TestServer::seeded().await?;
    let url = format!("{}?encrypted=true", server.definitions_url());
    let runtime = ActionRuntime::new(BuiltinEnv::in_memory(), Some(CodeCipher::new(TEST_KEY)?), url);

    assert!(runtime.sync().check_for_updates("archive").await);
    assert!(!runtime.sync().check_for_updates("view").await);
    Ok(())
}
