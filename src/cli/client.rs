use anyhow::{anyhow, Context};
use reqwest::{Method, RequestBuilder};
use serde_json::Value;

use crate::database::models::{ActionHandlerPatch, ActionHandlerRecord, NewActionHandler};

/// Thin client for the handler store's admin endpoints
pub struct HandlerStoreClient {
    base_url: String,
    client: reqwest::Client,
}

impl HandlerStoreClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn definitions_url(&self) -> String {
        format!("{}/action-handlers/definitions", self.base_url)
    }

    pub async fn list(&self, handler_type: Option<&str>) -> anyhow::Result<Vec<ActionHandlerRecord>> {
        let mut req = self.request(Method::GET, "/action-handlers");
        if let Some(t) = handler_type {
            req = req.query(&[("type", t)]);
        }
        data(send(req).await?)
    }

    pub async fn latest(&self, handler_type: &str) -> anyhow::Result<ActionHandlerRecord> {
        let req = self
            .request(Method::GET, "/action-handlers/latest")
            .query(&[("type", handler_type)]);
        data(send(req).await?)
    }

    pub async fn create(&self, new: &NewActionHandler) -> anyhow::Result<ActionHandlerRecord> {
        let req = self.request(Method::POST, "/action-handlers").json(new);
        data(send(req).await?)
    }

    pub async fn bump(
        &self,
        handler_type: &str,
        change_type: &str,
        patch: &ActionHandlerPatch,
    ) -> anyhow::Result<ActionHandlerRecord> {
        let req = self
            .request(Method::POST, &format!("/action-handlers/{}/versions", handler_type))
            .query(&[("changeType", change_type)])
            .json(patch);
        data(send(req).await?)
    }

    pub async fn update(
        &self,
        handler_type: &str,
        version: &str,
        patch: &ActionHandlerPatch,
    ) -> anyhow::Result<ActionHandlerRecord> {
        let req = self
            .request(Method::PUT, &format!("/action-handlers/{}/{}", handler_type, version))
            .json(patch);
        data(send(req).await?)
    }

    pub async fn remove(&self, handler_type: &str, version: &str) -> anyhow::Result<()> {
        let req = self.request(Method::DELETE, &format!("/action-handlers/{}/{}", handler_type, version));
        send(req).await?;
        Ok(())
    }

    pub async fn seed(&self) -> anyhow::Result<u64> {
        let body: Value = data(send(self.request(Method::POST, "/action-handlers/initialize")).await?)?;
        Ok(body.get("created").and_then(Value::as_u64).unwrap_or(0))
    }

    pub async fn check(&self, handler_type: &str, frontend_version: &str) -> anyhow::Result<bool> {
        let req = self
            .request(Method::GET, "/action-handlers/definitions/check-updates")
            .query(&[("type", handler_type), ("frontendVersion", frontend_version)]);
        let body = send(req).await?;
        body.get("needsUpdate")
            .and_then(Value::as_bool)
            .ok_or_else(|| anyhow!("check-updates response has no needsUpdate"))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, format!("{}{}", self.base_url, path))
    }
}

async fn send(req: RequestBuilder) -> anyhow::Result<Value> {
    let response = req.send().await.context("request to handler store failed")?;
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);

    if !status.is_success() {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed"));
        return Err(anyhow!("{} ({})", message, status.as_u16()));
    }
    Ok(body)
}

/// Unwrap the `{success, data}` envelope
fn data<T: serde::de::DeserializeOwned>(body: Value) -> anyhow::Result<T> {
    let inner = match body {
        Value::Object(mut map) if map.contains_key("data") => map.remove("data").unwrap_or(Value::Null),
        other => other,
    };
    serde_json::from_value(inner).context("unexpected response shape")
}

