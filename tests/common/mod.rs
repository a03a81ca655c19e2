#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use tokio::task::JoinHandle;

use table_actions::app::{create_router, AppState};
use table_actions::database::MemoryHandlerRepository;
use table_actions::services::ActionHandlerService;
use table_actions::versioning::CodeCipher;

pub const TEST_KEY: &str = "integration-test-key";

/// An in-process server over a fresh in-memory store. Each test gets its own,
/// tied to that test's runtime.
pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    pub service: Arc<ActionHandlerService>,
    task: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let service = Arc::new(ActionHandlerService::new(
            Arc::new(MemoryHandlerRepository::new()),
            CodeCipher::new(TEST_KEY)?,
        ));
        let app = create_router(AppState::new(service.clone(), None), true);

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .with_context(|| format!("failed to bind {}", port))?;
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let server = Self {
            port,
            base_url,
            service,
            task,
        };
        server.wait_ready(Duration::from_secs(10)).await?;
        Ok(server)
    }

    /// Server with the default handlers already seeded
    pub async fn seeded() -> Result<Self> {
        let server = Self::start().await?;
        server.service.seed_defaults().await?;
        Ok(server)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn definitions_url(&self) -> String {
        self.url("/action-handlers/definitions")
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            if let Ok(resp) = client.get(self.url("/health")).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
