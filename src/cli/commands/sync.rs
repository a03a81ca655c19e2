use serde_json::json;

use crate::actions::{ActionRuntime, SyncOptions};
use crate::cli::client::HandlerStoreClient;
use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::config::config;

#[derive(clap::Args, Debug)]
pub struct SyncArgs {
    #[arg(long, help = "Keep polling at the configured interval until Ctrl-C")]
    pub watch: bool,
}

/// Client runtime from config, pointed at `server`'s definitions endpoint
pub fn build_runtime(server: &str) -> anyhow::Result<ActionRuntime> {
    let runtime = ActionRuntime::from_config(config())?;
    runtime.sync().configure(SyncOptions {
        api_url: Some(HandlerStoreClient::new(server).definitions_url()),
        ..Default::default()
    });
    Ok(runtime)
}

pub async fn handle(args: SyncArgs, server: &str, output_format: OutputFormat) -> anyhow::Result<()> {
    let runtime = build_runtime(server)?;

    let report = runtime.sync().sync().await?;
    let metadata = runtime.registry().all_metadata();

    match output_format {
        OutputFormat::Json => {
            output_success(
                &output_format,
                "Synchronized action handlers",
                Some(json!({ "report": report, "handlers": metadata })),
            )?;
        }
        OutputFormat::Text => {
            println!(
                "Fetched {} definitions: {} loaded, {} fallback, {} unchanged",
                report.fetched,
                report.loaded.len(),
                report.fallbacks.len(),
                report.skipped.len()
            );
            for handler_type in runtime.registry().types() {
                if let Some(meta) = metadata.get(&handler_type) {
                    println!("  {:<12} v{:<10} {}", meta.handler_type, meta.version, meta.name);
                }
            }
        }
    }

    if args.watch {
        runtime.start();
        println!(
            "Watching {} every {:?} (Ctrl-C to stop)",
            runtime.sync().api_url(),
            runtime.sync().interval()
        );
        tokio::signal::ctrl_c().await?;
        runtime.stop();
    }
    Ok(())
}
