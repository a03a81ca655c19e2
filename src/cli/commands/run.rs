use std::io::{self, BufRead, Write};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::actions::interaction::{ConfirmPrompt, DetailView, EditForm, EditOutcome};
use crate::actions::{ActionContext, AutoInteraction, UserInteraction};
use crate::cli::commands::sync::build_runtime;
use crate::cli::utils::{output_error, parse_json_object};
use crate::cli::OutputFormat;

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    #[arg(help = "Action type, e.g. save, delete, export")]
    pub action_type: String,

    #[arg(long, help = "Row as a JSON object")]
    pub row: String,

    #[arg(long, help = "Table key or title the row belongs to")]
    pub table: Option<String>,

    #[arg(long, help = "Answer yes to every prompt")]
    pub yes: bool,

    #[arg(long, help = "Use only the built-in handlers, skip the server")]
    pub offline: bool,
}

/// Prompts on the terminal; edit forms are accepted unchanged
struct TerminalInteraction;

fn ask(question: String) -> bool {
    print!("{} [y/N] ", question);
    let _ = io::stdout().flush();
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[async_trait]
impl UserInteraction for TerminalInteraction {
    async fn confirm(&self, prompt: ConfirmPrompt) -> bool {
        let question = format!("{}: {}", prompt.title, prompt.message);
        tokio::task::spawn_blocking(move || ask(question))
            .await
            .unwrap_or(false)
    }

    async fn edit(&self, form: EditForm) -> EditOutcome {
        let question = format!("{}: save {} fields?", form.title, form.fields.len());
        let fields = form.fields;
        match tokio::task::spawn_blocking(move || ask(question)).await {
            Ok(true) => EditOutcome::Submitted(fields),
            _ => EditOutcome::Cancelled,
        }
    }

    async fn view(&self, view: DetailView) {
        println!("{}", view.title);
        for (key, value) in &view.fields {
            println!("  {}: {}", key, value);
        }
    }
}

pub async fn handle(args: RunArgs, server: &str, output_format: OutputFormat) -> anyhow::Result<()> {
    let row = parse_json_object(&args.row, "--row")?;
    let runtime = build_runtime(server)?;

    if !args.offline {
        if let Err(e) = runtime.sync().sync().await {
            tracing::warn!("Sync failed, running with built-in handlers: {}", e);
        }
    }

    let interaction: Arc<dyn UserInteraction> = if args.yes {
        Arc::new(AutoInteraction::approving())
    } else {
        Arc::new(TerminalInteraction)
    };
    let mut ctx = ActionContext::new().with_interaction(interaction);

    if let Some(table) = args.table.as_deref() {
        let found = runtime.env().tables.as_ref().and_then(|tables| {
            tables
                .get_table_by_key(table)
                .or_else(|| tables.get_table_by_title(table))
        });
        match found {
            Some(data) => ctx = ctx.with_table(data),
            None => ctx.table_title = Some(table.to_string()),
        }
    }

    let result = runtime.execute(&args.action_type, &row, &ctx).await;

    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text if result.success => {
            println!("✓ {}", result.message.as_deref().unwrap_or("Done"));
            if let Some(data) = &result.data {
                println!("{}", serde_json::to_string_pretty(&Value::Object(data.clone()))?);
            }
        }
        OutputFormat::Text => {
            let message = result
                .error
                .as_deref()
                .or(result.message.as_deref())
                .unwrap_or("Action failed");
            output_error(&output_format, message)?;
        }
    }

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}
