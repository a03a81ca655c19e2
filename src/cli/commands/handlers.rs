use std::path::PathBuf;

use clap::Subcommand;
use serde_json::json;

use crate::cli::client::HandlerStoreClient;
use crate::cli::utils::{output_record, output_records, output_success, parse_json_object};
use crate::cli::OutputFormat;
use crate::database::models::{ActionHandlerPatch, NewActionHandler};

#[derive(Subcommand)]
pub enum HandlersCommands {
    #[command(about = "List stored handler versions")]
    List {
        #[arg(long = "type", help = "Only this handler type")]
        handler_type: Option<String>,
    },

    #[command(about = "Show the latest version of a handler type")]
    Latest {
        #[arg(help = "Handler type")]
        handler_type: String,
    },

    #[command(about = "Create a handler at an explicit version")]
    Create {
        #[arg(help = "Handler type")]
        handler_type: String,
        #[arg(long, default_value = "1.0.0", help = "Semantic version")]
        version: String,
        #[command(flatten)]
        fields: FieldArgs,
    },

    #[command(about = "Create the next version of a handler type")]
    Bump {
        #[arg(help = "Handler type")]
        handler_type: String,
        #[arg(long, default_value = "patch", help = "major, minor or patch")]
        change: String,
        #[command(flatten)]
        fields: FieldArgs,
    },

    #[command(about = "Update one exact handler version in place")]
    Update {
        #[arg(help = "Handler type")]
        handler_type: String,
        #[arg(help = "Version to update")]
        version: String,
        #[command(flatten)]
        fields: FieldArgs,
    },

    #[command(about = "Delete one exact handler version")]
    Remove {
        #[arg(help = "Handler type")]
        handler_type: String,
        #[arg(help = "Version to delete")]
        version: String,
    },

    #[command(about = "Install the default handlers into an empty store")]
    Seed,

    #[command(about = "Ask whether a frontend version needs a handler update")]
    Check {
        #[arg(help = "Handler type")]
        handler_type: String,
        #[arg(long, default_value = "1.0.0", help = "Frontend version to compare")]
        frontend_version: String,
    },
}

#[derive(clap::Args, Debug, Default)]
pub struct FieldArgs {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub enabled: Option<bool>,
    #[arg(long, help = "Settings as a JSON object")]
    pub settings: Option<String>,
    #[arg(long)]
    pub icon: Option<String>,
    #[arg(long, help = "File holding the handler manifest")]
    pub code_file: Option<PathBuf>,
    #[arg(long)]
    pub frontend_version: Option<String>,
}

impl FieldArgs {
    fn into_patch(self) -> anyhow::Result<ActionHandlerPatch> {
        let settings = self
            .settings
            .as_deref()
            .map(|raw| parse_json_object(raw, "--settings"))
            .transpose()?;
        let code = self.code_file.map(std::fs::read_to_string).transpose()?;

        Ok(ActionHandlerPatch {
            name: self.name,
            description: self.description,
            enabled: self.enabled,
            settings,
            icon: self.icon,
            code,
            frontend_version: self.frontend_version,
        })
    }
}

pub async fn handle(cmd: HandlersCommands, server: &str, output_format: OutputFormat) -> anyhow::Result<()> {
    let client = HandlerStoreClient::new(server);

    match cmd {
        HandlersCommands::List { handler_type } => {
            let records = client.list(handler_type.as_deref()).await?;
            output_records(&output_format, &records)
        }
        HandlersCommands::Latest { handler_type } => {
            let record = client.latest(&handler_type).await?;
            output_record(&output_format, &record)
        }
        HandlersCommands::Create {
            handler_type,
            version,
            fields,
        } => {
            let patch = fields.into_patch()?;
            let new = NewActionHandler {
                handler_type,
                version,
                name: patch.name,
                description: patch.description,
                enabled: patch.enabled,
                settings: patch.settings,
                icon: patch.icon,
                code: patch.code,
                frontend_version: patch.frontend_version,
            };
            let record = client.create(&new).await?;
            output_record(&output_format, &record)
        }
        HandlersCommands::Bump {
            handler_type,
            change,
            fields,
        } => {
            let record = client.bump(&handler_type, &change, &fields.into_patch()?).await?;
            output_record(&output_format, &record)
        }
        HandlersCommands::Update {
            handler_type,
            version,
            fields,
        } => {
            let record = client.update(&handler_type, &version, &fields.into_patch()?).await?;
            output_record(&output_format, &record)
        }
        HandlersCommands::Remove { handler_type, version } => {
            client.remove(&handler_type, &version).await?;
            output_success(
                &output_format,
                &format!("Removed {} v{}", handler_type, version),
                Some(json!({ "type": handler_type, "version": version })),
            )
        }
        HandlersCommands::Seed => {
            let created = client.seed().await?;
            let message = if created == 0 {
                "Store already has handlers, nothing seeded".to_string()
            } else {
                format!("Seeded {} default handlers", created)
            };
            output_success(&output_format, &message, Some(json!({ "created": created })))
        }
        HandlersCommands::Check {
            handler_type,
            frontend_version,
        } => {
            let needs_update = client.check(&handler_type, &frontend_version).await?;
            let message = if needs_update {
                format!("{} needs an update for frontend {}", handler_type, frontend_version)
            } else {
                format!("{} is current for frontend {}", handler_type, frontend_version)
            };
            output_success(&output_format, &message, Some(json!({ "needsUpdate": needs_update })))
        }
    }
}
