use serde_json::{json, Value};

use crate::cli::OutputFormat;
use crate::database::models::ActionHandlerRecord;

/// Output a success message in the appropriate format
pub fn output_success(
    output_format: &OutputFormat,
    message: &str,
    data: Option<Value>,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            if let (Some(Value::Object(extra)), Some(obj)) = (data, response.as_object_mut()) {
                obj.extend(extra);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Output an error message in the appropriate format
pub fn output_error(output_format: &OutputFormat, message: &str) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "success": false,
                    "error": message
                }))?
            );
        }
        OutputFormat::Text => {
            eprintln!("Error: {}", message);
        }
    }
    Ok(())
}

/// Output handler records as a table or a JSON array
pub fn output_records(output_format: &OutputFormat, records: &[ActionHandlerRecord]) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(records)?);
        }
        OutputFormat::Text => {
            if records.is_empty() {
                println!("No handlers found");
                return Ok(());
            }
            println!("{:<12} {:<10} {:<8} {:<10} NAME", "TYPE", "VERSION", "ENABLED", "FRONTEND");
            for r in records {
                println!(
                    "{:<12} {:<10} {:<8} {:<10} {}",
                    r.handler_type,
                    r.version,
                    r.enabled,
                    r.frontend_version.as_deref().unwrap_or("-"),
                    r.name
                );
            }
        }
    }
    Ok(())
}

/// Output a single handler record
pub fn output_record(output_format: &OutputFormat, record: &ActionHandlerRecord) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(record)?);
        }
        OutputFormat::Text => {
            println!("Type: {}", record.handler_type);
            println!("Version: {}", record.version);
            println!("Name: {}", record.name);
            if let Some(desc) = record.description.as_deref().filter(|d| !d.is_empty()) {
                println!("Description: {}", desc);
            }
            println!("Enabled: {}", record.enabled);
            if let Some(fv) = &record.frontend_version {
                println!("Frontend version: {}", fv);
            }
            println!("Updated: {}", record.updated_at.to_rfc3339());
        }
    }
    Ok(())
}

/// Parse a JSON object argument
pub fn parse_json_object(raw: &str, what: &str) -> anyhow::Result<serde_json::Map<String, Value>> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("{} must be a JSON object", what),
    }
}
