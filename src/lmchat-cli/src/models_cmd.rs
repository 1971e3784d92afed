//! Models command - list models loaded on the server.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Parser;
use lmchat_engine::{LMStudioClient, Model};

use crate::cli::ConnectionArgs;
use crate::cli::handlers::{remember_base_url, resolve_settings};

/// Models CLI.
#[derive(Debug, Parser)]
pub struct ModelsCli {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ModelsCli {
    /// Run the models command.
    pub async fn run(self, connection: ConnectionArgs) -> Result<()> {
        let settings = resolve_settings(&connection)?;
        let client = LMStudioClient::new(settings.base_url.clone());

        let models = client
            .fetch_models()
            .await
            .with_context(|| format!("Could not list models at {}", client.base_url()))?;
        remember_base_url(client.base_url());

        let mut stdout = std::io::stdout().lock();
        if self.json {
            writeln!(stdout, "{}", serde_json::to_string_pretty(&models)?)?;
        } else {
            write_model_table(&mut stdout, &models, connection.model.as_deref())?;
        }
        Ok(())
    }
}

/// Human-readable listing. The model that a chat would select is starred.
pub fn write_model_table<W: Write>(
    out: &mut W,
    models: &[Model],
    preferred: Option<&str>,
) -> std::io::Result<()> {
    if models.is_empty() {
        writeln!(out, "No models loaded.")?;
        return Ok(());
    }

    let active = preferred
        .filter(|id| models.iter().any(|m| m.id == *id))
        .or_else(|| models.first().map(|m| m.id.as_str()));
    let width = models.iter().map(|m| m.id.len()).max().unwrap_or(0);

    for model in models {
        let marker = if Some(model.id.as_str()) == active { "*" } else { " " };
        if model.owned_by.is_empty() {
            writeln!(out, "{marker} {}", model.id)?;
        } else {
            writeln!(out, "{marker} {:<width$}  {}", model.id, model.owned_by)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn model(id: &str, owner: &str) -> Model {
        serde_json::from_value(serde_json::json!({"id": id, "owned_by": owner})).unwrap()
    }

    #[test]
    fn test_table_marks_first_model_by_default() {
        let mut out = Vec::new();
        write_model_table(&mut out, &[model("a", "me"), model("bbb", "")], None).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "* a    me\n  bbb\n");
    }

    #[test]
    fn test_table_marks_preferred_model() {
        let mut out = Vec::new();
        write_model_table(&mut out, &[model("a", ""), model("b", "")], Some("b")).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "  a\n* b\n");
    }

    #[test]
    fn test_table_empty() {
        let mut out = Vec::new();
        write_model_table(&mut out, &[], Some("x")).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "No models loaded.\n");
    }
}
