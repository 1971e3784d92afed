//! Command dispatch and execution handlers.

use anyhow::Result;
use lmchat_engine::Settings;

use super::args::{Cli, Commands, ConnectionArgs};
use crate::chat_cmd;

/// Dispatch a CLI command to its handler.
pub async fn dispatch_command(cli: Cli) -> Result<()> {
    match cli.command {
        None | Some(Commands::Chat) => chat_cmd::run(cli.connection).await,
        Some(Commands::Models(models_cli)) => models_cli.run(cli.connection).await,
    }
}

/// Load persisted settings and apply command-line overrides.
///
/// An unreadable settings file is reported and replaced by defaults so the
/// client still starts.
pub fn resolve_settings(connection: &ConnectionArgs) -> Result<Settings> {
    let mut settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring unreadable settings");
            Settings::default()
        }
    };
    apply_overrides(&mut settings, connection);
    Ok(settings)
}

fn apply_overrides(settings: &mut Settings, connection: &ConnectionArgs) {
    if let Some(base_url) = &connection.base_url {
        settings.base_url = base_url.clone();
    }
    if connection.no_stream {
        settings.stream = false;
    }
}

/// Apply `change` to the stored settings and save them if anything changed.
///
/// Command-line overrides live only in memory; this edits the file's own
/// values so one-off flags are not persisted.
pub fn update_settings(change: impl FnOnce(&mut Settings)) {
    let mut stored = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!(error = %e, "Not saving settings over an unreadable file");
            return;
        }
    };
    let before = stored.clone();
    change(&mut stored);
    if stored == before {
        return;
    }
    if let Err(e) = stored.save() {
        tracing::warn!(error = %e, "Failed to save settings");
    }
}

/// Persist `base_url` once it has answered a model listing.
pub fn remember_base_url(base_url: &str) {
    update_settings(|settings| settings.base_url = base_url.to_string());
}
