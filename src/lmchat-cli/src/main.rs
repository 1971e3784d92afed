//! lmchat - main entry point.
//!
//! Parses arguments, installs logging and dispatches to the chat REPL or the
//! models listing.

use anyhow::{Context, Result};
use clap::Parser;

use lmchat_cli::cli::{Cli, LogLevel, dispatch_command};

/// Environment variable that sets the log level when no flag does.
const LOG_LEVEL_ENV: &str = "LMCHAT_LOG_LEVEL";

/// File in the working directory that `--debug` writes to.
const DEBUG_LOG_FILE: &str = "debug.txt";

/// Keeps the non-blocking log writer alive; pending lines flush on drop.
struct DebugLogGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Send every trace event, including reqwest and the stream decoder, to
/// `./debug.txt` instead of stderr so the chat screen stays clean.
fn setup_debug_file_logging() -> Result<DebugLogGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let path = std::env::current_dir()?.join(DEBUG_LOG_FILE);
    let file = std::fs::File::create(&path)
        .with_context(|| format!("Cannot write the lmchat debug log at {}", path.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new("trace"))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        path = %path.display(),
        "lmchat debug logging started"
    );
    eprintln!("lmchat: debug log at {}", path.display());

    Ok(DebugLogGuard { _guard: guard })
}

fn resolve_log_level(cli: &Cli) -> LogLevel {
    if cli.trace {
        LogLevel::Trace
    } else if cli.verbose {
        LogLevel::Debug
    } else if let Ok(env_level) = std::env::var(LOG_LEVEL_ENV) {
        LogLevel::from_str_loose(&env_level).unwrap_or(cli.log_level)
    } else {
        cli.log_level
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _debug_guard = if cli.debug {
        Some(setup_debug_file_logging()?)
    } else {
        None
    };

    if !cli.debug {
        // RUST_LOG directives win over the level flags.
        let filter_str = match std::env::var("RUST_LOG") {
            Ok(directives) if !directives.is_empty() => directives,
            _ => resolve_log_level(&cli).as_filter_str().to_string(),
        };

        tracing_subscriber::fmt()
            .with_env_filter(&filter_str)
            .with_writer(std::io::stderr)
            .init();
    }

    dispatch_command(cli).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_flags_beat_env_level() {
        // SAFETY: serialized test; no other thread reads the environment.
        unsafe { std::env::set_var(LOG_LEVEL_ENV, "info") };
        let trace = resolve_log_level(&Cli::try_parse_from(["lmchat", "--trace", "-v"]).unwrap());
        let verbose = resolve_log_level(&Cli::try_parse_from(["lmchat", "-v"]).unwrap());
        let env = resolve_log_level(&Cli::try_parse_from(["lmchat"]).unwrap());
        unsafe { std::env::remove_var(LOG_LEVEL_ENV) };

        assert_eq!(trace, LogLevel::Trace);
        assert_eq!(verbose, LogLevel::Debug);
        assert_eq!(env, LogLevel::Info);
    }

    #[test]
    #[serial]
    fn test_unknown_env_level_falls_back_to_flag() {
        // SAFETY: serialized test; no other thread reads the environment.
        unsafe { std::env::set_var(LOG_LEVEL_ENV, "loud") };
        let level = resolve_log_level(&Cli::try_parse_from(["lmchat", "-L", "error"]).unwrap());
        unsafe { std::env::remove_var(LOG_LEVEL_ENV) };
        assert_eq!(level, LogLevel::Error);
    }
}
