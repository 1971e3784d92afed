//! CLI argument structures and parsing.

use clap::{Args, Parser, Subcommand};

use crate::models_cmd::ModelsCli;

/// Log verbosity level for CLI output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    /// Only show errors
    Error,
    /// Show warnings and errors (default)
    #[default]
    Warn,
    /// Show informational messages, warnings, and errors
    Info,
    /// Show debug messages and above
    Debug,
    /// Show all messages including trace-level details
    Trace,
}

impl LogLevel {
    /// Convert to tracing filter string.
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Parse from string (case-insensitive).
    pub fn from_str_loose(s: &str) -> Option<LogLevel> {
        match s.to_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }
}

/// lmchat - chat with a local model server
///
/// If no subcommand is specified, starts the interactive chat.
#[derive(Parser)]
#[command(name = "lmchat")]
#[command(author, version)]
#[command(about = "Chat with models served by LM Studio or any OpenAI-compatible local server", long_about = None)]
pub struct Cli {
    /// Enable verbose output (same as --log-level debug)
    #[arg(long = "verbose", short = 'v', global = true)]
    pub verbose: bool,

    /// Enable trace-level logging for debugging
    #[arg(long = "trace", global = true)]
    pub trace: bool,

    /// Set log verbosity level (error, warn, info, debug, trace)
    #[arg(
        long = "log-level",
        short = 'L',
        value_enum,
        default_value = "warn",
        global = true,
        help_heading = "Debugging"
    )]
    pub log_level: LogLevel,

    /// Enable debug mode: writes ALL trace-level logs to ./debug.txt
    #[arg(long = "debug", global = true, help_heading = "Debugging")]
    pub debug: bool,

    #[clap(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Server and request options shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Server root URL, e.g. http://127.0.0.1:1234 (overrides settings)
    #[arg(long = "base-url", global = true, help_heading = "Connection")]
    pub base_url: Option<String>,

    /// Model id to select after the model list loads
    #[arg(long = "model", short = 'm', global = true, help_heading = "Connection")]
    pub model: Option<String>,

    /// Request whole replies instead of streamed deltas
    #[arg(long = "no-stream", global = true, help_heading = "Connection")]
    pub no_stream: bool,
}

/// CLI subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive chat (default)
    Chat,

    /// List models loaded on the server
    #[command(visible_alias = "ls")]
    Models(ModelsCli),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Warn);
    }

    #[test]
    fn test_log_level_from_str_loose() {
        assert_eq!(LogLevel::from_str_loose("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_str_loose("TrAcE"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::from_str_loose("verbose"), None);
        assert_eq!(LogLevel::from_str_loose(""), None);
    }

    #[test]
    fn test_cli_no_args() {
        let cli = Cli::try_parse_from(["lmchat"]).expect("should parse with no args");
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
        assert!(!cli.debug);
        assert_eq!(cli.log_level, LogLevel::Warn);
        assert!(!cli.connection.no_stream);
    }

    #[test]
    fn test_cli_connection_flags() {
        let cli = Cli::try_parse_from([
            "lmchat",
            "--base-url",
            "http://10.0.0.2:1234/",
            "-m",
            "qwen3-8b",
            "--no-stream",
        ])
        .expect("should parse connection flags");
        assert_eq!(
            cli.connection.base_url.as_deref(),
            Some("http://10.0.0.2:1234/")
        );
        assert_eq!(cli.connection.model.as_deref(), Some("qwen3-8b"));
        assert!(cli.connection.no_stream);
    }

    #[test]
    fn test_cli_models_json() {
        let cli = Cli::try_parse_from(["lmchat", "models", "--json"]).expect("should parse");
        match cli.command {
            Some(Commands::Models(models)) => assert!(models.json),
            _ => panic!("expected models command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["lmchat", "chat", "--trace", "--model", "m"])
            .expect("should parse");
        assert!(matches!(cli.command, Some(Commands::Chat)));
        assert!(cli.trace);
        assert_eq!(cli.connection.model.as_deref(), Some("m"));
    }
}
