//! Chat command - the interactive REPL.
//!
//! Plain lines are sent to the selected model; lines starting with `/` are
//! commands. Replies are rendered while they stream.

use std::io::{self, IsTerminal, Write};
use std::path::Path;

use anyhow::Result;
use lmchat_engine::{
    ChatSession, ConversationTurn, EngineError, ImageAttachment, ReplyOutcome, Role,
    ThoughtPanel, Transcript, split_reasoning,
};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cli::ConnectionArgs;
use crate::cli::handlers::{remember_base_url, resolve_settings, update_settings};
use crate::models_cmd::write_model_table;
use crate::render::{TurnPrinter, write_thought, write_welcome};
use crate::styled_output::{Palette, Tone};

const HELP: &str = "\
/models          list models
/model <id>      select a model (clears the conversation)
/refresh         reload the model list
/url <base>      change the server URL
/image <path>    attach an image to the next message
/think           show or hide the last thought
/clear           start a new conversation
/theme           toggle dark/light colors
/help            show this help
/quit            exit";

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Empty,
    Message(String),
    Command(SlashCommand),
}

/// REPL commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Models,
    Model(String),
    Refresh,
    Url(String),
    Image(String),
    Think,
    Clear,
    Theme,
    Help,
    Quit,
    /// Known command missing its argument.
    Usage(&'static str),
    Unknown(String),
}

/// Classify a line typed at the prompt.
pub fn parse_input(line: &str) -> Input {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Input::Empty;
    }
    let Some(command) = trimmed.strip_prefix('/') else {
        return Input::Message(line.trim_end_matches(['\r', '\n']).to_string());
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    let with_arg = |usage: &'static str, make: fn(String) -> SlashCommand| {
        if arg.is_empty() {
            SlashCommand::Usage(usage)
        } else {
            make(arg.to_string())
        }
    };

    Input::Command(match name.to_ascii_lowercase().as_str() {
        "models" => SlashCommand::Models,
        "model" => with_arg("/model <id>", SlashCommand::Model),
        "refresh" => SlashCommand::Refresh,
        "url" => with_arg("/url <base>", SlashCommand::Url),
        "image" => with_arg("/image <path>", SlashCommand::Image),
        "think" => SlashCommand::Think,
        "clear" | "new" => SlashCommand::Clear,
        "theme" => SlashCommand::Theme,
        "help" | "?" => SlashCommand::Help,
        "quit" | "exit" | "q" => SlashCommand::Quit,
        other => SlashCommand::Unknown(other.to_string()),
    })
}

/// The assistant turn being rendered, if the transcript currently ends in one.
///
/// A failed reply leaves a system turn after its partial text.
fn reply_turn(transcript: &Transcript) -> Option<&ConversationTurn> {
    match transcript.turns() {
        [.., last] if last.role() == Role::Assistant => Some(last),
        [.., reply, last] if last.role() == Role::System && reply.role() == Role::Assistant => {
            Some(reply)
        }
        _ => None,
    }
}

/// Terminal width when stdout is a terminal.
fn terminal_columns() -> Option<u16> {
    if !io::stdout().is_terminal() {
        return None;
    }
    crossterm::terminal::size().ok().map(|(columns, _)| columns)
}

struct ChatRepl {
    session: ChatSession,
    palette: Palette,
    pending: Vec<ImageAttachment>,
    /// Panel of the latest reply, for `/think`.
    last_panel: Option<ThoughtPanel>,
}

impl ChatRepl {
    fn say(&self, tone: Tone, message: &str) {
        println!("{}", self.palette.paint(tone, message));
    }

    fn print_welcome(&self) {
        let mut stdout = io::stdout();
        let _ = write_welcome(
            &mut stdout,
            &self.palette,
            self.session.base_url(),
            self.session.selected_model(),
        );
        if let Some(error) = self.session.connection_error() {
            self.say(Tone::Error, &format!("Connection error: {error}"));
        }
    }

    fn print_prompt(&self) -> io::Result<()> {
        let mut stdout = io::stdout();
        write!(stdout, "\n{} ", self.palette.paint(Tone::User, "you ›"))?;
        stdout.flush()
    }

    /// Reload models and apply `preferred` when it is listed.
    async fn connect(&mut self, preferred: Option<&str>) {
        let result = self.session.refresh_models().await.map(|models| models.len());
        match result {
            Ok(count) => {
                tracing::debug!(count, "Connected");
                remember_base_url(self.session.base_url());
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not load models");
                return;
            }
        }
        if let Some(id) = preferred
            && let Err(e) = self.session.select_model(id)
        {
            self.say(Tone::Warning, &e.to_string());
        }
    }

    fn list_models(&self) {
        let mut stdout = io::stdout();
        let _ = write_model_table(
            &mut stdout,
            self.session.models(),
            self.session.selected_model(),
        );
    }

    async fn send(&mut self, text: &str) -> Result<()> {
        let mut printer = TurnPrinter::new(io::stdout(), self.palette, terminal_columns());
        let mut render_error = None;

        let result = self
            .session
            .send(text, self.pending.clone(), |transcript| {
                if let Some(turn) = reply_turn(transcript)
                    && let Err(e) = printer.update(turn.text(), turn.is_streaming())
                    && render_error.is_none()
                {
                    render_error = Some(e);
                }
            })
            .await;
        let panel = printer.finish()?;
        if let Some(e) = render_error {
            tracing::warn!(error = %e, "Rendering failed");
        }

        match result {
            Ok(ReplyOutcome::Completed) => {
                self.pending.clear();
                self.last_panel = Some(panel);
            }
            Ok(ReplyOutcome::Failed { message }) => {
                self.pending.clear();
                self.last_panel = Some(panel);
                self.say(Tone::Error, &message);
            }
            Err(EngineError::NoModelSelected) => {
                self.say(
                    Tone::Warning,
                    "No model selected. Load a model in the server, then /refresh.",
                );
            }
            Err(e) => self.say(Tone::Error, &e.to_string()),
        }
        Ok(())
    }

    fn toggle_thought(&mut self) {
        let reasoning = self
            .session
            .transcript()
            .turns()
            .iter()
            .rev()
            .find(|t| t.role() == Role::Assistant)
            .and_then(|t| split_reasoning(t.text(), t.is_streaming()).reasoning);

        let Some(reasoning) = reasoning else {
            self.say(Tone::Dim, "No thought to show.");
            return;
        };
        let panel = self.last_panel.get_or_insert_with(ThoughtPanel::new);
        panel.toggle();
        if panel.is_expanded() {
            let width = terminal_columns().map_or(80, usize::from);
            let _ = write_thought(&mut io::stdout(), &self.palette, &reasoning, width);
        } else {
            self.say(Tone::Dim, "▸ Thought hidden");
        }
    }

    fn attach(&mut self, source: &str) {
        let attachment = if source.starts_with("data:") {
            ImageAttachment::from_data_url(source)
        } else {
            ImageAttachment::from_path(Path::new(source))
        };
        match attachment {
            Ok(image) => {
                self.pending.push(image);
                self.say(
                    Tone::Dim,
                    &format!("Image attached ({} pending).", self.pending.len()),
                );
            }
            Err(e) => self.say(Tone::Error, &e.to_string()),
        }
    }

    /// Run a command. Returns `false` when the REPL should exit.
    async fn handle(&mut self, command: SlashCommand) -> bool {
        match command {
            SlashCommand::Models => self.list_models(),
            SlashCommand::Model(id) => {
                let had_history = !self.session.transcript().is_empty();
                let changed = self.session.selected_model() != Some(id.as_str());
                match self.session.select_model(&id) {
                    Ok(()) if changed => {
                        self.last_panel = None;
                        self.say(Tone::Dim, &format!("Using {id}."));
                        if had_history {
                            self.print_welcome();
                        }
                    }
                    Ok(()) => self.say(Tone::Dim, &format!("Already using {id}.")),
                    Err(e) => self.say(Tone::Error, &e.to_string()),
                }
            }
            SlashCommand::Refresh => {
                self.connect(None).await;
                self.report_connection();
            }
            SlashCommand::Url(base_url) => {
                self.session.set_base_url(base_url);
                self.connect(None).await;
                self.report_connection();
            }
            SlashCommand::Image(source) => self.attach(&source),
            SlashCommand::Think => self.toggle_thought(),
            SlashCommand::Clear => {
                self.session.clear_transcript();
                self.pending.clear();
                self.last_panel = None;
                self.print_welcome();
            }
            SlashCommand::Theme => {
                let theme = self.palette.theme().toggled();
                self.palette = self.palette.with_theme(theme);
                update_settings(|settings| settings.theme = theme);
                self.say(Tone::Dim, &format!("Theme: {}", theme.name()));
            }
            SlashCommand::Help => self.say(Tone::Dim, HELP),
            SlashCommand::Quit => return false,
            SlashCommand::Usage(usage) => self.say(Tone::Warning, &format!("Usage: {usage}")),
            SlashCommand::Unknown(name) => {
                self.say(Tone::Warning, &format!("Unknown command /{name}. Try /help."));
            }
        }
        true
    }

    fn report_connection(&self) {
        match self.session.connection_error() {
            Some(error) => self.say(Tone::Error, &format!("Connection error: {error}")),
            None => {
                self.list_models();
                if self.session.transcript().is_empty() {
                    self.print_welcome();
                }
            }
        }
    }
}

/// Run the interactive chat until `/quit` or end of input.
pub async fn run(connection: ConnectionArgs) -> Result<()> {
    let settings = resolve_settings(&connection)?;
    let mut repl = ChatRepl {
        session: ChatSession::from_settings(&settings),
        palette: Palette::detect(settings.theme),
        pending: Vec::new(),
        last_panel: None,
    };
    tracing::info!(base_url = %repl.session.base_url(), stream = settings.stream, "Starting chat");

    repl.connect(connection.model.as_deref()).await;
    repl.print_welcome();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        repl.print_prompt()?;
        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        match parse_input(&line) {
            Input::Empty => {}
            Input::Message(text) => repl.send(&text).await?,
            Input::Command(command) => {
                if !repl.handle(command).await {
                    break;
                }
            }
        }
    }
    Ok(())
}
