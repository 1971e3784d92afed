//! Terminal rendering of assistant turns.
//!
//! [`TurnPrinter`] receives the whole accumulated text of the streaming turn
//! after every delta and writes only what is new. Output is append-only, so
//! text that might still turn into a reasoning marker is held back until it
//! is disambiguated. The reasoning span is shown dimmed under a "Thinking"
//! header and replaced by a one-line summary when its panel collapses.

use std::io::{self, Write};

use crossterm::{cursor, queue, terminal};
use lmchat_engine::{SplitResult, THINK_CLOSE, THINK_OPEN, ThoughtPanel, split_reasoning};
use unicode_width::UnicodeWidthStr;

use crate::styled_output::{Palette, Tone};

/// Label printed before an assistant reply.
const ASSISTANT_LABEL: &str = "assistant";

/// Incremental printer for one assistant turn.
pub struct TurnPrinter<W: Write> {
    out: W,
    palette: Palette,
    /// Terminal width when the thought region may be erased in place.
    columns: Option<u16>,
    panel: ThoughtPanel,
    started: bool,
    at_line_start: bool,
    reasoning_shown: String,
    answer_shown: String,
    thought_started: bool,
    thought_closed: bool,
    /// Plain text written since the "Thinking" header, for row counting.
    region: String,
}

impl<W: Write> TurnPrinter<W> {
    pub fn new(out: W, palette: Palette, columns: Option<u16>) -> Self {
        Self {
            out,
            palette,
            columns,
            panel: ThoughtPanel::new(),
            started: false,
            at_line_start: true,
            reasoning_shown: String::new(),
            answer_shown: String::new(),
            thought_started: false,
            thought_closed: false,
            region: String::new(),
        }
    }

    /// Render the turn's accumulated `text`.
    pub fn update(&mut self, text: &str, streaming: bool) -> io::Result<()> {
        let split = split_reasoning(text, streaming);

        if let Some(reasoning) = split.reasoning.as_deref() {
            self.update_thought(reasoning, &split, streaming)?;
        }

        let answer_ready = split.reasoning.is_none() || split.reasoning_complete || !streaming;
        if answer_ready {
            let stable = if streaming {
                hold_back(&split.answer, THINK_OPEN)
            } else {
                split.answer.as_str()
            };
            // The answer is trimmed once a marker shows up.
            let stable = stable.trim_start();
            if let Some(rest) = unseen(&self.answer_shown, stable) {
                let rest = rest.to_string();
                self.start()?;
                write!(self.out, "{rest}")?;
                self.note_written(&rest, false);
                self.answer_shown.push_str(&rest);
            } else if !self.answer_shown.starts_with(stable) {
                tracing::debug!(
                    shown_len = self.answer_shown.len(),
                    answer_len = stable.len(),
                    "Answer diverged from printed text, reprinting"
                );
                let answer = stable.to_string();
                self.begin_line()?;
                write!(self.out, "{answer}")?;
                self.note_written(&answer, false);
                self.answer_shown = answer;
            }
        }

        self.out.flush()
    }

    fn update_thought(
        &mut self,
        reasoning: &str,
        split: &SplitResult,
        streaming: bool,
    ) -> io::Result<()> {
        if self.thought_closed {
            return Ok(());
        }
        if !self.thought_started {
            self.start()?;
            self.begin_line()?;
            let header = "Thinking";
            writeln!(self.out, "{}", self.palette.paint(Tone::Dim, header))?;
            self.region = format!("{header}\n");
            self.thought_started = true;
            self.at_line_start = true;
        }

        if self.panel.is_expanded() {
            let stable = if split.reasoning_complete {
                reasoning
            } else {
                hold_back(reasoning, THINK_CLOSE)
            };
            if let Some(rest) = unseen(&self.reasoning_shown, stable) {
                let rest = rest.to_string();
                write!(self.out, "{}", self.palette.paint(Tone::Dim, &rest))?;
                self.note_written(&rest, true);
                self.reasoning_shown.push_str(&rest);
            }
        }

        let collapsed = self.panel.observe(split);
        if split.reasoning_complete {
            self.close_thought(reasoning, collapsed, false)?;
        } else if !streaming {
            self.close_thought(reasoning, false, true)?;
        }
        Ok(())
    }

    fn close_thought(
        &mut self,
        reasoning: &str,
        collapsed: bool,
        interrupted: bool,
    ) -> io::Result<()> {
        if collapsed && let Some(columns) = self.columns {
            let rows = rendered_rows(&self.region, columns);
            queue!(self.out, cursor::MoveToColumn(0))?;
            if rows > 1 {
                queue!(self.out, cursor::MoveUp(rows.saturating_sub(1)))?;
            }
            queue!(self.out, terminal::Clear(terminal::ClearType::FromCursorDown))?;
            self.at_line_start = true;
        } else {
            self.begin_line()?;
        }

        let summary = thought_summary(reasoning, self.panel.is_expanded(), interrupted);
        writeln!(self.out, "{}", self.palette.paint(Tone::Dim, &summary))?;
        self.at_line_start = true;
        self.thought_closed = true;
        self.region.clear();
        Ok(())
    }

    /// Print the reply label once, before the first output.
    fn start(&mut self) -> io::Result<()> {
        if !self.started {
            writeln!(
                self.out,
                "{}",
                self.palette.paint(Tone::Assistant, ASSISTANT_LABEL)
            )?;
            self.started = true;
            self.at_line_start = true;
        }
        Ok(())
    }

    fn begin_line(&mut self) -> io::Result<()> {
        if !self.at_line_start {
            writeln!(self.out)?;
            if self.thought_started && !self.thought_closed {
                self.region.push('\n');
            }
            self.at_line_start = true;
        }
        Ok(())
    }

    fn note_written(&mut self, text: &str, in_region: bool) {
        if in_region {
            self.region.push_str(text);
        }
        if !text.is_empty() {
            self.at_line_start = text.ends_with('\n');
        }
    }

    /// Terminate the output and hand back the panel state.
    pub fn finish(mut self) -> io::Result<ThoughtPanel> {
        if !self.at_line_start {
            writeln!(self.out)?;
        }
        self.out.flush()?;
        Ok(self.panel)
    }
}

/// Suffix of `current` not yet written, if `current` extends `shown`.
fn unseen<'a>(shown: &str, current: &'a str) -> Option<&'a str> {
    current.strip_prefix(shown).filter(|rest| !rest.is_empty())
}

/// `text` minus any trailing partial `marker`.
fn hold_back<'a>(text: &'a str, marker: &str) -> &'a str {
    (1..marker.len())
        .rev()
        .find(|&len| text.ends_with(&marker[..len]))
        .map_or(text, |len| &text[..text.len() - len])
}

/// Terminal rows taken by `text` at `columns` width.
fn rendered_rows(text: &str, columns: u16) -> u16 {
    let columns = usize::from(columns.max(1));
    let body = text.strip_suffix('\n').unwrap_or(text);
    let rows: usize = body
        .split('\n')
        .map(|line| UnicodeWidthStr::width(line).div_ceil(columns).max(1))
        .sum();
    // The cursor sits on the line after a trailing newline.
    let rows = if text.ends_with('\n') { rows + 1 } else { rows };
    u16::try_from(rows).unwrap_or(u16::MAX)
}

fn thought_summary(reasoning: &str, expanded: bool, interrupted: bool) -> String {
    let words = reasoning.split_whitespace().count();
    let arrow = if expanded { "▾" } else { "▸" };
    let state = if interrupted { " (interrupted)" } else { "" };
    let hint = if expanded { "" } else { "  /think to expand" };
    format!("{arrow} Thought{state} · {words} words{hint}")
}

/// Print a reasoning span in full, wrapped to `width`.
pub fn write_thought<W: Write>(
    out: &mut W,
    palette: &Palette,
    reasoning: &str,
    width: usize,
) -> io::Result<()> {
    writeln!(out, "{}", palette.paint(Tone::Dim, "▾ Thought"))?;
    for line in reasoning.lines() {
        for wrapped in textwrap::wrap(line, width.max(20)) {
            writeln!(out, "{}", palette.paint(Tone::Dim, &wrapped))?;
        }
        if line.is_empty() {
            writeln!(out)?;
        }
    }
    Ok(())
}

/// Banner shown while the transcript is empty.
pub fn write_welcome<W: Write>(
    out: &mut W,
    palette: &Palette,
    base_url: &str,
    model: Option<&str>,
) -> io::Result<()> {
    writeln!(out, "{}", palette.paint(Tone::Bold, "lmchat"))?;
    writeln!(
        out,
        "{}",
        palette.paint(Tone::Dim, &format!("server  {base_url}"))
    )?;
    let model = model.unwrap_or("none (use /refresh or /url)");
    writeln!(out, "{}", palette.paint(Tone::Dim, &format!("model   {model}")))?;
    writeln!(
        out,
        "{}",
        palette.paint(Tone::Dim, "Type a message to start. /help lists commands.")
    )?;
    Ok(())
}
