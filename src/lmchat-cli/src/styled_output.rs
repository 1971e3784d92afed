//! Theme-aware terminal colors.
//!
//! The palette follows the persisted [`Theme`] and is disabled entirely when
//! `NO_COLOR` is set or stdout is not a terminal.

use std::io::IsTerminal;

use lmchat_engine::Theme;

/// Check if colors should be disabled based on NO_COLOR env var.
fn colors_disabled() -> bool {
    std::env::var("NO_COLOR")
        .map(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
        .unwrap_or(false)
}

/// ANSI color codes for light theme (bright/light terminal backgrounds).
mod light_theme {
    pub const USER: &str = "\x1b[38;2;0;100;160m"; // Dark blue
    pub const ASSISTANT: &str = "\x1b[38;2;0;150;125m"; // #00967D - Teal
    pub const ERROR: &str = "\x1b[38;2;217;61;61m"; // #D93D3D
    pub const WARNING: &str = "\x1b[38;2;201;154;46m"; // #C99A2E
    pub const DIM: &str = "\x1b[38;2;100;100;100m";
}

/// ANSI color codes for dark theme (dark terminal backgrounds).
mod dark_theme {
    pub const USER: &str = "\x1b[38;2;72;202;228m"; // #48CAE4
    pub const ASSISTANT: &str = "\x1b[38;2;0;245;212m"; // #00F5D4
    pub const ERROR: &str = "\x1b[38;2;255;107;107m"; // #FF6B6B
    pub const WARNING: &str = "\x1b[38;2;255;200;87m"; // #FFC857
    pub const DIM: &str = "\x1b[38;2;130;154;177m"; // #829AB1
}

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Kind of styled text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    User,
    Assistant,
    Error,
    Warning,
    Dim,
    Bold,
}

/// Escape codes for one theme, or none when colors are off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    theme: Theme,
    enabled: bool,
}

impl Palette {
    pub fn new(theme: Theme, enabled: bool) -> Self {
        Self { theme, enabled }
    }

    /// Palette for stdout, honoring NO_COLOR and TTY detection.
    pub fn detect(theme: Theme) -> Self {
        Self::new(theme, !colors_disabled() && std::io::stdout().is_terminal())
    }

    /// Palette that never emits escape codes.
    pub fn plain() -> Self {
        Self::new(Theme::default(), false)
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn with_theme(self, theme: Theme) -> Self {
        Self { theme, ..self }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Escape code that starts `tone`, or "" when colors are off.
    pub fn code(&self, tone: Tone) -> &'static str {
        if !self.enabled {
            return "";
        }
        match (self.theme, tone) {
            (_, Tone::Bold) => BOLD,
            (Theme::Dark, Tone::User) => dark_theme::USER,
            (Theme::Dark, Tone::Assistant) => dark_theme::ASSISTANT,
            (Theme::Dark, Tone::Error) => dark_theme::ERROR,
            (Theme::Dark, Tone::Warning) => dark_theme::WARNING,
            (Theme::Dark, Tone::Dim) => dark_theme::DIM,
            (Theme::Light, Tone::User) => light_theme::USER,
            (Theme::Light, Tone::Assistant) => light_theme::ASSISTANT,
            (Theme::Light, Tone::Error) => light_theme::ERROR,
            (Theme::Light, Tone::Warning) => light_theme::WARNING,
            (Theme::Light, Tone::Dim) => light_theme::DIM,
        }
    }

    pub fn reset(&self) -> &'static str {
        if self.enabled { RESET } else { "" }
    }

    /// Wrap `text` in the codes for `tone`.
    pub fn paint(&self, tone: Tone, text: &str) -> String {
        format!("{}{}{}", self.code(tone), text, self.reset())
    }
}
