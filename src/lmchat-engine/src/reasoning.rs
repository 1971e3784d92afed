//! Reasoning span detection for assistant text.
//!
//! Reasoning models prefix their answer with a chain of thought wrapped in
//! `<think>` ... `</think>`. While a reply streams, the text seen so far may
//! contain an opening marker whose closing marker has not arrived yet.
//!
//! [`split_reasoning`] is a pure function over the whole accumulated text and
//! is re-run after every delta. Running it on a longer prefix of the same
//! text only ever extends the previous result.

/// Opening reasoning marker.
pub const THINK_OPEN: &str = "<think>";

/// Closing reasoning marker.
pub const THINK_CLOSE: &str = "</think>";

/// Projection of an assistant turn into reasoning and visible answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitResult {
    /// Text inside the reasoning span, trimmed. `None` when no span opened.
    pub reasoning: Option<String>,
    /// Whether the reasoning span is finished.
    pub reasoning_complete: bool,
    /// Text outside the reasoning span.
    pub answer: String,
}

impl SplitResult {
    pub fn has_reasoning(&self) -> bool {
        self.reasoning.is_some()
    }

    /// A reasoning span is open and still growing.
    pub fn is_thinking(&self) -> bool {
        self.reasoning.is_some() && !self.reasoning_complete
    }
}

/// Split `text` into its reasoning span and answer.
///
/// `streaming` is whether more text may still arrive. A span with no closing
/// marker counts as complete once streaming has stopped and nothing but the
/// span was produced.
pub fn split_reasoning(text: &str, streaming: bool) -> SplitResult {
    let Some(open) = text.find(THINK_OPEN) else {
        return SplitResult {
            reasoning: None,
            reasoning_complete: false,
            answer: text.to_string(),
        };
    };

    let body_start = open + THINK_OPEN.len();
    let body = &text[body_start..];
    let (reasoning, after, closed) = match body.find(THINK_CLOSE) {
        Some(close) => (&body[..close], &body[close + THINK_CLOSE.len()..], true),
        None => (body, "", false),
    };

    let mut answer = String::with_capacity(open + after.len());
    answer.push_str(&text[..open]);
    answer.push_str(after);
    let answer = answer.trim().to_string();

    let reasoning_complete = closed || (!streaming && answer.is_empty());

    SplitResult {
        reasoning: Some(reasoning.trim().to_string()),
        reasoning_complete,
        answer,
    }
}

/// Expand/collapse state of the reasoning panel of one assistant turn.
///
/// Expanded while the thought is still growing, collapsed automatically once
/// when it first completes. Any user toggle turns the automatic behavior off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThoughtPanel {
    expanded: bool,
    auto_collapsed: bool,
    user_override: bool,
}

impl ThoughtPanel {
    pub fn new() -> Self {
        Self {
            expanded: true,
            auto_collapsed: false,
            user_override: false,
        }
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    /// Whether the user has taken over the panel state.
    pub fn is_user_controlled(&self) -> bool {
        self.user_override
    }

    /// Feed the latest split. Returns `true` if the panel state changed.
    pub fn observe(&mut self, split: &SplitResult) -> bool {
        if self.user_override || !split.has_reasoning() {
            return false;
        }
        if split.reasoning_complete && !self.auto_collapsed {
            self.auto_collapsed = true;
            if self.expanded {
                self.expanded = false;
                return true;
            }
        }
        false
    }

    /// User toggle.
    pub fn toggle(&mut self) {
        self.user_override = true;
        self.expanded = !self.expanded;
    }
}

impl Default for ThoughtPanel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_no_markers() {
        let split = split_reasoning("  plain answer ", true);
        assert_eq!(
            split,
            SplitResult {
                reasoning: None,
                reasoning_complete: false,
                answer: "  plain answer ".to_string(),
            }
        );
        assert!(!split.has_reasoning());
    }

    #[test]
    fn test_open_then_closed() {
        let open = split_reasoning("<think>abc", true);
        assert_eq!(open.reasoning.as_deref(), Some("abc"));
        assert!(!open.reasoning_complete);
        assert_eq!(open.answer, "");
        assert!(open.is_thinking());

        let closed = split_reasoning("<think>abc</think> answer", true);
        assert_eq!(closed.reasoning.as_deref(), Some("abc"));
        assert!(closed.reasoning_complete);
        assert_eq!(closed.answer, "answer");
    }

    #[test]
    fn test_prefixes_extend_monotonically() {
        let text = "<think>\nLet me see.\n</think>\n\nThe answer is 4.";
        let mut previous = SplitResult::default();
        for end in (0..=text.len()).filter(|i| text.is_char_boundary(*i)) {
            let split = split_reasoning(&text[..end], true);
            if previous.reasoning_complete {
                assert_eq!(split.reasoning, previous.reasoning);
                assert!(split.reasoning_complete);
                assert!(split.answer.starts_with(&previous.answer));
            }
            previous = split;
        }
        assert_eq!(previous.answer, "The answer is 4.");
        assert_eq!(previous.reasoning.as_deref(), Some("Let me see."));
    }

    #[test]
    fn test_unclosed_reasoning_completes_when_stream_stops() {
        let split = split_reasoning("<think>only thinking", false);
        assert!(split.reasoning_complete);
        assert_eq!(split.answer, "");
        assert_eq!(split.reasoning.as_deref(), Some("only thinking"));
    }

    #[test]
    fn test_unclosed_reasoning_with_leading_answer_stays_open() {
        let split = split_reasoning("Sure. <think>hmm", false);
        assert!(!split.reasoning_complete);
        assert_eq!(split.answer, "Sure.");
    }

    #[test]
    fn test_text_before_marker_is_answer() {
        let split = split_reasoning("Intro <think>x</think> outro", false);
        assert_eq!(split.answer, "Intro  outro");
        assert_eq!(split.reasoning.as_deref(), Some("x"));
    }

    #[test]
    fn test_close_without_open_is_plain_text() {
        let split = split_reasoning("abc</think>def", true);
        assert_eq!(split.reasoning, None);
        assert_eq!(split.answer, "abc</think>def");
    }

    #[test]
    fn test_panel_collapses_once() {
        let mut panel = ThoughtPanel::new();
        assert!(panel.is_expanded());

        assert!(!panel.observe(&split_reasoning("<think>a", true)));
        assert!(panel.is_expanded());

        assert!(panel.observe(&split_reasoning("<think>a</think>", true)));
        assert!(!panel.is_expanded());

        // Later observations do not re-collapse after a manual expand.
        panel.toggle();
        assert!(panel.is_expanded());
        assert!(!panel.observe(&split_reasoning("<think>a</think>b", false)));
        assert!(panel.is_expanded());
    }

    #[test]
    fn test_panel_user_toggle_before_completion_wins() {
        let mut panel = ThoughtPanel::new();
        panel.toggle();
        assert!(!panel.is_expanded());
        panel.toggle();
        assert!(!panel.observe(&split_reasoning("<think>a</think>", true)));
        assert!(panel.is_expanded());
        assert!(panel.is_user_controlled());
    }

    #[test]
    fn test_panel_ignores_plain_text() {
        let mut panel = ThoughtPanel::new();
        assert!(!panel.observe(&split_reasoning("no thoughts", false)));
        assert!(panel.is_expanded());
    }
}
