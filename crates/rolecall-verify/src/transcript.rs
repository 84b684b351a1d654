use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rolecall_core::Message;

use crate::prompts::HISTORY_TRIMMED_NOTE;

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnSpeaker {
    User,
    Assistant,
    /// A note for the oracle only (update context and the like).
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: TurnSpeaker,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Append-only log of a verification conversation.
///
/// Entries are never removed or edited; the oracle sees a window of it
/// via [`Transcript::window`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, speaker: TurnSpeaker, text: impl Into<String>) {
        self.turns.push(Turn {
            speaker,
            text: text.into(),
            at: Utc::now(),
        });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Text of every user turn, oldest first.
    pub fn user_texts(&self) -> impl Iterator<Item = &str> {
        self.turns
            .iter()
            .filter(|t| t.speaker == TurnSpeaker::User)
            .map(|t| t.text.as_str())
    }

    /// The transcript as chat messages, at most `max` of them.
    ///
    /// When older turns have to go, the first turn (the greeting) is kept,
    /// followed by the most recent `max - 1` turns and a note telling the
    /// oracle that something was omitted.
    pub fn window(&self, max: usize) -> Vec<Message> {
        let max = max.max(2);
        if self.turns.len() <= max {
            return self.turns.iter().map(to_message).collect();
        }
        let mut out = Vec::with_capacity(max + 1);
        out.push(to_message(&self.turns[0]));
        out.extend(self.turns[self.turns.len() - (max - 1)..].iter().map(to_message));
        out.push(Message::assistant(HISTORY_TRIMMED_NOTE));
        out
    }
}

fn to_message(turn: &Turn) -> Message {
    match turn.speaker {
        TurnSpeaker::User => Message::user(&turn.text),
        // Context notes travel as assistant messages so they sit in-line
        // with the conversation rather than overriding the system prompt.
        TurnSpeaker::Assistant | TurnSpeaker::Context => Message::assistant(&turn.text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rolecall_core::Speaker;

    fn transcript(n: usize) -> Transcript {
        let mut t = Transcript::new();
        t.push(TurnSpeaker::Assistant, "greeting");
        for i in 1..n {
            t.push(
                if i % 2 == 1 {
                    TurnSpeaker::User
                } else {
                    TurnSpeaker::Assistant
                },
                format!("turn {i}"),
            );
        }
        t
    }

    #[test]
    fn test_window_returns_everything_when_short() {
        let t = transcript(4);
        let w = t.window(12);
        assert_eq!(w.len(), 4);
        assert_eq!(w[0].content, "greeting");
        assert_eq!(w[1].speaker, Speaker::User);
    }

    #[test]
    fn test_window_keeps_first_and_tail_with_note() {
        let t = transcript(20);
        let w = t.window(5);
        assert_eq!(w.len(), 6);
        assert_eq!(w[0].content, "greeting");
        assert_eq!(w[1].content, "turn 16");
        assert_eq!(w[4].content, "turn 19");
        assert_eq!(w[5].content, HISTORY_TRIMMED_NOTE);
        // The log itself is untouched.
        assert_eq!(t.len(), 20);
    }

    #[test]
    fn test_user_texts_and_context_mapping() {
        let mut t = Transcript::new();
        t.push(TurnSpeaker::Assistant, "hello");
        t.push(TurnSpeaker::Context, "note");
        t.push(TurnSpeaker::User, "I use Rust");
        assert_eq!(t.user_texts().collect::<Vec<_>>(), vec!["I use Rust"]);
        let w = t.window(10);
        assert_eq!(w[1].speaker, Speaker::Assistant);
    }
}
