use std::sync::Arc;
use tracing::{debug, info, warn};

use rolecall_core::Message;
use rolecall_llm::OracleClient;

use crate::prompts::{Prompts, render};
use crate::transcript::Transcript;

const SUMMARY_TEMPERATURE: f32 = 0.6;
const WELCOME_TEMPERATURE: f32 = 0.7;

/// Moderator digest of a finished verification.
pub struct SummaryGenerator {
    oracle: OracleClient,
    prompts: Arc<Prompts>,
    max_chars: usize,
}

impl SummaryGenerator {
    pub fn new(oracle: OracleClient, prompts: Arc<Prompts>, max_chars: usize) -> Self {
        Self {
            oracle,
            prompts,
            max_chars,
        }
    }

    /// `None` if the oracle failed or returned nothing usable. Never errors:
    /// the roles are already applied by the time this runs.
    pub async fn generate(&self, transcript: &Transcript, role_names: &[String]) -> Option<String> {
        let history = summary_input(transcript, self.max_chars);
        let roles = if role_names.is_empty() {
            "None".to_string()
        } else {
            role_names.join(", ")
        };

        let system = match render(
            &self.prompts.summary,
            &[
                ("conversation_history", history.as_str()),
                ("assigned_roles_names_list", roles.as_str()),
            ],
        ) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "summary prompt could not be rendered");
                return None;
            }
        };

        let request = self
            .oracle
            .request(SUMMARY_TEMPERATURE)
            .with_system(system)
            .with_messages(vec![Message::user("Write the moderator summary.")]);

        debug!(chars = history.len(), "generating admin summary");
        match self.oracle.complete(&request).await {
            Ok(resp) => {
                let text = resp.message.content.trim();
                if text.is_empty() {
                    warn!("oracle returned an empty summary");
                    None
                } else {
                    Some(text.to_string())
                }
            }
            Err(e) => {
                warn!(error = %e, "admin summary skipped");
                None
            }
        }
    }
}

/// User turns only, one per line, keeping the most recent `max_chars`.
pub fn summary_input(transcript: &Transcript, max_chars: usize) -> String {
    let lines: Vec<String> = transcript.user_texts().map(|t| format!("user: {t}")).collect();
    if lines.is_empty() {
        return "(No user messages captured from the conversation.)".into();
    }
    let text = lines.join("\n");
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let tail: String = text.chars().skip(count - max_chars).collect();
    format!("...(truncated)...\n{tail}")
}

/// Channel greeting for new members.
pub struct WelcomeGenerator {
    oracle: OracleClient,
    prompts: Arc<Prompts>,
}

impl WelcomeGenerator {
    pub fn new(oracle: OracleClient, prompts: Arc<Prompts>) -> Self {
        Self { oracle, prompts }
    }

    /// An oracle-written welcome, or a fixed one if that fails.
    pub async fn generate(&self, member_name: &str, mention_id: &str, server_name: &str) -> String {
        let fallback = fallback_welcome(mention_id, server_name);
        let system = match render(
            &self.prompts.welcome,
            &[
                ("server_name", server_name),
                ("member_name", member_name),
                ("member_id", mention_id),
            ],
        ) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "welcome prompt could not be rendered");
                return fallback;
            }
        };

        let request = self
            .oracle
            .request(WELCOME_TEMPERATURE)
            .with_system(system)
            .with_messages(vec![Message::user(format!(
                "A new member named '{member_name}' just joined. Write the welcome message only."
            ))]);

        match self.oracle.complete(&request).await {
            Ok(resp) if !resp.message.content.trim().is_empty() => {
                info!(member = member_name, "welcome message generated");
                resp.message.content.trim().to_string()
            }
            Ok(_) => {
                warn!("oracle returned an empty welcome; using fallback");
                fallback
            }
            Err(e) => {
                warn!(error = %e, "welcome generation failed; using fallback");
                fallback
            }
        }
    }
}

pub fn fallback_welcome(mention_id: &str, server_name: &str) -> String {
    format!(
        "Welcome to **{server_name}**, <@{mention_id}>! We're glad to have you here. \
         Check your DMs to pick your skill roles, or run `/assign-roles` at any time."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::TurnSpeaker;

    #[test]
    fn test_summary_input_uses_user_turns_only() {
        let mut t = Transcript::new();
        t.push(TurnSpeaker::Assistant, "Hello!");
        t.push(TurnSpeaker::User, "I write Go");
        t.push(TurnSpeaker::Context, "note");
        t.push(TurnSpeaker::User, "yes");
        assert_eq!(summary_input(&t, 1000), "user: I write Go\nuser: yes");
    }

    #[test]
    fn test_summary_input_keeps_the_tail() {
        let mut t = Transcript::new();
        t.push(TurnSpeaker::User, "a".repeat(50));
        t.push(TurnSpeaker::User, "the end");
        let s = summary_input(&t, 10);
        assert!(s.starts_with("...(truncated)...\n"));
        assert!(s.ends_with("the end"));
        assert_eq!(s.chars().count(), "...(truncated)...\n".len() + 10);
    }

    #[test]
    fn test_summary_input_placeholder() {
        assert!(summary_input(&Transcript::new(), 100).contains("No user messages"));
    }
}
