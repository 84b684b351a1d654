//! Verification dialogue controller.
//!
//! ```text
//!   Gathering ──complete──▶ ProposalPending ──confirmed──▶ Confirmed
//!      │  ▲                      │
//!      └──┘ (asks more)          └──(revised proposal)──┐
//!                                        ▲──────────────┘
//!   any ──final attempt, roles──▶ FinalForced
//!   any ──final attempt, none / timeout──▶ Abandoned
//! ```
//!
//! A confirmation from the oracle only counts when a proposal was pending
//! or on the final attempt; otherwise it is downgraded to a proposal.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use rolecall_core::{Message, Result, RoleId, RolecallError, SessionId, UserId};
use rolecall_llm::OracleClient;

use crate::catalog::RoleCatalog;
use crate::prompts::{FINAL_ATTEMPT_INSTRUCTION, FORMAT_REMINDER, Prompts, render};
use crate::reply::{Classification, OracleReply, UnassignableSkill, parse_reply, propose_user_roles_tool};
use crate::transcript::{Transcript, TurnSpeaker};

const TEMPERATURE: f32 = 0.3;

pub const APOLOGY_MALFORMED: &str =
    "I'm having trouble processing your information. Could you rephrase or try again?";
pub const APOLOGY_UNAVAILABLE: &str =
    "I'm currently having trouble reaching my assistant service. Please send your message again in a few moments.";
/// Added to an abandoning message that doesn't already point at the command.
pub const RETRY_HINT: &str = "You can run `/assign-roles` later to try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogueState {
    Gathering,
    ProposalPending,
    Confirmed,
    FinalForced,
    Abandoned,
}

impl DialogueState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DialogueState::Confirmed | DialogueState::FinalForced | DialogueState::Abandoned
        )
    }

    /// Whether the session ended with a role set to apply.
    pub fn applies_roles(self) -> bool {
        matches!(self, DialogueState::Confirmed | DialogueState::FinalForced)
    }
}

/// Per-member verification session state.
#[derive(Debug, Clone)]
pub struct ConversationState {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub transcript: Transcript,
    /// Latest classification surfaced to the member (or applied, once terminal).
    pub proposed_classification: Option<Classification>,
    pub is_complete: bool,
    pub user_has_confirmed: bool,
    /// Turns answered so far, no-op turns included.
    pub turns_taken: u32,
    pub max_turns: u32,
    /// Managed roles held when an update session started.
    pub prior_roles: Option<BTreeSet<RoleId>>,
    pub state: DialogueState,
    update_context_sent: bool,
}

impl ConversationState {
    pub fn new(user_id: UserId, max_turns: u32) -> Self {
        Self {
            session_id: SessionId::new_v4(),
            user_id,
            transcript: Transcript::new(),
            proposed_classification: None,
            is_complete: false,
            user_has_confirmed: false,
            turns_taken: 0,
            max_turns: max_turns.max(1),
            prior_roles: None,
            state: DialogueState::Gathering,
            update_context_sent: false,
        }
    }

    /// Start an update session against the member's current managed roles.
    pub fn with_prior_roles(mut self, roles: BTreeSet<RoleId>) -> Self {
        self.prior_roles = Some(roles);
        self
    }

    pub fn is_update(&self) -> bool {
        self.prior_roles.is_some()
    }

    /// The next turn is the last one allowed.
    pub fn is_final_attempt(&self) -> bool {
        self.turns_taken + 1 >= self.max_turns
    }

    pub fn turns_left(&self) -> u32 {
        self.max_turns.saturating_sub(self.turns_taken)
    }

    /// Role IDs to apply once the session concluded with roles.
    pub fn final_role_ids(&self) -> BTreeSet<RoleId> {
        self.proposed_classification
            .as_ref()
            .map(Classification::role_ids)
            .unwrap_or_default()
    }

    /// Mark the session abandoned without applying anything.
    pub fn abandon(&mut self) {
        self.state = DialogueState::Abandoned;
        self.is_complete = true;
        self.user_has_confirmed = false;
    }

    /// The final attempt produced nothing to assign. The turn still counts as
    /// complete and confirmed; only the state records that nothing applies.
    fn close_final_attempt(&mut self) {
        self.proposed_classification = None;
        self.state = DialogueState::Abandoned;
        self.is_complete = true;
        self.user_has_confirmed = true;
    }
}

/// How a turn went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnKind {
    /// The oracle answered and the reply was applied.
    Reply,
    /// Two unparseable replies; the turn counted but changed nothing.
    NoOp,
    /// The oracle could not be reached; the turn did not count.
    OracleUnavailable,
}

/// Result of one dialogue turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub kind: TurnKind,
    /// Text to send to the member.
    pub message: String,
    /// State after the turn.
    pub state: DialogueState,
    /// Skills the member mentioned that no role covers.
    pub unassignable_skills: Vec<UnassignableSkill>,
    /// Role IDs dropped because they are not in the catalog.
    pub rejected_roles: Vec<RoleId>,
}

/// Drives one turn at a time; holds no per-session state itself.
#[derive(Clone)]
pub struct DialogueController {
    oracle: OracleClient,
    prompts: Arc<Prompts>,
    max_history: usize,
}

impl DialogueController {
    pub fn new(oracle: OracleClient, prompts: Arc<Prompts>, max_history: usize) -> Self {
        Self {
            oracle,
            prompts,
            max_history,
        }
    }

    /// Feed the member's next message through the oracle and fold the reply
    /// into `session`.
    pub async fn take_turn(
        &self,
        session: &mut ConversationState,
        catalog: &RoleCatalog,
        input: &str,
        current_role_names: &[String],
    ) -> Result<TurnOutcome> {
        if session.state.is_terminal() {
            return Err(RolecallError::Other(anyhow_session_closed(session)));
        }

        let is_final = session.is_final_attempt();
        let roles_text = catalog.prompt_text();
        let system = render(
            &self.prompts.verification,
            &[("available_roles_text_list", roles_text.as_str())],
        )?;

        // Update context goes in once, ahead of the member's first reply.
        let mut context_note = None;
        if session.is_update() && !session.update_context_sent {
            context_note = Some(update_note(current_role_names));
        }

        let mut messages = session.transcript.window(self.max_history);
        if let Some(ref note) = context_note {
            messages.push(Message::assistant(note.clone()));
        }
        let oracle_input = if is_final {
            info!(user = %session.user_id, "final attempt: forcing a conclusion");
            format!("{FINAL_ATTEMPT_INSTRUCTION}\n\nUser's final input: {input}")
        } else {
            input.to_string()
        };
        messages.push(Message::user(oracle_input));

        let reply = match self.ask(system, messages).await {
            Ok(reply) => reply,
            Err(RolecallError::MalformedOracleReply(reason)) => {
                warn!(user = %session.user_id, %reason, "oracle reply unusable after retry; no-op turn");
                self.record_input(session, context_note, input);
                session.turns_taken += 1;
                let mut message = APOLOGY_MALFORMED.to_string();
                if is_final {
                    session.close_final_attempt();
                    message = format!("{message}\n\n{RETRY_HINT}");
                }
                return Ok(TurnOutcome {
                    kind: TurnKind::NoOp,
                    message,
                    state: session.state,
                    unassignable_skills: vec![],
                    rejected_roles: vec![],
                });
            }
            Err(e @ (RolecallError::OracleUnavailable(_) | RolecallError::RateLimited { .. })) => {
                warn!(user = %session.user_id, error = %e, "oracle unavailable; holding session");
                return Ok(TurnOutcome {
                    kind: TurnKind::OracleUnavailable,
                    message: APOLOGY_UNAVAILABLE.to_string(),
                    state: session.state,
                    unassignable_skills: vec![],
                    rejected_roles: vec![],
                });
            }
            Err(e) => return Err(e),
        };

        self.record_input(session, context_note, input);
        session.turns_taken += 1;
        Ok(apply_reply(session, catalog, reply, is_final))
    }

    fn record_input(&self, session: &mut ConversationState, note: Option<String>, input: &str) {
        if let Some(note) = note {
            session.transcript.push(TurnSpeaker::Context, note);
            session.update_context_sent = true;
        }
        session.transcript.push(TurnSpeaker::User, input);
    }

    /// One oracle call, plus one retry with a formatting reminder if the
    /// reply doesn't parse.
    async fn ask(&self, system: String, messages: Vec<Message>) -> Result<OracleReply> {
        let request = self
            .oracle
            .request(TEMPERATURE)
            .with_system(system)
            .with_messages(messages)
            .with_forced_tool(propose_user_roles_tool());

        let first = self.oracle.complete(&request).await?;
        let first_err = match parse_reply(first.message.payload()) {
            Ok(reply) => return Ok(reply),
            Err(e) => e,
        };
        warn!(error = %first_err, "malformed oracle reply, retrying with a format reminder");

        let mut retry = request;
        retry.messages.push(Message::assistant(first.message.payload()));
        retry.messages.push(Message::user(FORMAT_REMINDER));
        match self.oracle.complete(&retry).await {
            Ok(second) => parse_reply(second.message.payload()),
            // The first call got through; treat a failed retry like a bad reply.
            Err(e) => Err(RolecallError::MalformedOracleReply(format!("retry failed: {e}"))),
        }
    }
}

fn anyhow_session_closed(session: &ConversationState) -> anyhow::Error {
    anyhow::anyhow!(
        "session {} for user {} already concluded ({:?})",
        session.session_id,
        session.user_id,
        session.state
    )
}

fn update_note(current_role_names: &[String]) -> String {
    if current_role_names.is_empty() {
        "[System note: the user is starting or updating verification and currently holds none of the skill, experience or OS roles. Their request follows.]".into()
    } else {
        format!(
            "[System note: the user is updating their roles. They currently hold: {}. The classification you return replaces this set entirely. Their request follows.]",
            current_role_names.join(", ")
        )
    }
}

/// Fold a parsed reply into the session according to the state machine.
fn apply_reply(
    session: &mut ConversationState,
    catalog: &RoleCatalog,
    reply: OracleReply,
    is_final: bool,
) -> TurnOutcome {
    let OracleReply {
        classification,
        message_to_user,
        is_complete,
        user_has_confirmed,
        unassignable_skills,
    } = reply;

    let mut rejected_roles = Vec::new();
    let classification = classification.map(|mut c| {
        rejected_roles = c.retain(|_, id| catalog.contains(id));
        c
    });
    if !rejected_roles.is_empty() {
        warn!(user = %session.user_id, roles = ?rejected_roles, "oracle proposed roles outside the catalog");
    }

    session
        .transcript
        .push(TurnSpeaker::Assistant, message_to_user.clone());
    let mut message = message_to_user;
    let previous = session.state;

    if is_final {
        let has_roles = classification.as_ref().is_some_and(|c| !c.is_empty());
        if has_roles {
            session.proposed_classification = classification;
            session.is_complete = true;
            session.user_has_confirmed = true;
            session.state = DialogueState::FinalForced;
        } else {
            session.close_final_attempt();
            if !message.contains("/assign-roles") {
                message = format!("{message}\n\n{RETRY_HINT}");
            }
        }
    } else if user_has_confirmed && previous == DialogueState::ProposalPending {
        // An explicit null keeps what the member just agreed to.
        if let Some(c) = classification {
            session.proposed_classification = Some(c);
        }
        session.is_complete = true;
        session.user_has_confirmed = true;
        session.state = DialogueState::Confirmed;
    } else if user_has_confirmed || is_complete {
        if user_has_confirmed {
            warn!(user = %session.user_id, "oracle confirmed without a pending proposal; treating as a proposal");
        }
        let has_roles = classification.as_ref().is_some_and(|c| !c.is_empty());
        if has_roles || is_complete {
            session.proposed_classification = classification;
            session.is_complete = true;
            session.state = DialogueState::ProposalPending;
        }
        session.user_has_confirmed = false;
    } else {
        if classification.is_some() {
            session.proposed_classification = classification;
        }
        session.is_complete = false;
        session.user_has_confirmed = false;
        session.state = DialogueState::Gathering;
    }

    debug!(
        user = %session.user_id,
        from = ?previous,
        to = ?session.state,
        turn = session.turns_taken,
        max = session.max_turns,
        "dialogue transition"
    );

    TurnOutcome {
        kind: TurnKind::Reply,
        message,
        state: session.state,
        unassignable_skills,
        rejected_roles,
    }
}
