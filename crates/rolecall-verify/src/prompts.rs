//! Prompt templates. Built-in defaults are compiled in; any of them can be
//! replaced by a file named in `[paths]`.
//!
//! Placeholders use `${name}`. Rendering fails if a placeholder has no
//! value, so a typo in an override surfaces at the first turn instead of
//! leaking `${...}` to the oracle.

use std::path::Path;
use tracing::info;

use rolecall_config::schema::PathsConfig;
use rolecall_core::{Result, RolecallError};

const DEFAULT_VERIFICATION: &str = include_str!("../prompts/verification.txt");
const DEFAULT_SUMMARY: &str = include_str!("../prompts/summary.txt");
const DEFAULT_CATEGORIZATION: &str = include_str!("../prompts/categorization.txt");
const DEFAULT_WELCOME: &str = include_str!("../prompts/welcome.txt");

/// Prepended to the user's input on the session's last turn.
pub const FINAL_ATTEMPT_INSTRUCTION: &str = "[System instruction: this is the user's final attempt in this session. \
Based on the entire conversation, make your best effort to classify their roles. \
In message_to_user, state clearly which roles WILL BE ASSIGNED, do NOT ask for further confirmation, \
and tell them they can use /assign-roles for future changes. \
You MUST set user_has_confirmed and is_complete to true. \
If you cannot determine any roles, say so, set classification to null, and still set user_has_confirmed and is_complete to true.]";

/// Appended as an extra user message when a reply failed to parse.
pub const FORMAT_REMINDER: &str = "[System reminder: your previous reply could not be parsed. \
Reply again by calling propose_user_roles with ONE minified JSON object containing the keys \
classification, message_to_user, is_complete, user_has_confirmed and optionally unassignable_skills. \
All text values must be double-quoted, booleans must be true or false, and there must be no trailing commas.]";

/// Injected before the rest of the transcript when older turns were cut.
pub const HISTORY_TRIMMED_NOTE: &str =
    "[System note: earlier parts of the conversation were omitted for brevity.]";

/// The set of templates used by the bot.
#[derive(Debug, Clone)]
pub struct Prompts {
    pub verification: String,
    pub summary: String,
    pub categorization: String,
    pub welcome: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            verification: DEFAULT_VERIFICATION.trim().to_string(),
            summary: DEFAULT_SUMMARY.trim().to_string(),
            categorization: DEFAULT_CATEGORIZATION.trim().to_string(),
            welcome: DEFAULT_WELCOME.trim().to_string(),
        }
    }
}

impl Prompts {
    /// Built-in templates with the configured overrides applied.
    pub fn load(paths: &PathsConfig) -> Result<Self> {
        let mut prompts = Self::default();
        if let Some(ref p) = paths.verification_prompt {
            prompts.verification = read_template(p)?;
        }
        if let Some(ref p) = paths.summary_prompt {
            prompts.summary = read_template(p)?;
        }
        if let Some(ref p) = paths.categorization_prompt {
            prompts.categorization = read_template(p)?;
        }
        if let Some(ref p) = paths.welcome_prompt {
            prompts.welcome = read_template(p)?;
        }
        Ok(prompts)
    }
}

fn read_template(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| RolecallError::Prompt(format!("cannot read {}: {}", path.display(), e)))?;
    let template = raw.trim().to_string();
    if template.is_empty() {
        return Err(RolecallError::Prompt(format!("{} is empty", path.display())));
    }
    info!(path = %path.display(), "loaded prompt override");
    Ok(template)
}

/// Substitute `${name}` placeholders. A `$` not followed by `{` is kept as-is.
pub fn render(template: &str, vars: &[(&str, &str)]) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            RolecallError::Prompt(format!("unterminated placeholder near '{}'", preview(after)))
        })?;
        let name = &after[..end];
        let value = vars
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| *v)
            .ok_or_else(|| RolecallError::Prompt(format!("no value for placeholder '{name}'")))?;
        out.push_str(value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn preview(s: &str) -> String {
    s.chars().take(20).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_all_placeholders() {
        let out = render("Hi ${name}, welcome to ${server}!", &[("name", "Ada"), ("server", "Rust")])
            .unwrap();
        assert_eq!(out, "Hi Ada, welcome to Rust!");
    }

    #[test]
    fn test_render_keeps_bare_dollars_and_braces() {
        let out = render("cost $5 {json} ${x}", &[("x", "ok")]).unwrap();
        assert_eq!(out, "cost $5 {json} ok");
    }

    #[test]
    fn test_render_missing_value_is_an_error() {
        let err = render("${missing}", &[]).unwrap_err();
        assert!(matches!(err, RolecallError::Prompt(_)));
        assert!(matches!(render("${open", &[]), Err(RolecallError::Prompt(_))));
    }

    #[test]
    fn test_default_templates_render_with_their_variables() {
        let p = Prompts::default();
        assert!(render(&p.verification, &[("available_roles_text_list", "- x")]).is_ok());
        assert!(
            render(
                &p.summary,
                &[
                    ("conversation_history", "user: hi"),
                    ("assigned_roles_names_list", "None"),
                ],
            )
            .is_ok()
        );
        assert!(render(&p.categorization, &[]).is_ok());
        assert!(
            render(
                &p.welcome,
                &[("server_name", "s"), ("member_name", "m"), ("member_id", "1")],
            )
            .is_ok()
        );
    }

    #[test]
    fn test_override_file_replaces_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.txt");
        std::fs::write(&path, "  custom ${conversation_history}\n").unwrap();
        let paths = PathsConfig {
            summary_prompt: Some(path),
            ..Default::default()
        };
        let prompts = Prompts::load(&paths).unwrap();
        assert_eq!(prompts.summary, "custom ${conversation_history}");
        assert_eq!(prompts.verification, Prompts::default().verification);
    }

    #[test]
    fn test_empty_override_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, "   \n").unwrap();
        let paths = PathsConfig {
            welcome_prompt: Some(path),
            ..Default::default()
        };
        assert!(matches!(Prompts::load(&paths), Err(RolecallError::Prompt(_))));
    }
}
