//! The structured contract between the dialogue controller and the oracle.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use rolecall_core::{Category, Result, RoleId, RolecallError, Tool};

/// Function the oracle is forced to call on every dialogue turn.
pub const PROPOSE_USER_ROLES: &str = "propose_user_roles";

/// Category → role IDs, each list ordered and free of duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    roles: BTreeMap<Category, Vec<RoleId>>,
}

impl Classification {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, category: Category, ids: impl IntoIterator<Item = RoleId>) -> Self {
        for id in ids {
            self.insert(category, id);
        }
        self
    }

    pub fn insert(&mut self, category: Category, id: RoleId) {
        let list = self.roles.entry(category).or_default();
        if !list.contains(&id) {
            list.push(id);
        }
    }

    pub fn get(&self, category: Category) -> &[RoleId] {
        self.roles.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.roles.values().all(Vec::is_empty)
    }

    /// Every role ID across all categories.
    pub fn role_ids(&self) -> BTreeSet<RoleId> {
        self.roles.values().flatten().copied().collect()
    }

    /// Keep only the IDs `keep` accepts; the rest are reported back.
    pub fn retain(&mut self, mut keep: impl FnMut(Category, RoleId) -> bool) -> Vec<RoleId> {
        let mut dropped = Vec::new();
        for (category, ids) in self.roles.iter_mut() {
            ids.retain(|id| {
                let ok = keep(*category, *id);
                if !ok {
                    dropped.push(*id);
                }
                ok
            });
        }
        self.roles.retain(|_, ids| !ids.is_empty());
        dropped
    }
}

/// A skill the member mentioned that no role covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnassignableSkill {
    #[serde(default)]
    pub category: String,
    pub skill: String,
}

/// One parsed dialogue turn from the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleReply {
    /// `None` when the oracle sent `null` or no classification at all.
    pub classification: Option<Classification>,
    pub message_to_user: String,
    pub is_complete: bool,
    pub user_has_confirmed: bool,
    pub unassignable_skills: Vec<UnassignableSkill>,
}

#[derive(Deserialize)]
struct RawReply {
    #[serde(default)]
    classification: Option<BTreeMap<String, Option<Vec<RoleId>>>>,
    message_to_user: String,
    is_complete: bool,
    user_has_confirmed: bool,
    #[serde(default)]
    unassignable_skills: Option<Vec<UnassignableSkill>>,
}

/// Parse the oracle's reply payload.
///
/// The JSON must be strict (serde_json rejects trailing commas and bare
/// words). A single surrounding Markdown code fence is tolerated. Unknown
/// category keys are dropped with a warning.
pub fn parse_reply(payload: &str) -> Result<OracleReply> {
    let body = strip_code_fence(payload);
    if body.is_empty() {
        return Err(RolecallError::MalformedOracleReply("empty reply".into()));
    }
    let raw: RawReply = serde_json::from_str(body)
        .map_err(|e| RolecallError::MalformedOracleReply(format!("{e}: {}", preview(body))))?;

    if raw.message_to_user.trim().is_empty() {
        return Err(RolecallError::MalformedOracleReply(
            "message_to_user is empty".into(),
        ));
    }

    let classification = raw.classification.map(|map| {
        let mut c = Classification::new();
        for (key, ids) in map {
            match Category::from_key(&key) {
                Some(category) => {
                    for id in ids.unwrap_or_default() {
                        c.insert(category, id);
                    }
                }
                None => warn!(category = %key, "ignoring unknown category in oracle reply"),
            }
        }
        c
    });

    Ok(OracleReply {
        classification,
        message_to_user: raw.message_to_user.trim().to_string(),
        is_complete: raw.is_complete,
        user_has_confirmed: raw.user_has_confirmed,
        unassignable_skills: raw
            .unassignable_skills
            .unwrap_or_default()
            .into_iter()
            .filter(|s| !s.skill.trim().is_empty())
            .collect(),
    })
}

/// Remove one surrounding ```` ``` ```` / ```` ```json ```` fence, if present.
pub fn strip_code_fence(payload: &str) -> &str {
    let trimmed = payload.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(inner) = inner.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening line.
    match inner.find('\n') {
        Some(nl) => inner[nl + 1..].trim(),
        None => inner.trim(),
    }
}

fn preview(s: &str) -> String {
    const MAX: usize = 200;
    if s.chars().count() <= MAX {
        s.to_string()
    } else {
        format!("{}…", s.chars().take(MAX).collect::<String>())
    }
}

/// Function definition offered to the oracle for dialogue turns.
pub fn propose_user_roles_tool() -> Tool {
    let ids = serde_json::json!({ "type": "array", "items": { "type": "integer" } });
    let mut categories = serde_json::Map::new();
    for c in Category::ALL {
        categories.insert(c.dialogue_key().to_string(), ids.clone());
    }
    Tool {
        name: PROPOSE_USER_ROLES.into(),
        description: "Report the roles inferred for the user and the message to send them.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "classification": {
                    "type": ["object", "null"],
                    "properties": Value::Object(categories),
                },
                "message_to_user": { "type": "string" },
                "is_complete": { "type": "boolean" },
                "user_has_confirmed": { "type": "boolean" },
                "unassignable_skills": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "category": { "type": "string" },
                            "skill": { "type": "string" },
                        },
                        "required": ["skill"],
                    },
                },
            },
            "required": ["classification", "message_to_user", "is_complete", "user_has_confirmed"],
        }),
    }
}

/// Role changes needed to move a member from `prior` to a new target set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleDiff {
    pub add: Vec<RoleId>,
    pub remove: Vec<RoleId>,
}

impl RoleDiff {
    pub fn between(prior: &BTreeSet<RoleId>, target: &BTreeSet<RoleId>) -> Self {
        Self {
            add: target.difference(prior).copied().collect(),
            remove: prior.difference(target).copied().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"{"classification":{"Programming_Language":[1,"2"],"Experience_Level":[3],"Operating_System":[]},"message_to_user":"Is this right?","is_complete":true,"user_has_confirmed":false,"unassignable_skills":[{"category":"Tool","skill":"Docker"}]}"#;

    #[test]
    fn test_parse_full_reply() {
        let reply = parse_reply(FULL).unwrap();
        let c = reply.classification.unwrap();
        assert_eq!(c.get(Category::ProgrammingLanguage), &[RoleId(1), RoleId(2)]);
        assert_eq!(c.get(Category::ExperienceLevel), &[RoleId(3)]);
        assert!(c.get(Category::OperatingSystem).is_empty());
        assert!(reply.is_complete);
        assert!(!reply.user_has_confirmed);
        assert_eq!(reply.unassignable_skills[0].skill, "Docker");
    }

    #[test]
    fn test_trailing_comma_is_rejected() {
        let bad = r#"{"classification":{"Programming_Language":[1,2,]},"message_to_user":"x","is_complete":false,"user_has_confirmed":false}"#;
        assert!(matches!(
            parse_reply(bad),
            Err(RolecallError::MalformedOracleReply(_))
        ));
    }

    #[test]
    fn test_missing_required_key_is_rejected() {
        let bad = r#"{"classification":null,"message_to_user":"x","is_complete":false}"#;
        assert!(parse_reply(bad).is_err());
        let not_bool = r#"{"classification":null,"message_to_user":"x","is_complete":false,"user_has_confirmed":"yes"}"#;
        assert!(parse_reply(not_bool).is_err());
    }

    #[test]
    fn test_null_classification_and_display_keys() {
        let r = parse_reply(
            r#"{"classification":null,"message_to_user":"hi","is_complete":false,"user_has_confirmed":false}"#,
        )
        .unwrap();
        assert!(r.classification.is_none());

        let r = parse_reply(
            r#"{"classification":{"Operating System":[9],"Other":[4]},"message_to_user":"hi","is_complete":true,"user_has_confirmed":false}"#,
        )
        .unwrap();
        let c = r.classification.unwrap();
        assert_eq!(c.role_ids().into_iter().collect::<Vec<_>>(), vec![RoleId(9)]);
    }

    #[test]
    fn test_code_fence_is_stripped() {
        let fenced = format!("```json\n{FULL}\n```");
        assert!(parse_reply(&fenced).is_ok());
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {} "), "{}");
    }

    #[test]
    fn test_classification_dedupes_and_retains() {
        let mut c = Classification::new()
            .with(Category::ProgrammingLanguage, [RoleId(1), RoleId(1), RoleId(2)])
            .with(Category::OperatingSystem, [RoleId(5)]);
        assert_eq!(c.get(Category::ProgrammingLanguage).len(), 2);
        let dropped = c.retain(|_, id| id != RoleId(5));
        assert_eq!(dropped, vec![RoleId(5)]);
        assert!(c.get(Category::OperatingSystem).is_empty());
        assert!(!c.is_empty());
    }

    #[test]
    fn test_role_diff() {
        let prior: BTreeSet<RoleId> = [RoleId(1), RoleId(2)].into();
        let target: BTreeSet<RoleId> = [RoleId(2), RoleId(3)].into();
        let diff = RoleDiff::between(&prior, &target);
        assert_eq!(diff.add, vec![RoleId(3)]);
        assert_eq!(diff.remove, vec![RoleId(1)]);
        assert!(RoleDiff::between(&prior, &prior).is_empty());
    }

    #[test]
    fn test_tool_schema_lists_dialogue_keys() {
        let tool = propose_user_roles_tool();
        let props = &tool.parameters["properties"]["classification"]["properties"];
        assert!(props.get("Programming_Language").is_some());
        assert!(props.get("Operating_System").is_some());
    }
}
