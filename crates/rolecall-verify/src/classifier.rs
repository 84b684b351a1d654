//! Role catalog classifier: asks the oracle to sort the guild's roles into
//! the three skill categories.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use rolecall_config::schema::RolesConfig;
use rolecall_core::{Category, GuildId, Message, Result, Role, RoleId, RolecallError, Tool};
use rolecall_llm::OracleClient;

use crate::catalog::CategorizedRoles;
use crate::prompts::{Prompts, render};
use crate::reply::strip_code_fence;

pub const CATEGORIZE_SERVER_ROLES: &str = "categorize_server_roles";

/// Low temperature: this is a lookup, not a conversation.
const TEMPERATURE: f32 = 0.1;

/// Roles worth sending to the classifier.
///
/// Drops `@everyone`, integration-managed roles and the configured status
/// roles. With a hierarchy boundary configured, only roles positioned below
/// it are kept; a configured boundary that doesn't exist in the guild is an
/// error so the previous catalog stays in place.
pub fn candidate_roles(guild: GuildId, roles: &[Role], config: &RolesConfig) -> Result<Vec<Role>> {
    let status = config.status_roles();
    let boundary = match config.hierarchy_boundary {
        Some(id) => {
            let role = roles.iter().find(|r| r.id == id).ok_or_else(|| {
                RolecallError::ConfigValidation {
                    field: "roles.hierarchy_boundary".into(),
                    reason: format!("role {id} not found in guild {guild}"),
                }
            })?;
            debug!(boundary = %role.name, position = role.position, "classifier boundary");
            Some(role.position)
        }
        None => None,
    };

    let candidates: Vec<Role> = roles
        .iter()
        .filter(|r| r.id.get() != guild.get() && r.name != "@everyone")
        .filter(|r| !r.managed)
        .filter(|r| !status.contains(&r.id))
        .filter(|r| boundary.is_none_or(|pos| r.position < pos))
        .cloned()
        .collect();

    info!(
        scanned = roles.len(),
        selected = candidates.len(),
        "selected roles for categorization"
    );
    Ok(candidates)
}

/// One-shot classifier over `(name, id)` pairs.
pub struct RoleCatalogClassifier {
    oracle: OracleClient,
    prompts: Arc<Prompts>,
}

impl RoleCatalogClassifier {
    pub fn new(oracle: OracleClient, prompts: Arc<Prompts>) -> Self {
        Self { oracle, prompts }
    }

    /// Partition `roles` into the three categories. Roles that fit none are
    /// dropped. Any malformed reply fails the whole run.
    pub async fn classify(&self, roles: &[(String, RoleId)]) -> Result<CategorizedRoles> {
        if roles.is_empty() {
            info!("no roles to categorize");
            return Ok(CategorizedRoles::new());
        }

        let role_list: Vec<String> = roles
            .iter()
            .map(|(name, id)| format!("- {name} (ID: {id})"))
            .collect();
        let system = format!(
            "{}\n\nHere is the list of roles to categorize:\n{}",
            render(&self.prompts.categorization, &[])?,
            role_list.join("\n")
        );

        let request = self
            .oracle
            .request(TEMPERATURE)
            .with_system(system)
            .with_messages(vec![Message::user("Categorize the roles listed above.")])
            .with_forced_tool(categorize_tool());

        info!(roles = roles.len(), "categorizing guild roles");
        let response = self.oracle.complete(&request).await?;
        let raw = parse_categories(response.message.payload())?;
        Ok(match_names(raw, roles))
    }
}

/// Strictly parse `{"<category>": ["name", ...], ...}` with exactly the
/// three categories.
pub fn parse_categories(payload: &str) -> Result<BTreeMap<Category, Vec<String>>> {
    let body = strip_code_fence(payload);
    let value: Value = serde_json::from_str(body)
        .map_err(|e| RolecallError::ClassificationParse(format!("invalid JSON: {e}")))?;
    let obj = value
        .as_object()
        .ok_or_else(|| RolecallError::ClassificationParse("reply is not an object".into()))?;

    let mut out = BTreeMap::new();
    for (key, names) in obj {
        let category = Category::from_key(key).ok_or_else(|| {
            RolecallError::ClassificationParse(format!("unexpected key '{key}'"))
        })?;
        let list = names.as_array().ok_or_else(|| {
            RolecallError::ClassificationParse(format!("'{key}' is not a list"))
        })?;
        let names = list
            .iter()
            .map(|n| {
                n.as_str().map(str::to_string).ok_or_else(|| {
                    RolecallError::ClassificationParse(format!("non-string entry in '{key}'"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        if out.insert(category, names).is_some() {
            return Err(RolecallError::ClassificationParse(format!(
                "category '{category}' given twice"
            )));
        }
    }

    if out.len() != Category::ALL.len() {
        let missing: Vec<&str> = Category::ALL
            .into_iter()
            .filter(|c| !out.contains_key(c))
            .map(Category::display_name)
            .collect();
        return Err(RolecallError::ClassificationParse(format!(
            "missing categories: {}",
            missing.join(", ")
        )));
    }
    Ok(out)
}

/// Keep only names present in the input (case-insensitive), spelled as the
/// guild spells them. A role claimed by several categories stays in the
/// first one.
fn match_names(
    raw: BTreeMap<Category, Vec<String>>,
    roles: &[(String, RoleId)],
) -> CategorizedRoles {
    let by_name: HashMap<String, &str> = roles
        .iter()
        .map(|(name, _)| (name.to_lowercase(), name.as_str()))
        .collect();

    let mut doc = CategorizedRoles::new();
    let mut claimed: HashMap<String, Category> = HashMap::new();
    for category in Category::ALL {
        for name in raw.get(&category).into_iter().flatten() {
            let key = name.trim().to_lowercase();
            let Some(canonical) = by_name.get(&key) else {
                warn!(%category, role = %name, "oracle returned a role name not in the guild");
                continue;
            };
            if let Some(first) = claimed.get(&key) {
                if *first != category {
                    warn!(role = %name, kept = %first, dropped = %category, "role placed in two categories");
                }
                continue;
            }
            claimed.insert(key, category);
            doc.push(category, (*canonical).to_string());
        }
    }
    info!(
        categorized = doc.total(),
        offered = roles.len(),
        "role categorization complete"
    );
    doc
}

fn categorize_tool() -> Tool {
    let names = serde_json::json!({ "type": "array", "items": { "type": "string" } });
    let mut properties = serde_json::Map::new();
    for c in Category::ALL {
        properties.insert(c.display_name().to_string(), names.clone());
    }
    Tool {
        name: CATEGORIZE_SERVER_ROLES.into(),
        description: "Sort the server's roles into skill categories by name.".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": Value::Object(properties),
            "required": Category::ALL.map(Category::display_name),
            "additionalProperties": false,
        }),
    }
}
