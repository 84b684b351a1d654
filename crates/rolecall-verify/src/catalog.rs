use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::warn;

use rolecall_core::{Category, Role, RoleId};

/// The persisted category → role-name document.
///
/// Always carries all three categories (possibly empty), serialized with
/// their display names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<Category, Vec<String>>", into = "BTreeMap<Category, Vec<String>>")]
pub struct CategorizedRoles {
    names: BTreeMap<Category, Vec<String>>,
}

impl Default for CategorizedRoles {
    fn default() -> Self {
        Self {
            names: Category::ALL.into_iter().map(|c| (c, Vec::new())).collect(),
        }
    }
}

impl From<BTreeMap<Category, Vec<String>>> for CategorizedRoles {
    fn from(map: BTreeMap<Category, Vec<String>>) -> Self {
        let mut doc = Self::default();
        for (category, names) in map {
            for name in names {
                doc.push(category, name);
            }
        }
        doc
    }
}

impl From<CategorizedRoles> for BTreeMap<Category, Vec<String>> {
    fn from(doc: CategorizedRoles) -> Self {
        doc.names
    }
}

impl CategorizedRoles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, category: Category, names: &[&str]) -> Self {
        for n in names {
            self.push(category, (*n).to_string());
        }
        self
    }

    /// Add a name unless it is already listed in that category.
    pub fn push(&mut self, category: Category, name: String) {
        let list = self.names.entry(category).or_default();
        if !list.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
            list.push(name);
        }
    }

    pub fn names(&self, category: Category) -> &[String] {
        self.names.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn total(&self) -> usize {
        self.names.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Resolved snapshot: category → live guild roles.
#[derive(Debug, Clone)]
pub struct RoleCatalog {
    categories: BTreeMap<Category, Vec<Role>>,
    built_at: DateTime<Utc>,
}

impl Default for RoleCatalog {
    fn default() -> Self {
        Self {
            categories: BTreeMap::new(),
            built_at: Utc::now(),
        }
    }
}

impl RoleCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Match the document's names against the guild's roles (case-insensitive).
    /// Names without a live role are skipped with a warning.
    pub fn resolve(doc: &CategorizedRoles, guild_roles: &[Role]) -> Self {
        let by_name: HashMap<String, &Role> = guild_roles
            .iter()
            .map(|r| (r.name.to_lowercase(), r))
            .collect();

        let mut categories = BTreeMap::new();
        let mut seen = BTreeSet::new();
        for category in Category::ALL {
            let mut roles = Vec::new();
            for name in doc.names(category) {
                match by_name.get(&name.to_lowercase()) {
                    Some(role) if seen.insert(role.id) => roles.push((*role).clone()),
                    Some(_) => {}
                    None => warn!(%category, role = %name, "categorized role not found in guild"),
                }
            }
            categories.insert(category, roles);
        }
        Self {
            categories,
            built_at: Utc::now(),
        }
    }

    pub fn roles(&self, category: Category) -> &[Role] {
        self.categories.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn category_of(&self, id: RoleId) -> Option<Category> {
        self.categories
            .iter()
            .find(|(_, roles)| roles.iter().any(|r| r.id == id))
            .map(|(c, _)| *c)
    }

    pub fn contains(&self, id: RoleId) -> bool {
        self.category_of(id).is_some()
    }

    /// Every role the bot manages.
    pub fn role_ids(&self) -> BTreeSet<RoleId> {
        self.categories.values().flatten().map(|r| r.id).collect()
    }

    pub fn name_of(&self, id: RoleId) -> Option<&str> {
        self.categories
            .values()
            .flatten()
            .find(|r| r.id == id)
            .map(|r| r.name.as_str())
    }

    /// Names for `ids`, sorted; unknown IDs are skipped.
    pub fn names_of<'a>(&self, ids: impl IntoIterator<Item = &'a RoleId>) -> Vec<String> {
        let mut names: Vec<String> = ids
            .into_iter()
            .filter_map(|id| self.name_of(*id).map(str::to_string))
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// The role list as it is embedded in the verification prompt.
    pub fn prompt_text(&self) -> String {
        let lines: Vec<String> = Category::ALL
            .into_iter()
            .filter(|c| !self.roles(*c).is_empty())
            .map(|c| {
                let roles: Vec<String> = self
                    .roles(c)
                    .iter()
                    .map(|r| format!("'{}' (ID: {})", r.name, r.id))
                    .collect();
                format!("- {} ({}): {}", c.display_name(), c.dialogue_key(), roles.join(", "))
            })
            .collect();
        if lines.is_empty() {
            "No skill, experience or operating-system roles are currently defined.".into()
        } else {
            lines.join("\n")
        }
    }
}

/// Shared, read-mostly handle to the current catalog.
///
/// Readers take an `Arc` snapshot and keep using it for as long as they
/// like; [`CatalogHandle::replace`] swaps in a whole new catalog and is the
/// only way to change it.
#[derive(Clone, Default)]
pub struct CatalogHandle {
    current: Arc<RwLock<Arc<RoleCatalog>>>,
}

impl CatalogHandle {
    pub fn new(catalog: RoleCatalog) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(catalog))),
        }
    }

    pub fn snapshot(&self) -> Arc<RoleCatalog> {
        Arc::clone(&self.current.read())
    }

    pub fn replace(&self, catalog: RoleCatalog) {
        *self.current.write() = Arc::new(catalog);
    }
}
