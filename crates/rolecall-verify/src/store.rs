use std::path::{Path, PathBuf};
use tracing::{debug, info};

use rolecall_core::{Result, RolecallError};

use crate::catalog::CategorizedRoles;

/// JSON file holding the last successful classification run.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    path: PathBuf,
}

impl CatalogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` if the file does not exist yet.
    pub fn load(&self) -> Result<Option<CategorizedRoles>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no categorized roles file yet");
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)?;
        let doc = serde_json::from_str(&raw).map_err(|e| {
            RolecallError::Storage(format!("{} is not a valid catalog: {}", self.path.display(), e))
        })?;
        Ok(Some(doc))
    }

    /// Replace the file wholesale: write a sibling temp file, then rename.
    pub fn save(&self, doc: &CategorizedRoles) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        info!(path = %self.path.display(), roles = doc.total(), "saved categorized roles");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rolecall_core::Category;

    #[test]
    fn test_missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::new(dir.path().join("none.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_replaces_whole_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::new(dir.path().join("data").join("categorized_roles.json"));

        let first = CategorizedRoles::new().with(Category::ProgrammingLanguage, &["Rust", "Go"]);
        store.save(&first).unwrap();
        let second = CategorizedRoles::new().with(Category::OperatingSystem, &["Linux User"]);
        store.save(&second).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, second);
        assert!(loaded.names(Category::ProgrammingLanguage).is_empty());
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = CatalogStore::new(path);
        assert!(matches!(store.load(), Err(RolecallError::Storage(_))));
    }
}
