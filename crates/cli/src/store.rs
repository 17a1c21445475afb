//! JSON file backed [`ConfigStore`] so ordering state survives between runs.

use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use ad_mediation_common::config_store::ConfigStore;
use ad_mediation_common::error::MediationError;
use error_stack::{Report, ResultExt};
use serde_json::{Map, Value};

pub struct FileConfigStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> Result<Map<String, Value>, Report<MediationError>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let content = fs::read_to_string(&self.path).change_context(self.error("read"))?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&content).change_context(self.error("parse"))
    }

    fn error(&self, action: &str) -> MediationError {
        MediationError::Collaborator {
            message: format!("Failed to {} store file {}", action, self.path.display()),
        }
    }
}

impl ConfigStore for FileConfigStore {
    fn get(&self, key: &str) -> Result<Option<String>, Report<MediationError>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let values = self.read_all()?;
        Ok(values.get(key).and_then(Value::as_str).map(str::to_string))
    }

    fn put(&self, key: &str, value: &str) -> Result<(), Report<MediationError>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut values = self.read_all()?;
        values.insert(key.to_string(), Value::String(value.to_string()));
        let rendered =
            serde_json::to_string_pretty(&values).change_context(self.error("serialize"))?;
        fs::write(&self.path, rendered).change_context(self.error("write"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_values_survive_a_new_store() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("store.json");

        let store = FileConfigStore::new(path.clone());
        assert_eq!(store.get("cursor").expect("get"), None);
        store.put("cursor", "2").expect("put");
        store.put("order", "[\"a\",\"b\"]").expect("put");

        let reopened = FileConfigStore::new(path);
        assert_eq!(reopened.get("cursor").expect("get").as_deref(), Some("2"));
        assert_eq!(
            reopened.get("order").expect("get").as_deref(),
            Some("[\"a\",\"b\"]")
        );
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("store.json");
        fs::write(&path, "not json").expect("write");

        let store = FileConfigStore::new(path);
        assert!(store.get("cursor").is_err());
    }
}
