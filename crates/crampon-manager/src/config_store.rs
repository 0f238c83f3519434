//! Cluster config persistence collaborator
//!
//! Layer-3 values survive restarts by living cluster-side. The manager
//! writes through this seam and only advances its in-memory copy after
//! a successful write. Externally originated changes come back as
//! `ConfigUpdate` messages on the serialized event queue.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crampon_core::Values;

use crate::error::{ManagerError, Result};

/// Persists config values cluster-side
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Persist the global config values (the `global` subtree, wrapped)
    async fn set_global_values(&self, values: &Values) -> Result<()>;

    /// Persist one module's config values
    async fn set_module_values(&self, module_name: &str, values: &Values) -> Result<()>;
}

/// An externally originated change pushed by the store
#[derive(Debug, Clone)]
pub enum ConfigUpdate {
    /// Global config values were replaced cluster-side
    Global(Values),

    /// A module's config values were replaced, or deleted (`None`)
    Module {
        name: String,
        values: Option<Values>,
    },
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone)]
pub struct StoreOperationCounts {
    pub global_writes: usize,
    pub module_writes: usize,
}

/// In-memory config store for tests
#[derive(Clone, Default)]
pub struct MockConfigStore {
    global: Arc<RwLock<Option<Values>>>,
    modules: Arc<RwLock<HashMap<String, Values>>>,
    operations: Arc<RwLock<StoreOperationCounts>>,
    fail_writes: Arc<RwLock<bool>>,
}

impl MockConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail
    pub fn fail_writes(&self, fail: bool) {
        *self.fail_writes.write().unwrap() = fail;
    }

    /// Last persisted global values, if any
    pub fn global_values(&self) -> Option<Values> {
        self.global.read().unwrap().clone()
    }

    /// Last persisted values for a module, if any
    pub fn module_values(&self, module_name: &str) -> Option<Values> {
        self.modules.read().unwrap().get(module_name).cloned()
    }

    pub fn operation_counts(&self) -> StoreOperationCounts {
        self.operations.read().unwrap().clone()
    }
}

#[async_trait]
impl ConfigStore for MockConfigStore {
    async fn set_global_values(&self, values: &Values) -> Result<()> {
        {
            let mut ops = self.operations.write().unwrap();
            ops.global_writes += 1;
        }
        if *self.fail_writes.read().unwrap() {
            return Err(ManagerError::Persistence {
                message: "mock write failure".to_string(),
            });
        }
        *self.global.write().unwrap() = Some(values.clone());
        Ok(())
    }

    async fn set_module_values(&self, module_name: &str, values: &Values) -> Result<()> {
        {
            let mut ops = self.operations.write().unwrap();
            ops.module_writes += 1;
        }
        if *self.fail_writes.read().unwrap() {
            return Err(ManagerError::Persistence {
                message: "mock write failure".to_string(),
            });
        }
        self.modules
            .write()
            .unwrap()
            .insert(module_name.to_string(), values.clone());
        Ok(())
    }
}

/// File-backed config store for development and offline runs.
///
/// Persists each scope as a YAML file under a base directory:
/// `global.yaml` plus `modules/<name>.yaml`. Values written here come
/// back on the next run through the `load_*` helpers.
pub struct FileConfigStore {
    base_dir: std::path::PathBuf,
}

impl FileConfigStore {
    pub fn new(base_dir: impl Into<std::path::PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(base_dir.join("modules"))?;
        Ok(Self { base_dir })
    }

    fn global_path(&self) -> std::path::PathBuf {
        self.base_dir.join("global.yaml")
    }

    fn module_path(&self, module_name: &str) -> std::path::PathBuf {
        self.base_dir
            .join("modules")
            .join(format!("{}.yaml", module_name))
    }

    /// Previously persisted global values, if any
    pub fn load_global(&self) -> Result<Option<Values>> {
        let path = self.global_path();
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(Values::from_file(&path).map_err(ManagerError::Core)?))
    }

    /// Previously persisted values for one module, if any
    pub fn load_module(&self, module_name: &str) -> Result<Option<Values>> {
        let path = self.module_path(module_name);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(Values::from_file(&path).map_err(ManagerError::Core)?))
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn set_global_values(&self, values: &Values) -> Result<()> {
        let yaml = values.to_yaml_string().map_err(ManagerError::Core)?;
        std::fs::write(self.global_path(), yaml).map_err(|e| ManagerError::Persistence {
            message: e.to_string(),
        })
    }

    async fn set_module_values(&self, module_name: &str, values: &Values) -> Result<()> {
        let yaml = values.to_yaml_string().map_err(ManagerError::Core)?;
        std::fs::write(self.module_path(module_name), yaml).map_err(|e| {
            ManagerError::Persistence {
                message: e.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_set_and_read_back() {
        let store = MockConfigStore::new();
        let values = Values::from_json(r#"{"global":{"x":1}}"#).unwrap();

        store.set_global_values(&values).await.unwrap();
        assert_eq!(store.global_values().unwrap(), values);
        assert_eq!(store.operation_counts().global_writes, 1);
    }

    #[tokio::test]
    async fn test_mock_write_failure_counts_but_does_not_store() {
        let store = MockConfigStore::new();
        store.fail_writes(true);

        let values = Values::from_json(r#"{"global":{"x":1}}"#).unwrap();
        let result = store.set_global_values(&values).await;

        assert!(matches!(result, Err(ManagerError::Persistence { .. })));
        assert!(store.global_values().is_none());
        assert_eq!(store.operation_counts().global_writes, 1);
    }

    #[tokio::test]
    async fn test_mock_module_values() {
        let store = MockConfigStore::new();
        let values = Values::from_json(r#"{"myMod":{"a":true}}"#).unwrap();

        store.set_module_values("my-mod", &values).await.unwrap();
        assert_eq!(store.module_values("my-mod").unwrap(), values);
        assert!(store.module_values("other").is_none());
        assert_eq!(store.operation_counts().module_writes, 1);
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path()).unwrap();

        assert!(store.load_global().unwrap().is_none());

        let global = Values::from_json(r#"{"global":{"x":1}}"#).unwrap();
        store.set_global_values(&global).await.unwrap();
        assert_eq!(store.load_global().unwrap().unwrap(), global);

        let module = Values::from_json(r#"{"myMod":{"a":true}}"#).unwrap();
        store.set_module_values("my-mod", &module).await.unwrap();
        assert_eq!(store.load_module("my-mod").unwrap().unwrap(), module);
        assert!(store.load_module("other").unwrap().is_none());
    }
}
