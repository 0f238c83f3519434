//! Hook discovery and registration
//!
//! Discovery walks a directory tree for executable regular files in
//! lexicographic relative-path order, runs each with `--config`, and
//! parses its stdout into the scope's config shape. The resulting
//! registry indexes hooks by name (unique) and by binding
//! (registration order; re-sorted by `(order, name)` at dispatch).

use std::collections::{BTreeMap, HashMap};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tracing::{debug, info};
use walkdir::WalkDir;

use crampon_core::BindingType;

use crate::error::{ManagerError, Result};
use crate::hook::{GlobalHookConfig, Hook, ModuleHookConfig};
use crate::module::Module;

/// Index of registered hooks for one scope
#[derive(Debug, Default)]
pub struct HookRegistry {
    by_name: BTreeMap<String, Arc<Hook>>,
    by_binding: HashMap<BindingType, Vec<Arc<Hook>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook under its unique name and all its bindings
    pub fn insert(&mut self, hook: Hook) -> Result<()> {
        if self.by_name.contains_key(&hook.name) {
            return Err(ManagerError::DuplicateHook {
                name: hook.name.clone(),
            });
        }
        let hook = Arc::new(hook);
        for binding in &hook.bindings {
            self.by_binding
                .entry(*binding)
                .or_default()
                .push(Arc::clone(&hook));
        }
        self.by_name.insert(hook.name.clone(), hook);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Hook>> {
        self.by_name.get(name)
    }

    /// Hooks participating in `binding`, in dispatch order.
    ///
    /// Order-bearing bindings sort ascending by `(order, name)`; the
    /// context-delivering bindings keep registration order.
    pub fn hooks_for(&self, binding: BindingType) -> Vec<Arc<Hook>> {
        let mut hooks = self
            .by_binding
            .get(&binding)
            .cloned()
            .unwrap_or_default();
        if binding.carries_order() {
            hooks.sort_by(|a, b| {
                a.order_for(binding)
                    .total_cmp(&b.order_for(binding))
                    .then_with(|| a.name.cmp(&b.name))
            });
        }
        hooks
    }

    /// All registered hook names, sorted
    pub fn names(&self) -> Vec<String> {
        self.by_name.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Discover and register the global hooks under `dir`.
///
/// A missing directory yields an empty registry.
pub async fn discover_global_hooks(dir: &Path) -> Result<HookRegistry> {
    let mut registry = HookRegistry::new();
    for (relative, path) in executable_files(dir)? {
        let output = hook_config_output(&relative, &path).await?;
        let config: GlobalHookConfig =
            serde_json::from_slice(&output).map_err(|e| ManagerError::ConfigParse {
                hook: relative.clone(),
                message: format!("{}\n{}", e, String::from_utf8_lossy(&output)),
            })?;
        info!(hook = %relative, "registered global hook");
        registry.insert(Hook::from_global_config(&relative, path, config))?;
    }
    Ok(registry)
}

/// Discover and register one module's hooks from its `hooks/` directory.
///
/// Hook names are prefixed with the module name so they stay unique
/// across the whole manager: `<module>/hooks/<relative>`.
pub async fn discover_module_hooks(module: &Module) -> Result<HookRegistry> {
    let mut registry = HookRegistry::new();
    for (relative, path) in executable_files(&module.hooks_dir())? {
        let name = format!("{}/hooks/{}", module.name, relative);
        let output = hook_config_output(&name, &path).await?;
        let config: ModuleHookConfig =
            serde_json::from_slice(&output).map_err(|e| ManagerError::ConfigParse {
                hook: name.clone(),
                message: format!("{}\n{}", e, String::from_utf8_lossy(&output)),
            })?;
        info!(hook = %name, module = %module.name, "registered module hook");
        registry.insert(Hook::from_module_config(&module.name, &name, path, config))?;
    }
    Ok(registry)
}

/// Enumerate executable regular files under `dir` as
/// `(relative path, absolute path)` pairs in lexicographic order.
/// Non-executable files are skipped; a missing directory is empty.
fn executable_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| ManagerError::Discovery {
            path: dir.display().to_string(),
            message: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let metadata = entry.metadata().map_err(|e| ManagerError::Discovery {
            path: entry.path().display().to_string(),
            message: e.to_string(),
        })?;
        if metadata.permissions().mode() & 0o111 == 0 {
            debug!(path = %entry.path().display(), "skipping non-executable file");
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| ManagerError::Discovery {
                path: entry.path().display().to_string(),
                message: e.to_string(),
            })?
            .to_string_lossy()
            .to_string();
        files.push((relative, entry.path().to_path_buf()));
    }
    files.sort();
    Ok(files)
}

/// Run a hook with `--config` and capture its stdout
async fn hook_config_output(name: &str, path: &Path) -> Result<Vec<u8>> {
    debug!(hook = %name, path = %path.display(), "querying hook config");
    let output = Command::new(path)
        .arg("--config")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| ManagerError::ConfigParse {
            hook: name.to_string(),
            message: format!("spawn failed: {}", e),
        })?;

    if !output.status.success() {
        return Err(ManagerError::ConfigParse {
            hook: name.to_string(),
            message: format!(
                "exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            ),
        });
    }
    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::GlobalHookConfig;
    use std::io::Write;

    fn hook_with_order(name: &str, binding_json: &str) -> Hook {
        let config: GlobalHookConfig = serde_json::from_str(binding_json).unwrap();
        Hook::from_global_config(name, PathBuf::from(format!("/hooks/{}", name)), config)
    }

    #[test]
    fn test_duplicate_name_fails() {
        let mut registry = HookRegistry::new();
        registry
            .insert(hook_with_order("a", r#"{"onStartup": 1}"#))
            .unwrap();
        let result = registry.insert(hook_with_order("a", r#"{"onStartup": 2}"#));
        assert!(matches!(result, Err(ManagerError::DuplicateHook { .. })));
    }

    #[test]
    fn test_dispatch_order_by_order_then_name() {
        let mut registry = HookRegistry::new();
        registry
            .insert(hook_with_order("b", r#"{"onStartup": 5}"#))
            .unwrap();
        registry
            .insert(hook_with_order("a", r#"{"onStartup": 5}"#))
            .unwrap();
        registry
            .insert(hook_with_order("c", r#"{"onStartup": 1}"#))
            .unwrap();

        let names: Vec<_> = registry
            .hooks_for(BindingType::OnStartup)
            .iter()
            .map(|h| h.name.clone())
            .collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_hooks_for_unbound_binding_is_empty() {
        let registry = HookRegistry::new();
        assert!(registry.hooks_for(BindingType::BeforeAll).is_empty());
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let files = executable_files(Path::new("/definitely/not/here")).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_executable_filter_and_ordering() {
        let dir = tempfile::tempdir().unwrap();

        let mk = |name: &str, mode: u32| {
            let path = dir.path().join(name);
            let mut f = std::fs::File::create(&path).unwrap();
            f.write_all(b"#!/bin/sh\n").unwrap();
            let mut perms = f.metadata().unwrap().permissions();
            perms.set_mode(mode);
            std::fs::set_permissions(&path, perms).unwrap();
        };

        mk("20-second.sh", 0o755);
        mk("10-first.sh", 0o755);
        mk("README", 0o644);

        let files = executable_files(dir.path()).unwrap();
        let names: Vec<_> = files.iter().map(|(rel, _)| rel.as_str()).collect();
        assert_eq!(names, vec!["10-first.sh", "20-second.sh"]);
    }
}
