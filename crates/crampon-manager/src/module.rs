//! A module: chart, static values and hooks in one directory

use std::path::{Path, PathBuf};

use crampon_core::{Values, module_values_key, sanitize_name};

use crate::error::Result;

/// A self-contained deployable unit discovered under the modules dir
#[derive(Debug, Clone)]
pub struct Module {
    /// Directory name, also the chart release name
    pub name: String,

    /// Absolute path of the module directory (the chart root)
    pub path: PathBuf,

    /// Static values from the module's `values.yaml`, loaded once
    pub static_values: Values,
}

impl Module {
    /// Load a module from its directory. A missing `values.yaml` means
    /// empty static values.
    pub fn load(path: &Path) -> Result<Module> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let values_file = path.join("values.yaml");
        let static_values = if values_file.exists() {
            Values::from_file(&values_file)?
        } else {
            Values::new()
        };

        Ok(Module {
            name,
            path: path.to_path_buf(),
            static_values,
        })
    }

    /// The top-level values key this module owns
    pub fn values_key(&self) -> String {
        module_values_key(&self.name)
    }

    /// Temp-file-safe rendition of the module name
    pub fn safe_name(&self) -> String {
        sanitize_name(&self.name)
    }

    /// Where this module's hooks live
    pub fn hooks_dir(&self) -> PathBuf {
        self.path.join("hooks")
    }

    /// The chart handed to the deploy collaborator
    pub fn chart_path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_with_values() {
        let dir = tempfile::tempdir().unwrap();
        let module_dir = dir.path().join("node-exporter");
        std::fs::create_dir(&module_dir).unwrap();
        std::fs::write(
            module_dir.join("values.yaml"),
            "nodeExporter:\n  port: 9100\n",
        )
        .unwrap();

        let module = Module::load(&module_dir).unwrap();
        assert_eq!(module.name, "node-exporter");
        assert_eq!(module.values_key(), "nodeExporter");
        assert_eq!(module.static_values.get("nodeExporter.port").unwrap(), 9100);
    }

    #[test]
    fn test_load_without_values() {
        let dir = tempfile::tempdir().unwrap();
        let module_dir = dir.path().join("bare");
        std::fs::create_dir(&module_dir).unwrap();

        let module = Module::load(&module_dir).unwrap();
        assert!(module.static_values.is_empty());
        assert_eq!(module.hooks_dir(), module_dir.join("hooks"));
    }
}
