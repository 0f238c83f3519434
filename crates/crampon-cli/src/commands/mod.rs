//! Command implementations

pub mod converge;
pub mod hooks;
pub mod values;

use miette::{IntoDiagnostic, Result};
use std::sync::Arc;

use crampon_core::Values;
use crampon_manager::{FileConfigStore, HelmCommandDeployer, ManagerConfig, ModuleManager};

use crate::Cli;

/// Build an initialized manager from the CLI options: merge static
/// values files, wire the collaborators, discover hooks and modules,
/// and seed the persisted config layer from the state directory.
pub async fn setup_manager(cli: &Cli) -> Result<ModuleManager> {
    let mut global_static_values = Values::new();
    for file in &cli.values {
        let overlay = Values::from_file(file).into_diagnostic()?;
        global_static_values.merge(&overlay);
    }

    let mut deployer = HelmCommandDeployer::new(&cli.helm_bin);
    if let Some(ns) = &cli.tiller_namespace {
        deployer = deployer.with_tiller_namespace(ns);
    }

    let store = FileConfigStore::new(&cli.state_dir).into_diagnostic()?;

    let config = ManagerConfig {
        global_hooks_dir: cli.global_hooks_dir.clone(),
        modules_dir: cli.modules_dir.clone(),
        temp_dir: cli.tmp_dir.clone(),
        namespace: cli.namespace.clone(),
        global_static_values,
    };

    let mut manager = ModuleManager::new(config, Arc::new(deployer), Arc::new(store));
    manager.init().await.into_diagnostic()?;

    // Layer 3 survives restarts through the state directory.
    let store = FileConfigStore::new(&cli.state_dir).into_diagnostic()?;
    if let Some(values) = store.load_global().into_diagnostic()? {
        manager.set_global_kube_values(values);
    }
    for name in manager.module_names() {
        if let Some(values) = store.load_module(&name).into_diagnostic()? {
            manager.set_module_kube_values(&name, Some(values));
        }
    }

    Ok(manager)
}
