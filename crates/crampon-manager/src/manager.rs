//! The module manager: layered values state and binding dispatch
//!
//! Owns the global and per-module values layers, the hook registries,
//! and the references to the chart-deploy and config-persistence
//! collaborators. All methods mutate state through `&mut self`, so one
//! invocation commits or aborts before the next begins.
//!
//! Values layering, bottom to top: static values loaded at startup,
//! cluster-persisted config values, and the in-memory dynamic patch
//! log. Effective values are always recomputed by replaying the log
//! over the lower layers; the log, not a snapshot, is the source of
//! truth.

use chrono::Utc;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crampon_core::{
    BindingContext, BindingType, Values, apply_patch, GLOBAL_VALUES_KEY,
};

use crate::config_store::{ConfigStore, ConfigUpdate};
use crate::deploy::ChartDeployer;
use crate::error::{ManagerError, Result};
use crate::executor::{HookExecutor, HookInput, HookPatches, HookRunReport};
use crate::hook::Hook;
use crate::module::Module;
use crate::registry::{HookRegistry, discover_global_hooks, discover_module_hooks};

/// Construction parameters for [`ModuleManager`]
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Directory holding global hooks
    pub global_hooks_dir: PathBuf,

    /// Directory whose subdirectories are modules
    pub modules_dir: PathBuf,

    /// Process-wide temp directory for hook files
    pub temp_dir: PathBuf,

    /// Namespace handed to the chart collaborator
    pub namespace: String,

    /// Static global values (common plus any per-environment overlay,
    /// merged by the caller), immutable after construction
    pub global_static_values: Values,
}

/// Owns hook registries and the layered values state for every scope
pub struct ModuleManager {
    config: ManagerConfig,
    executor: HookExecutor,
    deployer: Arc<dyn ChartDeployer>,
    config_store: Arc<dyn ConfigStore>,

    global_registry: HookRegistry,
    global_kube_config_values: Values,
    global_dynamic_patches: Vec<crampon_core::ValuesPatch>,

    modules: BTreeMap<String, Module>,
    module_registries: BTreeMap<String, HookRegistry>,
    kube_module_config_values: BTreeMap<String, Values>,
    module_dynamic_patches: BTreeMap<String, Vec<crampon_core::ValuesPatch>>,
}

impl ModuleManager {
    pub fn new(
        config: ManagerConfig,
        deployer: Arc<dyn ChartDeployer>,
        config_store: Arc<dyn ConfigStore>,
    ) -> Self {
        let executor = HookExecutor::new(&config.temp_dir);
        Self {
            config,
            executor,
            deployer,
            config_store,
            global_registry: HookRegistry::new(),
            global_kube_config_values: Values::new(),
            global_dynamic_patches: Vec::new(),
            modules: BTreeMap::new(),
            module_registries: BTreeMap::new(),
            kube_module_config_values: BTreeMap::new(),
            module_dynamic_patches: BTreeMap::new(),
        }
    }

    /// Discover global hooks and scan the modules directory
    pub async fn init(&mut self) -> Result<()> {
        std::fs::create_dir_all(&self.config.temp_dir)?;
        self.global_registry = discover_global_hooks(&self.config.global_hooks_dir).await?;
        info!(
            hooks = self.global_registry.len(),
            "global hooks initialized"
        );
        self.scan_modules()?;
        Ok(())
    }

    /// Scan the modules directory: register new modules, drop modules
    /// whose directory disappeared.
    pub fn scan_modules(&mut self) -> Result<()> {
        let mut found = Vec::new();
        if self.config.modules_dir.exists() {
            let mut dirs: Vec<PathBuf> = std::fs::read_dir(&self.config.modules_dir)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect();
            dirs.sort();

            for dir in dirs {
                let module = Module::load(&dir)?;
                if !self.modules.contains_key(&module.name) {
                    info!(module = %module.name, "module registered");
                }
                found.push(module.name.clone());
                self.modules.entry(module.name.clone()).or_insert(module);
            }
        }

        let gone: Vec<String> = self
            .modules
            .keys()
            .filter(|name| !found.contains(name))
            .cloned()
            .collect();
        for name in gone {
            info!(module = %name, "module directory disappeared, dropping");
            self.remove_module(&name);
        }
        Ok(())
    }

    /// Drop a module's hook index and dynamic patch log. Its persisted
    /// config values stay until the config store reports deletion.
    fn remove_module(&mut self, name: &str) {
        self.modules.remove(name);
        self.module_registries.remove(name);
        self.module_dynamic_patches.remove(name);
    }

    pub fn module_names(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    pub fn global_hook_names(&self) -> Vec<String> {
        self.global_registry.names()
    }

    /// Look up a registered global hook, e.g. to read its schedule or
    /// cluster event subscriptions when wiring collaborators
    pub fn global_hook(&self, name: &str) -> Option<&Arc<Hook>> {
        self.global_registry.get(name)
    }

    // =========================================================================
    // Values layering
    // =========================================================================

    /// Config-layer global values: `{global: {}}` merged with the
    /// cluster-persisted layer
    pub fn global_config_values(&self) -> Values {
        Values::merge_all([
            Values::with_scope_key(GLOBAL_VALUES_KEY),
            self.global_kube_config_values.clone(),
        ])
    }

    /// Full effective global values: static + persisted layers with the
    /// dynamic patch log replayed on top
    pub fn global_values(&self) -> Result<Values> {
        self.global_values_over(&self.global_kube_config_values)
    }

    /// Effective global values with a substitute persisted layer, used
    /// to validate a memory patch against the post-commit state
    fn global_values_over(&self, kube_config: &Values) -> Result<Values> {
        let mut values = Values::merge_all([
            Values::with_scope_key(GLOBAL_VALUES_KEY),
            self.config.global_static_values.clone(),
            kube_config.clone(),
        ]);
        for patch in &self.global_dynamic_patches {
            let (next, _) = apply_patch(&values, patch)?;
            values = next;
        }
        Ok(values)
    }

    /// Length of the global dynamic patch log
    pub fn global_patch_log_len(&self) -> usize {
        self.global_dynamic_patches.len()
    }

    fn module_config_values(&self, module: &Module) -> Values {
        Values::merge_all([
            Values::with_scope_key(&module.values_key()),
            self.kube_module_config_values
                .get(&module.name)
                .cloned()
                .unwrap_or_default(),
        ])
    }

    /// Full effective values for a module's hooks and chart: the global
    /// effective values plus the module's own layers and patch log
    pub fn module_values(&self, module: &Module) -> Result<Values> {
        let kube_config = self
            .kube_module_config_values
            .get(&module.name)
            .cloned()
            .unwrap_or_default();
        self.module_values_over(module, &kube_config)
    }

    fn module_values_over(&self, module: &Module, kube_config: &Values) -> Result<Values> {
        let mut values = Values::merge_all([
            Values::with_scope_key(&module.values_key()),
            self.global_values()?,
            module.static_values.clone(),
            kube_config.clone(),
        ]);
        if let Some(patches) = self.module_dynamic_patches.get(&module.name) {
            for patch in patches {
                let (next, _) = apply_patch(&values, patch)?;
                values = next;
            }
        }
        Ok(values)
    }

    pub fn module_patch_log_len(&self, module_name: &str) -> usize {
        self.module_dynamic_patches
            .get(module_name)
            .map(|p| p.len())
            .unwrap_or(0)
    }

    /// Replace the persisted global layer (externally originated update)
    pub fn set_global_kube_values(&mut self, values: Values) {
        debug!("global config values replaced from cluster");
        self.global_kube_config_values = values;
    }

    /// Replace or drop a module's persisted layer
    pub fn set_module_kube_values(&mut self, module_name: &str, values: Option<Values>) {
        match values {
            Some(values) => {
                debug!(module = %module_name, "module config values replaced from cluster");
                self.kube_module_config_values
                    .insert(module_name.to_string(), values);
            }
            None => {
                debug!(module = %module_name, "module config values deleted from cluster");
                self.kube_module_config_values.remove(module_name);
            }
        }
    }

    pub fn handle_config_update(&mut self, update: ConfigUpdate) {
        match update {
            ConfigUpdate::Global(values) => self.set_global_kube_values(values),
            ConfigUpdate::Module { name, values } => {
                self.set_module_kube_values(&name, values)
            }
        }
    }

    // =========================================================================
    // Running hooks
    // =========================================================================

    /// Run one global hook for a binding and apply its patches
    pub async fn run_global_hook(
        &mut self,
        hook_name: &str,
        binding: BindingType,
        context: &[BindingContext],
    ) -> Result<()> {
        let hook = self
            .global_registry
            .get(hook_name)
            .cloned()
            .ok_or_else(|| ManagerError::HookNotFound {
                name: hook_name.to_string(),
            })?;

        let input = HookInput {
            config_values: self.global_config_values(),
            values: self.global_values()?,
            context: context.to_vec(),
            extra_env: self.deployer.command_env(),
        };
        let patches = self.executor.run(&hook, binding, &input).await?;

        self.apply_global_patches(&hook, patches).await
    }

    /// Stage the config patch, then the memory patch against the
    /// post-config state, and only then commit: the invocation either
    /// advances all its state or none of it.
    async fn apply_global_patches(&mut self, hook: &Hook, patches: HookPatches) -> Result<()> {
        let mut staged_config: Option<Values> = None;
        if let Some(config_patch) = &patches.config {
            let prepared = self.global_config_values();
            let (new_values, changed) =
                apply_patch(&prepared, config_patch).map_err(|e| {
                    ManagerError::PatchRejected {
                        hook: hook.name.clone(),
                        source: e,
                    }
                })?;
            let scoped = new_values.extract_scope(GLOBAL_VALUES_KEY).map_err(|_| {
                ManagerError::InvalidScopeValues {
                    hook: hook.name.clone(),
                    key: GLOBAL_VALUES_KEY.to_string(),
                }
            })?;
            if changed {
                staged_config = Some(scoped);
            }
        }

        let mut staged_memory = None;
        if let Some(memory_patch) = &patches.memory {
            let current = self.global_values_over(
                staged_config
                    .as_ref()
                    .unwrap_or(&self.global_kube_config_values),
            )?;
            let (new_values, changed) =
                apply_patch(&current, memory_patch).map_err(|e| {
                    ManagerError::PatchRejected {
                        hook: hook.name.clone(),
                        source: e,
                    }
                })?;
            new_values.extract_scope(GLOBAL_VALUES_KEY).map_err(|_| {
                ManagerError::InvalidScopeValues {
                    hook: hook.name.clone(),
                    key: GLOBAL_VALUES_KEY.to_string(),
                }
            })?;
            if changed {
                staged_memory = Some(memory_patch.clone());
            }
        }

        if let Some(scoped) = staged_config {
            // Persist first; in-memory state only advances on success.
            self.config_store.set_global_values(&scoped).await?;
            self.global_kube_config_values = scoped;
            debug!(hook = %hook.name, "global config values updated");
        }
        if let Some(patch) = staged_memory {
            self.global_dynamic_patches.push(patch);
            debug!(hook = %hook.name, "global dynamic values updated");
        }

        Ok(())
    }

    /// Run one module hook for a binding and apply its patches
    pub async fn run_module_hook(
        &mut self,
        module_name: &str,
        hook_name: &str,
        binding: BindingType,
        context: &[BindingContext],
    ) -> Result<()> {
        let hook = {
            let registry = self.module_registries.get(module_name).ok_or_else(|| {
                ManagerError::ModuleNotFound {
                    name: module_name.to_string(),
                }
            })?;
            registry
                .get(hook_name)
                .cloned()
                .ok_or_else(|| ManagerError::HookNotFound {
                    name: hook_name.to_string(),
                })?
        };
        let module = self
            .modules
            .get(module_name)
            .cloned()
            .ok_or_else(|| ManagerError::ModuleNotFound {
                name: module_name.to_string(),
            })?;

        let input = HookInput {
            config_values: self.module_config_values(&module),
            values: self.module_values(&module)?,
            context: context.to_vec(),
            extra_env: self.deployer.command_env(),
        };
        let patches = self.executor.run(&hook, binding, &input).await?;

        self.apply_module_patches(&module, &hook, patches).await
    }

    async fn apply_module_patches(
        &mut self,
        module: &Module,
        hook: &Hook,
        patches: HookPatches,
    ) -> Result<()> {
        let scope_key = module.values_key();

        let mut staged_config: Option<Values> = None;
        if let Some(config_patch) = &patches.config {
            let prepared = self.module_config_values(module);
            let (new_values, changed) =
                apply_patch(&prepared, config_patch).map_err(|e| {
                    ManagerError::PatchRejected {
                        hook: hook.name.clone(),
                        source: e,
                    }
                })?;
            let scoped = new_values.extract_scope(&scope_key).map_err(|_| {
                ManagerError::InvalidScopeValues {
                    hook: hook.name.clone(),
                    key: scope_key.clone(),
                }
            })?;
            if changed {
                staged_config = Some(scoped);
            }
        }

        let mut staged_memory = None;
        if let Some(memory_patch) = &patches.memory {
            let current = match &staged_config {
                Some(scoped) => self.module_values_over(module, scoped)?,
                None => self.module_values(module)?,
            };
            let (new_values, changed) =
                apply_patch(&current, memory_patch).map_err(|e| {
                    ManagerError::PatchRejected {
                        hook: hook.name.clone(),
                        source: e,
                    }
                })?;
            new_values.extract_scope(&scope_key).map_err(|_| {
                ManagerError::InvalidScopeValues {
                    hook: hook.name.clone(),
                    key: scope_key.clone(),
                }
            })?;
            if changed {
                staged_memory = Some(memory_patch.clone());
            }
        }

        if let Some(scoped) = staged_config {
            self.config_store
                .set_module_values(&module.name, &scoped)
                .await?;
            self.kube_module_config_values
                .insert(module.name.clone(), scoped);
            debug!(hook = %hook.name, module = %module.name, "module config values updated");
        }
        if let Some(patch) = staged_memory {
            self.module_dynamic_patches
                .entry(module.name.clone())
                .or_default()
                .push(patch);
            debug!(hook = %hook.name, module = %module.name, "module dynamic values updated");
        }

        Ok(())
    }

    // =========================================================================
    // Binding dispatch
    // =========================================================================

    /// Dispatch `OnStartup` across the global hooks. Any failure aborts
    /// startup. Module startup hooks run at first module initialization.
    pub async fn run_on_startup(&mut self) -> Result<()> {
        self.run_global_lifecycle(BindingType::OnStartup).await
    }

    async fn run_global_lifecycle(&mut self, binding: BindingType) -> Result<()> {
        let names: Vec<String> = self
            .global_registry
            .hooks_for(binding)
            .iter()
            .map(|h| h.name.clone())
            .collect();
        for name in names {
            self.run_global_hook(&name, binding, &[]).await?;
        }
        Ok(())
    }

    /// Deliver one `Schedule` or `KubeEvents` event to every matching
    /// hook, global and module alike. Hooks run in `(order, name)` order
    /// within each registry; one hook's failure does not stop the rest.
    /// Per-hook outcomes come back as reports.
    pub async fn dispatch_binding(
        &mut self,
        binding: BindingType,
        context: &[BindingContext],
    ) -> Result<Vec<HookRunReport>> {
        let mut reports = Vec::new();

        let global_names: Vec<String> = self
            .global_registry
            .hooks_for(binding)
            .iter()
            .map(|h| h.name.clone())
            .collect();
        for name in global_names {
            let started_at = Utc::now();
            let outcome = self.run_global_hook(&name, binding, context).await;
            reports.push(report(name, binding, started_at, outcome));
        }

        let module_names: Vec<String> = self.module_registries.keys().cloned().collect();
        for module_name in module_names {
            let hook_names: Vec<String> = match self.module_registries.get(&module_name) {
                Some(registry) => registry
                    .hooks_for(binding)
                    .iter()
                    .map(|h| h.name.clone())
                    .collect(),
                None => continue,
            };
            for name in hook_names {
                let started_at = Utc::now();
                let outcome = self
                    .run_module_hook(&module_name, &name, binding, context)
                    .await;
                reports.push(report(name, binding, started_at, outcome));
            }
        }

        for r in reports.iter().filter(|r| !r.is_success()) {
            warn!(hook = %r.hook, binding = %binding, error = %r.error.as_deref().unwrap_or(""), "hook failed");
        }
        Ok(reports)
    }

    // =========================================================================
    // Reconciliation and chart deploy framing
    // =========================================================================

    /// One full reconciliation cycle: `BeforeAll`, every module's
    /// deploy, then `AfterAll` only if all module work succeeded.
    pub async fn run_reconciliation(&mut self) -> Result<()> {
        self.run_global_lifecycle(BindingType::BeforeAll).await?;

        let names = self.module_names();
        let mut failed = Vec::new();
        for name in names {
            if let Err(e) = self.deploy_module(&name).await {
                warn!(module = %name, error = %e, "module deploy failed");
                failed.push(name);
            }
        }
        if !failed.is_empty() {
            return Err(ManagerError::ReconciliationFailed { modules: failed });
        }

        self.run_global_lifecycle(BindingType::AfterAll).await
    }

    /// Deploy one module: `BeforeHelm` hooks, the chart, `AfterHelm`
    /// hooks. A failing "before" hook skips the chart and the "after"
    /// hooks; a failing deploy skips the "after" hooks.
    pub async fn deploy_module(&mut self, module_name: &str) -> Result<()> {
        self.ensure_module_hooks(module_name).await?;

        self.run_module_lifecycle(module_name, BindingType::BeforeHelm)
            .await?;

        let module = self
            .modules
            .get(module_name)
            .cloned()
            .ok_or_else(|| ManagerError::ModuleNotFound {
                name: module_name.to_string(),
            })?;
        let values = self.module_values(&module)?;
        let values_file = self
            .config
            .temp_dir
            .join(format!("{}-chart-values.yaml", module.safe_name()));
        std::fs::write(&values_file, values.to_yaml_string()?)?;

        self.deployer
            .deploy(
                &module.name,
                module.chart_path(),
                &[values_file],
                &[],
                &self.config.namespace,
            )
            .await?;

        self.run_module_lifecycle(module_name, BindingType::AfterHelm)
            .await
    }

    /// Delete one module's release: the chart delete, then
    /// `AfterDeleteHelm` hooks, then drop the module's hook index and
    /// dynamic patch log.
    pub async fn delete_module(&mut self, module_name: &str) -> Result<()> {
        self.ensure_module_hooks(module_name).await?;

        let release = self
            .modules
            .get(module_name)
            .map(|m| m.name.clone())
            .ok_or_else(|| ManagerError::ModuleNotFound {
                name: module_name.to_string(),
            })?;
        self.deployer
            .delete(&release, &self.config.namespace)
            .await?;

        self.run_module_lifecycle(module_name, BindingType::AfterDeleteHelm)
            .await?;

        self.remove_module(module_name);
        Ok(())
    }

    async fn run_module_lifecycle(
        &mut self,
        module_name: &str,
        binding: BindingType,
    ) -> Result<()> {
        let names: Vec<String> = match self.module_registries.get(module_name) {
            Some(registry) => registry
                .hooks_for(binding)
                .iter()
                .map(|h| h.name.clone())
                .collect(),
            None => Vec::new(),
        };
        for name in names {
            self.run_module_hook(module_name, &name, binding, &[])
                .await?;
        }
        Ok(())
    }

    /// Initialize a module's hooks lazily on first dispatch. On any
    /// failure the index is wiped so a later retry starts clean. The
    /// module's `OnStartup` hooks run once, right after registration.
    async fn ensure_module_hooks(&mut self, module_name: &str) -> Result<()> {
        if self.module_registries.contains_key(module_name) {
            return Ok(());
        }
        let module = self
            .modules
            .get(module_name)
            .cloned()
            .ok_or_else(|| ManagerError::ModuleNotFound {
                name: module_name.to_string(),
            })?;

        let registry = discover_module_hooks(&module).await?;
        info!(module = %module.name, hooks = registry.len(), "module hooks initialized");
        self.module_registries
            .insert(module_name.to_string(), registry);

        let startup: Vec<String> = self
            .module_registries
            .get(module_name)
            .map(|r| {
                r.hooks_for(BindingType::OnStartup)
                    .iter()
                    .map(|h| h.name.clone())
                    .collect()
            })
            .unwrap_or_default();
        for name in startup {
            if let Err(e) = self
                .run_module_hook(module_name, &name, BindingType::OnStartup, &[])
                .await
            {
                self.module_registries.remove(module_name);
                return Err(e);
            }
        }
        Ok(())
    }
}

fn report(
    hook: String,
    binding: BindingType,
    started_at: chrono::DateTime<Utc>,
    outcome: Result<()>,
) -> HookRunReport {
    HookRunReport {
        hook,
        binding,
        started_at,
        completed_at: Utc::now(),
        error: outcome.err().map(|e| e.to_string()),
    }
}
