//! Per-invocation hook execution protocol
//!
//! For one `(hook, binding, context)` the executor lays out five temp
//! files named deterministically from the hook's sanitized name, builds
//! the subprocess environment, launches the hook with no arguments, and
//! collects the patch files it wrote. It never touches manager state:
//! applying the returned patches is the caller's job.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crampon_core::{BindingContext, BindingType, Values, ValuesPatch};

use crate::error::{ManagerError, Result};
use crate::hook::{Hook, HookScope};

pub const CONFIG_VALUES_PATH_ENV: &str = "CONFIG_VALUES_PATH";
pub const VALUES_PATH_ENV: &str = "VALUES_PATH";
pub const BINDING_CONTEXT_PATH_ENV: &str = "BINDING_CONTEXT_PATH";
pub const CONFIG_VALUES_PATCH_PATH_ENV: &str = "CONFIG_VALUES_JSON_PATCH_PATH";
pub const VALUES_PATCH_PATH_ENV: &str = "VALUES_JSON_PATCH_PATH";

/// Inputs assembled by the manager for one invocation
#[derive(Debug, Clone)]
pub struct HookInput {
    /// Effective config values (static + cluster-persisted layers)
    pub config_values: Values,

    /// Full effective values (config layers + dynamic patch log)
    pub values: Values,

    /// Binding context; empty for lifecycle bindings
    pub context: Vec<BindingContext>,

    /// Extra environment from the chart collaborator
    pub extra_env: Vec<(String, String)>,
}

/// Patches a hook emitted, already validated against its scope
#[derive(Debug, Clone, Default)]
pub struct HookPatches {
    /// Targets the cluster-persisted config layer
    pub config: Option<ValuesPatch>,

    /// Targets the in-memory dynamic layer
    pub memory: Option<ValuesPatch>,
}

/// Outcome record for one invocation, for per-hook failure reporting
#[derive(Debug, Clone)]
pub struct HookRunReport {
    pub hook: String,
    pub binding: BindingType,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl HookRunReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Executes hooks against a process-wide temp directory
#[derive(Debug, Clone)]
pub struct HookExecutor {
    temp_dir: PathBuf,
}

impl HookExecutor {
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
        }
    }

    pub fn temp_dir(&self) -> &PathBuf {
        &self.temp_dir
    }

    /// Run one hook invocation end to end: prepare files, launch, wait,
    /// collect and validate patches.
    pub async fn run(
        &self,
        hook: &Hook,
        binding: BindingType,
        input: &HookInput,
    ) -> Result<HookPatches> {
        info!(hook = %hook.name, binding = %binding, "running hook");

        let files = self.prepare_tmp_files(hook, input)?;

        let mut command = Command::new(&hook.path);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (var, path) in &files.env {
            command.env(var, path);
        }
        for (var, value) in &input.extra_env {
            command.env(var, value);
        }

        let output = command.output().await.map_err(|e| ManagerError::HookFailed {
            hook: hook.name.clone(),
            message: format!("spawn failed: {}", e),
            stdout: String::new(),
            stderr: String::new(),
        })?;

        if !output.status.success() {
            return Err(ManagerError::HookFailed {
                hook: hook.name.clone(),
                message: format!("exited with {}", output.status),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        debug!(hook = %hook.name, "hook exited successfully");

        let scope_key = hook.scope_key();
        let config = self.read_patch(hook, &files.config_patch_path, &scope_key)?;
        let memory = self.read_patch(hook, &files.values_patch_path, &scope_key)?;

        Ok(HookPatches { config, memory })
    }

    fn read_patch(
        &self,
        hook: &Hook,
        path: &PathBuf,
        scope_key: &str,
    ) -> Result<Option<ValuesPatch>> {
        let patch = ValuesPatch::from_file(path).map_err(|e| ManagerError::PatchRejected {
            hook: hook.name.clone(),
            source: e,
        })?;
        if let Some(patch) = &patch {
            patch
                .validate_scope(scope_key)
                .map_err(|e| ManagerError::PatchRejected {
                    hook: hook.name.clone(),
                    source: e,
                })?;
        }
        Ok(patch)
    }

    /// Write input files, truncate patch files, and return the env map.
    fn prepare_tmp_files(&self, hook: &Hook, input: &HookInput) -> Result<PreparedFiles> {
        let prefix = file_prefix(hook);

        let config_values_path = self.temp_dir.join(format!("{}-config-values.json", prefix));
        std::fs::write(&config_values_path, input.config_values.to_json_string()?)?;

        let values_path = self.temp_dir.join(format!("{}-values.json", prefix));
        std::fs::write(&values_path, input.values.to_json_string()?)?;

        let mut env = vec![
            (CONFIG_VALUES_PATH_ENV.to_string(), config_values_path),
            (VALUES_PATH_ENV.to_string(), values_path),
        ];

        if !input.context.is_empty() {
            let context_path = self.temp_dir.join(format!("{}-binding-context.json", prefix));
            std::fs::write(&context_path, serde_json::to_vec(&input.context)?)?;
            env.push((BINDING_CONTEXT_PATH_ENV.to_string(), context_path));
        }

        let config_patch_path = self
            .temp_dir
            .join(format!("{}-config-values.json-patch", prefix));
        create_patch_file(&config_patch_path)?;
        env.push((
            CONFIG_VALUES_PATCH_PATH_ENV.to_string(),
            config_patch_path.clone(),
        ));

        let values_patch_path = self.temp_dir.join(format!("{}-values.json-patch", prefix));
        create_patch_file(&values_patch_path)?;
        env.push((VALUES_PATCH_PATH_ENV.to_string(), values_patch_path.clone()));

        Ok(PreparedFiles {
            env,
            config_patch_path,
            values_patch_path,
        })
    }
}

struct PreparedFiles {
    env: Vec<(String, PathBuf)>,
    config_patch_path: PathBuf,
    values_patch_path: PathBuf,
}

/// Temp-file prefix, distinct per scope and hook: module hook files
/// carry the module's sanitized name so they never collide with global
/// hook files of the same name.
fn file_prefix(hook: &Hook) -> String {
    match &hook.scope {
        HookScope::Global => format!("global-hook-{}", hook.safe_name()),
        HookScope::Module { name } => format!(
            "{}.module-hook-{}",
            crampon_core::sanitize_name(name),
            hook.safe_name()
        ),
    }
}

/// Create an empty, writable patch file, truncating prior content
fn create_patch_file(path: &PathBuf) -> Result<()> {
    std::fs::File::create(path)?;
    Ok(())
}
