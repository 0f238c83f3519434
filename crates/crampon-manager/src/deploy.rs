//! Chart deploy collaborator
//!
//! The manager frames hook runs around chart operations but never
//! performs them itself. `ChartDeployer` is the narrow seam; the
//! command-line implementation shells out to a helm-compatible binary,
//! and the mock records calls for tests.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{ManagerError, Result};

/// Deploys and deletes chart releases; supplies extra hook environment
#[async_trait]
pub trait ChartDeployer: Send + Sync {
    /// Deploy `chart_path` as `release_name` into `namespace`
    async fn deploy(
        &self,
        release_name: &str,
        chart_path: &Path,
        values_files: &[PathBuf],
        set_values: &[String],
        namespace: &str,
    ) -> Result<()>;

    /// Delete the release
    async fn delete(&self, release_name: &str, namespace: &str) -> Result<()>;

    /// Extra environment injected into every hook subprocess
    fn command_env(&self) -> Vec<(String, String)>;
}

/// Shells out to a helm-compatible binary (`<bin> helm deploy-chart ...`)
pub struct HelmCommandDeployer {
    binary: String,
    /// Overrides the target namespace and the release storage namespace
    /// when set; also exported as TILLER_NAMESPACE to hooks and the
    /// deploy subprocess.
    tiller_namespace: Option<String>,
}

impl HelmCommandDeployer {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            tiller_namespace: None,
        }
    }

    pub fn with_tiller_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.tiller_namespace = Some(namespace.into());
        self
    }

    fn target_namespace<'a>(&'a self, requested: &'a str) -> &'a str {
        self.tiller_namespace.as_deref().unwrap_or(requested)
    }

    async fn run(&self, release_name: &str, args: &[String]) -> Result<()> {
        debug!(binary = %self.binary, ?args, "running chart command");
        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (var, value) in self.command_env() {
            command.env(var, value);
        }

        let output = command
            .output()
            .await
            .map_err(|e| ManagerError::ChartOperation {
                release: release_name.to_string(),
                message: format!("spawn '{}' failed: {}", self.binary, e),
            })?;

        if !output.status.success() {
            return Err(ManagerError::ChartOperation {
                release: release_name.to_string(),
                message: format!(
                    "{} exited with {}:\n{}\n{}",
                    self.binary,
                    output.status,
                    String::from_utf8_lossy(&output.stdout).trim(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ChartDeployer for HelmCommandDeployer {
    async fn deploy(
        &self,
        release_name: &str,
        chart_path: &Path,
        values_files: &[PathBuf],
        set_values: &[String],
        namespace: &str,
    ) -> Result<()> {
        let ns = self.target_namespace(namespace);

        let mut args = vec![
            "helm".to_string(),
            "deploy-chart".to_string(),
            "--namespace".to_string(),
            ns.to_string(),
            "--helm-release-storage-namespace".to_string(),
            ns.to_string(),
        ];
        for values_file in values_files {
            args.push("--values".to_string());
            args.push(values_file.display().to_string());
        }
        for set_value in set_values {
            args.push("--set".to_string());
            args.push(set_value.clone());
        }
        args.push(chart_path.display().to_string());
        args.push(release_name.to_string());

        info!(release = %release_name, chart = %chart_path.display(), namespace = %ns, "deploying chart");
        self.run(release_name, &args).await
    }

    async fn delete(&self, release_name: &str, namespace: &str) -> Result<()> {
        let ns = self.target_namespace(namespace);
        let args = vec![
            "helm".to_string(),
            "delete".to_string(),
            "--namespace".to_string(),
            ns.to_string(),
            release_name.to_string(),
        ];

        info!(release = %release_name, namespace = %ns, "deleting chart release");
        self.run(release_name, &args).await
    }

    fn command_env(&self) -> Vec<(String, String)> {
        match &self.tiller_namespace {
            Some(ns) => vec![("TILLER_NAMESPACE".to_string(), ns.clone())],
            None => Vec::new(),
        }
    }
}

/// One recorded call on the mock deployer
#[derive(Debug, Clone, PartialEq)]
pub enum DeployCall {
    Deploy {
        release_name: String,
        namespace: String,
        values_files: Vec<PathBuf>,
    },
    Delete {
        release_name: String,
        namespace: String,
    },
}

/// In-memory deployer for tests: records calls, optionally fails
#[derive(Clone, Default)]
pub struct MockChartDeployer {
    calls: Arc<Mutex<Vec<DeployCall>>>,
    fail_deploys: Arc<Mutex<bool>>,
    extra_env: Vec<(String, String)>,
}

impl MockChartDeployer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_command_env(mut self, env: Vec<(String, String)>) -> Self {
        self.extra_env = env;
        self
    }

    /// Make every subsequent deploy call fail
    pub fn fail_deploys(&self, fail: bool) {
        *self.fail_deploys.lock().unwrap() = fail;
    }

    pub fn calls(&self) -> Vec<DeployCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn deploy_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, DeployCall::Deploy { .. }))
            .count()
    }
}

#[async_trait]
impl ChartDeployer for MockChartDeployer {
    async fn deploy(
        &self,
        release_name: &str,
        _chart_path: &Path,
        values_files: &[PathBuf],
        _set_values: &[String],
        namespace: &str,
    ) -> Result<()> {
        self.calls.lock().unwrap().push(DeployCall::Deploy {
            release_name: release_name.to_string(),
            namespace: namespace.to_string(),
            values_files: values_files.to_vec(),
        });
        if *self.fail_deploys.lock().unwrap() {
            return Err(ManagerError::ChartOperation {
                release: release_name.to_string(),
                message: "mock deploy failure".to_string(),
            });
        }
        Ok(())
    }

    async fn delete(&self, release_name: &str, namespace: &str) -> Result<()> {
        self.calls.lock().unwrap().push(DeployCall::Delete {
            release_name: release_name.to_string(),
            namespace: namespace.to_string(),
        });
        Ok(())
    }

    fn command_env(&self) -> Vec<(String, String)> {
        self.extra_env.clone()
    }
}
