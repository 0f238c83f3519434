//! The serialized event queue
//!
//! Every event source (startup, scheduler, cluster watcher, lifecycle
//! driver, config store pushes) funnels into one channel; the manager
//! drains it one event at a time. This gives sequential consistency
//! across the values layers without locks: all state mutations from an
//! earlier event are visible to the hooks launched for a later one.

use tokio::sync::mpsc;
use tracing::{error, info};

use crampon_core::{BindingContext, BindingType};

use crate::config_store::ConfigUpdate;
use crate::error::{ManagerError, Result};
use crate::manager::ModuleManager;

/// An event delivered by a collaborator
#[derive(Debug)]
pub enum ManagerEvent {
    /// Process start: run global `OnStartup` hooks
    Startup,

    /// Run a full reconciliation cycle
    Reconcile,

    /// A scheduler tick with its context
    Schedule { context: Vec<BindingContext> },

    /// A cluster event delivery with its context
    KubeEvent { context: Vec<BindingContext> },

    /// Deploy a single module
    DeployModule { name: String },

    /// Delete a single module's release
    DeleteModule { name: String },

    /// Externally originated config values change
    ConfigUpdate(ConfigUpdate),

    /// Re-scan the modules directory
    RescanModules,
}

/// Create the event channel collaborators send into
pub fn event_channel(buffer: usize) -> (mpsc::Sender<ManagerEvent>, mpsc::Receiver<ManagerEvent>) {
    mpsc::channel(buffer)
}

impl ModuleManager {
    /// Handle a single event to completion
    pub async fn handle_event(&mut self, event: ManagerEvent) -> Result<()> {
        match event {
            ManagerEvent::Startup => self.run_on_startup().await,
            ManagerEvent::Reconcile => self.run_reconciliation().await,
            ManagerEvent::Schedule { context } => {
                self.deliver(BindingType::Schedule, &context).await
            }
            ManagerEvent::KubeEvent { context } => {
                self.deliver(BindingType::KubeEvents, &context).await
            }
            ManagerEvent::DeployModule { name } => self.deploy_module(&name).await,
            ManagerEvent::DeleteModule { name } => self.delete_module(&name).await,
            ManagerEvent::ConfigUpdate(update) => {
                self.handle_config_update(update);
                Ok(())
            }
            ManagerEvent::RescanModules => self.scan_modules(),
        }
    }

    async fn deliver(
        &mut self,
        binding: BindingType,
        context: &[BindingContext],
    ) -> Result<()> {
        let reports = self.dispatch_binding(binding, context).await?;
        let failed: Vec<String> = reports
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.hook.clone())
            .collect();
        if failed.is_empty() {
            Ok(())
        } else {
            Err(ManagerError::DispatchFailed {
                binding: binding.to_string(),
                failed: failed.len(),
                total: reports.len(),
                hooks: failed,
            })
        }
    }

    /// Drain the queue until every sender is dropped (shutdown). Event
    /// failures are logged and do not stop the loop: retry policy
    /// belongs to the event source.
    pub async fn run_queue(&mut self, mut events: mpsc::Receiver<ManagerEvent>) {
        while let Some(event) = events.recv().await {
            if let Err(e) = self.handle_event(event).await {
                error!(error = %e, "event handling failed");
            }
        }
        info!("event queue closed, manager stopping");
    }
}
