//! Error types for crampon-manager

use thiserror::Error;

use crampon_core::CoreError;

/// Result type for manager operations
pub type Result<T> = std::result::Result<T, ManagerError>;

/// Errors that can occur while managing modules and hooks
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ManagerError {
    /// Hook or module discovery failed
    #[error("discovery failed under '{path}': {message}")]
    Discovery { path: String, message: String },

    /// A hook's `--config` output could not be parsed
    #[error("cannot get config for hook '{hook}': {message}")]
    ConfigParse { hook: String, message: String },

    /// Two hooks registered under the same name
    #[error("hook '{name}' is already registered")]
    DuplicateHook { name: String },

    /// Named hook is not in the registry
    #[error("hook '{name}' is not registered")]
    HookNotFound { name: String },

    /// Named module is not known to the manager
    #[error("module '{name}' is not registered")]
    ModuleNotFound { name: String },

    /// Hook subprocess failed to spawn or exited non-zero
    #[error("hook '{hook}' failed: {message}\nstdout:\n{stdout}\nstderr:\n{stderr}")]
    HookFailed {
        hook: String,
        message: String,
        stdout: String,
        stderr: String,
    },

    /// A hook emitted a patch the manager refuses to apply
    #[error("hook '{hook}' emitted a bad values patch: {source}")]
    PatchRejected {
        hook: String,
        #[source]
        source: CoreError,
    },

    /// Post-patch tree no longer holds a mapping at the scope key
    #[error("hook '{hook}': values update left no mapping at key '{key}'")]
    InvalidScopeValues { hook: String, key: String },

    /// The cluster config store rejected a write
    #[error("config persistence failed: {message}")]
    Persistence { message: String },

    /// Chart deploy or delete failed
    #[error("chart operation for release '{release}' failed: {message}")]
    ChartOperation { release: String, message: String },

    /// One or more hooks failed during a single binding delivery
    #[error("{failed} of {total} hooks failed for binding '{binding}': {hooks:?}")]
    DispatchFailed {
        binding: String,
        failed: usize,
        total: usize,
        hooks: Vec<String>,
    },

    /// One or more modules failed during a reconciliation cycle
    #[error("reconciliation failed for module(s): {modules:?}")]
    ReconciliationFailed { modules: Vec<String> },

    /// Core values/patch error
    #[error(transparent)]
    Core(#[from] CoreError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ManagerError {
    fn from(e: serde_json::Error) -> Self {
        ManagerError::Core(CoreError::JsonParse(e))
    }
}
