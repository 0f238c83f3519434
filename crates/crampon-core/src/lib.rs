//! Crampon Core - foundational types for the module/hook manager
//!
//! This crate provides the pure pieces shared by the rest of Crampon:
//! - `Values`: layered configuration values with deep merge support
//! - `ValuesPatch`: the JSON-Patch subset hooks emit to mutate values
//! - `BindingType` / `BindingContext`: the catalog of reasons a hook runs
//! - name mangling helpers (scope keys, temp-file-safe names)
//!
//! Everything here is side-effect free apart from the explicit file
//! readers on `Values` and `ValuesPatch`.

pub mod bindings;
pub mod error;
pub mod names;
pub mod patch;
pub mod values;

pub use bindings::{
    BindingContext, BindingType, KubeEventConfig, KubeEventType, NamespaceSelector,
    ScheduleConfig,
};
pub use error::{CoreError, Result};
pub use names::{module_values_key, sanitize_name};
pub use patch::{PatchOp, PatchOperation, ValuesPatch, apply_patch};
pub use values::{GLOBAL_VALUES_KEY, Values};
