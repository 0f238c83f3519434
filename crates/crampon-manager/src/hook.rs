//! Hook definitions and the declarative config hooks emit via `--config`

use serde::de::{self, Deserializer};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

use crampon_core::{
    BindingType, KubeEventConfig, ScheduleConfig, module_values_key, sanitize_name,
    GLOBAL_VALUES_KEY,
};

/// An optional-with-numeric-order binding field.
///
/// Hook configs carry either a number (the order) or null/absent for
/// each lifecycle binding key. Any other JSON value is a registration
/// error, surfaced through the deserializer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum OrderField {
    #[default]
    Absent,
    Order(f64),
}

impl OrderField {
    pub fn is_present(&self) -> bool {
        matches!(self, OrderField::Order(_))
    }
}

impl<'de> Deserialize<'de> for OrderField {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::Null => Ok(OrderField::Absent),
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => Ok(OrderField::Order(f)),
                None => Err(de::Error::custom("binding order is not representable")),
            },
            other => Err(de::Error::custom(format!(
                "unsupported value '{}' for binding order (number or null expected)",
                other
            ))),
        }
    }
}

/// Config keys shared by global and module hooks
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonHookConfig {
    #[serde(default)]
    pub on_startup: OrderField,

    #[serde(default)]
    pub schedule: Vec<ScheduleConfig>,

    #[serde(default)]
    pub on_kubernetes_event: Vec<KubeEventConfig>,
}

/// Config shape emitted by a global hook
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalHookConfig {
    #[serde(flatten)]
    pub common: CommonHookConfig,

    #[serde(default)]
    pub before_all: OrderField,

    #[serde(default)]
    pub after_all: OrderField,
}

/// Config shape emitted by a module hook
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleHookConfig {
    #[serde(flatten)]
    pub common: CommonHookConfig,

    #[serde(default)]
    pub before_helm: OrderField,

    #[serde(default)]
    pub after_helm: OrderField,

    #[serde(default)]
    pub after_delete_helm: OrderField,
}

/// Which values scope a hook operates on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookScope {
    Global,
    Module { name: String },
}

impl HookScope {
    /// The top-level values key this scope owns
    pub fn values_key(&self) -> String {
        match self {
            HookScope::Global => GLOBAL_VALUES_KEY.to_string(),
            HookScope::Module { name } => module_values_key(name),
        }
    }

    pub fn module_name(&self) -> Option<&str> {
        match self {
            HookScope::Global => None,
            HookScope::Module { name } => Some(name),
        }
    }
}

/// A discovered hook: immutable after registration
#[derive(Debug, Clone)]
pub struct Hook {
    /// Unique hierarchical name, e.g. `global-hooks/startup.sh` or
    /// `node-exporter/hooks/cleanup`
    pub name: String,

    /// Absolute path of the executable
    pub path: PathBuf,

    pub scope: HookScope,

    /// Bindings this hook participates in, in declaration order
    pub bindings: Vec<BindingType>,

    /// Sort key per order-bearing binding
    pub orders: HashMap<BindingType, f64>,

    /// Forwarded to the scheduler collaborator
    pub schedules: Vec<ScheduleConfig>,

    /// Forwarded to the cluster event watcher (normalized)
    pub kube_events: Vec<KubeEventConfig>,
}

impl Hook {
    /// Build a global hook from its parsed config
    pub fn from_global_config(name: &str, path: PathBuf, config: GlobalHookConfig) -> Self {
        let mut hook = Hook {
            name: name.to_string(),
            path,
            scope: HookScope::Global,
            bindings: Vec::new(),
            orders: HashMap::new(),
            schedules: Vec::new(),
            kube_events: Vec::new(),
        };

        hook.bind_order(BindingType::BeforeAll, config.before_all);
        hook.bind_order(BindingType::AfterAll, config.after_all);
        hook.bind_common(config.common);
        hook
    }

    /// Build a module hook from its parsed config
    pub fn from_module_config(
        module_name: &str,
        name: &str,
        path: PathBuf,
        config: ModuleHookConfig,
    ) -> Self {
        let mut hook = Hook {
            name: name.to_string(),
            path,
            scope: HookScope::Module {
                name: module_name.to_string(),
            },
            bindings: Vec::new(),
            orders: HashMap::new(),
            schedules: Vec::new(),
            kube_events: Vec::new(),
        };

        hook.bind_order(BindingType::BeforeHelm, config.before_helm);
        hook.bind_order(BindingType::AfterHelm, config.after_helm);
        hook.bind_order(BindingType::AfterDeleteHelm, config.after_delete_helm);
        hook.bind_common(config.common);
        hook
    }

    fn bind_common(&mut self, common: CommonHookConfig) {
        self.bind_order(BindingType::OnStartup, common.on_startup);

        if !common.schedule.is_empty() {
            self.bindings.push(BindingType::Schedule);
            self.schedules = common.schedule;
        }

        if !common.on_kubernetes_event.is_empty() {
            self.bindings.push(BindingType::KubeEvents);
            self.kube_events = common.on_kubernetes_event;
            for config in &mut self.kube_events {
                config.normalize();
            }
        }
    }

    fn bind_order(&mut self, binding: BindingType, field: OrderField) {
        if let OrderField::Order(order) = field {
            self.bindings.push(binding);
            self.orders.insert(binding, order);
        }
    }

    /// Does this hook participate in `binding`?
    pub fn has_binding(&self, binding: BindingType) -> bool {
        self.bindings.contains(&binding)
    }

    /// Sort key for an order-bearing binding (0 when not bound)
    pub fn order_for(&self, binding: BindingType) -> f64 {
        self.orders.get(&binding).copied().unwrap_or(0.0)
    }

    /// Temp-file-safe rendition of the hook name
    pub fn safe_name(&self) -> String {
        sanitize_name(&self.name)
    }

    /// The values key the hook's patches must stay under
    pub fn scope_key(&self) -> String {
        self.scope.values_key()
    }
}
