//! The binding catalog: every reason a hook can run
//!
//! A binding names a scheduling trigger. Each variant declares which hook
//! scopes may use it, whether it carries an `order` sort key, and whether
//! deliveries arrive with a context payload.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Closed enumeration of binding kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub enum BindingType {
    /// Once at process start
    OnStartup,
    /// Delivered by the scheduler collaborator
    Schedule,
    /// Delivered by the cluster event watcher
    #[serde(rename = "onKubernetesEvent")]
    KubeEvents,
    /// Before any module work in a reconciliation cycle (global only)
    BeforeAll,
    /// After all module work succeeded (global only)
    AfterAll,
    /// Before a module's chart deploy (module only)
    BeforeHelm,
    /// After a module's chart deploy (module only)
    AfterHelm,
    /// After a module's chart delete (module only)
    AfterDeleteHelm,
}

impl BindingType {
    pub const ALL: [BindingType; 8] = [
        BindingType::OnStartup,
        BindingType::Schedule,
        BindingType::KubeEvents,
        BindingType::BeforeAll,
        BindingType::AfterAll,
        BindingType::BeforeHelm,
        BindingType::AfterHelm,
        BindingType::AfterDeleteHelm,
    ];

    /// May a global hook bind here?
    pub fn allows_global(&self) -> bool {
        !matches!(
            self,
            BindingType::BeforeHelm | BindingType::AfterHelm | BindingType::AfterDeleteHelm
        )
    }

    /// May a module hook bind here?
    pub fn allows_module(&self) -> bool {
        !matches!(self, BindingType::BeforeAll | BindingType::AfterAll)
    }

    /// Does participation carry a numeric `order`?
    pub fn carries_order(&self) -> bool {
        !matches!(self, BindingType::Schedule | BindingType::KubeEvents)
    }

    /// Do deliveries carry a binding context?
    pub fn delivers_context(&self) -> bool {
        matches!(self, BindingType::Schedule | BindingType::KubeEvents)
    }
}

impl std::fmt::Display for BindingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BindingType::OnStartup => "onStartup",
            BindingType::Schedule => "schedule",
            BindingType::KubeEvents => "onKubernetesEvent",
            BindingType::BeforeAll => "beforeAll",
            BindingType::AfterAll => "afterAll",
            BindingType::BeforeHelm => "beforeHelm",
            BindingType::AfterHelm => "afterHelm",
            BindingType::AfterDeleteHelm => "afterDeleteHelm",
        };
        write!(f, "{}", s)
    }
}

/// Structured input delivered with a binding event.
///
/// Lifecycle bindings run with an empty context; schedule and cluster
/// event deliveries fill in the fields the watcher knows about. Hooks
/// receive the whole list serialized as a JSON array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingContext {
    pub binding: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_event: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
}

impl BindingContext {
    /// Context carrying just the binding name (schedule ticks)
    pub fn for_binding(binding: BindingType) -> Self {
        Self {
            binding: binding.to_string(),
            ..Default::default()
        }
    }
}

/// One `schedule` entry from a hook's config. Opaque to the manager;
/// forwarded to the scheduler collaborator as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConfig {
    pub crontab: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub allow_failure: bool,
}

/// Cluster event type a hook can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KubeEventType {
    Added,
    Modified,
    Deleted,
}

/// Which namespaces an event subscription watches
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceSelector {
    #[serde(default)]
    pub any: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_names: Vec<String>,
}

impl NamespaceSelector {
    pub fn any_namespace() -> Self {
        Self {
            any: true,
            match_names: Vec::new(),
        }
    }
}

/// One `onKubernetesEvent` entry from a hook's config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeEventConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_types: Option<Vec<KubeEventType>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<NamespaceSelector>,

    /// Label selector, forwarded opaquely to the watcher
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_selector: Option<JsonValue>,
}

impl KubeEventConfig {
    /// Fill in watcher defaults: all event types, any namespace.
    pub fn normalize(&mut self) {
        if self.event_types.is_none() {
            self.event_types = Some(vec![
                KubeEventType::Added,
                KubeEventType::Modified,
                KubeEventType::Deleted,
            ]);
        }
        if self.namespace_selector.is_none() {
            self.namespace_selector = Some(NamespaceSelector::any_namespace());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_matrix() {
        assert!(BindingType::BeforeAll.allows_global());
        assert!(!BindingType::BeforeAll.allows_module());
        assert!(!BindingType::BeforeHelm.allows_global());
        assert!(BindingType::BeforeHelm.allows_module());
        assert!(BindingType::OnStartup.allows_global());
        assert!(BindingType::OnStartup.allows_module());
    }

    #[test]
    fn test_order_and_context_matrix() {
        for binding in BindingType::ALL {
            // Exactly the context-delivering bindings are orderless.
            assert_eq!(binding.carries_order(), !binding.delivers_context());
        }
        assert!(BindingType::Schedule.delivers_context());
        assert!(BindingType::KubeEvents.delivers_context());
        assert!(!BindingType::AfterHelm.delivers_context());
    }

    #[test]
    fn test_binding_display_matches_config_keys() {
        assert_eq!(BindingType::OnStartup.to_string(), "onStartup");
        assert_eq!(BindingType::KubeEvents.to_string(), "onKubernetesEvent");
        assert_eq!(BindingType::AfterDeleteHelm.to_string(), "afterDeleteHelm");
    }

    #[test]
    fn test_context_serializes_compact() {
        let ctx = BindingContext::for_binding(BindingType::Schedule);
        let json = serde_json::to_string(&vec![ctx]).unwrap();
        assert_eq!(json, r#"[{"binding":"schedule"}]"#);
    }

    #[test]
    fn test_kube_event_config_normalize() {
        let mut config: KubeEventConfig =
            serde_json::from_str(r#"{"kind":"ConfigMap"}"#).unwrap();
        config.normalize();

        assert_eq!(
            config.event_types.as_deref().unwrap(),
            &[
                KubeEventType::Added,
                KubeEventType::Modified,
                KubeEventType::Deleted
            ]
        );
        assert!(config.namespace_selector.unwrap().any);
    }

    #[test]
    fn test_kube_event_config_explicit_fields_kept() {
        let mut config: KubeEventConfig = serde_json::from_str(
            r#"{"kind":"Pod","eventTypes":["Added"],"namespaceSelector":{"matchNames":["kube-system"]}}"#,
        )
        .unwrap();
        config.normalize();

        assert_eq!(config.event_types.as_deref().unwrap(), &[KubeEventType::Added]);
        let selector = config.namespace_selector.unwrap();
        assert!(!selector.any);
        assert_eq!(selector.match_names, vec!["kube-system"]);
    }
}
