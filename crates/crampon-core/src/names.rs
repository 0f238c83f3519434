//! Deterministic name mangling
//!
//! Two pure mappings live here. `sanitize_name` makes a hook or module
//! name safe for temp-file paths; hooks observe the result through the
//! path environment variables, so the mapping is part of the external
//! contract. `module_values_key` derives the top-level values key a
//! module owns.

/// Map a hierarchical name to a filename-safe slug.
///
/// Lowercases, turns every run of non-alphanumeric characters into a
/// single `-`, and trims leading/trailing dashes:
/// `020-node-exporter/hooks/update.sh` -> `020-node-exporter-hooks-update-sh`.
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Derive the values scope key for a module name.
///
/// Lowercase-hyphenated module names become camelCase keys:
/// `prometheus-operator` -> `prometheusOperator`.
pub fn module_values_key(module_name: &str) -> String {
    let mut out = String::with_capacity(module_name.len());
    let mut capitalize_next = false;
    for ch in module_name.chars() {
        if ch == '-' || ch == '_' {
            capitalize_next = !out.is_empty();
        } else if capitalize_next {
            out.extend(ch.to_uppercase());
            capitalize_next = false;
        } else {
            out.extend(ch.to_lowercase());
        }
    }
    out
}
