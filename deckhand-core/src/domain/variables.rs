//! Resolved variable map for manifest rendering
//!
//! Auto-wiring produces one `ResolvedVariables` per plan node. Secret-backed
//! variables carry only their secret key; the raw value lives in the secret
//! store and is looked up at render time, so a persisted intent record never
//! contains secret material.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single resolved variable value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VarValue {
    Literal { value: String },
    /// Reference to a generated secret, keyed `{app_name}.{purpose}`.
    Secret { key: String },
}

impl VarValue {
    pub fn literal(value: impl Into<String>) -> Self {
        VarValue::Literal { value: value.into() }
    }

    pub fn secret(key: impl Into<String>) -> Self {
        VarValue::Secret { key: key.into() }
    }

    pub fn is_secret(&self) -> bool {
        matches!(self, VarValue::Secret { .. })
    }
}

/// Variable set for one plan node, ordered for deterministic iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedVariables(pub BTreeMap<String, VarValue>);

impl ResolvedVariables {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn set(&mut self, name: impl Into<String>, value: VarValue) {
        self.0.insert(name.into(), value);
    }

    /// Insert only if the variable is not already present. Later layers
    /// (defaults) must not clobber earlier ones (intent overrides).
    pub fn set_if_absent(&mut self, name: impl Into<String>, value: VarValue) {
        self.0.entry(name.into()).or_insert(value);
    }

    pub fn get(&self, name: &str) -> Option<&VarValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &VarValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
