//! Generated secret storage
//!
//! Secrets are issued once per intent and keyed `{app_name}.{purpose}`, so
//! repeated auto-wiring passes for the same intent reuse the already-issued
//! value instead of regenerating it. The bag is hydrated from the secret
//! store before wiring and written back afterwards; dry runs use an
//! ephemeral bag that is never persisted.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::{Rng, RngCore, distr::Alphanumeric};
use std::collections::BTreeMap;

/// Minimum password length, alphanumeric charset.
const PASSWORD_LENGTH: usize = 32;

/// Symmetric key size in raw bytes, base64-encoded for transport.
const KEY_BYTES: usize = 32;

#[derive(Debug, Clone, Default)]
pub struct SecretBag {
    values: BTreeMap<String, String>,
}

impl SecretBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Issue or reuse a password for `key`.
    pub fn get_or_generate_password(&mut self, key: &str) -> String {
        self.values
            .entry(key.to_string())
            .or_insert_with(generate_password)
            .clone()
    }

    /// Issue or reuse a base64-encoded symmetric key for `key`.
    pub fn get_or_generate_key(&mut self, key: &str) -> String {
        self.values
            .entry(key.to_string())
            .or_insert_with(generate_symmetric_key)
            .clone()
    }

    /// Store a derived secret (e.g. a connection URL embedding a password)
    /// under `key` unless one was already issued.
    pub fn get_or_insert_derived(&mut self, key: &str, value: String) -> String {
        self.values.entry(key.to_string()).or_insert(value).clone()
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn generate_password() -> String {
    let rng = rand::rng();
    rng.sample_iter(Alphanumeric)
        .take(PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

fn generate_symmetric_key() -> String {
    let mut rng = rand::rng();
    let mut bytes = [0u8; KEY_BYTES];
    rng.fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}
