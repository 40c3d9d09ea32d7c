//! Environment lookup and `${VAR}` template expansion
//!
//! Storage-destination properties may reference environment variables
//! (`access_key_id: ${AWS_ACCESS_KEY_ID}`). The lookup is passed in explicitly
//! so config construction stays deterministic under test.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::{BTreeMap, HashMap};

static TEMPLATE_VAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("template pattern is valid")
});

/// Source of environment variable values
pub trait Env {
    /// Look up a variable, `None` when it is not set
    fn var(&self, key: &str) -> Option<String>;
}

/// The environment of the running process
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl Env for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl Env for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl Env for BTreeMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Expand every `${VAR}` in `template`. Unset variables expand to an empty string.
pub fn interpolate<E: Env + ?Sized>(template: &str, env: &E) -> String {
    TEMPLATE_VAR
        .replace_all(template, |caps: &Captures<'_>| {
            env.var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

/// Expand every value of a property map
pub fn interpolate_all<E: Env + ?Sized>(
    properties: &BTreeMap<String, String>,
    env: &E,
) -> BTreeMap<String, String> {
    properties
        .iter()
        .map(|(key, value)| (key.clone(), interpolate(value, env)))
        .collect()
}
