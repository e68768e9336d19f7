//! Environment preparation.
//!
//! Service variables may reference project-level variables with
//! `${{project.KEY}}`. References are resolved before the environment is
//! handed to a build tool or the service spec.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::error::{ValidationError, ValidationResult};

static PROJECT_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{\{project\.([A-Za-z0-9_]+)\}\}").expect("static regex")
});

/// Resolve `${{project.KEY}}` references in one value.
pub fn interpolate(value: &str, project: &BTreeMap<String, String>) -> ValidationResult<String> {
    let mut missing = None;
    let resolved = PROJECT_REF.replace_all(value, |caps: &regex::Captures<'_>| {
        let key = &caps[1];
        match project.get(key) {
            Some(v) => v.clone(),
            None => {
                missing.get_or_insert_with(|| key.to_string());
                String::new()
            }
        }
    });
    match missing {
        Some(key) => Err(ValidationError::UnknownProjectVariable(key)),
        None => Ok(resolved.into_owned()),
    }
}

/// Resolve every service variable into `KEY=VALUE` pairs, ordered by key.
pub fn prepare_environment(
    env: &BTreeMap<String, String>,
    project: &BTreeMap<String, String>,
) -> ValidationResult<Vec<String>> {
    env.iter()
        .map(|(key, value)| Ok(format!("{key}={}", interpolate(value, project)?)))
        .collect()
}

/// Render prepared pairs as the contents of an `.env` file.
pub fn to_env_file(pairs: &[String]) -> String {
    let mut out = pairs.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}
