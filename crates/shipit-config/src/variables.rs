//! Variable interpolation for configuration values.
//!
//! Supports variables like:
//! - `${git.sha}` - Full commit SHA of the run
//! - `${git.short_sha}` - Short (7 char) commit SHA
//! - `${run.id}` - Run ID
//! - `${run.version}` - Version string computed by the setup stage
//! - `${run.event}` - Event label that started the run
//! - `${env.VAR_NAME}` - Environment variable
//! - `${timestamp}` - Unix timestamp
//! - `${date}` - ISO date (YYYY-MM-DD)
//!
//! Unknown variables are preserved verbatim.

use regex::Regex;
use shipit_core::RunContext;
use std::collections::HashMap;
use std::sync::LazyLock;

static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)?)\}").unwrap()
});

/// Variable context containing all values available for interpolation.
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    pub git_sha: String,
    pub git_short_sha: String,
    pub run_id: String,
    pub run_version: String,
    pub run_event: String,
    pub env: HashMap<String, String>,
}

impl VariableContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from a run, with the process environment.
    pub fn from_run(ctx: &RunContext) -> Self {
        let mut vars = Self {
            git_sha: ctx.sha.clone(),
            git_short_sha: ctx.version.clone(),
            run_id: ctx.id.to_string(),
            run_version: ctx.version.clone(),
            run_event: ctx.event.label(),
            env: HashMap::new(),
        };
        vars.populate_env();
        vars
    }

    /// Populate environment variables from the current process environment.
    pub fn populate_env(&mut self) {
        for (key, value) in std::env::vars() {
            self.env.insert(key, value);
        }
    }

    /// Resolve a variable name to its value.
    pub fn resolve(&self, var_name: &str) -> Option<String> {
        let parts: Vec<&str> = var_name.split('.').collect();

        match parts.as_slice() {
            ["git", "sha"] => Some(self.git_sha.clone()),
            ["git", "short_sha"] => Some(self.git_short_sha.clone()),

            ["run", "id"] => Some(self.run_id.clone()),
            ["run", "version"] => Some(self.run_version.clone()),
            ["run", "event"] => Some(self.run_event.clone()),

            ["env", name] => self.env.get(*name).cloned(),

            ["timestamp"] => Some(chrono::Utc::now().timestamp().to_string()),
            ["date"] => Some(chrono::Utc::now().format("%Y-%m-%d").to_string()),

            _ => None,
        }
    }

    /// Interpolate all variables in a string.
    pub fn interpolate(&self, input: &str) -> String {
        VAR_REGEX
            .replace_all(input, |caps: &regex::Captures| {
                let var_name = &caps[1];
                self.resolve(var_name)
                    .unwrap_or_else(|| format!("${{{}}}", var_name))
            })
            .to_string()
    }

    /// Interpolate variables in a HashMap's values.
    pub fn interpolate_map(&self, map: &HashMap<String, String>) -> HashMap<String, String> {
        map.iter()
            .map(|(k, v)| (k.clone(), self.interpolate(v)))
            .collect()
    }
}
