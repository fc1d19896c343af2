// src/config/env.rs
// Environment-based configuration overrides - single source of truth for all env vars.

use tracing::{debug, info};

/// All environment-derived overrides, loaded once at startup.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// `DISABLE_HEADLESS_AGENTS`: refuse to spawn any AI CLI process (§4.8).
    pub agents_disabled: bool,
    /// `TESTGEN_AI_CLI_BIN`: override the AI CLI binary name/path.
    pub ai_cli_bin: Option<String>,
    /// `TESTGEN_MODEL`: override the default model.
    pub model: Option<String>,
    /// `TESTGEN_MAX_CONCURRENT`: override max concurrent tasks per batch.
    pub max_concurrent: Option<usize>,
    /// `TESTGEN_COST_LIMIT`: override the per-batch cost limit.
    pub cost_limit: Option<f64>,
    /// `TESTGEN_VERBOSE`: force verbose logging regardless of CLI flags.
    pub verbose: bool,
}

impl EnvConfig {
    /// Load all environment overrides. Call once at startup.
    pub fn load() -> Self {
        info!("loading environment configuration");

        let config = Self {
            agents_disabled: parse_bool_env("DISABLE_HEADLESS_AGENTS").unwrap_or(false),
            ai_cli_bin: read_string("TESTGEN_AI_CLI_BIN"),
            model: read_string("TESTGEN_MODEL"),
            max_concurrent: std::env::var("TESTGEN_MAX_CONCURRENT").ok().and_then(|v| v.parse().ok()),
            cost_limit: std::env::var("TESTGEN_COST_LIMIT").ok().and_then(|v| v.parse().ok()),
            verbose: parse_bool_env("TESTGEN_VERBOSE").unwrap_or(false),
        };

        debug!(?config, "environment configuration loaded");
        config
    }
}

fn read_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a boolean-ish environment variable value (`1/true/yes/on` vs
/// `0/false/no/off`), matching the Recursion Guard's own parsing.
pub fn parse_bool_env(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?.to_lowercase();
    match value.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // std::env mutation races across parallel tests within this process;
    // serialize the handful of tests that touch it.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn parse_bool_env_accepts_common_spellings() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("TESTGEN_TEST_BOOL", "YES".to_lowercase());
        assert_eq!(parse_bool_env("TESTGEN_TEST_BOOL"), Some(true));
        std::env::set_var("TESTGEN_TEST_BOOL", "off");
        assert_eq!(parse_bool_env("TESTGEN_TEST_BOOL"), Some(false));
        std::env::remove_var("TESTGEN_TEST_BOOL");
    }

    #[test]
    fn parse_bool_env_is_none_when_absent_or_unrecognized() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("TESTGEN_TEST_BOOL_2");
        assert_eq!(parse_bool_env("TESTGEN_TEST_BOOL_2"), None);
        std::env::set_var("TESTGEN_TEST_BOOL_2", "maybe");
        assert_eq!(parse_bool_env("TESTGEN_TEST_BOOL_2"), None);
        std::env::remove_var("TESTGEN_TEST_BOOL_2");
    }
}
