//! Upstream credential resolution.
//!
//! # Contract
//! - Config YAML stores only the env var NAME of the token
//!   (`/upstream/token_env`, default [`DEFAULT_TOKEN_ENV`]).
//! - Callers resolve it once at startup and hand the [`ResolvedToken`] to the
//!   request client's credential provider. Nothing else reads the environment.
//! - `Debug` redacts the value; errors mention the variable NAME only.

use anyhow::{bail, Result};
use serde_json::Value;

pub const DEFAULT_TOKEN_ENV: &str = "KDS_UPSTREAM_TOKEN";

/// Opaque upstream session token. **Redacted in `Debug` output.**
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedToken {
    /// Name of the env var the token came from (safe to log).
    pub source_var: String,
    value: String,
}

impl ResolvedToken {
    pub fn new(source_var: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            source_var: source_var.into(),
            value: value.into(),
        }
    }

    pub fn expose(&self) -> &str {
        &self.value
    }
}

impl std::fmt::Debug for ResolvedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedToken")
            .field("source_var", &self.source_var)
            .field("value", &"<REDACTED>")
            .finish()
    }
}

/// Env var name configured for the token, falling back to [`DEFAULT_TOKEN_ENV`].
pub fn token_env_name(config_json: &Value) -> String {
    config_json
        .pointer("/upstream/token_env")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_TOKEN_ENV)
        .to_string()
}

/// Resolve the upstream token from the environment.
///
/// `required = false` returns `Ok(None)` when the variable is unset or blank,
/// which lets read-only commands run against a proxy that injects its own
/// session token.
pub fn resolve_token(config_json: &Value, required: bool) -> Result<Option<ResolvedToken>> {
    let var = token_env_name(config_json);
    match std::env::var(&var) {
        Ok(v) if !v.trim().is_empty() => Ok(Some(ResolvedToken::new(var, v.trim()))),
        _ if required => bail!(
            "SECRETS_MISSING: required env var '{}' (upstream token) is not set or empty",
            var
        ),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_prints_value() {
        let t = ResolvedToken::new("KDS_UPSTREAM_TOKEN", "super-secret-value");
        let dbg = format!("{t:?}");
        assert!(dbg.contains("KDS_UPSTREAM_TOKEN"));
        assert!(!dbg.contains("super-secret-value"));
    }

    #[test]
    fn env_name_defaults_when_absent_or_blank() {
        assert_eq!(token_env_name(&serde_json::json!({})), DEFAULT_TOKEN_ENV);
        assert_eq!(
            token_env_name(&serde_json::json!({"upstream": {"token_env": "  "}})),
            DEFAULT_TOKEN_ENV
        );
        assert_eq!(
            token_env_name(&serde_json::json!({"upstream": {"token_env": "PS_TOKEN"}})),
            "PS_TOKEN"
        );
    }

    #[test]
    fn missing_required_token_names_the_variable() {
        let cfg = serde_json::json!({"upstream": {"token_env": "KDS_TEST_TOKEN_NEVER_SET_9F2"}});
        let err = resolve_token(&cfg, true).unwrap_err().to_string();
        assert!(err.contains("KDS_TEST_TOKEN_NEVER_SET_9F2"));
        assert!(resolve_token(&cfg, false).unwrap().is_none());
    }
}
