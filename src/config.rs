//! Runtime configuration for the shell service.
//! Values come from defaults, then `SHELLWIRE_*` environment variables, then
//! CLI flags parsed by the server binary (flags win). The config itself stays
//! a plain struct so tests can build one inline.

use std::env;

/// Which credential-validation strategy is active for this deployment.
/// Exactly one is selected; `Delegated` requires the embedding code to supply
/// an external authenticator when constructing the server state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStrategy {
    Fixed {
        user: String,
        secret: String,
        authorities: Vec<String>,
    },
    Delegated,
}

#[derive(Debug, Clone)]
pub struct ShellConfig {
    pub bind: String,
    pub prompt: String,
    /// Words accepted as an affirmative answer to a yes/no confirmation
    /// prompt, compared case-insensitively.
    pub confirmation_words: Vec<String>,
    pub auth: AuthStrategy,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:2222".to_string(),
            prompt: "shellwire> ".to_string(),
            confirmation_words: vec!["y".to_string(), "yes".to_string()],
            auth: AuthStrategy::Fixed {
                user: "shellwire".to_string(),
                secret: "shellwire".to_string(),
                authorities: vec!["ADMIN".to_string()],
            },
        }
    }
}

impl ShellConfig {
    /// Defaults overlaid with any `SHELLWIRE_*` environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = env::var("SHELLWIRE_BIND") {
            cfg.bind = v;
        }
        if let Ok(v) = env::var("SHELLWIRE_PROMPT") {
            cfg.prompt = v;
        }
        if let Some(words) = parse_csv_env("SHELLWIRE_CONFIRM_WORDS") {
            cfg.confirmation_words = words;
        }
        let user = env::var("SHELLWIRE_USER").ok();
        let secret = env::var("SHELLWIRE_SECRET").ok();
        let authorities = parse_csv_env("SHELLWIRE_AUTHORITIES");
        match env::var("SHELLWIRE_AUTH").as_deref() {
            Ok("delegated") => cfg.auth = AuthStrategy::Delegated,
            _ => {
                // Fixed strategy is the default; individual fields may still
                // be overridden without re-stating the selector.
                if let AuthStrategy::Fixed {
                    user: ref mut u,
                    secret: ref mut s,
                    authorities: ref mut a,
                } = cfg.auth
                {
                    if let Some(v) = user {
                        *u = v;
                    }
                    if let Some(v) = secret {
                        *s = v;
                    }
                    if let Some(v) = authorities {
                        *a = v;
                    }
                }
            }
        }
        cfg
    }
}

/// Comma-separated env list, trimmed, empty entries dropped.
/// Returns None when the variable is unset or contains nothing usable.
fn parse_csv_env(name: &str) -> Option<Vec<String>> {
    let raw = env::var(name).ok()?;
    let items: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_fixed_admin() {
        let cfg = ShellConfig::default();
        assert_eq!(cfg.bind, "127.0.0.1:2222");
        assert_eq!(cfg.confirmation_words, vec!["y", "yes"]);
        match cfg.auth {
            AuthStrategy::Fixed { user, secret, authorities } => {
                assert_eq!(user, "shellwire");
                assert_eq!(secret, "shellwire");
                assert_eq!(authorities, vec!["ADMIN"]);
            }
            other => panic!("unexpected strategy: {:?}", other),
        }
    }

    #[test]
    fn csv_env_parsing() {
        std::env::set_var("SHELLWIRE_TEST_CSV_A", "ok, sure , ,yep");
        assert_eq!(
            parse_csv_env("SHELLWIRE_TEST_CSV_A"),
            Some(vec!["ok".to_string(), "sure".to_string(), "yep".to_string()])
        );
        std::env::set_var("SHELLWIRE_TEST_CSV_B", " , ");
        assert_eq!(parse_csv_env("SHELLWIRE_TEST_CSV_B"), None);
        assert_eq!(parse_csv_env("SHELLWIRE_TEST_CSV_UNSET"), None);
    }
}
