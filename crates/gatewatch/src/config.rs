//! CLI-owned configuration: TOML profiles and credential resolution.
//!
//! Core never sees these types -- it receives a pre-built `FeedConfig`
//! and a `TokenProvider`.

use std::collections::HashMap;
use std::path::PathBuf;

use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use gatewatch_core::FeedConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── TOML config structs ──────────────────────────────────────────────

/// CLI-owned TOML configuration. Core never touches this type.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name (used when --profile is not specified).
    pub default_profile: Option<String>,

    /// Named feed profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            profiles: HashMap::new(),
        }
    }
}

/// CLI-owned profile definition.
#[derive(Debug, Deserialize, Serialize)]
pub struct Profile {
    /// Feed endpoint URL (e.g., "wss://fleet.example.com/ws/vehicle-logs/").
    pub endpoint: String,

    /// Feed token (plaintext -- prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable name containing the token.
    pub token_env: Option<String>,

    /// Feed window size override.
    pub capacity: Option<usize>,
}

// ── Config file path ─────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "gatewatch", "gatewatch")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        })
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("gatewatch");
    p
}

// ── Config loading ───────────────────────────────────────────────────

/// Load the full Config from file + environment.
pub fn load_config() -> Result<Config, CliError> {
    let path = config_path();

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("GATEWATCH_").only(&["default_profile"]));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Profile resolution ───────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Resolve a `FeedConfig` from flags, env, and the config file.
///
/// This is the single boundary where CLI config types cross into core
/// types. Flags win over the profile; a profile is optional as long as
/// an endpoint arrives some other way.
pub fn resolve_feed_config(
    global: &GlobalOpts,
    capacity_override: Option<usize>,
) -> Result<FeedConfig, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    // An explicitly requested profile must exist.
    if global.profile.is_some() && !cfg.profiles.contains_key(&profile_name) {
        let available: Vec<_> = cfg.profiles.keys().cloned().collect();
        return Err(CliError::ProfileNotFound {
            name: profile_name,
            available: if available.is_empty() {
                "(none)".into()
            } else {
                available.join(", ")
            },
        });
    }

    let profile = cfg.profiles.get(&profile_name);

    let endpoint_str = global
        .endpoint
        .as_deref()
        .or(profile.map(|p| p.endpoint.as_str()))
        .ok_or_else(|| CliError::NoEndpoint {
            path: config_path().display().to_string(),
        })?;

    let endpoint: url::Url = endpoint_str.parse().map_err(|_| CliError::Validation {
        field: "endpoint".into(),
        reason: format!("invalid URL: {endpoint_str}"),
    })?;
    match endpoint.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(CliError::Validation {
                field: "endpoint".into(),
                reason: format!("expected a ws:// or wss:// URL, got scheme '{other}'"),
            })
        }
    }

    let mut feed = FeedConfig::new(endpoint);
    if let Some(capacity) = capacity_override.or(profile.and_then(|p| p.capacity)) {
        if capacity == 0 {
            return Err(CliError::Validation {
                field: "capacity".into(),
                reason: "must be at least 1".into(),
            });
        }
        feed.capacity = capacity;
    }
    Ok(feed)
}

// ── Credential resolution ────────────────────────────────────────────

/// Resolve the feed token from the credential chain:
/// flag/env > profile's token_env > keyring > plaintext config.
pub fn resolve_token(global: &GlobalOpts) -> Result<SecretString, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);
    let profile = cfg.profiles.get(&profile_name);

    // 1. CLI flag / GATEWATCH_TOKEN
    if let Some(ref token) = global.token {
        return Ok(SecretString::from(token.clone()));
    }

    // 2. Profile's token_env -> env var lookup
    if let Some(env_name) = profile.and_then(|p| p.token_env.as_deref()) {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 3. System keyring
    if let Ok(entry) = keyring::Entry::new("gatewatch", &format!("{profile_name}/token")) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 4. Plaintext in config
    if let Some(token) = profile.and_then(|p| p.token.clone()) {
        return Ok(SecretString::from(token));
    }

    Err(CliError::NoCredentials {
        profile: profile_name,
    })
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn global(endpoint: Option<&str>, token: Option<&str>) -> GlobalOpts {
        GlobalOpts {
            endpoint: endpoint.map(String::from),
            token: token.map(String::from),
            profile: None,
            verbose: 0,
        }
    }

    #[test]
    fn endpoint_flag_builds_feed_config() {
        let feed = resolve_feed_config(
            &global(Some("wss://fleet.example.com/ws/vehicle-logs/"), None),
            None,
        )
        .unwrap();
        assert_eq!(feed.endpoint.scheme(), "wss");
        assert_eq!(feed.capacity, 20);
    }

    #[test]
    fn capacity_override_wins() {
        let feed = resolve_feed_config(
            &global(Some("ws://localhost:8000/ws/vehicle-logs/"), None),
            Some(5),
        )
        .unwrap();
        assert_eq!(feed.capacity, 5);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = resolve_feed_config(
            &global(Some("ws://localhost:8000/ws/vehicle-logs/"), None),
            Some(0),
        )
        .unwrap_err();
        assert!(matches!(err, CliError::Validation { .. }));
    }

    #[test]
    fn http_scheme_is_rejected() {
        let err =
            resolve_feed_config(&global(Some("https://fleet.example.com/feed"), None), None)
                .unwrap_err();
        assert!(matches!(err, CliError::Validation { .. }));
    }

    #[test]
    fn token_flag_wins_the_chain() {
        use secrecy::ExposeSecret;
        let token = resolve_token(&global(None, Some("from-flag"))).unwrap();
        assert_eq!(token.expose_secret(), "from-flag");
    }
}
