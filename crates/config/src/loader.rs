use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::WaygateConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["waygate.toml", "waygate.yaml", "waygate.yml", "waygate.json"];

/// Override for the config directory, set via `set_config_dir()`.
static CONFIG_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Set a custom config directory. When set, config discovery only looks in
/// this directory (project-local and user-global paths are skipped).
/// Can be called multiple times (e.g. in tests) — each call replaces the
/// previous override.
pub fn set_config_dir(path: PathBuf) {
    if let Ok(mut guard) = CONFIG_DIR_OVERRIDE.lock() {
        *guard = Some(path);
    }
}

fn config_dir_override() -> Option<PathBuf> {
    CONFIG_DIR_OVERRIDE.lock().ok().and_then(|g| g.clone())
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<WaygateConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<WaygateConfig> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let cfg = match ext {
        "toml" => toml::from_str(raw)?,
        "yaml" | "yml" => serde_yaml::from_str(raw)?,
        "json" => serde_json::from_str(raw)?,
        other => anyhow::bail!("unsupported config format: {other}"),
    };
    Ok(cfg)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./waygate.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/waygate/waygate.{toml,yaml,yml,json}` (user-global)
///
/// Returns `WaygateConfig::default()` if no config file is found. The env
/// overlay is applied on top either way.
pub fn discover_and_load() -> WaygateConfig {
    let mut config = match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            match load_config(&path) {
                Ok(cfg) => cfg,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                    WaygateConfig::default()
                },
            }
        },
        None => {
            debug!("no config file found, using defaults");
            WaygateConfig::default()
        },
    };
    overlay_env(&mut config);
    config
}

/// Find the first config file in standard locations.
///
/// When a config dir override is set, only that directory is searched —
/// project-local and user-global paths are skipped for isolation.
fn find_config_file() -> Option<PathBuf> {
    if let Some(dir) = config_dir_override() {
        for name in CONFIG_FILENAMES {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
        // Override is set — don't fall through to other locations.
        return None;
    }

    // Project-local
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    // User-global: ~/.config/waygate/
    if let Some(base) = directories::BaseDirs::new() {
        let dir = base.home_dir().join(".config").join("waygate");
        for name in CONFIG_FILENAMES {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

/// Apply the legacy environment variables on top of a loaded config.
pub fn overlay_env(config: &mut WaygateConfig) {
    overlay_with(config, |name| std::env::var(name).ok());
}

/// Env overlay with an injectable lookup, for tests.
pub fn overlay_with<F>(config: &mut WaygateConfig, get: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = get("APP_PORT").and_then(|v| v.parse().ok()) {
        config.server.port = port;
    }
    if let Some(name) = get("APP_NAME") {
        config.sessions.client_name = name;
    }
    if let Some(key) = get("API_KEY") {
        config.auth.api_key = Some(key);
    }
    if let Some(max) = get("MAX_RETRIES").and_then(|v| v.parse().ok()) {
        config.sessions.max_retries = max;
    }
    if let Some(interval) = get("RECONNECT_INTERVAL").and_then(|v| v.parse().ok()) {
        config.sessions.reconnect_interval_ms = interval;
    }
    if get("NODE_ENV").as_deref() == Some("local") {
        config.server.expose_errors = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_toml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waygate.toml");
        std::fs::write(&path, "[server]\nport = 8080\n").unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.server.port, 8080);
    }

    #[test]
    fn loads_json_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waygate.json");
        std::fs::write(&path, r#"{"auth":{"api_key":"k"}}"#).unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.auth.api_key.as_deref(), Some("k"));
    }

    #[test]
    fn rejects_unknown_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waygate.ini");
        std::fs::write(&path, "port=1").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn env_overlay_applies_legacy_names() {
        let mut cfg = WaygateConfig::default();
        overlay_with(&mut cfg, |name| match name {
            "APP_PORT" => Some("4000".into()),
            "API_KEY" => Some("sekrit".into()),
            "MAX_RETRIES" => Some("2".into()),
            "RECONNECT_INTERVAL" => Some("250".into()),
            "NODE_ENV" => Some("local".into()),
            _ => None,
        });
        assert_eq!(cfg.server.port, 4000);
        assert_eq!(cfg.auth.api_key.as_deref(), Some("sekrit"));
        assert_eq!(cfg.sessions.max_retries, 2);
        assert_eq!(cfg.sessions.reconnect_interval_ms, 250);
        assert!(cfg.server.expose_errors);
    }

    #[test]
    fn env_overlay_ignores_unparseable_values() {
        let mut cfg = WaygateConfig::default();
        overlay_with(&mut cfg, |name| {
            (name == "APP_PORT").then(|| "not-a-port".into())
        });
        assert_eq!(cfg.server.port, 3000);
    }
}
