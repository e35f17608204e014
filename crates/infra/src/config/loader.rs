//! Configuration loader
//!
//! Loads [`SessionConfig`] from environment variables or files.
//!
//! ## Loading Strategy
//! 1. Reads a `.env` file into the environment, if present
//! 2. Attempts to load from `SESSIONGUARD_*` environment variables
//! 3. If the required variables are missing, falls back to a config file
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `SESSIONGUARD_AUTH_BASE_URL` (required)
//! - `SESSIONGUARD_CLIENT_KEY` (required)
//! - `SESSIONGUARD_ACCOUNT_UI_BASE_URL`
//! - `SESSIONGUARD_CUSTODY_MODE`: `cookie` or `explicit`
//! - `SESSIONGUARD_PROACTIVE_REFRESH` (true/false)
//! - `SESSIONGUARD_REFRESH_BUFFER_SECS`
//! - `SESSIONGUARD_TRANSIENT_RETRY_SECS`
//! - `SESSIONGUARD_VALIDATION_INTERVAL_SECS`
//! - `SESSIONGUARD_VISIBILITY_VALIDATION` (true/false)
//! - `SESSIONGUARD_AUTO_START_SECURITY` (true/false)
//! - `SESSIONGUARD_REQUEST_TIMEOUT_SECS`
//!
//! ## File Locations
//! The loader probes `sessionguard.{json,toml}` then `config.{json,toml}` in
//! the current directory, its parent, and next to the executable.

use std::path::{Path, PathBuf};

use sessionguard_domain::{ConfigError, CustodyMode, SessionConfig};

const CONFIG_FILE_NAMES: [&str; 4] =
    ["sessionguard.json", "sessionguard.toml", "config.json", "config.toml"];

/// Load configuration with automatic fallback strategy.
///
/// # Errors
/// Returns [`ConfigError`] if neither source yields a configuration, the
/// file format is invalid, or the result fails validation.
pub fn load() -> Result<SessionConfig, ConfigError> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded .env file");
    }

    let config = match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            config
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)?
        }
    };
    config.validate()?;
    Ok(config)
}

/// Load configuration from `SESSIONGUARD_*` environment variables.
///
/// Unset optional variables keep their defaults.
///
/// # Errors
/// Returns [`ConfigError::Missing`] when a required variable is unset and
/// [`ConfigError::Invalid`] when a value cannot be parsed.
pub fn load_from_env() -> Result<SessionConfig, ConfigError> {
    let defaults = SessionConfig::default();

    let custody_mode = std::env::var("SESSIONGUARD_CUSTODY_MODE")
        .ok()
        .map(|raw| {
            raw.parse::<CustodyMode>().map_err(|message| ConfigError::Invalid {
                field: "custody_mode",
                message,
            })
        })
        .transpose()?;

    Ok(SessionConfig {
        auth_base_url: env_var("SESSIONGUARD_AUTH_BASE_URL", "auth_base_url")?,
        client_key: env_var("SESSIONGUARD_CLIENT_KEY", "client_key")?,
        account_ui_base_url: std::env::var("SESSIONGUARD_ACCOUNT_UI_BASE_URL").ok(),
        custody_mode,
        proactive_refresh_enabled: env_bool(
            "SESSIONGUARD_PROACTIVE_REFRESH",
            defaults.proactive_refresh_enabled,
        ),
        refresh_buffer_secs: env_u64(
            "SESSIONGUARD_REFRESH_BUFFER_SECS",
            "refresh_buffer_secs",
            defaults.refresh_buffer_secs,
        )?,
        transient_retry_secs: env_u64(
            "SESSIONGUARD_TRANSIENT_RETRY_SECS",
            "transient_retry_secs",
            defaults.transient_retry_secs,
        )?,
        validation_interval_secs: env_u64(
            "SESSIONGUARD_VALIDATION_INTERVAL_SECS",
            "validation_interval_secs",
            defaults.validation_interval_secs,
        )?,
        visibility_validation_enabled: env_bool(
            "SESSIONGUARD_VISIBILITY_VALIDATION",
            defaults.visibility_validation_enabled,
        ),
        auto_start_security: env_bool(
            "SESSIONGUARD_AUTO_START_SECURITY",
            defaults.auto_start_security,
        ),
        request_timeout_secs: env_u64(
            "SESSIONGUARD_REQUEST_TIMEOUT_SECS",
            "request_timeout_secs",
            defaults.request_timeout_secs,
        )?,
    })
}

/// Load configuration from a file.
///
/// If `path` is `None`, probes the standard locations with
/// [`probe_config_paths`]. The format follows the file extension.
///
/// # Errors
/// Returns [`ConfigError::Load`] if the file is missing, unreadable or
/// malformed.
pub fn load_from_file(path: Option<PathBuf>) -> Result<SessionConfig, ConfigError> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::Load(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            ConfigError::Load("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| ConfigError::Load(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<SessionConfig, ConfigError> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| ConfigError::Load(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| ConfigError::Load(format!("Invalid JSON format: {e}"))),
        _ => Err(ConfigError::Load(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing config file in the standard locations, if any.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd.join(".."));
        dirs.insert(0, cwd);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            dirs.push(exe_dir.to_path_buf());
        }
    }

    dirs.iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.exists())
}

/// Get a required environment variable.
fn env_var(key: &str, field: &'static str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(field)),
    }
}

/// Parse an optional numeric environment variable.
fn env_u64(key: &str, field: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::Invalid { field, message: format!("{raw:?}: {e}") }),
        Err(_) => Ok(default),
    }
}

/// Parse boolean from environment variable.
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive).
/// Returns `default` if not set.
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use once_cell::sync::Lazy;
    use tempfile::NamedTempFile;

    use super::*;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const ALL_VARS: [&str; 11] = [
        "SESSIONGUARD_AUTH_BASE_URL",
        "SESSIONGUARD_CLIENT_KEY",
        "SESSIONGUARD_ACCOUNT_UI_BASE_URL",
        "SESSIONGUARD_CUSTODY_MODE",
        "SESSIONGUARD_PROACTIVE_REFRESH",
        "SESSIONGUARD_REFRESH_BUFFER_SECS",
        "SESSIONGUARD_TRANSIENT_RETRY_SECS",
        "SESSIONGUARD_VALIDATION_INTERVAL_SECS",
        "SESSIONGUARD_VISIBILITY_VALIDATION",
        "SESSIONGUARD_AUTO_START_SECURITY",
        "SESSIONGUARD_REQUEST_TIMEOUT_SECS",
    ];

    fn clear_env() {
        for key in ALL_VARS {
            std::env::remove_var(key);
        }
    }

    fn write_temp(contents: &str, extension: &str) -> (NamedTempFile, PathBuf) {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        let path = temp_file.path().with_extension(extension);
        std::fs::copy(temp_file.path(), &path).unwrap();
        (temp_file, path)
    }

    #[test]
    fn test_env_bool_parsing() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");

        for value in ["1", "true", "YES", "on"] {
            std::env::set_var("SESSIONGUARD_TEST_BOOL", value);
            assert!(env_bool("SESSIONGUARD_TEST_BOOL", false), "{value} should be true");
        }
        for value in ["0", "false", "no", "off", "maybe"] {
            std::env::set_var("SESSIONGUARD_TEST_BOOL", value);
            assert!(!env_bool("SESSIONGUARD_TEST_BOOL", true), "{value} should be false");
        }

        std::env::remove_var("SESSIONGUARD_TEST_BOOL");
        assert!(env_bool("SESSIONGUARD_TEST_BOOL", true));
        assert!(!env_bool("SESSIONGUARD_TEST_BOOL", false));
    }

    #[test]
    fn test_load_from_env_all_vars_set() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("SESSIONGUARD_AUTH_BASE_URL", "http://localhost:8080/auth");
        std::env::set_var("SESSIONGUARD_CLIENT_KEY", "portal");
        std::env::set_var("SESSIONGUARD_ACCOUNT_UI_BASE_URL", "http://localhost:4000");
        std::env::set_var("SESSIONGUARD_CUSTODY_MODE", "Cookie");
        std::env::set_var("SESSIONGUARD_PROACTIVE_REFRESH", "false");
        std::env::set_var("SESSIONGUARD_REFRESH_BUFFER_SECS", "120");
        std::env::set_var("SESSIONGUARD_TRANSIENT_RETRY_SECS", "10");
        std::env::set_var("SESSIONGUARD_VALIDATION_INTERVAL_SECS", "600");
        std::env::set_var("SESSIONGUARD_VISIBILITY_VALIDATION", "off");
        std::env::set_var("SESSIONGUARD_AUTO_START_SECURITY", "no");
        std::env::set_var("SESSIONGUARD_REQUEST_TIMEOUT_SECS", "5");

        let result = load_from_env();
        clear_env();

        let config = result.expect("config from env");
        assert_eq!(config.auth_base_url, "http://localhost:8080/auth");
        assert_eq!(config.client_key, "portal");
        assert_eq!(config.account_ui_base_url.as_deref(), Some("http://localhost:4000"));
        assert_eq!(config.resolved_custody_mode(), CustodyMode::Cookie);
        assert!(!config.proactive_refresh_enabled);
        assert_eq!(config.refresh_buffer_secs, 120);
        assert_eq!(config.transient_retry_secs, 10);
        assert_eq!(config.validation_interval_secs, 600);
        assert!(!config.visibility_validation_enabled);
        assert!(!config.auto_start_security);
        assert_eq!(config.request_timeout_secs, 5);
    }

    #[test]
    fn test_load_from_env_defaults_optional_values() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("SESSIONGUARD_AUTH_BASE_URL", "https://auth.example.com");
        std::env::set_var("SESSIONGUARD_CLIENT_KEY", "portal");

        let result = load_from_env();
        clear_env();

        let config = result.expect("config from env");
        assert_eq!(
            config,
            SessionConfig::new("https://auth.example.com", "portal"),
            "unset variables should keep defaults"
        );
    }

    #[test]
    fn test_load_from_env_missing_var() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("SESSIONGUARD_AUTH_BASE_URL", "https://auth.example.com");

        let result = load_from_env();
        clear_env();

        assert_eq!(result, Err(ConfigError::Missing("client_key")));
    }

    #[test]
    fn test_load_from_env_invalid_values() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("SESSIONGUARD_AUTH_BASE_URL", "https://auth.example.com");
        std::env::set_var("SESSIONGUARD_CLIENT_KEY", "portal");
        std::env::set_var("SESSIONGUARD_REFRESH_BUFFER_SECS", "soon");
        let number = load_from_env();

        std::env::remove_var("SESSIONGUARD_REFRESH_BUFFER_SECS");
        std::env::set_var("SESSIONGUARD_CUSTODY_MODE", "keychain");
        let custody = load_from_env();
        clear_env();

        assert!(matches!(
            number,
            Err(ConfigError::Invalid { field: "refresh_buffer_secs", .. })
        ));
        assert!(matches!(custody, Err(ConfigError::Invalid { field: "custody_mode", .. })));
    }

    #[test]
    fn test_load_from_file_json() {
        let (_temp, path) = write_temp(
            r#"{
                "auth_base_url": "https://auth.example.com",
                "client_key": "portal",
                "custody_mode": "explicit",
                "validation_interval_secs": 900
            }"#,
            "json",
        );

        let config = load_from_file(Some(path.clone())).expect("config from JSON");
        std::fs::remove_file(path).ok();

        assert_eq!(config.client_key, "portal");
        assert_eq!(config.custody_mode, Some(CustodyMode::Explicit));
        assert_eq!(config.validation_interval_secs, 900);
        assert_eq!(config.refresh_buffer_secs, 60);
    }

    #[test]
    fn test_load_from_file_toml() {
        let (_temp, path) = write_temp(
            r#"
auth_base_url = "http://localhost:8080"
client_key = "portal"
auto_start_security = false
"#,
            "toml",
        );

        let config = load_from_file(Some(path.clone())).expect("config from TOML");
        std::fs::remove_file(path).ok();

        assert_eq!(config.auth_base_url, "http://localhost:8080");
        assert!(!config.auto_start_security);
        assert_eq!(config.resolved_custody_mode(), CustodyMode::Explicit);
    }

    #[test]
    fn test_load_from_file_not_found() {
        let result = load_from_file(Some(PathBuf::from("/nonexistent/sessionguard.json")));
        assert!(matches!(result, Err(ConfigError::Load(_))), "Should fail when file not found");
    }

    #[test]
    fn test_load_from_file_invalid_json() {
        let (_temp, path) = write_temp(r#"{ "auth_base_url": "#, "json");

        let result = load_from_file(Some(path.clone()));
        std::fs::remove_file(path).ok();

        assert!(matches!(
            result,
            Err(ConfigError::Load(message)) if message.starts_with("Invalid JSON")
        ));
    }

    #[test]
    fn test_parse_config_unsupported_format() {
        let result = parse_config("auth_base_url: x", Path::new("sessionguard.yaml"));
        assert_eq!(result, Err(ConfigError::Load("Unsupported config format: yaml".into())));
    }
}
