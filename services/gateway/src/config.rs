use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// JSON configuration file written next to the binary.
pub const CONFIG_FILE_NAME: &str = ".whagons-config.json";
/// Optional env file with `KEY=VALUE` lines.
pub const ENV_FILE_NAME: &str = ".env";

/// Gateway configuration sourced from an env file, the JSON config file, and
/// process environment variables, in that order (later sources win).
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    // Shared Postgres endpoint for the landlord and every tenant database.
    pub db_host: String,
    pub db_port: u16,
    pub db_username: String,
    pub db_password: String,
    // Landlord database name; tenants are enumerated there.
    pub db_landlord: String,
    // HTTP + WebSocket bind port.
    pub server_port: u16,
    // Prometheus scrape endpoint.
    pub metrics_bind: SocketAddr,
    // NOTIFY channel each tenant database emits row changes on.
    pub tenant_channel: String,
    // NOTIFY channel the landlord emits tenant add/remove on.
    pub landlord_channel: String,
    // Negotiating sessions are closed after this long without an inbound frame.
    pub negotiation_timeout: Duration,
    // Liveness sweep cadence over both session tables.
    pub reaper_interval: Duration,
    // Listener liveness ping after this long without traffic. Tunable; some
    // intermediaries drop idle connections faster than the 90 s default.
    pub idle_ping_interval: Duration,
    // Positive token cache lifetime, also the sweeper cadence.
    pub cache_ttl: Duration,
}

/// Optional overrides from `.whagons-config.json`. Field names match the file
/// the interactive setup of earlier deployments wrote.
#[derive(Debug, Default, Deserialize)]
struct ConfigFileOverride {
    db_host: Option<String>,
    db_port: Option<String>,
    db_username: Option<String>,
    db_password: Option<String>,
    db_landlord: Option<String>,
    server_port: Option<String>,
}

impl GatewayConfig {
    /// Loads configuration from the conventional file names in the working
    /// directory plus the process environment.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(ENV_FILE_NAME), Path::new(CONFIG_FILE_NAME))
    }

    /// Same as [`GatewayConfig::load`] with explicit file locations.
    pub fn load_from(env_file: &Path, config_file: &Path) -> Result<Self> {
        let env_file_values = read_env_file(env_file)?;
        let file_override = read_config_file(config_file)?;

        let lookup = |key: &str, file_value: Option<&String>| -> Option<String> {
            // Process environment wins, then the JSON file, then the env file.
            std::env::var(key)
                .ok()
                .filter(|value| !value.is_empty())
                .or_else(|| file_value.cloned())
                .or_else(|| env_file_values.get(key).cloned())
        };

        let db_host =
            lookup("DB_HOST", file_override.db_host.as_ref()).unwrap_or_else(|| "127.0.0.1".into());
        let db_port = lookup("DB_PORT", file_override.db_port.as_ref())
            .unwrap_or_else(|| "5432".into())
            .parse::<u16>()
            .context("parse DB_PORT")?;
        let db_username = lookup("DB_USERNAME", file_override.db_username.as_ref())
            .unwrap_or_else(|| "postgres".into());
        let db_password =
            lookup("DB_PASSWORD", file_override.db_password.as_ref()).unwrap_or_default();
        let db_landlord = lookup("DB_LANDLORD", file_override.db_landlord.as_ref())
            .unwrap_or_else(|| "landlord".into());
        let server_port = lookup("SERVER_PORT", file_override.server_port.as_ref())
            .unwrap_or_else(|| "8082".into())
            .parse::<u16>()
            .context("parse SERVER_PORT")?;
        let metrics_bind = lookup("GATEWAY_METRICS_BIND", None)
            .unwrap_or_else(|| "0.0.0.0:9090".into())
            .parse::<SocketAddr>()
            .context("parse GATEWAY_METRICS_BIND")?;
        let tenant_channel =
            lookup("GATEWAY_TENANT_CHANNEL", None).unwrap_or_else(|| "whagons_tasks_changes".into());
        let landlord_channel =
            lookup("GATEWAY_LANDLORD_CHANNEL", None).unwrap_or_else(|| "tenant_changes".into());
        let idle_ping_interval = lookup("GATEWAY_IDLE_PING_SECS", None)
            .unwrap_or_else(|| "90".into())
            .parse::<u64>()
            .map(Duration::from_secs)
            .context("parse GATEWAY_IDLE_PING_SECS")?;

        if db_password.is_empty() {
            tracing::warn!("DB_PASSWORD is not set; database connections may fail");
        }

        Ok(Self {
            db_host,
            db_port,
            db_username,
            db_password,
            db_landlord,
            server_port,
            metrics_bind,
            tenant_channel,
            landlord_channel,
            negotiation_timeout: Duration::from_secs(15),
            reaper_interval: Duration::from_secs(30),
            idle_ping_interval,
            cache_ttl: Duration::from_secs(5 * 60),
        })
    }
}

/// Parses `KEY=VALUE` lines; `#` comments and blank lines are skipped.
fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut values = HashMap::new();
    if !path.exists() {
        return Ok(values);
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read env file {}", path.display()))?;
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            values.insert(
                key.trim().to_string(),
                value.trim().trim_matches('"').to_string(),
            );
        }
    }
    Ok(values)
}

fn read_config_file(path: &Path) -> Result<ConfigFileOverride> {
    if !path.exists() {
        return Ok(ConfigFileOverride::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read config file {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    // Helper to clear the env vars this module reads.
    fn clear_gateway_env() {
        for key in [
            "DB_HOST",
            "DB_PORT",
            "DB_USERNAME",
            "DB_PASSWORD",
            "DB_LANDLORD",
            "SERVER_PORT",
            "GATEWAY_METRICS_BIND",
            "GATEWAY_TENANT_CHANNEL",
            "GATEWAY_LANDLORD_CHANNEL",
            "GATEWAY_IDLE_PING_SECS",
        ] {
            unsafe {
                env::remove_var(key);
            }
        }
    }

    fn missing_paths(dir: &TempDir) -> (std::path::PathBuf, std::path::PathBuf) {
        (dir.path().join(".env"), dir.path().join("config.json"))
    }

    #[serial]
    #[test]
    fn defaults_when_nothing_is_set() {
        clear_gateway_env();
        let dir = TempDir::new().unwrap();
        let (env_file, config_file) = missing_paths(&dir);
        let config = GatewayConfig::load_from(&env_file, &config_file).expect("load");
        assert_eq!(config.db_host, "127.0.0.1");
        assert_eq!(config.db_port, 5432);
        assert_eq!(config.db_username, "postgres");
        assert_eq!(config.db_landlord, "landlord");
        assert_eq!(config.server_port, 8082);
        assert_eq!(config.tenant_channel, "whagons_tasks_changes");
        assert_eq!(config.landlord_channel, "tenant_changes");
        assert_eq!(config.negotiation_timeout, Duration::from_secs(15));
        assert_eq!(config.reaper_interval, Duration::from_secs(30));
        assert_eq!(config.idle_ping_interval, Duration::from_secs(90));
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
    }

    #[serial]
    #[test]
    fn config_file_overrides_defaults() {
        clear_gateway_env();
        let dir = TempDir::new().unwrap();
        let (env_file, config_file) = missing_paths(&dir);
        fs::write(
            &config_file,
            r#"{"db_host": "db.internal", "server_port": "9000"}"#,
        )
        .unwrap();
        let config = GatewayConfig::load_from(&env_file, &config_file).expect("load");
        assert_eq!(config.db_host, "db.internal");
        assert_eq!(config.server_port, 9000);
        // Untouched keys keep their defaults.
        assert_eq!(config.db_port, 5432);
    }

    #[serial]
    #[test]
    fn env_file_fills_gaps_but_loses_to_config_file() {
        clear_gateway_env();
        let dir = TempDir::new().unwrap();
        let (env_file, config_file) = missing_paths(&dir);
        fs::write(
            &env_file,
            "# local overrides\nDB_HOST=envfile-host\nDB_PASSWORD=\"hunter2\"\n",
        )
        .unwrap();
        fs::write(&config_file, r#"{"db_host": "file-host"}"#).unwrap();
        let config = GatewayConfig::load_from(&env_file, &config_file).expect("load");
        assert_eq!(config.db_host, "file-host");
        assert_eq!(config.db_password, "hunter2");
    }

    #[serial]
    #[test]
    fn process_env_wins_over_files() {
        clear_gateway_env();
        let dir = TempDir::new().unwrap();
        let (env_file, config_file) = missing_paths(&dir);
        fs::write(&config_file, r#"{"db_host": "file-host"}"#).unwrap();
        unsafe {
            env::set_var("DB_HOST", "env-host");
            env::set_var("GATEWAY_IDLE_PING_SECS", "30");
        }
        let config = GatewayConfig::load_from(&env_file, &config_file).expect("load");
        assert_eq!(config.db_host, "env-host");
        assert_eq!(config.idle_ping_interval, Duration::from_secs(30));
        clear_gateway_env();
    }

    #[serial]
    #[test]
    fn invalid_port_fails() {
        clear_gateway_env();
        let dir = TempDir::new().unwrap();
        let (env_file, config_file) = missing_paths(&dir);
        unsafe {
            env::set_var("SERVER_PORT", "not-a-port");
        }
        let result = GatewayConfig::load_from(&env_file, &config_file);
        assert!(result.is_err());
        clear_gateway_env();
    }

    #[serial]
    #[test]
    fn invalid_config_file_fails() {
        clear_gateway_env();
        let dir = TempDir::new().unwrap();
        let (env_file, config_file) = missing_paths(&dir);
        fs::write(&config_file, "{not json").unwrap();
        assert!(GatewayConfig::load_from(&env_file, &config_file).is_err());
    }
}
