use anyhow::anyhow;
use chrono_tz::Tz;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_PORT: u16 = 9003;
pub const DEFAULT_SCHEDULE: &str = "0 */5 * * * *";
pub const DEFAULT_STORE_CAPACITY: usize = 100;
const DEFAULT_CONFIG_FILE: &str = "server_nudge.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Wellness nudge push server", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "NUDGE_PORT", help = "Port to listen on for client connections.")]
    pub port: Option<u16>,

    #[clap(long, env = "NUDGE_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "NUDGE_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "NUDGE_LOG_LEVEL", help = "Logging level or filter (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "NUDGE_CONTEXTS_PATH", help = "JSON file with one UserContext snapshot per user.")]
    pub contexts_path: Option<PathBuf>,

    #[clap(long, env = "NUDGE_SCHEDULE", help = "Cron schedule (6 fields, with seconds) for nudge evaluation.")]
    pub schedule: Option<String>,

    #[clap(long, env = "NUDGE_TIMEZONE", help = "IANA timezone the schedule and rule clock run in.")]
    pub timezone: Option<String>,

    #[clap(long, env = "NUDGE_DISABLED_RULES", value_delimiter = ',', help = "Comma-separated rule ids to switch off.")]
    pub disabled_rules: Option<Vec<String>>,

    #[clap(long, env = "NUDGE_STORE_CAPACITY", help = "Missed notifications kept per user.")]
    pub store_capacity: Option<usize>,

    #[clap(long, env = "TLS_CERT_PATH", help = "Path to the TLS certificate file.")]
    pub tls_cert_path: Option<PathBuf>,

    #[clap(long, env = "TLS_KEY_PATH", help = "Path to the TLS private key file.")]
    pub tls_key_path: Option<PathBuf>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            contexts_path: other.contexts_path.or(self.contexts_path),
            schedule: other.schedule.or(self.schedule),
            timezone: other.timezone.or(self.timezone),
            disabled_rules: other.disabled_rules.or(self.disabled_rules),
            store_capacity: other.store_capacity.or(self.store_capacity),
            tls_cert_path: other.tls_cert_path.or(self.tls_cert_path),
            tls_key_path: other.tls_key_path.or(self.tls_key_path),
        }
    }

    pub fn defaults() -> Config {
        Config {
            port: Some(DEFAULT_PORT),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            contexts_path: Some(PathBuf::from("./contexts.json")),
            schedule: Some(DEFAULT_SCHEDULE.to_string()),
            timezone: Some("UTC".to_string()),
            store_capacity: Some(DEFAULT_STORE_CAPACITY),
            ..Default::default()
        }
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| PathBuf::from("./logs"))
    }

    pub fn log_level(&self) -> String {
        self.log_level.clone().unwrap_or_else(|| "info".to_string())
    }

    pub fn contexts_path(&self) -> PathBuf {
        self.contexts_path.clone().unwrap_or_else(|| PathBuf::from("./contexts.json"))
    }

    pub fn schedule(&self) -> String {
        self.schedule.clone().unwrap_or_else(|| DEFAULT_SCHEDULE.to_string())
    }

    pub fn disabled_rules(&self) -> Vec<String> {
        self.disabled_rules.clone().unwrap_or_default()
    }

    pub fn store_capacity(&self) -> usize {
        self.store_capacity.unwrap_or(DEFAULT_STORE_CAPACITY)
    }

    pub fn timezone(&self) -> anyhow::Result<Tz> {
        let name = self.timezone.as_deref().unwrap_or("UTC");
        name.parse::<Tz>()
            .map_err(|e| anyhow!("Invalid timezone '{}': {}", name, e))
    }

    /// Certificate and key paths, when both are configured.
    pub fn tls_paths(&self) -> Option<(PathBuf, PathBuf)> {
        match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(cert), Some(key)) => Some((cert.clone(), key.clone())),
            _ => None,
        }
    }
}

pub fn load_config() -> Config {
    resolve(Config::parse())
}

/// Layers defaults < config file < environment/CLI.
pub fn resolve(cli: Config) -> Config {
    // 1. Load defaults
    let mut current_config = Config::defaults();

    // 2. Load from config file (server_nudge.conf) if present.
    //    The CLI may point somewhere else.
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    if let Some(file_config) = read_config_file(&config_file_path) {
        current_config = current_config.merge(file_config);
    }

    // 3. Override with environment variables and CLI arguments
    //    clap::Parser already folded env vars into `cli`.
    current_config = current_config.merge(cli);

    // 4. Fall back to LetsEncrypt certificates under $HOME, but only if they exist
    if current_config.tls_paths().is_none() {
        if let Some(home_dir) = dirs::home_dir() {
            let letsencrypt_dir = home_dir.join(".letsencrypt");
            let cert = letsencrypt_dir.join("fullchain.pem");
            let key = letsencrypt_dir.join("privkey.pem");
            if cert.exists() && key.exists() {
                current_config.tls_cert_path = Some(cert);
                current_config.tls_key_path = Some(key);
            }
        }
    }

    current_config
}

// Logging is not up yet while the config loads, so problems go to stderr.
fn read_config_file(path: &Path) -> Option<Config> {
    if !path.exists() {
        return None;
    }
    let config_str = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to read config file {}: {}. Falling back to other sources.", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str::<Config>(&config_str) {
        Ok(config) => Some(config),
        Err(e) => {
            eprintln!("Failed to parse config file {}: {}. Falling back to other sources.", path.display(), e);
            None
        }
    }
}
