//! Service configuration: defaults, optional YAML file, env overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::store::ChannelStore;

const ENV_PREFIX: &str = "CHANNEL_PROBE_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// A channel declared in the config file and synced into the store on boot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedChannel {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub tokens: Vec<SeedToken>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedToken {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub api_key: String,
}

/// On-disk shape; every field optional so partial files work.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    db_path: Option<PathBuf>,
    scan_interval_hours: Option<u64>,
    request_timeout_secs: Option<u64>,
    run_once: Option<bool>,
    log_format: Option<LogFormat>,
    #[serde(default)]
    channels: Vec<SeedChannel>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub scan_interval_hours: u64,
    /// Transport timeout for probes. None leaves requests unbounded.
    pub request_timeout_secs: Option<u64>,
    pub run_once: bool,
    pub log_format: LogFormat,
    pub channels: Vec<SeedChannel>,
}

impl Config {
    fn defaults(data_dir: PathBuf) -> Self {
        Self {
            db_path: data_dir.join("channels.db"),
            scan_interval_hours: 24,
            request_timeout_secs: None,
            run_once: false,
            log_format: LogFormat::Pretty,
            channels: Vec::new(),
            data_dir,
        }
    }

    /// Defaults → config file → environment.
    pub fn load() -> Result<Self> {
        let env = |name: &str| std::env::var(format!("{}{}", ENV_PREFIX, name)).ok();

        let data_dir = env("DATA_DIR").map(PathBuf::from).unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".channel-probe")
        });
        let mut config = Self::defaults(data_dir);

        let file = env("CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| config.data_dir.join("config.yaml"));
        if file.exists() {
            config.merge_file(&file)?;
        }

        config.apply_env(env)?;
        Ok(config)
    }

    fn merge_file(&mut self, path: &Path) -> Result<()> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let file: FileConfig = serde_yaml::from_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        self.merge(file);
        Ok(())
    }

    fn merge(&mut self, file: FileConfig) {
        if let Some(p) = file.db_path {
            self.db_path = p;
        }
        if let Some(h) = file.scan_interval_hours {
            self.scan_interval_hours = h;
        }
        if file.request_timeout_secs.is_some() {
            self.request_timeout_secs = file.request_timeout_secs;
        }
        if let Some(r) = file.run_once {
            self.run_once = r;
        }
        if let Some(f) = file.log_format {
            self.log_format = f;
        }
        self.channels = file.channels;
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(p) = env("DB") {
            self.db_path = PathBuf::from(p);
        }
        if let Some(h) = env("INTERVAL_HOURS") {
            self.scan_interval_hours = h
                .parse()
                .with_context(|| format!("{}INTERVAL_HOURS must be an integer, got {:?}", ENV_PREFIX, h))?;
        }
        if let Some(t) = env("TIMEOUT_SECS") {
            let secs: u64 = t
                .parse()
                .with_context(|| format!("{}TIMEOUT_SECS must be an integer, got {:?}", ENV_PREFIX, t))?;
            self.request_timeout_secs = (secs > 0).then_some(secs);
        }
        if let Some(r) = env("RUN_ONCE") {
            self.run_once = matches!(r.as_str(), "1" | "true" | "yes");
        }
        if let Some(f) = env("LOG_FORMAT") {
            self.log_format = if f.eq_ignore_ascii_case("json") { LogFormat::Json } else { LogFormat::Pretty };
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Write the configured channels and tokens into the store.
    pub fn seed_store(&self, store: &ChannelStore) -> Result<usize> {
        for ch in &self.channels {
            let name = ch.name.as_deref().unwrap_or(&ch.id);
            store.upsert_channel(&ch.id, name, &ch.base_url, ch.api_key.as_deref())?;
            for t in &ch.tokens {
                store.add_token(&t.id, &ch.id, t.name.as_deref(), &t.api_key)?;
            }
        }
        Ok(self.channels.len())
    }
}
