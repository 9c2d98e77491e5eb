//! Configuration management with file persistence
//!
//! The config file holds tuning only (timeouts, ComfyUI host,
//! poll schedule, routing defaults). API keys are read from the environment
//! or supplied per request and are never written to disk.

pub mod credentials;
mod provider;

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::providers::PollPolicy;

pub use provider::{
    DEFAULT_COMFYUI_HOST, ProviderConfig, STABLE_HORDE_ANONYMOUS_KEY, assert_key_present,
    resolve_provider_config, resolve_provider_config_with,
};

/// Artgate configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub generation: GenerationSettings,
    #[serde(default)]
    pub polling: PollingSettings,
    #[serde(default)]
    pub routing: RoutingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Overall budget per generation; `GENERATION_TIMEOUT_MS` overrides it
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// ComfyUI server; `COMFYUI_HOST` overrides it
    #[serde(default)]
    pub comfyui_host: Option<String>,
}

/// Overrides for the vendor poll schedules; unset fields keep vendor defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollingSettings {
    #[serde(default)]
    pub initial_delay_ms: Option<u64>,
    #[serde(default)]
    pub multiplier: Option<f64>,
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingSettings {
    #[serde(default = "default_mode")]
    pub default_mode: String,
    #[serde(default)]
    pub prefer_hd: bool,
}

fn default_timeout_ms() -> u64 {
    300_000
}

fn default_mode() -> String {
    "pixel".to_string()
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            comfyui_host: None,
        }
    }
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            default_mode: default_mode(),
            prefer_hd: false,
        }
    }
}

impl PollingSettings {
    /// Whether any field overrides the vendor schedule
    pub fn is_set(&self) -> bool {
        self.initial_delay_ms.is_some() || self.multiplier.is_some() || self.max_delay_ms.is_some()
    }

    /// Apply the overrides on top of a vendor schedule
    pub fn apply(&self, base: PollPolicy) -> PollPolicy {
        PollPolicy {
            initial_delay: self
                .initial_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(base.initial_delay),
            multiplier: self.multiplier.unwrap_or(base.multiplier),
            max_delay: self
                .max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(base.max_delay),
            deadline: base.deadline,
        }
    }
}

const KEYS: [&str; 7] = [
    "generation.timeout_ms",
    "generation.comfyui_host",
    "polling.initial_delay_ms",
    "polling.multiplier",
    "polling.max_delay_ms",
    "routing.default_mode",
    "routing.prefer_hd",
];

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("ARTGATE_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("artgate")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or the defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from TOML text
    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default path
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &std::path::Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.generation.timeout_ms == 0 {
            return Err(anyhow!("generation.timeout_ms must be greater than zero"));
        }
        if let Some(m) = self.polling.multiplier
            && m < 1.0
        {
            return Err(anyhow!("polling.multiplier must be at least 1.0"));
        }
        if let (Some(initial), Some(max)) = (self.polling.initial_delay_ms, self.polling.max_delay_ms)
            && initial > max
        {
            return Err(anyhow!(
                "polling.initial_delay_ms ({}) exceeds polling.max_delay_ms ({})",
                initial,
                max
            ));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        fn opt<T: ToString>(v: &Option<T>) -> String {
            v.as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "(vendor default)".to_string())
        }

        match key {
            "generation.timeout_ms" => Ok(self.generation.timeout_ms.to_string()),
            "generation.comfyui_host" => Ok(self
                .generation
                .comfyui_host
                .clone()
                .unwrap_or_else(|| format!("(not set - defaults to {})", DEFAULT_COMFYUI_HOST))),
            "polling.initial_delay_ms" => Ok(opt(&self.polling.initial_delay_ms)),
            "polling.multiplier" => Ok(opt(&self.polling.multiplier)),
            "polling.max_delay_ms" => Ok(opt(&self.polling.max_delay_ms)),
            "routing.default_mode" => Ok(self.routing.default_mode.clone()),
            "routing.prefer_hd" => Ok(self.routing.prefer_hd.to_string()),
            k if k.ends_with("api_key") || k.ends_with("token") => Err(anyhow!(
                "API keys are not stored in configuration. Set the provider's environment variable instead."
            )),
            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `artgate config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "generation.timeout_ms" => {
                let ms: u64 = value
                    .parse()
                    .with_context(|| format!("Invalid timeout_ms value: {}", value))?;
                if ms == 0 {
                    return Err(anyhow!("timeout_ms must be greater than zero"));
                }
                self.generation.timeout_ms = ms;
            }
            "generation.comfyui_host" => {
                let host = value.trim().trim_end_matches('/');
                if !(host.starts_with("http://") || host.starts_with("https://")) {
                    return Err(anyhow!("ComfyUI host must start with http:// or https://"));
                }
                self.generation.comfyui_host = Some(host.to_string());
            }
            "polling.initial_delay_ms" => {
                self.polling.initial_delay_ms = Some(
                    value
                        .parse()
                        .with_context(|| format!("Invalid initial_delay_ms value: {}", value))?,
                );
            }
            "polling.multiplier" => {
                let m: f64 = value
                    .parse()
                    .with_context(|| format!("Invalid multiplier value: {}", value))?;
                if m < 1.0 {
                    return Err(anyhow!("Multiplier must be at least 1.0"));
                }
                self.polling.multiplier = Some(m);
            }
            "polling.max_delay_ms" => {
                self.polling.max_delay_ms = Some(
                    value
                        .parse()
                        .with_context(|| format!("Invalid max_delay_ms value: {}", value))?,
                );
            }
            "routing.default_mode" => {
                let valid_modes = ["pixel", "game", "ui", "social", "business"];
                if !valid_modes.contains(&value) {
                    return Err(anyhow!(
                        "Invalid mode: {}. Valid options: {}",
                        value,
                        valid_modes.join(", ")
                    ));
                }
                self.routing.default_mode = value.to_string();
            }
            "routing.prefer_hd" => {
                self.routing.prefer_hd = value
                    .parse()
                    .with_context(|| format!("Invalid prefer_hd value: {}", value))?;
            }
            k if k.ends_with("api_key") || k.ends_with("token") => {
                return Err(anyhow!(
                    "API keys cannot be stored in configuration for security. \
                     Set the provider's environment variable or pass a key per request instead."
                ));
            }
            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `artgate config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        KEYS.iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}
