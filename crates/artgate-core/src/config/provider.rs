//! Per-request provider configuration
//!
//! Credentials and endpoints are resolved fresh for every request from the
//! environment plus optional bring-your-own-key overrides, and never cached:
//! keys from one tenant must not leak into another tenant's request.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::GenerationSettings;
use super::credentials::{self as env, CredentialStore, EnvCredentials};
use crate::error::{Error, Result};
use crate::providers::PollPolicy;
use crate::routing::ProviderName;

/// Default local ComfyUI address
pub const DEFAULT_COMFYUI_HOST: &str = "http://127.0.0.1:8188";

/// Anonymous Stable Horde key, always accepted at the lowest priority
pub const STABLE_HORDE_ANONYMOUS_KEY: &str = "0000000000";

/// Resolved credentials and endpoints for one adapter invocation
#[derive(Clone)]
pub struct ProviderConfig {
    /// API key, empty for keyless providers
    pub api_key: String,
    /// Base URL of a self-hosted ComfyUI server
    pub comfyui_host: String,
    /// Overall budget for one generation, including polling
    pub timeout_ms: u64,
    /// Replaces the vendor's API base URL (proxies, test doubles)
    pub base_url: Option<String>,
    /// Replaces the vendor's default poll schedule
    pub poll: Option<PollPolicy>,
    /// Cooperative cancellation for in-flight requests and poll loops
    pub cancel: CancellationToken,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("comfyui_host", &self.comfyui_host)
            .field("timeout_ms", &self.timeout_ms)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            comfyui_host: DEFAULT_COMFYUI_HOST.to_string(),
            timeout_ms: GenerationSettings::default().timeout_ms,
            base_url: None,
            poll: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl ProviderConfig {
    /// Config with only an API key set
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Point the adapter at a different base URL
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Override the poll schedule
    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll = Some(policy);
        self
    }

    /// Set the overall timeout
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Thread a cancellation token through the adapter
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The overall timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// `base_url` if set, otherwise the vendor default
    pub fn base_url_or(&self, default: &str) -> String {
        self.base_url
            .as_deref()
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }
}

/// Build a provider config from the environment and optional BYOK overrides
pub fn resolve_provider_config(
    provider: ProviderName,
    byok_key: Option<&str>,
    byok_host: Option<&str>,
) -> ProviderConfig {
    resolve_provider_config_with(
        &EnvCredentials,
        &GenerationSettings::default(),
        provider,
        byok_key,
        byok_host,
    )
}

/// Build a provider config from an explicit credential store and settings
///
/// Non-blank BYOK values always win over the environment; the environment
/// wins over the settings file.
pub fn resolve_provider_config_with(
    credentials: &dyn CredentialStore,
    settings: &GenerationSettings,
    provider: ProviderName,
    byok_key: Option<&str>,
    byok_host: Option<&str>,
) -> ProviderConfig {
    let byok_key = non_blank(byok_key);
    let byok_host = non_blank(byok_host);

    let env_key = match provider {
        ProviderName::Pollinations | ProviderName::ComfyUi => None,
        other => other
            .credential_env()
            .and_then(|name| credentials.get(name))
            .filter(|v| !v.trim().is_empty()),
    };

    let api_key = match (byok_key, env_key) {
        (Some(key), _) => key.to_string(),
        (None, Some(key)) => key,
        (None, None) if provider == ProviderName::StableHorde => {
            STABLE_HORDE_ANONYMOUS_KEY.to_string()
        }
        (None, None) => String::new(),
    };

    let comfyui_host = byok_host
        .map(str::to_string)
        .or_else(|| {
            credentials
                .get(env::COMFYUI_HOST)
                .filter(|v| !v.trim().is_empty())
        })
        .or_else(|| settings.comfyui_host.clone())
        .unwrap_or_else(|| DEFAULT_COMFYUI_HOST.to_string())
        .trim()
        .trim_end_matches('/')
        .to_string();

    let timeout_ms = credentials
        .get(env::GENERATION_TIMEOUT_MS)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .unwrap_or(settings.timeout_ms);

    ProviderConfig {
        api_key,
        comfyui_host,
        timeout_ms,
        ..Default::default()
    }
}

/// Fail fast when a cloud provider has no credential
///
/// No-op for keyless and self-hosted providers.
pub fn assert_key_present(provider: ProviderName, config: &ProviderConfig) -> Result<()> {
    if provider.requires_api_key() && config.api_key.trim().is_empty() {
        let env_var = provider.credential_env().unwrap_or("API key");
        return Err(Error::MissingCredential { provider, env_var });
    }
    Ok(())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn redact(key: &str) -> String {
    if key.is_empty() {
        "(none)".to_string()
    } else {
        let count = key.chars().count();
        if count <= 4 {
            return "***".to_string();
        }
        let tail: String = key.chars().skip(count - 4).collect();
        format!("***{}", tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::credentials::StaticCredentials;

    fn resolve(
        creds: &StaticCredentials,
        provider: ProviderName,
        key: Option<&str>,
        host: Option<&str>,
    ) -> ProviderConfig {
        resolve_provider_config_with(creds, &GenerationSettings::default(), provider, key, host)
    }

    #[test]
    fn test_byok_key_beats_environment_for_every_provider() {
        let mut creds = StaticCredentials::new();
        for provider in ProviderName::ALL {
            if let Some(name) = provider.credential_env() {
                creds = creds.with(name, "from-env");
            }
        }

        for provider in ProviderName::ALL {
            let config = resolve(&creds, provider, Some("from-byok"), Some("http://byok:9000"));
            if !matches!(provider, ProviderName::Pollinations | ProviderName::ComfyUi) {
                assert_eq!(config.api_key, "from-byok", "{}", provider);
            }
            assert_eq!(config.comfyui_host, "http://byok:9000", "{}", provider);
        }
    }

    #[test]
    fn test_environment_used_without_byok() {
        let creds = StaticCredentials::new()
            .with(env::REPLICATE_API_TOKEN, "r8_env")
            .with(env::COMFYUI_HOST, "http://gpu-box:8188/");
        let config = resolve(&creds, ProviderName::Replicate, None, None);
        assert_eq!(config.api_key, "r8_env");
        assert_eq!(config.comfyui_host, "http://gpu-box:8188");
    }

    #[test]
    fn test_blank_byok_is_ignored() {
        let creds = StaticCredentials::new().with(env::FAL_KEY, "fal_env");
        let config = resolve(&creds, ProviderName::Fal, Some("  "), Some(""));
        assert_eq!(config.api_key, "fal_env");
        assert_eq!(config.comfyui_host, DEFAULT_COMFYUI_HOST);
    }

    #[test]
    fn test_stable_horde_falls_back_to_anonymous_key() {
        let config = resolve(&StaticCredentials::new(), ProviderName::StableHorde, None, None);
        assert_eq!(config.api_key, STABLE_HORDE_ANONYMOUS_KEY);
    }

    #[test]
    fn test_timeout_from_environment() {
        let creds = StaticCredentials::new().with(env::GENERATION_TIMEOUT_MS, "45000");
        assert_eq!(resolve(&creds, ProviderName::Fal, None, None).timeout_ms, 45_000);

        let creds = StaticCredentials::new().with(env::GENERATION_TIMEOUT_MS, "soon");
        assert_eq!(
            resolve(&creds, ProviderName::Fal, None, None).timeout_ms,
            GenerationSettings::default().timeout_ms
        );
    }

    #[test]
    fn test_settings_host_used_when_env_missing() {
        let settings = GenerationSettings {
            comfyui_host: Some("http://studio:8188".to_string()),
            ..Default::default()
        };
        let config = resolve_provider_config_with(
            &StaticCredentials::new(),
            &settings,
            ProviderName::ComfyUi,
            None,
            None,
        );
        assert_eq!(config.comfyui_host, "http://studio:8188");
    }

    #[test]
    fn test_assert_key_present() {
        let empty = ProviderConfig::default();
        let err = assert_key_present(ProviderName::Together, &empty).unwrap_err();
        assert!(err.to_string().contains("TOGETHER_API_KEY"));

        assert!(assert_key_present(ProviderName::Pollinations, &empty).is_ok());
        assert!(assert_key_present(ProviderName::ComfyUi, &empty).is_ok());
        assert!(assert_key_present(ProviderName::StableHorde, &empty).is_ok());
        assert!(
            assert_key_present(ProviderName::Together, &ProviderConfig::with_api_key("k")).is_ok()
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = ProviderConfig::with_api_key("r8_supersecret1234");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("supersecret"));
        assert!(debug.contains("***1234"));
    }
}
