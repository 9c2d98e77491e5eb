//! Central dispatch from provider name to adapter

use std::time::Instant;

use tracing::{info, warn};

use super::types::{GenerateParams, GenerateResult, ProviderStatus};
use crate::config::credentials::{CredentialStore, EnvCredentials};
use crate::config::{ProviderConfig, assert_key_present};
use crate::error::Result;
use crate::providers::{
    ComfyUiProvider, FalProvider, HuggingFaceProvider, ImageProvider, PollinationsProvider,
    ProdiaProvider, ReplicateProvider, StableHordeProvider, TogetherProvider,
};
use crate::routing::ProviderName;

/// Build the adapter for a provider
///
/// The match is exhaustive: a new [`ProviderName`] variant does not compile
/// until it is wired here.
pub fn adapter_for(provider: ProviderName, config: &ProviderConfig) -> Result<Box<dyn ImageProvider>> {
    Ok(match provider {
        ProviderName::Replicate => Box::new(ReplicateProvider::from_config(config)?),
        ProviderName::Fal => Box::new(FalProvider::from_config(config)?),
        ProviderName::Together => Box::new(TogetherProvider::from_config(config)?),
        ProviderName::HuggingFace => Box::new(HuggingFaceProvider::from_config(config)?),
        ProviderName::Pollinations => Box::new(PollinationsProvider::from_config(config)?),
        ProviderName::StableHorde => Box::new(StableHordeProvider::from_config(config)?),
        ProviderName::Prodia => Box::new(ProdiaProvider::from_config(config)?),
        ProviderName::ComfyUi => Box::new(ComfyUiProvider::from_config(config)?),
    })
}

/// Run one generation on a specific provider
///
/// Cloud providers without a key fail with
/// [`crate::Error::MissingCredential`] before any network call.
pub async fn generate(
    provider: ProviderName,
    params: &GenerateParams,
    config: &ProviderConfig,
) -> Result<GenerateResult> {
    assert_key_present(provider, config)?;
    let adapter = adapter_for(provider, config)?;

    let start = Instant::now();
    match adapter.generate(params).await {
        Ok(result) => {
            info!(
                %provider,
                tool = %params.tool(),
                job_id = result.provider_job_id.as_deref().unwrap_or("-"),
                duration_ms = start.elapsed().as_millis() as u64,
                "Generation succeeded"
            );
            Ok(result)
        }
        Err(e) => {
            warn!(%provider, tool = %params.tool(), code = e.code(), skip = e.is_skippable(), error = %e, "Generation failed");
            Err(e)
        }
    }
}

/// Availability of every provider, read from the environment
pub fn list_provider_status() -> Vec<ProviderStatus> {
    list_provider_status_with(&EnvCredentials)
}

/// Availability of every provider against a credential store
pub fn list_provider_status_with(credentials: &dyn CredentialStore) -> Vec<ProviderStatus> {
    ProviderName::ALL
        .into_iter()
        .map(|provider| {
            let env_var = provider.credential_env();
            ProviderStatus {
                provider,
                display_name: provider.display_name(),
                configured: env_var.is_none_or(|name| credentials.has(name)),
                free: provider.is_free(),
                env_var,
                key_url: provider.key_url(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::credentials::{self as env, StaticCredentials};
    use crate::error::Error;

    #[test]
    fn test_every_provider_has_an_adapter() {
        let config = ProviderConfig::with_api_key("test-key");
        for provider in ProviderName::ALL {
            let adapter = adapter_for(provider, &config).unwrap();
            assert_eq!(adapter.name(), provider);
        }
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        let config = ProviderConfig::default().with_base_url("http://127.0.0.1:9");
        let err = generate(ProviderName::Replicate, &GenerateParams::new("x"), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingCredential { .. }));
        assert!(err.to_string().contains("REPLICATE_API_TOKEN"));
    }

    #[test]
    fn test_provider_status_reflects_credentials() {
        let creds = StaticCredentials::with_present(&[env::FAL_KEY]);
        let status = list_provider_status_with(&creds);
        assert_eq!(status.len(), ProviderName::ALL.len());

        let find = |p: ProviderName| status.iter().find(|s| s.provider == p).unwrap();
        assert!(find(ProviderName::Fal).configured);
        assert!(!find(ProviderName::Replicate).configured);
        assert!(find(ProviderName::Pollinations).configured);
        assert!(find(ProviderName::Pollinations).free);
        assert_eq!(find(ProviderName::Together).env_var, Some(env::TOGETHER_API_KEY));
    }
}
