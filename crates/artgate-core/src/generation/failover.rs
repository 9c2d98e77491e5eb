//! Caller-level failover across ranked providers
//!
//! Walks the resolver's candidate list for a request, advancing only when a
//! failure says the provider itself is unusable right now. Request-shape
//! errors stop the walk so the caller can show them.

use tracing::{info, warn};

use super::dispatch::generate;
use super::types::{GenerateParams, GenerateResult};
use crate::config::ProviderConfig;
use crate::config::credentials::CredentialStore;
use crate::error::{Error, Result};
use crate::routing::{ProviderName, ProviderResolver};

/// Generate with the best usable provider, falling back down the ranking
///
/// `config_for` builds the per-provider config (credentials, host, timeout)
/// for each candidate as it is tried.
pub async fn generate_with_failover<C, F>(
    resolver: &ProviderResolver<C>,
    mode: &str,
    use_hd: bool,
    params: &GenerateParams,
    mut config_for: F,
) -> Result<GenerateResult>
where
    C: CredentialStore,
    F: FnMut(ProviderName) -> ProviderConfig,
{
    let tool = params.tool().to_string();
    let style = params.style_preset.map(|s| s.id());
    let candidates = resolver.candidates(mode, &tool, use_hd, style);

    info!(mode, tool = %tool, use_hd, candidates = ?candidates, "Starting generation with failover");

    let mut last_error: Option<Error> = None;
    let mut attempts = 0;

    for provider in candidates {
        attempts += 1;
        let config = config_for(provider);
        match generate(provider, params, &config).await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_skippable() => {
                warn!(%provider, attempt = attempts, error = %e, "Provider unusable, trying next candidate");
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    match last_error {
        Some(last) => Err(Error::AllProvidersFailed {
            attempts,
            last: Box::new(last),
        }),
        None => Err(Error::InvalidInput("no candidate providers".to_string())),
    }
}
