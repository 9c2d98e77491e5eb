//! Provider resolver
//!
//! Picks a backend for `(mode, tool, tier, style)` by walking the static
//! routing tables and checking credential presence at call time. Resolution
//! never fails: when nothing is configured the keyless provider is returned.

use tracing::debug;

use super::matrix::{self, TEXT_PREFERENCES, VOICE_PREFERENCES};
use super::types::{Mode, ProviderName, ProviderPreference, TextProvider, Tier, Tool, VoiceProvider};
use crate::config::credentials::{CredentialStore, EnvCredentials};
use crate::generation::StylePreset;

/// Resolves providers against a credential store
#[derive(Debug, Clone, Default)]
pub struct ProviderResolver<C = EnvCredentials> {
    credentials: C,
}

impl ProviderResolver<EnvCredentials> {
    /// Resolver backed by the process environment
    pub fn from_env() -> Self {
        Self {
            credentials: EnvCredentials,
        }
    }
}

impl<C: CredentialStore> ProviderResolver<C> {
    /// Resolver backed by an arbitrary credential store
    pub fn new(credentials: C) -> Self {
        Self { credentials }
    }

    /// The credential store this resolver consults
    pub fn credentials(&self) -> &C {
        &self.credentials
    }

    /// Whether a preference entry is usable right now
    pub fn is_usable(&self, pref: &ProviderPreference) -> bool {
        pref.requires.is_none_or(|name| self.credentials.has(name))
    }

    fn provider_usable(&self, provider: ProviderName) -> bool {
        self.is_usable(&ProviderPreference::of(provider))
    }

    /// Pick the provider for a request
    ///
    /// `mode` and `tool` are accepted as strings because they arrive from
    /// request bodies; unknown values degrade to the generic routes.
    pub fn resolve(&self, mode: &str, tool: &str, use_hd: bool, style: Option<&str>) -> ProviderName {
        let tier = Tier::from_hd(use_hd);

        if let Some(provider) = style.and_then(|s| self.resolve_style(s, tier)) {
            debug!(%provider, style = style.unwrap_or_default(), "Resolved provider from style override");
            return provider;
        }

        let prefs = matrix::preferences_for(tier, Mode::parse_or_generic(mode), tool.parse::<Tool>().ok());
        let provider = prefs
            .iter()
            .find(|pref| self.is_usable(pref))
            .map(|pref| pref.provider)
            .unwrap_or(ProviderName::KEYLESS_FALLBACK);

        debug!(%provider, mode, tool, use_hd, "Resolved provider from routing matrix");
        provider
    }

    /// Style override lookup with cross-tier degrade
    ///
    /// The tier-appropriate preferred provider wins when usable; otherwise
    /// the other tier's preferred provider for the same style is tried
    /// before giving up on the override.
    pub fn resolve_style(&self, style: &str, tier: Tier) -> Option<ProviderName> {
        let style = style.parse::<StylePreset>().ok()?;
        let entry = matrix::style_override(style)?;

        [entry.for_tier(tier), entry.for_tier(tier.other())]
            .into_iter()
            .flatten()
            .find(|provider| self.provider_usable(*provider))
    }

    /// Every usable provider for a request, in the order failover should try them
    ///
    /// Style override candidates come first, then the matrix entry; the
    /// keyless provider is always last. No provider appears twice.
    pub fn candidates(
        &self,
        mode: &str,
        tool: &str,
        use_hd: bool,
        style: Option<&str>,
    ) -> Vec<ProviderName> {
        let tier = Tier::from_hd(use_hd);
        let mut out = Vec::new();

        if let Some(entry) = style
            .and_then(|s| s.parse::<StylePreset>().ok())
            .and_then(matrix::style_override)
        {
            for provider in [entry.for_tier(tier), entry.for_tier(tier.other())]
                .into_iter()
                .flatten()
            {
                if self.provider_usable(provider) && !out.contains(&provider) {
                    out.push(provider);
                }
            }
        }

        let prefs = matrix::preferences_for(tier, Mode::parse_or_generic(mode), tool.parse::<Tool>().ok());
        for pref in prefs {
            if self.is_usable(pref) && !out.contains(&pref.provider) {
                out.push(pref.provider);
            }
        }

        out.retain(|p| *p != ProviderName::KEYLESS_FALLBACK);
        out.push(ProviderName::KEYLESS_FALLBACK);
        out
    }

    /// First configured voice backend, if any
    pub fn resolve_voice(&self) -> Option<VoiceProvider> {
        VOICE_PREFERENCES
            .iter()
            .find(|(_, env_var)| self.credentials.has(env_var))
            .map(|(provider, _)| *provider)
    }

    /// First configured text backend, if any
    pub fn resolve_text(&self) -> Option<TextProvider> {
        TEXT_PREFERENCES
            .iter()
            .find(|(_, env_var)| self.credentials.has(env_var))
            .map(|(provider, _)| *provider)
    }
}

/// Pick the image provider for a request using the process environment
pub fn resolve_optimal_provider(mode: &str, tool: &str, use_hd: bool, style: Option<&str>) -> ProviderName {
    ProviderResolver::from_env().resolve(mode, tool, use_hd, style)
}

/// First voice backend with a credential in the environment
pub fn resolve_voice_provider() -> Option<VoiceProvider> {
    ProviderResolver::from_env().resolve_voice()
}

/// First text backend with a credential in the environment
pub fn resolve_text_provider() -> Option<TextProvider> {
    ProviderResolver::from_env().resolve_text()
}
