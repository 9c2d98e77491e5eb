//! Types for provider routing
//!
//! Names for the image backends, the creative modes and tools that key the
//! routing matrix, and the ranked preference entries the matrix is built from.

use serde::{Deserialize, Serialize};

use crate::config::credentials as env;

/// An image generation backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderName {
    Replicate,
    Fal,
    Together,
    #[serde(rename = "huggingface")]
    HuggingFace,
    Pollinations,
    StableHorde,
    Prodia,
    #[serde(rename = "comfyui")]
    ComfyUi,
}

impl ProviderName {
    /// Every provider, in display order
    pub const ALL: [ProviderName; 8] = [
        Self::Replicate,
        Self::Fal,
        Self::Together,
        Self::HuggingFace,
        Self::Pollinations,
        Self::StableHorde,
        Self::Prodia,
        Self::ComfyUi,
    ];

    /// The always-available provider used when nothing else is configured
    pub const KEYLESS_FALLBACK: ProviderName = Self::Pollinations;

    /// Stable identifier used in config, logs and APIs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Replicate => "replicate",
            Self::Fal => "fal",
            Self::Together => "together",
            Self::HuggingFace => "huggingface",
            Self::Pollinations => "pollinations",
            Self::StableHorde => "stable-horde",
            Self::Prodia => "prodia",
            Self::ComfyUi => "comfyui",
        }
    }

    /// Human-readable name for settings screens
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Replicate => "Replicate",
            Self::Fal => "fal.ai",
            Self::Together => "Together AI",
            Self::HuggingFace => "Hugging Face",
            Self::Pollinations => "Pollinations",
            Self::StableHorde => "Stable Horde",
            Self::Prodia => "Prodia",
            Self::ComfyUi => "ComfyUI (local)",
        }
    }

    /// Environment variable the adapter reads its credential (or host) from
    pub const fn credential_env(&self) -> Option<&'static str> {
        match self {
            Self::Replicate => Some(env::REPLICATE_API_TOKEN),
            Self::Fal => Some(env::FAL_KEY),
            Self::Together => Some(env::TOGETHER_API_KEY),
            Self::HuggingFace => Some(env::HF_TOKEN),
            Self::Pollinations => None,
            Self::StableHorde => Some(env::STABLE_HORDE_KEY),
            Self::Prodia => Some(env::PRODIA_API_KEY),
            Self::ComfyUi => Some(env::COMFYUI_HOST),
        }
    }

    /// Whether generation is impossible without an API key
    ///
    /// Stable Horde falls back to the anonymous key, Prodia's key is
    /// optional and ComfyUI is self-hosted.
    pub fn requires_api_key(&self) -> bool {
        matches!(
            self,
            Self::Replicate | Self::Fal | Self::Together | Self::HuggingFace
        )
    }

    /// Whether the provider can be used at no cost
    pub fn is_free(&self) -> bool {
        matches!(
            self,
            Self::Pollinations | Self::StableHorde | Self::ComfyUi | Self::HuggingFace
        )
    }

    /// Where to obtain a key
    pub fn key_url(&self) -> &'static str {
        match self {
            Self::Replicate => "https://replicate.com/account/api-tokens",
            Self::Fal => "https://fal.ai/dashboard/keys",
            Self::Together => "https://api.together.ai/settings/api-keys",
            Self::HuggingFace => "https://huggingface.co/settings/tokens",
            Self::Pollinations => "https://pollinations.ai",
            Self::StableHorde => "https://stablehorde.net/register",
            Self::Prodia => "https://app.prodia.com/api",
            Self::ComfyUi => "https://github.com/comfyanonymous/ComfyUI",
        }
    }
}

impl std::fmt::Display for ProviderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProviderName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "replicate" => Ok(Self::Replicate),
            "fal" | "fal.ai" | "fal-ai" => Ok(Self::Fal),
            "together" | "togetherai" => Ok(Self::Together),
            "huggingface" | "hf" => Ok(Self::HuggingFace),
            "pollinations" => Ok(Self::Pollinations),
            "stable-horde" | "stablehorde" | "horde" => Ok(Self::StableHorde),
            "prodia" => Ok(Self::Prodia),
            "comfyui" | "comfy" => Ok(Self::ComfyUi),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// Creative mode of the studio making the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Pixel art sprites, icons and tiles
    Pixel,
    /// Game-ready assets and scenes
    Game,
    /// UI components and mockups
    Ui,
    /// Social posts and avatars
    Social,
    /// Generic catch-all
    Business,
}

impl Mode {
    /// Parse a mode, falling back to `Business` for anything unknown
    pub fn parse_or_generic(s: &str) -> Self {
        s.parse().unwrap_or(Self::Business)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pixel => write!(f, "pixel"),
            Self::Game => write!(f, "game"),
            Self::Ui => write!(f, "ui"),
            Self::Social => write!(f, "social"),
            Self::Business => write!(f, "business"),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pixel" => Ok(Self::Pixel),
            "game" => Ok(Self::Game),
            "ui" => Ok(Self::Ui),
            "social" => Ok(Self::Social),
            "business" => Ok(Self::Business),
            _ => Err(format!("Unknown mode: {}", s)),
        }
    }
}

/// Generation tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Generate,
    Animate,
    Rotate,
    Inpaint,
    Scene,
}

impl Tool {
    pub const ALL: [Tool; 5] = [
        Self::Generate,
        Self::Animate,
        Self::Rotate,
        Self::Inpaint,
        Self::Scene,
    ];
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generate => write!(f, "generate"),
            Self::Animate => write!(f, "animate"),
            Self::Rotate => write!(f, "rotate"),
            Self::Inpaint => write!(f, "inpaint"),
            Self::Scene => write!(f, "scene"),
        }
    }
}

impl std::str::FromStr for Tool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "generate" => Ok(Self::Generate),
            "animate" => Ok(Self::Animate),
            "rotate" => Ok(Self::Rotate),
            "inpaint" => Ok(Self::Inpaint),
            "scene" => Ok(Self::Scene),
            _ => Err(format!("Unknown tool: {}", s)),
        }
    }
}

/// Quality tier of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Free-tier backends
    Standard,
    /// Premium backends
    Hd,
}

impl Tier {
    pub fn from_hd(use_hd: bool) -> Self {
        if use_hd { Self::Hd } else { Self::Standard }
    }

    /// The opposite tier
    pub fn other(&self) -> Self {
        match self {
            Self::Standard => Self::Hd,
            Self::Hd => Self::Standard,
        }
    }
}

/// One ranked entry in a routing list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProviderPreference {
    pub provider: ProviderName,
    /// Environment variable that must be present; `None` means always usable
    pub requires: Option<&'static str>,
}

impl ProviderPreference {
    /// Entry gated on the provider's own credential
    pub const fn of(provider: ProviderName) -> Self {
        Self {
            provider,
            requires: provider.credential_env(),
        }
    }

    /// Entry that is always usable
    pub const fn keyless(provider: ProviderName) -> Self {
        Self {
            provider,
            requires: None,
        }
    }
}

/// Voice synthesis backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceProvider {
    ElevenLabs,
    OpenAi,
    Replicate,
}

impl std::fmt::Display for VoiceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ElevenLabs => write!(f, "elevenlabs"),
            Self::OpenAi => write!(f, "openai"),
            Self::Replicate => write!(f, "replicate"),
        }
    }
}

/// Chat / text completion backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextProvider {
    Anthropic,
    OpenAi,
    Together,
    Groq,
}

impl std::fmt::Display for TextProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anthropic => write!(f, "anthropic"),
            Self::OpenAi => write!(f, "openai"),
            Self::Together => write!(f, "together"),
            Self::Groq => write!(f, "groq"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_name_roundtrips_through_str() {
        for provider in ProviderName::ALL {
            assert_eq!(provider.as_str().parse::<ProviderName>(), Ok(provider));
        }
    }

    #[test]
    fn test_provider_serde_matches_as_str() {
        for provider in ProviderName::ALL {
            let json = serde_json::to_string(&provider).unwrap();
            assert_eq!(json, format!("\"{}\"", provider.as_str()));
        }
    }

    #[test]
    fn test_unknown_mode_falls_back_to_business() {
        assert_eq!(Mode::parse_or_generic("pixel"), Mode::Pixel);
        assert_eq!(Mode::parse_or_generic("PIXEL"), Mode::Pixel);
        assert_eq!(Mode::parse_or_generic("podcast"), Mode::Business);
    }

    #[test]
    fn test_pollinations_needs_nothing() {
        assert_eq!(ProviderName::Pollinations.credential_env(), None);
        assert!(!ProviderName::Pollinations.requires_api_key());
        assert_eq!(
            ProviderPreference::of(ProviderName::Pollinations).requires,
            None
        );
    }

    #[test]
    fn test_tier_other() {
        assert_eq!(Tier::from_hd(true), Tier::Hd);
        assert_eq!(Tier::Standard.other(), Tier::Hd);
        assert_eq!(Tier::Hd.other(), Tier::Standard);
    }
}
