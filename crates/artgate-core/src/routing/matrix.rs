//! Static routing tables
//!
//! Ranked provider lists per tier, mode and tool, plus the style override
//! table consulted before them. Adjusting priority is a table edit here.
//! Every list ends with the keyless Pollinations entry.

use super::types::{
    Mode, ProviderName, ProviderPreference, TextProvider, Tier, Tool, VoiceProvider,
};
use crate::config::credentials as env;
use crate::generation::StylePreset;

use ProviderName::{ComfyUi, Fal, HuggingFace, Pollinations, Prodia, Replicate, StableHorde, Together};

/// Ranked providers for one tool
#[derive(Debug)]
pub struct ToolRoute {
    pub tool: Tool,
    pub preferences: &'static [ProviderPreference],
}

/// Routes for one creative mode
#[derive(Debug)]
pub struct ModeRoutes {
    pub mode: Mode,
    pub tools: &'static [ToolRoute],
    /// Used for tools the mode does not list
    pub fallback: &'static [ProviderPreference],
}

/// Per-style preferred provider for each tier
#[derive(Debug, Clone, Copy)]
pub struct StyleOverride {
    pub style: StylePreset,
    pub standard: Option<ProviderName>,
    pub hd: Option<ProviderName>,
}

impl StyleOverride {
    pub fn for_tier(&self, tier: Tier) -> Option<ProviderName> {
        match tier {
            Tier::Standard => self.standard,
            Tier::Hd => self.hd,
        }
    }
}

const fn of(provider: ProviderName) -> ProviderPreference {
    ProviderPreference::of(provider)
}

const KEYLESS: ProviderPreference = ProviderPreference::keyless(Pollinations);

/// Last resort when neither mode nor tool resolve to anything
pub static ULTIMATE_FALLBACK: &[ProviderPreference] = &[KEYLESS];

/// Free-tier routes
pub static STANDARD_MATRIX: &[ModeRoutes] = &[
    ModeRoutes {
        mode: Mode::Pixel,
        tools: &[
            ToolRoute {
                tool: Tool::Generate,
                preferences: &[of(Together), of(HuggingFace), of(StableHorde), of(ComfyUi), KEYLESS],
            },
            ToolRoute {
                tool: Tool::Animate,
                preferences: &[of(Together), of(HuggingFace), KEYLESS],
            },
            ToolRoute {
                tool: Tool::Rotate,
                preferences: &[of(StableHorde), of(Prodia), KEYLESS],
            },
            ToolRoute {
                tool: Tool::Inpaint,
                preferences: &[of(StableHorde), of(Prodia), KEYLESS],
            },
            ToolRoute {
                tool: Tool::Scene,
                preferences: &[of(Together), of(HuggingFace), KEYLESS],
            },
        ],
        fallback: &[of(Together), of(HuggingFace), KEYLESS],
    },
    ModeRoutes {
        mode: Mode::Game,
        tools: &[
            ToolRoute {
                tool: Tool::Generate,
                preferences: &[of(Together), of(Prodia), KEYLESS],
            },
            ToolRoute {
                tool: Tool::Scene,
                preferences: &[of(Together), of(StableHorde), KEYLESS],
            },
        ],
        fallback: &[of(Together), KEYLESS],
    },
    ModeRoutes {
        mode: Mode::Ui,
        tools: &[ToolRoute {
            tool: Tool::Generate,
            preferences: &[of(Together), of(HuggingFace), KEYLESS],
        }],
        fallback: &[of(Together), KEYLESS],
    },
    ModeRoutes {
        mode: Mode::Social,
        tools: &[ToolRoute {
            tool: Tool::Generate,
            preferences: &[of(Together), of(Prodia), KEYLESS],
        }],
        fallback: &[of(Together), KEYLESS],
    },
    ModeRoutes {
        mode: Mode::Business,
        tools: &[ToolRoute {
            tool: Tool::Generate,
            preferences: &[of(Together), KEYLESS],
        }],
        fallback: &[of(Together), KEYLESS],
    },
];

/// Premium routes
pub static HD_MATRIX: &[ModeRoutes] = &[
    ModeRoutes {
        mode: Mode::Pixel,
        tools: &[
            ToolRoute {
                tool: Tool::Generate,
                preferences: &[of(Fal), of(Replicate), of(Together), KEYLESS],
            },
            ToolRoute {
                tool: Tool::Animate,
                preferences: &[of(Replicate), of(Fal), KEYLESS],
            },
            ToolRoute {
                tool: Tool::Rotate,
                preferences: &[of(Fal), of(Replicate), KEYLESS],
            },
            ToolRoute {
                tool: Tool::Inpaint,
                preferences: &[of(Replicate), of(Fal), KEYLESS],
            },
            ToolRoute {
                tool: Tool::Scene,
                preferences: &[of(Fal), of(Replicate), of(Together), KEYLESS],
            },
        ],
        fallback: &[of(Fal), of(Replicate), KEYLESS],
    },
    ModeRoutes {
        mode: Mode::Game,
        tools: &[
            ToolRoute {
                tool: Tool::Generate,
                preferences: &[of(Fal), of(Replicate), KEYLESS],
            },
            ToolRoute {
                tool: Tool::Scene,
                preferences: &[of(Replicate), of(Fal), KEYLESS],
            },
        ],
        fallback: &[of(Fal), of(Replicate), KEYLESS],
    },
    ModeRoutes {
        mode: Mode::Ui,
        tools: &[ToolRoute {
            tool: Tool::Generate,
            preferences: &[of(Replicate), of(Fal), of(Together), KEYLESS],
        }],
        fallback: &[of(Replicate), of(Fal), KEYLESS],
    },
    ModeRoutes {
        mode: Mode::Social,
        tools: &[ToolRoute {
            tool: Tool::Generate,
            preferences: &[of(Fal), of(Together), KEYLESS],
        }],
        fallback: &[of(Fal), KEYLESS],
    },
    ModeRoutes {
        mode: Mode::Business,
        tools: &[ToolRoute {
            tool: Tool::Generate,
            preferences: &[of(Replicate), of(Fal), KEYLESS],
        }],
        fallback: &[of(Replicate), of(Fal), KEYLESS],
    },
];

/// Style overrides, checked before the tier matrix
pub static STYLE_OVERRIDES: &[StyleOverride] = &[
    StyleOverride {
        style: StylePreset::Dithered,
        standard: Some(Pollinations),
        hd: Some(Replicate),
    },
    StyleOverride {
        style: StylePreset::Gameboy,
        standard: Some(Pollinations),
        hd: Some(Fal),
    },
    StyleOverride {
        style: StylePreset::Nes,
        standard: Some(Together),
        hd: Some(Fal),
    },
    StyleOverride {
        style: StylePreset::Snes,
        standard: Some(Together),
        hd: Some(Replicate),
    },
    StyleOverride {
        style: StylePreset::Isometric,
        standard: Some(HuggingFace),
        hd: Some(Replicate),
    },
    StyleOverride {
        style: StylePreset::Monochrome,
        standard: Some(Pollinations),
        hd: None,
    },
    StyleOverride {
        style: StylePreset::Neon,
        standard: Some(Together),
        hd: Some(Fal),
    },
    StyleOverride {
        style: StylePreset::Flat,
        standard: None,
        hd: Some(Fal),
    },
    StyleOverride {
        style: StylePreset::Painterly,
        standard: Some(StableHorde),
        hd: Some(Replicate),
    },
    StyleOverride {
        style: StylePreset::Chibi,
        standard: Some(HuggingFace),
        hd: Some(Fal),
    },
];

/// Voice backends in preference order
pub static VOICE_PREFERENCES: &[(VoiceProvider, &str)] = &[
    (VoiceProvider::ElevenLabs, env::ELEVENLABS_API_KEY),
    (VoiceProvider::OpenAi, env::OPENAI_API_KEY),
    (VoiceProvider::Replicate, env::REPLICATE_API_TOKEN),
];

/// Text backends in preference order
pub static TEXT_PREFERENCES: &[(TextProvider, &str)] = &[
    (TextProvider::Anthropic, env::ANTHROPIC_API_KEY),
    (TextProvider::OpenAi, env::OPENAI_API_KEY),
    (TextProvider::Together, env::TOGETHER_API_KEY),
    (TextProvider::Groq, env::GROQ_API_KEY),
];

/// The matrix for a tier
pub fn matrix(tier: Tier) -> &'static [ModeRoutes] {
    match tier {
        Tier::Standard => STANDARD_MATRIX,
        Tier::Hd => HD_MATRIX,
    }
}

/// Ranked list for `(mode, tool)`
///
/// An unknown tool resolves to the mode's fallback list. A mode missing from
/// the matrix resolves to the business routes, and if those are missing too,
/// to `ULTIMATE_FALLBACK`.
pub fn preferences_for(tier: Tier, mode: Mode, tool: Option<Tool>) -> &'static [ProviderPreference] {
    let routes = matrix(tier);
    let mode_routes = routes
        .iter()
        .find(|r| r.mode == mode)
        .or_else(|| routes.iter().find(|r| r.mode == Mode::Business));

    let Some(mode_routes) = mode_routes else {
        return ULTIMATE_FALLBACK;
    };

    tool.and_then(|tool| mode_routes.tools.iter().find(|t| t.tool == tool))
        .map(|t| t.preferences)
        .unwrap_or(mode_routes.fallback)
}

/// Override entry for a style, if any
pub fn style_override(style: StylePreset) -> Option<&'static StyleOverride> {
    STYLE_OVERRIDES.iter().find(|o| o.style == style)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_lists() -> Vec<&'static [ProviderPreference]> {
        STANDARD_MATRIX
            .iter()
            .chain(HD_MATRIX.iter())
            .flat_map(|m| m.tools.iter().map(|t| t.preferences).chain([m.fallback]))
            .collect()
    }

    #[test]
    fn test_every_list_ends_with_keyless_fallback() {
        for list in all_lists() {
            let last = list.last().expect("routing lists are never empty");
            assert_eq!(last.provider, ProviderName::KEYLESS_FALLBACK);
            assert_eq!(last.requires, None);
        }
    }

    #[test]
    fn test_only_the_last_entry_is_keyless() {
        for list in all_lists() {
            for pref in &list[..list.len() - 1] {
                assert!(
                    pref.requires.is_some(),
                    "{} would shadow the keyless fallback",
                    pref.provider
                );
            }
        }
    }

    #[test]
    fn test_both_tiers_cover_every_mode() {
        for tier in [Tier::Standard, Tier::Hd] {
            for mode in [Mode::Pixel, Mode::Game, Mode::Ui, Mode::Social, Mode::Business] {
                assert!(matrix(tier).iter().any(|r| r.mode == mode));
            }
        }
    }

    #[test]
    fn test_unknown_tool_uses_mode_fallback() {
        let prefs = preferences_for(Tier::Standard, Mode::Ui, Some(Tool::Rotate));
        assert_eq!(prefs.as_ptr(), STANDARD_MATRIX[2].fallback.as_ptr());

        let prefs = preferences_for(Tier::Hd, Mode::Social, None);
        assert_eq!(prefs[0].provider, ProviderName::Fal);
    }

    #[test]
    fn test_hd_pixel_generate_ranks_fal_first() {
        let prefs = preferences_for(Tier::Hd, Mode::Pixel, Some(Tool::Generate));
        let providers: Vec<_> = prefs.iter().map(|p| p.provider).collect();
        assert_eq!(
            providers,
            vec![
                ProviderName::Fal,
                ProviderName::Replicate,
                ProviderName::Together,
                ProviderName::Pollinations
            ]
        );
    }

    #[test]
    fn test_style_overrides_are_unique() {
        for (i, a) in STYLE_OVERRIDES.iter().enumerate() {
            for b in &STYLE_OVERRIDES[i + 1..] {
                assert_ne!(a.style, b.style);
            }
        }
        assert_eq!(
            style_override(StylePreset::Dithered).and_then(|o| o.for_tier(Tier::Standard)),
            Some(ProviderName::Pollinations)
        );
    }
}
