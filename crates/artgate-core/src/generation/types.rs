//! Generation request and result types
//!
//! `GenerateParams` is the caller's intent, handed unchanged to whichever
//! adapter the router picks. `GenerateResult` is the one shape every adapter
//! returns.

use serde::{Deserialize, Serialize};

use crate::routing::{ProviderName, Tool};

/// Curated style presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StylePreset {
    /// Ordered dithering over a small palette
    Dithered,
    /// Four-shade green handheld look
    Gameboy,
    /// 8-bit console palette
    Nes,
    /// 16-bit console palette
    Snes,
    /// 2:1 isometric projection
    Isometric,
    /// Single hue
    Monochrome,
    /// Glowing synthwave colours
    Neon,
    /// Flat vector shading
    Flat,
    /// Visible brush strokes
    Painterly,
    /// Super-deformed proportions
    Chibi,
}

impl StylePreset {
    pub const ALL: [StylePreset; 10] = [
        Self::Dithered,
        Self::Gameboy,
        Self::Nes,
        Self::Snes,
        Self::Isometric,
        Self::Monochrome,
        Self::Neon,
        Self::Flat,
        Self::Painterly,
        Self::Chibi,
    ];

    /// Identifier used in requests
    pub fn id(&self) -> &'static str {
        match self {
            Self::Dithered => "dithered",
            Self::Gameboy => "gameboy",
            Self::Nes => "nes",
            Self::Snes => "snes",
            Self::Isometric => "isometric",
            Self::Monochrome => "monochrome",
            Self::Neon => "neon",
            Self::Flat => "flat",
            Self::Painterly => "painterly",
            Self::Chibi => "chibi",
        }
    }

    /// Prompt tokens the preset expands to
    pub fn tokens(&self) -> &'static str {
        match self {
            Self::Dithered => "ordered dithering, bayer pattern shading, limited palette",
            Self::Gameboy => "gameboy style, 4 shades of green, dmg palette",
            Self::Nes => "nes style, 8-bit, 54 color nes palette",
            Self::Snes => "snes style, 16-bit, rich palette, detailed sprites",
            Self::Isometric => "isometric view, 2:1 projection, isometric tile",
            Self::Monochrome => "monochrome, single hue, value shading only",
            Self::Neon => "neon glow, synthwave colors, dark background",
            Self::Flat => "flat colors, vector style, no shading",
            Self::Painterly => "painterly, visible brush strokes, hand painted texture",
            Self::Chibi => "chibi proportions, big head, small body, cute",
        }
    }
}

impl std::fmt::Display for StylePreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl std::str::FromStr for StylePreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|preset| preset.id() == needle)
            .ok_or_else(|| format!("Unknown style preset: {}", s))
    }
}

/// Frame controls for sprite animation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimateExtra {
    pub frames: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_true")]
    pub looping: bool,
    #[serde(default)]
    pub reference_image_url: Option<String>,
}

/// Turnaround of an existing sprite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotateExtra {
    pub reference_image_url: String,
    #[serde(default = "default_directions")]
    pub directions: u32,
}

/// Repaint the masked region of an image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InpaintExtra {
    pub image_url: String,
    pub mask_url: String,
}

/// Tile grid for scene composition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneExtra {
    pub grid_width: u32,
    pub grid_height: u32,
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,
}

fn default_fps() -> u32 {
    8
}

fn default_true() -> bool {
    true
}

fn default_directions() -> u32 {
    4
}

fn default_tile_size() -> u32 {
    32
}

/// The tool being invoked, with the fields only that tool needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "lowercase")]
pub enum ToolRequest {
    Generate,
    Animate(AnimateExtra),
    Rotate(RotateExtra),
    Inpaint(InpaintExtra),
    Scene(SceneExtra),
}

impl ToolRequest {
    pub fn tool(&self) -> Tool {
        match self {
            Self::Generate => Tool::Generate,
            Self::Animate(_) => Tool::Animate,
            Self::Rotate(_) => Tool::Rotate,
            Self::Inpaint(_) => Tool::Inpaint,
            Self::Scene(_) => Tool::Scene,
        }
    }

    /// Source image the tool works from, if any
    pub fn source_image_url(&self) -> Option<&str> {
        match self {
            Self::Animate(extra) => extra.reference_image_url.as_deref(),
            Self::Rotate(extra) => Some(&extra.reference_image_url),
            Self::Inpaint(extra) => Some(&extra.image_url),
            Self::Generate | Self::Scene(_) => None,
        }
    }
}

/// A generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateParams {
    #[serde(flatten)]
    pub request: ToolRequest,
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default = "default_dimension")]
    pub width: u32,
    #[serde(default = "default_dimension")]
    pub height: u32,
    #[serde(default)]
    pub steps: Option<u32>,
    #[serde(default = "default_guidance")]
    pub guidance: f32,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub style_preset: Option<StylePreset>,
    #[serde(default)]
    pub asset_category: Option<String>,
    #[serde(default)]
    pub pixel_era: Option<String>,
    #[serde(default)]
    pub background_mode: Option<String>,
    #[serde(default)]
    pub outline_style: Option<String>,
    #[serde(default)]
    pub palette_size: Option<u32>,
    /// Vendor model id to use instead of the adapter default
    #[serde(default)]
    pub model_override: Option<String>,
}

fn default_dimension() -> u32 {
    512
}

fn default_guidance() -> f32 {
    7.0
}

impl GenerateParams {
    /// Plain text-to-image request at the default size
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            request: ToolRequest::Generate,
            prompt: prompt.into(),
            negative_prompt: None,
            width: default_dimension(),
            height: default_dimension(),
            steps: None,
            guidance: default_guidance(),
            seed: None,
            style_preset: None,
            asset_category: None,
            pixel_era: None,
            background_mode: None,
            outline_style: None,
            palette_size: None,
            model_override: None,
        }
    }

    pub fn with_request(mut self, request: ToolRequest) -> Self {
        self.request = request;
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_steps(mut self, steps: u32) -> Self {
        self.steps = Some(steps);
        self
    }

    pub fn with_style(mut self, style: StylePreset) -> Self {
        self.style_preset = Some(style);
        self
    }

    pub fn with_negative_prompt(mut self, negative: impl Into<String>) -> Self {
        self.negative_prompt = Some(negative.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_override = Some(model.into());
        self
    }

    pub fn tool(&self) -> Tool {
        self.request.tool()
    }

    /// Model id to send: the override when present, otherwise `default`
    pub fn model_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.model_override
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(default)
    }
}

/// Normalised adapter output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResult {
    /// Provider that actually served the request
    pub provider: ProviderName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_job_id: Option<String>,
    /// Primary output, a hosted URL or a `data:` URI
    pub result_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_urls: Option<Vec<String>>,
    pub duration_ms: u64,
    /// Seed actually used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_seed: Option<u64>,
    /// Vendor model that produced the output
    pub model: String,
    /// Prompt after assembly
    pub prompt_used: String,
}

impl GenerateResult {
    /// Build a result from one or more output URLs
    ///
    /// Returns `None` when `urls` is empty: an adapter without output has
    /// failed and must raise an error instead.
    pub fn from_urls(provider: ProviderName, mut urls: Vec<String>) -> Option<Self> {
        if urls.is_empty() {
            return None;
        }
        let result_url = urls[0].clone();
        let result_urls = if urls.len() > 1 {
            Some(std::mem::take(&mut urls))
        } else {
            None
        };
        Some(Self {
            provider,
            provider_job_id: None,
            result_url,
            result_urls,
            duration_ms: 0,
            resolved_seed: None,
            model: String::new(),
            prompt_used: String::new(),
        })
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.provider_job_id = Some(job_id.into());
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.resolved_seed = seed;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt_used = prompt.into();
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Every output, primary first
    pub fn all_urls(&self) -> Vec<&str> {
        match &self.result_urls {
            Some(urls) => urls.iter().map(String::as_str).collect(),
            None => vec![self.result_url.as_str()],
        }
    }
}

/// Provider availability for a settings screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    pub provider: ProviderName,
    pub display_name: &'static str,
    /// Whether a credential (or host) is present, always true for keyless
    pub configured: bool,
    pub free: bool,
    /// Variable that configures the provider
    pub env_var: Option<&'static str>,
    pub key_url: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_preset_parse() {
        assert_eq!("dithered".parse::<StylePreset>(), Ok(StylePreset::Dithered));
        assert_eq!(" NES ".parse::<StylePreset>(), Ok(StylePreset::Nes));
        assert!("vaporwave".parse::<StylePreset>().is_err());
        for preset in StylePreset::ALL {
            assert_eq!(preset.to_string().parse::<StylePreset>(), Ok(preset));
        }
    }

    #[test]
    fn test_params_deserialize_flat_tool_tag() {
        let params: GenerateParams = serde_json::from_value(serde_json::json!({
            "tool": "inpaint",
            "prompt": "a red door",
            "image_url": "https://cdn.example/door.png",
            "mask_url": "https://cdn.example/mask.png",
            "seed": 7
        }))
        .unwrap();

        assert_eq!(params.tool(), Tool::Inpaint);
        assert_eq!(params.width, 512);
        assert_eq!(params.seed, Some(7));
        assert_eq!(
            params.request.source_image_url(),
            Some("https://cdn.example/door.png")
        );
    }

    #[test]
    fn test_params_reject_missing_tool_fields() {
        let result: Result<GenerateParams, _> = serde_json::from_value(serde_json::json!({
            "tool": "rotate",
            "prompt": "knight"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_animate_defaults() {
        let params: GenerateParams = serde_json::from_value(serde_json::json!({
            "tool": "animate",
            "prompt": "walk cycle",
            "frames": 6
        }))
        .unwrap();
        match params.request {
            ToolRequest::Animate(extra) => {
                assert_eq!(extra.frames, 6);
                assert_eq!(extra.fps, 8);
                assert!(extra.looping);
                assert_eq!(extra.reference_image_url, None);
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn test_model_override_ignores_blank() {
        let params = GenerateParams::new("x").with_model("  ");
        assert_eq!(params.model_or("default/model"), "default/model");
        let params = GenerateParams::new("x").with_model("custom/model");
        assert_eq!(params.model_or("default/model"), "custom/model");
    }

    #[test]
    fn test_result_from_urls() {
        assert!(GenerateResult::from_urls(ProviderName::Fal, vec![]).is_none());

        let single = GenerateResult::from_urls(ProviderName::Fal, vec!["a".into()]).unwrap();
        assert_eq!(single.result_url, "a");
        assert_eq!(single.result_urls, None);
        assert_eq!(single.all_urls(), vec!["a"]);

        let multi =
            GenerateResult::from_urls(ProviderName::Fal, vec!["a".into(), "b".into()]).unwrap();
        assert_eq!(multi.result_url, "a");
        assert_eq!(multi.all_urls(), vec!["a", "b"]);
    }
}
