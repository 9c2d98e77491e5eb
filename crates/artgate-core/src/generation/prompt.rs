//! Prompt assembly, sizing and seed helpers shared by every adapter

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use rand::Rng;

use super::types::{GenerateParams, ToolRequest};
use crate::routing::Tool;

/// Exclusions every negative-prompt-capable vendor receives
pub const DEFAULT_NEGATIVE_PROMPT: &str = "blurry, soft focus, gradient, anti-aliasing, \
     jpeg artifacts, noise, watermark, signature, text, photo, 3d render";

/// Fixed stylistic prefix for a tool
pub fn tool_prefix(tool: Tool) -> &'static str {
    match tool {
        Tool::Generate => "pixel art, crisp hard edges, limited palette, clean silhouette",
        Tool::Animate => "pixel art sprite sheet, consistent character, evenly spaced frames",
        Tool::Rotate => "pixel art character turnaround, consistent design, orthographic views",
        Tool::Inpaint => "pixel art, seamless edit, matching palette and outline",
        Tool::Scene => "pixel art tileset, top-down, seamless tiles, cohesive palette",
    }
}

/// Merge the tool prefix, style tokens, semantic hints and the user prompt
pub fn build_prompt(params: &GenerateParams) -> String {
    let mut parts: Vec<String> = vec![tool_prefix(params.tool()).to_string()];

    if let Some(style) = params.style_preset {
        parts.push(style.tokens().to_string());
    }
    if let Some(era) = non_empty(&params.pixel_era) {
        parts.push(format!("{} era", era));
    }
    if let Some(category) = non_empty(&params.asset_category) {
        parts.push(format!("{} asset", category));
    }
    if let Some(background) = non_empty(&params.background_mode) {
        parts.push(format!("{} background", background));
    }
    if let Some(outline) = non_empty(&params.outline_style) {
        parts.push(format!("{} outline", outline));
    }
    if let Some(colors) = params.palette_size.filter(|n| *n > 0) {
        parts.push(format!("{} color palette", colors));
    }

    match &params.request {
        ToolRequest::Animate(extra) => {
            parts.push(format!("{} frame animation", extra.frames));
            if extra.looping {
                parts.push("seamless loop".to_string());
            }
        }
        ToolRequest::Rotate(extra) => {
            parts.push(format!("{} directions", extra.directions));
        }
        ToolRequest::Scene(extra) => {
            parts.push(format!(
                "{}x{} tile grid, {}px tiles",
                extra.grid_width, extra.grid_height, extra.tile_size
            ));
        }
        ToolRequest::Generate | ToolRequest::Inpaint(_) => {}
    }

    let prompt = params.prompt.trim();
    if !prompt.is_empty() {
        parts.push(prompt.to_string());
    }

    parts.join(", ")
}

/// Default exclusions merged with the caller's, without duplicate terms
pub fn build_negative_prompt(params: &GenerateParams) -> String {
    let mut terms: Vec<String> = Vec::new();
    let user = params.negative_prompt.as_deref().unwrap_or_default();

    for term in DEFAULT_NEGATIVE_PROMPT.split(',').chain(user.split(',')) {
        let term = term.trim();
        if term.is_empty() {
            continue;
        }
        if !terms.iter().any(|t| t.eq_ignore_ascii_case(term)) {
            terms.push(term.to_string());
        }
    }

    terms.join(", ")
}

/// Round to the nearest legal multiple and clamp to the vendor maximum
///
/// Never fails: zero or tiny values become one multiple, oversized values
/// become the largest multiple not above `max`.
pub fn snap_dimension(value: u32, multiple: u32, max: u32) -> u32 {
    let multiple = multiple.max(1);
    let ceiling = (max / multiple).max(1) * multiple;
    let rounded = (value.saturating_add(multiple / 2) / multiple) * multiple;
    rounded.clamp(multiple, ceiling)
}

/// Caller seed when positive, otherwise a fresh random 31-bit seed
pub fn resolve_seed(seed: Option<u64>) -> u64 {
    match seed {
        Some(seed) if seed > 0 => seed,
        _ => rand::thread_rng().gen_range(1..=i32::MAX as u64),
    }
}

/// Encode bytes as a `data:` URI
pub fn to_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, BASE64.encode(bytes))
}

/// Decode a base64 `data:` URI into its MIME type and bytes
pub fn decode_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let rest = uri.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    let bytes = BASE64.decode(payload.trim()).ok()?;
    Some((mime.to_string(), bytes))
}

/// Detect an image MIME type from magic bytes
pub fn sniff_image_mime(data: &[u8]) -> &'static str {
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        "image/png"
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if data.starts_with(b"RIFF") && data.get(8..12) == Some(b"WEBP") {
        "image/webp"
    } else if data.starts_with(b"GIF8") {
        "image/gif"
    } else {
        "image/png"
    }
}

/// File extension for an image MIME type
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::types::{AnimateExtra, SceneExtra, StylePreset};

    #[test]
    fn test_prompt_starts_with_tool_prefix_and_ends_with_user_text() {
        let params = GenerateParams::new("a brave knight").with_style(StylePreset::Nes);
        let prompt = build_prompt(&params);
        assert!(prompt.starts_with(tool_prefix(Tool::Generate)));
        assert!(prompt.contains("8-bit"));
        assert!(prompt.ends_with("a brave knight"));
    }

    #[test]
    fn test_prompt_includes_semantic_hints() {
        let mut params = GenerateParams::new("potion");
        params.pixel_era = Some("16-bit".to_string());
        params.background_mode = Some("transparent".to_string());
        params.palette_size = Some(8);
        params.outline_style = Some(" ".to_string());

        let prompt = build_prompt(&params);
        assert!(prompt.contains("16-bit era"));
        assert!(prompt.contains("transparent background"));
        assert!(prompt.contains("8 color palette"));
        assert!(!prompt.contains("outline"));
    }

    #[test]
    fn test_prompt_describes_tool_extras() {
        let params = GenerateParams::new("slime").with_request(ToolRequest::Animate(AnimateExtra {
            frames: 4,
            fps: 8,
            looping: true,
            reference_image_url: None,
        }));
        let prompt = build_prompt(&params);
        assert!(prompt.contains("4 frame animation"));
        assert!(prompt.contains("seamless loop"));

        let params = GenerateParams::new("dungeon").with_request(ToolRequest::Scene(SceneExtra {
            grid_width: 8,
            grid_height: 6,
            tile_size: 16,
        }));
        assert!(build_prompt(&params).contains("8x6 tile grid, 16px tiles"));
    }

    #[test]
    fn test_negative_prompt_merges_without_duplicates() {
        let params = GenerateParams::new("x").with_negative_prompt("Blurry, extra limbs");
        let negative = build_negative_prompt(&params);
        assert!(negative.starts_with("blurry"));
        assert!(negative.ends_with("extra limbs"));
        assert_eq!(negative.to_lowercase().matches("blurry").count(), 1);
    }

    #[test]
    fn test_snap_dimension() {
        assert_eq!(snap_dimension(500, 64, 1024), 512);
        assert_eq!(snap_dimension(513, 32, 2048), 512);
        assert_eq!(snap_dimension(4000, 64, 1440), 1408);
        assert_eq!(snap_dimension(0, 64, 1024), 64);
        assert_eq!(snap_dimension(10, 32, 2048), 32);
        assert_eq!(snap_dimension(1792, 64, 1792), 1792);
    }

    #[test]
    fn test_resolve_seed() {
        assert_eq!(resolve_seed(Some(42)), 42);
        let a = resolve_seed(None);
        let b = resolve_seed(Some(0));
        assert!((1..=i32::MAX as u64).contains(&a));
        assert!((1..=i32::MAX as u64).contains(&b));
    }

    #[test]
    fn test_data_uri_roundtrip_and_sniffing() {
        let png = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A];
        let uri = to_data_uri(sniff_image_mime(&png), &png);
        assert!(uri.starts_with("data:image/png;base64,"));
        let (mime, bytes) = decode_data_uri(&uri).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, png);
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
        assert!(decode_data_uri("https://cdn.example/x.png").is_none());
    }
}
