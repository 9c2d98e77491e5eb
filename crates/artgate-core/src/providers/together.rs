//! Together AI adapter
//!
//! Single call to the OpenAI-compatible `/v1/images/generations` endpoint.
//! FLUX schnell has no negative prompt and no image conditioning here, so
//! rotate and inpaint are refused with a skippable error.

use std::time::Instant;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::http::{build_client, send_json};
use super::{ImageProvider, VendorSizing};
use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};
use crate::generation::prompt::{build_prompt, resolve_seed, sniff_image_mime, to_data_uri};
use crate::generation::{GenerateParams, GenerateResult, ToolRequest};
use crate::routing::ProviderName;

const TOGETHER_BASE_URL: &str = "https://api.together.xyz";

const DEFAULT_MODEL: &str = "black-forest-labs/FLUX.1-schnell";

/// schnell is distilled for very few steps
const DEFAULT_STEPS: u32 = 4;
const MAX_STEPS: u32 = 12;

pub struct TogetherProvider {
    http_client: HttpClient,
    api_key: String,
    base_url: String,
    cancel: CancellationToken,
}

impl std::fmt::Debug for TogetherProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TogetherProvider")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl TogetherProvider {
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            http_client: build_client(ProviderName::Together, config.timeout())?,
            api_key: config.api_key.clone(),
            base_url: config.base_url_or(TOGETHER_BASE_URL),
            cancel: config.cancel.clone(),
        })
    }
}

#[async_trait]
impl ImageProvider for TogetherProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Together
    }

    async fn generate(&self, params: &GenerateParams) -> Result<GenerateResult> {
        let count = match &params.request {
            ToolRequest::Generate | ToolRequest::Scene(_) => 1,
            ToolRequest::Animate(extra) => extra.frames.clamp(1, 4),
            ToolRequest::Rotate(_) | ToolRequest::Inpaint(_) => {
                return Err(ProviderError::unsupported(
                    ProviderName::Together,
                    format!("the {} tool", params.tool()),
                )
                .into());
            }
        };

        let start = Instant::now();
        let prompt = build_prompt(params);
        let seed = resolve_seed(params.seed);
        let model = params.model_or(DEFAULT_MODEL);
        let (width, height) =
            VendorSizing::for_provider(ProviderName::Together).snap(params.width, params.height);
        let steps = params.steps.unwrap_or(DEFAULT_STEPS).clamp(1, MAX_STEPS);

        let body = json!({
            "model": model,
            "prompt": prompt,
            "width": width,
            "height": height,
            "steps": steps,
            "n": count,
            "seed": seed,
            "response_format": "b64_json",
        });

        info!(provider = "together", model, width, height, "Sending image generation request");
        let request = self
            .http_client
            .post(format!("{}/v1/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body);
        let response: ImagesResponse = send_json(ProviderName::Together, request, &self.cancel).await?;

        let mut urls = Vec::with_capacity(response.data.len());
        for image in response.data {
            if let Some(b64) = image.b64_json {
                let bytes = BASE64.decode(b64.trim()).map_err(|e| {
                    ProviderError::invalid_response(
                        ProviderName::Together,
                        format!("Invalid base64: {}", e),
                    )
                })?;
                urls.push(to_data_uri(sniff_image_mime(&bytes), &bytes));
            } else if let Some(url) = image.url {
                urls.push(url);
            }
        }

        let mut result = GenerateResult::from_urls(ProviderName::Together, urls).ok_or_else(|| {
            ProviderError::invalid_response(ProviderName::Together, "response contained no images")
        })?;
        if let Some(id) = response.id {
            result = result.with_job_id(id);
        }

        Ok(result
            .with_seed(Some(seed))
            .with_model(model)
            .with_prompt(prompt)
            .with_duration_ms(start.elapsed().as_millis() as u64))
    }
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorKind;
    use crate::generation::InpaintExtra;

    #[tokio::test]
    async fn test_inpaint_is_refused_before_any_request() {
        let provider = TogetherProvider::from_config(
            &ProviderConfig::with_api_key("k").with_base_url("http://127.0.0.1:9"),
        )
        .unwrap();
        let params = GenerateParams::new("x").with_request(ToolRequest::Inpaint(InpaintExtra {
            image_url: "https://img".into(),
            mask_url: "https://mask".into(),
        }));

        let err = provider.generate(&params).await.unwrap_err();
        let provider_err = err.as_provider_error().unwrap();
        assert_eq!(provider_err.kind, ProviderErrorKind::Unsupported);
        assert!(provider_err.skip_provider);
    }
}
