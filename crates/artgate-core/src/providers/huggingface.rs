//! HuggingFace Inference adapter
//!
//! Single call through the inference router. Cold models answer 503 with a
//! "loading" body; those are retried a fixed number of times after a fixed
//! pause before the 503 is surfaced like any other server error.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::http::{build_client, image_as_data_uri, send};
use super::{ImageProvider, VendorSizing};
use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};
use crate::generation::prompt::{build_negative_prompt, build_prompt, resolve_seed};
use crate::generation::{GenerateParams, GenerateResult, ToolRequest};
use crate::routing::ProviderName;

const HF_ROUTER_URL: &str = "https://router.huggingface.co";

const DEFAULT_MODEL: &str = "stabilityai/stable-diffusion-xl-base-1.0";

/// Retries allowed while the model warms up
pub const MAX_LOADING_RETRIES: u32 = 3;

/// Pause between warm-up retries
pub const LOADING_RETRY_DELAY: Duration = Duration::from_secs(3);

pub struct HuggingFaceProvider {
    http_client: HttpClient,
    api_key: String,
    base_url: String,
    loading_delay: Duration,
    cancel: CancellationToken,
}

impl std::fmt::Debug for HuggingFaceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HuggingFaceProvider")
            .field("base_url", &self.base_url)
            .field("loading_delay", &self.loading_delay)
            .finish()
    }
}

impl HuggingFaceProvider {
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            http_client: build_client(ProviderName::HuggingFace, config.timeout())?,
            api_key: config.api_key.clone(),
            base_url: config.base_url_or(HF_ROUTER_URL),
            loading_delay: LOADING_RETRY_DELAY,
            cancel: config.cancel.clone(),
        })
    }

    /// Change the pause between warm-up retries
    pub fn with_loading_delay(mut self, delay: Duration) -> Self {
        self.loading_delay = delay;
        self
    }
}

#[async_trait]
impl ImageProvider for HuggingFaceProvider {
    fn name(&self) -> ProviderName {
        ProviderName::HuggingFace
    }

    async fn generate(&self, params: &GenerateParams) -> Result<GenerateResult> {
        if matches!(params.request, ToolRequest::Rotate(_) | ToolRequest::Inpaint(_)) {
            return Err(ProviderError::unsupported(
                ProviderName::HuggingFace,
                format!("the {} tool", params.tool()),
            )
            .into());
        }

        let start = Instant::now();
        let prompt = build_prompt(params);
        let seed = resolve_seed(params.seed);
        let model = params.model_or(DEFAULT_MODEL);
        let (width, height) =
            VendorSizing::for_provider(ProviderName::HuggingFace).snap(params.width, params.height);

        let mut parameters = json!({
            "negative_prompt": build_negative_prompt(params),
            "width": width,
            "height": height,
            "guidance_scale": params.guidance,
            "seed": seed,
        });
        if let Some(steps) = params.steps {
            parameters["num_inference_steps"] = json!(steps);
        }
        let body = json!({ "inputs": prompt, "parameters": parameters });
        let url = format!("{}/hf-inference/models/{}", self.base_url, model);

        info!(provider = "huggingface", model, width, height, "Sending inference request");

        let mut loading_retries = 0;
        loop {
            let request = self
                .http_client
                .post(&url)
                .bearer_auth(&self.api_key)
                .header(reqwest::header::ACCEPT, "image/png")
                .json(&body);
            let response = send(ProviderName::HuggingFace, request, &self.cancel).await?;
            let status = response.status();

            if status.is_success() {
                let data_uri = image_as_data_uri(ProviderName::HuggingFace, response).await?;
                return Ok(GenerateResult::from_urls(ProviderName::HuggingFace, vec![data_uri])
                    .ok_or_else(|| {
                        ProviderError::invalid_response(ProviderName::HuggingFace, "no image")
                    })?
                    .with_seed(Some(seed))
                    .with_model(model)
                    .with_prompt(prompt)
                    .with_duration_ms(start.elapsed().as_millis() as u64));
            }

            let text = response.text().await.unwrap_or_default();
            if status.as_u16() == 503 && is_loading(&text) && loading_retries < MAX_LOADING_RETRIES {
                loading_retries += 1;
                warn!(
                    attempt = loading_retries,
                    delay_ms = self.loading_delay.as_millis() as u64,
                    model,
                    "Model is loading, retrying"
                );
                tokio::time::sleep(self.loading_delay).await;
                continue;
            }

            return Err(ProviderError::http(ProviderName::HuggingFace, status.as_u16(), &text).into());
        }
    }
}

/// Whether a 503 body is the "model is loading" warm-up response
fn is_loading(body: &str) -> bool {
    let body = body.to_lowercase();
    body.contains("loading") || body.contains("estimated_time")
}
