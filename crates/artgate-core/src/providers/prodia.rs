//! Prodia job adapter
//!
//! Submits an SDXL job (generate, transform or inpaint) and polls
//! `/v1/job/{id}`. The key is optional; without it the request goes out
//! unauthenticated and the vendor decides.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, RequestBuilder};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::http::{build_client, send_json};
use super::{ImageProvider, PollPolicy, PollStatus, VendorSizing, effective_poll_policy, poll_until};
use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};
use crate::generation::prompt::{build_negative_prompt, build_prompt, resolve_seed};
use crate::generation::{GenerateParams, GenerateResult, ToolRequest};
use crate::routing::ProviderName;

const PRODIA_BASE_URL: &str = "https://api.prodia.com";

const DEFAULT_MODEL: &str = "sd_xl_base_1.0.safetensors [be9edd61]";
const SAMPLER: &str = "DPM++ 2M Karras";
const DEFAULT_STEPS: u32 = 25;
const MAX_STEPS: u32 = 50;
const TRANSFORM_DENOISE: f32 = 0.6;

pub struct ProdiaProvider {
    http_client: HttpClient,
    api_key: String,
    base_url: String,
    poll: PollPolicy,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ProdiaProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProdiaProvider")
            .field("base_url", &self.base_url)
            .field("has_key", &!self.api_key.is_empty())
            .field("poll", &self.poll)
            .finish()
    }
}

impl ProdiaProvider {
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            http_client: build_client(ProviderName::Prodia, config.timeout())?,
            api_key: config.api_key.trim().to_string(),
            base_url: config.base_url_or(PRODIA_BASE_URL),
            poll: effective_poll_policy(ProviderName::Prodia, config),
            cancel: config.cancel.clone(),
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if self.api_key.is_empty() {
            request
        } else {
            request.header("X-Prodia-Key", &self.api_key)
        }
    }

    /// Endpoint path and body for the requested tool
    fn build_job(
        &self,
        params: &GenerateParams,
        prompt: &str,
        seed: u64,
        model: &str,
    ) -> Result<(&'static str, Value)> {
        let (width, height) =
            VendorSizing::for_provider(ProviderName::Prodia).snap(params.width, params.height);

        let mut body = json!({
            "model": model,
            "prompt": prompt,
            "negative_prompt": build_negative_prompt(params),
            "steps": params.steps.unwrap_or(DEFAULT_STEPS).clamp(1, MAX_STEPS),
            "cfg_scale": params.guidance,
            "seed": seed,
            "sampler": SAMPLER,
            "width": width,
            "height": height,
        });

        let path = match &params.request {
            ToolRequest::Generate | ToolRequest::Scene(_) => "/v1/sdxl/generate",
            ToolRequest::Rotate(extra) => {
                body["imageUrl"] = json!(extra.reference_image_url);
                body["denoising_strength"] = json!(TRANSFORM_DENOISE);
                "/v1/sdxl/transform"
            }
            ToolRequest::Inpaint(extra) => {
                body["imageUrl"] = json!(extra.image_url);
                body["maskUrl"] = json!(extra.mask_url);
                "/v1/sdxl/inpainting"
            }
            ToolRequest::Animate(_) => {
                return Err(ProviderError::unsupported(ProviderName::Prodia, "the animate tool").into());
            }
        };

        Ok((path, body))
    }

    async fn check_job(&self, job: &str) -> Result<PollStatus<String>> {
        let request = self.authorize(self.http_client.get(format!("{}/v1/job/{}", self.base_url, job)));
        let status: ProdiaJob = send_json(ProviderName::Prodia, request, &self.cancel).await?;

        debug!(job_id = job, status = %status.status, "Prodia job status");

        Ok(match status.status.as_str() {
            "succeeded" => match status.image_url {
                Some(url) => PollStatus::Done(url),
                None => PollStatus::Failed("job succeeded without an image URL".to_string()),
            },
            "failed" => PollStatus::Failed("job failed".to_string()),
            _ => PollStatus::Pending,
        })
    }
}

#[async_trait]
impl ImageProvider for ProdiaProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Prodia
    }

    async fn generate(&self, params: &GenerateParams) -> Result<GenerateResult> {
        let start = Instant::now();
        let prompt = build_prompt(params);
        let seed = resolve_seed(params.seed);
        let model = params.model_or(DEFAULT_MODEL);
        let (path, body) = self.build_job(params, &prompt, seed, model)?;

        info!(provider = "prodia", model, path, "Submitting job");
        let request = self.authorize(self.http_client.post(format!("{}{}", self.base_url, path)));
        let submitted: ProdiaJob = send_json(ProviderName::Prodia, request.json(&body), &self.cancel).await?;
        let job_id = submitted.job;

        let url = poll_until(ProviderName::Prodia, &job_id, &self.poll, &self.cancel, || {
            self.check_job(&job_id)
        })
        .await?;

        let result = GenerateResult::from_urls(ProviderName::Prodia, vec![url])
            .ok_or_else(|| ProviderError::invalid_response(ProviderName::Prodia, "no image"))?;

        Ok(result
            .with_job_id(job_id)
            .with_seed(Some(seed))
            .with_model(model)
            .with_prompt(prompt)
            .with_duration_ms(start.elapsed().as_millis() as u64))
    }
}

#[derive(Debug, Deserialize)]
struct ProdiaJob {
    job: String,
    #[serde(default)]
    status: String,
    #[serde(default, rename = "imageUrl")]
    image_url: Option<String>,
}
