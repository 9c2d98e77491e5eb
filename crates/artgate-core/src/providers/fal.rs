//! fal.ai queue adapter
//!
//! Submits to the queue, polls the request status until `COMPLETED`, then
//! fetches the result document.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::http::{build_client, send_json};
use super::{ImageProvider, PollPolicy, PollStatus, VendorSizing, effective_poll_policy, poll_until};
use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};
use crate::generation::prompt::{build_prompt, resolve_seed};
use crate::generation::{GenerateParams, GenerateResult, ToolRequest};
use crate::routing::ProviderName;

const FAL_QUEUE_URL: &str = "https://queue.fal.run";

const TEXT_TO_IMAGE_MODEL: &str = "fal-ai/flux/dev";
const IMAGE_TO_IMAGE_MODEL: &str = "fal-ai/flux/dev/image-to-image";
const INPAINT_MODEL: &str = "fal-ai/flux-lora/inpainting";

const REFERENCE_STRENGTH: f32 = 0.8;

pub struct FalProvider {
    http_client: HttpClient,
    api_key: String,
    base_url: String,
    poll: PollPolicy,
    cancel: CancellationToken,
}

impl std::fmt::Debug for FalProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FalProvider")
            .field("base_url", &self.base_url)
            .field("poll", &self.poll)
            .finish()
    }
}

impl FalProvider {
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            http_client: build_client(ProviderName::Fal, config.timeout())?,
            api_key: config.api_key.clone(),
            base_url: config.base_url_or(FAL_QUEUE_URL),
            poll: effective_poll_policy(ProviderName::Fal, config),
            cancel: config.cancel.clone(),
        })
    }

    fn default_model(request: &ToolRequest) -> &'static str {
        match request {
            ToolRequest::Inpaint(_) => INPAINT_MODEL,
            ToolRequest::Rotate(_) => IMAGE_TO_IMAGE_MODEL,
            ToolRequest::Animate(extra) if extra.reference_image_url.is_some() => {
                IMAGE_TO_IMAGE_MODEL
            }
            _ => TEXT_TO_IMAGE_MODEL,
        }
    }

    fn build_body(&self, params: &GenerateParams, prompt: &str, seed: u64) -> Value {
        let (width, height) =
            VendorSizing::for_provider(ProviderName::Fal).snap(params.width, params.height);

        let mut body = json!({
            "prompt": prompt,
            "image_size": { "width": width, "height": height },
            "guidance_scale": params.guidance,
            "seed": seed,
            "num_images": 1,
            "enable_safety_checker": false,
            "output_format": "png",
        });

        if let Some(steps) = params.steps {
            body["num_inference_steps"] = json!(steps);
        }

        match &params.request {
            ToolRequest::Animate(extra) => {
                body["num_images"] = json!(extra.frames.clamp(1, 4));
                if let Some(url) = &extra.reference_image_url {
                    body["image_url"] = json!(url);
                    body["strength"] = json!(REFERENCE_STRENGTH);
                }
            }
            ToolRequest::Rotate(extra) => {
                body["image_url"] = json!(extra.reference_image_url);
                body["strength"] = json!(REFERENCE_STRENGTH);
            }
            ToolRequest::Inpaint(extra) => {
                body["image_url"] = json!(extra.image_url);
                body["mask_url"] = json!(extra.mask_url);
            }
            ToolRequest::Generate | ToolRequest::Scene(_) => {}
        }

        body
    }

    fn auth(&self) -> String {
        format!("Key {}", self.api_key)
    }

    async fn check_status(&self, status_url: &str) -> Result<PollStatus<()>> {
        let request = self
            .http_client
            .get(status_url)
            .header(reqwest::header::AUTHORIZATION, self.auth());
        let status: QueueStatus = send_json(ProviderName::Fal, request, &self.cancel).await?;

        debug!(status = %status.status, "fal.ai queue status");

        Ok(match status.status.as_str() {
            "COMPLETED" => match status.error {
                Some(error) => PollStatus::Failed(error),
                None => PollStatus::Done(()),
            },
            "FAILED" | "ERROR" | "CANCELLED" => PollStatus::Failed(
                status
                    .error
                    .unwrap_or_else(|| format!("request {}", status.status.to_lowercase())),
            ),
            _ => PollStatus::Pending,
        })
    }
}

#[async_trait]
impl ImageProvider for FalProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Fal
    }

    async fn generate(&self, params: &GenerateParams) -> Result<GenerateResult> {
        let start = Instant::now();
        let prompt = build_prompt(params);
        let seed = resolve_seed(params.seed);
        let model = params.model_or(Self::default_model(&params.request));
        let body = self.build_body(params, &prompt, seed);

        info!(provider = "fal", model, tool = %params.tool(), "Submitting queue request");
        let request = self
            .http_client
            .post(format!("{}/{}", self.base_url, model))
            .header(reqwest::header::AUTHORIZATION, self.auth())
            .json(&body);
        let submitted: QueueSubmit = send_json(ProviderName::Fal, request, &self.cancel).await?;
        let request_id = submitted.request_id;

        let status_url = submitted
            .status_url
            .unwrap_or_else(|| format!("{}/{}/requests/{}/status", self.base_url, model, request_id));
        let response_url = submitted
            .response_url
            .unwrap_or_else(|| format!("{}/{}/requests/{}", self.base_url, model, request_id));

        poll_until(ProviderName::Fal, &request_id, &self.poll, &self.cancel, || {
            self.check_status(&status_url)
        })
        .await?;

        let request = self
            .http_client
            .get(&response_url)
            .header(reqwest::header::AUTHORIZATION, self.auth());
        let output: FalOutput = send_json(ProviderName::Fal, request, &self.cancel)
            .await
            .map_err(|e| e.with_job_id(&request_id))?;

        let urls = output.images.into_iter().map(|image| image.url).collect();
        let result = GenerateResult::from_urls(ProviderName::Fal, urls).ok_or_else(|| {
            ProviderError::invalid_response(ProviderName::Fal, "result contained no images")
                .with_job_id(&request_id)
        })?;

        Ok(result
            .with_job_id(request_id)
            .with_seed(Some(seed))
            .with_model(model)
            .with_prompt(prompt)
            .with_duration_ms(start.elapsed().as_millis() as u64))
    }
}

#[derive(Debug, Deserialize)]
struct QueueSubmit {
    request_id: String,
    #[serde(default)]
    status_url: Option<String>,
    #[serde(default)]
    response_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueueStatus {
    status: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FalOutput {
    #[serde(default)]
    images: Vec<FalImage>,
}

#[derive(Debug, Deserialize)]
struct FalImage {
    url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{AnimateExtra, RotateExtra};

    #[test]
    fn test_model_follows_tool() {
        assert_eq!(FalProvider::default_model(&ToolRequest::Generate), TEXT_TO_IMAGE_MODEL);
        assert_eq!(
            FalProvider::default_model(&ToolRequest::Rotate(RotateExtra {
                reference_image_url: "https://img".into(),
                directions: 8,
            })),
            IMAGE_TO_IMAGE_MODEL
        );
        assert_eq!(
            FalProvider::default_model(&ToolRequest::Animate(AnimateExtra {
                frames: 4,
                fps: 8,
                looping: true,
                reference_image_url: None,
            })),
            TEXT_TO_IMAGE_MODEL
        );
    }

    #[test]
    fn test_body_uses_image_size_object() {
        let provider = FalProvider::from_config(&ProviderConfig::with_api_key("fal")).unwrap();
        let body = provider.build_body(&GenerateParams::new("x").with_size(500, 3000), "x", 9);
        assert_eq!(body["image_size"]["width"], 512);
        assert_eq!(body["image_size"]["height"], 2048);
        assert_eq!(body["seed"], 9);
    }
}
