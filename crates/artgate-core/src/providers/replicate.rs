//! Replicate predictions adapter
//!
//! Creates a prediction, then polls `/v1/predictions/{id}` until it reports
//! `succeeded`, `failed` or `canceled`.

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

const REPLICATE_BASE_URL: &str = "https://api.replicate.com";

const DEFAULT_MODEL: &str = "black-forest-labs/flux-dev";
const INPAINT_MODEL: &str = "black-forest-labs/flux-fill-dev";

/// Strength used when a reference image seeds the output
const REFERENCE_PROMPT_STRENGTH: f32 = 0.75;

pub struct ReplicateProvider {
    http_client: HttpClient,
    api_key: String,
    base_url: String,
    poll: PollPolicy,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ReplicateProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicateProvider")
            .field("base_url", &self.base_url)
            .field("poll", &self.poll)
            .finish()
    }
}

impl ReplicateProvider {
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            http_client: build_client(ProviderName::Replicate, config.timeout())?,
            api_key: config.api_key.clone(),
            base_url: config.base_url_or(REPLICATE_BASE_URL),
            poll: effective_poll_policy(ProviderName::Replicate, config),
            cancel: config.cancel.clone(),
        })
    }

    fn default_model(request: &ToolRequest) -> &'static str {
        match request {
            ToolRequest::Inpaint(_) => INPAINT_MODEL,
            _ => DEFAULT_MODEL,
        }
    }

    fn build_input(&self, params: &GenerateParams, prompt: &str, seed: u64) -> Value {
        let (width, height) = VendorSizing::for_provider(ProviderName::Replicate)
            .snap(params.width, params.height);

        let mut input = json!({
            "prompt": prompt,
            "width": width,
            "height": height,
            "seed": seed,
            "guidance": params.guidance,
            "output_format": "png",
            "num_outputs": 1,
        });

        if let Some(steps) = params.steps {
            input["num_inference_steps"] = json!(steps);
        }

        match &params.request {
            ToolRequest::Animate(extra) => {
                input["num_outputs"] = json!(extra.frames.clamp(1, 4));
                if let Some(url) = &extra.reference_image_url {
                    input["image"] = json!(url);
                    input["prompt_strength"] = json!(REFERENCE_PROMPT_STRENGTH);
                }
            }
            ToolRequest::Rotate(extra) => {
                input["image"] = json!(extra.reference_image_url);
                input["prompt_strength"] = json!(REFERENCE_PROMPT_STRENGTH);
            }
            ToolRequest::Inpaint(extra) => {
                input["image"] = json!(extra.image_url);
                input["mask"] = json!(extra.mask_url);
            }
            ToolRequest::Generate | ToolRequest::Scene(_) => {}
        }

        input
    }

    async fn create_prediction(&self, model: &str, input: Value) -> Result<Prediction> {
        // "owner/name:version" pins a version; "owner/name" runs the latest
        let (url, body) = match model.split_once(':') {
            Some((_, version)) => (
                format!("{}/v1/predictions", self.base_url),
                json!({ "version": version, "input": input }),
            ),
            None => (
                format!("{}/v1/models/{}/predictions", self.base_url, model),
                json!({ "input": input }),
            ),
        };

        let request = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body);
        send_json(ProviderName::Replicate, request, &self.cancel).await
    }

    async fn check_prediction(&self, id: &str) -> Result<PollStatus<Vec<String>>> {
        let url = format!("{}/v1/predictions/{}", self.base_url, id);
        let request = self.http_client.get(&url).bearer_auth(&self.api_key);
        let prediction: Prediction = send_json(ProviderName::Replicate, request, &self.cancel).await?;

        debug!(job_id = id, status = %prediction.status, "Replicate prediction status");

        Ok(match prediction.status.as_str() {
            "succeeded" => PollStatus::Done(output_urls(prediction.output.as_ref())),
            "failed" | "canceled" => PollStatus::Failed(
                prediction
                    .error
                    .map(|e| match e {
                        Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .unwrap_or_else(|| format!("prediction {}", prediction.status)),
            ),
            _ => PollStatus::Pending,
        })
    }
}

#[async_trait]
impl ImageProvider for ReplicateProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Replicate
    }

    async fn generate(&self, params: &GenerateParams) -> Result<GenerateResult> {
        let start = Instant::now();
        let prompt = build_prompt(params);
        let seed = resolve_seed(params.seed);
        let model = params.model_or(Self::default_model(&params.request));
        let input = self.build_input(params, &prompt, seed);

        info!(provider = "replicate", model, tool = %params.tool(), "Creating prediction");
        let prediction = self.create_prediction(model, input).await?;
        let job_id = prediction.id;

        let urls = poll_until(ProviderName::Replicate, &job_id, &self.poll, &self.cancel, || {
            self.check_prediction(&job_id)
        })
        .await?;

        let result = GenerateResult::from_urls(ProviderName::Replicate, urls).ok_or_else(|| {
            ProviderError::invalid_response(ProviderName::Replicate, "prediction succeeded without output")
                .with_job_id(&job_id)
        })?;

        Ok(result
            .with_job_id(job_id)
            .with_seed(Some(seed))
            .with_model(model)
            .with_prompt(prompt)
            .with_duration_ms(start.elapsed().as_millis() as u64))
    }
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// Replicate models return either a single URL or a list of URLs
fn output_urls(output: Option<&Value>) -> Vec<String> {
    match output {
        Some(Value::String(url)) => vec![url.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_urls_accepts_string_or_list() {
        assert_eq!(
            output_urls(Some(&json!("https://replicate.delivery/a.png"))),
            vec!["https://replicate.delivery/a.png"]
        );
        assert_eq!(
            output_urls(Some(&json!(["https://r/a.png", "https://r/b.png"]))),
            vec!["https://r/a.png", "https://r/b.png"]
        );
        assert!(output_urls(None).is_empty());
        assert!(output_urls(Some(&json!({"weird": true}))).is_empty());
    }

    #[test]
    fn test_input_snaps_size_and_maps_inpaint() {
        let provider = ReplicateProvider::from_config(&ProviderConfig::with_api_key("r8_x")).unwrap();
        let params = GenerateParams::new("door")
            .with_size(1500, 700)
            .with_request(ToolRequest::Inpaint(crate::generation::InpaintExtra {
                image_url: "https://img".into(),
                mask_url: "https://mask".into(),
            }));

        let input = provider.build_input(&params, "door", 5);
        assert_eq!(input["width"], 1408);
        assert_eq!(input["height"], 704);
        assert_eq!(input["mask"], "https://mask");
        assert_eq!(ReplicateProvider::default_model(&params.request), INPAINT_MODEL);
    }
}
