//! Stable Horde adapter
//!
//! The volunteer network may have no worker for a given model, so the whole
//! submit / check / status cycle is repeated over a short list of candidate
//! models until one produces an image.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::http::{build_client, send_json};
use super::{ImageProvider, PollPolicy, PollStatus, VendorSizing, effective_poll_policy, poll_until};
use crate::config::{ProviderConfig, STABLE_HORDE_ANONYMOUS_KEY};
use crate::error::{Error, ProviderError, Result};
use crate::generation::prompt::{build_negative_prompt, build_prompt, resolve_seed};
use crate::generation::{GenerateParams, GenerateResult, ToolRequest};
use crate::routing::ProviderName;

const STABLE_HORDE_BASE_URL: &str = "https://stablehorde.net";

const CLIENT_AGENT: &str = concat!("artgate:", env!("CARGO_PKG_VERSION"), ":unknown");

/// Tried in order when the caller does not pin a model
pub const CANDIDATE_MODELS: [&str; 3] = ["AlbedoBase XL (SDXL)", "Deliberate", "stable_diffusion"];

const DEFAULT_STEPS: u32 = 25;
const MAX_STEPS: u32 = 50;
const SAMPLER: &str = "k_euler_a";
const IMG2IMG_DENOISE: f32 = 0.65;

pub struct StableHordeProvider {
    http_client: HttpClient,
    api_key: String,
    base_url: String,
    poll: PollPolicy,
    cancel: CancellationToken,
}

impl std::fmt::Debug for StableHordeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StableHordeProvider")
            .field("base_url", &self.base_url)
            .field("anonymous", &(self.api_key == STABLE_HORDE_ANONYMOUS_KEY))
            .field("poll", &self.poll)
            .finish()
    }
}

impl StableHordeProvider {
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let api_key = if config.api_key.trim().is_empty() {
            STABLE_HORDE_ANONYMOUS_KEY.to_string()
        } else {
            config.api_key.clone()
        };
        Ok(Self {
            http_client: build_client(ProviderName::StableHorde, config.timeout())?,
            api_key,
            base_url: config.base_url_or(STABLE_HORDE_BASE_URL),
            poll: effective_poll_policy(ProviderName::StableHorde, config),
            cancel: config.cancel.clone(),
        })
    }

    fn build_body(&self, params: &GenerateParams, prompt: &str, seed: u64, model: &str) -> Value {
        let (width, height) =
            VendorSizing::for_provider(ProviderName::StableHorde).snap(params.width, params.height);
        let steps = params.steps.unwrap_or(DEFAULT_STEPS).clamp(1, MAX_STEPS);

        let images = match &params.request {
            ToolRequest::Animate(extra) => extra.frames.clamp(1, 4),
            _ => 1,
        };

        let mut body = json!({
            // Horde takes the negative prompt after a ### separator
            "prompt": format!("{} ### {}", prompt, build_negative_prompt(params)),
            "params": {
                "width": width,
                "height": height,
                "steps": steps,
                "cfg_scale": params.guidance,
                "seed": seed.to_string(),
                "sampler_name": SAMPLER,
                "n": images,
            },
            "models": [model],
            "nsfw": false,
            "censor_nsfw": true,
            "r2": true,
        });

        match &params.request {
            ToolRequest::Rotate(extra) => {
                body["source_image"] = json!(extra.reference_image_url);
                body["source_processing"] = json!("img2img");
                body["params"]["denoising_strength"] = json!(IMG2IMG_DENOISE);
            }
            ToolRequest::Inpaint(extra) => {
                body["source_image"] = json!(extra.image_url);
                body["source_mask"] = json!(extra.mask_url);
                body["source_processing"] = json!("inpainting");
            }
            ToolRequest::Animate(extra) => {
                if let Some(url) = &extra.reference_image_url {
                    body["source_image"] = json!(url);
                    body["source_processing"] = json!("img2img");
                    body["params"]["denoising_strength"] = json!(IMG2IMG_DENOISE);
                }
            }
            ToolRequest::Generate | ToolRequest::Scene(_) => {}
        }

        body
    }

    async fn check(&self, id: &str) -> Result<PollStatus<()>> {
        let request = self
            .http_client
            .get(format!("{}/api/v2/generate/check/{}", self.base_url, id))
            .header("Client-Agent", CLIENT_AGENT);
        let check: HordeCheck = send_json(ProviderName::StableHorde, request, &self.cancel).await?;

        debug!(job_id = id, wait_time = check.wait_time, queue_position = check.queue_position, "Horde check");

        Ok(if check.faulted {
            PollStatus::Failed("job faulted on the horde".to_string())
        } else if !check.is_possible {
            PollStatus::Failed("no worker can serve this request".to_string())
        } else if check.done {
            PollStatus::Done(())
        } else {
            PollStatus::Pending
        })
    }

    /// One full submit / check / status cycle on a single model
    async fn run_model(
        &self,
        params: &GenerateParams,
        prompt: &str,
        seed: u64,
        model: &str,
        poll: &PollPolicy,
    ) -> Result<(String, Vec<String>)> {
        let request = self
            .http_client
            .post(format!("{}/api/v2/generate/async", self.base_url))
            .header("apikey", &self.api_key)
            .header("Client-Agent", CLIENT_AGENT)
            .json(&self.build_body(params, prompt, seed, model));
        let submitted: HordeSubmit = send_json(ProviderName::StableHorde, request, &self.cancel).await?;
        let id = submitted.id;

        info!(provider = "stable-horde", job_id = %id, model, kudos = submitted.kudos, "Job queued");

        poll_until(ProviderName::StableHorde, &id, poll, &self.cancel, || self.check(&id))
            .await?;

        let request = self
            .http_client
            .get(format!("{}/api/v2/generate/status/{}", self.base_url, id))
            .header("Client-Agent", CLIENT_AGENT);
        let status: HordeStatus = send_json(ProviderName::StableHorde, request, &self.cancel)
            .await
            .map_err(|e| e.with_job_id(&id))?;

        if status.faulted {
            return Err(ProviderError::job_failed(ProviderName::StableHorde, "job faulted")
                .with_job_id(&id)
                .into());
        }

        let urls: Vec<String> = status
            .generations
            .into_iter()
            .filter(|g| !g.censored)
            .map(|g| g.img)
            .collect();
        if urls.is_empty() {
            return Err(ProviderError::job_failed(
                ProviderName::StableHorde,
                "job finished without a usable image",
            )
            .with_job_id(&id)
            .into());
        }

        Ok((id, urls))
    }
}

#[async_trait]
impl ImageProvider for StableHordeProvider {
    fn name(&self) -> ProviderName {
        ProviderName::StableHorde
    }

    async fn generate(&self, params: &GenerateParams) -> Result<GenerateResult> {
        let start = Instant::now();
        let prompt = build_prompt(params);
        let seed = resolve_seed(params.seed);

        let models: Vec<&str> = match params.model_override.as_deref().map(str::trim) {
            Some(model) if !model.is_empty() => vec![model],
            _ => CANDIDATE_MODELS.to_vec(),
        };

        // The model walk shares one deadline
        let budget = self.poll.deadline;
        let mut last_error: Option<Error> = None;
        for model in models {
            let remaining = budget.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                let last_job = last_error
                    .as_ref()
                    .and_then(Error::as_provider_error)
                    .and_then(|e| e.provider_job_id.clone());
                let mut err = ProviderError::timeout(ProviderName::StableHorde, start.elapsed());
                err.provider_job_id = last_job;
                warn!(model, "Horde budget spent, not trying further models");
                return Err(err.into());
            }

            let poll = self.poll.capped_at(remaining);
            match self.run_model(params, &prompt, seed, model, &poll).await {
                Ok((job_id, urls)) => {
                    let result = GenerateResult::from_urls(ProviderName::StableHorde, urls)
                        .ok_or_else(|| {
                            ProviderError::invalid_response(ProviderName::StableHorde, "no image")
                        })?;
                    return Ok(result
                        .with_job_id(job_id)
                        .with_seed(Some(seed))
                        .with_model(model)
                        .with_prompt(prompt)
                        .with_duration_ms(start.elapsed().as_millis() as u64));
                }
                Err(e) if e.is_skippable() => {
                    warn!(model, error = %e, "Horde model failed, trying next candidate");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ProviderError::job_failed(ProviderName::StableHorde, "no candidate models").into()
        }))
    }
}

#[derive(Debug, Deserialize)]
struct HordeSubmit {
    id: String,
    #[serde(default)]
    kudos: f64,
}

#[derive(Debug, Deserialize)]
struct HordeCheck {
    #[serde(default)]
    done: bool,
    #[serde(default)]
    faulted: bool,
    #[serde(default = "default_true")]
    is_possible: bool,
    #[serde(default)]
    wait_time: u64,
    #[serde(default)]
    queue_position: u64,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct HordeStatus {
    #[serde(default)]
    faulted: bool,
    #[serde(default)]
    generations: Vec<HordeGeneration>,
}

#[derive(Debug, Deserialize)]
struct HordeGeneration {
    img: String,
    #[serde(default)]
    censored: bool,
}
