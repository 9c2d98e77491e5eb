//! Local ComfyUI adapter
//!
//! Probes `/system_stats` first so a stopped server is reported as
//! unreachable rather than as a failed job. Generation queues a fixed
//! checkpoint -> CLIP encode -> KSampler -> VAE decode -> SaveImage graph on
//! `/prompt`, polls `/history/{id}` and downloads outputs through `/view`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::http::{build_client, ensure_success, image_as_data_uri, send, send_json};
use super::{ImageProvider, PollPolicy, PollStatus, VendorSizing, effective_poll_policy, poll_until};
use crate::config::ProviderConfig;
use crate::error::{ProviderError, ProviderErrorKind, Result};
use crate::generation::prompt::{build_negative_prompt, build_prompt, resolve_seed};
use crate::generation::{GenerateParams, GenerateResult, ToolRequest};
use crate::routing::ProviderName;

/// Checkpoint loaded when the caller does not name one
pub const DEFAULT_CHECKPOINT: &str = "sd_xl_base_1.0.safetensors";

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_STEPS: u32 = 25;
const MAX_BATCH: u32 = 8;

pub struct ComfyUiProvider {
    http_client: HttpClient,
    host: String,
    poll: PollPolicy,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ComfyUiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComfyUiProvider")
            .field("host", &self.host)
            .field("poll", &self.poll)
            .finish()
    }
}

impl ComfyUiProvider {
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            http_client: build_client(ProviderName::ComfyUi, config.timeout())?,
            host: config.comfyui_host.trim().trim_end_matches('/').to_string(),
            poll: effective_poll_policy(ProviderName::ComfyUi, config),
            cancel: config.cancel.clone(),
        })
    }

    /// Fail fast when nothing is listening on the host
    pub async fn probe(&self) -> Result<()> {
        let request = self
            .http_client
            .get(format!("{}/system_stats", self.host))
            .timeout(PROBE_TIMEOUT);

        let response = send(ProviderName::ComfyUi, request, &self.cancel)
            .await
            .map_err(|e| {
                let detail = match e.as_provider_error() {
                    Some(err) if err.kind != ProviderErrorKind::Cancelled => Some(err.message.clone()),
                    _ => None,
                };
                match detail {
                    Some(detail) => {
                        ProviderError::unreachable(ProviderName::ComfyUi, &self.host, detail).into()
                    }
                    None => e,
                }
            })?;

        if !response.status().is_success() {
            return Err(ProviderError::unreachable(
                ProviderName::ComfyUi,
                &self.host,
                format!("system_stats returned HTTP {}", response.status().as_u16()),
            )
            .into());
        }
        Ok(())
    }

    async fn check_history(&self, prompt_id: &str) -> Result<PollStatus<Vec<OutputImage>>> {
        let request = self
            .http_client
            .get(format!("{}/history/{}", self.host, prompt_id));
        let mut history: HashMap<String, HistoryEntry> =
            send_json(ProviderName::ComfyUi, request, &self.cancel).await?;

        // The history map stays empty until the prompt has run
        let Some(entry) = history.remove(prompt_id) else {
            return Ok(PollStatus::Pending);
        };

        if entry.status.status_str.as_deref() == Some("error") {
            return Ok(PollStatus::Failed(
                entry
                    .status
                    .messages
                    .iter()
                    .rev()
                    .find_map(execution_error_message)
                    .unwrap_or_else(|| "workflow execution failed".to_string()),
            ));
        }

        let images: Vec<OutputImage> = entry
            .outputs
            .into_values()
            .flat_map(|output| output.images)
            .collect();

        debug!(job_id = prompt_id, completed = entry.status.completed, images = images.len(), "ComfyUI history");

        if entry.status.completed || !images.is_empty() {
            if images.is_empty() {
                return Ok(PollStatus::Failed("workflow finished without images".to_string()));
            }
            return Ok(PollStatus::Done(images));
        }
        Ok(PollStatus::Pending)
    }

    async fn download(&self, image: &OutputImage) -> Result<String> {
        let request = self
            .http_client
            .get(format!("{}/view", self.host))
            .query(&[
                ("filename", image.filename.as_str()),
                ("subfolder", image.subfolder.as_str()),
                ("type", image.kind.as_str()),
            ]);
        let response = send(ProviderName::ComfyUi, request, &self.cancel).await?;
        let response = ensure_success(ProviderName::ComfyUi, response).await?;
        image_as_data_uri(ProviderName::ComfyUi, response).await
    }
}

/// Minimal text-to-image graph for one checkpoint
pub fn build_workflow(params: &GenerateParams, prompt: &str, seed: u64, checkpoint: &str) -> Value {
    let (width, height) =
        VendorSizing::for_provider(ProviderName::ComfyUi).snap(params.width, params.height);
    let batch_size = match &params.request {
        ToolRequest::Animate(extra) => extra.frames.clamp(1, MAX_BATCH),
        _ => 1,
    };

    json!({
        "3": {
            "class_type": "KSampler",
            "inputs": {
                "seed": seed,
                "steps": params.steps.unwrap_or(DEFAULT_STEPS),
                "cfg": params.guidance,
                "sampler_name": "euler",
                "scheduler": "normal",
                "denoise": 1.0,
                "model": ["4", 0],
                "positive": ["6", 0],
                "negative": ["7", 0],
                "latent_image": ["5", 0]
            }
        },
        "4": {
            "class_type": "CheckpointLoaderSimple",
            "inputs": { "ckpt_name": checkpoint }
        },
        "5": {
            "class_type": "EmptyLatentImage",
            "inputs": { "width": width, "height": height, "batch_size": batch_size }
        },
        "6": {
            "class_type": "CLIPTextEncode",
            "inputs": { "text": prompt, "clip": ["4", 1] }
        },
        "7": {
            "class_type": "CLIPTextEncode",
            "inputs": { "text": build_negative_prompt(params), "clip": ["4", 1] }
        },
        "8": {
            "class_type": "VAEDecode",
            "inputs": { "samples": ["3", 0], "vae": ["4", 2] }
        },
        "9": {
            "class_type": "SaveImage",
            "inputs": { "filename_prefix": "artgate", "images": ["8", 0] }
        }
    })
}

#[async_trait]
impl ImageProvider for ComfyUiProvider {
    fn name(&self) -> ProviderName {
        ProviderName::ComfyUi
    }

    async fn generate(&self, params: &GenerateParams) -> Result<GenerateResult> {
        if matches!(params.request, ToolRequest::Rotate(_) | ToolRequest::Inpaint(_)) {
            return Err(ProviderError::unsupported(
                ProviderName::ComfyUi,
                format!("the {} tool", params.tool()),
            )
            .into());
        }

        self.probe().await?;

        let start = Instant::now();
        let prompt = build_prompt(params);
        let seed = resolve_seed(params.seed);
        let checkpoint = params.model_or(DEFAULT_CHECKPOINT);
        let client_id = Uuid::new_v4().to_string();

        let body = json!({
            "prompt": build_workflow(params, &prompt, seed, checkpoint),
            "client_id": client_id,
        });

        info!(provider = "comfyui", host = %self.host, checkpoint, "Queueing workflow");
        let request = self.http_client.post(format!("{}/prompt", self.host)).json(&body);
        let queued: QueuedPrompt = send_json(ProviderName::ComfyUi, request, &self.cancel).await?;
        let prompt_id = queued.prompt_id;

        let images = poll_until(ProviderName::ComfyUi, &prompt_id, &self.poll, &self.cancel, || {
            self.check_history(&prompt_id)
        })
        .await?;

        let mut urls = Vec::with_capacity(images.len());
        for image in &images {
            urls.push(self.download(image).await.map_err(|e| e.with_job_id(&prompt_id))?);
        }

        let result = GenerateResult::from_urls(ProviderName::ComfyUi, urls)
            .ok_or_else(|| ProviderError::invalid_response(ProviderName::ComfyUi, "no image"))?;

        Ok(result
            .with_job_id(prompt_id)
            .with_seed(Some(seed))
            .with_model(checkpoint)
            .with_prompt(prompt)
            .with_duration_ms(start.elapsed().as_millis() as u64))
    }
}

/// Pull the message out of an `execution_error` status entry
fn execution_error_message(message: &Value) -> Option<String> {
    let pair = message.as_array()?;
    if pair.first()?.as_str()? != "execution_error" {
        return None;
    }
    pair.get(1)?
        .get("exception_message")?
        .as_str()
        .map(|s| s.trim().to_string())
}

#[derive(Debug, Deserialize)]
struct QueuedPrompt {
    prompt_id: String,
}

#[derive(Debug, Deserialize)]
struct HistoryEntry {
    #[serde(default)]
    status: HistoryStatus,
    #[serde(default)]
    outputs: HashMap<String, NodeOutput>,
}

#[derive(Debug, Default, Deserialize)]
struct HistoryStatus {
    #[serde(default)]
    status_str: Option<String>,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    messages: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct NodeOutput {
    #[serde(default)]
    images: Vec<OutputImage>,
}

#[derive(Debug, Clone, Deserialize)]
struct OutputImage {
    filename: String,
    #[serde(default)]
    subfolder: String,
    #[serde(rename = "type", default = "default_output_type")]
    kind: String,
}

fn default_output_type() -> String {
    "output".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_wires_nodes() {
        let params = GenerateParams::new("castle").with_size(1000, 600).with_steps(30);
        let workflow = build_workflow(&params, "castle", 99, "custom.safetensors");

        assert_eq!(workflow["4"]["inputs"]["ckpt_name"], "custom.safetensors");
        assert_eq!(workflow["3"]["inputs"]["seed"], 99);
        assert_eq!(workflow["3"]["inputs"]["steps"], 30);
        assert_eq!(workflow["5"]["inputs"]["width"], 1024);
        assert_eq!(workflow["5"]["inputs"]["height"], 576);
        assert_eq!(workflow["6"]["inputs"]["text"], "castle");
        assert_eq!(workflow["8"]["inputs"]["samples"], json!(["3", 0]));
        assert_eq!(workflow["9"]["class_type"], "SaveImage");
    }

    #[test]
    fn test_execution_error_message() {
        let message = json!(["execution_error", {"exception_message": " CUDA out of memory "}]);
        assert_eq!(
            execution_error_message(&message).as_deref(),
            Some("CUDA out of memory")
        );
        assert_eq!(execution_error_message(&json!(["execution_start", {}])), None);
    }

    #[tokio::test]
    async fn test_probe_reports_unreachable_host() {
        let config = ProviderConfig {
            comfyui_host: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        };
        let provider = ComfyUiProvider::from_config(&config).unwrap();
        let err = provider.probe().await.unwrap_err();
        let provider_err = err.as_provider_error().unwrap();
        assert_eq!(provider_err.kind, ProviderErrorKind::Unreachable);
        assert!(provider_err.skip_provider);
        assert!(err.to_string().contains("http://127.0.0.1:9"));
    }
}
