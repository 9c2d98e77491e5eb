//! Pollinations adapter
//!
//! Keyless GET with the prompt in the URL path. This is the last-resort
//! provider every routing list ends with, so it retries server errors and
//! runs with the full generation timeout.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client as HttpClient, Url};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::http::{build_client, ensure_success, image_as_data_uri, send};
use super::{ImageProvider, VendorSizing};
use crate::config::ProviderConfig;
use crate::error::{Error, ProviderError, Result};
use crate::generation::prompt::{build_negative_prompt, build_prompt, resolve_seed};
use crate::generation::{GenerateParams, GenerateResult, ToolRequest};
use crate::routing::ProviderName;

const POLLINATIONS_BASE_URL: &str = "https://image.pollinations.ai";

const DEFAULT_MODEL: &str = "flux";
const IMAGE_EDIT_MODEL: &str = "kontext";

/// Extra attempts after a 5xx
pub const MAX_SERVER_ERROR_RETRIES: u32 = 2;

/// Linear backoff step between retries
pub const RETRY_STEP: Duration = Duration::from_secs(2);

pub struct PollinationsProvider {
    http_client: HttpClient,
    base_url: String,
    retry_step: Duration,
    cancel: CancellationToken,
}

impl std::fmt::Debug for PollinationsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollinationsProvider")
            .field("base_url", &self.base_url)
            .field("retry_step", &self.retry_step)
            .finish()
    }
}

impl PollinationsProvider {
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            http_client: build_client(ProviderName::Pollinations, config.timeout())?,
            base_url: config.base_url_or(POLLINATIONS_BASE_URL),
            retry_step: RETRY_STEP,
            cancel: config.cancel.clone(),
        })
    }

    /// Change the linear backoff step
    pub fn with_retry_step(mut self, step: Duration) -> Self {
        self.retry_step = step;
        self
    }

    fn build_url(&self, params: &GenerateParams, prompt: &str, seed: u64, model: &str) -> Result<Url> {
        let (width, height) =
            VendorSizing::for_provider(ProviderName::Pollinations).snap(params.width, params.height);

        let mut url = Url::parse(&self.base_url).map_err(|e| {
            Error::ConfigError(format!("Invalid Pollinations base URL {}: {}", self.base_url, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| Error::ConfigError(format!("Base URL cannot hold a path: {}", self.base_url)))?
            .pop_if_empty()
            .push("prompt")
            .push(prompt);

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("width", &width.to_string())
                .append_pair("height", &height.to_string())
                .append_pair("seed", &seed.to_string())
                .append_pair("model", model)
                .append_pair("negative_prompt", &build_negative_prompt(params))
                .append_pair("nologo", "true")
                .append_pair("private", "true");
            if let Some(image) = params.request.source_image_url() {
                query.append_pair("image", image);
            }
        }

        Ok(url)
    }
}

#[async_trait]
impl ImageProvider for PollinationsProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Pollinations
    }

    async fn generate(&self, params: &GenerateParams) -> Result<GenerateResult> {
        let start = Instant::now();
        let prompt = build_prompt(params);
        let seed = resolve_seed(params.seed);
        let default_model = match params.request {
            ToolRequest::Rotate(_) | ToolRequest::Inpaint(_) => IMAGE_EDIT_MODEL,
            _ => DEFAULT_MODEL,
        };
        let model = params.model_or(default_model);
        let url = self.build_url(params, &prompt, seed, model)?;

        info!(provider = "pollinations", model, "Requesting image");

        let mut attempt = 0;
        let response = loop {
            let response = send(
                ProviderName::Pollinations,
                self.http_client.get(url.clone()),
                &self.cancel,
            )
            .await?;

            match ensure_success(ProviderName::Pollinations, response).await {
                Ok(response) => break response,
                Err(Error::Provider(err))
                    if err.status_code.is_some_and(|s| s >= 500)
                        && attempt < MAX_SERVER_ERROR_RETRIES =>
                {
                    attempt += 1;
                    let delay = self.retry_step * attempt;
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying Pollinations after server error"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        };

        let data_uri = image_as_data_uri(ProviderName::Pollinations, response).await?;
        let result = GenerateResult::from_urls(ProviderName::Pollinations, vec![data_uri])
            .ok_or_else(|| ProviderError::invalid_response(ProviderName::Pollinations, "no image"))?;

        Ok(result
            .with_seed(Some(seed))
            .with_model(model)
            .with_prompt(prompt)
            .with_duration_ms(start.elapsed().as_millis() as u64))
    }
}
