//! HTTP plumbing shared by the adapters

use std::time::Duration;

use reqwest::{Client as HttpClient, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::error::{ProviderError, Result};
use crate::generation::prompt::{sniff_image_mime, to_data_uri};
use crate::routing::ProviderName;

const USER_AGENT: &str = concat!("artgate/", env!("CARGO_PKG_VERSION"));

/// Build an HTTP client with a per-request timeout
pub(crate) fn build_client(provider: ProviderName, timeout: Duration) -> Result<HttpClient> {
    HttpClient::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ProviderError::network(provider, &e).into())
}

/// Send a request, abandoning it if the caller cancels first
pub(crate) async fn send(
    provider: ProviderName,
    request: RequestBuilder,
    cancel: &CancellationToken,
) -> Result<Response> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProviderError::cancelled(provider).into()),
        result = request.send() => result.map_err(|e| ProviderError::network(provider, &e).into()),
    }
}

/// Turn a non-success response into a classified [`ProviderError`]
pub(crate) async fn ensure_success(provider: ProviderName, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::http(provider, status.as_u16(), &body).into())
}

/// Send, check the status and decode a JSON body
pub(crate) async fn send_json<T: DeserializeOwned>(
    provider: ProviderName,
    request: RequestBuilder,
    cancel: &CancellationToken,
) -> Result<T> {
    let response = ensure_success(provider, send(provider, request, cancel).await?).await?;
    response.json().await.map_err(|e| {
        ProviderError::invalid_response(provider, format!("Failed to parse response: {}", e)).into()
    })
}

/// Read an image body into a `data:` URI
pub(crate) async fn image_as_data_uri(provider: ProviderName, response: Response) -> Result<String> {
    let declared = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ProviderError::network(provider, &e))?;

    if bytes.is_empty() {
        return Err(ProviderError::invalid_response(provider, "empty image body").into());
    }

    let mime = match declared {
        Some(mime) if mime.starts_with("image/") => mime,
        _ => sniff_image_mime(&bytes).to_string(),
    };
    Ok(to_data_uri(&mime, &bytes))
}
