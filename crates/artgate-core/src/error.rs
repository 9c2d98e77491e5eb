//! Error types for Artgate

use std::time::Duration;

use thiserror::Error;

use crate::routing::ProviderName;

/// Result type alias using Artgate's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Artgate error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (E100-E199)
    #[error(
        "{provider} requires an API key. Set {env_var} in the server environment, \
         or add your own key under Settings > API Keys."
    )]
    MissingCredential {
        provider: ProviderName,
        env_var: &'static str,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Provider errors (E200-E299)
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("All {attempts} candidate providers failed. Last error: {last}")]
    AllProvidersFailed {
        attempts: usize,
        last: Box<Error>,
    },

    #[error("Every variant in the batch failed ({} errors)", .failures.len())]
    BatchFailed { failures: Vec<Error> },

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingCredential { .. } => "E100",
            Self::ConfigError(_) => "E101",
            Self::Provider(err) => err.kind.code(),
            Self::AllProvidersFailed { .. } => "E290",
            Self::BatchFailed { .. } => "E291",
            Self::InvalidInput(_) => "E800",
            Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::MissingCredential { env_var, .. } => {
                Some(format!("export {}=<your key>", env_var))
            }
            Self::Provider(err) => match err.kind {
                ProviderErrorKind::Unreachable => {
                    Some("Start ComfyUI or set COMFYUI_HOST to a reachable server".to_string())
                }
                ProviderErrorKind::Timeout => {
                    Some("Raise GENERATION_TIMEOUT_MS or try another provider".to_string())
                }
                _ if err.skip_provider => Some("Retry with the next ranked provider".to_string()),
                _ => None,
            },
            Self::AllProvidersFailed { .. } => Some("artgate providers".to_string()),
            _ => None,
        }
    }

    /// Whether a failover loop should move on to the next candidate
    pub fn is_skippable(&self) -> bool {
        match self {
            Self::Provider(err) => err.skip_provider,
            Self::MissingCredential { .. } => true,
            _ => false,
        }
    }

    /// Attach a vendor job id to a provider error that lacks one
    pub fn with_job_id(self, job_id: &str) -> Self {
        match self {
            Self::Provider(err) if err.provider_job_id.is_none() => {
                Self::Provider(err.with_job_id(job_id))
            }
            other => other,
        }
    }

    /// The provider error behind this error, if any
    pub fn as_provider_error(&self) -> Option<&ProviderError> {
        match self {
            Self::Provider(err) => Some(err),
            Self::AllProvidersFailed { last, .. } => last.as_provider_error(),
            _ => None,
        }
    }
}

/// Classification of a vendor failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Non-success HTTP status from the vendor
    Http,
    /// Transport failure (connect, reset, request timeout)
    Network,
    /// The vendor accepted the job and then reported failure
    JobFailed,
    /// The poll deadline elapsed before a terminal state
    Timeout,
    /// A self-hosted backend did not answer its health probe
    Unreachable,
    /// The vendor answered with something we could not interpret
    InvalidResponse,
    /// The provider cannot serve the requested tool
    Unsupported,
    /// The caller cancelled the request
    Cancelled,
}

impl ProviderErrorKind {
    fn code(&self) -> &'static str {
        match self {
            Self::Http => "E200",
            Self::Network => "E201",
            Self::JobFailed => "E202",
            Self::Timeout => "E203",
            Self::Unreachable => "E204",
            Self::InvalidResponse => "E205",
            Self::Unsupported => "E206",
            Self::Cancelled => "E207",
        }
    }
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http => write!(f, "http"),
            Self::Network => write!(f, "network"),
            Self::JobFailed => write!(f, "job_failed"),
            Self::Timeout => write!(f, "timeout"),
            Self::Unreachable => write!(f, "unreachable"),
            Self::InvalidResponse => write!(f, "invalid_response"),
            Self::Unsupported => write!(f, "unsupported"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A failure raised by a vendor adapter
///
/// `skip_provider` tells a failover loop that this provider is unusable for
/// the request right now and the next ranked candidate should be tried.
#[derive(Error, Debug, Clone)]
#[error("{provider}: {message}")]
pub struct ProviderError {
    pub provider: ProviderName,
    pub kind: ProviderErrorKind,
    pub message: String,
    pub status_code: Option<u16>,
    pub provider_job_id: Option<String>,
    pub skip_provider: bool,
}

impl ProviderError {
    fn new(provider: ProviderName, kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider,
            kind,
            message: message.into(),
            status_code: None,
            provider_job_id: None,
            skip_provider: false,
        }
    }

    /// Build an error from a non-success HTTP response
    pub fn http(provider: ProviderName, status: u16, body: &str) -> Self {
        let mut err = Self::new(
            provider,
            ProviderErrorKind::Http,
            format!("HTTP {}: {}", status, truncate(body, 300)),
        );
        err.status_code = Some(status);
        err.skip_provider = is_provider_side_failure(status, body);
        err
    }

    /// Build an error from a transport failure
    pub fn network(provider: ProviderName, source: &reqwest::Error) -> Self {
        let mut err = Self::new(
            provider,
            ProviderErrorKind::Network,
            format!("request failed: {}", source),
        );
        err.status_code = source.status().map(|s| s.as_u16());
        err.skip_provider = true;
        err
    }

    /// The vendor reported the job as failed
    pub fn job_failed(provider: ProviderName, message: impl Into<String>) -> Self {
        let mut err = Self::new(provider, ProviderErrorKind::JobFailed, message);
        err.skip_provider = true;
        err
    }

    /// The poll deadline elapsed
    pub fn timeout(provider: ProviderName, elapsed: Duration) -> Self {
        let mut err = Self::new(
            provider,
            ProviderErrorKind::Timeout,
            format!("generation timed out after {:.1}s", elapsed.as_secs_f64()),
        );
        err.skip_provider = true;
        err
    }

    /// A self-hosted backend is not reachable
    pub fn unreachable(provider: ProviderName, host: &str, detail: impl std::fmt::Display) -> Self {
        let mut err = Self::new(
            provider,
            ProviderErrorKind::Unreachable,
            format!(
                "could not reach {} ({}). Is it running and listening on {}?",
                host, detail, host
            ),
        );
        err.skip_provider = true;
        err
    }

    /// The vendor response could not be interpreted
    pub fn invalid_response(provider: ProviderName, message: impl Into<String>) -> Self {
        let mut err = Self::new(provider, ProviderErrorKind::InvalidResponse, message);
        err.skip_provider = true;
        err
    }

    /// The provider cannot serve this tool
    pub fn unsupported(provider: ProviderName, what: impl std::fmt::Display) -> Self {
        let mut err = Self::new(
            provider,
            ProviderErrorKind::Unsupported,
            format!("{} is not supported by this provider", what),
        );
        err.skip_provider = true;
        err
    }

    /// The caller cancelled the request
    pub fn cancelled(provider: ProviderName) -> Self {
        Self::new(provider, ProviderErrorKind::Cancelled, "cancelled by caller")
    }

    /// Attach the vendor job id
    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.provider_job_id = Some(job_id.into());
        self
    }
}

/// Whether an HTTP failure means the provider itself is unusable right now
///
/// Server errors, rate limits and exhausted quota or credits qualify. Other
/// client errors point at the request shape and are surfaced instead.
pub fn is_provider_side_failure(status: u16, body: &str) -> bool {
    match status {
        500..=599 => true,
        429 | 402 => true,
        400..=499 => {
            let body = body.to_lowercase();
            ["quota", "credit", "insufficient", "kudos", "rate limit", "billing"]
                .iter()
                .any(|needle| body.contains(needle))
        }
        _ => false,
    }
}

fn truncate(body: &str, max: usize) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= max {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(max).collect();
        format!("{}...", cut)
    }
}
