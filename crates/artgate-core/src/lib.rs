//! Artgate Core Library
//!
//! Provider resolution and failover for image generation: pick a backend
//! for a creative request, resolve its credentials, and normalise eight
//! vendor protocols into one result shape.

pub mod config;
pub mod error;
pub mod generation;
pub mod providers;
pub mod routing;

pub use error::{Error, ProviderError, ProviderErrorKind, Result};

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::{
        Config, ProviderConfig, assert_key_present, resolve_provider_config,
    };
    pub use crate::error::{Error, ProviderError, Result};
    pub use crate::generation::{
        GenerateParams, GenerateResult, ProviderStatus, StylePreset, ToolRequest, generate,
        generate_batch, generate_with_failover, list_provider_status,
    };
    pub use crate::routing::{
        ProviderName, ProviderResolver, resolve_optimal_provider, resolve_text_provider,
        resolve_voice_provider,
    };
}
