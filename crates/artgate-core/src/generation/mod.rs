//! Generation requests, dispatch and orchestration
//!
//! [`generate`] runs one request on one provider. [`generate_with_failover`]
//! walks the ranked candidates for a route and [`generate_batch`] fans a
//! request out into concurrent variants.

mod batch;
mod dispatch;
mod failover;
pub mod prompt;
mod types;

pub use batch::{BatchOutcome, generate_batch, variants};
pub use dispatch::{adapter_for, generate, list_provider_status, list_provider_status_with};
pub use failover::generate_with_failover;
pub use types::{
    AnimateExtra, GenerateParams, GenerateResult, InpaintExtra, ProviderStatus, RotateExtra,
    SceneExtra, StylePreset, ToolRequest,
};
