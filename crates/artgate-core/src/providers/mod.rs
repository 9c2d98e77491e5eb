//! Vendor adapters
//!
//! One adapter per backend, each normalising a vendor's submit/poll/fetch or
//! single-call protocol into [`GenerateResult`]. Adapters do not depend on
//! each other; they share only the HTTP plumbing and the poll loop.
//!
//! | Adapter        | Protocol                        | Key                  |
//! |----------------|---------------------------------|----------------------|
//! | Replicate      | predictions + poll              | `REPLICATE_API_TOKEN`|
//! | fal.ai         | queue submit / status / result  | `FAL_KEY`            |
//! | Together       | single call                     | `TOGETHER_API_KEY`   |
//! | HuggingFace    | single call, retries cold start | `HF_TOKEN`           |
//! | Pollinations   | single GET                      | none                 |
//! | Stable Horde   | async submit / check / status   | optional             |
//! | Prodia         | job submit + poll               | optional             |
//! | ComfyUI        | local `/prompt` + `/history`    | host                 |

mod comfyui;
mod fal;
mod http;
mod huggingface;
mod poll;
mod pollinations;
mod prodia;
mod replicate;
mod stable_horde;
mod together;

use async_trait::async_trait;

use crate::config::ProviderConfig;
use crate::error::Result;
use crate::generation::prompt::snap_dimension;
use crate::generation::{GenerateParams, GenerateResult};
use crate::routing::ProviderName;

pub use comfyui::ComfyUiProvider;
pub use fal::FalProvider;
pub use huggingface::{HuggingFaceProvider, LOADING_RETRY_DELAY, MAX_LOADING_RETRIES};
pub use poll::{PollPolicy, PollStatus, poll_until};
pub use pollinations::PollinationsProvider;
pub use prodia::ProdiaProvider;
pub use replicate::ReplicateProvider;
pub use stable_horde::StableHordeProvider;
pub use together::TogetherProvider;

/// A backend that can turn [`GenerateParams`] into a [`GenerateResult`]
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Which provider this adapter speaks for
    fn name(&self) -> ProviderName;

    /// Run one generation end to end
    ///
    /// Failures are always [`crate::error::Error::Provider`] values carrying
    /// enough context for a failover loop to decide whether to move on.
    async fn generate(&self, params: &GenerateParams) -> Result<GenerateResult>;
}

/// Legal output size for a vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VendorSizing {
    pub multiple: u32,
    pub max: u32,
}

impl VendorSizing {
    pub const fn for_provider(provider: ProviderName) -> Self {
        let (multiple, max) = match provider {
            ProviderName::Replicate => (64, 1440),
            ProviderName::Fal => (32, 2048),
            ProviderName::Together => (64, 1792),
            ProviderName::HuggingFace => (64, 1536),
            ProviderName::Pollinations => (32, 2048),
            ProviderName::StableHorde => (64, 1024),
            ProviderName::Prodia => (64, 1024),
            ProviderName::ComfyUi => (64, 2048),
        };
        Self { multiple, max }
    }

    /// Snap a requested `(width, height)` to this vendor's grid
    pub fn snap(&self, width: u32, height: u32) -> (u32, u32) {
        (
            snap_dimension(width, self.multiple, self.max),
            snap_dimension(height, self.multiple, self.max),
        )
    }
}

/// Poll schedule for an adapter: the override if set, capped by the timeout
pub(crate) fn effective_poll_policy(provider: ProviderName, config: &ProviderConfig) -> PollPolicy {
    config
        .poll
        .unwrap_or_else(|| PollPolicy::for_provider(provider))
        .capped_at(config.timeout())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_vendor_sizing_snaps_silently() {
        let replicate = VendorSizing::for_provider(ProviderName::Replicate);
        assert_eq!(replicate.snap(1500, 700), (1408, 704));

        let horde = VendorSizing::for_provider(ProviderName::StableHorde);
        assert_eq!(horde.snap(2048, 2048), (1024, 1024));

        let fal = VendorSizing::for_provider(ProviderName::Fal);
        assert_eq!(fal.snap(100, 1), (96, 32));
    }

    #[test]
    fn test_effective_poll_policy_respects_timeout() {
        let config = ProviderConfig::default().with_timeout_ms(30_000);
        let policy = effective_poll_policy(ProviderName::Replicate, &config);
        assert_eq!(policy.deadline, Duration::from_secs(30));
        assert_eq!(policy.initial_delay, Duration::from_millis(2000));

        let custom = PollPolicy::new(
            Duration::from_millis(1),
            2.0,
            Duration::from_millis(4),
            Duration::from_millis(50),
        );
        let config = ProviderConfig::default().with_poll_policy(custom);
        assert_eq!(effective_poll_policy(ProviderName::Fal, &config), custom);
    }
}
