//! Provider routing
//!
//! Decides *which* backend serves a generation request. The key components are:
//!
//! - **Routing matrix**: static ranked lists per tier, mode and tool, with a
//!   style override table consulted first.
//! - **Credential store**: presence checks against the environment (or a test
//!   double), evaluated at call time so rotated keys apply without a restart.
//! - **Resolver**: first-match walk over the ranked list with an unconditional
//!   keyless fallback, so resolution never fails.
//!
//! Nothing here talks to a vendor; *how* a backend is called lives in
//! [`crate::providers`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use artgate_core::routing::resolve_optimal_provider;
//!
//! let provider = resolve_optimal_provider("pixel", "generate", false, Some("dithered"));
//! println!("routing to {provider}");
//! ```

pub mod matrix;
mod resolver;
mod types;

pub use resolver::{
    ProviderResolver, resolve_optimal_provider, resolve_text_provider, resolve_voice_provider,
};
pub use types::{
    Mode, ProviderName, ProviderPreference, TextProvider, Tier, Tool, VoiceProvider,
};
