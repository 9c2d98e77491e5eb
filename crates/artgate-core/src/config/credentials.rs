//! Credential presence checks
//!
//! Routing only needs to know whether a credential exists; adapters need its
//! value. Both go through [`CredentialStore`] so tests can describe any
//! credential layout without touching the process environment.

use std::collections::HashMap;

pub const REPLICATE_API_TOKEN: &str = "REPLICATE_API_TOKEN";
pub const FAL_KEY: &str = "FAL_KEY";
pub const TOGETHER_API_KEY: &str = "TOGETHER_API_KEY";
pub const HF_TOKEN: &str = "HF_TOKEN";
pub const STABLE_HORDE_KEY: &str = "STABLE_HORDE_KEY";
pub const PRODIA_API_KEY: &str = "PRODIA_API_KEY";
pub const COMFYUI_HOST: &str = "COMFYUI_HOST";
pub const GENERATION_TIMEOUT_MS: &str = "GENERATION_TIMEOUT_MS";

pub const ELEVENLABS_API_KEY: &str = "ELEVENLABS_API_KEY";
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const GROQ_API_KEY: &str = "GROQ_API_KEY";

/// Read access to named credentials
pub trait CredentialStore: Send + Sync {
    /// Value of a credential, `None` when unset
    fn get(&self, name: &str) -> Option<String>;

    /// Whether a credential is set to a non-blank value
    fn has(&self, name: &str) -> bool {
        self.get(name).is_some_and(|v| !v.trim().is_empty())
    }
}

impl<T: CredentialStore + ?Sized> CredentialStore for &T {
    fn get(&self, name: &str) -> Option<String> {
        (**self).get(name)
    }
}

/// Reads the process environment on every call
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl CredentialStore for EnvCredentials {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Fixed credentials, for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    values: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with the given variables set to placeholder values
    pub fn with_present(names: &[&str]) -> Self {
        let mut store = Self::new();
        for name in names {
            store = store.with(*name, format!("test-{}", name.to_lowercase()));
        }
        store
    }

    /// Set a variable
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

impl CredentialStore for StaticCredentials {
    fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_values_are_absent() {
        let store = StaticCredentials::new()
            .with(FAL_KEY, "   ")
            .with(HF_TOKEN, "hf_abc");
        assert!(!store.has(FAL_KEY));
        assert!(store.has(HF_TOKEN));
        assert!(!store.has(REPLICATE_API_TOKEN));
    }

    #[test]
    fn test_env_credentials_reads_at_call_time() {
        let name = "ARTGATE_TEST_CREDENTIAL_ROTATION";
        assert!(!EnvCredentials.has(name));
        // SAFETY: the variable name is unique to this test
        unsafe { std::env::set_var(name, "first") };
        assert_eq!(EnvCredentials.get(name).as_deref(), Some("first"));
        unsafe { std::env::set_var(name, "second") };
        assert_eq!(EnvCredentials.get(name).as_deref(), Some("second"));
        unsafe { std::env::remove_var(name) };
        assert!(!EnvCredentials.has(name));
    }

    #[test]
    fn test_reference_store_delegates() {
        let store = StaticCredentials::with_present(&[TOGETHER_API_KEY]);
        let by_ref: &dyn CredentialStore = &store;
        assert!(by_ref.has(TOGETHER_API_KEY));
    }
}
