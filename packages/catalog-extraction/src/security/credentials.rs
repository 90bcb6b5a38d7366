//! API credential loading (§6 environment variables, §7 Fatal category).

use secrecy::SecretString;

/// Credentials required to reach the two LLM providers, the vision model,
/// and (optionally) the markdown-conversion service.
#[derive(Clone)]
pub struct Credentials {
    pub primary_llm_api_key: SecretString,
    pub secondary_llm_api_key: SecretString,
    pub vision_api_key: SecretString,
    pub markdown_service_token: Option<SecretString>,
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
}

impl Credentials {
    /// Loads from the process environment. Absence of a required
    /// credential is a `Fatal` condition per §7: the caller should abort
    /// the run early rather than attempt a degraded mode.
    pub fn from_env() -> Result<Self, CredentialsError> {
        let primary_llm_api_key = required_secret("CATALOG_PRIMARY_LLM_API_KEY")?;
        let secondary_llm_api_key = required_secret("CATALOG_SECONDARY_LLM_API_KEY")?;
        let vision_api_key = required_secret("CATALOG_VISION_API_KEY")?;
        let markdown_service_token = std::env::var("CATALOG_MARKDOWN_SERVICE_TOKEN")
            .ok()
            .map(SecretString::from);

        Ok(Self {
            primary_llm_api_key,
            secondary_llm_api_key,
            vision_api_key,
            markdown_service_token,
        })
    }
}

fn required_secret(key: &'static str) -> Result<SecretString, CredentialsError> {
    std::env::var(key)
        .map(SecretString::from)
        .map_err(|_| CredentialsError::Missing(key))
}
