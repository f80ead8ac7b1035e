//! Process-wide settings of the integration.
//!
//! Values are never cached: every lookup goes back to the [`ConfigSource`] so a
//! long-running process picks up changed settings on the next call.

use crate::Error;
use std::collections::HashMap;
use std::sync::RwLock;

pub const API_URL_PARAM: &str = "ngsign_integration.api_url";
pub const BEARER_TOKEN_PARAM: &str = "ngsign_integration.bearer_token";
pub const DEFAULT_TEMPLATE_PARAM: &str = "ngsign_integration.default_template_id";

/// Where system parameters come from.
pub trait ConfigSource: Send + Sync {
    fn get_param(&self, key: &str) -> Option<String>;
}

/// Reads parameters from environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig;

impl EnvConfig {
    pub fn new() -> Self {
        EnvConfig
    }

    /// Load a `.env` file (if any) into the environment first.
    pub fn with_dotenv() -> Self {
        match dotenvy::dotenv() {
            Ok(path) => log::debug!("Loaded environment from {}", path.display()),
            Err(err) if err.not_found() => {}
            Err(err) => log::warn!("Could not load .env file. Err: {}", err),
        }
        EnvConfig
    }

    fn env_var_name(key: &str) -> Option<&'static str> {
        match key {
            API_URL_PARAM => Some("NGSIGN_API_URL"),
            BEARER_TOKEN_PARAM => Some("NGSIGN_BEARER_TOKEN"),
            DEFAULT_TEMPLATE_PARAM => Some("NGSIGN_DEFAULT_TEMPLATE_ID"),
            _ => None,
        }
    }
}

impl ConfigSource for EnvConfig {
    fn get_param(&self, key: &str) -> Option<String> {
        std::env::var(Self::env_var_name(key)?).ok()
    }
}

/// Settings kept in memory, editable while the process runs.
#[derive(Debug, Default)]
pub struct MemoryConfig {
    params: RwLock<HashMap<String, String>>,
}

impl MemoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_param(&self, key: &str, value: &str) {
        if let Ok(mut params) = self.params.write() {
            params.insert(key.to_owned(), value.to_owned());
        }
    }

    pub fn unset_param(&self, key: &str) {
        if let Ok(mut params) = self.params.write() {
            params.remove(key);
        }
    }
}

impl ConfigSource for MemoryConfig {
    fn get_param(&self, key: &str) -> Option<String> {
        self.params.read().ok()?.get(key).cloned()
    }
}

/// Endpoint and token used to talk to the signing provider.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Base URL without trailing slash.
    pub base_url: String,
    pub bearer_token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("base_url", &self.base_url)
            .field("bearer_token", &"<redacted>")
            .finish()
    }
}

/// Resolve the current API credentials.
pub fn get_credentials(config: &dyn ConfigSource) -> Result<Credentials, Error> {
    let base_url = non_empty_param(config, API_URL_PARAM);
    let bearer_token = non_empty_param(config, BEARER_TOKEN_PARAM);
    match (base_url, bearer_token) {
        (Some(base_url), Some(bearer_token)) => Ok(Credentials {
            base_url: base_url.trim_end_matches('/').to_owned(),
            bearer_token,
        }),
        _ => Err(Error::Configuration(
            "The signing API URL and Bearer Token must be configured in settings.".to_owned(),
        )),
    }
}

/// The globally configured default template id, if any.
pub fn default_template_id(config: &dyn ConfigSource) -> Option<u64> {
    let raw = non_empty_param(config, DEFAULT_TEMPLATE_PARAM)?;
    match raw.parse() {
        Ok(id) => Some(id),
        Err(err) => {
            log::warn!("Ignoring default template id `{}`. Err: {}", raw, err);
            None
        }
    }
}

fn non_empty_param(config: &dyn ConfigSource, key: &str) -> Option<String> {
    config
        .get_param(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> MemoryConfig {
        let config = MemoryConfig::new();
        config.set_param(API_URL_PARAM, "https://sign.example.com/api/");
        config.set_param(BEARER_TOKEN_PARAM, "secret");
        config
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let credentials = get_credentials(&configured()).unwrap();
        assert_eq!(credentials.base_url, "https://sign.example.com/api");
        assert_eq!(credentials.bearer_token, "secret");
    }

    #[test]
    fn missing_or_empty_token_is_a_configuration_error() {
        let config = configured();
        config.set_param(BEARER_TOKEN_PARAM, "  ");
        assert!(matches!(
            get_credentials(&config),
            Err(Error::Configuration(_))
        ));
        config.unset_param(BEARER_TOKEN_PARAM);
        assert!(matches!(
            get_credentials(&config),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn changes_are_seen_on_next_call() {
        let config = configured();
        assert!(get_credentials(&config).is_ok());
        config.unset_param(API_URL_PARAM);
        assert!(get_credentials(&config).is_err());
        config.set_param(API_URL_PARAM, "https://other.example.com");
        assert_eq!(
            get_credentials(&config).unwrap().base_url,
            "https://other.example.com"
        );
    }

    #[test]
    fn default_template_id_ignores_garbage() {
        let config = MemoryConfig::new();
        assert_eq!(default_template_id(&config), None);
        config.set_param(DEFAULT_TEMPLATE_PARAM, "abc");
        assert_eq!(default_template_id(&config), None);
        config.set_param(DEFAULT_TEMPLATE_PARAM, "7");
        assert_eq!(default_template_id(&config), Some(7));
    }

    #[test]
    fn debug_output_hides_token() {
        let credentials = get_credentials(&configured()).unwrap();
        assert!(!format!("{:?}", credentials).contains("secret"));
    }
}
