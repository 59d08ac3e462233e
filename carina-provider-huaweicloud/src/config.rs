//! Provider configuration
//!
//! Values come from the `provider huaweicloud { ... }` block and fall back to
//! `HW_*` environment variables.

use std::collections::HashMap;

use carina_core::resource::Value;
use thiserror::Error;

pub const DEFAULT_CLOUD: &str = "myhuaweicloud.com";
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Errors raised while building a [`ProviderConfig`]
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("region is required: set `region` or HW_REGION_NAME")]
    MissingRegion,

    #[error("`access_key` and `secret_key` must be set together")]
    IncompleteCredentials,

    #[error("`max_retries` must not be negative, got {0}")]
    NegativeMaxRetries(i64),

    #[error("attribute `{key}` must be {expected}")]
    InvalidAttribute { key: String, expected: &'static str },

    #[error("environment variable {key} is invalid: {message}")]
    InvalidEnv { key: &'static str, message: String },
}

/// Typed view over the provider block attributes
struct ProviderBlock<'a> {
    attributes: &'a HashMap<String, Value>,
}

impl<'a> ProviderBlock<'a> {
    fn get_string(&self, key: &str) -> Result<Option<&'a str>, ConfigError> {
        match self.attributes.get(key) {
            None => Ok(None),
            Some(Value::String(s)) if s.is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(ConfigError::InvalidAttribute {
                key: key.to_string(),
                expected: "a string",
            }),
        }
    }

    fn get_bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        match self.attributes.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(ConfigError::InvalidAttribute {
                key: key.to_string(),
                expected: "a boolean",
            }),
        }
    }

    fn get_int(&self, key: &str) -> Result<Option<i64>, ConfigError> {
        match self.attributes.get(key) {
            None => Ok(None),
            Some(v) => v.as_int().map(Some).ok_or(ConfigError::InvalidAttribute {
                key: key.to_string(),
                expected: "an integer",
            }),
        }
    }

    fn get_string_map(&self, key: &str) -> Result<HashMap<String, String>, ConfigError> {
        let Some(value) = self.attributes.get(key) else {
            return Ok(HashMap::new());
        };
        let invalid = || ConfigError::InvalidAttribute {
            key: key.to_string(),
            expected: "a map of strings",
        };
        let map = value.as_map().ok_or_else(invalid)?;
        map.iter()
            .map(|(k, v)| {
                v.as_str()
                    .map(|s| (k.clone(), s.to_string()))
                    .ok_or_else(invalid)
            })
            .collect()
    }
}

/// Settings shared by every service client of the provider
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderConfig {
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub security_token: Option<String>,
    /// Fixed project ID; resolved through IAM per region when unset
    pub project_id: Option<String>,
    pub enterprise_project_id: Option<String>,
    pub cloud: String,
    /// Service name -> endpoint URL overrides
    pub endpoints: HashMap<String, String>,
    pub max_retries: u32,
    pub insecure: bool,
    /// Tags added to every taggable resource beneath its own tags
    pub default_tags: HashMap<String, String>,
}

impl ProviderConfig {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            cloud: DEFAULT_CLOUD.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            ..Default::default()
        }
    }

    pub fn with_credentials(mut self, ak: impl Into<String>, sk: impl Into<String>) -> Self {
        self.access_key = Some(ak.into());
        self.secret_key = Some(sk.into());
        self
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_endpoint(mut self, service: impl Into<String>, url: impl Into<String>) -> Self {
        self.endpoints.insert(service.into(), url.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_default_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_tags.insert(key.into(), value.into());
        self
    }

    /// Build from provider block attributes, falling back to the process environment
    pub fn from_attributes(attributes: &HashMap<String, Value>) -> Result<Self, ConfigError> {
        Self::from_attributes_with_env(attributes, |key| std::env::var(key).ok())
    }

    pub fn from_attributes_with_env(
        attributes: &HashMap<String, Value>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let block = ProviderBlock { attributes };
        let lookup = |key: &str, var: &str| -> Result<Option<String>, ConfigError> {
            Ok(block
                .get_string(key)?
                .map(str::to_string)
                .or_else(|| env(var).filter(|v| !v.is_empty())))
        };

        let region = lookup("region", "HW_REGION_NAME")?.ok_or(ConfigError::MissingRegion)?;
        let access_key = lookup("access_key", "HW_ACCESS_KEY")?;
        let secret_key = lookup("secret_key", "HW_SECRET_KEY")?;
        if access_key.is_some() != secret_key.is_some() {
            return Err(ConfigError::IncompleteCredentials);
        }

        let max_retries = match block.get_int("max_retries")? {
            Some(n) if n < 0 => return Err(ConfigError::NegativeMaxRetries(n)),
            Some(n) => n as u32,
            None => match env("HW_MAX_RETRIES") {
                Some(raw) => raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnv {
                    key: "HW_MAX_RETRIES",
                    message: e.to_string(),
                })?,
                None => DEFAULT_MAX_RETRIES,
            },
        };

        Ok(Self {
            region,
            access_key,
            secret_key,
            security_token: lookup("security_token", "HW_SECURITY_TOKEN")?,
            project_id: lookup("project_id", "HW_PROJECT_ID")?,
            enterprise_project_id: lookup("enterprise_project_id", "HW_ENTERPRISE_PROJECT_ID")?,
            cloud: lookup("cloud", "HW_CLOUD")?.unwrap_or_else(|| DEFAULT_CLOUD.to_string()),
            endpoints: block.get_string_map("endpoints")?,
            max_retries,
            insecure: block.get_bool("insecure")?.unwrap_or(false),
            default_tags: block.get_string_map("default_tags")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn region_from_block() {
        let mut attrs = HashMap::new();
        attrs.insert("region".to_string(), Value::from("cn-north-4"));
        let config = ProviderConfig::from_attributes_with_env(&attrs, no_env).unwrap();
        assert_eq!(config.region, "cn-north-4");
        assert_eq!(config.cloud, DEFAULT_CLOUD);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert!(config.access_key.is_none());
    }

    #[test]
    fn env_fallback() {
        let env = |key: &str| match key {
            "HW_REGION_NAME" => Some("ap-southeast-1".to_string()),
            "HW_ACCESS_KEY" => Some("ak".to_string()),
            "HW_SECRET_KEY" => Some("sk".to_string()),
            "HW_MAX_RETRIES" => Some("2".to_string()),
            _ => None,
        };
        let config = ProviderConfig::from_attributes_with_env(&HashMap::new(), env).unwrap();
        assert_eq!(config.region, "ap-southeast-1");
        assert_eq!(config.access_key.as_deref(), Some("ak"));
        assert_eq!(config.max_retries, 2);
    }

    #[test]
    fn block_wins_over_env() {
        let mut attrs = HashMap::new();
        attrs.insert("region".to_string(), Value::from("cn-north-4"));
        let env = |key: &str| (key == "HW_REGION_NAME").then(|| "other".to_string());
        let config = ProviderConfig::from_attributes_with_env(&attrs, env).unwrap();
        assert_eq!(config.region, "cn-north-4");
    }

    #[test]
    fn missing_region_is_rejected() {
        let err = ProviderConfig::from_attributes_with_env(&HashMap::new(), no_env).unwrap_err();
        assert_eq!(err, ConfigError::MissingRegion);
    }

    #[test]
    fn half_credentials_are_rejected() {
        let mut attrs = HashMap::new();
        attrs.insert("region".to_string(), Value::from("cn-north-4"));
        attrs.insert("access_key".to_string(), Value::from("ak"));
        let err = ProviderConfig::from_attributes_with_env(&attrs, no_env).unwrap_err();
        assert_eq!(err, ConfigError::IncompleteCredentials);
    }

    #[test]
    fn negative_retries_are_rejected() {
        let mut attrs = HashMap::new();
        attrs.insert("region".to_string(), Value::from("cn-north-4"));
        attrs.insert("max_retries".to_string(), Value::Int(-1));
        let err = ProviderConfig::from_attributes_with_env(&attrs, no_env).unwrap_err();
        assert_eq!(err, ConfigError::NegativeMaxRetries(-1));
    }

    #[test]
    fn endpoints_and_default_tags() {
        let mut endpoints = HashMap::new();
        endpoints.insert("ddm".to_string(), Value::from("http://127.0.0.1:8080/"));
        let mut tags = HashMap::new();
        tags.insert("owner".to_string(), Value::from("infra"));

        let mut attrs = HashMap::new();
        attrs.insert("region".to_string(), Value::from("cn-north-4"));
        attrs.insert("endpoints".to_string(), Value::Map(endpoints));
        attrs.insert("default_tags".to_string(), Value::Map(tags));
        attrs.insert("insecure".to_string(), Value::Bool(true));

        let config = ProviderConfig::from_attributes_with_env(&attrs, no_env).unwrap();
        assert_eq!(config.endpoints["ddm"], "http://127.0.0.1:8080/");
        assert_eq!(config.default_tags["owner"], "infra");
        assert!(config.insecure);
    }
}
