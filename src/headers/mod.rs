//! Required ESB headers and the policy shared by the generator and the gateway.
//!
//! The policy is built once from [`HeaderConfig`] at startup and handed out
//! behind an `Arc`; nothing in it changes afterwards.

pub mod factory;

use hyper::header::{HeaderMap, HeaderName, HeaderValue};

pub use crate::config::HeaderKind;
use crate::config::HeaderConfig;
use crate::error::ConfigError;
pub use factory::HeaderFactory;

/// Value written over a header to exercise the gateway's validator
pub const INVALID_HEADER_VALUE: &str = "invalid-value";

/// Layout of the version-number header
pub const VERSION_NUMBER_FORMAT: &str = "%Y%m%dT%H%M%S";

/// A required header and how its value is produced and checked
#[derive(Debug, Clone)]
pub struct RequiredHeader {
    pub name: HeaderName,
    pub kind: HeaderKind,
}

/// Immutable header policy
#[derive(Debug, Clone)]
pub struct HeaderPolicy {
    required: Vec<RequiredHeader>,
    source_tag: HeaderValue,
    data_types: Vec<HeaderValue>,
    keys: Vec<String>,
    broken_headers_percent: u8,
    invalid_headers_percent: u8,
}

impl HeaderPolicy {
    /// Build the policy, rejecting names or values that cannot go on the wire
    pub fn from_config(config: &HeaderConfig) -> Result<Self, ConfigError> {
        if config.broken_headers_percent > 100 || config.invalid_headers_percent > 100 {
            return Err(ConfigError::ValidationError(
                "header percentages must be within 0..=100".to_string(),
            ));
        }

        let required = config
            .required
            .iter()
            .map(|definition| {
                let name = HeaderName::from_bytes(definition.name.to_ascii_lowercase().as_bytes())
                    .map_err(|e| {
                        ConfigError::ValidationError(format!(
                            "invalid header name {:?}: {}",
                            definition.name, e
                        ))
                    })?;
                Ok(RequiredHeader {
                    name,
                    kind: definition.kind,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let data_types = config
            .data_types
            .iter()
            .map(|value| header_value(value))
            .collect::<Result<Vec<_>, _>>()?;
        let keys = config
            .keys
            .iter()
            .map(|value| header_value(value).map(|_| value.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        let has_kind = |kind: HeaderKind| required.iter().any(|h| h.kind == kind);
        if has_kind(HeaderKind::DataType) && data_types.is_empty() {
            return Err(ConfigError::ValidationError(
                "data type header requires at least one data type".to_string(),
            ));
        }
        if has_kind(HeaderKind::PreSharedKey) && keys.is_empty() {
            return Err(ConfigError::ValidationError(
                "pre-shared key header requires at least one key".to_string(),
            ));
        }

        Ok(Self {
            source_tag: header_value(&config.source_tag)?,
            required,
            data_types,
            keys,
            broken_headers_percent: config.broken_headers_percent,
            invalid_headers_percent: config.invalid_headers_percent,
        })
    }

    /// Same policy with different corruption percentages
    pub fn with_corruption(mut self, broken_headers_percent: u8, invalid_headers_percent: u8) -> Self {
        self.broken_headers_percent = broken_headers_percent.min(100);
        self.invalid_headers_percent = invalid_headers_percent.min(100);
        self
    }

    pub fn required(&self) -> &[RequiredHeader] {
        &self.required
    }

    /// First required header of the given kind
    pub fn header_of_kind(&self, kind: HeaderKind) -> Option<&HeaderName> {
        self.required
            .iter()
            .find(|header| header.kind == kind)
            .map(|header| &header.name)
    }

    pub fn source_tag(&self) -> &HeaderValue {
        &self.source_tag
    }

    pub fn data_types(&self) -> &[HeaderValue] {
        &self.data_types
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn is_valid_key(&self, value: &str) -> bool {
        self.keys.iter().any(|key| key == value)
    }

    pub fn broken_headers_percent(&self) -> u8 {
        self.broken_headers_percent
    }

    pub fn invalid_headers_percent(&self) -> u8 {
        self.invalid_headers_percent
    }

    /// Number of required headers missing from `headers`
    pub fn missing_count(&self, headers: &HeaderMap) -> usize {
        self.required
            .iter()
            .filter(|header| !headers.contains_key(&header.name))
            .count()
    }
}

/// Names of headers carrying the invalid sentinel
pub fn sentinel_headers(headers: &HeaderMap) -> Vec<&HeaderName> {
    headers
        .iter()
        .filter(|(_, value)| value.as_bytes() == INVALID_HEADER_VALUE.as_bytes())
        .map(|(name, _)| name)
        .collect()
}

fn header_value(value: &str) -> Result<HeaderValue, ConfigError> {
    HeaderValue::from_str(value).map_err(|e| {
        ConfigError::ValidationError(format!("invalid header value {:?}: {}", value, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeaderDefinition;

    #[test]
    fn test_default_policy() {
        let policy = HeaderPolicy::from_config(&HeaderConfig::default()).unwrap();

        let names: Vec<&str> = policy.required().iter().map(|h| h.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "x-esb-src",
                "x-esb-data-type",
                "x-esb-ver-id",
                "x-esb-ver-no",
                "x-esb-key"
            ]
        );
        assert_eq!(policy.data_types().len(), 5);
        assert_eq!(
            policy.header_of_kind(HeaderKind::PreSharedKey).map(|n| n.as_str()),
            Some("x-esb-key")
        );
        assert!(policy.is_valid_key(&policy.keys()[0]));
        assert!(!policy.is_valid_key(INVALID_HEADER_VALUE));
    }

    #[test]
    fn test_header_names_are_normalized() {
        let config = HeaderConfig {
            required: vec![HeaderDefinition {
                name: "X-ESB-Src".to_string(),
                kind: HeaderKind::SourceTag,
            }],
            ..HeaderConfig::default()
        };
        let policy = HeaderPolicy::from_config(&config).unwrap();
        assert_eq!(policy.required()[0].name.as_str(), "x-esb-src");
    }

    #[test]
    fn test_rejects_bad_configuration() {
        let bad_name = HeaderConfig {
            required: vec![HeaderDefinition {
                name: "bad header".to_string(),
                kind: HeaderKind::Passthrough,
            }],
            ..HeaderConfig::default()
        };
        assert!(HeaderPolicy::from_config(&bad_name).is_err());

        let no_keys = HeaderConfig {
            keys: Vec::new(),
            ..HeaderConfig::default()
        };
        assert!(HeaderPolicy::from_config(&no_keys).is_err());

        let too_broken = HeaderConfig {
            broken_headers_percent: 150,
            ..HeaderConfig::default()
        };
        assert!(HeaderPolicy::from_config(&too_broken).is_err());
    }

    #[test]
    fn test_missing_and_sentinel_headers() {
        let policy = HeaderPolicy::from_config(&HeaderConfig::default()).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-esb-src", HeaderValue::from_static("sys:erp"));
        headers.insert("x-esb-key", HeaderValue::from_static(INVALID_HEADER_VALUE));

        assert_eq!(policy.missing_count(&headers), 3);
        let invalid = sentinel_headers(&headers);
        assert_eq!(invalid.len(), 1);
        assert_eq!(invalid[0].as_str(), "x-esb-key");
    }
}
