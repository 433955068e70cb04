use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ControllerError, Result};

/// Attribute map as delivered by the orchestration host.
pub type AttributeMap = serde_json::Map<String, Value>;

/// Configuration for a single component, as handed over by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    pub name: String,
    #[serde(default)]
    pub attributes: AttributeMap,
}

impl ComponentConfig {
    pub fn new(name: impl Into<String>) -> Self {
        ComponentConfig {
            name: name.into(),
            attributes: AttributeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Look up a required, non-empty string attribute.
    pub fn required_string(&self, key: &str) -> Result<&str> {
        let value = self.optional_string(key)?.ok_or_else(|| {
            ControllerError::Configuration(format!("{key} is a required configuration attribute"))
        })?;
        if value.is_empty() {
            return Err(ControllerError::Configuration(format!(
                "{key} cannot be empty"
            )));
        }
        Ok(value)
    }

    /// Look up an optional string attribute. Present but wrong-typed values
    /// are a configuration error, not a silent fallback.
    pub fn optional_string(&self, key: &str) -> Result<Option<&str>> {
        match self.attributes.get(key) {
            None => Ok(None),
            Some(value) => value.as_str().map(Some).ok_or_else(|| {
                ControllerError::Configuration(format!("{key} value must be a string"))
            }),
        }
    }

    /// Look up an optional positive integer attribute, falling back to
    /// `default` when absent.
    pub fn positive_integer_or(&self, key: &str, default: u32) -> Result<u32> {
        match self.attributes.get(key) {
            None => Ok(default),
            Some(value) => value
                .as_u64()
                .filter(|value| *value > 0)
                .and_then(|value| u32::try_from(value).ok())
                .ok_or_else(|| {
                    ControllerError::Configuration(format!("{key} must be a positive integer"))
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_string_attribute_is_a_configuration_error() {
        let config = ComponentConfig::new("arm");
        let error = config.required_string("port").unwrap_err();
        assert!(matches!(error, ControllerError::Configuration(_)));
    }

    #[test]
    fn empty_string_attribute_is_a_configuration_error() {
        let config = ComponentConfig::new("arm").with_attribute("port", "");
        let error = config.required_string("port").unwrap_err();
        assert!(matches!(error, ControllerError::Configuration(_)));
    }

    #[test]
    fn wrong_typed_string_attribute_is_a_configuration_error() {
        let config = ComponentConfig::new("arm").with_attribute("port", 42);
        let error = config.required_string("port").unwrap_err();
        assert!(matches!(error, ControllerError::Configuration(_)));
    }

    #[test]
    fn present_string_attribute_resolves() {
        let config = ComponentConfig::new("arm").with_attribute("port", "/dev/ttyACM0");
        assert_eq!(config.required_string("port").unwrap(), "/dev/ttyACM0");
    }

    #[test]
    fn absent_optional_string_is_none() {
        let config = ComponentConfig::new("gripper");
        assert_eq!(config.optional_string("grab_behavior").unwrap(), None);
    }

    #[test]
    fn positive_integer_falls_back_to_default() {
        let config = ComponentConfig::new("arm");
        assert_eq!(config.positive_integer_or("speed", 2000).unwrap(), 2000);
    }

    #[test]
    fn positive_integer_rejects_zero_and_negatives() {
        for value in [json!(0), json!(-5), json!("fast")] {
            let config = ComponentConfig::new("arm").with_attribute("speed", value);
            let error = config.positive_integer_or("speed", 2000).unwrap_err();
            assert!(matches!(error, ControllerError::Configuration(_)));
        }
    }

    #[test]
    fn positive_integer_resolves() {
        let config = ComponentConfig::new("arm").with_attribute("speed", 4000);
        assert_eq!(config.positive_integer_or("speed", 2000).unwrap(), 4000);
    }
}
