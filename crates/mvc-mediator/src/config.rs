//! Message hierarchy tokens.

use serde::{Deserialize, Serialize};

use crate::error::MediatorError;

/// Tokens used to split message keys into levels and to spell wildcards.
///
/// Missing fields take their defaults when deserialized:
///
/// ```
/// use mvc_mediator::MediatorConfig;
///
/// let config: MediatorConfig = serde_json::from_str(r#"{"separator": ":"}"#).unwrap();
/// assert_eq!(config.separator, ":");
/// assert_eq!(config.wildcard, "*");
/// assert_eq!(config.level_wildcard, "%");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediatorConfig {
    /// Separates hierarchy levels.
    pub separator: String,
    /// Matches any run of characters, across levels.
    pub wildcard: String,
    /// Matches any run of characters within one level.
    pub level_wildcard: String,
}

impl Default for MediatorConfig {
    fn default() -> Self {
        Self {
            separator: ".".to_string(),
            wildcard: "*".to_string(),
            level_wildcard: "%".to_string(),
        }
    }
}

impl MediatorConfig {
    pub fn validate(&self) -> Result<(), MediatorError> {
        for (name, token) in [
            ("separator", &self.separator),
            ("wildcard", &self.wildcard),
            ("level_wildcard", &self.level_wildcard),
        ] {
            if token.is_empty() {
                return Err(MediatorError::InvalidConfig(format!("{name} must not be empty")));
            }
        }
        if self.separator == self.wildcard
            || self.separator == self.level_wildcard
            || self.wildcard == self.level_wildcard
        {
            return Err(MediatorError::InvalidConfig("tokens must be distinct".to_string()));
        }
        Ok(())
    }
}
