//! File manager configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sanitize::is_sanitized;

/// What name sanitization does with `/` and `\` in a user-supplied name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeparatorPolicy {
    /// Refuse the name outright, so two different inputs never collide.
    #[default]
    Reject,
    /// Drop separators before the remaining cleanup (`Spec / Draft` becomes `Spec_Draft`).
    Strip,
}

/// Configuration for a [`FileManager`](crate::FileManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileManagerConfig {
    /// First segment of every contract root (`<root_prefix>/<contractId>`).
    pub root_prefix: String,

    /// Maximum number of folder segments below a contract root.
    pub max_depth: usize,

    /// Maximum number of keys per `remove` call.
    pub remove_batch_size: usize,

    /// Maximum number of concurrent listings or downloads. `1` walks the
    /// tree strictly sequentially.
    pub concurrency: usize,

    /// Archives with more entries than this report progress per file.
    pub progress_threshold: usize,

    /// Treatment of path separators in user-supplied names.
    pub separator_policy: SeparatorPolicy,
}

impl Default for FileManagerConfig {
    fn default() -> Self {
        Self {
            root_prefix: "uploads".to_string(),
            max_depth: 4,
            remove_batch_size: 100,
            concurrency: 1,
            progress_threshold: 5,
            separator_policy: SeparatorPolicy::Reject,
        }
    }
}

impl FileManagerConfig {
    /// Parse a JSON config document. Missing fields take their defaults.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s).map_err(|e| Error::InvalidConfig {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every limit is usable.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| {
            Err(Error::InvalidConfig {
                message: message.to_string(),
            })
        };

        if !is_sanitized(&self.root_prefix) {
            return invalid("root_prefix must be a single segment of [A-Za-z0-9_-]");
        }
        if self.max_depth == 0 {
            return invalid("max_depth must be at least 1");
        }
        if self.remove_batch_size == 0 {
            return invalid("remove_batch_size must be at least 1");
        }
        if self.concurrency == 0 {
            return invalid("concurrency must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_behavior() {
        let config = FileManagerConfig::default();
        assert_eq!(config.root_prefix, "uploads");
        assert_eq!(config.max_depth, 4);
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.progress_threshold, 5);
        assert_eq!(config.separator_policy, SeparatorPolicy::Reject);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            FileManagerConfig::from_json_str(r#"{"max_depth": 6, "separator_policy": "strip"}"#)
                .unwrap();
        assert_eq!(config.max_depth, 6);
        assert_eq!(config.separator_policy, SeparatorPolicy::Strip);
        assert_eq!(config.remove_batch_size, 100);
    }

    #[test]
    fn invalid_limits_rejected() {
        for doc in [
            r#"{"max_depth": 0}"#,
            r#"{"remove_batch_size": 0}"#,
            r#"{"concurrency": 0}"#,
            r#"{"root_prefix": "up/loads"}"#,
            r#"{"root_prefix": ""}"#,
        ] {
            let err = FileManagerConfig::from_json_str(doc).unwrap_err();
            assert!(matches!(err, Error::InvalidConfig { .. }), "{doc} accepted");
        }
    }

    #[test]
    fn malformed_json_is_invalid_config() {
        let err = FileManagerConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }
}
