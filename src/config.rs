//! Wizard Configuration
//!
//! Loaded from a YAML file; every field has a default so a partial file
//! (or none at all) is valid. Command-line flags override file values.

use crate::error::{Error, Result};
use crate::workflow::{GrowthLimits, ValidationPolicy};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default REST bind port
pub const DEFAULT_API_PORT: u16 = 8095;

// =============================================================================
// API Configuration
// =============================================================================

/// REST server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// REST API bind address
    pub addr: SocketAddr,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
    /// How long a finished or failed session stays readable
    pub session_retention_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_API_PORT)),
            request_timeout_secs: 30,
            session_retention_secs: 300,
        }
    }
}

// =============================================================================
// Wizard Configuration
// =============================================================================

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WizardConfig {
    /// LUN and striped-group ceilings
    pub limits: GrowthLimits,
    /// Validator behaviour switches
    pub validation: ValidationPolicy,
    pub api: ApiConfig,
    /// YAML inventory backing the collaborator ports
    pub inventory_path: Option<PathBuf>,
}

impl WizardConfig {
    /// Load from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&text)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject limits no session could work with
    pub fn validate(&self) -> Result<()> {
        if self.limits.max_luns_total == 0 {
            return Err(Error::Configuration("limits.max_luns_total must be positive".into()));
        }
        if self.api.request_timeout_secs == 0 {
            return Err(Error::Configuration("api.request_timeout_secs must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = WizardConfig::default();
        assert_eq!(config.limits.max_luns_total, 252);
        assert_eq!(config.limits.max_striped_groups, 128);
        assert_eq!(config.api.addr.port(), 8095);
        assert_eq!(config.api.session_retention_secs, 300);
        assert!(!config.validation.retain_mismatched_stripe_selection);
        assert!(config.inventory_path.is_none());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = WizardConfig::from_yaml(
            "limits:\n  max_luns_total: 64\nvalidation:\n  retain_mismatched_stripe_selection: true\n",
        )
        .unwrap();
        assert_eq!(config.limits.max_luns_total, 64);
        assert_eq!(config.limits.max_striped_groups, 128);
        assert!(config.validation.retain_mismatched_stripe_selection);
        assert_eq!(config.api, ApiConfig::default());
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "api:\n  addr: 127.0.0.1:9000\ninventory_path: /etc/growfs/inventory.yaml").unwrap();

        let config = WizardConfig::from_file(file.path()).unwrap();
        assert_eq!(config.api.addr.port(), 9000);
        assert_eq!(
            config.inventory_path.as_deref(),
            Some(Path::new("/etc/growfs/inventory.yaml"))
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert_matches!(
            WizardConfig::from_yaml("limits:\n  max_luns_total: 0\n"),
            Err(Error::Configuration(_))
        );
        assert_matches!(WizardConfig::from_yaml("limits: [1, 2]"), Err(Error::YamlParse(_)));
        assert_matches!(WizardConfig::from_file("/nonexistent/growfs.yaml"), Err(Error::Io(_)));
    }
}
