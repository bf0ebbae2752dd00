//! Configuration for the provisioner.
//!
//! Process settings come from environment variables; the cloud definition
//! (scheduler URL, TLS, templates) is a TOML file that may be in an older
//! format and is upgraded on load.

mod cloud;
pub mod migrate;

use std::path::PathBuf;

use anyhow::Result;
use uuid::Uuid;

pub use cloud::{CloudConfig, TemplateConfig, TlsSection};
pub use migrate::{MigrationContext, CURRENT_VERSION};

use crate::error::ConfigError;

/// Default location of the cloud definition.
pub const DEFAULT_CLOUD_CONFIG: &str = "/etc/nomad-provisioner/cloud.toml";

/// Provisioner process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path of the cloud definition file.
    pub cloud_config_path: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Scheduler ACL token; anonymous when absent.
    pub nomad_token: Option<String>,

    /// Root URL of the CI server, used when upgrading old cloud definitions.
    pub ci_root_url: String,

    /// Key from which agent connection secrets are derived.
    pub agent_secret_key: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let cloud_config_path = std::env::var("NOMAD_PROVISIONER_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CLOUD_CONFIG.to_string())
            .into();

        let log_level =
            std::env::var("NOMAD_PROVISIONER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let nomad_token = std::env::var("NOMAD_TOKEN").ok().filter(|t| !t.is_empty());

        let ci_root_url = std::env::var("CI_ROOT_URL").unwrap_or_default();

        // A random key is fine for one-shot commands; long-lived deployments set it.
        let agent_secret_key = std::env::var("NOMAD_AGENT_SECRET_KEY")
            .unwrap_or_else(|_| Uuid::new_v4().simple().to_string());

        Ok(Self {
            cloud_config_path,
            log_level,
            nomad_token,
            ci_root_url,
            agent_secret_key,
        })
    }

    /// Read the cloud definition and upgrade it to the current version.
    pub fn load_cloud(&self) -> Result<CloudConfig, ConfigError> {
        let text = std::fs::read_to_string(&self.cloud_config_path).map_err(|source| ConfigError::Read {
            path: self.cloud_config_path.clone(),
            source,
        })?;

        migrate::decode(
            &text,
            &MigrationContext {
                ci_root_url: &self.ci_root_url,
            },
        )
    }
}
