//! Cloud definition file (current version).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::{ClientSettings, SchedulerClient};
use crate::config::migrate::CURRENT_VERSION;
use crate::error::{ConfigError, TemplateError};
use crate::orchestrator::{CloudSettings, NomadCloud};
use crate::registry::NodeRegistry;
use crate::template::WorkerTemplate;
use crate::tls::TlsConfig;

pub(crate) fn default_worker_timeout_minutes() -> u32 {
    1
}

pub(crate) fn default_num_executors() -> u32 {
    1
}

/// One scheduler-backed cloud and its worker templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Files without a version are older formats; read those through
    /// [`migrate::decode`](super::migrate::decode).
    pub version: u32,

    pub name: String,

    /// Scheduler base URL.
    pub nomad_url: String,

    /// Sweep orphaned jobs before provisioning.
    #[serde(default)]
    pub prune: bool,

    /// How long a launched worker has to connect.
    #[serde(default = "default_worker_timeout_minutes")]
    pub worker_timeout_minutes: u32,

    #[serde(default)]
    pub tls: TlsSection,

    #[serde(default)]
    pub templates: Vec<TemplateConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsSection {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_certificate: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_certificate: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateConfig {
    #[serde(default)]
    pub prefix: String,
    /// Whitespace separated.
    #[serde(default)]
    pub labels: String,
    #[serde(default)]
    pub idle_termination_minutes: u32,
    #[serde(default)]
    pub reusable: bool,
    #[serde(default = "default_num_executors")]
    pub num_executors: u32,
    #[serde(default)]
    pub remote_fs: String,
    #[serde(default)]
    pub job_template: String,
}

impl TemplateConfig {
    pub fn to_template(&self) -> Result<WorkerTemplate, TemplateError> {
        Ok(WorkerTemplate::new(
            &self.prefix,
            &self.labels,
            self.num_executors,
            self.job_template.clone(),
        )?
        .with_remote_fs(self.remote_fs.clone())
        .with_idle_termination_minutes(self.idle_termination_minutes)
        .with_reusable(self.reusable))
    }
}

impl CloudConfig {
    /// Decode a file already at the current version.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        if config.version != CURRENT_VERSION {
            return Err(ConfigError::UnsupportedVersion(config.version));
        }
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.worker_timeout_minutes) * 60)
    }

    pub fn tls_config(&self) -> Option<TlsConfig> {
        self.tls.enabled.then(|| TlsConfig {
            client_certificate: self.tls.client_certificate.clone(),
            client_password: self.tls.client_password.clone(),
            server_certificate: self.tls.server_certificate.clone(),
            server_password: self.tls.server_password.clone(),
        })
    }

    pub fn client_settings(&self, token: Option<String>) -> ClientSettings {
        ClientSettings::new(self.nomad_url.clone())
            .with_token(token)
            .with_tls(self.tls_config())
    }

    pub fn worker_templates(&self) -> Result<Vec<WorkerTemplate>, TemplateError> {
        self.templates.iter().map(TemplateConfig::to_template).collect()
    }

    /// Assemble the cloud around an existing client and registry.
    pub fn build_cloud(
        &self,
        client: Arc<SchedulerClient>,
        registry: Arc<dyn NodeRegistry>,
    ) -> Result<NomadCloud, ConfigError> {
        let settings = CloudSettings {
            name: self.name.clone(),
            prune: self.prune,
            worker_timeout: self.worker_timeout(),
        };
        Ok(NomadCloud::new(settings, self.worker_templates()?, client, registry))
    }
}
