//! Versioned cloud definition upgrades.
//!
//! Each step is a pure transform from one version's struct to the next:
//!
//! - v0: structured worker fields, no explicit driver
//! - v1: explicit driver and worker jar URL
//! - v2: job templates (current)

use ci_nomad_api::legacy::{build_job_template, LegacyContext, LegacyTemplate};
use serde::Deserialize;
use tracing::info;

use super::cloud::{default_num_executors, default_worker_timeout_minutes, CloudConfig, TemplateConfig, TlsSection};
use crate::error::ConfigError;

pub const CURRENT_VERSION: u32 = 2;

/// Settings of the surrounding CI server that old files relied on.
#[derive(Debug, Clone, Copy)]
pub struct MigrationContext<'a> {
    pub ci_root_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct VersionProbe {
    #[serde(default)]
    version: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloudConfigV0 {
    pub name: String,
    pub nomad_url: String,
    #[serde(default)]
    pub prune: bool,
    #[serde(default = "default_worker_timeout_minutes")]
    pub worker_timeout_minutes: u32,
    #[serde(default)]
    pub tls: TlsSection,
    #[serde(default)]
    pub ci_url: String,
    #[serde(default)]
    pub ci_tunnel: String,
    #[serde(default)]
    pub worker_url: String,
    #[serde(default)]
    pub templates: Vec<TemplateV0>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateV0 {
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub labels: String,
    #[serde(default)]
    pub idle_termination_minutes: u32,
    #[serde(default)]
    pub reusable: bool,
    #[serde(default = "default_num_executors")]
    pub num_executors: u32,
    #[serde(default)]
    pub use_raw_exec: bool,
    /// Unversioned files written by newer tools may already carry one.
    #[serde(default)]
    pub job_template: String,
    #[serde(flatten)]
    pub worker: LegacyTemplate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateV1 {
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub labels: String,
    #[serde(default)]
    pub idle_termination_minutes: u32,
    #[serde(default)]
    pub reusable: bool,
    #[serde(default = "default_num_executors")]
    pub num_executors: u32,
    #[serde(default)]
    pub job_template: String,
    #[serde(flatten)]
    pub worker: LegacyTemplate,
}

/// Same fields as v0; every template has a driver and may carry a job template.
#[derive(Debug, Clone, Deserialize)]
pub struct CloudConfigV1 {
    pub name: String,
    pub nomad_url: String,
    #[serde(default)]
    pub prune: bool,
    #[serde(default = "default_worker_timeout_minutes")]
    pub worker_timeout_minutes: u32,
    #[serde(default)]
    pub tls: TlsSection,
    #[serde(default)]
    pub ci_url: String,
    #[serde(default)]
    pub ci_tunnel: String,
    #[serde(default)]
    pub worker_url: String,
    #[serde(default)]
    pub templates: Vec<TemplateV1>,
}

/// Decode a cloud definition of any supported version and bring it up to date.
///
/// A file without `version` is read as v0. Templates that already carry a
/// job template keep it through every step.
pub fn decode(text: &str, ctx: &MigrationContext<'_>) -> Result<CloudConfig, ConfigError> {
    let probe: VersionProbe = toml::from_str(text)?;
    match probe.version {
        0 => {
            let v0: CloudConfigV0 = toml::from_str(text)?;
            upgrade_v1(upgrade_v0(v0, ctx))
        }
        1 => upgrade_v1(toml::from_str(text)?),
        CURRENT_VERSION => CloudConfig::from_toml(text),
        other => Err(ConfigError::UnsupportedVersion(other)),
    }
}

/// v0 to v1: fill in the CI URL, worker URL and driver.
pub fn upgrade_v0(mut config: CloudConfigV0, ctx: &MigrationContext<'_>) -> CloudConfigV1 {
    if config.ci_url.is_empty() && !ctx.ci_root_url.is_empty() {
        config.ci_url = ctx.ci_root_url.to_string();
        info!(parameter = "ci_url", value = %config.ci_url, "Migrated configuration parameter");
    }

    if config.worker_url.is_empty() {
        config.worker_url = format!("{}/jnlpJars/slave.jar", config.ci_url.trim_end_matches('/'));
        info!(parameter = "worker_url", value = %config.worker_url, "Migrated configuration parameter");
    }

    for template in &mut config.templates {
        if template.worker.driver.is_empty() && template.job_template.is_empty() {
            template.worker.driver = if template.use_raw_exec {
                "raw_exec"
            } else if !template.worker.image.is_empty() {
                "docker"
            } else {
                "java"
            }
            .to_string();
            info!(
                parameter = "driver",
                prefix = %template.prefix,
                value = %template.worker.driver,
                "Migrated configuration parameter"
            );
        }
    }

    CloudConfigV1 {
        name: config.name,
        nomad_url: config.nomad_url,
        prune: config.prune,
        worker_timeout_minutes: config.worker_timeout_minutes,
        tls: config.tls,
        ci_url: config.ci_url,
        ci_tunnel: config.ci_tunnel,
        worker_url: config.worker_url,
        templates: config
            .templates
            .into_iter()
            .map(|t| TemplateV1 {
                prefix: t.prefix,
                labels: t.labels,
                idle_termination_minutes: t.idle_termination_minutes,
                reusable: t.reusable,
                num_executors: t.num_executors,
                job_template: t.job_template,
                worker: t.worker,
            })
            .collect(),
    }
}

/// v1 to v2: render structured workers into job templates.
pub fn upgrade_v1(config: CloudConfigV1) -> Result<CloudConfig, ConfigError> {
    let ctx = LegacyContext {
        ci_url: &config.ci_url,
        tunnel: &config.ci_tunnel,
        worker_url: &config.worker_url,
    };

    let templates = config
        .templates
        .iter()
        .map(|t| -> Result<TemplateConfig, ConfigError> {
            let job_template = if t.job_template.is_empty() {
                info!(prefix = %t.prefix, "Migrated structured worker definition to job template");
                build_job_template(&t.worker, &ctx)?
            } else {
                t.job_template.clone()
            };
            Ok(TemplateConfig {
                prefix: t.prefix.clone(),
                labels: t.labels.clone(),
                idle_termination_minutes: t.idle_termination_minutes,
                reusable: t.reusable,
                num_executors: t.num_executors,
                remote_fs: t.worker.remote_fs.clone(),
                job_template,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CloudConfig {
        version: CURRENT_VERSION,
        name: config.name,
        nomad_url: config.nomad_url,
        prune: config.prune,
        worker_timeout_minutes: config.worker_timeout_minutes,
        tls: config.tls,
        templates,
    })
}
