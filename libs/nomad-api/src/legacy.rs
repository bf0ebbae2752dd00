//! Job documents built from structured (pre-template) worker definitions.
//!
//! Before worker templates carried a full job spec, a worker was described by
//! a handful of fields (driver, image, resources, ports, ...). Configuration
//! upgrades use [`build_job`] with the literal placeholders as name and secret
//! to turn such a definition into an ordinary job template.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::document::{
    Artifact, Constraint, Device, EphemeralDisk, Job, JobDocument, LogConfig, Network,
    ReservedPort, Resources, RestartPolicy, Task, TaskGroup, Vault,
};
use crate::error::ApiError;

/// Agent jar location inside the task directory.
pub const AGENT_JAR: &str = "/local/slave.jar";

const TASK_NAME: &str = "jenkins-worker";
const TASK_GROUP_NAME: &str = "jenkins-worker-taskgroup";
const REMOTING_MAIN: &str = "hudson.remoting.jnlp.Main";

/// Structured worker definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyTemplate {
    /// `java`, `raw_exec` or `docker`.
    pub driver: String,
    pub region: String,
    pub priority: i32,
    /// Comma separated.
    pub datacenters: String,
    pub cpu: i32,
    pub memory: i32,
    pub disk: i32,
    pub remote_fs: String,
    pub switch_user: String,
    pub image: String,
    pub username: String,
    pub password: String,
    pub privileged: bool,
    pub force_pull: bool,
    pub network: String,
    pub prefix_cmd: String,
    /// Comma separated `host:container[:mode]` entries.
    pub host_volumes: String,
    pub extra_hosts: String,
    pub dns_servers: String,
    pub security_opt: String,
    pub cap_add: String,
    pub cap_drop: String,
    /// Comma separated Vault policy names.
    pub vault_policies: String,
    pub ports: Vec<PortSpec>,
    pub devices: Vec<DeviceSpec>,
    pub constraints: Vec<ConstraintSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    pub label: String,
    pub value: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub name: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintSpec {
    pub ltarget: String,
    pub operand: String,
    pub rtarget: String,
}

/// CI-server wide settings that legacy definitions depended on.
#[derive(Debug, Clone, Copy)]
pub struct LegacyContext<'a> {
    /// Root URL of the CI server.
    pub ci_url: &'a str,
    /// Optional `host:port` tunnel for agent connections.
    pub tunnel: &'a str,
    /// Download URL of the agent jar.
    pub worker_url: &'a str,
}

/// Build the job document for one worker.
pub fn build_job(
    name: &str,
    secret: &str,
    template: &LegacyTemplate,
    ctx: &LegacyContext<'_>,
) -> JobDocument {
    let ports = template
        .ports
        .iter()
        .map(|p| ReservedPort {
            label: p.label.clone(),
            value: p.value,
        })
        .collect();

    let devices = template
        .devices
        .iter()
        .map(|d| Device {
            name: d.name.clone(),
            count: d.count,
        })
        .collect();

    let policies = split_list(&template.vault_policies, &[',']);
    let vault = (!policies.is_empty()).then_some(Vault { policies });

    let task = Task {
        name: TASK_NAME.to_string(),
        driver: template.driver.clone(),
        user: non_empty(&template.switch_user),
        config: build_driver_config(name, secret, template, ctx),
        resources: Resources {
            cpu: template.cpu,
            memory_mb: template.memory,
            networks: vec![Network {
                mbits: 1,
                reserved_ports: ports,
            }],
            devices,
        },
        log_config: LogConfig {
            max_files: 1,
            max_file_size_mb: 10,
        },
        artifacts: vec![Artifact {
            getter_source: ctx.worker_url.to_string(),
            getter_options: None,
            relative_dest: "/local/".to_string(),
        }],
        vault,
    };

    let task_group = TaskGroup {
        name: TASK_GROUP_NAME.to_string(),
        count: 1,
        tasks: vec![task],
        restart_policy: RestartPolicy {
            attempts: 0,
            interval: 10_000_000_000,
            delay: 1_000_000_000,
            mode: "fail".to_string(),
        },
        ephemeral_disk: EphemeralDisk {
            size_mb: template.disk,
            migrate: false,
            sticky: false,
        },
    };

    let constraints = template
        .constraints
        .iter()
        .map(|c| Constraint {
            l_target: c.ltarget.clone(),
            r_target: c.rtarget.clone(),
            operand: c.operand.clone(),
        })
        .collect();

    JobDocument {
        job: Job {
            id: name.to_string(),
            name: name.to_string(),
            namespace: None,
            region: template.region.clone(),
            job_type: "batch".to_string(),
            priority: template.priority,
            datacenters: split_list(&template.datacenters, &[',']),
            constraints,
            task_groups: vec![task_group],
        },
    }
}

/// Build the job template text for a structured definition, keeping the
/// name and secret placeholders in place.
pub fn build_job_template(
    template: &LegacyTemplate,
    ctx: &LegacyContext<'_>,
) -> Result<String, ApiError> {
    build_job(
        crate::render::WORKER_NAME,
        crate::render::WORKER_SECRET,
        template,
        ctx,
    )
    .to_json_pretty()
}

/// Driver-specific task configuration.
pub fn build_driver_config(
    name: &str,
    secret: &str,
    template: &LegacyTemplate,
    ctx: &LegacyContext<'_>,
) -> BTreeMap<String, Value> {
    let mut config = BTreeMap::new();

    if !template.username.is_empty() {
        config.insert(
            "auth".to_string(),
            json!([{ "username": template.username, "password": template.password }]),
        );
    }

    let jnlp_url = format!(
        "{}computer/{}/worker-agent.jnlp",
        ensure_trailing_slash(ctx.ci_url),
        name
    );

    match template.driver.as_str() {
        "java" => {
            let mut args = vec!["-jnlpUrl".to_string(), jnlp_url];
            push_secret(&mut args, secret);
            config.insert("jar_path".to_string(), json!(AGENT_JAR));
            config.insert("args".to_string(), json!(args));
        }
        "raw_exec" => {
            let mut args = vec![
                "-jar".to_string(),
                ".".to_string() + AGENT_JAR,
                "-jnlpUrl".to_string(),
                jnlp_url,
            ];
            push_secret(&mut args, secret);
            config.insert("command".to_string(), json!("java"));
            config.insert("args".to_string(), json!(args));
        }
        "docker" => {
            let mut args = vec!["-headless".to_string()];
            if !ctx.ci_url.is_empty() {
                args.extend(["-url".to_string(), ctx.ci_url.to_string()]);
            }
            if !ctx.tunnel.is_empty() {
                args.extend(["-tunnel".to_string(), ctx.tunnel.to_string()]);
            }
            if !template.remote_fs.is_empty() {
                args.extend([
                    "-workDir".to_string(),
                    ensure_trailing_slash(&template.remote_fs),
                ]);
            }
            if !secret.is_empty() {
                args.push(secret.to_string());
            }
            args.push(name.to_string());

            if template.prefix_cmd.is_empty() {
                let mut full = vec![
                    "-cp".to_string(),
                    AGENT_JAR.to_string(),
                    REMOTING_MAIN.to_string(),
                ];
                full.extend(args);
                config.insert("command".to_string(), json!("java"));
                config.insert("args".to_string(), json!(full));
            } else {
                let line = format!(
                    "{}; java -cp {} {} {}",
                    template.prefix_cmd,
                    AGENT_JAR,
                    REMOTING_MAIN,
                    args.join(" ")
                );
                config.insert("command".to_string(), json!("/bin/bash"));
                config.insert("args".to_string(), json!(["-c", line]));
            }

            config.insert("image".to_string(), json!(template.image));
            let volumes = split_list(&template.host_volumes, &[',']);
            if !volumes.is_empty() {
                config.insert("volumes".to_string(), json!(volumes));
            }
            config.insert("force_pull".to_string(), json!(template.force_pull));
            config.insert("privileged".to_string(), json!(template.privileged));
            config.insert("network_mode".to_string(), json!(template.network));

            for (key, raw) in [
                ("extra_hosts", &template.extra_hosts),
                ("dns_servers", &template.dns_servers),
                ("security_opt", &template.security_opt),
                ("cap_add", &template.cap_add),
                ("cap_drop", &template.cap_drop),
            ] {
                let values = split_list(raw, &[',', ' ']);
                if !values.is_empty() {
                    config.insert(key.to_string(), json!(values));
                }
            }
        }
        _ => {}
    }

    config
}

fn push_secret(args: &mut Vec<String>, secret: &str) {
    if !secret.is_empty() {
        args.push("-secret".to_string());
        args.push(secret.to_string());
    }
}

fn ensure_trailing_slash(s: &str) -> String {
    if s.ends_with('/') {
        s.to_string()
    } else {
        format!("{s}/")
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// Split on any of `separators`, dropping empty pieces.
fn split_list(raw: &str, separators: &[char]) -> Vec<String> {
    raw.split(|c| separators.contains(&c))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
