//! Structured job document accepted by the scheduler's `/v1/jobs` endpoint.
//!
//! Field names follow the scheduler's JSON API (PascalCase, with a few
//! all-caps acronyms such as `ID`, `CPU` and `MemoryMB`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Top-level submission wrapper: `{"Job": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDocument {
    #[serde(rename = "Job")]
    pub job: Job,
}

impl JobDocument {
    /// Serialize as pretty-printed JSON, the form submitted to the scheduler.
    pub fn to_json_pretty(&self) -> Result<String, ApiError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Job {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub region: String,
    #[serde(rename = "Type")]
    pub job_type: String,
    pub priority: i32,
    #[serde(default)]
    pub datacenters: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub task_groups: Vec<TaskGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    #[serde(rename = "LTarget")]
    pub l_target: String,
    #[serde(rename = "RTarget")]
    pub r_target: String,
    #[serde(rename = "Operand")]
    pub operand: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskGroup {
    pub name: String,
    pub count: u32,
    pub tasks: Vec<Task>,
    pub restart_policy: RestartPolicy,
    pub ephemeral_disk: EphemeralDisk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Task {
    pub name: String,
    pub driver: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Driver-specific configuration; ordered so documents render deterministically.
    #[serde(default)]
    pub config: BTreeMap<String, serde_json::Value>,
    pub resources: Resources,
    pub log_config: LogConfig,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault: Option<Vault>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(rename = "CPU")]
    pub cpu: i32,
    #[serde(rename = "MemoryMB")]
    pub memory_mb: i32,
    #[serde(rename = "Networks", default)]
    pub networks: Vec<Network>,
    #[serde(rename = "Devices", default)]
    pub devices: Vec<Device>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    #[serde(rename = "MBits")]
    pub mbits: i32,
    #[serde(rename = "ReservedPorts", default)]
    pub reserved_ports: Vec<ReservedPort>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReservedPort {
    pub label: String,
    pub value: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Device {
    pub name: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(rename = "MaxFiles")]
    pub max_files: u32,
    #[serde(rename = "MaxFileSizeMB")]
    pub max_file_size_mb: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Artifact {
    pub getter_source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub getter_options: Option<BTreeMap<String, String>>,
    pub relative_dest: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Vault {
    pub policies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RestartPolicy {
    pub attempts: u32,
    /// Nanoseconds.
    pub interval: u64,
    /// Nanoseconds.
    pub delay: u64,
    pub mode: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EphemeralDisk {
    #[serde(rename = "SizeMB")]
    pub size_mb: i32,
    #[serde(rename = "Migrate")]
    pub migrate: bool,
    #[serde(rename = "Sticky")]
    pub sticky: bool,
}
