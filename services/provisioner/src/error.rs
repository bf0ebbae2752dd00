//! Error types for the provisioner.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors talking to the scheduler's HTTP API.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The request never produced a response (connect, DNS, TLS, timeout).
    #[error("{0}")]
    Transport(String),

    /// The scheduler answered 401, 403 or 500.
    #[error("{message}")]
    AuthOrServer { status: u16, message: String },

    /// Any other non-success status.
    #[error("{message}")]
    Client { status: u16, message: String },

    /// A success response whose body could not be decoded.
    #[error("unexpected response body: {0}")]
    Decode(String),
}

/// Statuses after which the cached transport is rebuilt.
pub fn status_invalidates_transport(status: u16) -> bool {
    matches!(status, 401 | 403 | 500)
}

impl SchedulerError {
    /// Classify a non-success response.
    pub fn from_status(status: u16, message: String) -> Self {
        if status_invalidates_transport(status) {
            SchedulerError::AuthOrServer { status, message }
        } else {
            SchedulerError::Client { status, message }
        }
    }

    /// Returns true if this failure discards the cached transport.
    pub fn invalidates_transport(&self) -> bool {
        matches!(
            self,
            SchedulerError::Transport(_) | SchedulerError::AuthOrServer { .. }
        )
    }

    /// HTTP status carried by the error, if the scheduler answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            SchedulerError::AuthOrServer { status, .. } | SchedulerError::Client { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

/// Failures of a single worker launch.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The agent did not connect in time; its job has been stopped.
    #[error("worker {worker} did not connect within {timeout:?}")]
    Timeout { worker: String, timeout: Duration },

    /// The agent record could not be registered.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// The launch task itself was cancelled or panicked.
    #[error("launch aborted: {0}")]
    Aborted(String),
}

/// Errors from the CI node registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// An agent with this name is already registered.
    #[error("agent already registered: {0}")]
    Duplicate(String),

    /// No agent with this name is registered.
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    /// The agent was removed while someone waited for it.
    #[error("agent removed: {0}")]
    Removed(String),

    /// The wait for the agent was interrupted.
    #[error("wait interrupted for agent {0}")]
    Interrupted(String),
}

/// Template validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    /// A worker must offer at least one executor.
    #[error("template {prefix}: number of executors must be at least 1")]
    NoExecutors { prefix: String },
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The cloud configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for the expected shape.
    #[error("invalid cloud configuration: {0}")]
    Decode(String),

    /// The file declares a version newer than this build understands.
    #[error("unsupported configuration version {0}")]
    UnsupportedVersion(u32),

    /// The configuration could not be written back out.
    #[error("failed to serialize configuration: {0}")]
    Serialize(String),

    /// Building a legacy job template failed during migration.
    #[error("migration failed: {0}")]
    Migration(#[from] ci_nomad_api::ApiError),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Decode(e.to_string())
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(e: toml::ser::Error) -> Self {
        ConfigError::Serialize(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalidates_transport() {
        assert!(SchedulerError::Transport("refused".to_string()).invalidates_transport());
        assert!(SchedulerError::AuthOrServer {
            status: 403,
            message: "denied".to_string()
        }
        .invalidates_transport());
        assert!(!SchedulerError::Client {
            status: 404,
            message: "missing".to_string()
        }
        .invalidates_transport());
        assert!(!SchedulerError::Decode("eof".to_string()).invalidates_transport());
    }

    #[test]
    fn test_from_status() {
        for status in [401, 403, 500] {
            let err = SchedulerError::from_status(status, "x".to_string());
            assert!(matches!(err, SchedulerError::AuthOrServer { .. }));
            assert!(err.invalidates_transport());
        }
        for status in [400, 404, 409, 502, 503] {
            let err = SchedulerError::from_status(status, "x".to_string());
            assert!(matches!(err, SchedulerError::Client { .. }));
            assert!(!err.invalidates_transport());
        }
    }

    #[test]
    fn test_message_is_surfaced_verbatim() {
        let err = SchedulerError::AuthOrServer {
            status: 401,
            message: "ACL token not found".to_string(),
        };
        assert_eq!(err.to_string(), "ACL token not found");
        assert_eq!(err.status(), Some(401));
    }
}
