//! # ci-nomad-provisioner
//!
//! Elastic CI build agents on a Nomad-style batch scheduler.
//!
//! The CI server's capacity planner asks a [`cloud::Cloud`] for workers; the
//! scheduler-backed implementation renders a job per worker, submits it and
//! waits for the agent to connect, stopping the job if it never does.
//!
//! ## Architecture
//!
//! ```text
//! ProvisioningStrategy
//! └── NomadCloud (orchestrator)
//!     ├── OrphanReaper        (before provisioning, optional)
//!     └── LaunchWorkflow × N  (one task per worker)
//!         └── SchedulerClient (render + submit, stop on timeout)
//! ```
//!
//! ## Modules
//!
//! - `client`: scheduler HTTP API with a self-healing transport
//! - `orchestrator`: template matching and launch dispatch
//! - `launch`: per-worker launch state machine
//! - `reaper`: orphaned job cleanup
//! - `strategy` / `retention`: capacity and idle policies
//! - `registry`: CI node registry seam and an in-memory implementation
//! - `config`: environment settings and versioned cloud definitions

pub mod agent;
pub mod client;
pub mod cloud;
pub mod config;
pub mod error;
pub mod label;
pub mod launch;
pub mod orchestrator;
pub mod pending;
pub mod reaper;
pub mod registry;
pub mod retention;
pub mod strategy;
pub mod template;
pub mod tls;

pub use agent::Agent;
pub use client::{ClientSettings, SchedulerClient};
pub use cloud::{Cloud, PlannedAgent};
pub use error::{ConfigError, LaunchError, RegistryError, SchedulerError, TemplateError};
pub use label::LabelExpr;
pub use orchestrator::{CloudSettings, NomadCloud};
pub use registry::{InMemoryRegistry, NodeRegistry};
pub use template::WorkerTemplate;
pub use tls::TlsConfig;
