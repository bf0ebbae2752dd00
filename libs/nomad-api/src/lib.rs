//! # ci-nomad-api
//!
//! Wire-level types for talking to a Nomad-style batch scheduler on behalf of
//! a CI server, plus the job spec renderer used to turn worker templates into
//! submittable job documents.
//!
//! ## Modules
//!
//! - `document`: the structured job document (`{"Job": {...}}`)
//! - `jobs`: read-only projections of scheduler-reported jobs
//! - `render`: placeholder substitution and alternate-format normalization
//! - `legacy`: job documents built from pre-template worker definitions

mod error;

pub mod document;
pub mod jobs;
pub mod legacy;
pub mod render;

pub use document::JobDocument;
pub use error::ApiError;
pub use jobs::{JobDetail, JobInfo, JobSummary, Placement};
pub use render::{RenderVars, TemplateParser};
