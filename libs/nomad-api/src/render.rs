//! Job spec rendering.
//!
//! A worker template is plain text with three placeholders. Rendering is pure
//! string substitution; the only other step is normalization of templates
//! that are not already in the scheduler's structured (JSON) format, which is
//! delegated to a [`TemplateParser`] (in practice the scheduler's own parse
//! endpoint).

use async_trait::async_trait;
use tracing::{debug, error};

use crate::error::ApiError;

/// Placeholder for the worker (and job) name.
pub const WORKER_NAME: &str = "%WORKER_NAME%";

/// Placeholder for the secret the worker uses to connect to the CI server.
pub const WORKER_SECRET: &str = "%WORKER_SECRET%";

/// Placeholder for the worker's working directory.
pub const WORKER_DIR: &str = "%WORKER_DIR%";

/// Per-launch values substituted into a template.
#[derive(Debug, Clone, Copy)]
pub struct RenderVars<'a> {
    pub name: &'a str,
    pub secret: &'a str,
    pub work_dir: &'a str,
}

/// Converts an alternate textual job format into the structured format.
#[async_trait]
pub trait TemplateParser: Send + Sync {
    /// Returns the structured job document (wrapped as `{"Job": ...}`).
    async fn parse_template(&self, raw: &str) -> Result<String, ApiError>;
}

/// Substitute the three placeholders. No other interpretation takes place.
pub fn substitute(template: &str, vars: &RenderVars<'_>) -> String {
    template
        .replace(WORKER_NAME, vars.name)
        .replace(WORKER_SECRET, vars.secret)
        .replace(WORKER_DIR, vars.work_dir)
}

/// Returns true if `source` parses as a JSON object or a JSON array.
pub fn is_structured(source: &str) -> bool {
    serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(source).is_ok()
        || serde_json::from_str::<Vec<serde_json::Value>>(source).is_ok()
}

/// Bring a template into the structured format.
///
/// Structured templates are returned unchanged. Otherwise the parser is asked
/// to convert it; on failure the original text is returned and the error is
/// logged, leaving the scheduler to reject the submission.
pub async fn normalize<P>(parser: &P, template: &str) -> String
where
    P: TemplateParser + ?Sized,
{
    if is_structured(template) {
        return template.to_string();
    }

    match parser.parse_template(template).await {
        Ok(document) => document,
        Err(e) => {
            error!(error = %e, "Converting job template to structured format failed");
            template.to_string()
        }
    }
}

/// Render a template into a submittable job document.
pub async fn render<P>(parser: &P, template: &str, vars: &RenderVars<'_>) -> String
where
    P: TemplateParser + ?Sized,
{
    let job = substitute(&normalize(parser, template).await, vars);
    debug!(worker = %vars.name, job = %job, "Rendered job document");
    job
}
