//! Scheduler HTTP API client.
//!
//! The client keeps one lazily built HTTP transport. Authentication failures,
//! server errors and transport errors discard it so that the next request
//! rebuilds it with fresh credentials and TLS material.
//!
//! Endpoints used:
//! - `GET /v1/agent/self` connection check
//! - `PUT /v1/jobs` submit
//! - `POST /v1/jobs/parse` convert alternate job formats
//! - `POST /v1/job/{id}/plan` dry-run validation
//! - `GET /v1/jobs?prefix=` list
//! - `GET /v1/job/{id}` detail
//! - `DELETE /v1/job/{id}` stop

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use ci_nomad_api::render::{render, RenderVars, TemplateParser};
use ci_nomad_api::{ApiError, JobDetail, JobInfo};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{status_invalidates_transport, SchedulerError};
use crate::template::WorkerTemplate;
use crate::tls::{self, TlsConfig};

/// Header carrying the scheduler ACL token.
pub const TOKEN_HEADER: &str = "X-Nomad-Token";

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Scheduler base URL, e.g. `http://127.0.0.1:4646`.
    pub base_url: String,
    pub token: Option<String>,
    pub tls: Option<TlsConfig>,
    pub request_timeout: Duration,
}

impl ClientSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            tls: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn with_tls(mut self, tls: Option<TlsConfig>) -> Self {
        self.tls = tls;
        self
    }
}

/// Client for the scheduler's HTTP API.
pub struct SchedulerClient {
    settings: ClientSettings,
    transport: RwLock<Option<Arc<reqwest::Client>>>,
    build_lock: Mutex<()>,
    builds: AtomicU64,
}

impl SchedulerClient {
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            settings: ClientSettings {
                base_url: settings.base_url.trim_end_matches('/').to_string(),
                ..settings
            },
            transport: RwLock::new(None),
            build_lock: Mutex::new(()),
            builds: AtomicU64::new(0),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.settings.base_url
    }

    /// The cached transport, built on first use.
    ///
    /// Concurrent callers that find no transport build exactly one.
    pub fn transport(&self) -> Arc<reqwest::Client> {
        if let Some(client) = self.cached() {
            return client;
        }

        let _guard = self
            .build_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = self.cached() {
            return client;
        }

        let client = Arc::new(self.build_transport());
        *self
            .transport
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(client.clone());
        self.builds.fetch_add(1, Ordering::SeqCst);
        client
    }

    /// Discard the cached transport.
    pub fn invalidate(&self) {
        let previous = self
            .transport
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            info!("Scheduler client has been reset");
        }
    }

    pub fn has_transport(&self) -> bool {
        self.cached().is_some()
    }

    /// Number of transports built so far.
    pub fn transport_builds(&self) -> u64 {
        self.builds.load(Ordering::SeqCst)
    }

    fn cached(&self) -> Option<Arc<reqwest::Client>> {
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn build_transport(&self) -> reqwest::Client {
        let mut builder = reqwest::Client::builder().timeout(self.settings.request_timeout);
        if let Some(tls_config) = &self.settings.tls {
            builder = tls::apply(builder, tls_config);
        }

        match builder.build() {
            Ok(client) => client,
            Err(e) => {
                error!(error = %e, "Building scheduler transport failed, using defaults");
                reqwest::Client::builder()
                    .timeout(self.settings.request_timeout)
                    .build()
                    .unwrap_or_else(|_| reqwest::Client::new())
            }
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.settings.base_url, path);
        let mut builder = self.transport().request(method, url);
        if let Some(token) = &self.settings.token {
            builder = builder.header(TOKEN_HEADER, token);
        }
        builder
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, SchedulerError> {
        match request.send().await {
            Ok(response) => {
                if status_invalidates_transport(response.status().as_u16()) {
                    self.invalidate();
                }
                Ok(response)
            }
            Err(e) => {
                self.invalidate();
                Err(SchedulerError::Transport(e.to_string()))
            }
        }
    }

    /// Send and return the body of a success response.
    async fn send(&self, request: RequestBuilder) -> Result<String, SchedulerError> {
        let response = self.execute(request).await?;
        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                if status.is_success() {
                    return Err(SchedulerError::Decode(e.to_string()));
                }
                String::new()
            }
        };

        if status.is_success() {
            return Ok(body);
        }

        let message = if body.trim().is_empty() {
            format!("HTTP {status}")
        } else {
            body
        };
        Err(SchedulerError::from_status(status.as_u16(), message))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, SchedulerError> {
        let body = self.send(request).await?;
        serde_json::from_str(&body).map_err(|e| SchedulerError::Decode(e.to_string()))
    }

    /// Verify that the scheduler is reachable and accepts our credentials.
    pub async fn check_connection(&self) -> Result<(), SchedulerError> {
        self.send(self.request(Method::GET, "/v1/agent/self"))
            .await
            .map(|_| ())
    }

    /// Render `template` for one worker and submit it.
    ///
    /// Submission failures are logged; the launch workflow detects them as a
    /// connection timeout. Returns the document that was submitted.
    #[instrument(skip(self, secret, template), fields(prefix = %template.prefix()))]
    pub async fn submit_job(&self, name: &str, secret: &str, template: &WorkerTemplate) -> String {
        let vars = RenderVars {
            name,
            secret,
            work_dir: template.remote_fs(),
        };
        let job = render(self, template.job_template(), &vars).await;

        let request = self
            .request(Method::PUT, "/v1/jobs")
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(job.clone());
        match self.send(request).await {
            Ok(body) => debug!(worker = %name, response = %body, "Job submitted"),
            Err(e) => error!(worker = %name, error = %e, "Submitting job failed"),
        }

        job
    }

    /// Stop (deregister) a job. Failures are logged.
    pub async fn stop_job(&self, job_id: &str, namespace: Option<&str>, region: Option<&str>) {
        let mut query = Vec::new();
        if let Some(namespace) = namespace {
            query.push(("namespace", namespace));
        }
        if let Some(region) = region {
            query.push(("region", region));
        }

        let request = self
            .request(Method::DELETE, &format!("/v1/job/{job_id}"))
            .query(&query);
        match self.send(request).await {
            Ok(_) => info!(job_id = %job_id, "Job stopped"),
            Err(e) => error!(job_id = %job_id, error = %e, "Stopping job failed"),
        }
    }

    /// Jobs whose id starts with `prefix`. Empty on any failure.
    pub async fn list_jobs(&self, prefix: &str) -> Vec<JobInfo> {
        let request = self
            .request(Method::GET, "/v1/jobs")
            .query(&[("prefix", prefix)]);
        match self.send_json::<Option<Vec<JobInfo>>>(request).await {
            Ok(jobs) => jobs.unwrap_or_default(),
            Err(e) => {
                error!(prefix = %prefix, error = %e, "Listing jobs failed");
                Vec::new()
            }
        }
    }

    pub async fn job_detail(&self, job_id: &str, namespace: Option<&str>) -> Result<JobDetail, SchedulerError> {
        let mut request = self.request(Method::GET, &format!("/v1/job/{job_id}"));
        if let Some(namespace) = namespace {
            request = request.query(&[("namespace", namespace)]);
        }
        self.send_json(request).await
    }

    /// Dry-run a template through the scheduler's planner.
    ///
    /// Renders with a random name and an empty secret; nothing is scheduled.
    pub async fn validate_job(&self, template: &WorkerTemplate) -> Result<(), SchedulerError> {
        let name = Uuid::new_v4().to_string();
        let vars = RenderVars {
            name: &name,
            secret: "",
            work_dir: template.remote_fs(),
        };
        let job = render(self, template.job_template(), &vars).await;

        let request = self
            .request(Method::POST, &format!("/v1/job/{name}/plan"))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(job);
        match self.send(request).await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(prefix = %template.prefix(), error = %e, "Template validation failed");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl TemplateParser for SchedulerClient {
    async fn parse_template(&self, raw: &str) -> Result<String, ApiError> {
        let request = self
            .request(Method::POST, "/v1/jobs/parse")
            .json(&json!({ "JobHCL": raw }));
        let job: serde_json::Value = self
            .send_json(request)
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;
        Ok(serde_json::to_string_pretty(&json!({ "Job": job }))?)
    }
}
