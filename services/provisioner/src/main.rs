//! nomad-provisioner
//!
//! Operator tool for a scheduler-backed CI cloud. Reads the same cloud
//! definition the provisioner uses and talks to the scheduler read-only:
//!
//! - **check**: connection and credential check
//! - **validate**: dry-run every template through the scheduler's planner
//! - **jobs**: list worker jobs
//! - **render**: print the job document a launch would submit
//! - **migrate**: print the cloud definition upgraded to the current version

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use ci_nomad_api::render::{render, RenderVars};
use ci_nomad_provisioner::config::{CloudConfig, Config};
use ci_nomad_provisioner::{InMemoryRegistry, NodeRegistry, NomadCloud, SchedulerClient, WorkerTemplate};
use clap::{Parser, Subcommand};
use tabled::{Table, Tabled};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "nomad-provisioner", version, about = "Scheduler-backed CI agent provisioning")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check the scheduler connection and credentials.
    Check,

    /// Validate worker templates against the scheduler.
    Validate {
        /// Only validate the template with this prefix.
        #[arg(long)]
        prefix: Option<String>,
    },

    /// List worker jobs known to the scheduler.
    Jobs {
        /// Job name prefix; defaults to every template's prefix.
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Render the job document for one worker.
    Render {
        #[arg(long)]
        prefix: String,
        #[arg(long)]
        name: String,
        /// Defaults to the secret derived from NOMAD_AGENT_SECRET_KEY.
        #[arg(long)]
        secret: Option<String>,
    },

    /// Print the cloud definition upgraded to the current version.
    Migrate,
}

#[derive(Tabled)]
struct JobRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Priority")]
    priority: String,
    #[tabled(rename = "Namespace")]
    namespace: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.as_str().into()))
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let cloud = config
        .load_cloud()
        .with_context(|| format!("loading {}", config.cloud_config_path.display()))?;
    info!(
        cloud = %cloud.name,
        nomad_url = %cloud.nomad_url,
        templates = cloud.templates.len(),
        "Configuration loaded"
    );

    let client = Arc::new(SchedulerClient::new(
        cloud.client_settings(config.nomad_token.clone()),
    ));
    let registry = Arc::new(InMemoryRegistry::new(config.agent_secret_key.clone()));

    match cli.command {
        Command::Check => check(&client).await,
        Command::Validate { prefix } => {
            let nomad = build(&cloud, &client, &registry)?;
            validate(&nomad, prefix.as_deref()).await
        }
        Command::Jobs { prefix } => {
            let nomad = build(&cloud, &client, &registry)?;
            jobs(&nomad, prefix).await
        }
        Command::Render {
            prefix,
            name,
            secret,
        } => {
            let nomad = build(&cloud, &client, &registry)?;
            let secret = secret.unwrap_or_else(|| registry.agent_secret(&name));
            render_job(&nomad, &prefix, &name, &secret).await
        }
        Command::Migrate => {
            print!("{}", cloud.to_toml()?);
            Ok(())
        }
    }
}

async fn check(client: &SchedulerClient) -> Result<()> {
    match client.check_connection().await {
        Ok(()) => {
            println!("Connected to {}", client.base_url());
            Ok(())
        }
        Err(e) => bail!("connection to {} failed: {}", client.base_url(), e),
    }
}

fn build(cloud: &CloudConfig, client: &Arc<SchedulerClient>, registry: &Arc<InMemoryRegistry>) -> Result<NomadCloud> {
    let registry: Arc<dyn NodeRegistry> = registry.clone();
    Ok(cloud.build_cloud(client.clone(), registry)?)
}

fn templates(cloud: &NomadCloud, prefix: Option<&str>) -> Result<Vec<Arc<WorkerTemplate>>> {
    let templates: Vec<_> = cloud
        .templates()
        .iter()
        .filter(|t| prefix.is_none_or(|p| t.prefix() == p))
        .cloned()
        .collect();
    if templates.is_empty() {
        bail!("no template matches prefix {:?}", prefix.unwrap_or_default());
    }
    Ok(templates)
}

async fn validate(cloud: &NomadCloud, prefix: Option<&str>) -> Result<()> {
    let mut failed = 0;
    for template in templates(cloud, prefix)? {
        match cloud.client().validate_job(&template).await {
            Ok(()) => println!("{}: ok", template.prefix()),
            Err(e) => {
                failed += 1;
                println!("{}: {}", template.prefix(), e);
            }
        }
    }

    if failed > 0 {
        error!(failed, "Template validation failed");
        bail!("{failed} template(s) failed validation");
    }
    Ok(())
}

async fn jobs(cloud: &NomadCloud, prefix: Option<String>) -> Result<()> {
    let prefixes = match prefix {
        Some(prefix) => vec![prefix],
        None => {
            let mut prefixes: Vec<_> = cloud
                .templates()
                .iter()
                .map(|t| t.prefix().to_string())
                .collect();
            prefixes.sort();
            prefixes.dedup();
            prefixes
        }
    };

    let mut rows = Vec::new();
    for prefix in &prefixes {
        rows.extend(cloud.client().list_jobs(prefix).await.into_iter().map(|job| JobRow {
            namespace: job.namespace().unwrap_or("-").to_string(),
            priority: job.priority.map(|p| p.to_string()).unwrap_or_default(),
            id: job.id,
            name: job.name,
            status: job.status,
        }));
    }

    if rows.is_empty() {
        println!("No jobs found.");
    } else {
        println!("{}", Table::new(rows));
    }
    Ok(())
}

async fn render_job(
    cloud: &NomadCloud,
    prefix: &str,
    name: &str,
    secret: &str,
) -> Result<()> {
    let templates = templates(cloud, Some(prefix))?;
    let template = &templates[0];
    let vars = RenderVars {
        name,
        secret,
        work_dir: template.remote_fs(),
    };
    println!("{}", render(cloud.client().as_ref(), template.job_template(), &vars).await);
    Ok(())
}
