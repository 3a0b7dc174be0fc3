mod bootstrap;
mod config;

use bootstrap::{assemble, Models};
use cadre_gateway::{AuthConfig, GatewayServer};
use cadre_orchestrator::{ResultStatus, Scheduler, Task};
use clap::{Parser, Subcommand, ValueEnum};
use config::CadreConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "cadre",
    version,
    about = "Cadre: hierarchical multi-agent orchestration"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "cadre.toml", global = true)]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one task and print the result
    Run {
        /// Unit to run on (defaults to the root)
        #[arg(short, long)]
        unit: Option<String>,
        /// Session to continue
        #[arg(short, long)]
        session: Option<Uuid>,
        /// Print the full result as JSON instead of markdown
        #[arg(long)]
        json: bool,
        /// Task text
        #[arg(required = true, trailing_var_arg = true)]
        task: Vec<String>,
    },
    /// Start the HTTP gateway and the scheduler
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the delegation tree
    Units,
    /// Load the config and build everything, reporting the first error
    Validate,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = CadreConfig::load(&cli.config).await?;

    match cli.command {
        Commands::Run {
            unit,
            session,
            json,
            task,
        } => {
            let org = assemble(&config, Models::Live).await?;
            let task = Task::new(task.join(" "), session.unwrap_or_else(Uuid::new_v4))
                .with_channel("cli");
            let result = org.run(unit.as_deref(), task).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", result.to_markdown());
            }
            if result.status() == ResultStatus::Failed {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);

            let org = Arc::new(assemble(&config, Models::Live).await?);
            let auth = AuthConfig::new(config.server.api_keys.clone());
            if auth.is_enabled() {
                info!(keys = config.server.api_keys.len(), "API key auth enabled");
            }
            let app = GatewayServer::build_with(org.clone(), config.endpoints.clone(), auth)?;

            let scheduler = Scheduler::new(config.schedules.clone());
            let jobs = scheduler.enabled_jobs().len();
            let handle = (jobs > 0).then(|| {
                info!(jobs, "Scheduler started");
                scheduler.start(org.clone())
            });

            info!("Starting Cadre gateway on {}:{}", host, port);
            let served = GatewayServer::serve(app, &host, port).await;
            if let Some(handle) = handle {
                handle.abort();
            }
            served?;
        }
        Commands::Units => {
            let org = assemble(&config, Models::Offline).await?;
            let tree = org.tree();
            print!("{tree}");
            let outside = org
                .descriptors()
                .into_iter()
                .filter(|d| !tree.contains(&format!("- {} [", d.name)));
            for unit in outside {
                println!("- {} [{}] {} (not under the root)", unit.name, unit.kind, unit.role);
            }
            for endpoint in &config.endpoints {
                println!(
                    "POST {} -> {}",
                    endpoint.path,
                    endpoint.unit.as_deref().unwrap_or(&config.org.root)
                );
            }
            for job in &config.schedules {
                println!(
                    "cron '{}' -> {} ({})",
                    job.cron,
                    job.unit.as_deref().unwrap_or(&config.org.root),
                    job.name
                );
            }
        }
        Commands::Validate => {
            let org = Arc::new(assemble(&config, Models::Live).await?);
            GatewayServer::build_with(
                org.clone(),
                config.endpoints.clone(),
                AuthConfig::default(),
            )?;
            println!(
                "{}: OK ({} units, root '{}', {} endpoints, {} schedules)",
                cli.config.display(),
                org.descriptors().len(),
                config.org.root,
                config.endpoints.len(),
                config.schedules.len()
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}
