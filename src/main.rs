use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use podtriage::config::{Config, Secrets};

#[derive(Parser)]
#[command(
    name = "podtriage",
    about = "Kubernetes pod failure triage with LLM-assisted diagnostics",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch pods and dispatch diagnostic jobs for detected incidents
    Watch {
        /// Path to the configuration file
        #[arg(long, default_value = "/etc/podtriage/config.toml")]
        config: String,

        /// Override the namespace to watch
        #[arg(long)]
        namespace: Option<String>,
    },

    /// One-shot incident analysis (run inside the dispatched job, env-driven)
    Analyze {
        /// Path to the configuration file (optional; defaults apply)
        #[arg(long)]
        config: Option<String>,
    },

    /// Classify a pod snapshot from a JSON file and print the result
    Classify {
        /// Path to a pod JSON file (kubectl get pod <name> -o json)
        #[arg(long)]
        file: String,

        /// Path to the configuration file (optional; defaults apply)
        #[arg(long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch { config, namespace } => {
            let mut config = Config::load(&config).context("failed to load config")?;
            if let Some(ns) = namespace {
                config.watch.namespace = ns;
            }
            let secrets = Secrets::from_env();
            podtriage::run_controller(config, secrets).await?;
            tracing::info!("controller stopped");
        }
        Commands::Analyze { config } => {
            let llm_config = match config {
                Some(path) => Config::load(&path).context("failed to load config")?.llm,
                None => Default::default(),
            };
            let ctx = podtriage::analyze::AnalyzeContext::from_env()
                .context("incomplete analyzer environment")?;
            podtriage::analyze::run(&ctx, &llm_config).await?;
        }
        Commands::Classify { file, config } => {
            let policy = match config {
                Some(path) => Config::load(&path).context("failed to load config")?.events,
                None => Default::default(),
            };
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {file}"))?;
            let pod: podtriage::watch::PodSnapshot =
                serde_json::from_str(&raw).context("invalid pod JSON")?;

            match podtriage::classify::classify(&pod, &policy) {
                Some(incident) => {
                    println!("incident: {}", incident.key());
                    println!("  container: {}", if incident.container_name.is_empty() {
                        "(pod-scoped)"
                    } else {
                        &incident.container_name
                    });
                    println!("  reason:    {}", incident.reason);
                    println!("  message:   {}", incident.message);
                }
                None => println!("no incident detected"),
            }
        }
    }

    Ok(())
}
