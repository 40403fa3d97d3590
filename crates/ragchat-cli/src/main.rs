use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ragchat_cli::{apply_cli_overrides, available_cpus, parse_log_level, worker_threads};
use ragchat_core::{AppConfig, ConfigLoader, Environment, RagPipeline};
use ragchat_server::{shutdown_signal, AppServer, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[clap(name = "rag", author, version, about = "Chat with your PDF documents")]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(
        long,
        short = 'l',
        help = "Logging level: TRACE, DEBUG, INFO, WARNING or ERROR [default: INFO, DEBUG for dev]"
    )]
    logging_level: Option<String>,

    #[clap(long, short, help = "Path to a YAML configuration file")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the server in production mode
    Run {
        #[clap(long, env = "HOST", help = "Host to bind to")]
        host: Option<String>,

        #[clap(long, env = "PORT", help = "Port to bind to")]
        port: Option<u16>,

        #[clap(
            long,
            default_value_t = 1,
            allow_negative_numbers = true,
            help = "Worker threads; zero or less uses every CPU"
        )]
        workers: i64,
    },
    /// Run the server in development mode
    Dev {
        #[clap(long, env = "HOST", help = "Host to bind to")]
        host: Option<String>,

        #[clap(long, env = "PORT", help = "Port to bind to")]
        port: Option<u16>,
    },
}

fn main() -> Result<()> {
    // A missing .env file is fine.
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Dev { .. } => "DEBUG",
        Commands::Run { .. } => "INFO",
    };
    let log_level_filter = parse_log_level(cli.logging_level.as_deref().unwrap_or(default_level))?;
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .init();

    if let Ok(path) = dotenv {
        log::debug!("Loaded environment from {}", path.display());
    }

    let (environment, host, port, workers) = match cli.command {
        Commands::Run {
            host,
            port,
            workers,
        } => (
            Environment::Prod,
            host,
            port,
            worker_threads(workers, available_cpus()),
        ),
        Commands::Dev { host, port } => (Environment::Dev, host, port, 1),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .enable_all()
        .build()
        .context("Failed to build the tokio runtime")?;

    runtime.block_on(async move {
        let config = ConfigLoader::load(cli.config.as_deref())
            .await
            .context("Failed to load configuration")?;
        let config = apply_cli_overrides(config, environment, host, port)?;

        log::info!(
            "Starting in {} mode with {} worker thread(s)",
            config.environment,
            workers
        );

        run_server(config).await
    })
}

async fn run_server(config: AppConfig) -> Result<()> {
    let pipeline = RagPipeline::from_config(&config).context("Failed to build the chat pipeline")?;

    let server_config = ServerConfig::from_settings(&config.server);
    let server = AppServer::new(Arc::new(pipeline), server_config, config.ui.clone());
    server.serve_with_shutdown(shutdown_signal()).await?;

    Ok(())
}
