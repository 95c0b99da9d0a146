use clap::{Parser, Subcommand};
use contail::cli::watch::WatchArgs;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "contail")]
#[command(about = "Live container log streaming", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the log streaming server (default)
    Serve,
    /// Follow a container's logs through a running server
    Watch {
        container: String,

        /// Only show lines containing this keyword (case-insensitive)
        #[arg(long)]
        filter: Option<String>,

        /// Lines of history to replay before following
        #[arg(long)]
        tail: Option<u32>,

        /// Entries to retain, 0 for unbounded
        #[arg(long)]
        max_logs: Option<String>,

        /// Server WebSocket URL, overrides client.url
        #[arg(long)]
        url: Option<String>,
    },
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Init {
        #[arg(long)]
        stdout: bool,
    },
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "contail=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve) | None => {
            contail::cli::run::run(cli.config).await?;
        }
        Some(Commands::Watch {
            container,
            filter,
            tail,
            max_logs,
            url,
        }) => {
            let args = WatchArgs {
                container,
                filter,
                tail,
                max_logs,
                url,
            };
            contail::cli::watch::watch(cli.config, args).await?;
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init { stdout } => {
                contail::cli::config::init(stdout)?;
            }
            ConfigAction::Validate => {
                let path = contail::config::resolve_config_path(cli.config.as_deref());
                contail::cli::config::validate(path)?;
            }
        },
    }

    Ok(())
}
