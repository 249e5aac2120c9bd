use clap::{Parser, Subcommand};
use support_chat::Result;
use support_chat::commands::{rebuild, serve, show_status};
use support_chat::config::{run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "support-chat")]
#[command(about = "A retrieval-augmented customer-support chat server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and matcher settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Start the HTTP chat server
    Serve {
        /// Override the configured listen host
        #[arg(long)]
        host: Option<String>,
        /// Override the configured listen port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Rebuild the question corpus and vector index from the dataset
    Rebuild,
    /// Show dataset, index, and provider health
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Serve { host, port } => {
            serve(host, port).await?;
        }
        Commands::Rebuild => {
            rebuild().await?;
        }
        Commands::Status => {
            show_status().await?;
        }
    }

    Ok(())
}
