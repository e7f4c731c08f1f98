use clap::{Parser, Subcommand};

mod commands;

use commands::{FetchInstrumentsArgs, ResolveArgs, ServeArgs};

#[derive(Parser)]
#[command(name = "alert-bridge")]
#[command(about = "Turns screener alerts into option orders with take-profit/stop-loss exits", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true, default_value = "config/Config.toml")]
    config: String,

    /// Optional log file path (logs to file instead of stderr)
    #[arg(long, global = true)]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook server and position monitors
    Serve(ServeArgs),
    /// Show which contract an alert for a symbol would trade
    Resolve(ResolveArgs),
    /// Download the broker's instrument dump into the catalog file
    FetchInstruments(FetchInstrumentsArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    match &cli.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter()).init();
        }
    }

    let config = alert_bridge_core::ConfigLoader::load_from(&cli.config)?;

    match cli.command {
        Commands::Serve(args) => commands::serve::run(args, config).await?,
        Commands::Resolve(args) => commands::resolve::run(args, &config).await?,
        Commands::FetchInstruments(args) => commands::fetch_instruments::run(args, &config).await?,
    }

    Ok(())
}
