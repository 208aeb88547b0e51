use anyhow::Result;
use clap::{Parser, Subcommand};
use holyc_activity::aggregator::ActivityAggregator;
use holyc_activity::config::Config;
use holyc_activity::query::commands::{cmd_feed, cmd_live, cmd_stats, cmd_tx};
use holyc_activity::query::formatters::OutputFormat;
use holyc_activity::repository::{Database, ExecutionRepository};
use holyc_activity::rpc::RpcClient;

#[derive(Parser)]
#[command(name = "activity")]
#[command(about = "Query manager execution activity", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Delivered executions, newest first
    Feed {
        #[arg(long, default_value = "0")]
        page: usize,

        #[arg(long, default_value = "20")]
        page_size: usize,
    },
    /// One execution with its steps
    Tx { hash: String },
    Stats,
    /// Reconstruct recent executions directly from the chain
    Live {
        #[arg(long, default_value = "20")]
        count: usize,

        #[arg(long, default_value = "5")]
        max_windows: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format.as_str());

    let config = Config::from_env()?;

    let manager = config.deployment.manager;

    match cli.command {
        Commands::Feed { page, page_size } => {
            let db = Database::new(&config.database_url)?;
            cmd_feed(&ExecutionRepository::new(&db.conn, manager), page, page_size, &format)?;
        }
        Commands::Tx { hash } => {
            let db = Database::new(&config.database_url)?;
            cmd_tx(&ExecutionRepository::new(&db.conn, manager), &hash, &format)?;
        }
        Commands::Stats => {
            let db = Database::new(&config.database_url)?;
            cmd_stats(&ExecutionRepository::new(&db.conn, manager), &format)?;
        }
        Commands::Live { count, max_windows } => {
            let client = RpcClient::new(&config.json_rpc_urls)?;
            let mut aggregator = ActivityAggregator::new(
                client,
                config.deployment.clone(),
                config.aggregator_settings(),
            );
            cmd_live(&mut aggregator, count, max_windows, &format).await?;
        }
    }

    Ok(())
}
