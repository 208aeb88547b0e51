use anyhow::Result;
use holyc_activity::aggregator::ActivityAggregator;
use holyc_activity::config::Config;
use holyc_activity::deployment::find_deployment_block;
use holyc_activity::notifier::{LogNotifier, Notifier, TelegramNotifier};
use holyc_activity::price::PriceOracle;
use holyc_activity::repository::Database;
use holyc_activity::rpc::{ChainSource, RpcClient};
use holyc_activity::scanner::Scanner;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("Starting manager activity notifier");

    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("Manager address: {:?}", config.deployment.manager);
    info!(
        "RPC URLs: {} endpoint(s) configured",
        config.json_rpc_urls.len()
    );

    let db = Database::new(&config.database_url)?;
    info!("Database initialized");

    let client = RpcClient::new(&config.json_rpc_urls)?;
    info!("RPC client connected");

    let mut settings = config.aggregator_settings();
    if config.history_floor.is_none() {
        let head = client.block_number().await?;
        match find_deployment_block(&client, config.deployment.manager, head).await? {
            Some(block) => settings.history_floor = block,
            None => warn!("No code at manager address, history floor stays at 0"),
        }
    }

    let aggregator = ActivityAggregator::new(client, config.deployment.clone(), settings);
    let oracle = match PriceOracle::new(&config.price_api_url) {
        Ok(oracle) => Some(oracle),
        Err(e) => {
            warn!("Price oracle unavailable, USD figures disabled: {:#}", e);
            None
        }
    };

    match &config.telegram {
        Some(telegram) => {
            info!("Delivering reports to Telegram chat {}", telegram.chat_id);
            let notifier = TelegramNotifier::new(telegram)?;
            run(aggregator, db, notifier, oracle, &config).await
        }
        None => {
            info!("No Telegram credentials, reports go to the log");
            run(aggregator, db, LogNotifier, oracle, &config).await
        }
    }
}

async fn run<N: Notifier>(
    aggregator: ActivityAggregator<RpcClient>,
    db: Database,
    notifier: N,
    oracle: Option<PriceOracle>,
    config: &Config,
) -> Result<()> {
    let mut scanner = Scanner::new(aggregator, db, notifier, oracle, config.poll_interval)?;

    if let Err(e) = scanner.run().await {
        error!("Scanner error: {}", e);
        return Err(e);
    }

    Ok(())
}
