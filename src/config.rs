use crate::aggregator::AggregatorSettings;
use crate::fetcher::ChunkPolicy;
use crate::models::Asset;
use alloy_primitives::{Address, B256, address, keccak256};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

pub const DEAD_ADDRESS: Address = address!("0x000000000000000000000000000000000000dEaD");

const DEFAULT_PRICE_API_URL: &str = "https://api.dexscreener.com/latest/dex/tokens/{token}";

/// Contract identities of one deployment of the protocol.
#[derive(Debug, Clone)]
pub struct Deployment {
    pub manager: Address,
    pub holyc: Address,
    pub jit: Address,
    pub wpls: Option<Address>,
    pub pools: HashSet<Address>,
    pub burn_addresses: HashSet<Address>,
}

impl Deployment {
    pub fn new(manager: Address, holyc: Address, jit: Address) -> Self {
        Self {
            manager,
            holyc,
            jit,
            wpls: None,
            pools: HashSet::new(),
            burn_addresses: HashSet::from([Address::ZERO, DEAD_ADDRESS]),
        }
    }

    pub fn with_wpls(mut self, wpls: Address) -> Self {
        self.wpls = Some(wpls);
        self
    }

    pub fn with_pools(mut self, pools: impl IntoIterator<Item = Address>) -> Self {
        self.pools.extend(pools);
        self
    }

    pub fn with_burn_addresses(mut self, burns: impl IntoIterator<Item = Address>) -> Self {
        self.burn_addresses.extend(burns);
        self
    }

    pub fn asset(&self, token: Address) -> Asset {
        if token == self.holyc {
            Asset::Holyc
        } else if token == self.jit {
            Asset::Jit
        } else if Some(token) == self.wpls {
            Asset::Wpls
        } else {
            Asset::Unknown
        }
    }

    pub fn is_burn(&self, address: Address) -> bool {
        self.burn_addresses.contains(&address)
    }

    pub fn is_pool(&self, address: Address) -> bool {
        self.pools.contains(&address)
    }
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub json_rpc_urls: Vec<String>,
    pub deployment: Deployment,
    pub manager_event_topic: Option<B256>,
    pub database_url: String,
    pub poll_interval: Duration,
    pub initial_lookback: u64,
    pub max_scan_span: u64,
    pub load_more_span: u64,
    pub receipt_concurrency: usize,
    pub feed_limit: usize,
    pub history_floor: Option<u64>,
    pub telegram: Option<TelegramConfig>,
    pub price_api_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let json_rpc_urls = std::env::var("JSON_RPC_URLS")
            .or_else(|_| std::env::var("JSON_RPC_URL"))
            .context("JSON_RPC_URLS must be set in .env")?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();
        if json_rpc_urls.is_empty() {
            anyhow::bail!("JSON_RPC_URLS must contain at least one URL");
        }

        let manager = required_address("MANAGER_ADDRESS")?;
        let holyc = required_address("HOLYC_ADDRESS")?;
        let jit = required_address("JIT_ADDRESS")?;

        let mut deployment = Deployment::new(manager, holyc, jit)
            .with_pools(address_list("POOL_ADDRESSES")?)
            .with_burn_addresses(address_list("BURN_ADDRESSES")?);
        if let Ok(wpls) = std::env::var("WPLS_ADDRESS") {
            deployment = deployment.with_wpls(
                Address::from_str(wpls.trim()).context("Invalid WPLS_ADDRESS format")?,
            );
        }

        let manager_event_topic = std::env::var("MANAGER_EVENT_SIGNATURE")
            .ok()
            .map(|sig| keccak256(sig.trim().as_bytes()));

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:./activity.db".to_string());

        let telegram = match (
            std::env::var("TELEGRAM_BOT_TOKEN"),
            std::env::var("TELEGRAM_CHAT_ID"),
        ) {
            (Ok(bot_token), Ok(chat_id)) => Some(TelegramConfig { bot_token, chat_id }),
            _ => None,
        };

        let history_floor = match std::env::var("HISTORY_FLOOR_BLOCK") {
            Ok(v) => Some(v.parse().context("Invalid HISTORY_FLOOR_BLOCK")?),
            Err(_) => None,
        };

        Ok(Config {
            json_rpc_urls,
            deployment,
            manager_event_topic,
            database_url,
            poll_interval: Duration::from_secs(number_or("POLL_INTERVAL_SECS", 30)?),
            initial_lookback: number_or("INITIAL_LOOKBACK_BLOCKS", 10_000)?,
            max_scan_span: number_or("MAX_SCAN_SPAN", 50_000)?,
            load_more_span: number_or("LOAD_MORE_SPAN", 10_000)?,
            receipt_concurrency: number_or("RECEIPT_CONCURRENCY", 8)?,
            feed_limit: number_or("FEED_LIMIT", 1_000)?,
            history_floor,
            telegram,
            price_api_url: std::env::var("PRICE_API_URL")
                .unwrap_or_else(|_| DEFAULT_PRICE_API_URL.to_string()),
        })
    }

    pub fn aggregator_settings(&self) -> AggregatorSettings {
        AggregatorSettings {
            event_topic: self.manager_event_topic,
            initial_lookback: self.initial_lookback,
            max_scan_span: self.max_scan_span.max(1),
            load_more_span: self.load_more_span.max(1),
            receipt_concurrency: self.receipt_concurrency.max(1),
            feed_limit: self.feed_limit.max(1),
            history_floor: self.history_floor.unwrap_or(0),
            chunk_policy: ChunkPolicy::default(),
        }
    }
}

fn required_address(key: &str) -> Result<Address> {
    let raw = std::env::var(key).with_context(|| format!("{key} must be set in .env"))?;
    Address::from_str(raw.trim()).with_context(|| format!("Invalid {key} format"))
}

fn address_list(key: &str) -> Result<Vec<Address>> {
    parse_address_list(&std::env::var(key).unwrap_or_default())
        .with_context(|| format!("Invalid address in {key}"))
}

fn number_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(v) => v
            .trim()
            .parse()
            .with_context(|| format!("Invalid {key} value: {v}")),
        Err(_) => Ok(default),
    }
}

pub fn parse_address_list(raw: &str) -> Result<Vec<Address>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Address::from_str(s).map_err(|e| anyhow::anyhow!("{s}: {e}")))
        .collect()
}
