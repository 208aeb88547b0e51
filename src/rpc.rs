use crate::error::FetchError;
use crate::models::{RawLog, TxReceipt};
use alloy::providers::fillers::FillProvider;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{BlockNumberOrTag, Filter, Log};
use alloy_primitives::{Address, B256};
use anyhow::Result;
use regex::Regex;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::time::timeout;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};

type AlloyFullProvider = FillProvider<
    alloy::providers::fillers::JoinFill<
        alloy::providers::Identity,
        alloy::providers::fillers::JoinFill<
            alloy::providers::fillers::GasFiller,
            alloy::providers::fillers::JoinFill<
                alloy::providers::fillers::BlobGasFiller,
                alloy::providers::fillers::JoinFill<
                    alloy::providers::fillers::NonceFiller,
                    alloy::providers::fillers::ChainIdFiller,
                >,
            >,
        >,
    >,
    alloy::providers::RootProvider,
>;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120); // 2 minutes timeout per request

static SUGGESTED_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"retry with the range (\d+)-(\d+)").expect("valid suggested range pattern")
});

const RANGE_LIMIT_MARKERS: &[&str] = &[
    "exceeds max results",
    "query returned more than",
    "block range",
    "range too large",
    "response size exceeded",
    "limit exceeded",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogQuery {
    pub address: Address,
    pub topic0: Option<B256>,
    pub from_block: u64,
    pub to_block: u64,
}

pub trait ChainSource: Send + Sync {
    fn block_number(&self) -> impl Future<Output = Result<u64, FetchError>> + Send;

    /// Logs for exactly one range; no splitting happens at this level.
    fn logs(&self, query: LogQuery) -> impl Future<Output = Result<Vec<RawLog>, FetchError>> + Send;

    /// `Ok(None)` when the node does not know the transaction.
    fn receipt(&self, hash: B256)
    -> impl Future<Output = Result<Option<TxReceipt>, FetchError>> + Send;

    fn block_timestamp(&self, number: u64) -> impl Future<Output = Result<u64, FetchError>> + Send;

    fn code_size_at(
        &self,
        address: Address,
        block: u64,
    ) -> impl Future<Output = Result<usize, FetchError>> + Send;
}

#[derive(Clone)]
pub struct RpcClient {
    providers: Vec<AlloyFullProvider>,
    urls: Vec<String>,
    current_provider: Arc<AtomicUsize>,
    max_retries: usize,
}

impl RpcClient {
    pub fn new(rpc_urls: &[String]) -> Result<Self> {
        if rpc_urls.is_empty() {
            return Err(anyhow::anyhow!("At least one RPC URL must be provided"));
        }

        let mut providers = Vec::new();
        for url in rpc_urls {
            let parsed_url = url
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid RPC URL: {}", url))?;
            let provider: AlloyFullProvider = ProviderBuilder::new().connect_http(parsed_url);
            providers.push(provider);
        }

        Ok(RpcClient {
            providers,
            urls: rpc_urls.to_vec(),
            current_provider: Arc::new(AtomicUsize::new(0)),
            max_retries: 5,
        })
    }

    fn get_provider(&self) -> &AlloyFullProvider {
        let index = self.current_provider.load(Ordering::Relaxed) % self.providers.len();
        &self.providers[index]
    }

    pub fn get_current_url(&self) -> &str {
        let index = self.current_provider.load(Ordering::Relaxed) % self.urls.len();
        &self.urls[index]
    }

    pub fn rotate_provider(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.providers.len();
        self.current_provider.store(next, Ordering::Relaxed);

        if self.providers.len() > 1 {
            debug!("Rotating to RPC provider #{}", next);
        }
    }

    fn get_retry_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(100)
            .factor(2)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.max_retries)
    }

    fn handle_error(&self, method: &'static str, error_str: &str) -> FetchError {
        warn!(
            "RPC error on {} ({}): {}, rotating provider",
            self.get_current_url(),
            method,
            error_str
        );
        self.rotate_provider();
        FetchError::Transport {
            method,
            message: error_str.to_string(),
        }
    }

    fn handle_timeout(&self, method: &'static str) -> FetchError {
        warn!(
            "Request timeout after {} seconds on {} ({}), rotating provider",
            REQUEST_TIMEOUT.as_secs(),
            self.get_current_url(),
            method
        );
        self.rotate_provider();
        FetchError::Timeout {
            method,
            secs: REQUEST_TIMEOUT.as_secs(),
        }
    }

    async fn call<T, F, Fut>(&self, method: &'static str, op: F) -> Result<T, FetchError>
    where
        F: Fn(RpcClient) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        RetryIf::start(
            self.get_retry_strategy(),
            || op(self.clone()),
            |e: &FetchError| !matches!(e, FetchError::RangeTooWide { .. }),
        )
        .await
        .inspect_err(|e| debug!("{} gave up: {}", method, e))
    }

    fn is_range_limit(error_str: &str) -> bool {
        let lower = error_str.to_lowercase();
        RANGE_LIMIT_MARKERS.iter().any(|m| lower.contains(m))
    }

    pub fn parse_max_results_error(error_str: &str) -> Option<(u64, u64)> {
        let captures = SUGGESTED_RANGE.captures(error_str)?;

        let from = captures.get(1)?.as_str().parse().ok()?;
        let to = captures.get(2)?.as_str().parse().ok()?;

        Some((from, to))
    }
}

fn raw_log(log: &Log) -> Option<RawLog> {
    Some(RawLog {
        address: log.address(),
        topics: log.topics().to_vec(),
        data: log.data().data.clone(),
        block_number: log.block_number?,
        transaction_hash: log.transaction_hash?,
        log_index: log.log_index?,
    })
}

impl ChainSource for RpcClient {
    async fn block_number(&self) -> Result<u64, FetchError> {
        self.call("eth_blockNumber", |client| async move {
            match timeout(REQUEST_TIMEOUT, client.get_provider().get_block_number()).await {
                Ok(Ok(block_number)) => Ok(block_number),
                Ok(Err(e)) => Err(client.handle_error("eth_blockNumber", &e.to_string())),
                Err(_) => Err(client.handle_timeout("eth_blockNumber")),
            }
        })
        .await
    }

    async fn logs(&self, query: LogQuery) -> Result<Vec<RawLog>, FetchError> {
        self.call("eth_getLogs", |client| async move {
            let mut filter = Filter::new()
                .address(query.address)
                .from_block(query.from_block)
                .to_block(query.to_block);
            if let Some(topic0) = query.topic0 {
                filter = filter.event_signature(topic0);
            }

            match timeout(REQUEST_TIMEOUT, client.get_provider().get_logs(&filter)).await {
                Ok(Ok(logs)) => Ok(logs.iter().filter_map(raw_log).collect()),
                Ok(Err(e)) => {
                    let error_str = e.to_string();
                    if RpcClient::is_range_limit(&error_str) {
                        debug!(
                            "Range {}-{} rejected by endpoint, will split range",
                            query.from_block, query.to_block
                        );
                        Err(FetchError::RangeTooWide {
                            from: query.from_block,
                            to: query.to_block,
                            suggested: RpcClient::parse_max_results_error(&error_str),
                            message: error_str,
                        })
                    } else {
                        Err(client.handle_error("eth_getLogs", &error_str))
                    }
                }
                Err(_) => Err(client.handle_timeout("eth_getLogs")),
            }
        })
        .await
    }

    async fn receipt(&self, hash: B256) -> Result<Option<TxReceipt>, FetchError> {
        self.call("eth_getTransactionReceipt", |client| async move {
            let future = client.get_provider().get_transaction_receipt(hash);
            match timeout(REQUEST_TIMEOUT, future).await {
                Ok(Ok(receipt)) => Ok(receipt.and_then(|receipt| {
                    Some(TxReceipt {
                        transaction_hash: receipt.transaction_hash,
                        block_number: receipt.block_number?,
                        success: receipt.status(),
                        logs: receipt.inner.logs().iter().filter_map(raw_log).collect(),
                    })
                })),
                Ok(Err(e)) => Err(client.handle_error("eth_getTransactionReceipt", &e.to_string())),
                Err(_) => Err(client.handle_timeout("eth_getTransactionReceipt")),
            }
        })
        .await
    }

    async fn block_timestamp(&self, number: u64) -> Result<u64, FetchError> {
        self.call("eth_getBlockByNumber", |client| async move {
            let future = client
                .get_provider()
                .get_block_by_number(BlockNumberOrTag::Number(number));
            match timeout(REQUEST_TIMEOUT, future).await {
                Ok(Ok(Some(block))) => Ok(block.header.timestamp),
                Ok(Ok(None)) => Err(FetchError::MissingBlock(number)),
                Ok(Err(e)) => Err(client.handle_error("eth_getBlockByNumber", &e.to_string())),
                Err(_) => Err(client.handle_timeout("eth_getBlockByNumber")),
            }
        })
        .await
    }

    async fn code_size_at(&self, address: Address, block: u64) -> Result<usize, FetchError> {
        self.call("eth_getCode", |client| async move {
            let future = client
                .get_provider()
                .get_code_at(address)
                .block_id(BlockNumberOrTag::Number(block).into());

            match timeout(REQUEST_TIMEOUT, future).await {
                Ok(Ok(code)) => Ok(code.len()),
                Ok(Err(e)) => Err(client.handle_error("eth_getCode", &e.to_string())),
                Err(_) => Err(client.handle_timeout("eth_getCode")),
            }
        })
        .await
    }
}
