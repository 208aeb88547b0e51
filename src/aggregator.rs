use crate::config::Deployment;
use crate::error::FetchError;
use crate::fetcher::{ChunkPolicy, RangeFetcher};
use crate::models::{Checkpoint, ExecutionRecord, RawLog};
use crate::reconstructor::reconstruct;
use crate::rpc::ChainSource;
use alloy_primitives::B256;
use futures::{StreamExt, stream};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    pub event_topic: Option<B256>,
    pub initial_lookback: u64,
    pub max_scan_span: u64,
    pub load_more_span: u64,
    pub receipt_concurrency: usize,
    pub feed_limit: usize,
    /// `load_more` never reaches below this block.
    pub history_floor: u64,
    pub chunk_policy: ChunkPolicy,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            event_topic: None,
            initial_lookback: 10_000,
            max_scan_span: 50_000,
            load_more_span: 10_000,
            receipt_concurrency: 8,
            feed_limit: 1_000,
            history_floor: 0,
            chunk_policy: ChunkPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActivityBatch {
    pub from_block: u64,
    pub to_block: u64,
    /// First block not fully processed by this batch. Equals `to_block + 1`
    /// unless a transaction failed, in which case it is that transaction's
    /// block so it is retried.
    pub next_block: u64,
    pub records: Vec<ExecutionRecord>,
    pub failure: Option<String>,
}

impl ActivityBatch {
    fn empty(from_block: u64, to_block: u64) -> Self {
        Self {
            from_block,
            to_block,
            next_block: from_block,
            records: Vec::new(),
            failure: None,
        }
    }

    pub fn is_partial(&self) -> bool {
        self.failure.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct LoadMore {
    pub records: Vec<ExecutionRecord>,
    pub exhausted: bool,
}

struct Scan {
    records: Vec<ExecutionRecord>,
    failure: Option<(u64, FetchError)>,
}

pub struct ActivityAggregator<S> {
    source: S,
    deployment: Deployment,
    settings: AggregatorSettings,
    checkpoint: Option<Checkpoint>,
    known: HashMap<B256, u64>,
    feed: Vec<ExecutionRecord>,
    oldest_loaded: Option<u64>,
}

impl<S: ChainSource> ActivityAggregator<S> {
    pub fn new(source: S, deployment: Deployment, settings: AggregatorSettings) -> Self {
        Self {
            source,
            deployment,
            settings,
            checkpoint: None,
            known: HashMap::new(),
            feed: Vec::new(),
            oldest_loaded: None,
        }
    }

    /// Resume from a persisted checkpoint. `known` are transactions already
    /// reported above the checkpoint block.
    pub fn with_checkpoint(
        mut self,
        checkpoint: Checkpoint,
        known: impl IntoIterator<Item = (B256, u64)>,
    ) -> Self {
        self.known.extend(known);
        self.checkpoint = Some(checkpoint);
        self.prune_known();
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    pub fn checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoint.as_ref()
    }

    pub fn is_known(&self, hash: &B256) -> bool {
        self.known.contains_key(hash)
    }

    pub fn feed(&self) -> &[ExecutionRecord] {
        &self.feed
    }

    pub fn feed_page(&self, page: usize, page_size: usize) -> &[ExecutionRecord] {
        let start = page.saturating_mul(page_size).min(self.feed.len());
        let end = start.saturating_add(page_size).min(self.feed.len());
        &self.feed[start..end]
    }

    pub async fn refresh(&mut self) -> Result<ActivityBatch, FetchError> {
        let head = self.source.block_number().await?;
        let from = match &self.checkpoint {
            Some(cp) => cp.last_processed_block + 1,
            None => self.lookback_start(head),
        };
        self.scan_forward(from, head).await
    }

    pub async fn force_refresh(&mut self) -> Result<ActivityBatch, FetchError> {
        let head = self.source.block_number().await?;
        let from = self.lookback_start(head);
        self.scan_forward(from, head).await
    }

    pub fn acknowledge(&mut self, batch: &ActivityBatch, record: &ExecutionRecord) {
        self.known
            .insert(record.transaction_hash, record.block_number);
        let cp = self.checkpoint.get_or_insert_with(|| Checkpoint {
            last_processed_block: batch.from_block.saturating_sub(1),
            last_processed_tx_hash: None,
        });
        cp.last_processed_tx_hash = Some(record.transaction_hash);
    }

    pub fn complete(&mut self, batch: &ActivityBatch) {
        for record in &batch.records {
            self.acknowledge(batch, record);
        }
        if batch.next_block > batch.from_block {
            let done = batch.next_block - 1;
            let cp = self.checkpoint.get_or_insert_with(Checkpoint::default);
            cp.last_processed_block = cp.last_processed_block.max(done);
            debug!("Checkpoint advanced to block {}", cp.last_processed_block);
        }
        self.prune_known();
    }

    /// Extend the feed further into the past. Does not touch the checkpoint.
    pub async fn load_more(&mut self) -> Result<LoadMore, FetchError> {
        let floor = self.settings.history_floor;
        let upper = match self.oldest_loaded {
            Some(oldest) if oldest > floor => oldest - 1,
            Some(_) => {
                return Ok(LoadMore {
                    records: Vec::new(),
                    exhausted: true,
                });
            }
            None => self.source.block_number().await?,
        };
        let lower = upper
            .saturating_sub(self.settings.load_more_span - 1)
            .max(floor);

        let scan = self.scan(lower, upper, false).await?;
        if let Some((_, e)) = scan.failure {
            return Err(e);
        }

        let mut records = scan.records;
        records.reverse();
        self.merge_into_feed(&records);
        self.oldest_loaded = Some(lower);
        info!(
            "Loaded {} older records from blocks {} to {}",
            records.len(),
            lower,
            upper
        );

        Ok(LoadMore {
            records,
            exhausted: lower <= floor,
        })
    }

    fn lookback_start(&self, head: u64) -> u64 {
        head.saturating_sub(self.settings.initial_lookback)
    }

    async fn scan_forward(&mut self, from: u64, head: u64) -> Result<ActivityBatch, FetchError> {
        if from > head {
            debug!("Checkpoint {} is ahead of head {}", from, head);
            return Ok(ActivityBatch::empty(from, head));
        }
        let to = head.min(from.saturating_add(self.settings.max_scan_span - 1));

        let scan = self.scan(from, to, true).await?;
        let (next_block, failure) = match scan.failure {
            Some((block, e)) => {
                if scan.records.is_empty() {
                    return Err(e);
                }
                warn!(
                    "Partial refresh, keeping {} records before block {}: {}",
                    scan.records.len(),
                    block,
                    e
                );
                (block.max(from), Some(e.to_string()))
            }
            None => (to + 1, None),
        };

        self.merge_into_feed(&scan.records);
        self.oldest_loaded = Some(self.oldest_loaded.map_or(from, |b| b.min(from)));

        info!(
            "Refreshed blocks {} to {}: {} new records",
            from,
            to,
            scan.records.len()
        );

        Ok(ActivityBatch {
            from_block: from,
            to_block: to,
            next_block,
            records: scan.records,
            failure,
        })
    }

    async fn scan(&self, from: u64, to: u64, skip_known: bool) -> Result<Scan, FetchError> {
        let logs = RangeFetcher::new(&self.source, self.settings.chunk_policy)
            .fetch(
                self.deployment.manager,
                self.settings.event_topic,
                from,
                to,
            )
            .await?;

        let transactions: Vec<(B256, u64)> = transactions_in_order(&logs)
            .into_iter()
            .filter(|(hash, _)| !(skip_known && self.known.contains_key(hash)))
            .collect();
        debug!(
            "{} logs in blocks {}-{} span {} new transactions",
            logs.len(),
            from,
            to,
            transactions.len()
        );

        let results: Vec<_> = stream::iter(transactions.iter())
            .map(|(hash, _)| self.reconstruct_transaction(*hash))
            .buffered(self.settings.receipt_concurrency.max(1))
            .collect()
            .await;

        let mut records = Vec::new();
        let mut failure = None;
        for ((hash, block), result) in transactions.iter().zip(results) {
            match result {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => {
                    warn!("Failed to reconstruct {:?}: {}", hash, e);
                    failure = Some((*block, e));
                    break;
                }
            }
        }
        records.sort_by_key(ExecutionRecord::sort_key);

        Ok(Scan { records, failure })
    }

    async fn reconstruct_transaction(&self, hash: B256) -> Result<Option<ExecutionRecord>, FetchError> {
        let receipt = self
            .source
            .receipt(hash)
            .await?
            .ok_or(FetchError::MissingReceipt(hash))?;

        let Some(mut record) = reconstruct(&self.deployment, &receipt, 0) else {
            return Ok(None);
        };
        let seconds = self.source.block_timestamp(receipt.block_number).await?;
        record.timestamp = seconds.saturating_mul(1000);
        Ok(Some(record))
    }

    fn merge_into_feed(&mut self, records: &[ExecutionRecord]) {
        if records.is_empty() {
            return;
        }
        let present: HashSet<B256> = self.feed.iter().map(|r| r.transaction_hash).collect();
        self.feed.extend(
            records
                .iter()
                .filter(|r| !present.contains(&r.transaction_hash))
                .cloned(),
        );
        self.feed.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
        self.feed.truncate(self.settings.feed_limit.max(1));
    }

    fn prune_known(&mut self) {
        if let Some(cp) = &self.checkpoint {
            let floor = cp.last_processed_block;
            self.known.retain(|_, block| *block > floor);
        }
    }
}

/// Distinct transaction hashes in `(block, log index)` order.
fn transactions_in_order(logs: &[RawLog]) -> Vec<(B256, u64)> {
    let mut sorted: Vec<&RawLog> = logs.iter().collect();
    sorted.sort_by_key(|log| (log.block_number, log.log_index));

    let mut seen = HashSet::new();
    sorted
        .into_iter()
        .filter(|log| seen.insert(log.transaction_hash))
        .map(|log| (log.transaction_hash, log.block_number))
        .collect()
}
