use crate::error::FetchError;
use crate::models::RawLog;
use crate::rpc::{ChainSource, LogQuery};
use alloy_primitives::{Address, B256};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
pub struct ChunkPolicy {
    pub initial: u64,
    pub min: u64,
    pub max: u64,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            initial: 20_000,
            min: 1,
            max: 100_000,
        }
    }
}

/// Sweeps a block range with adaptively sized `eth_getLogs` requests.
///
/// Each successful chunk doubles the next one up to `max`. A chunk the
/// endpoint rejects as too wide is halved (or cut straight to the suggested
/// span) until it would fall below `min`. Any other error ends the sweep.
pub struct RangeFetcher<'a, S> {
    source: &'a S,
    policy: ChunkPolicy,
}

impl<'a, S: ChainSource> RangeFetcher<'a, S> {
    pub fn new(source: &'a S, policy: ChunkPolicy) -> Self {
        Self { source, policy }
    }

    pub async fn fetch(
        &self,
        address: Address,
        topic0: Option<B256>,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, FetchError> {
        let mut logs = Vec::new();
        if from_block > to_block {
            return Ok(logs);
        }

        let min = self.policy.min.max(1);
        let max = self.policy.max.max(min);
        let mut chunk = self.policy.initial.clamp(min, max);
        let mut start = from_block;
        let mut requests = 0usize;

        loop {
            let end = start.saturating_add(chunk - 1).min(to_block);
            let query = LogQuery {
                address,
                topic0,
                from_block: start,
                to_block: end,
            };
            requests += 1;

            match self.source.logs(query).await {
                Ok(batch) => {
                    logs.extend(batch);
                    if end == to_block {
                        break;
                    }
                    start = end + 1;
                    chunk = chunk.saturating_mul(2).min(max);
                }
                Err(e @ FetchError::RangeTooWide { .. }) => {
                    let halved = chunk / 2;
                    let next = match e.suggested_span() {
                        Some(span) if span < halved => span,
                        _ => halved,
                    };
                    if next < min {
                        return Err(FetchError::ChunkFloor {
                            from: start,
                            to: end,
                            chunk,
                            source: Box::new(e),
                        });
                    }
                    debug!(
                        "Logs {}-{} failed ({}), shrinking chunk {} -> {}",
                        start, end, e, chunk, next
                    );
                    chunk = next;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            "Fetched {} logs for blocks {} to {} in {} requests",
            logs.len(),
            from_block,
            to_block,
            requests
        );
        Ok(logs)
    }
}
