use crate::aggregator::ActivityAggregator;
use crate::notifier::Notifier;
use crate::price::{PriceOracle, Prices};
use crate::report::format_record;
use crate::repository::{CheckpointRepository, Database, ExecutionRepository};
use crate::rpc::ChainSource;
use anyhow::Result;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, warn};

/// What one polling cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub found: usize,
    pub delivered: usize,
    pub completed: bool,
}

/// Polls the aggregator, delivers each new record and persists progress
/// only after delivery.
pub struct Scanner<S, N> {
    aggregator: ActivityAggregator<S>,
    db: Database,
    notifier: N,
    oracle: Option<PriceOracle>,
    poll_interval: Duration,
}

impl<S: ChainSource, N: Notifier> Scanner<S, N> {
    /// Restores the persisted checkpoint and delivered hashes into `aggregator`.
    pub fn new(
        aggregator: ActivityAggregator<S>,
        db: Database,
        notifier: N,
        oracle: Option<PriceOracle>,
        poll_interval: Duration,
    ) -> Result<Self> {
        let manager = aggregator.deployment().manager;
        let checkpoint = CheckpointRepository::new(&db.conn).get(&manager)?;

        let aggregator = match checkpoint {
            Some(cp) => {
                let known = ExecutionRepository::new(&db.conn, manager)
                    .hashes_above(cp.last_processed_block)?;
                info!(
                    "Resuming after block {} with {} delivered transactions above it",
                    cp.last_processed_block,
                    known.len()
                );
                aggregator.with_checkpoint(cp, known)
            }
            None => {
                info!("No checkpoint stored, starting from lookback window");
                aggregator
            }
        };

        Ok(Scanner {
            aggregator,
            db,
            notifier,
            oracle,
            poll_interval,
        })
    }

    pub fn aggregator(&self) -> &ActivityAggregator<S> {
        &self.aggregator
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut ticker = interval(self.poll_interval);
        // a cycle that overruns the interval swallows the missed fires
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match self.run_cycle().await {
                Ok(report) if report.found > 0 => info!(
                    "Cycle delivered {}/{} records",
                    report.delivered, report.found
                ),
                Ok(_) => {}
                Err(e) => error!("Cycle failed, state unchanged: {:#}", e),
            }
        }
    }

    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let batch = self.aggregator.refresh().await?;
        let mut report = CycleReport {
            found: batch.records.len(),
            ..Default::default()
        };

        let prices = match (&self.oracle, batch.records.is_empty()) {
            (Some(oracle), false) => oracle.prices(self.aggregator.deployment()).await,
            _ => Prices::default(),
        };

        let manager = self.aggregator.deployment().manager;
        for record in &batch.records {
            let text = format_record(record, &prices);
            if let Err(e) = self.notifier.send(&text).await {
                warn!(
                    "Delivery of {:?} failed, will retry next cycle: {:#}",
                    record.transaction_hash, e
                );
                break;
            }
            self.aggregator.acknowledge(&batch, record);
            report.delivered += 1;
            if let Err(e) = ExecutionRepository::new(&self.db.conn, manager).insert(record) {
                error!(
                    "Delivered {:?} but failed to store it: {:#}",
                    record.transaction_hash, e
                );
            }
        }

        if report.delivered == report.found {
            self.aggregator.complete(&batch);
            report.completed = true;
        }

        if let Some(cp) = self.aggregator.checkpoint() {
            CheckpointRepository::new(&self.db.conn).save(&manager, cp)?;
        }

        Ok(report)
    }
}
