use crate::aggregator::ActivityAggregator;
use crate::query::formatters::{OutputFormat, format_record_detail, format_records, format_stats};
use crate::repository::ExecutionRepository;
use crate::rpc::ChainSource;
use alloy_primitives::B256;
use anyhow::Result;
use std::str::FromStr;
use tracing::info;

pub fn cmd_feed(
    repo: &ExecutionRepository,
    page: usize,
    page_size: usize,
    format: &OutputFormat,
) -> Result<()> {
    let records = repo.recent(page_size, page.saturating_mul(page_size))?;
    println!("{}", format_records(&records, format));
    Ok(())
}

pub fn cmd_tx(repo: &ExecutionRepository, hash: &str, format: &OutputFormat) -> Result<()> {
    let hash = B256::from_str(hash)
        .map_err(|_| anyhow::anyhow!("Invalid transaction hash format: {}", hash))?;

    match repo.get(&hash)? {
        Some(record) => println!("{}", format_record_detail(&record, format)),
        None => println!("No execution recorded for {hash:?}"),
    }
    Ok(())
}

pub fn cmd_stats(repo: &ExecutionRepository, format: &OutputFormat) -> Result<()> {
    let stats = repo.get_statistics()?;
    println!("{}", format_stats(&stats, format));
    Ok(())
}

/// Read the feed straight from the chain, loading older windows until
/// `min_records` are available or history is exhausted. Persists nothing.
pub async fn cmd_live<S: ChainSource>(
    aggregator: &mut ActivityAggregator<S>,
    min_records: usize,
    max_windows: usize,
    format: &OutputFormat,
) -> Result<()> {
    aggregator.force_refresh().await?;

    let mut windows = 0;
    while aggregator.feed().len() < min_records && windows < max_windows {
        let more = aggregator.load_more().await?;
        windows += 1;
        if more.exhausted {
            info!("Reached the start of manager history");
            break;
        }
    }

    println!(
        "{}",
        format_records(aggregator.feed_page(0, min_records), format)
    );
    Ok(())
}
