use crate::error::FetchError;
use crate::rpc::ChainSource;
use alloy_primitives::Address;
use tracing::info;

/// Binary search for the first block at which `address` has code.
/// `Ok(None)` if there is no code at `latest_block`.
pub async fn find_deployment_block<S: ChainSource>(
    source: &S,
    address: Address,
    latest_block: u64,
) -> Result<Option<u64>, FetchError> {
    info!("Searching for deployment block of contract {:?}", address);

    if source.code_size_at(address, latest_block).await? == 0 {
        return Ok(None);
    }

    let mut left = 0u64;
    let mut right = latest_block;

    while left < right {
        let mid = left + (right - left) / 2;

        if source.code_size_at(address, mid).await? == 0 {
            left = mid + 1;
        } else {
            right = mid;
        }
    }

    info!("Contract deployed at block {}", left);
    Ok(Some(left))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RawLog, TxReceipt};
    use crate::rpc::LogQuery;
    use alloy_primitives::B256;

    struct DeployedAt(u64);

    impl ChainSource for DeployedAt {
        async fn block_number(&self) -> Result<u64, FetchError> {
            Ok(1_000_000)
        }

        async fn logs(&self, _query: LogQuery) -> Result<Vec<RawLog>, FetchError> {
            Ok(vec![])
        }

        async fn receipt(&self, _hash: B256) -> Result<Option<TxReceipt>, FetchError> {
            Ok(None)
        }

        async fn block_timestamp(&self, _number: u64) -> Result<u64, FetchError> {
            Ok(0)
        }

        async fn code_size_at(&self, _address: Address, block: u64) -> Result<usize, FetchError> {
            Ok(if block >= self.0 { 1_024 } else { 0 })
        }
    }

    #[tokio::test]
    async fn finds_first_block_with_code() {
        let found = find_deployment_block(&DeployedAt(123_457), Address::ZERO, 1_000_000)
            .await
            .unwrap();
        assert_eq!(found, Some(123_457));

        let genesis = find_deployment_block(&DeployedAt(0), Address::ZERO, 50)
            .await
            .unwrap();
        assert_eq!(genesis, Some(0));
    }

    #[tokio::test]
    async fn missing_contract_is_none() {
        let found = find_deployment_block(&DeployedAt(u64::MAX), Address::ZERO, 1_000)
            .await
            .unwrap();
        assert_eq!(found, None);
    }
}
