use crate::models::{RawLog, TokenTransfer};
use alloy::sol;
use alloy::sol_types::SolEvent;
use alloy_primitives::{Address, B256, U256};

sol! {
    event Transfer(address indexed from, address indexed to, uint256 value);
}

/// Decode a `Transfer(address,address,uint256)` log. Anything else is `None`.
///
/// Indexed addresses that are missing or carry non-zero padding decode to the
/// zero address instead of failing the whole log.
pub fn decode_transfer(log: &RawLog) -> Option<TokenTransfer> {
    if log.topics.first() != Some(&Transfer::SIGNATURE_HASH) {
        return None;
    }

    let from = log.topics.get(1).map_or(Address::ZERO, address_from_topic);
    let to = log.topics.get(2).map_or(Address::ZERO, address_from_topic);

    let word = &log.data[..log.data.len().min(32)];
    let amount = U256::try_from_be_slice(word).unwrap_or_default();

    Some(TokenTransfer {
        token: log.address,
        from,
        to,
        amount,
        log_index: log.log_index,
    })
}

fn address_from_topic(topic: &B256) -> Address {
    if topic[..12].iter().any(|b| *b != 0) {
        return Address::ZERO;
    }
    Address::from_slice(&topic[12..])
}

pub fn address_topic(address: Address) -> B256 {
    address.into_word()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Bytes;

    fn transfer_log(from: Address, to: Address, data: Vec<u8>) -> RawLog {
        RawLog {
            address: Address::repeat_byte(0xaa),
            topics: vec![
                Transfer::SIGNATURE_HASH,
                address_topic(from),
                address_topic(to),
            ],
            data: Bytes::from(data),
            block_number: 7,
            transaction_hash: B256::repeat_byte(1),
            log_index: 3,
        }
    }

    #[test]
    fn decodes_standard_transfer() {
        let from = Address::repeat_byte(0x11);
        let to = Address::repeat_byte(0x22);
        let log = transfer_log(from, to, U256::from(1234u64).to_be_bytes_vec());

        let t = decode_transfer(&log).unwrap();
        assert_eq!(t.token, Address::repeat_byte(0xaa));
        assert_eq!(t.from, from);
        assert_eq!(t.to, to);
        assert_eq!(t.amount, U256::from(1234u64));
        assert_eq!(t.log_index, 3);

        assert_eq!(decode_transfer(&log), Some(t));
    }

    #[test]
    fn empty_data_is_zero_amount() {
        let log = transfer_log(Address::ZERO, Address::repeat_byte(2), vec![]);
        assert_eq!(decode_transfer(&log).unwrap().amount, U256::ZERO);
    }

    #[test]
    fn rejects_other_events() {
        let mut log = transfer_log(Address::ZERO, Address::repeat_byte(2), vec![]);
        log.topics[0] = B256::repeat_byte(0x42);
        assert!(decode_transfer(&log).is_none());

        log.topics.clear();
        assert!(decode_transfer(&log).is_none());
    }

    #[test]
    fn malformed_topics_degrade_to_zero_address() {
        let mut log = transfer_log(Address::repeat_byte(1), Address::repeat_byte(2), vec![]);
        log.topics[1] = B256::repeat_byte(0xff);
        log.topics.truncate(2);

        let t = decode_transfer(&log).unwrap();
        assert_eq!(t.from, Address::ZERO);
        assert_eq!(t.to, Address::ZERO);
    }
}
