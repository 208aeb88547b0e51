use alloy_primitives::B256;
use thiserror::Error;

/// Failures while reading chain data. Decoding and reconstruction never
/// produce errors; they skip instead.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{method} failed: {message}")]
    Transport {
        method: &'static str,
        message: String,
    },
    #[error("{method} timed out after {secs}s")]
    Timeout { method: &'static str, secs: u64 },
    #[error("range {from}-{to} rejected by endpoint: {message}")]
    RangeTooWide {
        from: u64,
        to: u64,
        suggested: Option<(u64, u64)>,
        message: String,
    },
    #[error("range {from}-{to} still failing at minimum chunk size {chunk}: {source}")]
    ChunkFloor {
        from: u64,
        to: u64,
        chunk: u64,
        #[source]
        source: Box<FetchError>,
    },
    #[error("receipt for {0} not available")]
    MissingReceipt(B256),
    #[error("block {0} not available")]
    MissingBlock(u64),
}

impl FetchError {
    /// Span of the endpoint's suggested retry range, if it offered one.
    pub fn suggested_span(&self) -> Option<u64> {
        match self {
            FetchError::RangeTooWide {
                suggested: Some((from, to)),
                ..
            } if to >= from => Some(to - from + 1),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggested_span_is_inclusive() {
        let err = FetchError::RangeTooWide {
            from: 10,
            to: 5_000,
            suggested: Some((10, 109)),
            message: "exceeds max results".to_string(),
        };
        assert_eq!(err.suggested_span(), Some(100));

        let err = FetchError::Timeout {
            method: "eth_getLogs",
            secs: 120,
        };
        assert_eq!(err.suggested_span(), None);
    }
}
