use alloy_primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    pub transaction_hash: B256,
    pub log_index: u64,
}

#[derive(Debug, Clone)]
pub struct TxReceipt {
    pub transaction_hash: B256,
    pub block_number: u64,
    pub success: bool,
    pub logs: Vec<RawLog>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Asset {
    Holyc,
    Jit,
    Wpls,
    Unknown,
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Asset::Holyc => "HOLYC",
            Asset::Jit => "JIT",
            Asset::Wpls => "WPLS",
            Asset::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTransfer {
    pub token: Address,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    pub log_index: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Compile,
    Restore,
    Swap,
    Burn,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepKind::Compile => "compile",
            StepKind::Restore => "restore",
            StepKind::Swap => "swap",
            StepKind::Burn => "burn",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub kind: StepKind,
    pub token_in: Asset,
    pub token_out: Asset,
    pub amount_in: U256,
    /// `None` until a completing transfer is correlated; filled at most once.
    pub amount_out: Option<U256>,
    pub pool: Option<Address>,
    pub burn_portion: U256,
    pub is_settlement: bool,
    pub log_index: u64,
}

impl ExecutionStep {
    pub fn open(kind: StepKind, token_in: Asset, token_out: Asset, amount_in: U256, log_index: u64) -> Self {
        Self {
            kind,
            token_in,
            token_out,
            amount_in,
            amount_out: None,
            pool: None,
            burn_portion: U256::ZERO,
            is_settlement: false,
            log_index,
        }
    }

    pub fn is_filled(&self) -> bool {
        self.amount_out.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub transaction_hash: B256,
    pub block_number: u64,
    /// Index of the first log of the transaction, used to order records in a block.
    pub log_index: u64,
    /// Block time in milliseconds.
    pub timestamp: u64,
    pub holy_burned: U256,
    pub jit_burned: U256,
    pub holy_in: U256,
    pub holy_out: U256,
    pub jit_in: U256,
    pub jit_out: U256,
    pub steps: Vec<ExecutionStep>,
}

impl ExecutionRecord {
    pub fn is_trivial(&self) -> bool {
        [
            self.holy_burned,
            self.jit_burned,
            self.holy_in,
            self.holy_out,
            self.jit_in,
            self.jit_out,
        ]
        .iter()
        .all(|v| v.is_zero())
    }

    pub fn sort_key(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Checkpoint {
    pub last_processed_block: u64,
    pub last_processed_tx_hash: Option<B256>,
}
