use crate::config::Deployment;
use crate::events::decode_transfer;
use crate::models::{Asset, ExecutionRecord, ExecutionStep, StepKind, TokenTransfer, TxReceipt};
use alloy_primitives::{Address, U256};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

#[derive(Debug, Default)]
pub struct StepQueue {
    open: VecDeque<usize>,
}

impl StepQueue {
    pub fn open(&mut self, step: usize) {
        self.open.push_back(step);
    }

    pub fn oldest(&self) -> Option<usize> {
        self.open.front().copied()
    }

    pub fn close(&mut self) -> Option<usize> {
        self.open.pop_front()
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}

#[derive(Debug, Default)]
struct Totals {
    holy_burned: U256,
    jit_burned: U256,
    holy_in: U256,
    holy_out: U256,
    jit_in: U256,
    jit_out: U256,
}

fn saturate(total: &mut U256, amount: U256) {
    let (sum, overflow) = total.overflowing_add(amount);
    if overflow {
        debug!("Transfer total overflowed, clamping at U256::MAX");
        *total = U256::MAX;
    } else {
        *total = sum;
    }
}

impl Totals {
    fn add_in(&mut self, asset: Asset, amount: U256) {
        match asset {
            Asset::Holyc => saturate(&mut self.holy_in, amount),
            Asset::Jit => saturate(&mut self.jit_in, amount),
            _ => {}
        }
    }

    fn add_out(&mut self, asset: Asset, amount: U256) {
        match asset {
            Asset::Holyc => saturate(&mut self.holy_out, amount),
            Asset::Jit => saturate(&mut self.jit_out, amount),
            _ => {}
        }
    }
}

struct Ledger<'a> {
    deployment: &'a Deployment,
    steps: Vec<ExecutionStep>,
    compiles: StepQueue,
    restores: StepQueue,
    swaps: HashMap<Address, StepQueue>,
    totals: Totals,
}

impl<'a> Ledger<'a> {
    fn new(deployment: &'a Deployment) -> Self {
        Self {
            deployment,
            steps: Vec::new(),
            compiles: StepQueue::default(),
            restores: StepQueue::default(),
            swaps: HashMap::new(),
            totals: Totals::default(),
        }
    }

    fn push(&mut self, step: ExecutionStep) -> usize {
        self.steps.push(step);
        self.steps.len() - 1
    }

    fn apply(&mut self, t: &TokenTransfer) {
        let manager = self.deployment.manager;
        let asset = self.deployment.asset(t.token);

        match (t.from == manager, t.to == manager) {
            (true, false) => self.outbound(asset, t),
            (false, true) => self.inbound(asset, t),
            (false, false) => {
                if asset == Asset::Jit && self.deployment.is_burn(t.to) {
                    saturate(&mut self.totals.jit_burned, t.amount);
                    self.burn_step(asset, t);
                }
            }
            (true, true) => {}
        }
    }

    fn outbound(&mut self, asset: Asset, t: &TokenTransfer) {
        let d = self.deployment;
        match asset {
            Asset::Holyc if t.to == d.jit => {
                let idx = self.push(ExecutionStep::open(
                    StepKind::Compile,
                    Asset::Holyc,
                    Asset::Jit,
                    t.amount,
                    t.log_index,
                ));
                self.compiles.open(idx);
                saturate(&mut self.totals.holy_out, t.amount);
            }
            Asset::Holyc if d.is_burn(t.to) => {
                saturate(&mut self.totals.holy_burned, t.amount);
                saturate(&mut self.totals.holy_out, t.amount);
                self.burn_step(asset, t);
            }
            Asset::Jit if d.is_burn(t.to) => {
                let idx = self.push(ExecutionStep::open(
                    StepKind::Restore,
                    Asset::Jit,
                    Asset::Holyc,
                    t.amount,
                    t.log_index,
                ));
                self.restores.open(idx);
                saturate(&mut self.totals.jit_burned, t.amount);
                saturate(&mut self.totals.jit_out, t.amount);
            }
            _ if d.is_pool(t.to) => {
                let mut step =
                    ExecutionStep::open(StepKind::Swap, asset, Asset::Unknown, t.amount, t.log_index);
                step.pool = Some(t.to);
                let idx = self.push(step);
                self.swaps.entry(t.to).or_default().open(idx);
                self.totals.add_out(asset, t.amount);
            }
            Asset::Holyc => {
                if !self.settle_restore(t.amount) {
                    saturate(&mut self.totals.holy_out, t.amount);
                }
            }
            _ => self.totals.add_out(asset, t.amount),
        }
    }

    fn inbound(&mut self, asset: Asset, t: &TokenTransfer) {
        let d = self.deployment;
        match asset {
            Asset::Jit if t.from == Address::ZERO => {
                if let Some(idx) = self.compiles.close() {
                    let step = &mut self.steps[idx];
                    step.amount_out = Some(t.amount);
                    let fee = step.amount_in.saturating_sub(t.amount);
                    step.burn_portion = fee;
                    saturate(&mut self.totals.holy_burned, fee);
                }
                saturate(&mut self.totals.jit_in, t.amount);
            }
            _ if d.is_pool(t.from) => {
                if let Some(idx) = self.swaps.get_mut(&t.from).and_then(StepQueue::close) {
                    let step = &mut self.steps[idx];
                    step.token_out = asset;
                    step.amount_out = Some(t.amount);
                }
                self.totals.add_in(asset, t.amount);
            }
            _ => self.totals.add_in(asset, t.amount),
        }
    }

    /// An outbound HOLYC leg that completes the oldest open restore is its
    /// settlement and does not count as new outflow.
    fn settle_restore(&mut self, amount: U256) -> bool {
        let Some(idx) = self.restores.oldest() else {
            return false;
        };
        let step = &mut self.steps[idx];
        if step.is_filled() || amount > step.amount_in {
            return false;
        }
        step.amount_out = Some(amount);
        step.burn_portion = step.amount_in - amount;
        step.is_settlement = true;
        self.restores.close();
        true
    }

    fn burn_step(&mut self, asset: Asset, t: &TokenTransfer) {
        let mut step = ExecutionStep::open(StepKind::Burn, asset, Asset::Unknown, t.amount, t.log_index);
        step.amount_out = Some(U256::ZERO);
        step.burn_portion = t.amount;
        self.push(step);
    }
}

pub fn reconstruct(
    deployment: &Deployment,
    receipt: &TxReceipt,
    timestamp_ms: u64,
) -> Option<ExecutionRecord> {
    if !receipt.success {
        debug!("Skipping reverted transaction {:?}", receipt.transaction_hash);
        return None;
    }

    let mut logs: Vec<_> = receipt.logs.iter().collect();
    logs.sort_by_key(|log| log.log_index);

    let mut ledger = Ledger::new(deployment);
    for transfer in logs.iter().filter_map(|log| decode_transfer(log)) {
        ledger.apply(&transfer);
    }

    let Ledger { steps, totals, .. } = ledger;
    let record = ExecutionRecord {
        transaction_hash: receipt.transaction_hash,
        block_number: receipt.block_number,
        log_index: logs.first().map_or(0, |log| log.log_index),
        timestamp: timestamp_ms,
        holy_burned: totals.holy_burned,
        jit_burned: totals.jit_burned,
        holy_in: totals.holy_in,
        holy_out: totals.holy_out,
        jit_in: totals.jit_in,
        jit_out: totals.jit_out,
        steps,
    };

    if record.is_trivial() {
        debug!(
            "No manager transfers in transaction {:?}",
            receipt.transaction_hash
        );
        return None;
    }

    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Transfer, address_topic};
    use crate::models::RawLog;
    use alloy::sol_types::SolEvent;
    use alloy_primitives::{B256, Bytes};

    const MANAGER: Address = Address::repeat_byte(0x10);
    const HOLYC: Address = Address::repeat_byte(0x20);
    const JIT: Address = Address::repeat_byte(0x30);
    const WPLS: Address = Address::repeat_byte(0x40);
    const POOL_A: Address = Address::repeat_byte(0x50);
    const POOL_B: Address = Address::repeat_byte(0x51);
    const USER: Address = Address::repeat_byte(0x60);

    fn deployment() -> Deployment {
        Deployment::new(MANAGER, HOLYC, JIT)
            .with_wpls(WPLS)
            .with_pools([POOL_A, POOL_B])
    }

    fn receipt(transfers: &[(Address, Address, Address, u64)]) -> TxReceipt {
        let hash = B256::repeat_byte(0xee);
        let logs = transfers
            .iter()
            .enumerate()
            .map(|(i, (token, from, to, amount))| RawLog {
                address: *token,
                topics: vec![
                    Transfer::SIGNATURE_HASH,
                    address_topic(*from),
                    address_topic(*to),
                ],
                data: Bytes::from(U256::from(*amount).to_be_bytes_vec()),
                block_number: 42,
                transaction_hash: hash,
                log_index: i as u64,
            })
            .collect();
        TxReceipt {
            transaction_hash: hash,
            block_number: 42,
            success: true,
            logs,
        }
    }

    fn u(v: u64) -> U256 {
        U256::from(v)
    }

    #[test]
    fn compile_fee_is_burned() {
        let r = receipt(&[
            (HOLYC, MANAGER, JIT, 500),
            (JIT, Address::ZERO, MANAGER, 480),
        ]);
        let record = reconstruct(&deployment(), &r, 1_000).unwrap();

        assert_eq!(record.holy_burned, u(20));
        assert_eq!(record.holy_out, u(500));
        assert_eq!(record.jit_in, u(480));
        assert_eq!(record.steps.len(), 1);
        let step = &record.steps[0];
        assert_eq!(step.kind, StepKind::Compile);
        assert_eq!(step.amount_in, u(500));
        assert_eq!(step.amount_out, Some(u(480)));
        assert_eq!(step.burn_portion, u(20));
    }

    #[test]
    fn compile_fee_of_forty() {
        let r = receipt(&[
            (HOLYC, MANAGER, JIT, 1000),
            (JIT, Address::ZERO, MANAGER, 960),
        ]);
        let record = reconstruct(&deployment(), &r, 0).unwrap();
        assert_eq!(record.holy_burned, u(40));
        assert_eq!(record.steps[0].amount_out, Some(u(960)));
    }

    #[test]
    fn compiles_match_first_in_first_out() {
        let r = receipt(&[
            (HOLYC, MANAGER, JIT, 1000),
            (HOLYC, MANAGER, JIT, 2000),
            (JIT, Address::ZERO, MANAGER, 990),
            (JIT, Address::ZERO, MANAGER, 1900),
        ]);
        let record = reconstruct(&deployment(), &r, 0).unwrap();

        assert_eq!(record.steps[0].amount_in, u(1000));
        assert_eq!(record.steps[0].amount_out, Some(u(990)));
        assert_eq!(record.steps[1].amount_in, u(2000));
        assert_eq!(record.steps[1].amount_out, Some(u(1900)));
        assert_eq!(record.holy_burned, u(110));
    }

    #[test]
    fn oversized_compile_close_clamps_fee_at_zero() {
        let r = receipt(&[
            (HOLYC, MANAGER, JIT, 100),
            (JIT, Address::ZERO, MANAGER, 150),
        ]);
        let record = reconstruct(&deployment(), &r, 0).unwrap();
        assert_eq!(record.holy_burned, U256::ZERO);
        assert_eq!(record.steps[0].amount_out, Some(u(150)));
    }

    #[test]
    fn restore_settlement_is_not_outflow() {
        let r = receipt(&[
            (JIT, MANAGER, Address::ZERO, 1000),
            (HOLYC, MANAGER, USER, 970),
        ]);
        let record = reconstruct(&deployment(), &r, 0).unwrap();

        assert_eq!(record.jit_burned, u(1000));
        assert_eq!(record.jit_out, u(1000));
        assert_eq!(record.holy_out, U256::ZERO);
        let step = &record.steps[0];
        assert_eq!(step.kind, StepKind::Restore);
        assert!(step.is_settlement);
        assert_eq!(step.amount_out, Some(u(970)));
        assert_eq!(step.burn_portion, u(30));
    }

    #[test]
    fn outflow_larger_than_restore_is_not_settlement() {
        let r = receipt(&[
            (JIT, MANAGER, Address::ZERO, 100),
            (HOLYC, MANAGER, USER, 500),
        ]);
        let record = reconstruct(&deployment(), &r, 0).unwrap();
        assert_eq!(record.holy_out, u(500));
        assert_eq!(record.steps[0].amount_out, None);
    }

    #[test]
    fn swaps_close_per_pool() {
        let r = receipt(&[
            (WPLS, MANAGER, POOL_A, 10),
            (HOLYC, MANAGER, POOL_B, 20),
            (HOLYC, POOL_B, MANAGER, 0),
            (JIT, POOL_B, MANAGER, 25),
            (HOLYC, POOL_A, MANAGER, 12),
        ]);
        let record = reconstruct(&deployment(), &r, 0).unwrap();

        let a = &record.steps[0];
        assert_eq!(a.pool, Some(POOL_A));
        assert_eq!(a.token_in, Asset::Wpls);
        assert_eq!(a.token_out, Asset::Holyc);
        assert_eq!(a.amount_out, Some(u(12)));

        // the zero-amount return from pool B closes its only open swap
        let b = &record.steps[1];
        assert_eq!(b.pool, Some(POOL_B));
        assert_eq!(b.amount_out, Some(U256::ZERO));

        assert_eq!(record.holy_out, u(20));
        assert_eq!(record.holy_in, u(12));
        assert_eq!(record.jit_in, u(25));
    }

    #[test]
    fn unknown_pool_counts_gross_flow_only() {
        let stranger = Address::repeat_byte(0x99);
        let r = receipt(&[
            (HOLYC, MANAGER, stranger, 300),
            (JIT, stranger, MANAGER, 310),
        ]);
        let record = reconstruct(&deployment(), &r, 0).unwrap();
        assert!(record.steps.is_empty());
        assert_eq!(record.holy_out, u(300));
        assert_eq!(record.jit_in, u(310));
    }

    #[test]
    fn direct_burns() {
        let r = receipt(&[
            (HOLYC, MANAGER, crate::config::DEAD_ADDRESS, 5),
            (JIT, USER, Address::ZERO, 7),
        ]);
        let record = reconstruct(&deployment(), &r, 0).unwrap();
        assert_eq!(record.holy_burned, u(5));
        assert_eq!(record.jit_burned, u(7));
        assert_eq!(record.steps.len(), 2);
        assert!(record.steps.iter().all(|s| s.kind == StepKind::Burn));
    }

    #[test]
    fn reverted_transaction_has_no_record() {
        let mut r = receipt(&[
            (HOLYC, MANAGER, JIT, 500),
            (JIT, Address::ZERO, MANAGER, 480),
        ]);
        r.success = false;
        assert!(reconstruct(&deployment(), &r, 0).is_none());
    }

    #[test]
    fn unrelated_transfers_have_no_record() {
        let r = receipt(&[(HOLYC, USER, Address::repeat_byte(0x77), 500)]);
        assert!(reconstruct(&deployment(), &r, 0).is_none());

        let empty = receipt(&[]);
        assert!(reconstruct(&deployment(), &empty, 0).is_none());
    }

    #[test]
    fn logs_are_processed_in_log_index_order() {
        let mut r = receipt(&[
            (HOLYC, MANAGER, JIT, 1000),
            (HOLYC, MANAGER, JIT, 2000),
            (JIT, Address::ZERO, MANAGER, 990),
        ]);
        r.logs.reverse();
        let record = reconstruct(&deployment(), &r, 0).unwrap();
        assert_eq!(record.steps[0].amount_in, u(1000));
        assert_eq!(record.steps[0].amount_out, Some(u(990)));
        assert_eq!(record.steps[1].amount_out, None);
        assert_eq!(record.log_index, 0);
    }

    #[test]
    fn step_queue_is_fifo() {
        let mut q = StepQueue::default();
        q.open(3);
        q.open(1);
        assert_eq!(q.len(), 2);
        assert_eq!(q.oldest(), Some(3));
        assert_eq!(q.close(), Some(3));
        assert_eq!(q.close(), Some(1));
        assert!(q.is_empty());
        assert_eq!(q.close(), None);
    }

    #[test]
    fn totals_clamp_instead_of_wrapping() {
        let mut r = receipt(&[
            (HOLYC, USER, MANAGER, 0),
            (HOLYC, USER, MANAGER, 5),
            (JIT, MANAGER, Address::ZERO, 0),
            (JIT, MANAGER, Address::ZERO, 7),
        ]);
        let max = Bytes::from(U256::MAX.to_be_bytes_vec());
        r.logs[0].data = max.clone();
        r.logs[2].data = max;

        let record = reconstruct(&deployment(), &r, 0).unwrap();
        assert_eq!(record.holy_in, U256::MAX);
        assert_eq!(record.jit_burned, U256::MAX);
        assert_eq!(record.jit_out, U256::MAX);
    }
}
