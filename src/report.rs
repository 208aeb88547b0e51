use crate::models::{Asset, ExecutionRecord, ExecutionStep, StepKind};
use crate::price::Prices;
use alloy_primitives::U256;
use alloy_primitives::utils::format_units;
use std::fmt::Write;

const DECIMALS: u8 = 18;
const DISPLAY_DECIMALS: usize = 6;

/// Signed difference `inflow - outflow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetDelta {
    pub negative: bool,
    pub magnitude: U256,
}

impl NetDelta {
    pub fn between(inflow: U256, outflow: U256) -> Self {
        if outflow > inflow {
            Self {
                negative: true,
                magnitude: outflow - inflow,
            }
        } else {
            Self {
                negative: false,
                magnitude: inflow - outflow,
            }
        }
    }

    pub fn is_zero(&self) -> bool {
        self.magnitude.is_zero()
    }

    pub fn usd(&self, price: f64) -> f64 {
        let value = usd_value(self.magnitude, price);
        if self.negative { -value } else { value }
    }
}

/// Token amount at 18 decimals, trailing zeros trimmed.
pub fn format_amount(value: U256) -> String {
    let full = format_units(value, DECIMALS).unwrap_or_else(|_| value.to_string());
    match full.split_once('.') {
        Some((whole, frac)) => {
            let frac: String = frac.chars().take(DISPLAY_DECIMALS).collect();
            let frac = frac.trim_end_matches('0');
            if frac.is_empty() {
                whole.to_string()
            } else {
                format!("{whole}.{frac}")
            }
        }
        None => full,
    }
}

pub fn usd_value(value: U256, price: f64) -> f64 {
    format_units(value, DECIMALS)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .map_or(0.0, |units| units * price)
}

pub fn format_usd(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    format!("{sign}${:.2}", value.abs())
}

fn short_hash(hash: &str) -> String {
    if hash.len() <= 12 {
        return hash.to_string();
    }
    format!("{}...{}", &hash[..6], &hash[hash.len() - 4..])
}

fn price_of(asset: Asset, prices: &Prices) -> Option<f64> {
    match asset {
        Asset::Holyc => prices.holyc,
        Asset::Jit => prices.jit,
        _ => None,
    }
}

pub fn describe_step(step: &ExecutionStep) -> String {
    let amount_in = format!("{} {}", format_amount(step.amount_in), step.token_in);
    let amount_out = step
        .amount_out
        .map(|out| format!("{} {}", format_amount(out), step.token_out));

    let mut line = match (step.kind, amount_out) {
        (StepKind::Burn, _) => format!("burn {amount_in}"),
        (kind, Some(out)) => format!("{kind} {amount_in} -> {out}"),
        (kind, None) => format!("{kind} {amount_in} -> pending"),
    };
    if let Some(pool) = step.pool {
        let _ = write!(line, " via {}", short_hash(&format!("{pool:?}")));
    }
    if step.kind != StepKind::Burn && !step.burn_portion.is_zero() {
        let fee_asset = match step.kind {
            StepKind::Compile | StepKind::Restore => Asset::Holyc,
            _ => step.token_in,
        };
        let _ = write!(line, " (fee {} {})", format_amount(step.burn_portion), fee_asset);
    }
    line
}

fn delta_line(label: Asset, delta: NetDelta, price: Option<f64>) -> String {
    let sign = if delta.negative { "-" } else { "+" };
    let mut line = format!("Net {label}: {sign}{}", format_amount(delta.magnitude));
    if let Some(price) = price {
        let _ = write!(line, " ({})", format_usd(delta.usd(price)));
    }
    line
}

pub fn format_record(record: &ExecutionRecord, prices: &Prices) -> String {
    let mut out = String::new();
    let hash = format!("{:?}", record.transaction_hash);
    let _ = writeln!(out, "*Manager execution* `{}`", short_hash(&hash));
    let _ = writeln!(out, "Block {}", record.block_number);

    if !record.steps.is_empty() {
        let _ = writeln!(out);
        for step in &record.steps {
            let _ = writeln!(out, "- {}", describe_step(step));
        }
    }

    let holy = NetDelta::between(record.holy_in, record.holy_out);
    let jit = NetDelta::between(record.jit_in, record.jit_out);
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", delta_line(Asset::Holyc, holy, price_of(Asset::Holyc, prices)));
    let _ = writeln!(out, "{}", delta_line(Asset::Jit, jit, price_of(Asset::Jit, prices)));

    if !record.holy_burned.is_zero() || !record.jit_burned.is_zero() {
        let mut burned = format!(
            "Burned: {} HOLYC, {} JIT",
            format_amount(record.holy_burned),
            format_amount(record.jit_burned)
        );
        let usd: Option<f64> = match (prices.holyc, prices.jit) {
            (None, None) => None,
            (h, j) => Some(
                h.map_or(0.0, |p| usd_value(record.holy_burned, p))
                    + j.map_or(0.0, |p| usd_value(record.jit_burned, p)),
            ),
        };
        if let Some(usd) = usd {
            let _ = write!(burned, " ({})", format_usd(usd));
        }
        let _ = writeln!(out, "{burned}");
    }

    let _ = write!(out, "Tx: `{hash}`");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B256};

    fn units(whole: u64) -> U256 {
        U256::from(whole) * U256::from(10u64).pow(U256::from(18u64))
    }

    fn record() -> ExecutionRecord {
        let mut compile = ExecutionStep::open(StepKind::Compile, Asset::Holyc, Asset::Jit, units(500), 0);
        compile.amount_out = Some(units(480));
        compile.burn_portion = units(20);
        let mut swap = ExecutionStep::open(StepKind::Swap, Asset::Jit, Asset::Unknown, units(100), 2);
        swap.pool = Some(Address::repeat_byte(0x50));

        ExecutionRecord {
            transaction_hash: B256::repeat_byte(0xab),
            block_number: 99,
            log_index: 0,
            timestamp: 0,
            holy_burned: units(20),
            jit_burned: U256::ZERO,
            holy_in: U256::ZERO,
            holy_out: units(500),
            jit_in: units(480),
            jit_out: units(100),
            steps: vec![compile, swap],
        }
    }

    #[test]
    fn formats_amounts() {
        assert_eq!(format_amount(U256::ZERO), "0");
        assert_eq!(format_amount(units(3)), "3");
        assert_eq!(
            format_amount(U256::from(1_500_000_000_000_000_000u128)),
            "1.5"
        );
        // below display precision
        assert_eq!(format_amount(U256::from(1u64)), "0");
    }

    #[test]
    fn net_delta_is_signed() {
        let d = NetDelta::between(units(1), units(3));
        assert!(d.negative);
        assert_eq!(d.magnitude, units(2));
        assert_eq!(d.usd(1.5), -3.0);
        assert!(NetDelta::between(units(2), units(2)).is_zero());
    }

    #[test]
    fn record_message_with_prices() {
        let prices = Prices {
            holyc: Some(2.0),
            jit: None,
        };
        let text = format_record(&record(), &prices);

        assert!(text.contains("Block 99"));
        assert!(text.contains("- compile 500 HOLYC -> 480 JIT (fee 20 HOLYC)"));
        assert!(text.contains("- swap 100 JIT -> pending via 0x5050...5050"));
        assert!(text.contains("Net HOLYC: -500 (-$1000.00)"));
        assert!(text.contains("Net JIT: +380\n"));
        assert!(text.contains("Burned: 20 HOLYC, 0 JIT ($40.00)"));
    }

    #[test]
    fn record_message_without_prices() {
        let text = format_record(&record(), &Prices::default());
        assert!(text.contains("Net HOLYC: -500\n"));
        assert!(text.contains("Burned: 20 HOLYC, 0 JIT\n"));
    }
}
