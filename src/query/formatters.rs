use crate::models::ExecutionRecord;
use crate::report::{NetDelta, describe_step, format_amount};
use crate::repository::ExecutionStats;
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use serde_json::{Value, json};

#[derive(Debug, Clone)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Table,
        }
    }
}

fn signed(delta: NetDelta) -> String {
    let sign = if delta.negative { "-" } else { "+" };
    format!("{sign}{}", format_amount(delta.magnitude))
}

fn kinds(record: &ExecutionRecord) -> String {
    let kinds: Vec<String> = record.steps.iter().map(|s| s.kind.to_string()).collect();
    if kinds.is_empty() {
        "-".to_string()
    } else {
        kinds.join(",")
    }
}

pub fn format_records(records: &[ExecutionRecord], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => format_records_table(records),
        OutputFormat::Json => format_records_json(records),
        OutputFormat::Csv => format_records_csv(records),
    }
}

fn format_records_table(records: &[ExecutionRecord]) -> String {
    if records.is_empty() {
        return "No executions found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            "Block",
            "Steps",
            "Net HOLYC",
            "Net JIT",
            "HOLYC Burned",
            "JIT Burned",
            "Tx Hash",
        ]);

    for record in records {
        table.add_row(vec![
            Cell::new(record.block_number),
            Cell::new(kinds(record)),
            Cell::new(signed(NetDelta::between(record.holy_in, record.holy_out))),
            Cell::new(signed(NetDelta::between(record.jit_in, record.jit_out))),
            Cell::new(format_amount(record.holy_burned)),
            Cell::new(format_amount(record.jit_burned)),
            Cell::new(format_tx_hash(&format!("{:?}", record.transaction_hash))),
        ]);
    }

    table.to_string()
}

fn record_json(record: &ExecutionRecord) -> Value {
    json!({
        "transaction_hash": format!("{:?}", record.transaction_hash),
        "block_number": record.block_number,
        "timestamp_ms": record.timestamp,
        "holy_in": record.holy_in.to_string(),
        "holy_out": record.holy_out.to_string(),
        "jit_in": record.jit_in.to_string(),
        "jit_out": record.jit_out.to_string(),
        "holy_burned": record.holy_burned.to_string(),
        "jit_burned": record.jit_burned.to_string(),
        "net_holy": signed(NetDelta::between(record.holy_in, record.holy_out)),
        "net_jit": signed(NetDelta::between(record.jit_in, record.jit_out)),
        "steps": record.steps,
    })
}

fn format_records_json(records: &[ExecutionRecord]) -> String {
    let values: Vec<Value> = records.iter().map(record_json).collect();
    serde_json::to_string_pretty(&values).unwrap_or_else(|_| "[]".to_string())
}

fn format_records_csv(records: &[ExecutionRecord]) -> String {
    let mut wtr = Writer::from_writer(vec![]);

    let _ = wtr.write_record([
        "block_number",
        "transaction_hash",
        "timestamp_ms",
        "steps",
        "holy_in_wei",
        "holy_out_wei",
        "jit_in_wei",
        "jit_out_wei",
        "holy_burned_wei",
        "jit_burned_wei",
    ]);

    for record in records {
        let _ = wtr.write_record([
            &record.block_number.to_string(),
            &format!("{:?}", record.transaction_hash),
            &record.timestamp.to_string(),
            &kinds(record),
            &record.holy_in.to_string(),
            &record.holy_out.to_string(),
            &record.jit_in.to_string(),
            &record.jit_out.to_string(),
            &record.holy_burned.to_string(),
            &record.jit_burned.to_string(),
        ]);
    }

    String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
}

pub fn format_record_detail(record: &ExecutionRecord, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec!["#", "Log", "Step"]);
            for (i, step) in record.steps.iter().enumerate() {
                table.add_row(vec![
                    Cell::new(i + 1),
                    Cell::new(step.log_index),
                    Cell::new(describe_step(step)),
                ]);
            }
            format!(
                "{}\n{}",
                format_records_table(std::slice::from_ref(record)),
                table
            )
        }
        OutputFormat::Json => serde_json::to_string_pretty(&record_json(record))
            .unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["log_index", "kind", "description"]);
            for step in &record.steps {
                let _ = wtr.write_record([
                    &step.log_index.to_string(),
                    &step.kind.to_string(),
                    &describe_step(step),
                ]);
            }
            String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
        }
    }
}

pub fn format_stats(stats: &ExecutionStats, format: &OutputFormat) -> String {
    let earliest = stats
        .earliest_block
        .map_or("N/A".to_string(), |b| b.to_string());
    let latest = stats
        .latest_block
        .map_or("N/A".to_string(), |b| b.to_string());

    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec!["Metric", "Value"]);

            table.add_row(vec![
                Cell::new("Total Executions"),
                Cell::new(stats.total_executions),
            ]);
            table.add_row(vec![Cell::new("Earliest Block"), Cell::new(&earliest)]);
            table.add_row(vec![Cell::new("Latest Block"), Cell::new(&latest)]);
            table.add_row(vec![
                Cell::new("HOLYC Burned"),
                Cell::new(format_amount(stats.total_holy_burned)),
            ]);
            table.add_row(vec![
                Cell::new("JIT Burned"),
                Cell::new(format_amount(stats.total_jit_burned)),
            ]);

            table.to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(&json!({
            "total_executions": stats.total_executions,
            "earliest_block": stats.earliest_block,
            "latest_block": stats.latest_block,
            "total_holy_burned": format_amount(stats.total_holy_burned),
            "total_holy_burned_wei": stats.total_holy_burned.to_string(),
            "total_jit_burned": format_amount(stats.total_jit_burned),
            "total_jit_burned_wei": stats.total_jit_burned.to_string(),
        }))
        .unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["metric", "value"]);
            let _ = wtr.write_record(["total_executions", &stats.total_executions.to_string()]);
            let _ = wtr.write_record(["earliest_block", &earliest]);
            let _ = wtr.write_record(["latest_block", &latest]);
            let _ = wtr.write_record([
                "total_holy_burned_wei",
                &stats.total_holy_burned.to_string(),
            ]);
            let _ = wtr.write_record([
                "total_jit_burned_wei",
                &stats.total_jit_burned.to_string(),
            ]);
            String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
        }
    }
}

fn format_tx_hash(hash: &str) -> String {
    format!("{}...{}", &hash[..6], &hash[hash.len() - 4..])
}
