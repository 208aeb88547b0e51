use crate::models::{ExecutionRecord, ExecutionStep};
use alloy_primitives::{Address, B256, U256};
use anyhow::Result;
use rusqlite::{Row, params};
use std::str::FromStr;

pub struct ExecutionRepository<'a> {
    conn: &'a rusqlite::Connection,
    manager: Address,
}

impl<'a> ExecutionRepository<'a> {
    const INSERT_EXECUTION: &'static str = "INSERT OR IGNORE INTO executions (
            transaction_hash, manager_address, block_number, log_index, timestamp_ms,
            holy_burned, jit_burned, holy_in, holy_out, jit_in, jit_out, steps
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)";

    const SELECT_EXECUTION: &'static str = "SELECT transaction_hash, block_number, log_index,
            timestamp_ms, holy_burned, jit_burned, holy_in, holy_out, jit_in, jit_out, steps
        FROM executions";

    const SELECT_HASHES_ABOVE: &'static str = "SELECT transaction_hash, block_number
        FROM executions WHERE manager_address = ?1 AND block_number > ?2";

    pub fn new(conn: &'a rusqlite::Connection, manager: Address) -> Self {
        Self { conn, manager }
    }

    /// Returns whether the record was new.
    pub fn insert(&self, record: &ExecutionRecord) -> Result<bool> {
        let steps = serde_json::to_string(&record.steps)?;
        let inserted = self.conn.execute(
            Self::INSERT_EXECUTION,
            params![
                format!("{:?}", record.transaction_hash),
                format!("{:?}", self.manager),
                record.block_number as i64,
                record.log_index as i64,
                record.timestamp as i64,
                record.holy_burned.to_string(),
                record.jit_burned.to_string(),
                record.holy_in.to_string(),
                record.holy_out.to_string(),
                record.jit_in.to_string(),
                record.jit_out.to_string(),
                steps,
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Newest first.
    pub fn recent(&self, limit: usize, offset: usize) -> Result<Vec<ExecutionRecord>> {
        let query = format!(
            "{} WHERE manager_address = ?1
             ORDER BY block_number DESC, log_index DESC LIMIT {limit} OFFSET {offset}",
            Self::SELECT_EXECUTION
        );
        let mut stmt = self.conn.prepare(&query)?;
        let records = stmt
            .query_map(params![format!("{:?}", self.manager)], Self::row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn get(&self, hash: &B256) -> Result<Option<ExecutionRecord>> {
        let query = format!(
            "{} WHERE transaction_hash = ?1 AND manager_address = ?2",
            Self::SELECT_EXECUTION
        );
        let mut stmt = self.conn.prepare(&query)?;
        let mut rows = stmt.query_map(
            params![format!("{hash:?}"), format!("{:?}", self.manager)],
            Self::row_to_record,
        )?;
        Ok(rows.next().transpose()?)
    }

    /// Delivered transactions above `block`, for deduplication after restart.
    pub fn hashes_above(&self, block: u64) -> Result<Vec<(B256, u64)>> {
        let mut stmt = self.conn.prepare(Self::SELECT_HASHES_ABOVE)?;
        let hashes = stmt
            .query_map(
                params![format!("{:?}", self.manager), block as i64],
                |row| {
                    let hash = parse_column::<B256>(row, 0)?;
                    let block: i64 = row.get(1)?;
                    Ok((hash, block as u64))
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(hashes)
    }

    pub fn get_statistics(&self) -> Result<ExecutionStats> {
        let manager = format!("{:?}", self.manager);
        let (total_executions, earliest_block, latest_block): (i64, Option<i64>, Option<i64>) =
            self.conn.query_row(
                "SELECT COUNT(*), MIN(block_number), MAX(block_number)
                 FROM executions WHERE manager_address = ?1",
                params![manager],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

        let mut stmt = self.conn.prepare(
            "SELECT holy_burned, jit_burned FROM executions WHERE manager_address = ?1",
        )?;
        let burns = stmt
            .query_map(params![manager], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let (holy, jit): (Vec<String>, Vec<String>) = burns.into_iter().unzip();

        Ok(ExecutionStats {
            total_executions: total_executions as usize,
            earliest_block: earliest_block.map(|b| b as u64),
            latest_block: latest_block.map(|b| b as u64),
            total_holy_burned: Self::sum_values(holy)?,
            total_jit_burned: Self::sum_values(jit)?,
        })
    }

    fn row_to_record(row: &Row) -> rusqlite::Result<ExecutionRecord> {
        let steps: Vec<ExecutionStep> =
            serde_json::from_str(&row.get::<_, String>(10)?).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    10,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;

        Ok(ExecutionRecord {
            transaction_hash: parse_column(row, 0)?,
            block_number: row.get::<_, i64>(1)? as u64,
            log_index: row.get::<_, i64>(2)? as u64,
            timestamp: row.get::<_, i64>(3)? as u64,
            holy_burned: parse_column(row, 4)?,
            jit_burned: parse_column(row, 5)?,
            holy_in: parse_column(row, 6)?,
            holy_out: parse_column(row, 7)?,
            jit_in: parse_column(row, 8)?,
            jit_out: parse_column(row, 9)?,
            steps,
        })
    }

    fn sum_values(values: Vec<String>) -> Result<U256> {
        let mut total = U256::ZERO;
        for value_str in values {
            let value = U256::from_str(&value_str)
                .map_err(|_| anyhow::anyhow!("Invalid value format in database: {}", value_str))?;
            total = total
                .checked_add(value)
                .ok_or_else(|| anyhow::anyhow!("Overflow in sum calculation"))?;
        }
        Ok(total)
    }
}

fn parse_column<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    row.get::<_, String>(idx)?.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

#[derive(Debug)]
pub struct ExecutionStats {
    pub total_executions: usize,
    pub earliest_block: Option<u64>,
    pub latest_block: Option<u64>,
    pub total_holy_burned: U256,
    pub total_jit_burned: U256,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Asset, StepKind};
    use crate::repository::Database;

    fn record(tx: u8, block: u64, burned: u64) -> ExecutionRecord {
        let mut step = ExecutionStep::open(StepKind::Compile, Asset::Holyc, Asset::Jit, U256::from(500u64), 0);
        step.amount_out = Some(U256::from(480u64));
        ExecutionRecord {
            transaction_hash: B256::repeat_byte(tx),
            block_number: block,
            log_index: 1,
            timestamp: block * 10_000,
            holy_burned: U256::from(burned),
            jit_burned: U256::from(1u64),
            holy_in: U256::ZERO,
            holy_out: U256::from(500u64),
            jit_in: U256::from(480u64),
            jit_out: U256::ZERO,
            steps: vec![step],
        }
    }

    #[test]
    fn stores_and_reads_records() {
        let db = Database::in_memory().unwrap();
        let repo = ExecutionRepository::new(&db.conn, Address::repeat_byte(1));

        assert!(repo.insert(&record(1, 10, 20)).unwrap());
        assert!(!repo.insert(&record(1, 10, 20)).unwrap());
        repo.insert(&record(2, 12, 5)).unwrap();
        repo.insert(&record(3, 11, 0)).unwrap();

        let recent = repo.recent(10, 0).unwrap();
        let blocks: Vec<u64> = recent.iter().map(|r| r.block_number).collect();
        assert_eq!(blocks, vec![12, 11, 10]);
        assert_eq!(recent[2], record(1, 10, 20));

        assert_eq!(repo.recent(1, 1).unwrap()[0].block_number, 11);
        assert_eq!(repo.get(&B256::repeat_byte(2)).unwrap(), Some(record(2, 12, 5)));
        assert_eq!(repo.get(&B256::repeat_byte(9)).unwrap(), None);
    }

    #[test]
    fn hashes_above_and_stats() {
        let db = Database::in_memory().unwrap();
        let repo = ExecutionRepository::new(&db.conn, Address::repeat_byte(1));
        let other = ExecutionRepository::new(&db.conn, Address::repeat_byte(2));
        repo.insert(&record(1, 10, 20)).unwrap();
        repo.insert(&record(2, 12, 5)).unwrap();
        other.insert(&record(3, 50, 7)).unwrap();

        assert_eq!(repo.hashes_above(10).unwrap(), vec![(B256::repeat_byte(2), 12)]);
        assert_eq!(repo.get(&B256::repeat_byte(3)).unwrap(), None);
        assert!(other.get(&B256::repeat_byte(3)).unwrap().is_some());

        let stats = repo.get_statistics().unwrap();
        assert_eq!(stats.total_executions, 2);
        assert_eq!(stats.earliest_block, Some(10));
        assert_eq!(stats.latest_block, Some(12));
        assert_eq!(stats.total_holy_burned, U256::from(25u64));
        assert_eq!(stats.total_jit_burned, U256::from(2u64));
    }
}
