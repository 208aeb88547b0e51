use anyhow::{Context, Result};
use rusqlite::Connection;

pub struct Database {
    pub conn: Connection,
}

impl Database {
    pub fn new(db_path: &str) -> Result<Self> {
        let db_path = db_path.strip_prefix("sqlite:").unwrap_or(db_path);
        let conn = Connection::open(db_path).context("Failed to open database")?;

        let db = Database { conn };
        db.create_tables()?;
        Ok(db)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open database")?;
        let db = Database { conn };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> Result<()> {
        // One cursor per monitored manager contract
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                manager_address TEXT PRIMARY KEY,
                last_processed_block INTEGER NOT NULL,
                last_processed_tx_hash TEXT
            )",
            [],
        )?;

        // Delivered execution records; amounts as decimal strings
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS executions (
                transaction_hash TEXT PRIMARY KEY,
                manager_address TEXT NOT NULL,
                block_number INTEGER NOT NULL,
                log_index INTEGER NOT NULL,
                timestamp_ms INTEGER NOT NULL,
                holy_burned TEXT NOT NULL,
                jit_burned TEXT NOT NULL,
                holy_in TEXT NOT NULL,
                holy_out TEXT NOT NULL,
                jit_in TEXT NOT NULL,
                jit_out TEXT NOT NULL,
                steps TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_executions_block
             ON executions(manager_address, block_number, log_index)",
            [],
        )?;

        Ok(())
    }
}
