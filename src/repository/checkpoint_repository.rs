use crate::models::Checkpoint;
use alloy_primitives::{Address, B256};
use anyhow::Result;
use rusqlite::{OptionalExtension, params};

pub struct CheckpointRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> CheckpointRepository<'a> {
    const UPSERT_CHECKPOINT: &'static str = "INSERT INTO checkpoints
            (manager_address, last_processed_block, last_processed_tx_hash)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(manager_address) DO UPDATE SET
            last_processed_block = MAX(last_processed_block, excluded.last_processed_block),
            last_processed_tx_hash = excluded.last_processed_tx_hash";

    const GET_CHECKPOINT: &'static str = "SELECT last_processed_block, last_processed_tx_hash
         FROM checkpoints WHERE manager_address = ?1";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn get(&self, manager: &Address) -> Result<Option<Checkpoint>> {
        let row: Option<(i64, Option<String>)> = self
            .conn
            .query_row(Self::GET_CHECKPOINT, params![format!("{manager:?}")], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()?;

        let Some((last_processed_block, hash)) = row else {
            return Ok(None);
        };
        let last_processed_tx_hash = hash
            .map(|h| h.parse::<B256>())
            .transpose()
            .map_err(|e| anyhow::anyhow!("Invalid checkpoint hash in database: {}", e))?;

        Ok(Some(Checkpoint {
            last_processed_block: last_processed_block as u64,
            last_processed_tx_hash,
        }))
    }

    /// Never moves the stored block backwards.
    pub fn save(&self, manager: &Address, checkpoint: &Checkpoint) -> Result<()> {
        self.conn.execute(
            Self::UPSERT_CHECKPOINT,
            params![
                format!("{manager:?}"),
                checkpoint.last_processed_block as i64,
                checkpoint.last_processed_tx_hash.map(|h| format!("{h:?}")),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Database;

    #[test]
    fn round_trips_and_stays_monotonic() {
        let db = Database::in_memory().unwrap();
        let repo = CheckpointRepository::new(&db.conn);
        let manager = Address::repeat_byte(7);

        assert_eq!(repo.get(&manager).unwrap(), None);

        let cp = Checkpoint {
            last_processed_block: 500,
            last_processed_tx_hash: Some(B256::repeat_byte(1)),
        };
        repo.save(&manager, &cp).unwrap();
        assert_eq!(repo.get(&manager).unwrap(), Some(cp));

        repo.save(
            &manager,
            &Checkpoint {
                last_processed_block: 400,
                last_processed_tx_hash: Some(B256::repeat_byte(2)),
            },
        )
        .unwrap();
        let stored = repo.get(&manager).unwrap().unwrap();
        assert_eq!(stored.last_processed_block, 500);
        assert_eq!(stored.last_processed_tx_hash, Some(B256::repeat_byte(2)));

        assert_eq!(repo.get(&Address::repeat_byte(8)).unwrap(), None);
    }
}
