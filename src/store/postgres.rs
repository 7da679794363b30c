//! PostgreSQL storage backend

use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use sqlx::postgres::{PgPool, PgPoolOptions};

use super::{EventIndexStore, TokenRegistry, UndoneSequenceStore, VaaStore};
use crate::types::{Byte32, ChainId, Emitter, SequenceGap, SequenceStatus, VaaId};

/// Create a database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .wrap_err("Failed to connect to database")
}

/// Run pending migrations (uses the migration files in migrations/)
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .wrap_err("Failed to run database migrations")?;
    Ok(())
}

fn to_db_sequence(sequence: u64) -> Result<i64> {
    i64::try_from(sequence).map_err(|_| eyre!("sequence {} exceeds database range", sequence))
}

fn from_db_sequence(sequence: i64) -> Result<u64> {
    u64::try_from(sequence).map_err(|_| eyre!("negative sequence {} in database", sequence))
}

fn to_byte32(bytes: &[u8], column: &str) -> Result<Byte32> {
    Byte32::from_slice(bytes).wrap_err_with(|| format!("Invalid {} in database", column))
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl VaaStore for PgStore {
    async fn get_signed_vaa(&self, id: &VaaId) -> Result<Option<Vec<u8>>> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as(
            r#"SELECT vaa_bytes FROM signed_vaas
               WHERE emitter_chain = $1 AND emitter_address = $2 AND sequence = $3"#,
        )
        .bind(id.emitter_chain.to_u16() as i32)
        .bind(id.emitter_address.as_bytes().as_slice())
        .bind(to_db_sequence(id.sequence)?)
        .fetch_optional(&self.pool)
        .await
        .wrap_err_with(|| format!("Failed to get signed VAA {}", id))?;

        Ok(row.map(|r| r.0))
    }

    async fn store_signed_vaa(&self, id: &VaaId, vaa_bytes: &[u8]) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO signed_vaas (emitter_chain, emitter_address, sequence, vaa_bytes)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (emitter_chain, emitter_address, sequence) DO NOTHING
            "#,
        )
        .bind(id.emitter_chain.to_u16() as i32)
        .bind(id.emitter_address.as_bytes().as_slice())
        .bind(to_db_sequence(id.sequence)?)
        .bind(vaa_bytes)
        .execute(&self.pool)
        .await
        .wrap_err_with(|| format!("Failed to store signed VAA {}", id))?;

        Ok(())
    }

    async fn find_emitter_sequence_gap(&self, emitter: &Emitter) -> Result<SequenceGap> {
        let chain = emitter.chain.to_u16() as i32;
        let address = emitter.address.as_bytes().as_slice();

        let (first, last): (Option<i64>, Option<i64>) = sqlx::query_as(
            r#"SELECT MIN(sequence), MAX(sequence) FROM signed_vaas
               WHERE emitter_chain = $1 AND emitter_address = $2"#,
        )
        .bind(chain)
        .bind(address)
        .fetch_one(&self.pool)
        .await
        .wrap_err("Failed to get emitter sequence range")?;

        let (first, last) = match (first, last) {
            (Some(first), Some(last)) => (first, last),
            _ => return Ok(SequenceGap::default()),
        };

        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT s.seq FROM generate_series($3::BIGINT, $4::BIGINT) AS s(seq)
            WHERE NOT EXISTS (
                SELECT 1 FROM signed_vaas v
                WHERE v.emitter_chain = $1 AND v.emitter_address = $2 AND v.sequence = s.seq
            )
            ORDER BY s.seq
            "#,
        )
        .bind(chain)
        .bind(address)
        .bind(first)
        .bind(last)
        .fetch_all(&self.pool)
        .await
        .wrap_err("Failed to find emitter sequence gap")?;

        Ok(SequenceGap {
            missing: rows
                .into_iter()
                .map(|r| from_db_sequence(r.0))
                .collect::<Result<_>>()?,
            first: from_db_sequence(first)?,
            last: from_db_sequence(last)?,
        })
    }
}

#[async_trait]
impl TokenRegistry for PgStore {
    async fn local_token_wrapper(
        &self,
        token_id: &Byte32,
        remote_chain: ChainId,
    ) -> Result<Option<Byte32>> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as(
            r#"SELECT wrapper_id FROM local_token_wrappers
               WHERE token_id = $1 AND remote_chain_id = $2"#,
        )
        .bind(token_id.as_bytes().as_slice())
        .bind(remote_chain.to_u16() as i32)
        .fetch_optional(&self.pool)
        .await
        .wrap_err("Failed to get local token wrapper")?;

        row.map(|r| to_byte32(&r.0, "wrapper_id")).transpose()
    }

    async fn remote_token_wrapper(&self, token_id: &Byte32) -> Result<Option<Byte32>> {
        let row: Option<(Vec<u8>,)> =
            sqlx::query_as(r#"SELECT wrapper_id FROM remote_token_wrappers WHERE token_id = $1"#)
                .bind(token_id.as_bytes().as_slice())
                .fetch_optional(&self.pool)
                .await
                .wrap_err("Failed to get remote token wrapper")?;

        row.map(|r| to_byte32(&r.0, "wrapper_id")).transpose()
    }

    async fn add_local_token_wrapper(
        &self,
        token_id: &Byte32,
        remote_chain: ChainId,
        wrapper_id: &Byte32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO local_token_wrappers (token_id, remote_chain_id, wrapper_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (token_id, remote_chain_id) DO UPDATE SET wrapper_id = $3
            "#,
        )
        .bind(token_id.as_bytes().as_slice())
        .bind(remote_chain.to_u16() as i32)
        .bind(wrapper_id.as_bytes().as_slice())
        .execute(&self.pool)
        .await
        .wrap_err("Failed to add local token wrapper")?;

        Ok(())
    }

    async fn add_remote_token_wrapper(
        &self,
        token_id: &Byte32,
        wrapper_id: &Byte32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO remote_token_wrappers (token_id, wrapper_id)
            VALUES ($1, $2)
            ON CONFLICT (token_id) DO UPDATE SET wrapper_id = $2
            "#,
        )
        .bind(token_id.as_bytes().as_slice())
        .bind(wrapper_id.as_bytes().as_slice())
        .execute(&self.pool)
        .await
        .wrap_err("Failed to add remote token wrapper")?;

        Ok(())
    }
}

#[async_trait]
impl UndoneSequenceStore for PgStore {
    async fn add_undone_sequences(&self, remote_chain: ChainId, sequences: &[u64]) -> Result<()> {
        let sequences = sequences
            .iter()
            .map(|s| to_db_sequence(*s))
            .collect::<Result<Vec<_>>>()?;

        sqlx::query(
            r#"
            INSERT INTO undone_sequences (remote_chain_id, sequence, status)
            SELECT $1, s, $3 FROM UNNEST($2::BIGINT[]) AS s
            ON CONFLICT (remote_chain_id, sequence) DO NOTHING
            "#,
        )
        .bind(remote_chain.to_u16() as i32)
        .bind(sequences)
        .bind(SequenceStatus::Undone.as_str())
        .execute(&self.pool)
        .await
        .wrap_err("Failed to add undone sequences")?;

        Ok(())
    }

    async fn get_undone_sequences(&self, remote_chain: ChainId) -> Result<Vec<u64>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"SELECT sequence FROM undone_sequences
               WHERE remote_chain_id = $1 AND status = $2 ORDER BY sequence"#,
        )
        .bind(remote_chain.to_u16() as i32)
        .bind(SequenceStatus::Undone.as_str())
        .fetch_all(&self.pool)
        .await
        .wrap_err_with(|| format!("Failed to get undone sequences for chain {}", remote_chain))?;

        rows.into_iter().map(|r| from_db_sequence(r.0)).collect()
    }

    async fn set_sequence_executing(&self, remote_chain: ChainId, sequence: u64) -> Result<bool> {
        // A single statement so concurrent callers can't both win
        let result = sqlx::query(
            r#"
            INSERT INTO undone_sequences (remote_chain_id, sequence, status)
            VALUES ($1, $2, $3)
            ON CONFLICT (remote_chain_id, sequence) DO UPDATE
                SET status = EXCLUDED.status, updated_at = NOW()
                WHERE undone_sequences.status = $4
            "#,
        )
        .bind(remote_chain.to_u16() as i32)
        .bind(to_db_sequence(sequence)?)
        .bind(SequenceStatus::Executing.as_str())
        .bind(SequenceStatus::Undone.as_str())
        .execute(&self.pool)
        .await
        .wrap_err_with(|| {
            format!(
                "Failed to set sequence {} executing for chain {}",
                sequence, remote_chain
            )
        })?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl EventIndexStore for PgStore {
    async fn next_event_index(&self, contract_address: &str) -> Result<Option<u64>> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"SELECT next_index FROM contract_event_indexes WHERE contract_address = $1"#,
        )
        .bind(contract_address)
        .fetch_optional(&self.pool)
        .await
        .wrap_err("Failed to get contract event index")?;

        row.map(|r| from_db_sequence(r.0)).transpose()
    }

    async fn set_next_event_index(&self, contract_address: &str, next_index: u64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO contract_event_indexes (contract_address, next_index)
            VALUES ($1, $2)
            ON CONFLICT (contract_address) DO UPDATE SET next_index = $2, updated_at = NOW()
            "#,
        )
        .bind(contract_address)
        .bind(to_db_sequence(next_index)?)
        .execute(&self.pool)
        .await
        .wrap_err_with(|| {
            format!(
                "Failed to update event index for contract {}",
                contract_address
            )
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_range_conversion() {
        assert_eq!(to_db_sequence(5).unwrap(), 5);
        assert!(to_db_sequence(u64::MAX).is_err());
        assert!(from_db_sequence(-1).is_err());
    }

    /// Requires a running Postgres at DATABASE_URL
    #[tokio::test]
    #[ignore]
    async fn test_postgres_store_round_trip() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = create_pool(&url).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let store = PgStore::new(pool);

        let mut address = [0u8; 32];
        address[..8].copy_from_slice(&rand::random::<u64>().to_be_bytes());
        let emitter = Emitter::new(ChainId::ETHEREUM, Byte32(address));
        for seq in [0u64, 1, 3, 4] {
            store
                .store_signed_vaa(&emitter.vaa_id(seq), &[seq as u8])
                .await
                .unwrap();
        }

        let gap = store.find_emitter_sequence_gap(&emitter).await.unwrap();
        assert_eq!(gap.missing, vec![2]);
        assert_eq!((gap.first, gap.last), (0, 4));
        assert_eq!(
            store.get_signed_vaa(&emitter.vaa_id(3)).await.unwrap(),
            Some(vec![3])
        );

        let chain = ChainId(rand::random::<u16>() | 0x8000);
        store.add_undone_sequences(chain, &[7, 8]).await.unwrap();
        assert!(store.set_sequence_executing(chain, 7).await.unwrap());
        assert!(!store.set_sequence_executing(chain, 7).await.unwrap());
        assert_eq!(store.get_undone_sequences(chain).await.unwrap(), vec![8]);
    }
}
