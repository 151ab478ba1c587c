//! PostgreSQL entity store.
//!
//! One table per entity kind, composite keys spread over columns. Balances
//! are `NUMERIC`; liquidity totals are arbitrary precision and kept as
//! decimal text.

use async_trait::async_trait;
use num_bigint::BigInt;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Executor, PgPool, Postgres, Row};
use tracing::{info, instrument};

use chainledger_common::{
    AccountId, BalanceKey, DayKey, EventId, LedgerError, LiquidityDirection, LiquiditySummaryKey,
    Result, Timestamp, TokenSymbol, TransferDirection, TransferRecordId,
};

use super::{Entity, EntityKey, EntityStore};
use crate::account::Account;
use crate::balance::AccountBalance;
use crate::journal::CurrencyTransfer;
use crate::liquidity::{DailyLiquiditySummary, LiquidityChange};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        address TEXT PRIMARY KEY
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS account_balances (
        address TEXT NOT NULL,
        currency TEXT NOT NULL,
        balance NUMERIC NOT NULL,
        PRIMARY KEY (address, currency)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS currency_transfers (
        block_number BIGINT NOT NULL,
        event_index INTEGER NOT NULL,
        direction TEXT NOT NULL,
        address TEXT NOT NULL,
        currency TEXT NOT NULL,
        amount NUMERIC NOT NULL,
        timestamp TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (block_number, event_index, direction)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS daily_liquidity_summaries (
        token0 TEXT NOT NULL,
        token1 TEXT NOT NULL,
        day TEXT NOT NULL,
        token0_daily_total TEXT NOT NULL,
        token1_daily_total TEXT NOT NULL,
        PRIMARY KEY (token0, token1, day)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS liquidity_changes (
        block_number BIGINT NOT NULL,
        event_index INTEGER NOT NULL,
        token0 TEXT NOT NULL,
        token1 TEXT NOT NULL,
        day TEXT NOT NULL,
        direction TEXT NOT NULL,
        token0_delta TEXT NOT NULL,
        token1_delta TEXT NOT NULL,
        timestamp TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (block_number, event_index)
    )
    "#,
];

/// Entity store over a PostgreSQL pool, using runtime-checked queries.
#[derive(Clone)]
pub struct PgEntityStore {
    pool: PgPool,
}

impl PgEntityStore {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database at `url`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(store_error)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the ledger tables if they do not exist.
    #[instrument(skip(self))]
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(store_error)?;
        }
        info!(tables = SCHEMA.len(), "Ledger schema ready");
        Ok(())
    }

    async fn fetch(&self, key: &EntityKey) -> Result<Option<Entity>> {
        let entity = match key {
            EntityKey::Account(address) => {
                sqlx::query("SELECT address FROM accounts WHERE address = $1")
                    .bind(address.as_str())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(store_error)?
                    .map(|row| decode_account(&row))
                    .transpose()?
                    .map(Entity::from)
            }
            EntityKey::AccountBalance(key) => sqlx::query(
                "SELECT address, currency, balance FROM account_balances \
                 WHERE address = $1 AND currency = $2",
            )
            .bind(key.address.as_str())
            .bind(key.currency.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?
            .map(|row| decode_balance(&row))
            .transpose()?
            .map(Entity::from),
            EntityKey::CurrencyTransfer(id) => sqlx::query(
                "SELECT block_number, event_index, direction, address, currency, amount, timestamp \
                 FROM currency_transfers \
                 WHERE block_number = $1 AND event_index = $2 AND direction = $3",
            )
            .bind(block_column(id.transfer_id)?)
            .bind(index_column(id.transfer_id)?)
            .bind(id.direction.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?
            .map(|row| decode_transfer(&row))
            .transpose()?
            .map(Entity::from),
            EntityKey::DailyLiquiditySummary(key) => sqlx::query(
                "SELECT token0, token1, day, token0_daily_total, token1_daily_total \
                 FROM daily_liquidity_summaries \
                 WHERE token0 = $1 AND token1 = $2 AND day = $3",
            )
            .bind(key.token0.as_str())
            .bind(key.token1.as_str())
            .bind(key.day.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?
            .map(|row| decode_summary(&row))
            .transpose()?
            .map(Entity::from),
            EntityKey::LiquidityChange(id) => sqlx::query(
                "SELECT block_number, event_index, token0, token1, day, direction, \
                 token0_delta, token1_delta, timestamp \
                 FROM liquidity_changes WHERE block_number = $1 AND event_index = $2",
            )
            .bind(block_column(*id)?)
            .bind(index_column(*id)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?
            .map(|row| decode_change(&row))
            .transpose()?
            .map(Entity::from),
        };
        Ok(entity)
    }
}

async fn upsert<'e, E>(executor: E, entity: &Entity) -> Result<()>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = match entity {
        Entity::Account(account) => {
            sqlx::query("INSERT INTO accounts (address) VALUES ($1) ON CONFLICT DO NOTHING")
                .bind(account.id.as_str().to_string())
        }
        Entity::AccountBalance(balance) => sqlx::query(
            r#"
            INSERT INTO account_balances (address, currency, balance)
            VALUES ($1, $2, $3)
            ON CONFLICT (address, currency) DO UPDATE SET balance = EXCLUDED.balance
            "#,
        )
        .bind(balance.key.address.as_str().to_string())
        .bind(balance.key.currency.as_str().to_string())
        .bind(balance.balance),
        Entity::CurrencyTransfer(transfer) => sqlx::query(
            r#"
            INSERT INTO currency_transfers (
                block_number, event_index, direction, address, currency, amount, timestamp
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (block_number, event_index, direction) DO UPDATE SET
                address = EXCLUDED.address,
                currency = EXCLUDED.currency,
                amount = EXCLUDED.amount,
                timestamp = EXCLUDED.timestamp
            "#,
        )
        .bind(block_column(transfer.id.transfer_id)?)
        .bind(index_column(transfer.id.transfer_id)?)
        .bind(transfer.id.direction.as_str())
        .bind(transfer.balance.address.as_str().to_string())
        .bind(transfer.balance.currency.as_str().to_string())
        .bind(transfer.amount)
        .bind(transfer.timestamp),
        Entity::DailyLiquiditySummary(summary) => sqlx::query(
            r#"
            INSERT INTO daily_liquidity_summaries (
                token0, token1, day, token0_daily_total, token1_daily_total
            ) VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (token0, token1, day) DO UPDATE SET
                token0_daily_total = EXCLUDED.token0_daily_total,
                token1_daily_total = EXCLUDED.token1_daily_total
            "#,
        )
        .bind(summary.key.token0.as_str().to_string())
        .bind(summary.key.token1.as_str().to_string())
        .bind(summary.key.day.as_str().to_string())
        .bind(summary.token0_daily_total.to_string())
        .bind(summary.token1_daily_total.to_string()),
        Entity::LiquidityChange(change) => sqlx::query(
            r#"
            INSERT INTO liquidity_changes (
                block_number, event_index, token0, token1, day, direction,
                token0_delta, token1_delta, timestamp
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (block_number, event_index) DO NOTHING
            "#,
        )
        .bind(block_column(change.id)?)
        .bind(index_column(change.id)?)
        .bind(change.summary.token0.as_str().to_string())
        .bind(change.summary.token1.as_str().to_string())
        .bind(change.summary.day.as_str().to_string())
        .bind(change.direction.as_str())
        .bind(change.token0_delta.to_string())
        .bind(change.token1_delta.to_string())
        .bind(change.timestamp),
    };

    query.execute(executor).await.map_err(store_error)?;
    Ok(())
}

#[async_trait]
impl EntityStore for PgEntityStore {
    async fn get(&self, key: &EntityKey) -> Result<Option<Entity>> {
        self.fetch(key).await
    }

    async fn save(&self, entity: Entity) -> Result<()> {
        upsert(&self.pool, &entity).await
    }

    async fn save_batch(&self, entities: Vec<Entity>) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        for entity in &entities {
            upsert(&mut *tx, entity).await?;
        }
        tx.commit().await.map_err(store_error)
    }
}

fn store_error(e: sqlx::Error) -> LedgerError {
    match e {
        sqlx::Error::PoolTimedOut => LedgerError::Timeout("waiting for a database connection".into()),
        other => LedgerError::StoreError(other.to_string()),
    }
}

fn block_column(id: EventId) -> Result<i64> {
    i64::try_from(id.block_number)
        .map_err(|_| LedgerError::StoreError(format!("block number {} exceeds BIGINT", id.block_number)))
}

fn index_column(id: EventId) -> Result<i32> {
    i32::try_from(id.event_index)
        .map_err(|_| LedgerError::StoreError(format!("event index {} exceeds INTEGER", id.event_index)))
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name).map_err(store_error)
}

fn event_id_columns(row: &PgRow) -> Result<EventId> {
    let block: i64 = column(row, "block_number")?;
    let index: i32 = column(row, "event_index")?;
    let block = u64::try_from(block)
        .map_err(|_| LedgerError::StoreError(format!("negative block number {block}")))?;
    let index = u32::try_from(index)
        .map_err(|_| LedgerError::StoreError(format!("negative event index {index}")))?;
    Ok(EventId::new(block, index))
}

fn parse_transfer_direction(s: &str) -> Result<TransferDirection> {
    match s {
        "from" => Ok(TransferDirection::From),
        "to" => Ok(TransferDirection::To),
        other => Err(LedgerError::StoreError(format!("unknown transfer direction {other:?}"))),
    }
}

fn parse_liquidity_direction(s: &str) -> Result<LiquidityDirection> {
    match s {
        "add" => Ok(LiquidityDirection::Add),
        "remove" => Ok(LiquidityDirection::Remove),
        other => Err(LedgerError::StoreError(format!("unknown liquidity direction {other:?}"))),
    }
}

fn parse_bigint(s: &str) -> Result<BigInt> {
    s.parse::<BigInt>()
        .map_err(|e| LedgerError::StoreError(format!("invalid stored total {s:?}: {e}")))
}

fn parse_day(s: &str) -> Result<DayKey> {
    DayKey::parse(s).map_err(|e| LedgerError::StoreError(e.to_string()))
}

fn decode_account(row: &PgRow) -> Result<Account> {
    let address: String = column(row, "address")?;
    Ok(Account::new(AccountId::new(address)))
}

fn decode_balance(row: &PgRow) -> Result<AccountBalance> {
    let address: String = column(row, "address")?;
    let currency: String = column(row, "currency")?;
    let balance: Decimal = column(row, "balance")?;
    Ok(AccountBalance {
        key: BalanceKey::new(AccountId::new(address), TokenSymbol::new(currency)),
        balance,
    })
}

fn decode_transfer(row: &PgRow) -> Result<CurrencyTransfer> {
    let direction: String = column(row, "direction")?;
    let address: String = column(row, "address")?;
    let currency: String = column(row, "currency")?;
    let timestamp: Timestamp = column(row, "timestamp")?;
    Ok(CurrencyTransfer {
        id: TransferRecordId::new(event_id_columns(row)?, parse_transfer_direction(&direction)?),
        balance: BalanceKey::new(AccountId::new(address), TokenSymbol::new(currency)),
        // Stored already signed.
        amount: column(row, "amount")?,
        timestamp,
    })
}

fn summary_key_columns(row: &PgRow) -> Result<LiquiditySummaryKey> {
    let token0: String = column(row, "token0")?;
    let token1: String = column(row, "token1")?;
    let day: String = column(row, "day")?;
    Ok(LiquiditySummaryKey::new(
        TokenSymbol::new(token0),
        TokenSymbol::new(token1),
        parse_day(&day)?,
    ))
}

fn decode_summary(row: &PgRow) -> Result<DailyLiquiditySummary> {
    let total0: String = column(row, "token0_daily_total")?;
    let total1: String = column(row, "token1_daily_total")?;
    Ok(DailyLiquiditySummary {
        key: summary_key_columns(row)?,
        token0_daily_total: parse_bigint(&total0)?,
        token1_daily_total: parse_bigint(&total1)?,
    })
}

fn decode_change(row: &PgRow) -> Result<LiquidityChange> {
    let direction: String = column(row, "direction")?;
    let delta0: String = column(row, "token0_delta")?;
    let delta1: String = column(row, "token1_delta")?;
    let timestamp: Timestamp = column(row, "timestamp")?;
    Ok(LiquidityChange {
        id: event_id_columns(row)?,
        summary: summary_key_columns(row)?,
        direction: parse_liquidity_direction(&direction)?,
        token0_delta: parse_bigint(&delta0)?,
        token1_delta: parse_bigint(&delta1)?,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn test_direction_columns() {
        for direction in [TransferDirection::From, TransferDirection::To] {
            assert_eq!(parse_transfer_direction(direction.as_str()).unwrap(), direction);
        }
        for direction in [LiquidityDirection::Add, LiquidityDirection::Remove] {
            assert_eq!(parse_liquidity_direction(direction.as_str()).unwrap(), direction);
        }
        assert!(parse_transfer_direction("sideways").is_err());
    }

    #[test]
    fn test_key_columns_out_of_range() {
        let id = EventId::new(u64::MAX, u32::MAX);
        assert_eq!(block_column(id).unwrap_err().error_code(), "STORE_ERROR");
        assert_eq!(index_column(id).unwrap_err().error_code(), "STORE_ERROR");
        assert_eq!(block_column(EventId::new(7, 1)).unwrap(), 7);
    }

    #[test]
    fn test_stored_totals_parse() {
        assert_eq!(
            parse_bigint("-340282366920938463463374607431768211456").unwrap(),
            -(BigInt::from(1u8) << 128u32)
        );
        assert!(parse_bigint("12a").is_err());
    }

    /// Needs a live database: `DATABASE_URL=postgres://... cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn test_batch_roundtrip_against_database() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let store = PgEntityStore::connect(&url, 2).await.unwrap();
        store.migrate().await.unwrap();

        let key = BalanceKey::new(AccountId::new("pg-test"), TokenSymbol::new("DOT"));
        let mut balance = AccountBalance::zero(key.clone());
        balance.balance = dec!(12.5);
        let record = CurrencyTransfer::new(
            EventId::new(1, 0),
            TransferDirection::To,
            key.clone(),
            dec!(12.5),
            Utc::now(),
        );

        store
            .save_batch(vec![record.clone().into(), balance.clone().into()])
            .await
            .unwrap();

        let loaded = store.get(&EntityKey::AccountBalance(key)).await.unwrap();
        assert_eq!(loaded, Some(Entity::AccountBalance(balance)));
        let loaded = store.get(&EntityKey::CurrencyTransfer(record.id)).await.unwrap();
        assert!(matches!(loaded, Some(Entity::CurrencyTransfer(_))));
    }
}
