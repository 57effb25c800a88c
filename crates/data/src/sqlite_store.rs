use anyhow::Result;
use async_trait::async_trait;
use autotrader_core::position::correctness_from_pnl;
use autotrader_core::{
    CloseRequest, ClosedPosition, Direction, EngineError, ExecutionLogEntry, ExitReason,
    InvariantViolation, LogAction, ManualTrade, NewPosition, Position, PositionId, PositionStatus,
    TenantId, TenantSettings, TenantStats, TradeStore,
};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::str::FromStr;
use std::time::Duration;

const POSITION_COLUMNS: &str = "id, tenant_id, symbol, direction, entry_price, current_price, \
    stop_loss, take_profit, lots, probability, status, exit_price, exit_reason, \
    realized_pnl_cents, is_direction_correct, opened_at, closed_at";

/// `SQLite`-backed [`TradeStore`].
///
/// Money is stored as integer cents and timestamps as unix seconds. The partial
/// unique index on open positions backs the conditional insert, so a racing
/// second insert fails at the database even if both passed the `NOT EXISTS`
/// check.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    initial_balance: Decimal,
}

#[derive(sqlx::FromRow)]
struct PositionRow {
    id: i64,
    tenant_id: i64,
    symbol: String,
    direction: String,
    entry_price: f64,
    current_price: Option<f64>,
    stop_loss: f64,
    take_profit: f64,
    lots: f64,
    probability: Option<f64>,
    status: String,
    exit_price: Option<f64>,
    exit_reason: Option<String>,
    realized_pnl_cents: i64,
    is_direction_correct: Option<bool>,
    opened_at: i64,
    closed_at: Option<i64>,
}

impl TryFrom<PositionRow> for Position {
    type Error = EngineError;

    fn try_from(row: PositionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            tenant_id: row.tenant_id,
            direction: Direction::from_str(&row.direction).map_err(EngineError::store)?,
            symbol: row.symbol,
            entry_price: row.entry_price,
            current_price: row.current_price,
            stop_loss: row.stop_loss,
            take_profit: row.take_profit,
            lots: row.lots,
            probability: row.probability,
            status: PositionStatus::from_str(&row.status).map_err(EngineError::store)?,
            exit_price: row.exit_price,
            exit_reason: row
                .exit_reason
                .as_deref()
                .map(ExitReason::from_str)
                .transpose()
                .map_err(EngineError::store)?,
            realized_pnl: from_cents(row.realized_pnl_cents),
            is_direction_correct: row.is_direction_correct,
            opened_at: to_datetime(row.opened_at),
            closed_at: row.closed_at.map(to_datetime),
        })
    }
}

#[derive(sqlx::FromRow)]
struct LogRow {
    id: i64,
    tenant_id: i64,
    action: String,
    symbol: Option<String>,
    details: Option<String>,
    created_at: i64,
}

impl From<LogRow> for ExecutionLogEntry {
    fn from(row: LogRow) -> Self {
        Self {
            id: row.id,
            tenant_id: row.tenant_id,
            action: row.action,
            symbol: row.symbol,
            details: row.details,
            created_at: to_datetime(row.created_at),
        }
    }
}

fn to_cents(amount: Decimal) -> Result<i64, EngineError> {
    (amount * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .ok_or_else(|| EngineError::Store(format!("amount out of range: {amount}")))
}

fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

fn to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `database_url` and runs
    /// migrations.
    ///
    /// # Errors
    /// Returns an error if the connection or a migration fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!(url = database_url, "Trade store ready");
        Ok(Self {
            pool,
            initial_balance: Decimal::from(10_000),
        })
    }

    /// Creates a migrated in-memory database.
    ///
    /// The pool is pinned to one connection that never expires, since every
    /// `SQLite` memory connection is its own database.
    ///
    /// # Errors
    /// Returns an error if the connection or a migration fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self {
            pool,
            initial_balance: Decimal::from(10_000),
        })
    }

    /// Balance given to accounts created implicitly by a close.
    #[must_use]
    pub const fn with_initial_balance(mut self, initial_balance: Decimal) -> Self {
        self.initial_balance = initial_balance;
        self
    }

    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_position(
        tx: &mut Transaction<'_, Sqlite>,
        id: PositionId,
    ) -> Result<Position, EngineError> {
        let row = sqlx::query_as::<_, PositionRow>(&format!(
            "SELECT {POSITION_COLUMNS} FROM positions WHERE id = ?1"
        ))
        .bind(id)
        .fetch_one(&mut **tx)
        .await
        .map_err(EngineError::store)?;
        row.try_into()
    }

    /// Adds `delta_cents` to the balance, creating the account if needed, and
    /// returns the new balance.
    async fn apply_pnl(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        tenant_id: TenantId,
        delta_cents: i64,
        now: i64,
    ) -> Result<Decimal, EngineError> {
        sqlx::query(
            "INSERT OR IGNORE INTO accounts (tenant_id, balance_cents, updated_at) VALUES (?1, ?2, ?3)",
        )
        .bind(tenant_id)
        .bind(to_cents(self.initial_balance)?)
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(EngineError::store)?;

        let (balance,): (i64,) = sqlx::query_as(
            r"
            UPDATE accounts
            SET balance_cents = balance_cents + ?2, updated_at = ?3
            WHERE tenant_id = ?1
            RETURNING balance_cents
            ",
        )
        .bind(tenant_id)
        .bind(delta_cents)
        .bind(now)
        .fetch_one(&mut **tx)
        .await
        .map_err(EngineError::store)?;

        Ok(from_cents(balance))
    }
}

#[async_trait]
impl TradeStore for SqliteStore {
    async fn load_settings(&self, tenant_id: TenantId) -> Result<TenantSettings, EngineError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT settings_json FROM tenant_settings WHERE tenant_id = ?1")
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(EngineError::store)?;

        match row {
            Some((json,)) => serde_json::from_str(&json).map_err(EngineError::store),
            None => Ok(TenantSettings::default()),
        }
    }

    async fn save_settings(
        &self,
        tenant_id: TenantId,
        settings: &TenantSettings,
    ) -> Result<(), EngineError> {
        let json = serde_json::to_string(settings).map_err(EngineError::store)?;
        sqlx::query(
            r"
            INSERT INTO tenant_settings (tenant_id, settings_json, enabled, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(tenant_id) DO UPDATE SET
                settings_json = excluded.settings_json,
                enabled = excluded.enabled,
                updated_at = excluded.updated_at
            ",
        )
        .bind(tenant_id)
        .bind(json)
        .bind(settings.enabled)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(EngineError::store)?;
        Ok(())
    }

    async fn enabled_tenants(&self) -> Result<Vec<TenantId>, EngineError> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT tenant_id FROM tenant_settings WHERE enabled = 1 ORDER BY tenant_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(EngineError::store)?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn ensure_account(
        &self,
        tenant_id: TenantId,
        initial: Decimal,
    ) -> Result<Decimal, EngineError> {
        sqlx::query(
            "INSERT OR IGNORE INTO accounts (tenant_id, balance_cents, updated_at) VALUES (?1, ?2, ?3)",
        )
        .bind(tenant_id)
        .bind(to_cents(initial)?)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(EngineError::store)?;

        self.balance(tenant_id)
            .await?
            .ok_or_else(|| EngineError::Store(format!("account {tenant_id} missing after insert")))
    }

    async fn balance(&self, tenant_id: TenantId) -> Result<Option<Decimal>, EngineError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT balance_cents FROM accounts WHERE tenant_id = ?1")
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(EngineError::store)?;
        Ok(row.map(|(cents,)| from_cents(cents)))
    }

    async fn count_opened_since(
        &self,
        tenant_id: TenantId,
        since: DateTime<Utc>,
    ) -> Result<u64, EngineError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM positions WHERE tenant_id = ?1 AND source = 'AUTO' AND opened_at >= ?2",
        )
        .bind(tenant_id)
        .bind(since.timestamp())
        .fetch_one(&self.pool)
        .await
        .map_err(EngineError::store)?;
        Ok(to_count(count))
    }

    async fn has_open_position(
        &self,
        tenant_id: TenantId,
        symbol: &str,
    ) -> Result<bool, EngineError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM positions WHERE tenant_id = ?1 AND symbol = ?2 AND status = 'OPEN'",
        )
        .bind(tenant_id)
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await
        .map_err(EngineError::store)?;
        Ok(row.is_some())
    }

    async fn open_position_if_none(&self, new: &NewPosition) -> Result<Position, EngineError> {
        let duplicate = || {
            EngineError::from(InvariantViolation::DuplicateOpenPosition {
                tenant_id: new.tenant_id,
                symbol: new.symbol.clone(),
            })
        };

        let mut tx = self.pool.begin().await.map_err(EngineError::store)?;
        let result = sqlx::query(
            r"
            INSERT INTO positions
                (tenant_id, symbol, direction, entry_price, current_price, stop_loss,
                 take_profit, lots, probability, status, source, opened_at)
            SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'OPEN', 'AUTO', ?10
            WHERE NOT EXISTS (
                SELECT 1 FROM positions
                WHERE tenant_id = ?1 AND symbol = ?2 AND status = 'OPEN'
            )
            ",
        )
        .bind(new.tenant_id)
        .bind(&new.symbol)
        .bind(new.direction.as_str())
        .bind(new.entry_price)
        .bind(new.current_price)
        .bind(new.stop_loss)
        .bind(new.take_profit)
        .bind(new.lots)
        .bind(new.probability)
        .bind(Utc::now().timestamp())
        .execute(&mut *tx)
        .await;

        let result = match result {
            Ok(result) => result,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => return Err(duplicate()),
            Err(e) => return Err(EngineError::store(e)),
        };
        if result.rows_affected() == 0 {
            return Err(duplicate());
        }

        let position = Self::fetch_position(&mut tx, result.last_insert_rowid()).await?;
        tx.commit().await.map_err(EngineError::store)?;
        Ok(position)
    }

    async fn open_positions(&self) -> Result<Vec<Position>, EngineError> {
        let rows = sqlx::query_as::<_, PositionRow>(&format!(
            "SELECT {POSITION_COLUMNS} FROM positions WHERE status = 'OPEN' ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(EngineError::store)?;
        rows.into_iter().map(Position::try_from).collect()
    }

    async fn position(&self, id: PositionId) -> Result<Option<Position>, EngineError> {
        let row = sqlx::query_as::<_, PositionRow>(&format!(
            "SELECT {POSITION_COLUMNS} FROM positions WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(EngineError::store)?;
        row.map(Position::try_from).transpose()
    }

    async fn update_current_price(&self, id: PositionId, price: f64) -> Result<bool, EngineError> {
        let result =
            sqlx::query("UPDATE positions SET current_price = ?2 WHERE id = ?1 AND status = 'OPEN'")
                .bind(id)
                .bind(price)
                .execute(&self.pool)
                .await
                .map_err(EngineError::store)?;
        Ok(result.rows_affected() == 1)
    }

    async fn close_position(&self, request: &CloseRequest) -> Result<ClosedPosition, EngineError> {
        let now = Utc::now().timestamp();
        let pnl_cents = to_cents(request.realized_pnl)?;

        let mut tx = self.pool.begin().await.map_err(EngineError::store)?;
        let result = sqlx::query(
            r"
            UPDATE positions
            SET status = 'CLOSED',
                current_price = ?3,
                exit_price = ?3,
                exit_reason = ?4,
                realized_pnl_cents = ?5,
                is_direction_correct = ?6,
                closed_at = ?7
            WHERE id = ?1 AND tenant_id = ?2 AND status = 'OPEN'
            ",
        )
        .bind(request.position_id)
        .bind(request.tenant_id)
        .bind(request.exit_price)
        .bind(request.exit_reason.as_str())
        .bind(pnl_cents)
        .bind(request.is_direction_correct)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(EngineError::store)?;

        if result.rows_affected() == 0 {
            let owner: Option<(i64,)> =
                sqlx::query_as("SELECT tenant_id FROM positions WHERE id = ?1")
                    .bind(request.position_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(EngineError::store)?;
            tx.rollback().await.map_err(EngineError::store)?;
            let violation = match owner {
                Some((owner,)) if owner != request.tenant_id => {
                    InvariantViolation::ForeignPosition {
                        position_id: request.position_id,
                        tenant_id: request.tenant_id,
                    }
                }
                _ => InvariantViolation::PositionNotOpen {
                    position_id: request.position_id,
                },
            };
            return Err(violation.into());
        }

        let new_balance = self
            .apply_pnl(&mut tx, request.tenant_id, pnl_cents, now)
            .await?;
        let position = Self::fetch_position(&mut tx, request.position_id).await?;
        tx.commit().await.map_err(EngineError::store)?;

        Ok(ClosedPosition {
            position,
            new_balance,
        })
    }

    async fn record_manual_trade(&self, trade: &ManualTrade) -> Result<Position, EngineError> {
        let now = Utc::now().timestamp();
        let pnl_cents = to_cents(trade.realized_pnl)?;

        let mut tx = self.pool.begin().await.map_err(EngineError::store)?;
        let result = sqlx::query(
            r"
            INSERT INTO positions
                (tenant_id, symbol, direction, entry_price, current_price, stop_loss,
                 take_profit, lots, status, exit_price, exit_reason, realized_pnl_cents,
                 is_direction_correct, source, opened_at, closed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'CLOSED', ?5, 'MANUAL', ?9, ?10, 'MANUAL', ?11, ?11)
            ",
        )
        .bind(trade.tenant_id)
        .bind(&trade.symbol)
        .bind(trade.direction.as_str())
        .bind(trade.entry_price)
        .bind(trade.exit_price)
        .bind(trade.stop_loss)
        .bind(trade.take_profit)
        .bind(trade.lots)
        .bind(pnl_cents)
        .bind(correctness_from_pnl(trade.realized_pnl))
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(EngineError::store)?;

        self.apply_pnl(&mut tx, trade.tenant_id, pnl_cents, now)
            .await?;
        let position = Self::fetch_position(&mut tx, result.last_insert_rowid()).await?;
        tx.commit().await.map_err(EngineError::store)?;
        Ok(position)
    }

    async fn append_log(
        &self,
        tenant_id: TenantId,
        action: &LogAction,
        symbol: Option<&str>,
        details: Option<&str>,
    ) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO execution_logs (tenant_id, action, symbol, details, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(tenant_id)
        .bind(action.as_string())
        .bind(symbol)
        .bind(details)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(EngineError::store)?;
        Ok(())
    }

    async fn recent_logs(
        &self,
        tenant_id: TenantId,
        limit: u32,
    ) -> Result<Vec<ExecutionLogEntry>, EngineError> {
        let rows = sqlx::query_as::<_, LogRow>(
            r"
            SELECT id, tenant_id, action, symbol, details, created_at
            FROM execution_logs
            WHERE tenant_id = ?1
            ORDER BY created_at DESC, id DESC
            LIMIT ?2
            ",
        )
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(EngineError::store)?;
        Ok(rows.into_iter().map(ExecutionLogEntry::from).collect())
    }

    async fn recent_positions(
        &self,
        tenant_id: TenantId,
        limit: u32,
    ) -> Result<Vec<Position>, EngineError> {
        let rows = sqlx::query_as::<_, PositionRow>(&format!(
            "SELECT {POSITION_COLUMNS} FROM positions WHERE tenant_id = ?1 \
             ORDER BY opened_at DESC, id DESC LIMIT ?2"
        ))
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(EngineError::store)?;
        rows.into_iter().map(Position::try_from).collect()
    }

    async fn tenant_stats(
        &self,
        tenant_id: TenantId,
        today_start: DateTime<Utc>,
    ) -> Result<TenantStats, EngineError> {
        #[allow(clippy::type_complexity)]
        let row: (i64, i64, i64, i64, i64, i64, i64, i64, i64, i64) = sqlx::query_as(
            r"
            SELECT
                COUNT(*),
                COALESCE(SUM(status = 'CLOSED'), 0),
                COALESCE(SUM(status = 'OPEN'), 0),
                COALESCE(SUM(opened_at >= ?2), 0),
                COALESCE(SUM(status = 'CLOSED' AND is_direction_correct = 1), 0),
                COALESCE(SUM(status = 'CLOSED' AND is_direction_correct = 0), 0),
                COALESCE(SUM(status = 'CLOSED' AND realized_pnl_cents > 0), 0),
                COALESCE(SUM(CASE WHEN status = 'CLOSED' THEN realized_pnl_cents ELSE 0 END), 0),
                COALESCE(SUM(exit_reason = 'TP_HIT'), 0),
                COALESCE(SUM(exit_reason = 'SL_HIT'), 0)
            FROM positions
            WHERE tenant_id = ?1
            ",
        )
        .bind(tenant_id)
        .bind(today_start.timestamp())
        .fetch_one(&self.pool)
        .await
        .map_err(EngineError::store)?;

        let (total, closed, open, today, correct, wrong, profitable, pnl, tp, sl) = row;
        Ok(TenantStats {
            total_trades: to_count(total),
            closed_trades: to_count(closed),
            open_trades: to_count(open),
            today_trades: to_count(today),
            correct_predictions: to_count(correct),
            wrong_predictions: to_count(wrong),
            total_pnl: from_cents(pnl),
            tp_hits: to_count(tp),
            sl_hits: to_count(sl),
            ..TenantStats::default()
        }
        .with_rates(to_count(profitable)))
    }
}
