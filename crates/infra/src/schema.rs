//! Idempotent schema bootstrap: DDL plus forward-only column-add migrations.

use sqlx::{Row, SqlitePool};
use tracing::instrument;

use crate::error::CoreError;

/// Idempotent DDL run on every startup.
///
/// `outbox.lease_owner` / `outbox.lease_expires_at` are intentionally absent
/// here; they arrive via [`COLUMN_MIGRATIONS`].
const DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS events (
        aggregate_id   TEXT    NOT NULL,
        version        INTEGER NOT NULL,
        event_name     TEXT    NOT NULL,
        occurred_at    TEXT    NOT NULL,
        correlation_id TEXT    NOT NULL,
        user_id        TEXT    NOT NULL,
        payload_json   TEXT    NOT NULL,
        PRIMARY KEY (aggregate_id, version)
    )",
    "CREATE TABLE IF NOT EXISTS snapshots (
        aggregate_id   TEXT    PRIMARY KEY,
        correlation_id TEXT    NOT NULL,
        version        INTEGER NOT NULL,
        payload_json   TEXT    NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS outbox (
        id              TEXT    PRIMARY KEY,
        aggregate_id    TEXT    NOT NULL,
        event_name      TEXT    NOT NULL,
        occurred_at     TEXT    NOT NULL,
        payload_json    TEXT    NOT NULL,
        status          TEXT    NOT NULL DEFAULT 'pending',
        attempts        INTEGER NOT NULL DEFAULT 0,
        last_error      TEXT,
        next_attempt_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_outbox_status_due
        ON outbox (status, next_attempt_at)",
    "CREATE TABLE IF NOT EXISTS outbox_dlq (
        id              TEXT    PRIMARY KEY,
        aggregate_id    TEXT    NOT NULL,
        event_name      TEXT    NOT NULL,
        occurred_at     TEXT    NOT NULL,
        payload_json    TEXT    NOT NULL,
        status          TEXT    NOT NULL,
        attempts        INTEGER NOT NULL,
        last_error      TEXT,
        next_attempt_at INTEGER NOT NULL,
        dead_since      TEXT    NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS products (
        aggregate_id   TEXT    PRIMARY KEY,
        correlation_id TEXT    NOT NULL,
        version        INTEGER NOT NULL,
        title          TEXT    NOT NULL,
        description    TEXT    NOT NULL DEFAULT '',
        tags_json      TEXT    NOT NULL DEFAULT '[]',
        images_json    TEXT    NOT NULL DEFAULT '[]',
        status         TEXT    NOT NULL,
        published_at   TEXT,
        created_at     TEXT    NOT NULL,
        updated_at     TEXT    NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_products_status ON products (status)",
    "CREATE TABLE IF NOT EXISTS variants (
        aggregate_id        TEXT    PRIMARY KEY,
        correlation_id      TEXT    NOT NULL,
        version             INTEGER NOT NULL,
        product_id          TEXT    NOT NULL,
        sku                 TEXT    NOT NULL DEFAULT '',
        title               TEXT    NOT NULL DEFAULT '',
        price_cents         INTEGER NOT NULL,
        inventory_quantity  INTEGER NOT NULL,
        options_json        TEXT    NOT NULL DEFAULT '{}',
        images_json         TEXT    NOT NULL DEFAULT '[]',
        kind                TEXT    NOT NULL,
        digital_assets_json TEXT    NOT NULL DEFAULT '[]',
        status              TEXT    NOT NULL,
        published_at        TEXT,
        created_at          TEXT    NOT NULL,
        updated_at          TEXT    NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_variants_status ON variants (status)",
    "CREATE INDEX IF NOT EXISTS idx_variants_product ON variants (product_id)",
    "CREATE TABLE IF NOT EXISTS collections (
        aggregate_id     TEXT    PRIMARY KEY,
        correlation_id   TEXT    NOT NULL,
        version          INTEGER NOT NULL,
        title            TEXT    NOT NULL,
        slug             TEXT    NOT NULL,
        description      TEXT    NOT NULL DEFAULT '',
        product_ids_json TEXT    NOT NULL DEFAULT '[]',
        status           TEXT    NOT NULL,
        published_at     TEXT,
        created_at       TEXT    NOT NULL,
        updated_at       TEXT    NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_collections_status ON collections (status)",
    "CREATE TABLE IF NOT EXISTS schedules (
        aggregate_id   TEXT    PRIMARY KEY,
        correlation_id TEXT    NOT NULL,
        version        INTEGER NOT NULL,
        name           TEXT    NOT NULL,
        entries_json   TEXT    NOT NULL DEFAULT '[]',
        status         TEXT    NOT NULL,
        published_at   TEXT,
        created_at     TEXT    NOT NULL,
        updated_at     TEXT    NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_schedules_status ON schedules (status)",
];

/// A forward-only column addition, applied when the column is missing.
#[derive(Debug, Clone, Copy)]
pub struct ColumnMigration {
    pub table: &'static str,
    pub column: &'static str,
    pub add_statement: &'static str,
}

/// Leasing came after the initial outbox shape shipped; these columns are
/// added to databases created before it.
const COLUMN_MIGRATIONS: &[ColumnMigration] = &[
    ColumnMigration {
        table: "outbox",
        column: "lease_owner",
        add_statement: "ALTER TABLE outbox ADD COLUMN lease_owner TEXT",
    },
    ColumnMigration {
        table: "outbox",
        column: "lease_expires_at",
        add_statement: "ALTER TABLE outbox ADD COLUMN lease_expires_at INTEGER",
    },
];

/// Run the DDL list, then apply any missing column migrations.
///
/// Every statement is idempotent, so repeated startups are no-ops.
#[instrument(skip(pool), err)]
pub async fn apply_schema(pool: &SqlitePool) -> Result<(), CoreError> {
    for ddl in DDL {
        sqlx::query(ddl).execute(pool).await?;
    }

    for migration in COLUMN_MIGRATIONS {
        if !column_exists(pool, migration.table, migration.column).await? {
            tracing::info!(
                table = migration.table,
                column = migration.column,
                "applying column migration"
            );
            sqlx::query(migration.add_statement).execute(pool).await?;
        }
    }

    Ok(())
}

async fn column_exists(pool: &SqlitePool, table: &str, column: &str) -> Result<bool, CoreError> {
    // PRAGMA cannot take bound parameters; table names here come from the
    // static migration list only.
    let rows = sqlx::query(&format!("PRAGMA table_info({table})"))
        .fetch_all(pool)
        .await?;

    for row in rows {
        let name: String = row.try_get("name")?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
