//! # checkout-store
//!
//! Order Persistence Gateway over SQLite.
//!
//! An order is three tables written in one transaction:
//!
//! ```text
//! orders ──< order_items ──< order_item_sides
//! ```
//!
//! `orders.stripe_payment_id` is unique, so a charge can only ever produce one
//! order. `create_order_once` takes the write lock up front (`BEGIN IMMEDIATE`)
//! so its existence check and insert are serialized across connections.

use async_trait::async_trait;
use checkout_core::{
    NewOrder, OrderCreation, OrderId, OrderItem, OrderStore, PaymentError, PaymentResult,
};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS orders (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        phone TEXT NOT NULL,
        email TEXT,
        note TEXT,
        pickup_type TEXT NOT NULL,
        datetime TEXT NOT NULL,
        subtotal INTEGER NOT NULL,
        total INTEGER NOT NULL,
        surcharge_amount INTEGER NOT NULL DEFAULT 0,
        payment_method TEXT NOT NULL,
        stripe_payment_id TEXT NOT NULL UNIQUE,
        payment_status TEXT NOT NULL,
        created_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS order_items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        order_id INTEGER NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
        dish_id TEXT NOT NULL,
        dish_name TEXT NOT NULL,
        dish_price INTEGER NOT NULL,
        quantity INTEGER NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS order_item_sides (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        order_item_id INTEGER NOT NULL REFERENCES order_items(id) ON DELETE CASCADE,
        side_name TEXT NOT NULL,
        side_price INTEGER NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_order_items_order ON order_items(order_id)",
    "CREATE INDEX IF NOT EXISTS idx_order_item_sides_item ON order_item_sides(order_item_id)",
];

/// How long a writer waits for another connection's write lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed order store
#[derive(Debug, Clone)]
pub struct SqlOrderStore {
    pool: SqlitePool,
}

impl SqlOrderStore {
    /// Open a pool for `url` (e.g. `sqlite://orders.db`), creating the file if needed
    pub async fn connect(url: &str, max_connections: u32) -> PaymentResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| PaymentError::Configuration(format!("Invalid DATABASE_URL: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| PaymentError::Configuration(format!("Database connection failed: {}", e)))?;

        info!("Connected to order database");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables and indexes if they do not exist
    pub async fn migrate(&self) -> PaymentResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(persistence)?;
        }
        debug!("Order schema ready");
        Ok(())
    }

    async fn insert_order(
        tx: &mut Transaction<'_, Sqlite>,
        order: &NewOrder,
        items: &[OrderItem],
    ) -> Result<OrderId, sqlx::Error> {
        let order_id = sqlx::query(
            r#"INSERT INTO orders
                (name, phone, email, note, pickup_type, datetime, subtotal, total,
                 surcharge_amount, payment_method, stripe_payment_id, payment_status, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(order.name.trim())
        .bind(order.phone.trim())
        .bind(order.email.as_deref())
        .bind(order.note.as_deref())
        .bind(order.pickup_type.as_str())
        .bind(&order.datetime)
        .bind(order.subtotal)
        .bind(order.total)
        .bind(order.surcharge_amount)
        .bind(order.payment_method.as_str())
        .bind(&order.charge_id)
        .bind(order.payment_status.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&mut **tx)
        .await?
        .last_insert_rowid();

        for item in items {
            let item_id = sqlx::query(
                "INSERT INTO order_items (order_id, dish_id, dish_name, dish_price, quantity) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(order_id)
            .bind(&item.dish_id)
            .bind(&item.name)
            .bind(item.unit_price)
            .bind(item.quantity as i64)
            .execute(&mut **tx)
            .await?
            .last_insert_rowid();

            for side in &item.sides {
                sqlx::query(
                    "INSERT INTO order_item_sides (order_item_id, side_name, side_price) VALUES (?, ?, ?)",
                )
                .bind(item_id)
                .bind(&side.name)
                .bind(side.price)
                .execute(&mut **tx)
                .await?;
            }
        }

        Ok(order_id)
    }

    async fn existing_order(
        tx: &mut Transaction<'_, Sqlite>,
        charge_id: &str,
    ) -> Result<Option<OrderId>, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM orders WHERE stripe_payment_id = ?")
            .bind(charge_id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(row.map(|(id,)| id))
    }
}

fn persistence(e: sqlx::Error) -> PaymentError {
    PaymentError::PersistenceFailed(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

#[async_trait]
impl OrderStore for SqlOrderStore {
    #[instrument(skip(self, order, items), fields(charge_id = %order.charge_id))]
    async fn create_order(&self, order: &NewOrder, items: &[OrderItem]) -> PaymentResult<OrderId> {
        order.validate(items)?;

        // Dropping the transaction on any error path rolls it back
        let mut tx = self.pool.begin().await.map_err(persistence)?;
        let order_id = Self::insert_order(&mut tx, order, items)
            .await
            .map_err(persistence)?;
        tx.commit().await.map_err(persistence)?;

        info!(order_id, items = items.len(), "Order saved");
        Ok(order_id)
    }

    #[instrument(skip(self, order, items), fields(charge_id = %order.charge_id))]
    async fn create_order_once(
        &self,
        order: &NewOrder,
        items: &[OrderItem],
    ) -> PaymentResult<OrderCreation> {
        order.validate(items)?;

        let mut tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(persistence)?;
        if let Some(existing) = Self::existing_order(&mut tx, &order.charge_id)
            .await
            .map_err(persistence)?
        {
            debug!(order_id = existing, "Order already exists for charge");
            return Ok(OrderCreation::Existing(existing));
        }

        match Self::insert_order(&mut tx, order, items).await {
            Ok(order_id) => {
                tx.commit().await.map_err(persistence)?;
                info!(order_id, items = items.len(), "Order saved");
                Ok(OrderCreation::Created(order_id))
            }
            Err(e) if is_unique_violation(&e) => {
                drop(tx);
                warn!("Lost insert race for charge, returning existing order");
                self.find_order_by_charge(&order.charge_id)
                    .await?
                    .map(OrderCreation::Existing)
                    .ok_or_else(|| persistence(e))
            }
            Err(e) => Err(persistence(e)),
        }
    }

    async fn find_order_by_charge(&self, charge_id: &str) -> PaymentResult<Option<OrderId>> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM orders WHERE stripe_payment_id = ?")
            .bind(charge_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(persistence)?;
        Ok(row.map(|(id,)| id))
    }
}
