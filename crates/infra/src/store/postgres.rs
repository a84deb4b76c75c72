//! Postgres-backed store.
//!
//! Atomicity and per-product serialization come from the database: every
//! write path runs in a transaction and locks the touched product rows with
//! `SELECT ... FOR UPDATE` (ordered by id, so concurrent multi-product carts
//! cannot deadlock). Two commits racing for the last unit therefore
//! serialize, and the loser is rejected by the same domain check the
//! in-memory store uses.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use vendia_core::{DomainError, LedgerEntryId, ProductId, SaleId};
use vendia_ledger::{LedgerEntry, MovementType, NewMovement, Product};
use vendia_sales::{price_cart, Cart, Sale, SriStatus};

use super::{
    apply_sri_update_to, KardexQuery, PosStore, SaleFilter, SriUpdate, StoreError,
};

/// Postgres [`PosStore`].
#[derive(Debug, Clone)]
pub struct PostgresPosStore {
    pool: Arc<PgPool>,
}

impl PostgresPosStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Run the embedded migrations. Call once at startup.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&*self.pool)
            .await
            .map_err(StoreError::storage)
    }
}

const SALE_COLUMNS: &str = "id, customer_id, user_id, created_at, items, payments, \
     subtotal, discount, tax_amount, total, change, estado_sri, clave_acceso, \
     comprobante_id, pdf_voucher, sri_message";

const ENTRY_COLUMNS: &str = "id, product_id, actor_id, movement, quantity, unit_cost, \
     subtotal, tax_rate_bp, tax_amount, total, stock_before, stock_after, reason, created_at";

#[async_trait]
impl PosStore for PostgresPosStore {
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    async fn upsert_product(&self, product: Product) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO products (id, stock, unit_price, tax_rate_bp)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET stock = EXCLUDED.stock,
                unit_price = EXCLUDED.unit_price,
                tax_rate_bp = EXCLUDED.tax_rate_bp
            "#,
        )
        .bind(Uuid::from(product.id))
        .bind(product.stock)
        .bind(product.unit_price)
        .bind(i32::from(product.tax_rate_bp))
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query("SELECT id, stock, unit_price, tax_rate_bp FROM products WHERE id = $1")
            .bind(Uuid::from(id))
            .fetch_optional(&*self.pool)
            .await?;
        row.map(|r| product_from_row(&r)).transpose()
    }

    #[instrument(skip(self, cart), fields(items = cart.items.len()))]
    async fn commit_sale(&self, cart: &Cart) -> Result<Sale, StoreError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let mut ids: Vec<Uuid> = cart
            .items
            .iter()
            .map(|item| Uuid::from(item.product_id))
            .collect();
        ids.sort();
        ids.dedup();

        // Lock the product rows in id order; every concurrent commit takes
        // its locks in the same order.
        let rows = sqlx::query(
            "SELECT id, stock, unit_price, tax_rate_bp FROM products \
             WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        )
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await?;

        let mut products = HashMap::with_capacity(rows.len());
        for row in &rows {
            let product = product_from_row(row)?;
            products.insert(product.id, product);
        }

        let priced = price_cart(cart, &products)?;
        let sale = Sale::from_priced(priced, SaleId::new(), now);

        let mut entries = Vec::with_capacity(sale.items.len());
        for item in &sale.items {
            let product = products
                .get_mut(&item.product_id)
                .ok_or_else(|| DomainError::validation(format!("unknown product {}", item.product_id)))?;
            let entry = LedgerEntry::build(
                product,
                NewMovement {
                    movement: MovementType::Sale,
                    quantity: item.quantity,
                    unit_cost: item.unit_price,
                    reason: format!("sale {}", sale.id),
                    actor_id: sale.user_id,
                },
                now,
            )?;
            product.stock = entry.stock_after;
            entries.push(entry);
        }

        insert_sale(&mut tx, &sale).await?;
        for entry in &entries {
            insert_entry(&mut tx, entry).await?;
        }
        for product in products.values() {
            sqlx::query("UPDATE products SET stock = $2 WHERE id = $1")
                .bind(Uuid::from(product.id))
                .bind(product.stock)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(sale)
    }

    #[instrument(skip(self, movement), fields(product_id = %product_id, movement = movement.movement.as_str()))]
    async fn record_movement(
        &self,
        product_id: ProductId,
        movement: NewMovement,
    ) -> Result<LedgerEntry, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT id, stock, unit_price, tax_rate_bp FROM products WHERE id = $1 FOR UPDATE",
        )
        .bind(Uuid::from(product_id))
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DomainError::NotFound)?;
        let product = product_from_row(&row)?;

        let entry = LedgerEntry::build(&product, movement, Utc::now())?;

        insert_entry(&mut tx, &entry).await?;
        sqlx::query("UPDATE products SET stock = $2 WHERE id = $1")
            .bind(Uuid::from(product_id))
            .bind(entry.stock_after)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(entry)
    }

    async fn get_sale(&self, id: SaleId) -> Result<Option<Sale>, StoreError> {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(Uuid::from(id))
            .fetch_optional(&*self.pool)
            .await?;
        row.map(|r| sale_from_row(&r)).transpose()
    }

    async fn list_sales(&self, filter: &SaleFilter) -> Result<Vec<Sale>, StoreError> {
        let page = filter.pagination.clamped();
        let sql = format!(
            r#"
            SELECT {SALE_COLUMNS} FROM sales
            WHERE ($1::uuid IS NULL OR customer_id = $1)
              AND ($2::text IS NULL OR estado_sri = $2)
              AND ($3::timestamptz IS NULL OR created_at >= $3)
              AND ($4::timestamptz IS NULL OR created_at <= $4)
            ORDER BY created_at DESC
            LIMIT $5 OFFSET $6
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(filter.customer_id.map(Uuid::from))
            .bind(filter.estado_sri.map(SriStatus::as_str))
            .bind(filter.from)
            .bind(filter.to)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&*self.pool)
            .await?;
        rows.iter().map(sale_from_row).collect()
    }

    async fn sales_processing_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Sale>, StoreError> {
        let sql = format!(
            r#"
            SELECT {SALE_COLUMNS} FROM sales
            WHERE estado_sri = 'PROCESSING' AND sri_updated_at <= $1
            ORDER BY created_at ASC
            LIMIT $2
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(cutoff)
            .bind(limit.max(0))
            .fetch_all(&*self.pool)
            .await?;
        rows.iter().map(sale_from_row).collect()
    }

    #[instrument(skip(self, update), fields(sale_id = %sale_id))]
    async fn apply_sri_update(
        &self,
        sale_id: SaleId,
        update: SriUpdate,
    ) -> Result<Sale, StoreError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(Uuid::from(sale_id))
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(DomainError::NotFound)?;
        let mut sale = sale_from_row(&row)?;

        apply_sri_update_to(&mut sale, &update);

        sqlx::query(
            r#"
            UPDATE sales
            SET estado_sri = $2, clave_acceso = $3, comprobante_id = $4,
                pdf_voucher = $5, sri_message = $6, sri_updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(sale_id))
        .bind(sale.estado_sri.as_str())
        .bind(sale.clave_acceso.as_deref())
        .bind(sale.comprobante_id.as_deref())
        .bind(sale.pdf_voucher.as_deref())
        .bind(sale.sri_message.as_deref())
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(sale)
    }

    async fn kardex(&self, query: &KardexQuery) -> Result<Vec<LedgerEntry>, StoreError> {
        let page = query.pagination.clamped();
        let sql = format!(
            r#"
            SELECT {ENTRY_COLUMNS} FROM ledger_entries
            WHERE ($1::uuid IS NULL OR product_id = $1)
              AND ($2::text IS NULL OR movement = $2)
              AND ($3::timestamptz IS NULL OR created_at >= $3)
              AND ($4::timestamptz IS NULL OR created_at <= $4)
            ORDER BY created_at ASC
            LIMIT $5 OFFSET $6
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(query.product_id.map(Uuid::from))
            .bind(query.movement.map(MovementType::as_str))
            .bind(query.from)
            .bind(query.to)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&*self.pool)
            .await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn kardex_latest(&self, limit: i64) -> Result<Vec<LedgerEntry>, StoreError> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries ORDER BY created_at DESC LIMIT $1"
        );
        let rows = sqlx::query(&sql)
            .bind(limit.clamp(1, 500))
            .fetch_all(&*self.pool)
            .await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn get_entry(&self, id: LedgerEntryId) -> Result<Option<LedgerEntry>, StoreError> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(Uuid::from(id))
            .fetch_optional(&*self.pool)
            .await?;
        row.map(|r| entry_from_row(&r)).transpose()
    }

    async fn products_for(
        &self,
        ids: &[ProductId],
    ) -> Result<HashMap<ProductId, Product>, StoreError> {
        let uuids: Vec<Uuid> = ids.iter().copied().map(Uuid::from).collect();
        let rows = sqlx::query(
            "SELECT id, stock, unit_price, tax_rate_bp FROM products WHERE id = ANY($1)",
        )
        .bind(&uuids)
        .fetch_all(&*self.pool)
        .await?;
        rows.iter()
            .map(|row| product_from_row(row).map(|p| (p.id, p)))
            .collect()
    }
}

async fn insert_sale(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    sale: &Sale,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO sales (id, customer_id, user_id, created_at, items, payments,
            subtotal, discount, tax_amount, total, change, estado_sri, clave_acceso,
            comprobante_id, pdf_voucher, sri_message, sri_updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        "#,
    )
    .bind(Uuid::from(sale.id))
    .bind(Uuid::from(sale.customer_id))
    .bind(Uuid::from(sale.user_id))
    .bind(sale.created_at)
    .bind(serde_json::to_value(&sale.items).map_err(StoreError::storage)?)
    .bind(serde_json::to_value(&sale.payments).map_err(StoreError::storage)?)
    .bind(sale.subtotal)
    .bind(sale.discount)
    .bind(sale.tax_amount)
    .bind(sale.total)
    .bind(sale.change)
    .bind(sale.estado_sri.as_str())
    .bind(sale.clave_acceso.as_deref())
    .bind(sale.comprobante_id.as_deref())
    .bind(sale.pdf_voucher.as_deref())
    .bind(sale.sri_message.as_deref())
    .bind(sale.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_entry(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    entry: &LedgerEntry,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO ledger_entries (id, product_id, actor_id, movement, quantity,
            unit_cost, subtotal, tax_rate_bp, tax_amount, total, stock_before,
            stock_after, reason, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(Uuid::from(entry.id))
    .bind(Uuid::from(entry.product_id))
    .bind(Uuid::from(entry.actor_id))
    .bind(entry.movement.as_str())
    .bind(entry.quantity)
    .bind(entry.unit_cost)
    .bind(entry.subtotal)
    .bind(i32::from(entry.tax_rate_bp))
    .bind(entry.tax_amount)
    .bind(entry.total)
    .bind(entry.stock_before)
    .bind(entry.stock_after)
    .bind(&entry.reason)
    .bind(entry.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    Ok(Product {
        id: ProductId::from_uuid(row.try_get("id")?),
        stock: row.try_get("stock")?,
        unit_price: row.try_get("unit_price")?,
        tax_rate_bp: decode_tax_rate(row.try_get("tax_rate_bp")?)?,
    })
}

fn sale_from_row(row: &PgRow) -> Result<Sale, StoreError> {
    let items: serde_json::Value = row.try_get("items")?;
    let payments: serde_json::Value = row.try_get("payments")?;
    let estado: String = row.try_get("estado_sri")?;

    Ok(Sale {
        id: SaleId::from_uuid(row.try_get("id")?),
        customer_id: vendia_core::CustomerId::from_uuid(row.try_get("customer_id")?),
        user_id: vendia_core::UserId::from_uuid(row.try_get("user_id")?),
        created_at: row.try_get("created_at")?,
        items: serde_json::from_value(items).map_err(StoreError::storage)?,
        payments: serde_json::from_value(payments).map_err(StoreError::storage)?,
        subtotal: row.try_get("subtotal")?,
        discount: row.try_get("discount")?,
        tax_amount: row.try_get("tax_amount")?,
        total: row.try_get("total")?,
        change: row.try_get("change")?,
        estado_sri: SriStatus::parse(&estado)
            .ok_or_else(|| StoreError::storage(format!("unknown estado_sri '{estado}'")))?,
        clave_acceso: row.try_get("clave_acceso")?,
        comprobante_id: row.try_get("comprobante_id")?,
        pdf_voucher: row.try_get("pdf_voucher")?,
        sri_message: row.try_get("sri_message")?,
    })
}

fn entry_from_row(row: &PgRow) -> Result<LedgerEntry, StoreError> {
    let movement: String = row.try_get("movement")?;

    Ok(LedgerEntry {
        id: LedgerEntryId::from_uuid(row.try_get("id")?),
        product_id: ProductId::from_uuid(row.try_get("product_id")?),
        actor_id: vendia_core::UserId::from_uuid(row.try_get("actor_id")?),
        movement: MovementType::parse(&movement)
            .ok_or_else(|| StoreError::storage(format!("unknown movement '{movement}'")))?,
        quantity: row.try_get("quantity")?,
        unit_cost: row.try_get("unit_cost")?,
        subtotal: row.try_get("subtotal")?,
        tax_rate_bp: decode_tax_rate(row.try_get("tax_rate_bp")?)?,
        tax_amount: row.try_get("tax_amount")?,
        total: row.try_get("total")?,
        stock_before: row.try_get("stock_before")?,
        stock_after: row.try_get("stock_after")?,
        reason: row.try_get("reason")?,
        created_at: row.try_get("created_at")?,
    })
}

fn decode_tax_rate(raw: i32) -> Result<u16, StoreError> {
    u16::try_from(raw).map_err(|_| StoreError::storage(format!("tax_rate_bp {raw} out of range")))
}
