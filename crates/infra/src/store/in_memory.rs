//! In-memory store for tests and development.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use vendia_core::{DomainError, LedgerEntryId, ProductId, SaleId};
use vendia_ledger::{LedgerEntry, MovementType, NewMovement, Product};
use vendia_sales::{price_cart, Cart, Sale, SriStatus};

use super::{
    apply_sri_update_to, KardexQuery, PosStore, SaleFilter, SriUpdate, StoreError,
};

#[derive(Debug, Default)]
struct Inner {
    products: HashMap<ProductId, Product>,
    sales: HashMap<SaleId, Sale>,
    /// Append-only, insertion order == chronological order.
    entries: Vec<LedgerEntry>,
    /// When each sale's invoice state last changed; drives the sweeper cutoff.
    sri_touched: HashMap<SaleId, DateTime<Utc>>,
}

/// In-memory [`PosStore`].
///
/// Commit atomicity falls out of the single write lock: a commit either
/// mutates everything before releasing it or returns early having mutated
/// nothing. Validation and entry construction run against snapshots first,
/// so a mid-cart rejection cannot leave partial state behind.
#[derive(Debug, Default)]
pub struct InMemoryPosStore {
    inner: RwLock<Inner>,
}

impl InMemoryPosStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl PosStore for InMemoryPosStore {
    async fn upsert_product(&self, product: Product) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(StoreError::storage)?;
        inner.products.insert(product.id, product);
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let inner = self.inner.read().map_err(StoreError::storage)?;
        Ok(inner.products.get(&id).cloned())
    }

    async fn commit_sale(&self, cart: &Cart) -> Result<Sale, StoreError> {
        let mut inner = self.inner.write().map_err(StoreError::storage)?;
        let now = Utc::now();

        let snapshot: HashMap<ProductId, Product> = cart
            .items
            .iter()
            .filter_map(|item| inner.products.get(&item.product_id).map(|p| (p.id, p.clone())))
            .collect();

        let priced = price_cart(cart, &snapshot)?;
        let sale = Sale::from_priced(priced, SaleId::new(), now);

        // Build every entry against a working copy before touching shared
        // state; the first InsufficientStock aborts the whole cart.
        let mut working = snapshot;
        let mut entries = Vec::with_capacity(sale.items.len());
        for item in &sale.items {
            let product = working
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

        for (id, product) in working {
            inner.products.insert(id, product);
        }
        inner.entries.extend(entries);
        inner.sri_touched.insert(sale.id, now);
        inner.sales.insert(sale.id, sale.clone());
        Ok(sale)
    }

    async fn record_movement(
        &self,
        product_id: ProductId,
        movement: NewMovement,
    ) -> Result<LedgerEntry, StoreError> {
        let mut inner = self.inner.write().map_err(StoreError::storage)?;
        let product = inner
            .products
            .get(&product_id)
            .ok_or(DomainError::NotFound)?;

        let entry = LedgerEntry::build(product, movement, Utc::now())?;
        if let Some(product) = inner.products.get_mut(&product_id) {
            product.stock = entry.stock_after;
        }
        inner.entries.push(entry.clone());
        Ok(entry)
    }

    async fn get_sale(&self, id: SaleId) -> Result<Option<Sale>, StoreError> {
        let inner = self.inner.read().map_err(StoreError::storage)?;
        Ok(inner.sales.get(&id).cloned())
    }

    async fn list_sales(&self, filter: &SaleFilter) -> Result<Vec<Sale>, StoreError> {
        let inner = self.inner.read().map_err(StoreError::storage)?;
        let page = filter.pagination.clamped();

        let mut sales: Vec<Sale> = inner
            .sales
            .values()
            .filter(|s| filter.customer_id.is_none_or(|c| s.customer_id == c))
            .filter(|s| filter.estado_sri.is_none_or(|e| s.estado_sri == e))
            .filter(|s| filter.from.is_none_or(|f| s.created_at >= f))
            .filter(|s| filter.to.is_none_or(|t| s.created_at <= t))
            .cloned()
            .collect();
        sales.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(sales
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect())
    }

    async fn sales_processing_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Sale>, StoreError> {
        let inner = self.inner.read().map_err(StoreError::storage)?;
        let mut stuck: Vec<Sale> = inner
            .sales
            .values()
            .filter(|s| s.estado_sri == SriStatus::Processing)
            .filter(|s| {
                inner
                    .sri_touched
                    .get(&s.id)
                    .is_none_or(|touched| *touched <= cutoff)
            })
            .cloned()
            .collect();
        stuck.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        stuck.truncate(limit.max(0) as usize);
        Ok(stuck)
    }

    async fn apply_sri_update(
        &self,
        sale_id: SaleId,
        update: SriUpdate,
    ) -> Result<Sale, StoreError> {
        let mut inner = self.inner.write().map_err(StoreError::storage)?;
        let sale = inner.sales.get_mut(&sale_id).ok_or(DomainError::NotFound)?;
        apply_sri_update_to(sale, &update);
        let snapshot = sale.clone();
        inner.sri_touched.insert(sale_id, Utc::now());
        Ok(snapshot)
    }

    async fn kardex(&self, query: &KardexQuery) -> Result<Vec<LedgerEntry>, StoreError> {
        let inner = self.inner.read().map_err(StoreError::storage)?;
        let page = query.pagination.clamped();

        let entries: Vec<LedgerEntry> = inner
            .entries
            .iter()
            .filter(|e| query.product_id.is_none_or(|p| e.product_id == p))
            .filter(|e| query.movement.is_none_or(|m| e.movement == m))
            .filter(|e| query.from.is_none_or(|f| e.created_at >= f))
            .filter(|e| query.to.is_none_or(|t| e.created_at <= t))
            .cloned()
            .collect();

        Ok(entries
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect())
    }

    async fn kardex_latest(&self, limit: i64) -> Result<Vec<LedgerEntry>, StoreError> {
        let inner = self.inner.read().map_err(StoreError::storage)?;
        Ok(inner
            .entries
            .iter()
            .rev()
            .take(limit.clamp(1, 500) as usize)
            .cloned()
            .collect())
    }

    async fn get_entry(&self, id: LedgerEntryId) -> Result<Option<LedgerEntry>, StoreError> {
        let inner = self.inner.read().map_err(StoreError::storage)?;
        Ok(inner.entries.iter().find(|e| e.id == id).cloned())
    }

    async fn products_for(
        &self,
        ids: &[ProductId],
    ) -> Result<HashMap<ProductId, Product>, StoreError> {
        let inner = self.inner.read().map_err(StoreError::storage)?;
        Ok(ids
            .iter()
            .filter_map(|id| inner.products.get(id).map(|p| (*id, p.clone())))
            .collect())
    }
}
