use serde::{Deserialize, Serialize};

use vendia_core::{BasisPoints, Cents, ProductId};

/// Product snapshot as the ledger sees it.
///
/// Products are owned by the catalog side of the system; the ledger only
/// reads price/tax data and is the sole writer of `stock`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    /// Units on hand. Never negative.
    pub stock: i64,
    /// Sale price per unit, in cents.
    pub unit_price: Cents,
    /// Tax rate applied on sale, in basis points.
    pub tax_rate_bp: BasisPoints,
}

impl Product {
    pub fn new(id: ProductId, stock: i64, unit_price: Cents, tax_rate_bp: BasisPoints) -> Self {
        Self {
            id,
            stock,
            unit_price,
            tax_rate_bp,
        }
    }
}
