use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vendia_core::{money, BasisPoints, Cents, DomainError, DomainResult, LedgerEntryId, ProductId, UserId};

use crate::movement::MovementType;
use crate::product::Product;

/// A movement to be recorded against a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMovement {
    pub movement: MovementType,
    /// Positive magnitude; the sign comes from the movement type.
    pub quantity: i64,
    /// Cost (or price, for sales) per unit in cents.
    pub unit_cost: Cents,
    pub reason: String,
    pub actor_id: UserId,
}

/// One immutable line of the stock ledger.
///
/// Created exactly once, inside the same transaction that updates the
/// product's stock column. Never updated or deleted; corrections are new
/// compensating entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub product_id: ProductId,
    pub actor_id: UserId,
    pub movement: MovementType,
    pub quantity: i64,
    pub unit_cost: Cents,
    pub subtotal: Cents,
    pub tax_rate_bp: BasisPoints,
    pub tax_amount: Cents,
    pub total: Cents,
    pub stock_before: i64,
    pub stock_after: i64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Compute a ledger entry from a product snapshot and a movement.
    ///
    /// Pure: validates the movement, applies the sign table to derive
    /// `stock_before`/`stock_after`, and prices the line using the
    /// product's tax rate. A movement that would drive stock negative is
    /// rejected with `InsufficientStock`, never clamped.
    pub fn build(
        product: &Product,
        mv: NewMovement,
        created_at: DateTime<Utc>,
    ) -> DomainResult<LedgerEntry> {
        if mv.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if mv.unit_cost < 0 {
            return Err(DomainError::validation("unit_cost cannot be negative"));
        }

        let stock_before = product.stock;
        let stock_after = stock_before
            .checked_add(mv.movement.signed(mv.quantity))
            .ok_or_else(|| DomainError::validation("quantity overflows stock"))?;
        if stock_after < 0 {
            return Err(DomainError::insufficient_stock(
                product.id,
                mv.quantity,
                stock_before,
            ));
        }

        let subtotal = money::line_subtotal(mv.quantity, mv.unit_cost);
        let tax_amount = money::tax_amount(subtotal, product.tax_rate_bp);

        Ok(LedgerEntry {
            id: LedgerEntryId::new(),
            product_id: product.id,
            actor_id: mv.actor_id,
            movement: mv.movement,
            quantity: mv.quantity,
            unit_cost: mv.unit_cost,
            subtotal,
            tax_rate_bp: product.tax_rate_bp,
            tax_amount,
            total: subtotal + tax_amount,
            stock_before,
            stock_after,
            reason: mv.reason,
            created_at,
        })
    }

    /// Signed stock delta this entry applied.
    pub fn signed_quantity(&self) -> i64 {
        self.movement.signed(self.quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn product(stock: i64) -> Product {
        Product::new(ProductId::new(), stock, 250, 1500)
    }

    fn movement(movement: MovementType, quantity: i64) -> NewMovement {
        NewMovement {
            movement,
            quantity,
            unit_cost: 250,
            reason: "test".to_string(),
            actor_id: UserId::new(),
        }
    }

    #[test]
    fn inbound_movement_raises_stock() {
        let entry = LedgerEntry::build(
            &product(10),
            movement(MovementType::Purchase, 4),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(entry.stock_before, 10);
        assert_eq!(entry.stock_after, 14);
    }

    #[test]
    fn outbound_movement_lowers_stock() {
        let entry =
            LedgerEntry::build(&product(10), movement(MovementType::Sale, 4), Utc::now()).unwrap();
        assert_eq!(entry.stock_after, 6);
        assert_eq!(entry.signed_quantity(), -4);
    }

    #[test]
    fn negative_stock_is_rejected_not_clamped() {
        let p = product(3);
        let err = LedgerEntry::build(&p, movement(MovementType::Sale, 5), Utc::now()).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientStock {
                product_id: p.id,
                requested: 5,
                available: 3,
            }
        );
    }

    #[test]
    fn draining_to_exactly_zero_is_allowed() {
        let entry =
            LedgerEntry::build(&product(5), movement(MovementType::Expired, 5), Utc::now())
                .unwrap();
        assert_eq!(entry.stock_after, 0);
    }

    #[test]
    fn zero_and_negative_quantities_are_invalid() {
        for q in [0, -1] {
            let err = LedgerEntry::build(&product(5), movement(MovementType::Purchase, q), Utc::now())
                .unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
    }

    #[test]
    fn absurd_quantities_are_rejected_not_wrapped() {
        let err = LedgerEntry::build(
            &product(1),
            movement(MovementType::Purchase, i64::MAX),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn totals_follow_the_product_tax_rate() {
        // 4 × 250c = 1000c, 15% tax = 150c
        let entry =
            LedgerEntry::build(&product(10), movement(MovementType::Sale, 4), Utc::now()).unwrap();
        assert_eq!(entry.subtotal, 1000);
        assert_eq!(entry.tax_amount, 150);
        assert_eq!(entry.total, 1150);
    }

    fn arb_movement() -> impl Strategy<Value = (MovementType, i64)> {
        (0usize..MovementType::ALL.len(), 1i64..20).prop_map(|(i, q)| (MovementType::ALL[i], q))
    }

    proptest! {
        /// Replaying accepted entries always reconstructs the stock column,
        /// and every accepted entry keeps the stock arithmetic consistent.
        #[test]
        fn ledger_and_stock_agree(moves in proptest::collection::vec(arb_movement(), 0..40)) {
            let mut p = product(10);
            let mut accepted: Vec<LedgerEntry> = Vec::new();

            for (movement_type, quantity) in moves {
                let mv = movement(movement_type, quantity);
                match LedgerEntry::build(&p, mv, Utc::now()) {
                    Ok(entry) => {
                        prop_assert_eq!(entry.stock_after, entry.stock_before + entry.signed_quantity());
                        prop_assert!(entry.stock_after >= 0);
                        p.stock = entry.stock_after;
                        accepted.push(entry);
                    }
                    Err(DomainError::InsufficientStock { .. }) => {
                        // Rejected movements leave no trace.
                    }
                    Err(e) => return Err(TestCaseError::fail(format!("unexpected error: {e}"))),
                }
            }

            let replayed: i64 = 10 + accepted.iter().map(LedgerEntry::signed_quantity).sum::<i64>();
            prop_assert_eq!(p.stock, replayed);
        }
    }
}
