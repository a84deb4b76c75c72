use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vendia_core::{money, Cents, CustomerId, DomainError, DomainResult, ProductId, SaleId, UserId};
use vendia_ledger::Product;

use crate::cart::{Cart, Payment};
use crate::status::SriStatus;

/// A committed sale line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleItem {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Cents,
    /// quantity × unit_price, before tax and discount.
    pub revenue: Cents,
}

/// A cart that passed validation and pricing, ready to commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedCart {
    pub items: Vec<SaleItem>,
    pub payments: Vec<Payment>,
    pub customer_id: CustomerId,
    pub user_id: UserId,
    pub electronic: bool,
    pub subtotal: Cents,
    pub discount: Cents,
    pub tax_amount: Cents,
    pub total: Cents,
    pub paid: Cents,
    pub change: Cents,
}

/// Validate a cart's structure and price it against product tax rates.
///
/// This is steps 1–2 of the commit algorithm; it persists nothing. Errors:
/// `Validation` for malformed input (including unknown products),
/// `PaymentMismatch` when payments don't cover the computed total.
pub fn price_cart(cart: &Cart, products: &HashMap<ProductId, Product>) -> DomainResult<PricedCart> {
    if cart.items.is_empty() {
        return Err(DomainError::validation("cart has no items"));
    }
    if cart.discount < 0 {
        return Err(DomainError::validation("discount cannot be negative"));
    }

    let mut items = Vec::with_capacity(cart.items.len());
    let mut subtotal: Cents = 0;
    let mut tax_amount: Cents = 0;

    for item in &cart.items {
        if item.quantity <= 0 {
            return Err(DomainError::validation(format!(
                "quantity must be positive for product {}",
                item.product_id
            )));
        }
        if item.unit_price < 0 {
            return Err(DomainError::validation(format!(
                "unit price cannot be negative for product {}",
                item.product_id
            )));
        }
        let product = products.get(&item.product_id).ok_or_else(|| {
            DomainError::validation(format!("unknown product {}", item.product_id))
        })?;

        let revenue = money::line_subtotal(item.quantity, item.unit_price);
        subtotal += revenue;
        tax_amount += money::tax_amount(revenue, product.tax_rate_bp);

        items.push(SaleItem {
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price: item.unit_price,
            revenue,
        });
    }

    let total = subtotal - cart.discount + tax_amount;
    if total < 0 {
        return Err(DomainError::validation("discount exceeds sale value"));
    }

    let paid: Cents = cart.payments.iter().map(|p| p.amount).sum();
    if paid < total {
        return Err(DomainError::PaymentMismatch { total, paid });
    }

    Ok(PricedCart {
        items,
        payments: cart.payments.clone(),
        customer_id: cart.customer_id,
        user_id: cart.user_id,
        electronic: cart.electronic,
        subtotal,
        discount: cart.discount,
        tax_amount,
        total,
        paid,
        change: paid - total,
    })
}

/// A durable, committed sale.
///
/// Created once, atomically, together with its ledger entries. The invoice
/// fields (`estado_sri`, `clave_acceso`, `comprobante_id`, `pdf_voucher`,
/// `sri_message`) are the only mutable part and are owned by the invoice
/// pipeline after commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    pub id: SaleId,
    pub customer_id: CustomerId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub items: Vec<SaleItem>,
    pub payments: Vec<Payment>,
    pub subtotal: Cents,
    pub discount: Cents,
    pub tax_amount: Cents,
    pub total: Cents,
    pub change: Cents,
    pub estado_sri: SriStatus,
    pub clave_acceso: Option<String>,
    pub comprobante_id: Option<String>,
    /// Serialized voucher document, stored once authorized.
    pub pdf_voucher: Option<String>,
    /// Last authority diagnostic (rejection message or retry exhaustion).
    pub sri_message: Option<String>,
}

impl Sale {
    /// Assemble the sale record from a priced cart.
    pub fn from_priced(priced: PricedCart, id: SaleId, created_at: DateTime<Utc>) -> Self {
        let estado_sri = if priced.electronic {
            SriStatus::Processing
        } else {
            SriStatus::NoElectronic
        };

        Sale {
            id,
            customer_id: priced.customer_id,
            user_id: priced.user_id,
            created_at,
            items: priced.items,
            payments: priced.payments,
            subtotal: priced.subtotal,
            discount: priced.discount,
            tax_amount: priced.tax_amount,
            total: priced.total,
            change: priced.change,
            estado_sri,
            clave_acceso: None,
            comprobante_id: None,
            pdf_voucher: None,
            sri_message: None,
        }
    }

    pub fn paid(&self) -> Cents {
        self.payments.iter().map(|p| p.amount).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::{CartItem, PaymentMethod};

    fn catalog(entries: &[(ProductId, i64, Cents, u16)]) -> HashMap<ProductId, Product> {
        entries
            .iter()
            .map(|&(id, stock, price, rate)| (id, Product::new(id, stock, price, rate)))
            .collect()
    }

    fn cart_with(items: Vec<CartItem>, payments: Vec<Payment>) -> Cart {
        Cart {
            customer_id: CustomerId::new(),
            user_id: UserId::new(),
            items,
            payments,
            discount: 0,
            electronic: true,
        }
    }

    fn cash(amount: Cents) -> Payment {
        Payment {
            method: PaymentMethod::Cash,
            amount,
        }
    }

    #[test]
    fn prices_items_and_computes_change() {
        let p = ProductId::new();
        let products = catalog(&[(p, 10, 250, 1500)]);
        // 2 × 250c = 500c, tax 75c, total 575c, paid 600c
        let cart = cart_with(
            vec![CartItem {
                product_id: p,
                quantity: 2,
                unit_price: 250,
            }],
            vec![cash(600)],
        );

        let priced = price_cart(&cart, &products).unwrap();
        assert_eq!(priced.subtotal, 500);
        assert_eq!(priced.tax_amount, 75);
        assert_eq!(priced.total, 575);
        assert_eq!(priced.change, 25);
        assert_eq!(priced.total, priced.subtotal - priced.discount + priced.tax_amount);
    }

    #[test]
    fn underpayment_is_a_payment_mismatch() {
        let p = ProductId::new();
        let products = catalog(&[(p, 10, 5000, 0)]);
        // $50 of items, $40 of payments.
        let cart = cart_with(
            vec![CartItem {
                product_id: p,
                quantity: 1,
                unit_price: 5000,
            }],
            vec![cash(4000)],
        );

        let err = price_cart(&cart, &products).unwrap_err();
        assert_eq!(
            err,
            DomainError::PaymentMismatch {
                total: 5000,
                paid: 4000,
            }
        );
    }

    #[test]
    fn split_payments_are_summed() {
        let p = ProductId::new();
        let products = catalog(&[(p, 10, 1000, 0)]);
        let cart = cart_with(
            vec![CartItem {
                product_id: p,
                quantity: 1,
                unit_price: 1000,
            }],
            vec![
                cash(400),
                Payment {
                    method: PaymentMethod::Card,
                    amount: 600,
                },
            ],
        );

        let priced = price_cart(&cart, &products).unwrap();
        assert_eq!(priced.paid, 1000);
        assert_eq!(priced.change, 0);
    }

    #[test]
    fn empty_cart_is_rejected() {
        let products = catalog(&[]);
        let err = price_cart(&cart_with(vec![], vec![]), &products).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn unknown_product_is_a_validation_error() {
        let products = catalog(&[]);
        let cart = cart_with(
            vec![CartItem {
                product_id: ProductId::new(),
                quantity: 1,
                unit_price: 100,
            }],
            vec![cash(100)],
        );
        assert!(matches!(
            price_cart(&cart, &products).unwrap_err(),
            DomainError::Validation(_)
        ));
    }

    #[test]
    fn discount_enters_the_total_invariant() {
        let p = ProductId::new();
        let products = catalog(&[(p, 10, 1000, 1200)]);
        let mut cart = cart_with(
            vec![CartItem {
                product_id: p,
                quantity: 1,
                unit_price: 1000,
            }],
            vec![cash(2000)],
        );
        cart.discount = 100;

        let priced = price_cart(&cart, &products).unwrap();
        // 1000 − 100 + 120 = 1020
        assert_eq!(priced.total, 1020);
        assert_eq!(priced.change, 980);
    }

    #[test]
    fn non_electronic_sale_lands_terminal() {
        let p = ProductId::new();
        let products = catalog(&[(p, 10, 100, 0)]);
        let mut cart = cart_with(
            vec![CartItem {
                product_id: p,
                quantity: 1,
                unit_price: 100,
            }],
            vec![cash(100)],
        );
        cart.electronic = false;

        let priced = price_cart(&cart, &products).unwrap();
        let sale = Sale::from_priced(priced, SaleId::new(), Utc::now());
        assert_eq!(sale.estado_sri, SriStatus::NoElectronic);
        assert!(sale.estado_sri.is_terminal());
    }
}
