use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vendia_core::{Cents, CustomerId, ProductId, SaleId};
use vendia_sales::Sale;

/// Fiscal identity of the issuing establishment, injected into every
/// invoice payload. Sourced from configuration; never derived here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Establishment {
    pub company_name: String,
    /// Tax id (RUC).
    pub ruc: String,
    pub address: String,
    /// Establishment code within the RUC (e.g. "001").
    pub establishment_code: String,
    /// Emission point within the establishment (e.g. "001").
    pub emission_point: String,
}

/// One invoice line as the authority wants to see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Cents,
    pub revenue: Cents,
}

/// A payment allocation with its external method code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicePayment {
    pub method_code: String,
    pub amount: Cents,
}

/// The document submitted to the tax authority for one sale.
///
/// Built purely from the committed sale snapshot plus establishment data, so
/// re-building it for a retry always yields the same document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicePayload {
    pub sale_id: SaleId,
    pub issued_at: DateTime<Utc>,
    pub establishment: Establishment,
    pub customer_id: CustomerId,
    pub lines: Vec<InvoiceLine>,
    pub payments: Vec<InvoicePayment>,
    pub subtotal: Cents,
    pub discount: Cents,
    pub tax_amount: Cents,
    pub total: Cents,
}

impl InvoicePayload {
    pub fn from_sale(sale: &Sale, establishment: &Establishment) -> Self {
        InvoicePayload {
            sale_id: sale.id,
            issued_at: sale.created_at,
            establishment: establishment.clone(),
            customer_id: sale.customer_id,
            lines: sale
                .items
                .iter()
                .map(|item| InvoiceLine {
                    product_id: item.product_id,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    revenue: item.revenue,
                })
                .collect(),
            payments: sale
                .payments
                .iter()
                .map(|p| InvoicePayment {
                    method_code: p.method.external_code().to_string(),
                    amount: p.amount,
                })
                .collect(),
            subtotal: sale.subtotal,
            discount: sale.discount,
            tax_amount: sale.tax_amount,
            total: sale.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use vendia_core::UserId;
    use vendia_ledger::Product;
    use vendia_sales::{price_cart, Cart, CartItem, Payment, PaymentMethod};

    fn establishment() -> Establishment {
        Establishment {
            company_name: "Comercial Andina".to_string(),
            ruc: "1790012345001".to_string(),
            address: "Av. Amazonas N24-196".to_string(),
            establishment_code: "001".to_string(),
            emission_point: "001".to_string(),
        }
    }

    fn committed_sale() -> Sale {
        let product_id = ProductId::new();
        let products: HashMap<_, _> = [(product_id, Product::new(product_id, 10, 300, 1500))]
            .into_iter()
            .collect();
        let cart = Cart {
            customer_id: CustomerId::new(),
            user_id: UserId::new(),
            items: vec![CartItem {
                product_id,
                quantity: 2,
                unit_price: 300,
            }],
            payments: vec![Payment {
                method: PaymentMethod::Card,
                amount: 690,
            }],
            discount: 0,
            electronic: true,
        };
        let priced = price_cart(&cart, &products).unwrap();
        Sale::from_priced(priced, SaleId::new(), Utc::now())
    }

    #[test]
    fn payload_mirrors_the_sale_snapshot() {
        let sale = committed_sale();
        let payload = InvoicePayload::from_sale(&sale, &establishment());

        assert_eq!(payload.sale_id, sale.id);
        assert_eq!(payload.total, sale.total);
        assert_eq!(payload.lines.len(), 1);
        assert_eq!(payload.lines[0].revenue, 600);
        assert_eq!(payload.payments[0].method_code, "19");
    }

    #[test]
    fn rebuilding_is_deterministic() {
        let sale = committed_sale();
        let est = establishment();
        assert_eq!(
            InvoicePayload::from_sale(&sale, &est),
            InvoicePayload::from_sale(&sale, &est)
        );
    }
}
