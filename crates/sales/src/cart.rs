use serde::{Deserialize, Serialize};

use vendia_core::{Cents, CustomerId, ProductId, UserId};

/// One line the POS terminal wants to sell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub quantity: i64,
    /// Price per unit as quoted at the terminal, in cents.
    pub unit_price: Cents,
}

/// How the customer paid.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Digital,
}

impl PaymentMethod {
    /// External payment code required by the fiscal payload.
    ///
    /// Total match: a new method cannot ship without a code.
    pub fn external_code(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "01",
            PaymentMethod::Card => "19",
            PaymentMethod::Digital => "20",
        }
    }
}

/// A payment allocation against the sale total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub method: PaymentMethod,
    pub amount: Cents,
}

/// Everything the POS terminal submits for one sale attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub customer_id: CustomerId,
    pub user_id: UserId,
    pub items: Vec<CartItem>,
    pub payments: Vec<Payment>,
    /// Whole-sale discount in cents.
    #[serde(default)]
    pub discount: Cents,
    /// When false the sale stays at `NO_ELECTRONIC` and never reaches the
    /// authority.
    #[serde(default = "default_electronic")]
    pub electronic: bool,
}

fn default_electronic() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_codes_are_stable() {
        assert_eq!(PaymentMethod::Cash.external_code(), "01");
        assert_eq!(PaymentMethod::Card.external_code(), "19");
        assert_eq!(PaymentMethod::Digital.external_code(), "20");
    }

    #[test]
    fn cart_defaults_to_electronic() {
        let json = serde_json::json!({
            "customer_id": uuid::Uuid::now_v7(),
            "user_id": uuid::Uuid::now_v7(),
            "items": [],
            "payments": [],
        });
        let cart: Cart = serde_json::from_value(json).unwrap();
        assert!(cart.electronic);
        assert_eq!(cart.discount, 0);
    }
}
