//! Integer money arithmetic.
//!
//! All amounts are carried in the smallest currency unit (cents) and tax
//! rates in basis points, so the pricing invariants hold exactly — no
//! floating point anywhere near a total.

/// Amount in the smallest currency unit (e.g. cents).
pub type Cents = i64;

/// Tax rate in basis points (1500 = 15%).
pub type BasisPoints = u16;

/// Line subtotal: quantity × unit price.
///
/// Widens through i128 so a pathological cart cannot silently wrap.
pub fn line_subtotal(quantity: i64, unit_price: Cents) -> Cents {
    let wide = quantity as i128 * unit_price as i128;
    wide.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Tax owed on a subtotal at the given rate, rounded half-up.
pub fn tax_amount(subtotal: Cents, rate_bp: BasisPoints) -> Cents {
    let wide = subtotal as i128 * rate_bp as i128;
    ((wide + 5_000) / 10_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tax_rounds_half_up() {
        // 15% of $0.99 = 14.85c -> 15c
        assert_eq!(tax_amount(99, 1500), 15);
        // 15% of $1.00 = 15c exactly
        assert_eq!(tax_amount(100, 1500), 15);
        // 12% of $0.49 = 5.88c -> 6c
        assert_eq!(tax_amount(49, 1200), 6);
    }

    #[test]
    fn zero_rate_is_zero_tax() {
        assert_eq!(tax_amount(10_000, 0), 0);
    }

    #[test]
    fn line_subtotal_multiplies() {
        assert_eq!(line_subtotal(3, 250), 750);
        assert_eq!(line_subtotal(0, 250), 0);
    }
}
