//! Fixed-precision currency arithmetic for the invoice ledger.
//!
//! Every derived currency value is rounded to whole cents independently,
//! never cumulatively, so recomputing from the same inputs is idempotent.

use rust_decimal::{Decimal, RoundingStrategy};

/// Rounds a currency value to the nearest whole cent, half-up with ties
/// away from zero.
pub fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Total for a single line item.
pub fn line_total(quantity: i32, unit_price: Decimal) -> Decimal {
    round_cents(Decimal::from(quantity) * unit_price)
}

/// The derived monetary fields of an invoice.
///
/// Invariants: `total == round(subtotal + tax_amount)` and
/// `amount_due == round(total - amount_paid)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub amount_due: Decimal,
}

/// Recomputes all derived invoice amounts from the full line-item set.
///
/// `tax_amount = round(subtotal * tax_rate_percent / 100)`. Each value is
/// rounded on its own so the computation stays idempotent.
pub fn invoice_totals(
    line_totals: &[Decimal],
    tax_rate_percent: Decimal,
    amount_paid: Decimal,
) -> InvoiceTotals {
    let subtotal = round_cents(line_totals.iter().copied().sum());
    let tax_amount = round_cents(subtotal * tax_rate_percent / Decimal::ONE_HUNDRED);
    let total = round_cents(subtotal + tax_amount);
    let amount_due = round_cents(total - amount_paid);

    InvoiceTotals {
        subtotal,
        tax_amount,
        total,
        amount_due,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rounds_half_up_away_from_zero() {
        assert_eq!(round_cents(dec!(1.005)), dec!(1.01));
        assert_eq!(round_cents(dec!(1.004)), dec!(1.00));
        assert_eq!(round_cents(dec!(-1.005)), dec!(-1.01));
        assert_eq!(round_cents(dec!(10.0)), dec!(10.00));
    }

    #[test]
    fn line_total_multiplies_and_rounds() {
        assert_eq!(line_total(3, dec!(19.99)), dec!(59.97));
        assert_eq!(line_total(1, dec!(49.99)), dec!(49.99));
        assert_eq!(line_total(3, dec!(0.333)), dec!(1.00));
    }

    #[test]
    fn booking_invoice_scenario() {
        // service price 49.99 at 20% tax
        let totals = invoice_totals(&[dec!(49.99)], dec!(20), Decimal::ZERO);
        assert_eq!(totals.subtotal, dec!(49.99));
        assert_eq!(totals.tax_amount, dec!(10.00));
        assert_eq!(totals.total, dec!(59.99));
        assert_eq!(totals.amount_due, dec!(59.99));
    }

    #[test]
    fn each_value_is_rounded_independently() {
        let totals = invoice_totals(&[dec!(0.33), dec!(0.33), dec!(0.33)], dec!(7.5), dec!(0.50));
        assert_eq!(totals.subtotal, dec!(0.99));
        // 0.99 * 7.5% = 0.07425 -> 0.07, not carried from an unrounded subtotal
        assert_eq!(totals.tax_amount, dec!(0.07));
        assert_eq!(totals.total, dec!(1.06));
        assert_eq!(totals.amount_due, dec!(0.56));
    }

    #[test]
    fn recomputation_is_idempotent() {
        let items = [dec!(12.34), dec!(0.01), dec!(99.999)];
        let first = invoice_totals(&items, dec!(17.5), dec!(20.00));
        let second = invoice_totals(&items, dec!(17.5), dec!(20.00));
        assert_eq!(first, second);
        // bit-identical: same scale, not just numerically equal
        assert_eq!(first.total.scale(), second.total.scale());
    }

    #[test]
    fn totals_invariants_hold() {
        let totals = invoice_totals(&[dec!(10.01), dec!(20.02)], dec!(20), dec!(5.00));
        assert_eq!(totals.total, round_cents(totals.subtotal + totals.tax_amount));
        assert_eq!(totals.amount_due, round_cents(totals.total - dec!(5.00)));
    }

    #[test]
    fn zero_rate_and_empty_items() {
        let totals = invoice_totals(&[], Decimal::ZERO, Decimal::ZERO);
        assert_eq!(totals.subtotal, Decimal::ZERO.round_dp(2));
        assert_eq!(totals.total, Decimal::ZERO.round_dp(2));
    }
}
