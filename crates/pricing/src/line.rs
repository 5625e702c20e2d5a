use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use workshop_core::{DomainError, DomainResult};

/// Everything needed to price one charge on a service visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineCharge {
    pub quantity: i64,
    pub unit_price: Decimal,
    /// When present, authoritative: the amount is recomputed from it.
    pub discount_percent: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
    pub cgst_percent: Decimal,
    pub sgst_percent: Decimal,
    pub cess_percent: Decimal,
}

impl LineCharge {
    /// A tax-free, discount-free charge (labor lines materialized from jobs).
    pub fn flat(quantity: i64, unit_price: Decimal) -> Self {
        Self {
            quantity,
            unit_price,
            discount_percent: None,
            discount_amount: None,
            cgst_percent: Decimal::ZERO,
            sgst_percent: Decimal::ZERO,
            cess_percent: Decimal::ZERO,
        }
    }
}

/// Result of pricing a charge. Amounts are exact (normalized, unrounded).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinePricing {
    /// `quantity * unit_price` before discount.
    pub gross: Decimal,
    pub discount_percent: Decimal,
    pub discount_amount: Decimal,
    pub taxable_value: Decimal,
    pub cgst_percent: Decimal,
    pub cgst_amount: Decimal,
    pub sgst_percent: Decimal,
    pub sgst_amount: Decimal,
    pub cess_percent: Decimal,
    pub cess_amount: Decimal,
    pub line_total: Decimal,
}

impl LinePricing {
    /// Sum of the three tax components.
    pub fn tax_amount(&self) -> Decimal {
        self.cgst_amount + self.sgst_amount + self.cess_amount
    }

    /// Combined tax rate in percent.
    pub fn tax_rate(&self) -> Decimal {
        self.cgst_percent + self.sgst_percent + self.cess_percent
    }
}

/// Price one line.
///
/// - a supplied `discount_percent` overwrites any supplied discount amount
/// - taxable value is clamped at zero (over-discounting is not an error)
/// - each tax is a percent of the taxable value
///
/// Fails with `InvalidInput` for a negative quantity or percent, or when the
/// amounts overflow the decimal range.
pub fn price_line(charge: &LineCharge) -> DomainResult<LinePricing> {
    if charge.quantity < 0 {
        return Err(DomainError::invalid_input("quantity cannot be negative"));
    }
    ensure_percent("discount_percent", charge.discount_percent.unwrap_or_default())?;
    ensure_percent("cgst_percent", charge.cgst_percent)?;
    ensure_percent("sgst_percent", charge.sgst_percent)?;
    ensure_percent("cess_percent", charge.cess_percent)?;

    let gross = Decimal::from(charge.quantity)
        .checked_mul(charge.unit_price)
        .ok_or_else(overflow)?;

    let (discount_percent, discount_amount) = match charge.discount_percent {
        Some(pct) => (pct, percent_of(gross, pct)?),
        None => (
            Decimal::ZERO,
            charge.discount_amount.unwrap_or_default(),
        ),
    };

    let taxable_value = gross
        .checked_sub(discount_amount)
        .ok_or_else(overflow)?
        .max(Decimal::ZERO);

    let cgst_amount = percent_of(taxable_value, charge.cgst_percent)?;
    let sgst_amount = percent_of(taxable_value, charge.sgst_percent)?;
    let cess_amount = percent_of(taxable_value, charge.cess_percent)?;

    let line_total = [cgst_amount, sgst_amount, cess_amount]
        .into_iter()
        .try_fold(taxable_value, |acc, tax| acc.checked_add(tax))
        .ok_or_else(overflow)?;

    Ok(LinePricing {
        gross: gross.normalize(),
        discount_percent: discount_percent.normalize(),
        discount_amount: discount_amount.normalize(),
        taxable_value: taxable_value.normalize(),
        cgst_percent: charge.cgst_percent.normalize(),
        cgst_amount: cgst_amount.normalize(),
        sgst_percent: charge.sgst_percent.normalize(),
        sgst_amount: sgst_amount.normalize(),
        cess_percent: charge.cess_percent.normalize(),
        cess_amount: cess_amount.normalize(),
        line_total: line_total.normalize(),
    })
}

/// Exact sum of line totals, the value cached as a record's total cost.
pub fn sum_line_totals<'a>(totals: impl IntoIterator<Item = &'a Decimal>) -> DomainResult<Decimal> {
    totals
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, t| acc.checked_add(*t))
        .map(|d| d.normalize())
        .ok_or_else(overflow)
}

fn ensure_percent(field: &str, pct: Decimal) -> DomainResult<()> {
    if pct < Decimal::ZERO {
        return Err(DomainError::invalid_input(format!(
            "{field} cannot be negative"
        )));
    }
    Ok(())
}

fn percent_of(base: Decimal, pct: Decimal) -> DomainResult<Decimal> {
    base.checked_mul(pct)
        .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
        .ok_or_else(overflow)
}

fn overflow() -> DomainError {
    DomainError::invalid_input("amount overflow")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn charge(quantity: i64, unit_price: Decimal) -> LineCharge {
        LineCharge::flat(quantity, unit_price)
    }

    #[test]
    fn discount_percent_and_gst_split() {
        let pricing = price_line(&LineCharge {
            discount_percent: Some(dec!(10)),
            cgst_percent: dec!(9),
            sgst_percent: dec!(9),
            ..charge(2, dec!(1200))
        })
        .unwrap();

        assert_eq!(pricing.gross, dec!(2400));
        assert_eq!(pricing.discount_amount, dec!(240));
        assert_eq!(pricing.taxable_value, dec!(2160));
        assert_eq!(pricing.cgst_amount, dec!(194.4));
        assert_eq!(pricing.sgst_amount, dec!(194.4));
        assert_eq!(pricing.cess_amount, dec!(0));
        assert_eq!(pricing.line_total, dec!(2548.8));
        assert_eq!(pricing.tax_amount(), dec!(388.8));
        assert_eq!(pricing.tax_rate(), dec!(18));
    }

    #[test]
    fn percent_overrides_supplied_amount() {
        let pricing = price_line(&LineCharge {
            discount_percent: Some(dec!(50)),
            discount_amount: Some(dec!(1)),
            ..charge(1, dec!(100))
        })
        .unwrap();
        assert_eq!(pricing.discount_amount, dec!(50));
        assert_eq!(pricing.line_total, dec!(50));
    }

    #[test]
    fn supplied_amount_used_without_percent() {
        let pricing = price_line(&LineCharge {
            discount_amount: Some(dec!(30)),
            cess_percent: dec!(1),
            ..charge(1, dec!(130))
        })
        .unwrap();
        assert_eq!(pricing.discount_percent, dec!(0));
        assert_eq!(pricing.taxable_value, dec!(100));
        assert_eq!(pricing.cess_amount, dec!(1));
        assert_eq!(pricing.line_total, dec!(101));
    }

    #[test]
    fn over_discount_clamps_taxable_value_to_zero() {
        let pricing = price_line(&LineCharge {
            discount_amount: Some(dec!(500)),
            cgst_percent: dec!(9),
            ..charge(1, dec!(100))
        })
        .unwrap();
        assert_eq!(pricing.taxable_value, dec!(0));
        assert_eq!(pricing.cgst_amount, dec!(0));
        assert_eq!(pricing.line_total, dec!(0));
    }

    #[test]
    fn negative_quantity_is_invalid() {
        let err = price_line(&charge(-1, dec!(10))).unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(msg) if msg.contains("quantity")));
    }

    #[test]
    fn negative_percent_is_invalid() {
        let err = price_line(&LineCharge {
            sgst_percent: dec!(-0.5),
            ..charge(1, dec!(10))
        })
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(msg) if msg.contains("sgst_percent")));

        let err = price_line(&LineCharge {
            discount_percent: Some(dec!(-1)),
            ..charge(1, dec!(10))
        })
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
    }

    #[test]
    fn zero_quantity_prices_to_zero() {
        let pricing = price_line(&charge(0, dec!(99.99))).unwrap();
        assert_eq!(pricing.line_total, dec!(0));
    }

    #[test]
    fn sums_totals_exactly() {
        let totals = [dec!(0.1), dec!(0.2), dec!(2548.8)];
        assert_eq!(sum_line_totals(&totals).unwrap(), dec!(2549.1));
        assert_eq!(sum_line_totals(std::iter::empty()).unwrap(), dec!(0));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn money() -> impl Strategy<Value = Decimal> {
            (0i64..10_000_000).prop_map(|cents| Decimal::new(cents, 2))
        }

        fn percent() -> impl Strategy<Value = Decimal> {
            (0i64..=10_000).prop_map(|bp| Decimal::new(bp, 2))
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 512,
                ..ProptestConfig::default()
            })]

            /// Property: the total is exactly taxable value plus the three taxes,
            /// and the taxable value is never negative.
            #[test]
            fn total_reconciles_with_components(
                quantity in 0i64..500,
                unit_price in money(),
                discount_percent in proptest::option::of(percent()),
                discount_amount in proptest::option::of(money()),
                cgst in percent(),
                sgst in percent(),
                cess in percent(),
            ) {
                let pricing = price_line(&LineCharge {
                    quantity,
                    unit_price,
                    discount_percent,
                    discount_amount,
                    cgst_percent: cgst,
                    sgst_percent: sgst,
                    cess_percent: cess,
                }).unwrap();

                prop_assert!(pricing.taxable_value >= Decimal::ZERO);
                prop_assert_eq!(
                    pricing.line_total,
                    pricing.taxable_value + pricing.tax_amount()
                );
                if discount_percent.is_some() {
                    prop_assert_eq!(
                        pricing.discount_amount,
                        (pricing.gross * pricing.discount_percent / Decimal::ONE_HUNDRED).normalize()
                    );
                }
            }

            /// Property: summing totals is order independent.
            #[test]
            fn sum_is_order_independent(totals in prop::collection::vec(money(), 0..20)) {
                let forward = sum_line_totals(&totals).unwrap();
                let reversed: Vec<Decimal> = totals.iter().rev().copied().collect();
                prop_assert_eq!(forward, sum_line_totals(&reversed).unwrap());
            }
        }
    }
}
