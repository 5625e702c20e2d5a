//! Line-item pricing: discount, taxable value, CGST/SGST/CESS and totals.
//!
//! Pure functions over `rust_decimal::Decimal` (no IO, no rounding).

pub mod line;

pub use line::{LineCharge, LinePricing, price_line, sum_line_totals};
