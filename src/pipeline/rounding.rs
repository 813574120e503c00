//! Spreadsheet-compatible rounding.
//!
//! Ties round away from zero ("round half up"), never to even. Rounding is
//! applied once to an assembled table, after all division is complete.

use crate::models::{IndexRow, Measure};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::str::FromStr;

/// Round `value` to the nearest multiple of `precision`, ties away from zero.
///
/// `precision` is a step: `0.01` is two decimal places, `1` the nearest
/// integer, `100` the nearest hundred. A non-finite value or a precision
/// that is not a positive finite number returns `value` unchanged.
pub fn round_half_up(value: f64, precision: f64) -> f64 {
    if !value.is_finite() || !precision.is_finite() || precision <= 0.0 {
        return value;
    }

    if precision > 1.0 {
        return (value / precision).round() * precision;
    }

    // Magnitudes beyond the decimal range fall back to float steps.
    round_decimal(value, precision).unwrap_or_else(|| (value / precision).round() * precision)
}

/// Decimal rounding on the shortest representation of `value`, so `2.675`
/// is treated as the literal it was written as, not its binary neighbour.
fn round_decimal(value: f64, precision: f64) -> Option<f64> {
    let value = Decimal::from_str(&value.to_string()).ok()?;
    let step = Decimal::from_str(&precision.to_string()).ok()?;
    if step.is_zero() {
        return None;
    }

    let steps = value
        .checked_div(step)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let rounded = steps.checked_mul(step)?;

    rounded.normalize().to_string().parse().ok()
}

/// Round a table cell. Anything that is not a number passes through.
pub fn round_value(value: &Value, precision: f64) -> Value {
    let Value::Number(number) = value else {
        return value.clone();
    };
    let Some(raw) = number.as_f64() else {
        return value.clone();
    };

    let rounded = round_half_up(raw, precision);

    // Integer cells stay integers.
    if (number.is_i64() || number.is_u64())
        && rounded.fract() == 0.0
        && rounded.abs() < i64::MAX as f64
    {
        return Value::from(rounded as i64);
    }

    Number::from_f64(rounded)
        .map(Value::Number)
        .unwrap_or_else(|| value.clone())
}

/// Number of decimal places a decimal step expresses (`0.01` -> 2).
pub fn decimal_places(precision: f64) -> usize {
    if !precision.is_finite() || precision >= 1.0 {
        return 0;
    }
    precision
        .to_string()
        .split_once('.')
        .map(|(_, fraction)| fraction.len())
        .unwrap_or(0)
}

/// The two-precision policy applied to every year table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoundingPolicy {
    /// Step for aggregated measure columns.
    pub measure: f64,
    /// Step for stored index columns.
    pub index: f64,
    /// Step for indices rendered for people.
    pub display: f64,
}

impl Default for RoundingPolicy {
    fn default() -> Self {
        Self {
            measure: 1.0,
            index: 0.001,
            display: 0.01,
        }
    }
}

impl RoundingPolicy {
    /// Round the measure and index columns of assembled rows in place.
    pub fn apply(&self, rows: &mut [IndexRow]) {
        for row in rows.iter_mut() {
            for measure in Measure::ALL {
                row.values[measure] = round_half_up(row.values[measure], self.measure);
            }
            for index in row.indices.iter_mut() {
                *index = round_half_up(*index, self.index);
            }
        }
    }

    /// Render a stored index at display precision, e.g. `1.125` -> `"1.13"`.
    pub fn display(&self, stored: f64) -> String {
        let rounded = round_half_up(stored, self.display);
        format!("{:.*}", decimal_places(self.display), rounded)
    }

    /// Difference from the ICB baseline of 1.00, at display precision.
    pub fn display_delta(&self, stored: f64) -> String {
        let shown = round_half_up(stored, self.display);
        let delta = round_half_up(shown - 1.0, self.display);
        format!("{:+.*}", decimal_places(self.display), delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MeasureValues, RowKind};
    use serde_json::json;

    #[test]
    fn test_ties_round_away_from_zero() {
        assert_eq!(round_half_up(2.5, 1.0), 3.0);
        assert_eq!(round_half_up(-2.5, 1.0), -3.0);
        assert_eq!(round_half_up(0.5, 1.0), 1.0);
        assert_eq!(round_half_up(-0.5, 1.0), -1.0);
        assert_eq!(round_half_up(2.675, 0.01), 2.68);
        assert_eq!(round_half_up(-2.675, 0.01), -2.68);
    }

    #[test]
    fn test_decimal_precisions() {
        assert_eq!(round_half_up(2.5, 0.01), 2.5);
        assert_eq!(round_half_up(1.234567, 0.01), 1.23);
        assert_eq!(round_half_up(2.675, 0.1), 2.7);
        assert_eq!(round_half_up(1.234567, 0.001), 1.235);
        assert_eq!(round_half_up(1.234567, 0.0001), 1.2346);
        assert_eq!(round_half_up(-1.234567, 0.01), -1.23);
        assert_eq!(round_half_up(2.675, 1.0), 3.0);
        assert_eq!(round_half_up(1.234567, 1.0), 1.0);
    }

    #[test]
    fn test_large_and_small_values() {
        assert_eq!(round_half_up(123456789.555, 0.01), 123456789.56);
        assert_eq!(round_half_up(-123456789.555, 0.01), -123456789.56);
        assert_eq!(round_half_up(0.00056789, 0.00001), 0.00057);
        assert_eq!(round_half_up(-0.00056789, 0.00001), -0.00057);
    }

    #[test]
    fn test_steps_above_one() {
        assert_eq!(round_half_up(12345.0, 100.0), 12300.0);
        assert_eq!(round_half_up(-12345.0, 100.0), -12300.0);
        assert_eq!(round_half_up(12350.0, 100.0), 12400.0);
    }

    #[test]
    fn test_non_finite_and_bad_precision_pass_through() {
        assert!(round_half_up(f64::NAN, 0.01).is_nan());
        assert_eq!(round_half_up(f64::INFINITY, 1.0), f64::INFINITY);
        assert_eq!(round_half_up(2.675, 0.0), 2.675);
        assert_eq!(round_half_up(2.675, -1.0), 2.675);
    }

    #[test]
    fn test_round_value_passes_non_numbers_through() {
        assert_eq!(round_value(&json!("x"), 0.01), json!("x"));
        assert_eq!(round_value(&Value::Null, 0.01), Value::Null);
        assert_eq!(round_value(&json!({}), 0.01), json!({}));
        assert_eq!(round_value(&json!([]), 0.01), json!([]));
        assert_eq!(round_value(&json!(true), 0.01), json!(true));
    }

    #[test]
    fn test_round_value_numbers() {
        assert_eq!(round_value(&json!(2.675), 0.01), json!(2.68));
        assert_eq!(round_value(&json!(12345), 100.0), json!(12300));
        assert_eq!(round_value(&json!(-12345), 100.0), json!(-12300));
    }

    #[test]
    fn test_decimal_places() {
        assert_eq!(decimal_places(0.01), 2);
        assert_eq!(decimal_places(0.001), 3);
        assert_eq!(decimal_places(1.0), 0);
        assert_eq!(decimal_places(100.0), 0);
    }

    #[test]
    fn test_policy_display() {
        let policy = RoundingPolicy::default();
        assert_eq!(policy.display(1.125), "1.13");
        assert_eq!(policy.display(0.995), "1.00");
        assert_eq!(policy.display(1.0), "1.00");
        assert_eq!(policy.display_delta(1.125), "+0.13");
        assert_eq!(policy.display_delta(0.874), "-0.13");
    }

    #[test]
    fn test_policy_apply_rounds_both_column_groups() {
        let mut values = MeasureValues::filled(100.5);
        values[Measure::GpPop] = 1234.4;
        let mut rows = vec![IndexRow {
            label: "P".to_string(),
            kind: RowKind::Place,
            icb: "R".to_string(),
            values,
            indices: vec![1.0004999, 1.1235, 0.9995],
        }];

        RoundingPolicy::default().apply(&mut rows);

        assert_eq!(rows[0].values[Measure::GpPop], 1234.0);
        assert_eq!(rows[0].values[Measure::Maternity], 101.0);
        assert_eq!(rows[0].indices, vec![1.0, 1.124, 1.0]);
    }
}
