//! Conversion of the executor's scalar column into the declared metric type.

use crate::error::MetricError;
use crate::executor::ScalarValue;
use crate::metric::{MetricResult, MetricValue, ValueType};

/// Converts an executor result into a [`MetricResult`] of the declared type.
///
/// `None` (no row, or NULL) becomes an absent result. Floats declared as
/// integers are truncated toward zero.
pub fn coerce(
    expected: ValueType,
    scalar: Option<ScalarValue>,
) -> Result<MetricResult, MetricError> {
    let Some(scalar) = scalar else {
        return Ok(MetricResult::absent());
    };

    let value = match expected {
        ValueType::Integer => MetricValue::Integer(to_integer(&scalar)?),
        ValueType::Float => MetricValue::Float(to_float(&scalar)?),
        ValueType::String => MetricValue::String(scalar.to_string()),
    };

    Ok(MetricResult::present(value))
}

fn to_integer(scalar: &ScalarValue) -> Result<i64, MetricError> {
    match scalar {
        ScalarValue::Integer(n) => Ok(*n),
        ScalarValue::Float(x) => truncate(*x).ok_or_else(|| mismatch(ValueType::Integer, scalar)),
        ScalarValue::Text(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(truncate))
                .ok_or_else(|| mismatch(ValueType::Integer, scalar))
        }
    }
}

fn to_float(scalar: &ScalarValue) -> Result<f64, MetricError> {
    match scalar {
        ScalarValue::Integer(n) => Ok(*n as f64),
        ScalarValue::Float(x) => Ok(*x),
        ScalarValue::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| mismatch(ValueType::Float, scalar)),
    }
}

fn truncate(x: f64) -> Option<i64> {
    if !x.is_finite() || x < i64::MIN as f64 || x >= i64::MAX as f64 {
        return None;
    }
    Some(x.trunc() as i64)
}

fn mismatch(expected: ValueType, found: &ScalarValue) -> MetricError {
    MetricError::Coercion {
        expected,
        found: found.describe(),
    }
}
