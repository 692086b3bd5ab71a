// Scalar cleanup applied to every mapped field before it lands in a record
// set, and again after any numeric post-processing.
use crate::types::{Cell, Record, Row};
use serde_json::{Number, Value};

/// Normalize one mapped value into a spreadsheet-safe cell.
///
/// Rules, in order:
/// - `null` becomes an empty string.
/// - Empty arrays and objects become an empty string.
/// - Non-empty arrays and objects keep their JSON text.
/// - Non-finite numbers become an empty string.
/// - Everything else passes through unchanged.
pub fn sanitize(value: &Value) -> Cell {
    match value {
        Value::Null => Cell::empty(),
        Value::Array(items) if items.is_empty() => Cell::empty(),
        Value::Object(map) if map.is_empty() => Cell::empty(),
        Value::Array(_) | Value::Object(_) => Cell::Text(value.to_string()),
        Value::Number(n) => number_cell(n),
        Value::Bool(b) => Cell::Bool(*b),
        Value::String(s) => Cell::Text(s.clone()),
    }
}

fn number_cell(n: &Number) -> Cell {
    if let Some(i) = n.as_i64() {
        return Cell::Int(i);
    }
    match n.as_f64() {
        Some(f) => scrub(Cell::Float(f)),
        None => Cell::empty(),
    }
}

/// Second pass: blank out infinities and NaN left behind by arithmetic.
pub fn scrub(cell: Cell) -> Cell {
    match cell {
        Cell::Float(f) if !f.is_finite() => Cell::empty(),
        other => other,
    }
}

pub fn sanitize_record(record: Record) -> Row {
    record
        .into_iter()
        .map(|(name, value)| (name, sanitize(&value)))
        .collect()
}

impl From<Cell> for Value {
    fn from(cell: Cell) -> Self {
        match cell {
            Cell::Text(s) => Value::String(s),
            Cell::Int(i) => Value::from(i),
            Cell::Float(f) => Value::from(f),
            Cell::Bool(b) => Value::Bool(b),
        }
    }
}
