//! Converting a compiled unit's raw output into a host [`Value`].
//!
//! Rules, first match wins:
//!
//! 1. `()` becomes the empty-string sentinel.
//! 2. Scalars pass through; a [`Date`] becomes its serial number.
//! 3. A sequence of rows (arrays or object maps) becomes a 2-D array. A lone
//!    object map is one row.
//! 4. A sequence of dates becomes a single column.
//! 5. A one-element sequence becomes that element.
//! 6. Any other sequence becomes a single column.
//!
//! An empty result of any shape is the sentinel; the host cannot spill zero rows.

use std::ops::{Range, RangeInclusive};

use rhai::{Array, Dynamic, Map};

use super::value::{ErrorCode, Value};
use crate::builtins::Date;

/// Domain types that have a host representation.
pub trait ToHostValue {
    fn to_host_value(&self) -> Value;
}

impl ToHostValue for Date {
    fn to_host_value(&self) -> Value {
        Value::Number(self.serial() as f64)
    }
}

pub fn normalize_result(value: Dynamic) -> Value {
    normalize_result_with_headers(value, &[])
}

/// Like [`normalize_result`], laying out object-map rows in `headers` order
/// first, then any other keys alphabetically.
pub fn normalize_result_with_headers(value: Dynamic, headers: &[String]) -> Value {
    if value.is_unit() {
        return Value::empty_sentinel();
    }
    if let Some(scalar) = scalar(&value) {
        return scalar;
    }
    if value.is_map() {
        return table(vec![value], headers);
    }
    match sequence(value) {
        Some(items) => normalize_sequence(items, headers),
        None => Value::Error(ErrorCode::Value),
    }
}

fn number(n: f64) -> Value {
    if n.is_finite() {
        Value::Number(n)
    } else {
        Value::Error(ErrorCode::Num)
    }
}

fn scalar(value: &Dynamic) -> Option<Value> {
    if let Ok(n) = value.as_int() {
        return Some(Value::Number(n as f64));
    }
    if let Ok(n) = value.as_float() {
        return Some(number(n));
    }
    if let Ok(b) = value.as_bool() {
        return Some(Value::Boolean(b));
    }
    if let Ok(c) = value.as_char() {
        return Some(Value::Text(c.to_string()));
    }
    if value.is_string() {
        return value.clone().into_string().ok().map(Value::Text);
    }
    if let Some(date) = value.read_lock::<Date>() {
        return Some(date.to_host_value());
    }
    None
}

fn is_date(value: &Dynamic) -> bool {
    value.is::<Date>()
}

/// Arrays and integer ranges, as a flat list of items.
fn sequence(value: Dynamic) -> Option<Array> {
    if value.is_array() {
        return value.into_array().ok();
    }
    if let Some(range) = value.clone().try_cast::<Range<i64>>() {
        return Some(range.map(Dynamic::from).collect());
    }
    value
        .try_cast::<RangeInclusive<i64>>()
        .map(|range| range.map(Dynamic::from).collect())
}

fn normalize_sequence(mut items: Array, headers: &[String]) -> Value {
    if items.is_empty() {
        return Value::empty_sentinel();
    }
    if items.iter().all(|item| item.is_array() || item.is_map()) {
        return table(items, headers);
    }
    if items.iter().all(is_date) {
        return Value::Array(items.iter().map(|item| vec![element(item)]).collect());
    }
    if items.len() == 1
        && let Some(item) = items.pop()
    {
        return normalize_result_with_headers(item, headers);
    }
    Value::Array(items.iter().map(|item| vec![element(item)]).collect())
}

/// One cell of a spilled result. Nested non-scalars have no cell form.
fn element(item: &Dynamic) -> Value {
    if item.is_unit() {
        return Value::Empty;
    }
    scalar(item).unwrap_or(Value::Error(ErrorCode::Value))
}

fn map_columns(rows: &[Dynamic], headers: &[String]) -> Vec<String> {
    let maps: Vec<_> = rows.iter().filter_map(|row| row.read_lock::<Map>()).collect();
    if maps.is_empty() {
        return Vec::new();
    }
    let mut columns: Vec<String> = headers
        .iter()
        .filter(|h| maps.iter().any(|m| m.contains_key(h.as_str())))
        .cloned()
        .collect();
    let mut extra: Vec<String> = maps
        .iter()
        .flat_map(|m| m.keys().map(|k| k.to_string()))
        .filter(|k| !columns.contains(k))
        .collect();
    extra.sort();
    extra.dedup();
    columns.extend(extra);
    columns
}

fn table(rows: Array, headers: &[String]) -> Value {
    let columns = map_columns(&rows, headers);

    let mut cells: Vec<Vec<Value>> = rows
        .iter()
        .map(|row| {
            if let Some(map) = row.read_lock::<Map>() {
                columns
                    .iter()
                    .map(|c| map.get(c.as_str()).map_or(Value::Empty, element))
                    .collect()
            } else if let Some(items) = row.read_lock::<Array>() {
                items.iter().map(element).collect()
            } else {
                vec![element(row)]
            }
        })
        .collect();

    let width = cells.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 {
        return Value::empty_sentinel();
    }
    for row in &mut cells {
        row.resize(width, Value::Empty);
    }
    Value::Array(cells)
}
