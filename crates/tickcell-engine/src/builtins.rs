//! Built-in functions (Rust) and their metadata.
//!
//! Two sets are registered on two different engines:
//! - Host formula built-ins are ALL CAPS (`CELL`, `VALUE`, `SUM_RANGE`, ...)
//!   and read computed cell values from a [`ValueGrid`].
//! - Snippet built-ins are lower case (`sum`, `avg`, `count`, `date`, ...)
//!   and operate on the column arrays a snippet is bound to.
//!
//! If you add a new built-in range function, update `RANGE_BUILTINS` and
//! register its implementation in `register_host_builtins`.

use chrono::{Datelike, Days, NaiveDate};
use regex::Regex;
use rhai::{Array, Dynamic, Engine, EvalAltResult, Map, Position};
use std::fmt;
use std::sync::OnceLock;

use crate::engine::{CellRef, Value, ValueGrid};

pub struct RangeBuiltin {
    pub sheet_name: &'static str,
    pub rhai_name: &'static str,
}

pub const RANGE_BUILTINS: &[RangeBuiltin] = &[
    RangeBuiltin {
        sheet_name: "SUM",
        rhai_name: "SUM_RANGE",
    },
    RangeBuiltin {
        sheet_name: "AVG",
        rhai_name: "AVG_RANGE",
    },
    RangeBuiltin {
        sheet_name: "COUNT",
        rhai_name: "COUNT_RANGE",
    },
    RangeBuiltin {
        sheet_name: "MIN",
        rhai_name: "MIN_RANGE",
    },
    RangeBuiltin {
        sheet_name: "MAX",
        rhai_name: "MAX_RANGE",
    },
];

/// Regex that matches built-in range calls like `SUM(A1:B5)`.
///
/// Captures:
/// - group 1: function name (e.g. `SUM`)
/// - group 2: start cell ref (e.g. `A1`)
/// - group 3: end cell ref (e.g. `B5`)
pub fn range_fn_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let names = RANGE_BUILTINS
            .iter()
            .map(|b| b.sheet_name)
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(
            r"\b({})\(([A-Za-z]+[0-9]+):([A-Za-z]+[0-9]+)\)",
            names
        ))
        .expect("built-in range regex must compile")
    })
}

pub fn range_rhai_name(sheet_name: &str) -> Option<&'static str> {
    RANGE_BUILTINS
        .iter()
        .find(|b| b.sheet_name == sheet_name)
        .map(|b| b.rhai_name)
}

fn invalid_arg(message: &str) -> Box<EvalAltResult> {
    EvalAltResult::ErrorRuntime(message.into(), Position::NONE).into()
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

/// Days from 0001-01-01 to the spreadsheet epoch (1899-12-30).
const SERIAL_EPOCH_CE_DAYS: i32 = 693_594;

/// Calendar date exposed to snippets as the `Date` type.
///
/// Marshalled to the host as a serial day number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date(NaiveDate);

impl Date {
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Date> {
        NaiveDate::from_ymd_opt(year, month, day).map(Date)
    }

    pub fn parse(text: &str) -> Option<Date> {
        NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").ok().map(Date)
    }

    /// Serial day number: days since 1899-12-30, which matches spreadsheet
    /// serials for every date from March 1900 on.
    pub fn serial(&self) -> i64 {
        i64::from(self.0.num_days_from_ce() - SERIAL_EPOCH_CE_DAYS)
    }

    fn add_days(&self, days: i64) -> Option<Date> {
        let delta = Days::new(days.unsigned_abs());
        if days >= 0 {
            self.0.checked_add_days(delta).map(Date)
        } else {
            self.0.checked_sub_days(delta).map(Date)
        }
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

// ---------------------------------------------------------------------------
// Snippet built-ins
// ---------------------------------------------------------------------------

fn numbers(arr: &Array) -> impl Iterator<Item = f64> + '_ {
    arr.iter().filter_map(|v| {
        v.as_float()
            .ok()
            .or_else(|| v.as_int().ok().map(|n| n as f64))
    })
}

fn is_blank(value: &Dynamic) -> bool {
    value.is_unit() || (value.is_string() && value.clone().into_string().is_ok_and(|s| s.is_empty()))
}

/// Register the functions available inside snippets.
pub fn register_snippet_builtins(engine: &mut Engine) {
    // Aggregates skip entries that are not numbers.
    engine.register_fn("sum", |arr: &mut Array| -> f64 { numbers(arr).sum() });
    engine.register_fn("product", |arr: &mut Array| -> f64 { numbers(arr).product() });
    engine.register_fn("avg", |arr: &mut Array| -> f64 {
        let (sum, count) = numbers(arr).fold((0.0, 0usize), |(s, c), n| (s + n, c + 1));
        if count > 0 { sum / count as f64 } else { 0.0 }
    });
    engine.register_fn("min", |arr: &mut Array| -> f64 {
        numbers(arr).reduce(f64::min).unwrap_or(0.0)
    });
    engine.register_fn("max", |arr: &mut Array| -> f64 {
        numbers(arr).reduce(f64::max).unwrap_or(0.0)
    });

    // count(arr): non-empty entries of any type
    engine.register_fn("count", |arr: &mut Array| -> i64 {
        arr.iter().filter(|v| !is_blank(v)).count() as i64
    });

    // column(ROWS, "Header"): one field of every row map
    engine.register_fn("column", |rows: &mut Array, name: &str| -> Array {
        rows.iter()
            .map(|row| {
                row.read_lock::<Map>()
                    .and_then(|map| map.get(name).cloned())
                    .unwrap_or(Dynamic::UNIT)
            })
            .collect()
    });

    engine
        .register_type_with_name::<Date>("Date")
        .register_get("year", |d: &mut Date| d.0.year() as i64)
        .register_get("month", |d: &mut Date| d.0.month() as i64)
        .register_get("day", |d: &mut Date| d.0.day() as i64)
        .register_fn("serial", |d: &mut Date| d.serial())
        .register_fn("to_string", |d: &mut Date| d.to_string())
        .register_fn("to_debug", |d: &mut Date| format!("date({d})"))
        .register_fn("==", |a: Date, b: Date| a == b)
        .register_fn("!=", |a: Date, b: Date| a != b)
        .register_fn("<", |a: Date, b: Date| a < b)
        .register_fn("<=", |a: Date, b: Date| a <= b)
        .register_fn(">", |a: Date, b: Date| a > b)
        .register_fn(">=", |a: Date, b: Date| a >= b);

    engine.register_fn(
        "date",
        |year: i64, month: i64, day: i64| -> Result<Date, Box<EvalAltResult>> {
            let ymd = (
                i32::try_from(year).ok(),
                u32::try_from(month).ok(),
                u32::try_from(day).ok(),
            );
            let date = match ymd {
                (Some(y), Some(m), Some(d)) => Date::from_ymd(y, m, d),
                _ => None,
            };
            date.ok_or_else(|| invalid_arg(&format!("invalid date {year}-{month}-{day}")))
        },
    );
    engine.register_fn(
        "parse_date",
        |text: &str| -> Result<Date, Box<EvalAltResult>> {
            Date::parse(text).ok_or_else(|| invalid_arg(&format!("invalid date: {text}")))
        },
    );
    engine.register_fn(
        "add_days",
        |d: Date, days: i64| -> Result<Date, Box<EvalAltResult>> {
            d.add_days(days)
                .ok_or_else(|| invalid_arg("date out of range"))
        },
    );
    engine.register_fn("days_between", |a: Date, b: Date| -> i64 {
        (b.0 - a.0).num_days()
    });
}

// ---------------------------------------------------------------------------
// Host formula built-ins
// ---------------------------------------------------------------------------

fn cell_value_or_zero(values: &ValueGrid, col: usize, row: usize) -> f64 {
    match values.get(&CellRef::new(col, row)).as_deref() {
        Some(Value::Number(n)) => *n,
        _ => 0.0,
    }
}

/// Corners of a range call, normalized so iteration runs top-left first.
fn bounds(c1: i64, r1: i64, c2: i64, r2: i64) -> (usize, usize, usize, usize) {
    let min_col = c1.min(c2).max(0) as usize;
    let max_col = c1.max(c2).max(0) as usize;
    let min_row = r1.min(r2).max(0) as usize;
    let max_row = r1.max(r2).max(0) as usize;
    (min_col, min_row, max_col, max_row)
}

/// Register host formula built-ins reading from `values`.
pub fn register_host_builtins(engine: &mut Engine, values: ValueGrid) {
    // CELL(col, row): numeric value at cell (text -> NaN, empty -> 0)
    let values_cell = values.clone();
    engine.register_fn("CELL", move |col: i64, row: i64| -> f64 {
        let cell_ref = CellRef::new(col.max(0) as usize, row.max(0) as usize);
        match values_cell.get(&cell_ref).as_deref() {
            None | Some(Value::Empty) => 0.0,
            Some(Value::Number(n)) => *n,
            Some(_) => f64::NAN,
        }
    });

    // VALUE(col, row): typed value at cell as Dynamic.
    // - Empty cells => "" (so things like `len(@A1)` behave intuitively)
    let values_value = values.clone();
    engine.register_fn("VALUE", move |col: i64, row: i64| -> Dynamic {
        let cell_ref = CellRef::new(col.max(0) as usize, row.max(0) as usize);
        match values_value.get(&cell_ref).as_deref() {
            None | Some(Value::Empty) => Dynamic::from(String::new()),
            Some(value) => value.to_dynamic(),
        }
    });

    // SUM_RANGE(c1, r1, c2, r2)
    let values_sum = values.clone();
    engine.register_fn(
        "SUM_RANGE",
        move |c1: i64, r1: i64, c2: i64, r2: i64| -> f64 {
            let (min_col, min_row, max_col, max_row) = bounds(c1, r1, c2, r2);
            let mut sum = 0.0;
            for row in min_row..=max_row {
                for col in min_col..=max_col {
                    sum += cell_value_or_zero(&values_sum, col, row);
                }
            }
            sum
        },
    );

    // AVG_RANGE(c1, r1, c2, r2)
    let values_avg = values.clone();
    engine.register_fn(
        "AVG_RANGE",
        move |c1: i64, r1: i64, c2: i64, r2: i64| -> f64 {
            let (min_col, min_row, max_col, max_row) = bounds(c1, r1, c2, r2);
            let mut sum = 0.0;
            let mut count = 0;
            for row in min_row..=max_row {
                for col in min_col..=max_col {
                    sum += cell_value_or_zero(&values_avg, col, row);
                    count += 1;
                }
            }
            if count > 0 { sum / count as f64 } else { 0.0 }
        },
    );

    // COUNT_RANGE(c1, r1, c2, r2): count non-empty
    let values_count = values.clone();
    engine.register_fn(
        "COUNT_RANGE",
        move |c1: i64, r1: i64, c2: i64, r2: i64| -> f64 {
            let (min_col, min_row, max_col, max_row) = bounds(c1, r1, c2, r2);
            let mut count = 0;
            for row in min_row..=max_row {
                for col in min_col..=max_col {
                    if values_count
                        .get(&CellRef::new(col, row))
                        .is_some_and(|v| !matches!(*v, Value::Empty))
                    {
                        count += 1;
                    }
                }
            }
            count as f64
        },
    );

    // MIN_RANGE(c1, r1, c2, r2)
    let values_min = values.clone();
    engine.register_fn(
        "MIN_RANGE",
        move |c1: i64, r1: i64, c2: i64, r2: i64| -> f64 {
            let (min_col, min_row, max_col, max_row) = bounds(c1, r1, c2, r2);
            let mut min_val = f64::INFINITY;
            for row in min_row..=max_row {
                for col in min_col..=max_col {
                    min_val = min_val.min(cell_value_or_zero(&values_min, col, row));
                }
            }
            if min_val == f64::INFINITY { 0.0 } else { min_val }
        },
    );

    // MAX_RANGE(c1, r1, c2, r2)
    let values_max = values;
    engine.register_fn(
        "MAX_RANGE",
        move |c1: i64, r1: i64, c2: i64, r2: i64| -> f64 {
            let (min_col, min_row, max_col, max_row) = bounds(c1, r1, c2, r2);
            let mut max_val = f64::NEG_INFINITY;
            for row in min_row..=max_row {
                for col in min_col..=max_col {
                    max_val = max_val.max(cell_value_or_zero(&values_max, col, row));
                }
            }
            if max_val == f64::NEG_INFINITY { 0.0 } else { max_val }
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashmap::DashMap;
    use std::sync::Arc;

    fn host_engine(values: &[(CellRef, Value)]) -> Engine {
        let grid: ValueGrid = Arc::new(DashMap::new());
        for (cell, value) in values {
            grid.insert(cell.clone(), value.clone());
        }
        let mut engine = Engine::new();
        register_host_builtins(&mut engine, grid);
        engine
    }

    fn snippet_engine() -> Engine {
        let mut engine = Engine::new();
        register_snippet_builtins(&mut engine);
        engine
    }

    #[test]
    fn test_range_rhai_name_mapping() {
        assert_eq!(range_rhai_name("SUM"), Some("SUM_RANGE"));
        assert_eq!(range_rhai_name("AVG"), Some("AVG_RANGE"));
        assert_eq!(range_rhai_name("NOPE"), None);
        assert_eq!(range_rhai_name("SUMIF"), None);
        assert!(!range_fn_re().is_match("SUM(A1:A3, |x| x > 1)"));
    }

    #[test]
    fn test_host_engine_has_only_cell_and_range_functions() {
        let engine = host_engine(&[]);
        assert!(engine.eval::<f64>("POW(2, 3)").is_err());
        assert!(engine.eval::<f64>("MAX_RANGE(0, 0, 1, 1)").is_ok());
    }

    #[test]
    fn test_range_regex_matches_uppercase_only() {
        let re = range_fn_re();
        assert!(re.is_match("SUM(A1:B2)"));
        assert!(!re.is_match("sum(A1:B2)"));
    }

    #[test]
    fn test_sum_range_skips_text() {
        let engine = host_engine(&[
            (CellRef::new(0, 0), Value::Number(1.0)),
            (CellRef::new(0, 1), Value::Text("x".into())),
            (CellRef::new(0, 2), Value::Number(2.0)),
        ]);
        let result: f64 = engine.eval("SUM_RANGE(0, 0, 0, 2)").unwrap();
        assert_eq!(result, 3.0);
        let count: f64 = engine.eval("COUNT_RANGE(0, 0, 0, 5)").unwrap();
        assert_eq!(count, 3.0);
    }

    #[test]
    fn test_cell_and_value() {
        let engine = host_engine(&[
            (CellRef::new(0, 0), Value::Number(10.0)),
            (CellRef::new(1, 0), Value::Text("a".into())),
        ]);
        let n: f64 = engine.eval("CELL(0, 0) + CELL(5, 5)").unwrap();
        assert_eq!(n, 10.0);
        let nan: f64 = engine.eval("CELL(1, 0)").unwrap();
        assert!(nan.is_nan());
        let s: String = engine.eval("VALUE(1, 0) + VALUE(2, 0)").unwrap();
        assert_eq!(s, "a");
    }

    #[test]
    fn test_snippet_aggregates_skip_non_numbers() {
        let engine = snippet_engine();
        let sum: f64 = engine.eval(r#"sum([1, 2.5, "x", ()])"#).unwrap();
        assert_eq!(sum, 3.5);
        let avg: f64 = engine.eval(r#"[2, 4, "x"].avg()"#).unwrap();
        assert_eq!(avg, 3.0);
        let max: f64 = engine.eval("max([3, 9, 1])").unwrap();
        assert_eq!(max, 9.0);
        let min: f64 = engine.eval("min([])").unwrap();
        assert_eq!(min, 0.0);
    }

    #[test]
    fn test_snippet_count_counts_non_empty() {
        let engine = snippet_engine();
        let count: i64 = engine.eval(r#"count(["North", "", (), 4])"#).unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_snippet_column_of_rows() {
        let engine = snippet_engine();
        let col: Array = engine
            .eval(r#"column([#{ a: 1 }, #{ b: 2 }, #{ a: 3 }], "a")"#)
            .unwrap();
        assert_eq!(col.len(), 3);
        assert!(col[1].is_unit());
        assert_eq!(col[2].as_int().unwrap(), 3);
    }

    #[test]
    fn test_date_functions() {
        let engine = snippet_engine();
        let year: i64 = engine.eval("date(2024, 2, 29).year").unwrap();
        assert_eq!(year, 2024);
        let days: i64 = engine
            .eval(r#"days_between(date(2024, 1, 1), parse_date("2024-03-01"))"#)
            .unwrap();
        assert_eq!(days, 60);
        let later: bool = engine
            .eval("add_days(date(2024, 1, 31), 1) > date(2024, 1, 31)")
            .unwrap();
        assert!(later);
        assert!(engine.eval::<Date>("date(2023, 2, 29)").is_err());
    }

    #[test]
    fn test_date_serial() {
        assert_eq!(Date::from_ymd(1900, 1, 1).unwrap().serial(), 2);
        assert_eq!(Date::from_ymd(1970, 1, 1).unwrap().serial(), 25569);
        assert_eq!(Date::parse("2024-01-31").unwrap().to_string(), "2024-01-31");
    }
}
