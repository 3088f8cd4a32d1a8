//! Building the wrapper formula that replaces a cell's content.

use std::sync::Arc;

use super::bind::BindingContext;
use super::cell_ref::{CellAddress, RangeRef};
use super::compile::{CompiledUnit, Fingerprint};
use super::extract::extract;
use super::wrapper::{INVOKE_FN, LET_OPEN, quote_source, synthetic_name};
use crate::error::AssembleError;

/// A formula as the user typed it, plus where its data lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFormula {
    pub text: String,
    pub address: CellAddress,
    /// Data region the snippets run against, if the host found one.
    pub range: Option<RangeRef>,
    pub context: BindingContext,
}

impl SourceFormula {
    pub fn new(text: impl Into<String>, address: CellAddress) -> Self {
        SourceFormula {
            text: text.into(),
            address,
            range: None,
            context: BindingContext::default(),
        }
    }

    pub fn with_region(mut self, range: RangeRef, context: BindingContext) -> Self {
        self.range = Some(range);
        self.context = context;
        self
    }
}

/// The host-native formula written back to the cell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WrapperFormula {
    pub text: String,
    /// Synthetic variable names, in span order.
    pub variables: Vec<String>,
    pub fingerprints: Vec<Fingerprint>,
}

/// Assemble the wrapper for `source` from one compiled unit per span, in
/// span order. Pure: the same inputs always give the same text.
pub fn assemble(
    source: &SourceFormula,
    units: &[Arc<CompiledUnit>],
) -> Result<WrapperFormula, AssembleError> {
    let expressions = extract(&source.text)?;
    if expressions.len() != units.len() {
        return Err(AssembleError::UnitCountMismatch {
            expected: expressions.len(),
            found: units.len(),
        });
    }

    let range = source
        .range
        .as_ref()
        .map(|r| r.to_formula_ref(&source.address.sheet));

    let mut text = String::from(LET_OPEN);
    let mut body = String::with_capacity(source.text.len());
    let mut variables = Vec::with_capacity(units.len());
    let mut cursor = 1; // skip '='

    for (expr, unit) in expressions.iter().zip(units) {
        let name = synthetic_name(expr.index);

        text.push_str(&name);
        text.push_str(", ");
        text.push_str(INVOKE_FN);
        text.push('(');
        text.push_str(&quote_source(&unit.source));
        if let Some(range) = &range {
            text.push_str(", ");
            text.push_str(range);
        }
        text.push_str("), ");

        body.push_str(&source.text[cursor..expr.span.start]);
        body.push_str(&name);
        cursor = expr.span.end;
        variables.push(name);
    }
    body.push_str(&source.text[cursor..]);

    text.push_str(&body);
    text.push(')');

    Ok(WrapperFormula {
        text,
        variables,
        fingerprints: units.iter().map(|u| u.fingerprint).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::cell_ref::CellRef;
    use crate::engine::compile::{DynamicCompiler, UnitCache};
    use crate::engine::eval::EngineLimits;
    use crate::engine::extract::extract as extract_spans;

    fn compile_all(compiler: &DynamicCompiler, source: &SourceFormula) -> Vec<Arc<CompiledUnit>> {
        extract_spans(&source.text)
            .unwrap()
            .iter()
            .map(|e| compiler.compile(&e.source, &source.context).unwrap())
            .collect()
    }

    fn source(text: &str, sheet: &str, range_sheet: Option<&str>) -> SourceFormula {
        let range = RangeRef::new(
            range_sheet.map(str::to_string),
            CellRef::new(0, 0),
            CellRef::new(1, 3),
        );
        SourceFormula::new(text, CellAddress::new(sheet, CellRef::new(3, 0))).with_region(
            range,
            BindingContext::new(vec!["Region".into(), "Revenue".into()], None),
        )
    }

    #[test]
    fn test_assemble_single_span() {
        let compiler = DynamicCompiler::new(Arc::new(UnitCache::default()), EngineLimits::default());
        let src = source("=`sum(Revenue)`", "Data", Some("Data"));
        let wrapper = assemble(&src, &compile_all(&compiler, &src)).unwrap();
        assert_eq!(
            wrapper.text,
            r#"=LET(_snip0, SNIPPET("sum(Revenue)", A1:B4), _snip0)"#
        );
        assert_eq!(wrapper.variables, vec!["_snip0"]);
    }

    #[test]
    fn test_assemble_two_spans_preserves_skeleton() {
        let compiler = DynamicCompiler::new(Arc::new(UnitCache::default()), EngineLimits::default());
        let src = source(
            "=`sum(Revenue)`  / `count(Region)` & \" `x` \"",
            "Data",
            None,
        );
        let units = compile_all(&compiler, &src);
        let wrapper = assemble(&src, &units).unwrap();
        assert_eq!(
            wrapper.text,
            "=LET(_snip0, SNIPPET(\"sum(Revenue)\", A1:B4), _snip1, SNIPPET(\"count(Region)\", A1:B4), _snip0  / _snip1 & \" `x` \")"
        );
        assert_ne!(wrapper.fingerprints[0], wrapper.fingerprints[1]);
    }

    #[test]
    fn test_assemble_qualifies_other_sheet() {
        let compiler = DynamicCompiler::new(Arc::new(UnitCache::default()), EngineLimits::default());
        let src = source("=`sum(Revenue)` * 2", "Report", Some("Q1 Data"));
        let wrapper = assemble(&src, &compile_all(&compiler, &src)).unwrap();
        assert_eq!(
            wrapper.text,
            r#"=LET(_snip0, SNIPPET("sum(Revenue)", 'Q1 Data'!A1:B4), _snip0 * 2)"#
        );
    }

    #[test]
    fn test_assemble_escapes_source() {
        let compiler = DynamicCompiler::new(Arc::new(UnitCache::default()), EngineLimits::default());
        let src = SourceFormula::new(
            r#"=`"a\"b" + "c"`"#,
            CellAddress::new("Data", CellRef::new(0, 0)),
        );
        let wrapper = assemble(&src, &compile_all(&compiler, &src)).unwrap();
        assert_eq!(
            wrapper.text,
            r#"=LET(_snip0, SNIPPET("\"a\\\"b\" + \"c\""), _snip0)"#
        );
    }

    #[test]
    fn test_assemble_unit_count_mismatch() {
        let src = source("=`1` + `2`", "Data", None);
        let err = assemble(&src, &[]).unwrap_err();
        assert_eq!(
            err,
            AssembleError::UnitCountMismatch {
                expected: 2,
                found: 0
            }
        );
    }
}
