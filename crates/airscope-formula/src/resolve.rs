//! Reference binding
//!
//! Formula text may reference fields by ID (`{fldXXX}`) or by name
//! (`{Unit Price}`). Binding rewrites every reference to ID form against the
//! table that owns the formula so the dependency graph is keyed by IDs only.

use crate::ast::{Expr, FieldRef};
use crate::error::{FormulaError, FormulaResult};
use airscope_core::{FieldId, Table};

/// Bind all field references in `expr` to field IDs of `table`
///
/// Resolution order for each reference:
/// 1. ID form naming an existing field ID
/// 2. any form naming an existing field name (first match in schema order)
/// 3. otherwise [`FormulaError::UnresolvedReference`] naming the reference
pub fn bind(expr: &Expr, table: &Table, referenced_by: &FieldId) -> FormulaResult<Expr> {
    expr.try_map_fields(&mut |field_ref| {
        resolve_ref(field_ref, table, referenced_by).map(|id| Expr::Field(FieldRef::Id(id)))
    })
}

/// Resolve one reference to a field ID of `table`
pub fn resolve_ref(
    field_ref: &FieldRef,
    table: &Table,
    referenced_by: &FieldId,
) -> FormulaResult<FieldId> {
    if let FieldRef::Id(id) = field_ref {
        if table.field(id.as_str()).is_some() {
            return Ok(id.clone());
        }
    }

    table
        .field_by_name(field_ref.text())
        .map(|f| f.id.clone())
        .ok_or_else(|| FormulaError::UnresolvedReference {
            field_id: field_ref.text().to_string(),
            referenced_by: referenced_by.clone(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_formula;
    use airscope_core::{Field, FieldType};
    use pretty_assertions::assert_eq;

    fn table() -> Table {
        Table::new("tblOrders", "Orders")
            .with_field(Field::new("fldQty", "Qty", FieldType::Number))
            .with_field(Field::new("fldPrice", "Unit Price", FieldType::Currency))
            .with_field(Field::new("fldOdd", "fldLooksLikeAnId", FieldType::Number))
    }

    #[test]
    fn test_bind_names_to_ids() {
        let ast = parse_formula("{Qty} * {Unit Price} + {fldQty}").unwrap();
        let bound = bind(&ast, &table(), &"fldTotal".into()).unwrap();
        assert_eq!(
            bound,
            parse_formula("{fldQty} * {fldPrice} + {fldQty}").unwrap()
        );
    }

    #[test]
    fn test_id_shaped_name_falls_back_to_name() {
        let ast = parse_formula("{fldLooksLikeAnId}").unwrap();
        let bound = bind(&ast, &table(), &"fldTotal".into()).unwrap();
        assert_eq!(bound, Expr::field_id("fldOdd"));
    }

    #[test]
    fn test_unresolved_reference_names_missing_field() {
        let ast = parse_formula("{fldMissing} + 1").unwrap();
        match bind(&ast, &table(), &"fldTotal".into()) {
            Err(FormulaError::UnresolvedReference {
                field_id,
                referenced_by,
            }) => {
                assert_eq!(field_id, "fldMissing");
                assert_eq!(referenced_by, "fldTotal");
            }
            other => panic!("Expected UnresolvedReference, got {:?}", other),
        }
    }
}
