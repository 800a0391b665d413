//! Evaluator generation
//!
//! A table's formula fields are compiled once into a typed [`Program`]
//! (see [`ir`]) in dependency order. The program can be rendered as a
//! standalone Python module ([`generate`]) or evaluated in-process against
//! a record ([`Program::evaluate`]).
//!
//! Two data-access conventions are supported:
//!
//! - [`DataAccess::Mapping`]: a record is a mapping keyed by field ID
//! - [`DataAccess::Record`]: a record is an object with one attribute per
//!   field, named after the field (`Unit Price` -> `unit_price`)

pub mod interpret;
pub mod ir;
mod lower;
pub mod python;

pub use interpret::{AttributeRecord, MappingRecord, RecordAccess};
pub use ir::{ComputeUnit, FieldSlot, Ir, Program};
pub use python::PythonPrinter;

use crate::analyzer::GraphAnalyzer;
use crate::dependency::{DependencyGraph, NodeKind};
use crate::error::{FormulaError, FormulaResult};
use ahash::AHashMap;
use airscope_core::Table;
use lower::Lowerer;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How generated code reads and writes field values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataAccess {
    /// `values["fldXXX"]`
    #[default]
    Mapping,
    /// `record.field_name`
    Record,
}

/// Options for [`generate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateOptions {
    pub data_access: DataAccess,
    /// Module docstring and per-field formula comments
    pub include_header: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            data_access: DataAccess::Mapping,
            include_header: true,
        }
    }
}

impl GenerateOptions {
    pub fn with_data_access(mut self, data_access: DataAccess) -> Self {
        self.data_access = data_access;
        self
    }

    pub fn with_header(mut self, include_header: bool) -> Self {
        self.include_header = include_header;
        self
    }
}

/// Compile the formula fields of `table`
///
/// `graph` must be the dependency graph built for `table`. Formula fields
/// become compute units in evaluation order; every other field (including
/// rollups, lookups and counts) is an input the caller supplies.
///
/// # Errors
///
/// [`FormulaError::CyclicGraph`] when the formulas form a cycle,
/// [`FormulaError::UnsupportedFunction`] / [`FormulaError::ArgumentCount`]
/// for calls the evaluator cannot express.
pub fn compile(table: &Table, graph: &DependencyGraph) -> FormulaResult<Program> {
    if graph.table_id() != &table.id {
        return Err(FormulaError::UnknownTable(table.id.to_string()));
    }
    let analyzer = GraphAnalyzer::new(graph);
    let order = analyzer.evaluation_order()?;

    let attributes = ir::attribute_names(table.fields.iter().map(|f| f.name.as_str()));
    let slots: Vec<FieldSlot> = table
        .fields
        .iter()
        .zip(attributes)
        .map(|(field, attribute)| FieldSlot {
            field_id: field.id.clone(),
            name: field.name.clone(),
            attribute,
            kind: NodeKind::of(field.field_type),
        })
        .collect();
    let index: AHashMap<&str, usize> = slots
        .iter()
        .enumerate()
        .map(|(i, slot)| (slot.field_id.as_str(), i))
        .collect();
    let lowerer = Lowerer::new(&index);

    let mut units = Vec::new();
    for node in order {
        if node.kind != NodeKind::Formula {
            continue;
        }
        let Some(expr) = &node.formula else {
            continue;
        };
        let slot = index
            .get(node.id.as_str())
            .copied()
            .ok_or_else(|| FormulaError::UnknownField(node.id.to_string()))?;
        units.push(ComputeUnit {
            slot,
            depth: analyzer.depth(node.id.as_str())?,
            formula: node.formula_text.clone().unwrap_or_default(),
            body: lowerer.lower(expr)?,
        });
    }

    debug!(
        table = %table.id,
        units = units.len(),
        inputs = slots.len() - units.len(),
        "compiled table formulas"
    );
    Ok(Program {
        table_id: table.id.clone(),
        table_name: table.name.clone(),
        slots,
        units,
    })
}

/// Generate a Python evaluator module for `table`
pub fn generate(
    table: &Table,
    graph: &DependencyGraph,
    options: &GenerateOptions,
) -> FormulaResult<String> {
    let program = compile(table, graph)?;
    Ok(PythonPrinter::new(&program, *options).print())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::build_graph;
    use crate::functions::EvalContext;
    use crate::value::{ErrorValue, Value};
    use airscope_core::{Field, FieldOptions, FieldType, Schema};
    use pretty_assertions::assert_eq;

    fn orders() -> Table {
        Table::new("tblOrders", "Orders")
            .with_field(Field::new("fldQty", "Qty", FieldType::Number))
            .with_field(Field::new("fldPrice", "Unit Price", FieldType::Currency))
            .with_field(Field::formula("fldTax", "Tax", "ROUND({Total} * 0.2, 2)"))
            .with_field(Field::formula("fldTotal", "Total", "{Qty} * {Unit Price}"))
            .with_field(Field::formula(
                "fldLabel",
                "Label",
                "IF({Total} > 10, 'big', 'small') & ' order'",
            ))
    }

    fn compiled(table: &Table) -> FormulaResult<Program> {
        let schema = Schema::new(vec![table.clone()]);
        let graph = build_graph(table, &schema)?;
        compile(table, &graph)
    }

    fn generated(table: &Table, options: GenerateOptions) -> String {
        let schema = Schema::new(vec![table.clone()]);
        let graph = build_graph(table, &schema).unwrap();
        generate(table, &graph, &options).unwrap()
    }

    #[test]
    fn test_compile_orders_units() {
        let program = compiled(&orders()).unwrap();
        let computed: Vec<&str> = program.computed().map(|s| s.field_id.as_str()).collect();
        assert_eq!(computed, vec!["fldTotal", "fldTax", "fldLabel"]);
        let inputs: Vec<&str> = program.inputs().map(|s| s.attribute.as_str()).collect();
        assert_eq!(inputs, vec!["qty", "unit_price"]);
        assert_eq!(program.functions_used(), vec!["ROUND"]);
        assert_eq!(program.record_type_name(), "OrdersRecord");
    }

    #[test]
    fn test_evaluate_mapping() {
        let program = compiled(&orders()).unwrap();
        let mut record = MappingRecord::from_json(&serde_json::json!({
            "fldQty": 3,
            "fldPrice": 4,
        }));
        program.evaluate(&mut record, &EvalContext::new());
        assert_eq!(record.get("fldTotal"), Some(&Value::Number(12.0)));
        assert_eq!(record.get("fldTax"), Some(&Value::Number(2.4)));
        assert_eq!(record.get("fldLabel"), Some(&Value::from("big order")));
    }

    #[test]
    fn test_data_access_parity() {
        let program = compiled(&orders()).unwrap();
        let ctx = EvalContext::new();
        for (qty, price) in [(1.0, 2.5), (0.0, 7.0), (12.0, 0.5)] {
            let mut mapping = MappingRecord::new();
            mapping.insert("fldQty", qty);
            mapping.insert("fldPrice", price);
            let mut attributes = AttributeRecord::from_mapping(&program, &mapping);

            program.evaluate(&mut mapping, &ctx);
            program.evaluate(&mut attributes, &ctx);

            for slot in program.computed() {
                assert_eq!(
                    mapping.get(slot.field_id.as_str()),
                    attributes.get(&slot.attribute),
                    "{} differs",
                    slot.name
                );
            }
        }
    }

    #[test]
    fn test_errors_flow_through_fields() {
        let table = Table::new("tblT", "T")
            .with_field(Field::new("fldA", "A", FieldType::Number))
            .with_field(Field::formula("fldR", "Ratio", "1 / {A}"))
            .with_field(Field::formula("fldS", "Safe", "IF(ISERROR({Ratio}), 0, {Ratio})"))
            .with_field(Field::formula("fldP", "Passed", "{Ratio} + 1"));
        let program = compiled(&table).unwrap();
        let mut record = MappingRecord::new();
        record.insert("fldA", 0.0);
        program.evaluate(&mut record, &EvalContext::new());
        assert_eq!(record.get("fldR"), Some(&Value::Error(ErrorValue::DivZero)));
        assert_eq!(record.get("fldS"), Some(&Value::Number(0.0)));
        assert_eq!(record.get("fldP"), Some(&Value::Error(ErrorValue::DivZero)));
    }

    #[test]
    fn test_switch_picks_matching_case() {
        let table = Table::new("tblT", "T")
            .with_field(Field::new("fldS", "Status", FieldType::SingleLineText))
            .with_field(Field::formula(
                "fldC",
                "Code",
                "SWITCH({Status}, 'open', 1, 'closed', 2, 0)",
            ));
        let program = compiled(&table).unwrap();
        let ctx = EvalContext::new();
        for (status, code) in [("open", 1.0), ("closed", 2.0), ("other", 0.0)] {
            let mut record = MappingRecord::new();
            record.insert("fldS", status);
            program.evaluate(&mut record, &ctx);
            assert_eq!(record.get("fldC"), Some(&Value::Number(code)));
        }
    }

    #[test]
    fn test_rollups_are_inputs() {
        let items = Table::new("tblItems", "Items")
            .with_field(Field::new("fldAmount", "Amount", FieldType::Number));
        let orders = Table::new("tblOrders", "Orders")
            .with_field(
                Field::new("fldItems", "Items", FieldType::MultipleRecordLinks).with_options(
                    FieldOptions {
                        linked_table_id: Some("tblItems".into()),
                        ..Default::default()
                    },
                ),
            )
            .with_field(
                Field::new("fldSum", "Item Total", FieldType::Rollup).with_options(FieldOptions {
                    record_link_field_id: Some("fldItems".into()),
                    field_id_in_linked_table: Some("fldAmount".into()),
                    ..Default::default()
                }),
            )
            .with_field(Field::formula("fldDouble", "Double", "{Item Total} * 2"));
        let schema = Schema::new(vec![items, orders.clone()]);
        let graph = build_graph(&orders, &schema).unwrap();
        let program = compile(&orders, &graph).unwrap();

        let inputs: Vec<&str> = program.inputs().map(|s| s.field_id.as_str()).collect();
        assert_eq!(inputs, vec!["fldItems", "fldSum"]);
        let mut record = MappingRecord::new();
        record.insert("fldSum", 21.0);
        program.evaluate(&mut record, &EvalContext::new());
        assert_eq!(record.get("fldDouble"), Some(&Value::Number(42.0)));
    }

    #[test]
    fn test_compile_errors() {
        let unsupported = Table::new("tblT", "T")
            .with_field(Field::formula("fldA", "A", "VLOOKUP(1, 2)"));
        assert!(matches!(
            compiled(&unsupported),
            Err(FormulaError::UnsupportedFunction { name }) if name == "VLOOKUP"
        ));

        let arity = Table::new("tblT", "T").with_field(Field::formula("fldA", "A", "LEFT('x')"));
        assert!(matches!(
            compiled(&arity),
            Err(FormulaError::ArgumentCount { function, actual: 1, .. }) if function == "LEFT"
        ));

        let cyclic = Table::new("tblT", "T")
            .with_field(Field::formula("fldX", "X", "{Y} + 1"))
            .with_field(Field::formula("fldY", "Y", "{X} + 1"));
        assert!(matches!(
            compiled(&cyclic),
            Err(FormulaError::CyclicGraph { .. })
        ));
    }

    #[test]
    fn test_generate_mapping_module() {
        let source = generated(&orders(), GenerateOptions::default());
        assert!(source.starts_with("\"\"\"Formula evaluator for table Orders (tblOrders)."));
        assert!(source.contains("def compute_total(values):"));
        assert!(source.contains("return _op_mul(values.get(\"fldQty\"), values.get(\"fldPrice\"))"));
        assert!(source.contains("return _fn_round(_op_mul(values.get(\"fldTotal\"), 0.2), 2.0)"));
        assert!(source.contains("def _fn_round("));
        assert!(!source.contains("def _fn_upper("));
        assert!(!source.contains("dataclass"));

        let total = source.find("def compute_total").unwrap();
        let tax = source.find("def compute_tax").unwrap();
        assert!(total < tax);
        assert!(source.contains("    (\"fldTotal\", compute_total),\n    (\"fldTax\", compute_tax),"));
    }

    #[test]
    fn test_generate_record_module() {
        let options = GenerateOptions::default()
            .with_data_access(DataAccess::Record)
            .with_header(false);
        let source = generated(&orders(), options);
        assert!(source.starts_with("import calendar as _calendar\n"));
        assert!(source.contains("@dataclass\nclass OrdersRecord:\n    qty: object = None\n"));
        assert!(source.contains("def compute_total(record):\n    return _op_mul(record.qty, record.unit_price)\n"));
        assert!(source.contains("_if(_op_gt(record.total, 10.0), lambda: \"big\", lambda: \"small\")"));
        assert!(source.contains("    \"unit_price\": \"fldPrice\",\n"));
        assert!(!source.contains("    #   "));
    }

    #[test]
    fn test_generate_rejects_foreign_graph() {
        let table = orders();
        let other = Table::new("tblOther", "Other");
        let schema = Schema::new(vec![table.clone(), other.clone()]);
        let graph = build_graph(&other, &schema).unwrap();
        assert!(matches!(
            generate(&table, &graph, &GenerateOptions::default()),
            Err(FormulaError::UnknownTable(id)) if id == "tblOrders"
        ));
    }
}
