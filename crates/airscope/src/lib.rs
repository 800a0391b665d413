//! # airscope
//!
//! Static analysis for Airtable base schemas.
//!
//! Airscope reads a schema in the shape the Airtable metadata API returns
//! and answers questions about its formulas.
//!
//! ## Features
//!
//! - Parse formulas into an AST and print them back (compact or indented)
//! - Build field dependency graphs, across linked tables
//! - Field depth, cycle detection, upstream/downstream queries
//! - Formula compression by inlining referenced formula fields
//! - Complexity scoring and unused-field detection
//! - Python evaluator generation, plus an in-process evaluator for parity checks
//!
//! ## Example
//!
//! ```rust
//! use airscope::prelude::*;
//!
//! let schema = Schema::from_json(r#"{"tables": [{
//!     "id": "tblOrders", "name": "Orders",
//!     "fields": [
//!         {"id": "fldQty", "name": "Qty", "type": "number"},
//!         {"id": "fldPrice", "name": "Price", "type": "currency"},
//!         {"id": "fldTotal", "name": "Total", "type": "formula",
//!          "options": {"formula": "{Qty} * {Price}"}}
//!     ]
//! }]}"#).unwrap();
//!
//! // Evaluate the table's formulas for one record
//! let program = schema.compile("Orders").unwrap();
//! let mut record = MappingRecord::new();
//! record.insert("fldQty", 3.0);
//! record.insert("fldPrice", 4.0);
//! program.evaluate(&mut record, &EvalContext::new());
//! assert_eq!(record.get("fldTotal"), Some(&Value::Number(12.0)));
//!
//! // Or generate a standalone Python evaluator
//! let source = schema.generate("Orders", &GenerateOptions::default()).unwrap();
//! assert!(source.contains("def compute_total(values):"));
//! ```

pub mod analysis;
pub mod prelude;

pub use analysis::{ComplexityScore, SchemaAnalysisExt, SchemaReport, TableReport};

// Re-export core types
pub use airscope_core::{Error, Field, FieldId, FieldOptions, FieldType, Result, Schema, Table, TableId};

// Re-export formula types
pub use airscope_formula::{
    build_graph, compile, compress, compress_field, format_formula, generate, inline,
    parse_formula, registry, AttributeRecord, BinaryOperator, CompressOptions, Compressed,
    DataAccess, DependencyGraph, ErrorValue, EvalContext, Expr, FieldNaming, FieldNode, FieldRef,
    FormatStyle, FormulaError, FormulaPrinter, FormulaResult, GenerateOptions, GraphAnalyzer,
    MappingRecord, NodeKind, ParseError, Program, Reached, RecordAccess, Traversal,
    TraversalOptions, UnaryOperator, Value,
};

use tracing::debug;

/// Extension trait running the formula pipeline on a [`Schema`]
///
/// Tables and fields are looked up by ID or name.
pub trait SchemaExt {
    /// Dependency graph rooted at a table
    fn dependency_graph(&self, table: &str) -> FormulaResult<DependencyGraph>;

    /// Compress one formula field
    fn compress_field(
        &self,
        table: &str,
        field: &str,
        options: &CompressOptions,
    ) -> FormulaResult<Compressed>;

    /// Compile a table's formulas for in-process evaluation
    fn compile(&self, table: &str) -> FormulaResult<Program>;

    /// Generate a Python evaluator for a table
    fn generate(&self, table: &str, options: &GenerateOptions) -> FormulaResult<String>;
}

impl SchemaExt for Schema {
    fn dependency_graph(&self, table: &str) -> FormulaResult<DependencyGraph> {
        let table = self.find_table(table)?;
        build_graph(table, self)
    }

    fn compress_field(
        &self,
        table: &str,
        field: &str,
        options: &CompressOptions,
    ) -> FormulaResult<Compressed> {
        let table = self.find_table(table)?;
        let field = table
            .find_field(field)
            .ok_or_else(|| Error::FieldNotFound(field.to_string()))?;
        let graph = build_graph(table, self)?;
        debug!(table = %table.id, field = %field.id, "compressing field");
        airscope_formula::compress_field(&graph, field.id.as_str(), options)
    }

    fn compile(&self, table: &str) -> FormulaResult<Program> {
        let table = self.find_table(table)?;
        let graph = build_graph(table, self)?;
        airscope_formula::compile(table, &graph)
    }

    fn generate(&self, table: &str, options: &GenerateOptions) -> FormulaResult<String> {
        let table = self.find_table(table)?;
        let graph = build_graph(table, self)?;
        airscope_formula::generate(table, &graph, options)
    }
}
