//! # airscope-formula
//!
//! Airtable formula tooling for airscope.
//!
//! This crate provides:
//! - Formula parsing (text → AST) and printing (AST → text)
//! - Field dependency graphs spanning linked tables
//! - Graph analysis: depth, cycles, ancestors and descendants
//! - Formula compression by inlining referenced formulas
//! - Evaluator generation (Python) and in-process evaluation
//!
//! ## Example
//!
//! ```rust
//! use airscope_core::{Field, FieldType, Schema, Table};
//! use airscope_formula::{build_graph, compress_field, CompressOptions};
//!
//! let table = Table::new("tblOrders", "Orders")
//!     .with_field(Field::new("fldQty", "Qty", FieldType::Number))
//!     .with_field(Field::formula("fldTotal", "Total", "{Qty} * 2"))
//!     .with_field(Field::formula("fldTax", "Tax", "{Total} * 0.2"));
//! let schema = Schema::new(vec![table.clone()]);
//!
//! let graph = build_graph(&table, &schema).unwrap();
//! let tax = compress_field(&graph, "fldTax", &CompressOptions::default()).unwrap();
//! assert_eq!(tax.text, "{Qty}*2*0.2");
//! ```

pub mod analyzer;
pub mod ast;
pub mod compress;
pub mod dependency;
pub mod error;
pub mod functions;
pub mod parser;
pub mod printer;
pub mod resolve;
pub mod transpile;
pub mod value;

pub use analyzer::{GraphAnalyzer, Reached, Traversal, TraversalOptions};
pub use ast::{BinaryOperator, Expr, FieldRef, UnaryOperator};
pub use compress::{compress, compress_field, inline, CompressOptions, Compressed};
pub use dependency::{build_graph, DependencyGraph, FieldNode, NodeKind};
pub use error::{FormulaError, FormulaResult, ParseError};
pub use functions::{registry, EvalContext, FunctionDef, FunctionRegistry};
pub use parser::{is_field_id, parse_formula};
pub use printer::{format_formula, FieldLabels, FieldNaming, FormatStyle, FormulaPrinter};
pub use resolve::bind;
pub use transpile::{
    compile, generate, AttributeRecord, DataAccess, GenerateOptions, MappingRecord, Program,
    RecordAccess,
};
pub use value::{ErrorValue, Value};
