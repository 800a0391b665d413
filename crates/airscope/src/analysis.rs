//! Schema-level analysis
//!
//! Scores formula complexity, finds fields nothing reads, and gathers both
//! into a per-table report.
//!
//! # Example
//!
//! ```rust
//! use airscope::prelude::*;
//!
//! let schema = Schema::from_json(r#"{"tables": [{
//!     "id": "tblOrders", "name": "Orders", "primaryFieldId": "fldName",
//!     "fields": [
//!         {"id": "fldName", "name": "Name", "type": "singleLineText"},
//!         {"id": "fldQty", "name": "Qty", "type": "number"},
//!         {"id": "fldNote", "name": "Note", "type": "multilineText"},
//!         {"id": "fldTotal", "name": "Total", "type": "formula",
//!          "options": {"formula": "{Qty} * 2"}}
//!     ]
//! }]}"#).unwrap();
//!
//! let report = schema.analyze_table("Orders").unwrap();
//! assert_eq!(report.max_depth, Some(1));
//! assert_eq!(report.unused_fields, vec!["fldNote", "fldTotal"]);
//! ```

use crate::{
    build_graph, DependencyGraph, Error, FieldId, FormulaResult, GraphAnalyzer, Schema, Table,
};
use ahash::AHashSet;
use serde::Serialize;
use tracing::debug;

/// Weight of each function call in [`ComplexityScore::score`]
pub const FUNCTION_WEIGHT: usize = 2;
/// Weight of each nesting level
pub const NESTING_WEIGHT: usize = 3;
/// Weight of each level of dependency depth
pub const DEPTH_WEIGHT: usize = 4;

/// Structural complexity of one formula field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityScore {
    pub field_id: FieldId,
    pub field_name: String,
    /// AST nodes
    pub node_count: usize,
    /// Function calls, repeats included
    pub function_count: usize,
    /// Longest root-to-leaf path of the AST
    pub nesting_depth: usize,
    /// Distinct fields the formula reads
    pub field_references: usize,
    /// Dependency depth; `None` when the field is on a cycle
    pub dependency_depth: Option<usize>,
    /// `nodes + 2·functions + 3·nesting + 4·depth`
    pub score: usize,
}

/// Analysis of one table
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableReport {
    pub table_id: String,
    pub table_name: String,
    pub field_count: usize,
    pub formula_count: usize,
    /// Deepest field of the table; `None` when the graph has a cycle
    pub max_depth: Option<usize>,
    /// First cycle found, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle: Option<Vec<FieldId>>,
    /// Formula fields, most complex first
    pub complexity: Vec<ComplexityScore>,
    /// Fields nothing in the schema reads (primary field excluded)
    pub unused_fields: Vec<FieldId>,
}

/// Analysis of every table of a schema
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaReport {
    pub table_count: usize,
    pub field_count: usize,
    pub tables: Vec<TableReport>,
}

impl SchemaReport {
    /// Pretty-printed JSON
    pub fn to_json(&self) -> FormulaResult<String> {
        Ok(serde_json::to_string_pretty(self).map_err(airscope_core::Error::from)?)
    }
}

/// Complexity of every formula field of the graph's table, most complex
/// first (ties keep schema order)
pub fn complexity(graph: &DependencyGraph) -> Vec<ComplexityScore> {
    let analyzer = GraphAnalyzer::new(graph);
    let mut scores: Vec<ComplexityScore> = graph
        .table_nodes()
        .filter_map(|node| {
            let expr = node.formula.as_ref()?;
            let node_count = expr.node_count();
            let function_count = expr.function_names().len();
            let nesting_depth = expr.nesting_depth();
            let dependency_depth = analyzer.depth(node.id.as_str()).ok();
            let score = node_count
                + FUNCTION_WEIGHT * function_count
                + NESTING_WEIGHT * nesting_depth
                + DEPTH_WEIGHT * dependency_depth.unwrap_or(0);
            Some(ComplexityScore {
                field_id: node.id.clone(),
                field_name: node.name.clone(),
                node_count,
                function_count,
                nesting_depth,
                field_references: expr.field_refs().len(),
                dependency_depth,
                score,
            })
        })
        .collect();
    scores.sort_by(|a, b| b.score.cmp(&a.score));
    scores
}

/// Dependency graph of every table, in schema order
fn table_graphs(schema: &Schema) -> FormulaResult<Vec<DependencyGraph>> {
    schema
        .tables
        .iter()
        .map(|table| build_graph(table, schema))
        .collect()
}

fn reads_of(graphs: &[DependencyGraph]) -> AHashSet<FieldId> {
    graphs
        .iter()
        .flat_map(|graph| graph.edges().map(|(_, target)| target.clone()))
        .collect()
}

/// Every field some formula, rollup, lookup or count in the schema reads
pub fn read_fields(schema: &Schema) -> FormulaResult<AHashSet<FieldId>> {
    Ok(reads_of(&table_graphs(schema)?))
}

/// Fields of `table` that nothing in `schema` reads, in schema order
///
/// The primary field is never reported.
pub fn unused_fields<'t>(schema: &Schema, table: &'t Table) -> FormulaResult<Vec<&'t FieldId>> {
    let read = read_fields(schema)?;
    Ok(unused_in(table, &read))
}

fn unused_in<'t>(table: &'t Table, read: &AHashSet<FieldId>) -> Vec<&'t FieldId> {
    table
        .fields
        .iter()
        .map(|field| &field.id)
        .filter(|id| table.primary_field_id.as_ref() != Some(*id))
        .filter(|id| !read.contains(*id))
        .collect()
}

fn table_report(
    table: &Table,
    graph: &DependencyGraph,
    read: &AHashSet<FieldId>,
) -> FormulaResult<TableReport> {
    let analyzer = GraphAnalyzer::new(graph);
    let cycle = analyzer.detect_cycle();
    let max_depth = match cycle {
        Some(_) => None,
        None => Some(analyzer.max_depth()?),
    };

    let report = TableReport {
        table_id: table.id.to_string(),
        table_name: table.name.clone(),
        field_count: table.fields.len(),
        formula_count: table.formula_fields().count(),
        max_depth,
        cycle,
        complexity: complexity(graph),
        unused_fields: unused_in(table, read).into_iter().cloned().collect(),
    };
    debug!(
        table = %table.id,
        formulas = report.formula_count,
        unused = report.unused_fields.len(),
        cyclic = report.cycle.is_some(),
        "analyzed table"
    );
    Ok(report)
}

/// Extension trait adding analysis to [`Schema`]
pub trait SchemaAnalysisExt {
    /// Report on every table
    fn analyze(&self) -> FormulaResult<SchemaReport>;

    /// Report on one table, by ID or name
    fn analyze_table(&self, table: &str) -> FormulaResult<TableReport>;
}

impl SchemaAnalysisExt for Schema {
    fn analyze(&self) -> FormulaResult<SchemaReport> {
        let graphs = table_graphs(self)?;
        let read = reads_of(&graphs);
        let tables = self
            .tables
            .iter()
            .zip(&graphs)
            .map(|(table, graph)| table_report(table, graph, &read))
            .collect::<FormulaResult<Vec<_>>>()?;
        Ok(SchemaReport {
            table_count: self.tables.len(),
            field_count: self.field_count(),
            tables,
        })
    }

    fn analyze_table(&self, table: &str) -> FormulaResult<TableReport> {
        let table = self.find_table(table)?;
        let graphs = table_graphs(self)?;
        let read = reads_of(&graphs);
        let (_, graph) = self
            .tables
            .iter()
            .zip(&graphs)
            .find(|(candidate, _)| std::ptr::eq(*candidate, table))
            .ok_or_else(|| Error::TableNotFound(table.id.to_string()))?;
        table_report(table, graph, &read)
    }
}
