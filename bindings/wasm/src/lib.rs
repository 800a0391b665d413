//! WebAssembly bindings for airscope
//!
//! This module provides wasm-bindgen-based WebAssembly bindings for the airscope library,
//! allowing the browser UI to analyze Airtable schemas and their formulas client-side.

use serde::Serialize;
use wasm_bindgen::prelude::*;

use airscope::prelude::{
    CompressOptions, EvalContext, FormatStyle, GenerateOptions, GraphAnalyzer, MappingRecord,
    SchemaAnalysisExt, SchemaExt, TraversalOptions,
};
use airscope::{format_formula, parse_formula, DependencyGraph, Schema as CoreSchema};

// =============================================================================
// Error Conversion
// =============================================================================

fn to_js_error(e: impl std::fmt::Display) -> JsError {
    JsError::new(&e.to_string())
}

/// Serialize as plain JS objects and arrays (never `Map`)
fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsError> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(to_js_error)
}

/// Options object from JS; `undefined`/`null` take the defaults
fn options_from_js<T: Default + serde::de::DeserializeOwned>(value: JsValue) -> Result<T, JsError> {
    if value.is_null() || value.is_undefined() {
        Ok(T::default())
    } else {
        serde_wasm_bindgen::from_value(value).map_err(to_js_error)
    }
}

fn parse_style(style: Option<String>) -> Result<FormatStyle, JsError> {
    match style.as_deref() {
        None | Some("compact") => Ok(FormatStyle::Compact),
        Some("logical") => Ok(FormatStyle::Logical),
        Some(other) => Err(JsError::new(&format!("Unknown format style: {}", other))),
    }
}

/// Evaluation context reading the JS clock
fn js_context() -> EvalContext {
    let millis = js_sys::Date::now() as i64;
    let now = chrono::DateTime::from_timestamp_millis(millis)
        .map(|now| now.naive_utc())
        .unwrap_or_default();
    EvalContext::at(now)
}

// =============================================================================
// Graph view
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphNode<'g> {
    id: &'g str,
    name: &'g str,
    table_id: &'g str,
    field_type: String,
    formula: Option<&'g str>,
    /// `None` when the field sits on or above a cycle
    depth: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphView<'g> {
    table_id: &'g str,
    nodes: Vec<GraphNode<'g>>,
    /// `[reader, read]` pairs
    edges: Vec<(&'g str, &'g str)>,
    cycle: Option<Vec<String>>,
}

impl<'g> GraphView<'g> {
    fn new(graph: &'g DependencyGraph) -> Self {
        let analyzer = GraphAnalyzer::new(graph);
        let nodes = graph
            .nodes()
            .iter()
            .map(|node| GraphNode {
                id: node.id.as_str(),
                name: &node.name,
                table_id: node.table_id.as_str(),
                field_type: node.field_type.to_string(),
                formula: node.formula_text.as_deref(),
                depth: analyzer.depth(node.id.as_str()).ok(),
            })
            .collect();
        let edges = graph
            .edges()
            .map(|(reader, read)| (reader.as_str(), read.as_str()))
            .collect();
        let cycle = analyzer
            .detect_cycle()
            .map(|ids| ids.iter().map(ToString::to_string).collect());
        Self {
            table_id: graph.table_id().as_str(),
            nodes,
            edges,
            cycle,
        }
    }
}

// =============================================================================
// Schema - JavaScript wrapper
// =============================================================================

/// A parsed Airtable base schema.
#[wasm_bindgen]
pub struct Schema {
    inner: CoreSchema,
}

#[wasm_bindgen]
impl Schema {
    /// Parse a schema in the metadata API shape (`{"tables": [...]}`)
    #[wasm_bindgen(constructor)]
    pub fn new(json: &str) -> Result<Schema, JsError> {
        let inner = CoreSchema::from_json(json).map_err(to_js_error)?;
        Ok(Self { inner })
    }

    #[wasm_bindgen(getter, js_name = tableCount)]
    pub fn table_count(&self) -> usize {
        self.inner.tables.len()
    }

    #[wasm_bindgen(getter, js_name = tableNames)]
    pub fn table_names(&self) -> Vec<String> {
        self.inner.tables.iter().map(|t| t.name.clone()).collect()
    }

    /// Formula field names of a table, in schema order
    #[wasm_bindgen(js_name = formulaFields)]
    pub fn formula_fields(&self, table: &str) -> Result<Vec<String>, JsError> {
        let table = self.inner.find_table(table).map_err(to_js_error)?;
        Ok(table.formula_fields().map(|f| f.name.clone()).collect())
    }

    /// Dependency graph of a table: nodes with depths, edges and the first cycle
    pub fn graph(&self, table: &str) -> Result<JsValue, JsError> {
        let graph = self.inner.dependency_graph(table).map_err(to_js_error)?;
        to_js(&GraphView::new(&graph))
    }

    /// Fields a field depends on, nearest first
    pub fn ancestors(&self, table: &str, field: &str, options: JsValue) -> Result<JsValue, JsError> {
        self.traverse(table, field, options, false)
    }

    /// Fields depending on a field, nearest first
    pub fn descendants(
        &self,
        table: &str,
        field: &str,
        options: JsValue,
    ) -> Result<JsValue, JsError> {
        self.traverse(table, field, options, true)
    }

    /// Compress one formula field; `options` is `{depth, naming, style}`
    pub fn compress(&self, table: &str, field: &str, options: JsValue) -> Result<JsValue, JsError> {
        let options: CompressOptions = options_from_js(options)?;
        let compressed = self
            .inner
            .compress_field(table, field, &options)
            .map_err(to_js_error)?;
        to_js(&compressed)
    }

    /// Python evaluator source; `options` is `{dataAccess, includeHeader}`
    pub fn generate(&self, table: &str, options: JsValue) -> Result<String, JsError> {
        let options: GenerateOptions = options_from_js(options)?;
        self.inner.generate(table, &options).map_err(to_js_error)
    }

    /// Evaluate a table's formulas for one record keyed by field ID
    ///
    /// Returns the record with every formula field filled in.
    pub fn evaluate(&self, table: &str, record: JsValue) -> Result<JsValue, JsError> {
        let json: serde_json::Value = options_from_js(record)?;
        let program = self.inner.compile(table).map_err(to_js_error)?;
        let mut record = MappingRecord::from_json(&json);
        program.evaluate(&mut record, &js_context());
        to_js(&record.to_json())
    }

    /// Depth, cycles, complexity and unused fields of every table
    pub fn analyze(&self) -> Result<JsValue, JsError> {
        let report = self.inner.analyze().map_err(to_js_error)?;
        to_js(&report)
    }

    #[wasm_bindgen(js_name = analyzeTable)]
    pub fn analyze_table(&self, table: &str) -> Result<JsValue, JsError> {
        let report = self.inner.analyze_table(table).map_err(to_js_error)?;
        to_js(&report)
    }

    #[wasm_bindgen(js_name = toJson)]
    pub fn to_json(&self) -> Result<String, JsError> {
        self.inner.to_json().map_err(to_js_error)
    }
}

impl Schema {
    fn traverse(
        &self,
        table: &str,
        field: &str,
        options: JsValue,
        downstream: bool,
    ) -> Result<JsValue, JsError> {
        let options: TraversalOptions = options_from_js(options)?;
        let graph = self.inner.dependency_graph(table).map_err(to_js_error)?;
        let id = self
            .inner
            .find_table(table)
            .map_err(to_js_error)?
            .find_field(field)
            .map(|f| f.id.clone())
            .ok_or_else(|| JsError::new(&format!("Field not found: {}", field)))?;

        let analyzer = GraphAnalyzer::new(&graph);
        let traversal = if downstream {
            analyzer.descendants(id.as_str(), &options)
        } else {
            analyzer.ancestors(id.as_str(), &options)
        }
        .map_err(to_js_error)?;
        to_js(&traversal)
    }
}

// =============================================================================
// Formula helpers
// =============================================================================

/// Re-serialize a formula; `style` is `"compact"` (default) or `"logical"`
#[wasm_bindgen(js_name = formatFormula)]
pub fn format_formula_js(formula: &str, style: Option<String>) -> Result<String, JsError> {
    let style = parse_style(style)?;
    format_formula(formula, style).map_err(to_js_error)
}

/// Formula AST as a plain object
#[wasm_bindgen(js_name = parseFormula)]
pub fn parse_formula_js(formula: &str) -> Result<JsValue, JsError> {
    let ast = parse_formula(formula).map_err(to_js_error)?;
    to_js(&ast)
}

#[wasm_bindgen(start)]
pub fn init() {}
