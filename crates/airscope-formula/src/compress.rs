//! Formula compression: inline referenced formula fields
//!
//! Compressing a formula replaces each reference to another formula field
//! with that field's own formula, recursively, up to a depth limit. The
//! result is one self-contained expression over input fields.

use crate::ast::{Expr, FieldRef};
use crate::dependency::DependencyGraph;
use crate::error::{FormulaError, FormulaResult};
use crate::printer::{FieldNaming, FormatStyle, FormulaPrinter};
use airscope_core::FieldId;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;

/// Compression options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompressOptions {
    /// Inlining levels (None = until only non-formula fields remain)
    pub depth: Option<usize>,
    /// Rendering of the remaining field references
    pub naming: FieldNaming,
    /// Output layout
    pub style: FormatStyle,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            depth: None,
            naming: FieldNaming::Names,
            style: FormatStyle::Compact,
        }
    }
}

impl CompressOptions {
    pub fn with_depth(mut self, depth: Option<usize>) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_naming(mut self, naming: FieldNaming) -> Self {
        self.naming = naming;
        self
    }

    pub fn with_style(mut self, style: FormatStyle) -> Self {
        self.style = style;
        self
    }
}

/// A compressed field formula
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Compressed {
    pub field_id: FieldId,
    /// Expanded expression, references in ID form
    #[serde(skip)]
    pub expr: Expr,
    /// Rendered formula
    pub text: String,
    /// Formula fields that were inlined, in first-inlined order
    pub inlined: Vec<FieldId>,
    /// Length of the rendered text before compression
    pub original_length: usize,
}

/// Inline formula fields into `ast` and render the result
///
/// References the graph cannot resolve are left as written.
pub fn compress(ast: &Expr, graph: &DependencyGraph, options: &CompressOptions) -> String {
    let expanded = inline(ast, graph, options.depth);
    render(&expanded, graph, options)
}

/// Inline formula fields into `ast` without rendering
pub fn inline(ast: &Expr, graph: &DependencyGraph, depth: Option<usize>) -> Expr {
    Inliner::new(graph).expand(ast, depth)
}

/// Compress the formula of one field of the graph
pub fn compress_field(
    graph: &DependencyGraph,
    field_id: &str,
    options: &CompressOptions,
) -> FormulaResult<Compressed> {
    let node = graph
        .node(field_id)
        .ok_or_else(|| FormulaError::UnknownField(field_id.to_string()))?;
    let formula = node
        .formula
        .as_ref()
        .ok_or_else(|| FormulaError::UnknownField(format!("{} is not a formula field", field_id)))?;

    let mut inliner = Inliner::new(graph);
    inliner.path.push(node.id.clone());
    let expr = inliner.expand(formula, options.depth);

    let original = render(formula, graph, options);
    let text = render(&expr, graph, options);
    tracing::debug!(
        field = %node.id,
        inlined = inliner.inlined.len(),
        before = original.len(),
        after = text.len(),
        "compressed formula"
    );

    Ok(Compressed {
        field_id: node.id.clone(),
        expr,
        text,
        inlined: inliner.inlined,
        original_length: original.len(),
    })
}

fn render(expr: &Expr, graph: &DependencyGraph, options: &CompressOptions) -> String {
    FormulaPrinter::new(options.style)
        .with_naming(options.naming, graph)
        .print(expr)
}

struct Inliner<'g> {
    graph: &'g DependencyGraph,
    /// Fields currently being expanded, outermost first
    path: Vec<FieldId>,
    inlined: Vec<FieldId>,
}

impl<'g> Inliner<'g> {
    fn new(graph: &'g DependencyGraph) -> Self {
        Self {
            graph,
            path: Vec::new(),
            inlined: Vec::new(),
        }
    }

    fn expand(&mut self, expr: &Expr, remaining: Option<usize>) -> Expr {
        if remaining == Some(0) {
            return expr.clone();
        }
        let graph = self.graph;
        let result = expr.try_map_fields(&mut |field_ref: &FieldRef| -> Result<Expr, Infallible> {
            let Some(node) = graph.resolve(field_ref) else {
                return Ok(Expr::Field(field_ref.clone()));
            };
            let leaf = Expr::Field(FieldRef::Id(node.id.clone()));
            let Some(formula) = node.formula.as_ref() else {
                return Ok(leaf);
            };
            if self.path.contains(&node.id) {
                tracing::trace!(field = %node.id, "cycle on inlining path, keeping reference");
                return Ok(leaf);
            }

            tracing::trace!(field = %node.id, depth = self.path.len(), "inlining");
            if !self.inlined.contains(&node.id) {
                self.inlined.push(node.id.clone());
            }
            self.path.push(node.id.clone());
            let inner = self.expand(formula, remaining.map(|d| d - 1));
            self.path.pop();
            Ok(inner)
        });
        match result {
            Ok(expr) => expr,
            Err(never) => match never {},
        }
    }
}
