//! Formula error types

use airscope_core::FieldId;
use thiserror::Error;

/// Result type for formula operations
pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Malformed formula text
///
/// `position` is the byte offset into the formula where the problem was
/// found.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at position {position}")]
pub struct ParseError {
    pub position: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

/// Errors raised by parsing, graph construction, analysis and generation
///
/// Every variant is terminal for the operation that raised it; nothing in
/// this crate returns a partial result.
#[derive(Debug, Error)]
pub enum FormulaError {
    /// Formula parse error
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Parse error in a schema field's formula
    #[error("Invalid formula in field {field} ({formula:?}): {source}")]
    InvalidFormula {
        field: String,
        formula: String,
        #[source]
        source: ParseError,
    },

    /// A formula or rollup reads a field that does not exist
    #[error("Unresolved reference to {field_id} from field {referenced_by}")]
    UnresolvedReference {
        field_id: String,
        referenced_by: FieldId,
    },

    /// A field reads itself
    #[error("Field {field_id} references itself")]
    SelfReference { field_id: FieldId },

    /// Evaluation order cannot be established
    #[error("Circular dependency: {}", format_cycle(.cycle))]
    CyclicGraph { cycle: Vec<FieldId> },

    /// No transpiler mapping for a function
    #[error("Unsupported function: {name}")]
    UnsupportedFunction { name: String },

    /// Wrong number of arguments
    #[error("Wrong number of arguments for {function}: expected {expected}, got {actual}")]
    ArgumentCount {
        function: String,
        expected: String,
        actual: usize,
    },

    /// Field is not a node of the graph
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// Table is not part of the schema
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// Schema lookup failed
    #[error(transparent)]
    Schema(#[from] airscope_core::Error),
}

fn format_cycle(cycle: &[FieldId]) -> String {
    let mut parts: Vec<&str> = cycle.iter().map(|id| id.as_str()).collect();
    if let Some(first) = cycle.first() {
        parts.push(first.as_str());
    }
    parts.join(" -> ")
}
