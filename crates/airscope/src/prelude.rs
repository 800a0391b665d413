//! Prelude module - common imports for airscope users
//!
//! ```rust
//! use airscope::prelude::*;
//! ```

pub use crate::{
    // Analysis
    ComplexityScore,
    CompressOptions,
    Compressed,
    DataAccess,
    DependencyGraph,
    // Error types
    Error,
    ErrorValue,
    EvalContext,
    Expr,
    // Schema types
    Field,
    FieldId,
    FieldNaming,
    FieldType,
    FormatStyle,
    FormulaError,
    FormulaResult,
    GenerateOptions,
    GraphAnalyzer,
    // Evaluation
    MappingRecord,
    AttributeRecord,
    Program,
    RecordAccess,
    Result,
    Schema,
    // Extension traits
    SchemaAnalysisExt,
    SchemaExt,
    SchemaReport,
    Table,
    TableId,
    TableReport,
    TraversalOptions,
    Value,
};
