//! Schema type - the unit fetched from the metadata API

use crate::error::{Error, Result};
use crate::field::Field;
use crate::table::Table;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

/// A base schema (`GET /v0/meta/bases/{baseId}/tables`)
///
/// Read-only once loaded; every derived artifact (ASTs, graphs, generated
/// evaluators) is recomputed from a schema snapshot rather than patched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub tables: Vec<Table>,
}

impl Schema {
    /// Create a schema from tables
    pub fn new(tables: Vec<Table>) -> Self {
        Self { tables }
    }

    /// Decode and validate a schema from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        let schema: Schema = serde_json::from_str(json)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Decode and validate a schema from a reader
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let schema: Schema = serde_json::from_reader(reader)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Load a schema from a JSON file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Encode as pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Get a table by ID
    pub fn table(&self, id: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.id == *id)
    }

    /// Get the first table with the given name
    pub fn table_by_name(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Find a table by ID, falling back to name
    pub fn find_table(&self, id_or_name: &str) -> Result<&Table> {
        self.table(id_or_name)
            .or_else(|| self.table_by_name(id_or_name))
            .ok_or_else(|| Error::TableNotFound(id_or_name.to_string()))
    }

    /// Locate a field anywhere in the schema by ID
    pub fn locate_field(&self, field_id: &str) -> Option<(&Table, &Field)> {
        self.tables
            .iter()
            .find_map(|t| t.field(field_id).map(|f| (t, f)))
    }

    /// Total number of fields across all tables
    pub fn field_count(&self) -> usize {
        self.tables.iter().map(|t| t.fields.len()).sum()
    }

    /// Check table and field ID uniqueness
    pub fn validate(&self) -> Result<()> {
        let mut seen = ahash::AHashSet::with_capacity(self.tables.len());
        for table in &self.tables {
            if !seen.insert(table.id.as_str()) {
                return Err(Error::DuplicateTableId(table.id.to_string()));
            }
            table.validate()?;
        }
        Ok(())
    }
}
