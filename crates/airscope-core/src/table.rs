//! Table type

use crate::error::{Error, Result};
use crate::field::{Field, FieldId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable table identifier (`tblXXXXXXXXXXXXXX`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableId(String);

impl TableId {
    /// Create a table ID from any string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw ID text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TableId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TableId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl PartialEq<str> for TableId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// A table of a base
///
/// Fields keep schema order. The order has no meaning for evaluation but is
/// used as the tie-breaker wherever output must be deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub id: TableId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_field_id: Option<FieldId>,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Table {
    /// Create an empty table
    pub fn new(id: impl Into<TableId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            primary_field_id: None,
            fields: Vec::new(),
            description: None,
        }
    }

    /// Append a field (builder style)
    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Set the primary field (builder style)
    pub fn with_primary_field(mut self, id: impl Into<FieldId>) -> Self {
        self.primary_field_id = Some(id.into());
        self
    }

    /// Get a field by ID
    pub fn field(&self, id: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Get the first field with the given name
    ///
    /// Names are not unique; callers that need all matches use
    /// [`Table::fields_named`].
    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// All fields carrying the given name
    pub fn fields_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Field> + 'a {
        self.fields.iter().filter(move |f| f.name == name)
    }

    /// Find a field by ID, falling back to name
    pub fn find_field(&self, id_or_name: &str) -> Option<&Field> {
        self.field(id_or_name).or_else(|| self.field_by_name(id_or_name))
    }

    /// Position of a field in schema order
    pub fn field_position(&self, id: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.id == id)
    }

    /// The primary field, if declared and present
    pub fn primary_field(&self) -> Option<&Field> {
        self.primary_field_id.as_ref().and_then(|id| self.field(id.as_str()))
    }

    /// Formula fields in schema order
    pub fn formula_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.is_formula())
    }

    /// Check that field IDs are unique within the table
    pub fn validate(&self) -> Result<()> {
        let mut seen = ahash::AHashSet::with_capacity(self.fields.len());
        for field in &self.fields {
            if !seen.insert(field.id.as_str()) {
                return Err(Error::DuplicateFieldId {
                    table: self.id.to_string(),
                    field: field.id.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldType;

    fn orders() -> Table {
        Table::new("tblOrders", "Orders")
            .with_field(Field::new("fldQty", "Qty", FieldType::Number))
            .with_field(Field::new("fldPrice", "Price", FieldType::Currency))
            .with_field(Field::formula("fldTotal", "Total", "{fldQty} * {fldPrice}"))
            .with_primary_field("fldQty")
    }

    #[test]
    fn test_field_lookup() {
        let table = orders();
        assert_eq!(table.field("fldPrice").unwrap().name, "Price");
        assert_eq!(table.field_by_name("Total").unwrap().id, "fldTotal");
        assert_eq!(table.find_field("Qty").unwrap().id, "fldQty");
        assert_eq!(table.field_position("fldTotal"), Some(2));
        assert_eq!(table.primary_field().unwrap().id, "fldQty");
        assert_eq!(table.formula_fields().count(), 1);
    }

    #[test]
    fn test_duplicate_field_ids_rejected() {
        let table = orders().with_field(Field::new("fldQty", "Qty again", FieldType::Number));
        assert!(matches!(
            table.validate(),
            Err(Error::DuplicateFieldId { .. })
        ));
    }

    #[test]
    fn test_duplicate_names_allowed() {
        let table = orders().with_field(Field::new("fldQty2", "Qty", FieldType::Number));
        assert!(table.validate().is_ok());
        assert_eq!(table.fields_named("Qty").count(), 2);
    }
}
