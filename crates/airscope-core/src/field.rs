//! Field definitions
//!
//! A [`Field`] is decoded straight from the Airtable metadata API:
//!
//! ```json
//! { "id": "fldTotal", "name": "Total", "type": "formula",
//!   "options": { "formula": "{fldQty} * {fldPrice}", "referencedFieldIds": ["fldQty", "fldPrice"] } }
//! ```

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Stable field identifier (`fldXXXXXXXXXXXXXX`)
///
/// Field IDs are unique across a base and are the only key the dependency
/// graph uses. Names may collide or change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldId(String);

impl FieldId {
    /// Create a field ID from any string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw ID text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for FieldId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for FieldId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FieldId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for FieldId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl PartialEq<str> for FieldId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for FieldId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Field types reported by the metadata API
///
/// Unknown type strings decode to [`FieldType::Unknown`] so new Airtable
/// field types never break schema loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    SingleLineText,
    Email,
    Url,
    MultilineText,
    RichText,
    PhoneNumber,
    Number,
    Percent,
    Currency,
    Rating,
    Duration,
    AutoNumber,
    Checkbox,
    SingleSelect,
    MultipleSelects,
    SingleCollaborator,
    MultipleCollaborators,
    MultipleRecordLinks,
    Date,
    DateTime,
    MultipleAttachments,
    Barcode,
    Button,
    Formula,
    Rollup,
    Count,
    Lookup,
    MultipleLookupValues,
    CreatedTime,
    LastModifiedTime,
    CreatedBy,
    LastModifiedBy,
    ExternalSyncSource,
    AiText,
    #[serde(other)]
    Unknown,
}

impl FieldType {
    /// Whether Airtable computes this field's value instead of storing user input
    pub fn is_computed(&self) -> bool {
        matches!(
            self,
            FieldType::Formula
                | FieldType::Rollup
                | FieldType::Count
                | FieldType::Lookup
                | FieldType::MultipleLookupValues
                | FieldType::CreatedTime
                | FieldType::LastModifiedTime
                | FieldType::CreatedBy
                | FieldType::LastModifiedBy
                | FieldType::AutoNumber
        )
    }

    /// Whether the field reads a linked table (lookup, rollup, count)
    pub fn is_linked_aggregate(&self) -> bool {
        matches!(
            self,
            FieldType::Rollup | FieldType::Count | FieldType::Lookup | FieldType::MultipleLookupValues
        )
    }

    /// The API type string
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::SingleLineText => "singleLineText",
            FieldType::Email => "email",
            FieldType::Url => "url",
            FieldType::MultilineText => "multilineText",
            FieldType::RichText => "richText",
            FieldType::PhoneNumber => "phoneNumber",
            FieldType::Number => "number",
            FieldType::Percent => "percent",
            FieldType::Currency => "currency",
            FieldType::Rating => "rating",
            FieldType::Duration => "duration",
            FieldType::AutoNumber => "autoNumber",
            FieldType::Checkbox => "checkbox",
            FieldType::SingleSelect => "singleSelect",
            FieldType::MultipleSelects => "multipleSelects",
            FieldType::SingleCollaborator => "singleCollaborator",
            FieldType::MultipleCollaborators => "multipleCollaborators",
            FieldType::MultipleRecordLinks => "multipleRecordLinks",
            FieldType::Date => "date",
            FieldType::DateTime => "dateTime",
            FieldType::MultipleAttachments => "multipleAttachments",
            FieldType::Barcode => "barcode",
            FieldType::Button => "button",
            FieldType::Formula => "formula",
            FieldType::Rollup => "rollup",
            FieldType::Count => "count",
            FieldType::Lookup => "lookup",
            FieldType::MultipleLookupValues => "multipleLookupValues",
            FieldType::CreatedTime => "createdTime",
            FieldType::LastModifiedTime => "lastModifiedTime",
            FieldType::CreatedBy => "createdBy",
            FieldType::LastModifiedBy => "lastModifiedBy",
            FieldType::ExternalSyncSource => "externalSyncSource",
            FieldType::AiText => "aiText",
            FieldType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific field configuration
///
/// Only the keys the analyzer reads are modelled; everything else the API
/// returns is kept in `extra` so a schema round-trips unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldOptions {
    /// Formula text (formula fields, and the aggregation of rollups)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,

    /// Target table of a link field, or the linked table of a rollup/lookup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_table_id: Option<String>,

    /// Fields the API reports as read by this field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced_field_ids: Option<Vec<FieldId>>,

    /// Link field a rollup/lookup/count goes through
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_link_field_id: Option<FieldId>,

    /// Field in the linked table a rollup/lookup reads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_id_in_linked_table: Option<FieldId>,

    /// Paired link field in the linked table
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inverse_link_field_id: Option<FieldId>,

    /// Airtable's own validity flag for computed fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_valid: Option<bool>,

    /// Result type of a computed field (`{"type": ..., "options": ...}`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A field (column) of a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub id: FieldId,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<FieldOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Field {
    /// Create a field with no options
    pub fn new(id: impl Into<FieldId>, name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            field_type,
            options: None,
            description: None,
        }
    }

    /// Create a formula field
    pub fn formula(id: impl Into<FieldId>, name: impl Into<String>, formula: impl Into<String>) -> Self {
        Self {
            options: Some(FieldOptions {
                formula: Some(formula.into()),
                ..Default::default()
            }),
            ..Self::new(id, name, FieldType::Formula)
        }
    }

    /// Attach options (builder style)
    pub fn with_options(mut self, options: FieldOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Formula text, for formula fields only
    pub fn formula_text(&self) -> Option<&str> {
        if self.field_type != FieldType::Formula {
            return None;
        }
        self.options.as_ref()?.formula.as_deref()
    }

    /// Whether this is a formula field with formula text
    pub fn is_formula(&self) -> bool {
        self.formula_text().is_some()
    }

    /// Linked table of a link field (or a rollup/lookup that declares one)
    pub fn linked_table_id(&self) -> Option<&str> {
        self.options.as_ref()?.linked_table_id.as_deref()
    }

    /// Link field a rollup/lookup/count goes through
    pub fn record_link_field_id(&self) -> Option<&FieldId> {
        self.options.as_ref()?.record_link_field_id.as_ref()
    }

    /// Field of the linked table a rollup/lookup reads
    pub fn field_id_in_linked_table(&self) -> Option<&FieldId> {
        self.options.as_ref()?.field_id_in_linked_table.as_ref()
    }

    /// Field IDs reported by the API as read by this field
    pub fn referenced_field_ids(&self) -> &[FieldId] {
        self.options
            .as_ref()
            .and_then(|o| o.referenced_field_ids.as_deref())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_formula_field() {
        let json = r#"{
            "id": "fldTotal",
            "name": "Total",
            "type": "formula",
            "options": {
                "formula": "{fldQty} * {fldPrice}",
                "isValid": true,
                "referencedFieldIds": ["fldQty", "fldPrice"],
                "result": {"type": "number", "options": {"precision": 0}}
            }
        }"#;
        let field: Field = serde_json::from_str(json).unwrap();
        assert_eq!(field.field_type, FieldType::Formula);
        assert_eq!(field.formula_text(), Some("{fldQty} * {fldPrice}"));
        assert_eq!(field.referenced_field_ids().len(), 2);
        assert!(field.field_type.is_computed());
    }

    #[test]
    fn test_unknown_type_and_options_survive() {
        let json = r#"{
            "id": "fldX",
            "name": "Mystery",
            "type": "someFutureType",
            "options": {"choices": [{"name": "a"}]}
        }"#;
        let field: Field = serde_json::from_str(json).unwrap();
        assert_eq!(field.field_type, FieldType::Unknown);
        let options = field.options.unwrap();
        assert!(options.extra.contains_key("choices"));
    }

    #[test]
    fn test_formula_text_requires_formula_type() {
        let rollup = Field::new("fldR", "Rollup", FieldType::Rollup).with_options(FieldOptions {
            formula: Some("SUM(values)".into()),
            ..Default::default()
        });
        assert_eq!(rollup.formula_text(), None);
        assert!(rollup.field_type.is_linked_aggregate());
    }

    #[test]
    fn test_field_type_strings() {
        assert_eq!(FieldType::MultipleRecordLinks.as_str(), "multipleRecordLinks");
        let decoded: FieldType = serde_json::from_str("\"multipleLookupValues\"").unwrap();
        assert_eq!(decoded, FieldType::MultipleLookupValues);
    }
}
