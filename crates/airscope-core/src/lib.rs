//! # airscope-core
//!
//! Core data structures for the airscope schema analyzer.
//!
//! This crate models an Airtable base schema exactly as the metadata API
//! returns it:
//! - [`Schema`] - all tables of a base
//! - [`Table`] - a table and its ordered fields
//! - [`Field`], [`FieldType`], [`FieldOptions`] - field definitions
//! - [`FieldId`], [`TableId`] - stable identifiers
//!
//! ## Example
//!
//! ```rust
//! use airscope_core::Schema;
//!
//! let schema = Schema::from_json(r#"{"tables": [
//!     {"id": "tblA", "name": "Orders", "fields": [
//!         {"id": "fldQty", "name": "Qty", "type": "number"}
//!     ]}
//! ]}"#).unwrap();
//!
//! assert_eq!(schema.find_table("Orders").unwrap().fields.len(), 1);
//! ```

pub mod error;
pub mod field;
pub mod schema;
pub mod table;

pub use error::{Error, Result};
pub use field::{Field, FieldId, FieldOptions, FieldType};
pub use schema::Schema;
pub use table::{Table, TableId};
