//! In-process evaluation of compiled programs
//!
//! Runs the same IR the Python printer renders, against either data-access
//! convention.

use super::ir::{FieldSlot, Ir, Program};
use crate::functions::EvalContext;
use crate::value::{binary, compare, negate, Value};
use ahash::AHashMap;
use airscope_core::FieldId;
use tracing::trace;

/// Read/write access to one record's field values
pub trait RecordAccess {
    fn read(&self, slot: &FieldSlot) -> Value;
    fn write(&mut self, slot: &FieldSlot, value: Value);
}

/// Record as a mapping from field ID to value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingRecord {
    values: AHashMap<FieldId, Value>,
}

impl MappingRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a records-API `fields` object keyed by field ID
    ///
    /// Anything other than an object gives an empty record.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Object(map) => map
                .iter()
                .map(|(id, value)| (FieldId::from(id.as_str()), Value::from_json(value)))
                .collect(),
            _ => Self::new(),
        }
    }

    pub fn get(&self, field_id: &str) -> Option<&Value> {
        self.values.get(field_id)
    }

    pub fn insert(&mut self, field_id: impl Into<FieldId>, value: impl Into<Value>) {
        self.values.insert(field_id.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// JSON object keyed by field ID (sorted)
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .values
            .iter()
            .map(|(id, value)| {
                let json = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
                (id.to_string(), json)
            })
            .collect();
        serde_json::Value::Object(map)
    }
}

impl FromIterator<(FieldId, Value)> for MappingRecord {
    fn from_iter<I: IntoIterator<Item = (FieldId, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl RecordAccess for MappingRecord {
    fn read(&self, slot: &FieldSlot) -> Value {
        self.values
            .get(slot.field_id.as_str())
            .cloned()
            .unwrap_or_default()
    }

    fn write(&mut self, slot: &FieldSlot, value: Value) {
        self.values.insert(slot.field_id.clone(), value);
    }
}

/// Record as an object with one attribute per field
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeRecord {
    attributes: AHashMap<String, Value>,
}

impl AttributeRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-key a mapping record by the program's attribute names
    ///
    /// Values for fields outside the program are dropped.
    pub fn from_mapping(program: &Program, record: &MappingRecord) -> Self {
        let attributes = program
            .slots
            .iter()
            .filter_map(|slot| {
                record
                    .get(slot.field_id.as_str())
                    .map(|value| (slot.attribute.clone(), value.clone()))
            })
            .collect();
        Self { attributes }
    }

    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.attributes.get(attribute)
    }

    pub fn set(&mut self, attribute: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(attribute.into(), value.into());
    }
}

impl RecordAccess for AttributeRecord {
    fn read(&self, slot: &FieldSlot) -> Value {
        self.attributes
            .get(&slot.attribute)
            .cloned()
            .unwrap_or_default()
    }

    fn write(&mut self, slot: &FieldSlot, value: Value) {
        self.attributes.insert(slot.attribute.clone(), value);
    }
}

impl Program {
    /// Compute every formula field of `record`, in evaluation order
    pub fn evaluate<R: RecordAccess + ?Sized>(&self, record: &mut R, ctx: &EvalContext) {
        for unit in &self.units {
            let slot = &self.slots[unit.slot];
            let value = self.eval(&unit.body, record, ctx);
            trace!(field = %slot.field_id, value = %value, "computed field");
            record.write(slot, value);
        }
    }

    /// Evaluate one expression against a record
    pub fn eval<R: RecordAccess + ?Sized>(&self, ir: &Ir, record: &R, ctx: &EvalContext) -> Value {
        match ir {
            Ir::Constant(value) => value.clone(),
            Ir::Read(index) => record.read(&self.slots[*index]),
            Ir::Negate(operand) => negate(&self.eval(operand, record, ctx)),
            Ir::Binary { op, left, right } => binary(
                *op,
                &self.eval(left, record, ctx),
                &self.eval(right, record, ctx),
            ),
            Ir::Call { function, args } => {
                let args: Vec<Value> = args.iter().map(|a| self.eval(a, record, ctx)).collect();
                function.call(&args, ctx)
            }
            Ir::If {
                condition,
                then,
                otherwise,
            } => match self.eval(condition, record, ctx).truthy() {
                Err(e) => Value::Error(e),
                Ok(true) => self.eval(then, record, ctx),
                Ok(false) => otherwise
                    .as_ref()
                    .map(|o| self.eval(o, record, ctx))
                    .unwrap_or_default(),
            },
            Ir::Switch {
                subject,
                cases,
                default,
            } => {
                let subject = self.eval(subject, record, ctx);
                if subject.is_error() {
                    return subject;
                }
                for (pattern, result) in cases {
                    match compare(&subject, &self.eval(pattern, record, ctx)) {
                        Err(e) => return Value::Error(e),
                        Ok(ordering) if ordering.is_eq() => return self.eval(result, record, ctx),
                        Ok(_) => {}
                    }
                }
                default
                    .as_ref()
                    .map(|d| self.eval(d, record, ctx))
                    .unwrap_or_default()
            }
        }
    }
}
