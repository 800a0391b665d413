//! Typed intermediate representation of compiled formulas
//!
//! Both the Python printer and the in-process interpreter consume this tree,
//! so the two data-access conventions cannot drift apart: they differ only
//! in how a [`Ir::Read`] is rendered or executed.

use crate::ast::BinaryOperator;
use crate::dependency::NodeKind;
use crate::functions::FunctionDef;
use crate::value::Value;
use airscope_core::{FieldId, TableId};
use heck::{ToSnakeCase, ToUpperCamelCase};
use serde::Serialize;

/// Compiled expression
#[derive(Debug, Clone)]
pub enum Ir {
    /// Literal value
    Constant(Value),
    /// Value of a field, by slot index
    Read(usize),
    /// Unary minus
    Negate(Box<Ir>),
    /// Binary operator
    Binary {
        op: BinaryOperator,
        left: Box<Ir>,
        right: Box<Ir>,
    },
    /// Eager call of a registered function
    Call {
        function: &'static FunctionDef,
        args: Vec<Ir>,
    },
    /// `IF`: only the selected branch is evaluated
    If {
        condition: Box<Ir>,
        then: Box<Ir>,
        otherwise: Option<Box<Ir>>,
    },
    /// `SWITCH`: cases are tried in order, only the matching result is evaluated
    Switch {
        subject: Box<Ir>,
        cases: Vec<(Ir, Ir)>,
        default: Option<Box<Ir>>,
    },
}

impl Ir {
    /// Visit every node, pre-order
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Ir)) {
        visit(self);
        match self {
            Ir::Constant(_) | Ir::Read(_) => {}
            Ir::Negate(operand) => operand.walk(visit),
            Ir::Binary { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Ir::Call { args, .. } => {
                for arg in args {
                    arg.walk(visit);
                }
            }
            Ir::If {
                condition,
                then,
                otherwise,
            } => {
                condition.walk(visit);
                then.walk(visit);
                if let Some(otherwise) = otherwise {
                    otherwise.walk(visit);
                }
            }
            Ir::Switch {
                subject,
                cases,
                default,
            } => {
                subject.walk(visit);
                for (pattern, result) in cases {
                    pattern.walk(visit);
                    result.walk(visit);
                }
                if let Some(default) = default {
                    default.walk(visit);
                }
            }
        }
    }

    /// Slots read anywhere in the expression
    pub fn reads(&self) -> Vec<usize> {
        let mut slots = Vec::new();
        self.walk(&mut |node| {
            if let Ir::Read(slot) = node {
                if !slots.contains(slot) {
                    slots.push(*slot);
                }
            }
        });
        slots
    }
}

/// A field of the compiled table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSlot {
    pub field_id: FieldId,
    pub name: String,
    /// Identifier used for record attributes and `compute_*` functions
    pub attribute: String,
    pub kind: NodeKind,
}

/// One computed field
#[derive(Debug, Clone)]
pub struct ComputeUnit {
    /// Slot receiving the result
    pub slot: usize,
    /// Dependency depth of the field
    pub depth: usize,
    /// Formula text as stored in the schema
    pub formula: String,
    pub body: Ir,
}

/// A table's formulas compiled in evaluation order
#[derive(Debug, Clone)]
pub struct Program {
    pub table_id: TableId,
    pub table_name: String,
    /// Every field of the table, in schema order
    pub slots: Vec<FieldSlot>,
    /// Computed fields in non-decreasing depth order
    pub units: Vec<ComputeUnit>,
}

impl Program {
    pub fn slot(&self, index: usize) -> &FieldSlot {
        &self.slots[index]
    }

    /// Slot index of a field, by ID or attribute name
    pub fn find_slot(&self, key: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.field_id == key)
            .or_else(|| self.slots.iter().position(|s| s.attribute == key))
    }

    /// Whether a slot is written by a compute unit
    pub fn is_computed(&self, index: usize) -> bool {
        self.units.iter().any(|u| u.slot == index)
    }

    /// Fields the caller supplies (everything not computed)
    pub fn inputs(&self) -> impl Iterator<Item = &FieldSlot> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(move |(i, _)| !self.is_computed(*i))
            .map(|(_, slot)| slot)
    }

    /// Computed fields in evaluation order
    pub fn computed(&self) -> impl Iterator<Item = &FieldSlot> + '_ {
        self.units.iter().map(move |u| &self.slots[u.slot])
    }

    /// Names of the functions called, without duplicates, in first-use order
    pub fn functions_used(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = Vec::new();
        for unit in &self.units {
            unit.body.walk(&mut |node| {
                if let Ir::Call { function, .. } = node {
                    if !names.contains(&function.name) {
                        names.push(function.name);
                    }
                }
            });
        }
        names
    }

    /// Record type name for the table (`Orders` -> `OrdersRecord`)
    pub fn record_type_name(&self) -> String {
        let base = identifier(&self.table_name.to_upper_camel_case());
        let base = match base.chars().next() {
            Some(c) if c.is_ascii_digit() => format!("T{}", base),
            Some(_) => base,
            None => "Table".to_string(),
        };
        format!("{}Record", base)
    }
}

const PYTHON_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

fn identifier(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

/// Attribute identifiers for field names: snake_case, valid as Python
/// identifiers, unique within the table
pub fn attribute_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut taken: Vec<String> = Vec::new();
    for name in names {
        let mut base = identifier(&name.to_snake_case());
        if base.is_empty() {
            base = "field".to_string();
        }
        if base.starts_with(|c: char| c.is_ascii_digit()) {
            base = format!("f_{}", base);
        }
        if PYTHON_KEYWORDS.contains(&base.as_str()) {
            base.push('_');
        }

        let mut candidate = base.clone();
        let mut n = 2;
        while taken.contains(&candidate) {
            candidate = format!("{}_{}", base, n);
            n += 1;
        }
        taken.push(candidate);
    }
    taken
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_attribute_names() {
        let names = attribute_names([
            "Unit Price ($)",
            "unit price",
            "2024 Target",
            "class",
            "!!!",
            "Total",
        ]);
        assert_eq!(
            names,
            vec![
                "unit_price",
                "unit_price_2",
                "f_2024_target",
                "class_",
                "field",
                "total"
            ]
        );
    }

    #[test]
    fn test_reads_deduplicated() {
        let ir = Ir::Binary {
            op: BinaryOperator::Add,
            left: Box::new(Ir::Read(1)),
            right: Box::new(Ir::Negate(Box::new(Ir::Read(1)))),
        };
        assert_eq!(ir.reads(), vec![1]);
    }
}
