//! AST to IR lowering

use super::ir::Ir;
use crate::ast::{Expr, FieldRef, UnaryOperator};
use crate::error::{FormulaError, FormulaResult};
use crate::functions::registry;
use crate::value::Value;
use ahash::AHashMap;

/// Lowers bound formulas against a table's slot layout
pub(crate) struct Lowerer<'a> {
    slots: &'a AHashMap<&'a str, usize>,
}

impl<'a> Lowerer<'a> {
    pub(crate) fn new(slots: &'a AHashMap<&'a str, usize>) -> Self {
        Self { slots }
    }

    pub(crate) fn lower(&self, expr: &Expr) -> FormulaResult<Ir> {
        Ok(match expr {
            Expr::Number(n) => Ir::Constant(Value::Number(*n)),
            Expr::String(s) => Ir::Constant(Value::Text(s.clone())),
            Expr::Boolean(b) => Ir::Constant(Value::Bool(*b)),
            Expr::Blank => Ir::Constant(Value::Blank),
            Expr::Field(field_ref) => Ir::Read(self.slot(field_ref)?),
            Expr::UnaryOp {
                op: UnaryOperator::Negate,
                operand,
            } => Ir::Negate(Box::new(self.lower(operand)?)),
            Expr::BinaryOp { op, left, right } => Ir::Binary {
                op: *op,
                left: Box::new(self.lower(left)?),
                right: Box::new(self.lower(right)?),
            },
            Expr::Function { name, args } => self.lower_call(name, args)?,
        })
    }

    fn slot(&self, field_ref: &FieldRef) -> FormulaResult<usize> {
        match field_ref {
            FieldRef::Id(id) => self
                .slots
                .get(id.as_str())
                .copied()
                .ok_or_else(|| FormulaError::UnknownField(id.to_string())),
            FieldRef::Name(name) => Err(FormulaError::UnknownField(name.clone())),
        }
    }

    fn lower_call(&self, name: &str, args: &[Expr]) -> FormulaResult<Ir> {
        let function = registry().require(name)?;
        function.check_arity(args.len())?;

        let mut lowered = args
            .iter()
            .map(|arg| self.lower(arg))
            .collect::<FormulaResult<Vec<_>>>()?;

        match function.name {
            "IF" => {
                let otherwise = (lowered.len() > 2).then(|| lowered.remove(2));
                let then = lowered.remove(1);
                let condition = lowered.remove(0);
                Ok(Ir::If {
                    condition: Box::new(condition),
                    then: Box::new(then),
                    otherwise: otherwise.map(Box::new),
                })
            }
            "SWITCH" => {
                let mut rest = lowered.into_iter();
                let subject = rest.next().unwrap_or(Ir::Constant(Value::Blank));
                let rest: Vec<Ir> = rest.collect();
                let mut cases = Vec::with_capacity(rest.len() / 2);
                let mut default = None;
                let mut items = rest.into_iter();
                while let Some(pattern) = items.next() {
                    match items.next() {
                        Some(result) => cases.push((pattern, result)),
                        None => default = Some(Box::new(pattern)),
                    }
                }
                Ok(Ir::Switch {
                    subject: Box::new(subject),
                    cases,
                    default,
                })
            }
            _ => Ok(Ir::Call {
                function,
                args: lowered,
            }),
        }
    }
}
