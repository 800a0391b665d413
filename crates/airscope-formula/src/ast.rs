//! Formula Abstract Syntax Tree types

use airscope_core::FieldId;
use serde::Serialize;
use std::fmt;

/// Formula expression AST
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Expr {
    // === Literals ===
    /// Numeric literal
    Number(f64),
    /// String literal
    String(String),
    /// Boolean literal (`TRUE()`, `FALSE()`, bare `TRUE`/`FALSE`)
    Boolean(bool),
    /// Blank literal (`BLANK()`)
    Blank,

    // === References ===
    /// Field reference (`{fldXXX}` or `{Field Name}`)
    Field(FieldRef),

    // === Operators ===
    /// Binary operation
    BinaryOp {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Unary operation
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expr>,
    },

    // === Function call ===
    Function { name: String, args: Vec<Expr> },
}

/// A field reference as written in formula text
///
/// The parser decides the form from the text alone; binding against a table
/// (see [`crate::resolve`]) turns every reference into [`FieldRef::Id`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldRef {
    /// `{fldXXXXXXXXXXXXXX}`
    Id(FieldId),
    /// `{Human Field Name}`
    Name(String),
}

impl FieldRef {
    /// The text between the braces
    pub fn text(&self) -> &str {
        match self {
            FieldRef::Id(id) => id.as_str(),
            FieldRef::Name(name) => name,
        }
    }

    /// The field ID, for bound references
    pub fn id(&self) -> Option<&FieldId> {
        match self {
            FieldRef::Id(id) => Some(id),
            FieldRef::Name(_) => None,
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,

    // Text
    Concat,
}

impl BinaryOperator {
    /// Binding strength; higher binds tighter
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOperator::Equal
            | BinaryOperator::NotEqual
            | BinaryOperator::LessThan
            | BinaryOperator::LessEqual
            | BinaryOperator::GreaterThan
            | BinaryOperator::GreaterEqual => 1,
            BinaryOperator::Concat => 2,
            BinaryOperator::Add | BinaryOperator::Subtract => 3,
            BinaryOperator::Multiply | BinaryOperator::Divide => 4,
        }
    }

    /// Surface syntax
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::Concat => "&",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UnaryOperator {
    Negate,
}

/// Precedence of unary operators and negative literals
pub(crate) const UNARY_PRECEDENCE: u8 = 5;
/// Precedence of atoms (literals, references, calls)
pub(crate) const ATOM_PRECEDENCE: u8 = 6;

impl Expr {
    /// Build a binary operation
    pub fn binary(op: BinaryOperator, left: Expr, right: Expr) -> Self {
        Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Build a function call (name is normalized to upper case)
    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.into().to_uppercase(),
            args,
        }
    }

    /// Build an ID-form field reference
    pub fn field_id(id: impl Into<FieldId>) -> Self {
        Expr::Field(FieldRef::Id(id.into()))
    }

    /// Build a name-form field reference
    pub fn field_name(name: impl Into<String>) -> Self {
        Expr::Field(FieldRef::Name(name.into()))
    }

    /// Binding strength of the node's outermost construct
    pub fn precedence(&self) -> u8 {
        match self {
            Expr::BinaryOp { op, .. } => op.precedence(),
            Expr::UnaryOp { .. } => UNARY_PRECEDENCE,
            Expr::Number(n) if n.is_sign_negative() => UNARY_PRECEDENCE,
            _ => ATOM_PRECEDENCE,
        }
    }

    /// Literal or reference (no children)
    pub fn is_atom(&self) -> bool {
        matches!(
            self,
            Expr::Number(_) | Expr::String(_) | Expr::Boolean(_) | Expr::Blank | Expr::Field(_)
        )
    }

    /// Direct children in evaluation order
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::BinaryOp { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expr::UnaryOp { operand, .. } => vec![operand.as_ref()],
            Expr::Function { args, .. } => args.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Visit every node, pre-order
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::BinaryOp { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Expr::UnaryOp { operand, .. } => operand.walk(visit),
            Expr::Function { args, .. } => {
                for arg in args {
                    arg.walk(visit);
                }
            }
            _ => {}
        }
    }

    /// Field references in order of first appearance, without duplicates
    pub fn field_refs(&self) -> Vec<&FieldRef> {
        let mut refs: Vec<&FieldRef> = Vec::new();
        self.walk(&mut |node| {
            if let Expr::Field(field_ref) = node {
                if !refs.contains(&field_ref) {
                    refs.push(field_ref);
                }
            }
        });
        refs
    }

    /// Function names called anywhere in the expression
    pub fn function_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        self.walk(&mut |node| {
            if let Expr::Function { name, .. } = node {
                names.push(name);
            }
        });
        names
    }

    /// Total number of nodes
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |_| count += 1);
        count
    }

    /// Longest root-to-leaf path, counting the root as 1
    pub fn nesting_depth(&self) -> usize {
        1 + self
            .children()
            .into_iter()
            .map(Expr::nesting_depth)
            .max()
            .unwrap_or(0)
    }

    /// Rewrite every field reference, keeping the rest of the tree
    pub fn try_map_fields<E>(
        &self,
        map: &mut dyn FnMut(&FieldRef) -> Result<Expr, E>,
    ) -> Result<Expr, E> {
        Ok(match self {
            Expr::Field(field_ref) => map(field_ref)?,
            Expr::BinaryOp { op, left, right } => Expr::BinaryOp {
                op: *op,
                left: Box::new(left.try_map_fields(map)?),
                right: Box::new(right.try_map_fields(map)?),
            },
            Expr::UnaryOp { op, operand } => Expr::UnaryOp {
                op: *op,
                operand: Box::new(operand.try_map_fields(map)?),
            },
            Expr::Function { name, args } => Expr::Function {
                name: name.clone(),
                args: args
                    .iter()
                    .map(|arg| arg.try_map_fields(map))
                    .collect::<Result<_, E>>()?,
            },
            other => other.clone(),
        })
    }
}

/// Compact rendering with references as written
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::printer::FormulaPrinter::compact().print(self))
    }
}
