//! Formula serialization
//!
//! Renders an AST back to formula text. Parentheses are emitted only where
//! precedence or left-associativity requires them, so any tree (including
//! one produced by inlining other fields' formulas) prints to text that
//! re-parses to the same tree.

use crate::ast::{Expr, FieldRef, UNARY_PRECEDENCE};
use crate::error::ParseError;
use crate::parser::parse_formula;
use airscope_core::Table;
use serde::{Deserialize, Serialize};

const INDENT: &str = "  ";

/// Layout of printed formulas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FormatStyle {
    /// Single line, no optional whitespace
    #[default]
    Compact,
    /// One argument per line, indented by nesting
    Logical,
}

/// How field references are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldNaming {
    /// `{fldXXXXXXXXXXXXXX}`
    #[default]
    Ids,
    /// `{Human Name}`
    Names,
}

/// Source of display names for field IDs
pub trait FieldLabels {
    fn field_label(&self, id: &str) -> Option<&str>;
}

impl FieldLabels for Table {
    fn field_label(&self, id: &str) -> Option<&str> {
        self.field(id).map(|f| f.name.as_str())
    }
}

/// Formula printer
#[derive(Clone, Copy)]
pub struct FormulaPrinter<'a> {
    style: FormatStyle,
    naming: FieldNaming,
    labels: Option<&'a dyn FieldLabels>,
}

impl FormulaPrinter<'static> {
    /// Compact printer that keeps references as written
    pub fn compact() -> Self {
        Self::new(FormatStyle::Compact)
    }

    /// Logical printer that keeps references as written
    pub fn logical() -> Self {
        Self::new(FormatStyle::Logical)
    }

    pub fn new(style: FormatStyle) -> Self {
        Self {
            style,
            naming: FieldNaming::Ids,
            labels: None,
        }
    }
}

impl<'a> FormulaPrinter<'a> {
    /// Render ID references through `labels` when `naming` is
    /// [`FieldNaming::Names`]. IDs without a label print as IDs.
    pub fn with_naming<'b>(
        self,
        naming: FieldNaming,
        labels: &'b dyn FieldLabels,
    ) -> FormulaPrinter<'b> {
        FormulaPrinter {
            style: self.style,
            naming,
            labels: Some(labels),
        }
    }

    /// Print an expression
    pub fn print(&self, expr: &Expr) -> String {
        let mut out = String::new();
        match self.style {
            FormatStyle::Compact => self.write_compact(expr, &mut out),
            FormatStyle::Logical => self.write_logical(expr, 0, &mut out),
        }
        out
    }

    // === Compact ===

    fn write_compact(&self, expr: &Expr, out: &mut String) {
        match expr {
            Expr::BinaryOp { op, left, right } => {
                let prec = op.precedence();
                self.write_compact_child(left, prec, out);
                out.push_str(op.symbol());
                self.write_compact_child(right, prec + 1, out);
            }
            Expr::UnaryOp { operand, .. } => {
                out.push('-');
                self.write_compact_child(operand, UNARY_PRECEDENCE, out);
            }
            Expr::Function { name, args } => {
                out.push_str(name);
                out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    self.write_compact(arg, out);
                }
                out.push(')');
            }
            atom => self.write_atom(atom, out),
        }
    }

    fn write_compact_child(&self, expr: &Expr, min_prec: u8, out: &mut String) {
        if expr.precedence() < min_prec {
            out.push('(');
            self.write_compact(expr, out);
            out.push(')');
        } else {
            self.write_compact(expr, out);
        }
    }

    // === Logical ===

    fn write_logical(&self, expr: &Expr, depth: usize, out: &mut String) {
        match expr {
            Expr::BinaryOp { op, left, right } => {
                let prec = op.precedence();
                self.write_logical_child(left, prec, depth, out);
                out.push(' ');
                out.push_str(op.symbol());
                out.push(' ');
                self.write_logical_child(right, prec + 1, depth, out);
            }
            Expr::UnaryOp { operand, .. } => {
                out.push('-');
                self.write_logical_child(operand, UNARY_PRECEDENCE, depth, out);
            }
            Expr::Function { name, args } if args.iter().all(Expr::is_atom) => {
                out.push_str(name);
                out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_atom(arg, out);
                }
                out.push(')');
            }
            Expr::Function { name, args } => {
                out.push_str(name);
                out.push_str("(\n");
                for (i, arg) in args.iter().enumerate() {
                    push_indent(depth + 1, out);
                    self.write_logical(arg, depth + 1, out);
                    if i + 1 < args.len() {
                        out.push(',');
                    }
                    out.push('\n');
                }
                push_indent(depth, out);
                out.push(')');
            }
            atom => self.write_atom(atom, out),
        }
    }

    fn write_logical_child(&self, expr: &Expr, min_prec: u8, depth: usize, out: &mut String) {
        if expr.precedence() < min_prec {
            out.push('(');
            self.write_logical(expr, depth, out);
            out.push(')');
        } else {
            self.write_logical(expr, depth, out);
        }
    }

    // === Atoms ===

    fn write_atom(&self, expr: &Expr, out: &mut String) {
        match expr {
            Expr::Number(n) => out.push_str(&format_number(*n)),
            Expr::String(s) => write_string(s, out),
            Expr::Boolean(true) => out.push_str("TRUE()"),
            Expr::Boolean(false) => out.push_str("FALSE()"),
            Expr::Blank => out.push_str("BLANK()"),
            Expr::Field(field_ref) => self.write_field(field_ref, out),
            other => self.write_compact(other, out),
        }
    }

    fn write_field(&self, field_ref: &FieldRef, out: &mut String) {
        let text = match (field_ref, self.naming, self.labels) {
            (FieldRef::Id(id), FieldNaming::Names, Some(labels)) => {
                labels.field_label(id.as_str()).unwrap_or(id.as_str())
            }
            (field_ref, _, _) => field_ref.text(),
        };
        out.push('{');
        for c in text.chars() {
            if matches!(c, '{' | '}' | '\\') {
                out.push('\\');
            }
            out.push(c);
        }
        out.push('}');
    }
}

fn push_indent(depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Number literal text (`3`, `0.25`, `-1.5`)
pub fn format_number(n: f64) -> String {
    // f64 Display never uses exponent notation and prints integral values
    // without a fractional part
    format!("{}", n)
}

/// Re-serialize formula text in the given style (minify or pretty-print)
pub fn format_formula(formula: &str, style: FormatStyle) -> Result<String, ParseError> {
    let ast = parse_formula(formula)?;
    Ok(FormulaPrinter::new(style).print(&ast))
}

#[cfg(test)]
mod tests {
    use super::*;
    use airscope_core::{Field, FieldType};
    use pretty_assertions::assert_eq;

    fn compact(text: &str) -> String {
        format_formula(text, FormatStyle::Compact).unwrap()
    }

    #[test]
    fn test_compact_minifies() {
        assert_eq!(compact("{fldA} & \" \" & {fldB}"), "{fldA}&\" \"&{fldB}");
        assert_eq!(compact("IF( {x} > 1 , 'a' , \"b\" )"), "IF({x}>1,\"a\",\"b\")");
        assert_eq!(compact("TRUE"), "TRUE()");
    }

    #[test]
    fn test_parentheses_only_where_needed() {
        assert_eq!(compact("(1 + 2) * 3"), "(1+2)*3");
        assert_eq!(compact("1 + (2 * 3)"), "1+2*3");
        assert_eq!(compact("8 - (4 - 2)"), "8-(4-2)");
        assert_eq!(compact("(8 - 4) - 2"), "8-4-2");
        assert_eq!(compact("-(1 + 2)"), "-(1+2)");
        assert_eq!(compact("({a} = 1) = TRUE()"), "{a}=1=TRUE()");
    }

    #[test]
    fn test_string_and_field_escapes() {
        assert_eq!(compact(r#""a\"b\\c""#), r#""a\"b\\c""#);
        assert_eq!(compact(r"{Weird \} name}"), r"{Weird \} name}");
    }

    #[test]
    fn test_logical_layout() {
        let text = format_formula(
            "IF(AND({a} > 1, {b}), CONCATENATE({c}, \"!\"), BLANK())",
            FormatStyle::Logical,
        )
        .unwrap();
        assert_eq!(
            text,
            "IF(\n  AND(\n    {a} > 1,\n    {b}\n  ),\n  CONCATENATE({c}, \"!\"),\n  BLANK()\n)"
        );
    }

    #[test]
    fn test_logical_reparses_to_same_tree() {
        let source = "IF({a} > 1, ROUND({b} * (1 - {c}), 2), \"none\") & \"x\"";
        let ast = parse_formula(source).unwrap();
        let logical = FormulaPrinter::logical().print(&ast);
        assert_eq!(parse_formula(&logical).unwrap(), ast);
    }

    #[test]
    fn test_names_rendering() {
        let table = Table::new("tbl1", "Orders")
            .with_field(Field::new("fldQty", "Qty", FieldType::Number))
            .with_field(Field::new("fldPrice", "Unit {Price}", FieldType::Currency));
        let ast = parse_formula("{fldQty}*{fldPrice}+{fldGone}").unwrap();

        let printer = FormulaPrinter::compact().with_naming(FieldNaming::Names, &table);
        assert_eq!(printer.print(&ast), r"{Qty}*{Unit \{Price\}}+{fldGone}");

        let printer = FormulaPrinter::compact().with_naming(FieldNaming::Ids, &table);
        assert_eq!(printer.print(&ast), "{fldQty}*{fldPrice}+{fldGone}");
    }

    #[test]
    fn test_numbers() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(0.25), "0.25");
        assert_eq!(format_number(-1.5), "-1.5");
        assert_eq!(compact("1e3"), "1000");
    }
}
