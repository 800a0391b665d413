//! Formula parser
//!
//! A recursive descent parser for Airtable formulas with standard operator
//! precedence. Field references are classified by shape only; binding them
//! to a table happens in [`crate::resolve`].

use crate::ast::{BinaryOperator, Expr, FieldRef, UnaryOperator};
use crate::error::ParseError;
use airscope_core::FieldId;

type ParseResult<T> = std::result::Result<T, ParseError>;

/// Parse a formula string into an AST
///
/// # Example
/// ```rust
/// use airscope_formula::parse_formula;
///
/// let ast = parse_formula("{fldQty} * {fldPrice}").unwrap();
/// let ast = parse_formula("IF({Status} = \"Done\", 1, 0)").unwrap();
/// ```
pub fn parse_formula(formula: &str) -> ParseResult<Expr> {
    let mut parser = FormulaParser::new(formula)?;

    if parser.current == Token::Eof {
        return Err(ParseError::new(0, "Empty formula"));
    }

    let expr = parser.parse_expression()?;

    // Make sure we consumed all input
    if parser.current != Token::Eof {
        return Err(ParseError::new(
            parser.token_start,
            format!(
                "Unexpected {} after expression",
                parser.current.describe()
            ),
        ));
    }

    Ok(expr)
}

/// Whether text between braces has the shape of a field ID
pub fn is_field_id(text: &str) -> bool {
    lazy_regex::regex_is_match!(r"^fld[A-Za-z0-9]+$", text)
}

/// Token types
#[derive(Debug, Clone, PartialEq)]
enum Token {
    // Literals
    Number(f64),
    String(String),

    // Identifiers and references
    Identifier(String), // Function name or TRUE/FALSE
    FieldRef(String),   // Text between { and }

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Ampersand,
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    Comma,

    // Delimiters
    LeftParen,
    RightParen,

    // End of input
    Eof,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {}", n),
            Token::String(s) => format!("string {:?}", s),
            Token::Identifier(name) => format!("identifier '{}'", name),
            Token::FieldRef(text) => format!("field reference {{{}}}", text),
            Token::Plus => "'+'".into(),
            Token::Minus => "'-'".into(),
            Token::Star => "'*'".into(),
            Token::Slash => "'/'".into(),
            Token::Ampersand => "'&'".into(),
            Token::Equal => "'='".into(),
            Token::NotEqual => "'!='".into(),
            Token::LessThan => "'<'".into(),
            Token::LessEqual => "'<='".into(),
            Token::GreaterThan => "'>'".into(),
            Token::GreaterEqual => "'>='".into(),
            Token::Comma => "','".into(),
            Token::LeftParen => "'('".into(),
            Token::RightParen => "')'".into(),
            Token::Eof => "end of formula".into(),
        }
    }
}

/// Formula parser
struct FormulaParser<'a> {
    input: &'a str,
    pos: usize,
    current: Token,
    /// Byte offset where `current` starts
    token_start: usize,
}

impl<'a> FormulaParser<'a> {
    fn new(input: &'a str) -> ParseResult<Self> {
        let mut parser = Self {
            input,
            pos: 0,
            current: Token::Eof,
            token_start: 0,
        };
        parser.advance_token()?;
        Ok(parser)
    }

    // === Token scanning ===

    fn advance_token(&mut self) -> ParseResult<()> {
        self.skip_whitespace();
        self.token_start = self.pos;
        self.current = self.scan_token()?;
        Ok(())
    }

    fn scan_token(&mut self) -> ParseResult<Token> {
        let c = match self.peek_char() {
            Some(c) => c,
            None => return Ok(Token::Eof),
        };

        // Single-character tokens
        let single = match c {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '&' => Some(Token::Ampersand),
            ',' => Some(Token::Comma),
            '(' => Some(Token::LeftParen),
            ')' => Some(Token::RightParen),
            '=' => Some(Token::Equal),
            _ => None,
        };
        if let Some(token) = single {
            self.advance();
            return Ok(token);
        }

        // Two-character operators
        if c == '<' {
            self.advance();
            if self.peek_char() == Some('=') {
                self.advance();
                return Ok(Token::LessEqual);
            } else if self.peek_char() == Some('>') {
                self.advance();
                return Ok(Token::NotEqual);
            }
            return Ok(Token::LessThan);
        }

        if c == '>' {
            self.advance();
            if self.peek_char() == Some('=') {
                self.advance();
                return Ok(Token::GreaterEqual);
            }
            return Ok(Token::GreaterThan);
        }

        if c == '!' {
            self.advance();
            if self.peek_char() == Some('=') {
                self.advance();
                return Ok(Token::NotEqual);
            }
            return Err(ParseError::new(self.token_start, "Expected '=' after '!'"));
        }

        // String literal
        if c == '"' || c == '\'' {
            return self.scan_string(c);
        }

        // Field reference
        if c == '{' {
            return self.scan_field_ref();
        }

        if c == '}' {
            return Err(ParseError::new(self.token_start, "Unbalanced '}'"));
        }

        // Number
        if c.is_ascii_digit()
            || (c == '.' && self.peek_char_at(1).map_or(false, |c| c.is_ascii_digit()))
        {
            return self.scan_number();
        }

        // Function name or TRUE/FALSE
        if c.is_ascii_alphabetic() || c == '_' {
            return Ok(self.scan_identifier());
        }

        Err(ParseError::new(
            self.token_start,
            format!("Unexpected character '{}'", c),
        ))
    }

    fn scan_string(&mut self, quote: char) -> ParseResult<Token> {
        let start = self.pos;
        self.advance(); // Skip opening quote

        let mut s = String::new();
        loop {
            match self.peek_char() {
                None => return Err(ParseError::new(start, "Unterminated string literal")),
                Some(c) if c == quote => {
                    self.advance();
                    return Ok(Token::String(s));
                }
                Some('\\') => {
                    self.advance();
                    let escaped = self
                        .peek_char()
                        .ok_or_else(|| ParseError::new(start, "Unterminated string literal"))?;
                    s.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        other => other,
                    });
                    self.advance();
                }
                Some(c) => {
                    s.push(c);
                    self.advance();
                }
            }
        }
    }

    fn scan_field_ref(&mut self) -> ParseResult<Token> {
        let start = self.pos;
        self.advance(); // Skip '{'

        let mut text = String::new();
        loop {
            match self.peek_char() {
                None => return Err(ParseError::new(start, "Unterminated field reference")),
                Some('}') => {
                    self.advance();
                    break;
                }
                Some('{') => {
                    return Err(ParseError::new(self.pos, "Unexpected '{' inside field reference"))
                }
                Some('\\') => {
                    self.advance();
                    let escaped = self
                        .peek_char()
                        .ok_or_else(|| ParseError::new(start, "Unterminated field reference"))?;
                    text.push(escaped);
                    self.advance();
                }
                Some(c) => {
                    text.push(c);
                    self.advance();
                }
            }
        }

        if text.trim().is_empty() {
            return Err(ParseError::new(start, "Empty field reference"));
        }
        Ok(Token::FieldRef(text))
    }

    fn scan_number(&mut self) -> ParseResult<Token> {
        let start = self.pos;

        // Integer part
        while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
            self.advance();
        }

        // Decimal part
        if self.peek_char() == Some('.') {
            self.advance();
            while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        // Exponent part
        if self.peek_char().map_or(false, |c| c == 'e' || c == 'E') {
            self.advance();
            if self.peek_char().map_or(false, |c| c == '+' || c == '-') {
                self.advance();
            }
            while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let num_str = &self.input[start..self.pos];
        let value = num_str
            .parse::<f64>()
            .map_err(|_| ParseError::new(start, format!("Invalid number '{}'", num_str)))?;
        if !value.is_finite() {
            return Err(ParseError::new(
                start,
                format!("Number '{}' is out of range", num_str),
            ));
        }
        Ok(Token::Number(value))
    }

    fn scan_identifier(&mut self) -> Token {
        let start = self.pos;
        while self
            .peek_char()
            .map_or(false, |c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.advance();
        }
        Token::Identifier(self.input[start..self.pos].to_string())
    }

    // === Helper methods ===

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(offset)
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().map_or(false, |c| c.is_whitespace()) {
            self.advance();
        }
    }

    fn consume(&mut self) -> ParseResult<Token> {
        let token = std::mem::replace(&mut self.current, Token::Eof);
        self.advance_token()?;
        Ok(token)
    }

    fn expect(&mut self, expected: &Token) -> ParseResult<()> {
        if &self.current == expected {
            self.consume()?;
            Ok(())
        } else {
            Err(ParseError::new(
                self.token_start,
                format!(
                    "Expected {}, got {}",
                    expected.describe(),
                    self.current.describe()
                ),
            ))
        }
    }

    // === Expression parsing with precedence ===
    // Precedence (lowest to highest):
    // 1. Comparison: =, !=, <>, <, <=, >, >=
    // 2. Concatenation: &
    // 3. Addition/Subtraction: +, -
    // 4. Multiplication/Division: *, /
    // 5. Unary: -, +
    // 6. Primary: literals, references, function calls, parentheses

    fn parse_expression(&mut self) -> ParseResult<Expr> {
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_concatenation()?;

        loop {
            let op = match self.current {
                Token::Equal => BinaryOperator::Equal,
                Token::NotEqual => BinaryOperator::NotEqual,
                Token::LessThan => BinaryOperator::LessThan,
                Token::LessEqual => BinaryOperator::LessEqual,
                Token::GreaterThan => BinaryOperator::GreaterThan,
                Token::GreaterEqual => BinaryOperator::GreaterEqual,
                _ => break,
            };

            self.consume()?;
            let right = self.parse_concatenation()?;
            left = Expr::binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_concatenation(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_additive()?;

        while self.current == Token::Ampersand {
            self.consume()?;
            let right = self.parse_additive()?;
            left = Expr::binary(BinaryOperator::Concat, left, right);
        }

        Ok(left)
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.current {
                Token::Plus => BinaryOperator::Add,
                Token::Minus => BinaryOperator::Subtract,
                _ => break,
            };

            self.consume()?;
            let right = self.parse_multiplicative()?;
            left = Expr::binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.current {
                Token::Star => BinaryOperator::Multiply,
                Token::Slash => BinaryOperator::Divide,
                _ => break,
            };

            self.consume()?;
            let right = self.parse_unary()?;
            left = Expr::binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        // Prefix unary minus
        if self.current == Token::Minus {
            self.consume()?;
            let operand = self.parse_unary()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOperator::Negate,
                operand: Box::new(operand),
            });
        }

        // Prefix plus (no-op)
        if self.current == Token::Plus {
            self.consume()?;
            return self.parse_unary();
        }

        self.parse_primary()
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let start = self.token_start;
        match self.current.clone() {
            Token::Number(n) => {
                self.consume()?;
                Ok(Expr::Number(n))
            }

            Token::String(s) => {
                self.consume()?;
                Ok(Expr::String(s))
            }

            Token::FieldRef(text) => {
                self.consume()?;
                Ok(Expr::Field(if is_field_id(&text) {
                    FieldRef::Id(FieldId::new(text))
                } else {
                    FieldRef::Name(text)
                }))
            }

            Token::LeftParen => {
                self.consume()?;
                let expr = self.parse_expression()?;
                self.expect(&Token::RightParen)?;
                Ok(expr)
            }

            Token::Identifier(name) => {
                self.consume()?;
                // Check if it's a function call
                if self.current == Token::LeftParen {
                    return self.parse_function_call(name);
                }
                match name.to_uppercase().as_str() {
                    "TRUE" => Ok(Expr::Boolean(true)),
                    "FALSE" => Ok(Expr::Boolean(false)),
                    _ => Err(ParseError::new(
                        start,
                        format!("Unknown identifier '{}' (function calls need parentheses)", name),
                    )),
                }
            }

            other => Err(ParseError::new(
                start,
                format!("Unexpected {}", other.describe()),
            )),
        }
    }

    fn parse_function_call(&mut self, name: String) -> ParseResult<Expr> {
        self.expect(&Token::LeftParen)?;

        let mut args = Vec::new();

        // Parse arguments
        if self.current != Token::RightParen {
            args.push(self.parse_expression()?);

            while self.current == Token::Comma {
                self.consume()?;
                args.push(self.parse_expression()?);
            }
        }

        self.expect(&Token::RightParen)?;

        let name = name.to_uppercase();
        // Constant functions become literals
        if args.is_empty() {
            match name.as_str() {
                "TRUE" => return Ok(Expr::Boolean(true)),
                "FALSE" => return Ok(Expr::Boolean(false)),
                "BLANK" => return Ok(Expr::Blank),
                _ => {}
            }
        }

        Ok(Expr::Function { name, args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_formula("42").unwrap(), Expr::Number(42.0));
        assert_eq!(parse_formula("3.14").unwrap(), Expr::Number(3.14));
        assert_eq!(parse_formula(".5").unwrap(), Expr::Number(0.5));
        assert_eq!(parse_formula("1e3").unwrap(), Expr::Number(1000.0));
    }

    #[test]
    fn test_number_out_of_range() {
        let err = parse_formula("1 + 1e400").unwrap_err();
        assert_eq!(err.position, 4);
        assert!(err.message.contains("out of range"), "{}", err.message);
        assert_eq!(parse_formula("1e308").unwrap(), Expr::Number(1e308));
    }

    #[test]
    fn test_parse_string() {
        assert_eq!(
            parse_formula("\"Hello\"").unwrap(),
            Expr::String("Hello".into())
        );
        assert_eq!(
            parse_formula(r#""say \"hi\"\n""#).unwrap(),
            Expr::String("say \"hi\"\n".into())
        );
        assert_eq!(
            parse_formula("'single'").unwrap(),
            Expr::String("single".into())
        );
    }

    #[test]
    fn test_parse_boolean_and_blank() {
        assert_eq!(parse_formula("TRUE").unwrap(), Expr::Boolean(true));
        assert_eq!(parse_formula("false()").unwrap(), Expr::Boolean(false));
        assert_eq!(parse_formula("BLANK()").unwrap(), Expr::Blank);
    }

    #[test]
    fn test_parse_field_refs() {
        assert_eq!(
            parse_formula("{fldAbc123}").unwrap(),
            Expr::field_id("fldAbc123")
        );
        assert_eq!(
            parse_formula("{Unit Price}").unwrap(),
            Expr::field_name("Unit Price")
        );
        assert_eq!(
            parse_formula(r"{Odd \} name}").unwrap(),
            Expr::field_name("Odd } name")
        );
    }

    #[test]
    fn test_parse_arithmetic_precedence() {
        // 1+2*3 parses as 1+(2*3)
        let ast = parse_formula("1+2*3").unwrap();
        assert_eq!(
            ast,
            Expr::binary(
                BinaryOperator::Add,
                Expr::Number(1.0),
                Expr::binary(BinaryOperator::Multiply, Expr::Number(2.0), Expr::Number(3.0)),
            )
        );

        // Left associativity: 8-4-2 is (8-4)-2
        let ast = parse_formula("8-4-2").unwrap();
        assert_eq!(
            ast,
            Expr::binary(
                BinaryOperator::Subtract,
                Expr::binary(BinaryOperator::Subtract, Expr::Number(8.0), Expr::Number(4.0)),
                Expr::Number(2.0),
            )
        );
    }

    #[test]
    fn test_parse_concat_binds_looser_than_addition() {
        let ast = parse_formula("{fldA} & 1 + 2").unwrap();
        assert!(matches!(
            ast,
            Expr::BinaryOp {
                op: BinaryOperator::Concat,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_comparison() {
        for (text, op) in [
            ("{a} = 1", BinaryOperator::Equal),
            ("{a} != 1", BinaryOperator::NotEqual),
            ("{a} <> 1", BinaryOperator::NotEqual),
            ("{a} <= 1", BinaryOperator::LessEqual),
            ("{a} >= 1", BinaryOperator::GreaterEqual),
        ] {
            match parse_formula(text).unwrap() {
                Expr::BinaryOp { op: parsed, .. } => assert_eq!(parsed, op, "{}", text),
                other => panic!("Expected BinaryOp for {}, got {:?}", text, other),
            }
        }
    }

    #[test]
    fn test_parse_unary() {
        let ast = parse_formula("-{fldA}").unwrap();
        assert_eq!(
            ast,
            Expr::UnaryOp {
                op: UnaryOperator::Negate,
                operand: Box::new(Expr::field_id("fldA")),
            }
        );
        assert_eq!(parse_formula("+5").unwrap(), Expr::Number(5.0));
    }

    #[test]
    fn test_parse_function() {
        let ast = parse_formula("if({Qty} > 0, \"yes\", \"no\")").unwrap();
        if let Expr::Function { name, args } = ast {
            assert_eq!(name, "IF");
            assert_eq!(args.len(), 3);
        } else {
            panic!("Expected Function");
        }

        let ast = parse_formula("NOW()").unwrap();
        assert_eq!(ast, Expr::call("NOW", vec![]));
    }

    #[test]
    fn test_parse_parentheses() {
        let ast = parse_formula("(1 + 2) * 3").unwrap();
        assert_eq!(
            ast,
            Expr::binary(
                BinaryOperator::Multiply,
                Expr::binary(BinaryOperator::Add, Expr::Number(1.0), Expr::Number(2.0)),
                Expr::Number(3.0),
            )
        );
    }

    #[test]
    fn test_whitespace_and_newlines_ignored() {
        let compact = parse_formula("IF({a}>1,\"x\",\"y\")").unwrap();
        let spread = parse_formula("IF(\n  {a} > 1,\n  \"x\",\n  \"y\"\n)").unwrap();
        assert_eq!(compact, spread);
    }

    #[test]
    fn test_parse_errors_carry_position() {
        let err = parse_formula("\"abc").unwrap_err();
        assert_eq!(err.position, 0);
        assert!(err.message.contains("Unterminated string"));

        let err = parse_formula("1 + {fldA").unwrap_err();
        assert_eq!(err.position, 4);
        assert!(err.message.contains("Unterminated field reference"));

        let err = parse_formula("SUM(1, 2").unwrap_err();
        assert_eq!(err.position, 8);

        let err = parse_formula("1 + 2)").unwrap_err();
        assert_eq!(err.position, 5);

        let err = parse_formula("1 # 2").unwrap_err();
        assert_eq!(err.position, 2);
        assert!(err.message.contains("Unexpected character '#'"));

        let err = parse_formula("{a} + }").unwrap_err();
        assert_eq!(err.position, 6);

        let err = parse_formula("Qty * 2").unwrap_err();
        assert_eq!(err.position, 0);
    }

    #[test]
    fn test_empty_formula() {
        assert_eq!(parse_formula("   ").unwrap_err().message, "Empty formula");
        assert!(parse_formula("{}").is_err());
    }

    #[test]
    fn test_is_field_id() {
        assert!(is_field_id("fldAbC123xyz00001"));
        assert!(is_field_id("fldMissing"));
        assert!(!is_field_id("Unit Price"));
        assert!(!is_field_id("fld"));
        assert!(!is_field_id("fld name"));
    }
}
