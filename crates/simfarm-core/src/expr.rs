//! Restricted expression language used for stop conditions and deferred
//! setting values.
//!
//! The grammar is an explicit allowlist: numeric, string, boolean and list
//! literals, arithmetic, comparisons (including `in`), `and`/`or`/`not`, a
//! small set of math functions and, when enabled, `[k]` references into the
//! evaluation history. Anything else is rejected with `eval-forbidden`.

use crate::errors::{ErrorInfo, SimError};

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal.
    Number(f64),
    /// Boolean literal.
    Bool(bool),
    /// String literal.
    Str(String),
    /// List literal.
    List(Vec<Expr>),
    /// Reference into the evaluation history, negative indices from the end.
    History(i64),
    /// Unary operation.
    Unary(UnaryOp, Box<Expr>),
    /// Binary operation.
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// Call to an allowlisted math function.
    Call(Func, Box<Expr>),
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
    /// Boolean negation.
    Not,
}

/// Binary operators, in no particular precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    In,
    And,
    Or,
}

/// Allowlisted single-argument math functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Func {
    Abs,
    Sqrt,
    Cos,
    Sin,
    Tan,
}

/// Runtime value produced by [`eval`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Numeric value.
    Number(f64),
    /// Boolean value.
    Bool(bool),
    /// String value.
    Str(String),
    /// List of values.
    List(Vec<Value>),
}

impl Value {
    /// Interprets the value as a boolean. Numbers are true when non-zero.
    pub fn truthy(&self) -> Result<bool, SimError> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Number(n) => Ok(*n != 0.0),
            other => Err(type_error("boolean", other)),
        }
    }

    /// Returns the numeric content of the value, if any.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

fn eval_error(code: &str, message: impl Into<String>) -> SimError {
    SimError::Eval(ErrorInfo::new(code, message))
}

fn type_error(expected: &str, got: &Value) -> SimError {
    eval_error("eval-type", format!("expected a {expected} value, got {got:?}"))
}

/// Returns `true` when the trimmed source begins with a comparison operator,
/// i.e. the shorthand form that implicitly targets the latest evaluation.
pub fn leading_comparison(src: &str) -> bool {
    let s = src.trim_start();
    if s.starts_with("<") || s.starts_with(">") || s.starts_with("==") || s.starts_with("!=") {
        return true;
    }
    if let Some(rest) = s.strip_prefix("in") {
        return rest
            .chars()
            .next()
            .map(|c| !c.is_alphanumeric() && c != '_')
            .unwrap_or(false);
    }
    false
}

impl Expr {
    /// Parses an expression. History references (`[k]`) are only recognized
    /// when `allow_history` is set; otherwise a one-element bracket is a
    /// plain list literal.
    pub fn parse(src: &str, allow_history: bool) -> Result<Expr, SimError> {
        let tokens = tokenize(src)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            allow_history,
        };
        let expr = parser.or_expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(eval_error(
                "eval-syntax",
                format!("unexpected trailing input in expression: {src:?}"),
            ));
        }
        Ok(expr)
    }

    /// Collects every history index referenced by the expression.
    pub fn history_indices(&self, out: &mut Vec<i64>) {
        match self {
            Expr::History(k) => out.push(*k),
            Expr::List(items) => {
                for item in items {
                    item.history_indices(out);
                }
            }
            Expr::Unary(_, inner) | Expr::Call(_, inner) => inner.history_indices(out),
            Expr::Binary(_, lhs, rhs) => {
                lhs.history_indices(out);
                rhs.history_indices(out);
            }
            Expr::Number(_) | Expr::Bool(_) | Expr::Str(_) => {}
        }
    }
}

/// Evaluates an expression against an evaluation history.
///
/// Out-of-range history references fail with the `eval-history` code so the
/// caller can decide whether that is an error or merely "not enough data yet".
pub fn eval(expr: &Expr, history: &[f64]) -> Result<Value, SimError> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::List(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(eval(item, history)?);
            }
            Ok(Value::List(values))
        }
        Expr::History(k) => match resolve_index(*k, history.len()) {
            Some(idx) => Ok(Value::Number(history[idx])),
            None => Err(SimError::Eval(
                ErrorInfo::new("eval-history", "history index out of range")
                    .with_context("index", k.to_string())
                    .with_context("length", history.len().to_string()),
            )),
        },
        Expr::Unary(op, inner) => {
            let value = eval(inner, history)?;
            match op {
                UnaryOp::Neg => match value {
                    Value::Number(n) => Ok(Value::Number(-n)),
                    other => Err(type_error("numeric", &other)),
                },
                UnaryOp::Not => Ok(Value::Bool(!value.truthy()?)),
            }
        }
        Expr::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, history),
        Expr::Call(func, arg) => {
            let value = eval(arg, history)?;
            let n = value.as_number().ok_or_else(|| type_error("numeric", &value))?;
            let result = match func {
                Func::Abs => n.abs(),
                Func::Sqrt => n.sqrt(),
                Func::Cos => n.cos(),
                Func::Sin => n.sin(),
                Func::Tan => n.tan(),
            };
            Ok(Value::Number(result))
        }
    }
}

/// Normalizes a possibly negative history index against a history length.
pub fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let idx = if index < 0 { index + len } else { index };
    if idx >= 0 && idx < len {
        Some(idx as usize)
    } else {
        None
    }
}

fn eval_binary(op: BinaryOp, lhs: &Expr, rhs: &Expr, history: &[f64]) -> Result<Value, SimError> {
    // Short-circuit the boolean connectives before evaluating the right side.
    if matches!(op, BinaryOp::And | BinaryOp::Or) {
        let left = eval(lhs, history)?.truthy()?;
        return match (op, left) {
            (BinaryOp::And, false) => Ok(Value::Bool(false)),
            (BinaryOp::Or, true) => Ok(Value::Bool(true)),
            _ => Ok(Value::Bool(eval(rhs, history)?.truthy()?)),
        };
    }

    let left = eval(lhs, history)?;
    let right = eval(rhs, history)?;

    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            let a = left.as_number().ok_or_else(|| type_error("numeric", &left))?;
            let b = right.as_number().ok_or_else(|| type_error("numeric", &right))?;
            let result = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Rem => a % b,
                _ => unreachable!(),
            };
            Ok(Value::Number(result))
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let a = left.as_number().ok_or_else(|| type_error("numeric", &left))?;
            let b = right.as_number().ok_or_else(|| type_error("numeric", &right))?;
            let result = match op {
                BinaryOp::Lt => a < b,
                BinaryOp::Le => a <= b,
                BinaryOp::Gt => a > b,
                BinaryOp::Ge => a >= b,
                _ => unreachable!(),
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::Eq => Ok(Value::Bool(left == right)),
        BinaryOp::Ne => Ok(Value::Bool(left != right)),
        BinaryOp::In => match &right {
            Value::List(items) => Ok(Value::Bool(items.contains(&left))),
            Value::Str(haystack) => match &left {
                Value::Str(needle) => Ok(Value::Bool(haystack.contains(needle.as_str()))),
                other => Err(type_error("string", other)),
            },
            other => Err(type_error("list or string", other)),
        },
        BinaryOp::And | BinaryOp::Or => unreachable!(),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
}

fn tokenize(src: &str) -> Result<Vec<Token>, SimError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::EqEq);
                    i += 2;
                } else {
                    return Err(eval_error("eval-syntax", "single '=' is not an operator"));
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ne);
                    i += 2;
                } else {
                    return Err(eval_error("eval-syntax", "expected '!='"));
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            value.push(ch);
                            i += 1;
                        }
                        None => {
                            return Err(eval_error("eval-syntax", "unterminated string literal"))
                        }
                    }
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let number = text.parse::<f64>().map_err(|_| {
                    eval_error("eval-syntax", format!("invalid number literal: {text:?}"))
                })?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(eval_error(
                    "eval-forbidden",
                    format!("character {other:?} is not allowed in expressions"),
                ))
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    allow_history: bool,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), SimError> {
        match self.bump() {
            Some(found) if found == token => Ok(()),
            _ => Err(eval_error("eval-syntax", format!("expected {what}"))),
        }
    }

    fn or_expr(&mut self) -> Result<Expr, SimError> {
        let mut lhs = self.and_expr()?;
        while matches!(self.peek(), Some(Token::Ident(k)) if k == "or") {
            self.bump();
            let rhs = self.and_expr()?;
            lhs = Expr::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, SimError> {
        let mut lhs = self.not_expr()?;
        while matches!(self.peek(), Some(Token::Ident(k)) if k == "and") {
            self.bump();
            let rhs = self.not_expr()?;
            lhs = Expr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> Result<Expr, SimError> {
        if matches!(self.peek(), Some(Token::Ident(k)) if k == "not") {
            self.bump();
            let inner = self.not_expr()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, SimError> {
        let lhs = self.additive()?;
        let op = match self.peek() {
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Le) => BinaryOp::Le,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Ge) => BinaryOp::Ge,
            Some(Token::EqEq) => BinaryOp::Eq,
            Some(Token::Ne) => BinaryOp::Ne,
            Some(Token::Ident(k)) if k == "in" => BinaryOp::In,
            _ => return Ok(lhs),
        };
        self.bump();
        let rhs = self.additive()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn additive(&mut self) -> Result<Expr, SimError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.bump();
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> Result<Expr, SimError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => break,
            };
            self.bump();
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, SimError> {
        if matches!(self.peek(), Some(Token::Minus)) {
            self.bump();
            let inner = self.unary()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, SimError> {
        match self.bump() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::LParen) => {
                let inner = self.or_expr()?;
                self.expect(Token::RParen, "closing parenthesis")?;
                Ok(inner)
            }
            Some(Token::LBracket) => self.bracket(),
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                _ => {
                    let func = match name.as_str() {
                        "abs" => Func::Abs,
                        "sqrt" => Func::Sqrt,
                        "cos" => Func::Cos,
                        "sin" => Func::Sin,
                        "tan" => Func::Tan,
                        _ => {
                            return Err(SimError::Eval(
                                ErrorInfo::new(
                                    "eval-forbidden",
                                    "identifier is not in the allowlist",
                                )
                                .with_context("identifier", name),
                            ))
                        }
                    };
                    self.expect(Token::LParen, "opening parenthesis after function name")?;
                    let arg = self.or_expr()?;
                    self.expect(Token::RParen, "closing parenthesis after function argument")?;
                    Ok(Expr::Call(func, Box::new(arg)))
                }
            },
            _ => Err(eval_error("eval-syntax", "unexpected end of expression")),
        }
    }

    /// Parses the contents of a bracket: either a history reference (when a
    /// single integer literal and history references are enabled) or a list.
    fn bracket(&mut self) -> Result<Expr, SimError> {
        if self.allow_history {
            if let Some(index) = self.try_history_index() {
                return Ok(Expr::History(index));
            }
        }
        let mut items = Vec::new();
        if matches!(self.peek(), Some(Token::RBracket)) {
            self.bump();
            return Ok(Expr::List(items));
        }
        loop {
            items.push(self.or_expr()?);
            match self.bump() {
                Some(Token::Comma) => continue,
                Some(Token::RBracket) => break,
                _ => return Err(eval_error("eval-syntax", "expected ',' or ']' in list")),
            }
        }
        Ok(Expr::List(items))
    }

    fn try_history_index(&mut self) -> Option<i64> {
        let start = self.pos;
        let negative = if matches!(self.peek(), Some(Token::Minus)) {
            self.bump();
            true
        } else {
            false
        };
        if let Some(Token::Number(n)) = self.peek().cloned() {
            if n.fract() == 0.0 {
                self.bump();
                if matches!(self.peek(), Some(Token::RBracket)) {
                    self.bump();
                    let index = n as i64;
                    return Some(if negative { -index } else { index });
                }
            }
        }
        self.pos = start;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_str(src: &str, history: &[f64]) -> Result<Value, SimError> {
        eval(&Expr::parse(src, true)?, history)
    }

    #[test]
    fn arithmetic_precedence() {
        assert_eq!(eval_str("1 + 2 * 3", &[]).unwrap(), Value::Number(7.0));
        assert_eq!(eval_str("(1 + 2) * 3", &[]).unwrap(), Value::Number(9.0));
        assert_eq!(eval_str("-2 * 3", &[]).unwrap(), Value::Number(-6.0));
    }

    #[test]
    fn history_references() {
        assert_eq!(eval_str("[0] + [-1]", &[1.5, 2.5]).unwrap(), Value::Number(4.0));
        let err = eval_str("[3]", &[1.0]).unwrap_err();
        assert_eq!(err.code(), "eval-history");
    }

    #[test]
    fn list_versus_history() {
        let expr = Expr::parse("[1]", false).unwrap();
        assert_eq!(expr, Expr::List(vec![Expr::Number(1.0)]));
        let expr = Expr::parse("[1]", true).unwrap();
        assert_eq!(expr, Expr::History(1));
    }

    #[test]
    fn membership_and_boolean() {
        assert_eq!(eval_str("2 in [1, 2, 3]", &[]).unwrap(), Value::Bool(true));
        assert_eq!(
            eval_str("1 < 2 and not (3 < 2)", &[]).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn allowlisted_functions_only() {
        assert_eq!(eval_str("sqrt(16)", &[]).unwrap(), Value::Number(4.0));
        let err = Expr::parse("exec(1)", true).unwrap_err();
        assert_eq!(err.code(), "eval-forbidden");
        let err = Expr::parse("__import__", true).unwrap_err();
        assert_eq!(err.code(), "eval-forbidden");
    }

    #[test]
    fn leading_comparison_detection() {
        assert!(leading_comparison("> 0"));
        assert!(leading_comparison("<= 1e-3"));
        assert!(leading_comparison("in [1, 2]"));
        assert!(!leading_comparison("[0] > [-1]"));
        assert!(!leading_comparison("interval > 2"));
    }
}
