// CLASSIFICATION: COMMUNITY
// Filename: expr.rs v0.4
// Author: Lukas Bower
// Date Modified: 2026-06-27

//! Restricted expression grammar shared by the structured glyph front
//! end and the `eval_expr` handler. Arithmetic, comparison, logical
//! operators, and named references only; identifiers resolve through a
//! caller-supplied scope plus a small math-constant allow-list. No
//! identifier outside that set evaluates, and no code loads at runtime.

use super::Value;
use crate::error::{ErrorKind, HostResult};
use crate::host_bail;

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    Bang,
    LParen,
    RParen,
}

fn lex(src: &str) -> HostResult<Vec<Tok>> {
    let mut out = Vec::new();
    let bytes = src.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < bytes.len() && ((bytes[i] as char).is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                let text = &src[start..i];
                match text.parse::<f64>() {
                    Ok(n) => out.push(Tok::Num(n)),
                    Err(_) => host_bail!(ErrorKind::ExpressionRejected, "bad number {text}"),
                }
            }
            '\'' | '"' => {
                let quote = bytes[i];
                let start = i + 1;
                let mut j = start;
                while j < bytes.len() && bytes[j] != quote {
                    j += 1;
                }
                if j >= bytes.len() {
                    host_bail!(ErrorKind::ExpressionRejected, "unterminated string");
                }
                out.push(Tok::Str(src[start..j].to_string()));
                i = j + 1;
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let start = i;
                while i < bytes.len()
                    && ((bytes[i] as char).is_ascii_alphanumeric() || bytes[i] == b'_')
                {
                    i += 1;
                }
                let word = &src[start..i];
                match word {
                    "and" => out.push(Tok::AndAnd),
                    "or" => out.push(Tok::OrOr),
                    "not" => out.push(Tok::Bang),
                    _ => out.push(Tok::Ident(word.to_string())),
                }
            }
            '+' => {
                out.push(Tok::Plus);
                i += 1;
            }
            '-' => {
                out.push(Tok::Minus);
                i += 1;
            }
            '*' => {
                out.push(Tok::Star);
                i += 1;
            }
            '/' => {
                out.push(Tok::Slash);
                i += 1;
            }
            '%' => {
                out.push(Tok::Percent);
                i += 1;
            }
            '(' => {
                out.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                out.push(Tok::RParen);
                i += 1;
            }
            '<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    out.push(Tok::Le);
                    i += 2;
                } else {
                    out.push(Tok::Lt);
                    i += 1;
                }
            }
            '>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    out.push(Tok::Ge);
                    i += 2;
                } else {
                    out.push(Tok::Gt);
                    i += 1;
                }
            }
            '=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    out.push(Tok::EqEq);
                    i += 2;
                } else {
                    host_bail!(ErrorKind::ExpressionRejected, "assignment is not allowed");
                }
            }
            '!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    out.push(Tok::NotEq);
                    i += 2;
                } else {
                    out.push(Tok::Bang);
                    i += 1;
                }
            }
            '&' => {
                if bytes.get(i + 1) == Some(&b'&') {
                    out.push(Tok::AndAnd);
                    i += 2;
                } else {
                    host_bail!(ErrorKind::ExpressionRejected, "lone & is not allowed");
                }
            }
            '|' => {
                if bytes.get(i + 1) == Some(&b'|') {
                    out.push(Tok::OrOr);
                    i += 2;
                } else {
                    host_bail!(ErrorKind::ExpressionRejected, "lone | is not allowed");
                }
            }
            other => host_bail!(
                ErrorKind::ExpressionRejected,
                "character {other:?} is outside the expression grammar"
            ),
        }
    }
    Ok(out)
}

struct Parser<'a> {
    toks: Vec<Tok>,
    pos: usize,
    scope: &'a dyn Fn(&str) -> Option<Value>,
}

/// Evaluate an expression with the given identifier scope.
pub fn eval(src: &str, scope: &dyn Fn(&str) -> Option<Value>) -> HostResult<Value> {
    let toks = lex(src)?;
    if toks.is_empty() {
        host_bail!(ErrorKind::ExpressionRejected, "empty expression");
    }
    let mut parser = Parser {
        toks,
        pos: 0,
        scope,
    };
    let value = parser.or_expr()?;
    if parser.pos != parser.toks.len() {
        host_bail!(ErrorKind::ExpressionRejected, "trailing input in expression");
    }
    Ok(value)
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn bump(&mut self) -> Option<Tok> {
        let tok = self.toks.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn or_expr(&mut self) -> HostResult<Value> {
        let mut lhs = self.and_expr()?;
        while matches!(self.peek(), Some(Tok::OrOr)) {
            self.bump();
            let rhs = self.and_expr()?;
            lhs = Value::Bool(lhs.truthy() || rhs.truthy());
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> HostResult<Value> {
        let mut lhs = self.cmp_expr()?;
        while matches!(self.peek(), Some(Tok::AndAnd)) {
            self.bump();
            let rhs = self.cmp_expr()?;
            lhs = Value::Bool(lhs.truthy() && rhs.truthy());
        }
        Ok(lhs)
    }

    fn cmp_expr(&mut self) -> HostResult<Value> {
        let lhs = self.add_expr()?;
        let op = match self.peek() {
            Some(Tok::Lt) => "lt",
            Some(Tok::Gt) => "gt",
            Some(Tok::Le) => "lte",
            Some(Tok::Ge) => "gte",
            Some(Tok::EqEq) => "eq",
            Some(Tok::NotEq) => "neq",
            _ => return Ok(lhs),
        };
        self.bump();
        let rhs = self.add_expr()?;
        let result = match op {
            "eq" => lhs == rhs,
            "neq" => lhs != rhs,
            _ => {
                let ordering = match (&lhs, &rhs) {
                    (Value::Str(a), Value::Str(b)) => a.cmp(b),
                    _ => lhs
                        .as_number()
                        .partial_cmp(&rhs.as_number())
                        .unwrap_or(std::cmp::Ordering::Equal),
                };
                match op {
                    "lt" => ordering.is_lt(),
                    "gt" => ordering.is_gt(),
                    "lte" => ordering.is_le(),
                    "gte" => ordering.is_ge(),
                    _ => unreachable!(),
                }
            }
        };
        Ok(Value::Bool(result))
    }

    fn add_expr(&mut self) -> HostResult<Value> {
        let mut lhs = self.mul_expr()?;
        loop {
            match self.peek() {
                Some(Tok::Plus) => {
                    self.bump();
                    let rhs = self.mul_expr()?;
                    lhs = match (&lhs, &rhs) {
                        (Value::Str(_), _) | (_, Value::Str(_)) => {
                            Value::Str(format!("{lhs}{rhs}"))
                        }
                        _ => Value::Num(lhs.as_number() + rhs.as_number()),
                    };
                }
                Some(Tok::Minus) => {
                    self.bump();
                    let rhs = self.mul_expr()?;
                    lhs = Value::Num(lhs.as_number() - rhs.as_number());
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn mul_expr(&mut self) -> HostResult<Value> {
        let mut lhs = self.unary_expr()?;
        loop {
            match self.peek() {
                Some(Tok::Star) => {
                    self.bump();
                    let rhs = self.unary_expr()?;
                    lhs = Value::Num(lhs.as_number() * rhs.as_number());
                }
                Some(Tok::Slash) => {
                    self.bump();
                    let rhs = self.unary_expr()?;
                    let denom = rhs.as_number();
                    if denom == 0.0 {
                        host_bail!(ErrorKind::DivisionByZero, "division by zero in expression");
                    }
                    lhs = Value::Num(lhs.as_number() / denom);
                }
                Some(Tok::Percent) => {
                    self.bump();
                    let rhs = self.unary_expr()?;
                    let denom = rhs.as_number();
                    if denom == 0.0 {
                        host_bail!(ErrorKind::DivisionByZero, "modulo by zero in expression");
                    }
                    lhs = Value::Num(lhs.as_number() % denom);
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn unary_expr(&mut self) -> HostResult<Value> {
        match self.peek() {
            Some(Tok::Bang) => {
                self.bump();
                let value = self.unary_expr()?;
                Ok(Value::Bool(!value.truthy()))
            }
            Some(Tok::Minus) => {
                self.bump();
                let value = self.unary_expr()?;
                Ok(Value::Num(-value.as_number()))
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> HostResult<Value> {
        match self.bump() {
            Some(Tok::Num(n)) => Ok(Value::Num(n)),
            Some(Tok::Str(s)) => Ok(Value::Str(s)),
            Some(Tok::Ident(name)) => self.resolve(&name),
            Some(Tok::LParen) => {
                let value = self.or_expr()?;
                match self.bump() {
                    Some(Tok::RParen) => Ok(value),
                    _ => Err(crate::host_err!(
                        ErrorKind::ExpressionRejected,
                        "unbalanced parenthesis"
                    )),
                }
            }
            other => Err(crate::host_err!(
                ErrorKind::ExpressionRejected,
                "unexpected token {other:?}"
            )),
        }
    }

    fn resolve(&self, name: &str) -> HostResult<Value> {
        match name {
            "true" => return Ok(Value::Bool(true)),
            "false" => return Ok(Value::Bool(false)),
            "null" => return Ok(Value::Null),
            "pi" => return Ok(Value::Num(std::f64::consts::PI)),
            "e" => return Ok(Value::Num(std::f64::consts::E)),
            "tau" => return Ok(Value::Num(std::f64::consts::TAU)),
            _ => {}
        }
        match (self.scope)(name) {
            Some(value) => Ok(value),
            None => Err(crate::host_err!(
                ErrorKind::ExpressionRejected,
                "identifier {name} is not in the allow-list"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_scope(_: &str) -> Option<Value> {
        None
    }

    #[test]
    fn arithmetic_precedence() {
        let v = eval("2 + 3 * 4", &no_scope).expect("eval");
        assert_eq!(v, Value::Num(14.0));
    }

    #[test]
    fn comparison_and_logic() {
        let v = eval("(1 < 2) && !(3 >= 4)", &no_scope).expect("eval");
        assert_eq!(v, Value::Bool(true));
        let v = eval("1 == 2 or 2 == 2", &no_scope).expect("eval");
        assert_eq!(v, Value::Bool(true));
    }

    #[test]
    fn constants_resolve() {
        let v = eval("pi > 3 && pi < 4", &no_scope).expect("eval");
        assert_eq!(v, Value::Bool(true));
    }

    #[test]
    fn scope_lookup() {
        let scope = |name: &str| -> Option<Value> {
            (name == "load").then(|| Value::Num(0.9))
        };
        let v = eval("load >= 0.75", &scope).expect("eval");
        assert_eq!(v, Value::Bool(true));
    }

    #[test]
    fn unknown_identifier_is_rejected() {
        let err = eval("system", &no_scope).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ExpressionRejected);
    }

    #[test]
    fn grammar_violations_are_rejected() {
        assert_eq!(
            eval("x = 4", &no_scope).unwrap_err().kind,
            ErrorKind::ExpressionRejected
        );
        assert_eq!(
            eval("call(1)", &no_scope).unwrap_err().kind,
            ErrorKind::ExpressionRejected
        );
        assert_eq!(
            eval("", &no_scope).unwrap_err().kind,
            ErrorKind::ExpressionRejected
        );
    }

    #[test]
    fn division_by_zero_is_typed() {
        let err = eval("1 / 0", &no_scope).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DivisionByZero);
    }
}
