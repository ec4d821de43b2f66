//! Restricted expression evaluator for trigger conditions, `conditional`
//! actions, and `calculate`.
//!
//! The grammar covers literals, dotted paths, arithmetic, comparisons and
//! boolean logic. Nothing else is executable:
//!
//! ```text
//! or      := and (("||" | "or") and)*
//! and     := not (("&&" | "and") not)*
//! not     := ("!" | "not") not | compare
//! compare := sum (("==" | "===" | "!=" | "!==" | "<" | "<=" | ">" | ">=") sum)?
//! sum     := product (("+" | "-") product)*
//! product := unary (("*" | "/" | "%") unary)*
//! unary   := "-" unary | primary
//! primary := number | string | true | false | null | path | "(" or ")"
//! ```
//!
//! `OLD.x` and `NEW.x` resolve against the `old` / `new` row images of a
//! database-change context; every other path resolves from the context root.
//! [`evaluate_condition`] fails closed: any error yields `false`.

use serde_json::{Number, Value};

use crate::template::resolve_path;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors raised while parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConditionError {
    #[error("empty expression")]
    Empty,

    #[error("parse error at {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("undefined field '{0}'")]
    UndefinedField(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("division by zero")]
    DivisionByZero,
}

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Path(String),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    StrictEq,
    Ne,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Number),
    Str(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    And,
    Or,
    Not,
}

const OPERATORS: [&str; 17] = [
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "<", ">", "+", "-", "*", "/", "%", "!",
    "=",
];

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, ConditionError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        if c == '(' || c == ')' {
            tokens.push((i, if c == '(' { Token::LParen } else { Token::RParen }));
            i += 1;
            continue;
        }

        if c == '\'' || c == '"' {
            let start = i;
            i += 1;
            let mut s = String::new();
            loop {
                let Some(ch) = input[i..].chars().next() else {
                    return Err(ConditionError::Parse {
                        position: start,
                        message: "unterminated string".to_string(),
                    });
                };
                i += ch.len_utf8();
                match ch {
                    '\\' => {
                        if let Some(escaped) = input[i..].chars().next() {
                            s.push(escaped);
                            i += escaped.len_utf8();
                        }
                    }
                    ch if ch == c => break,
                    ch => s.push(ch),
                }
            }
            tokens.push((start, Token::Str(s)));
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            let text = &input[start..i];
            let number = if let Ok(n) = text.parse::<i64>() {
                Number::from(n)
            } else {
                text.parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .ok_or_else(|| ConditionError::Parse {
                        position: start,
                        message: format!("invalid number '{text}'"),
                    })?
            };
            tokens.push((start, Token::Number(number)));
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' || c == '$' {
            let start = i;
            while i < bytes.len()
                && (bytes[i].is_ascii_alphanumeric() || matches!(bytes[i], b'_' | b'$' | b'.'))
            {
                i += 1;
            }
            let word = input[start..i].trim_end_matches('.');
            i = start + word.len();
            let token = match word.to_ascii_lowercase().as_str() {
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                _ => Token::Ident(word.to_string()),
            };
            tokens.push((start, token));
            continue;
        }

        let op = OPERATORS
            .iter()
            .find(|op| input[i..].starts_with(**op))
            .ok_or_else(|| ConditionError::Parse {
                position: i,
                message: format!("unexpected character '{c}'"),
            })?;
        let token = match *op {
            "&&" => Token::And,
            "||" => Token::Or,
            "!" => Token::Not,
            "=" => {
                return Err(ConditionError::Parse {
                    position: i,
                    message: "assignment is not allowed, use '=='".to_string(),
                });
            }
            other => Token::Op(other),
        };
        tokens.push((i, token));
        i += op.len();
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    len: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map(|(p, _)| *p).unwrap_or(self.len)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        token
    }

    fn error(&self, message: impl Into<String>) -> ConditionError {
        ConditionError::Parse {
            position: self.position(),
            message: message.into(),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ConditionError> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr, ConditionError> {
        let left = self.parse_sum()?;
        let op = match self.peek() {
            Some(Token::Op("==")) => BinaryOp::Eq,
            Some(Token::Op("===")) => BinaryOp::StrictEq,
            Some(Token::Op("!=")) => BinaryOp::Ne,
            Some(Token::Op("!==")) => BinaryOp::StrictNe,
            Some(Token::Op("<")) => BinaryOp::Lt,
            Some(Token::Op("<=")) => BinaryOp::Le,
            Some(Token::Op(">")) => BinaryOp::Gt,
            Some(Token::Op(">=")) => BinaryOp::Ge,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_sum()?;
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn parse_sum(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_product()?;
        loop {
            let op = match self.peek() {
                Some(Token::Op("+")) => BinaryOp::Add,
                Some(Token::Op("-")) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_product()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_product(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Op("*")) => BinaryOp::Mul,
                Some(Token::Op("/")) => BinaryOp::Div,
                Some(Token::Op("%")) => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ConditionError> {
        if self.peek() == Some(&Token::Op("-")) {
            self.advance();
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        if self.peek() == Some(&Token::Not) {
            self.advance();
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ConditionError> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Literal(Value::Number(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Ident(word)) => {
                let literal = match word.as_str() {
                    "true" | "TRUE" | "True" => Some(Value::Bool(true)),
                    "false" | "FALSE" | "False" => Some(Value::Bool(false)),
                    "null" | "NULL" | "None" | "undefined" => Some(Value::Null),
                    _ => None,
                };
                Ok(literal.map_or(Expr::Path(word), Expr::Literal))
            }
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => {
                        self.pos -= 1;
                        Err(self.error("expected ')'"))
                    }
                }
            }
            Some(other) => {
                self.pos -= 1;
                Err(self.error(format!("unexpected token {other:?}")))
            }
            None => Err(self.error("unexpected end of expression")),
        }
    }
}

/// Parse an expression into its AST.
pub fn parse(input: &str) -> Result<Expr, ConditionError> {
    if input.trim().is_empty() {
        return Err(ConditionError::Empty);
    }
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        len: input.len(),
    };
    let expr = parser.parse_or()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Evaluate an expression string, returning its value.
pub fn try_evaluate(input: &str, context: &Value) -> Result<Value, ConditionError> {
    let expr = parse(input)?;
    eval(&expr, context)
}

/// Evaluate a condition to a boolean, failing closed.
///
/// Parse and evaluation errors are logged at `warn` and produce `false`.
pub fn evaluate_condition(input: &str, context: &Value) -> bool {
    match try_evaluate(input, context) {
        Ok(value) => truthy(&value),
        Err(e) => {
            tracing::warn!(condition = input, error = %e, "condition evaluation failed, treating as false");
            false
        }
    }
}

/// JavaScript-like truthiness over JSON values.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn lookup<'a>(path: &str, context: &'a Value) -> Result<&'a Value, ConditionError> {
    let resolved = if let Some(field) = path.strip_prefix("OLD.") {
        context.get("old").and_then(|old| resolve_path(old, field))
    } else if let Some(field) = path.strip_prefix("NEW.") {
        context.get("new").and_then(|new| resolve_path(new, field))
    } else {
        resolve_path(context, path)
    };
    resolved.ok_or_else(|| ConditionError::UndefinedField(path.to_string()))
}

fn eval(expr: &Expr, context: &Value) -> Result<Value, ConditionError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Path(path) => lookup(path, context).cloned(),
        Expr::Not(inner) => Ok(Value::Bool(!truthy(&eval(inner, context)?))),
        Expr::Neg(inner) => {
            let value = eval(inner, context)?;
            let n = as_number(&value)
                .ok_or_else(|| ConditionError::Type(format!("cannot negate {value}")))?;
            number_value(-n)
        }
        Expr::And(left, right) => {
            if !truthy(&eval(left, context)?) {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(truthy(&eval(right, context)?)))
        }
        Expr::Or(left, right) => {
            if truthy(&eval(left, context)?) {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(truthy(&eval(right, context)?)))
        }
        Expr::Binary(op, left, right) => {
            let l = eval(left, context)?;
            let r = eval(right, context)?;
            apply_binary(*op, &l, &r)
        }
    }
}

fn apply_binary(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, ConditionError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(loose_eq(l, r))),
        BinaryOp::Ne => Ok(Value::Bool(!loose_eq(l, r))),
        BinaryOp::StrictEq => Ok(Value::Bool(strict_eq(l, r))),
        BinaryOp::StrictNe => Ok(Value::Bool(!strict_eq(l, r))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(l, r)?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        BinaryOp::Add => {
            if l.is_string() || r.is_string() {
                return Ok(Value::String(format!(
                    "{}{}",
                    crate::template::value_to_string(l),
                    crate::template::value_to_string(r)
                )));
            }
            arithmetic(op, l, r)
        }
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => arithmetic(op, l, r),
    }
}

fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, ConditionError> {
    let (Some(a), Some(b)) = (as_number(l), as_number(r)) else {
        return Err(ConditionError::Type(format!(
            "arithmetic on non-numeric operands {l} and {r}"
        )));
    };
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::Rem if b == 0.0 => return Err(ConditionError::DivisionByZero),
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        _ => unreachable!("non-arithmetic operator"),
    };
    number_value(result)
}

/// Numbers and numeric strings coerce; booleans count as 0/1.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Integral results are kept as integers so `calculate` output stays tidy.
fn number_value(n: f64) -> Result<Value, ConditionError> {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        return Ok(Value::Number(Number::from(n as i64)));
    }
    Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| ConditionError::Type("result is not a finite number".to_string()))
}

fn loose_eq(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            match (as_number(l), as_number(r)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        _ => strict_eq(l, r),
    }
}

fn strict_eq(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => l == r,
    }
}

fn compare(l: &Value, r: &Value) -> Result<std::cmp::Ordering, ConditionError> {
    match (l, r) {
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => match (as_number(l), as_number(r)) {
            (Some(a), Some(b)) => a
                .partial_cmp(&b)
                .ok_or_else(|| ConditionError::Type("incomparable numbers".to_string())),
            _ => Err(ConditionError::Type(format!("cannot compare {l} with {r}"))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn db_ctx() -> Value {
        json!({
            "old": {"status": "draft", "total": 100},
            "new": {"status": "paid", "total": 250, "customer": {"tier": "gold"}},
            "event": "update",
            "threshold": 200,
        })
    }

    #[test]
    fn test_old_new_comparison() {
        let ctx = db_ctx();
        assert!(evaluate_condition("OLD.status != 'paid' && NEW.status == 'paid'", &ctx));
        assert!(evaluate_condition("NEW.total > OLD.total", &ctx));
        assert!(evaluate_condition("NEW.customer.tier === \"gold\"", &ctx));
        assert!(!evaluate_condition("NEW.total < 100", &ctx));
    }

    #[test]
    fn test_context_paths_and_arithmetic() {
        let ctx = db_ctx();
        assert!(evaluate_condition("NEW.total - OLD.total >= 150", &ctx));
        assert!(evaluate_condition("NEW.total > threshold and event == 'update'", &ctx));
        assert_eq!(try_evaluate("(1 + 2) * 4 % 5", &ctx).unwrap(), json!(2));
        assert_eq!(try_evaluate("10 / 4", &ctx).unwrap(), json!(2.5));
        assert_eq!(try_evaluate("-threshold + 1", &ctx).unwrap(), json!(-199));
    }

    #[test]
    fn test_boolean_operators_and_not() {
        let ctx = db_ctx();
        assert!(evaluate_condition("not (NEW.status == 'draft')", &ctx));
        assert!(evaluate_condition("!false || false", &ctx));
        assert!(evaluate_condition("false or true and true", &ctx));
        assert!(!evaluate_condition("true && false", &ctx));
    }

    #[test]
    fn test_undefined_field_is_false_not_error() {
        let ctx = db_ctx();
        assert!(!evaluate_condition("NEW.nonexistent == 'x'", &ctx));
        assert!(!evaluate_condition("missing.deep.path", &ctx));
        assert!(matches!(
            try_evaluate("NEW.nonexistent", &ctx),
            Err(ConditionError::UndefinedField(_))
        ));
    }

    #[test]
    fn test_parse_errors_fail_closed() {
        let ctx = db_ctx();
        assert!(!evaluate_condition("NEW.total >", &ctx));
        assert!(!evaluate_condition("(true", &ctx));
        assert!(!evaluate_condition("NEW.status = 'paid'", &ctx));
        assert!(!evaluate_condition("", &ctx));
        assert!(!evaluate_condition("process.exit()", &ctx));
        assert!(matches!(parse("1 2"), Err(ConditionError::Parse { .. })));
    }

    #[test]
    fn test_division_by_zero_fails_closed() {
        assert_eq!(
            try_evaluate("1 / 0", &json!({})),
            Err(ConditionError::DivisionByZero)
        );
        assert!(!evaluate_condition("1 / 0 > 0", &json!({})));
    }

    #[test]
    fn test_loose_equality_coerces_numeric_strings() {
        let ctx = json!({"count": "5"});
        assert!(evaluate_condition("count == 5", &ctx));
        assert!(!evaluate_condition("count === 5", &ctx));
        assert!(evaluate_condition("count > 4", &ctx));
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(
            try_evaluate("'inv-' + 42", &json!({})).unwrap(),
            json!("inv-42")
        );
    }

    #[test]
    fn test_truthiness() {
        assert!(!truthy(&json!(null)));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(truthy(&json!("0")));
        assert!(truthy(&json!([])));
        assert!(truthy(&json!({})));
    }

    #[test]
    fn test_null_literal_comparison() {
        let ctx = json!({"new": {"assigned_to": null}});
        assert!(evaluate_condition("NEW.assigned_to == null", &ctx));
    }
}
