//! Expression evaluator contract (§6, §9 grammar) and a small default
//! recursive-descent interpreter.
//!
//! ```text
//! expr        := logical_or
//! logical_or  := logical_and ( "||" logical_and )*
//! logical_and := comparison ( "&&" comparison )*
//! comparison  := additive ( ("=="|"!="|"<="|">="|"<"|">") additive )?
//! additive    := multiplicative ( ("+"|"-") multiplicative )*
//! multiplicative := unary ( ("*"|"/"|"%") unary )*
//! unary       := ("!"|"-")? primary
//! primary     := INT | FLOAT | STRING | "true" | "false"
//!              | "#prefix" | path | "(" expr ")"
//! path        := IDENT ( "." IDENT )*
//! ```
//!
//! `path` resolves against the [`crate::context::EvaluatorContext`]: the
//! first segment looks up a context entry (`self`, `root`, or a
//! user-supplied name); subsequent segments index into the resulting
//! `serde_json::Value` as object fields.

use crate::context::EvaluatorContext;
use crate::value::Value;

#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum ExprError {
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),
    #[error("type error: {0}")]
    TypeError(String),
    #[error("trailing input after expression: '{0}'")]
    TrailingInput(String),
}

/// Expected result shape for a call to [`Evaluator::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprType {
    Bool,
    Int,
    Float,
    Str,
    Any,
}

/// The expression-evaluator contract (§6).
pub trait Evaluator: Send + Sync {
    fn evaluate(
        &self,
        expr: &str,
        ctx: &EvaluatorContext,
        expected: ExprType,
    ) -> Result<Value, ExprError>;

    /// Empty expression means "always true".
    fn evaluate_boolean(&self, expr: &str, ctx: &EvaluatorContext) -> Result<bool, ExprError> {
        if expr.is_empty() {
            return Ok(true);
        }
        match self.evaluate(expr, ctx, ExprType::Bool)? {
            Value::Bool(b) => Ok(b),
            other => Err(ExprError::TypeError(format!(
                "expected boolean, got {other}"
            ))),
        }
    }

    /// Empty/invalid expression yields the non-positive sentinel `-1`,
    /// interpreted by callers as "no size".
    fn evaluate_size(&self, expr: &str, ctx: &EvaluatorContext) -> i64 {
        if expr.is_empty() {
            return -1;
        }
        match self.evaluate(expr, ctx, ExprType::Int) {
            Ok(Value::Number(n)) => n.as_i64().unwrap_or(-1),
            _ => -1,
        }
    }
}

/// Default, uncached recursive-descent interpreter. Acceptable because
/// conditions/size expressions are short and this engine is not a hot
/// decode loop at the scale this crate targets.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEvaluator;

impl Evaluator for DefaultEvaluator {
    fn evaluate(
        &self,
        expr: &str,
        ctx: &EvaluatorContext,
        expected: ExprType,
    ) -> Result<Value, ExprError> {
        let mut parser = Parser::new(expr);
        let ast = parser.parse_expr()?;
        parser.expect_end()?;
        let value = eval(&ast, ctx)?;
        coerce(value, expected)
    }
}

fn coerce(value: Value, expected: ExprType) -> Result<Value, ExprError> {
    match expected {
        ExprType::Any => Ok(value),
        ExprType::Bool => match value {
            Value::Bool(_) => Ok(value),
            other => Err(ExprError::TypeError(format!("expected bool, got {other}"))),
        },
        ExprType::Int => match &value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value),
            Value::Number(n) if n.is_f64() => Ok(Value::from(n.as_f64().unwrap() as i64)),
            other => Err(ExprError::TypeError(format!(
                "expected integer, got {other}"
            ))),
        },
        ExprType::Float => match &value {
            Value::Number(n) => Ok(Value::from(n.as_f64().unwrap_or_default())),
            other => Err(ExprError::TypeError(format!(
                "expected float, got {other}"
            ))),
        },
        ExprType::Str => match value {
            Value::String(_) => Ok(value),
            other => Err(ExprError::TypeError(format!(
                "expected string, got {other}"
            ))),
        },
    }
}

// ---- AST -------------------------------------------------------------

#[derive(Debug, Clone)]
enum Ast {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Path(Vec<String>),
    Prefix,
    Unary(UnaryOp, Box<Ast>),
    Binary(BinOp, Box<Ast>, Box<Ast>),
}

#[derive(Debug, Clone, Copy)]
enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy)]
enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

fn eval(ast: &Ast, ctx: &EvaluatorContext) -> Result<Value, ExprError> {
    match ast {
        Ast::Int(i) => Ok(Value::from(*i)),
        Ast::Float(f) => Ok(Value::from(*f)),
        Ast::Str(s) => Ok(Value::from(s.clone())),
        Ast::Bool(b) => Ok(Value::from(*b)),
        Ast::Prefix => ctx
            .get(crate::context::PREFIX)
            .cloned()
            .ok_or_else(|| ExprError::UnknownIdentifier("#prefix".into())),
        Ast::Path(segments) => resolve_path(ctx, segments),
        Ast::Unary(op, inner) => {
            let v = eval(inner, ctx)?;
            match op {
                UnaryOp::Not => Ok(Value::from(!as_bool(&v)?)),
                UnaryOp::Neg => Ok(Value::from(-as_f64(&v)?)),
            }
        }
        Ast::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, ctx),
    }
}

fn resolve_path(ctx: &EvaluatorContext, segments: &[String]) -> Result<Value, ExprError> {
    let (head, rest) = segments
        .split_first()
        .ok_or_else(|| ExprError::UnexpectedToken("empty path".into()))?;
    let mut current = ctx
        .get(head)
        .cloned()
        .ok_or_else(|| ExprError::UnknownIdentifier(head.clone()))?;
    for segment in rest {
        current = current
            .get(segment)
            .cloned()
            .ok_or_else(|| ExprError::UnknownIdentifier(segments.join(".")))?;
    }
    Ok(current)
}

fn eval_binary(op: BinOp, lhs: &Ast, rhs: &Ast, ctx: &EvaluatorContext) -> Result<Value, ExprError> {
    match op {
        BinOp::Or => {
            let l = as_bool(&eval(lhs, ctx)?)?;
            if l {
                return Ok(Value::from(true));
            }
            Ok(Value::from(as_bool(&eval(rhs, ctx)?)?))
        }
        BinOp::And => {
            let l = as_bool(&eval(lhs, ctx)?)?;
            if !l {
                return Ok(Value::from(false));
            }
            Ok(Value::from(as_bool(&eval(rhs, ctx)?)?))
        }
        BinOp::Eq | BinOp::Ne => {
            let l = eval(lhs, ctx)?;
            let r = eval(rhs, ctx)?;
            let eq = values_equal(&l, &r);
            Ok(Value::from(if matches!(op, BinOp::Eq) { eq } else { !eq }))
        }
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let l = as_f64(&eval(lhs, ctx)?)?;
            let r = as_f64(&eval(rhs, ctx)?)?;
            let result = match op {
                BinOp::Lt => l < r,
                BinOp::Le => l <= r,
                BinOp::Gt => l > r,
                BinOp::Ge => l >= r,
                _ => unreachable!(),
            };
            Ok(Value::from(result))
        }
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => {
            let l = eval(lhs, ctx)?;
            let r = eval(rhs, ctx)?;
            arithmetic(op, &l, &r)
        }
    }
}

fn arithmetic(op: BinOp, l: &Value, r: &Value) -> Result<Value, ExprError> {
    if let (Value::String(a), Value::String(b)) = (l, r) {
        if matches!(op, BinOp::Add) {
            return Ok(Value::from(format!("{a}{b}")));
        }
    }
    let lf = as_f64(l)?;
    let rf = as_f64(r)?;
    let result = match op {
        BinOp::Add => lf + rf,
        BinOp::Sub => lf - rf,
        BinOp::Mul => lf * rf,
        BinOp::Div => lf / rf,
        BinOp::Rem => lf % rf,
        _ => unreachable!(),
    };
    if is_int(l) && is_int(r) && matches!(op, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Rem) {
        Ok(Value::from(result as i64))
    } else {
        Ok(Value::from(result))
    }
}

fn is_int(v: &Value) -> bool {
    matches!(v, Value::Number(n) if n.is_i64() || n.is_u64())
}

fn as_bool(v: &Value) -> Result<bool, ExprError> {
    v.as_bool()
        .ok_or_else(|| ExprError::TypeError(format!("expected bool, got {v}")))
}

fn as_f64(v: &Value) -> Result<f64, ExprError> {
    v.as_f64()
        .ok_or_else(|| ExprError::TypeError(format!("expected number, got {v}")))
}

fn values_equal(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x == y;
    }
    a == b
}

// ---- Parser ------------------------------------------------------------

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Parser { input, pos: 0 }
    }

    fn expect_end(&mut self) -> Result<(), ExprError> {
        self.skip_ws();
        if self.pos != self.input.len() {
            return Err(ExprError::TrailingInput(self.input[self.pos..].to_string()));
        }
        Ok(())
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.rest().chars().next() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    fn peek_op(&mut self, ops: &[&'static str]) -> Option<&'static str> {
        self.skip_ws();
        for op in ops {
            if self.rest().starts_with(op) {
                return Some(op);
            }
        }
        None
    }

    fn consume(&mut self, n: usize) {
        self.pos += n;
    }

    fn parse_expr(&mut self) -> Result<Ast, ExprError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Ast, ExprError> {
        let mut lhs = self.parse_and()?;
        loop {
            if self.peek_op(&["||"]).is_some() {
                self.consume(2);
                let rhs = self.parse_and()?;
                lhs = Ast::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Ast, ExprError> {
        let mut lhs = self.parse_comparison()?;
        loop {
            if self.peek_op(&["&&"]).is_some() {
                self.consume(2);
                let rhs = self.parse_comparison()?;
                lhs = Ast::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Ast, ExprError> {
        let lhs = self.parse_additive()?;
        // Longer operators must be tried before their prefixes.
        if let Some(op) = self.peek_op(&["==", "!=", "<=", ">=", "<", ">"]) {
            self.consume(op.len());
            let rhs = self.parse_additive()?;
            let bin_op = match op {
                "==" => BinOp::Eq,
                "!=" => BinOp::Ne,
                "<=" => BinOp::Le,
                ">=" => BinOp::Ge,
                "<" => BinOp::Lt,
                ">" => BinOp::Gt,
                _ => unreachable!(),
            };
            return Ok(Ast::Binary(bin_op, Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Ast, ExprError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            if let Some(op) = self.peek_op(&["+", "-"]) {
                self.consume(1);
                let rhs = self.parse_multiplicative()?;
                let bin_op = if op == "+" { BinOp::Add } else { BinOp::Sub };
                lhs = Ast::Binary(bin_op, Box::new(lhs), Box::new(rhs));
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Ast, ExprError> {
        let mut lhs = self.parse_unary()?;
        loop {
            if let Some(op) = self.peek_op(&["*", "/", "%"]) {
                self.consume(1);
                let rhs = self.parse_unary()?;
                let bin_op = match op {
                    "*" => BinOp::Mul,
                    "/" => BinOp::Div,
                    _ => BinOp::Rem,
                };
                lhs = Ast::Binary(bin_op, Box::new(lhs), Box::new(rhs));
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Ast, ExprError> {
        self.skip_ws();
        if self.rest().starts_with('!') {
            self.consume(1);
            return Ok(Ast::Unary(UnaryOp::Not, Box::new(self.parse_unary()?)));
        }
        if self.rest().starts_with('-') {
            self.consume(1);
            return Ok(Ast::Unary(UnaryOp::Neg, Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Ast, ExprError> {
        self.skip_ws();
        let rest = self.rest();
        if rest.is_empty() {
            return Err(ExprError::UnexpectedEnd);
        }
        if rest.starts_with('(') {
            self.consume(1);
            let inner = self.parse_expr()?;
            self.skip_ws();
            if !self.rest().starts_with(')') {
                return Err(ExprError::UnexpectedToken(self.rest().to_string()));
            }
            self.consume(1);
            return Ok(inner);
        }
        if rest.starts_with('"') {
            return self.parse_string();
        }
        if rest.starts_with("#prefix") {
            self.consume("#prefix".len());
            return Ok(Ast::Prefix);
        }
        if rest.starts_with("true") && !is_ident_continuation(rest.as_bytes().get(4).copied()) {
            self.consume(4);
            return Ok(Ast::Bool(true));
        }
        if rest.starts_with("false") && !is_ident_continuation(rest.as_bytes().get(5).copied()) {
            self.consume(5);
            return Ok(Ast::Bool(false));
        }
        if rest.starts_with(|c: char| c.is_ascii_digit()) {
            return self.parse_number();
        }
        if rest.starts_with(|c: char| c.is_alphabetic() || c == '_') {
            return self.parse_path();
        }
        Err(ExprError::UnexpectedToken(rest.to_string()))
    }

    fn parse_string(&mut self) -> Result<Ast, ExprError> {
        self.consume(1);
        let start = self.pos;
        loop {
            match self.rest().chars().next() {
                None => return Err(ExprError::UnexpectedEnd),
                Some('"') => {
                    let s = self.input[start..self.pos].to_string();
                    self.consume(1);
                    return Ok(Ast::Str(s));
                }
                Some(c) => self.consume(c.len_utf8()),
            }
        }
    }

    fn parse_number(&mut self) -> Result<Ast, ExprError> {
        let start = self.pos;
        let mut is_float = false;
        while let Some(c) = self.rest().chars().next() {
            if c.is_ascii_digit() {
                self.consume(1);
            } else if c == '.' && !is_float {
                is_float = true;
                self.consume(1);
            } else {
                break;
            }
        }
        let text = &self.input[start..self.pos];
        if is_float {
            text.parse::<f64>()
                .map(Ast::Float)
                .map_err(|_| ExprError::UnexpectedToken(text.to_string()))
        } else {
            text.parse::<i64>()
                .map(Ast::Int)
                .map_err(|_| ExprError::UnexpectedToken(text.to_string()))
        }
    }

    fn parse_path(&mut self) -> Result<Ast, ExprError> {
        let mut segments = vec![self.parse_ident()?];
        loop {
            if self.rest().starts_with('.') {
                self.consume(1);
                segments.push(self.parse_ident()?);
            } else {
                break;
            }
        }
        Ok(Ast::Path(segments))
    }

    fn parse_ident(&mut self) -> Result<String, ExprError> {
        let start = self.pos;
        while let Some(c) = self.rest().chars().next() {
            if c.is_alphanumeric() || c == '_' {
                self.consume(c.len_utf8());
            } else {
                break;
            }
        }
        if start == self.pos {
            return Err(ExprError::UnexpectedToken(self.rest().to_string()));
        }
        Ok(self.input[start..self.pos].to_string())
    }
}

fn is_ident_continuation(b: Option<u8>) -> bool {
    matches!(b, Some(c) if (c as char).is_alphanumeric() || c == b'_')
}

/// Structural check used by variant encoding (§4.5 step 5): "if the
/// alternative's condition textually references `#prefix`". Implemented as
/// a literal substring search rather than an AST walk, matching the
/// source's own textual check.
pub fn references_prefix(condition: &str) -> bool {
    condition.contains("#prefix")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EvaluatorContext;

    fn ctx_with(entries: &[(&str, Value)]) -> EvaluatorContext {
        let mut ctx = EvaluatorContext::new();
        for (k, v) in entries {
            ctx.put(*k, v.clone());
        }
        ctx
    }

    #[test]
    fn empty_condition_is_true() {
        let ev = DefaultEvaluator;
        let ctx = EvaluatorContext::new();
        assert!(ev.evaluate_boolean("", &ctx).unwrap());
    }

    #[test]
    fn prefix_equality() {
        let ev = DefaultEvaluator;
        let mut ctx = EvaluatorContext::new();
        ctx.set_prefix(2);
        assert!(ev.evaluate_boolean("#prefix==2", &ctx).unwrap());
        assert!(!ev.evaluate_boolean("#prefix==1", &ctx).unwrap());
    }

    #[test]
    fn path_field_access() {
        let ev = DefaultEvaluator;
        let ctx = ctx_with(&[("self", serde_json::json!({"n": 3}))]);
        assert_eq!(ev.evaluate_size("self.n", &ctx), 3);
    }

    #[test]
    fn arithmetic_and_evaluated_field() {
        let ev = DefaultEvaluator;
        let ctx = ctx_with(&[("self", serde_json::json!({"count": 10}))]);
        let v = ev
            .evaluate("self.count * 2", &ctx, ExprType::Int)
            .unwrap();
        assert_eq!(v, Value::from(20i64));
    }

    #[test]
    fn size_sentinel_on_empty() {
        let ev = DefaultEvaluator;
        let ctx = EvaluatorContext::new();
        assert_eq!(ev.evaluate_size("", &ctx), -1);
    }

    #[test]
    fn references_prefix_detection() {
        assert!(references_prefix("#prefix == 1"));
        assert!(!references_prefix("self.flag"));
    }
}
