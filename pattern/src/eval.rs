//! Expression evaluation under bindings.
//!
//! Three-valued logic with `null`: arithmetic is null-propagating,
//! `and`/`or` short-circuit with SQL semantics, `null = null` is true,
//! `null = x` is false, and ordered comparisons against `null` are false.
//! Integer division truncates toward zero and fails on a zero divisor;
//! float division follows IEEE and yields infinity or NaN instead.

use crate::{Bindings, CompiledPattern, Matcher, PatternError, PatternResult};
use indexmap::IndexMap;
use mew_core::{system_clock, Clock, EdgeId, NodeId, Value};
use mew_graph::GraphRead;
use mew_parser::{BinaryOp, Expr, LiteralKind, PatternElem, UnaryOp};
use mew_registry::Registry;

/// Expression evaluator. Stateless over the graph: each call takes the
/// view to read through, so it works against committed snapshots and
/// transaction overlays alike.
#[derive(Clone)]
pub struct Evaluator<'r> {
    registry: &'r Registry,
    clock: Clock,
    params: IndexMap<String, Value>,
}

impl<'r> Evaluator<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            clock: system_clock(),
            params: IndexMap::new(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_params(mut self, params: IndexMap<String, Value>) -> Self {
        self.params = params;
        self
    }

    pub fn eval(
        &self,
        expr: &Expr,
        bindings: &Bindings,
        graph: &dyn GraphRead,
    ) -> PatternResult<Value> {
        match expr {
            Expr::Literal(lit) => Ok(eval_literal(&lit.kind)),
            Expr::Var(name, _) => bindings
                .get(name)
                .map(|b| b.to_value())
                .ok_or_else(|| PatternError::unbound_variable(name)),
            Expr::AttrAccess(base, attr, _) => self.eval_attr_access(base, attr, bindings, graph),
            Expr::BinaryOp(op, left, right, _) => {
                self.eval_binary_op(*op, left, right, bindings, graph)
            }
            Expr::UnaryOp(op, operand, _) => {
                let value = self.eval(operand, bindings, graph)?;
                eval_unary(*op, value)
            }
            Expr::FnCall(fc) => self.eval_fn_call(&fc.name, &fc.args, bindings, graph),
            Expr::IdRef(id, _) => self.eval_id_ref(id, graph),
            Expr::Param(name, _) => self
                .params
                .get(name)
                .cloned()
                .ok_or_else(|| PatternError::UnknownParameter { name: name.clone() }),
            Expr::Exists(elements, where_clause, _) => {
                let found =
                    self.eval_exists(elements, where_clause.as_deref(), bindings, graph)?;
                Ok(Value::Bool(found))
            }
            Expr::NotExists(elements, where_clause, _) => {
                let found =
                    self.eval_exists(elements, where_clause.as_deref(), bindings, graph)?;
                Ok(Value::Bool(!found))
            }
            Expr::List(elements, _) => {
                let values: PatternResult<Vec<Value>> = elements
                    .iter()
                    .map(|e| self.eval(e, bindings, graph))
                    .collect();
                Ok(Value::List(values?))
            }
        }
    }

    /// Evaluate to a boolean for filtering; null filters out.
    pub fn eval_bool(
        &self,
        expr: &Expr,
        bindings: &Bindings,
        graph: &dyn GraphRead,
    ) -> PatternResult<bool> {
        match self.eval(expr, bindings, graph)? {
            Value::Bool(b) => Ok(b),
            Value::Null => Ok(false),
            other => Err(PatternError::type_error(format!(
                "expected Bool in condition, got {}",
                other.type_name()
            ))),
        }
    }

    fn eval_id_ref(&self, id: &str, graph: &dyn GraphRead) -> PatternResult<Value> {
        let raw: u64 = id
            .parse()
            .map_err(|_| PatternError::InvalidIdRef { id: id.to_string() })?;
        if graph.node(NodeId::new(raw)).is_some() {
            return Ok(Value::NodeRef(NodeId::new(raw)));
        }
        if graph.edge(EdgeId::new(raw)).is_some() {
            return Ok(Value::EdgeRef(EdgeId::new(raw)));
        }
        // Unresolvable ids surface as node refs so existence checks can
        // answer not-found instead of erroring mid-expression.
        Ok(Value::NodeRef(NodeId::new(raw)))
    }

    fn eval_exists(
        &self,
        elements: &[PatternElem],
        where_clause: Option<&Expr>,
        bindings: &Bindings,
        graph: &dyn GraphRead,
    ) -> PatternResult<bool> {
        let prebound: Vec<String> = bindings.names().map(|s| s.to_string()).collect();
        let mut pattern =
            CompiledPattern::compile_with_prebound(elements, self.registry, &prebound)?;
        if let Some(cond) = where_clause {
            pattern = pattern.with_filter(cond.clone());
        }

        let matcher = Matcher::with_evaluator(self.registry, graph, self.clone());
        matcher.exists(&pattern, bindings.clone())
    }

    fn eval_attr_access(
        &self,
        base: &Expr,
        attr: &str,
        bindings: &Bindings,
        graph: &dyn GraphRead,
    ) -> PatternResult<Value> {
        let base_val = self.eval(base, bindings, graph)?;
        match base_val {
            Value::NodeRef(node_id) => Ok(graph.node_attr(node_id, attr).unwrap_or(Value::Null)),
            Value::EdgeRef(edge_id) => Ok(graph.edge_attr(edge_id, attr).unwrap_or(Value::Null)),
            Value::Null => Ok(Value::Null),
            other => Err(PatternError::type_error(format!(
                "cannot access attribute '{}' on {}",
                attr,
                other.type_name()
            ))),
        }
    }

    fn eval_binary_op(
        &self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        bindings: &Bindings,
        graph: &dyn GraphRead,
    ) -> PatternResult<Value> {
        // AND/OR short-circuit before the right side is touched.
        match op {
            BinaryOp::And => {
                let lhs = self.eval(left, bindings, graph)?;
                if lhs == Value::Bool(false) {
                    return Ok(Value::Bool(false));
                }
                let rhs = self.eval(right, bindings, graph)?;
                return eval_and(&lhs, &rhs);
            }
            BinaryOp::Or => {
                let lhs = self.eval(left, bindings, graph)?;
                if lhs == Value::Bool(true) {
                    return Ok(Value::Bool(true));
                }
                let rhs = self.eval(right, bindings, graph)?;
                return eval_or(&lhs, &rhs);
            }
            BinaryOp::NullCoalesce => {
                let lhs = self.eval(left, bindings, graph)?;
                if !lhs.is_null() {
                    return Ok(lhs);
                }
                return self.eval(right, bindings, graph);
            }
            _ => {}
        }

        let lhs = self.eval(left, bindings, graph)?;
        let rhs = self.eval(right, bindings, graph)?;

        match op {
            BinaryOp::Add => eval_add(&lhs, &rhs),
            BinaryOp::Sub => eval_sub(&lhs, &rhs),
            BinaryOp::Mul => eval_mul(&lhs, &rhs),
            BinaryOp::Div => eval_div(&lhs, &rhs),
            BinaryOp::Mod => eval_mod(&lhs, &rhs),
            BinaryOp::Eq => Ok(Value::Bool(values_equal(&lhs, &rhs))),
            BinaryOp::NotEq => Ok(Value::Bool(!values_equal(&lhs, &rhs))),
            BinaryOp::Lt => eval_cmp(&lhs, &rhs, |o| o == std::cmp::Ordering::Less),
            BinaryOp::LtEq => eval_cmp(&lhs, &rhs, |o| o != std::cmp::Ordering::Greater),
            BinaryOp::Gt => eval_cmp(&lhs, &rhs, |o| o == std::cmp::Ordering::Greater),
            BinaryOp::GtEq => eval_cmp(&lhs, &rhs, |o| o != std::cmp::Ordering::Less),
            BinaryOp::Concat => eval_concat(&lhs, &rhs),
            BinaryOp::And | BinaryOp::Or | BinaryOp::NullCoalesce => unreachable!(),
        }
    }

    fn eval_fn_call(
        &self,
        name: &str,
        args: &[Expr],
        bindings: &Bindings,
        graph: &dyn GraphRead,
    ) -> PatternResult<Value> {
        let lower = name.to_lowercase();
        let arg = |i: usize| -> PatternResult<Value> {
            args.get(i)
                .map(|a| self.eval(a, bindings, graph))
                .transpose()?
                .ok_or_else(|| {
                    PatternError::invalid_operation(format!("{} expects more arguments", name))
                })
        };

        match lower.as_str() {
            "now" => Ok(Value::Timestamp(self.clock.now_ms())),
            "wall_time" => Ok(Value::Timestamp(self.clock.now_ms())),
            "coalesce" => {
                for a in args {
                    let v = self.eval(a, bindings, graph)?;
                    if !v.is_null() {
                        return Ok(v);
                    }
                }
                Ok(Value::Null)
            }
            "is_null" => Ok(Value::Bool(arg(0)?.is_null())),
            "is_not_null" => Ok(Value::Bool(!arg(0)?.is_null())),
            "abs" => match arg(0)? {
                Value::Int(i) => Ok(Value::Int(i.abs())),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                Value::Null => Ok(Value::Null),
                _ => Err(PatternError::type_error("abs expects a numeric argument")),
            },
            "floor" => match arg(0)? {
                Value::Int(i) => Ok(Value::Int(i)),
                Value::Float(f) => Ok(Value::Float(f.floor())),
                Value::Null => Ok(Value::Null),
                _ => Err(PatternError::type_error("floor expects a numeric argument")),
            },
            "ceil" | "ceiling" => match arg(0)? {
                Value::Int(i) => Ok(Value::Int(i)),
                Value::Float(f) => Ok(Value::Float(f.ceil())),
                Value::Null => Ok(Value::Null),
                _ => Err(PatternError::type_error("ceil expects a numeric argument")),
            },
            "round" => match arg(0)? {
                Value::Int(i) => Ok(Value::Int(i)),
                Value::Float(f) => Ok(Value::Float(f.round())),
                Value::Null => Ok(Value::Null),
                _ => Err(PatternError::type_error("round expects a numeric argument")),
            },
            "length" | "len" => match arg(0)? {
                Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
                Value::List(items) => Ok(Value::Int(items.len() as i64)),
                Value::Null => Ok(Value::Null),
                _ => Err(PatternError::type_error("length expects a string or list")),
            },
            "upper" => match arg(0)? {
                Value::String(s) => Ok(Value::String(s.to_uppercase())),
                Value::Null => Ok(Value::Null),
                _ => Err(PatternError::type_error("upper expects a string argument")),
            },
            "lower" => match arg(0)? {
                Value::String(s) => Ok(Value::String(s.to_lowercase())),
                Value::Null => Ok(Value::Null),
                _ => Err(PatternError::type_error("lower expects a string argument")),
            },
            "trim" => match arg(0)? {
                Value::String(s) => Ok(Value::String(s.trim().to_string())),
                Value::Null => Ok(Value::Null),
                _ => Err(PatternError::type_error("trim expects a string argument")),
            },
            "substring" | "substr" => {
                let (s, start) = (arg(0)?, arg(1)?);
                if let (Value::String(s), Value::Int(start)) = (s, start) {
                    let skip = start.max(0) as usize;
                    let result: String = if args.len() >= 3 {
                        match arg(2)? {
                            Value::Int(len) => {
                                s.chars().skip(skip).take(len.max(0) as usize).collect()
                            }
                            _ => s.chars().skip(skip).collect(),
                        }
                    } else {
                        s.chars().skip(skip).collect()
                    };
                    return Ok(Value::String(result));
                }
                Err(PatternError::type_error(
                    "substring expects (string, start[, length])",
                ))
            }
            "starts_with" => string_pair(arg(0)?, arg(1)?, |s, p| s.starts_with(p)),
            "ends_with" => string_pair(arg(0)?, arg(1)?, |s, p| s.ends_with(p)),
            "contains" => string_pair(arg(0)?, arg(1)?, |s, p| s.contains(p)),
            "replace" => {
                if let (Value::String(s), Value::String(from), Value::String(to)) =
                    (arg(0)?, arg(1)?, arg(2)?)
                {
                    return Ok(Value::String(s.replace(&from, &to)));
                }
                Err(PatternError::type_error("replace expects (string, from, to)"))
            }
            "in" => {
                let needle = arg(0)?;
                match arg(1)? {
                    Value::List(items) => {
                        Ok(Value::Bool(items.iter().any(|v| values_equal(v, &needle))))
                    }
                    _ => Err(PatternError::type_error("in expects (value, list)")),
                }
            }
            "min" if args.len() == 2 => numeric_pick(arg(0)?, arg(1)?, |a, b| a < b),
            "max" if args.len() == 2 => numeric_pick(arg(0)?, arg(1)?, |a, b| a > b),
            "year" => timestamp_part(arg(0)?, |ms| date_of(ms).0 as i64),
            "month" => timestamp_part(arg(0)?, |ms| date_of(ms).1 as i64),
            "day" => timestamp_part(arg(0)?, |ms| date_of(ms).2 as i64),
            "hour" => timestamp_part(arg(0)?, |ms| time_of(ms).0 as i64),
            "minute" => timestamp_part(arg(0)?, |ms| time_of(ms).1 as i64),
            "second" => timestamp_part(arg(0)?, |ms| time_of(ms).2 as i64),
            "_instance_of" => {
                let entity = arg(0)?;
                let type_name = arg(1)?;
                let Value::String(type_name) = type_name else {
                    return Err(PatternError::type_error("_instance_of expects a type name"));
                };
                let Some(expected) = self.registry.get_type_id(&type_name) else {
                    return Err(PatternError::unknown_type(type_name));
                };
                match entity {
                    Value::NodeRef(id) => Ok(Value::Bool(
                        graph
                            .node(id)
                            .map(|n| self.registry.is_subtype(n.type_id, expected))
                            .unwrap_or(false),
                    )),
                    _ => Ok(Value::Bool(false)),
                }
            }
            "count" | "sum" | "avg" | "min" | "max" | "collect" => {
                Err(PatternError::invalid_operation(format!(
                    "aggregate '{}' is not allowed in this context",
                    name
                )))
            }
            _ => Err(PatternError::invalid_operation(format!(
                "unknown function '{}'",
                name
            ))),
        }
    }
}

fn eval_literal(kind: &LiteralKind) -> Value {
    match kind {
        LiteralKind::Null => Value::Null,
        LiteralKind::Bool(b) => Value::Bool(*b),
        LiteralKind::Int(i) => Value::Int(*i),
        LiteralKind::Float(f) => Value::Float(*f),
        LiteralKind::String(s) => Value::String(s.clone()),
        LiteralKind::Duration(ms) => Value::Duration(*ms),
        LiteralKind::Timestamp(ms) => Value::Timestamp(*ms),
    }
}

fn eval_unary(op: UnaryOp, value: Value) -> PatternResult<Value> {
    match op {
        UnaryOp::Neg => match value {
            Value::Int(i) => Ok(Value::Int(-i)),
            Value::Float(f) => Ok(Value::Float(-f)),
            Value::Null => Ok(Value::Null),
            other => Err(PatternError::type_error(format!(
                "cannot negate {}",
                other.type_name()
            ))),
        },
        UnaryOp::Not => match value {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            Value::Null => Ok(Value::Null),
            other => Err(PatternError::type_error(format!(
                "cannot apply NOT to {}",
                other.type_name()
            ))),
        },
    }
}

/// `null = null` is true; `null = x` is false; numeric comparison coerces.
pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Int(a), Value::Float(b)) => (*a as f64) == *b,
        (Value::Float(a), Value::Int(b)) => *a == (*b as f64),
        _ => left == right,
    }
}

fn eval_cmp(
    left: &Value,
    right: &Value,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> PatternResult<Value> {
    use std::cmp::Ordering;
    // Ordered comparison against null is false, not null.
    if left.is_null() || right.is_null() {
        return Ok(Value::Bool(false));
    }
    let ordering = match (left, right) {
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Float(a), Value::Float(b)) => {
            a.partial_cmp(b).unwrap_or(Ordering::Equal)
        }
        (Value::Int(a), Value::Float(b)) => (*a as f64)
            .partial_cmp(b)
            .unwrap_or(Ordering::Equal),
        (Value::Float(a), Value::Int(b)) => a
            .partial_cmp(&(*b as f64))
            .unwrap_or(Ordering::Equal),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
        (Value::Duration(a), Value::Duration(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        _ => {
            return Err(PatternError::type_error(format!(
                "cannot compare {} with {}",
                left.type_name(),
                right.type_name()
            )))
        }
    };
    Ok(Value::Bool(accept(ordering)))
}

fn eval_add(left: &Value, right: &Value) -> PatternResult<Value> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(*b))),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 + b)),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a + *b as f64)),
        (Value::Timestamp(ts), Value::Duration(d)) => Ok(Value::Timestamp(ts + d)),
        (Value::Duration(d), Value::Timestamp(ts)) => Ok(Value::Timestamp(ts + d)),
        (Value::Duration(a), Value::Duration(b)) => Ok(Value::Duration(a + b)),
        _ => Err(PatternError::type_error(format!(
            "cannot add {} and {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn eval_sub(left: &Value, right: &Value) -> PatternResult<Value> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_sub(*b))),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a - b)),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 - b)),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a - *b as f64)),
        (Value::Timestamp(ts), Value::Duration(d)) => Ok(Value::Timestamp(ts - d)),
        (Value::Timestamp(a), Value::Timestamp(b)) => Ok(Value::Duration(a - b)),
        (Value::Duration(a), Value::Duration(b)) => Ok(Value::Duration(a - b)),
        _ => Err(PatternError::type_error(format!(
            "cannot subtract {} from {}",
            right.type_name(),
            left.type_name()
        ))),
    }
}

fn eval_mul(left: &Value, right: &Value) -> PatternResult<Value> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_mul(*b))),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a * b)),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 * b)),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a * *b as f64)),
        _ => Err(PatternError::type_error(format!(
            "cannot multiply {} and {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn eval_div(left: &Value, right: &Value) -> PatternResult<Value> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        // Integer division truncates toward zero; zero divisor errors.
        (Value::Int(a), Value::Int(b)) => {
            if *b == 0 {
                Err(PatternError::arithmetic("integer division by zero"))
            } else {
                Ok(Value::Int(a / b))
            }
        }
        // Float division follows IEEE: infinity and NaN instead of errors.
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a / b)),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 / b)),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a / *b as f64)),
        _ => Err(PatternError::type_error(format!(
            "cannot divide {} by {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn eval_mod(left: &Value, right: &Value) -> PatternResult<Value> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Int(a), Value::Int(b)) => {
            if *b == 0 {
                Err(PatternError::arithmetic("integer modulo by zero"))
            } else {
                Ok(Value::Int(a % b))
            }
        }
        _ => Err(PatternError::type_error(format!(
            "cannot take {} modulo {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn eval_and(left: &Value, right: &Value) -> PatternResult<Value> {
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a && *b)),
        (Value::Null, Value::Bool(false)) | (Value::Bool(false), Value::Null) => {
            Ok(Value::Bool(false))
        }
        (Value::Null, Value::Bool(true)) | (Value::Bool(true), Value::Null) => Ok(Value::Null),
        (Value::Null, Value::Null) => Ok(Value::Null),
        _ => Err(PatternError::type_error(format!(
            "cannot AND {} and {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn eval_or(left: &Value, right: &Value) -> PatternResult<Value> {
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a || *b)),
        (Value::Null, Value::Bool(true)) | (Value::Bool(true), Value::Null) => {
            Ok(Value::Bool(true))
        }
        (Value::Null, Value::Bool(false)) | (Value::Bool(false), Value::Null) => Ok(Value::Null),
        (Value::Null, Value::Null) => Ok(Value::Null),
        _ => Err(PatternError::type_error(format!(
            "cannot OR {} and {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn eval_concat(left: &Value, right: &Value) -> PatternResult<Value> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
        _ => Err(PatternError::type_error(format!(
            "cannot concatenate {} and {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn string_pair(a: Value, b: Value, test: impl Fn(&str, &str) -> bool) -> PatternResult<Value> {
    match (a, b) {
        (Value::String(s), Value::String(p)) => Ok(Value::Bool(test(&s, &p))),
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        _ => Err(PatternError::type_error("expected string arguments")),
    }
}

fn numeric_pick(a: Value, b: Value, prefer_left: impl Fn(f64, f64) -> bool) -> PatternResult<Value> {
    match (&a, &b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(if prefer_left(*x as f64, *y as f64) {
            *x
        } else {
            *y
        })),
        (Value::Float(x), Value::Float(y)) => {
            Ok(Value::Float(if prefer_left(*x, *y) { *x } else { *y }))
        }
        (Value::Int(x), Value::Float(y)) => {
            let xf = *x as f64;
            Ok(Value::Float(if prefer_left(xf, *y) { xf } else { *y }))
        }
        (Value::Float(x), Value::Int(y)) => {
            let yf = *y as f64;
            Ok(Value::Float(if prefer_left(*x, yf) { *x } else { yf }))
        }
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        _ => Err(PatternError::type_error("min/max expect numeric arguments")),
    }
}

fn timestamp_part(value: Value, extract: impl Fn(i64) -> i64) -> PatternResult<Value> {
    match value {
        Value::Timestamp(ms) => Ok(Value::Int(extract(ms))),
        Value::Null => Ok(Value::Null),
        _ => Err(PatternError::type_error("expected a timestamp argument")),
    }
}

/// Civil date from days since the Unix epoch
/// (Howard Hinnant's algorithm).
fn date_of(ms: i64) -> (i32, u32, u32) {
    let days = (ms.div_euclid(86_400_000)) as i32;
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u32;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe as i32 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}

fn time_of(ms: i64) -> (u32, u32, u32) {
    let ms_in_day = ms.rem_euclid(86_400_000) as u64;
    let total_seconds = ms_in_day / 1_000;
    (
        (total_seconds / 3_600) as u32,
        ((total_seconds % 3_600) / 60) as u32,
        (total_seconds % 60) as u32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Binding;
    use mew_core::{attrs, fixed_clock, Node, TypeId};
    use mew_graph::Graph;
    use mew_parser::{Literal, Span};
    use mew_registry::RegistryBuilder;

    fn empty_registry() -> Registry {
        RegistryBuilder::new().build().unwrap()
    }

    fn int(v: i64) -> Expr {
        Expr::Literal(Literal {
            kind: LiteralKind::Int(v),
            span: Span::default(),
        })
    }

    fn null() -> Expr {
        Expr::Literal(Literal {
            kind: LiteralKind::Null,
            span: Span::default(),
        })
    }

    fn bin(op: BinaryOp, l: Expr, r: Expr) -> Expr {
        Expr::BinaryOp(op, Box::new(l), Box::new(r), Span::default())
    }

    #[test]
    fn test_arithmetic_precedence_result() {
        let registry = empty_registry();
        let graph = Graph::new();
        let eval = Evaluator::new(&registry);

        let expr = bin(BinaryOp::Add, int(10), bin(BinaryOp::Mul, int(3), int(2)));
        assert_eq!(
            eval.eval(&expr, &Bindings::new(), &graph).unwrap(),
            Value::Int(16)
        );
    }

    #[test]
    fn test_null_equality_rules() {
        let registry = empty_registry();
        let graph = Graph::new();
        let eval = Evaluator::new(&registry);
        let b = Bindings::new();

        assert_eq!(
            eval.eval(&bin(BinaryOp::Eq, null(), null()), &b, &graph).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            eval.eval(&bin(BinaryOp::Eq, null(), int(1)), &b, &graph).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            eval.eval(&bin(BinaryOp::Lt, null(), int(1)), &b, &graph).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_null_propagates_through_arithmetic() {
        let registry = empty_registry();
        let graph = Graph::new();
        let eval = Evaluator::new(&registry);
        let b = Bindings::new();

        assert_eq!(
            eval.eval(&bin(BinaryOp::Add, null(), int(1)), &b, &graph).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_three_valued_and_or() {
        let registry = empty_registry();
        let graph = Graph::new();
        let eval = Evaluator::new(&registry);
        let b = Bindings::new();
        let t = Expr::Literal(Literal {
            kind: LiteralKind::Bool(true),
            span: Span::default(),
        });
        let f = Expr::Literal(Literal {
            kind: LiteralKind::Bool(false),
            span: Span::default(),
        });

        assert_eq!(
            eval.eval(&bin(BinaryOp::And, f.clone(), null()), &b, &graph).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            eval.eval(&bin(BinaryOp::And, null(), t.clone()), &b, &graph).unwrap(),
            Value::Null
        );
        assert_eq!(
            eval.eval(&bin(BinaryOp::Or, t, null()), &b, &graph).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            eval.eval(&bin(BinaryOp::Or, null(), f), &b, &graph).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_integer_division_truncates_and_errors_on_zero() {
        let registry = empty_registry();
        let graph = Graph::new();
        let eval = Evaluator::new(&registry);
        let b = Bindings::new();

        assert_eq!(
            eval.eval(&bin(BinaryOp::Div, int(-7), int(2)), &b, &graph).unwrap(),
            Value::Int(-3)
        );
        let err = eval.eval(&bin(BinaryOp::Div, int(1), int(0)), &b, &graph);
        assert!(matches!(err, Err(PatternError::ArithmeticError { .. })));
    }

    #[test]
    fn test_float_division_by_zero_is_ieee() {
        let registry = empty_registry();
        let graph = Graph::new();
        let eval = Evaluator::new(&registry);
        let b = Bindings::new();

        let expr = bin(
            BinaryOp::Div,
            Expr::Literal(Literal {
                kind: LiteralKind::Float(1.0),
                span: Span::default(),
            }),
            Expr::Literal(Literal {
                kind: LiteralKind::Float(0.0),
                span: Span::default(),
            }),
        );
        match eval.eval(&expr, &b, &graph).unwrap() {
            Value::Float(f) => assert!(f.is_infinite()),
            other => panic!("expected float infinity, got {:?}", other),
        }
    }

    #[test]
    fn test_int_float_coercion() {
        let registry = empty_registry();
        let graph = Graph::new();
        let eval = Evaluator::new(&registry);
        let b = Bindings::new();

        let expr = bin(
            BinaryOp::Add,
            int(1),
            Expr::Literal(Literal {
                kind: LiteralKind::Float(0.5),
                span: Span::default(),
            }),
        );
        assert_eq!(eval.eval(&expr, &b, &graph).unwrap(), Value::Float(1.5));
    }

    #[test]
    fn test_concat_and_coalesce() {
        let registry = empty_registry();
        let graph = Graph::new();
        let eval = Evaluator::new(&registry);
        let b = Bindings::new();

        let s = |text: &str| {
            Expr::Literal(Literal {
                kind: LiteralKind::String(text.to_string()),
                span: Span::default(),
            })
        };
        assert_eq!(
            eval.eval(&bin(BinaryOp::Concat, s("ab"), s("cd")), &b, &graph).unwrap(),
            Value::String("abcd".into())
        );

        let coalesce = Expr::FnCall(mew_parser::FnCall {
            name: "coalesce".to_string(),
            args: vec![null(), s("fallback")],
            distinct: false,
            span: Span::default(),
        });
        assert_eq!(
            eval.eval(&coalesce, &b, &graph).unwrap(),
            Value::String("fallback".into())
        );
    }

    #[test]
    fn test_now_uses_injected_clock() {
        let registry = empty_registry();
        let graph = Graph::new();
        let eval = Evaluator::new(&registry).with_clock(fixed_clock(1_705_320_000_000));

        let now = Expr::FnCall(mew_parser::FnCall {
            name: "now".to_string(),
            args: vec![],
            distinct: false,
            span: Span::default(),
        });
        assert_eq!(
            eval.eval(&now, &Bindings::new(), &graph).unwrap(),
            Value::Timestamp(1_705_320_000_000)
        );
    }

    #[test]
    fn test_params_resolve() {
        let registry = empty_registry();
        let graph = Graph::new();
        let mut params = IndexMap::new();
        params.insert("min".to_string(), Value::Int(3));
        let eval = Evaluator::new(&registry).with_params(params);

        let expr = bin(
            BinaryOp::GtEq,
            int(5),
            Expr::Param("min".to_string(), Span::default()),
        );
        assert_eq!(
            eval.eval(&expr, &Bindings::new(), &graph).unwrap(),
            Value::Bool(true)
        );

        let missing = Expr::Param("absent".to_string(), Span::default());
        assert!(matches!(
            eval.eval(&missing, &Bindings::new(), &graph),
            Err(PatternError::UnknownParameter { .. })
        ));
    }

    #[test]
    fn test_attr_access_reads_view() {
        let registry = empty_registry();
        let mut graph = Graph::new();
        graph
            .insert_node(Node::new(
                mew_core::NodeId::new(1),
                TypeId::new(1),
                attrs! { "priority" => 5 },
            ))
            .unwrap();

        let eval = Evaluator::new(&registry);
        let mut bindings = Bindings::new();
        bindings.insert("t", Binding::Node(mew_core::NodeId::new(1)));

        let expr = Expr::AttrAccess(
            Box::new(Expr::Var("t".to_string(), Span::default())),
            "priority".to_string(),
            Span::default(),
        );
        assert_eq!(eval.eval(&expr, &bindings, &graph).unwrap(), Value::Int(5));

        // Missing attribute reads as null.
        let missing = Expr::AttrAccess(
            Box::new(Expr::Var("t".to_string(), Span::default())),
            "nope".to_string(),
            Span::default(),
        );
        assert_eq!(eval.eval(&missing, &bindings, &graph).unwrap(), Value::Null);
    }

    #[test]
    fn test_timestamp_parts() {
        let registry = empty_registry();
        let graph = Graph::new();
        let eval = Evaluator::new(&registry);
        let b = Bindings::new();

        // 2024-01-15 12:00:00 UTC
        let ts = Expr::Literal(Literal {
            kind: LiteralKind::Timestamp(1_705_320_000_000),
            span: Span::default(),
        });
        let call = |name: &str| {
            Expr::FnCall(mew_parser::FnCall {
                name: name.to_string(),
                args: vec![ts.clone()],
                distinct: false,
                span: Span::default(),
            })
        };
        assert_eq!(eval.eval(&call("year"), &b, &graph).unwrap(), Value::Int(2024));
        assert_eq!(eval.eval(&call("month"), &b, &graph).unwrap(), Value::Int(1));
        assert_eq!(eval.eval(&call("day"), &b, &graph).unwrap(), Value::Int(15));
        assert_eq!(eval.eval(&call("hour"), &b, &graph).unwrap(), Value::Int(12));
    }
}
