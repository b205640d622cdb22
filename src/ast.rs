use std::collections::BTreeMap;

use crate::{
    error::{FramescriptError, FramescriptResult},
    functions::FunctionLibrary,
    lexer::Unit,
};

/// Dynamically typed result of evaluating an expression. Formulas lean on
/// loose string/number coercion (weight syntax, prompt fragments), so the
/// quirks of each operator are part of the language contract.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Number(f64),
    Str(String),
}

impl Value {
    /// Numeric view: numbers pass through, numeric strings parse, anything
    /// else is NaN.
    pub fn as_number(&self) -> f64 {
        match self {
            Self::Number(n) => *n,
            Self::Str(s) => {
                let t = s.trim();
                if t.is_empty() {
                    f64::NAN
                } else {
                    t.parse().unwrap_or(f64::NAN)
                }
            }
        }
    }

    /// String view, formatting whole numbers without a trailing ".0" so that
    /// `"a" + 2` is `"a2"`, not `"a2.0"`.
    pub fn display(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::Number(n) => format_number(*n),
        }
    }

    /// Truthiness for `and`/`or`/`if`: a number is truthy when > 0; a string
    /// operand is always falsy, even when non-empty.
    pub fn truthy(&self) -> bool {
        match self {
            Self::Number(n) => *n > 0.0,
            Self::Str(_) => false,
        }
    }
}

pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Per-evaluation context: one of these exists for every (field, frame)
/// invocation, carrying the timeline position and the defined-point set the
/// interpolation functions walk.
pub struct InvocationCtx<'a> {
    pub frame: i64,
    pub fps: f64,
    pub bpm: f64,
    /// Most recent defined frame <= current frame.
    pub active_keyframe: i64,
    /// Declared frames for the field, bookends included, ascending.
    pub defined_frames: &'a [i64],
    /// Values parallel to `defined_frames`.
    pub defined_values: &'a [f64],
    /// Variable bag threaded frame-to-frame (seeded with
    /// `prev_computed_value`; prompt evaluation adds every rendered field).
    pub variables: &'a BTreeMap<String, Value>,
    pub library: &'a FunctionLibrary,
}

impl InvocationCtx<'_> {
    pub fn seconds(&self) -> f64 {
        self.frame as f64 / self.fps
    }

    pub fn beats(&self) -> f64 {
        self.frame as f64 * self.bpm / (60.0 * self.fps)
    }

    pub fn active_keyframe_value(&self) -> f64 {
        let idx = self
            .defined_frames
            .partition_point(|&f| f <= self.active_keyframe);
        if idx == 0 {
            self.defined_values.first().copied().unwrap_or(0.0)
        } else {
            self.defined_values[idx - 1]
        }
    }

    /// First defined frame after the current frame; clamps to the last
    /// defined frame at the end of the timeline.
    pub fn next_keyframe(&self) -> i64 {
        let idx = self.defined_frames.partition_point(|&f| f <= self.frame);
        if idx < self.defined_frames.len() {
            self.defined_frames[idx]
        } else {
            self.defined_frames.last().copied().unwrap_or(self.frame)
        }
    }

    pub fn next_keyframe_value(&self) -> f64 {
        let idx = self.defined_frames.partition_point(|&f| f <= self.frame);
        if idx < self.defined_values.len() {
            self.defined_values[idx]
        } else {
            self.defined_values.last().copied().unwrap_or(0.0)
        }
    }

    fn variable(&self, name: &str) -> FramescriptResult<Value> {
        let v = match name {
            "f" | "frame" => Value::Number(self.frame as f64),
            "s" => Value::Number(self.seconds()),
            "b" => Value::Number(self.beats()),
            "fps" => Value::Number(self.fps),
            "bpm" => Value::Number(self.bpm),
            "active_keyframe" => Value::Number(self.active_keyframe as f64),
            "active_keyframe_value" => Value::Number(self.active_keyframe_value()),
            "next_keyframe" => Value::Number(self.next_keyframe() as f64),
            "next_keyframe_value" => Value::Number(self.next_keyframe_value()),
            _ => match self.variables.get(name) {
                Some(v) => v.clone(),
                None => {
                    return Err(FramescriptError::evaluation(format!(
                        "unknown variable '{name}'"
                    )));
                }
            },
        };
        Ok(v)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    /// The `:` operator: formats `"(left:right)"` weight syntax, not math.
    Weight,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

/// One call-site argument. The grammar guarantees a call is all-named or
/// all-positional, never mixed.
#[derive(Clone, Debug, PartialEq)]
pub enum CallArg {
    Named { name: String, value: Ast },
    Positional(Ast),
}

impl CallArg {
    pub fn value(&self) -> &Ast {
        match self {
            Self::Named { value, .. } => value,
            Self::Positional(value) => value,
        }
    }
}

/// Immutable expression tree. Each node exclusively owns its children.
#[derive(Clone, Debug, PartialEq)]
pub enum Ast {
    NumberLiteral { value: f64, unit: Option<Unit> },
    StringLiteral(String),
    BooleanLiteral(bool),
    Negation(Box<Ast>),
    BinaryOp {
        op: BinaryOperator,
        left: Box<Ast>,
        right: Box<Ast>,
    },
    If {
        cond: Box<Ast>,
        then: Box<Ast>,
        otherwise: Option<Box<Ast>>,
    },
    FunctionCall { name: String, args: Vec<CallArg> },
    VariableReference(String),
}

impl Ast {
    /// Evaluate against a context. Pure: identical tree + identical context
    /// always produce the identical value.
    pub fn invoke(&self, ctx: &InvocationCtx<'_>) -> FramescriptResult<Value> {
        match self {
            Self::NumberLiteral { value, unit } => {
                let v = match unit {
                    None | Some(Unit::Frames) => *value,
                    Some(Unit::Seconds) => value * ctx.fps,
                    Some(Unit::Beats) => value * ctx.fps * 60.0 / ctx.bpm,
                };
                Ok(Value::Number(v))
            }
            Self::StringLiteral(s) => Ok(Value::Str(s.clone())),
            Self::BooleanLiteral(b) => Ok(Value::Number(if *b { 1.0 } else { 0.0 })),
            Self::Negation(inner) => Ok(Value::Number(-inner.invoke(ctx)?.as_number())),
            Self::BinaryOp { op, left, right } => {
                // Both operands are always evaluated; and/or do not
                // short-circuit.
                let l = left.invoke(ctx)?;
                let r = right.invoke(ctx)?;
                Ok(apply_binary(*op, &l, &r))
            }
            Self::If {
                cond,
                then,
                otherwise,
            } => {
                if cond.invoke(ctx)?.truthy() {
                    then.invoke(ctx)
                } else {
                    match otherwise {
                        Some(e) => e.invoke(ctx),
                        None => Ok(Value::Number(0.0)),
                    }
                }
            }
            Self::FunctionCall { name, args } => {
                let spec = ctx.library.get(name).ok_or_else(|| {
                    FramescriptError::evaluation(format!("unknown function '{name}'"))
                })?;
                spec.invoke(name, ctx, args)
            }
            Self::VariableReference(name) => ctx.variable(name),
        }
    }
}

fn apply_binary(op: BinaryOperator, l: &Value, r: &Value) -> Value {
    use BinaryOperator::*;
    match op {
        Add => match (l, r) {
            (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
            // String on either side concatenates.
            _ => Value::Str(format!("{}{}", l.display(), r.display())),
        },
        Sub => Value::Number(l.as_number() - r.as_number()),
        Mul => Value::Number(l.as_number() * r.as_number()),
        Div => Value::Number(l.as_number() / r.as_number()),
        Mod => Value::Number(l.as_number() % r.as_number()),
        Pow => Value::Number(l.as_number().powf(r.as_number())),
        Weight => Value::Str(format!("({}:{})", l.display(), r.display())),
        Lt | Le | Gt | Ge | Eq | Ne => compare(op, l, r),
        And => Value::Number(if l.truthy() && r.truthy() { 1.0 } else { 0.0 }),
        Or => Value::Number(if l.truthy() || r.truthy() { 1.0 } else { 0.0 }),
    }
}

fn compare(op: BinaryOperator, l: &Value, r: &Value) -> Value {
    use BinaryOperator::*;
    let truth = match (l, r) {
        // Two strings compare lexicographically.
        (Value::Str(a), Value::Str(b)) => match op {
            Lt => a < b,
            Le => a <= b,
            Gt => a > b,
            Ge => a >= b,
            Eq => a == b,
            Ne => a != b,
            _ => unreachable!(),
        },
        // Mixed string/number compares numerically, so "2" == 2. A
        // non-numeric string coerces to NaN, failing every comparison
        // except !=.
        _ => {
            let a = l.as_number();
            let b = r.as_number();
            match op {
                Lt => a < b,
                Le => a <= b,
                Gt => a > b,
                Ge => a >= b,
                Eq => a == b,
                Ne => a != b,
                _ => unreachable!(),
            }
        }
    };
    Value::Number(if truth { 1.0 } else { 0.0 })
}
