//! Compiled, evaluatable expressions.

use std::cmp::Ordering;
use std::sync::Arc;

use super::cache::CacheSlot;
use super::context::RuntimeContext;
use super::namespace::{Member, MemberBody};
use super::token::Operator;
use super::{Value, ValueType};
use crate::error::{EvalResult, EvaluationError};

/// Resolved call of a namespace member.
#[derive(Debug, Clone)]
pub struct ReferenceCall {
    pub(crate) member: Arc<Member>,
    pub(crate) args: Vec<ExprNode>,
    pub(crate) piped: bool,
    pub(crate) slot: Option<CacheSlot>,
    pub(crate) position: usize,
}

impl ReferenceCall {
    /// Member this call invokes.
    pub fn member(&self) -> &Member {
        &self.member
    }

    /// Cache slot, when the member caches its results.
    pub fn slot(&self) -> Option<CacheSlot> {
        self.slot
    }

    /// Whether the call receives the left side of `->`.
    pub fn is_piped(&self) -> bool {
        self.piped
    }

    /// Byte offset of the reference in its source.
    pub fn position(&self) -> usize {
        self.position
    }

    fn invoke(&self, ctx: &mut RuntimeContext<'_>, piped: Option<Value>) -> EvalResult<Value> {
        let member = &self.member;
        let strategy = member.caching_strategy();
        let capture = ctx.capture();

        if let Some(slot) = self.slot {
            if let Some(hit) = ctx.cache.lookup(slot, strategy, Some(&capture)) {
                return Ok(hit);
            }
        }

        let mut args = Vec::with_capacity(self.args.len() + 1);
        let mut input = Value::Null;
        match (&member.body, piped) {
            (MemberBody::Function(_), Some(value)) => args.push(value),
            (MemberBody::Generator(_), Some(value)) => input = value,
            (_, None) => {}
        }
        for arg in &self.args {
            args.push(arg.evaluate(ctx)?);
        }

        let args = args
            .into_iter()
            .zip(member.parameters())
            .map(|(value, ty)| conform(value, *ty))
            .collect::<EvalResult<Vec<_>>>()?;

        let produced = match &member.body {
            MemberBody::Function(function) => (**function)(ctx, &args),
            MemberBody::Generator(generator) => {
                let input = conform(input, member.input_type())?;
                (**generator)(ctx, &args).and_then(|generated| generated(ctx, input))
            }
        }
        .map_err(|source| EvaluationError::Invocation {
            member: member.qualified_name(),
            source,
        })?;

        let value = conform(produced, member.return_type())?;
        if let Some(slot) = self.slot {
            ctx.cache.write(slot, strategy, value.clone(), capture);
        }
        Ok(value)
    }
}

/// Typed, resolved expression tree.
#[derive(Debug, Clone)]
pub enum ExprNode {
    /// Constant.
    Literal(Value),
    /// Member call.
    Reference(ReferenceCall),
    /// Generator call: produce a function, then apply it to the piped value.
    Generator(ReferenceCall),
    /// First guard evaluating to `true` selects its body.
    Conditional {
        /// Guard/body pairs.
        branches: Vec<(ExprNode, ExprNode)>,
        /// ELSE body.
        otherwise: Option<Box<ExprNode>>,
        /// Static type of the bodies.
        ty: ValueType,
        /// Yield `Null` instead of failing when nothing matches.
        allow_fallthrough: bool,
    },
    /// Binary operation.
    Operation {
        /// Operator.
        op: Operator,
        /// Left operand.
        left: Box<ExprNode>,
        /// Right operand.
        right: Box<ExprNode>,
        /// Static result type.
        ty: ValueType,
    },
}

impl ExprNode {
    /// Static type fixed at compile time.
    pub fn value_type(&self) -> ValueType {
        match self {
            ExprNode::Literal(value) => value.value_type(),
            ExprNode::Reference(call) | ExprNode::Generator(call) => call.member.return_type(),
            ExprNode::Conditional { ty, .. } | ExprNode::Operation { ty, .. } => *ty,
        }
    }

    /// Evaluate against `ctx`.
    pub fn evaluate(&self, ctx: &mut RuntimeContext<'_>) -> EvalResult<Value> {
        match self {
            ExprNode::Literal(value) => Ok(value.clone()),
            ExprNode::Reference(call) | ExprNode::Generator(call) => call.invoke(ctx, None),
            ExprNode::Conditional {
                branches,
                otherwise,
                allow_fallthrough,
                ..
            } => {
                for (guard, body) in branches {
                    if truthy(guard.evaluate(ctx)?)? {
                        return body.evaluate(ctx);
                    }
                }
                match otherwise {
                    Some(body) => body.evaluate(ctx),
                    None if *allow_fallthrough => Ok(Value::Null),
                    None => Err(EvaluationError::NoBranchMatched),
                }
            }
            ExprNode::Operation {
                op, left, right, ..
            } => evaluate_operation(*op, left, right, ctx),
        }
    }

    fn visit<'e>(&'e self, calls: &mut Vec<&'e ReferenceCall>) {
        match self {
            ExprNode::Literal(_) => {}
            ExprNode::Reference(call) | ExprNode::Generator(call) => {
                calls.push(call);
                for arg in &call.args {
                    arg.visit(calls);
                }
            }
            ExprNode::Conditional {
                branches,
                otherwise,
                ..
            } => {
                for (guard, body) in branches {
                    guard.visit(calls);
                    body.visit(calls);
                }
                if let Some(body) = otherwise {
                    body.visit(calls);
                }
            }
            ExprNode::Operation { left, right, .. } => {
                left.visit(calls);
                right.visit(calls);
            }
        }
    }
}

fn evaluate_operation(
    op: Operator,
    left: &ExprNode,
    right: &ExprNode,
    ctx: &mut RuntimeContext<'_>,
) -> EvalResult<Value> {
    match op {
        Operator::Sequence => {
            left.evaluate(ctx)?;
            right.evaluate(ctx)
        }
        Operator::Or => {
            if truthy(left.evaluate(ctx)?)? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(truthy(right.evaluate(ctx)?)?))
        }
        Operator::And => {
            if !truthy(left.evaluate(ctx)?)? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(truthy(right.evaluate(ctx)?)?))
        }
        Operator::Equals => {
            let (l, r) = (left.evaluate(ctx)?, right.evaluate(ctx)?);
            Ok(Value::Bool(l.loose_eq(&r)))
        }
        Operator::NotEquals => {
            let (l, r) = (left.evaluate(ctx)?, right.evaluate(ctx)?);
            Ok(Value::Bool(!l.loose_eq(&r)))
        }
        Operator::Greater | Operator::GreaterOrEqual | Operator::Less | Operator::LessOrEqual => {
            let (l, r) = (left.evaluate(ctx)?, right.evaluate(ctx)?);
            let ordering = l
                .partial_order(&r)
                .ok_or_else(|| EvaluationError::Incomparable {
                    left: l.value_type(),
                    right: r.value_type(),
                })?;
            let holds = match op {
                Operator::Greater => ordering == Ordering::Greater,
                Operator::GreaterOrEqual => ordering != Ordering::Less,
                Operator::Less => ordering == Ordering::Less,
                _ => ordering != Ordering::Greater,
            };
            Ok(Value::Bool(holds))
        }
        Operator::Chain => {
            let input = left.evaluate(ctx)?;
            match right {
                ExprNode::Reference(call) | ExprNode::Generator(call) => {
                    call.invoke(ctx, Some(input))
                }
                other => other.evaluate(ctx),
            }
        }
    }
}

fn truthy(value: Value) -> EvalResult<bool> {
    match value {
        Value::Bool(flag) => Ok(flag),
        other => Err(EvaluationError::NonBooleanCondition {
            found: other.value_type(),
        }),
    }
}

fn conform(value: Value, expected: ValueType) -> EvalResult<Value> {
    value
        .coerce(expected)
        .map_err(|value| EvaluationError::ResultType {
            expected,
            found: value.value_type(),
        })
}

/// Compiled expression with the type its consumer expects.
#[derive(Debug, Clone)]
pub struct Expression {
    node: ExprNode,
    expected: ValueType,
    source: Option<String>,
}

impl Expression {
    pub(crate) fn new(node: ExprNode, expected: ValueType) -> Self {
        Self {
            node,
            expected,
            source: None,
        }
    }

    /// Constant expression.
    pub fn literal(value: impl Into<Value>, expected: ValueType) -> Self {
        Self::new(ExprNode::Literal(value.into()), expected)
    }

    pub(crate) fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Root of the tree.
    pub fn node(&self) -> &ExprNode {
        &self.node
    }

    /// Static type of the tree.
    pub fn value_type(&self) -> ValueType {
        self.node.value_type()
    }

    /// Type every result is converted to.
    pub fn expected_type(&self) -> ValueType {
        self.expected
    }

    /// Text the expression was compiled from.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Value of a constant expression.
    pub fn constant(&self) -> Option<&Value> {
        match &self.node {
            ExprNode::Literal(value) => Some(value),
            _ => None,
        }
    }

    /// Every member call in the tree, outermost first.
    pub fn calls(&self) -> Vec<&ReferenceCall> {
        let mut calls = Vec::new();
        self.node.visit(&mut calls);
        calls
    }

    /// Evaluate and convert the result to the expected type.
    pub fn evaluate(&self, ctx: &mut RuntimeContext<'_>) -> EvalResult<Value> {
        let value = self.node.evaluate(ctx)?;
        conform(value, self.expected)
    }

    /// Evaluate a boolean expression.
    pub fn test(&self, ctx: &mut RuntimeContext<'_>) -> EvalResult<bool> {
        truthy(self.evaluate(ctx)?)
    }
}

/// Evaluate `expression` against `ctx`.
pub fn evaluate(expression: &Expression, ctx: &mut RuntimeContext<'_>) -> EvalResult<Value> {
    expression.evaluate(ctx)
}
