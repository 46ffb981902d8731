//! Resolution and type checking of parsed syntax trees.

use super::ast::Syntax;
use super::cache::{CacheSlot, CachingStrategy};
use super::expression::{ExprNode, Expression, ReferenceCall};
use super::namespace::{Namespace, ReferenceKind, Scope};
use super::parser::parse_str;
use super::token::Operator;
use super::ValueType;
use crate::error::{ParseError, ParseErrorCode, ParseResult};

/// Turns [`Syntax`] into typed [`Expression`]s against a namespace.
///
/// One compiler is used per document so that every cacheable reference site
/// receives its own [`CacheSlot`].
#[derive(Debug)]
pub struct Compiler<'n> {
    namespace: &'n Namespace,
    next_slot: usize,
}

impl<'n> Compiler<'n> {
    /// Compiler resolving against `namespace`.
    pub fn new(namespace: &'n Namespace) -> Self {
        Self {
            namespace,
            next_slot: 0,
        }
    }

    /// Number of cache slots handed out so far.
    pub fn slots_allocated(&self) -> usize {
        self.next_slot
    }

    /// Lex, parse and compile `raw`.
    pub fn compile_str(
        &mut self,
        raw: &str,
        expected: ValueType,
        scope: &Scope<'_>,
    ) -> ParseResult<Expression> {
        let syntax = parse_str(raw)?;
        Ok(self.compile(&syntax, expected, scope)?.with_source(raw))
    }

    /// Resolve references and check types of a parsed tree.
    pub fn compile(
        &mut self,
        syntax: &Syntax,
        expected: ValueType,
        scope: &Scope<'_>,
    ) -> ParseResult<Expression> {
        let node = self.compile_node(syntax, expected, scope, None)?;
        check(expected, node.value_type(), syntax.position())?;
        Ok(Expression::new(node, expected))
    }

    fn compile_node(
        &mut self,
        syntax: &Syntax,
        expected: ValueType,
        scope: &Scope<'_>,
        piped: Option<ValueType>,
    ) -> ParseResult<ExprNode> {
        match syntax {
            Syntax::Literal { value, .. } => Ok(ExprNode::Literal(value.clone())),
            Syntax::Reference {
                owner,
                name,
                args,
                generator,
                position,
            } => self.compile_reference(
                owner.as_deref(),
                name,
                args.as_deref().unwrap_or(&[]),
                *generator,
                *position,
                scope,
                piped,
            ),
            Syntax::Conditional {
                branches,
                otherwise,
                ..
            } => {
                let mut compiled = Vec::with_capacity(branches.len());
                let mut ty: Option<ValueType> = None;
                for (guard, body) in branches {
                    let guard_node = self.compile_node(guard, ValueType::Bool, scope, None)?;
                    check(ValueType::Bool, guard_node.value_type(), guard.position())?;
                    let body_node = self.compile_node(body, expected, scope, None)?;
                    check(expected, body_node.value_type(), body.position())?;
                    ty = Some(unify(ty, body_node.value_type()));
                    compiled.push((guard_node, body_node));
                }
                let otherwise = match otherwise {
                    Some(body) => {
                        let node = self.compile_node(body, expected, scope, None)?;
                        check(expected, node.value_type(), body.position())?;
                        ty = Some(unify(ty, node.value_type()));
                        Some(Box::new(node))
                    }
                    None => None,
                };
                Ok(ExprNode::Conditional {
                    branches: compiled,
                    otherwise,
                    ty: ty.unwrap_or(ValueType::Any),
                    allow_fallthrough: expected == ValueType::Unit,
                })
            }
            Syntax::Operation {
                op,
                left,
                right,
                position,
            } => self.compile_operation(*op, left, right, *position, expected, scope),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn compile_reference(
        &mut self,
        owner: Option<&str>,
        name: &str,
        args: &[Syntax],
        generator: bool,
        position: usize,
        scope: &Scope<'_>,
        piped: Option<ValueType>,
    ) -> ParseResult<ExprNode> {
        let kind = if generator {
            ReferenceKind::Generator
        } else {
            ReferenceKind::Reference
        };
        // A piped value is the first argument of a plain reference, and the
        // input of a generator.
        let shift = usize::from(piped.is_some() && !generator);
        let member = self
            .namespace
            .resolve(scope, owner, name, args.len() + shift, kind)
            .map_err(|code| ParseError::new(code, position))?;

        let reference = || member.qualified_name();
        let params = member.parameters();

        if let Some(found) = piped {
            let expected = if generator {
                member.input_type()
            } else {
                params[0]
            };
            if !expected.accepts(found) {
                return Err(ParseError::new(
                    ParseErrorCode::ArgumentMismatch {
                        reference: reference(),
                        index: 0,
                        expected,
                        found,
                    },
                    position,
                ));
            }
        }

        let mut compiled = Vec::with_capacity(args.len());
        for (offset, arg) in args.iter().enumerate() {
            let index = offset + shift;
            let expected = params[index];
            let node = self.compile_node(arg, expected, scope, None)?;
            if !expected.accepts(node.value_type()) {
                return Err(ParseError::new(
                    ParseErrorCode::ArgumentMismatch {
                        reference: reference(),
                        index,
                        expected,
                        found: node.value_type(),
                    },
                    arg.position(),
                ));
            }
            compiled.push(node);
        }

        let slot = match member.caching_strategy() {
            CachingStrategy::Update => Some(self.allocate_slot()),
            CachingStrategy::None => None,
        };

        let call = ReferenceCall {
            member,
            args: compiled,
            piped: piped.is_some(),
            slot,
            position,
        };
        Ok(if generator {
            ExprNode::Generator(call)
        } else {
            ExprNode::Reference(call)
        })
    }

    fn compile_operation(
        &mut self,
        op: Operator,
        left: &Syntax,
        right: &Syntax,
        position: usize,
        expected: ValueType,
        scope: &Scope<'_>,
    ) -> ParseResult<ExprNode> {
        let (left_node, right_node, ty) = match op {
            Operator::Chain => {
                if !matches!(right, Syntax::Reference { .. }) {
                    return Err(ParseError::new(
                        ParseErrorCode::IllegalChainTarget,
                        right.position(),
                    ));
                }
                let l = self.compile_node(left, ValueType::Any, scope, None)?;
                let r = self.compile_node(right, expected, scope, Some(l.value_type()))?;
                let ty = r.value_type();
                (l, r, ty)
            }
            Operator::Sequence => {
                let l = self.compile_node(left, ValueType::Unit, scope, None)?;
                let r = self.compile_node(right, expected, scope, None)?;
                let ty = r.value_type();
                (l, r, ty)
            }
            Operator::And | Operator::Or => {
                let l = self.compile_node(left, ValueType::Bool, scope, None)?;
                check(ValueType::Bool, l.value_type(), left.position())?;
                let r = self.compile_node(right, ValueType::Bool, scope, None)?;
                check(ValueType::Bool, r.value_type(), right.position())?;
                (l, r, ValueType::Bool)
            }
            Operator::Equals | Operator::NotEquals => {
                let l = self.compile_node(left, ValueType::Any, scope, None)?;
                let r = self.compile_node(right, ValueType::Any, scope, None)?;
                (l, r, ValueType::Bool)
            }
            Operator::Greater | Operator::GreaterOrEqual | Operator::Less | Operator::LessOrEqual => {
                let l = self.compile_node(left, ValueType::Any, scope, None)?;
                let r = self.compile_node(right, ValueType::Any, scope, None)?;
                let (lt, rt) = (l.value_type(), r.value_type());
                let comparable = lt == ValueType::Any
                    || rt == ValueType::Any
                    || (lt.is_numeric() && rt.is_numeric())
                    || (lt == ValueType::Str && rt == ValueType::Str);
                if !comparable {
                    return Err(ParseError::new(
                        ParseErrorCode::TypeMismatch {
                            expected: lt,
                            found: rt,
                        },
                        position,
                    ));
                }
                (l, r, ValueType::Bool)
            }
        };

        Ok(ExprNode::Operation {
            op,
            left: Box::new(left_node),
            right: Box::new(right_node),
            ty,
        })
    }

    fn allocate_slot(&mut self) -> CacheSlot {
        let slot = CacheSlot(self.next_slot);
        self.next_slot += 1;
        slot
    }
}

fn check(expected: ValueType, found: ValueType, position: usize) -> ParseResult<()> {
    if expected.accepts(found) {
        Ok(())
    } else {
        Err(ParseError::new(
            ParseErrorCode::TypeMismatch { expected, found },
            position,
        ))
    }
}

fn unify(current: Option<ValueType>, next: ValueType) -> ValueType {
    current.map_or(next, |ty| ty.unify(next))
}
