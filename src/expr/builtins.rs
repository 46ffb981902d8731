//! Members every document can use without declaring a handler.

use anyhow::anyhow;

use super::context::RuntimeContext;
use super::namespace::{BUILTINS, Generated, Member, Namespace};
use super::{Value, ValueType};

pub(crate) fn install(ns: &mut Namespace) {
    ns.register(
        Member::function(BUILTINS, "not", |_, args| Ok(Value::Bool(!args[0].as_bool().unwrap_or(false))))
            .params(&[ValueType::Bool])
            .returns(ValueType::Bool),
    )
    .register(
        Member::function(BUILTINS, "isNull", |_, args| Ok(Value::Bool(args[0].is_null())))
            .params(&[ValueType::Any])
            .returns(ValueType::Bool),
    )
    .register(
        Member::function(BUILTINS, "notNull", |_, args| Ok(Value::Bool(!args[0].is_null())))
            .params(&[ValueType::Any])
            .returns(ValueType::Bool),
    )
    .register(
        Member::function(BUILTINS, "isEmpty", |_, args| {
            let empty = match &args[0] {
                Value::Null => true,
                Value::Str(text) => text.is_empty(),
                Value::List(items) => items.is_empty(),
                _ => false,
            };
            Ok(Value::Bool(empty))
        })
        .params(&[ValueType::Any])
        .returns(ValueType::Bool),
    )
    .register(
        Member::function(BUILTINS, "env", |_, args| {
            let key = args[0].as_str().ok_or_else(|| anyhow!("env expects a name"))?;
            Ok(std::env::var(key).ok().into())
        })
        .params(&[ValueType::Str])
        .returns(ValueType::Str),
    )
    .register(
        Member::function(BUILTINS, "text", |ctx, _| {
            Ok(ctx.event.and_then(|event| event.text()).into())
        })
        .returns(ValueType::Str),
    )
    .register(
        Member::function(BUILTINS, "callbackData", |ctx, _| {
            Ok(ctx.event.and_then(|event| event.callback_data()).into())
        })
        .returns(ValueType::Str),
    )
    .register(
        Member::function(BUILTINS, "userId", |ctx, _| {
            Ok(ctx.event.map(|event| event.user.0).into())
        })
        .returns(ValueType::Int),
    )
    .register(
        Member::function(BUILTINS, "var", |ctx, args| {
            let name = args[0].as_str().unwrap_or_default();
            Ok(ctx.variables.get(name).cloned().unwrap_or_default())
        })
        .params(&[ValueType::Str])
        .returns(ValueType::Any),
    )
    .register(
        Member::generator(BUILTINS, "store", |_, args| {
            let name = args[0].as_str().unwrap_or_default().to_string();
            let generated: Generated = Box::new(move |ctx: &mut RuntimeContext<'_>, input: Value| {
                ctx.variables.set(name, input);
                Ok(Value::Null)
            });
            Ok(generated)
        })
        .params(&[ValueType::Str])
        .input(ValueType::Any)
        .returns(ValueType::Unit),
    )
    .register(
        Member::generator(BUILTINS, "startsWith", |_, args| {
            let prefix = args[0].as_str().unwrap_or_default().to_string();
            let generated: Generated = Box::new(move |_: &mut RuntimeContext<'_>, input: Value| {
                Ok(Value::Bool(input.as_str().is_some_and(|text| text.starts_with(&prefix))))
            });
            Ok(generated)
        })
        .params(&[ValueType::Str])
        .input(ValueType::Str)
        .returns(ValueType::Bool),
    )
    .register(
        Member::generator(BUILTINS, "default", |_, args| {
            let fallback = args[0].clone();
            let generated: Generated = Box::new(move |_: &mut RuntimeContext<'_>, input: Value| {
                Ok(if input.is_null() { fallback } else { input })
            });
            Ok(generated)
        })
        .params(&[ValueType::Any])
        .input(ValueType::Any)
        .returns(ValueType::Any),
    );
}
