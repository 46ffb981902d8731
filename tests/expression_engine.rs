//! Expression engine tests
//!
//! Compiles expressions against a namespace with a handler and evaluates
//! them against runtime contexts, covering handler dispatch, reference
//! caching and the runtime error surface.

use grove::error::{EvaluationError, ParseErrorCode};
use grove::expr::{
    CacheSlot, CachingStrategy, Compiler, Member, Namespace, ReferenceCache, RuntimeContext, Scope,
    SessionCache, Value, ValueType, Variables,
};
use grove::flow::{Event, NodeId, Payload, UserId};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

struct Profile {
    name: String,
    visits: i64,
}

fn namespace(hits: Arc<AtomicUsize>) -> Namespace {
    let mut ns = Namespace::with_builtins();
    ns.handler_with("Profile", || Profile {
        name: "Ada".into(),
        visits: 0,
    });
    ns.register(
        Member::method::<Profile, _>("Profile", "getName", |profile, _, _| {
            Ok(Value::from(profile.name.clone()))
        })
        .returns(ValueType::Str),
    )
    .register(
        Member::method::<Profile, _>("Profile", "visit", |profile, _, _| {
            profile.visits += 1;
            Ok(Value::Int(profile.visits))
        })
        .returns(ValueType::Int),
    )
    .register(
        Member::function("Stats", "hits", move |_, _| {
            Ok(Value::Int(hits.fetch_add(1, Ordering::SeqCst) as i64 + 1))
        })
        .returns(ValueType::Int)
        .caching(CachingStrategy::Update),
    )
    .register(
        Member::function("Stats", "fail", |_, _| Err(anyhow::anyhow!("backend unavailable")))
            .returns(ValueType::Str),
    );
    ns
}

fn text(update_id: u64, body: &str) -> Event {
    Event::new(update_id, UserId(7), Payload::text(body))
}

#[test]
fn handler_member_resolves_to_active_instance() {
    let ns = namespace(Arc::default());
    let expr = Compiler::new(&ns)
        .compile_str("#getName()", ValueType::Str, &Scope::handler("Profile"))
        .expect("compile");

    let mut handler = ns.instantiate("Profile").expect("factory");
    let mut vars = Variables::new();
    let mut cache = SessionCache::new();
    let event = text(1, "hi");
    let mut ctx = RuntimeContext::new(&mut vars, &mut cache)
        .with_event(&event)
        .with_handler(&mut *handler);

    assert_eq!(expr.evaluate(&mut ctx).expect("evaluate"), Value::from("Ada"));
}

#[test]
fn handler_members_are_invisible_without_scope() {
    let ns = namespace(Arc::default());
    let err = Compiler::new(&ns)
        .compile_str("#getName()", ValueType::Str, &Scope::global())
        .unwrap_err();
    assert!(matches!(err.code, ParseErrorCode::UnknownReference { .. }));
}

#[test]
fn handler_state_persists_between_evaluations() {
    let ns = namespace(Arc::default());
    let expr = Compiler::new(&ns)
        .compile_str("#visit()", ValueType::Int, &Scope::handler("Profile"))
        .expect("compile");
    let mut handler = ns.instantiate("Profile").expect("factory");
    let mut vars = Variables::new();
    let mut cache = SessionCache::new();

    for expected in 1..=3 {
        let mut ctx = RuntimeContext::new(&mut vars, &mut cache).with_handler(&mut *handler);
        assert_eq!(expr.evaluate(&mut ctx).unwrap(), Value::Int(expected));
    }
}

#[test]
fn update_cache_invokes_once_per_event() {
    let hits = Arc::new(AtomicUsize::new(0));
    let ns = namespace(Arc::clone(&hits));
    let expr = Compiler::new(&ns)
        .compile_str("Stats#hits()", ValueType::Int, &Scope::global())
        .expect("compile");
    let mut vars = Variables::new();
    let mut cache = SessionCache::new();

    let first = text(100, "a");
    for _ in 0..3 {
        let mut ctx = RuntimeContext::new(&mut vars, &mut cache).with_event(&first);
        assert_eq!(expr.evaluate(&mut ctx).unwrap(), Value::Int(1));
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let second = text(101, "b");
    let mut ctx = RuntimeContext::new(&mut vars, &mut cache).with_event(&second);
    assert_eq!(expr.evaluate(&mut ctx).unwrap(), Value::Int(2));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn invalid_capture_leaves_cache_empty() {
    let hits = Arc::new(AtomicUsize::new(0));
    let ns = namespace(Arc::clone(&hits));
    let expr = Compiler::new(&ns)
        .compile_str("Stats#hits()", ValueType::Int, &Scope::global())
        .expect("compile");
    let mut vars = Variables::new();
    let mut cache = SessionCache::new();

    for _ in 0..2 {
        let mut ctx = RuntimeContext::new(&mut vars, &mut cache);
        expr.evaluate(&mut ctx).unwrap();
    }
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert!(cache.get(CacheSlot(0)).is_none_or(ReferenceCache::is_empty));
}

#[test]
fn node_capture_never_satisfies_a_lookup() {
    let hits = Arc::new(AtomicUsize::new(0));
    let ns = namespace(Arc::clone(&hits));
    let expr = Compiler::new(&ns)
        .compile_str("Stats#hits()", ValueType::Int, &Scope::global())
        .expect("compile");
    let mut vars = Variables::new();
    let mut cache = SessionCache::new();
    let path = [NodeId(0), NodeId(3)];

    for _ in 0..2 {
        let mut ctx = RuntimeContext::new(&mut vars, &mut cache).with_navigation(&path);
        expr.evaluate(&mut ctx).unwrap();
    }
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn chain_into_generator() {
    let ns = namespace(Arc::default());
    let expr = Compiler::new(&ns)
        .compile_str("#text() -> ::startsWith(\"he\")", ValueType::Bool, &Scope::global())
        .expect("compile");
    let mut vars = Variables::new();
    let mut cache = SessionCache::new();

    let hello = text(1, "hello");
    let mut ctx = RuntimeContext::new(&mut vars, &mut cache).with_event(&hello);
    assert_eq!(expr.evaluate(&mut ctx).unwrap(), Value::Bool(true));

    let bye = text(2, "bye");
    let mut ctx = RuntimeContext::new(&mut vars, &mut cache).with_event(&bye);
    assert_eq!(expr.evaluate(&mut ctx).unwrap(), Value::Bool(false));
}

#[test]
fn store_then_read_variable() {
    let ns = namespace(Arc::default());
    let mut compiler = Compiler::new(&ns);
    let store = compiler
        .compile_str("#text() -> ::store(\"answer\")", ValueType::Unit, &Scope::global())
        .expect("compile store");
    let read = compiler
        .compile_str("#var(\"answer\") == \"42\"", ValueType::Bool, &Scope::global())
        .expect("compile read");

    let mut vars = Variables::new();
    let mut cache = SessionCache::new();
    let event = text(1, "42");
    let mut ctx = RuntimeContext::new(&mut vars, &mut cache).with_event(&event);
    store.evaluate(&mut ctx).unwrap();
    assert!(read.test(&mut ctx).unwrap());
    assert_eq!(vars.get("answer"), Some(&Value::from("42")));
}

#[test]
fn member_failures_are_wrapped() {
    let ns = namespace(Arc::default());
    let expr = Compiler::new(&ns)
        .compile_str("Stats#fail()", ValueType::Str, &Scope::global())
        .expect("compile");
    let mut vars = Variables::new();
    let mut cache = SessionCache::new();
    let mut ctx = RuntimeContext::new(&mut vars, &mut cache);

    match expr.evaluate(&mut ctx) {
        Err(EvaluationError::Invocation { member, source }) => {
            assert_eq!(member, "Stats#fail");
            assert!(source.to_string().contains("backend unavailable"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn method_without_handler_fails_at_runtime() {
    let ns = namespace(Arc::default());
    let expr = Compiler::new(&ns)
        .compile_str("#getName()", ValueType::Str, &Scope::handler("Profile"))
        .expect("compile");
    let mut vars = Variables::new();
    let mut cache = SessionCache::new();
    let mut ctx = RuntimeContext::new(&mut vars, &mut cache);
    assert!(matches!(
        expr.evaluate(&mut ctx),
        Err(EvaluationError::Invocation { .. })
    ));
}

#[test]
fn any_typed_results_are_checked_at_runtime() {
    let ns = namespace(Arc::default());
    let expr = Compiler::new(&ns)
        .compile_str("#var(\"missing\") -> ::default(3)", ValueType::Int, &Scope::global())
        .expect("compile");
    let mut vars = Variables::new();
    let mut cache = SessionCache::new();
    let mut ctx = RuntimeContext::new(&mut vars, &mut cache);
    assert_eq!(expr.evaluate(&mut ctx).unwrap(), Value::Int(3));

    vars.set("missing", Value::from("text"));
    let mut ctx = RuntimeContext::new(&mut vars, &mut cache);
    assert!(matches!(
        expr.evaluate(&mut ctx),
        Err(EvaluationError::ResultType { .. })
    ));
}
