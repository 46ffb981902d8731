//! Flow navigation tests
//!
//! Loads a small document and drives sessions through it, checking jump
//! point geometry, action ordering, handler lifetimes, caller tracking,
//! deferred jump actions and transition execution options.

use grove::error::FlowError;
use grove::expr::{Member, Namespace, RuntimeContext, Value, ValueType};
use grove::flow::{
    Action, ActionRegistry, EditSource, EditTarget, Event, FlowGraph, Navigation, NodeId, Outcome,
    Payload, Resolver, Session, UserId,
};
use grove::FlowConfig;
use parking_lot::Mutex;
use std::sync::Arc;

const DOCUMENT: &str = r##"
(tree Root :handler "Profile" :commands ("start")
  (actions (call "log") (invoke "\"root\" -> ::store(\"entered\")"))
  (on-exit (call "log"))
  (branch Menu :keys ("menu")
    (actions (call "log"))
    (on-exit (call "log"))
    (on-reenter (call "log"))
    (branch Settings :keys ("settings")
      (actions (call "log"))
      (on-exit (call "log")))
    (branch Profile :keys ("profile")
      (actions (call "log"))))
  (branch Away :keys ("away")
    (transition :target "Other" :edit "first" :edit-source "callback"
      (actions (call "log"))))
  (branch Detour :keys ("detour")
    (transition :target "Other"
      (actions (call "log"))
      (transition :target "Menu")))
  (branch Count :keys ("count") :invoke "#visit() -> ::store(\"visits\")"
    (on-reenter (invoke "#visit() -> ::store(\"visits\")")))
  (branch Leave :keys ("leave")
    (transition :target "Fragile" :ignore-error false))
  (branch Stay :keys ("stay")
    (transition :target "Other" :execute "#text() == \"go\""))
  (branch Broken :keys ("broken")
    (actions (call "fail")))
  (branch Tolerant :keys ("tolerant")
    (transition :target "Broken" :ignore-error true))
  (branch Greeting :when "#getName() == \"Ada\" AND #text() == \"hello\"" :invoke "#getName() -> ::store(\"greeted\")")
  (default (actions (call "log"))))
(tree Other :callbacks ("other")
  (actions (call "log"))
  (branch Return :keys ("return")
    (transition :type caller)))
(tree Fragile
  (actions (call "fail")))
"##;

struct Profile {
    name: String,
    visits: i64,
}

#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<NodeId>>>);

impl Journal {
    fn take(&self) -> Vec<NodeId> {
        std::mem::take(&mut *self.0.lock())
    }
}

struct Fixture {
    graph: Arc<FlowGraph>,
    namespace: Arc<Namespace>,
    journal: Journal,
}

impl Fixture {
    fn new() -> Self {
        let mut namespace = Namespace::with_builtins();
        namespace.handler_with("Profile", || Profile {
            name: "Ada".into(),
            visits: 0,
        });
        namespace
            .register(
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
            );

        let journal = Journal::default();
        let mut actions = ActionRegistry::new();
        let sink = journal.clone();
        actions.register("log", move |ctx: &mut RuntimeContext<'_>| -> anyhow::Result<()> {
            if let Some(node) = ctx.active_node() {
                sink.0.lock().push(node);
            }
            Ok(())
        });
        actions.register("fail", |_: &mut RuntimeContext<'_>| -> anyhow::Result<()> {
            anyhow::bail!("delivery failed")
        });

        let graph = grove::flow::load(DOCUMENT, &namespace, &actions, &FlowConfig::default())
            .expect("document loads");
        Self {
            graph: Arc::new(graph),
            namespace: Arc::new(namespace),
            journal,
        }
    }

    fn session(&self) -> Session {
        Session::new(
            Arc::clone(&self.graph),
            Arc::clone(&self.namespace),
            Arc::new(FlowConfig::default()),
        )
    }

    fn id(&self, path: &str) -> NodeId {
        self.graph.lookup(None, path).expect(path)
    }

    fn ids(&self, paths: &[&str]) -> Vec<NodeId> {
        paths.iter().map(|path| self.id(path)).collect()
    }
}

fn text(update_id: u64, body: &str) -> Event {
    Event::new(update_id, UserId(1), Payload::text(body))
}

fn press(update_id: u64, data: &str) -> Event {
    Event::new(update_id, UserId(1), Payload::callback(data))
}

#[test]
fn sibling_jump_exits_to_the_common_ancestor() {
    let fx = Fixture::new();
    let resolver = Resolver::new(&fx.graph, 8);
    let settings = fx.id("Root/Menu/Settings");
    let profile = fx.id("Root/Menu/Profile");

    let point = resolver
        .resolve_to(&Navigation::at(settings), profile)
        .expect("resolve");
    assert_eq!(point.exit, vec![settings]);
    assert_eq!(point.enter, vec![profile]);
    assert_eq!(point.lca, Some(fx.id("Root/Menu")));

    let owners: Vec<NodeId> = point.all_actions().iter().map(|action| action.node).collect();
    assert_eq!(owners, vec![settings, profile]);
}

#[test]
fn resolve_transition_by_name() {
    let fx = Fixture::new();
    let resolver = Resolver::new(&fx.graph, 8);
    let settings = fx.id("Root/Menu/Settings");

    let point = resolver.resolve_transition(settings, "Profile").expect("resolve");
    assert_eq!(point.target, fx.id("Root/Menu/Profile"));

    let err = resolver.resolve_transition(settings, "Nowhere").unwrap_err();
    assert!(matches!(err, FlowError::Configuration(_)));
}

#[test]
fn jumping_to_self_runs_reentry_actions() {
    let fx = Fixture::new();
    let resolver = Resolver::new(&fx.graph, 8);
    let menu = fx.id("Root/Menu");

    let point = resolver.resolve_to(&Navigation::at(menu), menu).expect("resolve");
    assert!(point.exit.is_empty());
    assert!(point.enter.is_empty());
    assert_eq!(point.all_actions().len(), 1);
    assert!(std::ptr::eq(
        point.all_actions()[0],
        &fx.graph.node(menu).reentry_actions[0]
    ));
}

#[test]
fn automatic_transitions_are_chained_into_next() {
    let fx = Fixture::new();
    let resolver = Resolver::new(&fx.graph, 8);
    let root = fx.id("Root");

    let point = resolver
        .resolve_to(&Navigation::at(root), fx.id("Root/Away"))
        .expect("resolve");
    let next = point.next.as_deref().expect("follow-up hop");
    assert_eq!(next.target, fx.id("Other"));
    assert_eq!(next.lca, None);
    assert_eq!(point.final_target(), fx.id("Other"));
    assert_eq!(point.hops().len(), 2);
}

#[test]
fn chain_limit_is_enforced() {
    let fx = Fixture::new();
    let resolver = Resolver::new(&fx.graph, 0);
    let err = resolver
        .resolve_to(&Navigation::at(fx.id("Root")), fx.id("Root/Away"))
        .unwrap_err();
    assert!(matches!(err, FlowError::TransitionChain { limit: 0 }));
}

#[test]
fn command_enters_tree_and_runs_entry_actions() {
    let fx = Fixture::new();
    let mut session = fx.session();
    let root = fx.id("Root");

    let outcome = session.handle(&text(1, "/start")).expect("handle");
    assert!(matches!(outcome, Outcome::Entered { tree, .. } if tree == root));
    assert_eq!(session.current(), Some(root));
    assert_eq!(fx.journal.take(), vec![root]);
    assert_eq!(session.variables().get("entered"), Some(&Value::from("root")));
    assert!(session.has_handler(root));
}

#[test]
fn branches_follow_the_menu_hierarchy() {
    let fx = Fixture::new();
    let mut session = fx.session();
    session.handle(&text(1, "/start")).unwrap();
    fx.journal.take();

    let outcome = session.handle(&text(2, "menu")).unwrap();
    assert!(matches!(outcome, Outcome::Branched { branch, .. } if branch == fx.id("Root/Menu")));
    session.handle(&text(3, "settings")).unwrap();
    assert_eq!(session.current_path(), Some("Root/Menu/Settings"));
    fx.journal.take();

    // Leaf branches are matched against their parent's children.
    session.handle(&text(4, "profile")).unwrap();
    assert_eq!(session.current_path(), Some("Root/Menu/Profile"));
    assert_eq!(
        fx.journal.take(),
        fx.ids(&["Root/Menu/Settings", "Root/Menu/Profile"])
    );
}

#[test]
fn trigger_reenters_tree_from_scratch() {
    let fx = Fixture::new();
    let mut session = fx.session();
    for (id, body) in [(1, "/start"), (2, "menu"), (3, "settings")] {
        session.handle(&text(id, body)).unwrap();
    }
    fx.journal.take();

    session.handle(&text(4, "/start")).unwrap();
    assert_eq!(session.current_path(), Some("Root"));
    assert_eq!(
        fx.journal.take(),
        fx.ids(&["Root/Menu/Settings", "Root/Menu", "Root", "Root"])
    );
}

#[test]
fn jump_to_other_tree_and_back_to_caller() {
    let fx = Fixture::new();
    let mut session = fx.session();
    let root = fx.id("Root");
    let other = fx.id("Other");
    session.handle(&text(1, "/start")).unwrap();
    fx.journal.take();

    let outcome = session.handle(&text(2, "away")).unwrap();
    match outcome {
        Outcome::Branched { landing, .. } => {
            assert_eq!(landing.at, other);
            assert_eq!(landing.edit, Some(EditTarget::First));
            assert_eq!(landing.edit_source, Some(EditSource::Callback));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(session.navigation().caller_trees(), vec![root]);
    // Root on-exit, Other entry. The jump's own actions wait for the return.
    assert_eq!(fx.journal.take(), vec![root, other]);
    assert!(!session.has_handler(root));

    session.handle(&text(3, "return")).unwrap();
    assert_eq!(session.current(), Some(root));
    assert!(session.navigation().callers.is_empty());
    assert_eq!(fx.journal.take(), vec![fx.id("Root/Away"), root]);
}

#[test]
fn return_resumes_the_follow_up_of_the_jump() {
    let fx = Fixture::new();
    let mut session = fx.session();
    let root = fx.id("Root");
    session.handle(&text(1, "/start")).unwrap();
    session.handle(&text(2, "detour")).unwrap();
    assert_eq!(session.current(), Some(fx.id("Other")));
    fx.journal.take();

    session.handle(&text(3, "return")).unwrap();
    assert_eq!(session.current_path(), Some("Root/Menu"));
    assert!(session.navigation().callers.is_empty());
    assert_eq!(
        fx.journal.take(),
        vec![fx.id("Root/Detour"), root, fx.id("Root/Menu")]
    );
}

#[test]
fn tree_trigger_drops_pending_returns() {
    let fx = Fixture::new();
    let mut session = fx.session();
    session.handle(&text(1, "/start")).unwrap();
    session.handle(&text(2, "away")).unwrap();
    assert_eq!(session.navigation().caller_trees(), vec![fx.id("Root")]);

    let outcome = session.handle(&press(3, "other")).unwrap();
    assert!(matches!(outcome, Outcome::Entered { tree, .. } if tree == fx.id("Other")));
    assert!(session.navigation().callers.is_empty());
}

#[test]
fn chained_resolution_matches_stepwise_resolution() {
    fn addresses(actions: &[&Action]) -> Vec<*const Action> {
        actions.iter().map(|action| *action as *const Action).collect()
    }

    let fx = Fixture::new();
    let resolver = Resolver::new(&fx.graph, 8);
    for (from, via) in [("Root/Menu/Settings", "Root/Tolerant"), ("Root", "Root/Away")] {
        let (from, via) = (fx.id(from), fx.id(via));
        let chained = resolver.resolve_to(&Navigation::at(from), via).expect("resolve");

        let first = resolver.jump(Some(from), via, None);
        let automatic = fx.graph.node(via).transition.as_ref().expect("automatic transition");
        let second = resolver
            .follow(&Navigation::at(via), automatic)
            .expect("resolve")
            .expect("target is reachable");

        assert_eq!(chained.final_target(), second.final_target());
        let mut stepwise = addresses(&first.actions);
        stepwise.extend(addresses(&second.all_actions()));
        assert_eq!(addresses(&chained.all_actions()), stepwise);
    }
}

#[test]
fn callback_triggers_tree() {
    let fx = Fixture::new();
    let mut session = fx.session();
    let outcome = session.handle(&press(1, "other")).unwrap();
    assert!(matches!(outcome, Outcome::Entered { tree, .. } if tree == fx.id("Other")));
}

#[test]
fn false_execute_guard_cancels_the_move() {
    let fx = Fixture::new();
    let mut session = fx.session();
    session.handle(&text(1, "/start")).unwrap();
    fx.journal.take();

    let outcome = session.handle(&text(2, "stay")).unwrap();
    assert_eq!(
        outcome,
        Outcome::Cancelled {
            at: Some(fx.id("Root"))
        }
    );
    assert_eq!(session.current_path(), Some("Root"));
    assert!(fx.journal.take().is_empty());
}

#[test]
fn failed_action_keeps_session_in_place() {
    let fx = Fixture::new();
    let mut session = fx.session();
    session.handle(&text(1, "/start")).unwrap();

    let err = session.handle(&text(2, "broken")).unwrap_err();
    match err {
        FlowError::Action { node, action, .. } => {
            assert_eq!(node, "Root/Broken");
            assert_eq!(action, "fail");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(session.current_path(), Some("Root"));

    session.handle(&text(3, "menu")).unwrap();
    assert_eq!(session.current_path(), Some("Root/Menu"));
}

#[test]
fn ignore_error_continues_navigation() {
    let fx = Fixture::new();
    let mut session = fx.session();
    session.handle(&text(1, "/start")).unwrap();

    // Broken's failing entry action is logged and skipped.
    session.handle(&text(2, "tolerant")).unwrap();
    assert_eq!(session.current_path(), Some("Root/Broken"));
}

#[test]
fn failed_move_keeps_the_handler_of_the_left_tree() {
    let fx = Fixture::new();
    let mut session = fx.session();
    let root = fx.id("Root");
    for (id, body) in [(1, "/start"), (2, "count"), (3, "count")] {
        session.handle(&text(id, body)).unwrap();
    }
    assert_eq!(session.variables().get("visits"), Some(&Value::Int(2)));

    let err = session.handle(&text(4, "leave")).unwrap_err();
    assert!(matches!(err, FlowError::Action { ref node, .. } if node == "Fragile"));
    assert_eq!(session.current_path(), Some("Root/Count"));
    assert!(session.has_handler(root));
    assert!(!session.has_handler(fx.id("Fragile")));

    session.handle(&text(5, "count")).unwrap();
    assert_eq!(session.variables().get("visits"), Some(&Value::Int(3)));
}

#[test]
fn guarded_branch_uses_handler_and_invoke() {
    let fx = Fixture::new();
    let mut session = fx.session();
    session.handle(&text(1, "/start")).unwrap();

    let outcome = session.handle(&text(2, "hello")).unwrap();
    assert!(matches!(outcome, Outcome::Branched { branch, .. } if branch == fx.id("Root/Greeting")));
    assert_eq!(session.variables().get("greeted"), Some(&Value::from("Ada")));
}

#[test]
fn default_branch_runs_when_nothing_matches() {
    let fx = Fixture::new();
    let mut session = fx.session();
    session.handle(&text(1, "/start")).unwrap();
    fx.journal.take();

    let fallback = fx.id("Root/RootDefault");
    let outcome = session.handle(&text(2, "unknown")).unwrap();
    assert!(matches!(outcome, Outcome::Defaulted { branch, .. } if branch == fallback));
    assert_eq!(fx.journal.take(), vec![fallback]);

    // Menu declares no default, so unmatched input is dropped there.
    session.handle(&text(3, "menu")).unwrap();
    assert_eq!(session.handle(&text(4, "unknown")).unwrap(), Outcome::Ignored);
    assert_eq!(session.current_path(), Some("Root/Menu"));
}

#[test]
fn events_before_any_tree_are_ignored() {
    let fx = Fixture::new();
    let mut session = fx.session();
    assert_eq!(session.handle(&text(1, "menu")).unwrap(), Outcome::Ignored);
    assert_eq!(session.current(), None);
}
