//! Builds a [`FlowGraph`] from a document.
//!
//! Loading runs in two passes. The first inserts every tree and branch so
//! that names are known; the second compiles expressions, binds actions and
//! resolves transition targets. Roles and automatic transition cycles are
//! checked last.

use tracing::debug;

use super::access::Role;
use super::action::{Action, ActionKind, ActionRegistry};
use super::node::{BranchSpec, FlowGraph, FlowNode, NodeId, NodeKind, TreeSpec, Triggers};
use super::transition::{
    EditSource, EditTarget, ExecutionOptions, Transition, TransitionKind, TransitionSite, check_cycles,
};
use crate::config::FlowConfig;
use crate::document::{Document, Sexpr, read_document};
use crate::error::{ConfigurationError, LoadError, LoadResult};
use crate::expr::{Compiler, Expression, Namespace, Scope, ValueType};

/// Read and load a flow document.
pub fn load(
    source: &str,
    namespace: &Namespace,
    actions: &ActionRegistry,
    config: &FlowConfig,
) -> LoadResult<FlowGraph> {
    let document = read_document(source)?;
    load_document(&document, namespace, actions, config)
}

/// Load an already parsed document.
pub fn load_document(
    document: &Document,
    namespace: &Namespace,
    actions: &ActionRegistry,
    config: &FlowConfig,
) -> LoadResult<FlowGraph> {
    let mut loader = Loader {
        namespace,
        actions,
        config,
        compiler: Compiler::new(namespace),
        graph: FlowGraph::new(),
    };
    let mut roles = Vec::new();
    let mut pending = Vec::new();

    for form in &document.forms {
        match form {
            Sexpr::List(items) if matches_symbol(items.first(), "roles") => {
                for role in &items[1..] {
                    roles.push(parse_role(role)?);
                }
            }
            Sexpr::List(items) if matches_symbol(items.first(), "tree") => {
                loader.declare(items, None, false, &mut pending)?;
            }
            other => {
                return Err(LoadError::Syntax(format!(
                    "expected (roles ...) or (tree ...), found {}",
                    other
                )));
            }
        }
    }

    if loader.graph.trees().is_empty() {
        return Err(ConfigurationError::NoTrees.into());
    }

    for (id, form) in pending {
        loader.populate(id, form)?;
    }

    for role in roles {
        let grant = role.resolve(&loader.graph)?;
        loader.graph.add_role(grant)?;
    }

    check_cycles(&loader.graph)?;

    debug!(
        trees = loader.graph.trees().len(),
        nodes = loader.graph.len(),
        cache_slots = loader.compiler.slots_allocated(),
        "flow loaded"
    );
    Ok(loader.graph)
}

/// Attributes and nested forms of a node, split but not yet interpreted.
struct Form<'d> {
    attrs: Vec<(&'d str, &'d Sexpr)>,
    body: Vec<&'d [Sexpr]>,
}

struct Loader<'n> {
    namespace: &'n Namespace,
    actions: &'n ActionRegistry,
    config: &'n FlowConfig,
    compiler: Compiler<'n>,
    graph: FlowGraph,
}

impl<'n> Loader<'n> {
    /// Insert the node described by `items` and, recursively, its branches.
    fn declare<'d>(
        &mut self,
        items: &'d [Sexpr],
        parent: Option<NodeId>,
        default: bool,
        pending: &mut Vec<(NodeId, Form<'d>)>,
    ) -> LoadResult<NodeId> {
        let scope = parent.map_or_else(|| "<document>".to_string(), |id| self.graph.node(id).path.clone());
        let (name, rest) = match (items.get(1).and_then(name_of), parent) {
            (Some(name), _) => (name, &items[2..]),
            // Unnamed defaults are named after their parent to stay unique in the tree.
            (None, Some(parent)) if default => {
                (format!("{}Default", self.graph.node(parent).name), &items[1..])
            }
            (None, _) => {
                return Err(ConfigurationError::MissingAttribute {
                    node: scope,
                    attribute: "name".into(),
                }
                .into());
            }
        };
        let path = match parent {
            Some(_) => format!("{}/{}", scope, name),
            None => name.clone(),
        };
        let form = split_form(&path, rest)?;

        let id = match parent {
            None => {
                let handler = form
                    .attrs
                    .iter()
                    .find(|(key, _)| *key == "handler")
                    .map(|(key, value)| expect_string(&path, key, value))
                    .transpose()?;
                if let Some(handler) = &handler {
                    if !self.namespace.has_handler(handler) {
                        return Err(ConfigurationError::UnknownHandler {
                            node: path,
                            handler: handler.clone(),
                        }
                        .into());
                    }
                }
                let spec = TreeSpec {
                    handler,
                    ..TreeSpec::default()
                };
                self.graph.insert(FlowNode::tree(name, spec), None)?
            }
            Some(parent) if default => self
                .graph
                .insert_default(FlowNode::branch(name, BranchSpec::default()), parent)?,
            Some(parent) => self
                .graph
                .insert(FlowNode::branch(name, BranchSpec::default()), Some(parent))?,
        };

        for child in form.body.iter().copied() {
            if matches_symbol(child.first(), "branch") {
                self.declare(child, Some(id), false, pending)?;
            } else if matches_symbol(child.first(), "default") {
                self.declare(child, Some(id), true, pending)?;
            }
        }
        pending.push((id, form));
        Ok(id)
    }

    /// Interpret attributes and nested forms of an inserted node.
    fn populate(&mut self, id: NodeId, form: Form<'_>) -> LoadResult<()> {
        let node = self.graph.node(id);
        let path = node.path.clone();
        let tree = node.tree;
        let is_tree = node.is_tree();
        let is_default = node
            .parent
            .is_some_and(|parent| self.graph.node(parent).default == Some(id));
        let has_children = !node.children.is_empty();
        let owner = self.graph.node(tree).handler().map(str::to_string);
        let scope = match &owner {
            Some(owner) => Scope::handler(owner),
            None => Scope::global(),
        };

        let mut triggers = Triggers::default();
        let mut predicate = None;
        let mut access_level = None;
        let mut when = None;
        let mut actions = Vec::new();

        for (key, value) in &form.attrs {
            match (*key, is_tree) {
                ("handler", true) => {}
                ("commands", true) => triggers.commands = expect_strings(&path, key, value)?,
                ("keys", _) => triggers.keys = expect_strings(&path, key, value)?,
                ("callbacks", _) => triggers.callbacks = expect_strings(&path, key, value)?,
                ("predicate", true) => {
                    // Predicates run before any handler exists.
                    predicate = Some(self.expression(&path, key, value, ValueType::Bool, &Scope::global())?);
                }
                ("access-level", true) => access_level = Some(expect_level(&path, key, value)?),
                ("when", false) => {
                    when = Some(self.expression(&path, key, value, ValueType::Bool, &scope)?);
                }
                ("invoke", false) => {
                    let expr = self.expression(&path, key, value, ValueType::Unit, &scope)?;
                    actions.push(Action {
                        kind: ActionKind::Invoke(expr),
                        when: None,
                        node: id,
                        tree,
                    });
                }
                (key, _) => return Err(invalid(&path, key, "unknown attribute")),
            }
        }

        let mut exit_actions = Vec::new();
        let mut reentry_actions = Vec::new();
        let mut transition = None;
        for items in &form.body {
            let head = match items.first() {
                Some(Sexpr::Symbol(head)) => head.as_str(),
                _ => return Err(invalid(&path, "form", "nested forms must start with a symbol")),
            };
            match head {
                "branch" | "default" => {}
                "actions" => actions.extend(self.actions(id, tree, &path, &items[1..], &scope)?),
                "on-exit" => exit_actions.extend(self.actions(id, tree, &path, &items[1..], &scope)?),
                "on-reenter" => {
                    reentry_actions.extend(self.actions(id, tree, &path, &items[1..], &scope)?)
                }
                "transition" => {
                    if transition.is_some() {
                        return Err(invalid(&path, "transition", "only one transition is allowed"));
                    }
                    transition = Some(self.transition(id, id, &path, &items[1..], &scope, 0)?);
                }
                other => return Err(invalid(&path, other, "unknown form")),
            }
        }

        if transition.is_some() && has_children && !is_tree {
            return Err(invalid(
                &path,
                "transition",
                "a branch with child branches cannot declare a transition",
            ));
        }

        let node = self.graph.node_mut(id);
        match &mut node.kind {
            NodeKind::Tree(spec) => {
                spec.triggers = triggers;
                spec.predicate = predicate;
                spec.access_level = access_level;
            }
            NodeKind::Branch(spec) => {
                spec.triggers = triggers;
                spec.when = when;
                if !is_default && !spec.is_reachable() {
                    return Err(ConfigurationError::UnreachableBranch { node: path }.into());
                }
            }
        }
        node.actions = actions;
        node.exit_actions = exit_actions;
        node.reentry_actions = reentry_actions;
        node.transition = transition;
        Ok(())
    }

    fn actions(
        &mut self,
        node: NodeId,
        tree: NodeId,
        path: &str,
        items: &[Sexpr],
        scope: &Scope<'_>,
    ) -> LoadResult<Vec<Action>> {
        items
            .iter()
            .map(|item| self.action(node, tree, path, item, scope))
            .collect()
    }

    fn action(
        &mut self,
        node: NodeId,
        tree: NodeId,
        path: &str,
        item: &Sexpr,
        scope: &Scope<'_>,
    ) -> LoadResult<Action> {
        let list = item
            .as_list()
            .ok_or_else(|| invalid(path, "actions", format!("expected an action form, found {}", item)))?;
        let head = match list.first() {
            Some(Sexpr::Symbol(head)) => head.as_str(),
            _ => return Err(invalid(path, "actions", "action forms must start with a symbol")),
        };
        let (argument, rest) = match list[1..].split_first() {
            Some((first, tail)) if !matches!(first, Sexpr::Keyword(_)) => (Some(first), tail),
            _ => (None, &list[1..]),
        };

        let mut when = None;
        for (key, value) in split_form(path, rest)?.attrs {
            match key {
                "when" => when = Some(self.expression(path, key, value, ValueType::Bool, scope)?),
                other => return Err(invalid(path, other, "unknown action attribute")),
            }
        }

        let kind = match (head, argument) {
            ("invoke", Some(raw)) => {
                ActionKind::Invoke(self.expression(path, "invoke", raw, ValueType::Unit, scope)?)
            }
            ("call", Some(name)) => {
                let name = expect_string(path, "call", name)?;
                let invocable = self.actions.get(&name).ok_or_else(|| ConfigurationError::UnknownAction {
                    node: path.to_string(),
                    action: name.clone(),
                })?;
                ActionKind::Call { name, invocable }
            }
            ("clear-cache", None) => ActionKind::ClearCache,
            ("invoke" | "call", None) => {
                return Err(ConfigurationError::MissingAttribute {
                    node: path.to_string(),
                    attribute: head.to_string(),
                }
                .into());
            }
            _ => return Err(invalid(path, head, "unknown action")),
        };
        Ok(Action {
            kind,
            when,
            node,
            tree,
        })
    }

    /// Parse a transition declared on `declaring` and fired from `from`.
    fn transition(
        &mut self,
        declaring: NodeId,
        from: NodeId,
        path: &str,
        items: &[Sexpr],
        scope: &Scope<'_>,
        depth: usize,
    ) -> LoadResult<Transition> {
        let form = split_form(path, items)?;
        let mut kind = TransitionKind::Jump;
        let mut target_name = None;
        let mut options = ExecutionOptions {
            ignore_error: self.config.default_ignore_error,
            ..ExecutionOptions::default()
        };

        for (key, value) in &form.attrs {
            match *key {
                "type" => {
                    let raw = expect_string(path, key, value)?;
                    kind = TransitionKind::parse(&raw)
                        .ok_or_else(|| invalid(path, key, format!("unknown transition type '{}'", raw)))?;
                }
                "target" => target_name = Some(expect_string(path, key, value)?),
                "execute" => {
                    options.execute = Some(self.expression(path, key, value, ValueType::Bool, scope)?)
                }
                "edit" => {
                    let raw = expect_string(path, key, value)?;
                    options.edit = Some(match raw.as_str() {
                        "first" => EditTarget::First,
                        _ => EditTarget::Named(raw),
                    });
                }
                "edit-source" => {
                    options.edit_source = Some(match expect_string(path, key, value)?.as_str() {
                        "last" => EditSource::Last,
                        "callback" => EditSource::Callback,
                        other => {
                            return Err(invalid(path, key, format!("expected last or callback, found '{}'", other)));
                        }
                    });
                }
                "ignore-error" => match value {
                    Sexpr::Boolean(flag) => options.ignore_error = *flag,
                    other => return Err(invalid(path, key, format!("expected true or false, found {}", other))),
                },
                other => return Err(invalid(path, other, "unknown transition attribute")),
            }
        }

        if options.edit_source.is_some() && options.edit.is_none() {
            return Err(invalid(path, "edit-source", "'edit' must be set as well"));
        }

        let target = match (kind, target_name) {
            (TransitionKind::Caller, Some(_)) => {
                return Err(invalid(path, "target", "caller transitions take no target"));
            }
            (TransitionKind::Jump, None) => {
                return Err(ConfigurationError::MissingAttribute {
                    node: path.to_string(),
                    attribute: "target".into(),
                }
                .into());
            }
            (TransitionKind::Caller | TransitionKind::Back, None) => None,
            (kind, Some(name)) => {
                let id = self.graph.lookup(Some(from), &name).ok_or_else(|| {
                    ConfigurationError::UnknownTarget {
                        node: path.to_string(),
                        target: name.clone(),
                    }
                })?;
                if kind == TransitionKind::Back && !self.graph.is_ancestor(id, from) {
                    return Err(invalid(
                        path,
                        "target",
                        format!("'{}' is not an ancestor of {}", name, self.graph.node(from).path),
                    ));
                }
                Some(id)
            }
        };
        if kind == TransitionKind::Back && target.is_none() && self.graph.node(from).parent.is_none() {
            return Err(invalid(path, "type", "back from a tree needs a target"));
        }

        let mut transition = Transition::new(kind, target);
        transition.options = options;
        transition.site = Some(TransitionSite {
            node: declaring,
            depth,
        });
        let tree = self.graph.node(declaring).tree;
        let leaves_tree = kind == TransitionKind::Jump
            && target.is_some_and(|target| self.graph.node(target).tree != tree);
        for items in &form.body {
            match items.first() {
                Some(Sexpr::Symbol(head)) if head == "actions" => {
                    let actions = self.actions(declaring, tree, path, &items[1..], scope)?;
                    transition.actions.extend(actions);
                }
                Some(Sexpr::Symbol(head)) if head == "transition" => {
                    if transition.next.is_some() {
                        return Err(invalid(path, "transition", "only one follow-up transition is allowed"));
                    }
                    if !leaves_tree {
                        return Err(invalid(
                            path,
                            "transition",
                            "only a jump into another tree can carry a follow-up transition",
                        ));
                    }
                    // Fired from the declaring tree once the jump returns.
                    let next = self.transition(declaring, tree, path, &items[1..], scope, depth + 1)?;
                    transition.next = Some(Box::new(next));
                }
                _ => return Err(invalid(path, "transition", "expected (actions ...) or (transition ...)")),
            }
        }
        Ok(transition)
    }

    fn expression(
        &mut self,
        path: &str,
        attribute: &str,
        value: &Sexpr,
        expected: ValueType,
        scope: &Scope<'_>,
    ) -> LoadResult<Expression> {
        if let (Sexpr::Boolean(flag), ValueType::Bool) = (value, expected) {
            return Ok(Expression::literal(*flag, expected));
        }
        let raw = expect_string(path, attribute, value)?;
        self.compiler
            .compile_str(&raw, expected, scope)
            .map_err(|source| LoadError::Expression {
                node: path.to_string(),
                attribute: attribute.to_string(),
                source,
            })
    }
}

fn parse_role(expr: &Sexpr) -> LoadResult<Role> {
    let list = match expr {
        Sexpr::List(list) if matches_symbol(list.first(), "role") => list,
        other => return Err(LoadError::Syntax(format!("expected (role ...), found {}", other))),
    };
    let name = list.get(1).and_then(name_of).ok_or_else(|| ConfigurationError::MalformedRole {
        role: "<unnamed>".into(),
        reason: "role requires a name".into(),
    })?;
    let path = format!("roles/{}", name);
    let mut role = Role {
        name,
        ..Role::default()
    };
    for (key, value) in split_form(&path, &list[2..])?.attrs {
        match key {
            "level" => role.level = Some(expect_level(&path, key, value)?),
            "trees" => role.trees = Some(expect_strings(&path, key, value)?),
            "on-denied" => role.on_denied = Some(expect_string(&path, key, value)?),
            other => return Err(invalid(&path, other, "unknown role attribute")),
        }
    }
    role.validate()?;
    Ok(role)
}

fn split_form<'d>(path: &str, items: &'d [Sexpr]) -> LoadResult<Form<'d>> {
    let mut form = Form {
        attrs: Vec::new(),
        body: Vec::new(),
    };
    let mut iter = items.iter();
    while let Some(item) = iter.next() {
        match item {
            Sexpr::Keyword(key) => match iter.next() {
                Some(Sexpr::Keyword(_)) | None => {
                    return Err(invalid(path, key, "attribute is missing its value"));
                }
                Some(value) => form.attrs.push((key.as_str(), value)),
            },
            Sexpr::List(list) => form.body.push(list),
            other => return Err(invalid(path, "form", format!("unexpected {}", other))),
        }
    }
    Ok(form)
}

fn matches_symbol(expr: Option<&Sexpr>, expected: &str) -> bool {
    if let Some(Sexpr::Symbol(sym)) = expr {
        sym == expected
    } else {
        false
    }
}

fn name_of(expr: &Sexpr) -> Option<String> {
    match expr {
        Sexpr::Symbol(name) | Sexpr::String(name) => Some(name.clone()),
        _ => None,
    }
}

fn expect_string(path: &str, attribute: &str, expr: &Sexpr) -> LoadResult<String> {
    match expr {
        Sexpr::String(s) | Sexpr::Symbol(s) => Ok(s.clone()),
        other => Err(invalid(path, attribute, format!("expected string, found {}", other))),
    }
}

fn expect_strings(path: &str, attribute: &str, expr: &Sexpr) -> LoadResult<Vec<String>> {
    match expr {
        Sexpr::List(items) => items
            .iter()
            .map(|item| expect_string(path, attribute, item))
            .collect(),
        single => Ok(vec![expect_string(path, attribute, single)?]),
    }
}

fn expect_level(path: &str, attribute: &str, expr: &Sexpr) -> LoadResult<u32> {
    match expr {
        Sexpr::Integer(level) => u32::try_from(*level)
            .map_err(|_| invalid(path, attribute, format!("level {} is out of range", level))),
        other => Err(invalid(path, attribute, format!("expected integer, found {}", other))),
    }
}

fn invalid(path: &str, attribute: &str, reason: impl Into<String>) -> LoadError {
    ConfigurationError::InvalidAttribute {
        node: path.to_string(),
        attribute: attribute.to_string(),
        reason: reason.into(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseErrorCode;
    use crate::expr::{Member, RuntimeContext, Value};

    struct Profile {
        name: String,
    }

    fn namespace() -> Namespace {
        let mut ns = Namespace::with_builtins();
        ns.handler_with("Profile", || Profile { name: "Ada".into() });
        ns.register(
            Member::method::<Profile, _>("Profile", "getName", |profile, _, _| {
                Ok(Value::from(profile.name.clone()))
            })
            .returns(ValueType::Str),
        );
        ns
    }

    fn registry() -> ActionRegistry {
        let mut actions = ActionRegistry::new();
        actions.register("send", |_: &mut RuntimeContext<'_>| -> anyhow::Result<()> { Ok(()) });
        actions
    }

    fn try_load(src: &str) -> LoadResult<FlowGraph> {
        load(src, &namespace(), &registry(), &FlowConfig::default())
    }

    #[test]
    fn loads_trees_branches_and_transitions() {
        let graph = try_load(
            r##"
            (tree Main :handler "Profile" :commands ("start")
              (actions (invoke "#getName()") (call "send"))
              (branch Settings :keys ("Settings")
                (transition :type jump :target "Other" :ignore-error false))
              (default (actions (clear-cache))))
            (tree Other :access-level 10)
            "##,
        )
        .expect("load");

        let main = graph.tree_named("Main").unwrap();
        let other = graph.tree_named("Other").unwrap();
        let settings = graph.lookup(Some(main), "Settings").unwrap();
        assert_eq!(graph.node(main).actions.len(), 2);
        assert_eq!(graph.node(other).access_level(), 10);
        let transition = graph.node(settings).transition.as_ref().unwrap();
        assert_eq!(transition.target, Some(other));
        assert!(!transition.options.ignore_error);
        let fallback = graph.node(main).default.unwrap();
        assert_eq!(graph.node(fallback).path, "Main/MainDefault");
    }

    #[test]
    fn unknown_target_names_the_node() {
        let err = try_load(
            r#"(tree Main (branch A :keys ("a") (transition :target "Nowhere")))"#,
        )
        .unwrap_err();
        match err {
            LoadError::Configuration(ConfigurationError::UnknownTarget { node, target }) => {
                assert_eq!(node, "Main/A");
                assert_eq!(target, "Nowhere");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn expression_errors_carry_position() {
        let err = try_load(r##"(tree Main (branch A :when "#text() == "))"##).unwrap_err();
        match err {
            LoadError::Expression { node, attribute, source } => {
                assert_eq!(node, "Main/A");
                assert_eq!(attribute, "when");
                assert_eq!(source.code, ParseErrorCode::UnexpectedEnd);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn predicates_cannot_see_handler_members() {
        let err = try_load(r##"(tree Main :handler "Profile" :predicate "#getName() == \"x\"")"##)
            .unwrap_err();
        assert!(matches!(
            err,
            LoadError::Expression {
                source: crate::error::ParseError {
                    code: ParseErrorCode::UnknownReference { .. },
                    ..
                },
                ..
            }
        ));
    }

    #[test]
    fn validation_failures() {
        let cases = [
            ("", "no trees"),
            (r#"(tree Main :handler "Nope")"#, "unknown handler"),
            (r#"(tree Main (actions (call "missing")))"#, "unknown action"),
            (r#"(tree Main (branch A))"#, "unreachable"),
            (
                r#"(tree Main (branch A :keys ("a") (branch B :keys ("b")) (transition :target "Main")))"#,
                "transition with children",
            ),
            (
                r#"(tree Main (branch A :keys ("a") (transition :target "Main" :edit-source "last")))"#,
                "edit-source without edit",
            ),
            (
                r#"(tree Main (branch A :keys ("a")) (branch B :keys ("b") (transition :type back :target "A")))"#,
                "back to a non-ancestor",
            ),
            (r#"(tree Main :colour "red")"#, "unknown attribute"),
            (r#"(roles (role admin)) (tree Main)"#, "role without grant"),
            (
                r#"(tree Main (branch A :keys ("a") (transition :target "Main" (transition :target "Main"))))"#,
                "follow-up on a jump within the tree",
            ),
        ];
        for (src, label) in cases {
            assert!(try_load(src).is_err(), "{label} should fail");
        }
    }

    #[test]
    fn rejects_cyclic_automatic_transitions() {
        let err = try_load(
            r#"
            (tree A (transition :target "B"))
            (tree B (transition :target "A"))
            "#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LoadError::Configuration(ConfigurationError::CyclicTransition { .. })
        ));
    }

    #[test]
    fn back_from_a_tree_needs_a_target() {
        let err = try_load(r#"(tree Main :commands ("start") (transition :type back))"#).unwrap_err();
        match err {
            LoadError::Configuration(ConfigurationError::InvalidAttribute { node, attribute, .. }) => {
                assert_eq!(node, "Main");
                assert_eq!(attribute, "type");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn follow_up_of_a_jump_is_kept_for_the_return() {
        let graph = try_load(
            r#"
            (tree Main :commands ("start")
              (branch A :keys ("a")
                (transition :target "Side" (transition :target "B")))
              (branch B :keys ("b")))
            (tree Side)
            "#,
        )
        .expect("load");
        let a = graph.lookup(None, "Main/A").unwrap();
        let jump = graph.node(a).transition.as_ref().unwrap();
        let follow_up = jump.next.as_deref().expect("follow-up");
        assert_eq!(follow_up.target, graph.lookup(None, "Main/B"));
        assert_eq!(follow_up.site, Some(TransitionSite { node: a, depth: 1 }));
        assert!(std::ptr::eq(
            graph.transition_at(TransitionSite { node: a, depth: 1 }).unwrap(),
            follow_up
        ));
    }

    #[test]
    fn roles_are_resolved() {
        let graph = try_load(
            r#"
            (roles (role admin :level 100)
                   (role user :trees ("Main") :on-denied "Main"))
            (tree Main)
            (tree Admin :access-level 100)
            "#,
        )
        .expect("load");
        let main = graph.tree_named("Main").unwrap();
        let user = graph.role("user").unwrap();
        assert_eq!(user.trees.as_deref(), Some(&[main][..]));
        assert_eq!(user.on_denied, Some(main));
        assert_eq!(graph.role("admin").unwrap().level, Some(100));
    }
}
