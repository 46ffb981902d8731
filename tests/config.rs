//! Configuration file tests

use grove::flow::{ActionRegistry, Event, Outcome, Payload, Session, UserId};
use grove::{FlowConfig, Namespace};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn write(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("grove.json");
    fs::write(&path, body).expect("write config");
    path
}

#[test]
fn partial_file_keeps_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, r#"{ "command_prefix": "!", "bot_username": "grovebot" }"#);
    let config = FlowConfig::load(&path).expect("load");
    assert_eq!(config.command_prefix, "!");
    assert_eq!(config.bot_username.as_deref(), Some("grovebot"));
    assert_eq!(config.max_transition_chain, FlowConfig::default().max_transition_chain);
    assert!(config.default_ignore_error);
}

#[test]
fn missing_file_names_the_path() {
    let dir = TempDir::new().unwrap();
    let err = FlowConfig::load(dir.path().join("absent.json")).unwrap_err();
    assert!(err.to_string().contains("absent.json"));
}

#[test]
fn malformed_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, r#"{ "guest_level": "high" }"#);
    let err = FlowConfig::load(&path).unwrap_err();
    assert!(err.to_string().contains("failed to parse config"));
}

#[test]
fn empty_prefix_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, r#"{ "command_prefix": "" }"#);
    assert!(FlowConfig::load(&path).is_err());
}

#[test]
fn prefix_and_bot_name_drive_command_matching() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, r#"{ "command_prefix": "!", "bot_username": "grovebot" }"#);
    let config = FlowConfig::load(&path).unwrap();

    let namespace = Namespace::with_builtins();
    let graph = grove::flow::load(
        r#"(tree Main :commands ("start"))"#,
        &namespace,
        &ActionRegistry::new(),
        &config,
    )
    .unwrap();
    let mut session = Session::new(Arc::new(graph), Arc::new(namespace), Arc::new(config));
    let say = |id: u64, body: &str| Event::new(id, UserId(1), Payload::text(body));

    assert_eq!(session.handle(&say(1, "/start")).unwrap(), Outcome::Ignored);
    assert_eq!(session.handle(&say(2, "!start@otherbot")).unwrap(), Outcome::Ignored);
    assert!(matches!(
        session.handle(&say(3, "!start@grovebot")).unwrap(),
        Outcome::Entered { .. }
    ));
    assert!(matches!(
        session.handle(&say(4, "!start")).unwrap(),
        Outcome::Entered { .. }
    ));
}
