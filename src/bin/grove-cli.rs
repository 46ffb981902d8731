//! Grove CLI - inspect expressions and flow documents
//!
//! Documents are checked against the built-in members only; handlers and
//! invocables registered by an application are unknown here.

use anyhow::Context;
use clap::{Parser, Subcommand};
use grove::expr::{Compiler, Namespace, Scope, ValueType, tokenize};
use grove::flow::{ActionRegistry, Event, FlowGraph, Outcome, Payload, Session, UserId};
use grove::FlowConfig;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "grove")]
#[command(about = "Declarative conversational flow runtime", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the tokens of an expression
    Tokens {
        /// Raw expression text
        expression: String,

        /// Also compile it against the built-in members
        #[arg(long)]
        compile: bool,
    },

    /// Load a document and report the first error
    Check {
        /// Flow document
        file: PathBuf,
    },

    /// Print the tree and branch hierarchy of a document
    Outline {
        /// Flow document
        file: PathBuf,
    },

    /// Feed stdin lines to a session as text messages
    Replay {
        /// Flow document
        file: PathBuf,

        /// Role of the simulated user
        #[arg(long)]
        role: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => FlowConfig::load(path)?,
        None => FlowConfig::default(),
    };
    let namespace = Namespace::with_builtins();

    match cli.command {
        Commands::Tokens {
            expression,
            compile,
        } => {
            for token in tokenize(&expression)? {
                println!("{:>4}  {:?}", token.position, token.kind);
            }
            if compile {
                let compiled = Compiler::new(&namespace).compile_str(
                    &expression,
                    ValueType::Any,
                    &Scope::global(),
                )?;
                println!("type: {:?}", compiled.value_type());
            }
        }

        Commands::Check { file } => {
            let graph = load_file(&file, &namespace, &config)?;
            println!(
                "{}: {} trees, {} nodes",
                file.display(),
                graph.trees().len(),
                graph.len()
            );
        }

        Commands::Outline { file } => {
            let graph = load_file(&file, &namespace, &config)?;
            print!("{}", graph.outline());
        }

        Commands::Replay { file, role } => {
            let graph = Arc::new(load_file(&file, &namespace, &config)?);
            let mut session = Session::new(Arc::clone(&graph), Arc::new(namespace), Arc::new(config))
                .with_role(role);
            let stdin = std::io::stdin();
            for (update_id, line) in stdin.lock().lines().enumerate() {
                let line = line?;
                let event = Event::new(update_id as u64, UserId(1), Payload::text(line.trim()));
                match session.handle(&event) {
                    Ok(Outcome::Ignored) => println!("ignored"),
                    Ok(outcome) => println!(
                        "{:?} -> {}",
                        outcome,
                        session.current_path().unwrap_or("<none>")
                    ),
                    Err(err) => println!("error: {}", err),
                }
            }
        }
    }

    Ok(())
}

fn load_file(path: &PathBuf, namespace: &Namespace, config: &FlowConfig) -> anyhow::Result<FlowGraph> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let graph = grove::flow::load(&source, namespace, &ActionRegistry::new(), config)
        .with_context(|| format!("failed to load {}", path.display()))?;
    Ok(graph)
}
