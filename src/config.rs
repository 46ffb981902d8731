//! Runtime configuration.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration shared by every session of a loaded flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Maximum number of automatic transitions followed per event
    pub max_transition_chain: usize,

    /// `ignore-error` of transitions that do not set it
    pub default_ignore_error: bool,

    /// Access level granted to users without a known role
    pub guest_level: u32,

    /// Prefix marking a message as a command
    pub command_prefix: String,

    /// Bot name accepted after `@` in commands; any mention is rejected when unset
    pub bot_username: Option<String>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            max_transition_chain: 16,
            default_ignore_error: true,
            guest_level: 0,
            command_prefix: "/".to_string(),
            bot_username: None,
        }
    }
}

impl FlowConfig {
    /// Read a JSON configuration file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        if config.command_prefix.is_empty() {
            anyhow::bail!("command_prefix must not be empty");
        }
        Ok(config)
    }
}
