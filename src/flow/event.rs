//! Incoming updates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of the user an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the user sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    /// Plain text message, including commands.
    Text(String),
    /// Press of an inline button carrying callback data.
    Callback(String),
}

impl Payload {
    /// Text payload.
    pub fn text(text: impl Into<String>) -> Self {
        Payload::Text(text.into())
    }

    /// Callback payload.
    pub fn callback(data: impl Into<String>) -> Self {
        Payload::Callback(data.into())
    }
}

/// Incoming update handled by a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic update identifier; also the cache identity.
    pub update_id: u64,
    /// Sender.
    pub user: UserId,
    /// Content.
    pub payload: Payload,
}

impl Event {
    /// Construct an event.
    pub fn new(update_id: u64, user: UserId, payload: Payload) -> Self {
        Self {
            update_id,
            user,
            payload,
        }
    }

    /// Message text, if this is a text event.
    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text(text) => Some(text),
            Payload::Callback(_) => None,
        }
    }

    /// Callback data, if this is a button press.
    pub fn callback_data(&self) -> Option<&str> {
        match &self.payload {
            Payload::Callback(data) => Some(data),
            Payload::Text(_) => None,
        }
    }

    /// Command name when the text is `<prefix>name[@bot] [args]`.
    ///
    /// A `@bot` suffix must match `bot` when one is configured.
    pub fn command(&self, prefix: &str, bot: Option<&str>) -> Option<&str> {
        let word = self.text()?.split_whitespace().next()?;
        let body = word.strip_prefix(prefix)?;
        let name = match body.split_once('@') {
            Some((name, mention)) => {
                if bot.is_some_and(|bot| !mention.eq_ignore_ascii_case(bot)) {
                    return None;
                }
                name
            }
            None => body,
        };
        (!name.is_empty()).then_some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(raw: &str) -> Event {
        Event::new(1, UserId(1), Payload::text(raw))
    }

    #[test]
    fn parses_commands() {
        assert_eq!(text("/start").command("/", None), Some("start"));
        assert_eq!(text("/start payload").command("/", None), Some("start"));
        assert_eq!(text("/start@grove_bot").command("/", Some("grove_bot")), Some("start"));
        assert_eq!(text("/start@other_bot").command("/", Some("grove_bot")), None);
        assert_eq!(text("/start@other_bot").command("/", None), Some("start"));
    }

    #[test]
    fn rejects_non_commands() {
        assert_eq!(text("start").command("/", None), None);
        assert_eq!(text("/").command("/", None), None);
        assert_eq!(
            Event::new(1, UserId(1), Payload::callback("/start")).command("/", None),
            None
        );
    }
}
