//! Client configuration
//!
//! Connection settings come from the environment; scripted chat text comes
//! from an optional JSON file so it can change without touching control flow.

use crate::state_machine::{Identity, SessionId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_ENGINE_URL: &str = "http://localhost:8000";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const SESSION_ID_PLACEHOLDER: &str = "{session_id}";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} is not a valid number of seconds: {value}")]
    InvalidTimeout { var: &'static str, value: String },
    #[error("Failed to read chat script {path}: {source}")]
    ScriptRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse chat script {path}: {source}")]
    ScriptParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Scripted text and presentation defaults consumed by the state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatScript {
    /// First bot message after a successful bootstrap
    pub greeting: String,
    /// Announcement template; `{session_id}` is substituted
    pub session_announcement: String,
    /// Prepended to the engine's final text when the chat completes
    pub closing_prefix: String,
    /// Shown in place of the input once the chat has ended
    pub farewell: String,
    /// Title used while no topic is set
    pub default_title: String,
    /// Directory holding one `<topic>.jpg` background per topic
    pub background_dir: String,
    /// Background name used while no topic is set
    pub default_background: String,
}

impl Default for ChatScript {
    fn default() -> Self {
        Self {
            greeting: "Session started. How can I assist you today?".to_string(),
            session_announcement: format!("Your session ID is {SESSION_ID_PLACEHOLDER}"),
            closing_prefix: "Chat ended. ".to_string(),
            farewell: "The chat has ended. Thank you for chatting with us!".to_string(),
            default_title: "Chatbot".to_string(),
            background_dir: "/bgs".to_string(),
            default_background: "default".to_string(),
        }
    }
}

impl ChatScript {
    /// Load a script from a JSON file. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ScriptRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::ScriptParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn session_announcement(&self, session_id: &SessionId) -> String {
        self.session_announcement
            .replace(SESSION_ID_PLACEHOLDER, session_id.as_str())
    }

    pub fn title_for<'a>(&'a self, topic: &'a str) -> &'a str {
        if topic.is_empty() {
            &self.default_title
        } else {
            topic
        }
    }

    pub fn background_for(&self, topic: &str) -> String {
        let name = if topic.is_empty() {
            self.default_background.as_str()
        } else {
            topic
        };
        format!("{}/{name}.jpg", self.background_dir.trim_end_matches('/'))
    }
}

/// Configuration for the dialogue client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the dialogue engine (session start/turn)
    pub engine_url: String,
    /// Base URL of the entity lookup service
    pub entity_url: String,
    pub request_timeout: Duration,
    pub user_id: Option<String>,
    pub token: Option<String>,
    pub script: ChatScript,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            engine_url: DEFAULT_ENGINE_URL.to_string(),
            entity_url: DEFAULT_ENGINE_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_id: None,
            token: None,
            script: ChatScript::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let engine_url = get("DIALOGUE_ENGINE_URL").unwrap_or_else(|| DEFAULT_ENGINE_URL.to_string());
        let entity_url = get("DIALOGUE_ENTITY_URL").unwrap_or_else(|| engine_url.clone());

        let request_timeout = match get("DIALOGUE_TIMEOUT_SECS") {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::InvalidTimeout {
                    var: "DIALOGUE_TIMEOUT_SECS",
                    value,
                })?,
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let script = match get("DIALOGUE_SCRIPT") {
            Some(path) => ChatScript::load(Path::new(&path))?,
            None => ChatScript::default(),
        };

        Ok(Self {
            engine_url,
            entity_url,
            request_timeout,
            user_id: get("DIALOGUE_USER_ID").filter(|id| !id.is_empty()),
            token: get("DIALOGUE_TOKEN").filter(|t| !t.is_empty()),
            script,
        })
    }

    /// Identity configured for this process, if any
    pub fn identity(&self) -> Option<Identity> {
        let identity = Identity::new(self.user_id.clone()?);
        Some(match &self.token {
            Some(token) => identity.with_token(token.clone()),
            None => identity,
        })
    }
}
