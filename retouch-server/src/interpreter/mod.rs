//! Turns free-text commands into validated actions.
//!
//! A language model is tried first when one is configured; keyword parsing is always there
//! behind it. Whatever either one proposes goes through the same validator.
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use retouch::{fallback, Action};
use serde_json::Value;

use crate::config::LlmConfig;

mod llm;

pub use llm::{extract_json, LlmInterpreter};

/// Something that can propose a raw (unvalidated) JSON action for a command.
#[async_trait]
pub trait Interpreter: Send + Sync {
    async fn propose(&self, text: &str) -> Result<Value>;
}

/// Keyword and regex matching. Never fails and never touches the network.
pub struct KeywordInterpreter;

#[async_trait]
impl Interpreter for KeywordInterpreter {
    async fn propose(&self, text: &str) -> Result<Value> {
        Ok(fallback::propose(text))
    }
}

#[derive(Clone)]
pub struct CommandInterpreter {
    primary: Option<Arc<dyn Interpreter>>,
    fallback: Arc<dyn Interpreter>,
}

impl CommandInterpreter {
    /// Use the language model if the config carries a credential, keywords otherwise.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Ok(match LlmInterpreter::from_config(config)? {
            Some(llm) => Self::with_primary(Arc::new(llm)),
            None => Self::keyword_only(),
        })
    }

    pub fn keyword_only() -> Self {
        Self {
            primary: None,
            fallback: Arc::new(KeywordInterpreter),
        }
    }

    pub fn with_primary(primary: Arc<dyn Interpreter>) -> Self {
        Self {
            primary: Some(primary),
            ..Self::keyword_only()
        }
    }

    pub fn has_language_model(&self) -> bool {
        self.primary.is_some()
    }

    /// Interpret `text` as an action. Never fails: the worst case is `Action::Unknown`.
    ///
    /// A primary that errors, or whose proposal doesn't validate, is silently replaced
    /// by the keyword parser's answer. A well-formed `{"action": "unknown"}` counts as not
    /// validating, so keywords get a say whenever the model gives up.
    pub async fn interpret(&self, text: &str) -> Action {
        if let Some(primary) = &self.primary {
            match primary.propose(text).await {
                Ok(proposal) => {
                    let action = Action::from_proposal(&proposal);
                    if !action.is_unknown() {
                        return action;
                    }
                    tracing::warn!(%proposal, "Model proposal did not validate, using keywords");
                }
                Err(err) => {
                    tracing::warn!("Model interpretation failed, using keywords: {err:#}");
                }
            }
        }
        match self.fallback.propose(text).await {
            Ok(proposal) => Action::from_proposal(&proposal),
            Err(err) => {
                tracing::error!("Keyword interpretation failed: {err:#}");
                Action::Unknown
            }
        }
    }
}
