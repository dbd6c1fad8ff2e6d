use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use crate::prompt::Prompt;

/// Failures reported by a model backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("model call timed out")]
    Timeout,

    #[error("model backend rate limited: {0}")]
    RateLimited(String),

    #[error("model backend unavailable: {0}")]
    Unavailable(String),

    #[error("model backend rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The backend answered but carried no text.
    #[error("model returned an empty response")]
    EmptyResponse,

    /// The backend answered with an envelope that could not be decoded.
    #[error("model response invalid: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Whether the failure is the backend's fault rather than bad model output.
    pub fn is_backend_fault(&self) -> bool {
        !matches!(self, Self::EmptyResponse)
    }
}

/// Text-in, text-out access to a language model.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Complete `prompt` and return the raw model text.
    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError>;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "llm"
    }
}

/// One canned reaction of a [`ScriptedLlmProvider`].
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Error(LlmError),
    /// Sleep before producing the inner reply.
    Delayed(Duration, Box<ScriptedReply>),
}

impl ScriptedReply {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn delayed(self, delay: Duration) -> Self {
        Self::Delayed(delay, Box::new(self))
    }
}

/// Deterministic provider used for tests and offline development.
///
/// Replies are consumed in order; every received prompt is recorded. Once the
/// script runs out, the fallback reply (if any) is repeated, otherwise the
/// provider reports itself unavailable.
#[derive(Debug, Default)]
pub struct ScriptedLlmProvider {
    replies: Mutex<VecDeque<ScriptedReply>>,
    fallback: Option<ScriptedReply>,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedLlmProvider {
    pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Provider that answers every prompt with the same text.
    pub fn always(text: impl Into<String>) -> Self {
        Self::default().with_fallback(ScriptedReply::text(text))
    }

    pub fn with_fallback(mut self, reply: ScriptedReply) -> Self {
        self.fallback = Some(reply);
        self
    }

    pub fn push(&self, reply: ScriptedReply) {
        self.replies.lock().push_back(reply);
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlmProvider {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError> {
        self.prompts.lock().push(prompt.clone());
        let next = self.replies.lock().pop_front();
        let mut reply = match next.or_else(|| self.fallback.clone()) {
            Some(reply) => reply,
            None => return Err(LlmError::Unavailable("script exhausted".to_string())),
        };
        loop {
            match reply {
                ScriptedReply::Text(text) => return Ok(text),
                ScriptedReply::Error(err) => return Err(err),
                ScriptedReply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
            }
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
