//! Deterministic scripted provider.
//!
//! Responds from an ordered rule table matched against the request text, so
//! the same configuration always yields the same completions regardless of
//! call interleaving. Used for reproducible offline runs and as the test
//! double for every orchestration and judging scenario.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{GenerationRequest, LlmProvider};
use crate::error::LlmError;

/// Failure kinds a rule can inject, mirroring the gateway taxonomy.
#[derive(Debug, Clone)]
pub enum ScriptFailure {
    Timeout,
    RateLimited,
    Transport,
    InvalidResponse,
}

impl ScriptFailure {
    fn to_error(&self) -> LlmError {
        match self {
            Self::Timeout => LlmError::Timeout { seconds: 0 },
            Self::RateLimited => LlmError::RateLimited("scripted rate limit".to_string()),
            Self::Transport => LlmError::Transport("scripted transport failure".to_string()),
            Self::InvalidResponse => {
                LlmError::InvalidResponse("scripted malformed response".to_string())
            }
        }
    }
}

enum ScriptAction {
    Respond(String),
    Fail(ScriptFailure),
}

struct ScriptRule {
    needle: String,
    action: ScriptAction,
    /// Remaining applications; `u32::MAX` means unlimited.
    remaining: AtomicU32,
}

/// Provider that answers from rules matched against the request text.
///
/// Rules are checked in insertion order; the first rule whose needle occurs
/// in the concatenated message text (and whose budget is not exhausted)
/// fires. When nothing matches, the default response is returned.
pub struct ScriptedProvider {
    rules: Vec<ScriptRule>,
    default_response: String,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    /// Create a provider that always returns `default_response`.
    pub fn new(default_response: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            default_response: default_response.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Respond with `response` whenever the request text contains `needle`.
    pub fn respond_when(mut self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        self.rules.push(ScriptRule {
            needle: needle.into(),
            action: ScriptAction::Respond(response.into()),
            remaining: AtomicU32::new(u32::MAX),
        });
        self
    }

    /// Respond with `response` for the first `times` requests whose text
    /// contains `needle`; later matching requests fall through to
    /// subsequent rules.
    pub fn respond_times(
        mut self,
        needle: impl Into<String>,
        response: impl Into<String>,
        times: u32,
    ) -> Self {
        self.rules.push(ScriptRule {
            needle: needle.into(),
            action: ScriptAction::Respond(response.into()),
            remaining: AtomicU32::new(times),
        });
        self
    }

    /// Fail with `failure` the first `times` requests whose text contains
    /// `needle`; later matching requests fall through to subsequent rules.
    pub fn fail_when(
        mut self,
        needle: impl Into<String>,
        failure: ScriptFailure,
        times: u32,
    ) -> Self {
        self.rules.push(ScriptRule {
            needle: needle.into(),
            action: ScriptAction::Fail(failure),
            remaining: AtomicU32::new(times),
        });
        self
    }

    /// Number of completion calls received so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Try to consume one application of a counted rule.
    fn try_consume(rule: &ScriptRule) -> bool {
        loop {
            let current = rule.remaining.load(Ordering::SeqCst);
            if current == 0 {
                return false;
            }
            if current == u32::MAX {
                return true;
            }
            if rule
                .remaining
                .compare_exchange(current, current - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return true;
            }
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(&self, request: GenerationRequest) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = request.full_text();

        for rule in &self.rules {
            if text.contains(&rule.needle) && Self::try_consume(rule) {
                return match &rule.action {
                    ScriptAction::Respond(response) => Ok(response.clone()),
                    ScriptAction::Fail(failure) => Err(failure.to_error()),
                };
            }
        }

        Ok(self.default_response.clone())
    }
}
