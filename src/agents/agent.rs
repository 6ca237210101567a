//! Debate agents.
//!
//! An [`Agent`] binds an immutable [`AgentProfile`] to the LLM gateway and
//! produces one turn of text per invocation. Agents never see or mutate the
//! transcript directly: the orchestrator renders whatever context a phase
//! needs into a [`TurnPrompt`], so agent output is a pure function of the
//! prompt given a deterministic gateway.

use std::sync::Arc;

use crate::error::LlmError;
use crate::llm::{GenerationRequest, LlmProvider, SamplingConfig};

use super::profile::AgentProfile;

/// Phase-specific input for one turn.
#[derive(Debug, Clone)]
pub enum TurnPrompt<'a> {
    /// Round-1 proposal from the bare question.
    Propose {
        question: &'a str,
        constraints: Option<&'a str>,
    },
    /// Critique of one opponent's most recent answer.
    Critique {
        opponent_id: &'a str,
        opponent_answer: &'a str,
        context: &'a str,
    },
    /// Defense of the agent's own answer against the critiques it received.
    /// With no critiques this becomes a restatement, never a skipped turn.
    Defend {
        own_answer: &'a str,
        critiques: &'a [String],
        context: &'a str,
    },
}

impl TurnPrompt<'_> {
    /// Render the user-facing prompt text for this turn.
    pub fn render(&self) -> String {
        match self {
            TurnPrompt::Propose {
                question,
                constraints,
            } => format!(
                "Question: {}\nConstraints: {}\n\nProduce an initial, high-quality proposal. \
                 Use structured reasoning and cite assumptions.",
                question,
                constraints.unwrap_or("None")
            ),
            TurnPrompt::Critique {
                opponent_id,
                opponent_answer,
                context,
            } => format!(
                "{}Opponent {}'s answer:\n{}\n\nCritique this answer: identify flaws, missing \
                 evidence, risky assumptions, and constraints violations. Be specific and \
                 constructive.",
                context_block(context),
                opponent_id,
                opponent_answer
            ),
            TurnPrompt::Defend {
                own_answer,
                critiques,
                context,
            } => {
                let joined = if critiques.is_empty() {
                    "None".to_string()
                } else {
                    critiques.join("\n- ")
                };
                format!(
                    "{}Your previous answer:\n{}\n\nCritiques received:\n- {}\n\nRevise your \
                     answer addressing valid points and strengthening the proposal. If no \
                     critiques were raised, restate your position in its strongest form. Keep \
                     what holds, fix what doesn't.",
                    context_block(context),
                    own_answer,
                    joined
                )
            }
        }
    }
}

fn context_block(context: &str) -> String {
    if context.is_empty() {
        String::new()
    } else {
        format!("Debate so far:\n{}\n\n", context)
    }
}

/// A persona wired to the gateway.
pub struct Agent {
    profile: AgentProfile,
    gateway: Arc<dyn LlmProvider>,
}

impl Agent {
    /// Create an agent from a profile and a gateway handle.
    pub fn new(profile: AgentProfile, gateway: Arc<dyn LlmProvider>) -> Self {
        Self { profile, gateway }
    }

    /// The agent's immutable profile.
    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    /// The agent's roster id.
    pub fn id(&self) -> &str {
        &self.profile.id
    }

    /// Produce the text of one turn. One outbound gateway call, no other
    /// side effects.
    pub async fn produce_turn(
        &self,
        prompt: &TurnPrompt<'_>,
        sampling: &SamplingConfig,
    ) -> Result<String, LlmError> {
        let request =
            GenerationRequest::new(&self.profile.system, prompt.render(), sampling.clone());
        self.gateway.complete(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedProvider;

    fn test_agent(provider: ScriptedProvider) -> Agent {
        Agent::new(
            AgentProfile::new("Tester", "generalist", "You test things."),
            Arc::new(provider),
        )
    }

    #[test]
    fn propose_prompt_includes_question_and_constraints() {
        let prompt = TurnPrompt::Propose {
            question: "Should we cache?",
            constraints: Some("budget: none"),
        };
        let text = prompt.render();
        assert!(text.contains("Question: Should we cache?"));
        assert!(text.contains("Constraints: budget: none"));

        let bare = TurnPrompt::Propose {
            question: "Should we cache?",
            constraints: None,
        };
        assert!(bare.render().contains("Constraints: None"));
    }

    #[test]
    fn critique_prompt_names_opponent_and_carries_context() {
        let prompt = TurnPrompt::Critique {
            opponent_id: "Rival",
            opponent_answer: "Use a cache everywhere.",
            context: "[r1/propose] Rival: Use a cache everywhere.",
        };
        let text = prompt.render();
        assert!(text.contains("Opponent Rival's answer:"));
        assert!(text.contains("Debate so far:"));
        assert!(text.contains("identify flaws"));
    }

    #[test]
    fn defend_prompt_with_no_critiques_asks_for_restatement() {
        let prompt = TurnPrompt::Defend {
            own_answer: "My position.",
            critiques: &[],
            context: "",
        };
        let text = prompt.render();
        assert!(text.contains("Critiques received:\n- None"));
        assert!(text.contains("restate your position"));
        assert!(!text.contains("Debate so far:"));
    }

    #[test]
    fn defend_prompt_joins_critiques_as_bullets() {
        let critiques = vec![
            "A: too vague".to_string(),
            "B: ignores cost".to_string(),
        ];
        let prompt = TurnPrompt::Defend {
            own_answer: "My position.",
            critiques: &critiques,
            context: "",
        };
        let text = prompt.render();
        assert!(text.contains("- A: too vague\n- B: ignores cost"));
    }

    #[tokio::test]
    async fn produce_turn_sends_persona_system_instructions() {
        let provider = ScriptedProvider::new("unused").respond_when("You test things.", "seen");
        let agent = test_agent(provider);

        let prompt = TurnPrompt::Propose {
            question: "q",
            constraints: None,
        };
        let out = agent
            .produce_turn(&prompt, &SamplingConfig::new("scripted"))
            .await
            .unwrap();
        assert_eq!(out, "seen");
    }
}
