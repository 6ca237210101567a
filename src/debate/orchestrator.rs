//! Debate execution.
//!
//! The orchestrator owns the phase state machine: round 1 is a propose
//! phase, every later round is a critique phase followed by a defend phase,
//! and judging runs once after the final round. Within a phase all turns
//! run concurrently; the transcript is only appended to between phases, in
//! roster order, so two runs with the same inputs and the same clock
//! produce byte-identical transcripts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::mpsc;

use crate::agents::{Agent, AgentProfile, TurnPrompt};
use crate::error::{ConfigError, DebateError, LlmError};
use crate::judge::{Judge, RuleJudge, Rubric, Verdict};
use crate::llm::{LlmProvider, SamplingConfig};
use crate::storage::TranscriptStore;

use super::transcript::{ContextPolicy, Phase, Transcript, Turn};

/// Injectable clock; tests pin it for reproducible timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Default per-turn retry budget on top of the first attempt.
const DEFAULT_TURN_RETRIES: u32 = 2;

/// Base delay for per-turn retry backoff.
const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Who each agent critiques in a critique phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CritiquePolicy {
    /// Every agent critiques every other agent.
    #[default]
    AllOpponents,
    /// Every agent critiques only the opponent whose current answer scores
    /// highest under the heuristic judge; ties break to the
    /// lexicographically smallest opponent id.
    StrongestOpponent,
}

/// Cooperative cancellation handle, checked at phase boundaries only. A
/// phase that has started always runs to completion so the transcript
/// never ends mid-phase.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress notifications emitted while a debate runs. Best-effort: a
/// dropped receiver never stalls the debate.
#[derive(Debug, Clone, PartialEq)]
pub enum DebateEvent {
    PhaseStarted { round: u32, phase: Phase },
    TurnCompleted { round: u32, phase: Phase, speaker: String },
    RoundCompleted { round: u32 },
    JudgingStarted,
    Finished { winner: String },
}

/// Parameters of one debate run.
#[derive(Clone)]
pub struct DebateConfig {
    /// The question under debate.
    pub question: String,
    /// Optional free-text constraints shown to every agent.
    pub constraints: Option<String>,
    /// Number of rounds; round 1 proposes, rounds 2..=n critique and defend.
    pub rounds: u32,
    /// Sampling settings for agent turns.
    pub sampling: SamplingConfig,
    /// Critique targeting.
    pub critique_policy: CritiquePolicy,
    /// Bound on transcript context fed back to agents.
    pub context: ContextPolicy,
    /// Retries per turn on transient gateway errors.
    pub turn_retries: u32,
    /// Base delay for the exponential per-turn backoff.
    pub retry_base_delay: Duration,
}

impl DebateConfig {
    pub fn new(question: impl Into<String>, rounds: u32, sampling: SamplingConfig) -> Self {
        Self {
            question: question.into(),
            constraints: None,
            rounds,
            sampling,
            critique_policy: CritiquePolicy::default(),
            context: ContextPolicy::default(),
            turn_retries: DEFAULT_TURN_RETRIES,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
        }
    }

    pub fn with_constraints(mut self, constraints: impl Into<String>) -> Self {
        self.constraints = Some(constraints.into());
        self
    }

    pub fn with_critique_policy(mut self, policy: CritiquePolicy) -> Self {
        self.critique_policy = policy;
        self
    }

    pub fn with_turn_retries(mut self, retries: u32) -> Self {
        self.turn_retries = retries;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }
}

/// Result of a completed debate.
#[derive(Debug)]
pub struct DebateOutcome {
    /// Unique id of this run.
    pub debate_id: String,
    /// The full transcript, every turn of every phase.
    pub transcript: Transcript,
    /// The judge's verdict.
    pub verdict: Verdict,
    /// Wall-clock duration of the run.
    pub duration_ms: u64,
}

/// One agent's work item within a phase, with owned prompt inputs so the
/// phase futures borrow nothing from the transcript.
enum PhaseJob {
    Propose,
    Critique {
        target: String,
        answer: String,
        context: String,
    },
    Defend {
        own_answer: String,
        critiques: Vec<String>,
        context: String,
    },
}

/// Drives a roster of agents through propose, critique and defend phases
/// and hands the finished transcript to a judge.
pub struct DebateOrchestrator {
    agents: Vec<Agent>,
    config: DebateConfig,
    clock: Clock,
    cancel: CancelToken,
    events: Option<mpsc::UnboundedSender<DebateEvent>>,
}

impl DebateOrchestrator {
    /// Build an orchestrator, validating the roster and round count.
    ///
    /// # Errors
    ///
    /// [`ConfigError::RosterTooSmall`] for fewer than two agents,
    /// [`ConfigError::DuplicateAgent`] for repeated ids,
    /// [`ConfigError::InvalidRounds`] for zero rounds.
    pub fn new(
        profiles: Vec<AgentProfile>,
        gateway: Arc<dyn LlmProvider>,
        config: DebateConfig,
    ) -> Result<Self, DebateError> {
        if profiles.len() < 2 {
            return Err(ConfigError::RosterTooSmall(profiles.len()).into());
        }
        for (i, profile) in profiles.iter().enumerate() {
            if profiles[..i].iter().any(|p| p.id == profile.id) {
                return Err(ConfigError::DuplicateAgent(profile.id.clone()).into());
            }
        }
        if config.rounds == 0 {
            return Err(ConfigError::InvalidRounds(config.rounds).into());
        }

        let agents = profiles
            .into_iter()
            .map(|profile| Agent::new(profile, gateway.clone()))
            .collect();

        Ok(Self {
            agents,
            config,
            clock: Arc::new(Utc::now),
            cancel: CancelToken::default(),
            events: None,
        })
    }

    /// Replace the timestamp source.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Attach a progress event channel.
    pub fn with_events(mut self, sender: mpsc::UnboundedSender<DebateEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Handle for cancelling this debate from another task.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Roster profiles, in debate order.
    pub fn roster(&self) -> Vec<AgentProfile> {
        self.agents.iter().map(|a| a.profile().clone()).collect()
    }

    /// Run the debate to a verdict.
    ///
    /// Completed turns are appended to the transcript and persisted before
    /// any failure of the same phase propagates, so the store always holds
    /// every turn that actually finished.
    pub async fn run(
        &self,
        judge: &Judge,
        rubric: &Rubric,
        store: &mut dyn TranscriptStore,
    ) -> Result<DebateOutcome, DebateError> {
        let started = Instant::now();
        let debate_id = uuid::Uuid::new_v4().to_string();
        let roster: Vec<String> = self.agents.iter().map(|a| a.id().to_string()).collect();

        tracing::info!(
            debate_id = %debate_id,
            agents = roster.len(),
            rounds = self.config.rounds,
            "Debate starting"
        );
        store.record_start(&debate_id, &self.config.question, &roster, self.config.rounds)?;

        let mut transcript = Transcript::new(roster);

        let verdict = match self
            .run_to_verdict(judge, rubric, &mut transcript, store)
            .await
        {
            Ok(verdict) => verdict,
            Err(err) => {
                store.record_failure(&err.to_string())?;
                return Err(err);
            }
        };
        store.record_verdict(&verdict)?;
        self.emit(DebateEvent::Finished {
            winner: verdict.winner.label(),
        });

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            debate_id = %debate_id,
            winner = %verdict.winner,
            duration_ms,
            "Debate finished"
        );

        Ok(DebateOutcome {
            debate_id,
            transcript,
            verdict,
            duration_ms,
        })
    }

    async fn run_to_verdict(
        &self,
        judge: &Judge,
        rubric: &Rubric,
        transcript: &mut Transcript,
        store: &mut dyn TranscriptStore,
    ) -> Result<Verdict, DebateError> {
        for round in 1..=self.config.rounds {
            if round == 1 {
                self.check_cancel(round, Phase::Propose)?;
                let jobs = self.agents.iter().map(|a| (a, PhaseJob::Propose)).collect();
                self.run_phase(round, Phase::Propose, jobs, transcript, store)
                    .await?;
            } else {
                self.check_cancel(round, Phase::Critique)?;
                let jobs = self.critique_jobs(transcript);
                self.run_phase(round, Phase::Critique, jobs, transcript, store)
                    .await?;

                self.check_cancel(round, Phase::Defend)?;
                let jobs = self.defend_jobs(round, transcript);
                self.run_phase(round, Phase::Defend, jobs, transcript, store)
                    .await?;
            }
            self.emit(DebateEvent::RoundCompleted { round });
        }

        self.check_cancel(self.config.rounds, Phase::Defend)?;
        self.emit(DebateEvent::JudgingStarted);
        Ok(judge.judge(transcript, rubric, &self.roster()).await?)
    }

    fn check_cancel(&self, round: u32, phase: Phase) -> Result<(), DebateError> {
        if self.cancel.is_cancelled() {
            tracing::warn!(round, phase = %phase, "Debate cancelled");
            return Err(DebateError::Cancelled { round, phase });
        }
        Ok(())
    }

    /// Critique work items per the configured policy, in roster order.
    fn critique_jobs<'a>(&'a self, transcript: &Transcript) -> Vec<(&'a Agent, PhaseJob)> {
        let context = transcript.render_context(&self.config.question, &self.config.context);
        let answer_of = |id: &str| {
            transcript
                .latest_answer(id)
                .map(|t| t.text.clone())
                .unwrap_or_default()
        };

        let mut jobs = Vec::new();
        for agent in &self.agents {
            let opponents: Vec<&Agent> =
                self.agents.iter().filter(|o| o.id() != agent.id()).collect();
            match self.config.critique_policy {
                CritiquePolicy::AllOpponents => {
                    for opponent in opponents {
                        jobs.push((
                            agent,
                            PhaseJob::Critique {
                                target: opponent.id().to_string(),
                                answer: answer_of(opponent.id()),
                                context: context.clone(),
                            },
                        ));
                    }
                }
                CritiquePolicy::StrongestOpponent => {
                    // Highest heuristic score wins; ties break to the
                    // lexicographically smallest id (min_by keeps the first
                    // of equal keys, so compare id descending as tiebreak).
                    let target = opponents.iter().max_by(|a, b| {
                        RuleJudge::score_text(&answer_of(a.id()))
                            .total_cmp(&RuleJudge::score_text(&answer_of(b.id())))
                            .then_with(|| b.id().cmp(a.id()))
                    });
                    if let Some(opponent) = target {
                        jobs.push((
                            agent,
                            PhaseJob::Critique {
                                target: opponent.id().to_string(),
                                answer: answer_of(opponent.id()),
                                context: context.clone(),
                            },
                        ));
                    }
                }
            }
        }
        jobs
    }

    /// Defend work items: every agent revises its own answer against the
    /// critiques it received this round.
    fn defend_jobs<'a>(&'a self, round: u32, transcript: &Transcript) -> Vec<(&'a Agent, PhaseJob)> {
        let context = transcript.render_context(&self.config.question, &self.config.context);
        self.agents
            .iter()
            .map(|agent| {
                let own_answer = transcript
                    .latest_answer(agent.id())
                    .map(|t| t.text.clone())
                    .unwrap_or_default();
                let critiques = transcript
                    .critiques_of(agent.id(), round)
                    .iter()
                    .map(|t| t.text.clone())
                    .collect();
                (
                    agent,
                    PhaseJob::Defend {
                        own_answer,
                        critiques,
                        context: context.clone(),
                    },
                )
            })
            .collect()
    }

    /// Run all jobs of one phase concurrently, then append the results in
    /// job (roster) order. Successes are appended and persisted even when a
    /// sibling turn failed; the first failure in job order propagates.
    async fn run_phase(
        &self,
        round: u32,
        phase: Phase,
        jobs: Vec<(&Agent, PhaseJob)>,
        transcript: &mut Transcript,
        store: &mut dyn TranscriptStore,
    ) -> Result<(), DebateError> {
        self.emit(DebateEvent::PhaseStarted { round, phase });
        tracing::debug!(round, phase = %phase, turns = jobs.len(), "Phase starting");

        let futures = jobs.iter().map(|(agent, job)| async move {
            let prompt = match job {
                PhaseJob::Propose => TurnPrompt::Propose {
                    question: &self.config.question,
                    constraints: self.config.constraints.as_deref(),
                },
                PhaseJob::Critique {
                    target,
                    answer,
                    context,
                } => TurnPrompt::Critique {
                    opponent_id: target,
                    opponent_answer: answer,
                    context,
                },
                PhaseJob::Defend {
                    own_answer,
                    critiques,
                    context,
                } => TurnPrompt::Defend {
                    own_answer,
                    critiques,
                    context,
                },
            };
            self.produce_with_retry(agent, &prompt, round, phase).await
        });
        let results = join_all(futures).await;

        let mut first_failure: Option<DebateError> = None;
        for ((agent, job), result) in jobs.iter().zip(results) {
            match result {
                Ok(text) => {
                    let target = match job {
                        PhaseJob::Critique { target, .. } => Some(target.clone()),
                        _ => None,
                    };
                    let turn = Turn {
                        round,
                        phase,
                        speaker: agent.id().to_string(),
                        target,
                        text,
                        timestamp: (self.clock)(),
                    };
                    store.record_turn(&turn)?;
                    transcript.append(turn)?;
                    self.emit(DebateEvent::TurnCompleted {
                        round,
                        phase,
                        speaker: agent.id().to_string(),
                    });
                }
                Err(err) => {
                    if first_failure.is_none() {
                        first_failure = Some(err);
                    }
                }
            }
        }

        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// One turn with exponential backoff on transient gateway errors.
    async fn produce_with_retry(
        &self,
        agent: &Agent,
        prompt: &TurnPrompt<'_>,
        round: u32,
        phase: Phase,
    ) -> Result<String, DebateError> {
        let max_attempts = self.config.turn_retries + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match agent.produce_turn(prompt, &self.config.sampling).await {
                Ok(text) => return Ok(text),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = self.config.retry_base_delay * (1 << (attempt - 1));
                    tracing::warn!(
                        agent = agent.id(),
                        round,
                        phase = %phase,
                        attempt,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "Turn failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(self.turn_failure(agent, round, phase, attempt, err)),
            }
        }
    }

    fn turn_failure(
        &self,
        agent: &Agent,
        round: u32,
        phase: Phase,
        attempts: u32,
        source: LlmError,
    ) -> DebateError {
        tracing::error!(
            agent = agent.id(),
            round,
            phase = %phase,
            attempts,
            error = %source,
            "Turn failed permanently"
        );
        DebateError::AgentTurnFailure {
            agent: agent.id().to_string(),
            round,
            phase,
            attempts,
            source,
        }
    }

    fn emit(&self, event: DebateEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedProvider;

    fn profiles(ids: &[&str]) -> Vec<AgentProfile> {
        ids.iter()
            .map(|id| AgentProfile::new(*id, "generalist", format!("{} system", id)))
            .collect()
    }

    fn orchestrator(ids: &[&str], policy: CritiquePolicy) -> DebateOrchestrator {
        let config = DebateConfig::new("q?", 2, SamplingConfig::new("scripted"))
            .with_critique_policy(policy);
        DebateOrchestrator::new(
            profiles(ids),
            Arc::new(ScriptedProvider::new("answer")),
            config,
        )
        .unwrap()
    }

    fn seeded_transcript(answers: &[(&str, &str)]) -> Transcript {
        let roster = answers.iter().map(|(id, _)| id.to_string()).collect();
        let mut transcript = Transcript::new(roster);
        for (speaker, text) in answers {
            transcript
                .append(Turn {
                    round: 1,
                    phase: Phase::Propose,
                    speaker: speaker.to_string(),
                    target: None,
                    text: text.to_string(),
                    timestamp: Utc::now(),
                })
                .unwrap();
        }
        transcript
    }

    #[test]
    fn rejects_small_roster_duplicates_and_zero_rounds() {
        let gateway: Arc<dyn LlmProvider> = Arc::new(ScriptedProvider::new("x"));
        let config = DebateConfig::new("q?", 2, SamplingConfig::new("scripted"));

        let err = DebateOrchestrator::new(profiles(&["A"]), gateway.clone(), config.clone())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            DebateError::Config(ConfigError::RosterTooSmall(1))
        ));

        let err =
            DebateOrchestrator::new(profiles(&["A", "A"]), gateway.clone(), config.clone())
                .err()
                .unwrap();
        assert!(matches!(
            err,
            DebateError::Config(ConfigError::DuplicateAgent(_))
        ));

        let zero = DebateConfig::new("q?", 0, SamplingConfig::new("scripted"));
        let err = DebateOrchestrator::new(profiles(&["A", "B"]), gateway, zero)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            DebateError::Config(ConfigError::InvalidRounds(0))
        ));
    }

    #[test]
    fn all_opponents_policy_pairs_everyone() {
        let orch = orchestrator(&["A", "B", "C"], CritiquePolicy::AllOpponents);
        let transcript =
            seeded_transcript(&[("A", "a"), ("B", "b"), ("C", "c")]);

        let jobs = orch.critique_jobs(&transcript);
        assert_eq!(jobs.len(), 6);
        let pairs: Vec<(String, String)> = jobs
            .iter()
            .map(|(agent, job)| match job {
                PhaseJob::Critique { target, .. } => {
                    (agent.id().to_string(), target.clone())
                }
                _ => panic!("expected critique job"),
            })
            .collect();
        assert_eq!(pairs[0], ("A".to_string(), "B".to_string()));
        assert_eq!(pairs[5], ("C".to_string(), "B".to_string()));
    }

    #[test]
    fn strongest_opponent_policy_targets_best_answer() {
        let orch = orchestrator(&["A", "B", "C"], CritiquePolicy::StrongestOpponent);
        let strong = "## Plan\n- covers the latency constraint\n- names a risk and mitigation";
        let transcript =
            seeded_transcript(&[("A", "weak"), ("B", strong), ("C", "also weak")]);

        let jobs = orch.critique_jobs(&transcript);
        assert_eq!(jobs.len(), 3);
        for (agent, job) in &jobs {
            let PhaseJob::Critique { target, .. } = job else {
                panic!("expected critique job");
            };
            if agent.id() == "B" {
                // B cannot target itself; its opponents tie, so the
                // lexicographically smallest id wins.
                assert_eq!(target, "A");
            } else {
                assert_eq!(target, "B");
            }
        }
    }

    #[test]
    fn cancel_token_flips_once() {
        let orch = orchestrator(&["A", "B"], CritiquePolicy::AllOpponents);
        let token = orch.cancel_token();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(orch.cancel_token().is_cancelled());
        assert!(orch.check_cancel(1, Phase::Propose).is_err());
    }
}
