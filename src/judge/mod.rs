//! Judging: transcripts plus a rubric in, a verdict out.
//!
//! The [`Judge`] enum is the single dispatch point for all judging
//! strategies; new variants are added by extending the enum and writing one
//! implementation, never by string-keyed branching. All variants share the
//! contract `judge(transcript, rubric, roster) -> Verdict` and every
//! verdict's score sheet is validated for (agent, dimension) completeness
//! before it leaves this module.

pub mod rubric;
pub mod score;

use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use crate::agents::AgentProfile;
use crate::debate::Transcript;
use crate::error::JudgeError;
use crate::llm::{GenerationRequest, LlmProvider, SamplingConfig};

pub use rubric::{Rubric, RubricDimension, SCORE_MAX};
pub use score::{AgentScore, ScoreSheet, Verdict, Winner};

/// Max output length for judging calls; verdicts are short.
const JUDGE_MAX_TOKENS: u32 = 600;

/// System instructions for LLM judging calls.
const JUDGE_SYSTEM_PROMPT: &str = "You are a strict but fair debate judge.";

/// Appended on the single repair retry after a parse failure.
const STRICT_FORMAT_INSTRUCTION: &str = "\n\nIMPORTANT: Respond with ONLY a single JSON object, \
     no markdown fences, no surrounding prose. It must contain one key per criterion, each \
     holding {\"score\": number, \"note\": string}, plus a top-level \"verdict\" string.";

/// A judging strategy. Closed set; fully substitutable behind [`Judge::judge`].
pub enum Judge {
    /// Scores each agent's final answer through the LLM gateway.
    Llm(LlmJudge),
    /// Deterministic heuristic scorer; free, fast, reproducible.
    Rule(RuleJudge),
    /// Combines several member judges into one verdict.
    Panel(PanelJudge),
}

impl Judge {
    /// Produce a verdict for a finished debate.
    pub async fn judge(
        &self,
        transcript: &Transcript,
        rubric: &Rubric,
        roster: &[AgentProfile],
    ) -> Result<Verdict, JudgeError> {
        let verdict = match self {
            Self::Llm(judge) => judge.judge(transcript, rubric, roster).await?,
            Self::Rule(judge) => judge.judge(transcript, rubric, roster)?,
            Self::Panel(judge) => judge.judge(transcript, rubric, roster).await?,
        };
        verdict.sheet.validate(rubric, roster)?;
        Ok(verdict)
    }
}

// ============================================================================
// LLM judge
// ============================================================================

/// Judge backed by the LLM gateway, one scoring call per agent.
pub struct LlmJudge {
    gateway: Arc<dyn LlmProvider>,
    sampling: SamplingConfig,
}

impl LlmJudge {
    /// Create an LLM judge. Temperature is pinned to 0 and output length to
    /// a short bound regardless of the debate's sampling settings.
    pub fn new(gateway: Arc<dyn LlmProvider>, sampling: &SamplingConfig) -> Self {
        Self {
            gateway,
            sampling: sampling.deterministic().with_max_tokens(JUDGE_MAX_TOKENS),
        }
    }

    async fn judge(
        &self,
        transcript: &Transcript,
        rubric: &Rubric,
        roster: &[AgentProfile],
    ) -> Result<Verdict, JudgeError> {
        let mut sheet = ScoreSheet::default();
        let mut notes = Vec::new();

        for profile in roster {
            let answer = transcript
                .latest_answer(&profile.id)
                .ok_or_else(|| JudgeError::MissingAnswer(profile.id.clone()))?;

            let (per_dimension, note) =
                self.score_one(&profile.id, &answer.text, rubric).await?;
            let total = rubric.aggregate(&per_dimension)?;
            notes.push(format!("{}: {}", profile.id, note));
            sheet.insert(
                profile.id.clone(),
                AgentScore {
                    per_dimension,
                    total,
                    note,
                },
            );
        }

        let winner = sheet.winner();
        let rationale = format!(
            "Scored {} agents against rubric '{}'.\n{}\nWinner: {}",
            roster.len(),
            rubric.name(),
            notes.join("\n"),
            winner.label()
        );

        Ok(Verdict {
            winner,
            sheet,
            rationale,
        })
    }

    /// Score one submission, retrying once with a stricter formatting
    /// instruction when the first reply does not parse.
    async fn score_one(
        &self,
        agent_id: &str,
        answer: &str,
        rubric: &Rubric,
    ) -> Result<(BTreeMap<String, f64>, String), JudgeError> {
        let prompt = format!(
            "{}\n\nSubmission from {}:\n{}\n",
            rubric.instructions(),
            agent_id,
            answer
        );

        let first = self.score_call(&prompt).await?;
        match parse_judgment(&first, rubric) {
            Ok(parsed) => Ok(parsed),
            Err(parse_err) => {
                tracing::warn!(
                    agent = agent_id,
                    error = %parse_err,
                    "Judge reply did not parse, retrying with strict format instruction"
                );
                let strict_prompt = format!("{}{}", prompt, STRICT_FORMAT_INSTRUCTION);
                let second = self.score_call(&strict_prompt).await?;
                parse_judgment(&second, rubric).map_err(|err| {
                    JudgeError::JudgmentParse(format!(
                        "agent '{}': {} (after strict retry)",
                        agent_id, err
                    ))
                })
            }
        }
    }

    async fn score_call(&self, prompt: &str) -> Result<String, JudgeError> {
        let request =
            GenerationRequest::new(JUDGE_SYSTEM_PROMPT, prompt, self.sampling.clone());
        Ok(self.gateway.complete(request).await?)
    }
}

/// Parse one judging reply into per-dimension scores plus the verdict note.
fn parse_judgment(
    content: &str,
    rubric: &Rubric,
) -> Result<(BTreeMap<String, f64>, String), JudgeError> {
    let raw = extract_json(content);
    let value: Value = serde_json::from_str(&raw).map_err(|e| {
        let preview: String = raw.chars().take(200).collect();
        JudgeError::JudgmentParse(format!("not valid JSON: {}. Content: {}", e, preview))
    })?;
    let obj = value
        .as_object()
        .ok_or_else(|| JudgeError::JudgmentParse("top level is not a JSON object".to_string()))?;

    let mut scores = BTreeMap::new();
    for dim in rubric.dimensions() {
        let entry = obj.get(&dim.name).ok_or_else(|| {
            JudgeError::JudgmentParse(format!("missing criterion '{}'", dim.name))
        })?;
        let score = entry.get("score").and_then(Value::as_f64).ok_or_else(|| {
            JudgeError::JudgmentParse(format!("criterion '{}' has no numeric score", dim.name))
        })?;
        if !(0.0..=SCORE_MAX).contains(&score) {
            return Err(JudgeError::JudgmentParse(format!(
                "criterion '{}' score {} outside [0, {}]",
                dim.name, score, SCORE_MAX
            )));
        }
        scores.insert(dim.name.clone(), score);
    }

    let verdict = obj
        .get("verdict")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    Ok((scores, verdict))
}

/// Extract a JSON object from a possibly markdown-wrapped reply.
fn extract_json(content: &str) -> String {
    // Fenced code block first
    if let Ok(fence) = Regex::new(r"```(?:json)?\s*([\s\S]*?)```") {
        if let Some(caps) = fence.captures(content) {
            let inner = caps[1].trim();
            if !inner.is_empty() {
                return inner.to_string();
            }
        }
    }

    // Raw JSON object anywhere in the content
    if let (Some(start), Some(end)) = (content.find('{'), content.rfind('}')) {
        if end >= start {
            return content[start..=end].to_string();
        }
    }

    // Let the JSON parser report the failure
    content.to_string()
}

// ============================================================================
// Rule-based judge
// ============================================================================

/// Keyword families rewarded by the heuristic scorer.
const RISK_KEYWORDS: [&str; 5] = ["risk", "mitigat", "security", "safety", "failure"];
const CONSTRAINT_KEYWORDS: [&str; 5] =
    ["constraint", "trade-off", "latency", "throughput", "budget"];
const EVIDENCE_KEYWORDS: [&str; 5] = ["because", "evidence", "measured", "example", "data"];

/// Penalty threshold for rambling answers, in characters.
const LENGTH_PENALTY_THRESHOLD: usize = 3000;

/// Deterministic heuristic judge. Needs no model access, so it doubles as
/// the fallback when an LLM judge fails to parse.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleJudge;

impl RuleJudge {
    /// Overall heuristic strength of one answer. Also used by the
    /// orchestrator's strongest-opponent critique targeting.
    pub fn score_text(text: &str) -> f64 {
        let lower = text.to_lowercase();
        let mut score = text.matches("\n- ").count() as f64;
        if text.contains("##") {
            score += 1.0;
        }
        for family in [&RISK_KEYWORDS[..], &CONSTRAINT_KEYWORDS[..]] {
            for kw in family {
                if lower.contains(kw) {
                    score += 1.5;
                }
            }
        }
        if text.len() > LENGTH_PENALTY_THRESHOLD {
            score -= 2.0;
        }
        score
    }

    /// Heuristic score for one named dimension, clamped to [0, SCORE_MAX].
    ///
    /// The default rubric dimensions get tailored heuristics; unknown
    /// dimension names fall back to the structural score so arbitrary
    /// rubrics still produce complete sheets.
    fn score_dimension(dimension: &str, text: &str) -> f64 {
        let lower = text.to_lowercase();
        let bullets = text.matches("\n- ").count() as f64;
        let headers = if text.contains("##") { 1.0 } else { 0.0 };
        let structure = (bullets + headers).min(6.0);
        let hits =
            |kws: &[&str]| kws.iter().filter(|kw| lower.contains(*kw)).count() as f64;

        let raw = match dimension {
            "soundness" => 2.0 + structure,
            "evidence" => 1.0 + hits(&EVIDENCE_KEYWORDS) * 1.5 + bullets.min(4.0) * 0.5,
            "constraints" => 1.0 + hits(&CONSTRAINT_KEYWORDS) * 1.5,
            "safety" => 1.0 + hits(&RISK_KEYWORDS) * 1.5,
            "clarity" => {
                let mut clarity = 2.0 + headers * 2.0 + bullets.min(4.0);
                if text.len() > LENGTH_PENALTY_THRESHOLD {
                    clarity -= 2.0;
                }
                clarity
            }
            _ => 2.0 + structure,
        };
        raw.clamp(0.0, SCORE_MAX)
    }

    fn judge(
        &self,
        transcript: &Transcript,
        rubric: &Rubric,
        roster: &[AgentProfile],
    ) -> Result<Verdict, JudgeError> {
        let mut sheet = ScoreSheet::default();

        for profile in roster {
            let answer = transcript
                .latest_answer(&profile.id)
                .ok_or_else(|| JudgeError::MissingAnswer(profile.id.clone()))?;

            let per_dimension: BTreeMap<String, f64> = rubric
                .dimensions()
                .iter()
                .map(|d| (d.name.clone(), Self::score_dimension(&d.name, &answer.text)))
                .collect();
            let total = rubric.aggregate(&per_dimension)?;
            sheet.insert(
                profile.id.clone(),
                AgentScore {
                    per_dimension,
                    total,
                    note: "Heuristic score".to_string(),
                },
            );
        }

        let winner = sheet.winner();
        let rationale = format!(
            "Heuristic scoring over rubric '{}' (structure, keyword coverage, length).\nWinner: {}",
            rubric.name(),
            winner.label()
        );

        Ok(Verdict {
            winner,
            sheet,
            rationale,
        })
    }
}

// ============================================================================
// Panel judge
// ============================================================================

/// A member of a judging panel. Panels do not nest.
pub enum PanelMember {
    Llm(LlmJudge),
    Rule(RuleJudge),
}

/// How a panel merges member score sheets into one verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelCombine {
    /// Per-cell mean of member scores.
    Mean,
    /// Per-cell median of member scores.
    Median,
    /// Majority vote on each member's winner; vote ties break to the
    /// lexicographically smallest agent id.
    MajorityWinner,
}

impl std::fmt::Display for PanelCombine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Mean => "mean",
            Self::Median => "median",
            Self::MajorityWinner => "majority-winner",
        };
        write!(f, "{}", name)
    }
}

/// Runs several member judges independently and combines their sheets.
pub struct PanelJudge {
    members: Vec<PanelMember>,
    combine: PanelCombine,
}

impl PanelJudge {
    /// Create a panel.
    ///
    /// # Errors
    ///
    /// Returns [`JudgeError::EmptyPanel`] for a memberless panel.
    pub fn new(members: Vec<PanelMember>, combine: PanelCombine) -> Result<Self, JudgeError> {
        if members.is_empty() {
            return Err(JudgeError::EmptyPanel);
        }
        Ok(Self { members, combine })
    }

    async fn judge(
        &self,
        transcript: &Transcript,
        rubric: &Rubric,
        roster: &[AgentProfile],
    ) -> Result<Verdict, JudgeError> {
        let mut member_verdicts = Vec::with_capacity(self.members.len());
        for member in &self.members {
            let verdict = match member {
                PanelMember::Llm(judge) => judge.judge(transcript, rubric, roster).await?,
                PanelMember::Rule(judge) => judge.judge(transcript, rubric, roster)?,
            };
            member_verdicts.push(verdict);
        }

        let sheet = self.combine_sheets(&member_verdicts, rubric, roster)?;
        let winner = match self.combine {
            PanelCombine::MajorityWinner => majority_winner(&member_verdicts),
            _ => sheet.winner(),
        };

        let votes: Vec<String> = member_verdicts
            .iter()
            .map(|v| v.winner.label())
            .collect();
        let rationale = format!(
            "Panel of {} judges combined by {}. Member votes: [{}].\nWinner: {}",
            self.members.len(),
            self.combine,
            votes.join(", "),
            winner.label()
        );

        Ok(Verdict {
            winner,
            sheet,
            rationale,
        })
    }

    /// Per-cell mean or median of member sheets.
    fn combine_sheets(
        &self,
        member_verdicts: &[Verdict],
        rubric: &Rubric,
        roster: &[AgentProfile],
    ) -> Result<ScoreSheet, JudgeError> {
        let mut sheet = ScoreSheet::default();

        for profile in roster {
            let mut per_dimension = BTreeMap::new();
            for dim in rubric.dimensions() {
                let mut values = Vec::with_capacity(member_verdicts.len());
                for verdict in member_verdicts {
                    let value = verdict
                        .sheet
                        .scores
                        .get(&profile.id)
                        .and_then(|s| s.per_dimension.get(&dim.name))
                        .copied()
                        .ok_or_else(|| JudgeError::IncompleteScoreSheet {
                            agent: profile.id.clone(),
                            dimension: dim.name.clone(),
                        })?;
                    values.push(value);
                }
                let combined = match self.combine {
                    PanelCombine::Median => median(&mut values),
                    // MajorityWinner reports the mean sheet alongside the vote
                    PanelCombine::Mean | PanelCombine::MajorityWinner => {
                        values.iter().sum::<f64>() / values.len() as f64
                    }
                };
                per_dimension.insert(dim.name.clone(), combined);
            }
            let total = rubric.aggregate(&per_dimension)?;
            sheet.insert(
                profile.id.clone(),
                AgentScore {
                    per_dimension,
                    total,
                    note: format!("{} of {} member scores", self.combine, self.members.len()),
                },
            );
        }
        Ok(sheet)
    }
}

/// Majority vote over member winners; every tie breaks to the
/// lexicographically smallest agent id.
fn majority_winner(member_verdicts: &[Verdict]) -> Winner {
    let mut votes: BTreeMap<&str, usize> = BTreeMap::new();
    for verdict in member_verdicts {
        let vote = match &verdict.winner {
            Winner::Agent(id) => id.as_str(),
            // A tied member votes for its lexicographically smallest leader
            Winner::Tie(ids) => ids.first().map(String::as_str).unwrap_or_default(),
        };
        *votes.entry(vote).or_default() += 1;
    }

    let top = votes.values().copied().max().unwrap_or(0);
    // BTreeMap iteration order makes the first max the lexicographically
    // smallest id among the vote leaders.
    let winner = votes
        .iter()
        .find(|(_, count)| **count == top)
        .map(|(id, _)| (*id).to_string())
        .unwrap_or_default();
    Winner::Agent(winner)
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) / 2.0
    }
}
