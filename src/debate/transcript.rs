//! Turns and the append-only transcript.
//!
//! The [`Transcript`] is the one shared mutable structure of a debate. It is
//! owned and written exclusively by the orchestrator, appended to only at
//! phase barriers, and handed to the judge by shared reference. Insertion
//! order is chronological order is round order; entries are never dropped
//! or reordered once appended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DebateError;

/// Debate phase of a single turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Initial answer to the question (round 1 only).
    Propose,
    /// Critique of another agent's most recent answer.
    Critique,
    /// Defense of the agent's own answer against received critiques.
    Defend,
}

impl Phase {
    /// Wire/display name for this phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Propose => "propose",
            Self::Critique => "critique",
            Self::Defend => "defend",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One atomic contribution by one agent. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Round number, 1-indexed.
    pub round: u32,
    /// Phase this turn belongs to.
    pub phase: Phase,
    /// Roster id of the speaking agent.
    pub speaker: String,
    /// Roster id of the critiqued agent; only critiques carry a target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// The turn's text.
    pub text: String,
    /// When the turn was appended.
    pub timestamp: DateTime<Utc>,
}

/// Bounds on how much rendered transcript is fed back to agents.
///
/// When the rendered context would exceed `max_context_chars`, the oldest
/// turns are dropped first. The question and every turn of the most recent
/// round are never dropped.
#[derive(Debug, Clone, Copy)]
pub struct ContextPolicy {
    /// Upper bound on rendered context length in characters.
    pub max_context_chars: usize,
}

impl Default for ContextPolicy {
    fn default() -> Self {
        Self {
            max_context_chars: 24_000,
        }
    }
}

/// Append-only, roster-checked sequence of turns.
#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    roster: Vec<String>,
    turns: Vec<Turn>,
}

impl Transcript {
    /// Create an empty transcript for the given roster.
    pub fn new(roster: Vec<String>) -> Self {
        Self {
            roster,
            turns: Vec::new(),
        }
    }

    /// Roster ids, in debate order.
    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    /// All turns in chronological order.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Append a turn, enforcing the roster invariant.
    ///
    /// # Errors
    ///
    /// Returns [`DebateError::RosterViolation`] when the speaker or target
    /// is not in the roster.
    pub fn append(&mut self, turn: Turn) -> Result<(), DebateError> {
        if !self.roster.contains(&turn.speaker) {
            return Err(DebateError::RosterViolation(turn.speaker));
        }
        if let Some(ref target) = turn.target {
            if !self.roster.contains(target) {
                return Err(DebateError::RosterViolation(target.clone()));
            }
        }
        self.turns.push(turn);
        Ok(())
    }

    /// The agent's most recent answer turn (proposal or defense).
    pub fn latest_answer(&self, agent: &str) -> Option<&Turn> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.speaker == agent && matches!(t.phase, Phase::Propose | Phase::Defend))
    }

    /// Critiques targeting `agent` in the given round, in transcript order.
    pub fn critiques_of(&self, agent: &str, round: u32) -> Vec<&Turn> {
        self.turns
            .iter()
            .filter(|t| {
                t.round == round
                    && t.phase == Phase::Critique
                    && t.target.as_deref() == Some(agent)
            })
            .collect()
    }

    /// Count of turns in a given round and phase.
    pub fn count(&self, round: u32, phase: Phase) -> usize {
        self.turns
            .iter()
            .filter(|t| t.round == round && t.phase == phase)
            .count()
    }

    /// Highest round number present, 0 when empty.
    pub fn last_round(&self) -> u32 {
        self.turns.iter().map(|t| t.round).max().unwrap_or(0)
    }

    /// Render the transcript as bounded context for an agent call.
    ///
    /// Always starts with the question. If the rendered body exceeds the
    /// policy bound, the oldest turns are dropped first; turns of the most
    /// recent round present are always kept, whatever the bound.
    pub fn render_context(&self, question: &str, policy: &ContextPolicy) -> String {
        let header = format!("Question: {}\n", question);
        let last_round = self.last_round();

        let lines: Vec<(bool, String)> = self
            .turns
            .iter()
            .map(|t| {
                let line = match &t.target {
                    Some(target) => format!(
                        "[r{}/{}] {} -> {}: {}",
                        t.round, t.phase, t.speaker, target, t.text
                    ),
                    None => format!("[r{}/{}] {}: {}", t.round, t.phase, t.speaker, t.text),
                };
                (t.round == last_round, line)
            })
            .collect();

        let total = |skip: usize| -> usize {
            header.len()
                + lines
                    .iter()
                    .enumerate()
                    .filter(|(i, (protected, _))| *protected || *i >= skip)
                    .map(|(_, (_, l))| l.len() + 1)
                    .sum::<usize>()
        };

        // Drop unprotected turns from the front until the bound holds.
        let mut skip = 0;
        while total(skip) > policy.max_context_chars
            && lines[skip..].iter().any(|(protected, _)| !protected)
        {
            skip += 1;
        }

        let mut out = header;
        let truncated = lines[..skip].iter().any(|(protected, _)| !protected);
        if truncated {
            out.push_str("[earlier turns truncated]\n");
        }
        for (i, (protected, line)) in lines.iter().enumerate() {
            if *protected || i >= skip {
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_turn(round: u32, phase: Phase, speaker: &str, target: Option<&str>, text: &str) -> Turn {
        Turn {
            round,
            phase,
            speaker: speaker.to_string(),
            target: target.map(String::from),
            text: text.to_string(),
            timestamp: Utc::now(),
        }
    }

    fn transcript_ab() -> Transcript {
        Transcript::new(vec!["A".to_string(), "B".to_string()])
    }

    #[test]
    fn phase_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Phase::Propose).unwrap(), "\"propose\"");
        assert_eq!(Phase::Critique.to_string(), "critique");
    }

    #[test]
    fn append_enforces_roster_membership() {
        let mut t = transcript_ab();
        assert!(t
            .append(make_turn(1, Phase::Propose, "A", None, "hi"))
            .is_ok());

        let err = t
            .append(make_turn(1, Phase::Propose, "C", None, "intruder"))
            .unwrap_err();
        assert!(matches!(err, DebateError::RosterViolation(id) if id == "C"));

        let err = t
            .append(make_turn(2, Phase::Critique, "A", Some("C"), "aimed wrong"))
            .unwrap_err();
        assert!(matches!(err, DebateError::RosterViolation(id) if id == "C"));
    }

    #[test]
    fn latest_answer_prefers_most_recent_defense() {
        let mut t = transcript_ab();
        t.append(make_turn(1, Phase::Propose, "A", None, "v1")).unwrap();
        t.append(make_turn(2, Phase::Critique, "B", Some("A"), "weak"))
            .unwrap();
        t.append(make_turn(2, Phase::Defend, "A", None, "v2")).unwrap();

        assert_eq!(t.latest_answer("A").unwrap().text, "v2");
        assert!(t.latest_answer("B").is_none());
    }

    #[test]
    fn critiques_of_filters_round_and_target() {
        let mut t = transcript_ab();
        t.append(make_turn(2, Phase::Critique, "B", Some("A"), "r2 crit"))
            .unwrap();
        t.append(make_turn(3, Phase::Critique, "B", Some("A"), "r3 crit"))
            .unwrap();

        let crits = t.critiques_of("A", 2);
        assert_eq!(crits.len(), 1);
        assert_eq!(crits[0].text, "r2 crit");
        assert!(t.critiques_of("B", 2).is_empty());
    }

    #[test]
    fn render_context_keeps_question_and_last_round_under_pressure() {
        let mut t = transcript_ab();
        let filler = "x".repeat(400);
        for round in 1..=3 {
            let phase = if round == 1 { Phase::Propose } else { Phase::Defend };
            t.append(make_turn(round, phase, "A", None, &filler)).unwrap();
            t.append(make_turn(round, phase, "B", None, &filler)).unwrap();
        }

        let policy = ContextPolicy {
            max_context_chars: 1000,
        };
        let rendered = t.render_context("the big question", &policy);

        assert!(rendered.starts_with("Question: the big question\n"));
        assert!(rendered.contains("[earlier turns truncated]"));
        // Both round-3 turns survive even though they alone exceed the bound.
        assert_eq!(rendered.matches("[r3/defend]").count(), 2);
        assert!(!rendered.contains("[r1/propose]"));
    }

    #[test]
    fn render_context_without_pressure_keeps_everything() {
        let mut t = transcript_ab();
        t.append(make_turn(1, Phase::Propose, "A", None, "short"))
            .unwrap();
        t.append(make_turn(1, Phase::Propose, "B", None, "short"))
            .unwrap();

        let rendered = t.render_context("q", &ContextPolicy::default());
        assert!(!rendered.contains("truncated"));
        assert_eq!(rendered.matches("[r1/propose]").count(), 2);
    }
}
