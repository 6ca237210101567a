//! Score sheets and verdicts.
//!
//! A [`ScoreSheet`] maps every roster agent to a complete per-dimension
//! score map plus a weighted total. Partial sheets are a defect, never a
//! valid state: [`ScoreSheet::validate`] enforces completeness and bounds
//! before any [`Verdict`] is derived.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::agents::AgentProfile;
use crate::error::JudgeError;

use super::rubric::{Rubric, SCORE_MAX};

/// One agent's judged scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentScore {
    /// Score per rubric dimension, 0 to [`SCORE_MAX`].
    pub per_dimension: BTreeMap<String, f64>,
    /// Weighted total over normalized rubric weights.
    pub total: f64,
    /// Judge's note for this agent.
    pub note: String,
}

/// Complete mapping from agent id to judged scores.
///
/// `BTreeMap` keeps iteration (and serialization) order deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreSheet {
    pub scores: BTreeMap<String, AgentScore>,
}

impl ScoreSheet {
    /// Insert one agent's scores.
    pub fn insert(&mut self, agent: impl Into<String>, score: AgentScore) {
        self.scores.insert(agent.into(), score);
    }

    /// Verify the sheet covers every (agent, dimension) pair within bounds.
    ///
    /// # Errors
    ///
    /// [`JudgeError::IncompleteScoreSheet`] on a missing agent or dimension,
    /// [`JudgeError::ScoreOutOfBounds`] on a score outside `[0, SCORE_MAX]`.
    pub fn validate(&self, rubric: &Rubric, roster: &[AgentProfile]) -> Result<(), JudgeError> {
        for profile in roster {
            let agent_score = self.scores.get(&profile.id).ok_or_else(|| {
                JudgeError::IncompleteScoreSheet {
                    agent: profile.id.clone(),
                    dimension: "<all>".to_string(),
                }
            })?;
            for dim in rubric.dimensions() {
                let score = agent_score.per_dimension.get(&dim.name).copied().ok_or_else(
                    || JudgeError::IncompleteScoreSheet {
                        agent: profile.id.clone(),
                        dimension: dim.name.clone(),
                    },
                )?;
                if !(0.0..=SCORE_MAX).contains(&score) {
                    return Err(JudgeError::ScoreOutOfBounds {
                        agent: profile.id.clone(),
                        dimension: dim.name.clone(),
                        score,
                        max: SCORE_MAX,
                    });
                }
            }
        }
        Ok(())
    }

    /// Derive the winner from weighted totals.
    ///
    /// The highest total wins; exact ties yield [`Winner::Tie`] with ids in
    /// lexicographic order (BTreeMap iteration order guarantees this).
    pub fn winner(&self) -> Winner {
        let best = self
            .scores
            .values()
            .map(|s| s.total)
            .fold(f64::NEG_INFINITY, f64::max);
        let leaders: Vec<String> = self
            .scores
            .iter()
            .filter(|(_, s)| s.total == best)
            .map(|(id, _)| id.clone())
            .collect();

        match leaders.len() {
            1 => Winner::Agent(leaders.into_iter().next().expect("one leader")),
            _ => Winner::Tie(leaders),
        }
    }
}

/// Outcome of the winner derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    /// A single agent won.
    Agent(String),
    /// Two or more agents tied, ids in lexicographic order.
    Tie(Vec<String>),
}

impl Winner {
    /// Short label for logs and reports.
    pub fn label(&self) -> String {
        match self {
            Self::Agent(id) => id.clone(),
            Self::Tie(ids) => format!("tie({})", ids.join(", ")),
        }
    }
}

impl std::fmt::Display for Winner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Terminal artifact of a debate run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    /// The winning agent, or the tie marker.
    pub winner: Winner,
    /// Complete score sheet behind the decision.
    pub sheet: ScoreSheet,
    /// Free-text rationale assembled by the judge.
    pub rationale: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::rubric::RubricDimension;

    fn roster() -> Vec<AgentProfile> {
        vec![
            AgentProfile::new("A", "generalist", "sys"),
            AgentProfile::new("B", "generalist", "sys"),
        ]
    }

    fn full_score(rubric: &Rubric, value: f64, total: f64) -> AgentScore {
        let per_dimension = rubric
            .dimensions()
            .iter()
            .map(|d| (d.name.clone(), value))
            .collect();
        AgentScore {
            per_dimension,
            total,
            note: String::new(),
        }
    }

    #[test]
    fn validate_accepts_complete_sheets() {
        let rubric = Rubric::default_rubric();
        let mut sheet = ScoreSheet::default();
        sheet.insert("A", full_score(&rubric, 5.0, 5.0));
        sheet.insert("B", full_score(&rubric, 6.0, 6.0));
        assert!(sheet.validate(&rubric, &roster()).is_ok());
    }

    #[test]
    fn validate_rejects_missing_agent_and_dimension() {
        let rubric = Rubric::default_rubric();
        let mut sheet = ScoreSheet::default();
        sheet.insert("A", full_score(&rubric, 5.0, 5.0));

        assert!(matches!(
            sheet.validate(&rubric, &roster()),
            Err(JudgeError::IncompleteScoreSheet { agent, .. }) if agent == "B"
        ));

        let mut partial = full_score(&rubric, 5.0, 5.0);
        partial.per_dimension.remove("clarity");
        sheet.insert("B", partial);
        assert!(matches!(
            sheet.validate(&rubric, &roster()),
            Err(JudgeError::IncompleteScoreSheet { agent, dimension })
                if agent == "B" && dimension == "clarity"
        ));
    }

    #[test]
    fn validate_rejects_out_of_bounds_scores() {
        let rubric = Rubric::new("one", vec![RubricDimension::new("a", 1.0)]).unwrap();
        let mut sheet = ScoreSheet::default();
        let mut score = AgentScore {
            per_dimension: BTreeMap::new(),
            total: 11.0,
            note: String::new(),
        };
        score.per_dimension.insert("a".to_string(), 11.0);
        sheet.insert("A", score.clone());
        sheet.insert("B", score);

        assert!(matches!(
            sheet.validate(&rubric, &roster()),
            Err(JudgeError::ScoreOutOfBounds { .. })
        ));
    }

    #[test]
    fn winner_picks_highest_total() {
        let rubric = Rubric::default_rubric();
        let mut sheet = ScoreSheet::default();
        sheet.insert("A", full_score(&rubric, 4.0, 4.0));
        sheet.insert("B", full_score(&rubric, 7.0, 7.0));
        assert_eq!(sheet.winner(), Winner::Agent("B".to_string()));
    }

    #[test]
    fn exact_ties_are_reported_in_lexicographic_order() {
        let rubric = Rubric::default_rubric();
        let mut sheet = ScoreSheet::default();
        sheet.insert("Zeta", full_score(&rubric, 5.0, 5.0));
        sheet.insert("Alpha", full_score(&rubric, 5.0, 5.0));

        match sheet.winner() {
            Winner::Tie(ids) => assert_eq!(ids, ["Alpha", "Zeta"]),
            other => panic!("expected tie, got {:?}", other),
        }
    }

    #[test]
    fn winner_label_formats() {
        assert_eq!(Winner::Agent("A".to_string()).label(), "A");
        assert_eq!(
            Winner::Tie(vec!["A".to_string(), "B".to_string()]).label(),
            "tie(A, B)"
        );
    }
}
