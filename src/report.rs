//! Final report assembly.
//!
//! A [`DebateReport`] is the user-facing summary of a finished run: each
//! agent's final answer, the score table and the judge's rationale, rendered
//! as pretty JSON or markdown.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::debate::DebateOutcome;

/// One row of the score table.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreRow {
    pub agent: String,
    pub total: f64,
    pub per_dimension: BTreeMap<String, f64>,
    pub note: String,
}

/// Renderable summary of a finished debate.
#[derive(Debug, Clone, Serialize)]
pub struct DebateReport {
    pub debate_id: String,
    pub question: String,
    pub winner: String,
    /// Every agent's final answer, one markdown section per agent in
    /// roster order.
    pub synthesis: String,
    /// Score rows in descending total order; ties by agent id.
    pub rows: Vec<ScoreRow>,
    pub rationale: String,
    pub duration_ms: u64,
}

impl DebateReport {
    /// Assemble a report from a finished run.
    pub fn from_outcome(question: &str, outcome: &DebateOutcome) -> Self {
        let synthesis = outcome
            .transcript
            .roster()
            .iter()
            .filter_map(|id| {
                outcome
                    .transcript
                    .latest_answer(id)
                    .map(|turn| format!("### {}\n{}", id, turn.text))
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut rows: Vec<ScoreRow> = outcome
            .verdict
            .sheet
            .scores
            .iter()
            .map(|(agent, score)| ScoreRow {
                agent: agent.clone(),
                total: score.total,
                per_dimension: score.per_dimension.clone(),
                note: score.note.clone(),
            })
            .collect();
        rows.sort_by(|a, b| {
            b.total
                .total_cmp(&a.total)
                .then_with(|| a.agent.cmp(&b.agent))
        });

        Self {
            debate_id: outcome.debate_id.clone(),
            question: question.to_string(),
            winner: outcome.verdict.winner.label(),
            synthesis,
            rows,
            rationale: outcome.verdict.rationale.clone(),
            duration_ms: outcome.duration_ms,
        }
    }

    /// Pretty-printed JSON rendering.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Markdown rendering with the synthesis and the score table.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# Final Synthesis\n\n**Question:** {}\n\n", self.question));
        out.push_str(&self.synthesis);
        out.push_str("\n\n## Scores\n\n");

        let dimensions: Vec<&String> = self
            .rows
            .first()
            .map(|row| row.per_dimension.keys().collect())
            .unwrap_or_default();

        out.push_str("| Agent | Total |");
        for dim in &dimensions {
            out.push_str(&format!(" {} |", dim));
        }
        out.push_str("\n|---|---|");
        for _ in &dimensions {
            out.push_str("---|");
        }
        out.push('\n');
        for row in &self.rows {
            out.push_str(&format!("| {} | {:.2} |", row.agent, row.total));
            for dim in &dimensions {
                let score = row.per_dimension.get(*dim).copied().unwrap_or(0.0);
                out.push_str(&format!(" {:.1} |", score));
            }
            out.push('\n');
        }

        out.push_str(&format!("\n**Winner:** {}\n\n{}\n", self.winner, self.rationale));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debate::{Phase, Transcript, Turn};
    use crate::judge::{AgentScore, ScoreSheet, Verdict, Winner};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn outcome() -> DebateOutcome {
        let mut transcript = Transcript::new(vec!["A".to_string(), "B".to_string()]);
        for (speaker, text) in [("A", "final answer a"), ("B", "final answer b")] {
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

        let mut sheet = ScoreSheet::default();
        for (agent, total) in [("A", 7.5), ("B", 4.0)] {
            let mut per_dimension = BTreeMap::new();
            per_dimension.insert("soundness".to_string(), total);
            sheet.insert(
                agent,
                AgentScore {
                    per_dimension,
                    total,
                    note: "n".to_string(),
                },
            );
        }

        DebateOutcome {
            debate_id: "d-1".to_string(),
            transcript,
            verdict: Verdict {
                winner: Winner::Agent("A".to_string()),
                sheet,
                rationale: "A was stronger".to_string(),
            },
            duration_ms: 1234,
        }
    }

    #[test]
    fn report_orders_rows_by_total_descending() {
        let report = DebateReport::from_outcome("q?", &outcome());
        assert_eq!(report.winner, "A");
        assert_eq!(report.rows[0].agent, "A");
        assert_eq!(report.rows[1].agent, "B");
        assert!(report.synthesis.starts_with("### A\nfinal answer a"));
    }

    #[test]
    fn markdown_contains_table_and_winner() {
        let md = DebateReport::from_outcome("q?", &outcome()).to_markdown();
        assert!(md.starts_with("# Final Synthesis"));
        assert!(md.contains("| Agent | Total | soundness |"));
        assert!(md.contains("| A | 7.50 | 7.5 |"));
        assert!(md.contains("**Winner:** A"));
    }

    #[test]
    fn json_roundtrips_as_object() {
        let json = DebateReport::from_outcome("q?", &outcome()).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["winner"], "A");
        assert_eq!(value["rows"][0]["agent"], "A");
    }
}
