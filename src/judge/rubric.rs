//! Weighted scoring rubric.
//!
//! A [`Rubric`] is an ordered set of uniquely named, positively weighted
//! dimensions. Weights need not sum to one; aggregation normalizes them
//! internally so callers never pre-normalize.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::JudgeError;

/// Maximum per-dimension score.
pub const SCORE_MAX: f64 = 10.0;

/// One named, weighted scoring dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RubricDimension {
    /// Unique dimension name.
    pub name: String,
    /// Positive weight; relative to the other dimensions' weights.
    pub weight: f64,
}

impl RubricDimension {
    pub fn new(name: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            weight,
        }
    }
}

/// Immutable ordered set of scoring dimensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rubric {
    name: String,
    dimensions: Vec<RubricDimension>,
}

impl Rubric {
    /// Create a validated rubric.
    ///
    /// # Errors
    ///
    /// Returns [`JudgeError::InvalidRubric`] when the dimension list is
    /// empty, a name is empty or duplicated, or a weight is not positive.
    pub fn new(
        name: impl Into<String>,
        dimensions: Vec<RubricDimension>,
    ) -> Result<Self, JudgeError> {
        if dimensions.is_empty() {
            return Err(JudgeError::InvalidRubric(
                "rubric must have at least one dimension".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for dim in &dimensions {
            if dim.name.trim().is_empty() {
                return Err(JudgeError::InvalidRubric(
                    "dimension name must be non-empty".to_string(),
                ));
            }
            if !seen.insert(dim.name.clone()) {
                return Err(JudgeError::InvalidRubric(format!(
                    "duplicate dimension '{}'",
                    dim.name
                )));
            }
            if !(dim.weight > 0.0) || !dim.weight.is_finite() {
                return Err(JudgeError::InvalidRubric(format!(
                    "dimension '{}' has non-positive weight {}",
                    dim.name, dim.weight
                )));
            }
        }
        Ok(Self {
            name: name.into(),
            dimensions,
        })
    }

    /// The general-reasoning rubric used when none is configured.
    pub fn default_rubric() -> Self {
        Self::new(
            "GeneralReasoningV1",
            vec![
                RubricDimension::new("soundness", 3.0),
                RubricDimension::new("evidence", 2.0),
                RubricDimension::new("constraints", 2.0),
                RubricDimension::new("safety", 1.0),
                RubricDimension::new("clarity", 1.0),
            ],
        )
        .expect("default rubric must be valid")
    }

    /// Rubric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dimensions in rubric order.
    pub fn dimensions(&self) -> &[RubricDimension] {
        &self.dimensions
    }

    /// Weighted total of a complete per-dimension score map.
    ///
    /// Weights are normalized internally, so the result is a weighted mean
    /// and stays within the per-dimension score bounds.
    ///
    /// # Errors
    ///
    /// Returns [`JudgeError::MissingDimension`] when any rubric dimension
    /// is absent from `scores`.
    pub fn aggregate(&self, scores: &BTreeMap<String, f64>) -> Result<f64, JudgeError> {
        let weight_sum: f64 = self.dimensions.iter().map(|d| d.weight).sum();
        let mut total = 0.0;
        for dim in &self.dimensions {
            let score = scores
                .get(&dim.name)
                .copied()
                .ok_or_else(|| JudgeError::MissingDimension(dim.name.clone()))?;
            total += score * (dim.weight / weight_sum);
        }
        Ok(total)
    }

    /// Scoring instructions handed to LLM judges.
    pub fn instructions(&self) -> String {
        let desc = self
            .dimensions
            .iter()
            .map(|d| format!("- {}: weight {}", d.name, d.weight))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "You are a judge. Score each submission 0-{} per criterion. Criteria:\n{}\n\
             Respond as a JSON object mapping each criterion name to \
             {{\"score\": number, \"note\": \"brief justification\"}}, plus a top-level \
             \"verdict\" key holding a one-sentence verdict.",
            SCORE_MAX as u32, desc
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rubric_shape() {
        let rubric = Rubric::default_rubric();
        assert_eq!(rubric.name(), "GeneralReasoningV1");
        assert_eq!(rubric.dimensions().len(), 5);
        assert_eq!(rubric.dimensions()[0].name, "soundness");
        assert!((rubric.dimensions()[0].weight - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_invalid_rubrics() {
        assert!(matches!(
            Rubric::new("empty", vec![]),
            Err(JudgeError::InvalidRubric(_))
        ));
        assert!(matches!(
            Rubric::new(
                "dup",
                vec![
                    RubricDimension::new("a", 1.0),
                    RubricDimension::new("a", 2.0)
                ]
            ),
            Err(JudgeError::InvalidRubric(_))
        ));
        assert!(matches!(
            Rubric::new("neg", vec![RubricDimension::new("a", -1.0)]),
            Err(JudgeError::InvalidRubric(_))
        ));
        assert!(matches!(
            Rubric::new("zero", vec![RubricDimension::new("a", 0.0)]),
            Err(JudgeError::InvalidRubric(_))
        ));
    }

    #[test]
    fn aggregate_is_a_normalized_weighted_sum() {
        let rubric = Rubric::new(
            "even",
            vec![
                RubricDimension::new("a", 1.0),
                RubricDimension::new("b", 1.0),
            ],
        )
        .unwrap();

        let mut scores = BTreeMap::new();
        scores.insert("a".to_string(), 2.0);
        scores.insert("b".to_string(), 8.0);

        let total = rubric.aggregate(&scores).unwrap();
        assert!((total - 5.0).abs() < 1e-9);
    }

    #[test]
    fn aggregate_normalizes_uneven_weights() {
        let rubric = Rubric::new(
            "uneven",
            vec![
                RubricDimension::new("a", 3.0),
                RubricDimension::new("b", 1.0),
            ],
        )
        .unwrap();

        let mut scores = BTreeMap::new();
        scores.insert("a".to_string(), 10.0);
        scores.insert("b".to_string(), 2.0);

        // 10 * 0.75 + 2 * 0.25 = 8.0
        let total = rubric.aggregate(&scores).unwrap();
        assert!((total - 8.0).abs() < 1e-9);
    }

    #[test]
    fn aggregate_refuses_partial_input() {
        let rubric = Rubric::default_rubric();
        let mut scores = BTreeMap::new();
        scores.insert("soundness".to_string(), 5.0);

        assert!(matches!(
            rubric.aggregate(&scores),
            Err(JudgeError::MissingDimension(name)) if name == "evidence"
        ));
    }

    #[test]
    fn instructions_mention_every_dimension() {
        let text = Rubric::default_rubric().instructions();
        for dim in Rubric::default_rubric().dimensions() {
            assert!(text.contains(&dim.name));
        }
        assert!(text.contains("verdict"));
    }
}
