// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Score to letter-grade projection.
//!
//! The step table is configuration, not business logic: clients may submit
//! their own grade and it is stored as-is. The scale is only consulted when
//! a calculation arrives without one.

use std::fmt;
use std::str::FromStr;

/// One step of the grade table: scores `>= min_score` earn `grade`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeStep {
    pub min_score: i32,
    pub grade: String,
}

/// Monotonic step table mapping a 0-100 score to a letter grade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeScale {
    /// Strictly descending by `min_score`.
    steps: Vec<GradeStep>,
    /// Grade for scores below every step.
    floor: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GradeScaleError {
    #[error("grade step '{0}' must look like LETTER:MIN_SCORE")]
    Malformed(String),
    #[error("grade thresholds must be strictly descending (got {previous} then {next})")]
    NotDescending { previous: i32, next: i32 },
    #[error("grade scale needs at least one step")]
    Empty,
}

impl Default for GradeScale {
    fn default() -> Self {
        let step = |min_score, grade: &str| GradeStep {
            min_score,
            grade: grade.to_string(),
        };

        Self {
            steps: vec![step(90, "A"), step(80, "B"), step(70, "C"), step(60, "D")],
            floor: "F".to_string(),
        }
    }
}

impl GradeScale {
    /// Build a scale, rejecting tables that are not strictly descending.
    pub fn new(steps: Vec<GradeStep>, floor: impl Into<String>) -> Result<Self, GradeScaleError> {
        if steps.is_empty() {
            return Err(GradeScaleError::Empty);
        }

        for pair in steps.windows(2) {
            if pair[1].min_score >= pair[0].min_score {
                return Err(GradeScaleError::NotDescending {
                    previous: pair[0].min_score,
                    next: pair[1].min_score,
                });
            }
        }

        Ok(Self {
            steps,
            floor: floor.into(),
        })
    }

    /// Project a score onto the table.
    pub fn grade_for(&self, score: i32) -> &str {
        self.steps
            .iter()
            .find(|step| score >= step.min_score)
            .map(|step| step.grade.as_str())
            .unwrap_or(&self.floor)
    }

    pub fn steps(&self) -> &[GradeStep] {
        &self.steps
    }
}

impl FromStr for GradeScale {
    type Err = GradeScaleError;

    /// Parse `A:90,B:80,C:70,D:60`; an optional trailing `F` (no colon)
    /// names the floor grade, which otherwise defaults to `F`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let mut steps = Vec::new();
        let mut floor = "F".to_string();

        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.split_once(':') {
                Some((grade, min)) => {
                    let grade = grade.trim();
                    let min_score = min
                        .trim()
                        .parse::<i32>()
                        .map_err(|_| GradeScaleError::Malformed(part.to_string()))?;
                    if grade.is_empty() {
                        return Err(GradeScaleError::Malformed(part.to_string()));
                    }
                    steps.push(GradeStep {
                        min_score,
                        grade: grade.to_string(),
                    });
                }
                None => floor = part.to_string(),
            }
        }

        Self::new(steps, floor)
    }
}

impl fmt::Display for GradeScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            write!(f, "{}:{},", step.grade, step.min_score)?;
        }
        write!(f, "{}", self.floor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scale_boundaries() {
        let scale = GradeScale::default();
        assert_eq!(scale.grade_for(100), "A");
        assert_eq!(scale.grade_for(90), "A");
        assert_eq!(scale.grade_for(89), "B");
        assert_eq!(scale.grade_for(70), "C");
        assert_eq!(scale.grade_for(60), "D");
        assert_eq!(scale.grade_for(59), "F");
        assert_eq!(scale.grade_for(0), "F");
        assert_eq!(scale.grade_for(-5), "F");
    }

    #[test]
    fn projection_is_monotonic() {
        let scale = GradeScale::default();
        let rank = |g: &str| ["F", "D", "C", "B", "A"].iter().position(|x| *x == g);
        let mut previous = rank(scale.grade_for(0));
        for score in 1..=100 {
            let current = rank(scale.grade_for(score));
            assert!(current >= previous, "grade dropped at score {score}");
            previous = current;
        }
    }

    #[test]
    fn parses_custom_table() {
        let scale: GradeScale = "S:95, A:85, B:70, E".parse().unwrap();
        assert_eq!(scale.grade_for(96), "S");
        assert_eq!(scale.grade_for(85), "A");
        assert_eq!(scale.grade_for(71), "B");
        assert_eq!(scale.grade_for(10), "E");
        assert_eq!(scale.to_string(), "S:95,A:85,B:70,E");
    }

    #[test]
    fn rejects_non_descending_table() {
        assert_eq!(
            "A:80,B:85".parse::<GradeScale>(),
            Err(GradeScaleError::NotDescending {
                previous: 80,
                next: 85
            })
        );
        assert_eq!("".parse::<GradeScale>(), Err(GradeScaleError::Empty));
        assert!(matches!(
            "A:ninety".parse::<GradeScale>(),
            Err(GradeScaleError::Malformed(_))
        ));
    }
}
