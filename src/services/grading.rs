//! Pure score arithmetic: weight validation, weighted aggregation and grade banding.
//!
//! Nothing in here touches storage, so every function is deterministic in its inputs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub(crate) const WEIGHT_TOTAL: i32 = 100;
pub(crate) const MAX_SCORE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub(crate) enum Grade {
    #[serde(rename = "A+")]
    APlus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A-")]
    AMinus,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "B-")]
    BMinus,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "C-")]
    CMinus,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "F")]
    F,
}

/// Inclusive lower bounds, checked top-down. Anything below the last band is an F.
const GRADE_BANDS: &[(f64, Grade)] = &[
    (90.0, Grade::APlus),
    (85.0, Grade::A),
    (80.0, Grade::AMinus),
    (75.0, Grade::BPlus),
    (70.0, Grade::B),
    (65.0, Grade::BMinus),
    (60.0, Grade::CPlus),
    (55.0, Grade::C),
    (50.0, Grade::CMinus),
    (45.0, Grade::D),
];

impl Grade {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::AMinus => "A-",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::BMinus => "B-",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::CMinus => "C-",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

pub(crate) fn grade_for(score: f64) -> Grade {
    GRADE_BANDS
        .iter()
        .find(|(lower, _)| score >= *lower)
        .map(|(_, grade)| *grade)
        .unwrap_or(Grade::F)
}

/// Half-away-from-zero rounding to two decimal places.
pub(crate) fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Which half of the assessment a graded value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ScoreComponent {
    Assignment,
    Exam,
}

impl ScoreComponent {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            ScoreComponent::Assignment => "assignment",
            ScoreComponent::Exam => "exam",
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub(crate) enum GradingError {
    #[error("{field} must be between 0 and 100")]
    WeightOutOfRange { field: &'static str },
    #[error("weights must total 100%")]
    WeightTotal,
    #[error("{field} must be a number between 0 and 100")]
    ScoreOutOfRange { field: &'static str },
    #[error("max_marks must be a positive number")]
    InvalidMaxMarks,
    #[error("marks must be a number")]
    InvalidMarks,
}

/// A validated assignment/exam split; constructing one proves the weights total 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WeightSplit {
    assignments: i32,
    exams: i32,
}

impl WeightSplit {
    pub(crate) fn new(assignments: i32, exams: i32) -> Result<Self, GradingError> {
        if !(0..=WEIGHT_TOTAL).contains(&assignments) {
            return Err(GradingError::WeightOutOfRange { field: "assignments_weight" });
        }
        if !(0..=WEIGHT_TOTAL).contains(&exams) {
            return Err(GradingError::WeightOutOfRange { field: "exams_weight" });
        }
        if assignments + exams != WEIGHT_TOTAL {
            return Err(GradingError::WeightTotal);
        }

        Ok(Self { assignments, exams })
    }

    pub(crate) fn assignments(self) -> i32 {
        self.assignments
    }

    pub(crate) fn exams(self) -> i32 {
        self.exams
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Aggregate {
    pub(crate) overall_score: Option<f64>,
    pub(crate) grade: Option<Grade>,
}

impl Aggregate {
    pub(crate) const EMPTY: Aggregate = Aggregate { overall_score: None, grade: None };

    /// Rounds `score` and attaches its band, keeping grade and score in lockstep.
    pub(crate) fn from_score(score: f64) -> Self {
        let rounded = round_to_cents(score);
        Self { overall_score: Some(rounded), grade: Some(grade_for(rounded)) }
    }
}

/// Weighted overall score. Both components are required; a missing one withholds the result.
pub(crate) fn compute_overall(
    assignment_score: Option<f64>,
    exam_score: Option<f64>,
    weights: WeightSplit,
) -> Aggregate {
    match (assignment_score, exam_score) {
        (Some(assignment), Some(exam)) => {
            let weighted = assignment * f64::from(weights.assignments()) / 100.0
                + exam * f64::from(weights.exams()) / 100.0;
            Aggregate::from_score(weighted)
        }
        _ => Aggregate::EMPTY,
    }
}

pub(crate) fn validate_score(field: &'static str, value: f64) -> Result<f64, GradingError> {
    if value.is_finite() && (0.0..=MAX_SCORE).contains(&value) {
        Ok(value)
    } else {
        Err(GradingError::ScoreOutOfRange { field })
    }
}

/// Clamps raw marks into `[0, max_marks]` and rescales them to a percentage.
pub(crate) fn normalize_to_percent(marks: f64, max_marks: f64) -> Result<f64, GradingError> {
    if !max_marks.is_finite() || max_marks <= 0.0 {
        return Err(GradingError::InvalidMaxMarks);
    }
    if !marks.is_finite() {
        return Err(GradingError::InvalidMarks);
    }

    let clamped = marks.clamp(0.0, max_marks);
    Ok(round_to_cents(clamped / max_marks * MAX_SCORE))
}
