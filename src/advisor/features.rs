//! Questionnaire features for the form path.

use serde::{Deserialize, Serialize};
use serde_json::Number;

use crate::error::ClassifierError;

/// Valid range for subject scores (percent).
pub const SCORE_RANGE: std::ops::RangeInclusive<u8> = 0..=100;
/// Valid range for self-rated aptitudes.
pub const APTITUDE_RANGE: std::ops::RangeInclusive<u8> = 1..=10;

/// A questionnaire as submitted by a form. Every field is optional here so
/// that a missing answer is reported instead of silently defaulted. Numeric
/// answers are taken as any JSON number so that negative, fractional and
/// oversized values reach [`FeatureForm::validate`] and are reported per field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureForm {
    #[serde(default, alias = "math")]
    pub math_score: Option<Number>,
    #[serde(default, alias = "science")]
    pub science_score: Option<Number>,
    #[serde(default, alias = "history")]
    pub history_score: Option<Number>,
    #[serde(default, alias = "logic")]
    pub logic_aptitude: Option<Number>,
    #[serde(default, alias = "creative")]
    pub creative_aptitude: Option<Number>,
    #[serde(default, alias = "coding")]
    pub likes_coding: Option<bool>,
    #[serde(default, alias = "finance")]
    pub likes_finance: Option<bool>,
    #[serde(default, alias = "art")]
    pub likes_art: Option<bool>,
}

/// A complete, range-checked feature vector. Only obtainable through
/// [`FeatureForm::validate`] or [`FeatureVector::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeatureVector {
    math_score: u8,
    science_score: u8,
    history_score: u8,
    logic_aptitude: u8,
    creative_aptitude: u8,
    likes_coding: bool,
    likes_finance: bool,
    likes_art: bool,
}

/// Number of numeric features fed to the trainable classifier.
pub const FEATURE_COUNT: usize = 8;

/// Feature names, in the order of [`FeatureVector::as_array`].
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "math_score",
    "science_score",
    "history_score",
    "logic_aptitude",
    "creative_aptitude",
    "likes_coding",
    "likes_finance",
    "likes_art",
];

fn required<T>(value: Option<T>, field: &str) -> Result<T, ClassifierError> {
    value.ok_or_else(|| ClassifierError::InvalidFeatureVector {
        field: field.to_string(),
        reason: "is missing".to_string(),
    })
}

/// Convert a submitted number to a whole value inside `range`.
fn whole_in_range(
    value: Option<&Number>,
    range: &std::ops::RangeInclusive<u8>,
    field: &str,
) -> Result<u8, ClassifierError> {
    let value = required(value, field)?;
    let invalid = |reason: String| ClassifierError::InvalidFeatureVector {
        field: field.to_string(),
        reason,
    };
    match value.as_i64() {
        Some(whole) => match u8::try_from(whole) {
            Ok(byte) => in_range(byte, range, field),
            Err(_) => Err(invalid(format!(
                "must be between {} and {}, got {whole}",
                range.start(),
                range.end()
            ))),
        },
        None if value.is_u64() => Err(invalid(format!(
            "must be between {} and {}, got {value}",
            range.start(),
            range.end()
        ))),
        None => Err(invalid(format!("must be a whole number, got {value}"))),
    }
}

fn in_range(
    value: u8,
    range: &std::ops::RangeInclusive<u8>,
    field: &str,
) -> Result<u8, ClassifierError> {
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ClassifierError::InvalidFeatureVector {
            field: field.to_string(),
            reason: format!(
                "must be between {} and {}, got {}",
                range.start(),
                range.end(),
                value
            ),
        })
    }
}

impl FeatureForm {
    /// Check presence and range of every field. Fields are checked in
    /// declaration order and the first problem is reported.
    pub fn validate(&self) -> Result<FeatureVector, ClassifierError> {
        let math = whole_in_range(self.math_score.as_ref(), &SCORE_RANGE, "math_score")?;
        let science = whole_in_range(self.science_score.as_ref(), &SCORE_RANGE, "science_score")?;
        let history = whole_in_range(self.history_score.as_ref(), &SCORE_RANGE, "history_score")?;
        let logic = whole_in_range(self.logic_aptitude.as_ref(), &APTITUDE_RANGE, "logic_aptitude")?;
        let creative =
            whole_in_range(self.creative_aptitude.as_ref(), &APTITUDE_RANGE, "creative_aptitude")?;
        let coding = required(self.likes_coding, "likes_coding")?;
        let finance = required(self.likes_finance, "likes_finance")?;
        let art = required(self.likes_art, "likes_art")?;

        FeatureVector::new(math, science, history, logic, creative, coding, finance, art)
    }
}

impl FeatureVector {
    /// Build a vector from raw values, rejecting anything out of range.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        math_score: u8,
        science_score: u8,
        history_score: u8,
        logic_aptitude: u8,
        creative_aptitude: u8,
        likes_coding: bool,
        likes_finance: bool,
        likes_art: bool,
    ) -> Result<Self, ClassifierError> {
        Ok(Self {
            math_score: in_range(math_score, &SCORE_RANGE, "math_score")?,
            science_score: in_range(science_score, &SCORE_RANGE, "science_score")?,
            history_score: in_range(history_score, &SCORE_RANGE, "history_score")?,
            logic_aptitude: in_range(logic_aptitude, &APTITUDE_RANGE, "logic_aptitude")?,
            creative_aptitude: in_range(creative_aptitude, &APTITUDE_RANGE, "creative_aptitude")?,
            likes_coding,
            likes_finance,
            likes_art,
        })
    }

    pub fn math_score(&self) -> u8 {
        self.math_score
    }

    pub fn science_score(&self) -> u8 {
        self.science_score
    }

    pub fn history_score(&self) -> u8 {
        self.history_score
    }

    pub fn logic_aptitude(&self) -> u8 {
        self.logic_aptitude
    }

    pub fn creative_aptitude(&self) -> u8 {
        self.creative_aptitude
    }

    pub fn likes_coding(&self) -> bool {
        self.likes_coding
    }

    pub fn likes_finance(&self) -> bool {
        self.likes_finance
    }

    pub fn likes_art(&self) -> bool {
        self.likes_art
    }

    /// Numeric encoding (booleans as 0/1), ordered as [`FEATURE_NAMES`].
    pub fn as_array(&self) -> [f64; FEATURE_COUNT] {
        [
            f64::from(self.math_score),
            f64::from(self.science_score),
            f64::from(self.history_score),
            f64::from(self.logic_aptitude),
            f64::from(self.creative_aptitude),
            f64::from(u8::from(self.likes_coding)),
            f64::from(u8::from(self.likes_finance)),
            f64::from(u8::from(self.likes_art)),
        ]
    }
}
