//! Feature classifier: an ordered rule table, first match wins.
//!
//! The rule table is the single source of truth for stream assignment on the
//! form path. The trainable model in [`super::model`] is fitted on examples
//! labelled by this table, never on anything else.

use tracing::debug;

use super::features::FeatureVector;
use crate::stream::StreamLabel;

/// Anything that maps a validated feature vector to a stream.
///
/// Implementations must be total: every vector gets a label.
pub trait Classifier: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &str;

    fn classify(&self, vector: &FeatureVector) -> StreamLabel;
}

/// A single priority rule.
#[derive(Debug, Clone, Copy)]
pub struct StreamRule {
    /// Identifier reported by [`RuleClassifier::explain`].
    pub name: &'static str,
    pub stream: StreamLabel,
    pub matches: fn(&FeatureVector) -> bool,
}

/// Label used when no rule matches.
pub const DEFAULT_STREAM: StreamLabel = StreamLabel::Commerce;
/// Name reported when no rule matches.
pub const DEFAULT_RULE: &str = "default";

/// The priority order. Earlier rules shadow later ones.
pub static RULES: &[StreamRule] = &[
    StreamRule {
        name: "engineering",
        stream: StreamLabel::SciencePcm,
        matches: |v| v.likes_coding() && v.math_score() >= 60,
    },
    StreamRule {
        name: "medical",
        stream: StreamLabel::SciencePcb,
        matches: |v| v.science_score() >= 70 && !v.likes_coding(),
    },
    StreamRule {
        name: "accounting",
        stream: StreamLabel::CommerceCa,
        matches: |v| v.likes_finance() && v.logic_aptitude() >= 7,
    },
    StreamRule {
        name: "general_commerce",
        stream: StreamLabel::Commerce,
        matches: |v| v.likes_finance(),
    },
    StreamRule {
        name: "humanities",
        stream: StreamLabel::Arts,
        matches: |v| v.likes_art() || v.creative_aptitude() >= 7 || v.history_score() >= 70,
    },
];

/// Deterministic classifier over [`RULES`].
#[derive(Debug, Clone, Copy)]
pub struct RuleClassifier {
    rules: &'static [StreamRule],
}

impl RuleClassifier {
    pub fn new() -> Self {
        Self { rules: RULES }
    }

    /// The first matching rule's name and stream, or the default.
    pub fn explain(&self, vector: &FeatureVector) -> (&'static str, StreamLabel) {
        self.rules
            .iter()
            .find(|rule| (rule.matches)(vector))
            .map(|rule| (rule.name, rule.stream))
            .unwrap_or((DEFAULT_RULE, DEFAULT_STREAM))
    }
}

impl Default for RuleClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier for RuleClassifier {
    fn name(&self) -> &str {
        "rules"
    }

    fn classify(&self, vector: &FeatureVector) -> StreamLabel {
        let (rule, stream) = self.explain(vector);
        debug!(rule, stream = %stream, "Rule table matched");
        stream
    }
}
