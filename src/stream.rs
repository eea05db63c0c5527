//! The closed set of academic streams a recommendation can name.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StreamError;

/// An academic stream offered after 10th grade.
///
/// This set is closed: labels coming from the oracle, a form, or the catalog
/// store must parse into one of these or be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StreamLabel {
    /// Physics, Chemistry, Mathematics. Engineering track.
    SciencePcm,
    /// Physics, Chemistry, Biology. Medical track.
    SciencePcb,
    /// Commerce with a chartered accountancy focus.
    CommerceCa,
    /// General commerce.
    Commerce,
    /// Humanities, design and social sciences.
    Arts,
}

impl StreamLabel {
    /// Every label, in a stable order.
    pub const ALL: [StreamLabel; 5] = [
        Self::SciencePcm,
        Self::SciencePcb,
        Self::CommerceCa,
        Self::Commerce,
        Self::Arts,
    ];

    /// Canonical display name. This is the only spelling `FromStr` accepts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SciencePcm => "Science (PCM)",
            Self::SciencePcb => "Science (PCB)",
            Self::CommerceCa => "Commerce (CA)",
            Self::Commerce => "Commerce",
            Self::Arts => "Arts",
        }
    }

    /// Canonical names joined for prompt embedding, e.g. `'Science (PCM)', 'Arts'`.
    pub fn prompt_list() -> String {
        Self::ALL
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for StreamLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamLabel {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|label| label.as_str() == trimmed)
            .ok_or_else(|| StreamError::Unknown {
                label: trimmed.to_string(),
            })
    }
}

impl TryFrom<String> for StreamLabel {
    type Error = StreamError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StreamLabel> for String {
    fn from(label: StreamLabel) -> Self {
        label.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_names_parse() {
        for label in StreamLabel::ALL {
            assert_eq!(label.as_str().parse::<StreamLabel>().unwrap(), label);
        }
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        let parsed: StreamLabel = "  Science (PCM) \n".parse().unwrap();
        assert_eq!(parsed, StreamLabel::SciencePcm);
    }

    #[test]
    fn near_misses_are_rejected() {
        for bad in ["science (pcm)", "Science(PCM)", "Engineering", "None", "", "Arts!"] {
            let err = bad.parse::<StreamLabel>().unwrap_err();
            assert!(matches!(err, StreamError::Unknown { .. }), "{bad} should be rejected");
        }
    }

    #[test]
    fn serde_uses_canonical_name() {
        let json = serde_json::to_string(&StreamLabel::CommerceCa).unwrap();
        assert_eq!(json, "\"Commerce (CA)\"");
        let parsed: StreamLabel = serde_json::from_str("\"Arts\"").unwrap();
        assert_eq!(parsed, StreamLabel::Arts);
        assert!(serde_json::from_str::<StreamLabel>("\"Medicine\"").is_err());
    }

    #[test]
    fn prompt_list_mentions_every_label() {
        let list = StreamLabel::prompt_list();
        for label in StreamLabel::ALL {
            assert!(list.contains(label.as_str()));
        }
    }
}
