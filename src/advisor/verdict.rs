//! Analyzer verdicts and the oracle reply grammar.
//!
//! The preferred reply is a JSON object:
//!
//! ```text
//! {"status": "RECOMMEND", "content": "Great fit!", "stream": "Science (PCM)"}
//! ```
//!
//! The three-line form is accepted as a compatibility shim:
//!
//! ```text
//! Status: RECOMMEND
//! Content: Great fit!
//! Stream: Science (PCM)
//! ```
//!
//! Every field is validated before a verdict is built; a stream label is
//! never passed on unless it parses into [`StreamLabel`].

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AnalyzerError, StreamError};
use crate::stream::StreamLabel;

/// Shown when the oracle is unreachable or its reply is unusable.
pub const FALLBACK_MESSAGE: &str = "I didn't quite catch that. Could you tell me a bit more about \
the subjects you enjoy and the ones you'd rather avoid?";

/// Prefixed to raw oracle text when none of the grammar could be recognised.
pub const RAW_CAVEAT: &str = "(I couldn't format this reply properly, so here it is as written.)";

/// Whether to keep probing or commit to a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Ask,
    Recommend,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ask => write!(f, "ASK"),
            Self::Recommend => write!(f, "RECOMMEND"),
        }
    }
}

/// Why a verdict was degraded to the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    OracleUnavailable,
    VerdictParse,
    InvalidStreamLabel,
}

impl From<&AnalyzerError> for FallbackReason {
    fn from(err: &AnalyzerError) -> Self {
        match err {
            AnalyzerError::OracleUnavailable(_) => Self::OracleUnavailable,
            AnalyzerError::VerdictParse { .. } => Self::VerdictParse,
            AnalyzerError::InvalidStreamLabel(_) => Self::InvalidStreamLabel,
        }
    }
}

/// The analyzer's decision for one turn.
///
/// `stream` is present if and only if `decision` is [`Decision::Recommend`];
/// the constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalyzerVerdict {
    decision: Decision,
    message: String,
    stream: Option<StreamLabel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fallback: Option<FallbackReason>,
}

impl AnalyzerVerdict {
    pub fn ask(message: impl Into<String>) -> Self {
        Self {
            decision: Decision::Ask,
            message: message.into(),
            stream: None,
            fallback: None,
        }
    }

    pub fn recommend(message: impl Into<String>, stream: StreamLabel) -> Self {
        Self {
            decision: Decision::Recommend,
            message: message.into(),
            stream: Some(stream),
            fallback: None,
        }
    }

    /// An `Ask` verdict standing in for a failed analysis.
    pub fn fallback(message: impl Into<String>, reason: FallbackReason) -> Self {
        Self {
            fallback: Some(reason),
            ..Self::ask(message)
        }
    }

    pub fn decision(&self) -> Decision {
        self.decision
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn stream(&self) -> Option<StreamLabel> {
        self.stream
    }

    pub fn fallback_reason(&self) -> Option<FallbackReason> {
        self.fallback
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Raw fields pulled out of a reply, before validation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct ReplyFields {
    status: Option<String>,
    content: Option<String>,
    stream: Option<String>,
    /// Set by the line grammar when the `Stream:` line is present (even if it
    /// says `None`). The JSON form treats a missing key as null.
    stream_line_seen: bool,
}

#[derive(Debug, Deserialize)]
struct ReplyJson {
    status: String,
    content: String,
    #[serde(default)]
    stream: Option<String>,
}

/// Extract a JSON object from oracle output (handles markdown wrapping).
fn extract_json_object(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

fn parse_json(raw: &str) -> Option<ReplyFields> {
    let json = extract_json_object(raw)?;
    let reply: ReplyJson = serde_json::from_str(json).ok()?;
    Some(ReplyFields {
        status: Some(reply.status),
        content: Some(reply.content),
        stream: reply.stream,
        stream_line_seen: true,
    })
}

/// Strip markdown emphasis, list bullets and brackets around a key or value.
fn clean(s: &str) -> &str {
    s.trim()
        .trim_matches(|c: char| matches!(c, '*' | '_' | '#' | '-' | '`'))
        .trim()
        .trim_matches(|c: char| matches!(c, '[' | ']' | '"' | '\''))
        .trim()
}

/// `Key: value`, optionally wrapped in markdown emphasis or a list bullet.
static FIELD_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[\s*_#`\-]*(status|content|stream)[\s*_`]*:(.*)$").unwrap()
});

/// Split a line into (key, value) if it starts with one of the grammar's keys.
/// Content keeps its punctuation; only emphasis markers are removed.
fn grammar_line(line: &str) -> Option<(&'static str, &str)> {
    let caps = FIELD_LINE.captures(line)?;
    let value = caps.get(2).map_or("", |m| m.as_str());
    match caps[1].to_ascii_lowercase().as_str() {
        "status" => Some(("status", clean(value))),
        "content" => Some((
            "content",
            value.trim().trim_start_matches(['*', '_']).trim(),
        )),
        "stream" => Some(("stream", clean(value))),
        _ => None,
    }
}

#[derive(PartialEq)]
enum Cursor {
    Start,
    Status,
    Content,
    Stream,
}

fn parse_lines(raw: &str) -> Result<ReplyFields, AnalyzerError> {
    let mut fields = ReplyFields::default();
    let mut cursor = Cursor::Start;

    for line in raw.lines() {
        match grammar_line(line) {
            Some(("status", value)) if cursor == Cursor::Start => {
                fields.status = Some(value.to_string());
                cursor = Cursor::Status;
            }
            Some(("content", value)) if cursor == Cursor::Status => {
                fields.content = Some(value.to_string());
                cursor = Cursor::Content;
            }
            Some(("stream", value)) if cursor == Cursor::Content => {
                fields.stream = Some(value.to_string());
                fields.stream_line_seen = true;
                cursor = Cursor::Stream;
            }
            Some((key, _)) => {
                return Err(AnalyzerError::VerdictParse {
                    reason: format!("'{key}' line out of order or repeated"),
                });
            }
            None if cursor == Cursor::Content => {
                // Continuation of a multi-line Content field.
                let extra = line.trim();
                if let (false, Some(content)) = (extra.is_empty(), fields.content.as_mut()) {
                    content.push('\n');
                    content.push_str(extra);
                }
            }
            None => {}
        }
    }

    if cursor == Cursor::Start {
        return Err(AnalyzerError::VerdictParse {
            reason: "no grammar fields found".to_string(),
        });
    }
    Ok(fields)
}

fn is_null_label(s: &str) -> bool {
    s.is_empty() || s.eq_ignore_ascii_case("none") || s.eq_ignore_ascii_case("null")
}

fn validate(fields: ReplyFields) -> Result<AnalyzerVerdict, AnalyzerError> {
    let status = fields.status.ok_or_else(|| AnalyzerError::VerdictParse {
        reason: "missing Status".to_string(),
    })?;
    let decision = match clean(&status).to_ascii_uppercase().as_str() {
        "ASK" => Decision::Ask,
        "RECOMMEND" => Decision::Recommend,
        other => {
            return Err(AnalyzerError::VerdictParse {
                reason: format!("unknown status '{other}'"),
            });
        }
    };

    let content = fields
        .content
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AnalyzerError::VerdictParse {
            reason: "missing or empty Content".to_string(),
        })?;

    if !fields.stream_line_seen {
        return Err(AnalyzerError::VerdictParse {
            reason: "missing Stream".to_string(),
        });
    }

    match decision {
        Decision::Ask => Ok(AnalyzerVerdict::ask(content)),
        Decision::Recommend => {
            let raw_label = fields.stream.as_deref().map(clean).unwrap_or_default();
            if is_null_label(raw_label) {
                return Err(AnalyzerError::InvalidStreamLabel(StreamError::Unknown {
                    label: raw_label.to_string(),
                }));
            }
            let stream: StreamLabel = raw_label.parse()?;
            Ok(AnalyzerVerdict::recommend(content, stream))
        }
    }
}

/// Parse and validate an oracle reply.
pub fn parse_reply(raw: &str) -> Result<AnalyzerVerdict, AnalyzerError> {
    let fields = match parse_json(raw) {
        Some(fields) => fields,
        None => parse_lines(raw)?,
    };
    validate(fields)
}

/// Turn any reply into a verdict. Never fails and never returns a partially
/// populated verdict: on error the result is an `Ask` fallback.
pub fn interpret_reply(raw: &str) -> Result<AnalyzerVerdict, (AnalyzerVerdict, AnalyzerError)> {
    let err = match parse_reply(raw) {
        Ok(verdict) => return Ok(verdict),
        Err(err) => err,
    };
    let reason = FallbackReason::from(&err);
    let recognised = parse_json(raw).or_else(|| parse_lines(raw).ok());
    let trimmed = raw.trim();

    let message = match (reason, recognised) {
        (FallbackReason::VerdictParse, None) if !trimmed.is_empty() => {
            format!("{RAW_CAVEAT}\n\n{trimmed}")
        }
        // The oracle said something sensible, only the label was unusable.
        (FallbackReason::InvalidStreamLabel, Some(fields)) => fields
            .content
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| FALLBACK_MESSAGE.to_string()),
        _ => FALLBACK_MESSAGE.to_string(),
    };
    Err((AnalyzerVerdict::fallback(message, reason), err))
}
