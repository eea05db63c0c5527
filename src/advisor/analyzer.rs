//! Conversation analyzer: asks the oracle whether the transcript carries
//! enough signal to commit to a stream.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::transcript::Transcript;
use super::verdict::{AnalyzerVerdict, FALLBACK_MESSAGE, FallbackReason, interpret_reply};
use crate::error::{AnalyzerError, LlmError};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::stream::StreamLabel;

const SYSTEM_PROMPT: &str = "\
You are a career counselor helping a student pick an academic stream after 10th grade.
Be warm and concise. Ask ONE question at a time.
Reply with a single JSON object and nothing else.";

/// Low temperature keeps the reply grammar stable.
const TEMPERATURE: f32 = 0.2;
const MAX_TOKENS: u32 = 512;

/// Build the analysis prompt for a transcript.
///
/// The prompt embeds the whole transcript, the closed label list and the
/// reply grammar. The line form is described as an accepted alternative.
pub fn build_prompt(transcript: &Transcript) -> String {
    let labels = StreamLabel::prompt_list();
    format!(
        "\
Read this conversation:
{conversation}

If the student has shared enough about their interests and dislikes, recommend ONE stream from: [{labels}].
If not, ask a follow-up question.

Respond with a JSON object exactly like this:
{{\"status\": \"RECOMMEND\" or \"ASK\", \"content\": \"<your reply to the student>\", \"stream\": \"<stream name>\" or null}}

\"stream\" must be one of the names above, spelled exactly, when status is RECOMMEND, and null when status is ASK.
If you cannot produce JSON, use exactly three lines instead:
Status: RECOMMEND or ASK
Content: <your reply to the student>
Stream: <stream name if Status is RECOMMEND, else None>",
        conversation = transcript.render(),
    )
}

/// Turns a transcript into an [`AnalyzerVerdict`] with one oracle call.
pub struct ConversationAnalyzer {
    llm: Arc<dyn LlmProvider>,
    oracle_timeout: Option<Duration>,
}

impl ConversationAnalyzer {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            oracle_timeout: None,
        }
    }

    /// Bound the oracle call. Elapsed time is treated like an oracle failure.
    pub fn with_oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout = Some(timeout);
        self
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// Analyze the transcript. Never fails: every error path degrades to an
    /// `Ask` verdict tagged with its [`FallbackReason`].
    pub async fn analyze(&self, transcript: &Transcript) -> AnalyzerVerdict {
        let raw = match self.call_oracle(transcript).await {
            Ok(raw) => raw,
            Err(e) => {
                let err = AnalyzerError::from(e);
                warn!(error = %err, "Oracle call failed, asking again");
                return AnalyzerVerdict::fallback(
                    FALLBACK_MESSAGE,
                    FallbackReason::OracleUnavailable,
                );
            }
        };
        debug!(raw = %raw, "Oracle reply");

        match interpret_reply(&raw) {
            Ok(verdict) => {
                info!(
                    decision = %verdict.decision(),
                    stream = ?verdict.stream(),
                    "Analyzer verdict"
                );
                verdict
            }
            Err((verdict, err)) => {
                warn!(error = %err, reason = ?verdict.fallback_reason(), "Unusable oracle reply");
                verdict
            }
        }
    }

    async fn call_oracle(&self, transcript: &Transcript) -> Result<String, LlmError> {
        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_prompt(transcript)),
        ];
        let request = CompletionRequest::new(messages)
            .with_max_tokens(MAX_TOKENS)
            .with_temperature(TEMPERATURE);

        let response = match self.oracle_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.llm.complete(request))
                .await
                .map_err(|_| LlmError::Timeout {
                    provider: self.llm.model_name().to_string(),
                    timeout,
                })??,
            None => self.llm.complete(request).await?,
        };
        Ok(response.content)
    }
}
