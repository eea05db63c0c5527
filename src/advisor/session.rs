//! Dialogue manager: per-session turn loop and the COLLECTING/RECOMMENDED
//! state machine.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::analyzer::ConversationAnalyzer;
use super::catalog::{Catalog, CatalogLookup, CatalogView};
use super::classifier::Classifier;
use super::features::FeatureForm;
use super::transcript::Transcript;
use super::verdict::{AnalyzerVerdict, Decision};
use crate::error::{ClassifierError, DialogueError};
use crate::stream::StreamLabel;

/// First assistant turn of every session.
pub const GREETING: &str = "Hi! I'm here to help you choose your stream. Tell me about your \
favorite subjects, hobbies, and what you hate studying!";

/// Where a session stands.
///
/// Collecting → Recommended when the analyzer commits; Recommended →
/// Recommended when a follow-up changes or confirms the stream; Recommended →
/// Collecting when a follow-up gets a genuine question back. A session holds a
/// recommendation exactly when it is `Recommended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialoguePhase {
    #[default]
    Collecting,
    Recommended,
}

impl std::fmt::Display for DialoguePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Collecting => "collecting",
            Self::Recommended => "recommended",
        };
        write!(f, "{s}")
    }
}

/// State of one conversation. Owned by the caller and passed by `&mut`
/// into [`DialogueManager::handle_turn`], so turns of one session are
/// processed strictly in order.
#[derive(Debug, Clone)]
pub struct DialogueSession {
    id: Uuid,
    transcript: Transcript,
    phase: DialoguePhase,
    recommendation: Option<StreamLabel>,
    created_at: DateTime<Utc>,
    last_active: DateTime<Utc>,
}

impl DialogueSession {
    /// A fresh session whose transcript opens with [`GREETING`].
    pub fn new() -> Self {
        let mut transcript = Transcript::new();
        transcript.push_assistant(GREETING);
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            transcript,
            phase: DialoguePhase::Collecting,
            recommendation: None,
            created_at: now,
            last_active: now,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn phase(&self) -> DialoguePhase {
        self.phase
    }

    /// The most recent recommendation, present only in `Recommended`.
    pub fn recommendation(&self) -> Option<StreamLabel> {
        self.recommendation
    }

    /// Time of the last accepted user turn (creation time before that).
    pub fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }

    pub fn greeting(&self) -> &str {
        GREETING
    }

    /// Serializable view for the REST surface.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            phase: self.phase,
            recommendation: self.recommendation,
            created_at: self.created_at,
            last_active: self.last_active,
            transcript: self.transcript.clone(),
        }
    }

    fn recommend(&mut self, stream: StreamLabel) {
        self.phase = DialoguePhase::Recommended;
        self.recommendation = Some(stream);
    }

    fn resume_collecting(&mut self) {
        self.phase = DialoguePhase::Collecting;
        self.recommendation = None;
    }
}

impl Default for DialogueSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Session state returned by `GET /api/sessions/{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub phase: DialoguePhase,
    pub recommendation: Option<StreamLabel>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub transcript: Transcript,
}

/// What a presentation surface renders after a turn or a form submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresentationPayload {
    pub assistant_message: String,
    pub recommended_stream: Option<StreamLabel>,
    /// Present when a stream was recommended and the catalog has an entry.
    pub catalog: Option<CatalogView>,
    /// A stream was recommended but the catalog has no entry for it.
    pub financials_unavailable: bool,
}

impl PresentationPayload {
    fn message_only(message: impl Into<String>) -> Self {
        Self {
            assistant_message: message.into(),
            recommended_stream: None,
            catalog: None,
            financials_unavailable: false,
        }
    }

    fn recommendation(message: impl Into<String>, stream: StreamLabel, lookup: CatalogLookup) -> Self {
        let catalog = lookup.into_view();
        Self {
            assistant_message: message.into(),
            recommended_stream: Some(stream),
            financials_unavailable: catalog.is_none(),
            catalog,
        }
    }
}

/// Coordinates the analyzer, the classifier and the catalog.
///
/// Holds only shared immutable collaborators; all per-conversation state
/// lives in [`DialogueSession`].
pub struct DialogueManager {
    analyzer: Arc<ConversationAnalyzer>,
    catalog: Arc<Catalog>,
    classifier: Arc<dyn Classifier>,
}

impl DialogueManager {
    pub fn new(
        analyzer: Arc<ConversationAnalyzer>,
        catalog: Arc<Catalog>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            analyzer,
            catalog,
            classifier,
        }
    }

    /// Process one user turn.
    ///
    /// 1. Append the user turn (blank input is rejected, transcript untouched).
    /// 2. Analyze the whole transcript.
    /// 3. Append the verdict message as the assistant turn.
    /// 4. Move the phase and, on a recommendation, look up the catalog.
    pub async fn handle_turn(
        &self,
        session: &mut DialogueSession,
        user_text: &str,
    ) -> Result<PresentationPayload, DialogueError> {
        let text = user_text.trim();
        if text.is_empty() {
            return Err(DialogueError::EmptyInput);
        }
        session.transcript.push_user(text);
        session.last_active = Utc::now();

        let verdict = self.analyzer.analyze(&session.transcript).await;
        session.transcript.push_assistant(verdict.message());

        let payload = self.apply_verdict(session, &verdict);
        info!(
            session_id = %session.id,
            decision = %verdict.decision(),
            phase = %session.phase,
            turns = session.transcript.len(),
            "Turn handled"
        );
        Ok(payload)
    }

    fn apply_verdict(&self, session: &mut DialogueSession, verdict: &AnalyzerVerdict) -> PresentationPayload {
        match (verdict.decision(), verdict.stream()) {
            (Decision::Recommend, Some(stream)) => {
                session.recommend(stream);
                let lookup = self.lookup(stream);
                if lookup == CatalogLookup::Missing {
                    warn!(session_id = %session.id, stream = %stream, "No catalog entry for recommended stream");
                }
                PresentationPayload::recommendation(verdict.message(), stream, lookup)
            }
            _ => {
                // A degraded verdict says nothing about the student, so an
                // earlier recommendation stands.
                if !verdict.is_fallback() {
                    session.resume_collecting();
                }
                PresentationPayload::message_only(verdict.message())
            }
        }
    }

    /// Structured path: validate the form, classify, look up the catalog.
    pub fn recommend_from_form(&self, form: FeatureForm) -> Result<PresentationPayload, ClassifierError> {
        let vector = form.validate()?;
        let stream = self.classifier.classify(&vector);
        info!(classifier = self.classifier.name(), stream = %stream, "Form classified");
        Ok(PresentationPayload::recommendation(
            format!("Based on your answers, we recommend {stream}."),
            stream,
            self.lookup(stream),
        ))
    }

    pub fn lookup(&self, stream: StreamLabel) -> CatalogLookup {
        self.catalog.view(stream)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::advisor::catalog::builtin_entries;
    use crate::advisor::classifier::RuleClassifier;
    use crate::advisor::verdict::FALLBACK_MESSAGE;
    use crate::error::LlmError;
    use crate::llm::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};

    struct ScriptedLlm {
        replies: Mutex<Vec<Result<String, LlmError>>>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            let next = self.replies.lock().unwrap().remove(0);
            next.map(|content| CompletionResponse {
                content,
                input_tokens: 0,
                output_tokens: 0,
                finish_reason: FinishReason::Stop,
                response_id: None,
            })
        }
    }

    const RECOMMEND_PCM: &str = "Status: RECOMMEND\nContent: Great fit!\nStream: Science (PCM)";
    const ASK: &str = "Status: ASK\nContent: What else do you enjoy?\nStream: None";

    fn manager_with(replies: Vec<Result<String, LlmError>>, catalog: Catalog) -> DialogueManager {
        let llm = Arc::new(ScriptedLlm {
            replies: Mutex::new(replies),
        });
        DialogueManager::new(
            Arc::new(ConversationAnalyzer::new(llm)),
            Arc::new(catalog),
            Arc::new(RuleClassifier::new()),
        )
    }

    fn manager(replies: Vec<Result<String, LlmError>>) -> DialogueManager {
        manager_with(replies, Catalog::builtin())
    }

    fn oracle_down() -> Result<String, LlmError> {
        Err(LlmError::RequestFailed {
            provider: "scripted".into(),
            reason: "connection refused".into(),
        })
    }

    fn engineering_form() -> FeatureForm {
        FeatureForm {
            math_score: Some(90.into()),
            science_score: Some(90.into()),
            history_score: Some(40.into()),
            logic_aptitude: Some(8.into()),
            creative_aptitude: Some(3.into()),
            likes_coding: Some(true),
            likes_finance: Some(false),
            likes_art: Some(false),
        }
    }

    #[test]
    fn default_phase_is_collecting() {
        assert_eq!(DialoguePhase::default(), DialoguePhase::Collecting);
    }

    #[test]
    fn new_session_opens_with_greeting() {
        let session = DialogueSession::new();
        assert_eq!(session.phase(), DialoguePhase::Collecting);
        assert!(session.recommendation().is_none());
        assert_eq!(session.transcript().len(), 1);
        assert_eq!(session.transcript().last().unwrap().text, GREETING);
    }

    #[tokio::test]
    async fn recommendation_moves_to_recommended_with_financials() {
        let manager = manager(vec![Ok(RECOMMEND_PCM.into())]);
        let mut session = DialogueSession::new();

        let payload = manager
            .handle_turn(&mut session, "I love math and coding, hate history")
            .await
            .unwrap();

        assert_eq!(session.phase(), DialoguePhase::Recommended);
        assert_eq!(session.recommendation(), Some(StreamLabel::SciencePcm));
        assert_eq!(payload.assistant_message, "Great fit!");
        assert_eq!(payload.recommended_stream, Some(StreamLabel::SciencePcm));
        assert!(!payload.financials_unavailable);

        let view = payload.catalog.unwrap();
        assert_eq!(view.min_investment, view.entry.coaching_fee + view.entry.college_fee_min);
        // greeting + user + assistant
        assert_eq!(session.transcript().len(), 3);
    }

    #[tokio::test]
    async fn ask_keeps_collecting() {
        let manager = manager(vec![Ok(ASK.into())]);
        let mut session = DialogueSession::new();
        let payload = manager.handle_turn(&mut session, "hmm not sure").await.unwrap();

        assert_eq!(session.phase(), DialoguePhase::Collecting);
        assert!(payload.recommended_stream.is_none());
        assert!(payload.catalog.is_none());
        assert!(!payload.financials_unavailable);
        assert_eq!(payload.assistant_message, "What else do you enjoy?");
    }

    #[tokio::test]
    async fn empty_input_leaves_transcript_untouched() {
        let manager = manager(vec![]);
        let mut session = DialogueSession::new();
        let err = manager.handle_turn(&mut session, "   ").await.unwrap_err();
        assert!(matches!(err, DialogueError::EmptyInput));
        assert_eq!(session.transcript().len(), 1);
    }

    #[tokio::test]
    async fn oracle_failure_then_recovery() {
        let manager = manager(vec![oracle_down(), Ok(RECOMMEND_PCM.into())]);
        let mut session = DialogueSession::new();

        let first = manager.handle_turn(&mut session, "I like computers").await.unwrap();
        assert_eq!(first.assistant_message, FALLBACK_MESSAGE);
        assert!(first.recommended_stream.is_none());
        assert_eq!(session.phase(), DialoguePhase::Collecting);

        let second = manager.handle_turn(&mut session, "and math").await.unwrap();
        assert_eq!(second.recommended_stream, Some(StreamLabel::SciencePcm));
        assert_eq!(session.phase(), DialoguePhase::Recommended);
        assert_eq!(session.transcript().len(), 5);
    }

    #[tokio::test]
    async fn follow_up_after_recommendation_is_reanalyzed() {
        let rec_arts = "Status: RECOMMEND\nContent: Arts it is.\nStream: Arts";
        let manager = manager(vec![
            Ok(RECOMMEND_PCM.into()),
            Ok(rec_arts.into()),
            Ok(ASK.into()),
        ]);
        let mut session = DialogueSession::new();

        manager.handle_turn(&mut session, "math and coding").await.unwrap();
        assert_eq!(session.recommendation(), Some(StreamLabel::SciencePcm));

        manager.handle_turn(&mut session, "actually I prefer painting").await.unwrap();
        assert_eq!(session.phase(), DialoguePhase::Recommended);
        assert_eq!(session.recommendation(), Some(StreamLabel::Arts));

        manager.handle_turn(&mut session, "can you explain more?").await.unwrap();
        assert_eq!(session.phase(), DialoguePhase::Collecting);
        assert!(session.recommendation().is_none());
    }

    #[tokio::test]
    async fn oracle_failure_keeps_earlier_recommendation() {
        let manager = manager(vec![Ok(RECOMMEND_PCM.into()), oracle_down()]);
        let mut session = DialogueSession::new();
        manager.handle_turn(&mut session, "math and coding").await.unwrap();
        let payload = manager.handle_turn(&mut session, "what about fees?").await.unwrap();

        // The turn itself carries only the fallback message; the standing
        // recommendation lives on the session.
        assert_eq!(payload.assistant_message, FALLBACK_MESSAGE);
        assert!(payload.recommended_stream.is_none());
        assert!(payload.catalog.is_none());
        assert_eq!(session.phase(), DialoguePhase::Recommended);
        assert_eq!(session.recommendation(), Some(StreamLabel::SciencePcm));
        assert_eq!(session.snapshot().recommendation, Some(StreamLabel::SciencePcm));
    }

    #[tokio::test]
    async fn recommendation_is_held_only_while_recommended() {
        let manager = manager(vec![
            Ok(ASK.into()),
            Ok(RECOMMEND_PCM.into()),
            oracle_down(),
            Ok(ASK.into()),
        ]);
        let mut session = DialogueSession::new();
        for text in ["hi", "math and coding", "fees?", "tell me more"] {
            manager.handle_turn(&mut session, text).await.unwrap();
            assert_eq!(
                session.recommendation().is_some(),
                session.phase() == DialoguePhase::Recommended,
                "after {text:?}"
            );
        }
        assert_eq!(session.phase(), DialoguePhase::Collecting);
    }

    #[tokio::test]
    async fn accepted_turn_refreshes_activity() {
        let manager = manager(vec![Ok(ASK.into())]);
        let mut session = DialogueSession::new();
        let before = session.last_active();

        manager.handle_turn(&mut session, "   ").await.unwrap_err();
        assert_eq!(session.last_active(), before);

        manager.handle_turn(&mut session, "hello").await.unwrap();
        assert!(session.last_active() >= before);
        assert!(session.last_active() >= session.snapshot().created_at);
    }

    #[tokio::test]
    async fn catalog_drift_is_not_fatal() {
        let catalog = Catalog::from_entries(
            builtin_entries()
                .into_iter()
                .filter(|e| e.stream != StreamLabel::SciencePcm),
        );
        let manager = manager_with(vec![Ok(RECOMMEND_PCM.into())], catalog);
        let mut session = DialogueSession::new();

        let payload = manager.handle_turn(&mut session, "coding!").await.unwrap();
        assert_eq!(payload.recommended_stream, Some(StreamLabel::SciencePcm));
        assert!(payload.catalog.is_none());
        assert!(payload.financials_unavailable);
        assert_eq!(session.phase(), DialoguePhase::Recommended);
    }

    #[test]
    fn form_path_is_deterministic() {
        let manager = manager(vec![]);
        for _ in 0..5 {
            let payload = manager.recommend_from_form(engineering_form()).unwrap();
            assert_eq!(payload.recommended_stream, Some(StreamLabel::SciencePcm));
            assert_eq!(
                payload.assistant_message,
                "Based on your answers, we recommend Science (PCM)."
            );
            assert!(payload.catalog.is_some());
        }
    }

    #[test]
    fn invalid_form_never_reaches_classifier() {
        let manager = manager(vec![]);
        let mut form = engineering_form();
        form.math_score = Some(150.into());
        let err = manager.recommend_from_form(form).unwrap_err();
        assert!(matches!(
            err,
            ClassifierError::InvalidFeatureVector { ref field, .. } if field == "math_score"
        ));
    }

    #[test]
    fn lookup_reports_missing() {
        let manager = manager_with(vec![], Catalog::default());
        assert_eq!(manager.lookup(StreamLabel::Arts), CatalogLookup::Missing);
    }
}
