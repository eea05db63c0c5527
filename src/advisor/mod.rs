//! Stream recommendation: classifier, catalog, conversation analysis and
//! the dialogue state machine.

pub mod analyzer;
pub mod catalog;
pub mod classifier;
pub mod features;
pub mod model;
pub mod routes;
pub mod session;
pub mod transcript;
pub mod verdict;

pub use analyzer::ConversationAnalyzer;
pub use catalog::{Catalog, CatalogEntry, CatalogLookup, CatalogView, CareerOutlook};
pub use classifier::{Classifier, RuleClassifier};
pub use features::{FeatureForm, FeatureVector};
pub use model::{TrainingReport, TreeClassifier, TreeConfig, shared_tree};
pub use routes::advisor_routes;
pub use session::{DialogueManager, DialoguePhase, DialogueSession, PresentationPayload};
pub use transcript::{ConversationTurn, Speaker, Transcript};
pub use verdict::{AnalyzerVerdict, Decision, FallbackReason};
