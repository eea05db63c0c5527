use std::sync::Arc;

use stream_advisor::advisor::classifier::{Classifier, RuleClassifier};
use stream_advisor::advisor::routes::SessionRegistry;
use stream_advisor::advisor::{
    Catalog, ConversationAnalyzer, DialogueManager, advisor_routes, shared_tree,
};
use stream_advisor::cli::run_repl;
use stream_advisor::config::{AdvisorConfig, ClassifierMode};
use stream_advisor::llm::create_provider;
use stream_advisor::store::CatalogStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AdvisorConfig::from_env()?;
    let llm_config = config.llm_config().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export {}=...", config.backend.api_key_var());
        std::process::exit(1);
    });

    eprintln!("🎓 Stream Advisor v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.model);
    eprintln!("   API: http://0.0.0.0:{}/api/sessions", config.port);

    let llm = create_provider(&llm_config)?;
    let mut analyzer = ConversationAnalyzer::new(llm);
    if let Some(timeout) = config.oracle_timeout {
        analyzer = analyzer.with_oracle_timeout(timeout);
        eprintln!("   Oracle timeout: {}s", timeout.as_secs());
    }

    let catalog = load_catalog(&config).await?;
    eprintln!("   Catalog: {} streams", catalog.len());
    let classifier = build_classifier(config.classifier)?;
    eprintln!("   Type a message and press Enter. /reset for a new session, /quit to exit.\n");

    let manager = Arc::new(DialogueManager::new(
        Arc::new(analyzer),
        Arc::new(catalog),
        classifier,
    ));

    let sessions = Arc::new(SessionRegistry::new());
    if let Some(ttl) = config.session_ttl {
        Arc::clone(&sessions).spawn_sweeper(ttl);
    }

    // Spawn Axum REST server
    let app = advisor_routes(Arc::clone(&manager), sessions);
    let port = config.port;
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tokio::spawn(async move {
        tracing::info!(port, "REST server started");
        axum::serve(listener, app).await.ok();
    });

    run_repl(manager).await?;

    Ok(())
}

/// The libSQL catalog when a database path is configured, else the built-in one.
async fn load_catalog(config: &AdvisorConfig) -> stream_advisor::error::Result<Catalog> {
    match &config.db_path {
        Some(path) => {
            let store = CatalogStore::new_local(path).await?;
            eprintln!("   Database: {}", path.display());
            Ok(store.load_catalog().await?)
        }
        None => {
            eprintln!("   Database: built-in catalog");
            Ok(Catalog::builtin())
        }
    }
}

fn build_classifier(mode: ClassifierMode) -> stream_advisor::error::Result<Arc<dyn Classifier>> {
    let classifier: Arc<dyn Classifier> = match mode {
        ClassifierMode::Rules => {
            eprintln!("   Classifier: rules");
            Arc::new(RuleClassifier::new())
        }
        ClassifierMode::Tree => {
            let tree = shared_tree()?;
            eprintln!(
                "   Classifier: tree (holdout accuracy {:.3}, {} leaves)",
                tree.report.holdout_accuracy, tree.report.leaves
            );
            tree.classifier
        }
    };
    Ok(classifier)
}
