//! Batch orchestration integration tests
//!
//! Scripted in-memory sources, the mock classifier and a throwaway product store.

mod helpers;

use helpers::{memory_store, StaticSource, KONG_ID, ROPE_ID};
use pcat_common::events::{BatchState, CatalogEvent, EventBus};
use pcat_ingest::adapters::{SourcePlan, SourceRegistry};
use pcat_ingest::classification::{ClassificationCache, ClassificationPipeline, MockClassifier};
use pcat_ingest::config::{BatchConfig, PipelineConfig};
use pcat_ingest::db::{init_database_pool, ProductStore};
use pcat_ingest::models::Taxonomy;
use pcat_ingest::services::{
    BatchOrchestrator, BatchRequest, CandidateSelector, IdentifierOutcome, SourcePrioritySelector,
    WorkingSet,
};
use pcat_ingest::types::{CandidateSet, ClassificationResult, ClassificationTier, FinalizedProduct};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn orchestrator(
    sources: &[Arc<StaticSource>],
    mock: Arc<MockClassifier>,
    store: ProductStore,
    config: BatchConfig,
    event_bus: EventBus,
) -> BatchOrchestrator {
    let mut registry = SourceRegistry::new();
    for source in sources {
        registry.register(source.clone());
    }
    let pipeline = ClassificationPipeline::new(
        &PipelineConfig::default(),
        mock,
        ClassificationCache::in_memory(),
        Taxonomy::builtin(),
        Vec::new(),
    );
    BatchOrchestrator::new(registry, pipeline, store, event_bus, config)
}

fn dog_toys() -> ClassificationResult {
    ClassificationResult::new("Dog Toys", "Chew Toys", "Dog Toys Shop All")
}

/// Priority selection that keeps every candidate set it saw
struct RecordingSelector {
    inner: SourcePrioritySelector,
    seen: Arc<Mutex<Vec<CandidateSet>>>,
}

impl CandidateSelector for RecordingSelector {
    fn select(&self, candidates: &CandidateSet) -> FinalizedProduct {
        self.seen.lock().unwrap().push(candidates.clone());
        self.inner.select(candidates)
    }
}

#[tokio::test]
async fn test_two_sources_consolidated_selected_and_persisted() {
    let chewy = Arc::new(StaticSource::new("chewy").with_product(KONG_ID, "Kong Classic Dog Toy", "Kong"));
    let petco = Arc::new(StaticSource::new("petco").with_product(KONG_ID, "KONG Classic", "KONG"));
    let mock = Arc::new(MockClassifier::new().with_response("KONG|KONG Classic", dog_toys()));
    let store = memory_store().await;
    let event_bus = EventBus::new(64);
    let mut rx = event_bus.subscribe();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let config = BatchConfig {
        source_priority: vec!["petco".to_string()],
        ..BatchConfig::default()
    };
    let mut orchestrator = orchestrator(&[chewy, petco], mock.clone(), store.clone(), config, event_bus)
        .with_selector(Box::new(RecordingSelector {
            inner: SourcePrioritySelector::new(vec!["petco".to_string()]),
            seen: seen.clone(),
        }));

    let report = orchestrator
        .run(BatchRequest::new([KONG_ID]), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.state, BatchState::Completed);
    assert!(!report.cancelled);
    assert_eq!(
        report.outcome(KONG_ID),
        Some(&IdentifierOutcome::Persisted {
            tier: ClassificationTier::Ai,
            category: "Dog Toys".to_string(),
        })
    );

    let candidates = seen.lock().unwrap().clone();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].name.len(), 2);
    assert_eq!(candidates[0].name["chewy"], "Kong Classic Dog Toy");
    assert_eq!(candidates[0].name["petco"], "KONG Classic");

    let stored = store.get_product(KONG_ID).await.unwrap().unwrap();
    assert_eq!(stored.name, "KONG Classic");
    assert_eq!(stored.brand, "KONG");
    assert_eq!(stored.images, vec![format!("petco-{}.jpg", KONG_ID)]);
    assert_eq!(stored.category, "Dog Toys");
    assert_eq!(stored.product_type, "Chew Toys");
    assert_eq!(mock.calls(), 1);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    let progress = events
        .iter()
        .filter(|e| matches!(e, CatalogEvent::SourceProgress { .. }))
        .count();
    assert_eq!(progress, 2);
    assert!(events.iter().any(|e| matches!(
        e,
        CatalogEvent::ItemClassified { tier, .. } if tier.as_str() == "AI"
    )));
    assert!(matches!(
        events.last(),
        Some(CatalogEvent::BatchFinished { state: BatchState::Completed, persisted: 1, .. })
    ));
}

#[tokio::test]
async fn test_failed_sources_do_not_stop_the_batch() {
    let down = Arc::new(StaticSource::new("down").unavailable());
    let flaky = Arc::new(StaticSource::new("flaky").failing_fetches());
    let chewy = Arc::new(
        StaticSource::new("chewy")
            .with_product(KONG_ID, "Kong Classic Dog Toy", "Kong")
            .with_product(ROPE_ID, "Rope Tug Toy", "Mammoth"),
    );
    let mut orchestrator = orchestrator(
        &[down.clone(), flaky.clone(), chewy.clone()],
        Arc::new(MockClassifier::new()),
        memory_store().await,
        BatchConfig::default(),
        EventBus::new(64),
    );

    let report = orchestrator
        .run(BatchRequest::new([KONG_ID, ROPE_ID]), CancellationToken::new())
        .await
        .unwrap();

    let down_stats = report.source("down").unwrap();
    assert!(down_stats.failed);
    assert_eq!(down_stats.attempted, 0);
    assert!(down.fetched().is_empty());

    let flaky_stats = report.source("flaky").unwrap();
    assert!(flaky_stats.failed);
    assert_eq!(flaky_stats.failures, 2);

    let chewy_stats = report.source("chewy").unwrap();
    assert!(!chewy_stats.failed);
    assert_eq!(chewy_stats.found, 2);

    assert_eq!(report.state, BatchState::Completed);
    assert_eq!(report.persisted(), 2);
    assert_eq!(report.errors.len(), 3);
}

#[tokio::test]
async fn test_cancellation_keeps_collected_data() {
    let token = CancellationToken::new();
    let chewy = Arc::new(
        StaticSource::new("chewy")
            .with_product(KONG_ID, "Kong Classic Dog Toy", "Kong")
            .with_product(ROPE_ID, "Rope Tug Toy", "Mammoth")
            .cancelling_on(KONG_ID, token.clone()),
    );
    let petco = Arc::new(StaticSource::new("petco").with_product(ROPE_ID, "Rope Toy", "Mammoth"));
    let store = memory_store().await;
    let mut orchestrator = orchestrator(
        &[chewy.clone(), petco.clone()],
        Arc::new(MockClassifier::new()),
        store.clone(),
        BatchConfig::default(),
        EventBus::new(64),
    );

    let report = orchestrator
        .run(BatchRequest::new([KONG_ID, ROPE_ID]), token)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.state, BatchState::Cancelled);
    // The in-flight identifier finishes; nothing after it is fetched
    assert_eq!(chewy.fetched(), vec![KONG_ID.to_string()]);
    assert_eq!(petco.rounds(), 0);

    assert!(matches!(
        report.outcome(KONG_ID),
        Some(IdentifierOutcome::Persisted { .. })
    ));
    assert_eq!(report.outcome(ROPE_ID), Some(&IdentifierOutcome::NotFound));
    assert!(store.get_product(KONG_ID).await.unwrap().is_some());
}

#[tokio::test]
async fn test_filtering_and_working_set() {
    let dir = TempDir::new().unwrap();
    let pool = init_database_pool(&dir.path().join("pcat.db")).await.unwrap();
    let store = ProductStore::new(pool);
    store
        .upsert_product(&FinalizedProduct {
            identifier: ROPE_ID.to_string(),
            name: "Rope Tug Toy".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let working_set = WorkingSet::new(dir.path().join("working_set.txt"));
    let listed: Vec<String> = ["12345", KONG_ID, "0355-8549-9741", ROPE_ID]
        .iter()
        .map(|s| s.to_string())
        .collect();
    working_set.save(&listed).await.unwrap();

    let chewy = Arc::new(
        StaticSource::new("chewy")
            .with_product(KONG_ID, "Kong Classic Dog Toy", "Kong")
            .with_product(ROPE_ID, "Rope Tug Toy", "Mammoth"),
    );
    let config = BatchConfig {
        remove_processed: true,
        ..BatchConfig::default()
    };
    let mut orchestrator = orchestrator(
        &[chewy.clone()],
        Arc::new(MockClassifier::new()),
        store.clone(),
        config,
        EventBus::new(64),
    )
    .with_working_set(working_set.clone());

    let report = orchestrator
        .run(BatchRequest::new(listed), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcome("12345"), Some(&IdentifierOutcome::InvalidIdentifier));
    assert_eq!(report.outcome(ROPE_ID), Some(&IdentifierOutcome::AlreadyStored));
    assert!(matches!(
        report.outcome(KONG_ID),
        Some(IdentifierOutcome::Persisted { .. })
    ));
    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(chewy.fetched(), vec![KONG_ID.to_string()]);

    assert!(working_set.load().await.unwrap().is_empty());
    assert_eq!(store.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_placeholder_names_are_discarded() {
    let chewy = Arc::new(
        StaticSource::new("chewy")
            .with_product(KONG_ID, "N/A", "Kong")
            .with_product(ROPE_ID, "Rope Tug Toy", "Mammoth"),
    );
    let store = memory_store().await;
    let mut orchestrator = orchestrator(
        &[chewy],
        Arc::new(MockClassifier::new()),
        store.clone(),
        BatchConfig::default(),
        EventBus::new(64),
    );

    let report = orchestrator
        .run(BatchRequest::new([KONG_ID, ROPE_ID]), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcome(KONG_ID), Some(&IdentifierOutcome::NotFound));
    assert!(store.get_product(KONG_ID).await.unwrap().is_none());
    assert!(matches!(
        report.outcome(ROPE_ID),
        Some(IdentifierOutcome::Persisted { tier: ClassificationTier::Empty, .. })
    ));
}

#[tokio::test]
async fn test_explicit_plan_limits_sources() {
    let chewy = Arc::new(StaticSource::new("chewy").with_product(KONG_ID, "Kong Classic Dog Toy", "Kong"));
    let petco = Arc::new(StaticSource::new("petco").with_product(KONG_ID, "KONG Classic", "KONG"));
    let mut orchestrator = orchestrator(
        &[chewy.clone(), petco.clone()],
        Arc::new(MockClassifier::new()),
        memory_store().await,
        BatchConfig::default(),
        EventBus::new(64),
    );

    let request = BatchRequest::new([KONG_ID]).with_plan(SourcePlan::explicit(["petco"], false));
    let report = orchestrator.run(request, CancellationToken::new()).await.unwrap();

    assert_eq!(report.sources.len(), 1);
    assert_eq!(report.sources[0].source, "petco");
    assert_eq!(chewy.rounds(), 0);
}
