//! Batch orchestration
//!
//! **Phases:**
//! 1. Filtering: normalize, validate, drop identifiers already stored
//! 2. Collecting: one round per source, strictly sequential; placeholder names dropped
//! 3. Consolidating: each round consolidated, rounds merged per identifier
//! 4. Classifying: candidate selection, then the pipeline in batch mode
//! 5. Persisting: upsert, optionally trim the working set
//!
//! Cancellation is checked between identifiers. A cancelled batch still
//! consolidates, classifies and persists whatever was collected.

use crate::adapters::{is_placeholder_name, SourcePlan, SourceRegistry};
use crate::classification::ClassificationPipeline;
use crate::config::BatchConfig;
use crate::db::ProductStore;
use crate::models::{BatchError, BatchSession};
use crate::services::consolidation::{consolidate, merge, Consolidated};
use crate::services::identifiers::partition_identifiers;
use crate::services::selection::{CandidateSelector, SourcePrioritySelector};
use crate::services::working_set::WorkingSet;
use crate::types::{ClassificationTier, FinalizedProduct, RawObservation, SourceAdapter};
use chrono::Utc;
use pcat_common::events::{BatchState, CatalogEvent, EventBus};
use pcat_common::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Identifiers to process and, optionally, which sources to ask
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    pub identifiers: Vec<String>,
    /// None: use the configured source order
    pub plan: Option<SourcePlan>,
}

impl BatchRequest {
    pub fn new<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identifiers: identifiers.into_iter().map(Into::into).collect(),
            plan: None,
        }
    }

    pub fn with_plan(mut self, plan: SourcePlan) -> Self {
        self.plan = Some(plan);
        self
    }
}

/// What happened to one identifier
#[derive(Debug, Clone, PartialEq)]
pub enum IdentifierOutcome {
    /// Failed normalization or the length check
    InvalidIdentifier,
    /// Already present in the product store
    AlreadyStored,
    /// No source returned a usable observation
    NotFound,
    Persisted {
        tier: ClassificationTier,
        category: String,
    },
    PersistFailed(String),
}

/// Per-source round statistics
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceStats {
    pub source: String,
    pub attempted: usize,
    /// Identifiers with at least one usable observation
    pub found: usize,
    pub observations: usize,
    pub failures: usize,
    /// `begin_round` failed, or every attempted identifier failed
    pub failed: bool,
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub state: BatchState,
    pub outcomes: BTreeMap<String, IdentifierOutcome>,
    pub sources: Vec<SourceStats>,
    pub errors: Vec<BatchError>,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn outcome(&self, identifier: &str) -> Option<&IdentifierOutcome> {
        self.outcomes.get(identifier)
    }

    pub fn persisted(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, IdentifierOutcome::Persisted { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.persisted()
    }

    pub fn source(&self, name: &str) -> Option<&SourceStats> {
        self.sources.iter().find(|s| s.source == name)
    }
}

/// Runs batches from identifiers to persisted, classified products
pub struct BatchOrchestrator {
    registry: SourceRegistry,
    pipeline: ClassificationPipeline,
    store: ProductStore,
    event_bus: EventBus,
    config: BatchConfig,
    working_set: Option<WorkingSet>,
    selector: Box<dyn CandidateSelector>,
}

impl BatchOrchestrator {
    pub fn new(
        registry: SourceRegistry,
        pipeline: ClassificationPipeline,
        store: ProductStore,
        event_bus: EventBus,
        config: BatchConfig,
    ) -> Self {
        let selector = Box::new(SourcePrioritySelector::new(config.source_priority.clone()));
        Self {
            registry,
            pipeline,
            store,
            event_bus,
            config,
            working_set: None,
            selector,
        }
    }

    /// Keep `working_set` in step with the batch
    pub fn with_working_set(mut self, working_set: WorkingSet) -> Self {
        self.working_set = Some(working_set);
        self
    }

    pub fn with_selector(mut self, selector: Box<dyn CandidateSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn pipeline(&self) -> &ClassificationPipeline {
        &self.pipeline
    }

    pub fn store(&self) -> &ProductStore {
        &self.store
    }

    /// Run one batch
    ///
    /// Only a store failure while filtering is returned as an error; everything
    /// else is recorded in the report.
    pub async fn run(
        &mut self,
        request: BatchRequest,
        cancel_token: CancellationToken,
    ) -> Result<BatchReport> {
        let mut session = BatchSession::new();
        let mut outcomes: BTreeMap<String, IdentifierOutcome> = BTreeMap::new();

        info!(
            batch_id = %session.batch_id,
            identifiers = request.identifiers.len(),
            "Starting batch"
        );

        // **Phase 1: Filtering**
        let pending = match self.filter(&request.identifiers, &mut session, &mut outcomes).await {
            Ok(pending) => pending,
            Err(e) => {
                error!(batch_id = %session.batch_id, error = %e, "Batch failed while filtering");
                self.event_bus.emit_lossy(session.transition_to(BatchState::Failed));
                self.emit_finished(&session, 0, outcomes.len());
                return Err(e);
            }
        };

        // **Phase 2: Collecting**
        self.event_bus.emit_lossy(session.transition_to(BatchState::Collecting));
        let plan = request.plan.unwrap_or_else(|| self.configured_plan());
        let (rounds, sources) = self
            .collect(&plan, &pending, &mut session, &cancel_token)
            .await;
        let cancelled = cancel_token.is_cancelled();
        if cancelled {
            warn!(batch_id = %session.batch_id, "Batch cancelled, finishing with collected data");
        }

        // **Phase 3: Consolidating**
        self.event_bus.emit_lossy(session.transition_to(BatchState::Consolidating));
        let consolidated = rounds
            .iter()
            .fold(Consolidated::new(), |acc, round| merge(&acc, &consolidate(round)));
        for identifier in &pending {
            if !consolidated.contains_key(identifier) {
                outcomes.insert(identifier.clone(), IdentifierOutcome::NotFound);
            }
        }
        info!(
            rounds = rounds.len(),
            products = consolidated.len(),
            "Consolidated observations"
        );

        // **Phase 4: Classifying**
        self.event_bus.emit_lossy(session.transition_to(BatchState::Classifying));
        let mut products: Vec<FinalizedProduct> = consolidated
            .values()
            .map(|candidates| self.selector.select(candidates))
            .collect();
        let descriptors: Vec<_> = products.iter().map(FinalizedProduct::descriptor).collect();
        let classified = self.pipeline.classify_batch(&descriptors).await;
        let mut tiers = Vec::with_capacity(products.len());
        for (product, outcome) in products.iter_mut().zip(classified) {
            product.apply_facets(&outcome.result);
            self.event_bus.emit_lossy(CatalogEvent::ItemClassified {
                batch_id: session.batch_id,
                identifier: product.identifier.clone(),
                tier: outcome.tier.as_str().to_string(),
                category: outcome.result.category.clone(),
            });
            tiers.push(outcome.tier);
        }

        // **Phase 5: Persisting**
        self.event_bus.emit_lossy(session.transition_to(BatchState::Persisting));
        session.begin_phase(products.len(), "Persisting products");
        let mut persisted: Vec<String> = Vec::new();
        for (i, (product, tier)) in products.iter().zip(tiers).enumerate() {
            let outcome = match self.store.upsert_product(product).await {
                Ok(()) => {
                    persisted.push(product.identifier.clone());
                    IdentifierOutcome::Persisted {
                        tier,
                        category: product.category.clone(),
                    }
                }
                Err(e) => {
                    warn!(identifier = %product.identifier, error = %e, "Failed to persist product");
                    session.add_error("persist", Some(&product.identifier), e.to_string());
                    IdentifierOutcome::PersistFailed(e.to_string())
                }
            };
            outcomes.insert(product.identifier.clone(), outcome);
            session.update_progress(i + 1, format!("Persisted {}", product.identifier));
        }

        if self.config.remove_processed && !persisted.is_empty() {
            if let Some(working_set) = &self.working_set {
                match working_set.remove(&persisted).await {
                    Ok(removed) => debug!(removed, "Removed persisted identifiers from working set"),
                    Err(e) => {
                        warn!(error = %e, "Failed to update working set");
                        session.add_error("working_set", None, e.to_string());
                    }
                }
            }
        }

        let final_state = if cancelled {
            BatchState::Cancelled
        } else {
            BatchState::Completed
        };
        self.event_bus.emit_lossy(session.transition_to(final_state));

        let report = BatchReport {
            batch_id: session.batch_id,
            state: final_state,
            outcomes,
            sources,
            errors: session.errors.clone(),
            cancelled,
        };
        self.emit_finished(&session, report.persisted(), report.skipped());

        info!(
            batch_id = %report.batch_id,
            state = ?report.state,
            persisted = report.persisted(),
            skipped = report.skipped(),
            errors = report.errors.len(),
            "Batch finished"
        );
        Ok(report)
    }

    fn configured_plan(&self) -> SourcePlan {
        if self.config.source_order.is_empty() {
            SourcePlan::all()
        } else {
            SourcePlan::explicit(self.config.source_order.clone(), self.config.run_remaining)
        }
    }

    /// Valid identifiers not yet in the store, in first-seen order
    async fn filter(
        &self,
        raw: &[String],
        session: &mut BatchSession,
        outcomes: &mut BTreeMap<String, IdentifierOutcome>,
    ) -> Result<Vec<String>> {
        let partition = partition_identifiers(raw, &self.config.identifier_lengths);
        for invalid in &partition.invalid {
            warn!(identifier = %invalid, "Invalid identifier, skipping");
            session.add_error("filter", Some(invalid), "invalid identifier");
            outcomes.insert(invalid.clone(), IdentifierOutcome::InvalidIdentifier);
        }

        let existing = self.store.existing_identifiers().await?;
        let mut pending = Vec::with_capacity(partition.valid.len());
        for identifier in partition.valid {
            if existing.contains(&identifier) {
                debug!(identifier = %identifier, "Already stored, skipping");
                outcomes.insert(identifier, IdentifierOutcome::AlreadyStored);
            } else {
                pending.push(identifier);
            }
        }

        info!(
            pending = pending.len(),
            invalid = partition.invalid.len(),
            stored = existing.len(),
            "Filtered identifiers"
        );

        if let Some(working_set) = &self.working_set {
            if let Err(e) = working_set.save(&pending).await {
                warn!(error = %e, "Failed to write working set");
                session.add_error("working_set", None, e.to_string());
            }
        }
        Ok(pending)
    }

    /// Run every planned source over `pending`; one observation list per round
    async fn collect(
        &self,
        plan: &SourcePlan,
        pending: &[String],
        session: &mut BatchSession,
        cancel_token: &CancellationToken,
    ) -> (Vec<Vec<RawObservation>>, Vec<SourceStats>) {
        let mut rounds = Vec::new();
        let mut stats = Vec::new();

        if pending.is_empty() {
            return (rounds, stats);
        }

        for adapter in self.registry.resolve(plan) {
            if cancel_token.is_cancelled() {
                break;
            }
            let mut observations = Vec::new();
            let source_stats = self
                .run_source(adapter, pending, session, cancel_token, &mut observations)
                .await;
            rounds.push(observations);
            stats.push(source_stats);
        }
        (rounds, stats)
    }

    async fn run_source(
        &self,
        adapter: Arc<dyn SourceAdapter>,
        pending: &[String],
        session: &mut BatchSession,
        cancel_token: &CancellationToken,
        observations: &mut Vec<RawObservation>,
    ) -> SourceStats {
        let source = adapter.name().to_string();
        let identifiers: Vec<String> = pending
            .iter()
            .filter(|id| adapter.accepts(id))
            .cloned()
            .collect();
        let mut stats = SourceStats {
            source: source.clone(),
            ..Default::default()
        };

        self.event_bus.emit_lossy(CatalogEvent::SourceStarted {
            batch_id: session.batch_id,
            source: source.clone(),
            total: identifiers.len(),
            timestamp: Utc::now(),
        });

        if let Err(e) = adapter.begin_round(&identifiers).await {
            warn!(source = %source, error = %e, "Source unavailable, skipping");
            session.add_error(&source, None, e.to_string());
            stats.failed = true;
            self.emit_source_finished(session, &stats);
            return stats;
        }

        info!(source = %source, identifiers = identifiers.len(), "Collecting from source");
        session.begin_phase(identifiers.len(), format!("Collecting from {}", source));

        for (i, identifier) in identifiers.iter().enumerate() {
            if cancel_token.is_cancelled() {
                info!(source = %source, attempted = stats.attempted, "Source round cancelled");
                break;
            }

            stats.attempted += 1;
            match adapter.fetch(identifier).await {
                Ok(found) => {
                    let usable: Vec<RawObservation> = found
                        .into_iter()
                        .filter(|obs| !is_placeholder_name(&obs.name))
                        .map(|mut obs| {
                            obs.source = source.clone();
                            obs.identifier = identifier.clone();
                            obs
                        })
                        .collect();
                    if !usable.is_empty() {
                        stats.found += 1;
                    }
                    stats.observations += usable.len();
                    debug!(source = %source, identifier = %identifier, found = usable.len(), "Fetched");
                    observations.extend(usable);
                }
                Err(e) => {
                    warn!(source = %source, identifier = %identifier, error = %e, "Fetch failed");
                    session.add_error(&source, Some(identifier), e.to_string());
                    stats.failures += 1;
                }
            }

            session.update_progress(i + 1, format!("{}: {}", source, identifier));
            self.event_bus.emit_lossy(CatalogEvent::SourceProgress {
                batch_id: session.batch_id,
                source: source.clone(),
                identifier: identifier.clone(),
                current: session.progress.current,
                total: session.progress.total,
                percentage: session.progress.percentage,
                elapsed_seconds: session.progress.elapsed_seconds,
                estimated_remaining_seconds: session.progress.estimated_remaining_seconds,
            });
        }

        adapter.end_round().await;

        if stats.attempted > 0 && stats.failures == stats.attempted {
            warn!(source = %source, failures = stats.failures, "Source failed for every identifier");
            stats.failed = true;
        }
        self.emit_source_finished(session, &stats);
        stats
    }

    fn emit_source_finished(&self, session: &BatchSession, stats: &SourceStats) {
        self.event_bus.emit_lossy(CatalogEvent::SourceFinished {
            batch_id: session.batch_id,
            source: stats.source.clone(),
            attempted: stats.attempted,
            observations: stats.observations,
            failures: stats.failures,
            failed: stats.failed,
            timestamp: Utc::now(),
        });
    }

    fn emit_finished(&self, session: &BatchSession, persisted: usize, skipped: usize) {
        self.event_bus.emit_lossy(CatalogEvent::BatchFinished {
            batch_id: session.batch_id,
            state: session.state,
            persisted,
            skipped,
            timestamp: Utc::now(),
        });
    }
}
