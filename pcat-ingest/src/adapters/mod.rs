//! Source adapters
//!
//! Per-vendor scrapers live outside this crate and plug in through
//! `SourceAdapter`. This module holds the registry the controller draws its
//! source plan from, the placeholder-name filter applied to every observation,
//! and `JsonFileSource` for scraper exports on disk.

pub mod json_file;

pub use json_file::JsonFileSource;

use crate::types::SourceAdapter;
use std::sync::Arc;
use tracing::warn;

/// Names sources emit when they have nothing real to say
const PLACEHOLDER_NAMES: &[&str] = &["", "n/a", "na", "none", "null", "-", "not found", "unknown"];

/// Whether `name` carries no product information
pub fn is_placeholder_name(name: &str) -> bool {
    let lowered = name.trim().to_lowercase();
    PLACEHOLDER_NAMES.contains(&lowered.as_str())
}

/// Which sources run, in what order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourcePlan {
    /// Sources to run first, in this order; empty means all in registration order
    pub order: Vec<String>,
    /// After `order`, run every registered source not listed
    pub run_remaining: bool,
}

impl SourcePlan {
    /// Every registered source, in registration order
    pub fn all() -> Self {
        Self {
            order: Vec::new(),
            run_remaining: true,
        }
    }

    pub fn explicit<I, S>(order: I, run_remaining: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            order: order.into_iter().map(Into::into).collect(),
            run_remaining,
        }
    }
}

/// Registered source adapters
#[derive(Clone, Default)]
pub struct SourceRegistry {
    adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter; a later adapter with the same name replaces the earlier one
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.retain(|a| a.name() != adapter.name());
        self.adapters.push(adapter);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.iter().find(|a| a.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Adapters to run for `plan`, in run order, each at most once
    ///
    /// Unknown names in the plan are logged and skipped.
    pub fn resolve(&self, plan: &SourcePlan) -> Vec<Arc<dyn SourceAdapter>> {
        if plan.order.is_empty() {
            return self.adapters.clone();
        }

        let mut resolved: Vec<Arc<dyn SourceAdapter>> = Vec::new();
        for name in &plan.order {
            match self.get(name) {
                Some(adapter) if !resolved.iter().any(|a| a.name() == adapter.name()) => {
                    resolved.push(adapter)
                }
                Some(_) => {}
                None => warn!(source = %name, "Unknown source in plan, skipping"),
            }
        }

        if plan.run_remaining {
            for adapter in &self.adapters {
                if !resolved.iter().any(|a| a.name() == adapter.name()) {
                    resolved.push(adapter.clone());
                }
            }
        }
        resolved
    }
}
