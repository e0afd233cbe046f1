//! Consolidation Engine
//!
//! Groups raw observations into one `CandidateSet` per identifier, keeping every
//! source's value side by side so nothing a source reported is lost.
//!
//! **Merge strategy:**
//! - Scalar fields (name, brand, weight, price): one entry per source; a later
//!   observation from the same source overwrites an earlier one
//! - List fields (images, cross_sell): appended per source, no cross-source dedup
//! - Empty or whitespace-only values are never stored

use crate::types::{CandidateSet, RawObservation};
use std::collections::BTreeMap;
use tracing::debug;

/// Consolidation output: identifier → candidate set
pub type Consolidated = BTreeMap<String, CandidateSet>;

/// Group raw observations by identifier
///
/// Every identifier present in the input appears exactly once in the output, even
/// when all of its observations were empty.
pub fn consolidate<'a, I>(observations: I) -> Consolidated
where
    I: IntoIterator<Item = &'a RawObservation>,
{
    let mut out = Consolidated::new();
    let mut count = 0usize;

    for obs in observations {
        let set = out
            .entry(obs.identifier.clone())
            .or_insert_with(|| CandidateSet::new(obs.identifier.clone()));
        absorb(set, obs);
        count += 1;
    }

    debug!(
        observations = count,
        identifiers = out.len(),
        "Consolidated observations"
    );
    out
}

/// Combine two consolidation outputs into a new map
///
/// Scalars from `later` overwrite `earlier` for the same source; lists append.
/// Neither input is modified.
pub fn merge(earlier: &Consolidated, later: &Consolidated) -> Consolidated {
    let mut out = earlier.clone();

    for (identifier, incoming) in later {
        let set = out
            .entry(identifier.clone())
            .or_insert_with(|| CandidateSet::new(identifier.clone()));

        overwrite_scalars(&mut set.name, &incoming.name);
        overwrite_scalars(&mut set.brand, &incoming.brand);
        overwrite_scalars(&mut set.weight, &incoming.weight);
        overwrite_scalars(&mut set.price, &incoming.price);
        append_lists(&mut set.images, &incoming.images);
        append_lists(&mut set.cross_sell, &incoming.cross_sell);
    }

    out
}

fn absorb(set: &mut CandidateSet, obs: &RawObservation) {
    put_scalar(&mut set.name, &obs.source, &obs.name);
    if let Some(brand) = &obs.brand {
        put_scalar(&mut set.brand, &obs.source, brand);
    }
    put_scalar(&mut set.weight, &obs.source, &obs.weight);
    put_scalar(&mut set.price, &obs.source, &obs.price);
    put_list(&mut set.images, &obs.source, &obs.image_references);
    put_list(&mut set.cross_sell, &obs.source, &obs.cross_sell);
}

fn put_scalar(map: &mut BTreeMap<String, String>, source: &str, value: &str) {
    if value.trim().is_empty() {
        return;
    }
    map.insert(source.to_string(), value.to_string());
}

fn put_list(map: &mut BTreeMap<String, Vec<String>>, source: &str, values: &[String]) {
    let values: Vec<String> = values
        .iter()
        .filter(|v| !v.trim().is_empty())
        .cloned()
        .collect();
    if values.is_empty() {
        return;
    }
    map.entry(source.to_string()).or_default().extend(values);
}

fn overwrite_scalars(into: &mut BTreeMap<String, String>, from: &BTreeMap<String, String>) {
    for (source, value) in from {
        into.insert(source.clone(), value.clone());
    }
}

fn append_lists(into: &mut BTreeMap<String, Vec<String>>, from: &BTreeMap<String, Vec<String>>) {
    for (source, values) in from {
        into.entry(source.clone())
            .or_default()
            .extend(values.iter().cloned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_sources_keep_both_names_verbatim() {
        let observations = vec![
            RawObservation::new("035585499741", "chewy", "Kong Classic Dog Toy, Large"),
            RawObservation::new("035585499741", "petco", "KONG Classic Large Dog Toy"),
        ];

        let out = consolidate(&observations);
        assert_eq!(out.len(), 1);
        let set = &out["035585499741"];
        assert_eq!(set.name.len(), 2);
        assert_eq!(set.name["chewy"], "Kong Classic Dog Toy, Large");
        assert_eq!(set.name["petco"], "KONG Classic Large Dog Toy");
    }

    #[test]
    fn test_empty_values_are_omitted() {
        let observations = vec![RawObservation::new("012345678905", "chewy", "Cat Litter")
            .with_brand("  ")
            .with_weight("")
            .with_images(vec!["", "a.jpg"])];

        let set = &consolidate(&observations)["012345678905"];
        assert!(set.brand.is_empty());
        assert!(set.weight.is_empty());
        assert_eq!(set.images["chewy"], vec!["a.jpg".to_string()]);
    }

    #[test]
    fn test_same_source_scalar_last_wins_lists_append() {
        let observations = vec![
            RawObservation::new("012345678905", "chewy", "Old Name").with_images(vec!["1.jpg"]),
            RawObservation::new("012345678905", "chewy", "New Name").with_images(vec!["2.jpg"]),
        ];

        let set = &consolidate(&observations)["012345678905"];
        assert_eq!(set.name["chewy"], "New Name");
        assert_eq!(set.images["chewy"], vec!["1.jpg".to_string(), "2.jpg".to_string()]);
    }

    #[test]
    fn test_identifier_sets_are_preserved() {
        let observations = vec![
            RawObservation::new("111111111111", "a", "X"),
            RawObservation::new("222222222222", "a", ""),
            RawObservation::new("111111111111", "b", "Y"),
        ];

        let out = consolidate(&observations);
        let ids: Vec<&String> = out.keys().collect();
        assert_eq!(ids, vec!["111111111111", "222222222222"]);
        assert!(out["222222222222"].is_empty());
    }

    #[test]
    fn test_empty_input_yields_empty_output() {
        let observations: Vec<RawObservation> = Vec::new();
        assert!(consolidate(&observations).is_empty());
    }

    #[test]
    fn test_merge_leaves_inputs_untouched() {
        let first = consolidate(&[
            RawObservation::new("111111111111", "a", "First").with_images(vec!["1.jpg"])
        ]);
        let second = consolidate(&[
            RawObservation::new("111111111111", "a", "Second").with_images(vec!["2.jpg"]),
            RawObservation::new("222222222222", "b", "Other"),
        ]);

        let merged = merge(&first, &second);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged["111111111111"].name["a"], "Second");
        assert_eq!(merged["111111111111"].images["a"].len(), 2);
        assert_eq!(first["111111111111"].name["a"], "First");
        assert_eq!(first.len(), 1);
    }
}
