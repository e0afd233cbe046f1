//! Confidence gate for AI answers
//!
//! Cheap plausibility check: when the product name names an animal kind, the AI's
//! category must mention that kind as a whole word. A dog product filed under "Cat Food" is
//! rejected and falls through to the fuzzy tier.

use crate::services::similarity::KindLexicon;
use crate::types::ClassificationResult;

/// Confidence when the category contradicts the name
pub const LOW_CONFIDENCE: f64 = 0.2;
/// Confidence when the category is consistent with the name, or nothing is implied
pub const HIGH_CONFIDENCE: f64 = 0.8;

#[derive(Debug, Clone)]
pub struct ConfidenceGate {
    lexicon: KindLexicon,
    threshold: f64,
}

impl ConfidenceGate {
    pub fn new(lexicon: KindLexicon, threshold: f64) -> Self {
        Self { lexicon, threshold }
    }

    /// Confidence of `result` for a product called `name`
    ///
    /// A name implying several kinds ("Dog & Cat Bowl") passes when the category
    /// mentions any of them.
    pub fn assess(&self, name: &str, result: &ClassificationResult) -> f64 {
        let implied = self.lexicon.kinds_in_raw(name);
        if implied.is_empty() {
            return HIGH_CONFIDENCE;
        }

        let named = self.lexicon.kinds_in_label(&result.category);
        if implied.iter().any(|kind| named.contains(kind)) {
            HIGH_CONFIDENCE
        } else {
            LOW_CONFIDENCE
        }
    }

    pub fn accepts(&self, confidence: f64) -> bool {
        confidence >= self.threshold
    }
}

impl Default for ConfidenceGate {
    fn default() -> Self {
        Self::new(KindLexicon::default(), 0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contradicting_category_is_rejected() {
        let gate = ConfidenceGate::default();
        let result = ClassificationResult::new("Cat Food", "Dry Cat Food", "");
        let confidence = gate.assess("Puppy Kibble Large Breed", &result);
        assert_eq!(confidence, LOW_CONFIDENCE);
        assert!(!gate.accepts(confidence));
    }

    #[test]
    fn test_consistent_category_is_accepted() {
        let gate = ConfidenceGate::default();
        let result = ClassificationResult::new("Dog Food", "Puppy Food", "");
        let confidence = gate.assess("Puppy Kibble Large Breed", &result);
        assert_eq!(confidence, HIGH_CONFIDENCE);
        assert!(gate.accepts(confidence));
    }

    #[test]
    fn test_no_implied_kind_passes() {
        let gate = ConfidenceGate::default();
        let result = ClassificationResult::new("Cat Litter", "", "");
        assert_eq!(gate.assess("Stainless Steel Bowl", &result), HIGH_CONFIDENCE);
    }

    #[test]
    fn test_multi_kind_name_passes_on_any_kind() {
        let gate = ConfidenceGate::default();
        let result = ClassificationResult::new("Cat Supplies", "Bowls", "");
        assert_eq!(gate.assess("Dog & Cat Double Bowl", &result), HIGH_CONFIDENCE);
    }

    #[test]
    fn test_kind_inside_another_word_does_not_count() {
        let gate = ConfidenceGate::default();
        let result = ClassificationResult::new("Dog Medication", "Flea & Tick", "");
        assert_eq!(gate.assess("Cat Flea Applicator", &result), LOW_CONFIDENCE);

        let result = ClassificationResult::new("Concentrate", "", "");
        assert_eq!(gate.assess("Kitten Formula", &result), LOW_CONFIDENCE);
    }

    #[test]
    fn test_multi_word_kind_in_category() {
        let gate = ConfidenceGate::default();
        let result = ClassificationResult::new("Small Animal Supplies", "Cages", "");
        assert_eq!(gate.assess("Hamster Cage Deluxe", &result), HIGH_CONFIDENCE);
    }
}
