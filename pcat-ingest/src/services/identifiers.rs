//! Identifier normalization and validation

/// Trim and remove internal whitespace and dashes
pub fn normalize_identifier(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect()
}

/// Global validity predicate: ASCII digits only, length in `lengths`
pub fn is_valid_identifier(identifier: &str, lengths: &[usize]) -> bool {
    !identifier.is_empty()
        && identifier.bytes().all(|b| b.is_ascii_digit())
        && lengths.contains(&identifier.len())
}

/// Result of splitting a raw identifier list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentifierPartition {
    /// Normalized, valid, de-duplicated, in first-seen order
    pub valid: Vec<String>,
    /// Raw values that failed validation
    pub invalid: Vec<String>,
}

/// Normalize every entry, dropping blanks and duplicates
pub fn partition_identifiers<I, S>(raw: I, lengths: &[usize]) -> IdentifierPartition
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = IdentifierPartition::default();
    let mut seen = std::collections::HashSet::new();

    for entry in raw {
        let entry = entry.as_ref();
        let normalized = normalize_identifier(entry);
        if normalized.is_empty() {
            continue;
        }
        if !is_valid_identifier(&normalized, lengths) {
            out.invalid.push(entry.trim().to_string());
            continue;
        }
        if seen.insert(normalized.clone()) {
            out.valid.push(normalized);
        }
    }

    out
}
