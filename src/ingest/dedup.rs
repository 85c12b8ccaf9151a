use std::collections::HashSet;

use super::normalize::CandidateItem;

/// Distinct links of a candidate batch, in first-seen order.
///
/// This is the key set for the single bulk existing-links lookup a cycle
/// performs.
pub fn candidate_links(candidates: &[CandidateItem]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(candidates.len());
    candidates
        .iter()
        .filter(|c| seen.insert(c.link.as_str()))
        .map(|c| c.link.clone())
        .collect()
}

/// Keep the candidates whose link is not already stored.
///
/// Relative order is preserved. A link repeated within the batch survives
/// only at its first occurrence, so the result never collides with itself.
/// Links are compared as literal strings.
pub fn select_new(
    candidates: Vec<CandidateItem>,
    existing_links: &HashSet<String>,
) -> Vec<CandidateItem> {
    let mut taken: HashSet<String> = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| !existing_links.contains(&c.link) && taken.insert(c.link.clone()))
        .collect()
}
