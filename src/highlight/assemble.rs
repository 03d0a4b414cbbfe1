use std::collections::{BTreeMap, BTreeSet};

use super::{
    phrase::PhraseDecisions,
    term::{HighlightTerm, WeightedOccurrence},
};
use crate::index::DocId;

/// Highlight terms per candidate document, in text order.
pub type HighlightSets = BTreeMap<DocId, BTreeSet<HighlightTerm>>;

/// Build the final per-document sets from the surviving occurrences.
///
/// Every candidate gets an entry, empty when nothing survived.
pub fn assemble(
    candidates: &BTreeSet<DocId>,
    occurrences: &[WeightedOccurrence],
    decisions: &PhraseDecisions,
) -> HighlightSets {
    let mut sets: HighlightSets = candidates
        .iter()
        .map(|&id| (id, BTreeSet::new()))
        .collect();

    for (i, weighted) in occurrences.iter().enumerate() {
        if decisions.is_dropped(i) {
            continue;
        }
        let term = HighlightTerm::new(weighted, decisions.is_in_phrase(i));
        sets.entry(term.doc).or_default().insert(term);
    }
    sets
}
