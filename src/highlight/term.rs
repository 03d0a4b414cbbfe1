use std::cmp::Ordering;

use serde::Serialize;

use super::query::Term;
use crate::{index::DocId, layout::Payload};

/// One posting of a term of interest inside a candidate document.
#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence {
    pub doc: DocId,
    pub term: Term,
    /// Char offsets into the field text.
    pub start: u32,
    pub end: u32,
    pub position: u32,
    pub payload: Option<Payload>,
}

impl Occurrence {
    /// Sort key grouping occurrences by document, then field, then span.
    pub fn key(&self) -> (DocId, &str, u32, &str, u32) {
        (
            self.doc,
            &self.term.field,
            self.start,
            &self.term.text,
            self.position,
        )
    }

    /// Whether the two char spans share at least one char.
    pub fn overlaps(&self, other: &Occurrence) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightedOccurrence {
    pub occurrence: Occurrence,
    pub weight: f64,
}

/// A term to highlight, as handed to snippet rendering.
///
/// Ordered by document, char start, field and term text; equality agrees
/// with that order.
#[derive(Debug, Clone, Serialize)]
pub struct HighlightTerm {
    pub doc: DocId,
    pub field: String,
    pub text: String,
    pub start: u32,
    pub end: u32,
    pub position: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    pub weight: f64,
    pub in_phrase: bool,
}

impl HighlightTerm {
    pub fn new(weighted: &WeightedOccurrence, in_phrase: bool) -> Self {
        let occ = &weighted.occurrence;
        Self {
            doc: occ.doc,
            field: occ.term.field.clone(),
            text: occ.term.text.clone(),
            start: occ.start,
            end: occ.end,
            position: occ.position,
            payload: occ.payload,
            weight: weighted.weight,
            in_phrase,
        }
    }

    fn order_key(&self) -> (DocId, u32, &str, &str) {
        (self.doc, self.start, &self.field, &self.text)
    }
}

impl PartialEq for HighlightTerm {
    fn eq(&self, other: &Self) -> bool {
        self.order_key() == other.order_key()
    }
}

impl Eq for HighlightTerm {}

impl PartialOrd for HighlightTerm {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HighlightTerm {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order_key().cmp(&other.order_key())
    }
}
