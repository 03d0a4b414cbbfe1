//! Posting list scanning.
//!
//! Walks the positional postings of every term of interest, restricted to
//! the candidate documents, and turns each position into an [`Occurrence`]
//! carrying its char span and OCR payload. Segments are scanned in
//! parallel.

use std::collections::{BTreeSet, HashMap};

use rayon::prelude::*;
use tantivy::{
    DocSet,
    TERMINATED,
    postings::{Postings, SegmentPostings},
    schema::{Field, IndexRecordOption},
};

use super::{
    pattern::CompiledPattern,
    query::{FieldTermIndex, Term},
    term::Occurrence,
};
use crate::{
    error::{Error, Result},
    index::{DocId, IndexSnapshot},
    layout::DocumentLayout,
};

/// Collect the occurrences of the requested terms and patterns in the
/// candidate documents. Emission order is unspecified.
pub fn scan(
    snapshot: &IndexSnapshot,
    field_terms: &FieldTermIndex,
    patterns: &[CompiledPattern],
    candidates: &BTreeSet<DocId>,
) -> Result<Vec<Occurrence>> {
    let schema_fields = snapshot.fields();
    let mut fields: Vec<(&str, Field)> = Vec::new();
    for name in field_terms.keys() {
        match schema_fields.highlightable(name) {
            Some(field) => fields.push((name, field)),
            None => {
                tracing::debug!(field = %name, "not a text field, skipping")
            }
        }
    }

    let segments = snapshot.partition(candidates);
    tracing::debug!(
        candidates = candidates.len(),
        segments = segments.len(),
        "scanning postings"
    );

    let per_segment = segments
        .par_iter()
        .map(|(segment, locals)| {
            let scanner = SegmentScanner {
                snapshot,
                segment: *segment,
                locals,
                layouts: HashMap::new(),
                out: Vec::new(),
            };
            scanner
                .run(&fields, field_terms, patterns)
                .map_err(|e| Error::highlight("scanning segment", e))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(per_segment.into_iter().flatten().collect())
}

struct SegmentScanner<'a> {
    snapshot: &'a IndexSnapshot,
    segment: u32,
    /// Candidate local ids, ascending.
    locals: &'a [u32],
    layouts: HashMap<u32, DocumentLayout>,
    out: Vec<Occurrence>,
}

impl SegmentScanner<'_> {
    fn run(
        mut self,
        fields: &[(&str, Field)],
        field_terms: &FieldTermIndex,
        patterns: &[CompiledPattern],
    ) -> Result<Vec<Occurrence>> {
        let snapshot = self.snapshot;
        let reader = snapshot.segment_reader(self.segment);

        for &(name, field) in fields {
            let inverted = reader.inverted_index(field)?;

            for term in field_terms.get(name).into_iter().flatten() {
                let key = tantivy::Term::from_field_text(field, &term.text);
                let postings = inverted.read_postings(
                    &key,
                    IndexRecordOption::WithFreqsAndPositions,
                )?;
                if let Some(postings) = postings {
                    self.collect(term, postings)?;
                }
            }

            for pattern in patterns.iter().filter(|p| p.field() == name) {
                let dict = inverted.terms();
                let prefix = pattern.literal_prefix().as_bytes();
                let mut stream = dict.range().ge(prefix).into_stream()?;
                while stream.advance() {
                    let key = stream.key();
                    if !key.starts_with(prefix) {
                        break;
                    }
                    let Ok(text) = std::str::from_utf8(key) else {
                        continue;
                    };
                    if !pattern.matches(text) {
                        continue;
                    }
                    tracing::trace!(%pattern, text, "pattern accepted term");
                    let postings = inverted.read_postings_from_terminfo(
                        stream.value(),
                        IndexRecordOption::WithFreqsAndPositions,
                    )?;
                    self.collect(&Term::new(name, text), postings)?;
                }
            }
        }

        tracing::trace!(
            segment = self.segment,
            occurrences = self.out.len(),
            "segment scanned"
        );
        Ok(self.out)
    }

    fn collect(
        &mut self,
        term: &Term,
        mut postings: SegmentPostings,
    ) -> Result<()> {
        let mut positions = Vec::new();
        for &local in self.locals {
            let mut doc = postings.doc();
            if doc < local {
                doc = postings.seek(local);
            }
            if doc == TERMINATED {
                break;
            }
            if doc != local {
                continue;
            }

            positions.clear();
            postings.positions(&mut positions);
            self.emit(term, local, &positions)?;
        }
        Ok(())
    }

    fn emit(
        &mut self,
        term: &Term,
        local: u32,
        positions: &[u32],
    ) -> Result<()> {
        let id = self.snapshot.global_id(self.segment, local);
        if !self.layouts.contains_key(&local) {
            let stored = self.snapshot.stored(id)?;
            self.layouts.insert(local, stored.layout);
        }
        let layout = &self.layouts[&local];

        let field = layout.field(&term.field).ok_or_else(|| {
            Error::CorruptIndex(format!(
                "document {id} has postings in {} but no layout for it",
                term.field
            ))
        })?;

        for &position in positions {
            let token = field.locate(position, &term.text).ok_or_else(|| {
                Error::CorruptIndex(format!(
                    "document {id}: no layout entry for {term} at {position}"
                ))
            })?;
            if token.start > token.end || token.end > field.length {
                return Err(Error::CorruptIndex(format!(
                    "document {id}: span {}..{} of {term} outside field of {} \
                     chars",
                    token.start, token.end, field.length
                )));
            }
            self.out.push(Occurrence {
                doc: id,
                term: term.clone(),
                start: token.start,
                end: token.end,
                position,
                payload: token.payload,
            });
        }
        Ok(())
    }
}
