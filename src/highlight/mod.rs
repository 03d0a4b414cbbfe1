//! Query-time highlighting.
//!
//! Given a query and a set of candidate documents, find every occurrence of
//! every term the query asks for, weigh it, drop the occurrences of
//! phrase-only terms that no phrase instantiation supports, and hand back
//! one ordered set of highlight terms per document.

pub mod assemble;
pub mod pattern;
pub mod phrase;
pub mod query;
pub mod scanner;
pub mod term;
pub mod weight;

use std::collections::BTreeSet;

pub use assemble::HighlightSets;
pub use query::{Clause, Occur, Query, Term, TermPhrase};
pub use term::HighlightTerm;

use self::{
    pattern::CompiledPattern,
    phrase::{PhraseDecisions, PhraseFilter},
    query::ExtractedTerms,
    term::WeightedOccurrence,
    weight::WeightCache,
};
use crate::{
    config::HighlightConfig,
    error::{Error, Result},
    index::{DocId, IndexSnapshot},
};

/// Runs highlight requests against one index snapshot.
#[derive(Debug, Clone)]
pub struct Highlighter<'a> {
    snapshot: &'a IndexSnapshot,
    config: &'a HighlightConfig,
}

impl<'a> Highlighter<'a> {
    pub fn new(
        snapshot: &'a IndexSnapshot,
        config: &'a HighlightConfig,
    ) -> Self {
        Self { snapshot, config }
    }

    /// Highlight `query` in the candidate documents.
    ///
    /// `fields` restricts highlighting to those fields; when empty, the
    /// configured default fields are used. Every candidate gets an entry in
    /// the result, empty when nothing in it matched.
    pub fn highlight(
        &self,
        query: &Query,
        candidates: &BTreeSet<DocId>,
        fields: &[String],
    ) -> Result<HighlightSets> {
        let fields = if fields.is_empty() {
            &self.config.fields[..]
        } else {
            fields
        };

        // Stage 1: Extract terms of interest
        let extracted = self.extract(query);
        tracing::debug!(
            terms = extracted.terms.len(),
            phrases = extracted.phrases.len(),
            prefixes = extracted.prefixes.len(),
            wildcards = extracted.wildcards.len(),
            "extracted query terms"
        );
        if extracted.is_empty() || candidates.is_empty() {
            return Ok(assemble::assemble(
                candidates,
                &[],
                &PhraseDecisions::default(),
            ));
        }

        // Stage 2: Group exact terms by requested field
        let field_terms = extracted.field_term_index(fields);

        // Stage 3: Compile prefix and wildcard patterns
        let patterns = compile_patterns(&extracted, fields)
            .map_err(|e| Error::highlight("compiling patterns", e))?;

        // Stage 4: Scan postings
        let mut occurrences = scanner::scan(
            self.snapshot,
            &field_terms,
            &patterns,
            candidates,
        )?;

        // Stage 5: Order and deduplicate
        occurrences.sort_by(|a, b| a.key().cmp(&b.key()));
        occurrences.dedup_by(|a, b| a.key() == b.key());
        tracing::debug!(occurrences = occurrences.len(), "scanned postings");

        // Stage 6: Weigh, keeping only positive weights
        let weighted = self
            .weigh(occurrences, fields)
            .map_err(|e| Error::highlight("computing term weights", e))?;

        // Stage 7: Phrase consistency
        let independent = independent_terms(&extracted, &patterns, &weighted);
        let filter = PhraseFilter::new(
            &extracted.phrases,
            &independent,
            self.config.max_branches,
        );
        let decisions = filter
            .decide(&weighted)
            .map_err(|e| Error::highlight("filtering phrases", e))?;

        // Stage 8: Assemble per-document sets
        let sets = assemble::assemble(candidates, &weighted, &decisions);
        tracing::debug!(
            documents = sets.len(),
            highlights = sets.values().map(|s| s.len()).sum::<usize>(),
            "assembled highlight sets"
        );
        Ok(sets)
    }

    /// Extract, clamping phrase slop to the configured ceiling.
    fn extract(&self, query: &Query) -> ExtractedTerms {
        let mut extracted = query::extract(query);
        let max_slop = self.config.max_slop;
        extracted.phrases = std::mem::take(&mut extracted.phrases)
            .into_iter()
            .map(|phrase| {
                if phrase.slop() > max_slop {
                    tracing::warn!(
                        %phrase,
                        max_slop,
                        "clamping phrase slop"
                    );
                    phrase.with_slop(max_slop)
                } else {
                    phrase
                }
            })
            .collect();
        extracted
    }

    fn weigh(
        &self,
        occurrences: Vec<term::Occurrence>,
        fields: &[String],
    ) -> Result<Vec<WeightedOccurrence>> {
        let schema_fields = self.snapshot.fields();
        let weight_fields: Vec<_> = fields
            .iter()
            .filter_map(|name| schema_fields.highlightable(name))
            .collect();
        let mut cache = WeightCache::new(self.snapshot, &weight_fields)?;

        let total = occurrences.len();
        let mut weighted = Vec::with_capacity(total);
        for occurrence in occurrences {
            let weight = cache.weight(&occurrence.term.text)?;
            if weight > 0.0 {
                weighted.push(WeightedOccurrence { occurrence, weight });
            }
        }
        tracing::debug!(
            kept = weighted.len(),
            dropped = total - weighted.len(),
            distinct = cache.len(),
            doc_field_count = cache.doc_field_count(),
            "weighed occurrences"
        );
        Ok(weighted)
    }
}

fn compile_patterns(
    extracted: &ExtractedTerms,
    fields: &[String],
) -> Result<Vec<CompiledPattern>> {
    let requested = |term: &Term| fields.contains(&term.field);
    let mut patterns: Vec<CompiledPattern> = extracted
        .prefixes
        .iter()
        .filter(|t| requested(t))
        .map(CompiledPattern::prefix)
        .collect();
    for term in extracted.wildcards.iter().filter(|t| requested(t)) {
        patterns.push(CompiledPattern::wildcard(term)?);
    }
    Ok(patterns)
}

/// Terms whose occurrences stand on their own: bare query terms, plus any
/// matched term a prefix or wildcard asked for.
fn independent_terms(
    extracted: &ExtractedTerms,
    patterns: &[CompiledPattern],
    weighted: &[WeightedOccurrence],
) -> BTreeSet<Term> {
    let mut independent = extracted.terms.clone();
    if patterns.is_empty() {
        return independent;
    }
    for w in weighted {
        let term = &w.occurrence.term;
        if independent.contains(term) {
            continue;
        }
        if patterns
            .iter()
            .any(|p| p.field() == term.field && p.matches(&term.text))
        {
            independent.insert(term.clone());
        }
    }
    independent
}
