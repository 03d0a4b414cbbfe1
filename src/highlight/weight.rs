use std::collections::HashMap;

use tantivy::schema::Field;

use crate::{error::Result, index::IndexSnapshot};

fn ln_or_zero(x: u64) -> f64 {
    if x == 0 { 0.0 } else { (x as f64).ln() }
}

/// Rarity weight of a term: `ln(doc_field_count + 1) - ln(term_doc_freq)`,
/// taking `ln(0)` as 0.
pub fn idf(doc_field_count: u64, term_doc_freq: u64) -> f64 {
    ln_or_zero(doc_field_count + 1) - ln_or_zero(term_doc_freq)
}

/// Per-request term weights over a fixed set of fields.
///
/// Each distinct term text is weighed once, summing its document frequency
/// over all fields.
pub struct WeightCache<'a> {
    snapshot: &'a IndexSnapshot,
    fields: Vec<Field>,
    doc_field_count: u64,
    weights: HashMap<String, f64>,
}

impl<'a> WeightCache<'a> {
    pub fn new(snapshot: &'a IndexSnapshot, fields: &[Field]) -> Result<Self> {
        let doc_field_count =
            fields.iter().map(|&f| snapshot.docs_with_field(f)).sum();
        Ok(Self {
            snapshot,
            fields: fields.to_vec(),
            doc_field_count,
            weights: HashMap::new(),
        })
    }

    pub fn doc_field_count(&self) -> u64 {
        self.doc_field_count
    }

    pub fn weight(&mut self, text: &str) -> Result<f64> {
        if let Some(&w) = self.weights.get(text) {
            return Ok(w);
        }
        let mut doc_freq = 0;
        for &field in &self.fields {
            doc_freq += self.snapshot.doc_freq(field, text)?;
        }
        let w = idf(self.doc_field_count, doc_freq);
        tracing::trace!(text, doc_freq, weight = w, "weighed term");
        self.weights.insert(text.to_string(), w);
        Ok(w)
    }

    /// Number of distinct texts weighed so far.
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}
