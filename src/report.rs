//! Rendering of highlight results for the command line.

use serde::Serialize;

use crate::{
    error::Result,
    highlight::{HighlightSets, HighlightTerm},
    index::{DocId, IndexSnapshot},
};

/// A highlight together with the field text it covers.
#[derive(Debug, Clone, Serialize)]
pub struct HighlightView {
    #[serde(flatten)]
    pub term: HighlightTerm,
    /// Original field text under the span, before normalization.
    pub excerpt: String,
}

/// The highlights of one document, in text order.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentHighlights {
    pub doc: DocId,
    pub name: String,
    pub highlights: Vec<HighlightView>,
}

/// Attach document names and excerpts to highlight sets.
pub fn collect(
    snapshot: &IndexSnapshot,
    sets: &HighlightSets,
) -> Result<Vec<DocumentHighlights>> {
    let mut out = Vec::with_capacity(sets.len());
    for (&doc, terms) in sets {
        let stored = snapshot.stored(doc)?;
        let highlights = terms
            .iter()
            .map(|term| {
                let excerpt = stored
                    .layout
                    .field(&term.field)
                    .and_then(|f| f.excerpt(term.start, term.end))
                    .unwrap_or_default();
                HighlightView {
                    term: term.clone(),
                    excerpt,
                }
            })
            .collect();
        out.push(DocumentHighlights {
            doc,
            name: stored.name,
            highlights,
        });
    }
    Ok(out)
}

pub fn format_human(docs: &[DocumentHighlights]) -> String {
    if docs.is_empty() {
        return "No documents.\n".to_string();
    }

    let mut out = String::new();
    for doc in docs {
        out.push_str(&format!("{} (#{})\n", doc.name, doc.doc));
        if doc.highlights.is_empty() {
            out.push_str("     no highlights\n");
            continue;
        }
        for h in &doc.highlights {
            let t = &h.term;
            out.push_str(&format!(
                "  {:>6}..{:<6} {:<7} {:<20} pos {:<5} w {:.3}",
                t.start,
                t.end,
                t.field,
                format!("{:?}", h.excerpt),
                t.position,
                t.weight,
            ));
            if let Some(payload) = &t.payload {
                out.push_str(&format!(" p{}", payload.page));
            }
            if t.in_phrase {
                out.push_str(" [phrase]");
            }
            out.push('\n');
        }
    }
    let total: usize = docs.iter().map(|d| d.highlights.len()).sum();
    out.push_str(&format!(
        "\n{total} highlight(s) in {} document(s)\n",
        docs.len()
    ));
    out
}

pub fn format_json(docs: &[DocumentHighlights]) -> Result<String> {
    Ok(serde_json::to_string_pretty(docs)?)
}
