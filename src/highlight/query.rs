//! Query trees and term extraction.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
    analysis::normalize_term,
    error::{Error, Result},
};

/// A term in a field.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
pub struct Term {
    pub field: String,
    pub text: String,
}

impl Term {
    pub fn new(field: &str, text: &str) -> Self {
        Self {
            field: field.to_string(),
            text: text.to_string(),
        }
    }
}

impl std::fmt::Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.field, self.text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Occur {
    Must,
    Should,
    MustNot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    pub occur: Occur,
    pub query: Query,
}

/// A query tree, as produced by the search front end.
///
/// Unknown clause kinds deserialize to [`Query::Unsupported`] and are
/// ignored by [`extract`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Query {
    Term {
        field: String,
        text: String,
    },
    Phrase {
        field: String,
        /// Alternatives per phrase slot.
        slots: Vec<Vec<String>>,
        /// Required slot positions; `0..n` when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        positions: Option<Vec<u32>>,
        #[serde(default)]
        slop: u32,
    },
    Prefix {
        field: String,
        text: String,
    },
    Wildcard {
        field: String,
        pattern: String,
    },
    Boolean {
        clauses: Vec<Clause>,
    },
    #[serde(other)]
    Unsupported,
}

/// An ordered list of phrase slots, each holding alternative terms.
///
/// Equality, hashing and ordering look at the slots and the slop only.
#[derive(Debug, Clone)]
pub struct TermPhrase {
    slots: Vec<Vec<Term>>,
    positions: Vec<u32>,
    slop: u32,
}

impl TermPhrase {
    /// Build a phrase, or `None` when the shape is malformed: no slots, an
    /// empty slot, a position count that differs from the slot count, or
    /// decreasing positions.
    pub fn new(
        slots: Vec<Vec<Term>>,
        positions: Vec<u32>,
        slop: u32,
    ) -> Option<Self> {
        if slots.is_empty()
            || slots.iter().any(|s| s.is_empty())
            || positions.len() != slots.len()
            || positions.windows(2).any(|w| w[0] > w[1])
        {
            return None;
        }
        Some(Self {
            slots,
            positions,
            slop,
        })
    }

    pub fn slots(&self) -> &[Vec<Term>] {
        &self.slots
    }

    pub fn positions(&self) -> &[u32] {
        &self.positions
    }

    pub fn slop(&self) -> u32 {
        self.slop
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, term: &Term) -> bool {
        self.slots.iter().flatten().any(|t| t == term)
    }

    /// Indices of every slot listing `term` as an alternative.
    pub fn slot_indices(&self, term: &Term) -> Result<Vec<usize>> {
        let indices: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.contains(term))
            .map(|(i, _)| i)
            .collect();
        if indices.is_empty() {
            return Err(Error::Inconsistency(format!(
                "term {term} is not part of phrase {self}"
            )));
        }
        Ok(indices)
    }

    pub fn with_slop(mut self, slop: u32) -> Self {
        self.slop = slop;
        self
    }

    pub fn terms(&self) -> impl Iterator<Item = &Term> {
        self.slots.iter().flatten()
    }
}

impl PartialEq for TermPhrase {
    fn eq(&self, other: &Self) -> bool {
        self.slots == other.slots && self.slop == other.slop
    }
}

impl Eq for TermPhrase {}

impl std::hash::Hash for TermPhrase {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.slots.hash(state);
        self.slop.hash(state);
    }
}

impl PartialOrd for TermPhrase {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TermPhrase {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (&self.slots, self.slop).cmp(&(&other.slots, other.slop))
    }
}

impl std::fmt::Display for TermPhrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots: Vec<String> = self
            .slots
            .iter()
            .map(|slot| {
                slot.iter()
                    .map(|t| t.text.as_str())
                    .collect::<Vec<_>>()
                    .join("|")
            })
            .collect();
        write!(f, "\"{}\"~{}", slots.join(" "), self.slop)
    }
}

/// Terms of interest pulled out of a query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedTerms {
    /// Terms requested on their own, outside any phrase.
    pub terms: BTreeSet<Term>,
    pub phrases: BTreeSet<TermPhrase>,
    pub prefixes: BTreeSet<Term>,
    pub wildcards: BTreeSet<Term>,
}

/// Field name to the exact terms to look up in that field.
pub type FieldTermIndex = BTreeMap<String, BTreeSet<Term>>;

impl ExtractedTerms {
    /// Group bare terms and phrase alternatives by field, keeping only the
    /// requested fields. Every requested field gets an entry.
    pub fn field_term_index(&self, fields: &[String]) -> FieldTermIndex {
        let mut index: FieldTermIndex = fields
            .iter()
            .map(|f| (f.clone(), BTreeSet::new()))
            .collect();
        let phrase_terms = self.phrases.iter().flat_map(|p| p.terms());
        for term in self.terms.iter().chain(phrase_terms) {
            if let Some(set) = index.get_mut(&term.field) {
                set.insert(term.clone());
            }
        }
        index
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
            && self.phrases.is_empty()
            && self.prefixes.is_empty()
            && self.wildcards.is_empty()
    }
}

/// Collect the terms, phrases and patterns a query asks for.
///
/// Negated clauses contribute nothing, and neither do unsupported clauses
/// or malformed phrases.
pub fn extract(query: &Query) -> ExtractedTerms {
    let mut out = ExtractedTerms::default();
    collect(query, &mut out);
    out
}

fn collect(query: &Query, out: &mut ExtractedTerms) {
    match query {
        Query::Term { field, text } => {
            out.terms.insert(Term::new(field, text));
        }
        Query::Phrase {
            field,
            slots,
            positions,
            slop,
        } => {
            let terms: Vec<Vec<Term>> = slots
                .iter()
                .map(|alts| alts.iter().map(|t| Term::new(field, t)).collect())
                .collect();
            let positions = positions
                .clone()
                .unwrap_or_else(|| (0..slots.len() as u32).collect());
            match TermPhrase::new(terms, positions, *slop) {
                Some(phrase) => {
                    out.phrases.insert(phrase);
                }
                None => {
                    tracing::warn!(%field, ?slots, "ignoring malformed phrase")
                }
            }
        }
        Query::Prefix { field, text } => {
            out.prefixes.insert(Term::new(field, text));
        }
        Query::Wildcard { field, pattern } => {
            out.wildcards.insert(Term::new(field, pattern));
        }
        Query::Boolean { clauses } => {
            for clause in clauses {
                if clause.occur == Occur::MustNot {
                    continue;
                }
                collect(&clause.query, out);
            }
        }
        Query::Unsupported => {
            tracing::debug!("skipping unsupported query clause");
        }
    }
}

impl Query {
    /// Parse the command-line query syntax.
    ///
    /// Clauses are whitespace-separated. `+` marks a required clause and
    /// `-` a negated one. `"a b|c"~2` is a phrase whose second slot has two
    /// alternatives, with slop 2. `field:` in front of a clause picks its
    /// field, otherwise `default_field` is used. A single trailing `*` makes
    /// a prefix; any other `*` or `?` makes a wildcard.
    pub fn parse(input: &str, default_field: &str) -> Query {
        let mut clauses = Vec::new();
        let mut rest = input.trim_start();

        while !rest.is_empty() {
            let (occur, after) = match rest.as_bytes()[0] {
                b'+' => (Occur::Must, &rest[1..]),
                b'-' => (Occur::MustNot, &rest[1..]),
                _ => (Occur::Should, rest),
            };
            let (field, after) = split_field(after, default_field);

            let (query, remaining) = match after.strip_prefix('"') {
                Some(quoted) => parse_phrase(quoted, field),
                None => {
                    let end = after
                        .find(char::is_whitespace)
                        .unwrap_or(after.len());
                    (parse_word(&after[..end], field), &after[end..])
                }
            };

            if let Some(query) = query {
                clauses.push(Clause { occur, query });
            }
            rest = remaining.trim_start();
        }

        if clauses.len() == 1 && clauses[0].occur == Occur::Should {
            return clauses.remove(0).query;
        }
        Query::Boolean { clauses }
    }
}

fn split_field<'a>(
    input: &'a str,
    default_field: &'a str,
) -> (&'a str, &'a str) {
    let head_end = input
        .find(|c: char| c.is_whitespace() || c == '"')
        .unwrap_or(input.len());
    match input[..head_end].split_once(':') {
        Some((field, _))
            if !field.is_empty()
                && field.chars().all(|c| c.is_ascii_alphabetic() || c == '_') =>
        {
            (field, &input[field.len() + 1..])
        }
        _ => (default_field, input),
    }
}

fn parse_phrase<'a>(input: &'a str, field: &str) -> (Option<Query>, &'a str) {
    let close = input.find('"').unwrap_or(input.len());
    let body = &input[..close];
    let mut rest = input.get(close + 1..).unwrap_or("");

    let mut slop = 0;
    if let Some(after_tilde) = rest.strip_prefix('~') {
        let digits = after_tilde
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(after_tilde.len());
        slop = after_tilde[..digits].parse().unwrap_or(0);
        rest = &after_tilde[digits..];
    }

    let slots: Vec<Vec<String>> = body
        .split_whitespace()
        .map(|slot| {
            let mut alts: Vec<String> = Vec::new();
            for alt in slot.split('|').filter_map(normalize_term) {
                if !alts.contains(&alt) {
                    alts.push(alt);
                }
            }
            alts
        })
        .filter(|alts| !alts.is_empty())
        .collect();

    let query = match slots.len() {
        0 => None,
        1 if slots[0].len() == 1 => Some(Query::Term {
            field: field.to_string(),
            text: slots[0][0].clone(),
        }),
        _ => Some(Query::Phrase {
            field: field.to_string(),
            slots,
            positions: None,
            slop,
        }),
    };
    (query, rest)
}

fn parse_word(word: &str, field: &str) -> Option<Query> {
    let field = field.to_string();
    let wildcards = word.chars().filter(|&c| c == '*' || c == '?').count();

    if wildcards == 1 && word.ends_with('*') {
        let text = normalize_term(word.trim_end_matches('*'))?;
        return Some(Query::Prefix { field, text });
    }
    if wildcards > 0 {
        return Some(Query::Wildcard {
            field,
            pattern: word.to_lowercase(),
        });
    }
    let text = normalize_term(word)?;
    Some(Query::Term { field, text })
}
