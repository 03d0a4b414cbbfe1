//! Phrase consistency filtering.
//!
//! Postings alone say that every word of a phrase occurs somewhere in a
//! document, not that they occur together. For each occurrence of a term
//! that belongs to a phrase, the filter looks for an instantiation of the
//! phrase around it: partners for every other slot, found among the
//! neighboring occurrences of the same field, whose positions respect the
//! phrase's slop. Occurrences of phrase-only terms without such support
//! are dropped; every occurrence taking part in an instantiation is
//! flagged as being in a phrase.
//!
//! Neighbor lists branch when two neighbors overlap in the text, which
//! happens where the OCR produced alternative readings of one word.

use std::collections::{BTreeMap, BTreeSet};

use super::{
    query::{Term, TermPhrase},
    term::WeightedOccurrence,
};
use crate::error::Result;

/// What the filter decided, by index into the weighted occurrence list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhraseDecisions {
    dropped: BTreeSet<usize>,
    in_phrase: BTreeSet<usize>,
}

impl PhraseDecisions {
    pub fn is_dropped(&self, index: usize) -> bool {
        self.dropped.contains(&index)
    }

    pub fn is_in_phrase(&self, index: usize) -> bool {
        self.in_phrase.contains(&index)
    }

    pub fn dropped_count(&self) -> usize {
        self.dropped.len()
    }

    pub fn in_phrase_count(&self) -> usize {
        self.in_phrase.len()
    }
}

/// Whether the distance between two phrase members is within `slop` of the
/// distance the phrase requires.
///
/// An order inversion costs one less than its raw positional difference.
pub fn check_slop(
    base_required: u32,
    base_actual: u32,
    other_required: u32,
    other_actual: u32,
    slop: u32,
) -> bool {
    let required = other_required as i64 - base_required as i64;
    let actual = other_actual as i64 - base_actual as i64;
    let mut difference = (required - actual).abs();
    if (required < 0) != (actual < 0) {
        difference -= 1;
    }
    difference <= slop as i64
}

pub struct PhraseFilter<'a> {
    independent: &'a BTreeSet<Term>,
    max_branches: usize,
    by_term: BTreeMap<&'a Term, Vec<&'a TermPhrase>>,
}

impl<'a> PhraseFilter<'a> {
    /// `independent` holds the terms requested outside any phrase; their
    /// occurrences are never dropped. `max_branches` caps the number of
    /// open neighbor lists per construction.
    pub fn new(
        phrases: &'a BTreeSet<TermPhrase>,
        independent: &'a BTreeSet<Term>,
        max_branches: usize,
    ) -> Self {
        let mut by_term: BTreeMap<&Term, Vec<&TermPhrase>> = BTreeMap::new();
        for phrase in phrases {
            for term in phrase.terms() {
                let entry = by_term.entry(term).or_default();
                if !entry.iter().any(|p| std::ptr::eq(*p, phrase)) {
                    entry.push(phrase);
                }
            }
        }
        Self {
            independent,
            max_branches: max_branches.max(1),
            by_term,
        }
    }

    /// Decide which occurrences survive.
    ///
    /// `occurrences` must be sorted by [`Occurrence::key`], so that each
    /// (document, field) pair forms one contiguous run ordered by span.
    ///
    /// [`Occurrence::key`]: super::term::Occurrence::key
    pub fn decide(
        &self,
        occurrences: &[WeightedOccurrence],
    ) -> Result<PhraseDecisions> {
        let mut decisions = PhraseDecisions::default();
        if self.by_term.is_empty() {
            return Ok(decisions);
        }

        let mut start = 0;
        while start < occurrences.len() {
            let head = &occurrences[start].occurrence;
            let len = occurrences[start..]
                .iter()
                .take_while(|w| {
                    w.occurrence.doc == head.doc
                        && w.occurrence.term.field == head.term.field
                })
                .count();
            let run = &occurrences[start..start + len];
            self.decide_run(run, start, &mut decisions)?;
            start += len;
        }

        // An occurrence some other anchor instantiated a phrase with is
        // supported, even if its own search failed.
        let kept = &decisions.in_phrase;
        decisions.dropped.retain(|i| !kept.contains(i));

        tracing::debug!(
            dropped = decisions.dropped.len(),
            in_phrase = decisions.in_phrase.len(),
            "phrase filter done"
        );
        Ok(decisions)
    }

    fn decide_run(
        &self,
        run: &[WeightedOccurrence],
        offset: usize,
        decisions: &mut PhraseDecisions,
    ) -> Result<()> {
        for anchor in 0..run.len() {
            let term = &run[anchor].occurrence.term;
            let Some(phrases) = self.by_term.get(term) else {
                continue;
            };
            if decisions.in_phrase.contains(&(offset + anchor)) {
                continue;
            }

            let mut supported = false;
            'phrases: for phrase in phrases {
                for slot in phrase.slot_indices(term)? {
                    if let Some(matched) =
                        self.instantiate(run, anchor, phrase, slot)
                    {
                        tracing::trace!(
                            %term,
                            %phrase,
                            position = run[anchor].occurrence.position,
                            "phrase instantiated"
                        );
                        decisions
                            .in_phrase
                            .extend(matched.into_iter().map(|i| offset + i));
                        supported = true;
                        break 'phrases;
                    }
                }
            }

            if !supported && !self.independent.contains(term) {
                tracing::trace!(
                    %term,
                    position = run[anchor].occurrence.position,
                    "no phrase support"
                );
                decisions.dropped.insert(offset + anchor);
            }
        }
        Ok(())
    }

    /// Try to instantiate `phrase` with the anchor in `slot`. Returns the
    /// run indices of every member, anchor included.
    fn instantiate(
        &self,
        run: &[WeightedOccurrence],
        anchor: usize,
        phrase: &TermPhrase,
        slot: usize,
    ) -> Option<Vec<usize>> {
        let positions = phrase.positions();
        let slop = phrase.slop();
        let anchor_pos = positions[slot];
        let first_pos = positions[0];
        let last_pos = positions[positions.len() - 1];

        let descending = self.neighbor_lists(
            run,
            anchor,
            (0..anchor).rev(),
            (anchor_pos - first_pos + slop) as usize,
        );
        let ascending = self.neighbor_lists(
            run,
            anchor,
            anchor + 1..run.len(),
            (last_pos - anchor_pos + slop) as usize,
        );

        let pos = |i: usize| run[i].occurrence.position;
        let mut matched = vec![anchor];

        let (mut base, mut base_pos) = (anchor, anchor_pos);
        for i in slot + 1..phrase.len() {
            let required = positions[i];
            let found = find_in_slot(
                run,
                &phrase.slots()[i],
                &ascending,
                &descending,
                slop,
                |c| {
                    check_slop(base_pos, pos(base), required, pos(c), slop)
                },
            )?;
            matched.push(found);
            (base, base_pos) = (found, required);
        }

        let (mut base, mut base_pos) = (anchor, anchor_pos);
        for i in (0..slot).rev() {
            let required = positions[i];
            let found = find_in_slot(
                run,
                &phrase.slots()[i],
                &descending,
                &ascending,
                slop,
                |c| {
                    check_slop(required, pos(c), base_pos, pos(base), slop)
                },
            )?;
            matched.push(found);
            (base, base_pos) = (found, required);
        }

        Some(matched)
    }

    /// Build every list of up to `required` neighbors walking away from the
    /// anchor. A neighbor overlapping an earlier list member splits the
    /// list: one copy takes the neighbor in place of the overlapped tail,
    /// the other stays as it was. Neighbors overlapping the anchor itself
    /// are skipped.
    fn neighbor_lists(
        &self,
        run: &[WeightedOccurrence],
        anchor: usize,
        candidates: impl Iterator<Item = usize>,
        required: usize,
    ) -> Vec<Vec<usize>> {
        let anchor_occ = &run[anchor].occurrence;
        let mut open: Vec<Vec<usize>> = vec![Vec::new()];
        let mut done: Vec<Vec<usize>> = Vec::new();
        let mut truncated = false;

        for candidate in candidates {
            let (full, partial): (Vec<_>, Vec<_>) =
                open.into_iter().partition(|l| l.len() >= required);
            done.extend(full);
            open = partial;
            if open.is_empty() {
                break;
            }

            let occ = &run[candidate].occurrence;
            if occ.overlaps(anchor_occ) {
                continue;
            }

            let mut next = Vec::with_capacity(open.len() + 1);
            for mut list in open {
                let overlap =
                    list.iter().position(|&i| run[i].occurrence.overlaps(occ));
                match overlap {
                    Some(at) => {
                        let mut branch = list[..at].to_vec();
                        branch.push(candidate);
                        next.push(branch);
                        next.push(list);
                    }
                    None => {
                        list.push(candidate);
                        next.push(list);
                    }
                }
            }

            if next.len() > self.max_branches {
                next.truncate(self.max_branches);
                if !truncated {
                    tracing::warn!(
                        term = %anchor_occ.term,
                        position = anchor_occ.position,
                        max_branches = self.max_branches,
                        "too many overlapping neighbors, truncating branches"
                    );
                    truncated = true;
                }
            }
            open = next;
        }

        done.extend(open);
        done
    }
}

/// First neighbor matching one of the slot's alternatives and accepted by
/// the slop check. Alternatives are tried in order; for each, the primary
/// lists are searched first and the secondary lists only when `slop > 0`.
fn find_in_slot(
    run: &[WeightedOccurrence],
    alternatives: &[Term],
    primary: &[Vec<usize>],
    secondary: &[Vec<usize>],
    slop: u32,
    accept: impl Fn(usize) -> bool,
) -> Option<usize> {
    let secondary: &[Vec<usize>] = if slop > 0 { secondary } else { &[] };
    for alternative in alternatives {
        for list in primary.iter().chain(secondary) {
            let hit = list.iter().copied().find(|&c| {
                run[c].occurrence.term == *alternative && accept(c)
            });
            if hit.is_some() {
                return hit;
            }
        }
    }
    None
}
