use std::collections::BTreeSet;

use folio::{
    DocId,
    HighlightConfig,
    HighlightSets,
    Highlighter,
    IndexSnapshot,
    OcrDocument,
    OcrIndex,
    Query,
    highlight::{
        Clause,
        Occur,
        weight::{WeightCache, idf},
    },
    ocr::{OcrLine, OcrPage, OcrWord},
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

struct Fixture {
    _index: OcrIndex,
    snapshot: IndexSnapshot,
}

impl Fixture {
    fn new(docs: &[OcrDocument]) -> folio::Result<Self> {
        let index = OcrIndex::open_in_ram()?;
        let mut writer = index.writer(15_000_000)?;
        for doc in docs {
            index.add_document(&writer, doc, 0)?;
        }
        writer.commit()?;
        let snapshot = index.snapshot()?;
        Ok(Self {
            _index: index,
            snapshot,
        })
    }

    fn plain(docs: &[(&str, &str)]) -> folio::Result<Self> {
        let docs: Vec<_> = docs
            .iter()
            .map(|(name, text)| OcrDocument::from_plain_text(name, text))
            .collect();
        Self::new(&docs)
    }

    fn id(&self, name: &str) -> folio::Result<DocId> {
        Ok(self.snapshot.resolve_name(name)?.unwrap_or(DocId::MAX))
    }

    fn highlight(
        &self,
        query: &Query,
        names: &[&str],
    ) -> folio::Result<HighlightSets> {
        let mut candidates = BTreeSet::new();
        for name in names {
            candidates.insert(self.id(name)?);
        }
        let config = HighlightConfig::default();
        Highlighter::new(&self.snapshot, &config)
            .highlight(query, &candidates, &[])
    }

    /// (text, position, in_phrase) of every highlight in one document.
    fn terms(
        &self,
        query: &str,
        name: &str,
    ) -> folio::Result<Vec<(String, u32, bool)>> {
        let query = Query::parse(query, "text");
        let sets = self.highlight(&query, &[name])?;
        let id = self.id(name)?;
        Ok(sets[&id]
            .iter()
            .map(|t| (t.text.clone(), t.position, t.in_phrase))
            .collect())
    }
}

fn t(text: &str, position: u32, in_phrase: bool) -> (String, u32, bool) {
    (text.to_string(), position, in_phrase)
}

#[test]
fn quick_fox_within_slop() -> TestResult {
    let fx = Fixture::plain(&[("memo", "the quick brown fox")])?;
    let terms = fx.terms("\"quick fox\"~2", "memo")?;
    assert_eq!(terms, vec![t("quick", 1, true), t("fox", 3, true)]);
    Ok(())
}

#[test]
fn quick_fox_exact_is_empty() -> TestResult {
    let fx = Fixture::plain(&[("memo", "the quick brown fox")])?;
    assert!(fx.terms("\"quick fox\"", "memo")?.is_empty());
    Ok(())
}

#[test]
fn phrase_support_follows_slop() -> TestResult {
    let fx = Fixture::plain(&[
        ("adjacent", "x x x x x a b"),
        ("gapped", "x x x x x a x b"),
    ])?;

    assert_eq!(
        fx.terms("\"a b\"", "adjacent")?,
        vec![t("a", 5, true), t("b", 6, true)]
    );
    assert!(fx.terms("\"a b\"", "gapped")?.is_empty());
    assert_eq!(
        fx.terms("\"a b\"~1", "gapped")?,
        vec![t("a", 5, true), t("b", 7, true)]
    );
    Ok(())
}

#[test]
fn order_inversion_costs_one() -> TestResult {
    let fx = Fixture::plain(&[("inverted", "x x x x b a")])?;

    assert!(fx.terms("\"a b\"", "inverted")?.is_empty());
    assert_eq!(
        fx.terms("\"a b\"~1", "inverted")?,
        vec![t("b", 4, true), t("a", 5, true)]
    );
    Ok(())
}

#[test]
fn independent_terms_survive_failed_phrases() -> TestResult {
    let fx = Fixture::plain(&[("memo", "the quick brown fox")])?;
    let terms = fx.terms("quick \"quick fox\"", "memo")?;
    assert_eq!(terms, vec![t("quick", 1, false)]);
    Ok(())
}

#[test]
fn must_not_contributes_nothing() -> TestResult {
    let fx = Fixture::plain(&[("memo", "the quick brown fox")])?;
    let terms = fx.terms("quick -fox -\"brown fox\"", "memo")?;
    assert_eq!(terms, vec![t("quick", 1, false)]);

    let nested = Query::Boolean {
        clauses: vec![
            Clause {
                occur: Occur::Must,
                query: Query::parse("brown", "text"),
            },
            Clause {
                occur: Occur::MustNot,
                query: Query::parse("brown fox", "text"),
            },
        ],
    };
    let sets = fx.highlight(&nested, &["memo"])?;
    let texts: Vec<_> =
        sets.values().flatten().map(|t| t.text.as_str()).collect();
    assert_eq!(texts, vec!["brown"]);
    Ok(())
}

#[test]
fn repeated_runs_are_identical() -> TestResult {
    let fx = Fixture::plain(&[
        ("one", "ship cargo ship harbor cargo"),
        ("two", "harbor ship and cargo"),
        ("three", "nothing relevant"),
    ])?;
    let query = Query::parse("\"ship cargo\"~1 harb* c?rgo", "text");
    let names = ["one", "two", "three"];

    let first = fx.highlight(&query, &names)?;
    for _ in 0..5 {
        let again = fx.highlight(&query, &names)?;
        assert_eq!(
            serde_json::to_string(&first)?,
            serde_json::to_string(&again)?
        );
    }
    assert_eq!(first.len(), 3);
    assert!(first[&fx.id("three")?].is_empty());
    Ok(())
}

#[test]
fn rarer_terms_weigh_more() -> TestResult {
    let fx = Fixture::plain(&[
        ("a", "common rare"),
        ("b", "common"),
        ("c", "common"),
    ])?;
    let text = fx.snapshot.fields().text;
    let mut cache = WeightCache::new(&fx.snapshot, &[text])?;

    let common = cache.weight("common")?;
    let rare = cache.weight("rare")?;
    let absent = cache.weight("absent")?;

    assert_eq!(cache.doc_field_count(), 3);
    assert!(common < rare);
    assert!(rare <= absent);
    assert_eq!(absent, idf(3, 0));
    assert!((absent - 4f64.ln()).abs() < 1e-12);
    Ok(())
}

#[test]
fn ocr_alternatives_complete_a_phrase() -> TestResult {
    let words = vec![
        OcrWord::new("Barque"),
        OcrWord::new("Ma1y").with_alternatives(&["Mary"]),
        OcrWord::new("sailed"),
    ];
    let doc = OcrDocument {
        name: "log".to_string(),
        title: String::new(),
        author: String::new(),
        pages: vec![OcrPage {
            index: 0,
            lines: vec![OcrLine { words }],
        }],
    };
    let fx = Fixture::new(&[doc])?;

    let terms = fx.terms("\"barque mary\"", "log")?;
    assert_eq!(terms, vec![t("barque", 0, true), t("mary", 1, true)]);

    let terms = fx.terms("\"barque ma1y|mary sailed\"", "log")?;
    assert_eq!(terms.len(), 4);
    assert!(terms.iter().all(|(_, _, in_phrase)| *in_phrase));
    Ok(())
}

#[test]
fn prefix_and_wildcard_matches() -> TestResult {
    let fx = Fixture::plain(&[("memo", "jumped jumper lumped over")])?;
    let terms = fx.terms("jump*", "memo")?;
    assert_eq!(terms, vec![t("jumped", 0, false), t("jumper", 1, false)]);

    let terms = fx.terms("?umped", "memo")?;
    assert_eq!(terms, vec![t("jumped", 0, false), t("lumped", 2, false)]);
    Ok(())
}

#[test]
fn segments_and_deletions() -> TestResult {
    let index = OcrIndex::open_in_ram()?;
    let mut writer = index.writer(15_000_000)?;
    writer.set_merge_policy(Box::new(tantivy::indexer::NoMergePolicy));
    for (name, text) in [("a", "harbor light"), ("b", "light house")] {
        let doc = OcrDocument::from_plain_text(name, text);
        index.add_document(&writer, &doc, 0)?;
        writer.commit()?;
    }
    index.delete_document(&writer, "a");
    let doc = OcrDocument::from_plain_text("c", "light ship");
    index.add_document(&writer, &doc, 0)?;
    writer.commit()?;

    let snapshot = index.snapshot()?;
    assert!(snapshot.num_segments() >= 2);
    assert!(snapshot.resolve_name("a")?.is_none());

    let config = HighlightConfig::default();
    let query = Query::parse("light", "text");
    let sets = Highlighter::new(&snapshot, &config).highlight(
        &query,
        &snapshot.live_doc_ids(),
        &[],
    )?;

    let mut names = Vec::new();
    for (&doc, terms) in &sets {
        assert_eq!(terms.len(), 1);
        names.push(snapshot.stored(doc)?.name);
    }
    names.sort();
    assert_eq!(names, vec!["b", "c"]);
    Ok(())
}

#[test]
fn deleted_neighbours_keep_live_matches() -> TestResult {
    let index = OcrIndex::open_in_ram()?;
    let mut writer = index.writer(15_000_000)?;
    writer.set_merge_policy(Box::new(tantivy::indexer::NoMergePolicy));
    for name in ["a", "b", "c"] {
        let doc = OcrDocument::from_plain_text(name, "fox");
        index.add_document(&writer, &doc, 0)?;
    }
    writer.commit()?;
    index.delete_document(&writer, "a");
    index.delete_document(&writer, "b");
    writer.commit()?;

    let snapshot = index.snapshot()?;
    assert_eq!(snapshot.num_segments(), 1);
    assert_eq!(snapshot.num_docs(), 1);

    let c = snapshot.resolve_name("c")?.unwrap_or(DocId::MAX);
    let config = HighlightConfig::default();
    let sets = Highlighter::new(&snapshot, &config).highlight(
        &Query::parse("fox", "text"),
        &BTreeSet::from([c]),
        &[],
    )?;
    assert_eq!(sets[&c].len(), 1);
    assert!(sets[&c].iter().all(|t| t.weight > 0.0));

    // Re-indexing a document deletes its old version in place.
    let doc = OcrDocument::from_plain_text("c", "fox den");
    index.add_document(&writer, &doc, 1)?;
    writer.commit()?;
    let snapshot = index.snapshot()?;
    let c = snapshot.resolve_name("c")?.unwrap_or(DocId::MAX);
    let sets = Highlighter::new(&snapshot, &config).highlight(
        &Query::parse("fox", "text"),
        &BTreeSet::from([c]),
        &[],
    )?;
    assert_eq!(sets[&c].len(), 1);
    Ok(())
}

#[test]
fn json_query_matches_parsed_query() -> TestResult {
    let fx = Fixture::plain(&[("memo", "the quick brown fox")])?;
    let json = r#"{
        "type": "boolean",
        "clauses": [
            {"occur": "should", "query": {
                "type": "phrase", "field": "text",
                "slots": [["quick"], ["fox"]], "slop": 2
            }},
            {"occur": "should", "query": {"type": "regexp", "value": ".*"}}
        ]
    }"#;
    let query: Query = serde_json::from_str(json)?;
    let sets = fx.highlight(&query, &["memo"])?;
    let texts: Vec<_> =
        sets.values().flatten().map(|t| t.text.as_str()).collect();
    assert_eq!(texts, vec!["quick", "fox"]);
    Ok(())
}
