use crate::tokenizer::{Field, Token};
use crate::DocId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub weight: f32, // 1 + ln(tf)
}

/// Term to postings. Postings are sorted by weight descending, then doc id ascending.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvertedIndex {
    postings: BTreeMap<String, Vec<Posting>>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn postings(&self, term: &str) -> &[Posting] {
        self.postings.get(term).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_term(&self, term: &str) -> bool {
        self.postings.contains_key(term)
    }

    pub fn num_terms(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Posting])> {
        self.postings.iter().map(|(t, p)| (t.as_str(), p.as_slice()))
    }

    /// Insert a finished postings list, restoring the canonical order. Empty lists are dropped.
    pub(crate) fn insert(&mut self, term: String, mut postings: Vec<Posting>) {
        if postings.is_empty() {
            return;
        }
        sort_postings(&mut postings);
        self.postings.insert(term, postings);
    }
}

fn sort_postings(postings: &mut [Posting]) {
    postings.sort_by(|a, b| {
        b.weight
            .partial_cmp(&a.weight)
            .unwrap_or(Ordering::Equal)
            .then(a.doc_id.cmp(&b.doc_id))
    });
}

/// Accumulates per-document term frequencies for one field.
#[derive(Debug)]
pub struct IndexBuilder {
    field: Field,
    counts: HashMap<String, HashMap<DocId, u32>>,
}

impl IndexBuilder {
    pub fn new(field: Field) -> Self {
        Self { field, counts: HashMap::new() }
    }

    pub fn field(&self) -> Field {
        self.field
    }

    pub fn add_document(&mut self, doc_id: DocId, terms: &[Token]) {
        for token in terms {
            let per_doc = match self.counts.get_mut(&token.term) {
                Some(m) => m,
                None => self.counts.entry(token.term.clone()).or_default(),
            };
            *per_doc.entry(doc_id).or_insert(0) += 1;
        }
    }

    pub fn build(self) -> InvertedIndex {
        let mut index = InvertedIndex::new();
        for (term, per_doc) in self.counts {
            let postings = per_doc
                .into_iter()
                .map(|(doc_id, tf)| Posting { doc_id, weight: 1.0 + (tf as f32).ln() })
                .collect();
            index.insert(term, postings);
        }
        tracing::debug!(field = ?self.field, num_terms = index.num_terms(), "built inverted index");
        index
    }
}
