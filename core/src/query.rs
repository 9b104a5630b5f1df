//! Query parsing, scoring and ranking.
//!
//! Words are OR-ed together. `-word` removes documents containing the word and `"quoted words"`
//! must all be present. A document's score is
//!
//! ```text
//! score(d) = Σ_t idf(t) * (body_weight * w_body(t, d) + title_boost * w_title(t, d))
//! idf(t)   = ln(1 + N / df(t))
//! ```
//!
//! Results are ranked by the number of distinct query terms matched, then score, then doc id.

use crate::error::QueryError;
use crate::objects::join_name;
use crate::tokenizer::{Field, Tokenizer};
use crate::{DocId, SearchIndex};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub body_weight: f32,
    pub title_boost: f32,
    /// Maximum number of hits returned, unlimited when `None`.
    pub limit: Option<usize>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self { body_weight: 1.0, title_boost: 3.0, limit: None }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedQuery {
    /// Every positive term, in first-seen order.
    pub terms: Vec<String>,
    /// Terms that came from a quoted group; a subset of `terms`.
    pub required: Vec<String>,
    pub excluded: Vec<String>,
}

impl ParsedQuery {
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

fn push_unique(list: &mut Vec<String>, term: String) {
    if !list.contains(&term) {
        list.push(term);
    }
}

pub fn parse_query(query: &str, tokenizer: &Tokenizer) -> Result<ParsedQuery, QueryError> {
    let mut parsed = ParsedQuery::default();
    let mut optional = Vec::new();
    let mut buf = String::new();
    let mut in_quote = false;

    let flush_free = |buf: &str, optional: &mut Vec<String>, parsed: &mut ParsedQuery| {
        for word in buf.split_whitespace() {
            match word.strip_prefix('-') {
                Some(neg) if !neg.is_empty() => {
                    for tok in tokenizer.tokenize(neg, Field::Body) {
                        push_unique(&mut parsed.excluded, tok.term);
                    }
                }
                _ => {
                    for tok in tokenizer.tokenize(word, Field::Body) {
                        push_unique(optional, tok.term);
                    }
                }
            }
        }
    };

    for c in query.chars() {
        if c != '"' {
            buf.push(c);
            continue;
        }
        if in_quote {
            for tok in tokenizer.tokenize(&buf, Field::Body) {
                push_unique(&mut parsed.required, tok.term);
            }
        } else {
            flush_free(&buf, &mut optional, &mut parsed);
        }
        buf.clear();
        in_quote = !in_quote;
    }
    if in_quote {
        return Err(QueryError::MalformedQuery { reason: "unbalanced quote".to_string() });
    }
    flush_free(&buf, &mut optional, &mut parsed);

    let excluded: HashSet<String> = parsed.excluded.iter().cloned().collect();
    parsed.required.retain(|t| !excluded.contains(t));
    for term in optional.into_iter().chain(parsed.required.iter().cloned()) {
        if !excluded.contains(&term) {
            push_unique(&mut parsed.terms, term);
        }
    }
    Ok(parsed)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hit {
    pub doc_id: DocId,
    pub score: f32,
    /// Distinct query terms found in the document.
    pub matched_terms: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectHit {
    pub name: String,
    pub doc_id: DocId,
    pub objtype: String,
    pub display: String,
    pub anchor: String,
    pub score: i32,
}

#[derive(Default)]
struct Acc {
    score: f32,
    matched: usize,
    required: usize,
}

/// Answers queries against one immutable index snapshot.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    index: Arc<SearchIndex>,
    tokenizer: Tokenizer,
    scoring: ScoringConfig,
}

impl QueryEngine {
    pub fn new(index: Arc<SearchIndex>, tokenizer: Tokenizer) -> Self {
        Self { index, tokenizer, scoring: ScoringConfig::default() }
    }

    pub fn with_scoring(mut self, scoring: ScoringConfig) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn index(&self) -> &SearchIndex {
        &self.index
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn search(&self, query: &str) -> Result<Vec<Hit>, QueryError> {
        let parsed = parse_query(query, &self.tokenizer)?;
        if parsed.is_empty() {
            return Ok(Vec::new());
        }
        let index = &self.index;
        let n = index.num_docs() as f32;

        let mut acc: HashMap<DocId, Acc> = HashMap::new();
        for term in &parsed.terms {
            let body = index.terms.postings(term);
            let title = index.titleterms.postings(term);
            if body.is_empty() && title.is_empty() {
                continue;
            }
            let idf = (1.0 + n / index.doc_freq(term) as f32).ln();
            let mut per_doc: HashMap<DocId, f32> = HashMap::new();
            for p in body {
                *per_doc.entry(p.doc_id).or_default() += self.scoring.body_weight * p.weight;
            }
            for p in title {
                *per_doc.entry(p.doc_id).or_default() += self.scoring.title_boost * p.weight;
            }
            let required = parsed.required.contains(term);
            for (doc_id, s) in per_doc {
                let a = acc.entry(doc_id).or_default();
                a.score += idf * s;
                a.matched += 1;
                if required {
                    a.required += 1;
                }
            }
        }

        let excluded: HashSet<DocId> = parsed
            .excluded
            .iter()
            .flat_map(|t| index.terms.postings(t).iter().chain(index.titleterms.postings(t)))
            .map(|p| p.doc_id)
            .collect();

        let mut hits: Vec<Hit> = acc
            .into_iter()
            .filter(|(doc_id, a)| a.required == parsed.required.len() && !excluded.contains(doc_id))
            .map(|(doc_id, a)| Hit { doc_id, score: a.score, matched_terms: a.matched })
            .collect();
        hits.sort_by(|a, b| {
            b.matched_terms
                .cmp(&a.matched_terms)
                .then(b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal))
                .then(a.doc_id.cmp(&b.doc_id))
        });
        if let Some(limit) = self.scoring.limit {
            hits.truncate(limit);
        }
        tracing::debug!(query, terms = ?parsed.terms, hits = hits.len(), "search");
        Ok(hits)
    }

    /// Match query words against object names. Exact and last-segment matches score above
    /// substring matches; object priority adds a bonus.
    pub fn search_objects(&self, query: &str) -> Vec<ObjectHit> {
        let words: Vec<String> = query
            .split(|c: char| c.is_whitespace() || c == '"')
            .filter(|w| !w.is_empty() && !w.starts_with('-'))
            .map(str::to_lowercase)
            .collect();
        if words.is_empty() {
            return Vec::new();
        }
        let objects = &self.index.objects;
        let mut hits = Vec::new();
        for (prefix, names) in objects.prefixes() {
            for (name, entry) in names {
                let full = join_name(prefix, name);
                let lower = full.to_lowercase();
                let last = name.to_lowercase();
                let best = words
                    .iter()
                    .filter_map(|w| {
                        if lower == *w || last == *w {
                            Some(11)
                        } else if w.chars().count() > 2 && lower.contains(w.as_str()) {
                            Some(6)
                        } else {
                            None
                        }
                    })
                    .max();
                let Some(base) = best else { continue };
                let Some(objtype) = objects.objtype(entry.objtype) else { continue };
                let anchor = match entry.anchor.as_str() {
                    "" => full.clone(),
                    "-" => String::new(),
                    a => a.to_string(),
                };
                hits.push(ObjectHit {
                    score: base + priority_bonus(entry.priority),
                    doc_id: entry.doc_id,
                    objtype: objtype.qualified(),
                    display: objtype.display.clone(),
                    anchor,
                    name: full,
                });
            }
        }
        hits.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
        if let Some(limit) = self.scoring.limit {
            hits.truncate(limit);
        }
        hits
    }
}

fn priority_bonus(priority: i32) -> i32 {
    match priority {
        0 => 15,
        1 => 5,
        2 => -5,
        _ => 0,
    }
}
