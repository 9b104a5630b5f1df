//! Full-text search index builder and query engine for generated documentation.
//!
//! Documents flow through the [`tokenizer`] into a [`docstore::DocumentStore`] and two
//! [`index::InvertedIndex`]es (body and title). The resulting [`SearchIndex`] is written in the
//! `searchindex.js` dialect by [`persist`] and queried with [`query::QueryEngine`].

pub mod builder;
pub mod docstore;
pub mod error;
pub mod index;
pub mod jsdump;
pub mod objects;
pub mod persist;
pub mod query;
pub mod tokenizer;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use builder::{build_index, SearchIndexBuilder, SourceDocument};
pub use docstore::{Document, DocumentStore};
pub use error::{BuildError, IndexFileError, QueryError};
pub use index::{IndexBuilder, InvertedIndex, Posting};
pub use objects::{ObjectDef, ObjectIndex};
pub use query::{parse_query, Hit, ObjectHit, ParsedQuery, QueryEngine, ScoringConfig};
pub use tokenizer::{Field, StopWords, Token, Tokenizer, TokenizerConfig};

pub type DocId = u32;

/// Version recorded under `envversion` when the caller does not supply one.
pub const FORMAT_VERSION: u32 = 1;

/// Build tool versions recorded alongside the index. Never consulted at query time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvVersion {
    Single(u32),
    PerSubsystem(BTreeMap<String, u32>),
}

impl Default for EnvVersion {
    fn default() -> Self {
        let mut map = BTreeMap::new();
        map.insert("docsearch".to_string(), FORMAT_VERSION);
        EnvVersion::PerSubsystem(map)
    }
}

/// The immutable, fully built index: documents, body terms, title terms and objects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchIndex {
    pub docs: DocumentStore,
    pub terms: InvertedIndex,
    pub titleterms: InvertedIndex,
    pub objects: ObjectIndex,
    pub envversion: EnvVersion,
}

impl SearchIndex {
    pub fn num_docs(&self) -> usize {
        self.docs.len()
    }

    /// Number of distinct documents containing `term` in the body or the title.
    pub fn doc_freq(&self, term: &str) -> usize {
        let body = self.terms.postings(term);
        let title = self.titleterms.postings(term);
        if title.is_empty() {
            return body.len();
        }
        if body.is_empty() {
            return title.len();
        }
        let mut ids: Vec<DocId> = body.iter().chain(title.iter()).map(|p| p.doc_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }
}
