use crate::docstore::DocumentStore;
use crate::error::BuildError;
use crate::index::IndexBuilder;
use crate::objects::{ObjectDef, ObjectIndex};
use crate::tokenizer::{Field, Token, Tokenizer};
use crate::{DocId, EnvVersion, SearchIndex};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// One page handed over by the documentation build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub name: String,
    pub filename: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub objects: Vec<ObjectDef>,
}

impl SourceDocument {
    pub fn new(name: &str, filename: &str, title: &str, body: &str) -> Self {
        Self {
            name: name.to_string(),
            filename: filename.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            objects: Vec::new(),
        }
    }
}

struct Tokenized {
    body: Vec<Token>,
    title: Vec<Token>,
}

/// Drives a full build: ids, body and title indexes, objects.
pub struct SearchIndexBuilder {
    tokenizer: Tokenizer,
    docs: DocumentStore,
    body: IndexBuilder,
    title: IndexBuilder,
    objects: ObjectIndex,
    envversion: EnvVersion,
}

impl Default for SearchIndexBuilder {
    fn default() -> Self {
        Self::new(Tokenizer::default())
    }
}

impl SearchIndexBuilder {
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self {
            tokenizer,
            docs: DocumentStore::new(),
            body: IndexBuilder::new(Field::Body),
            title: IndexBuilder::new(Field::Title),
            objects: ObjectIndex::new(),
            envversion: EnvVersion::default(),
        }
    }

    pub fn with_envversion(mut self, envversion: EnvVersion) -> Self {
        self.envversion = envversion;
        self
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    fn tokenize(&self, doc: &SourceDocument) -> Tokenized {
        Tokenized {
            body: self.tokenizer.tokenize(&doc.body, Field::Body),
            title: self.tokenizer.tokenize(&doc.title, Field::Title),
        }
    }

    pub fn add(&mut self, doc: &SourceDocument) -> Result<DocId, BuildError> {
        let tokens = self.tokenize(doc);
        self.merge(doc, tokens)
    }

    /// Tokenize a batch in parallel, then merge in input order so ids stay deterministic.
    pub fn add_all(&mut self, docs: &[SourceDocument]) -> Result<(), BuildError> {
        let tokenized: Vec<Tokenized> = docs.par_iter().map(|d| self.tokenize(d)).collect();
        for (doc, tokens) in docs.iter().zip(tokenized) {
            self.merge(doc, tokens)?;
        }
        Ok(())
    }

    fn merge(&mut self, doc: &SourceDocument, tokens: Tokenized) -> Result<DocId, BuildError> {
        let doc_id = self.docs.register(&doc.name, &doc.filename, &doc.title)?;
        self.body.add_document(doc_id, &tokens.body);
        self.title.add_document(doc_id, &tokens.title);
        for obj in &doc.objects {
            self.objects.add(doc_id, obj);
        }
        tracing::trace!(doc_id, name = %doc.name, body_terms = tokens.body.len(), "added document");
        Ok(doc_id)
    }

    /// Attach an object to an already registered document.
    pub fn add_object(&mut self, doc_name: &str, def: &ObjectDef) -> Result<(), BuildError> {
        let doc_id = self.docs.lookup(doc_name).ok_or_else(|| BuildError::UnknownDocument {
            name: doc_name.to_string(),
            object: def.name.clone(),
        })?;
        self.objects.add(doc_id, def);
        Ok(())
    }

    pub fn build(self) -> SearchIndex {
        let index = SearchIndex {
            terms: self.body.build(),
            titleterms: self.title.build(),
            docs: self.docs,
            objects: self.objects,
            envversion: self.envversion,
        };
        tracing::info!(
            num_docs = index.num_docs(),
            num_terms = index.terms.num_terms(),
            num_title_terms = index.titleterms.num_terms(),
            num_objects = index.objects.len(),
            "search index built"
        );
        index
    }
}

/// Build an index over `docs` with the given tokenizer.
pub fn build_index(docs: &[SourceDocument], tokenizer: Tokenizer) -> Result<SearchIndex, BuildError> {
    let mut builder = SearchIndexBuilder::new(tokenizer);
    builder.add_all(docs)?;
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parallel_and_sequential_builds_agree() {
        let docs: Vec<SourceDocument> = (0..50)
            .map(|i| SourceDocument::new(&format!("page{i}"), &format!("page{i}.rst"), &format!("Page {i}"), &format!("body text number {i} about search")))
            .collect();
        let parallel = build_index(&docs, Tokenizer::default()).unwrap();
        let mut seq = SearchIndexBuilder::default();
        for d in &docs {
            seq.add(d).unwrap();
        }
        assert_eq!(parallel, seq.build());
        let ids: Vec<DocId> = parallel.docs.iter().map(|d| d.id).collect();
        assert_eq!(ids, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn duplicate_document_aborts_build() {
        let docs = vec![
            SourceDocument::new("index", "index.rst", "Home", "a"),
            SourceDocument::new("index", "index.md", "Home again", "b"),
        ];
        let err = build_index(&docs, Tokenizer::default()).unwrap_err();
        assert_eq!(err, BuildError::DuplicateDocument { name: "index".into() });
    }

    #[test]
    fn objects_need_a_registered_document() {
        let mut b = SearchIndexBuilder::default();
        let def = ObjectDef {
            name: "api.Client".into(),
            domain: "py".into(),
            role: "class".into(),
            display: Some("Python class".into()),
            priority: 1,
            anchor: String::new(),
        };
        assert!(matches!(b.add_object("api", &def), Err(BuildError::UnknownDocument { .. })));
        b.add(&SourceDocument::new("api", "api.rst", "API", "")).unwrap();
        b.add_object("api", &def).unwrap();
        assert_eq!(b.build().objects.len(), 1);
    }
}
