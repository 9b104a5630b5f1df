use crate::error::BuildError;
use crate::DocId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    /// Logical path of the page, e.g. `api/client`.
    pub name: String,
    pub filename: String,
    pub title: String,
}

/// Dense, first-seen-order document ids for one build.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentStore {
    docs: Vec<Document>,
    #[serde(skip)]
    by_name: HashMap<String, DocId>,
}

impl PartialEq for DocumentStore {
    fn eq(&self, other: &Self) -> bool {
        self.docs == other.docs
    }
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, filename: &str, title: &str) -> Result<DocId, BuildError> {
        if self.by_name.contains_key(name) {
            return Err(BuildError::DuplicateDocument { name: name.to_string() });
        }
        let id = self.docs.len() as DocId;
        self.by_name.insert(name.to_string(), id);
        self.docs.push(Document {
            id,
            name: name.to_string(),
            filename: filename.to_string(),
            title: title.to_string(),
        });
        Ok(id)
    }

    pub fn resolve(&self, id: DocId) -> Option<&Document> {
        self.docs.get(id as usize)
    }

    pub fn lookup(&self, name: &str) -> Option<DocId> {
        self.by_name.get(name).copied()
    }

    pub fn contains(&self, id: DocId) -> bool {
        (id as usize) < self.docs.len()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.docs.iter()
    }

    /// Rebuild the name lookup after deserializing, where it is skipped.
    pub(crate) fn reindex(&mut self) -> Result<(), BuildError> {
        self.by_name.clear();
        for doc in &self.docs {
            if self.by_name.insert(doc.name.clone(), doc.id).is_some() {
                return Err(BuildError::DuplicateDocument { name: doc.name.clone() });
            }
        }
        Ok(())
    }
}
