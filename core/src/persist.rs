//! Reading and writing persisted indexes.
//!
//! The primary encoding is the `searchindex.js` object literal (see [`crate::jsdump`]):
//!
//! ```text
//! Search.setIndex({docnames:[..],envversion:..,filenames:[..],objects:{..},objnames:{..},
//!                  objtypes:{..},terms:{..},titles:[..],titleterms:{..}})
//! ```
//!
//! `terms` and `titleterms` map a term to a document id, or to a list of ids when it occurs in
//! more than one document. With weights enabled, `termweights` and `titletermweights` hold the
//! matching posting weights in the same order. A bincode snapshot is available as a compact
//! alternative.

use crate::error::IndexFileError;
use crate::index::{InvertedIndex, Posting};
use crate::jsdump::{self, Value};
use crate::objects::{ObjType, ObjectEntry, ObjectIndex};
use crate::query::{QueryEngine, ScoringConfig};
use crate::tokenizer::{Tokenizer, TokenizerConfig};
use crate::{DocId, Document, EnvVersion, SearchIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const JS_PREFIX: &str = "Search.setIndex(";
const JS_SUFFIX: &str = ")";
const BINARY_MAGIC: &[u8; 4] = b"DSX1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    Js,
    Bincode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    pub encoding: Encoding,
    /// Wrap the object literal in `Search.setIndex(...)`.
    pub wrapper: bool,
    /// Write a bare id instead of a one element list for single-document terms.
    pub collapse_singletons: bool,
    /// Write `termweights`/`titletermweights`. Without them, weights load as 1.0.
    pub weights: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self { encoding: Encoding::Js, wrapper: true, collapse_singletons: true, weights: true }
    }
}

impl FormatOptions {
    /// Byte compatible with existing `searchindex.js` consumers.
    pub fn legacy() -> Self {
        Self { weights: false, ..Self::default() }
    }

    pub fn bincode() -> Self {
        Self { encoding: Encoding::Bincode, ..Self::default() }
    }
}

/// A postings value as written to disk. Only exists at the file boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn new(mut items: Vec<T>, collapse: bool) -> Self {
        if collapse && items.len() == 1 {
            if let Some(item) = items.pop() {
                return OneOrMany::One(item);
            }
        }
        OneOrMany::Many(items)
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }

    fn to_value(&self, f: impl Fn(&T) -> Value) -> Value {
        match self {
            OneOrMany::One(item) => f(item),
            OneOrMany::Many(items) => Value::Array(items.iter().map(f).collect()),
        }
    }

    fn from_value(value: &Value, f: impl Fn(&Value) -> Option<T>) -> Option<Self> {
        match value {
            Value::Array(items) => items.iter().map(f).collect::<Option<Vec<T>>>().map(OneOrMany::Many),
            other => f(other).map(OneOrMany::One),
        }
    }
}

pub fn serialize(index: &SearchIndex, opts: &FormatOptions) -> Result<Vec<u8>, IndexFileError> {
    match opts.encoding {
        Encoding::Js => {
            let body = jsdump::dumps(&to_value(index, opts));
            let text = if opts.wrapper { format!("{JS_PREFIX}{body}{JS_SUFFIX}") } else { body };
            Ok(text.into_bytes())
        }
        Encoding::Bincode => {
            let mut out = BINARY_MAGIC.to_vec();
            bincode::serialize_into(&mut out, index)?;
            Ok(out)
        }
    }
}

pub fn deserialize(bytes: &[u8]) -> Result<SearchIndex, IndexFileError> {
    let index = if let Some(rest) = bytes.strip_prefix(BINARY_MAGIC.as_slice()) {
        let mut index: SearchIndex = bincode::deserialize(rest)?;
        index
            .docs
            .reindex()
            .map_err(|e| IndexFileError::malformed(e.to_string()))?;
        index
    } else {
        let text = std::str::from_utf8(bytes).map_err(|e| IndexFileError::malformed(format!("not utf-8: {e}")))?;
        from_value(&jsdump::loads(strip_wrapper(text))?)?
    };
    validate(&index)?;
    Ok(index)
}

fn strip_wrapper(text: &str) -> &str {
    let trimmed = text.trim();
    let trimmed = trimmed.strip_suffix(';').unwrap_or(trimmed);
    trimmed
        .strip_prefix(JS_PREFIX)
        .and_then(|t| t.strip_suffix(JS_SUFFIX))
        .unwrap_or(trimmed)
}

fn postings_value(index: &InvertedIndex, opts: &FormatOptions) -> (Value, Value) {
    let mut terms = Vec::with_capacity(index.num_terms());
    let mut weights = Vec::new();
    for (term, postings) in index.iter() {
        let mut postings = postings.to_vec();
        if !opts.weights {
            postings.sort_by_key(|p| p.doc_id);
        }
        let ids = OneOrMany::new(postings.iter().map(|p| p.doc_id).collect(), opts.collapse_singletons);
        terms.push((term.to_string(), ids.to_value(|id| Value::int(*id))));
        if opts.weights {
            let ws = OneOrMany::new(postings.iter().map(|p| p.weight).collect(), opts.collapse_singletons);
            weights.push((term.to_string(), ws.to_value(|w| Value::float(*w))));
        }
    }
    (Value::Object(terms), Value::Object(weights))
}

fn doc_strings(index: &SearchIndex, field: impl Fn(&Document) -> &str) -> Value {
    Value::Array(index.docs.iter().map(|d| Value::string(field(d))).collect())
}

fn to_value(index: &SearchIndex, opts: &FormatOptions) -> Value {
    let envversion = match &index.envversion {
        EnvVersion::Single(v) => Value::int(*v),
        EnvVersion::PerSubsystem(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), Value::int(*v))).collect()),
    };
    let objects = Value::Object(
        index
            .objects
            .prefixes()
            .map(|(prefix, names)| {
                let entries = names
                    .iter()
                    .map(|(name, e)| {
                        let row = vec![
                            Value::int(e.doc_id),
                            Value::int(e.objtype),
                            Value::int(e.priority),
                            Value::string(e.anchor.as_str()),
                        ];
                        (name.clone(), Value::Array(row))
                    })
                    .collect();
                (prefix.to_string(), Value::Object(entries))
            })
            .collect(),
    );
    let types = index.objects.objtypes();
    let objnames = Value::Object(
        types
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let row = vec![Value::string(t.domain.as_str()), Value::string(t.role.as_str()), Value::string(t.display.as_str())];
                (i.to_string(), Value::Array(row))
            })
            .collect(),
    );
    let objtypes = Value::Object(types.iter().enumerate().map(|(i, t)| (i.to_string(), Value::string(t.qualified()))).collect());

    let (terms, termweights) = postings_value(&index.terms, opts);
    let (titleterms, titletermweights) = postings_value(&index.titleterms, opts);

    let mut members = vec![
        ("docnames".to_string(), doc_strings(index, |d| d.name.as_str())),
        ("envversion".to_string(), envversion),
        ("filenames".to_string(), doc_strings(index, |d| d.filename.as_str())),
        ("objects".to_string(), objects),
        ("objnames".to_string(), objnames),
        ("objtypes".to_string(), objtypes),
        ("terms".to_string(), terms),
        ("titles".to_string(), doc_strings(index, |d| d.title.as_str())),
        ("titleterms".to_string(), titleterms),
    ];
    if opts.weights {
        members.push(("termweights".to_string(), termweights));
        members.push(("titletermweights".to_string(), titletermweights));
    }
    Value::Object(members)
}

fn string_list(root: &Value, key: &str) -> Result<Vec<String>, IndexFileError> {
    let items = root
        .get(key)
        .ok_or_else(|| IndexFileError::malformed(format!("missing '{key}'")))?
        .as_array()
        .ok_or_else(|| IndexFileError::malformed(format!("'{key}' is not a list")))?;
    items
        .iter()
        .map(|v| v.as_str().map(str::to_string).ok_or_else(|| IndexFileError::malformed(format!("'{key}' holds a non-string"))))
        .collect()
}

fn object_members<'v>(root: &'v Value, key: &str, required: bool) -> Result<&'v [(String, Value)], IndexFileError> {
    match root.get(key) {
        Some(v) => v.as_object().ok_or_else(|| IndexFileError::malformed(format!("'{key}' is not a mapping"))),
        None if required => Err(IndexFileError::malformed(format!("missing '{key}'"))),
        None => Ok(&[]),
    }
}

fn as_doc_id(v: &Value) -> Option<DocId> {
    v.as_u64().and_then(|n| DocId::try_from(n).ok())
}

fn read_postings(root: &Value, key: &str, weights_key: &str) -> Result<InvertedIndex, IndexFileError> {
    let weights: BTreeMap<&str, &Value> = object_members(root, weights_key, false)?
        .iter()
        .map(|(k, v)| (k.as_str(), v))
        .collect();
    let mut index = InvertedIndex::new();
    let mut seen_terms = HashSet::new();
    for (term, value) in object_members(root, key, true)? {
        if !seen_terms.insert(term.as_str()) {
            return Err(IndexFileError::malformed(format!("term '{term}' listed twice in '{key}'")));
        }
        let ids = OneOrMany::from_value(value, as_doc_id)
            .ok_or_else(|| IndexFileError::malformed(format!("'{key}.{term}' is not a document id or list of ids")))?
            .into_vec();
        if ids.is_empty() {
            return Err(IndexFileError::malformed(format!("'{key}.{term}' has no postings")));
        }
        let ws = match weights.get(term.as_str()) {
            Some(w) => OneOrMany::from_value(w, Value::as_f32)
                .ok_or_else(|| IndexFileError::malformed(format!("'{weights_key}.{term}' is not numeric")))?
                .into_vec(),
            None if weights.is_empty() => vec![1.0; ids.len()],
            None => return Err(IndexFileError::malformed(format!("'{weights_key}' lacks term '{term}'"))),
        };
        if ws.len() != ids.len() {
            return Err(IndexFileError::malformed(format!("'{weights_key}.{term}' does not match its postings")));
        }
        let postings = ids.into_iter().zip(ws).map(|(doc_id, weight)| Posting { doc_id, weight }).collect();
        index.insert(term.clone(), postings);
    }
    if let Some(extra) = weights.keys().find(|t| !seen_terms.contains(*t)) {
        return Err(IndexFileError::malformed(format!("'{weights_key}' has weights for unknown term '{extra}'")));
    }
    Ok(index)
}

fn read_objects(root: &Value) -> Result<ObjectIndex, IndexFileError> {
    let mut objects = ObjectIndex::new();

    let names = object_members(root, "objnames", false)?;
    let mut types: Vec<Option<ObjType>> = vec![None; names.len()];
    for (key, value) in names {
        let slot = key
            .parse::<usize>()
            .ok()
            .and_then(|i| types.get_mut(i))
            .ok_or_else(|| IndexFileError::malformed(format!("objnames key '{key}' out of range")))?;
        let row: Option<Vec<&str>> = value.as_array().and_then(|a| a.iter().map(Value::as_str).collect());
        match row.as_deref() {
            Some([domain, role, display]) => {
                *slot = Some(ObjType { domain: domain.to_string(), role: role.to_string(), display: display.to_string() });
            }
            _ => return Err(IndexFileError::malformed(format!("objnames.{key} is not [domain, role, display]"))),
        }
    }
    let types: Vec<ObjType> = types
        .into_iter()
        .collect::<Option<_>>()
        .ok_or_else(|| IndexFileError::malformed("objnames keys are not dense"))?;

    let qualified = object_members(root, "objtypes", false)?;
    if qualified.len() != types.len() {
        return Err(IndexFileError::malformed("objtypes and objnames differ in length"));
    }
    for (key, value) in qualified {
        let matches = key
            .parse::<usize>()
            .ok()
            .and_then(|i| types.get(i))
            .is_some_and(|t| value.as_str() == Some(t.qualified().as_str()));
        if !matches {
            return Err(IndexFileError::malformed(format!("objtypes.{key} disagrees with objnames")));
        }
    }
    objects.set_types(types);

    for (prefix, names) in object_members(root, "objects", false)? {
        let names = names
            .as_object()
            .ok_or_else(|| IndexFileError::malformed(format!("objects.{prefix} is not a mapping")))?;
        for (name, row) in names {
            let bad = || IndexFileError::malformed(format!("objects.{prefix}.{name} is not [doc, type, priority, anchor]"));
            let row = row.as_array().ok_or_else(bad)?;
            let entry = match row {
                [doc, objtype, priority, anchor] => ObjectEntry {
                    doc_id: as_doc_id(doc).ok_or_else(bad)?,
                    objtype: objtype.as_u64().and_then(|n| u32::try_from(n).ok()).ok_or_else(bad)?,
                    priority: priority.as_i64().and_then(|n| i32::try_from(n).ok()).ok_or_else(bad)?,
                    anchor: anchor.as_str().ok_or_else(bad)?.to_string(),
                },
                _ => return Err(bad()),
            };
            objects.insert_raw(prefix.clone(), name.clone(), entry);
        }
    }
    Ok(objects)
}

fn from_value(root: &Value) -> Result<SearchIndex, IndexFileError> {
    if root.as_object().is_none() {
        return Err(IndexFileError::malformed("top level is not a mapping"));
    }
    let docnames = string_list(root, "docnames")?;
    let filenames = string_list(root, "filenames")?;
    let titles = string_list(root, "titles")?;
    if docnames.len() != filenames.len() || docnames.len() != titles.len() {
        return Err(IndexFileError::malformed(format!(
            "docnames ({}), filenames ({}) and titles ({}) are not aligned",
            docnames.len(),
            filenames.len(),
            titles.len()
        )));
    }

    let mut index = SearchIndex::default();
    for ((name, filename), title) in docnames.iter().zip(&filenames).zip(&titles) {
        index
            .docs
            .register(name, filename, title)
            .map_err(|e| IndexFileError::malformed(e.to_string()))?;
    }

    index.envversion = match root.get("envversion") {
        None => EnvVersion::default(),
        Some(Value::Object(members)) => {
            let mut map = BTreeMap::new();
            for (k, v) in members {
                let version = v
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| IndexFileError::malformed(format!("envversion.{k} is not a version number")))?;
                map.insert(k.clone(), version);
            }
            EnvVersion::PerSubsystem(map)
        }
        Some(v) => EnvVersion::Single(
            v.as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| IndexFileError::malformed("envversion is not a version number"))?,
        ),
    };

    index.terms = read_postings(root, "terms", "termweights")?;
    index.titleterms = read_postings(root, "titleterms", "titletermweights")?;
    index.objects = read_objects(root)?;
    Ok(index)
}

/// Check the cross references of a loaded index.
pub fn validate(index: &SearchIndex) -> Result<(), IndexFileError> {
    for (field, inverted) in [("terms", &index.terms), ("titleterms", &index.titleterms)] {
        for (term, postings) in inverted.iter() {
            if postings.is_empty() {
                return Err(IndexFileError::malformed(format!("{field}.{term} has no postings")));
            }
            let mut seen = HashSet::with_capacity(postings.len());
            for p in postings {
                if !index.docs.contains(p.doc_id) {
                    return Err(IndexFileError::malformed(format!("{field}.{term} refers to unknown document {}", p.doc_id)));
                }
                if !seen.insert(p.doc_id) {
                    return Err(IndexFileError::malformed(format!("{field}.{term} lists document {} twice", p.doc_id)));
                }
                if !p.weight.is_finite() || p.weight < 0.0 {
                    return Err(IndexFileError::malformed(format!("{field}.{term} has invalid weight {}", p.weight)));
                }
            }
        }
    }
    for (name, entry) in index.objects.iter() {
        if !index.docs.contains(entry.doc_id) {
            return Err(IndexFileError::malformed(format!("object '{name}' refers to unknown document {}", entry.doc_id)));
        }
        if index.objects.objtype(entry.objtype).is_none() {
            return Err(IndexFileError::malformed(format!("object '{name}' has unknown type {}", entry.objtype)));
        }
    }
    Ok(())
}

/// Write the index next to `path` and rename it into place, so readers never see a partial file.
pub fn save(path: &Path, index: &SearchIndex, opts: &FormatOptions) -> Result<(), IndexFileError> {
    let bytes = serialize(index, opts)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    write_atomic(path, &bytes)?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), encoding = ?opts.encoding, "index written");
    Ok(())
}

pub fn load(path: &Path) -> Result<SearchIndex, IndexFileError> {
    let mut f = File::open(path)?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    let index = deserialize(&buf)?;
    tracing::info!(path = %path.display(), num_docs = index.num_docs(), "index loaded");
    Ok(index)
}

/// Write `bytes` to `<path>.tmp` and rename it over `path`. The temporary file is removed on failure.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = tmp_path(path);
    let written = File::create(&tmp)
        .and_then(|mut f| {
            f.write_all(bytes)?;
            f.sync_all()
        })
        .and_then(|()| fs::rename(&tmp, path));
    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    written
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Build statistics written next to the index as `<index>.meta.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub num_terms: u32,
    pub num_title_terms: u32,
    pub created_at: String,
    pub version: u32,
    /// Tokenizer settings the index was built with; queries must use the same.
    pub tokenizer: TokenizerConfig,
}

pub fn meta_path(index_path: &Path) -> PathBuf {
    let mut name = index_path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".meta.json");
    index_path.with_file_name(name)
}

pub fn save_meta(index_path: &Path, meta: &MetaFile) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(meta)?;
    write_atomic(&meta_path(index_path), json.as_bytes())?;
    Ok(())
}

pub fn load_meta(index_path: &Path) -> anyhow::Result<MetaFile> {
    let mut f = File::open(meta_path(index_path))?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

/// Load an index and pair it with the tokenizer recorded in its sidecar, or the default one.
pub fn open_engine(index_path: &Path, scoring: ScoringConfig) -> anyhow::Result<QueryEngine> {
    let index = load(index_path)?;
    let tokenizer = match load_meta(index_path) {
        Ok(meta) => meta.tokenizer,
        Err(e) if e.downcast_ref::<io::Error>().is_some_and(|e| e.kind() == io::ErrorKind::NotFound) => {
            tracing::debug!(path = %index_path.display(), "no build metadata, using default tokenizer");
            TokenizerConfig::default()
        }
        Err(e) => return Err(e.context(format!("reading {}", meta_path(index_path).display()))),
    };
    Ok(QueryEngine::new(Arc::new(index), Tokenizer::new(tokenizer)).with_scoring(scoring))
}
