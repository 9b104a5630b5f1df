use docsearch::persist::{self, FormatOptions, MetaFile};
use docsearch::{
    build_index, EnvVersion, IndexFileError, ObjectDef, ScoringConfig, SearchIndex, SourceDocument, Tokenizer, TokenizerConfig,
};
use std::path::Path;
use tempfile::tempdir;

const LEGACY: &str = r#"Search.setIndex({docnames:["api","index"],envversion:{"sphinx.domains.python":2,sphinx:56},filenames:["api.rst","index.rst"],objects:{"api.client":{Client:[0,0,1,""]}},objnames:{"0":["py","class","Python class"]},objtypes:{"0":"py:class"},terms:{"class":0,api:[0,1],client:0,the:1},titles:["API Reference","Documentation"],titleterms:{api:0,document:1,refer:0}})"#;

fn sample() -> SearchIndex {
    let mut api = SourceDocument::new("api", "api.rst", "API Reference", "The client class wraps every API call. Call it twice: call, call.");
    api.objects.push(ObjectDef {
        name: "api.client.Client".into(),
        domain: "py".into(),
        role: "class".into(),
        display: Some("Python class".into()),
        priority: 1,
        anchor: String::new(),
    });
    api.objects.push(ObjectDef {
        name: "api.client.lib.search".into(),
        domain: "py".into(),
        role: "function".into(),
        display: Some("Python function".into()),
        priority: 1,
        anchor: "search-fn".into(),
    });
    let docs = vec![
        api,
        SourceDocument::new("index", "index.rst", "Documentation", "Welcome to the café documentation for the API."),
        SourceDocument::new("faq", "faq.md", "FAQ: \"quotes\" & unicode ✓", "Frequently asked questions about tokens."),
    ];
    build_index(&docs, Tokenizer::default()).unwrap()
}

#[test]
fn round_trip_default_format() {
    let index = sample();
    let bytes = persist::serialize(&index, &FormatOptions::default()).unwrap();
    assert_eq!(persist::deserialize(&bytes).unwrap(), index);
}

#[test]
fn round_trip_without_collapsing_or_wrapper() {
    let index = sample();
    let opts = FormatOptions { collapse_singletons: false, wrapper: false, ..FormatOptions::default() };
    let bytes = persist::serialize(&index, &opts).unwrap();
    let text = String::from_utf8(bytes.clone()).unwrap();
    assert!(text.starts_with("{docnames:"));
    assert!(text.contains("welcom:[1]"));
    assert_eq!(persist::deserialize(&bytes).unwrap(), index);
}

#[test]
fn round_trip_bincode() {
    let index = sample();
    let bytes = persist::serialize(&index, &FormatOptions::bincode()).unwrap();
    let back = persist::deserialize(&bytes).unwrap();
    assert_eq!(back, index);
    assert_eq!(back.docs.lookup("faq"), Some(2));
}

#[test]
fn serializing_is_deterministic() {
    let a = persist::serialize(&sample(), &FormatOptions::default()).unwrap();
    let b = persist::serialize(&sample(), &FormatOptions::default()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn legacy_files_reserialize_byte_for_byte() {
    let index = persist::deserialize(LEGACY.as_bytes()).unwrap();
    assert_eq!(index.num_docs(), 2);
    assert_eq!(index.docs.resolve(1).unwrap().title, "Documentation");
    assert_eq!(index.terms.postings("api").len(), 2);
    assert!(index.terms.postings("api").iter().all(|p| p.weight == 1.0));
    assert_eq!(index.objects.len(), 1);
    let out = persist::serialize(&index, &FormatOptions::legacy()).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), LEGACY);
}

#[test]
fn bare_envversion_survives() {
    let text = LEGACY.replace(r#"envversion:{"sphinx.domains.python":2,sphinx:56}"#, "envversion:50");
    let index = persist::deserialize(text.as_bytes()).unwrap();
    assert_eq!(index.envversion, EnvVersion::Single(50));
    let out = persist::serialize(&index, &FormatOptions::legacy()).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), text);
}

#[test]
fn alignment_is_enforced() {
    let text = LEGACY.replace(r#"titles:["API Reference","Documentation"]"#, r#"titles:["API Reference"]"#);
    match persist::deserialize(text.as_bytes()) {
        Err(IndexFileError::Malformed(msg)) => assert!(msg.contains("not aligned")),
        other => panic!("expected malformed error, got {other:?}"),
    }
}

#[test]
fn unknown_documents_are_rejected() {
    let text = LEGACY.replace("client:0", "client:7");
    assert!(matches!(persist::deserialize(text.as_bytes()), Err(IndexFileError::Malformed(_))));
    let text = LEGACY.replace("Client:[0,0,1,\"\"]", "Client:[9,0,1,\"\"]");
    assert!(matches!(persist::deserialize(text.as_bytes()), Err(IndexFileError::Malformed(_))));
}

#[test]
fn weights_must_match_postings() {
    let text = LEGACY.replace("titleterms:{", "termweights:{api:2},titleterms:{");
    assert!(matches!(persist::deserialize(text.as_bytes()), Err(IndexFileError::Malformed(_))));
}

#[test]
fn wrong_types_are_rejected() {
    let text = LEGACY.replace(r#"docnames:["api","index"]"#, r#"docnames:["api",3]"#);
    assert!(matches!(persist::deserialize(text.as_bytes()), Err(IndexFileError::Malformed(_))));
    let text = LEGACY.replace("the:1", r#"the:"one""#);
    assert!(matches!(persist::deserialize(text.as_bytes()), Err(IndexFileError::Malformed(_))));
}

#[test]
fn truncated_file_is_a_syntax_error() {
    let text = &LEGACY[..LEGACY.len() / 2];
    assert!(matches!(persist::deserialize(text.as_bytes()), Err(IndexFileError::Syntax { .. })));
}

#[test]
fn save_replaces_target_atomically() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("out").join("searchindex.js");
    let index = sample();
    persist::save(&path, &index, &FormatOptions::default()).unwrap();
    persist::save(&path, &index, &FormatOptions::default()).unwrap();
    assert_eq!(persist::load(&path).unwrap(), index);
    let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn deep_nesting_is_a_syntax_error() {
    let text = format!("{{docnames:{}", "[".repeat(200_000));
    assert!(matches!(persist::deserialize(text.as_bytes()), Err(IndexFileError::Syntax { .. })));
}

#[test]
fn objnames_rows_must_be_strings() {
    let text = LEGACY.replace(r#"["py","class","Python class"]"#, r#"["py",3,"class","Python class"]"#);
    assert!(matches!(persist::deserialize(text.as_bytes()), Err(IndexFileError::Malformed(_))));
}

#[test]
fn failed_save_cleans_up_temporary_file() {
    let dir = tempdir().unwrap();
    // A non-empty directory in the way makes the final rename fail.
    let path = dir.path().join("searchindex.js");
    std::fs::create_dir(&path).unwrap();
    std::fs::write(path.join("keep"), "x").unwrap();
    assert!(persist::save(&path, &sample(), &FormatOptions::default()).is_err());
    assert!(!dir.path().join("searchindex.js.tmp").exists());
    assert!(path.join("keep").exists());
}

fn save_unstemmed(path: &Path) {
    let config = TokenizerConfig { stem: false, ..TokenizerConfig::default() };
    let docs = vec![
        SourceDocument::new("jobs", "jobs.rst", "Jobs", "Keep the worker running."),
        SourceDocument::new("setup", "setup.rst", "Setup", "Run the installer once."),
    ];
    let index = build_index(&docs, Tokenizer::new(config.clone())).unwrap();
    persist::save(path, &index, &FormatOptions::default()).unwrap();
    let meta = MetaFile {
        num_docs: index.num_docs() as u32,
        num_terms: index.terms.num_terms() as u32,
        num_title_terms: index.titleterms.num_terms() as u32,
        created_at: "2024-01-01T00:00:00Z".into(),
        version: docsearch::FORMAT_VERSION,
        tokenizer: config,
    };
    persist::save_meta(path, &meta).unwrap();
}

#[test]
fn queries_use_the_recorded_tokenizer() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("searchindex.js");
    save_unstemmed(&path);

    let engine = persist::open_engine(&path, ScoringConfig::default()).unwrap();
    assert!(!engine.tokenizer().config().stem);
    let hits = engine.search("running").unwrap();
    assert_eq!(hits.iter().map(|h| h.doc_id).collect::<Vec<_>>(), vec![0]);
    assert!(!dir.path().join("searchindex.js.meta.json.tmp").exists());
}

#[test]
fn missing_sidecar_falls_back_to_default_tokenizer() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("searchindex.js");
    save_unstemmed(&path);
    std::fs::remove_file(persist::meta_path(&path)).unwrap();

    let engine = persist::open_engine(&path, ScoringConfig::default()).unwrap();
    assert!(engine.tokenizer().config().stem);
    // The default tokenizer stems the query to "run", which only the setup page contains verbatim.
    let hits = engine.search("running").unwrap();
    assert_eq!(hits.iter().map(|h| h.doc_id).collect::<Vec<_>>(), vec![1]);
}

#[test]
fn corrupt_sidecar_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("searchindex.js");
    save_unstemmed(&path);
    std::fs::write(persist::meta_path(&path), r#"{"num_docs":1, "tokeni"#).unwrap();
    assert!(persist::open_engine(&path, ScoringConfig::default()).is_err());
}
