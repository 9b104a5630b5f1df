use docsearch::tokenizer::{tokenize, Field, StopWords, Tokenizer, TokenizerConfig};

fn terms(tokens: Vec<docsearch::Token>) -> Vec<String> {
    tokens.into_iter().map(|t| t.term).collect()
}

#[test]
fn it_normalizes_and_stems() {
    let words = terms(tokenize("Running Runners RUN! The café's menu."));
    // Stemming to "run" should appear
    assert!(words.contains(&"run".to_string()));
    // Unicode normalization keeps the accented letter as one word
    assert!(words.iter().any(|w| w.starts_with("caf")));
}

#[test]
fn it_filters_stopwords() {
    let words = terms(tokenize("The quick brown fox and the lazy dog"));
    assert!(!words.contains(&"the".to_string()));
    assert!(!words.contains(&"and".to_string()));
}

#[test]
fn nfkc_folds_compatibility_forms() {
    // fullwidth letters and the "fi" ligature normalize to plain ASCII
    let tk = Tokenizer::new(TokenizerConfig { stem: false, ..Default::default() });
    assert_eq!(terms(tk.tokenize("ＴＯＫＥＮ ﬁle", Field::Body)), vec!["token", "file"]);
}

#[test]
fn tokenizing_is_deterministic() {
    let text = "Install the package using pip. Use an access token to authenticate.";
    assert_eq!(tokenize(text), tokenize(text));
}

#[test]
fn empty_text_yields_nothing() {
    assert!(tokenize("").is_empty());
    assert!(tokenize("  ... !! ").is_empty());
}

#[test]
fn custom_stopwords_and_min_len() {
    let tk = Tokenizer::new(TokenizerConfig {
        stem: false,
        stopwords: StopWords::Custom(vec!["Pip".into()]),
        min_len: 3,
    });
    assert_eq!(terms(tk.tokenize("install it with pip", Field::Body)), vec!["install", "with"]);
}

#[test]
fn stemming_can_be_disabled() {
    let tk = Tokenizer::new(TokenizerConfig { stem: false, stopwords: StopWords::None, min_len: 1 });
    assert_eq!(terms(tk.tokenize("Running the tests", Field::Body)), vec!["running", "the", "tests"]);
}
