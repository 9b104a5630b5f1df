use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)\p{L}[\p{L}\p{N}_']*|\p{N}[\p{L}\p{N}_]*").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
    static ref DEFAULT: Tokenizer = Tokenizer::new(TokenizerConfig::default());
}

/// Which part of a document a piece of text comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Body,
    /// Titles keep their stop words.
    Title,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopWords {
    English,
    None,
    Custom(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    pub stem: bool,
    pub stopwords: StopWords,
    /// Words shorter than this many characters are dropped.
    pub min_len: usize,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self { stem: true, stopwords: StopWords::English, min_len: 1 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub term: String,
    /// Ordinal of the word in its text, counted before filtering.
    pub position: usize,
}

#[derive(Debug, Clone)]
pub struct Tokenizer {
    config: TokenizerConfig,
    custom: HashSet<String>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(TokenizerConfig::default())
    }
}

impl Tokenizer {
    pub fn new(config: TokenizerConfig) -> Self {
        let custom = match &config.stopwords {
            StopWords::Custom(words) => words.iter().map(|w| w.to_lowercase()).collect(),
            _ => HashSet::new(),
        };
        Self { config, custom }
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    pub fn is_stopword(&self, word: &str) -> bool {
        match &self.config.stopwords {
            StopWords::English => STOPWORDS.contains(word),
            StopWords::None => false,
            StopWords::Custom(_) => self.custom.contains(word),
        }
    }

    /// Tokenize text into terms using NFKC normalization, lowercase, stopword removal and stemming.
    pub fn tokenize(&self, text: &str, field: Field) -> Vec<Token> {
        let normalized = text.nfkc().collect::<String>().to_lowercase();
        let mut tokens = Vec::new();
        for (position, mat) in RE.find_iter(&normalized).enumerate() {
            let word = mat.as_str();
            if word.chars().count() < self.config.min_len {
                continue;
            }
            if field == Field::Body && self.is_stopword(word) {
                continue;
            }
            tokens.push(Token { term: self.normalize_word(word), position });
        }
        tokens
    }

    /// Stem a single, already lowercased word.
    pub fn normalize_word(&self, word: &str) -> String {
        if self.config.stem {
            STEMMER.stem(word).into_owned()
        } else {
            word.to_string()
        }
    }
}

/// Tokenize body text with the default configuration.
pub fn tokenize(text: &str) -> Vec<Token> {
    DEFAULT.tokenize(text, Field::Body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let t = tokenize("Running, runner's run!");
        assert!(t.iter().any(|tok| tok.term == "run"));
    }

    #[test]
    fn positions_count_dropped_words() {
        let t = tokenize("the world");
        assert_eq!(t, vec![Token { term: "world".into(), position: 1 }]);
    }

    #[test]
    fn titles_keep_stopwords() {
        let tk = Tokenizer::default();
        let terms: Vec<String> = tk.tokenize("The World", Field::Title).into_iter().map(|t| t.term).collect();
        assert_eq!(terms, vec!["the", "world"]);
    }

    #[test]
    fn leading_digits_form_a_word() {
        let tk = Tokenizer::new(TokenizerConfig { stem: false, ..Default::default() });
        let terms: Vec<String> = tk.tokenize("2019-01-01T00:00:00.000Z", Field::Body).into_iter().map(|t| t.term).collect();
        assert_eq!(terms, vec!["2019", "01", "01t00", "00", "00", "000z"]);
    }
}
