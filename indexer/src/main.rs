use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use docsearch::persist::{self, FormatOptions, MetaFile};
use docsearch::{EnvVersion, QueryEngine, ScoringConfig, SearchIndexBuilder, SourceDocument, StopWords, Tokenizer, TokenizerConfig};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and query documentation search indexes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    /// searchindex.js with posting weights
    Js,
    /// searchindex.js readable by existing consumers, without weights
    Legacy,
    /// compact binary snapshot
    Bincode,
}

impl Format {
    fn options(self) -> FormatOptions {
        match self {
            Format::Js => FormatOptions::default(),
            Format::Legacy => FormatOptions::legacy(),
            Format::Bincode => FormatOptions::bincode(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from input JSON/JSONL files or a directory
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: PathBuf,
        /// Output index file
        #[arg(long, default_value = "searchindex.js")]
        output: PathBuf,
        #[arg(long, value_enum, default_value_t = Format::Js)]
        format: Format,
        /// Always write postings as lists, even for single-document terms
        #[arg(long, default_value_t = false)]
        no_collapse: bool,
        /// Disable English stemming
        #[arg(long, default_value_t = false)]
        no_stem: bool,
        /// Keep stop words in document bodies
        #[arg(long, default_value_t = false)]
        keep_stopwords: bool,
        /// Build tool version to record, as name=version (repeatable)
        #[arg(long = "envversion", value_parser = parse_envversion)]
        envversion: Vec<(String, u32)>,
    },
    /// Run a query against a built index
    Query {
        #[arg(long)]
        index: PathBuf,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        query: String,
    },
    /// Print a summary of a built index
    Inspect {
        #[arg(long)]
        index: PathBuf,
    },
}

fn parse_envversion(s: &str) -> Result<(String, u32), String> {
    let (name, version) = s.split_once('=').ok_or_else(|| format!("expected name=version, got '{s}'"))?;
    let version = version.parse().map_err(|e| format!("bad version in '{s}': {e}"))?;
    Ok((name.to_string(), version))
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, format, no_collapse, no_stem, keep_stopwords, envversion } => {
            let tokenizer = TokenizerConfig {
                stem: !no_stem,
                stopwords: if keep_stopwords { StopWords::None } else { StopWords::English },
                ..TokenizerConfig::default()
            };
            let mut opts = format.options();
            opts.collapse_singletons = !no_collapse;
            let envversion = if envversion.is_empty() {
                EnvVersion::default()
            } else {
                EnvVersion::PerSubsystem(envversion.into_iter().collect::<BTreeMap<_, _>>())
            };
            build_index(&input, &output, tokenizer, opts, envversion)
        }
        Commands::Query { index, limit, query } => run_query(&index, limit, &query),
        Commands::Inspect { index } => inspect(&index),
    }
}

fn collect_inputs(input: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    } else {
        bail!("input {} does not exist", input.display());
    }
    Ok(files)
}

fn read_jsonl(file: &Path, docs: &mut Vec<SourceDocument>) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: SourceDocument = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}", file.display(), lineno + 1))?;
        docs.push(doc);
    }
    Ok(())
}

fn read_json(file: &Path, docs: &mut Vec<SourceDocument>) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    let json: serde_json::Value = serde_json::from_reader(reader).with_context(|| file.display().to_string())?;
    match json {
        serde_json::Value::Array(arr) => {
            for v in arr {
                docs.push(serde_json::from_value(v).with_context(|| file.display().to_string())?);
            }
        }
        serde_json::Value::Object(_) => docs.push(serde_json::from_value(json)?),
        _ => tracing::warn!(file = %file.display(), "skipping input that is neither an object nor an array"),
    }
    Ok(())
}

fn read_documents(input: &Path) -> Result<Vec<SourceDocument>> {
    let mut docs = Vec::new();
    for file in collect_inputs(input)? {
        if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            read_jsonl(&file, &mut docs)?;
        } else {
            read_json(&file, &mut docs)?;
        }
    }
    Ok(docs)
}

fn build_index(input: &Path, output: &Path, tokenizer: TokenizerConfig, opts: FormatOptions, envversion: EnvVersion) -> Result<()> {
    let docs = read_documents(input)?;
    tracing::info!(num_docs = docs.len(), input = %input.display(), "read documents");

    let mut builder = SearchIndexBuilder::new(Tokenizer::new(tokenizer.clone())).with_envversion(envversion);
    // Nothing is written unless every document is accepted.
    builder.add_all(&docs).context("index build aborted")?;
    let index = builder.build();

    persist::save(output, &index, &opts).with_context(|| format!("writing {}", output.display()))?;
    let meta = MetaFile {
        num_docs: index.num_docs() as u32,
        num_terms: index.terms.num_terms() as u32,
        num_title_terms: index.titleterms.num_terms() as u32,
        created_at: time::OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339).unwrap_or_else(|_| "".into()),
        version: docsearch::FORMAT_VERSION,
        tokenizer,
    };
    persist::save_meta(output, &meta)?;

    tracing::info!(output = %output.display(), "index build complete");
    Ok(())
}

fn open_engine(path: &Path, limit: Option<usize>) -> Result<QueryEngine> {
    persist::open_engine(path, ScoringConfig { limit, ..Default::default() }).with_context(|| format!("loading {}", path.display()))
}

fn run_query(path: &Path, limit: usize, query: &str) -> Result<()> {
    let engine = open_engine(path, Some(limit))?;
    for hit in engine.search_objects(query) {
        println!("[{}] {} ({})", hit.score, hit.name, hit.display);
    }
    let hits = engine.search(query)?;
    if hits.is_empty() {
        println!("no matches");
    }
    for hit in hits {
        if let Some(doc) = engine.index().docs.resolve(hit.doc_id) {
            println!("{:>8.3}  {:<40} {} ({} terms)", hit.score, doc.title, doc.filename, hit.matched_terms);
        }
    }
    Ok(())
}

fn inspect(path: &Path) -> Result<()> {
    let engine = open_engine(path, None)?;
    let index = engine.index();
    println!("documents:   {}", index.num_docs());
    println!("terms:       {}", index.terms.num_terms());
    println!("title terms: {}", index.titleterms.num_terms());
    println!("objects:     {}", index.objects.len());
    println!("envversion:  {:?}", index.envversion);
    for doc in index.docs.iter() {
        println!("  {:>4}  {:<30} {}", doc.id, doc.name, doc.title);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn envversion_pairs() {
        assert_eq!(parse_envversion("sphinx=56").unwrap(), ("sphinx".to_string(), 56));
        assert!(parse_envversion("sphinx").is_err());
        assert!(parse_envversion("sphinx=x").is_err());
    }

    #[test]
    fn reads_json_and_jsonl_in_name_order() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("b.jsonl"),
            "{\"name\":\"auth\",\"filename\":\"auth.rst\",\"title\":\"Authentication\",\"body\":\"Use an access token.\"}\n\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("a.json"),
            r#"[{"name":"install","filename":"install.rst","title":"Installation","body":"Install with pip.",
                "objects":[{"name":"api.Client","domain":"py","role":"class"}]}]"#,
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let docs = read_documents(dir.path()).unwrap();
        let names: Vec<&str> = docs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["install", "auth"]);
        assert_eq!(docs[0].objects[0].priority, 1);
    }

    #[test]
    fn failed_build_leaves_previous_index() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("docs.jsonl");
        let output = dir.path().join("searchindex.js");
        fs::write(&input, "{\"name\":\"a\",\"filename\":\"a.rst\",\"title\":\"A\",\"body\":\"alpha\"}\n").unwrap();
        build_index(&input, &output, TokenizerConfig::default(), FormatOptions::default(), EnvVersion::default()).unwrap();
        let before = fs::read(&output).unwrap();
        assert!(persist::load_meta(&output).is_ok());

        fs::write(
            &input,
            "{\"name\":\"a\",\"filename\":\"a.rst\",\"title\":\"A\",\"body\":\"beta\"}\n{\"name\":\"a\",\"filename\":\"b.rst\",\"title\":\"B\",\"body\":\"gamma\"}\n",
        )
        .unwrap();
        assert!(build_index(&input, &output, TokenizerConfig::default(), FormatOptions::default(), EnvVersion::default()).is_err());
        assert_eq!(fs::read(&output).unwrap(), before);
    }

    #[test]
    fn query_tokenizer_matches_build_flags() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("docs.jsonl");
        let output = dir.path().join("searchindex.js");
        fs::write(&input, "{\"name\":\"a\",\"filename\":\"a.rst\",\"title\":\"A\",\"body\":\"the workers are running\"}\n").unwrap();
        let tokenizer = TokenizerConfig { stem: false, stopwords: StopWords::None, ..TokenizerConfig::default() };
        build_index(&input, &output, tokenizer.clone(), FormatOptions::default(), EnvVersion::default()).unwrap();

        let engine = open_engine(&output, None).unwrap();
        assert_eq!(engine.tokenizer().config(), &tokenizer);
        assert_eq!(engine.search("running").unwrap().len(), 1);
        assert_eq!(engine.search("the").unwrap().len(), 1);
    }
}
