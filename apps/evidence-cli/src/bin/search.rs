use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use evidence_core::config::Config;
use evidence_core::types::{FusedResult, ResultKind, SearchMode, SourceKind};
use evidence_hybrid::{AnswerCache, HybridSearchEngine, IndexSet, SearchRequest, SearchResponse, SynonymExpander};

const SNIPPET_CHARS: usize = 240;

/// Ranked, cited evidence for a clinical question
#[derive(Parser, Debug)]
#[command(name = "evidence-search")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// More candidates, more results and abbreviation reformulations
    #[arg(long)]
    depth: bool,

    /// Number of results (defaults to the mode's configured count)
    #[arg(short = 'k', long = "top-k")]
    top_k: Option<usize>,

    /// Print the response as JSON
    #[arg(long)]
    json: bool,

    /// Directory holding config.toml; relative data paths resolve against it
    #[arg(long, env = "APP_CONFIG_DIR", default_value = ".")]
    config_dir: PathBuf,

    /// Query text
    #[arg(required = true, trailing_var_arg = true)]
    query: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let query = args.query.join(" ");
    let mode = if args.depth { SearchMode::Depth } else { SearchMode::Fast };

    let config = Config::load_from(&args.config_dir)?;
    let settings = config.settings()?;
    let indexes = IndexSet::open(&settings, &config).await?;
    let cache = Arc::new(AnswerCache::from_settings(&settings.cache));
    let engine = HybridSearchEngine::new(indexes, settings, cache, Arc::new(SynonymExpander))?;

    let mut request = SearchRequest::new(query.as_str(), mode);
    request.top_k = args.top_k;
    let response = engine.search_request(&request).await?;
    info!(results = response.results.len(), %mode, "search finished");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_human(&query, &response);
    }
    Ok(())
}

fn snippet(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= SNIPPET_CHARS {
        return flat;
    }
    let mut cut: String = flat.chars().take(SNIPPET_CHARS).collect();
    cut.push('…');
    cut
}

fn location(row: &FusedResult) -> String {
    let p = &row.provenance;
    let mut parts = Vec::new();
    match p.pages.as_slice() {
        [] => {}
        [one] => parts.push(format!("p. {one}")),
        many => parts.push(format!("pp. {}", many.iter().map(u32::to_string).collect::<Vec<_>>().join(", "))),
    }
    if let Some(t) = &p.table_ref {
        parts.push(t.clone());
    }
    if let Some(f) = &p.figure_ref {
        parts.push(f.clone());
    }
    parts.join(", ")
}

fn print_human(query: &str, response: &SearchResponse) {
    let sources: Vec<&str> = response.sources_used.iter().map(|s| s.as_str()).collect();
    println!("Query: {query}");
    println!("Sources: {}{}", sources.join(", "), if response.cache_hit { " (cached)" } else { "" });
    for missing in SourceKind::ALL.iter().filter(|k| !response.sources_used.contains(*k)) {
        println!("  {missing} unavailable");
    }
    if response.results.is_empty() {
        println!("\nNo results.");
        return;
    }

    let mut references: Vec<String> = Vec::new();
    for (i, row) in response.results.iter().enumerate() {
        let token = row.citation.as_ref().map_or(row.provenance.document_id.as_str(), |c| c.token.as_str());
        let marker = if row.structured_match { " [structured]" } else { "" };
        println!(
            "\n{}. {:.3} ({token}, {}){marker}  d={:.2} l={:.2} s={:.2}",
            i + 1,
            row.composite,
            location(row),
            row.scores.dense,
            row.scores.lexical,
            row.scores.structured,
        );
        println!("   {}", snippet(&row.text));
        if row.kind == ResultKind::Chunk {
            for record in &row.records {
                println!("   - {}", record.summary());
            }
        }
        if let Some(c) = &row.citation {
            if !references.contains(&c.entry) {
                references.push(c.entry.clone());
            }
        }
    }

    println!("\nReferences:");
    for entry in references {
        println!("  {entry}");
    }
}
