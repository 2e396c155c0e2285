use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use homematch_core::config::{EmbeddingProvider, Settings};

#[derive(Parser, Debug)]
#[command(name = "homematch")]
#[command(about = "Match buyer preferences against real estate listings and personalize the matches", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding config.toml and config.<env>.toml
    #[arg(long, global = true, default_value = ".")]
    pub config_dir: PathBuf,

    /// Config environment (dev, prod, test); defaults to RUST_ENV
    #[arg(long, global = true)]
    pub env: Option<String>,

    /// Debug logging (RUST_LOG still wins when set)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Full run: match, filter and write personalized descriptions as JSON
    Run(RunArgs),
    /// Build the listing index, or confirm the persisted one is current
    Index(CorpusArgs),
    /// Match and filter only; prints the surviving listings and their statements
    Match(MatchArgs),
}

#[derive(Args, Debug, Default)]
pub struct CorpusArgs {
    /// Listing corpus (JSON array file, or a directory of .txt files)
    #[arg(long)]
    pub corpus: Option<String>,

    /// Rebuild the index even when a matching one is persisted
    #[arg(long)]
    pub rebuild: bool,

    /// Use the offline hashing embedder
    #[arg(long)]
    pub offline: bool,
}

#[derive(Args, Debug, Default)]
pub struct MatchArgs {
    #[command(flatten)]
    pub corpus: CorpusArgs,

    /// File with one preference statement per line
    #[arg(long)]
    pub criteria_file: Option<String>,

    /// Nearest fragments considered per statement
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Minimum relevance for a fragment to count as a match
    #[arg(long)]
    pub min_relevance: Option<f32>,

    /// Distinct statements a listing must match to be kept
    #[arg(long)]
    pub min_matches: Option<usize>,
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    #[command(flatten)]
    pub matching: MatchArgs,

    /// Write the JSON report here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl CorpusArgs {
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(path) = &self.corpus { settings.corpus.path.clone_from(path); }
        if self.rebuild { settings.index.rebuild = true; }
        if self.offline { settings.embedding.provider = EmbeddingProvider::Hashing; }
    }
}

impl MatchArgs {
    pub fn apply(&self, settings: &mut Settings) {
        self.corpus.apply(settings);
        if let Some(file) = &self.criteria_file {
            settings.criteria.file = Some(file.clone());
            settings.criteria.statements.clear();
        }
        if let Some(k) = self.top_k { settings.matching.top_k = k; }
        if let Some(r) = self.min_relevance { settings.matching.min_relevance = r; }
        if let Some(m) = self.min_matches { settings.matching.min_matches = m; }
    }
}
