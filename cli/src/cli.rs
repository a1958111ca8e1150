//! Command-line arguments.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use docchat_retrieval::DocChatConfig;

#[derive(Parser, Debug)]
#[command(
    name = "docchat",
    version,
    about = "Chat with your indexed documents: retrieve, rerank, answer"
)]
pub struct Args {
    /// Config file (defaults to <config dir>/docchat/config.toml)
    #[arg(long, env = "DOCCHAT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Qdrant REST endpoint
    #[arg(long)]
    pub qdrant_url: Option<String>,

    /// Collection holding the indexed documents
    #[arg(long)]
    pub collection: Option<String>,

    /// Generation model
    #[arg(long)]
    pub model: Option<String>,

    /// Candidates fetched by similarity search
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Passages kept after reranking
    #[arg(long)]
    pub top_n: Option<usize>,

    /// Ask one question, print the answer and exit
    #[arg(long, short)]
    pub query: Option<String>,

    /// Print the passages each answer was based on
    #[arg(long, default_value_t = false)]
    pub show_sources: bool,
}

impl Args {
    /// Load the config file and apply environment secrets and flag overrides.
    pub fn load_config(&self) -> Result<DocChatConfig> {
        let path = self.config.clone().or_else(DocChatConfig::default_path);
        let mut config = match &path {
            Some(path) => DocChatConfig::load(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => DocChatConfig::default(),
        };
        config.apply_env();
        self.apply_overrides(&mut config);
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut DocChatConfig) {
        if let Some(url) = &self.qdrant_url {
            config.store.url = url.clone();
        }
        if let Some(collection) = &self.collection {
            config.pipeline.collection = collection.clone();
        }
        if let Some(model) = &self.model {
            config.generation.model = model.clone();
        }
        if let Some(top_k) = self.top_k {
            config.pipeline.top_k = top_k;
        }
        if let Some(top_n) = self.top_n {
            config.pipeline.top_n = top_n;
        }
    }
}
