use std::path::{Path, PathBuf};

use anyhow::Context;
use arbor_core::{Config, Pipeline};
use arbor_index::{AnyEncoder, QueryLevel};
use arbor_llm::AnyProvider;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "arbor", version, about = "Hierarchical fact digests with level-routed retrieval")]
struct Cli {
    /// Configuration file; defaults apply when it does not exist
    #[arg(long, global = true, env = "ARBOR_CONFIG", default_value = "arbor.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the digest tree from a JSON-lines fact file and index it
    Build {
        #[arg(long)]
        facts: PathBuf,
        /// Also write the built tree as JSON
        #[arg(long)]
        tree_out: Option<PathBuf>,
    },
    /// Retrieve the best matching digest texts for a query
    Query {
        text: String,
        /// Number of results; defaults to `index.default_k`
        #[arg(short)]
        k: Option<usize>,
        /// Print hits with level and score as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the abstraction level a query is routed to
    Classify { text: String },
    /// Print stored node counts per level
    Stats,
    /// Write a default configuration file
    Init {
        #[arg(long, default_value = "arbor.toml")]
        path: PathBuf,
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();
    let cli = Cli::parse();

    match cli.command {
        Command::Init { path, force } => {
            Config::write_default(&path, force)?;
            println!("wrote {}", path.display());
        }
        Command::Build { facts, tree_out } => {
            let pipeline = open(&cli.config).await?;
            let outcome = pipeline.build_from_jsonl(&facts).await?;
            if let Some(out) = tree_out {
                write_tree(&out, &outcome.tree)?;
            }
            print_counts(&pipeline.stats().await?);
        }
        Command::Query { text, k, json } => {
            let pipeline = open(&cli.config).await?;
            pipeline.prepare().await?;
            let routed = pipeline.query(&text, k).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&routed.hits)?);
            } else {
                let level = routed.level.map_or("unavailable", QueryLevel::as_str);
                println!("level: {level}");
                for (i, hit) in routed.hits.iter().enumerate() {
                    println!("\n[{}] {} ({:.3})\n{}", i + 1, hit.level, hit.score, hit.text);
                }
            }
        }
        Command::Classify { text } => {
            let pipeline = open(&cli.config).await?;
            println!("{}", pipeline.classify(&text).await?);
        }
        Command::Stats => {
            let pipeline = open(&cli.config).await?;
            print_counts(&pipeline.stats().await?);
        }
    }
    Ok(())
}

async fn open(config_path: &Path) -> anyhow::Result<Pipeline<AnyProvider, AnyEncoder>> {
    let config = Config::load(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    Pipeline::from_config(&config).await
}

fn write_tree(path: &Path, tree: &arbor_tree::DigestTree) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(tree)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), "wrote digest tree");
    Ok(())
}

fn print_counts(counts: &std::collections::BTreeMap<arbor_tree::Level, usize>) {
    for level in arbor_tree::Level::TOP_DOWN {
        let count = counts.get(&level).copied().unwrap_or(0);
        println!("{:>6}: {count}", level.as_str());
    }
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn query_parses_k_and_global_config() {
        let cli = Cli::try_parse_from(["arbor", "query", "who met whom", "-k", "3", "--config", "x.toml"])
            .unwrap();
        assert_eq!(cli.config, PathBuf::from("x.toml"));
        match cli.command {
            Command::Query { text, k, json } => {
                assert_eq!(text, "who met whom");
                assert_eq!(k, Some(3));
                assert!(!json);
            }
            _ => panic!("expected query"),
        }
    }

    #[test]
    fn build_requires_facts() {
        assert!(Cli::try_parse_from(["arbor", "build"]).is_err());
        let cli = Cli::try_parse_from(["arbor", "build", "--facts", "f.jsonl", "--tree-out", "t.json"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Command::Build { tree_out: Some(_), .. }
        ));
    }
}
