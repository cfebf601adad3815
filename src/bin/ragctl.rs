use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rustyrag::{config, logging, processing::RagService};

#[derive(Parser)]
#[command(
    name = "ragctl",
    about = "Index PDFs into collections and query them from the command line"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index a PDF file or a directory of PDFs.
    Index {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        collection: String,
    },
    /// Print the prompt built from the nearest chunks.
    Query {
        #[arg(long)]
        collection: String,
        #[arg(long)]
        k: Option<usize>,
        question: String,
    },
    /// Answer a question with the configured language model.
    Answer {
        #[arg(long)]
        collection: String,
        #[arg(long)]
        k: Option<usize>,
        question: String,
    },
    /// Irreversibly delete a collection.
    Delete {
        #[arg(long)]
        collection: String,
    },
    /// List collections under the store root.
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    config::init_config();
    logging::init_tracing("warn");
    let service = RagService::from_config(config::get_config())
        .context("failed to initialize RAG service")?;

    match cli.command {
        Command::Index { path, collection } => {
            let summary = service
                .index(&path, &collection)
                .await
                .with_context(|| format!("failed to index {}", path.display()))?;
            println!("Adding new documents: {}", summary.added_count);
            if summary.added_count == 0 {
                println!("No new documents to add");
            }
            if summary.stale_count > 0 {
                println!(
                    "{} stored chunks differ from the source; delete the collection to refresh them",
                    summary.stale_count
                );
            }
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Query {
            collection,
            k,
            question,
        } => {
            let prompt = service
                .build_prompt(&collection, &question, k)
                .await
                .with_context(|| format!("failed to query collection {collection}"))?;
            println!("{}", prompt.prompt);
        }
        Command::Answer {
            collection,
            k,
            question,
        } => {
            let answer = service
                .answer(&collection, &question, k)
                .await
                .with_context(|| format!("failed to answer from collection {collection}"))?;
            println!("{}", answer.with_sources());
        }
        Command::Delete { collection } => {
            let deleted = service
                .delete_collection(&collection)
                .await
                .with_context(|| format!("failed to delete collection {collection}"))?;
            if deleted {
                println!("Deleted collection {collection}");
            } else {
                println!("Collection {collection} does not exist");
            }
        }
        Command::List => {
            let collections = service
                .list_collections()
                .await
                .context("failed to list collections")?;
            for name in collections {
                println!("{name}");
            }
        }
    }

    Ok(())
}
