use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use docqa_cli::{init_tracing, run_backfill, Workspace};

#[derive(Parser, Debug)]
#[command(name = "docqa-indexer", about = "Split .txt files into paragraphs and embed them")]
struct IndexerCli {
    /// Directory of .txt files; defaults to data.raw_txt_dir
    data_dir: Option<PathBuf>,

    /// Only read the first N files
    #[arg(long)]
    limit: Option<usize>,

    /// Store paragraphs without embedding them
    #[arg(long)]
    no_embed: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = IndexerCli::parse();
    let ws = Workspace::open().map_err(|e| {
        eprintln!("Error loading config: {e:#}");
        e
    })?;
    let data_dir = cli.data_dir.unwrap_or_else(|| ws.rag.data.raw_txt_dir());

    println!("docqa indexer\n=============");
    println!("Data directory: {}", data_dir.display());
    println!("Snapshot:       {}", ws.store_path.display());

    let report = ws.ingest(&data_dir, cli.limit)?;
    println!("📊 {} paragraphs read, {} new", report.paragraphs, report.added);
    ws.save()?;

    if cli.no_embed {
        println!("⚠️  Skipping embeddings (--no-embed); run `docqa embed` later");
        return Ok(());
    }

    let jobs = ws.jobs()?;
    match run_backfill(&jobs, None, true).await? {
        Some(state) => {
            ws.save()?;
            println!("📊 Embedded {} of {} paragraphs ({:?})", state.embedded, state.total, state.status);
        }
        None => println!("📊 Every paragraph already has an embedding"),
    }
    println!("\n✅ Indexing completed successfully!");
    println!("💡 To ask a question, use: cargo run --bin docqa -- ask '<question>'");
    Ok(())
}
