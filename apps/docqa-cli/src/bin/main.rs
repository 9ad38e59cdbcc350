use anyhow::Result;
use clap::{Parser, Subcommand};
use docqa_cli::{init_tracing, run_backfill, Workspace};
use docqa_core::{DocumentStore, Error, JobStatus};
use docqa_hybrid::AnswerOutcome;

#[derive(Parser, Debug)]
#[command(name = "docqa", about = "Ask questions about a personal text archive")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer a question from the archive
    Ask {
        question: String,
        /// Only show which sources were retrieved
        #[arg(long)]
        sources_only: bool,
    },
    /// Show how many documents carry embeddings
    Status {
        #[arg(long)]
        source: Option<String>,
    },
    /// Embed documents that are still missing a vector
    Embed {
        #[arg(long)]
        source: Option<String>,
        /// Hide the progress bar
        #[arg(long)]
        quiet: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let ws = Workspace::open().map_err(|e| {
        eprintln!("Error loading config: {e:#}");
        e
    })?;

    match cli.command {
        Command::Ask { question, sources_only } => {
            let engine = ws.engine()?;
            if sources_only {
                let retrieval = engine.retrieve(&question).await?;
                println!("🔍 {} sources via {:?} ranking", retrieval.groups.len(), retrieval.path);
                for g in &retrieval.groups {
                    println!("  {:.3}  {}  ({} paragraphs)", g.average_score, g.source_id, g.len());
                }
                return Ok(());
            }
            let answer = engine.ask(&question).await?;
            println!("{}", answer.text);
            match &answer.outcome {
                AnswerOutcome::Degraded { error } => eprintln!("\n⚠️  Generation failed ({error}); showing raw excerpts"),
                AnswerOutcome::Retrieved => eprintln!("\n💡 Generation is disabled; showing the best excerpt"),
                AnswerOutcome::Generated | AnswerOutcome::NotFound => {}
            }
            if !answer.sources.is_empty() {
                println!("\nSources:");
                for s in &answer.sources {
                    println!("  [{}] score {:.3}  {}", s.source, s.score, s.titles.join(", "));
                }
            }
        }
        Command::Status { source } => {
            let coverage = ws.store.coverage(source.as_deref())?;
            println!("📊 Embedding coverage for {}", source.as_deref().unwrap_or("all sources"));
            println!("  total:      {}", coverage.total);
            println!("  embedded:   {}", coverage.with_embedding);
            println!("  missing:    {}", coverage.without_embedding);
            println!("  coverage:   {:.2}%", coverage.percentage);
        }
        Command::Embed { source, quiet } => {
            let jobs = ws.jobs()?;
            match run_backfill(&jobs, source.as_deref(), !quiet).await? {
                None => println!("✅ Nothing to embed"),
                Some(state) if state.status == JobStatus::Completed => {
                    ws.save()?;
                    println!("✅ Embedded {} of {} paragraphs", state.embedded, state.total);
                    if state.embedded < state.total {
                        println!("⚠️  {} paragraphs failed; run `docqa embed` again to retry them", state.total - state.embedded);
                    }
                }
                Some(state) => {
                    let reason = state.error.unwrap_or_default();
                    anyhow::bail!(Error::Operation(format!("embedding job {} failed: {reason}", state.task_id)));
                }
            }
        }
    }
    Ok(())
}
