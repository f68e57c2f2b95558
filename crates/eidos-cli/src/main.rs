//! CLI entry point for the Eidos backend (for dev and testing).

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use eidos_core::{app_data_dir, chunk_document, load_config, status, Chunk, Config, RagService};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "eidos")]
#[command(about = "Eidos: retrieval-augmented Q&A over your documents")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show backend status (for dev).
    Status,
    /// Show where Eidos stores its config and index (app data directory).
    DataDir,
    /// Chunk, embed, and index a text file (or every .txt/.md under a directory).
    Add {
        /// File or directory to ingest.
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// Ask a question over the indexed documents.
    Ask {
        #[arg(value_name = "QUESTION")]
        question: String,
        /// Conversation session id; follow-ups in the same session can
        /// refer back to earlier questions.
        #[arg(long, default_value = "default")]
        session: String,
        /// Number of chunks to retrieve (default: `top_k` from config).
        #[arg(long)]
        k: Option<usize>,
        /// Print the full outcome as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Remove one document (all its chunks) by filename.
    Remove {
        #[arg(value_name = "FILENAME")]
        filename: String,
    },
    /// Drop the whole collection and its persisted artifacts.
    Clear,
    /// Show document and chunk counts.
    Stats,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = load_config();

    match cli.command.unwrap_or(Commands::Status) {
        Commands::Status => {
            println!("Eidos backend");
            println!("  core: {}", status());
            ExitCode::SUCCESS
        }
        Commands::DataDir => match app_data_dir() {
            Some(p) => {
                println!("{}", p.display());
                ExitCode::SUCCESS
            }
            None => {
                eprintln!("Could not determine app data directory.");
                ExitCode::FAILURE
            }
        },
        Commands::Add { path } => with_service(&config, |svc| add(svc, config.clone(), path)).await,
        Commands::Ask { question, session, k, json } => {
            with_service(&config, |svc| ask(svc, question, session, k, json)).await
        }
        Commands::Remove { filename } => {
            with_service(&config, |svc| remove(svc, filename)).await
        }
        Commands::Clear => with_service(&config, clear).await,
        Commands::Stats => with_service(&config, stats).await,
    }
}

async fn with_service<F, Fut>(config: &Config, f: F) -> ExitCode
where
    F: FnOnce(RagService) -> Fut,
    Fut: std::future::Future<Output = ExitCode>,
{
    match RagService::from_config(config) {
        Ok(svc) => f(svc).await,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn add(svc: RagService, config: Config, path: PathBuf) -> ExitCode {
    let files = match collect_files(&path) {
        Ok(files) => files,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if files.is_empty() {
        eprintln!("No .txt or .md files found under {}", path.display());
        return ExitCode::FAILURE;
    }
    for file in files {
        match read_chunks(&file, &config) {
            Ok(chunks) if chunks.is_empty() => {
                println!("  {}: empty, skipped", file.display());
            }
            Ok(chunks) => match svc.upload(chunks).await {
                Ok(stats) => println!(
                    "  {}: {} chunk(s), {} character(s)",
                    file.display(),
                    stats.total_chunks,
                    stats.total_characters
                ),
                Err(e) => {
                    eprintln!("Error indexing {}: {e}", file.display());
                    return ExitCode::FAILURE;
                }
            },
            Err(e) => {
                eprintln!("Error reading {}: {e}", file.display());
                return ExitCode::FAILURE;
            }
        }
    }
    println!(
        "Indexed collection now holds {} document(s), {} chunk(s).",
        svc.document_count().await,
        svc.chunk_count().await
    );
    ExitCode::SUCCESS
}

/// A file, or every .txt/.md file under a directory (hidden entries skipped).
fn collect_files(path: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
    {
        let entry = entry.map_err(std::io::Error::other)?;
        let p = entry.path();
        let is_text = p
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e == "txt" || e == "md");
        if is_text && p.is_file() {
            files.push(p.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

fn read_chunks(file: &Path, config: &Config) -> Result<Vec<Chunk>, std::io::Error> {
    let text = std::fs::read_to_string(file)?;
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());
    let file_type = file
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "txt".to_string());
    Ok(chunk_document(
        &filename,
        &file_type,
        &file.display().to_string(),
        &text,
        config.chunk_size,
        config.chunk_overlap,
    ))
}

async fn ask(
    svc: RagService,
    question: String,
    session: String,
    k: Option<usize>,
    json: bool,
) -> ExitCode {
    let k = k.unwrap_or_else(|| svc.top_k());
    match svc.ask(&question, &session, k).await {
        Ok(outcome) => {
            if json {
                match serde_json::to_string_pretty(&outcome) {
                    Ok(s) => println!("{s}"),
                    Err(e) => {
                        eprintln!("Error: {e}");
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                println!("{}", outcome.answer);
                if !outcome.sources.is_empty() {
                    println!();
                    println!("Sources ({} relevant chunk(s)):", outcome.relevant_chunks);
                    for source in &outcome.sources {
                        println!("  {} ({} match(es))", source.filename, source.matches.len());
                    }
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn remove(svc: RagService, filename: String) -> ExitCode {
    match svc.remove_document(&filename).await {
        Ok(true) => {
            println!("Removed '{filename}'.");
            ExitCode::SUCCESS
        }
        Ok(false) => {
            eprintln!("No document named '{filename}' in the collection.");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn clear(svc: RagService) -> ExitCode {
    match svc.clear().await {
        Ok(()) => {
            println!("Cleared document collection.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn stats(svc: RagService) -> ExitCode {
    println!("documents: {}", svc.document_count().await);
    println!("chunks:    {}", svc.chunk_count().await);
    ExitCode::SUCCESS
}
