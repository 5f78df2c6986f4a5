use pdf_chat::api;
use pdf_chat::config::{AppConfig, DEFAULT_PORT};
use pdf_chat::database::VectorDB;
use pdf_chat::document::{RagSystem, UploadDir};
use pdf_chat::providers::GeminiProvider;
use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use dotenv::dotenv;
use indicatif::{ProgressBar, ProgressStyle};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Chat with a PDF using retrieval-augmented generation", long_about = None)]
struct Args {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Chat with a PDF in the terminal instead of serving the web interface
    #[arg(long)]
    chat: Option<PathBuf>,

    /// Search with the raw question instead of a hypothetical answer
    #[arg(long)]
    no_hyde: bool,

    #[arg(long)]
    top_k: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config = AppConfig::from_env();
    if args.no_hyde {
        config.hyde_enabled = false;
    }
    if let Some(top_k) = args.top_k {
        config.top_k = top_k.max(1);
    }

    if config.provider.api_key.is_none() {
        log::warn!("GEMINI_API_KEY is not set; questions and uploads will fail until it is");
    }

    let rag = build_rag_system(&config).await?;

    match &args.chat {
        Some(path) => run_cli_mode(rag, path).await,
        None => run_api_server(rag, &config, &args).await,
    }
}

async fn build_rag_system(config: &AppConfig) -> Result<RagSystem> {
    let vector_db = VectorDB::open(&config.vector_db_path)
        .await
        .with_context(|| format!("Failed to open vector store at {}", config.vector_db_path.display()))?;

    let gemini = Arc::new(GeminiProvider::new(&config.provider));
    let rag = RagSystem::new(config, vector_db, gemini.clone(), gemini)
        .context("Failed to initialize pipeline")?;

    rag.reset_store().await.context("Failed to reset vector store")?;
    Ok(rag)
}

async fn run_api_server(rag: RagSystem, config: &AppConfig, args: &Args) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", args.host, args.port))?;

    let uploads = UploadDir::new(&config.upload_dir);
    let app = api::create_api(rag, config.max_upload_bytes);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    println!("{} http://{}", "📚 PDF chat running on".bright_cyan(), addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    cleanup_uploads(&uploads);
    Ok(())
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("Shutting down");
}

fn cleanup_uploads(uploads: &UploadDir) {
    match uploads.clear_blocking() {
        Ok(0) => {}
        Ok(count) => log::info!("Removed {} temporary files", count),
        Err(e) => log::warn!("Failed to clean {}: {}", uploads.path().display(), e),
    }
}

async fn run_cli_mode(mut rag: RagSystem, path: &Path) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string());

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(format!("Processing {}", file_name));

    let indexed = rag.index_document(&file_name, bytes).await;
    pb.finish_and_clear();

    let report = indexed.with_context(|| format!("Failed to process {}", file_name))?;
    println!(
        "📄 {} ({} pages, {} chunks)",
        report.document.file_name.bright_yellow(),
        report.document.pages,
        report.document.chunks
    );
    println!("{}", "Ask a question about the document. Ctrl-D to exit.".bright_black());

    let mut rl = Editor::<(), DefaultHistory>::new()?;

    loop {
        match rl.readline("👤 ") {
            Ok(line) => {
                let question = line.trim();
                if question.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(question);

                match rag.ask(question).await {
                    Ok(answer) => {
                        println!("\n🤖 {}\n", answer.text.bright_green());
                        for source in &answer.sources {
                            println!(
                                "{}",
                                format!("   [chunk {} | score {:.3}]", source.chunk_index, source.score).bright_black()
                            );
                        }
                    }
                    Err(e) => println!("{}", format!("Error processing query: {}", e).red()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    rag.clear().await.context("Failed to clear session")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigterm_triggers_shutdown_and_cleanup() {
        let temp = tempfile::TempDir::new().unwrap();
        let uploads = UploadDir::new(temp.path());
        uploads.save("pending.pdf", b"%PDF").await.unwrap();

        let waiter = tokio::spawn(shutdown_signal());
        // Let the handlers register before the signal is sent
        tokio::time::sleep(Duration::from_millis(200)).await;

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("shutdown signal did not resolve on SIGTERM")
            .unwrap();

        cleanup_uploads(&uploads);
        assert!(temp.path().exists());
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }
}
