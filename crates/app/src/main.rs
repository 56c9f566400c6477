mod error;
mod remote;
mod server;
mod services;

use anyhow::Context;
use chrono::Utc;
use clap::{ArgGroup, Parser, Subcommand};
use server::{AppState, StaticMounts};
use services::{build_generator, BackendArgs, Services, StorageBackend};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use study_rag_core::{QueryOptions, DEFAULT_CHAPTER};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "study-rag", version, about = "Study assistant over uploaded lecture notes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (and optionally the built frontend).
    Serve {
        #[command(flatten)]
        backends: BackendArgs,

        #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:8000")]
        bind: SocketAddr,

        /// Directory of the built frontend to serve with an `index.html` fallback.
        #[arg(long, env = "STATIC_DIR")]
        static_dir: Option<PathBuf>,

        #[arg(long, env = "ADMIN_SECRET", hide_env_values = true)]
        admin_secret: Option<String>,

        #[arg(long, env = "TOP_K", default_value_t = 8)]
        top_k: usize,

        #[arg(long, env = "RELEVANCE_THRESHOLD", default_value_t = 0.35)]
        relevance_threshold: f32,

        #[arg(long, env = "QUIZ_QUESTIONS", default_value_t = 10)]
        quiz_questions: usize,
    },
    /// Ingest one PDF or a folder of PDFs without running the server.
    #[command(group(ArgGroup::new("input").required(true).args(["file", "folder"])))]
    Ingest {
        #[command(flatten)]
        backends: BackendArgs,

        #[arg(long)]
        file: Option<PathBuf>,

        /// Folder searched recursively for PDFs.
        #[arg(long)]
        folder: Option<PathBuf>,

        #[arg(long)]
        subject: String,

        #[arg(long, default_value = DEFAULT_CHAPTER)]
        chapter: String,
    },
    /// Call the admin endpoints of a running server.
    Admin {
        #[arg(long, env = "STUDY_RAG_URL", default_value = "http://127.0.0.1:8000")]
        server: String,

        #[arg(long, env = "ADMIN_SECRET", hide_env_values = true)]
        admin_secret: String,

        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Delete every vector tagged with a subject.
    DeleteTopic {
        #[arg(long)]
        subject: String,
    },
    /// Delete all vectors and all stored files.
    Nuke {
        /// Must be DELETE_EVERYTHING.
        #[arg(long)]
        confirm: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(error) = dotenvy::dotenv() {
        if !error.not_found() {
            return Err(error).context("reading .env");
        }
    }

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            backends,
            bind,
            static_dir,
            admin_secret,
            top_k,
            relevance_threshold,
            quiz_questions,
        } => {
            let services = Services::from_args(&backends).await?;
            let generator = build_generator(&backends)?;
            if admin_secret.as_deref().map_or(true, str::is_empty) {
                warn!("ADMIN_SECRET is not set, admin endpoints will refuse every request");
            }

            let state = AppState {
                query: Arc::new(services.query(
                    generator,
                    QueryOptions {
                        top_k,
                        relevance_threshold,
                        quiz_questions,
                    },
                )),
                ingestion: Arc::new(services.ingestion(&backends)?),
                admin: Arc::new(services.admin(admin_secret)),
            };

            if let Some(dir) = &static_dir {
                if !dir.join("index.html").is_file() {
                    warn!(dir = %dir.display(), "static dir has no index.html");
                }
            }
            let mounts = StaticMounts {
                frontend_dir: static_dir,
                files_dir: (backends.storage_backend == StorageBackend::Local)
                    .then(|| backends.local_storage_dir.clone()),
            };

            let app = server::router(state, mounts);
            let listener = tokio::net::TcpListener::bind(bind)
                .await
                .with_context(|| format!("binding {bind}"))?;
            info!(
                version = env!("CARGO_PKG_VERSION"),
                started_at = %Utc::now().to_rfc3339(),
                addr = %bind,
                "study-rag listening"
            );
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        Command::Ingest {
            backends,
            file,
            folder,
            subject,
            chapter,
        } => {
            let services = Services::from_args(&backends).await?;
            let pipeline = services.ingestion(&backends)?;

            if let Some(file) = file {
                let report = pipeline.ingest_path(&file, &subject, &chapter).await?;
                println!(
                    "{}: {} chunks, {} indexed, {} skipped, url={}",
                    report.document.filename,
                    report.chunk_count,
                    report.indexed_count,
                    report.skipped_chunks.len(),
                    report.document.pdf_url
                );
            } else if let Some(folder) = folder {
                let report = pipeline.ingest_folder(&folder, &subject, &chapter).await?;
                for document in &report.documents {
                    println!(
                        "{}: {} chunks, {} indexed, {} skipped",
                        document.document.filename,
                        document.chunk_count,
                        document.indexed_count,
                        document.skipped_chunks.len()
                    );
                }
                for skipped in &report.skipped_files {
                    warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
                }
                println!(
                    "{} files ingested, {} skipped at {}",
                    report.documents.len(),
                    report.skipped_files.len(),
                    Utc::now().to_rfc3339()
                );
            }
        }
        Command::Admin {
            server,
            admin_secret,
            action,
        } => {
            let client = remote::AdminClient::new(&server, admin_secret)?;
            let outcome = match action {
                AdminAction::DeleteTopic { subject } => client.delete_topic(&subject).await?,
                AdminAction::Nuke { confirm } => client.nuke(&confirm).await?,
            };
            println!("{}: {}", outcome.status, outcome.message);
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
