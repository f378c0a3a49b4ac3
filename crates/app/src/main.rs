use chrono::Utc;
use clap::{Parser, Subcommand};
use docuhelp_core::{
    discover_documents, ingest_document, register_document, Catalog, EmbeddingProvider,
    FileExtractor, IndexStore, IngestReport, IngestionOptions, MemoryCatalog, RetrievalBackend,
    RetrievalSettings, SearchCoordinator, SemanticMode,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "docuhelp", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Catalog file holding documents, versions, and chunks
    #[arg(long, env = "CATALOG_PATH", default_value = "storage/catalog.json")]
    catalog_path: PathBuf,

    /// Directory for per-version index snapshots
    #[arg(long, env = "INDEX_DIR", default_value = "storage/index")]
    index_dir: PathBuf,

    /// Semantic retrieval: off, on, or auto
    #[arg(long, env = "USE_SEMANTIC", default_value = "auto")]
    semantic: SemanticMode,

    /// Embeddings provider: http or ngram
    #[arg(long, env = "EMBEDDINGS_PROVIDER", default_value = "http")]
    embeddings_provider: EmbeddingProvider,

    /// Embeddings endpoint for the http provider
    #[arg(long, env = "EMBEDDINGS_ENDPOINT")]
    embeddings_endpoint: Option<String>,

    /// Bearer key for the embeddings endpoint
    #[arg(long, env = "EMBEDDINGS_API_KEY", hide_env_values = true)]
    embeddings_api_key: Option<String>,

    /// Embeddings model name
    #[arg(long, env = "EMBEDDINGS_MODEL", default_value = "sentence-transformers/all-MiniLM-L6-v2")]
    embeddings_model: String,

    /// Default number of passages to retrieve
    #[arg(long, env = "TOP_K", default_value = "5")]
    top_k: usize,

    /// Chunk window width in characters
    #[arg(long, default_value = "800")]
    chunk_max_chars: usize,

    /// Characters shared by consecutive chunks
    #[arg(long, default_value = "80")]
    chunk_overlap_chars: usize,
}

impl Cli {
    fn retrieval_settings(&self) -> RetrievalSettings {
        RetrievalSettings {
            semantic: self.semantic,
            embeddings_provider: self.embeddings_provider,
            embeddings_endpoint: self.embeddings_endpoint.clone(),
            embeddings_api_key: self.embeddings_api_key.clone(),
            embeddings_model: self.embeddings_model.clone(),
            top_k: self.top_k,
            index_dir: self.index_dir.clone(),
        }
    }

    fn ingestion_options(&self) -> IngestionOptions {
        IngestionOptions {
            chunk_max_chars: self.chunk_max_chars,
            chunk_overlap_chars: self.chunk_overlap_chars,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Register a stored file as a document without ingesting it.
    Register {
        #[arg(long)]
        file: PathBuf,
        /// Display title; defaults to the file name.
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "1")]
        owner: i64,
    },
    /// Extract, chunk, and index a document as a new version.
    Ingest {
        /// Previously registered document.
        #[arg(long, conflicts_with_all = ["file", "folder"])]
        document_id: Option<i64>,
        /// Register and ingest a single file.
        #[arg(long, conflicts_with = "folder")]
        file: Option<PathBuf>,
        /// Register and ingest every pdf, docx, and txt file recursively.
        #[arg(long)]
        folder: Option<PathBuf>,
        #[arg(long, default_value = "1")]
        owner: i64,
    },
    /// Rank passages across the current version of every visible document.
    Search {
        #[arg(long)]
        query: String,
        /// Number of results; defaults to --top-k.
        #[arg(long)]
        k: Option<usize>,
        /// Restrict to one owner's documents; all documents when omitted.
        #[arg(long)]
        owner: Option<i64>,
    },
    /// Answer a question with the best passages and their citations.
    Answer {
        #[arg(long)]
        question: String,
        #[arg(long)]
        owner: Option<i64>,
    },
    /// Rebuild the index snapshot of one version from its stored chunks.
    Rebuild {
        #[arg(long)]
        version_id: i64,
    },
    /// List documents and their current versions.
    Documents {
        #[arg(long)]
        owner: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let settings = cli.retrieval_settings();
    let options = cli.ingestion_options();

    let catalog = MemoryCatalog::load(&cli.catalog_path)?;
    let store = IndexStore::open(&settings.index_dir)?;
    let backend = RetrievalBackend::from_settings(&settings);
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        retrieval = ?backend.preferred_mode(),
        "docuhelp boot"
    );

    let coordinator = SearchCoordinator::new(catalog, store, backend);

    match cli.command {
        Command::Register { file, name, owner } => {
            let document = register_document(coordinator.catalog(), &file, owner, name).await?;
            coordinator.catalog().save(&cli.catalog_path)?;
            println!(
                "registered document_id={} name={} checksum={}",
                document.id, document.name, document.checksum
            );
        }
        Command::Ingest {
            document_id,
            file,
            folder,
            owner,
        } => {
            let mut targets = Vec::new();
            if let Some(document_id) = document_id {
                targets.push(document_id);
            }
            if let Some(file) = file {
                targets.push(register_document(coordinator.catalog(), &file, owner, None).await?.id);
            }
            if let Some(folder) = folder {
                let files = discover_documents(&folder);
                if files.is_empty() {
                    anyhow::bail!("no pdf, docx, or txt files found in {}", folder.display());
                }
                for path in files {
                    targets.push(register_document(coordinator.catalog(), &path, owner, None).await?.id);
                }
            }
            if targets.is_empty() {
                anyhow::bail!("pass --document-id, --file, or --folder");
            }

            let mut failures = 0usize;
            for document_id in targets {
                match ingest_document(&coordinator, &FileExtractor, document_id, &options).await {
                    Ok(report) => print_ingest(&report),
                    Err(error) => {
                        failures += 1;
                        warn!(document_id, reason = %error, "ingest failed");
                    }
                }
            }
            coordinator.catalog().save(&cli.catalog_path)?;

            if failures > 0 {
                println!("{failures} document(s) failed to ingest");
            }
        }
        Command::Search { query, k, owner } => {
            let envelope = coordinator
                .search(&query, owner, k.unwrap_or(settings.top_k))
                .await?;

            println!("query: {query}");
            for item in &envelope.results {
                println!(
                    "[{:.4}] doc={} \"{}\" v{} p{}",
                    item.score, item.doc_id, item.title, item.version, item.page
                );
                println!("  {}", item.snippet);
            }
            println!(
                "{} result(s) in {:.3}s",
                envelope.total_results, envelope.query_time_secs
            );
        }
        Command::Answer { question, owner } => {
            let answer = coordinator.answer(&question, owner, settings.top_k).await?;

            println!("{}", answer.text);
            println!("confidence={:.4}", answer.confidence);
            for citation in &answer.citations {
                println!(
                    "  cite doc={} \"{}\" v{} p{} score={:.4}",
                    citation.doc_id, citation.title, citation.version, citation.page, citation.score
                );
            }
        }
        Command::Rebuild { version_id } => {
            if coordinator.catalog().resolve_version(version_id).await?.is_none() {
                anyhow::bail!("version {version_id} not found");
            }
            let built = coordinator.build_index(version_id).await?;
            coordinator.catalog().save(&cli.catalog_path)?;
            println!(
                "rebuilt version_id={version_id} mode={:?} chunks={} path={}",
                built.mode,
                built.chunk_count,
                built.path.display()
            );
        }
        Command::Documents { owner } => {
            for document in coordinator.catalog().list_documents(owner).await? {
                let current = match document.current_version_id {
                    Some(version_id) => coordinator.catalog().resolve_version(version_id).await?,
                    None => None,
                };
                println!(
                    "{} \"{}\" owner={} status={:?} current={}",
                    document.id,
                    document.name,
                    document.owner_id,
                    document.status,
                    describe_version(current.as_ref().map(|version| {
                        (version.id, version.version_number, version.chunk_count)
                    }))
                );
                print_source(&document.path);
            }
        }
    }

    Ok(())
}

fn print_ingest(report: &IngestReport) {
    println!(
        "ingested document_id={} version={} (id {}) pages={} chunks={} text_len={} mode={:?} at {}",
        report.document_id,
        report.version_number,
        report.version_id,
        report.pages_processed,
        report.chunk_count,
        report.text_len,
        report.mode,
        Utc::now().to_rfc3339()
    );
}

fn describe_version(version: Option<(i64, u32, usize)>) -> String {
    match version {
        Some((id, number, chunks)) => format!("v{number} (id {id}, {chunks} chunks)"),
        None => "none".to_string(),
    }
}

fn print_source(path: &Path) {
    if !path.exists() {
        println!("  source={} (missing)", path.display());
    } else {
        println!("  source={}", path.display());
    }
}
