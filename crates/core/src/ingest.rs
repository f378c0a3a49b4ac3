use crate::chunking::{chunk_pages, ChunkingConfig};
use crate::extractor::{SourceFormat, TextExtractor};
use crate::models::{
    Chunk, Document, DocumentId, DocumentStatus, IngestionOptions, NewDocument, NewVersion,
    VersionId,
};
use crate::orchestrator::SearchCoordinator;
use crate::retrieval::RetrievalMode;
use crate::traits::Catalog;
use crate::error::IngestError;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub document_id: DocumentId,
    pub version_id: VersionId,
    pub version_number: u32,
    pub pages_processed: usize,
    pub chunk_count: usize,
    pub text_len: usize,
    pub status: DocumentStatus,
    pub snapshot: PathBuf,
    pub mode: RetrievalMode,
}

pub fn discover_documents(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        if SourceFormat::from_suffix(entry.path()).is_some() {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

pub async fn register_document<C: Catalog>(
    catalog: &C,
    path: &Path,
    owner_id: i64,
    name: Option<String>,
) -> Result<Document, IngestError> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
        })?;
    let format = SourceFormat::detect(path, "");

    let document = catalog
        .create_document(NewDocument {
            owner_id,
            name: name.unwrap_or_else(|| file_name.to_string()),
            path: path.to_path_buf(),
            mime: format.mime().to_string(),
            size: fs::metadata(path)?.len(),
            checksum: digest_file(path)?,
        })
        .await?;

    info!(
        target: "audit",
        action = "upload",
        resource = "document",
        ref_id = document.id,
        user = owner_id,
        "document registered"
    );
    Ok(document)
}

pub async fn ingest_document<C: Catalog>(
    coordinator: &SearchCoordinator<C>,
    extractor: &dyn TextExtractor,
    document_id: DocumentId,
    options: &IngestionOptions,
) -> Result<IngestReport, IngestError> {
    let document = resolve(coordinator.catalog(), document_id).await?;
    if !document.path.exists() {
        return Err(IngestError::MissingSource(document.path.display().to_string()));
    }

    let pages = extractor.extract_pages(&document.path, &document.mime)?;
    ingest_pages(coordinator, document_id, &pages, options).await
}

pub async fn ingest_pages<C: Catalog>(
    coordinator: &SearchCoordinator<C>,
    document_id: DocumentId,
    pages: &[String],
    options: &IngestionOptions,
) -> Result<IngestReport, IngestError> {
    let catalog = coordinator.catalog();
    let document = resolve(catalog, document_id).await?;
    let drafts = chunk_pages(pages, ChunkingConfig::from(options));

    let version_number = catalog
        .latest_version(document_id)
        .await?
        .map_or(1, |latest| latest.version_number + 1);

    let version = catalog
        .create_version(NewVersion {
            document_id,
            version_number,
            text_len: pages.iter().map(|page| page.chars().count()).sum(),
            chunk_count: drafts.len(),
            source_checksum: document.checksum.clone(),
        })
        .await?;

    let chunks: Vec<Chunk> = drafts
        .into_iter()
        .map(|draft| Chunk::from_draft(version.id, draft))
        .collect();
    let chunk_count = chunks.len();
    catalog.insert_chunks(version.id, chunks).await?;
    catalog.set_current_version(document_id, version.id).await?;

    let built = coordinator.build_index(version.id).await?;

    info!(
        target: "audit",
        action = "ingest",
        resource = "document",
        ref_id = document_id,
        version = version.version_number,
        chunks = chunk_count,
        "document ingested"
    );

    Ok(IngestReport {
        document_id,
        version_id: version.id,
        version_number: version.version_number,
        pages_processed: pages.len(),
        chunk_count,
        text_len: version.text_len,
        status: DocumentStatus::Processed,
        snapshot: built.path,
        mode: built.mode,
    })
}

async fn resolve<C: Catalog>(catalog: &C, document_id: DocumentId) -> Result<Document, IngestError> {
    catalog
        .resolve_document(document_id)
        .await?
        .ok_or_else(|| IngestError::InvalidArgument(format!("document {document_id} not found")))
}
