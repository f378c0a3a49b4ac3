use crate::error::CatalogError;
use crate::models::{
    Chunk, Document, DocumentId, DocumentVersion, NewDocument, NewVersion, VersionId,
};
use async_trait::async_trait;
use std::path::Path;

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn create_document(&self, document: NewDocument) -> Result<Document, CatalogError>;

    async fn resolve_document(&self, id: DocumentId) -> Result<Option<Document>, CatalogError>;

    async fn list_documents(&self, owner: Option<i64>) -> Result<Vec<Document>, CatalogError>;

    async fn resolve_version(&self, id: VersionId) -> Result<Option<DocumentVersion>, CatalogError>;

    async fn latest_version(
        &self,
        document_id: DocumentId,
    ) -> Result<Option<DocumentVersion>, CatalogError>;

    async fn create_version(&self, version: NewVersion) -> Result<DocumentVersion, CatalogError>;

    async fn insert_chunks(&self, version_id: VersionId, chunks: Vec<Chunk>) -> Result<(), CatalogError>;

    async fn list_chunks(&self, version_id: VersionId) -> Result<Vec<Chunk>, CatalogError>;

    async fn chunk(
        &self,
        version_id: VersionId,
        chunk_index: usize,
    ) -> Result<Option<Chunk>, CatalogError>;

    async fn set_current_version(
        &self,
        document_id: DocumentId,
        version_id: VersionId,
    ) -> Result<(), CatalogError>;

    async fn record_snapshot(&self, version_id: VersionId, path: &Path) -> Result<(), CatalogError>;

    async fn current_version_ids(&self, owner: Option<i64>) -> Result<Vec<VersionId>, CatalogError>;
}
