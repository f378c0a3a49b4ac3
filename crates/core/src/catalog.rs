use crate::error::CatalogError;
use crate::models::{
    Chunk, Document, DocumentId, DocumentStatus, DocumentVersion, NewDocument, NewVersion,
    VersionId,
};
use crate::traits::Catalog;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogState {
    next_document_id: DocumentId,
    next_version_id: VersionId,
    documents: BTreeMap<DocumentId, Document>,
    versions: BTreeMap<VersionId, DocumentVersion>,
    chunks: BTreeMap<VersionId, Vec<Chunk>>,
}

#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: RwLock<CatalogState>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let state = match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => CatalogState::default(),
            Err(error) => return Err(error.into()),
        };
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), CatalogError> {
        let bytes = serde_json::to_vec_pretty(&*self.read()?)?;
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)?;
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, CatalogState>, CatalogError> {
        self.state
            .read()
            .map_err(|error| CatalogError::Backend(error.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, CatalogState>, CatalogError> {
        self.state
            .write()
            .map_err(|error| CatalogError::Backend(error.to_string()))
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn create_document(&self, document: NewDocument) -> Result<Document, CatalogError> {
        let mut state = self.write()?;
        state.next_document_id += 1;
        let created = Document {
            id: state.next_document_id,
            owner_id: document.owner_id,
            name: document.name,
            path: document.path,
            mime: document.mime,
            size: document.size,
            checksum: document.checksum,
            status: DocumentStatus::Uploaded,
            uploaded_at: Utc::now(),
            current_version_id: None,
        };
        state.documents.insert(created.id, created.clone());
        Ok(created)
    }

    async fn resolve_document(&self, id: DocumentId) -> Result<Option<Document>, CatalogError> {
        Ok(self.read()?.documents.get(&id).cloned())
    }

    async fn list_documents(&self, owner: Option<i64>) -> Result<Vec<Document>, CatalogError> {
        Ok(self
            .read()?
            .documents
            .values()
            .filter(|document| owner.map_or(true, |owner| document.owner_id == owner))
            .cloned()
            .collect())
    }

    async fn resolve_version(&self, id: VersionId) -> Result<Option<DocumentVersion>, CatalogError> {
        Ok(self.read()?.versions.get(&id).cloned())
    }

    async fn latest_version(
        &self,
        document_id: DocumentId,
    ) -> Result<Option<DocumentVersion>, CatalogError> {
        Ok(self
            .read()?
            .versions
            .values()
            .filter(|version| version.document_id == document_id)
            .max_by_key(|version| version.version_number)
            .cloned())
    }

    async fn create_version(&self, version: NewVersion) -> Result<DocumentVersion, CatalogError> {
        let mut state = self.write()?;
        if !state.documents.contains_key(&version.document_id) {
            return Err(CatalogError::NotFound {
                entity: "document",
                id: version.document_id,
            });
        }

        state.next_version_id += 1;
        let created = DocumentVersion {
            id: state.next_version_id,
            document_id: version.document_id,
            version_number: version.version_number,
            text_len: version.text_len,
            chunk_count: version.chunk_count,
            source_checksum: version.source_checksum,
            created_at: Utc::now(),
        };
        state.versions.insert(created.id, created.clone());
        Ok(created)
    }

    async fn insert_chunks(&self, version_id: VersionId, chunks: Vec<Chunk>) -> Result<(), CatalogError> {
        let mut state = self.write()?;
        if !state.versions.contains_key(&version_id) {
            return Err(CatalogError::NotFound {
                entity: "version",
                id: version_id,
            });
        }

        let stored = state.chunks.entry(version_id).or_default();
        stored.extend(chunks);
        stored.sort_by_key(|chunk| chunk.chunk_index);
        Ok(())
    }

    async fn list_chunks(&self, version_id: VersionId) -> Result<Vec<Chunk>, CatalogError> {
        Ok(self
            .read()?
            .chunks
            .get(&version_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn chunk(
        &self,
        version_id: VersionId,
        chunk_index: usize,
    ) -> Result<Option<Chunk>, CatalogError> {
        Ok(self.read()?.chunks.get(&version_id).and_then(|chunks| {
            chunks
                .iter()
                .find(|chunk| chunk.chunk_index == chunk_index)
                .cloned()
        }))
    }

    async fn set_current_version(
        &self,
        document_id: DocumentId,
        version_id: VersionId,
    ) -> Result<(), CatalogError> {
        let mut state = self.write()?;
        let document = state
            .documents
            .get_mut(&document_id)
            .ok_or(CatalogError::NotFound {
                entity: "document",
                id: document_id,
            })?;
        document.current_version_id = Some(version_id);
        document.status = DocumentStatus::Processed;
        Ok(())
    }

    async fn record_snapshot(&self, version_id: VersionId, path: &Path) -> Result<(), CatalogError> {
        let mut state = self.write()?;
        if let Some(chunks) = state.chunks.get_mut(&version_id) {
            for chunk in chunks {
                chunk.snapshot = Some(path.to_path_buf());
            }
        }
        Ok(())
    }

    async fn current_version_ids(&self, owner: Option<i64>) -> Result<Vec<VersionId>, CatalogError> {
        Ok(self
            .read()?
            .documents
            .values()
            .filter(|document| owner.map_or(true, |owner| document.owner_id == owner))
            .filter_map(|document| document.current_version_id)
            .collect())
    }
}
