use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub type DocumentId = i64;
pub type VersionId = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Uploaded,
    Processed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub owner_id: i64,
    pub name: String,
    pub path: PathBuf,
    pub mime: String,
    pub size: u64,
    pub checksum: String,
    pub status: DocumentStatus,
    pub uploaded_at: DateTime<Utc>,
    pub current_version_id: Option<VersionId>,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub owner_id: i64,
    pub name: String,
    pub path: PathBuf,
    pub mime: String,
    pub size: u64,
    pub checksum: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentVersion {
    pub id: VersionId,
    pub document_id: DocumentId,
    pub version_number: u32,
    pub text_len: usize,
    pub chunk_count: usize,
    pub source_checksum: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewVersion {
    pub document_id: DocumentId,
    pub version_number: u32,
    pub text_len: usize,
    pub chunk_count: usize,
    pub source_checksum: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDraft {
    pub chunk_index: usize,
    pub content: String,
    pub page: Option<u32>,
    pub start_char: usize,
    pub end_char: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub version_id: VersionId,
    pub chunk_index: usize,
    pub content: String,
    pub page: Option<u32>,
    pub start_char: usize,
    pub end_char: usize,
    pub snapshot: Option<PathBuf>,
}

impl Chunk {
    pub fn from_draft(version_id: VersionId, draft: ChunkDraft) -> Self {
        Self {
            version_id,
            chunk_index: draft.chunk_index,
            content: draft.content,
            page: draft.page,
            start_char: draft.start_char,
            end_char: draft.end_char,
            snapshot: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VersionHit {
    pub version_id: VersionId,
    pub chunk_index: usize,
    pub score: f32,
}

impl VersionHit {
    pub fn new(version_id: VersionId, chunk_index: usize, score: f32) -> Self {
        Self {
            version_id,
            chunk_index,
            score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub doc_id: DocumentId,
    pub title: String,
    pub version: u32,
    pub page: u32,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub confidence: f32,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub doc_id: DocumentId,
    pub title: String,
    pub version: u32,
    pub page: u32,
    pub snippet: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchEnvelope {
    pub results: Vec<SearchResultItem>,
    pub total_results: usize,
    pub query_time_secs: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SemanticMode {
    Off,
    On,
    #[default]
    Auto,
}

impl std::str::FromStr for SemanticMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "on" => Ok(Self::On),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown semantic mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    #[default]
    Http,
    Ngram,
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "ngram" => Ok(Self::Ngram),
            other => Err(format!("unknown embeddings provider: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub semantic: SemanticMode,
    pub embeddings_provider: EmbeddingProvider,
    pub embeddings_endpoint: Option<String>,
    pub embeddings_api_key: Option<String>,
    pub embeddings_model: String,
    pub top_k: usize,
    pub index_dir: PathBuf,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            semantic: SemanticMode::Auto,
            embeddings_provider: EmbeddingProvider::Http,
            embeddings_endpoint: None,
            embeddings_api_key: None,
            embeddings_model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            top_k: 5,
            index_dir: PathBuf::from("storage/index"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_max_chars: usize,
    pub chunk_overlap_chars: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_max_chars: 800,
            chunk_overlap_chars: 80,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semantic_mode_parses_case_insensitively() {
        assert_eq!("OFF".parse::<SemanticMode>(), Ok(SemanticMode::Off));
        assert_eq!(" auto ".parse::<SemanticMode>(), Ok(SemanticMode::Auto));
        assert!("sometimes".parse::<SemanticMode>().is_err());
    }

    #[test]
    fn settings_deserialize_with_defaults() -> Result<(), serde_json::Error> {
        let settings: RetrievalSettings = serde_json::from_str(r#"{"semantic":"off","top_k":3}"#)?;
        assert_eq!(settings.semantic, SemanticMode::Off);
        assert_eq!(settings.top_k, 3);
        assert_eq!(settings.embeddings_provider, EmbeddingProvider::Http);
        Ok(())
    }
}
