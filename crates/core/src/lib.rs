pub mod catalog;
pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod lexical;
pub mod models;
pub mod orchestrator;
pub mod retrieval;
pub mod store;
pub mod traits;

pub use catalog::MemoryCatalog;
pub use chunking::{chunk_pages, chunk_text, normalize_whitespace, ChunkingConfig, TextWindow};
pub use embeddings::{
    probe_provider, CharacterNgramEmbedder, Embedder, HttpEmbedder, ProviderAvailability,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{CatalogError, EmbedError, IngestError, SearchError};
pub use extractor::{extract_by_mime, FileExtractor, SourceFormat, TextExtractor};
pub use ingest::{
    digest_file, discover_documents, ingest_document, ingest_pages, register_document,
    IngestReport,
};
pub use lexical::{LexicalModel, TfidfVectorizer};
pub use models::{
    Answer, Chunk, ChunkDraft, Citation, Document, DocumentId, DocumentStatus, DocumentVersion,
    EmbeddingProvider, IngestionOptions, RetrievalSettings, SearchEnvelope, SearchResultItem,
    SemanticMode, VersionHit, VersionId,
};
pub use orchestrator::{merge_hits, SearchCoordinator, MAX_ANSWER_PASSAGES, NO_PASSAGE_TEXT};
pub use retrieval::{
    RankedIndex, RetrievalBackend, RetrievalMode, RetrievalModel, Retriever, SemanticModel,
};
pub use store::{BuiltSnapshot, IndexStore};
pub use traits::Catalog;
