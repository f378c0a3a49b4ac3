use crate::embeddings::{probe_provider, Embedder, ProviderAvailability};
use crate::error::{EmbedError, SearchError};
use crate::lexical::LexicalModel;
use crate::models::{RetrievalSettings, SemanticMode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const SNAPSHOT_FORMAT: &str = "docuhelp-index";
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedIndex {
    pub index: usize,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    Semantic,
    Lexical,
}

/// Orders scores descending, earlier indices first on ties, and keeps at most `top_k`.
pub fn rank_scores(scores: &[f32], top_k: usize) -> Vec<RankedIndex> {
    let mut ranked: Vec<RankedIndex> = scores
        .iter()
        .enumerate()
        .map(|(index, score)| RankedIndex {
            index,
            score: *score,
        })
        .collect();
    ranked.sort_by(|left, right| right.score.total_cmp(&left.score));
    ranked.truncate(top_k.min(scores.len()));
    ranked
}

pub trait Retriever {
    fn mode(&self) -> RetrievalMode;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn similarities(
        &self,
        query: &str,
        encoder: Option<&dyn Embedder>,
    ) -> Result<Vec<f32>, SearchError>;

    fn search(
        &self,
        query: &str,
        top_k: usize,
        encoder: Option<&dyn Embedder>,
    ) -> Result<Vec<RankedIndex>, SearchError> {
        if self.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        Ok(rank_scores(&self.similarities(query, encoder)?, top_k))
    }
}

impl Retriever for LexicalModel {
    fn mode(&self) -> RetrievalMode {
        RetrievalMode::Lexical
    }

    fn len(&self) -> usize {
        LexicalModel::len(self)
    }

    fn similarities(
        &self,
        query: &str,
        _encoder: Option<&dyn Embedder>,
    ) -> Result<Vec<f32>, SearchError> {
        Ok(LexicalModel::similarities(self, query))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticModel {
    provider: String,
    dimensions: usize,
    rows: Vec<Vec<f32>>,
}

impl SemanticModel {
    pub fn fit(texts: &[String], encoder: &dyn Embedder) -> Result<Self, EmbedError> {
        let rows = encoder.embed_batch(texts)?;
        if rows.len() != texts.len() {
            return Err(EmbedError::BackendResponse {
                provider: encoder.name().to_string(),
                details: format!("{} vectors for {} texts", rows.len(), texts.len()),
            });
        }

        Ok(Self {
            provider: encoder.name().to_string(),
            dimensions: encoder.dimensions(),
            rows,
        })
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn is_compatible_with(&self, encoder: &dyn Embedder) -> bool {
        encoder.name() == self.provider && encoder.dimensions() == self.dimensions
    }
}

impl Retriever for SemanticModel {
    fn mode(&self) -> RetrievalMode {
        RetrievalMode::Semantic
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    fn similarities(
        &self,
        query: &str,
        encoder: Option<&dyn Embedder>,
    ) -> Result<Vec<f32>, SearchError> {
        let encoder = encoder
            .filter(|encoder| self.is_compatible_with(*encoder))
            .ok_or_else(|| {
                EmbedError::Unavailable(format!("no encoder matching {}", self.provider))
            })?;

        let query = encoder.embed(query)?;
        Ok(self
            .rows
            .iter()
            .map(|row| row.iter().zip(&query).map(|(a, b)| a * b).sum::<f32>())
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RetrievalModel {
    Semantic(SemanticModel),
    Lexical(LexicalModel),
}

#[derive(Serialize, Deserialize)]
struct SnapshotEnvelope<M> {
    format: String,
    format_version: u32,
    model: M,
}

impl RetrievalModel {
    pub fn fit_lexical(texts: &[String]) -> Self {
        Self::Lexical(LexicalModel::fit(texts))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SearchError> {
        let envelope = SnapshotEnvelope {
            format: SNAPSHOT_FORMAT.to_string(),
            format_version: SNAPSHOT_FORMAT_VERSION,
            model: self,
        };
        Ok(serde_json::to_vec(&envelope)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SearchError> {
        let envelope: SnapshotEnvelope<serde_json::Value> = serde_json::from_slice(bytes)?;
        if envelope.format != SNAPSHOT_FORMAT {
            return Err(SearchError::Snapshot(format!(
                "unknown format {}",
                envelope.format
            )));
        }
        if envelope.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(SearchError::Snapshot(format!(
                "format version {} is not {}",
                envelope.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }
        Ok(serde_json::from_value(envelope.model)?)
    }

    fn inner(&self) -> &dyn Retriever {
        match self {
            Self::Semantic(model) => model,
            Self::Lexical(model) => model,
        }
    }
}

impl Retriever for RetrievalModel {
    fn mode(&self) -> RetrievalMode {
        self.inner().mode()
    }

    fn len(&self) -> usize {
        self.inner().len()
    }

    fn similarities(
        &self,
        query: &str,
        encoder: Option<&dyn Embedder>,
    ) -> Result<Vec<f32>, SearchError> {
        self.inner().similarities(query, encoder)
    }
}

#[derive(Debug, Clone)]
pub struct RetrievalBackend {
    mode: SemanticMode,
    availability: ProviderAvailability,
}

impl RetrievalBackend {
    pub fn from_settings(settings: &RetrievalSettings) -> Self {
        Self::new(settings.semantic, probe_provider(settings))
    }

    pub fn new(mode: SemanticMode, availability: ProviderAvailability) -> Self {
        let availability = if mode == SemanticMode::Off {
            ProviderAvailability::Disabled
        } else {
            availability
        };
        Self { mode, availability }
    }

    pub fn lexical() -> Self {
        Self::new(SemanticMode::Off, ProviderAvailability::Disabled)
    }

    pub fn availability(&self) -> &ProviderAvailability {
        &self.availability
    }

    fn encoder(&self) -> Option<&dyn Embedder> {
        self.availability.provider().map(|provider| provider.as_ref())
    }

    pub fn preferred_mode(&self) -> RetrievalMode {
        match self.encoder() {
            Some(_) => RetrievalMode::Semantic,
            None => RetrievalMode::Lexical,
        }
    }

    /// Fits a semantic model when an encoder is available, lexical otherwise.
    /// Encoder failures fall back to lexical and never reach the caller.
    pub fn fit(&self, texts: &[String]) -> RetrievalModel {
        if let Some(encoder) = self.encoder() {
            match SemanticModel::fit(texts, encoder) {
                Ok(model) => return RetrievalModel::Semantic(model),
                Err(error) => warn!(
                    provider = encoder.name(),
                    mode = ?self.mode,
                    error = %error,
                    "semantic fit failed, falling back to lexical"
                ),
            }
        }
        RetrievalModel::fit_lexical(texts)
    }

    pub fn can_serve(&self, model: &RetrievalModel) -> bool {
        match model {
            RetrievalModel::Lexical(_) => true,
            RetrievalModel::Semantic(semantic) => self
                .encoder()
                .is_some_and(|encoder| semantic.is_compatible_with(encoder)),
        }
    }

    pub fn search(
        &self,
        model: &RetrievalModel,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RankedIndex>, SearchError> {
        let hits = model.search(query, top_k, self.encoder())?;
        debug!(mode = ?model.mode(), top_k, hits = hits.len(), "retrieval search");
        Ok(hits)
    }
}
