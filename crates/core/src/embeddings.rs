use crate::error::EmbedError;
use crate::models::{EmbeddingProvider, RetrievalSettings, SemanticMode};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;
    fn dimensions(&self) -> usize;
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

pub fn l2_normalize(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl Embedder for CharacterNgramEmbedder {
    fn name(&self) -> &str {
        "ngram-hash"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return Ok(vector);
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        l2_normalize(&mut vector);
        Ok(vector)
    }
}

#[derive(Debug, Clone, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Option<Vec<EmbeddingItem>>,
    #[serde(default)]
    embeddings: Option<Vec<Vec<f32>>>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

pub struct HttpEmbedder {
    endpoint: Url,
    model: String,
    api_key: Option<String>,
    client: Client,
    dimensions: usize,
}

impl HttpEmbedder {
    pub fn connect(
        endpoint: &str,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, EmbedError> {
        let mut embedder = Self {
            endpoint: Url::parse(endpoint.trim())?,
            model: model.into(),
            api_key,
            client: Client::new(),
            dimensions: 0,
        };

        let probe = embedder.request(&["probe".to_string()])?;
        embedder.dimensions = probe.first().map(Vec::len).unwrap_or_default();
        if embedder.dimensions == 0 {
            return Err(EmbedError::BackendResponse {
                provider: embedder.model.clone(),
                details: "probe returned an empty vector".to_string(),
            });
        }

        Ok(embedder)
    }

    fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        block_on_runtime(self.request_async(texts))
    }

    async fn request_async(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header("content-type", "application/json")
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            });

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(EmbedError::BackendResponse {
                provider: self.model.clone(),
                details: format!("{} returned {}", self.endpoint, response.status()),
            });
        }

        let payload: EmbeddingResponse = response.json().await?;
        let mut vectors = payload_to_vectors(payload, &self.model)?;
        if vectors.len() != texts.len() {
            return Err(EmbedError::BackendResponse {
                provider: self.model.clone(),
                details: format!("{} vectors for {} inputs", vectors.len(), texts.len()),
            });
        }

        for vector in &mut vectors {
            l2_normalize(vector);
        }
        Ok(vectors)
    }
}

/// Drives an http future from synchronous retrieval code. Needs a multi-threaded runtime.
fn block_on_runtime<F, T>(future: F) -> Result<T, EmbedError>
where
    F: std::future::Future<Output = Result<T, EmbedError>>,
{
    let handle = tokio::runtime::Handle::try_current()
        .map_err(|error| EmbedError::Unavailable(error.to_string()))?;
    if handle.runtime_flavor() != tokio::runtime::RuntimeFlavor::MultiThread {
        return Err(EmbedError::Unavailable(
            "http embeddings need a multi-threaded runtime".to_string(),
        ));
    }
    tokio::task::block_in_place(|| handle.block_on(future))
}

fn payload_to_vectors(payload: EmbeddingResponse, model: &str) -> Result<Vec<Vec<f32>>, EmbedError> {
    if let Some(items) = payload.data {
        return Ok(items.into_iter().map(|item| item.embedding).collect());
    }

    payload.embeddings.ok_or_else(|| EmbedError::BackendResponse {
        provider: model.to_string(),
        details: "response has neither `data` nor `embeddings`".to_string(),
    })
}

impl Embedder for HttpEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vectors = self.embed_batch(&[text.to_string()])?;
        vectors.pop().ok_or_else(|| EmbedError::BackendResponse {
            provider: self.model.clone(),
            details: "empty response".to_string(),
        })
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self.request(texts)?;
        if let Some(vector) = vectors.iter().find(|vector| vector.len() != self.dimensions) {
            return Err(EmbedError::Dimension {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        Ok(vectors)
    }
}

pub type SharedEmbedder = Arc<dyn Embedder>;

#[derive(Clone)]
pub enum ProviderAvailability {
    Available(SharedEmbedder),
    Disabled,
    Unavailable(String),
}

impl ProviderAvailability {
    pub fn provider(&self) -> Option<&SharedEmbedder> {
        match self {
            Self::Available(provider) => Some(provider),
            Self::Disabled | Self::Unavailable(_) => None,
        }
    }
}

impl std::fmt::Debug for ProviderAvailability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available(provider) => f
                .debug_tuple("Available")
                .field(&provider.name())
                .finish(),
            Self::Disabled => f.write_str("Disabled"),
            Self::Unavailable(reason) => f.debug_tuple("Unavailable").field(reason).finish(),
        }
    }
}

pub fn probe_provider(settings: &RetrievalSettings) -> ProviderAvailability {
    if settings.semantic == SemanticMode::Off {
        return ProviderAvailability::Disabled;
    }

    let availability = match settings.embeddings_provider {
        EmbeddingProvider::Ngram => {
            ProviderAvailability::Available(Arc::new(CharacterNgramEmbedder::default()))
        }
        EmbeddingProvider::Http => match settings
            .embeddings_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|endpoint| !endpoint.is_empty())
        {
            None => ProviderAvailability::Unavailable("no embeddings endpoint configured".to_string()),
            Some(endpoint) => match HttpEmbedder::connect(
                endpoint,
                settings.embeddings_model.clone(),
                settings.embeddings_api_key.clone(),
            ) {
                Ok(embedder) => ProviderAvailability::Available(Arc::new(embedder)),
                Err(error) => ProviderAvailability::Unavailable(error.to_string()),
            },
        },
    };

    match &availability {
        ProviderAvailability::Available(provider) => info!(
            provider = provider.name(),
            dimensions = provider.dimensions(),
            "semantic embeddings available"
        ),
        ProviderAvailability::Unavailable(reason) => {
            warn!(reason = %reason, "semantic embeddings unavailable, using lexical retrieval")
        }
        ProviderAvailability::Disabled => {}
    }

    availability
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedder_is_deterministic() -> Result<(), EmbedError> {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed("Hydraulic pressure and flow")?;
        let second = embedder.embed("Hydraulic pressure and flow")?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn embedder_outputs_expected_length_and_unit_norm() -> Result<(), EmbedError> {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed("abcdef")?;
        assert_eq!(vector.len(), 32);
        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn response_payload_accepts_both_shapes() -> Result<(), Box<dyn std::error::Error>> {
        let openai: EmbeddingResponse =
            serde_json::from_str(r#"{"data":[{"embedding":[1.0,0.0]},{"embedding":[0.0,1.0]}]}"#)?;
        assert_eq!(payload_to_vectors(openai, "m")?.len(), 2);

        let plain: EmbeddingResponse = serde_json::from_str(r#"{"embeddings":[[0.5,0.5]]}"#)?;
        assert_eq!(payload_to_vectors(plain, "m")?, vec![vec![0.5, 0.5]]);

        let empty: EmbeddingResponse = serde_json::from_str("{}")?;
        assert!(payload_to_vectors(empty, "m").is_err());
        Ok(())
    }

    #[test]
    fn probe_respects_off_and_missing_endpoint() {
        let mut settings = RetrievalSettings {
            semantic: SemanticMode::Off,
            embeddings_provider: EmbeddingProvider::Ngram,
            ..RetrievalSettings::default()
        };
        assert!(matches!(probe_provider(&settings), ProviderAvailability::Disabled));

        settings.semantic = SemanticMode::Auto;
        assert!(probe_provider(&settings).provider().is_some());

        settings.embeddings_provider = EmbeddingProvider::Http;
        settings.embeddings_endpoint = None;
        assert!(matches!(
            probe_provider(&settings),
            ProviderAvailability::Unavailable(_)
        ));
    }
}
