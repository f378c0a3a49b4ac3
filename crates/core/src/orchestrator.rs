use crate::error::SearchError;
use crate::models::{
    Answer, Citation, SearchEnvelope, SearchResultItem, VersionHit, VersionId,
};
use crate::retrieval::{RetrievalBackend, RetrievalModel, Retriever};
use crate::store::{ordered_texts, BuiltSnapshot, IndexStore};
use crate::traits::Catalog;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const MAX_ANSWER_PASSAGES: usize = 2;

pub const NO_PASSAGE_TEXT: &str = "No relevant passage found.";

pub const SNIPPET_CHARS: usize = 240;

pub struct SearchCoordinator<C>
where
    C: Catalog,
{
    catalog: C,
    store: IndexStore,
    backend: RetrievalBackend,
}

impl<C> SearchCoordinator<C>
where
    C: Catalog,
{
    pub fn new(catalog: C, store: IndexStore, backend: RetrievalBackend) -> Self {
        Self {
            catalog,
            store,
            backend,
        }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn backend(&self) -> &RetrievalBackend {
        &self.backend
    }

    pub async fn build_index(&self, version_id: VersionId) -> Result<BuiltSnapshot, SearchError> {
        let chunks = self.catalog.list_chunks(version_id).await?;
        let built = self.store.build(version_id, &chunks, &self.backend)?;
        self.catalog.record_snapshot(version_id, &built.path).await?;
        Ok(built)
    }

    /// Ranks passages across `version_ids`.
    ///
    /// Each version contributes only its own best `k` hits before the global
    /// merge, so a version holding many strong matches can crowd out fewer of
    /// them than a true global top-k would.
    pub async fn search_versions(
        &self,
        query: &str,
        version_ids: &[VersionId],
        k: usize,
    ) -> Result<Vec<VersionHit>, SearchError> {
        let mut collected = Vec::new();

        for &version_id in version_ids {
            let chunks = self.catalog.list_chunks(version_id).await?;
            if chunks.is_empty() {
                continue;
            }

            let texts = ordered_texts(&chunks);
            let model = self.model_for(version_id, &texts);
            let hits = match self.backend.search(&model, query, k) {
                Ok(hits) => hits,
                Err(error) => {
                    warn!(version_id, error = %error, "search failed, retrying lexically");
                    self.backend
                        .search(&RetrievalModel::fit_lexical(&texts), query, k)?
                }
            };

            debug!(version_id, hits = hits.len(), "version searched");
            collected.extend(hits.into_iter().filter_map(|hit| {
                chunks
                    .get(hit.index)
                    .map(|chunk| VersionHit::new(version_id, chunk.chunk_index, hit.score))
            }));
        }

        Ok(merge_hits(collected, k))
    }

    fn model_for(&self, version_id: VersionId, texts: &[String]) -> RetrievalModel {
        match self.store.load_version(version_id) {
            Some(model) if self.backend.can_serve(&model) && model.len() == texts.len() => model,
            Some(_) => {
                warn!(version_id, "index snapshot is stale, fitting in memory");
                self.backend.fit(texts)
            }
            None => {
                debug!(version_id, "no index snapshot, fitting in memory");
                self.backend.fit(texts)
            }
        }
    }

    pub async fn synthesize(&self, hits: &[VersionHit]) -> Result<Answer, SearchError> {
        let mut texts = Vec::new();
        let mut citations = Vec::new();

        for hit in hits.iter().take(MAX_ANSWER_PASSAGES) {
            let Some(version) = self.catalog.resolve_version(hit.version_id).await? else {
                continue;
            };
            let Some(document) = self.catalog.resolve_document(version.document_id).await? else {
                continue;
            };
            let Some(chunk) = self.catalog.chunk(hit.version_id, hit.chunk_index).await? else {
                continue;
            };

            citations.push(Citation {
                doc_id: document.id,
                title: document.name,
                version: version.version_number,
                page: chunk.page.unwrap_or(1),
                score: hit.score,
            });
            texts.push(chunk.content);
        }

        let text = if texts.is_empty() {
            NO_PASSAGE_TEXT.to_string()
        } else {
            texts.join("\n\n")
        };
        let confidence = if citations.is_empty() {
            0.0
        } else {
            citations.iter().map(|citation| citation.score).sum::<f32>() / citations.len() as f32
        };

        Ok(Answer {
            text,
            confidence,
            citations,
        })
    }

    pub async fn answer(
        &self,
        question: &str,
        owner: Option<i64>,
        k: usize,
    ) -> Result<Answer, SearchError> {
        let version_ids = self.catalog.current_version_ids(owner).await?;
        let hits = self.search_versions(question, &version_ids, k).await?;
        let answer = self.synthesize(&hits).await?;

        info!(
            target: "audit",
            action = "answer",
            resource = "qa",
            user = ?owner,
            q = question,
            confidence = answer.confidence,
            citations = answer.citations.len(),
            "answer served"
        );
        Ok(answer)
    }

    pub async fn search(
        &self,
        query: &str,
        owner: Option<i64>,
        k: usize,
    ) -> Result<SearchEnvelope, SearchError> {
        let started = Instant::now();
        let version_ids = self.catalog.current_version_ids(owner).await?;
        let hits = self.search_versions(query, &version_ids, k).await?;

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let Some(version) = self.catalog.resolve_version(hit.version_id).await? else {
                continue;
            };
            let Some(document) = self.catalog.resolve_document(version.document_id).await? else {
                continue;
            };
            let chunk = self.catalog.chunk(hit.version_id, hit.chunk_index).await?;

            results.push(SearchResultItem {
                doc_id: document.id,
                title: document.name,
                version: version.version_number,
                page: chunk.as_ref().and_then(|chunk| chunk.page).unwrap_or(1),
                snippet: chunk
                    .map(|chunk| chunk.content.chars().take(SNIPPET_CHARS).collect())
                    .unwrap_or_default(),
                score: hit.score,
            });
        }

        let elapsed = started.elapsed().as_secs_f64();
        info!(
            target: "audit",
            action = "search",
            resource = "document",
            user = ?owner,
            q = query,
            k,
            elapsed,
            hits = results.len(),
            "search served"
        );

        Ok(SearchEnvelope {
            total_results: results.len(),
            results,
            query_time_secs: elapsed,
        })
    }
}

/// Sorts by score descending, keeping first-seen order on ties, and keeps `k`.
pub fn merge_hits(mut hits: Vec<VersionHit>, k: usize) -> Vec<VersionHit> {
    hits.sort_by(|left, right| right.score.total_cmp(&left.score));
    hits.truncate(k);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::embeddings::{CharacterNgramEmbedder, Embedder, ProviderAvailability};
    use crate::error::EmbedError;
    use crate::models::{Chunk, DocumentId, NewDocument, NewVersion, SemanticMode};
    use crate::retrieval::{RetrievalMode, SemanticModel};
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _dir: TempDir,
        coordinator: SearchCoordinator<MemoryCatalog>,
    }

    fn fixture() -> Result<Fixture, Box<dyn std::error::Error>> {
        fixture_with(RetrievalBackend::lexical())
    }

    fn fixture_with(backend: RetrievalBackend) -> Result<Fixture, Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = IndexStore::open(dir.path())?;
        Ok(Fixture {
            coordinator: SearchCoordinator::new(MemoryCatalog::new(), store, backend),
            _dir: dir,
        })
    }

    // Fits fine in bulk, fails for every single query.
    struct QueryFailingEmbedder;

    impl Embedder for QueryFailingEmbedder {
        fn name(&self) -> &str {
            "query-failing"
        }

        fn dimensions(&self) -> usize {
            4
        }

        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            Err(EmbedError::Unavailable("endpoint went away".to_string()))
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            Ok(texts.iter().map(|_| vec![0.5; 4]).collect())
        }
    }

    async fn add_version(
        catalog: &MemoryCatalog,
        owner_id: i64,
        name: &str,
        passages: &[&str],
    ) -> Result<(DocumentId, VersionId), Box<dyn std::error::Error>> {
        let document = catalog
            .create_document(NewDocument {
                owner_id,
                name: name.to_string(),
                path: PathBuf::from(name),
                mime: "text/plain".to_string(),
                size: 0,
                checksum: String::new(),
            })
            .await?;
        let version = catalog
            .create_version(NewVersion {
                document_id: document.id,
                version_number: 1,
                text_len: 0,
                chunk_count: passages.len(),
                source_checksum: String::new(),
            })
            .await?;
        let chunks = passages
            .iter()
            .enumerate()
            .map(|(chunk_index, content)| Chunk {
                version_id: version.id,
                chunk_index,
                content: content.to_string(),
                page: Some(chunk_index as u32 + 1),
                start_char: 0,
                end_char: content.chars().count(),
                snapshot: None,
            })
            .collect();
        catalog.insert_chunks(version.id, chunks).await?;
        catalog.set_current_version(document.id, version.id).await?;
        Ok((document.id, version.id))
    }

    #[test]
    fn merge_keeps_the_global_best() {
        let merged = merge_hits(
            vec![
                VersionHit::new(1, 0, 0.9),
                VersionHit::new(1, 1, 0.2),
                VersionHit::new(2, 0, 0.8),
            ],
            2,
        );
        assert_eq!(merged, vec![VersionHit::new(1, 0, 0.9), VersionHit::new(2, 0, 0.8)]);
    }

    #[test]
    fn merge_keeps_first_seen_order_on_ties() {
        let merged = merge_hits(
            vec![
                VersionHit::new(4, 2, 0.5),
                VersionHit::new(1, 0, 0.5),
                VersionHit::new(4, 0, 0.7),
            ],
            5,
        );
        let order: Vec<_> = merged.iter().map(|hit| (hit.version_id, hit.chunk_index)).collect();
        assert_eq!(order, vec![(4, 0), (4, 2), (1, 0)]);
    }

    #[tokio::test]
    async fn search_spans_versions_and_skips_empty_ones() -> Result<(), Box<dyn std::error::Error>> {
        let fixture = fixture()?;
        let catalog = fixture.coordinator.catalog();
        let (_, pumps) = add_version(
            catalog,
            1,
            "pumps.txt",
            &["hydraulic pump pressure", "pump oil change interval", "warranty card"],
        )
        .await?;
        let (_, wiring) = add_version(
            catalog,
            1,
            "wiring.txt",
            &["fuse box wiring", "breaker panel labels", "hydraulic lift wiring"],
        )
        .await?;
        let (_, empty) = add_version(catalog, 1, "empty.txt", &[]).await?;

        let hits = fixture
            .coordinator
            .search_versions("hydraulic", &[pumps, empty, wiring], 2)
            .await?;

        assert_eq!(hits.len(), 2);
        assert!(hits.iter().any(|hit| hit.version_id == pumps && hit.chunk_index == 0));
        assert!(hits.iter().any(|hit| hit.version_id == wiring && hit.chunk_index == 2));
        assert!(hits[0].score >= hits[1].score);
        Ok(())
    }

    #[tokio::test]
    async fn empty_version_contributes_nothing() -> Result<(), Box<dyn std::error::Error>> {
        let fixture = fixture()?;
        let (_, empty) = add_version(fixture.coordinator.catalog(), 1, "empty.txt", &[]).await?;
        let hits = fixture.coordinator.search_versions("anything", &[empty, 404], 5).await?;
        assert!(hits.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn persisted_and_in_memory_indexes_agree() -> Result<(), Box<dyn std::error::Error>> {
        let fixture = fixture()?;
        let (_, version) = add_version(
            fixture.coordinator.catalog(),
            1,
            "manual.txt",
            &["relief valve pressure", "oil filter", "pressure gauge reading"],
        )
        .await?;

        let before = fixture.coordinator.search_versions("pressure", &[version], 3).await?;
        let built = fixture.coordinator.build_index(version).await?;
        assert_eq!(built.mode, RetrievalMode::Lexical);
        let after = fixture.coordinator.search_versions("pressure", &[version], 3).await?;

        assert_eq!(before.len(), after.len());
        for (left, right) in before.iter().zip(&after) {
            assert_eq!(left.chunk_index, right.chunk_index);
            assert!((left.score - right.score).abs() < 1e-6);
        }

        let chunks = fixture.coordinator.catalog().list_chunks(version).await?;
        assert!(chunks.iter().all(|chunk| chunk.snapshot.as_ref() == Some(&built.path)));
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_snapshot_falls_back_to_rebuild() -> Result<(), Box<dyn std::error::Error>> {
        let fixture = fixture()?;
        let (_, version) = add_version(
            fixture.coordinator.catalog(),
            1,
            "manual.txt",
            &["relief valve pressure", "oil filter"],
        )
        .await?;
        std::fs::write(fixture.coordinator.store().path_for(version), b"{broken")?;

        let hits = fixture.coordinator.search_versions("filter", &[version], 1).await?;
        assert_eq!(hits[0].chunk_index, 1);
        Ok(())
    }

    #[tokio::test]
    async fn foreign_semantic_snapshot_is_refit_lexically() -> Result<(), Box<dyn std::error::Error>> {
        let fixture = fixture()?;
        let passages = ["oil filter", "relief valve pressure"];
        let (_, version) =
            add_version(fixture.coordinator.catalog(), 1, "manual.txt", &passages).await?;
        let texts: Vec<String> = passages.iter().map(|text| text.to_string()).collect();
        let semantic = SemanticModel::fit(&texts, &CharacterNgramEmbedder::default())?;
        fixture
            .coordinator
            .store()
            .save(version, &RetrievalModel::Semantic(semantic))?;

        let hits = fixture.coordinator.search_versions("pressure", &[version], 2).await?;

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_index, 1);
        assert!(hits[0].score > 0.0);
        assert_eq!(hits[1].score, 0.0);

        let on_disk = fixture.coordinator.store().load_version(version);
        assert!(matches!(on_disk, Some(RetrievalModel::Semantic(_))));
        Ok(())
    }

    #[tokio::test]
    async fn snapshot_with_wrong_row_count_is_refit() -> Result<(), Box<dyn std::error::Error>> {
        let fixture = fixture()?;
        let (_, version) = add_version(
            fixture.coordinator.catalog(),
            1,
            "manual.txt",
            &["relief valve pressure", "oil filter"],
        )
        .await?;
        let stale = RetrievalModel::fit_lexical(&["oil filter".to_string()]);
        fixture.coordinator.store().save(version, &stale)?;

        let hits = fixture.coordinator.search_versions("pressure", &[version], 2).await?;

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_index, 0);
        assert!(hits[0].score > 0.0);
        Ok(())
    }

    #[tokio::test]
    async fn query_embedding_failure_retries_lexically() -> Result<(), Box<dyn std::error::Error>> {
        let backend = RetrievalBackend::new(
            SemanticMode::On,
            ProviderAvailability::Available(Arc::new(QueryFailingEmbedder)),
        );
        let fixture = fixture_with(backend)?;
        let (_, version) = add_version(
            fixture.coordinator.catalog(),
            1,
            "manual.txt",
            &["relief valve pressure", "oil filter", "pressure gauge reading"],
        )
        .await?;

        let built = fixture.coordinator.build_index(version).await?;
        assert_eq!(built.mode, RetrievalMode::Semantic);

        let hits = fixture.coordinator.search_versions("filter", &[version], 1).await?;

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_index, 1);
        assert!(hits[0].score > 0.0);
        Ok(())
    }

    #[tokio::test]
    async fn answer_uses_at_most_two_passages() -> Result<(), Box<dyn std::error::Error>> {
        let fixture = fixture()?;
        let (document_id, version) = add_version(
            fixture.coordinator.catalog(),
            1,
            "guide.txt",
            &["one", "two", "three", "four", "five"],
        )
        .await?;
        let hits: Vec<_> = [0.9, 0.7, 0.5, 0.3, 0.1]
            .iter()
            .enumerate()
            .map(|(index, score)| VersionHit::new(version, index, *score))
            .collect();

        let answer = fixture.coordinator.synthesize(&hits).await?;

        assert_eq!(answer.text, "one\n\ntwo");
        assert_eq!(answer.citations.len(), 2);
        assert!((answer.confidence - 0.8).abs() < 1e-6);
        assert_eq!(answer.citations[0].doc_id, document_id);
        assert_eq!(answer.citations[0].title, "guide.txt");
        assert_eq!(answer.citations[1].page, 2);
        Ok(())
    }

    #[tokio::test]
    async fn unresolvable_hits_are_dropped() -> Result<(), Box<dyn std::error::Error>> {
        let fixture = fixture()?;
        let (_, version) =
            add_version(fixture.coordinator.catalog(), 1, "guide.txt", &["kept passage"]).await?;
        let hits = vec![
            VersionHit::new(999, 0, 0.95),
            VersionHit::new(version, 0, 0.4),
            VersionHit::new(version, 0, 0.1),
        ];

        let answer = fixture.coordinator.synthesize(&hits).await?;
        assert_eq!(answer.text, "kept passage");
        assert!((answer.confidence - 0.4).abs() < 1e-6);

        let nothing = fixture.coordinator.synthesize(&[]).await?;
        assert_eq!(nothing.text, NO_PASSAGE_TEXT);
        assert_eq!(nothing.confidence, 0.0);
        assert!(nothing.citations.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn search_results_respect_the_owner_scope() -> Result<(), Box<dyn std::error::Error>> {
        let fixture = fixture()?;
        let long_passage = format!("turbine {}", "blade ".repeat(80));
        add_version(fixture.coordinator.catalog(), 1, "mine.txt", &[long_passage.as_str(), "other"]).await?;
        add_version(fixture.coordinator.catalog(), 2, "theirs.txt", &["turbine shaft", "misc"]).await?;

        let mine = fixture.coordinator.search("turbine", Some(1), 5).await?;
        assert!(mine.results.iter().all(|item| item.title == "mine.txt"));
        assert_eq!(mine.total_results, mine.results.len());
        assert_eq!(mine.results[0].snippet.chars().count(), SNIPPET_CHARS);

        let everyone = fixture.coordinator.search("turbine", None, 5).await?;
        assert!(everyone.results.iter().any(|item| item.title == "theirs.txt"));
        Ok(())
    }
}
