use crate::error::SearchError;
use crate::models::{Chunk, VersionId};
use crate::retrieval::{RetrievalBackend, RetrievalMode, RetrievalModel, Retriever};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct BuiltSnapshot {
    pub path: PathBuf,
    pub mode: RetrievalMode,
    pub chunk_count: usize,
}

#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
}

impl IndexStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn open(root: impl Into<PathBuf>) -> Result<Self, SearchError> {
        let store = Self::new(root);
        fs::create_dir_all(&store.root)?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, version_id: VersionId) -> PathBuf {
        self.root.join(format!("{version_id}.index.json"))
    }

    pub fn save(&self, version_id: VersionId, model: &RetrievalModel) -> Result<PathBuf, SearchError> {
        fs::create_dir_all(&self.root)?;
        let path = self.path_for(version_id);
        let staging = self.root.join(format!("{version_id}.index.json.tmp"));
        fs::write(&staging, model.to_bytes()?)?;
        fs::rename(&staging, &path)?;
        Ok(path)
    }

    pub fn build(
        &self,
        version_id: VersionId,
        chunks: &[Chunk],
        backend: &RetrievalBackend,
    ) -> Result<BuiltSnapshot, SearchError> {
        let model = backend.fit(&ordered_texts(chunks));
        let path = self.save(version_id, &model)?;
        info!(
            version_id,
            chunks = chunks.len(),
            mode = ?model.mode(),
            path = %path.display(),
            "index snapshot built"
        );

        Ok(BuiltSnapshot {
            path,
            mode: model.mode(),
            chunk_count: model.len(),
        })
    }

    pub fn load(&self, path: &Path) -> Option<RetrievalModel> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return None,
            Err(error) => {
                warn!(path = %path.display(), error = %error, "index snapshot unreadable");
                return None;
            }
        };

        match RetrievalModel::from_bytes(&bytes) {
            Ok(model) => Some(model),
            Err(error) => {
                warn!(path = %path.display(), error = %error, "index snapshot rejected");
                None
            }
        }
    }

    pub fn load_version(&self, version_id: VersionId) -> Option<RetrievalModel> {
        self.load(&self.path_for(version_id))
    }
}

pub fn ordered_texts(chunks: &[Chunk]) -> Vec<String> {
    let mut ordered: Vec<&Chunk> = chunks.iter().collect();
    ordered.sort_by_key(|chunk| chunk.chunk_index);
    ordered.into_iter().map(|chunk| chunk.content.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn chunk(version_id: VersionId, chunk_index: usize, content: &str) -> Chunk {
        Chunk {
            version_id,
            chunk_index,
            content: content.to_string(),
            page: Some(1),
            start_char: 0,
            end_char: content.chars().count(),
            snapshot: None,
        }
    }

    #[test]
    fn build_then_load_restores_the_model() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = IndexStore::open(dir.path())?;
        let backend = RetrievalBackend::lexical();
        let chunks = vec![
            chunk(7, 1, "pump maintenance schedule"),
            chunk(7, 0, "hydraulic pressure relief"),
        ];

        let built = store.build(7, &chunks, &backend)?;
        assert_eq!(built.path, store.path_for(7));
        assert_eq!(built.mode, RetrievalMode::Lexical);
        assert_eq!(built.chunk_count, 2);

        let model = store.load(&built.path).ok_or("snapshot should load")?;
        let hits = backend.search(&model, "hydraulic", 1)?;
        assert_eq!(hits[0].index, 0);
        Ok(())
    }

    #[test]
    fn rebuild_replaces_in_place() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = IndexStore::open(dir.path())?;
        let backend = RetrievalBackend::lexical();

        store.build(3, &[chunk(3, 0, "first text")], &backend)?;
        let rebuilt = store.build(3, &[chunk(3, 0, "alpha"), chunk(3, 1, "beta")], &backend)?;

        assert_eq!(rebuilt.chunk_count, 2);
        assert_eq!(store.load_version(3).map(|model| model.len()), Some(2));
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }

    #[test]
    fn missing_or_corrupt_snapshots_read_as_absent() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = IndexStore::open(dir.path())?;
        assert!(store.load_version(42).is_none());

        fs::write(store.path_for(42), b"\x00\x01garbage")?;
        assert!(store.load_version(42).is_none());
        Ok(())
    }
}
