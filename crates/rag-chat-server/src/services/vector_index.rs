use anyhow::Result;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

use crate::services::conversation::{EmbeddingProvider, Retriever};
use crate::utils::similarity::top_k_by_similarity;

#[derive(Debug, Clone)]
struct IndexedChunk {
    document_id: String,
    content: String,
    embedding: Vec<f32>,
}

/// In-process vector store for the documents of a single session
pub struct VectorIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    entries: RwLock<Vec<IndexedChunk>>,
}

impl VectorIndex {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Embed and store the chunks of a document. Nothing is stored if any
    /// embedding fails.
    pub async fn add_document(&self, document_id: &str, chunks: &[String]) -> Result<usize> {
        let embeddings = self.embedder.embed_batch(chunks).await?;
        self.insert_embedded(document_id, chunks, embeddings)
    }

    /// Store chunks whose embeddings were computed elsewhere.
    pub fn insert_embedded(
        &self,
        document_id: &str,
        chunks: &[String],
        embeddings: Vec<Vec<f32>>,
    ) -> Result<usize> {
        if embeddings.len() != chunks.len() {
            anyhow::bail!(
                "Embedding count mismatch: {} chunks, {} embeddings",
                chunks.len(),
                embeddings.len()
            );
        }

        let mut entries = self.entries.write();
        for (content, embedding) in chunks.iter().zip(embeddings) {
            entries.push(IndexedChunk {
                document_id: document_id.to_string(),
                content: content.clone(),
                embedding,
            });
        }

        debug!("Indexed {} chunks for document {}", chunks.len(), document_id);
        Ok(chunks.len())
    }

    /// Returns the number of chunks removed
    pub fn remove_document(&self, document_id: &str) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|chunk| chunk.document_id != document_id);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait::async_trait]
impl Retriever for VectorIndex {
    async fn top_k(&self, query: &str, k: usize) -> Result<Vec<String>> {
        let query_embedding = self.embedder.embed(query).await?;

        let entries = self.entries.read();
        let ranked = top_k_by_similarity(
            &query_embedding,
            entries.iter().map(|chunk| chunk.embedding.as_slice()),
            k,
        )?;

        Ok(ranked
            .into_iter()
            .map(|(idx, _)| entries[idx].content.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Maps a few keywords onto fixed axes
    struct KeywordEmbedder;

    #[async_trait::async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let lower = text.to_lowercase();
            Ok(vec![
                if lower.contains("apple") { 1.0 } else { 0.0 },
                if lower.contains("rust") { 1.0 } else { 0.0 },
                if lower.contains("tea") { 1.0 } else { 0.0 },
                0.1,
            ])
        }
    }

    fn chunks(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_top_k_ranks_by_similarity() {
        let index = VectorIndex::new(Arc::new(KeywordEmbedder));
        index
            .add_document("d1", &chunks(&["Tea is brewed", "Rust is a language", "Apples are red"]))
            .await
            .unwrap();

        let results = index.top_k("tell me about rust", 1).await.unwrap();
        assert_eq!(results, vec!["Rust is a language".to_string()]);

        let results = index.top_k("anything", 10).await.unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let index = VectorIndex::new(Arc::new(KeywordEmbedder));
        index.add_document("d1", &chunks(&["first", "second", "third", "fourth"])).await.unwrap();

        let results = index.top_k("nothing relevant", 3).await.unwrap();
        assert_eq!(results, chunks(&["first", "second", "third"]));
    }

    #[tokio::test]
    async fn test_remove_document() {
        let index = VectorIndex::new(Arc::new(KeywordEmbedder));
        index.add_document("d1", &chunks(&["apple pie", "apple juice"])).await.unwrap();
        index.add_document("d2", &chunks(&["green tea"])).await.unwrap();

        assert_eq!(index.remove_document("d1"), 2);
        assert_eq!(index.remove_document("d1"), 0);
        assert_eq!(index.len(), 1);

        let results = index.top_k("apple", 3).await.unwrap();
        assert_eq!(results, chunks(&["green tea"]));
    }

    #[test]
    fn test_insert_rejects_count_mismatch() {
        let index = VectorIndex::new(Arc::new(KeywordEmbedder));
        let result = index.insert_embedded("d1", &chunks(&["a", "b"]), vec![vec![1.0]]);
        assert!(result.is_err());
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_empty_index_returns_nothing() {
        let index = VectorIndex::new(Arc::new(KeywordEmbedder));
        assert!(index.is_empty());
        assert!(index.top_k("apple", 3).await.unwrap().is_empty());
    }
}
