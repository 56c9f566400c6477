use crate::traits::VectorIndex;
use crate::{MetadataFilter, QueryMatch, SearchError, VectorRecord};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Process-local index with brute-force cosine search. Used for offline runs
/// and tests; contents are lost on restart.
#[derive(Default)]
pub struct InMemoryVectorStore {
    records: RwLock<BTreeMap<String, VectorRecord>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn ids(&self) -> Vec<String> {
        self.records.read().await.keys().cloned().collect()
    }
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }
    let dot = left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        0.0
    } else {
        dot / (left_norm * right_norm)
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorStore {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), SearchError> {
        let mut stored = self.records.write().await;
        for record in records {
            stored.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryMatch>, SearchError> {
        let stored = self.records.read().await;
        let mut matches = stored
            .values()
            .filter(|record| filter.map_or(true, |filter| filter.matches(&record.metadata)))
            .map(|record| QueryMatch {
                id: record.id.clone(),
                score: cosine_similarity(vector, &record.values),
                metadata: record.metadata.clone(),
            })
            .collect::<Vec<_>>();

        matches.sort_by(|left, right| right.score.total_cmp(&left.score));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn delete(&self, filter: &MetadataFilter) -> Result<(), SearchError> {
        if filter.is_empty() {
            return Err(SearchError::Request(
                "refusing to delete with an empty filter".to_string(),
            ));
        }
        self.records
            .write()
            .await
            .retain(|_, record| !filter.matches(&record.metadata));
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), SearchError> {
        self.records.write().await.clear();
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
