use crate::{MetadataFilter, QueryMatch, SearchError, VectorRecord};
use async_trait::async_trait;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert-or-replace by record id.
    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), SearchError>;

    /// Nearest neighbours, best first.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryMatch>, SearchError>;

    async fn delete(&self, filter: &MetadataFilter) -> Result<(), SearchError>;

    async fn delete_all(&self) -> Result<(), SearchError>;

    fn backend_name(&self) -> &'static str;
}
