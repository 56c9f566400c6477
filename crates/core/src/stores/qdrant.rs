use crate::traits::VectorIndex;
use crate::{ChunkMetadata, MetadataFilter, QueryMatch, SearchError, VectorRecord};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

const BACKEND: &str = "qdrant";

/// Self-hosted Qdrant collection. Qdrant only accepts integer or UUID point
/// ids, so record ids are mapped to UUIDv5 and kept in the payload.
pub struct QdrantStore {
    endpoint: String,
    collection: String,
    client: Client,
    vector_size: usize,
}

impl QdrantStore {
    pub fn new(endpoint: impl Into<String>, collection: impl Into<String>, vector_size: usize) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            client: Client::new(),
            vector_size,
        }
    }

    pub fn point_id(record_id: &str) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, record_id.as_bytes())
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.endpoint, self.collection)
    }

    /// Creates the collection with cosine distance when it does not exist yet.
    pub async fn ensure_collection(&self) -> Result<(), SearchError> {
        let response = self.client.get(self.collection_url()).send().await?;
        if response.status().is_success() {
            return Ok(());
        }
        if response.status() != StatusCode::NOT_FOUND {
            return Err(backend_error(response.status(), response.text().await.unwrap_or_default()));
        }

        let response = self
            .client
            .put(self.collection_url())
            .json(&json!({
                "vectors": {"size": self.vector_size, "distance": "Cosine"}
            }))
            .send()
            .await?;
        check(response).await?;

        for field in ["subject", "source"] {
            let response = self
                .client
                .put(format!("{}/index?wait=true", self.collection_url()))
                .json(&json!({"field_name": field, "field_schema": "keyword"}))
                .send()
                .await?;
            check(response).await?;
        }
        Ok(())
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), SearchError> {
        if vector.len() != self.vector_size {
            return Err(SearchError::Request(format!(
                "vector dimension {} is not {}",
                vector.len(),
                self.vector_size
            )));
        }
        Ok(())
    }
}

fn filter_body(filter: &MetadataFilter) -> Value {
    let must = filter
        .conditions()
        .into_iter()
        .map(|(field, value)| json!({"key": field, "match": {"value": value}}))
        .collect::<Vec<_>>();
    json!({ "must": must })
}

fn backend_error(status: StatusCode, body: String) -> SearchError {
    SearchError::BackendResponse {
        backend: BACKEND.to_string(),
        details: format!("{status}: {body}"),
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, SearchError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    Err(backend_error(status, response.text().await.unwrap_or_default()))
}

fn parse_hit(hit: &Value) -> Result<QueryMatch, SearchError> {
    let payload = hit.pointer("/payload").cloned().unwrap_or(Value::Null);
    let id = payload
        .pointer("/record_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| hit.pointer("/id").map(|id| id.to_string()))
        .unwrap_or_default();
    let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0) as f32;
    let metadata: ChunkMetadata = if payload.is_null() {
        ChunkMetadata::default()
    } else {
        serde_json::from_value(payload)?
    };

    Ok(QueryMatch {
        id,
        score,
        metadata,
    })
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), SearchError> {
        if records.is_empty() {
            return Ok(());
        }

        let points = records
            .iter()
            .map(|record| {
                self.check_dimension(&record.values)?;
                let mut payload = serde_json::to_value(&record.metadata)?;
                if let Some(object) = payload.as_object_mut() {
                    object.insert("record_id".to_string(), Value::String(record.id.clone()));
                }
                Ok(json!({
                    "id": Self::point_id(&record.id),
                    "vector": record.values,
                    "payload": payload,
                }))
            })
            .collect::<Result<Vec<_>, SearchError>>()?;

        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&json!({ "points": points }))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryMatch>, SearchError> {
        self.check_dimension(vector)?;

        let mut body = json!({
            "vector": vector,
            "limit": top_k,
            "with_payload": true,
        });
        if let Some(filter) = filter.filter(|filter| !filter.is_empty()) {
            body["filter"] = filter_body(filter);
        }

        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&body)
            .send()
            .await?;
        let parsed: Value = check(response).await?.json().await?;

        parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .map(|hits| hits.iter().map(parse_hit).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn delete(&self, filter: &MetadataFilter) -> Result<(), SearchError> {
        if filter.is_empty() {
            return Err(SearchError::Request(
                "refusing to delete with an empty filter".to_string(),
            ));
        }
        let response = self
            .client
            .post(format!("{}/points/delete?wait=true", self.collection_url()))
            .json(&json!({ "filter": filter_body(filter) }))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), SearchError> {
        let response = self
            .client
            .post(format!("{}/points/delete?wait=true", self.collection_url()))
            .json(&json!({ "filter": { "must": [] } }))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}
