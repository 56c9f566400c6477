use crate::traits::VectorIndex;
use crate::{ChunkMetadata, MetadataFilter, QueryMatch, SearchError, VectorRecord};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};

const BACKEND: &str = "pinecone";

/// Managed Pinecone index addressed by its data-plane host.
pub struct PineconeStore {
    host: String,
    api_key: String,
    namespace: Option<String>,
    client: Client,
}

impl PineconeStore {
    pub fn new(host: impl Into<String>, api_key: impl Into<String>) -> Self {
        let host = host.into();
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host
        } else {
            format!("https://{host}")
        };

        Self {
            host: host.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            namespace: None,
            client: Client::new(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    async fn post(&self, path: &str, mut body: Value) -> Result<Value, SearchError> {
        if let (Some(namespace), Some(object)) = (&self.namespace, body.as_object_mut()) {
            object.insert("namespace".to_string(), Value::String(namespace.clone()));
        }

        let response = self
            .client
            .post(format!("{}{path}", self.host))
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(backend_error(status, text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

fn backend_error(status: StatusCode, body: String) -> SearchError {
    SearchError::BackendResponse {
        backend: BACKEND.to_string(),
        details: format!("{status}: {body}"),
    }
}

/// Pinecone rejects null metadata values, so absent fields are left out.
fn metadata_body(metadata: &ChunkMetadata) -> Result<Value, SearchError> {
    let value = serde_json::to_value(metadata)?;
    let cleaned = match value {
        Value::Object(fields) => fields
            .into_iter()
            .filter(|(_, value)| !value.is_null())
            .collect::<Map<_, _>>(),
        _ => Map::new(),
    };
    Ok(Value::Object(cleaned))
}

fn filter_body(filter: &MetadataFilter) -> Value {
    let conditions = filter
        .conditions()
        .into_iter()
        .map(|(field, value)| (field.to_string(), json!({ "$eq": value })))
        .collect::<Map<_, _>>();
    Value::Object(conditions)
}

fn parse_match(hit: &Value) -> Result<QueryMatch, SearchError> {
    let metadata = match hit.pointer("/metadata") {
        Some(metadata) if !metadata.is_null() => serde_json::from_value(metadata.clone())?,
        _ => ChunkMetadata::default(),
    };

    Ok(QueryMatch {
        id: hit
            .pointer("/id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        score: hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0) as f32,
        metadata,
    })
}

#[async_trait]
impl VectorIndex for PineconeStore {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), SearchError> {
        if records.is_empty() {
            return Ok(());
        }

        let vectors = records
            .iter()
            .map(|record| {
                Ok(json!({
                    "id": record.id,
                    "values": record.values,
                    "metadata": metadata_body(&record.metadata)?,
                }))
            })
            .collect::<Result<Vec<_>, SearchError>>()?;

        self.post("/vectors/upsert", json!({ "vectors": vectors }))
            .await?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryMatch>, SearchError> {
        let mut body = json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
        });
        if let Some(filter) = filter.filter(|filter| !filter.is_empty()) {
            body["filter"] = filter_body(filter);
        }

        let parsed = self.post("/query", body).await?;
        parsed
            .pointer("/matches")
            .and_then(Value::as_array)
            .map(|hits| hits.iter().map(parse_match).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn delete(&self, filter: &MetadataFilter) -> Result<(), SearchError> {
        if filter.is_empty() {
            return Err(SearchError::Request(
                "refusing to delete with an empty filter".to_string(),
            ));
        }
        self.post("/vectors/delete", json!({ "filter": filter_body(filter) }))
            .await?;
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), SearchError> {
        self.post("/vectors/delete", json!({ "deleteAll": true }))
            .await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}
