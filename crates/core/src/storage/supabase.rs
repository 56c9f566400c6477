use super::{validate_key, ObjectStorage};
use crate::error::StorageError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use url::Url;

const PROVIDER: &str = "supabase";
const LIST_PAGE_SIZE: usize = 1000;

/// Supabase Storage bucket accessed over its REST API. The bucket is expected
/// to be public so stored PDFs can be linked as citations.
pub struct SupabaseStorage {
    base_url: Url,
    api_key: String,
    bucket: String,
    client: Client,
}

#[derive(Deserialize)]
struct ListedObject {
    name: String,
    /// Folders come back without an id.
    #[serde(default)]
    id: Option<String>,
}

impl SupabaseStorage {
    pub fn new(
        project_url: &str,
        api_key: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let base_url = Url::parse(&format!("{}/", project_url.trim_end_matches('/')))?;
        Ok(Self {
            base_url,
            api_key: api_key.into(),
            bucket: bucket.into(),
            client: Client::new(),
        })
    }

    /// Appends each segment percent-encoded, so keys holding `#`, `?` or `%`
    /// address the object they name.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, StorageError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| StorageError::InvalidKey(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn check(response: Response) -> Result<Response, StorageError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(StorageError::Backend {
            provider: PROVIDER,
            status: status.as_u16(),
            details: response.text().await.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl ObjectStorage for SupabaseStorage {
    async fn upload(
        &self,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<String, StorageError> {
        validate_key(key)?;
        let url = self.endpoint(&["storage", "v1", "object", self.bucket.as_str(), key])?;

        let response = self
            .authorized(self.client.post(url))
            .header("content-type", content_type)
            .header("x-upsert", "true")
            .body(data.to_vec())
            .send()
            .await?;
        Self::check(response).await?;

        self.public_url(key)
    }

    fn public_url(&self, key: &str) -> Result<String, StorageError> {
        validate_key(key)?;
        let url = self.endpoint(&["storage", "v1", "object", "public", self.bucket.as_str(), key])?;
        Ok(url.to_string())
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        let url = self.endpoint(&["storage", "v1", "object", "list", self.bucket.as_str()])?;
        let mut keys = Vec::new();
        let mut offset = 0;

        loop {
            let response = self
                .authorized(self.client.post(url.clone()))
                .json(&json!({
                    "prefix": "",
                    "limit": LIST_PAGE_SIZE,
                    "offset": offset,
                    "sortBy": {"column": "name", "order": "asc"},
                }))
                .send()
                .await?;
            let page: Vec<ListedObject> = Self::check(response).await?.json().await?;
            let page_len = page.len();

            keys.extend(
                page.into_iter()
                    .filter(|object| object.id.is_some())
                    .map(|object| object.name),
            );

            if page_len < LIST_PAGE_SIZE {
                break;
            }
            offset += page_len;
        }

        Ok(keys)
    }

    async fn remove(&self, keys: &[String]) -> Result<usize, StorageError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let url = self.endpoint(&["storage", "v1", "object", self.bucket.as_str()])?;

        let response = self
            .authorized(self.client.delete(url))
            .json(&json!({ "prefixes": keys }))
            .send()
            .await?;
        let removed: Vec<serde_json::Value> = Self::check(response).await?.json().await?;
        Ok(removed.len())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn storage(server: &MockServer) -> SupabaseStorage {
        SupabaseStorage::new(&server.uri(), "service-key", "lecture-notes").expect("valid url")
    }

    #[test]
    fn public_url_follows_bucket_layout() -> Result<(), StorageError> {
        let storage = SupabaseStorage::new("https://abc.supabase.co/", "key", "notes")?;
        assert_eq!(
            storage.public_url("dbms.pdf")?,
            "https://abc.supabase.co/storage/v1/object/public/notes/dbms.pdf"
        );
        Ok(())
    }

    #[tokio::test]
    async fn upload_overwrites_and_returns_public_url() -> Result<(), StorageError> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/lecture-notes/dbms.pdf"))
            .and(header("x-upsert", "true"))
            .and(header("apikey", "service-key"))
            .and(header("content-type", "application/pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Key": "lecture-notes/dbms.pdf"})))
            .expect(1)
            .mount(&server)
            .await;

        let url = storage(&server)
            .upload("dbms.pdf", b"%PDF-1.4", "application/pdf")
            .await?;
        assert_eq!(
            url,
            format!("{}/storage/v1/object/public/lecture-notes/dbms.pdf", server.uri())
        );
        Ok(())
    }

    #[test]
    fn reserved_characters_in_keys_are_encoded() -> Result<(), StorageError> {
        let storage = SupabaseStorage::new("https://abc.supabase.co", "key", "notes")?;
        let url = storage.public_url("Lecture_#3_DBMS?v=2.pdf")?;
        assert_eq!(
            url,
            "https://abc.supabase.co/storage/v1/object/public/notes/Lecture_%233_DBMS%3Fv=2.pdf"
        );

        let parsed = Url::parse(&url)?;
        assert_eq!(parsed.fragment(), None);
        assert_eq!(parsed.query(), None);
        assert_ne!(url, storage.public_url("Lecture_#4_DBMS?v=2.pdf")?);
        Ok(())
    }

    #[tokio::test]
    async fn upload_with_hash_in_key_targets_the_full_object() -> Result<(), StorageError> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/lecture-notes/Lecture_%233.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Key": "x"})))
            .expect(1)
            .mount(&server)
            .await;

        let url = storage(&server)
            .upload("Lecture_#3.pdf", b"%PDF-1.4", "application/pdf")
            .await?;
        assert!(url.ends_with("/storage/v1/object/public/lecture-notes/Lecture_%233.pdf"));
        Ok(())
    }

    #[tokio::test]
    async fn list_skips_folders() -> Result<(), StorageError> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/list/lecture-notes"))
            .and(body_partial_json(json!({"prefix": "", "offset": 0})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "dbms.pdf", "id": "1"},
                {"name": "archive", "id": null},
                {"name": "os.pdf", "id": "2"}
            ])))
            .mount(&server)
            .await;

        assert_eq!(storage(&server).list().await?, vec!["dbms.pdf", "os.pdf"]);
        Ok(())
    }

    #[tokio::test]
    async fn remove_sends_prefixes() -> Result<(), StorageError> {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/storage/v1/object/lecture-notes"))
            .and(body_json(json!({"prefixes": ["dbms.pdf", "os.pdf"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "dbms.pdf"},
                {"name": "os.pdf"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let removed = storage(&server)
            .remove(&["dbms.pdf".to_string(), "os.pdf".to_string()])
            .await?;
        assert_eq!(removed, 2);
        Ok(())
    }

    #[tokio::test]
    async fn backend_errors_keep_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("row-level security"))
            .mount(&server)
            .await;

        let result = storage(&server)
            .upload("dbms.pdf", b"x", "application/pdf")
            .await;
        assert!(matches!(
            result,
            Err(StorageError::Backend { status: 403, .. })
        ));
    }
}
