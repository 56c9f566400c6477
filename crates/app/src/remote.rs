use crate::server::ADMIN_SECRET_HEADER;
use anyhow::{anyhow, Context};
use reqwest::Client;
use serde_json::{json, Value};
use study_rag_core::AdminOutcome;

/// Thin client for the admin endpoints of a running server.
pub struct AdminClient {
    base_url: String,
    secret: String,
    client: Client,
}

impl AdminClient {
    pub fn new(base_url: &str, secret: String) -> anyhow::Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url).with_context(|| format!("invalid server url {base_url}"))?;
        Ok(Self {
            base_url,
            secret,
            client: Client::new(),
        })
    }

    pub async fn delete_topic(&self, subject: &str) -> anyhow::Result<AdminOutcome> {
        self.send("/admin/delete-topic", json!({ "subject": subject }))
            .await
    }

    pub async fn nuke(&self, confirmation: &str) -> anyhow::Result<AdminOutcome> {
        self.send("/admin/nuke-system", json!({ "confirmation": confirmation }))
            .await
    }

    async fn send(&self, path: &str, body: Value) -> anyhow::Result<AdminOutcome> {
        let response = self
            .client
            .delete(format!("{}{path}", self.base_url))
            .header(ADMIN_SECRET_HEADER, &self.secret)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("calling {path}"))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<AdminOutcome>().await?);
        }

        let detail = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|body| body.get("detail").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| status.to_string());
        Err(anyhow!("{path} failed with {status}: {detail}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn delete_topic_sends_secret_and_subject() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/admin/delete-topic"))
            .and(header(ADMIN_SECRET_HEADER, "s3cret"))
            .and(body_json(json!({"subject": "DBMS"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "message": "Deleted all memories for topic: DBMS"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = AdminClient::new(&format!("{}/", server.uri()), "s3cret".to_string())?;
        let outcome = client.delete_topic("DBMS").await?;

        assert_eq!(outcome.status, "success");
        assert_eq!(outcome.message, "Deleted all memories for topic: DBMS");
        assert_eq!(outcome.removed_files, None);
        Ok(())
    }

    #[tokio::test]
    async fn nuke_parses_removed_file_count() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/admin/nuke-system"))
            .and(body_json(json!({"confirmation": "DELETE_EVERYTHING"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "message": "System fully reset.",
                "removed_files": 4
            })))
            .mount(&server)
            .await;

        let client = AdminClient::new(&server.uri(), "s3cret".to_string())?;
        let outcome = client.nuke("DELETE_EVERYTHING").await?;

        assert_eq!(outcome.removed_files, Some(4));
        Ok(())
    }

    #[tokio::test]
    async fn error_detail_becomes_the_message() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/admin/delete-topic"))
            .respond_with(
                ResponseTemplate::new(403).set_body_json(json!({"detail": "Invalid Admin Password"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/admin/nuke-system"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "detail": "Confirmation string mismatch. Type 'DELETE_EVERYTHING'."
            })))
            .mount(&server)
            .await;

        let client = AdminClient::new(&server.uri(), "wrong".to_string())?;

        let forbidden = client.delete_topic("DBMS").await.err().map(|e| e.to_string());
        assert_eq!(
            forbidden.as_deref(),
            Some("/admin/delete-topic failed with 403 Forbidden: Invalid Admin Password")
        );

        let mismatch = client.nuke("WRONG").await.err().map(|e| e.to_string());
        assert!(mismatch.is_some_and(|message| message.contains("Confirmation string mismatch")));
        Ok(())
    }

    #[test]
    fn invalid_server_url_is_rejected() {
        assert!(AdminClient::new("not a url", "s3cret".to_string()).is_err());
    }
}
