use crate::storage::ObjectStorage;
use crate::traits::VectorIndex;
use crate::{AdminError, MetadataFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

pub const NUKE_CONFIRMATION: &str = "DELETE_EVERYTHING";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdminOutcome {
    pub status: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed_files: Option<usize>,
}

/// Destructive maintenance operations, gated by a shared secret.
pub struct AdminService {
    index: Arc<dyn VectorIndex>,
    storage: Arc<dyn ObjectStorage>,
    secret: Option<String>,
    confirmation_phrase: String,
}

impl AdminService {
    /// With no secret configured every request is refused.
    pub fn new(
        index: Arc<dyn VectorIndex>,
        storage: Arc<dyn ObjectStorage>,
        secret: Option<String>,
    ) -> Self {
        Self {
            index,
            storage,
            secret: secret.filter(|secret| !secret.is_empty()),
            confirmation_phrase: NUKE_CONFIRMATION.to_string(),
        }
    }

    fn authorize(&self, provided: Option<&str>) -> Result<(), AdminError> {
        match (&self.secret, provided) {
            (Some(expected), Some(provided)) if expected == provided => Ok(()),
            _ => Err(AdminError::Forbidden),
        }
    }

    pub async fn delete_topic(
        &self,
        provided_secret: Option<&str>,
        subject: &str,
    ) -> Result<AdminOutcome, AdminError> {
        self.authorize(provided_secret)?;

        let subject = subject.trim();
        if subject.is_empty() {
            return Err(AdminError::InvalidInput("Subject cannot be empty".to_string()));
        }

        warn!(subject, backend = self.index.backend_name(), "deleting topic");
        self.index.delete(&MetadataFilter::by_subject(subject)).await?;

        Ok(AdminOutcome {
            status: "success".to_string(),
            message: format!("Deleted all memories for topic: {subject}"),
            removed_files: None,
        })
    }

    /// Wipes every vector and every stored file.
    pub async fn nuke(
        &self,
        provided_secret: Option<&str>,
        confirmation: &str,
    ) -> Result<AdminOutcome, AdminError> {
        self.authorize(provided_secret)?;

        if confirmation != self.confirmation_phrase {
            return Err(AdminError::InvalidInput(format!(
                "Confirmation string mismatch. Type '{}'.",
                self.confirmation_phrase
            )));
        }

        warn!(
            backend = self.index.backend_name(),
            provider = self.storage.provider_name(),
            "wiping all vectors and files"
        );
        self.index.delete_all().await?;

        let files = self.storage.list().await?;
        let removed = if files.is_empty() {
            0
        } else {
            self.storage.remove(&files).await?
        };
        warn!(removed_files = removed, "system reset complete");

        Ok(AdminOutcome {
            status: "success".to_string(),
            message: "System fully reset.".to_string(),
            removed_files: Some(removed),
        })
    }
}
