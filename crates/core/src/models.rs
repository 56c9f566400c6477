use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

pub const UNKNOWN_SOURCE: &str = "Unknown";
pub const DEFAULT_CHAPTER: &str = "General";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFingerprint {
    pub filename: String,
    pub subject: String,
    pub chapter: String,
    pub pdf_url: String,
    pub checksum: String,
    pub size_bytes: usize,
    pub ingested_at: DateTime<Utc>,
}

/// Metadata stored next to every vector. Enough to cite the file and rebuild
/// the context without touching the original PDF.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ChunkMetadata {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub chapter: String,
    #[serde(default)]
    pub pdf_url: Option<String>,
    #[serde(default, deserialize_with = "whole_number")]
    pub chunk_index: u64,
}

/// Pinecone hands every numeric metadata value back as a float.
fn whole_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Number {
        Integer(u64),
        Float(f64),
    }

    match Number::deserialize(deserializer)? {
        Number::Integer(value) => Ok(value),
        Number::Float(value) if value >= 0.0 && value.fract() == 0.0 && value <= u64::MAX as f64 => {
            Ok(value as u64)
        }
        Number::Float(value) => Err(D::Error::custom(format!(
            "expected a whole non-negative number, got {value}"
        ))),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: ChunkMetadata,
}

impl VectorRecord {
    pub fn record_id(filename: &str, chunk_index: u64) -> String {
        format!("{filename}_chunk_{chunk_index}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryMatch {
    pub id: String,
    pub score: f32,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceSummary {
    pub source: String,
    pub pdf_url: Option<String>,
    pub chapter: String,
    pub score: f32,
}

impl SourceSummary {
    pub fn from_match(matched: &QueryMatch) -> Self {
        let source = if matched.metadata.source.is_empty() {
            UNKNOWN_SOURCE.to_string()
        } else {
            matched.metadata.source.clone()
        };
        let chapter = if matched.metadata.chapter.is_empty() {
            DEFAULT_CHAPTER.to_string()
        } else {
            matched.metadata.chapter.clone()
        };

        Self {
            source,
            pdf_url: matched.metadata.pdf_url.clone(),
            chapter,
            score: matched.score,
        }
    }
}

/// Exact-match metadata filter. Every populated field must match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct MetadataFilter {
    pub subject: Option<String>,
    pub chapter: Option<String>,
    pub source: Option<String>,
}

impl MetadataFilter {
    pub fn by_subject(subject: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.subject.is_none() && self.chapter.is_none() && self.source.is_none()
    }

    /// Field name/value pairs in a stable order, for backends that build
    /// their own filter syntax.
    pub fn conditions(&self) -> Vec<(&'static str, &str)> {
        let mut conditions = Vec::new();
        if let Some(subject) = &self.subject {
            conditions.push(("subject", subject.as_str()));
        }
        if let Some(chapter) = &self.chapter {
            conditions.push(("chapter", chapter.as_str()));
        }
        if let Some(source) = &self.source {
            conditions.push(("source", source.as_str()));
        }
        conditions
    }

    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        self.conditions().into_iter().all(|(field, value)| match field {
            "subject" => metadata.subject == value,
            "chapter" => metadata.chapter == value,
            "source" => metadata.source == value,
            _ => false,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    pub question: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    #[serde(default)]
    pub subject: Option<String>,
}

fn default_mode() -> String {
    "LECTURE".to_string()
}

fn default_difficulty() -> String {
    "Medium".to_string()
}

impl ChatRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            mode: default_mode(),
            difficulty: default_difficulty(),
            subject: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<SourceSummary>,
}

#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub subject: String,
    pub chapter: String,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_max_chars: usize,
    pub chunk_overlap_chars: usize,
    pub upsert_batch_size: usize,
    pub content_type: &'static str,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_max_chars: 1_000,
            chunk_overlap_chars: 200,
            upsert_batch_size: 100,
            content_type: "application/pdf",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IngestStage {
    Uploaded,
    Extracted,
    Chunked,
    Embedded,
    Indexed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkippedChunk {
    pub chunk_index: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionReport {
    pub document: DocumentFingerprint,
    pub stage: IngestStage,
    pub chunk_count: usize,
    pub indexed_count: usize,
    pub skipped_chunks: Vec<SkippedChunk>,
    pub failed_batches: usize,
}
