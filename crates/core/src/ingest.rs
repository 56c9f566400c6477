use crate::chunking::{ChunkingConfig, RecursiveChunker};
use crate::embeddings::{Embedder, EmbeddingTask};
use crate::extractor::{PageText, PdfExtractor};
use crate::normalize::normalize_text;
use crate::storage::ObjectStorage;
use crate::store::upsert_in_batches;
use crate::traits::VectorIndex;
use crate::{
    ChunkMetadata, DocumentFingerprint, DocumentUpload, IngestError, IngestStage,
    IngestionOptions, IngestionReport, MetadataFilter, SkippedChunk, VectorRecord, DEFAULT_CHAPTER,
};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Storage-safe name for an uploaded file: directory parts and non-ASCII are
/// dropped, runs of whitespace, brackets and parentheses become `_`.
pub fn sanitize_filename(raw: &str) -> Result<String, IngestError> {
    let base = raw
        .rsplit(|character| character == '/' || character == '\\')
        .next()
        .unwrap_or(raw);

    let mut sanitized = String::with_capacity(base.len());
    let mut in_run = false;
    for character in base.chars().filter(char::is_ascii) {
        if character.is_ascii_whitespace() || matches!(character, '[' | ']' | '(' | ')') {
            if !in_run {
                sanitized.push('_');
                in_run = true;
            }
        } else {
            sanitized.push(character);
            in_run = false;
        }
    }

    let sanitized = sanitized.trim_matches('_').to_string();
    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        return Err(IngestError::MissingFileName(raw.to_string()));
    }
    Ok(sanitized)
}

/// Upload → extract → clean → chunk → embed → upsert for one PDF at a time.
pub struct IngestionPipeline {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    storage: Arc<dyn ObjectStorage>,
    extractor: Arc<dyn PdfExtractor>,
    chunker: RecursiveChunker,
    options: IngestionOptions,
}

#[derive(Debug)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct FolderIngestReport {
    pub documents: Vec<IngestionReport>,
    pub skipped_files: Vec<SkippedPdf>,
}

impl IngestionPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        storage: Arc<dyn ObjectStorage>,
        extractor: Arc<dyn PdfExtractor>,
        options: IngestionOptions,
    ) -> Result<Self, IngestError> {
        if !(1..=100).contains(&options.upsert_batch_size) {
            return Err(IngestError::InvalidArgument(format!(
                "upsert batch size {} must be between 1 and 100",
                options.upsert_batch_size
            )));
        }
        let chunker = RecursiveChunker::new(ChunkingConfig::from(&options))?;

        Ok(Self {
            embedder,
            index,
            storage,
            extractor,
            chunker,
            options,
        })
    }

    pub async fn ingest(&self, upload: DocumentUpload) -> Result<IngestionReport, IngestError> {
        let filename = sanitize_filename(&upload.filename)?;
        let subject = upload.subject.trim().to_string();
        if subject.is_empty() {
            return Err(IngestError::InvalidArgument("subject is required".to_string()));
        }
        let chapter = match upload.chapter.trim() {
            "" => DEFAULT_CHAPTER.to_string(),
            chapter => chapter.to_string(),
        };

        let pdf_url = self
            .storage
            .upload(&filename, &upload.bytes, self.options.content_type)
            .await?;
        info!(
            filename = %filename,
            provider = self.storage.provider_name(),
            stage = ?IngestStage::Uploaded,
            "stored original file"
        );

        let document = DocumentFingerprint {
            filename: filename.clone(),
            subject: subject.clone(),
            chapter: chapter.clone(),
            pdf_url: pdf_url.clone(),
            checksum: digest_bytes(&upload.bytes),
            size_bytes: upload.bytes.len(),
            ingested_at: Utc::now(),
        };

        let pages = self.extract(upload.bytes).await?;
        info!(filename = %filename, pages = pages.len(), stage = ?IngestStage::Extracted, "extracted text");
        if pages.is_empty() {
            warn!(filename = %filename, "pdf has no text layer, nothing to index");
        }

        let full_text = pages
            .iter()
            .map(|page| normalize_text(&page.text))
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = self.chunker.split_text(&full_text);
        info!(filename = %filename, chunks = chunks.len(), stage = ?IngestStage::Chunked, "chunked text");

        let mut records = Vec::with_capacity(chunks.len());
        let mut skipped_chunks = Vec::new();
        for (chunk_index, text) in chunks.iter().enumerate() {
            let chunk_index = chunk_index as u64;
            let values = match self
                .embedder
                .embed(text, EmbeddingTask::RetrievalDocument)
                .await
            {
                Ok(values) => values,
                Err(error) if error.is_busy() => return Err(error.into()),
                Err(error) => {
                    warn!(filename = %filename, chunk_index, error = %error, "skipping chunk");
                    skipped_chunks.push(SkippedChunk {
                        chunk_index,
                        reason: error.to_string(),
                    });
                    continue;
                }
            };

            records.push(VectorRecord {
                id: VectorRecord::record_id(&filename, chunk_index),
                values,
                metadata: ChunkMetadata {
                    text: text.clone(),
                    source: filename.clone(),
                    subject: subject.clone(),
                    chapter: chapter.clone(),
                    pdf_url: Some(pdf_url.clone()),
                    chunk_index,
                },
            });
        }
        info!(
            filename = %filename,
            embedded = records.len(),
            skipped = skipped_chunks.len(),
            stage = ?IngestStage::Embedded,
            "embedded chunks"
        );

        // A revised upload may produce fewer chunks than the copy it replaces.
        self.index
            .delete(&MetadataFilter {
                source: Some(filename.clone()),
                ..MetadataFilter::default()
            })
            .await?;
        info!(filename = %filename, "cleared previous chunks for source");

        let batches =
            upsert_in_batches(self.index.as_ref(), &records, self.options.upsert_batch_size).await;
        info!(
            filename = %filename,
            indexed = batches.indexed,
            failed_batches = batches.failed_batches,
            stage = ?IngestStage::Indexed,
            "indexed chunks"
        );

        Ok(IngestionReport {
            document,
            stage: IngestStage::Indexed,
            chunk_count: chunks.len(),
            indexed_count: batches.indexed,
            skipped_chunks,
            failed_batches: batches.failed_batches,
        })
    }

    pub async fn ingest_path(
        &self,
        path: &Path,
        subject: &str,
        chapter: &str,
    ) -> Result<IngestionReport, IngestError> {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?
            .to_string();
        let bytes = tokio::fs::read(path).await?;

        self.ingest(DocumentUpload {
            filename,
            bytes,
            subject: subject.to_string(),
            chapter: chapter.to_string(),
        })
        .await
    }

    /// Ingests every PDF under `folder`. A file that fails is recorded and the
    /// rest continue, except when the embedding API is busy, which stops the run.
    pub async fn ingest_folder(
        &self,
        folder: &Path,
        subject: &str,
        chapter: &str,
    ) -> Result<FolderIngestReport, IngestError> {
        let files = discover_pdf_files(folder);
        if files.is_empty() {
            return Err(IngestError::InvalidArgument(format!(
                "no pdf files found in {}",
                folder.display()
            )));
        }

        let mut report = FolderIngestReport::default();
        for path in files {
            match self.ingest_path(&path, subject, chapter).await {
                Ok(document) => report.documents.push(document),
                Err(error) if error.is_busy() => return Err(error),
                Err(error) => {
                    warn!(path = %path.display(), error = %error, "skipping pdf");
                    report.skipped_files.push(SkippedPdf {
                        path,
                        reason: error.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    async fn extract(&self, bytes: Vec<u8>) -> Result<Vec<PageText>, IngestError> {
        let extractor = Arc::clone(&self.extractor);
        tokio::task::spawn_blocking(move || extractor.extract_pages(&bytes))
            .await
            .map_err(|error| IngestError::Task(error.to_string()))?
    }
}
