use crate::embeddings::{Embedder, EmbeddingTask};
use crate::generation::Generator;
use crate::normalize::clean_output;
use crate::prompt::{Difficulty, PromptBuilder, StudyMode, DEFAULT_QUIZ_QUESTIONS};
use crate::traits::VectorIndex;
use crate::{
    ChatRequest, ChatResponse, MetadataFilter, QueryError, QueryMatch, SourceSummary,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

pub const NOT_FOUND_ANSWER: &str =
    "I'm sorry, I couldn't find any information about that specific topic in your uploaded notes.";

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub top_k: usize,
    pub relevance_threshold: f32,
    pub quiz_questions: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_k: 8,
            relevance_threshold: 0.35,
            quiz_questions: DEFAULT_QUIZ_QUESTIONS,
        }
    }
}

/// Answers a student question from the indexed notes.
pub struct QueryPipeline {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    generator: Arc<dyn Generator>,
    prompts: PromptBuilder,
    options: QueryOptions,
}

impl QueryPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn Generator>,
        options: QueryOptions,
    ) -> Self {
        Self {
            embedder,
            index,
            generator,
            prompts: PromptBuilder {
                quiz_questions: options.quiz_questions,
            },
            options,
        }
    }

    pub async fn answer(&self, request: &ChatRequest) -> Result<ChatResponse, QueryError> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(QueryError::EmptyQuestion);
        }
        let mode = StudyMode::parse(&request.mode);
        let difficulty = Difficulty::parse(&request.difficulty);
        let filter = request
            .subject
            .as_deref()
            .map(str::trim)
            .filter(|subject| !subject.is_empty())
            .map(MetadataFilter::by_subject);

        info!(mode = %mode, difficulty = %difficulty, subject = ?filter.as_ref().and_then(|f| f.subject.as_deref()), "answering question");

        let vector = self
            .embedder
            .embed(question, EmbeddingTask::RetrievalQuery)
            .await?;
        let matches = self
            .index
            .query(&vector, self.options.top_k, filter.as_ref())
            .await?;

        let best = best_score(&matches);
        if best.map_or(true, |score| score < self.options.relevance_threshold) {
            info!(matches = matches.len(), best_score = ?best, "no relevant notes, skipping generation");
            return Ok(ChatResponse {
                answer: NOT_FOUND_ANSWER.to_string(),
                sources: Vec::new(),
            });
        }

        let context = build_context(&matches);
        let sources = summarize_sources(&matches);
        let prompt = self.prompts.build(mode, difficulty, question, &context);

        let answer = self.generator.generate(&prompt).await?;
        info!(sources = sources.len(), answer_chars = answer.len(), "generated answer");

        Ok(ChatResponse {
            answer: clean_output(&answer),
            sources,
        })
    }
}

fn best_score(matches: &[QueryMatch]) -> Option<f32> {
    matches
        .iter()
        .map(|matched| matched.score)
        .max_by(f32::total_cmp)
}

/// Cleaned chunk texts in search order, separated by blank lines.
pub fn build_context(matches: &[QueryMatch]) -> String {
    matches
        .iter()
        .map(|matched| matched.metadata.text.as_str())
        .filter(|text| !text.is_empty())
        .map(clean_output)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// One entry per source file; the first match seen for a file wins.
pub fn summarize_sources(matches: &[QueryMatch]) -> Vec<SourceSummary> {
    let mut seen = HashSet::new();
    matches
        .iter()
        .map(SourceSummary::from_match)
        .filter(|summary| seen.insert(summary.source.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamError;
    use crate::stores::InMemoryVectorStore;
    use crate::{ChunkMetadata, VectorRecord};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Every text embeds to the same unit vector, so stored vectors decide the score.
    struct UnitEmbedder;

    #[async_trait]
    impl Embedder for UnitEmbedder {
        fn dimensions(&self) -> usize {
            2
        }

        async fn embed(&self, _text: &str, _task: EmbeddingTask) -> Result<Vec<f32>, UpstreamError> {
            Ok(vec![1.0, 0.0])
        }
    }

    #[derive(Default)]
    struct RecordingGenerator {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Generator for RecordingGenerator {
        async fn generate(&self, prompt: &str) -> Result<String, UpstreamError> {
            self.prompts.lock().expect("lock").push(prompt.to_string());
            Ok("Answer \u{f0e0} with arrows \u{2192} kept\n\n- bullet".to_string())
        }
    }

    struct BusyGenerator;

    #[async_trait]
    impl Generator for BusyGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, UpstreamError> {
            Err(UpstreamError::Busy {
                service: "generation",
                attempts: 5,
            })
        }
    }

    /// A stored vector whose cosine with `[1, 0]` is `score`.
    fn record(id: &str, source: &str, subject: &str, text: &str, score: f32) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            values: vec![score, (1.0 - score * score).max(0.0).sqrt()],
            metadata: ChunkMetadata {
                text: text.to_string(),
                source: source.to_string(),
                subject: subject.to_string(),
                chapter: format!("{source} chapter"),
                pdf_url: Some(format!("https://files/{source}")),
                chunk_index: 0,
            },
        }
    }

    async fn pipeline_with(
        records: Vec<VectorRecord>,
        generator: Arc<dyn Generator>,
    ) -> QueryPipeline {
        let index = Arc::new(InMemoryVectorStore::new());
        index.upsert(&records).await.expect("upsert");
        QueryPipeline::new(Arc::new(UnitEmbedder), index, generator, QueryOptions::default())
    }

    #[tokio::test]
    async fn weak_matches_return_not_found_without_generation() -> Result<(), QueryError> {
        let generator = Arc::new(RecordingGenerator::default());
        let pipeline = pipeline_with(
            vec![record("a", "dbms.pdf", "DBMS", "unrelated", 0.2)],
            generator.clone(),
        )
        .await;

        let response = pipeline.answer(&ChatRequest::new("What is 3NF?")).await?;

        assert_eq!(response.answer, NOT_FOUND_ANSWER);
        assert!(response.sources.is_empty());
        assert!(generator.prompts.lock().expect("lock").is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn empty_index_returns_not_found() -> Result<(), QueryError> {
        let generator = Arc::new(RecordingGenerator::default());
        let pipeline = pipeline_with(Vec::new(), generator.clone()).await;
        let response = pipeline.answer(&ChatRequest::new("anything")).await?;
        assert_eq!(response.answer, NOT_FOUND_ANSWER);
        Ok(())
    }

    #[tokio::test]
    async fn sources_are_deduplicated_by_file_in_rank_order() -> Result<(), QueryError> {
        let generator = Arc::new(RecordingGenerator::default());
        let pipeline = pipeline_with(
            vec![
                record("a0", "dbms.pdf", "DBMS", "3NF removes transitive dependencies.", 0.9),
                record("a1", "dbms.pdf", "DBMS", "BCNF is stricter than 3NF.", 0.8),
                record("b0", "keys.pdf", "DBMS", "A candidate key is minimal.", 0.6),
            ],
            generator.clone(),
        )
        .await;

        let response = pipeline.answer(&ChatRequest::new("What is 3NF?")).await?;

        let sources = response
            .sources
            .iter()
            .map(|source| source.source.as_str())
            .collect::<Vec<_>>();
        assert_eq!(sources, vec!["dbms.pdf", "keys.pdf"]);
        assert!((response.sources[0].score - 0.9).abs() < 1e-4);
        assert_eq!(response.answer, "Answer -> with arrows -> kept\n\n- bullet");

        let prompts = generator.prompts.lock().expect("lock");
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains(
            "3NF removes transitive dependencies.\n\nBCNF is stricter than 3NF.\n\nA candidate key is minimal."
        ));
        assert!(prompts[0].ends_with("USER REQUEST:\nWhat is 3NF?\n"));
        Ok(())
    }

    #[tokio::test]
    async fn subject_filter_limits_retrieval() -> Result<(), QueryError> {
        let generator = Arc::new(RecordingGenerator::default());
        let pipeline = pipeline_with(
            vec![
                record("a", "dbms.pdf", "DBMS", "normal forms", 0.9),
                record("b", "os.pdf", "OS", "paging", 0.95),
            ],
            generator,
        )
        .await;

        let mut request = ChatRequest::new("explain");
        request.subject = Some("DBMS".to_string());
        let response = pipeline.answer(&request).await?;

        assert_eq!(response.sources.len(), 1);
        assert_eq!(response.sources[0].source, "dbms.pdf");
        Ok(())
    }

    #[tokio::test]
    async fn quiz_mode_rewrites_the_request() -> Result<(), QueryError> {
        let generator = Arc::new(RecordingGenerator::default());
        let pipeline = pipeline_with(
            vec![record("a", "dbms.pdf", "DBMS", "joins", 0.9)],
            generator.clone(),
        )
        .await;

        let mut request = ChatRequest::new("Joins");
        request.mode = "quiz".to_string();
        request.difficulty = "Hard".to_string();
        pipeline.answer(&request).await?;

        let prompts = generator.prompts.lock().expect("lock");
        assert!(prompts[0].contains("Generate 10 Hard-level Multiple Choice Questions"));
        Ok(())
    }

    #[tokio::test]
    async fn empty_question_is_rejected() {
        let pipeline = pipeline_with(Vec::new(), Arc::new(RecordingGenerator::default())).await;
        let result = pipeline.answer(&ChatRequest::new("   ")).await;
        assert!(matches!(result, Err(QueryError::EmptyQuestion)));
    }

    #[tokio::test]
    async fn busy_generation_surfaces_as_busy() {
        let pipeline = pipeline_with(
            vec![record("a", "dbms.pdf", "DBMS", "joins", 0.9)],
            Arc::new(BusyGenerator),
        )
        .await;
        let result = pipeline.answer(&ChatRequest::new("joins")).await;
        assert!(matches!(&result, Err(error) if error.is_busy()));
    }

    #[test]
    fn missing_metadata_falls_back_in_summaries() {
        let matches = vec![QueryMatch {
            id: "x".to_string(),
            score: 0.5,
            metadata: ChunkMetadata::default(),
        }];
        let sources = summarize_sources(&matches);
        assert_eq!(sources[0].source, "Unknown");
        assert_eq!(sources[0].chapter, "General");
        assert!(build_context(&matches).is_empty());
    }
}
