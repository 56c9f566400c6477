use crate::error::IngestError;
use crate::models::IngestionOptions;
use std::collections::VecDeque;
use std::ops::Range;

/// Paragraph, line, sentence, word, character.
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self::from(&IngestionOptions::default())
    }
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            max_chars: value.chunk_max_chars,
            overlap_chars: value.chunk_overlap_chars,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Recursive separator-priority splitter.
///
/// Text is cut at the highest-priority separator present; any piece still
/// larger than `max_chars` is cut again with the next separator. Pieces are
/// then packed greedily into chunks, carrying up to `overlap_chars` of trailing
/// pieces into the next chunk. Separators stay attached to the piece they end,
/// so every chunk is a contiguous slice of the input.
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    config: ChunkingConfig,
}

impl RecursiveChunker {
    pub fn new(config: ChunkingConfig) -> Result<Self, IngestError> {
        if config.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_chars must be greater than zero".to_string(),
            ));
        }
        if config.overlap_chars >= config.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk size {}",
                config.overlap_chars, config.max_chars
            )));
        }
        if config.separators.is_empty() {
            return Err(IngestError::InvalidChunkConfig(
                "at least one separator is required".to_string(),
            ));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Trimmed, non-blank chunk texts in document order.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.chunk_spans(text)
            .into_iter()
            .map(|span| text[span].trim().to_string())
            .filter(|chunk| !chunk.is_empty())
            .collect()
    }

    /// Byte ranges of every chunk, untrimmed. Consecutive ranges may overlap.
    pub fn chunk_spans(&self, text: &str) -> Vec<Range<usize>> {
        if text.is_empty() {
            return Vec::new();
        }
        self.split_range(text, 0..text.len(), &self.config.separators)
    }

    fn split_range(
        &self,
        text: &str,
        range: Range<usize>,
        separators: &[String],
    ) -> Vec<Range<usize>> {
        let segment = &text[range.clone()];
        let position = separators
            .iter()
            .position(|separator| separator.is_empty() || segment.contains(separator.as_str()))
            .unwrap_or(separators.len() - 1);
        let separator = separators[position].as_str();
        let remaining = &separators[position + 1..];

        let mut spans = Vec::new();
        let mut fitting = Vec::new();

        for piece in split_inclusive(text, range, separator) {
            if char_len(text, &piece) <= self.config.max_chars {
                fitting.push(piece);
                continue;
            }

            if !fitting.is_empty() {
                spans.extend(self.merge_pieces(text, &fitting));
                fitting.clear();
            }

            if remaining.is_empty() {
                spans.push(piece);
            } else {
                spans.extend(self.split_range(text, piece, remaining));
            }
        }

        if !fitting.is_empty() {
            spans.extend(self.merge_pieces(text, &fitting));
        }

        spans
    }

    fn merge_pieces(&self, text: &str, pieces: &[Range<usize>]) -> Vec<Range<usize>> {
        let mut spans = Vec::new();
        let mut window: VecDeque<(Range<usize>, usize)> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let length = char_len(text, piece);

            if total + length > self.config.max_chars {
                if let (Some((first, _)), Some((last, _))) = (window.front(), window.back()) {
                    spans.push(first.start..last.end);
                }

                while total > self.config.overlap_chars
                    || (total + length > self.config.max_chars && total > 0)
                {
                    match window.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }

            window.push_back((piece.clone(), length));
            total += length;
        }

        if let (Some((first, _)), Some((last, _))) = (window.front(), window.back()) {
            spans.push(first.start..last.end);
        }

        spans
    }
}

fn char_len(text: &str, range: &Range<usize>) -> usize {
    text[range.clone()].chars().count()
}

fn split_inclusive(text: &str, range: Range<usize>, separator: &str) -> Vec<Range<usize>> {
    let segment = &text[range.clone()];
    let offset = range.start;

    if separator.is_empty() {
        return segment
            .char_indices()
            .map(|(index, character)| {
                offset + index..offset + index + character.len_utf8()
            })
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0usize;
    for (index, matched) in segment.match_indices(separator) {
        let end = index + matched.len();
        pieces.push(offset + start..offset + end);
        start = end;
    }
    if start < segment.len() {
        pieces.push(offset + start..offset + segment.len());
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(max_chars: usize, overlap_chars: usize) -> RecursiveChunker {
        RecursiveChunker::new(ChunkingConfig {
            max_chars,
            overlap_chars,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
        .expect("valid chunking config")
    }

    fn reconstruct(text: &str, spans: &[Range<usize>]) -> String {
        let mut rebuilt = String::new();
        let mut covered = 0usize;
        for span in spans {
            assert!(span.start <= covered, "gap before {span:?}");
            if span.end > covered {
                rebuilt.push_str(&text[covered..span.end]);
                covered = span.end;
            }
        }
        rebuilt
    }

    fn lecture_text() -> String {
        let mut text = String::new();
        for page in 0..4 {
            for sentence in 0..12 {
                text.push_str(&format!(
                    "Page {page} sentence {sentence} explains normalization and keys. "
                ));
            }
            text.push_str("\n\n");
        }
        text
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        let result = RecursiveChunker::new(ChunkingConfig {
            max_chars: 10,
            overlap_chars: 10,
            separators: vec![" ".to_string()],
        });
        assert!(matches!(result, Err(IngestError::InvalidChunkConfig(_))));
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunker(1_000, 200).split_text("Normalization reduces redundancy.");
        assert_eq!(chunks, vec!["Normalization reduces redundancy.".to_string()]);
    }

    #[test]
    fn empty_text_produces_no_chunks() {
        assert!(chunker(1_000, 200).split_text("").is_empty());
        assert!(chunker(1_000, 200).split_text("   \n\n  ").is_empty());
    }

    #[test]
    fn chunks_never_exceed_the_target_size() {
        let text = lecture_text();
        let chunker = chunker(200, 50);
        for span in chunker.chunk_spans(&text) {
            assert!(text[span].chars().count() <= 200);
        }
    }

    #[test]
    fn a_single_oversized_word_is_split_by_character() {
        let word = "x".repeat(45);
        let spans = chunker(20, 5).chunk_spans(&word);
        assert!(spans.len() >= 3);
        for span in &spans {
            assert!(span.len() <= 20);
        }
        assert_eq!(reconstruct(&word, &spans), word);
    }

    #[test]
    fn spans_reconstruct_the_original_text() {
        let text = lecture_text();
        let spans = chunker(180, 40).chunk_spans(&text);
        assert!(spans.len() > 1);
        assert_eq!(reconstruct(&text, &spans), text);
    }

    #[test]
    fn consecutive_chunks_overlap_by_at_most_the_overlap() {
        let text = lecture_text();
        let spans = chunker(180, 60).chunk_spans(&text);
        for pair in spans.windows(2) {
            let overlap = text[pair[1].start..pair[0].end.max(pair[1].start)].chars().count();
            assert!(overlap <= 60, "overlap {overlap} between {pair:?}");
        }
        let overlapping = spans
            .windows(2)
            .filter(|pair| pair[0].end > pair[1].start)
            .count();
        assert!(overlapping > 0);
    }

    #[test]
    fn prefers_sentence_boundaries_over_mid_sentence_cuts() {
        let text = lecture_text();
        let chunks = chunker(180, 40).split_text(&text);
        for chunk in &chunks {
            assert!(chunk.ends_with('.'), "chunk ended mid-sentence: {chunk:?}");
        }
    }

    #[test]
    fn splitting_is_repeatable() {
        let text = lecture_text();
        let chunker = chunker(150, 30);
        assert_eq!(chunker.split_text(&text), chunker.split_text(&text));
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let text = "é".repeat(30);
        let chunks = chunker(8, 2).split_text(&text);
        assert!(!chunks.is_empty());
        for chunk in chunks {
            assert!(chunk.chars().count() <= 8);
        }
    }
}
