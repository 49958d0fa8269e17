//! Best-chunk selection over a search response.
//!
//! Every chunk of every result group competes on `similarityScore`. The first
//! chunk with the highest score wins; later chunks need a strictly higher score
//! to replace it.

use crate::{ScoredChunk, SearchResponse};

/// Upper bound on the snippet length, in characters.
pub const MAX_SNIPPET_CHARS: usize = 500;

/// The winning chunk and its surroundings.
#[derive(Debug, Clone, PartialEq)]
pub struct BestMatch {
    /// `sourceId` of the winning chunk (`None` when absent or empty).
    pub source_id: Option<String>,
    /// `fromDocument` of the group holding the winning chunk.
    pub from_document: Option<String>,
    /// Score of the winning chunk.
    pub score: f64,
    /// Excerpt built from the winning group's chunks.
    pub snippet: Option<String>,
}

/// Result of scanning a whole response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    /// Highest-scoring chunk, if any chunk carried a score.
    pub best: Option<BestMatch>,
    /// Every distinct non-empty source id, in first-seen order.
    pub source_ids: Vec<String>,
}

/// Pick the highest-scoring chunk across all result groups.
pub fn select_best(response: &SearchResponse) -> Selection {
    let mut source_ids: Vec<String> = Vec::new();
    // (group index, score, source id)
    let mut winner: Option<(usize, f64, Option<String>)> = None;

    for (group_idx, group) in response.results.iter().enumerate() {
        for scored in &group.chunks {
            let Some(chunk) = &scored.chunk else {
                continue;
            };

            let source_id = chunk
                .source_id
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty());

            if let Some(sid) = source_id {
                if !source_ids.iter().any(|seen| seen == sid) {
                    source_ids.push(sid.to_string());
                }
            }

            let Some(score) = scored.similarity_score else {
                continue;
            };

            let beats = match &winner {
                Some((_, best, _)) => score > *best,
                None => true,
            };
            if beats {
                winner = Some((group_idx, score, source_id.map(String::from)));
            }
        }
    }

    let best = winner.map(|(group_idx, score, source_id)| {
        let group = &response.results[group_idx];
        BestMatch {
            source_id,
            from_document: group.from_document.clone().filter(|d| !d.is_empty()),
            score,
            snippet: build_snippet(&group.chunks, MAX_SNIPPET_CHARS),
        }
    });

    Selection { best, source_ids }
}

/// Join the trimmed `rawContent` of `chunks` into at most `max_chars` characters.
///
/// Each piece is cut to the remaining budget; pieces are separated by one space.
pub fn build_snippet(chunks: &[ScoredChunk], max_chars: usize) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    let mut total = 0usize;

    for scored in chunks {
        if total >= max_chars {
            break;
        }

        let raw = scored
            .chunk
            .as_ref()
            .and_then(|c| c.raw_content.as_deref())
            .unwrap_or("")
            .trim();
        if raw.is_empty() {
            continue;
        }

        let part: String = raw.chars().take(max_chars - total).collect();
        total += part.chars().count();
        parts.push(part);
    }

    if parts.is_empty() {
        return None;
    }

    let joined = parts.join(" ");
    let snippet: String = joined.trim().chars().take(max_chars).collect();
    Some(snippet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Chunk, SearchResultGroup};

    fn chunk(source_id: &str, raw: &str, score: Option<f64>) -> ScoredChunk {
        ScoredChunk {
            chunk: Some(Chunk {
                source_id: Some(source_id.into()),
                raw_content: Some(raw.into()),
            }),
            similarity_score: score,
        }
    }

    fn group(from: &str, chunks: Vec<ScoredChunk>) -> SearchResultGroup {
        SearchResultGroup {
            from_document: Some(from.into()),
            chunks,
        }
    }

    #[test]
    fn picks_highest_score_across_groups() {
        let response = SearchResponse {
            results: vec![
                group("doc-1", vec![chunk("a", "alpha", Some(0.5)), chunk("b", "beta", Some(0.7))]),
                group("doc-2", vec![chunk("c", "gamma", Some(0.9)), chunk("d", "delta", Some(0.2))]),
            ],
        };

        let selection = select_best(&response);
        let best = selection.best.unwrap();
        assert_eq!(best.source_id.as_deref(), Some("c"));
        assert_eq!(best.from_document.as_deref(), Some("doc-2"));
        assert_eq!(best.score, 0.9);
        assert_eq!(best.snippet.as_deref(), Some("gamma delta"));
        assert_eq!(selection.source_ids, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn first_seen_wins_ties() {
        let response = SearchResponse {
            results: vec![
                group("doc-1", vec![chunk("first", "x", Some(0.8))]),
                group("doc-2", vec![chunk("second", "y", Some(0.8))]),
            ],
        };

        let best = select_best(&response).best.unwrap();
        assert_eq!(best.source_id.as_deref(), Some("first"));
        assert_eq!(best.from_document.as_deref(), Some("doc-1"));
    }

    #[test]
    fn unscored_and_empty_chunks_are_skipped() {
        let response = SearchResponse {
            results: vec![group(
                "doc-1",
                vec![
                    ScoredChunk {
                        chunk: None,
                        similarity_score: Some(0.99),
                    },
                    chunk("no-score", "text", None),
                    chunk("scored", "text", Some(0.3)),
                ],
            )],
        };

        let selection = select_best(&response);
        assert_eq!(selection.best.unwrap().source_id.as_deref(), Some("scored"));
        assert_eq!(selection.source_ids, vec!["no-score", "scored"]);
    }

    #[test]
    fn empty_response_has_no_best() {
        let selection = select_best(&SearchResponse::default());
        assert!(selection.best.is_none());
        assert!(selection.source_ids.is_empty());
    }

    #[test]
    fn duplicate_source_ids_listed_once() {
        let response = SearchResponse {
            results: vec![group(
                "doc-1",
                vec![chunk("same", "a", Some(0.1)), chunk("same", "b", Some(0.2))],
            )],
        };
        assert_eq!(select_best(&response).source_ids, vec!["same"]);
    }

    #[test]
    fn snippet_is_capped() {
        let long = "x".repeat(400);
        let chunks = vec![
            chunk("a", &long, Some(0.1)),
            chunk("a", &long, Some(0.1)),
            chunk("a", "never reached", Some(0.1)),
        ];

        let snippet = build_snippet(&chunks, MAX_SNIPPET_CHARS).unwrap();
        assert_eq!(snippet.chars().count(), MAX_SNIPPET_CHARS);
        assert!(!snippet.contains("never"));
    }

    #[test]
    fn snippet_counts_characters_not_bytes() {
        let accented = "avaliação ".repeat(80);
        let chunks = vec![chunk("a", &accented, Some(0.1))];
        let snippet = build_snippet(&chunks, MAX_SNIPPET_CHARS).unwrap();
        assert!(snippet.chars().count() <= MAX_SNIPPET_CHARS);
        assert!(snippet.starts_with("avaliação"));
    }

    #[test]
    fn snippet_trims_pieces() {
        let chunks = vec![chunk("a", "  first \r\n", Some(0.1)), chunk("a", "\tsecond ", Some(0.1))];
        assert_eq!(build_snippet(&chunks, MAX_SNIPPET_CHARS).as_deref(), Some("first second"));
    }

    #[test]
    fn snippet_none_without_content() {
        let chunks = vec![chunk("a", "   ", Some(0.1))];
        assert!(build_snippet(&chunks, MAX_SNIPPET_CHARS).is_none());
    }
}
