
use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::sources::Document;

/// Separators tried in order, from Python syntax boundaries down to single characters
pub const PYTHON_SEPARATORS: [&str; 7] = ["\nclass ", "\ndef ", "\n\tdef ", "\n\n", "\n", " ", ""];

/// A bounded slice of a document, the unit of retrieval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// The chunk text
    pub content: String,
    /// Metadata copied from the parent document
    pub metadata: BTreeMap<String, String>,
}

/// Configuration for content chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Characters carried over from the end of one chunk into the next
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 2000,
            chunk_overlap: 200,
        }
    }
}

/// Split every document into chunks, preserving document order
#[inline]
pub fn chunk_documents(documents: &[Document], config: &ChunkingConfig) -> Vec<Chunk> {
    let chunks: Vec<Chunk> = documents
        .iter()
        .flat_map(|doc| chunk_document(doc, config))
        .collect();

    debug!(
        "Chunked {} documents into {} chunks (avg {} chars)",
        documents.len(),
        chunks.len(),
        chunks.iter().map(|c| char_len(&c.content)).sum::<usize>() / chunks.len().max(1)
    );

    chunks
}

/// Split a single document; each chunk inherits the document metadata
#[inline]
pub fn chunk_document(document: &Document, config: &ChunkingConfig) -> Vec<Chunk> {
    split_text(&document.content, config)
        .into_iter()
        .map(|content| Chunk {
            content,
            metadata: document.metadata.clone(),
        })
        .collect()
}

/// Recursively split text on the Python separator list
///
/// Every returned piece is at most `chunk_size` characters and has no leading
/// or trailing whitespace. Pieces produced by the same merge step share up to
/// `chunk_overlap` characters with their predecessor.
#[inline]
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    split_recursive(text, &PYTHON_SEPARATORS, config)
}

fn split_recursive(text: &str, separators: &[&str], config: &ChunkingConfig) -> Vec<String> {
    let mut final_chunks = Vec::new();

    // Pick the first separator present in the text
    let mut separator = separators.last().copied().unwrap_or("");
    let mut remaining: &[&str] = &[];
    for (i, &candidate) in separators.iter().enumerate() {
        if candidate.is_empty() {
            separator = candidate;
            break;
        }
        if text.contains(candidate) {
            separator = candidate;
            remaining = &separators[i + 1..];
            break;
        }
    }

    let mut good_splits: Vec<&str> = Vec::new();
    for piece in split_keeping_separator(text, separator) {
        if char_len(piece) < config.chunk_size {
            good_splits.push(piece);
            continue;
        }

        if !good_splits.is_empty() {
            final_chunks.extend(merge_splits(&good_splits, config));
            good_splits.clear();
        }

        if remaining.is_empty() {
            final_chunks.push(piece.to_string());
        } else {
            final_chunks.extend(split_recursive(piece, remaining, config));
        }
    }

    if !good_splits.is_empty() {
        final_chunks.extend(merge_splits(&good_splits, config));
    }

    final_chunks
}

/// Split on `separator`, keeping it at the start of the following piece
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (index, _) in text.match_indices(separator) {
        if index > start {
            pieces.push(&text[start..index]);
        }
        start = index;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }

    pieces
}

/// Greedily merge small pieces into chunks, carrying overlap forward
fn merge_splits(splits: &[&str], config: &ChunkingConfig) -> Vec<String> {
    let mut docs = Vec::new();
    let mut current: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    for &piece in splits {
        let len = char_len(piece);

        if total + len > config.chunk_size {
            if total > config.chunk_size {
                warn!(
                    "Created a chunk of size {}, which is longer than the specified {}",
                    total, config.chunk_size
                );
            }

            if !current.is_empty() {
                push_joined(&current, &mut docs);

                // Drop from the front until only the overlap tail remains
                while total > config.chunk_overlap
                    || (total + len > config.chunk_size && total > 0)
                {
                    let Some(first) = current.pop_front() else {
                        break;
                    };
                    total -= char_len(first);
                }
            }
        }

        current.push_back(piece);
        total += len;
    }

    push_joined(&current, &mut docs);
    docs
}

fn push_joined(pieces: &VecDeque<&str>, docs: &mut Vec<String>) {
    let joined: String = pieces.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

/// Length in Unicode scalar values
#[inline]
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}
