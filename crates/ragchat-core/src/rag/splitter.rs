use crate::rag::Document;
use std::collections::VecDeque;

/// Recursive character splitter.
///
/// Tries each separator in turn (paragraphs, lines, words, characters) and
/// greedily merges the pieces back into chunks of at most `chunk_size`
/// characters, carrying up to `chunk_overlap` characters of trailing
/// context into the next chunk. Separators stay attached to the start of the
/// piece that follows them, so a chunk is always a verbatim slice of the
/// input apart from surrounding whitespace.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            separators: vec![
                "\n\n".to_string(),
                "\n".to_string(),
                " ".to_string(),
                "".to_string(),
            ],
        }
    }

    pub fn with_separators(mut self, separators: Vec<String>) -> Self {
        self.separators = separators;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split text into trimmed, non-empty chunks
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.recursive_split(text, &self.separators)
    }

    /// Split every document, copying its metadata and recording `chunk_index`.
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Document> {
        let mut chunks = Vec::new();

        for document in documents {
            for (index, chunk) in self.split_text(&document.page_content).into_iter().enumerate() {
                let mut piece = Document::new(chunk);
                piece.metadata = document.metadata.clone();
                piece.metadata.insert("chunk_index".to_string(), index.into());
                chunks.push(piece);
            }
        }

        log::debug!("Split {} documents into {} chunks", documents.len(), chunks.len());
        chunks
    }

    fn recursive_split(&self, text: &str, separators: &[String]) -> Vec<String> {
        // First separator present in the text; the empty separator always matches.
        let position = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep.as_str()))
            .unwrap_or(separators.len().saturating_sub(1));

        let separator = separators.get(position).map(String::as_str).unwrap_or("");
        let remaining = separators.get(position + 1..).unwrap_or(&[]);

        let splits = split_keeping_separator(text, separator);

        let mut final_chunks = Vec::new();
        let mut good_splits: Vec<&str> = Vec::new();

        for split in splits {
            if char_len(split) < self.chunk_size {
                good_splits.push(split);
                continue;
            }

            if !good_splits.is_empty() {
                final_chunks.extend(self.merge_splits(&good_splits));
                good_splits.clear();
            }

            if remaining.is_empty() {
                let trimmed = split.trim();
                if !trimmed.is_empty() {
                    final_chunks.push(trimmed.to_string());
                }
            } else {
                final_chunks.extend(self.recursive_split(split, remaining));
            }
        }

        if !good_splits.is_empty() {
            final_chunks.extend(self.merge_splits(&good_splits));
        }

        final_chunks
    }

    /// Pieces already carry their separators, so they are joined as is.
    fn merge_splits(&self, splits: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0;

        for split in splits {
            let len = char_len(split);

            if total + len > self.chunk_size {
                if total > self.chunk_size {
                    log::warn!(
                        "Created a chunk of size {}, which is longer than the specified {}",
                        total,
                        self.chunk_size
                    );
                }

                if !current.is_empty() {
                    push_joined(&mut chunks, &current);

                    while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                        let Some(first) = current.pop_front() else {
                            break;
                        };
                        total -= char_len(first);
                    }
                }
            }

            current.push_back(split);
            total += len;
        }

        push_joined(&mut chunks, &current);
        chunks
    }
}

/// Split `text` before every occurrence of `separator`; the empty separator
/// splits into characters. Empty pieces are dropped.
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
        pieces.push(&text[start..index]);
        start = index;
    }
    pieces.push(&text[start..]);

    pieces.retain(|piece| !piece.is_empty());
    pieces
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn push_joined(chunks: &mut Vec<String>, parts: &VecDeque<&str>) {
    let joined: String = parts.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}
