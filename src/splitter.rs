/// Recursive character text splitter.
///
/// Splits text on the first separator from an ordered list that occurs in
/// it, merges the pieces back into chunks of at most `chunk_size`
/// characters, and recurses with the remaining separators on any piece that
/// is still too long. Lengths are counted in `char`s.
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::warn;

use crate::document::Document;

pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SplitterError {
    #[error("chunk_size must be positive")]
    ZeroChunkSize,

    #[error("chunk_overlap ({overlap}) must be smaller than chunk_size ({size})")]
    OverlapTooLarge { overlap: usize, size: usize },
}

#[derive(Debug, Clone)]
pub struct RecursiveCharacterTextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveCharacterTextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, SplitterError> {
        if chunk_size == 0 {
            return Err(SplitterError::ZeroChunkSize);
        }
        if chunk_overlap >= chunk_size {
            return Err(SplitterError::OverlapTooLarge {
                overlap: chunk_overlap,
                size: chunk_size,
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Replace the separator list. An empty list falls back to splitting
    /// into characters.
    #[must_use]
    pub fn with_separators(mut self, separators: Vec<String>) -> Self {
        self.separators = if separators.is_empty() {
            vec![String::new()]
        } else {
            separators
        };
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    /// Split each text into chunk documents.
    ///
    /// `metadatas[i]` is copied onto every chunk of `texts[i]` (missing
    /// entries mean empty metadata), and `loc.lines.{from,to}` records the
    /// 1-based line span of the chunk in its source text.
    pub fn create_documents(
        &self,
        texts: &[String],
        metadatas: &[Map<String, Value>],
    ) -> Vec<Document> {
        let mut documents = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            let base = metadatas.get(i).cloned().unwrap_or_default();
            let mut line = 1usize;
            // (byte offset, byte length) of the previous chunk in `text`
            let mut prev: Option<(usize, usize)> = None;

            for chunk in self.split_text(text) {
                let search_from = prev.map_or(0, |(index, _)| next_char_boundary(text, index + 1));
                let index = text[search_from..]
                    .find(chunk.as_str())
                    .map(|offset| offset + search_from);

                if let Some(index) = index {
                    match prev {
                        None => line += count_newlines(&text[..index]),
                        Some((prev_index, prev_len)) => {
                            let prev_end = prev_index + prev_len;
                            if prev_end < index {
                                line += count_newlines(&text[prev_end..index]);
                            } else if prev_end > index {
                                line = line.saturating_sub(count_newlines(&text[index..prev_end]));
                            }
                        }
                    }
                }

                let newlines = count_newlines(&chunk);
                let mut metadata = base.clone();
                let mut loc = match metadata.remove("loc") {
                    Some(Value::Object(existing)) => existing,
                    _ => Map::new(),
                };
                loc.insert("lines".to_string(), json!({ "from": line, "to": line + newlines }));
                metadata.insert("loc".to_string(), Value::Object(loc));

                line += newlines;
                if let Some(index) = index {
                    prev = Some((index, chunk.len()));
                }

                documents.push(Document {
                    page_content: chunk,
                    metadata,
                });
            }
        }

        documents
    }

    pub fn split_documents(&self, documents: &[Document]) -> Vec<Document> {
        let texts: Vec<String> = documents.iter().map(|d| d.page_content.clone()).collect();
        let metadatas: Vec<Map<String, Value>> =
            documents.iter().map(|d| d.metadata.clone()).collect();
        self.create_documents(&texts, &metadatas)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = separators.last().map_or("", String::as_str);
        let mut remaining: Option<&[String]> = None;

        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = "";
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate;
                remaining = Some(&separators[i + 1..]).filter(|rest| !rest.is_empty());
                break;
            }
        }

        let splits: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split(separator).filter(|s| !s.is_empty()).collect()
        };

        let mut chunks = Vec::new();
        let mut good_splits: Vec<&str> = Vec::new();

        for split in splits {
            if char_len(split) < self.chunk_size {
                good_splits.push(split);
                continue;
            }

            if !good_splits.is_empty() {
                chunks.extend(self.merge_splits(&good_splits, separator));
                good_splits.clear();
            }

            match remaining {
                Some(rest) => chunks.extend(self.split_recursive(split, rest)),
                None => chunks.push(split.to_string()),
            }
        }

        if !good_splits.is_empty() {
            chunks.extend(self.merge_splits(&good_splits, separator));
        }

        chunks
    }

    /// Greedily join pieces into chunks no longer than `chunk_size`, carrying
    /// up to `chunk_overlap` characters of trailing pieces into the next chunk.
    fn merge_splits(&self, splits: &[&str], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut total = 0usize;

        for &split in splits {
            let len = char_len(split);

            if total + len + current.len() * separator_len > self.chunk_size {
                if total > self.chunk_size {
                    warn!(
                        "Created a chunk of size {total}, which is longer than the specified {}",
                        self.chunk_size
                    );
                }

                if !current.is_empty() {
                    if let Some(chunk) = join_pieces(&current, separator) {
                        chunks.push(chunk);
                    }

                    while total > self.chunk_overlap
                        || (total + len + current.len() * separator_len > self.chunk_size
                            && total > 0)
                    {
                        if current.is_empty() {
                            break;
                        }
                        total -= char_len(current.remove(0));
                    }
                }
            }

            current.push(split);
            total += len;
        }

        if let Some(chunk) = join_pieces(&current, separator) {
            chunks.push(chunk);
        }

        chunks
    }
}

fn join_pieces(pieces: &[&str], separator: &str) -> Option<String> {
    let joined = pieces.join(separator);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn count_newlines(s: &str) -> usize {
    s.matches('\n').count()
}

fn next_char_boundary(s: &str, mut index: usize) -> usize {
    while index < s.len() && !s.is_char_boundary(index) {
        index += 1;
    }
    index.min(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines_of(doc: &Document) -> (u64, u64) {
        let lines = &doc.metadata["loc"]["lines"];
        (lines["from"].as_u64().unwrap(), lines["to"].as_u64().unwrap())
    }

    #[test]
    fn test_rejects_bad_sizes() {
        assert_eq!(
            RecursiveCharacterTextSplitter::new(0, 0).unwrap_err(),
            SplitterError::ZeroChunkSize
        );
        assert_eq!(
            RecursiveCharacterTextSplitter::new(10, 10).unwrap_err(),
            SplitterError::OverlapTooLarge { overlap: 10, size: 10 }
        );
    }

    #[test]
    fn test_split_short_text() {
        let splitter = RecursiveCharacterTextSplitter::new(500, 0).unwrap();
        let chunks = splitter.split_text("Paragraph 1\n\nParagraph 2\n\nParagraph 3");
        assert_eq!(chunks, vec!["Paragraph 1\n\nParagraph 2\n\nParagraph 3"]);
    }

    #[test]
    fn test_split_empty_and_whitespace() {
        let splitter = RecursiveCharacterTextSplitter::new(500, 0).unwrap();
        assert!(splitter.split_text("").is_empty());
        assert!(splitter.split_text("   \n\n   \n\n   ").is_empty());
    }

    #[test]
    fn test_iterative_splitting_with_overlap() {
        let text = "Hi.\n\nI'm Harrison.\n\nHow? Are? You?\nOkay then f f f f.\nThis is a weird text to write, but gotta test the splittingggg some how.\n\n\nBye!\n\n-H.";
        let splitter = RecursiveCharacterTextSplitter::new(10, 1).unwrap();
        let chunks = splitter.split_text(text);
        let expected = vec![
            "Hi.",
            "I'm",
            "Harrison.",
            "How? Are?",
            "You?",
            "Okay then",
            "f f f f.",
            "This is a",
            "a weird",
            "text to",
            "write, but",
            "gotta test",
            "the",
            "splittingg",
            "ggg",
            "some how.",
            "Bye!\n\n-H.",
        ];
        assert_eq!(chunks, expected);
    }

    #[test]
    fn test_chunks_respect_size() {
        let para = "Test paragraph. ".repeat(50);
        let content = vec![para; 10].join("\n\n");
        let splitter = RecursiveCharacterTextSplitter::new(500, 0).unwrap();
        let chunks = splitter.split_text(&content);

        assert!(chunks.len() >= 10);
        for chunk in &chunks {
            assert!(!chunk.is_empty());
            assert!(chunk.chars().count() <= 500, "chunk too long: {}", chunk.len());
        }
    }

    #[test]
    fn test_split_multibyte_text() {
        let text = "これは日本語のテストです。".repeat(20);
        let splitter = RecursiveCharacterTextSplitter::new(50, 5).unwrap();
        let chunks = splitter.split_text(&text);

        assert!(chunks.len() >= 5);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 50);
        }
    }

    #[test]
    fn test_custom_separators() {
        let splitter = RecursiveCharacterTextSplitter::new(5, 0)
            .unwrap()
            .with_separators(vec!["|".to_string()]);
        // no further separator: oversized pieces are kept whole
        assert_eq!(splitter.split_text("ab|cd|efghijk"), vec!["ab|cd", "efghijk"]);
    }

    #[test]
    fn test_create_documents_line_locations() {
        let text = "first line\nsecond line\n\nthird paragraph here".to_string();
        let splitter = RecursiveCharacterTextSplitter::new(25, 0).unwrap();
        let mut meta = Map::new();
        meta.insert("source".to_string(), json!("https://example.com"));

        let docs = splitter.create_documents(&[text], &[meta]);

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].page_content, "first line\nsecond line");
        assert_eq!(lines_of(&docs[0]), (1, 2));
        assert_eq!(docs[1].page_content, "third paragraph here");
        assert_eq!(lines_of(&docs[1]), (4, 4));
        for doc in &docs {
            assert_eq!(doc.source(), Some("https://example.com"));
        }
    }

    #[test]
    fn test_create_documents_leading_newlines() {
        let text = "\n\n\nbody text".to_string();
        let splitter = RecursiveCharacterTextSplitter::new(100, 0).unwrap();
        let docs = splitter.create_documents(&[text], &[]);

        assert_eq!(docs.len(), 1);
        assert_eq!(lines_of(&docs[0]), (4, 4));
    }

    #[test]
    fn test_split_documents_keeps_existing_loc() {
        let mut doc = Document::new("alpha beta gamma delta").with_metadata("source", "page");
        doc.metadata.insert("loc".to_string(), json!({ "page": 3 }));

        let splitter = RecursiveCharacterTextSplitter::new(12, 0).unwrap();
        let chunks = splitter.split_documents(&[doc]);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].page_content, "alpha beta");
        assert_eq!(chunks[1].page_content, "gamma delta");
        for chunk in &chunks {
            assert_eq!(chunk.metadata["loc"]["page"], json!(3));
            assert_eq!(lines_of(chunk), (1, 1));
        }
    }
}
