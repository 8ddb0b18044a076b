use crate::error::ConfigError;

/// Default maximum chunk length in characters
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default number of characters shared by neighbouring chunks
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Cut points are tried in this order; the empty separator cuts anywhere
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Represents a text chunk with metadata
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// The actual text content of this chunk
    pub text: String,
    /// Name of the file this chunk belongs to
    pub source: String,
    /// Starting character position of this chunk in the original document
    pub start_position: usize,
    /// Position of this chunk among the chunks of its source
    pub index: usize,
}

/// Splits text into overlapping chunks of bounded length
#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        TextSplitter {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ConfigError> {
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(ConfigError::InvalidChunking {
                size: chunk_size,
                overlap: chunk_overlap,
            });
        }
        Ok(TextSplitter {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split text into plain chunk strings
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_spans(text)
            .into_iter()
            .map(|(_, chunk)| chunk)
            .collect()
    }

    /// Split the text of one source document into chunks carrying provenance
    pub fn split_into_chunks(&self, text: &str, source: &str) -> Vec<TextChunk> {
        self.split_spans(text)
            .into_iter()
            .enumerate()
            .map(|(index, (start_position, text))| TextChunk {
                text,
                source: source.to_string(),
                start_position,
                index,
            })
            .collect()
    }

    /// Walk the text window by window, returning `(char offset, chunk)` pairs.
    /// Each chunk after the first starts `chunk_overlap` characters before the
    /// previous one ended.
    fn split_spans(&self, text: &str) -> Vec<(usize, String)> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let mut spans = Vec::new();
        let mut start = 0;

        loop {
            if chars.len() - start <= self.chunk_size {
                spans.push((start, chars[start..].iter().collect()));
                break;
            }

            let window_end = start + self.chunk_size;
            let min_cut = start + self.chunk_overlap;
            let cut = find_cut(&chars, min_cut, window_end, &SEPARATORS);

            spans.push((start, chars[start..cut].iter().collect()));
            start = cut - self.chunk_overlap;
        }

        spans
    }
}

/// Pick the cut point for the window ending at `window_end`: just after the
/// last occurrence of the first separator that leaves the cut beyond `min_cut`.
/// Falls through the separator list recursively; the empty separator
/// cuts at the window end.
fn find_cut(chars: &[char], min_cut: usize, window_end: usize, separators: &[&str]) -> usize {
    let Some((separator, rest)) = separators.split_first() else {
        return window_end;
    };

    if separator.is_empty() {
        return window_end;
    }

    let sep: Vec<char> = separator.chars().collect();
    let mut cut = window_end;
    while cut > min_cut {
        if cut >= sep.len() && chars[cut - sep.len()..cut] == sep[..] {
            return cut;
        }
        cut -= 1;
    }

    find_cut(chars, min_cut, window_end, rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Undo the overlap and glue the chunks back together
    fn rejoin(chunks: &[String], overlap: usize) -> String {
        let mut out = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(chunk);
            } else {
                out.extend(chunk.chars().skip(overlap));
            }
        }
        out
    }

    fn assert_invariants(text: &str, size: usize, overlap: usize) {
        let splitter = TextSplitter::new(size, overlap).unwrap();
        let chunks = splitter.split_text(text);

        for chunk in &chunks {
            assert!(
                chunk.chars().count() <= size,
                "chunk {:?} is longer than {}",
                chunk,
                size
            );
        }

        for pair in chunks.windows(2) {
            let prev: Vec<char> = pair[0].chars().collect();
            let next: Vec<char> = pair[1].chars().collect();
            assert_eq!(&prev[prev.len() - overlap..], &next[..overlap]);
        }

        assert_eq!(rejoin(&chunks, overlap), text);
    }

    #[test]
    fn test_short_text_is_a_single_chunk() {
        let splitter = TextSplitter::default();
        let chunks = splitter.split_into_chunks("Hello world", "a.txt");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello world");
        assert_eq!(chunks[0].source, "a.txt");
        assert_eq!(chunks[0].start_position, 0);
    }

    #[test]
    fn test_blank_text_has_no_chunks() {
        let splitter = TextSplitter::default();
        assert!(splitter.split_text("").is_empty());
        assert!(splitter.split_text(" \n\n\t ").is_empty());
    }

    #[test]
    fn test_cat_and_dog_scenario() {
        let text = "The cat sat. The dog ran.";
        let splitter = TextSplitter::new(10, 3).unwrap();
        let chunks = splitter.split_text(text);

        assert!(chunks.len() > 1);
        assert_eq!(chunks[0], "The cat ");
        assert_invariants(text, 10, 3);
    }

    #[test]
    fn test_prefers_paragraph_breaks() {
        let text = "First paragraph here.\n\nSecond paragraph follows with more words.";
        let splitter = TextSplitter::new(30, 5).unwrap();
        let chunks = splitter.split_text(text);
        assert_eq!(chunks[0], "First paragraph here.\n\n");
        assert_invariants(text, 30, 5);
    }

    #[test]
    fn test_falls_back_to_raw_characters() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let splitter = TextSplitter::new(10, 2).unwrap();
        let chunks = splitter.split_text(text);
        assert_eq!(chunks[0], "abcdefghij");
        assert_eq!(chunks[1], "ijklmnopqr");
        assert_invariants(text, 10, 2);
    }

    #[test]
    fn test_invariants_hold_for_varied_parameters() {
        let text = "Lorem ipsum dolor sit amet, consectetur adipiscing elit.\n\
                    Sed do eiusmod tempor incididunt ut labore et dolore magna aliqua.\n\n\
                    Ut enim ad minim veniam, quis nostrud exercitation ullamco laboris \
                    nisi ut aliquip ex ea commodo consequat. Duis aute irure dolor.";
        for (size, overlap) in [(10, 0), (10, 9), (25, 5), (40, 10), (100, 20), (1000, 200)] {
            assert_invariants(text, size, overlap);
        }
    }

    #[test]
    fn test_multibyte_characters_count_as_one() {
        let text = "über straße café naïve résumé jalapeño";
        assert_invariants(text, 8, 2);
    }

    #[test]
    fn test_start_positions_track_offsets() {
        let text = "one two three four five six seven eight nine ten";
        let splitter = TextSplitter::new(12, 4).unwrap();
        let chars: Vec<char> = text.chars().collect();
        for chunk in splitter.split_into_chunks(text, "n.txt") {
            let expected: String = chars
                [chunk.start_position..chunk.start_position + chunk.text.chars().count()]
                .iter()
                .collect();
            assert_eq!(chunk.text, expected);
        }
    }

    #[test]
    fn test_is_deterministic() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let splitter = TextSplitter::new(15, 4).unwrap();
        assert_eq!(splitter.split_text(text), splitter.split_text(text));
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_size() {
        assert!(TextSplitter::new(10, 10).is_err());
        assert!(TextSplitter::new(10, 12).is_err());
        assert!(TextSplitter::new(0, 0).is_err());
    }
}
