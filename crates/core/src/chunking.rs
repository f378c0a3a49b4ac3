use crate::models::{ChunkDraft, IngestionOptions};

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl ChunkingConfig {
    pub fn step(&self) -> usize {
        self.max_chars.saturating_sub(self.overlap_chars).max(1)
    }
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            max_chars: value.chunk_max_chars,
            overlap_chars: value.chunk_overlap_chars,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextWindow {
    pub content: String,
    pub start_char: usize,
    pub end_char: usize,
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn chunk_text(text: &str, config: ChunkingConfig) -> Vec<TextWindow> {
    if text.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let width = config.max_chars.max(1);
    let step = config.step();

    let mut windows = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + width).min(chars.len());
        windows.push(TextWindow {
            content: chars[start..end].iter().collect(),
            start_char: start,
            end_char: end,
        });
        if end == chars.len() {
            break;
        }
        start = start.saturating_add(step);
    }

    windows
}

/// Chunks every page in order; pages are numbered from 1 and `chunk_index`
/// runs across all pages from 0.
pub fn chunk_pages<S: AsRef<str>>(pages: &[S], config: ChunkingConfig) -> Vec<ChunkDraft> {
    let mut drafts = Vec::new();

    for (position, page_text) in pages.iter().enumerate() {
        let page = u32::try_from(position + 1).unwrap_or(u32::MAX);
        for window in chunk_text(page_text.as_ref(), config) {
            drafts.push(ChunkDraft {
                chunk_index: drafts.len(),
                content: window.content,
                page: Some(page),
                start_char: window.start_char,
                end_char: window.end_char,
            });
        }
    }

    drafts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_chars: usize, overlap_chars: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_chars,
            overlap_chars,
        }
    }

    #[test]
    fn whitespace_is_normalized() {
        let input = "A  \t  lot\r\nof \u{a0}  spacing ";
        assert_eq!(normalize_whitespace(input), "A lot of spacing");
    }

    #[test]
    fn empty_page_yields_no_chunks() {
        assert!(chunk_text("", config(10, 2)).is_empty());
        let drafts = chunk_pages(&["", "abc"], config(10, 2));
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].page, Some(2));
    }

    #[test]
    fn windows_cover_the_page_without_gaps() {
        let text: String = ('a'..='z').cycle().take(137).collect();
        for (max_chars, overlap) in [(10, 0), (10, 3), (10, 9), (50, 10), (200, 20)] {
            let windows = chunk_text(&text, config(max_chars, overlap));
            assert_eq!(windows[0].start_char, 0);
            assert_eq!(windows.last().map(|w| w.end_char), Some(text.len()));
            for pair in windows.windows(2) {
                assert!(pair[1].start_char <= pair[0].end_char);
                assert!(pair[1].start_char > pair[0].start_char);
            }
            for window in &windows[..windows.len() - 1] {
                assert_eq!(window.end_char - window.start_char, max_chars);
            }
        }
    }

    #[test]
    fn degenerate_overlap_still_terminates() {
        let windows = chunk_text("abcdef", config(3, 3));
        assert_eq!(windows.len(), 4);
        assert_eq!(windows[1].start_char, 1);
        assert_eq!(windows.last().map(|w| w.end_char), Some(6));

        let windows = chunk_text("abcdef", config(3, 10));
        assert!(!windows.is_empty());

        let windows = chunk_text("abc", config(0, 0));
        assert_eq!(windows.len(), 3);
    }

    #[test]
    fn offsets_count_characters_not_bytes() {
        let windows = chunk_text("héllo wörld", config(5, 1));
        assert_eq!(windows[0].content, "héllo");
        assert_eq!(windows[1].start_char, 4);
        assert_eq!(windows[1].content, "o wör");
    }

    #[test]
    fn two_page_document_produces_expected_windows() {
        let first = "x".repeat(1_000);
        let second = "y".repeat(50);
        let drafts = chunk_pages(&[first, second], ChunkingConfig::from(&IngestionOptions::default()));

        let spans: Vec<_> = drafts
            .iter()
            .map(|draft| (draft.chunk_index, draft.page, draft.start_char, draft.end_char))
            .collect();
        assert_eq!(
            spans,
            vec![
                (0, Some(1), 0, 800),
                (1, Some(1), 720, 1_000),
                (2, Some(2), 0, 50),
            ]
        );
    }

    #[test]
    fn chunk_indices_are_contiguous() {
        let pages = vec!["a".repeat(95), String::new(), "b".repeat(31), "c".repeat(7)];
        let drafts = chunk_pages(&pages, config(10, 4));
        let indices: Vec<_> = drafts.iter().map(|draft| draft.chunk_index).collect();
        assert_eq!(indices, (0..drafts.len()).collect::<Vec<_>>());
    }
}
