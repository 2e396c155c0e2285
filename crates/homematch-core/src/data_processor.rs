use crate::corpus::Corpus;
use crate::types::{Fragment, FragmentId, Listing};

/// Character-based splitting parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Upper bound on fragment length, in characters.
    pub chunk_size: usize,
    /// Characters of trailing context repeated at the start of the next fragment.
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: 1000, chunk_overlap: 200 }
    }
}

/// Splits listing bodies into fragments for indexing.
///
/// Paragraphs (blank-line separated) are packed greedily into fragments of at
/// most `chunk_size` characters; a paragraph that alone exceeds the limit is
/// cut into word windows that overlap by about `chunk_overlap` characters.
#[derive(Debug, Clone, Default)]
pub struct DataProcessor {
    chunking_config: ChunkingConfig,
}

impl DataProcessor {
    pub fn new(chunking_config: ChunkingConfig) -> Self { Self { chunking_config } }

    pub fn process_corpus(&self, corpus: &Corpus) -> Vec<Fragment> {
        let fragments: Vec<Fragment> = corpus.listings().iter().flat_map(|l| self.chunk_listing(l)).collect();
        tracing::info!(listings = corpus.len(), fragments = fragments.len(), "chunked corpus");
        fragments
    }

    pub fn chunk_listing(&self, listing: &Listing) -> Vec<Fragment> {
        let pieces = self.split_text(&listing.body);
        let total_chunks = pieces.len();
        pieces
            .into_iter()
            .enumerate()
            .map(|(chunk_index, content)| Fragment { id: FragmentId::new(listing.id.clone(), chunk_index), content, total_chunks })
            .collect()
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        let max = self.chunking_config.chunk_size;
        let mut chunks = Vec::new();
        let mut current = String::new();
        for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
            if char_len(paragraph) > max {
                if !current.is_empty() { chunks.push(std::mem::take(&mut current)); }
                chunks.extend(self.split_paragraph_with_overlap(paragraph));
                continue;
            }
            let joined = if current.is_empty() { char_len(paragraph) } else { char_len(&current) + 2 + char_len(paragraph) };
            if joined > max && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            if !current.is_empty() { current.push_str("\n\n"); }
            current.push_str(paragraph);
        }
        if !current.is_empty() { chunks.push(current); }
        chunks
    }

    fn split_paragraph_with_overlap(&self, paragraph: &str) -> Vec<String> {
        let max = self.chunking_config.chunk_size;
        let overlap = self.chunking_config.chunk_overlap;
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < words.len() {
            let mut end = start;
            let mut len = 0usize;
            while end < words.len() {
                let add = char_len(words[end]) + usize::from(end > start);
                if len + add > max && end > start { break; }
                len += add;
                end += 1;
            }
            chunks.push(words[start..end].join(" "));
            if end >= words.len() { break; }
            // step back over whole words until roughly `overlap` chars are repeated
            let mut back = end;
            let mut carried = 0usize;
            while back > start + 1 && carried + char_len(words[back - 1]) + 1 <= overlap {
                carried += char_len(words[back - 1]) + 1;
                back -= 1;
            }
            start = back;
        }
        chunks
    }
}

fn char_len(s: &str) -> usize { s.chars().count() }

/// Content hash of a fragment set. Two corpora chunk to the same fingerprint
/// only when ids, order and text all agree.
pub fn fingerprint(fragments: &[Fragment]) -> String {
    let mut hasher = blake3::Hasher::new();
    for f in fragments {
        hasher.update(f.id.key().as_bytes());
        hasher.update(&[0]);
        hasher.update(f.content.as_bytes());
        hasher.update(&[0xff]);
    }
    hasher.finalize().to_hex().to_string()
}
