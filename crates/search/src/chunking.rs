use crate::error::{Result, SearchError};
use unicode_segmentation::UnicodeSegmentation;

/// Default maximum chunk length, in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Split text blocks into chunks of at most `max_chars` characters.
///
/// Sentences are packed greedily into a chunk until the next one would overflow it.
/// A sentence longer than `max_chars` is split on word boundaries, and a single word
/// longer than `max_chars` is cut by characters. Chunks never span two blocks.
pub fn break_into_chunks<S: AsRef<str>>(blocks: &[S], max_chars: usize) -> Result<Vec<String>> {
    if max_chars == 0 {
        return Err(SearchError::InvalidChunkSize(max_chars));
    }

    let mut chunks = Vec::new();
    for block in blocks {
        let mut current = String::new();
        let mut current_len = 0usize;

        for piece in sentence_pieces(block.as_ref(), max_chars) {
            let piece_len = piece.chars().count();
            if current_len + piece_len > max_chars && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            current.push_str(&piece);
            current_len += piece_len;
        }

        if !current.trim().is_empty() {
            chunks.push(current);
        }
    }

    chunks.retain(|chunk| !chunk.trim().is_empty());
    Ok(chunks)
}

fn sentence_pieces(text: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    for sentence in text.split_sentence_bounds() {
        if sentence.chars().count() <= max_chars {
            pieces.push(sentence.to_string());
        } else {
            pieces.extend(word_pieces(sentence, max_chars));
        }
    }
    pieces
}

fn word_pieces(sentence: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in sentence.split_word_bounds() {
        let word_len = word.chars().count();
        if word_len > max_chars {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
                current_len = 0;
            }
            pieces.extend(hard_split(word, max_chars));
            continue;
        }
        if current_len + word_len > max_chars {
            pieces.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

fn hard_split(word: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    chars
        .chunks(max_chars)
        .map(|part| part.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = "Many marine animals migrate between foraging areas and reproductive sites, \
often timing the return migration with extreme precision. In theory, the decision to return should \
reflect energy acquisition at foraging areas, energetic costs associated with transit, and timing \
arrival for successful reproduction. Elephant seals migrate thousands of kilometers.";

    fn assert_all_words_appear(text: &str, chunks: &[String]) {
        let joined = chunks.concat();
        for word in text.split_whitespace() {
            assert!(joined.contains(word), "missing word {word:?}");
        }
    }

    #[test]
    fn chunks_respect_size_limit() {
        for size in [20, 50, 100, 500] {
            let chunks = break_into_chunks(&[ARTICLE], size).unwrap();
            assert!(chunks.iter().all(|c| c.chars().count() <= size), "size {size}");
            assert_all_words_appear(ARTICLE, &chunks);
        }
    }

    #[test]
    fn short_sentences_are_packed_together() {
        let chunks = break_into_chunks(&["One. Two. Three."], 100).unwrap();
        assert_eq!(chunks, vec!["One. Two. Three.".to_string()]);
    }

    #[test]
    fn long_sentence_splits_on_words() {
        let chunks = break_into_chunks(&["alpha beta gamma delta"], 11).unwrap();
        assert_eq!(chunks, vec!["alpha beta ", "gamma delta"]);
    }

    #[test]
    fn overlong_word_is_cut() {
        let chunks = break_into_chunks(&["abcdefghij"], 4).unwrap();
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn blocks_do_not_merge() {
        let chunks = break_into_chunks(&["First.", "Second."], 100).unwrap();
        assert_eq!(chunks, vec!["First.", "Second."]);
    }

    #[test]
    fn zero_size_is_rejected() {
        assert!(matches!(
            break_into_chunks(&["x"], 0),
            Err(SearchError::InvalidChunkSize(0))
        ));
    }
}
