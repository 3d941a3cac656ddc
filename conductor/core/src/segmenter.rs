//! Sentence Segmentation
//!
//! Turns an unbounded stream of text fragments into sentences that can be
//! handed to speech synthesis as soon as they are complete.
//!
//! A sentence boundary is a terminator (`.`, `!`, `?`) immediately followed by
//! one whitespace character. The boundary may straddle two fragments: a
//! terminator at the end of one fragment only counts once the next fragment
//! supplies the whitespace.
//!
//! Sentences are exact slices of the input. Concatenating everything returned
//! by [`SentenceSegmenter::feed`] and [`SentenceSegmenter::flush`] reproduces
//! the fed text byte for byte.

/// Characters that can end a sentence
const TERMINATORS: [char; 3] = ['.', '!', '?'];

/// Incremental sentence splitter for one generation
#[derive(Debug, Default, Clone)]
pub struct SentenceSegmenter {
    buffer: String,
}

impl SentenceSegmenter {
    /// Create an empty segmenter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and return every sentence it completed, in order
    pub fn feed(&mut self, fragment: &str) -> Vec<String> {
        self.buffer.push_str(fragment);

        let ends = boundary_ends(&self.buffer);
        let Some(&last) = ends.last() else {
            return Vec::new();
        };

        let mut sentences = Vec::with_capacity(ends.len());
        let mut start = 0;
        for end in ends {
            sentences.push(self.buffer[start..end].to_string());
            start = end;
        }
        self.buffer.drain(..last);
        sentences
    }

    /// Return the unfinished remainder at end of stream, if any
    pub fn flush(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }

    /// Text received but not yet emitted
    #[must_use]
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Discard buffered text
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

/// Byte offsets just past each terminator+whitespace pair in `text`
///
/// Each boundary is taken from the scan position where it was found, so
/// repeated identical punctuation earlier in the text cannot shift a split.
fn boundary_ends(text: &str) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if !TERMINATORS.contains(&c) {
            continue;
        }
        if let Some(&(ws_pos, ws)) = chars.peek() {
            if ws.is_whitespace() {
                ends.push(ws_pos + ws.len_utf8());
                chars.next();
            }
        }
    }

    ends
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn segment_all(fragments: &[&str]) -> Vec<String> {
        let mut segmenter = SentenceSegmenter::new();
        let mut out = Vec::new();
        for fragment in fragments {
            out.extend(segmenter.feed(fragment));
        }
        out.extend(segmenter.flush());
        out
    }

    #[test]
    fn test_single_sentence_waits_for_whitespace() {
        let mut segmenter = SentenceSegmenter::new();
        assert!(segmenter.feed("Hello there.").is_empty());
        assert_eq!(segmenter.pending(), "Hello there.");
        assert_eq!(segmenter.feed(" "), vec!["Hello there. ".to_string()]);
        assert_eq!(segmenter.pending(), "");
        assert_eq!(segmenter.flush(), None);
    }

    #[test]
    fn test_boundary_crossing_fragments() {
        let mut segmenter = SentenceSegmenter::new();
        assert!(segmenter.feed("Hi.").is_empty());
        assert_eq!(segmenter.feed(" there"), vec!["Hi. ".to_string()]);
        assert!(segmenter.feed(" Bye.").is_empty());
        assert_eq!(segmenter.flush(), Some("there Bye.".to_string()));
    }

    #[test]
    fn test_multiple_boundaries_in_one_feed_resolve_by_position() {
        let mut segmenter = SentenceSegmenter::new();
        let sentences = segmenter.feed("Why? Why not? Because! ");
        assert_eq!(sentences, vec!["Why? ", "Why not? ", "Because! "]);
        assert_eq!(segmenter.flush(), None);
    }

    #[test]
    fn test_repeated_delimiters_with_pending_tail() {
        let mut segmenter = SentenceSegmenter::new();
        assert_eq!(segmenter.feed("Ok? Ok? Ok"), vec!["Ok? ", "Ok? "]);
        assert_eq!(segmenter.pending(), "Ok");
    }

    #[test]
    fn test_chunk_invariance() {
        let text = "Hello. How are you?";
        let whole = segment_all(&[text]);

        let chars: Vec<String> = text.chars().map(String::from).collect();
        let refs: Vec<&str> = chars.iter().map(String::as_str).collect();
        let per_char = segment_all(&refs);

        assert_eq!(whole, vec!["Hello. ", "How are you?"]);
        assert_eq!(whole, per_char);
    }

    #[test]
    fn test_coverage_over_many_chunkings() {
        let text = "Sure! The store opens at 9 a.m. on weekdays.\nAnything else?  Great…  ¡Hola! Done";
        let chars: Vec<char> = text.chars().collect();

        for size in 1..=chars.len() {
            let fragments: Vec<String> = chars
                .chunks(size)
                .map(|chunk| chunk.iter().collect())
                .collect();
            let refs: Vec<&str> = fragments.iter().map(String::as_str).collect();
            let joined: String = segment_all(&refs).concat();
            assert_eq!(joined, text, "chunk size {size}");
        }
    }

    #[test]
    fn test_terminator_needs_whitespace_not_just_any_char() {
        let mut segmenter = SentenceSegmenter::new();
        assert!(segmenter.feed("Version 2.5 is out").is_empty());
        assert!(segmenter.feed("...really?!").is_empty());
        assert_eq!(
            segmenter.feed("\nYes"),
            vec!["Version 2.5 is out...really?!\n".to_string()]
        );
    }

    #[test]
    fn test_unicode_whitespace_is_a_boundary() {
        let mut segmenter = SentenceSegmenter::new();
        assert_eq!(
            segmenter.feed("Fin.\u{00A0}Next"),
            vec!["Fin.\u{00A0}".to_string()]
        );
        assert_eq!(segmenter.pending(), "Next");
    }

    #[test]
    fn test_only_one_whitespace_char_is_consumed() {
        let mut segmenter = SentenceSegmenter::new();
        assert_eq!(segmenter.feed("One.  Two"), vec!["One. ".to_string()]);
        assert_eq!(segmenter.flush(), Some(" Two".to_string()));
    }

    #[test]
    fn test_flush_on_empty_and_reset() {
        let mut segmenter = SentenceSegmenter::new();
        assert_eq!(segmenter.flush(), None);

        segmenter.feed("partial");
        segmenter.reset();
        assert_eq!(segmenter.pending(), "");
        assert_eq!(segmenter.flush(), None);
    }
}
