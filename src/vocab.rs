//! Caption vocabulary and decoding utilities.
//!
//! Provides the word/index mapping with sentinel tokens, caption
//! encoding/padding, and the sampling strategies used when decoding.

use std::collections::HashMap;
use ndarray::{Array1, ArrayView1};

/// Padding token, index 0. Padded positions are ignored by the loss.
pub const NULL_TOKEN: &str = "<NULL>";
/// Start-of-caption token, index 1. Fed to the RNN as the first input word.
pub const START_TOKEN: &str = "<START>";
/// End-of-caption token, index 2. Sampling stops once every row emitted it.
pub const END_TOKEN: &str = "<END>";

/// Errors raised by vocabulary operations
#[derive(Debug, PartialEq, Eq)]
pub enum VocabError {
    UnknownWord(String),
    CaptionTooLong { words: usize, max_words: usize },
    MissingSentinels,
}

impl std::fmt::Display for VocabError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VocabError::UnknownWord(word) => write!(f, "Word not in vocabulary: {:?}", word),
            VocabError::CaptionTooLong { words, max_words } => {
                write!(f, "Caption has {} words but at most {} fit the padded length", words, max_words)
            }
            VocabError::MissingSentinels => write!(f, "Token list does not start with the sentinel tokens"),
        }
    }
}

impl std::error::Error for VocabError {}

/// Bidirectional word/index mapping with sentinel tokens.
///
/// Indices 0..3 are always `<NULL>`, `<START>`, `<END>` in that order;
/// real words follow in first-seen order.
#[derive(Clone, Debug)]
pub struct Vocabulary {
    word_to_idx: HashMap<String, usize>,
    idx_to_word: Vec<String>,
}

impl Vocabulary {
    /// Build a vocabulary from a word list. Sentinels are inserted first;
    /// duplicates and repeated sentinels are ignored.
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vocab = Vocabulary {
            word_to_idx: HashMap::new(),
            idx_to_word: Vec::new(),
        };

        for sentinel in [NULL_TOKEN, START_TOKEN, END_TOKEN] {
            vocab.insert(sentinel);
        }
        for word in words {
            vocab.insert(word.as_ref());
        }

        vocab
    }

    /// Build a vocabulary from whitespace-tokenized captions.
    pub fn from_captions<'a, I>(captions: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self::from_words(captions.into_iter().flat_map(|c| c.split_whitespace()))
    }

    /// Rebuild a vocabulary from an index-ordered token list (used when
    /// loading a saved model). The list must begin with the sentinels.
    pub fn from_ordered_tokens(tokens: Vec<String>) -> Result<Self, VocabError> {
        let sentinels_ok = tokens.len() >= 3
            && tokens[0] == NULL_TOKEN
            && tokens[1] == START_TOKEN
            && tokens[2] == END_TOKEN;
        if !sentinels_ok {
            return Err(VocabError::MissingSentinels);
        }

        let word_to_idx = tokens.iter()
            .enumerate()
            .map(|(i, w)| (w.clone(), i))
            .collect();

        Ok(Vocabulary { word_to_idx, idx_to_word: tokens })
    }

    fn insert(&mut self, word: &str) {
        if !self.word_to_idx.contains_key(word) {
            self.word_to_idx.insert(word.to_string(), self.idx_to_word.len());
            self.idx_to_word.push(word.to_string());
        }
    }

    /// Get index for a word.
    pub fn word_to_index(&self, word: &str) -> Option<usize> {
        self.word_to_idx.get(word).copied()
    }

    /// Get word for an index.
    pub fn index_to_word(&self, idx: usize) -> Option<&str> {
        self.idx_to_word.get(idx).map(|s| s.as_str())
    }

    /// Get vocabulary size, sentinels included.
    pub fn size(&self) -> usize {
        self.idx_to_word.len()
    }

    /// Check if a word is in the vocabulary.
    pub fn contains(&self, word: &str) -> bool {
        self.word_to_idx.contains_key(word)
    }

    /// All tokens in index order, sentinels first.
    pub fn tokens(&self) -> &[String] {
        &self.idx_to_word
    }

    pub fn null_index(&self) -> usize {
        0
    }

    pub fn start_index(&self) -> usize {
        1
    }

    pub fn end_index(&self) -> usize {
        2
    }

    /// Encode a caption as `<START> words <END>` padded with `<NULL>` to
    /// exactly `pad_to` indices.
    pub fn encode_caption(&self, caption: &str, pad_to: usize) -> Result<Vec<usize>, VocabError> {
        let words: Vec<&str> = caption.split_whitespace().collect();
        if words.len() + 2 > pad_to {
            return Err(VocabError::CaptionTooLong { words: words.len(), max_words: pad_to.saturating_sub(2) });
        }

        let mut indices = Vec::with_capacity(pad_to);
        indices.push(self.start_index());
        for word in words {
            let idx = self.word_to_index(word)
                .ok_or_else(|| VocabError::UnknownWord(word.to_string()))?;
            indices.push(idx);
        }
        indices.push(self.end_index());
        indices.resize(pad_to, self.null_index());

        Ok(indices)
    }

    /// Decode sampled indices into a caption string, stopping at `<END>`
    /// and skipping the other sentinels.
    pub fn decode(&self, indices: &[usize]) -> String {
        let mut words = Vec::new();

        for &idx in indices {
            if idx == self.end_index() {
                break;
            }
            if idx == self.null_index() || idx == self.start_index() {
                continue;
            }
            if let Some(word) = self.index_to_word(idx) {
                words.push(word);
            }
        }

        words.join(" ")
    }
}

/// Get argmax (greedy decoding).
pub fn argmax(logits: &ArrayView1<f64>) -> usize {
    logits.iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

/// Sample an index from logits with temperature scaling.
///
/// Higher temperature = more random, lower = closer to argmax.
pub fn sample_with_temperature(logits: &ArrayView1<f64>, temperature: f64) -> usize {
    assert!(temperature > 0.0, "Temperature must be positive");

    let scaled: Array1<f64> = logits.mapv(|v| v / temperature);
    let probs = crate::loss::softmax(&scaled.view());

    let mut rng_val = rand::random::<f64>();
    for (i, &prob) in probs.iter().enumerate() {
        rng_val -= prob;
        if rng_val <= 0.0 {
            return i;
        }
    }

    probs.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn test_sentinels_have_fixed_indices() {
        let vocab = Vocabulary::from_words(["a", "cat"]);
        assert_eq!(vocab.word_to_index(NULL_TOKEN), Some(0));
        assert_eq!(vocab.word_to_index(START_TOKEN), Some(1));
        assert_eq!(vocab.word_to_index(END_TOKEN), Some(2));
        assert_eq!(vocab.word_to_index("a"), Some(3));
        assert_eq!(vocab.word_to_index("cat"), Some(4));
        assert_eq!(vocab.size(), 5);
    }

    #[test]
    fn test_from_captions_dedups() {
        let vocab = Vocabulary::from_captions(["a cat sat", "a dog sat"]);
        assert_eq!(vocab.size(), 3 + 4); // sentinels + {a, cat, sat, dog}
        assert!(vocab.contains("dog"));
        assert!(!vocab.contains("bird"));
    }

    #[test]
    fn test_encode_caption_pads_with_null() {
        let vocab = Vocabulary::from_captions(["a cat sat"]);
        let encoded = vocab.encode_caption("cat sat", 6).unwrap();

        assert_eq!(encoded.len(), 6);
        assert_eq!(encoded[0], vocab.start_index());
        assert_eq!(encoded[3], vocab.end_index());
        assert_eq!(encoded[4], vocab.null_index());
        assert_eq!(encoded[5], vocab.null_index());
    }

    #[test]
    fn test_encode_caption_unknown_word() {
        let vocab = Vocabulary::from_captions(["a cat"]);
        let err = vocab.encode_caption("a bird", 6).unwrap_err();
        assert_eq!(err, VocabError::UnknownWord("bird".to_string()));
    }

    #[test]
    fn test_encode_caption_too_long() {
        let vocab = Vocabulary::from_captions(["a cat sat down"]);
        let err = vocab.encode_caption("a cat sat down", 4).unwrap_err();
        assert!(matches!(err, VocabError::CaptionTooLong { .. }));
    }

    #[test]
    fn test_decode_stops_at_end() {
        let vocab = Vocabulary::from_captions(["a cat sat"]);
        let a = vocab.word_to_index("a").unwrap();
        let cat = vocab.word_to_index("cat").unwrap();
        let sat = vocab.word_to_index("sat").unwrap();

        let decoded = vocab.decode(&[a, cat, vocab.end_index(), sat]);
        assert_eq!(decoded, "a cat");
    }

    #[test]
    fn test_ordered_tokens_round_trip() {
        let vocab = Vocabulary::from_captions(["a cat sat"]);
        let rebuilt = Vocabulary::from_ordered_tokens(vocab.tokens().to_vec()).unwrap();

        assert_eq!(rebuilt.size(), vocab.size());
        assert_eq!(rebuilt.word_to_index("sat"), vocab.word_to_index("sat"));
    }

    #[test]
    fn test_ordered_tokens_requires_sentinels() {
        let err = Vocabulary::from_ordered_tokens(vec!["a".to_string(), "b".to_string()]).unwrap_err();
        assert_eq!(err, VocabError::MissingSentinels);
    }

    #[test]
    fn test_argmax() {
        let logits = arr1(&[1.0, 5.0, 2.0]);
        assert_eq!(argmax(&logits.view()), 1);
    }

    #[test]
    fn test_sample_with_temperature_in_range() {
        let logits = arr1(&[1.0, 2.0, 3.0]);
        let idx = sample_with_temperature(&logits.view(), 1.0);
        assert!(idx < 3);
    }

    #[test]
    fn test_sample_with_low_temperature_is_peaked() {
        let logits = arr1(&[0.0, 10.0, 0.0]);
        let idx = sample_with_temperature(&logits.view(), 0.1);
        assert_eq!(idx, 1);
    }
}
