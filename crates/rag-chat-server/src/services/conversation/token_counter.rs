use anyhow::Result;
use unicode_segmentation::UnicodeSegmentation;

use super::providers::TokenCounter;

/// Word-based token estimate, ~1.3 tokens per word for mixed prose.
#[derive(Debug, Clone, Copy)]
pub struct ApproxTokenCounter {
    tokens_per_word: f64,
}

impl ApproxTokenCounter {
    pub fn new(tokens_per_word: f64) -> Self {
        Self { tokens_per_word }
    }

    pub fn count_text(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        let words = text.unicode_words().count();
        // Punctuation-only text still costs something
        ((words as f64 * self.tokens_per_word).ceil() as usize).max(1)
    }
}

impl Default for ApproxTokenCounter {
    fn default() -> Self {
        Self::new(1.3)
    }
}

impl TokenCounter for ApproxTokenCounter {
    fn count_tokens(&self, text: &str) -> Result<usize> {
        Ok(self.count_text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_text() {
        let counter = ApproxTokenCounter::default();
        // 2 words * 1.3 = 2.6 -> 3
        assert_eq!(counter.count_text("Hello world"), 3);
        // 10 words * 1.3 = 13
        assert_eq!(counter.count_text(&"word ".repeat(10)), 13);
    }

    #[test]
    fn test_empty_text() {
        assert_eq!(ApproxTokenCounter::default().count_text(""), 0);
    }

    #[test]
    fn test_punctuation_only_counts_one() {
        assert_eq!(ApproxTokenCounter::default().count_text("?!"), 1);
    }

    #[test]
    fn test_custom_ratio() {
        let counter = ApproxTokenCounter::new(1.0);
        assert_eq!(counter.count_tokens("one two three").unwrap(), 3);
    }
}
