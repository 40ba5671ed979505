//! Token-bounded rolling memory used to build prompt history.

use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

use super::providers::TokenCounter;
use super::token_counter::ApproxTokenCounter;

pub const DEFAULT_MAX_TOKEN_LIMIT: usize = 400;

const HUMAN_PREFIX: &str = "Human";
const AI_PREFIX: &str = "AI";

/// Bounded conversation memory of one session.
pub trait ConversationMemory: Send {
    /// Append an input/output pair, evicting oldest turns past the budget.
    fn save(&mut self, input: &str, output: &str) -> Result<()>;

    /// Current contents as prompt text, empty string when empty.
    fn load(&self) -> String;

    fn clear(&mut self) -> Result<()>;

    /// Approximate token count of the retained turns.
    fn token_count(&self) -> usize;
}

/// Creates a fresh memory for each new session.
pub trait MemoryProvider: Send + Sync {
    fn create(&self) -> Box<dyn ConversationMemory>;
}

#[derive(Debug, Clone)]
struct Turn {
    input: String,
    output: String,
    tokens: usize,
}

impl Turn {
    fn render(&self) -> String {
        render_turn(&self.input, &self.output)
    }
}

fn render_turn(input: &str, output: &str) -> String {
    format!("{HUMAN_PREFIX}: {input}\n{AI_PREFIX}: {output}")
}

/// FIFO turn buffer capped by an approximate token budget.
pub struct TokenBufferMemory {
    turns: VecDeque<Turn>,
    token_total: usize,
    max_token_limit: usize,
    counter: Arc<dyn TokenCounter>,
}

impl TokenBufferMemory {
    pub fn new(max_token_limit: usize, counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            turns: VecDeque::new(),
            token_total: 0,
            max_token_limit,
            counter,
        }
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    fn enforce_budget(&mut self) {
        // The newest turn always survives, even when it alone is over budget
        while self.token_total > self.max_token_limit && self.turns.len() > 1 {
            if let Some(evicted) = self.turns.pop_front() {
                self.token_total -= evicted.tokens;
                debug!(
                    "Evicted oldest turn ({} tokens), {} tokens retained",
                    evicted.tokens, self.token_total
                );
            }
        }
    }
}

impl ConversationMemory for TokenBufferMemory {
    fn save(&mut self, input: &str, output: &str) -> Result<()> {
        let tokens = self
            .counter
            .count_tokens(&render_turn(input, output))
            .context("Failed to count tokens for new turn")?;

        self.turns.push_back(Turn {
            input: input.to_string(),
            output: output.to_string(),
            tokens,
        });
        self.token_total += tokens;
        self.enforce_budget();

        Ok(())
    }

    fn load(&self) -> String {
        self.turns
            .iter()
            .map(Turn::render)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn clear(&mut self) -> Result<()> {
        self.turns.clear();
        self.token_total = 0;
        Ok(())
    }

    fn token_count(&self) -> usize {
        self.token_total
    }
}

/// Builds [`TokenBufferMemory`] instances sharing one counter.
#[derive(Clone)]
pub struct TokenBufferMemoryProvider {
    max_token_limit: usize,
    counter: Arc<dyn TokenCounter>,
}

impl TokenBufferMemoryProvider {
    pub fn new(max_token_limit: usize, counter: Arc<dyn TokenCounter>) -> Self {
        Self { max_token_limit, counter }
    }
}

impl Default for TokenBufferMemoryProvider {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TOKEN_LIMIT, Arc::new(ApproxTokenCounter::default()))
    }
}

impl MemoryProvider for TokenBufferMemoryProvider {
    fn create(&self) -> Box<dyn ConversationMemory> {
        Box::new(TokenBufferMemory::new(self.max_token_limit, self.counter.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::conversation::providers::MockTokenCounter;

    fn memory(limit: usize) -> TokenBufferMemory {
        // 1 token per word keeps the arithmetic readable
        TokenBufferMemory::new(limit, Arc::new(ApproxTokenCounter::new(1.0)))
    }

    #[test]
    fn test_empty_memory_loads_empty_string() {
        assert_eq!(memory(400).load(), "");
    }

    #[test]
    fn test_load_renders_turns_in_order() {
        let mut mem = memory(400);
        mem.save("What is 2+2?", "4").unwrap();
        mem.save("And 3+3?", "6").unwrap();

        assert_eq!(
            mem.load(),
            "Human: What is 2+2?\nAI: 4\nHuman: And 3+3?\nAI: 6"
        );
    }

    #[test]
    fn test_eviction_drops_oldest_keeps_newest() {
        // "Human: first question\nAI: first answer" = 6 words
        let mut mem = memory(15);
        mem.save("first question", "first answer").unwrap();
        mem.save("second question", "second answer").unwrap();
        mem.save("third question", "third answer").unwrap();

        let text = mem.load();
        assert!(!text.contains("first question"));
        assert!(text.contains("second question"));
        assert!(text.contains("third answer"));
        assert_eq!(mem.turn_count(), 2);
        assert!(mem.token_count() <= 15);
    }

    #[test]
    fn test_oversized_turn_is_never_evicted_when_just_added() {
        let mut mem = memory(5);
        mem.save("short", "ok").unwrap();
        let long_answer = "lorem ".repeat(50);
        mem.save("tell me everything", &long_answer).unwrap();

        let text = mem.load();
        assert!(!text.contains("Human: short"));
        assert!(text.contains("tell me everything"));
        assert_eq!(mem.turn_count(), 1);
    }

    #[test]
    fn test_clear_resets_turns_and_counter() {
        let mut mem = memory(400);
        mem.save("a", "b").unwrap();
        assert!(mem.token_count() > 0);

        mem.clear().unwrap();
        assert_eq!(mem.load(), "");
        assert_eq!(mem.token_count(), 0);
    }

    #[test]
    fn test_counter_failure_leaves_memory_untouched() {
        let mut counter = MockTokenCounter::new();
        counter
            .expect_count_tokens()
            .returning(|_| Err(anyhow::anyhow!("tokenizer unavailable")));

        let mut mem = TokenBufferMemory::new(400, Arc::new(counter));
        let err = mem.save("q", "a").unwrap_err();

        assert!(format!("{:#}", err).contains("tokenizer unavailable"));
        assert_eq!(mem.load(), "");
        assert_eq!(mem.token_count(), 0);
    }

    #[test]
    fn test_provider_creates_independent_memories() {
        let provider = TokenBufferMemoryProvider::default();
        let mut a = provider.create();
        let b = provider.create();

        a.save("hello", "hi").unwrap();
        assert!(!a.load().is_empty());
        assert_eq!(b.load(), "");
    }
}
