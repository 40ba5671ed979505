use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

use crate::config::PromptsConfig;

use super::providers::Generator;
use super::types::AnswerStrategy;

/// Number of passages requested from a bound retriever
pub const RETRIEVAL_TOP_K: usize = 3;

pub const CHAT_HISTORY_PLACEHOLDER: &str = "{{CHAT_HISTORY}}";
pub const CONTEXT_PLACEHOLDER: &str = "{{CONTEXT}}";

const ANSWER_RULES: &str = "If you don't know the answer, say that you don't know. \
Use three sentences maximum and keep the answer concise.";

/// System prompt template with history and context placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate(String);

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn default_rag() -> Self {
        Self::with_persona(
            "You are an assistant for question-answering tasks. \
             Use the following recent chat history and retrieved context to answer the question.",
        )
    }

    pub fn default_general() -> Self {
        Self::with_persona(
            "You are a helpful general-purpose assistant. \
             Answer the user's question clearly.",
        )
    }

    fn with_persona(persona: &str) -> Self {
        Self(format!(
            "{} {}\n\nRecent chat history:\n{}\n\nContext:\n{}",
            persona, ANSWER_RULES, CHAT_HISTORY_PLACEHOLDER, CONTEXT_PLACEHOLDER
        ))
    }

    pub fn render(&self, chat_history: &str, context: &str) -> String {
        self.0
            .replace(CHAT_HISTORY_PLACEHOLDER, chat_history)
            .replace(CONTEXT_PLACEHOLDER, context)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Everything handed to the generator for one query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPrompt {
    pub system_prompt: String,
    pub user_input: String,
    pub context: String,
    /// Passages behind `context`, kept for logging only
    pub passages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedAnswer {
    pub answer: String,
    pub passages_used: usize,
}

/// Renders the RAG or general prompt and calls the generator.
pub struct AnswerComposer {
    generator: Arc<dyn Generator>,
    rag_template: PromptTemplate,
    general_template: PromptTemplate,
}

impl AnswerComposer {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator,
            rag_template: PromptTemplate::default_rag(),
            general_template: PromptTemplate::default_general(),
        }
    }

    pub fn with_prompts(generator: Arc<dyn Generator>, prompts: &PromptsConfig) -> Self {
        Self {
            generator,
            rag_template: prompts
                .rag_system_prompt
                .clone()
                .map(PromptTemplate::new)
                .unwrap_or_else(PromptTemplate::default_rag),
            general_template: prompts
                .general_system_prompt
                .clone()
                .map(PromptTemplate::new)
                .unwrap_or_else(PromptTemplate::default_general),
        }
    }

    pub fn rag_template(&self) -> &PromptTemplate {
        &self.rag_template
    }

    pub fn general_template(&self) -> &PromptTemplate {
        &self.general_template
    }

    /// Build the prompt for `query`. Only the RAG branch touches the retriever.
    pub async fn render_prompt(
        &self,
        query: &str,
        recent_history: &str,
        strategy: &AnswerStrategy,
    ) -> Result<ComposedPrompt> {
        let (template, passages) = match strategy {
            AnswerStrategy::WithRetrieval(binding) => {
                let passages = binding.retriever().top_k(query, RETRIEVAL_TOP_K).await?;
                debug!("Retrieved {} passages for query", passages.len());
                (&self.rag_template, passages)
            }
            AnswerStrategy::NoRetrieval => (&self.general_template, Vec::new()),
        };

        let context = passages.join("\n\n");

        Ok(ComposedPrompt {
            system_prompt: template.render(recent_history, &context),
            user_input: query.to_string(),
            context,
            passages,
        })
    }

    pub async fn compose(
        &self,
        query: &str,
        recent_history: &str,
        strategy: &AnswerStrategy,
    ) -> Result<ComposedAnswer> {
        let prompt = self.render_prompt(query, recent_history, strategy).await?;

        let generated = self
            .generator
            .generate(&prompt.system_prompt, &prompt.user_input, &prompt.context)
            .await?;

        Ok(ComposedAnswer {
            answer: generated.answer,
            passages_used: prompt.passages.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::conversation::providers::{GeneratedAnswer, MockGenerator, MockRetriever};
    use crate::services::conversation::types::RetrievalBinding;
    use mockall::predicate::{always, eq};

    fn binding(retriever: MockRetriever) -> AnswerStrategy {
        AnswerStrategy::WithRetrieval(RetrievalBinding::new(Arc::new(retriever)))
    }

    fn unused_generator() -> Arc<dyn Generator> {
        let mut generator = MockGenerator::new();
        generator.expect_generate().never();
        Arc::new(generator)
    }

    #[test]
    fn test_templates_share_constraints() {
        for template in [PromptTemplate::default_rag(), PromptTemplate::default_general()] {
            let rendered = template.render("HISTORY", "CONTEXT");
            assert!(rendered.contains("three sentences maximum"));
            assert!(rendered.contains("say that you don't know"));
            assert!(rendered.contains("Recent chat history:\nHISTORY"));
            assert!(rendered.contains("Context:\nCONTEXT"));
            assert!(rendered.starts_with("You are"));
        }
    }

    #[tokio::test]
    async fn test_general_prompt_has_empty_context() {
        let composer = AnswerComposer::new(unused_generator());
        let prompt = composer
            .render_prompt("What is 2+2?", "", &AnswerStrategy::NoRetrieval)
            .await
            .unwrap();

        assert_eq!(prompt.context, "");
        assert_eq!(prompt.user_input, "What is 2+2?");
        assert!(prompt.system_prompt.contains("general-purpose assistant"));
        assert!(prompt.system_prompt.ends_with("Context:\n"));
    }

    #[tokio::test]
    async fn test_rag_prompt_requests_top_three() {
        let mut retriever = MockRetriever::new();
        retriever
            .expect_top_k()
            .with(eq("What is this document about?"), eq(3))
            .times(1)
            .returning(|_, _| Ok(vec!["Apples are fruits.".to_string()]));

        let composer = AnswerComposer::new(unused_generator());
        let prompt = composer
            .render_prompt(
                "What is this document about?",
                "Human: hi\nAI: hello",
                &binding(retriever),
            )
            .await
            .unwrap();

        assert_eq!(prompt.context, "Apples are fruits.");
        assert!(prompt.system_prompt.contains("Context:\nApples are fruits."));
        assert!(prompt.system_prompt.contains("Human: hi\nAI: hello"));
        assert!(prompt.system_prompt.contains("question-answering"));
    }

    #[tokio::test]
    async fn test_compose_passes_rendered_prompt_to_generator() {
        let mut generator = MockGenerator::new();
        generator
            .expect_generate()
            .with(always(), eq("What is 2+2?"), eq(""))
            .times(1)
            .returning(|_, _, _| Ok(GeneratedAnswer::new("4")));

        let composer = AnswerComposer::new(Arc::new(generator));
        let composed = composer
            .compose("What is 2+2?", "", &AnswerStrategy::NoRetrieval)
            .await
            .unwrap();

        assert_eq!(composed.answer, "4");
        assert_eq!(composed.passages_used, 0);
    }

    #[tokio::test]
    async fn test_retriever_fault_skips_generation() {
        let mut retriever = MockRetriever::new();
        retriever
            .expect_top_k()
            .returning(|_, _| Err(anyhow::anyhow!("index unavailable")));

        let composer = AnswerComposer::new(unused_generator());
        let err = composer
            .compose("q", "", &binding(retriever))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "index unavailable");
    }

    #[test]
    fn test_prompt_overrides() {
        let prompts = PromptsConfig {
            rag_system_prompt: Some("RAG {{CHAT_HISTORY}} | {{CONTEXT}}".to_string()),
            general_system_prompt: None,
        };
        let composer = AnswerComposer::with_prompts(unused_generator(), &prompts);

        assert_eq!(composer.rag_template().render("h", "c"), "RAG h | c");
        assert_eq!(composer.general_template(), &PromptTemplate::default_general());
    }
}
