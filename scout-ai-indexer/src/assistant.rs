//! Two-step answer facade over a black-box text generator.
//!
//! The generator is consulted twice per question: once to synthesize a
//! structured query from the question, and once to compose the final answer
//! from the routed context. Both prompts are configurable templates; their
//! wording is not load-bearing. Answers are prefixed with the router's
//! provenance preface so the caller can tell which index spoke.

use crate::router::QueryRouter;
use crate::sync::ReadyGate;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Black-box "generate text given prompt" capability.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Prompt templates for the two generation steps.
///
/// `{question}`, `{table_info}` and `{date_time}` are substituted in the
/// query template; `{question}` and `{context}` in the answer template.
#[derive(Debug, Clone)]
pub struct AssistantPrompts {
    pub query_template: String,
    pub answer_template: String,
    pub table_info: String,
}

impl Default for AssistantPrompts {
    fn default() -> Self {
        Self {
            query_template: "### Task\n\
                Generate a SQL query that helps answer this question: {question}\n\
                If the question cannot be answered from the schema, reply \"I don't know\".\n\n\
                ### Schema\n{table_info}\n\n### Current time\n{date_time}\n\n### Query\n"
                .to_string(),
            answer_template: "Use the context to answer the question.\n\n\
                Context:\n{context}\n\nQuestion: {question}\n\nAnswer:"
                .to_string(),
            table_info: "file_metadata(file_path, file_name, file_size, created_at, \
                modified_at, accessed_at) -- one row per indexed file, times are unix seconds"
                .to_string(),
        }
    }
}

/// Answers natural-language questions about the indexed files.
pub struct Assistant {
    generator: Arc<dyn TextGenerator>,
    router: QueryRouter,
    prompts: AssistantPrompts,
    gate: ReadyGate,
}

impl Assistant {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        router: QueryRouter,
        prompts: AssistantPrompts,
        gate: ReadyGate,
    ) -> Self {
        Self {
            generator,
            router,
            prompts,
            gate,
        }
    }

    /// Answer a question, blocking until the pipeline is ready.
    ///
    /// A question issued before the initial reconciliation completes waits
    /// on the gate rather than being answered from a partial index.
    pub async fn answer(&self, question: &str) -> Result<String> {
        self.gate.wait().await?;

        let query_prompt = self
            .prompts
            .query_template
            .replace("{question}", question)
            .replace("{table_info}", &self.prompts.table_info)
            .replace(
                "{date_time}",
                &chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            );
        let generated_query = self.generator.generate(&query_prompt).await?;
        debug!("Generated query: {generated_query}");

        let routed = self.router.resolve(&generated_query, question).await;

        let answer_prompt = self
            .prompts
            .answer_template
            .replace("{context}", &routed.context)
            .replace("{question}", question);
        let answer = self.generator.generate(&answer_prompt).await?;

        Ok(format!("{}{}", routed.provenance.preface(), answer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::ContentParser;
    use crate::router::Provenance;
    use crate::store::{VectorStore, VectorStoreConfig};
    use crate::testing::{HashEmbedder, StaticCatalog};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Generator that replays a scripted sequence of responses.
    struct ScriptedGenerator {
        responses: Mutex<VecDeque<String>>,
    }

    impl ScriptedGenerator {
        fn new(responses: &[&str]) -> Self {
            Self {
                responses: Mutex::new(responses.iter().map(|r| r.to_string()).collect()),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("script exhausted"))
        }
    }

    async fn assistant_with(responses: &[&str]) -> Assistant {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        tokio::fs::write(&path, "the meeting moved to thursday").await.unwrap();

        let store = Arc::new(
            VectorStore::open_memory(
                ContentParser::with_defaults(),
                Arc::new(HashEmbedder::new(32)),
                VectorStoreConfig::default(),
            )
            .await
            .unwrap(),
        );
        store.add(&path.to_string_lossy(), 1).await.unwrap();

        let router = QueryRouter::new(Arc::new(StaticCatalog::new()), store, 5);
        Assistant::new(
            Arc::new(ScriptedGenerator::new(responses)),
            router,
            AssistantPrompts::default(),
            ReadyGate::open(),
        )
    }

    #[tokio::test]
    async fn refusal_answers_from_content_with_preface() {
        let assistant = assistant_with(&["I don't know", "It moved to Thursday."]).await;

        let answer = assistant.answer("when is the meeting?").await.unwrap();
        assert!(answer.starts_with(Provenance::ContentSearch.preface()));
        assert!(answer.ends_with("It moved to Thursday."));
    }

    #[tokio::test]
    async fn failed_structured_query_degrades() {
        // StaticCatalog rejects every structured query, so the router must
        // fall back and the preface must say so.
        let assistant =
            assistant_with(&["SELECT file_name FROM file_metadata", "Best guess."]).await;

        let answer = assistant.answer("what files changed?").await.unwrap();
        assert!(answer.starts_with(Provenance::DegradedFallback.preface()));
    }

    #[tokio::test]
    async fn generator_failure_is_surfaced() {
        let assistant = assistant_with(&[]).await;
        assert!(assistant.answer("anything").await.is_err());
    }
}
