// Conversational retrieval chain: condense the follow-up, retrieve, answer

use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::database::{StoredChunk, VectorIndex};
use crate::embeddings::Embedder;
use crate::llm::{ChatModel, ChatTurn, Role};

pub const SYSTEM_PROMPT: &str = "\
You are PyPSA-AI-Helper, a friendly and expert AI assistant for the PyPSA (Python for Power System Analysis) community. Your purpose is to answer user questions accurately based on the provided context.

Your knowledge base includes the documentation, source code, configuration files, and GitHub issues/pull requests for the following repositories: pypsa, pypsa-eur, and pypsa-earth.

Follow these rules strictly:
1.  Base your answers *only* on the information provided in the CONTEXT section. Do not use any external knowledge or make assumptions.
2.  If the context does not contain the answer to the question, you MUST state that you cannot answer with the provided information. Do not try to guess.
3.  Be helpful and conversational. Address the user directly.
4.  When presenting code or configuration snippets, use Markdown code blocks for proper formatting.
5.  Cite your sources from the metadata of the provided context documents when possible to help users find more information.
";

const CONDENSE_PREAMBLE: &str = "\
Given the following conversation and a follow up question, rephrase the follow up question to be a standalone question, in its original language.";

/// Finds the chunks most relevant to a question
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<StoredChunk>>;
}

/// Retriever backed by the persisted index and the embedding model that built it
pub struct IndexRetriever {
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
}

impl IndexRetriever {
    #[inline]
    pub fn new(index: VectorIndex, embedder: Arc<dyn Embedder>) -> Result<Self> {
        if index.dimension() != embedder.dimension() {
            return Err(anyhow::anyhow!(
                "Index at {} has {} dimensions but the embedding model produces {}",
                index.root().display(),
                index.dimension(),
                embedder.dimension()
            ));
        }
        Ok(Self { index, embedder })
    }
}

#[async_trait]
impl Retriever for IndexRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<StoredChunk>> {
        let query_vector = self
            .embedder
            .embed_query(query)
            .await
            .context("Failed to embed question")?;
        let hits = self.index.search(&query_vector, k).await?;
        Ok(hits.into_iter().map(|hit| hit.chunk).collect())
    }
}

/// Result of one chain invocation
#[derive(Debug, Clone)]
pub struct ChainAnswer {
    pub answer: String,
    pub standalone_question: String,
    pub sources: Vec<StoredChunk>,
}

pub struct RetrievalChain {
    retriever: Arc<dyn Retriever>,
    llm: Arc<dyn ChatModel>,
    k: usize,
}

impl RetrievalChain {
    #[inline]
    pub fn new(retriever: Arc<dyn Retriever>, llm: Arc<dyn ChatModel>, k: usize) -> Self {
        Self {
            retriever,
            llm,
            k: k.max(1),
        }
    }

    /// Answer `question` in the light of `history` (oldest turn first)
    #[inline]
    pub async fn invoke(&self, question: &str, history: &[ChatTurn]) -> Result<ChainAnswer> {
        let standalone_question = if history.is_empty() {
            question.to_string()
        } else {
            let prompt = render_condense_prompt(history, question);
            let condensed = self
                .llm
                .complete_prompt(&prompt)
                .await
                .context("Failed to condense follow-up question")?;
            debug!("Condensed question: {}", condensed.trim());
            condensed.trim().to_string()
        };

        let sources = self
            .retriever
            .retrieve(&standalone_question, self.k)
            .await
            .context("Failed to retrieve context")?;
        info!("Retrieved {} context chunks", sources.len());

        let prompt = render_answer_prompt(&render_context(&sources), &standalone_question);
        let answer = self
            .llm
            .complete_prompt(&prompt)
            .await
            .context("Failed to generate answer")?;

        Ok(ChainAnswer {
            answer,
            standalone_question,
            sources,
        })
    }
}

/// `Human:`/`Assistant:` transcript used by the condense prompt
#[inline]
pub fn render_history(history: &[ChatTurn]) -> String {
    history
        .iter()
        .map(|turn| match turn.role {
            Role::User => format!("Human: {}", turn.content),
            Role::Assistant => format!("Assistant: {}", turn.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// History and question are inserted verbatim
#[inline]
pub fn render_condense_prompt(history: &[ChatTurn], question: &str) -> String {
    format!(
        "{CONDENSE_PREAMBLE}\n\nChat History:\n{}\nFollow Up Input: {question}\nStandalone question:",
        render_history(history)
    )
}

/// Retrieved chunks, each headed by the metadata the answer may cite
#[inline]
pub fn render_context(chunks: &[StoredChunk]) -> String {
    let mut context = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i > 0 {
            context.push_str("\n\n");
        }
        let _ = writeln!(
            context,
            "[Source: {} ({})]",
            chunk.source(),
            chunk.repository()
        );
        context.push_str(&chunk.content);
    }
    context
}

#[inline]
pub fn render_answer_prompt(context: &str, question: &str) -> String {
    format!(
        "{}\n\n    CONTEXT: {}\n\n    QUESTION: {}\n\n    YOUR ANSWER:",
        SYSTEM_PROMPT, context, question
    )
}
