//! Context assembly for retrieval-augmented prompts.

use crate::store::{IndexStore, ScoredChunk, validate_k};

use super::types::{RagPrompt, RetrievalError};

/// Separator placed between retrieved chunk texts.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Default number of neighbours used for prompts.
pub const DEFAULT_K: usize = 5;

/// Render the fixed question-answering template.
///
/// Context and question are inserted verbatim; braces inside either are not interpreted.
pub fn render_prompt(context: &str, question: &str) -> String {
    format!(
        "Answer the question based only on the following context:\n\n\
         {context}\n\n\
         ---\n\n\
         Answer the question based on the above context: {question}"
    )
}

/// Concatenate chunk texts in rank order.
pub fn join_context(results: &[ScoredChunk]) -> String {
    results
        .iter()
        .map(|hit| hit.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Search `collection` for `query_text` and render the prompt from the top `k` chunks.
///
/// An empty collection yields an empty context block, not an error.
pub async fn build_prompt(
    store: &IndexStore,
    collection: &str,
    query_text: &str,
    k: usize,
) -> Result<RagPrompt, RetrievalError> {
    validate_k(k)?;
    let handle = store.open(collection).await?;
    let results = store.similarity_search(&handle, query_text, k).await?;
    tracing::info!(collection, k, hits = results.len(), "Context retrieved");

    let context = join_context(&results);
    Ok(RagPrompt {
        prompt: render_prompt(&context, query_text),
        results,
    })
}
