//! Query routing: structured index first, vector similarity as fallback.
//!
//! The router receives a generated query (usually SQL synthesized upstream
//! from the user's question) plus the original question, and decides which
//! index answers. Its provenance annotation is part of the contract: it
//! tells the consumer how much to trust the returned context.

use crate::catalog::FileCatalog;
use crate::store::VectorStore;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

static STRUCTURED_QUERY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(select|with)\b").unwrap());

const REFUSAL_MARKERS: &[&str] = &["i don't know", "i do not know"];

/// Which retrieval path produced the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// The structured index answered the generated query.
    StructuredIndex,
    /// The generator declined to produce a query; file contents were
    /// searched directly.
    ContentSearch,
    /// The structured query failed or returned nothing; the answer came
    /// from content search and may be off.
    DegradedFallback,
    /// The generated query was neither a refusal nor structured; nothing
    /// was retrieved.
    Unrouted,
}

impl Provenance {
    /// User-facing preface communicating confidence.
    pub fn preface(&self) -> &'static str {
        match self {
            Provenance::StructuredIndex => "I was able to query the file index.\n\n",
            Provenance::ContentSearch => "I was able to check file contents for this.\n\n",
            Provenance::DegradedFallback => {
                "I was unable to query the file index, the following answer may be incorrect.\n\n"
            }
            Provenance::Unrouted => "",
        }
    }
}

/// Context text plus its provenance annotation.
#[derive(Debug, Clone)]
pub struct RoutedContext {
    pub context: String,
    pub provenance: Provenance,
}

fn is_refusal(query: &str) -> bool {
    let lowered = query.to_lowercase();
    REFUSAL_MARKERS.iter().any(|marker| lowered.contains(marker))
}

fn is_structured_query(query: &str) -> bool {
    STRUCTURED_QUERY.is_match(query)
}

/// Routes generated queries across the catalog and the vector store.
pub struct QueryRouter {
    catalog: Arc<dyn FileCatalog>,
    store: Arc<VectorStore>,
    top_k: usize,
}

impl QueryRouter {
    pub fn new(catalog: Arc<dyn FileCatalog>, store: Arc<VectorStore>, top_k: usize) -> Self {
        Self {
            catalog,
            store,
            top_k,
        }
    }

    /// Resolve a generated query into context for answer synthesis.
    ///
    /// Never fails: execution errors degrade to content search, and a
    /// failing content search degrades to empty context, always with the
    /// matching provenance.
    pub async fn resolve(&self, generated_query: &str, user_question: &str) -> RoutedContext {
        if is_refusal(generated_query) {
            return self
                .content_search(user_question, Provenance::ContentSearch)
                .await;
        }

        if is_structured_query(generated_query) {
            match self.catalog.execute(generated_query).await {
                Ok(rows) if !rows.is_empty() => {
                    return RoutedContext {
                        context: rows.to_context_lines(),
                        provenance: Provenance::StructuredIndex,
                    };
                }
                Ok(_) => {
                    debug!("Structured query returned no rows, falling back to content search");
                }
                Err(e) => {
                    debug!("Structured query failed, falling back to content search: {e}");
                }
            }
            return self
                .content_search(user_question, Provenance::DegradedFallback)
                .await;
        }

        RoutedContext {
            context: String::new(),
            provenance: Provenance::Unrouted,
        }
    }

    async fn content_search(&self, question: &str, provenance: Provenance) -> RoutedContext {
        match self.store.query(question, self.top_k).await {
            Ok(context) => RoutedContext {
                context,
                provenance,
            },
            Err(e) => {
                warn!("Content search failed: {e:#}");
                RoutedContext {
                    context: String::new(),
                    provenance: Provenance::DegradedFallback,
                }
            }
        }
    }
}
