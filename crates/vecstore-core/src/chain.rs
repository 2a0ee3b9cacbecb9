//! Retrieval QA chains.
//!
//! A [`RetrievalQa`] fetches chunks through a [`Retriever`] and combines
//! them into an answer with a [`ChatModel`]. The combine strategy is the
//! [`ChainType`]:
//!
//! | Chain | Calls | Strategy |
//! |-------|-------|----------|
//! | `stuff` | 1 | All chunks in one prompt |
//! | `map_reduce` | n + 1 | Extract relevant text per chunk, then answer from the extracts |
//! | `refine` | n | Answer from the first chunk, refine with each following chunk |
//! | `map_rerank` | n | Answer per chunk with a self-reported score, keep the best |

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Result};
use serde::Serialize;

use crate::chat::{ChatMessage, ChatModel};
use crate::models::Document;
use crate::retriever::Retriever;

/// How retrieved chunks are combined into an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainType {
    Stuff,
    MapReduce,
    Refine,
    MapRerank,
}

impl FromStr for ChainType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stuff" => Ok(ChainType::Stuff),
            "map_reduce" => Ok(ChainType::MapReduce),
            "refine" => Ok(ChainType::Refine),
            "map_rerank" => Ok(ChainType::MapRerank),
            other => bail!(
                "Unknown chain type: '{}'. Use stuff, map_reduce, refine, or map_rerank.",
                other
            ),
        }
    }
}

impl fmt::Display for ChainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChainType::Stuff => "stuff",
            ChainType::MapReduce => "map_reduce",
            ChainType::Refine => "refine",
            ChainType::MapRerank => "map_rerank",
        };
        f.write_str(name)
    }
}

/// Output of a chain run.
#[derive(Debug, Clone, Serialize)]
pub struct QaResult {
    pub query: String,
    pub result: String,
    pub source_documents: Vec<Document>,
}

const STUFF_SYSTEM: &str = "Use the following pieces of context to answer the user's question.\n\
If you don't know the answer, just say that you don't know; do not make one up.\n\
----------------\n";

const MAP_SYSTEM: &str = "Use the following portion of a long document to see if any of the \
text is relevant to answer the question. Return any relevant text verbatim, or nothing.\n\
----------------\n";

const REDUCE_SYSTEM: &str = "Given the following extracted parts of a long document and a \
question, write a final answer. If you don't know the answer, just say that you don't know.\n\
----------------\n";

const RERANK_SYSTEM: &str = "Use the following piece of context to answer the question. \
After the answer, on its own line, write `Score: N` where N from 0 to 100 rates how fully \
the context answers the question.\n\
----------------\n";

/// A retriever wired to a chat model with a combine strategy.
pub struct RetrievalQa {
    llm: Arc<dyn ChatModel>,
    retriever: Retriever,
    chain_type: ChainType,
}

impl RetrievalQa {
    pub fn new(llm: Arc<dyn ChatModel>, retriever: Retriever, chain_type: ChainType) -> Self {
        Self {
            llm,
            retriever,
            chain_type,
        }
    }

    /// Retrieve chunks for `query` and compose an answer from them.
    pub async fn run(&self, query: &str) -> Result<QaResult> {
        let docs = self.retriever.retrieve(query).await?;
        let result = match self.chain_type {
            ChainType::Stuff => self.stuff(query, &docs).await?,
            ChainType::MapReduce => self.map_reduce(query, &docs).await?,
            ChainType::Refine => self.refine(query, &docs).await?,
            ChainType::MapRerank => self.map_rerank(query, &docs).await?,
        };
        Ok(QaResult {
            query: query.to_string(),
            result,
            source_documents: docs,
        })
    }

    async fn ask_with_context(&self, system: &str, context: &str, query: &str) -> Result<String> {
        self.llm
            .complete(&[
                ChatMessage::system(format!("{}{}", system, context)),
                ChatMessage::user(query),
            ])
            .await
    }

    async fn stuff(&self, query: &str, docs: &[Document]) -> Result<String> {
        self.ask_with_context(STUFF_SYSTEM, &join_contents(docs), query)
            .await
    }

    async fn map_reduce(&self, query: &str, docs: &[Document]) -> Result<String> {
        let mut extracts = Vec::with_capacity(docs.len());
        for doc in docs {
            let extract = self
                .ask_with_context(MAP_SYSTEM, &doc.page_content, query)
                .await?;
            if !extract.trim().is_empty() {
                extracts.push(extract.trim().to_string());
            }
        }
        self.ask_with_context(REDUCE_SYSTEM, &extracts.join("\n\n"), query)
            .await
    }

    async fn refine(&self, query: &str, docs: &[Document]) -> Result<String> {
        let Some((first, rest)) = docs.split_first() else {
            return self.stuff(query, docs).await;
        };

        let mut answer = self
            .ask_with_context(STUFF_SYSTEM, &first.page_content, query)
            .await?;
        for doc in rest {
            let prompt = format!(
                "The original question is: {}\n\
                 We have an existing answer: {}\n\
                 Refine the existing answer (only if needed) using the new context below. \
                 If the context isn't useful, return the existing answer unchanged.\n\
                 ------------\n{}\n------------",
                query, answer, doc.page_content
            );
            answer = self.llm.predict(&prompt).await?;
        }
        Ok(answer)
    }

    async fn map_rerank(&self, query: &str, docs: &[Document]) -> Result<String> {
        let mut best: Option<(u32, String)> = None;
        for doc in docs {
            let reply = self
                .ask_with_context(RERANK_SYSTEM, &doc.page_content, query)
                .await?;
            let (answer, score) = parse_scored_answer(&reply);
            if best.as_ref().map_or(true, |(s, _)| score > *s) {
                best = Some((score, answer));
            }
        }
        match best {
            Some((_, answer)) => Ok(answer),
            None => self.stuff(query, docs).await,
        }
    }
}

fn join_contents(docs: &[Document]) -> String {
    docs.iter()
        .map(|d| d.page_content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Split a `map_rerank` reply into answer text and score. A missing or
/// unparsable score counts as 0.
fn parse_scored_answer(reply: &str) -> (String, u32) {
    match reply.rsplit_once("Score:") {
        Some((answer, score)) => {
            let digits: String = score
                .trim()
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            (answer.trim().to_string(), digits.parse().unwrap_or(0))
        }
        None => (reply.trim().to_string(), 0),
    }
}
