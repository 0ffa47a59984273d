use crate::embeddings::Embedder;
use crate::error::{ConfigError, QueryError, SynthesisError};
use crate::index::VectorIndex;
use crate::models::{Citation, RetrievalResult, DEFAULT_EXCERPT_CHARS};
use crate::synthesis::AnswerSynthesizer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Upper bound on context chars packed into a single compact prompt.
pub const DEFAULT_CONTEXT_CHARS: usize = 12_000;

/// How retrieved passages are turned into a synthesis prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// All passages packed into one prompt.
    #[default]
    Compact,
    /// One call per passage, each refining the previous answer.
    Refine,
}

impl FromStr for ResponseMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "refine" => Ok(Self::Refine),
            _ => Err("expected compact or refine".to_string()),
        }
    }
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compact => f.write_str("compact"),
            Self::Refine => f.write_str("refine"),
        }
    }
}

/// Retrieved passages plus the synthesized answer, which may have failed on its own.
#[derive(Debug)]
pub struct Answer {
    pub question: String,
    pub cited_passages: RetrievalResult,
    pub synthesis: Result<String, SynthesisError>,
}

impl Answer {
    pub fn citations(&self) -> Vec<Citation> {
        self.cited_passages.citations(DEFAULT_EXCERPT_CHARS)
    }
}

/// Answers questions against a fully built index.
///
/// The engine only ever sees a finished [`VectorIndex`]; it cannot be created
/// while a build is still running.
pub struct QueryEngine {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    synthesizer: Option<Arc<dyn AnswerSynthesizer>>,
    top_k: usize,
    mode: ResponseMode,
    context_chars: usize,
}

impl QueryEngine {
    /// Fails when the index was embedded by a different model than `embedder`.
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn Embedder>,
        top_k: usize,
    ) -> Result<Self, ConfigError> {
        let configured = embedder.model_identity();
        if index.model_identity() != configured {
            return Err(ConfigError::ModelMismatch {
                stored: index.model_identity().to_string(),
                configured,
            });
        }

        Ok(Self {
            index,
            embedder,
            synthesizer: None,
            top_k,
            mode: ResponseMode::default(),
            context_chars: DEFAULT_CONTEXT_CHARS,
        })
    }

    pub fn with_synthesizer(
        mut self,
        synthesizer: Arc<dyn AnswerSynthesizer>,
        mode: ResponseMode,
    ) -> Self {
        self.synthesizer = Some(synthesizer);
        self.mode = mode;
        self
    }

    pub fn with_context_chars(mut self, context_chars: usize) -> Self {
        self.context_chars = context_chars.max(1);
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn mode(&self) -> ResponseMode {
        self.mode
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub async fn query(&self, question: &str) -> Result<RetrievalResult, QueryError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        let query_vector = self.embedder.embed(question).await?;
        let result = self.index.search(&query_vector, self.top_k)?;
        info!(top_k = self.top_k, hits = result.len(), "retrieved passages");
        Ok(result)
    }

    /// Retrieves passages, then asks the synthesizer for an answer.
    ///
    /// Synthesis failures are reported inside [`Answer::synthesis`] so the
    /// passages stay available to the caller.
    pub async fn answer(&self, question: &str) -> Result<Answer, QueryError> {
        let cited_passages = self.query(question).await?;
        let synthesis = match &self.synthesizer {
            None => Err(SynthesisError::NotConfigured),
            Some(synthesizer) => {
                self.synthesize(synthesizer.as_ref(), question.trim(), &cited_passages)
                    .await
            }
        };

        if let Err(error) = &synthesis {
            warn!(error = %error, "answer synthesis failed, returning passages only");
        }

        Ok(Answer {
            question: question.trim().to_string(),
            cited_passages,
            synthesis,
        })
    }

    async fn synthesize(
        &self,
        synthesizer: &dyn AnswerSynthesizer,
        question: &str,
        passages: &RetrievalResult,
    ) -> Result<String, SynthesisError> {
        let contexts: Vec<String> = passages.iter().map(passage_block).collect();

        match self.mode {
            ResponseMode::Compact => {
                let context = pack_context(&contexts, self.context_chars);
                synthesizer.complete(&qa_prompt(&context, question)).await
            }
            ResponseMode::Refine => {
                let Some((first, rest)) = contexts.split_first() else {
                    return synthesizer.complete(&qa_prompt("", question)).await;
                };
                let mut answer = synthesizer.complete(&qa_prompt(first, question)).await?;
                for (step, context) in rest.iter().enumerate() {
                    debug!(step = step + 1, "refining answer");
                    answer = synthesizer
                        .complete(&refine_prompt(context, question, &answer))
                        .await?;
                }
                Ok(answer)
            }
        }
    }
}

fn passage_block(hit: &crate::models::ScoredChunk) -> String {
    format!("[source: {}]\n{}", hit.chunk.source_name(), hit.chunk.text)
}

/// Joins passages in rank order until the char budget is spent. The first
/// passage is always kept.
fn pack_context(contexts: &[String], budget: usize) -> String {
    let mut packed = String::new();
    let mut used = 0;
    for context in contexts {
        let len = context.chars().count();
        if !packed.is_empty() && used + len > budget {
            break;
        }
        if !packed.is_empty() {
            packed.push_str("\n\n");
        }
        packed.push_str(context);
        used += len;
    }
    packed
}

fn qa_prompt(context: &str, question: &str) -> String {
    format!(
        "Context information is below.\n\
         ---------------------\n\
         {context}\n\
         ---------------------\n\
         Given the context information and not prior knowledge, answer the question.\n\
         Question: {question}\n\
         Answer: "
    )
}

fn refine_prompt(context: &str, question: &str, existing_answer: &str) -> String {
    format!(
        "The original question is: {question}\n\
         We have provided an existing answer: {existing_answer}\n\
         We have the opportunity to refine the existing answer with some more context below.\n\
         ---------------------\n\
         {context}\n\
         ---------------------\n\
         Given the new context, refine the original answer to better answer the question. \
         If the context isn't useful, return the original answer.\n\
         Refined Answer: "
    )
}
