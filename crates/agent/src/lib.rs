//! Agent decision pipeline - candidate selection, mix planning, price
//! negotiation, and bounded spend for one listening session.
//!
//! # Architecture
//!
//! The pipeline runs leaf to root:
//! 1. **Tools** (`tools`) - named operations over structured input/output
//!    (catalog search, price quotes, similarity ranking)
//! 2. **Selection** (`selector`) - preferences → ordered candidate list
//! 3. **Mix planning** (`mixer`) - deterministic transition between tracks
//! 4. **Negotiation** (`negotiator`) - price/budget check plus on-chain
//!    listing reconciliation with self-healing of stale records
//! 5. **Orchestration** (`orchestrator`) - the whole sequence folded over
//!    candidates under one running budget
//! 6. **Runtime** (`runtime`) - deterministic pipeline or LLM tool-calling
//!    agent, selected by configuration
//!
//! # Safety Principle
//!
//! The LLM is strictly a curator. It NEVER debits budgets or mutates
//! listings - those are deterministic decisions made by the pipeline, and
//! any LLM failure degrades to the deterministic path for the same input.

pub mod catalog;
pub mod chain;
pub mod embeddings;
pub mod evaluation;
pub mod llm;
pub mod mixer;
pub mod negotiator;
pub mod orchestrator;
pub mod runtime;
pub mod selector;
pub mod tools;

pub use catalog::{Catalog, CatalogTrack, InMemoryCatalog};
pub use chain::{ChainError, ChainReader, InMemoryChainReader, InMemoryListingStore, ListingStore};
pub use embeddings::{cosine, EmbeddingService, EmbeddingStore, RankedTrack, EMBEDDING_DIMENSION};
pub use evaluation::{AgentEvaluation, EvaluationMetrics, EvaluationReport};
pub use llm::{ChatModel, GeminiChatModel, LlmError, ToolDeclaration};
pub use negotiator::{NegotiateInput, Negotiator};
pub use orchestrator::Orchestrator;
pub use runtime::{
    AgentRuntime, RuntimeKind, ToolCallingCurator, DEFAULT_EXCHANGE_TIMEOUT, MAX_TOOL_ROUNDS,
};
pub use selector::{SelectInput, Selection, Selector};
pub use tools::{builtin_registry, Tool, ToolError, ToolRegistry};
