//! Agent runtime: language-model planning and composition around the data pipeline.
//!
//! A request moves through a constrained loop:
//! 1. **Planning** (`planner`) - utterance + history + live schemas → validated `QueryPlan`
//! 2. **Fetching** (`runtime`) - concurrent per-board fetches under timeout and backoff
//! 3. **Cleaning / aggregation** - delegated to `boardsight-core`
//! 4. **Composition** (`composer`) - metrics + quality caveats → briefing, with a
//!    templated fallback when the model is unavailable
//!
//! # Key Types
//!
//! - `AgentRuntime` - per-request orchestrator (see `runtime` module)
//! - `LlmClient` - pluggable completion capability; `ChatCompletionsClient` speaks the
//!   OpenAI-compatible API used by Groq, OpenAI, and Ollama
//! - `BackoffPolicy` - bounded retry with a per-attempt timeout
//!
//! # Safety Principle
//!
//! The model is strictly a translator. It never computes figures: every number in an
//! answer comes from the metric engine, and the composer prompt forbids citing anything else.

pub mod chat_api;
pub mod composer;
pub mod conversation;
pub mod llm;
pub mod planner;
pub mod retry;
pub mod runtime;

pub use chat_api::ChatCompletionsClient;
pub use composer::{format_inr, ResponseComposer};
pub use llm::{ChatMessage, LlmClient, Prompt};
pub use planner::QueryPlanner;
pub use retry::BackoffPolicy;
pub use runtime::{AgentRuntime, RuntimeOptions};
