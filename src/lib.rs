//! debate_forge: structured multi-agent LLM debate with rubric-based judging.
//!
//! A roster of configured personas debates a question through propose,
//! critique and defend phases; a judge then scores each agent's final
//! answer against a weighted rubric and produces a verdict. Every run is
//! persisted as a JSONL transcript log.

// Core modules
pub mod agents;
pub mod cli;
pub mod debate;
pub mod error;
pub mod judge;
pub mod llm;
pub mod report;
pub mod storage;

// Re-export commonly used error types
pub use error::{ConfigError, DebateError, JudgeError, LlmError, StorageError};
