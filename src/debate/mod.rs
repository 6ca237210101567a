//! Debate state and execution: the transcript data model and the phase
//! orchestrator that drives a roster of agents through it.

pub mod orchestrator;
pub mod transcript;

pub use orchestrator::{
    CancelToken, Clock, CritiquePolicy, DebateConfig, DebateEvent, DebateOrchestrator,
    DebateOutcome,
};
pub use transcript::{ContextPolicy, Phase, Transcript, Turn};
