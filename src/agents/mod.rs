//! Agent personas and the roster registry.

pub mod agent;
pub mod profile;

pub use agent::{Agent, TurnPrompt};
pub use profile::{AgentProfile, AgentRegistry};
