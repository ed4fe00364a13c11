//! Rig framework integration
//!
//! `RigAgentAdapter` turns any Rig `Agent<M>` into an [`crate::llm::LLMProvider`],
//! applying the provider's [`crate::llm::ProviderQuirks`] on every call.

mod rig_agent_adapter;

pub use rig_agent_adapter::RigAgentAdapter;
