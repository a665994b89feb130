//! Feature enrichers.
//!
//! Enrichers read flags already on the context and, when their precondition
//! holds, attach a decision for a later handler. They never respond. Order
//! matters: retrieval runs before tool routing so the router knows whether a
//! knowledge base is in play, and agent detection runs last so an explicit
//! agent request overrides both.

mod agent_mode;
mod retrieval;
mod tool_routing;

pub use agent_mode::AgentModeEnricher;
pub use retrieval::{reformulate_query, RetrievalEnricher};
pub use tool_routing::ToolRoutingEnricher;
