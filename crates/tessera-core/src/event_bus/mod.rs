//! EventBus - broadcast-based event system for real-time run events.
//!
//! The orchestrator publishes run and step lifecycle events so chat front
//! ends and internal subscribers can follow a run while it executes.
//! [`EventBus::follow_plan`] narrows the stream to one run.

/// Core event bus implementation (broadcast channel).
pub mod bus;
/// Event type definitions for the run lifecycle.
pub mod types;

pub use bus::{EventBus, RunSubscription};
pub use types::OrchestratorEvent;

#[cfg(test)]
mod tests;
