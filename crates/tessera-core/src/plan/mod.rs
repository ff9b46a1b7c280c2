//! Plan - immutable DAG of worker steps
//!
//! A [`Plan`] is produced once per request (by the
//! [`Planner`](crate::planner::Planner) or directly through [`PlanBuilder`])
//! and never mutated afterwards. Construction validates the graph:
//! - at least one step, unique step IDs, known dependencies
//! - acyclic
//! - no two concurrently schedulable steps write the same key, and no step
//!   reads a key that a concurrent step writes

mod builder;
mod graph;
mod types;

pub use builder::PlanBuilder;
pub use types::{FailurePolicy, Plan, PlanKind, Step, StepAction, StepId};
