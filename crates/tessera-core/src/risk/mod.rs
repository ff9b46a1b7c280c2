//! Risk - remediation candidate classification and routing
//!
//! Scoring is additive over four factors:
//!
//! | factor | range |
//! |--------|-------|
//! | environment sensitivity | 0-40 |
//! | resource criticality | 0-30 |
//! | change-type severity | 0-20 |
//! | blast radius (2 per dependency) | 0-10 |
//!
//! The sum buckets into a [`RiskTier`]. Routing is a table lookup on the tier
//! that a [`RoutingPolicy`] can only make stricter: High and Critical
//! candidates are always delegated to template generation.

mod classifier;
mod routing;
mod types;

pub use classifier::{assess, classify, classify_candidate};
pub use routing::{partition, route, RoutingPartition};
pub use types::{
    ChangeType, ClassifiedCandidate, EnvironmentTier, RemediationCandidate, RemediationReport,
    ResourceKind, RiskAssessment, RiskError, RiskTier, RoutedItem, RoutingDecision,
    RoutingPolicy,
};
