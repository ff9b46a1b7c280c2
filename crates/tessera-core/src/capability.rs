//! Capabilities - the closed set of worker specializations
//!
//! Every worker implements exactly one [`Capability`]. The
//! [`CapabilityCatalog`] describes which shared-context keys a capability
//! reads and writes by default and whether it mutates cloud resources.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::context::keys;

/// Worker capability
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Template generation and direct resource mutation
    Infrastructure,
    /// Compliance scanning and assessment
    Compliance,
    /// Cost estimation and optimization
    Cost,
    /// Resource discovery and inventory
    Discovery,
    /// Environment lifecycle (clone, tear down)
    Environment,
    /// Knowledge base lookups and explanations
    Knowledge,
}

impl Capability {
    /// All capabilities, in declaration order
    pub const ALL: [Capability; 6] = [
        Capability::Infrastructure,
        Capability::Compliance,
        Capability::Cost,
        Capability::Discovery,
        Capability::Environment,
        Capability::Knowledge,
    ];

    /// Stable lowercase name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Infrastructure => "infrastructure",
            Capability::Compliance => "compliance",
            Capability::Cost => "cost",
            Capability::Discovery => "discovery",
            Capability::Environment => "environment",
            Capability::Knowledge => "knowledge",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A capability hint that does not name any known capability
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown capability '{0}'")]
pub struct ParseCapabilityError(pub String);

impl FromStr for Capability {
    type Err = ParseCapabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "infrastructure" | "infra" | "iac" => Ok(Capability::Infrastructure),
            "compliance" | "security" => Ok(Capability::Compliance),
            "cost" | "finops" => Ok(Capability::Cost),
            "discovery" | "inventory" => Ok(Capability::Discovery),
            "environment" | "env" => Ok(Capability::Environment),
            "knowledge" | "docs" => Ok(Capability::Knowledge),
            other => Err(ParseCapabilityError(other.to_string())),
        }
    }
}

/// Default shared-context footprint of a capability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityProfile {
    /// Keys read from the shared context store
    #[serde(default)]
    pub reads: BTreeSet<String>,
    /// Keys written to the shared context store
    #[serde(default)]
    pub writes: BTreeSet<String>,
    /// Whether steps of this capability mutate resources
    #[serde(default)]
    pub mutating: bool,
}

impl CapabilityProfile {
    fn new(reads: &[&str], writes: &[&str], mutating: bool) -> Self {
        Self {
            reads: reads.iter().map(|k| (*k).to_string()).collect(),
            writes: writes.iter().map(|k| (*k).to_string()).collect(),
            mutating,
        }
    }
}

/// Capability → profile lookup used by the planner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityCatalog {
    profiles: BTreeMap<Capability, CapabilityProfile>,
}

impl Default for CapabilityCatalog {
    fn default() -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert(
            Capability::Discovery,
            CapabilityProfile::new(&[], &[keys::RESOURCE_INVENTORY], false),
        );
        profiles.insert(
            Capability::Compliance,
            CapabilityProfile::new(
                &[keys::RESOURCE_INVENTORY],
                &[keys::FINDINGS, keys::REMEDIATION_CANDIDATES],
                false,
            ),
        );
        profiles.insert(
            Capability::Cost,
            CapabilityProfile::new(&[], &[keys::COST_ESTIMATE], false),
        );
        profiles.insert(
            Capability::Infrastructure,
            CapabilityProfile::new(
                &[keys::REMEDIATION_CANDIDATES],
                &[keys::REMEDIATION_RESULTS],
                true,
            ),
        );
        profiles.insert(
            Capability::Environment,
            CapabilityProfile::new(&[], &[keys::ENVIRONMENT_STATE], true),
        );
        profiles.insert(
            Capability::Knowledge,
            CapabilityProfile::new(&[], &[keys::KNOWLEDGE_ANSWER], false),
        );
        Self { profiles }
    }
}

impl CapabilityCatalog {
    /// Replace the profile of one capability
    #[must_use]
    pub fn with_profile(mut self, capability: Capability, profile: CapabilityProfile) -> Self {
        self.profiles.insert(capability, profile);
        self
    }

    /// Profile for a capability (empty profile if none is registered)
    #[must_use]
    pub fn profile(&self, capability: Capability) -> CapabilityProfile {
        self.profiles.get(&capability).cloned().unwrap_or_default()
    }
}
