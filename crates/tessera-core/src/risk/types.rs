use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::worker::FailureDetail;

/// Deployment environment of the affected resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentTier {
    /// Production
    #[serde(alias = "prod")]
    Production,
    /// Staging / pre-production
    #[serde(alias = "stage", alias = "preprod")]
    Staging,
    /// Test / QA
    #[serde(alias = "qa")]
    Test,
    /// Development
    #[serde(alias = "dev")]
    Development,
    /// Disposable sandbox
    Sandbox,
}

impl EnvironmentTier {
    /// Sensitivity weight (0-40)
    #[must_use]
    pub fn weight(&self) -> u32 {
        match self {
            Self::Production => 40,
            Self::Staging => 25,
            Self::Test => 15,
            Self::Development => 10,
            Self::Sandbox => 0,
        }
    }
}

/// Kind of the affected resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Identities, role assignments
    Identity,
    /// Secret stores
    KeyVault,
    /// Databases
    Database,
    /// Networks, firewalls, security groups
    Network,
    /// Storage accounts, buckets
    Storage,
    /// VMs, containers, functions
    Compute,
    /// Logs, metrics, alerts
    Monitoring,
    /// Anything else
    #[serde(other)]
    Other,
}

impl ResourceKind {
    /// Criticality weight (0-30)
    #[must_use]
    pub fn weight(&self) -> u32 {
        match self {
            Self::Identity | Self::KeyVault => 30,
            Self::Database => 28,
            Self::Network => 25,
            Self::Storage => 18,
            Self::Compute => 15,
            Self::Other => 10,
            Self::Monitoring => 5,
        }
    }
}

/// Kind of change the proposed fix makes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Deletes the resource
    Delete,
    /// Changes routing, peering, firewall topology
    NetworkTopology,
    /// Changes role assignments or access policies
    IdentityAccess,
    /// Changes who can read or write data
    DataPlaneAccess,
    /// Changes encryption settings
    Encryption,
    /// Changes service configuration
    Configuration,
    /// Flips a non-destructive property
    Property,
    /// Adds or fixes tags
    Tagging,
}

impl ChangeType {
    /// Severity weight (0-20)
    #[must_use]
    pub fn weight(&self) -> u32 {
        match self {
            Self::Delete => 20,
            Self::NetworkTopology | Self::IdentityAccess => 18,
            Self::DataPlaneAccess => 16,
            Self::Encryption => 12,
            Self::Configuration => 8,
            Self::Property => 2,
            Self::Tagging => 0,
        }
    }

    /// Whether the change cannot be undone by flipping a property back
    #[must_use]
    pub fn is_destructive(&self) -> bool {
        matches!(self, Self::Delete)
    }
}

/// Risk tier of a remediation candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    /// Score below 20
    Minimal,
    /// Score 20-39
    Low,
    /// Score 40-59
    Medium,
    /// Score 60-79
    High,
    /// Score 80 and above
    Critical,
}

impl RiskTier {
    /// Bucket a total score
    #[must_use]
    pub fn from_score(score: u32) -> Self {
        match score {
            0..=19 => Self::Minimal,
            20..=39 => Self::Low,
            40..=59 => Self::Medium,
            60..=79 => Self::High,
            _ => Self::Critical,
        }
    }

    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A finding paired with a proposed fix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationCandidate {
    /// Candidate ID
    pub id: String,
    /// Finding this candidate fixes
    pub finding: String,
    /// Affected resource
    pub resource_id: String,
    /// Kind of the affected resource
    pub resource_kind: ResourceKind,
    /// Environment of the affected resource
    pub environment: EnvironmentTier,
    /// Kind of change
    pub change: ChangeType,
    /// Number of resources depending on the affected one
    #[serde(default)]
    pub dependency_count: u32,
    /// Whether the fix can be applied without generating a template
    #[serde(default = "default_automatable")]
    pub automatable: bool,
    /// Fix payload handed to the mutator
    #[serde(default)]
    pub proposed_fix: serde_json::Value,
}

fn default_automatable() -> bool {
    true
}

/// Per-factor breakdown of a risk score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Environment sensitivity (0-40)
    pub environment: u32,
    /// Resource criticality (0-30)
    pub resource: u32,
    /// Change-type severity (0-20)
    pub change: u32,
    /// Blast radius (0-10)
    pub blast_radius: u32,
    /// Sum of all factors
    pub score: u32,
    /// Bucketed tier
    pub tier: RiskTier,
}

/// Candidate with its one-time classification.
///
/// Only the classifier constructs these, so a candidate cannot be routed with
/// a tier other than the one its factors produce.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedCandidate {
    candidate: RemediationCandidate,
    assessment: RiskAssessment,
}

impl ClassifiedCandidate {
    pub(super) fn new(candidate: RemediationCandidate, assessment: RiskAssessment) -> Self {
        Self {
            candidate,
            assessment,
        }
    }

    /// The classified candidate
    #[must_use]
    pub fn candidate(&self) -> &RemediationCandidate {
        &self.candidate
    }

    /// Score breakdown
    #[must_use]
    pub fn assessment(&self) -> &RiskAssessment {
        &self.assessment
    }

    /// Risk tier
    #[must_use]
    pub fn tier(&self) -> RiskTier {
        self.assessment.tier
    }
}

/// Where a classified candidate goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingDecision {
    /// Apply the fix directly
    AutoExecute,
    /// Hand to a human for confirmation
    RequireConfirmation,
    /// Generate a reviewable template instead of mutating
    Delegate,
}

/// Operator policy. Every switch only makes routing stricter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingPolicy {
    /// Allow auto-execution at all
    #[serde(default = "default_true")]
    pub auto_execute_enabled: bool,
    /// Require confirmation for any production change
    #[serde(default)]
    pub confirm_production: bool,
    /// Require confirmation for destructive changes
    #[serde(default = "default_true")]
    pub confirm_destructive: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            auto_execute_enabled: true,
            confirm_production: false,
            confirm_destructive: true,
        }
    }
}

impl RoutingPolicy {
    /// Disable auto-execution entirely
    #[must_use]
    pub fn without_auto_execute(mut self) -> Self {
        self.auto_execute_enabled = false;
        self
    }

    /// Require confirmation for production changes
    #[must_use]
    pub fn with_production_confirmation(mut self) -> Self {
        self.confirm_production = true;
        self
    }
}

/// Summary line for one routed candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutedItem {
    /// Candidate ID
    pub candidate_id: String,
    /// Affected resource
    pub resource_id: String,
    /// Risk tier
    pub tier: RiskTier,
    /// Risk score
    pub score: u32,
}

impl From<&ClassifiedCandidate> for RoutedItem {
    fn from(classified: &ClassifiedCandidate) -> Self {
        Self {
            candidate_id: classified.candidate.id.clone(),
            resource_id: classified.candidate.resource_id.clone(),
            tier: classified.assessment.tier,
            score: classified.assessment.score,
        }
    }
}

/// Outcome of one remediation step, partitioned by routing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemediationReport {
    /// Candidates whose fix was applied
    pub auto_executed: Vec<RoutedItem>,
    /// Candidates handed to a human for confirmation
    pub awaiting_confirmation: Vec<RoutedItem>,
    /// Candidates handed to template generation
    pub delegated: Vec<RoutedItem>,
    /// Auto-execute candidates whose fix failed or was rolled back
    pub failed: Vec<FailureDetail>,
}

impl RemediationReport {
    /// Total number of candidates accounted for
    #[must_use]
    pub fn total(&self) -> usize {
        self.auto_executed.len()
            + self.awaiting_confirmation.len()
            + self.delegated.len()
            + self.failed.len()
    }
}

/// Malformed remediation candidate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RiskError {
    /// A required field is empty
    #[error("candidate '{candidate}' has an empty {field}")]
    MissingField {
        /// Candidate ID (may be empty)
        candidate: String,
        /// Empty field
        field: &'static str,
    },

    /// The candidate list could not be decoded
    #[error("invalid remediation candidates: {0}")]
    Decode(String),
}
