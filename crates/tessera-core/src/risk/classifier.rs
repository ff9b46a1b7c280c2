use super::types::{ClassifiedCandidate, RemediationCandidate, RiskAssessment, RiskError, RiskTier};

const BLAST_RADIUS_PER_DEPENDENCY: u32 = 2;
const BLAST_RADIUS_CAP: u32 = 10;

/// Score a candidate factor by factor
#[must_use]
pub fn assess(candidate: &RemediationCandidate) -> RiskAssessment {
    let environment = candidate.environment.weight();
    let resource = candidate.resource_kind.weight();
    let change = candidate.change.weight();
    let blast_radius = candidate
        .dependency_count
        .saturating_mul(BLAST_RADIUS_PER_DEPENDENCY)
        .min(BLAST_RADIUS_CAP);
    let score = environment + resource + change + blast_radius;

    RiskAssessment {
        environment,
        resource,
        change,
        blast_radius,
        score,
        tier: RiskTier::from_score(score),
    }
}

/// Risk tier of a candidate
#[must_use]
pub fn classify(candidate: &RemediationCandidate) -> RiskTier {
    assess(candidate).tier
}

/// Validate and classify a candidate once
pub fn classify_candidate(
    candidate: RemediationCandidate,
) -> Result<ClassifiedCandidate, RiskError> {
    if candidate.id.trim().is_empty() {
        return Err(RiskError::MissingField {
            candidate: candidate.id,
            field: "id",
        });
    }
    if candidate.resource_id.trim().is_empty() {
        return Err(RiskError::MissingField {
            candidate: candidate.id,
            field: "resource_id",
        });
    }
    let assessment = assess(&candidate);
    Ok(ClassifiedCandidate::new(candidate, assessment))
}
