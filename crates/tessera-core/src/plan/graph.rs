//! Graph checks run once when a plan is built.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use super::types::{Step, StepId};
use crate::planner::PlanningError;

/// Empty plans, duplicate IDs and dangling dependencies
pub(super) fn validate_structure(steps: &[Step]) -> Result<(), PlanningError> {
    if steps.is_empty() {
        return Err(PlanningError::EmptyPlan);
    }

    let mut seen = HashSet::new();
    for step in steps {
        if !seen.insert(&step.id) {
            return Err(PlanningError::DuplicateStep(step.id.clone()));
        }
    }

    for step in steps {
        for dep in &step.depends_on {
            if !seen.contains(dep) {
                return Err(PlanningError::UnknownDependency {
                    step: step.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    Ok(())
}

/// Kahn's algorithm. Ready steps are taken in declaration order, so the
/// result is deterministic. Steps left over form (or hang off) a cycle.
pub(super) fn topological_order(steps: &[Step]) -> Result<Vec<StepId>, PlanningError> {
    let mut in_degree: HashMap<&StepId, usize> =
        steps.iter().map(|s| (&s.id, s.depends_on.len())).collect();

    let mut dependents: HashMap<&StepId, Vec<&StepId>> = HashMap::new();
    for step in steps {
        for dep in &step.depends_on {
            dependents.entry(dep).or_default().push(&step.id);
        }
    }

    let mut queue: VecDeque<&StepId> = steps
        .iter()
        .filter(|s| s.depends_on.is_empty())
        .map(|s| &s.id)
        .collect();

    let mut order = Vec::with_capacity(steps.len());
    while let Some(id) = queue.pop_front() {
        order.push(id.clone());
        for next in dependents.get(id).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(next) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(*next);
                }
            }
        }
    }

    if order.len() < steps.len() {
        let stuck = steps
            .iter()
            .filter(|s| in_degree.get(&s.id).copied().unwrap_or(0) > 0)
            .map(|s| s.id.clone())
            .collect();
        return Err(PlanningError::Cycle(stuck));
    }

    Ok(order)
}

/// Transitive dependencies of every step
pub(super) fn ancestors(
    steps: &[Step],
    order: &[StepId],
) -> BTreeMap<StepId, BTreeSet<StepId>> {
    let by_id: HashMap<&StepId, &Step> = steps.iter().map(|s| (&s.id, s)).collect();
    let mut result: BTreeMap<StepId, BTreeSet<StepId>> = BTreeMap::new();

    for id in order {
        let mut set = BTreeSet::new();
        if let Some(step) = by_id.get(id) {
            for dep in &step.depends_on {
                set.insert(dep.clone());
                if let Some(upstream) = result.get(dep) {
                    set.extend(upstream.iter().cloned());
                }
            }
        }
        result.insert(id.clone(), set);
    }

    result
}

/// Fail closed on any shared-key overlap between steps that may run at the
/// same time: write/write silently drops work, read/write makes the reader's
/// input depend on scheduling.
pub(super) fn check_concurrent_access(
    steps: &[Step],
    ancestors: &BTreeMap<StepId, BTreeSet<StepId>>,
) -> Result<(), PlanningError> {
    let ordered = |a: &StepId, b: &StepId| {
        ancestors.get(b).is_some_and(|s| s.contains(a))
            || ancestors.get(a).is_some_and(|s| s.contains(b))
    };

    for (i, first) in steps.iter().enumerate() {
        for second in &steps[i + 1..] {
            if ordered(&first.id, &second.id) {
                continue;
            }

            let shared: Vec<String> = first.writes.intersection(&second.writes).cloned().collect();
            if !shared.is_empty() {
                return Err(PlanningError::ConflictingWrites {
                    first: first.id.clone(),
                    second: second.id.clone(),
                    keys: shared,
                });
            }

            for (reader, writer) in [(first, second), (second, first)] {
                let keys: Vec<String> = reader.reads.intersection(&writer.writes).cloned().collect();
                if !keys.is_empty() {
                    return Err(PlanningError::UnorderedReadWrite {
                        reader: reader.id.clone(),
                        writer: writer.id.clone(),
                        keys,
                    });
                }
            }
        }
    }

    Ok(())
}
