//! Heuristic outcome resolution
//!
//! After outcome distribution the coordinator folds every participant's
//! status into a single transaction-level verdict. `None` is the fold
//! identity (which is why its code must be 0 wherever codes are compared),
//! mixed evidence absorbs everything, and commit evidence meeting rollback
//! evidence is itself proof of a mixed outcome.

use super::status::ResourceStatus;

/// What a participant status proves about the transaction outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Evidence {
    /// No contribution to the verdict.
    Neutral,
    /// The branch committed; `heuristic` marks unilateral completion.
    Commit { heuristic: bool },
    /// The branch rolled back; `heuristic` marks unilateral completion.
    Rollback { heuristic: bool },
    /// The branch outcome is unknown.
    Hazard,
    /// The branch itself completed in both directions.
    Mixed,
}

fn classify(status: ResourceStatus) -> Evidence {
    match status {
        ResourceStatus::None
        | ResourceStatus::Registered
        | ResourceStatus::Prepared
        | ResourceStatus::Completing
        | ResourceStatus::Completed
        | ResourceStatus::CompletingOnePhase => Evidence::Neutral,
        ResourceStatus::Committed => Evidence::Commit { heuristic: false },
        ResourceStatus::HeuristicCommit => Evidence::Commit { heuristic: true },
        ResourceStatus::RolledBack => Evidence::Rollback { heuristic: false },
        ResourceStatus::HeuristicRollback => Evidence::Rollback { heuristic: true },
        ResourceStatus::HeuristicHazard => Evidence::Hazard,
        ResourceStatus::HeuristicMixed => Evidence::Mixed,
    }
}

fn merge(a: Evidence, b: Evidence) -> Evidence {
    use Evidence::*;
    match (a, b) {
        (Neutral, x) | (x, Neutral) => x,
        (Mixed, _) | (_, Mixed) => Mixed,
        (Commit { .. }, Rollback { .. }) | (Rollback { .. }, Commit { .. }) => Mixed,
        (Hazard, _) | (_, Hazard) => Hazard,
        (Commit { heuristic: h1 }, Commit { heuristic: h2 }) => Commit { heuristic: h1 || h2 },
        (Rollback { heuristic: h1 }, Rollback { heuristic: h2 }) => {
            Rollback { heuristic: h1 || h2 }
        }
    }
}

fn to_status(evidence: Evidence) -> ResourceStatus {
    match evidence {
        Evidence::Neutral => ResourceStatus::None,
        Evidence::Commit { heuristic: false } => ResourceStatus::Committed,
        Evidence::Commit { heuristic: true } => ResourceStatus::HeuristicCommit,
        Evidence::Rollback { heuristic: false } => ResourceStatus::RolledBack,
        Evidence::Rollback { heuristic: true } => ResourceStatus::HeuristicRollback,
        Evidence::Hazard => ResourceStatus::HeuristicHazard,
        Evidence::Mixed => ResourceStatus::HeuristicMixed,
    }
}

/// Combine two statuses into their joint outcome evidence.
///
/// Commutative, with `ResourceStatus::None` as identity. Folding is
/// pairwise in list order: once hazard evidence absorbs a pair, direction
/// evidence from that pair no longer participates in later mixing.
pub fn combine(a: ResourceStatus, b: ResourceStatus) -> ResourceStatus {
    to_status(merge(classify(a), classify(b)))
}

/// Fold the verdict over an iterator of participant statuses.
pub fn fold<I>(statuses: I) -> ResourceStatus
where
    I: IntoIterator<Item = ResourceStatus>,
{
    statuses
        .into_iter()
        .fold(ResourceStatus::None, combine)
}

// =============================================================================
// Tests
// =============================================================================
